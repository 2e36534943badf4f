//! Search and calendar views.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::path::Path;

use super::print_entities;
use crate::config::Workspace;

/// Run the search command.
pub async fn search(data_dir: &Path, text: &str) -> Result<()> {
    let container = Workspace::open(data_dir).await?.container().await?;
    print_entities(&container.search(text).await);
    Ok(())
}

/// Run the agenda command: everything on one day (today by default).
pub async fn agenda(data_dir: &Path, day: Option<NaiveDate>) -> Result<()> {
    let day = day.unwrap_or_else(|| Utc::now().date_naive());
    let container = Workspace::open(data_dir).await?.container().await?;

    println!("=== {} ===", day.format("%A %Y-%m-%d"));
    print_entities(&container.on_day(day).await);
    Ok(())
}

/// Run the upcoming command.
pub async fn upcoming(data_dir: &Path, days: u32) -> Result<()> {
    let container = Workspace::open(data_dir).await?.container().await?;

    println!("=== Next {} days ===", days);
    print_entities(&container.upcoming(Utc::now(), days).await);
    Ok(())
}
