//! # cultura
//!
//! Command-line front end for the Cultura offline-first store.
//!
//! ## Commands
//!
//! - `init`: Create a data directory with a `cultura.toml`
//! - `add`: Add an event, birthday, task, contact or article
//! - `list`, `search`, `agenda`, `upcoming`: Read views
//! - `favorite`, `delete`: Change existing records
//! - `import`: Bulk-import contacts from a JSON file
//! - `status`: Show record counts and pending changes
//! - `sync`: Replay pending changes against the remote
//! - `dead-letters`: Inspect, requeue or purge given-up changes
//!
//! ## Example
//!
//! ```bash
//! # Set up with a remote
//! cultura init --remote https://api.example.org
//!
//! # Record something while offline
//! cultura add event "Feria del Libro" --date 2024-05-01T10:00
//!
//! # Replay it once online
//! cultura sync
//!
//! # Or try the whole flow against the in-process mock
//! cultura --mock sync
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cultura_sync_types::{Article, Birthday, Contact, Entity, EntityKind, Event, Task, TaskPriority};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{init, parse_date, parse_datetime, query, records, status, sync};

/// Offline-first cultural agenda.
#[derive(Parser, Debug)]
#[command(name = "cultura")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding cultura.toml and the local database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Replay against an in-process mock remote instead of HTTP
    #[arg(long, global = true)]
    mock: bool,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create cultura.toml and the local database
    Init {
        /// Base URL of the remote REST endpoint
        #[arg(long)]
        remote: Option<String>,
    },

    /// Add a record
    #[command(subcommand)]
    Add(AddCommand),

    /// List records
    List {
        /// Only this kind (event, birthday, task, contact, article)
        kind: Option<EntityKind>,

        /// Only favorites
        #[arg(long)]
        favorites: bool,
    },

    /// Toggle the favorite flag of a record
    Favorite {
        /// Record kind
        kind: EntityKind,
        /// Record id
        id: String,
    },

    /// Delete a record
    Delete {
        /// Record kind
        kind: EntityKind,
        /// Record id
        id: String,
    },

    /// Import contacts from a JSON array, skipping duplicates
    Import {
        /// JSON file to read
        file: PathBuf,
    },

    /// Case-insensitive text search across all records
    Search {
        /// Text to look for
        text: String,
    },

    /// Everything happening on one day
    Agenda {
        /// Day to show (YYYY-MM-DD, default today)
        #[arg(long)]
        day: Option<String>,
    },

    /// Events, due tasks and birthdays in the coming days
    Upcoming {
        /// Window length in days
        #[arg(long, default_value = "7")]
        days: u32,
    },

    /// Show record counts and sync status
    Status,

    /// Replay pending changes against the remote
    Sync,

    /// List changes that will not be retried
    DeadLetters {
        /// Put them back on the sync queue
        #[arg(long, conflicts_with = "purge")]
        requeue: bool,

        /// Drop them for good
        #[arg(long, conflicts_with = "requeue")]
        purge: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AddCommand {
    /// Add an event
    Event(EventArgs),
    /// Add a birthday
    Birthday(BirthdayArgs),
    /// Add a task
    Task(TaskArgs),
    /// Add a contact
    Contact(ContactArgs),
    /// Add a press article
    Article(ArticleArgs),
}

#[derive(Args, Debug)]
struct EventArgs {
    /// Title
    title: String,
    /// Start (YYYY-MM-DD[THH:MM] or RFC 3339)
    #[arg(long)]
    date: String,
    /// End, same formats as --date
    #[arg(long)]
    end: Option<String>,
    #[arg(long, default_value = "")]
    location: String,
    #[arg(long, default_value = "")]
    category: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long)]
    favorite: bool,
}

#[derive(Args, Debug)]
struct BirthdayArgs {
    /// Person's name
    name: String,
    /// Date of birth (YYYY-MM-DD)
    #[arg(long)]
    date: String,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args, Debug)]
struct TaskArgs {
    /// Title
    title: String,
    /// Due date (YYYY-MM-DD[THH:MM] or RFC 3339)
    #[arg(long)]
    due: Option<String>,
    #[arg(long, value_enum, default_value = "medium")]
    priority: Priority,
    #[arg(long, default_value = "")]
    description: String,
}

#[derive(Args, Debug)]
struct ContactArgs {
    /// Full name
    name: String,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    organization: Option<String>,
}

#[derive(Args, Debug)]
struct ArticleArgs {
    /// Headline
    title: String,
    /// Publication date (YYYY-MM-DD[THH:MM] or RFC 3339)
    #[arg(long)]
    published: String,
    #[arg(long, default_value = "")]
    outlet: String,
    #[arg(long, default_value = "")]
    url: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Priority {
    Low,
    Medium,
    High,
}

impl From<Priority> for TaskPriority {
    fn from(p: Priority) -> Self {
        match p {
            Priority::Low => TaskPriority::Low,
            Priority::Medium => TaskPriority::Medium,
            Priority::High => TaskPriority::High,
        }
    }
}

impl AddCommand {
    fn into_entity(self) -> Result<Entity> {
        let entity = match self {
            AddCommand::Event(args) => {
                let mut event = Event::new(args.title, parse_datetime(&args.date)?);
                event.end_date = args.end.as_deref().map(parse_datetime).transpose()?;
                event.location = args.location;
                event.category = args.category;
                event.description = args.description;
                event.is_favorite = args.favorite;
                Entity::Event(event)
            }
            AddCommand::Birthday(args) => {
                let mut birthday = Birthday::new(args.name, parse_date(&args.date)?);
                birthday.notes = args.notes;
                Entity::Birthday(birthday)
            }
            AddCommand::Task(args) => {
                let mut task = Task::new(args.title);
                task.due_date = args.due.as_deref().map(parse_datetime).transpose()?;
                task.priority = args.priority.into();
                task.description = args.description;
                Entity::Task(task)
            }
            AddCommand::Contact(args) => {
                let mut contact = Contact::new(args.name);
                contact.email = args.email;
                contact.phone = args.phone;
                contact.organization = args.organization;
                Entity::Contact(contact)
            }
            AddCommand::Article(args) => {
                let mut article = Article::new(args.title, parse_datetime(&args.published)?);
                article.outlet = args.outlet;
                article.url = args.url;
                Entity::Article(article)
            }
        };
        Ok(entity)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    match cli.command {
        Commands::Init { remote } => {
            init::run(&data_dir, remote.as_deref()).await?;
        }
        Commands::Add(add) => {
            records::add(&data_dir, add.into_entity()?).await?;
        }
        Commands::List { kind, favorites } => {
            records::list(&data_dir, kind, favorites).await?;
        }
        Commands::Favorite { kind, id } => {
            records::favorite(&data_dir, kind, &id).await?;
        }
        Commands::Delete { kind, id } => {
            records::delete(&data_dir, kind, &id).await?;
        }
        Commands::Import { file } => {
            records::import(&data_dir, &file).await?;
        }
        Commands::Search { text } => {
            query::search(&data_dir, &text).await?;
        }
        Commands::Agenda { day } => {
            let day = day.as_deref().map(parse_date).transpose()?;
            query::agenda(&data_dir, day).await?;
        }
        Commands::Upcoming { days } => {
            query::upcoming(&data_dir, days).await?;
        }
        Commands::Status => {
            status::run(&data_dir).await?;
        }
        Commands::Sync => {
            sync::run(&data_dir, cli.mock).await?;
        }
        Commands::DeadLetters { requeue, purge } => {
            sync::dead_letters(&data_dir, requeue, purge).await?;
        }
    }

    Ok(())
}

/// Log to stderr so command output on stdout stays clean.
fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for cultura.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "cultura", "cultura")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
