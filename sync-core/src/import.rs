//! Contact import merging.
//!
//! Imported contacts are matched against the address book by exact email
//! equality only. Near-duplicates (different case, different spelling of
//! the name, no email) are not detected.

use cultura_sync_types::Contact;
use std::collections::HashSet;

/// Result of merging an import batch into the address book.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactMerge {
    /// Contacts to add, in import order.
    pub added: Vec<Contact>,
    /// Contacts skipped because their email is already known.
    pub skipped: Vec<Contact>,
}

/// Split `incoming` into contacts to add and exact-email duplicates.
///
/// A contact is skipped when its email equals the email of an existing
/// contact or of an earlier contact in the same batch. Contacts without an
/// email are always added.
pub fn merge_contacts(existing: &[Contact], incoming: Vec<Contact>) -> ContactMerge {
    let mut seen: HashSet<String> = existing
        .iter()
        .filter_map(|c| c.email.clone())
        .collect();

    let mut merge = ContactMerge::default();
    for contact in incoming {
        match &contact.email {
            Some(email) if !seen.insert(email.clone()) => merge.skipped.push(contact),
            _ => merge.added.push(contact),
        }
    }
    merge
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_email_match_is_skipped() {
        let existing = vec![Contact::new("Ana").with_email("ana@example.org")];
        let incoming = vec![
            Contact::new("Ana García").with_email("ana@example.org"),
            Contact::new("Luis").with_email("luis@example.org"),
        ];

        let merge = merge_contacts(&existing, incoming);

        assert_eq!(merge.added.len(), 1);
        assert_eq!(merge.added[0].name, "Luis");
        assert_eq!(merge.skipped.len(), 1);
    }

    #[test]
    fn near_duplicates_are_not_detected() {
        let existing = vec![Contact::new("Ana").with_email("ana@example.org")];
        let incoming = vec![Contact::new("Ana").with_email("ANA@example.org")];

        let merge = merge_contacts(&existing, incoming);
        assert_eq!(merge.added.len(), 1);
    }

    #[test]
    fn duplicates_within_batch_are_skipped() {
        let incoming = vec![
            Contact::new("A").with_email("same@example.org"),
            Contact::new("B").with_email("same@example.org"),
        ];

        let merge = merge_contacts(&[], incoming);
        assert_eq!(merge.added.len(), 1);
        assert_eq!(merge.skipped.len(), 1);
    }

    #[test]
    fn contacts_without_email_always_added() {
        let existing = vec![Contact::new("Ana")];
        let incoming = vec![Contact::new("Ana"), Contact::new("Ana")];

        let merge = merge_contacts(&existing, incoming);
        assert_eq!(merge.added.len(), 2);
        assert!(merge.skipped.is_empty());
    }
}
