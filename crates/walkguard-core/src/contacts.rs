//! Trusted-contact read interface.
//!
//! Contact lists are owned by an external collaborator; the engine only
//! reads them at dispatch time, in insertion order. The dispatcher takes a
//! `ContactDirectory` trait object so tests and alternative stores plug in
//! behind the same seam.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::Database;

/// A contact eligible to receive emergency notifications for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedContact {
    pub id: i64,
    pub user_id: i64,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

/// Read access to a user's trusted contacts.
pub trait ContactDirectory: Send + Sync {
    /// The user's contacts in insertion order. Phone uniqueness per user is
    /// the owning collaborator's responsibility.
    fn trusted_contacts(&self, user_id: i64) -> Result<Vec<TrustedContact>>;
}

/// Directory backed by the walkguard database.
pub struct SqliteContactDirectory {
    db: Arc<Mutex<Database>>,
}

impl SqliteContactDirectory {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

impl ContactDirectory for SqliteContactDirectory {
    fn trusted_contacts(&self, user_id: i64) -> Result<Vec<TrustedContact>> {
        let db = self.db.lock().unwrap();
        Ok(db.trusted_contacts(user_id)?)
    }
}

/// Fixed in-memory directory for tests.
pub struct StaticContactDirectory {
    contacts: Vec<TrustedContact>,
}

impl StaticContactDirectory {
    pub fn new(user_id: i64, phones: &[&str]) -> Self {
        let now = Utc::now();
        let contacts = phones
            .iter()
            .enumerate()
            .map(|(i, phone)| TrustedContact {
                id: i as i64 + 1,
                user_id,
                phone: (*phone).to_string(),
                created_at: now,
            })
            .collect();
        Self { contacts }
    }

    pub fn empty() -> Self {
        Self {
            contacts: Vec::new(),
        }
    }
}

impl ContactDirectory for StaticContactDirectory {
    fn trusted_contacts(&self, user_id: i64) -> Result<Vec<TrustedContact>> {
        Ok(self
            .contacts
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_directory_reads_in_insertion_order() {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        {
            let guard = db.lock().unwrap();
            guard.insert_contact(1, "+15550002", Utc::now()).unwrap();
            guard.insert_contact(1, "+15550001", Utc::now()).unwrap();
        }
        let directory = SqliteContactDirectory::new(db);
        let contacts = directory.trusted_contacts(1).unwrap();
        let phones: Vec<_> = contacts.iter().map(|c| c.phone.as_str()).collect();
        assert_eq!(phones, vec!["+15550002", "+15550001"]);
    }

    #[test]
    fn static_directory_filters_by_user() {
        let directory = StaticContactDirectory::new(7, &["+15550001"]);
        assert_eq!(directory.trusted_contacts(7).unwrap().len(), 1);
        assert!(directory.trusted_contacts(8).unwrap().is_empty());
    }
}
