//! Contacts and call scripts
//!
//! Both are owned by other services; this crate only reads them when a call
//! is created.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::types::{CallScript, Contact};
use crate::Result;

/// Read access to an owner's contacts and scripts
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn get_contact(&self, owner_id: &str, contact_id: &str) -> Result<Option<Contact>>;

    async fn get_script(&self, owner_id: &str, script_id: &str) -> Result<Option<CallScript>>;
}

/// In-memory directory
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    contacts: Arc<RwLock<HashMap<String, Contact>>>,
    scripts: Arc<RwLock<HashMap<String, CallScript>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_contact(&self, contact: Contact) {
        self.contacts.write().insert(contact.id.clone(), contact);
    }

    pub fn add_script(&self, script: CallScript) {
        self.scripts.write().insert(script.id.clone(), script);
    }
}

#[async_trait]
impl ContactDirectory for MemoryDirectory {
    async fn get_contact(&self, owner_id: &str, contact_id: &str) -> Result<Option<Contact>> {
        Ok(self
            .contacts
            .read()
            .get(contact_id)
            .filter(|c| c.owner_id == owner_id)
            .cloned())
    }

    async fn get_script(&self, owner_id: &str, script_id: &str) -> Result<Option<CallScript>> {
        Ok(self
            .scripts
            .read()
            .get(script_id)
            .filter(|s| s.owner_id == owner_id)
            .cloned())
    }
}
