use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{SecretError, SecretKey, SecretStore};

/// Process-local secret store.
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// a session wrote through its own copy.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<SecretKey, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl SecretStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn store(&self, key: &SecretKey, value: &str) -> Result<(), SecretError> {
        self.entries
            .borrow_mut()
            .insert(key.clone(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &SecretKey) -> Result<Option<String>, SecretError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn clear(&self, key: &SecretKey) -> Result<(), SecretError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
