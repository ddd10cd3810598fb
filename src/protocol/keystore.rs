//! Manufacturer key material consumed by dynamic-code decoders
//!
//! The pipeline never parses key files itself. A [`KeystoreSource`] is an
//! opaque handle supplied by the caller; the environment only asks it to
//! produce a [`Keystore`].

use crate::error::KeystoreError;

/// One manufacturer key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub key: u64,
    pub kind: u16,
    pub name: String,
}

/// Loaded, read-only key table
#[derive(Debug, Clone, Default)]
pub struct Keystore {
    name: String,
    entries: Vec<KeyEntry>,
}

impl Keystore {
    pub fn new(name: impl Into<String>, entries: Vec<KeyEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    /// Find the entry for a key value
    pub fn lookup(&self, key: u64) -> Option<&KeyEntry> {
        self.entries.iter().find(|e| e.key == key)
    }
}

/// Something that can produce a keystore on demand
pub trait KeystoreSource {
    /// Name decoders use to find the keystore
    fn name(&self) -> &str;

    fn load(&self) -> Result<Keystore, KeystoreError>;
}

/// In-memory keystore source
#[derive(Debug, Clone)]
pub struct StaticKeystore {
    name: String,
    entries: Vec<KeyEntry>,
}

impl StaticKeystore {
    pub fn new(name: impl Into<String>, entries: Vec<KeyEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }
}

impl KeystoreSource for StaticKeystore {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Keystore, KeystoreError> {
        if self.entries.is_empty() {
            return Err(KeystoreError::Unavailable {
                name: self.name.clone(),
                reason: "no key entries".to_string(),
            });
        }
        Ok(Keystore::new(self.name.clone(), self.entries.clone()))
    }
}
