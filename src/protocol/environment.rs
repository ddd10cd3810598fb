//! Session-scoped decoding environment

use std::sync::Arc;

use tracing::{info, warn};

use super::keystore::{Keystore, KeystoreSource};
use super::registry::ProtocolRegistry;
use crate::error::KeystoreError;

/// Registry plus auxiliary key material shared with every decoder
#[derive(Debug, Clone)]
pub struct DecodingEnvironment {
    registry: Arc<ProtocolRegistry>,
    keystores: Vec<Arc<Keystore>>,
}

impl DecodingEnvironment {
    pub fn new(registry: Arc<ProtocolRegistry>) -> Self {
        Self {
            registry,
            keystores: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    /// Load a keystore and make it available to decoders.
    ///
    /// A failure is returned for the caller to report; the environment stays
    /// usable and decoders depending on the keystore never complete a frame.
    pub fn attach_keystore(&mut self, source: &dyn KeystoreSource) -> Result<(), KeystoreError> {
        match source.load() {
            Ok(keystore) => {
                info!(
                    "Keystore '{}' attached ({} keys)",
                    keystore.name(),
                    keystore.len()
                );
                self.keystores.push(Arc::new(keystore));
                Ok(())
            }
            Err(e) => {
                warn!("{}", e);
                Err(e)
            }
        }
    }

    /// Keystore by name (first attached wins)
    pub fn keystore(&self, name: &str) -> Option<Arc<Keystore>> {
        self.keystores.iter().find(|k| k.name() == name).cloned()
    }

    pub fn keystores(&self) -> &[Arc<Keystore>] {
        &self.keystores
    }
}
