//! Peer context passed to command handlers.

use std::sync::Arc;

use crate::dictionary::Dictionary;

/// Connection identity handed to every handler invocation.
///
/// Handlers are pure functions of (request, context); the context carries
/// the local identity the answers advertise and the shared read-only
/// dictionary. Cloning is cheap, the dictionary is behind an `Arc`.
#[derive(Clone)]
pub struct PeerContext {
    /// Local Origin-Host advertised in answers.
    pub origin_host: String,
    /// Local Origin-Realm advertised in answers.
    pub origin_realm: String,
    /// Shared AVP dictionary.
    pub dictionary: Arc<Dictionary>,
}

impl PeerContext {
    /// Create a new peer context.
    pub fn new(
        origin_host: impl Into<String>,
        origin_realm: impl Into<String>,
        dictionary: Arc<Dictionary>,
    ) -> Self {
        Self {
            origin_host: origin_host.into(),
            origin_realm: origin_realm.into(),
            dictionary,
        }
    }
}
