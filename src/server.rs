//! Diameter server: accept loop spawning one connection driver per peer.
//!
//! The server owns the listening socket, the shared dictionary and the
//! command registry. Each accepted connection runs in its own task; the
//! only state shared across connections is read-only, so no locking is
//! needed between them.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, ToSocketAddrs};

use crate::connection::{serve_connection, ConnectionConfig};
use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::handler::{CommandHandler, CommandRegistry, PeerContext};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Origin-Host advertised in answers.
    pub origin_host: String,
    /// Origin-Realm advertised in answers.
    pub origin_realm: String,
    /// Per-connection read buffer size.
    pub read_buffer_size: usize,
    /// Maximum accepted message length.
    pub max_message_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        Self {
            origin_host: "server.asn.test".to_string(),
            origin_realm: "asn.test".to_string(),
            read_buffer_size: connection.read_buffer_size,
            max_message_size: connection.max_message_size,
        }
    }
}

/// A bound Diameter server.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use diameter_engine::{Dictionary, DiameterServer, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let dictionary = Arc::new(Dictionary::base());
///     let server =
///         DiameterServer::bind("127.0.0.1:3868", ServerConfig::default(), dictionary).await?;
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct DiameterServer {
    listener: TcpListener,
    config: ServerConfig,
    dictionary: Arc<Dictionary>,
    registry: Arc<CommandRegistry>,
}

impl DiameterServer {
    /// Bind the listening socket. The registry starts with the base command
    /// set: Capability-Exchange, Device-Watchdog and the Unable-To-Comply
    /// default.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        config: ServerConfig,
        dictionary: Arc<Dictionary>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            config,
            dictionary,
            registry: Arc::new(CommandRegistry::base()),
        })
    }

    /// Local address of the listening socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Register an additional command handler. Only possible before the
    /// accept loop starts; later calls are ignored once connection tasks
    /// hold the registry.
    pub fn register_handler(&mut self, command_code: u32, handler: Box<dyn CommandHandler>) {
        if let Some(registry) = Arc::get_mut(&mut self.registry) {
            registry.register(command_code, handler);
        }
    }

    /// Run the accept loop, spawning one task per connection.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            origin_host = %self.config.origin_host,
            local_addr = ?self.listener.local_addr(),
            "server listening"
        );

        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            tracing::info!(%peer_addr, "peer connected");

            let ctx = PeerContext::new(
                self.config.origin_host.clone(),
                self.config.origin_realm.clone(),
                self.dictionary.clone(),
            );
            let registry = self.registry.clone();
            let connection_config = ConnectionConfig {
                read_buffer_size: self.config.read_buffer_size,
                max_message_size: self.config.max_message_size,
            };

            tokio::spawn(async move {
                match serve_connection(stream, ctx, registry, connection_config).await {
                    Ok(()) => tracing::info!(%peer_addr, "peer disconnected"),
                    Err(error) => tracing::warn!(%peer_addr, %error, "connection failed"),
                }
            });
        }
    }
}
