//! Command registry for dispatching requests by command code.
//!
//! The registry maps command codes to answer builders and carries one
//! designated default entry for unsupported codes. Adding a command means
//! registering a new entry, not branching on the code. Dispatch applies the
//! engine's recovery policy: a handler that fails (for example on a missing
//! AVP) is escalated to the generic error answer, never a crash.

use std::collections::HashMap;

use crate::error::Result;
use crate::handler::answers::{CapabilityExchange, DeviceWatchdog, UnableToComply};
use crate::handler::PeerContext;
use crate::protocol::constants::command;
use crate::protocol::Message;

/// An answer builder for one command code.
///
/// Handlers are synchronous, pure functions of the request and the
/// connection identity; they must not block on other connections.
pub trait CommandHandler: Send + Sync {
    /// Build the answer for a request.
    fn build_answer(&self, request: &Message, ctx: &PeerContext) -> Result<Message>;

    /// Whether this command is only valid once the capability exchange has
    /// completed. Commands dispatched earlier fall through to the default
    /// handler.
    fn requires_established(&self) -> bool {
        true
    }
}

/// Registry mapping command codes to handlers.
pub struct CommandRegistry {
    handlers: HashMap<u32, Box<dyn CommandHandler>>,
    default: Box<dyn CommandHandler>,
}

impl CommandRegistry {
    /// Create a registry with only the given default handler.
    pub fn new(default: Box<dyn CommandHandler>) -> Self {
        Self {
            handlers: HashMap::new(),
            default,
        }
    }

    /// Create the base-protocol registry: Capability-Exchange and
    /// Device-Watchdog handlers plus the Unable-To-Comply default.
    pub fn base() -> Self {
        let mut registry = Self::new(Box::new(UnableToComply));
        registry.register(command::CAPABILITY_EXCHANGE, Box::new(CapabilityExchange));
        registry.register(command::DEVICE_WATCHDOG, Box::new(DeviceWatchdog));
        registry
    }

    /// Register a handler for a command code, replacing any existing entry.
    pub fn register(&mut self, command_code: u32, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(command_code, handler);
    }

    /// Check whether a dedicated handler exists for a command code.
    pub fn contains(&self, command_code: u32) -> bool {
        self.handlers.contains_key(&command_code)
    }

    /// Get the handler for a command code, or the default entry.
    pub fn get(&self, command_code: u32) -> &dyn CommandHandler {
        self.handlers
            .get(&command_code)
            .map(Box::as_ref)
            .unwrap_or(self.default.as_ref())
    }

    /// The designated default handler.
    pub fn default_handler(&self) -> &dyn CommandHandler {
        self.default.as_ref()
    }

    /// Dispatch a request to its handler and build the answer.
    ///
    /// `established` reflects the connection state machine. Requests that
    /// carry an unrecognized mandatory AVP, hit an unregistered command
    /// code, arrive before the handshake for commands that need it, or whose
    /// handler fails, all produce the default (generic error) answer.
    pub fn dispatch(
        &self,
        request: &Message,
        ctx: &PeerContext,
        established: bool,
    ) -> Result<Message> {
        let dict = ctx.dictionary.as_ref();
        let code = request.command_code();

        if request
            .avps
            .iter()
            .any(|avp| avp.is_mandatory() && avp.is_unrecognized(dict))
        {
            tracing::warn!(
                command_code = code,
                "request carries an unrecognized mandatory AVP"
            );
            return self.default.build_answer(request, ctx);
        }

        let handler = match self.handlers.get(&code) {
            Some(handler) if established || !handler.requires_established() => handler.as_ref(),
            Some(_) => {
                tracing::warn!(
                    command_code = code,
                    "command not valid before capability exchange"
                );
                self.default.as_ref()
            }
            None => {
                tracing::warn!(command_code = code, "unsupported command code");
                self.default.as_ref()
            }
        };

        match handler.build_answer(request, ctx) {
            Ok(answer) => Ok(answer),
            Err(error) => {
                tracing::warn!(
                    command_code = code,
                    %error,
                    "handler failed, answering with generic error"
                );
                self.default.build_answer(request, ctx)
            }
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::base()
    }
}
