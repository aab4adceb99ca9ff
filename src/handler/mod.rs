//! Handler module: command dispatch and answer construction.
//!
//! Provides:
//! - [`CommandRegistry`] - maps command codes to answer builders
//! - [`PeerContext`] - local identity and dictionary handed to handlers
//! - the base command set: Capability-Exchange, Device-Watchdog and the
//!   Unable-To-Comply default

mod answers;
mod context;
mod registry;

pub use answers::{generic_answer, CapabilityExchange, DeviceWatchdog, UnableToComply};
pub use context::PeerContext;
pub use registry::{CommandHandler, CommandRegistry};
