pub mod value;
pub mod host;
pub mod error;
pub mod config;
pub mod script_log;
pub mod script_diagnostics;

// Bridge
pub mod ports;
pub mod capabilities;
pub mod engine;
pub mod dispatch;
pub mod platform;
pub mod instance;

pub mod cli;

pub use config::BridgeConfig;
pub use dispatch::HostEvent;
pub use error::BridgeError;
pub use host::{Host, PortHandle, PortKind};
pub use instance::{Instance, SaveStatus, SourceInfo};
pub use platform::Platform;
pub use value::TypedValue;
