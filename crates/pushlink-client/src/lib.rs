//! # pushlink-client
//!
//! Long-connection client for the open platform event gateway.
//!
//! - [`EndpointClient`] exchanges app credentials for a connect URL and a
//!   [`ConnectPolicy`]
//! - [`ConnectionSession`] runs one socket: pings, chunk reassembly, acks
//! - [`Supervisor`] keeps a session alive across drops, within the server's
//!   reconnect budget
//!
//! Decoded events reach user code through [`EventDispatcher`], on detached
//! tasks. All waits race a shared `CancellationToken`.

#![deny(unsafe_code)]

pub mod chunks;
pub mod dispatch;
pub mod endpoint;
pub mod errors;
pub mod policy;
pub mod session;
pub mod supervisor;

pub use dispatch::{DispatchContext, DispatchHandle, EventDispatcher, InboundStatus, StatusSink};
pub use endpoint::{Credentials, EndpointClient};
pub use errors::{ConnectionError, EndpointError};
pub use policy::{ConnectPolicy, ReconnectBudget};
pub use session::{ConnectionSession, SessionEnd, SessionOptions};
pub use supervisor::{ClientOptions, Supervisor, SupervisorExit};
