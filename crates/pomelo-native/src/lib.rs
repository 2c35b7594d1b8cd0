//! Native side of the pomelo client bridge
//!
//! This crate is the fixed interface the Lua bridge (`pomelo-lua`) consumes:
//!
//! - [`NativeClient`]: connect/disconnect, request/notify with timeout,
//!   state and quality queries, and a poll step that hands over buffered
//!   events and completions
//! - [`ResultCode`] / [`ClientState`]: native codes and their short names
//! - [`ClientConfig`] / [`LibOptions`]: per-client and library configuration
//! - [`TransportRegistry`]: transport selector to client factory
//! - [`dummy`]: the in-process loopback transport (`DUMMY`)
//!
//! Wire encoding, TCP/TLS transports and reconnection policy are provided by
//! whatever implements [`NativeClient`] for those selectors.

mod client;
mod codes;
mod config;
pub mod dummy;
mod error;
mod event;
mod transport;

pub use client::NativeClient;
pub use codes::{ClientState, ResultCode};
pub use config::{ClientConfig, LibOptions, LogLevel, RetryLimit, TransportSelector};
pub use dummy::{DummyClient, DummyHub, DummyRemote, Reply, SentKind, SentMessage};
pub use error::ConfigError;
pub use event::{Completion, Delivery, NativeEvent, Timeout, Token, WITHOUT_TIMEOUT};
pub use transport::{TransportFactory, TransportRegistry};

/// Version string reported to scripts.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
