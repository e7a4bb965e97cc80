//! `aerolink-net` – endpoint discovery and the shared simulator connection.
//!
//! # Modules
//!
//! - [`resolver`] – [`EndpointResolver`][resolver::EndpointResolver]:
//!   finds a reachable simulator host without manual configuration.
//!   Explicit override wins; otherwise guest-hosted Linux environments
//!   (WSL-style) are detected and the host side is located by probing the
//!   upstream resolver address, the default-route gateway, and a
//!   configurable static fallback list with short-timeout TCP connects.
//!   Resolution never fails — it degrades to a best-guess address and lets
//!   the connect attempt produce the user-facing error.
//! - [`connection`] – [`Connection`][connection::Connection]: the one
//!   process-wide connection state (host, fixed port, `connected` flag,
//!   swappable client handle). Connect dials through a
//!   [`SimClientFactory`][aerolink_rpc::SimClientFactory] and confirms RPC
//!   liveness with a ping before marking the link up; reconnect replaces
//!   the handle wholesale only on success.

pub mod connection;
pub mod resolver;

pub use connection::Connection;
pub use resolver::{EndpointResolver, SIM_PORT, test_connectivity};
