//! `aerolink-rpc` – the simulator-client seam.
//!
//! The rest of the stack only ever talks to the [`SimClient`] trait, so the
//! concrete RPC transport can be swapped without touching command or
//! streaming logic. [`SimClientFactory`] is the dial seam the connection
//! layer uses to open sessions against a resolved host.
//!
//! [`stub`] provides in-process doubles ([`StubClient`], [`StubFactory`])
//! that record calls, return plausible kinematic state, and support fault
//! injection, so the full stack runs in headless tests and CI without a
//! simulator.

pub mod client;
pub mod stub;

pub use client::{RawImage, SimClient, SimClientFactory};
pub use stub::{StubClient, StubFactory};
