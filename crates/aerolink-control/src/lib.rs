//! `aerolink-control` – the vehicle command executor.
//!
//! # Modules
//!
//! - [`executor`] – [`CommandExecutor`][executor::CommandExecutor]: owns the
//!   vehicle lifecycle state and dispatches [`Command`][aerolink_types::Command]
//!   intents through the shared connection, applying the dual-strategy
//!   execution policy (async primitive first, deterministic positional
//!   fallback on the event-loop conflict) and an unconditional
//!   stabilization step after every motion.
//! - [`interpret`] – the [`IntentClassifier`][interpret::IntentClassifier]
//!   contract and the confidence gate that maps free text onto the closed
//!   command set. The classifier itself is an external collaborator; only
//!   the gating glue lives here.

pub mod executor;
pub mod interpret;

pub use executor::CommandExecutor;
pub use interpret::{CONFIDENCE_THRESHOLD, IntentClassifier, interpret};
