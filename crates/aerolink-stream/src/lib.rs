//! `aerolink-stream` – the frame stream pipeline.
//!
//! Produces a continuous, lazy sequence of JPEG frames for a live viewer,
//! self-healing across transient capture failures. The simulator's capture
//! call intermittently returns empty or malformed buffers; the pipeline
//! contains those failures completely (the consumer sees occasional gaps,
//! nothing else) until a run of consecutive failures trips the circuit
//! breaker and the stream ends.
//!
//! # Modules
//!
//! - [`frame`] – buffer classification (RGBA / RGB / greyscale by length)
//!   and JPEG encoding. Total: returns `None` on anything unexpected.
//! - [`pipeline`] – [`FramePipeline`][pipeline::FramePipeline]: a
//!   tick-driven producer task feeding a bounded channel, with the
//!   consecutive-failure breaker, the stale-connection liveness refresh,
//!   and [`StreamHealth`][pipeline::StreamHealth] diagnostics.

pub mod frame;
pub mod pipeline;

pub use frame::encode_jpeg;
pub use pipeline::{FramePipeline, StreamConfig, StreamHealth};
