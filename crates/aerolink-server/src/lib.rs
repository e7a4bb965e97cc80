//! `aerolink-server` – HTTP surface for commands and the live video feed.
//!
//! Listens on `0.0.0.0:5000` (configurable via [`ApiServer::with_port`]).
//!
//! | Route | Behavior |
//! |---|---|
//! | `GET /` | Health/info JSON: connectivity, vehicle flags, stream counters. |
//! | `POST /command` | JSON `{"command": "..."}` → [`CommandResult`][aerolink_types::CommandResult] JSON. |
//! | `GET /video_feed` | `multipart/x-mixed-replace` MJPEG stream. |
//!
//! HTTP/1.1 is spoken directly over [`tokio::net::TcpListener`], one task
//! per connection — the unbounded `/video_feed` response does not fit a
//! framework's request/response model anyway.

pub mod server;

pub use server::{ApiServer, DEFAULT_PORT};
