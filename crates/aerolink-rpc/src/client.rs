//! [`SimClient`] and [`SimClientFactory`] – the vehicle-control RPC contract.

use std::sync::Arc;

use aerolink_types::{AeroError, Pose, Vec3};
use async_trait::async_trait;

/// A raw image returned by the simulator's capture call.
///
/// `data` is an unstructured byte buffer; the stream pipeline classifies it
/// by length against `height * width * {4, 3, 1}`. The simulator is known to
/// intermittently return empty or undersized buffers, so consumers must not
/// assume the length matches the reported dimensions.
#[derive(Debug, Clone)]
pub struct RawImage {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data (RGBA, RGB, or greyscale — or garbage).
    pub data: Vec<u8>,
}

/// One live session against the simulator's vehicle-control service.
///
/// The handle is a single shared resource under the simulator's
/// single-active-session contract: issuing two overlapping motion primitives
/// concurrently is undefined behavior on the remote side, so the command
/// executor serializes them. The capture and state calls are short and may
/// run concurrently with a motion call.
///
/// The motion primitives (`takeoff` … `hover`) are the simulator's
/// asynchronous path: each resolves when the maneuver completes, and each
/// may fail with [`AeroError::AsyncConflict`] when invoked from a call
/// context the remote's event machinery rejects. The positional primitives
/// (`move_to_position`, `rotate_to_yaw`) are the deterministic synchronous
/// path used as the fallback; they never raise the conflict.
#[async_trait]
pub trait SimClient: Send + Sync + std::fmt::Debug {
    /// Lightweight liveness round-trip, cheaper than a full state query.
    ///
    /// # Errors
    ///
    /// Returns [`AeroError::Connection`] when the session is dead.
    async fn ping(&self) -> Result<(), AeroError>;

    /// Grant or revoke API control over the vehicle.
    async fn enable_api_control(&self, enabled: bool) -> Result<(), AeroError>;

    /// Arm (`true`) or disarm (`false`) the vehicle.
    async fn arm_disarm(&self, arm: bool) -> Result<(), AeroError>;

    /// Take off and climb to the default hover altitude.
    async fn takeoff(&self) -> Result<(), AeroError>;

    /// Descend and land at the current position.
    async fn land(&self) -> Result<(), AeroError>;

    /// Fly at `velocity` (NED, m/s) for `duration` seconds.
    async fn move_by_velocity(&self, velocity: Vec3, duration: f32) -> Result<(), AeroError>;

    /// Rotate in place at `yaw_rate_deg` degrees/second for `duration` seconds.
    async fn rotate_by_yaw_rate(&self, yaw_rate_deg: f32, duration: f32) -> Result<(), AeroError>;

    /// Hold the current position.
    async fn hover(&self) -> Result<(), AeroError>;

    /// Move to an absolute NED position at `velocity` m/s. Synchronous
    /// positional path; never raises the conflict signature.
    async fn move_to_position(&self, target: Vec3, velocity: f32) -> Result<(), AeroError>;

    /// Rotate to an absolute heading in degrees. Synchronous positional
    /// path; never raises the conflict signature.
    async fn rotate_to_yaw(&self, yaw_deg: f32) -> Result<(), AeroError>;

    /// Current kinematic estimate (position + orientation).
    async fn get_pose(&self) -> Result<Pose, AeroError>;

    /// Capture one frame from the front camera.
    ///
    /// # Errors
    ///
    /// Returns [`AeroError::Capture`] when no frame is available. A returned
    /// [`RawImage`] may still carry a malformed buffer.
    async fn capture_image(&self) -> Result<RawImage, AeroError>;

    /// Reset the vehicle to its spawn state.
    async fn reset(&self) -> Result<(), AeroError>;
}

/// Opens [`SimClient`] sessions against a resolved endpoint.
///
/// The connection layer owns resolution and liveness confirmation; the
/// factory only dials. A successful dial does not imply the RPC service is
/// alive — the connection layer follows up with [`SimClient::ping`].
#[async_trait]
pub trait SimClientFactory: Send + Sync {
    /// Open a session against `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`AeroError::Connection`] when the transport cannot be
    /// established.
    async fn dial(&self, host: &str, port: u16) -> Result<Arc<dyn SimClient>, AeroError>;
}
