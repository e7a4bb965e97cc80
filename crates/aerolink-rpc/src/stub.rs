//! In-process simulator doubles for headless tests and CI.
//!
//! [`StubClient`] implements [`SimClient`] entirely in memory: it records
//! every call, integrates commanded motion into a plausible kinematic state,
//! and supports fault injection so tests can script conflict errors, dead
//! sessions, and malformed capture buffers. [`StubFactory`] is the matching
//! [`SimClientFactory`] for the connection layer.
//!
//! # Example
//!
//! ```rust
//! use aerolink_rpc::{SimClient, StubClient};
//! use aerolink_types::Vec3;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let client = StubClient::new();
//! client.takeoff().await.expect("stub takeoff must succeed");
//! client.move_by_velocity(Vec3::new(5.0, 0.0, 0.0), 2.0).await.unwrap();
//! assert!((client.position().x - 10.0).abs() < f32::EPSILON);
//! # });
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use aerolink_types::{AeroError, Pose, Quaternion, Vec3};
use async_trait::async_trait;

use crate::client::{RawImage, SimClient, SimClientFactory};

/// Altitude (NED z, metres) the stub climbs to on takeoff.
const TAKEOFF_ALTITUDE: f32 = -3.0;

/// Default frame dimensions for unscripted captures.
const DEFAULT_FRAME_W: u32 = 32;
const DEFAULT_FRAME_H: u32 = 24;

// ────────────────────────────────────────────────────────────────────────────
// StubClient
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct StubState {
    position: Vec3,
    yaw_deg: f32,
    armed: bool,
    api_control: bool,
    airborne: bool,
    calls: Vec<String>,
    async_fault: Option<AeroError>,
    positional_fault: Option<AeroError>,
    ping_fault: bool,
    frames: VecDeque<Result<RawImage, AeroError>>,
}

/// A simulated vehicle session that records commands and returns plausible
/// kinematic state. All calls succeed unless a fault has been injected.
#[derive(Debug, Default)]
pub struct StubClient {
    state: Mutex<StubState>,
}

impl StubClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every async motion primitive fail with the event-loop conflict
    /// until [`clear_faults`][Self::clear_faults] is called. The positional
    /// path stays healthy.
    pub fn inject_async_conflict(&self) {
        self.state.lock().unwrap().async_fault = Some(AeroError::AsyncConflict(
            "event loop is already running".to_string(),
        ));
    }

    /// Make every async motion primitive fail with `err`.
    pub fn inject_async_fault(&self, err: AeroError) {
        self.state.lock().unwrap().async_fault = Some(err);
    }

    /// Make the positional primitives fail with `err`.
    pub fn inject_positional_fault(&self, err: AeroError) {
        self.state.lock().unwrap().positional_fault = Some(err);
    }

    /// Make [`SimClient::ping`] report a dead session.
    pub fn set_ping_dead(&self, dead: bool) {
        self.state.lock().unwrap().ping_fault = dead;
    }

    /// Queue one scripted capture outcome. Scripted outcomes are consumed in
    /// FIFO order; once exhausted, captures return the default test pattern.
    pub fn push_frame(&self, outcome: Result<RawImage, AeroError>) {
        self.state.lock().unwrap().frames.push_back(outcome);
    }

    /// Remove all injected faults (scripted frames are kept).
    pub fn clear_faults(&self) {
        let mut s = self.state.lock().unwrap();
        s.async_fault = None;
        s.positional_fault = None;
        s.ping_fault = false;
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Current simulated position.
    pub fn position(&self) -> Vec3 {
        self.state.lock().unwrap().position
    }

    /// Current simulated heading in degrees, normalized to [−180, 180].
    pub fn yaw_deg(&self) -> f32 {
        self.state.lock().unwrap().yaw_deg
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().unwrap().armed
    }

    pub fn has_api_control(&self) -> bool {
        self.state.lock().unwrap().api_control
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }

    fn take_async_fault(&self) -> Option<AeroError> {
        self.state.lock().unwrap().async_fault.clone()
    }

    fn take_positional_fault(&self) -> Option<AeroError> {
        self.state.lock().unwrap().positional_fault.clone()
    }
}

fn normalize_deg(mut deg: f32) -> f32 {
    while deg > 180.0 {
        deg -= 360.0;
    }
    while deg < -180.0 {
        deg += 360.0;
    }
    deg
}

fn quat_from_yaw_deg(yaw_deg: f32) -> Quaternion {
    let half = yaw_deg.to_radians() / 2.0;
    Quaternion {
        w: half.cos(),
        x: 0.0,
        y: 0.0,
        z: half.sin(),
    }
}

/// Flat mid-grey RGBA test pattern.
fn default_frame() -> RawImage {
    RawImage {
        width: DEFAULT_FRAME_W,
        height: DEFAULT_FRAME_H,
        data: vec![0x80; (DEFAULT_FRAME_W * DEFAULT_FRAME_H * 4) as usize],
    }
}

#[async_trait]
impl SimClient for StubClient {
    async fn ping(&self) -> Result<(), AeroError> {
        self.record("ping");
        if self.state.lock().unwrap().ping_fault {
            return Err(AeroError::Connection("stub session is dead".to_string()));
        }
        Ok(())
    }

    async fn enable_api_control(&self, enabled: bool) -> Result<(), AeroError> {
        self.record(format!("enable_api_control({enabled})"));
        self.state.lock().unwrap().api_control = enabled;
        Ok(())
    }

    async fn arm_disarm(&self, arm: bool) -> Result<(), AeroError> {
        self.record(format!("arm_disarm({arm})"));
        self.state.lock().unwrap().armed = arm;
        Ok(())
    }

    async fn takeoff(&self) -> Result<(), AeroError> {
        self.record("takeoff");
        if let Some(err) = self.take_async_fault() {
            return Err(err);
        }
        let mut s = self.state.lock().unwrap();
        s.airborne = true;
        s.position.z = TAKEOFF_ALTITUDE;
        Ok(())
    }

    async fn land(&self) -> Result<(), AeroError> {
        self.record("land");
        if let Some(err) = self.take_async_fault() {
            return Err(err);
        }
        let mut s = self.state.lock().unwrap();
        s.airborne = false;
        s.position.z = 0.0;
        Ok(())
    }

    async fn move_by_velocity(&self, velocity: Vec3, duration: f32) -> Result<(), AeroError> {
        self.record(format!(
            "move_by_velocity({},{},{},{duration})",
            velocity.x, velocity.y, velocity.z
        ));
        if let Some(err) = self.take_async_fault() {
            return Err(err);
        }
        let mut s = self.state.lock().unwrap();
        s.position = s.position.advanced_by(velocity, duration);
        Ok(())
    }

    async fn rotate_by_yaw_rate(&self, yaw_rate_deg: f32, duration: f32) -> Result<(), AeroError> {
        self.record(format!("rotate_by_yaw_rate({yaw_rate_deg},{duration})"));
        if let Some(err) = self.take_async_fault() {
            return Err(err);
        }
        let mut s = self.state.lock().unwrap();
        s.yaw_deg = normalize_deg(s.yaw_deg + yaw_rate_deg * duration);
        Ok(())
    }

    async fn hover(&self) -> Result<(), AeroError> {
        self.record("hover");
        if let Some(err) = self.take_async_fault() {
            return Err(err);
        }
        Ok(())
    }

    async fn move_to_position(&self, target: Vec3, velocity: f32) -> Result<(), AeroError> {
        self.record(format!(
            "move_to_position({},{},{},{velocity})",
            target.x, target.y, target.z
        ));
        if let Some(err) = self.take_positional_fault() {
            return Err(err);
        }
        self.state.lock().unwrap().position = target;
        Ok(())
    }

    async fn rotate_to_yaw(&self, yaw_deg: f32) -> Result<(), AeroError> {
        self.record(format!("rotate_to_yaw({yaw_deg})"));
        if let Some(err) = self.take_positional_fault() {
            return Err(err);
        }
        self.state.lock().unwrap().yaw_deg = normalize_deg(yaw_deg);
        Ok(())
    }

    async fn get_pose(&self) -> Result<Pose, AeroError> {
        self.record("get_pose");
        let s = self.state.lock().unwrap();
        Ok(Pose {
            position: s.position,
            orientation: quat_from_yaw_deg(s.yaw_deg),
        })
    }

    async fn capture_image(&self) -> Result<RawImage, AeroError> {
        self.record("capture_image");
        let scripted = self.state.lock().unwrap().frames.pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => Ok(default_frame()),
        }
    }

    async fn reset(&self) -> Result<(), AeroError> {
        self.record("reset");
        let mut s = self.state.lock().unwrap();
        s.position = Vec3::default();
        s.yaw_deg = 0.0;
        s.airborne = false;
        s.armed = false;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// StubFactory
// ────────────────────────────────────────────────────────────────────────────

/// [`SimClientFactory`] double. By default every dial hands out a fresh
/// [`StubClient`]; [`with_client`][Self::with_client] pins a shared instance
/// so tests can inject faults before the connection layer dials.
#[derive(Default)]
pub struct StubFactory {
    refuse: AtomicBool,
    dials: AtomicUsize,
    pinned: Mutex<Option<Arc<StubClient>>>,
    last_host: Mutex<Option<String>>,
}

impl StubFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A factory that always hands out `client`.
    pub fn with_client(client: Arc<StubClient>) -> Arc<Self> {
        let factory = Self::default();
        *factory.pinned.lock().unwrap() = Some(client);
        Arc::new(factory)
    }

    /// A factory whose dials all fail, for connect-failure tests.
    pub fn refusing() -> Arc<Self> {
        let factory = Self::default();
        factory.refuse.store(true, Ordering::SeqCst);
        Arc::new(factory)
    }

    /// Toggle dial refusal at runtime, for reconnect-failure tests.
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of dial attempts so far.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Host passed to the most recent dial.
    pub fn last_host(&self) -> Option<String> {
        self.last_host.lock().unwrap().clone()
    }
}

#[async_trait]
impl SimClientFactory for StubFactory {
    async fn dial(&self, host: &str, port: u16) -> Result<Arc<dyn SimClient>, AeroError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        *self.last_host.lock().unwrap() = Some(host.to_string());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(AeroError::Connection(format!(
                "stub factory refused dial to {host}:{port}"
            )));
        }
        let client = match self.pinned.lock().unwrap().clone() {
            Some(pinned) => pinned,
            None => StubClient::new(),
        };
        Ok(client)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
