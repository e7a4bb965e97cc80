use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error message fragment emitted by RPC transports whose async primitives
/// cannot run because an event-processing loop is already active in the
/// calling context. Transports that can report the condition structurally
/// should return [`AeroError::AsyncConflict`] instead; matching on this
/// string is kept as a compatibility shim for the ones that cannot.
pub const CONFLICT_SIGNATURE: &str = "event loop is already running";

/// Closed set of vehicle intents the executor understands.
///
/// Motion parameters (velocity components, yaw rate, duration) are baked
/// into the executor's dispatch table; callers only name the intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Initialize,
    TakeOff,
    Land,
    MoveForward,
    MoveBack,
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    RotateLeft,
    RotateRight,
    Hover,
    GetStatus,
    Reset,
}

impl Command {
    /// Every command, in declaration order. This is also the label set
    /// handed to the intent classifier.
    pub const ALL: [Command; 14] = [
        Command::Initialize,
        Command::TakeOff,
        Command::Land,
        Command::MoveForward,
        Command::MoveBack,
        Command::MoveLeft,
        Command::MoveRight,
        Command::MoveUp,
        Command::MoveDown,
        Command::RotateLeft,
        Command::RotateRight,
        Command::Hover,
        Command::GetStatus,
        Command::Reset,
    ];

    /// Canonical label, e.g. `"take_off"`.
    pub fn label(&self) -> &'static str {
        match self {
            Command::Initialize => "initialize",
            Command::TakeOff => "take_off",
            Command::Land => "land",
            Command::MoveForward => "move_forward",
            Command::MoveBack => "move_back",
            Command::MoveLeft => "move_left",
            Command::MoveRight => "move_right",
            Command::MoveUp => "move_up",
            Command::MoveDown => "move_down",
            Command::RotateLeft => "rotate_left",
            Command::RotateRight => "rotate_right",
            Command::Hover => "hover",
            Command::GetStatus => "get_status",
            Command::Reset => "reset",
        }
    }

    /// The label set for the intent classifier, in declaration order.
    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.label()).collect()
    }

    /// Commands that may run while the vehicle is not initialized.
    pub fn allowed_uninitialized(&self) -> bool {
        matches!(self, Command::Initialize | Command::GetStatus | Command::Reset)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Command {
    type Err = AeroError;

    /// Parse a raw command token. Case is folded and whitespace runs are
    /// normalized to underscores, so `"Take  Off"` and `"take_off"` both
    /// resolve to [`Command::TakeOff`].
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let token = raw
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        Command::ALL
            .iter()
            .copied()
            .find(|c| c.label() == token)
            .ok_or_else(|| AeroError::CommandRejected(format!("command '{raw}' not recognized")))
    }
}

/// Outcome of a single [`Command`] execution, returned synchronously to the
/// caller. Either a complete success payload or a complete error payload,
/// never partially filled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: String,
    /// Structured payload; only `get_status` populates it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Success,
    Error,
}

impl CommandResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            message: message.into(),
            data: None,
        }
    }

    pub fn success_with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: CommandStatus::Success,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

/// Position in the simulator's NED frame, metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// `self + v * dt` — integrate a velocity over a duration.
    pub fn advanced_by(&self, v: Vec3, dt: f32) -> Vec3 {
        Vec3 {
            x: self.x + v.x * dt,
            y: self.y + v.y * dt,
            z: self.z + v.z * dt,
        }
    }

    /// Euclidean magnitude.
    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Unit quaternion orientation as reported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        // Identity rotation.
        Self { w: 1.0, x: 0.0, y: 0.0, z: 0.0 }
    }
}

/// Euler attitude in degrees. Pitch ∈ [−90, 90]; roll and yaw ∈ [−180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EulerDegrees {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

impl Quaternion {
    /// Convert to Euler angles (pitch, roll, yaw) in degrees.
    ///
    /// Uses the aerospace Z-Y-X (yaw-pitch-roll) decomposition. The pitch
    /// sine term is clamped to [−1, 1] so near-gimbal-lock orientations
    /// cannot produce NaN.
    pub fn to_euler_degrees(&self) -> EulerDegrees {
        let (w, x, y, z) = (self.w, self.x, self.y, self.z);

        let sinr = 2.0 * (w * x + y * z);
        let cosr = 1.0 - 2.0 * (x * x + y * y);
        let roll = sinr.atan2(cosr);

        let sinp = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0);
        let pitch = sinp.asin();

        let siny = 2.0 * (w * z + x * y);
        let cosy = 1.0 - 2.0 * (y * y + z * z);
        let yaw = siny.atan2(cosy);

        EulerDegrees {
            pitch: pitch.to_degrees(),
            roll: roll.to_degrees(),
            yaw: yaw.to_degrees(),
        }
    }

    /// Yaw component alone, in degrees. Used by the rotation fallback to
    /// compute an absolute target heading from the current one.
    pub fn yaw_degrees(&self) -> f32 {
        self.to_euler_degrees().yaw
    }
}

/// Pose snapshot returned by the simulator's state query.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    #[serde(default)]
    pub orientation: Quaternion,
}

/// Global error type spanning connectivity, command gating, motion
/// execution, and frame capture.
#[derive(Error, Debug, Clone)]
pub enum AeroError {
    /// Endpoint unreachable or the RPC liveness check failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Unknown command or a state-machine precondition was violated.
    #[error("command rejected: {0}")]
    CommandRejected(String),

    /// The primary async path failed for a reason other than the conflict
    /// signature, or the positional fallback itself failed.
    #[error("motion execution failed for '{command}': {details}")]
    MotionFailed { command: String, details: String },

    /// Malformed, undersized, or unreadable image buffer.
    #[error("frame capture failed: {0}")]
    Capture(String),

    /// The async primitive cannot run in the current call context. Triggers
    /// the synchronous positional fallback; never surfaced to callers.
    #[error("async conflict: {0}")]
    AsyncConflict(String),

    /// Fault reported by the RPC transport itself.
    #[error("rpc fault in {call}: {details}")]
    Rpc { call: String, details: String },
}

impl AeroError {
    /// Whether this error is the known event-loop conflict. Matches the
    /// typed variant first and falls back to the string signature for
    /// transports that only surface message text.
    pub fn is_async_conflict(&self) -> bool {
        match self {
            AeroError::AsyncConflict(_) => true,
            other => other.to_string().contains(CONFLICT_SIGNATURE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parse_accepts_spaces_and_underscores() {
        assert_eq!("take off".parse::<Command>().unwrap(), Command::TakeOff);
        assert_eq!("take_off".parse::<Command>().unwrap(), Command::TakeOff);
        assert_eq!("  Move   Forward ".parse::<Command>().unwrap(), Command::MoveForward);
        assert_eq!("HOVER".parse::<Command>().unwrap(), Command::Hover);
    }

    #[test]
    fn command_parse_rejects_unknown_token() {
        let err = "do a barrel roll".parse::<Command>().unwrap_err();
        assert!(matches!(err, AeroError::CommandRejected(_)));
        assert!(err.to_string().contains("not recognized"));
    }

    #[test]
    fn labels_cover_every_variant() {
        assert_eq!(Command::labels().len(), Command::ALL.len());
        for cmd in Command::ALL {
            assert_eq!(cmd.label().parse::<Command>().unwrap(), cmd);
        }
    }

    #[test]
    fn only_three_commands_run_uninitialized() {
        let allowed: Vec<Command> = Command::ALL
            .into_iter()
            .filter(Command::allowed_uninitialized)
            .collect();
        assert_eq!(
            allowed,
            vec![Command::Initialize, Command::GetStatus, Command::Reset]
        );
    }

    #[test]
    fn command_result_serializes_without_null_data() {
        let json = serde_json::to_string(&CommandResult::success("ok")).unwrap();
        assert!(json.contains(r#""status":"success""#));
        assert!(!json.contains("data"));
    }

    #[test]
    fn command_result_roundtrip_with_data() {
        let result = CommandResult::success_with_data("status", serde_json::json!({"x": 1.0}));
        let json = serde_json::to_string(&result).unwrap();
        let back: CommandResult = serde_json::from_str(&json).unwrap();
        assert!(back.is_success());
        assert_eq!(back.data.unwrap()["x"], 1.0);
    }

    #[test]
    fn identity_quaternion_is_zero_attitude() {
        let euler = Quaternion::default().to_euler_degrees();
        assert!(euler.pitch.abs() < 1e-4);
        assert!(euler.roll.abs() < 1e-4);
        assert!(euler.yaw.abs() < 1e-4);
    }

    #[test]
    fn ninety_degree_yaw_roundtrips() {
        // Rotation of 90° about +Z.
        let half = std::f32::consts::FRAC_PI_4;
        let q = Quaternion { w: half.cos(), x: 0.0, y: 0.0, z: half.sin() };
        let euler = q.to_euler_degrees();
        assert!((euler.yaw - 90.0).abs() < 1e-2, "yaw was {}", euler.yaw);
        assert!(euler.pitch.abs() < 1e-2);
        assert!(euler.roll.abs() < 1e-2);
    }

    #[test]
    fn euler_angles_stay_in_range_for_arbitrary_rotations() {
        // Sweep a grid of (not necessarily normalized-input) rotations and
        // confirm the advertised output ranges.
        for i in 0..8 {
            for j in 0..8 {
                let a = (i as f32) * 0.7 - 2.5;
                let b = (j as f32) * 0.9 - 3.1;
                let q = Quaternion {
                    w: (a.cos() * b.cos()),
                    x: (a.sin() * b.cos()),
                    y: (a.cos() * b.sin()),
                    z: (a.sin() * b.sin()),
                };
                let e = q.to_euler_degrees();
                assert!(e.pitch >= -90.0 - 1e-3 && e.pitch <= 90.0 + 1e-3);
                assert!(e.roll >= -180.0 - 1e-3 && e.roll <= 180.0 + 1e-3);
                assert!(e.yaw >= -180.0 - 1e-3 && e.yaw <= 180.0 + 1e-3);
            }
        }
    }

    #[test]
    fn advanced_by_integrates_velocity() {
        let p = Vec3::new(1.0, 2.0, -3.0);
        let target = p.advanced_by(Vec3::new(5.0, 0.0, 0.0), 2.0);
        assert_eq!(target, Vec3::new(11.0, 2.0, -3.0));
    }

    #[test]
    fn typed_conflict_is_detected() {
        let err = AeroError::AsyncConflict("runtime busy".to_string());
        assert!(err.is_async_conflict());
    }

    #[test]
    fn string_signature_conflict_is_detected() {
        let err = AeroError::Rpc {
            call: "takeoff".to_string(),
            details: format!("IOLoop raised: {CONFLICT_SIGNATURE}"),
        };
        assert!(err.is_async_conflict());
    }

    #[test]
    fn other_errors_are_not_conflicts() {
        let err = AeroError::Rpc {
            call: "takeoff".to_string(),
            details: "connection reset by peer".to_string(),
        };
        assert!(!err.is_async_conflict());
    }
}
