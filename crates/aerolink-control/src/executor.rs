//! [`CommandExecutor`] – vehicle state machine and intent dispatcher.
//!
//! The executor owns the vehicle's lifecycle flag (`initialized`) and routes
//! each [`Command`] to its handler with an explicit `match`, so the closed
//! command set is statically enumerable. Rejections happen in a fixed
//! order: unknown token, then `connected`, then `initialized` (except for
//! `initialize`, `get_status`, and `reset`, which must stay reachable).
//!
//! # Dual-strategy motion execution
//!
//! The simulator's async motion primitives occasionally refuse to run with
//! an event-loop conflict when invoked from certain call contexts. Every
//! motion handler therefore tries the async primitive first and, on the
//! conflict signature *only*, falls back to a deterministic positional
//! maneuver: read the current pose, integrate the intended velocity (or yaw
//! rate) over the command's duration, and issue an absolute move/rotate
//! instead. Any other failure surfaces as an error result without a retry.
//! After either path succeeds the handler settles into a short pause plus an
//! explicit hover so the vehicle does not drift.
//!
//! Motion commands are serialized through an internal mutex — the remote
//! side treats overlapping motion calls on one session as undefined
//! behavior.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use aerolink_net::Connection;
use aerolink_rpc::SimClient;
use aerolink_types::{AeroError, Command, CommandResult, Pose, Vec3};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Horizontal cruise speed for directional moves, m/s.
const CRUISE_SPEED: f32 = 5.0;
/// Vertical speed for up/down moves, m/s.
const CLIMB_SPEED: f32 = 3.0;
/// Yaw rate for rotations, degrees/second.
const YAW_RATE_DEG: f32 = 30.0;
/// Duration of every fixed-parameter motion, seconds.
const MOTION_DURATION: f32 = 2.0;
/// Climb speed assumed for the takeoff fallback, m/s.
const TAKEOFF_CLIMB_SPEED: f32 = 1.5;
/// Descent speed for the land fallback, m/s.
const LAND_SPEED: f32 = 1.0;
/// Pause before the stabilizing hover.
const STABILIZE_PAUSE: Duration = Duration::from_millis(500);

/// How a motion command drives the simulator.
#[derive(Debug, Clone, Copy)]
enum MotionPlan {
    Velocity { velocity: Vec3, duration: f32 },
    YawRate { rate_deg: f32, duration: f32 },
    TakeOff,
    Land,
    Hover,
}

/// The fixed command → maneuver mapping. Commands without a plan
/// (`initialize`, `get_status`, `reset`) are handled outside the
/// dual-strategy path.
fn motion_plan(cmd: Command) -> Option<MotionPlan> {
    let plan = match cmd {
        Command::TakeOff => MotionPlan::TakeOff,
        Command::Land => MotionPlan::Land,
        Command::Hover => MotionPlan::Hover,
        Command::MoveForward => MotionPlan::Velocity {
            velocity: Vec3::new(CRUISE_SPEED, 0.0, 0.0),
            duration: MOTION_DURATION,
        },
        Command::MoveBack => MotionPlan::Velocity {
            velocity: Vec3::new(-CRUISE_SPEED, 0.0, 0.0),
            duration: MOTION_DURATION,
        },
        Command::MoveLeft => MotionPlan::Velocity {
            velocity: Vec3::new(0.0, -CRUISE_SPEED, 0.0),
            duration: MOTION_DURATION,
        },
        Command::MoveRight => MotionPlan::Velocity {
            velocity: Vec3::new(0.0, CRUISE_SPEED, 0.0),
            duration: MOTION_DURATION,
        },
        // NED frame: up is negative z.
        Command::MoveUp => MotionPlan::Velocity {
            velocity: Vec3::new(0.0, 0.0, -CLIMB_SPEED),
            duration: MOTION_DURATION,
        },
        Command::MoveDown => MotionPlan::Velocity {
            velocity: Vec3::new(0.0, 0.0, CLIMB_SPEED),
            duration: MOTION_DURATION,
        },
        Command::RotateLeft => MotionPlan::YawRate {
            rate_deg: -YAW_RATE_DEG,
            duration: MOTION_DURATION,
        },
        Command::RotateRight => MotionPlan::YawRate {
            rate_deg: YAW_RATE_DEG,
            duration: MOTION_DURATION,
        },
        Command::Initialize | Command::GetStatus | Command::Reset => return None,
    };
    Some(plan)
}

/// Vehicle command executor. One instance per vehicle; shares the process
/// connection with the frame pipeline.
pub struct CommandExecutor {
    connection: Arc<Connection>,
    initialized: AtomicBool,
    /// At most one in-flight motion command per vehicle.
    motion: Mutex<()>,
    stabilize_pause: Duration,
}

impl CommandExecutor {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            initialized: AtomicBool::new(false),
            motion: Mutex::new(()),
            stabilize_pause: STABILIZE_PAUSE,
        }
    }

    /// Override the stabilization pause (builder-style). Tests shorten it.
    pub fn with_stabilize_pause(mut self, pause: Duration) -> Self {
        self.stabilize_pause = pause;
        self
    }

    /// Whether the vehicle has been initialized (API control + armed).
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Execute a raw command string and return a structured result. Never
    /// panics and never propagates handler errors to the caller.
    pub async fn execute(&self, raw: &str) -> CommandResult {
        let cmd = match raw.parse::<Command>() {
            Ok(cmd) => cmd,
            Err(e) => return CommandResult::error(e.to_string()),
        };

        if !self.connection.is_connected() {
            return CommandResult::error("simulator not connected");
        }

        if !self.is_initialized() && !cmd.allowed_uninitialized() {
            return CommandResult::error(
                "vehicle is not initialized; send the 'initialize' command first",
            );
        }

        let Some(client) = self.connection.client().await else {
            return CommandResult::error("simulator not connected");
        };

        debug!(command = %cmd, "dispatching");
        match self.dispatch(cmd, &client).await {
            Ok(Some(result)) => result,
            Ok(None) => CommandResult::success(format!("command '{cmd}' executed successfully")),
            Err(e) => {
                warn!(command = %cmd, error = %e, "command failed");
                CommandResult::error(format!("error while executing '{cmd}': {e}"))
            }
        }
    }

    async fn dispatch(
        &self,
        cmd: Command,
        client: &Arc<dyn SimClient>,
    ) -> Result<Option<CommandResult>, AeroError> {
        match cmd {
            Command::Initialize => self.initialize(client).await.map(Some),
            Command::GetStatus => self.get_status(client).await.map(Some),
            Command::Reset => self.reset(client).await.map(Some),
            Command::Land => {
                let _guard = self.motion.lock().await;
                self.run_motion(cmd, MotionPlan::Land, client).await?;
                client.arm_disarm(false).await?;
                self.initialized.store(false, Ordering::SeqCst);
                info!("landing complete, vehicle disarmed");
                Ok(None)
            }
            other => {
                let Some(plan) = motion_plan(other) else {
                    // Unreachable for the current closed set.
                    return Err(AeroError::CommandRejected(format!(
                        "command '{other}' has no motion profile"
                    )));
                };
                let _guard = self.motion.lock().await;
                self.run_motion(other, plan, client).await?;
                Ok(None)
            }
        }
    }

    /// Enable API control and arm. Gates every motion command.
    async fn initialize(&self, client: &Arc<dyn SimClient>) -> Result<CommandResult, AeroError> {
        client.enable_api_control(true).await?;
        client.arm_disarm(true).await?;
        self.initialized.store(true, Ordering::SeqCst);
        info!("vehicle initialized: API control enabled and armed");
        Ok(CommandResult::success("vehicle initialized and ready for flight"))
    }

    /// Read-only status snapshot. Works regardless of `initialized`.
    async fn get_status(&self, client: &Arc<dyn SimClient>) -> Result<CommandResult, AeroError> {
        let pose = client.get_pose().await?;
        let euler = pose.orientation.to_euler_degrees();
        let data = json!({
            "position": {
                "x": pose.position.x,
                "y": pose.position.y,
                "z": pose.position.z,
            },
            "orientation_degrees": {
                "pitch": euler.pitch,
                "roll": euler.roll,
                "yaw": euler.yaw,
            },
            "is_initialized": self.is_initialized(),
            "is_connected": self.connection.is_connected(),
        });
        Ok(CommandResult::success_with_data("vehicle status retrieved", data))
    }

    /// Disarm, reset the simulator, revoke API control. Always forces
    /// `initialized` to false, from any prior state.
    async fn reset(&self, client: &Arc<dyn SimClient>) -> Result<CommandResult, AeroError> {
        let _guard = self.motion.lock().await;
        client.arm_disarm(false).await?;
        client.reset().await?;
        client.enable_api_control(false).await?;
        self.initialized.store(false, Ordering::SeqCst);
        info!("vehicle reset");
        Ok(CommandResult::success("vehicle has been reset"))
    }

    /// Dual-strategy maneuver plus the unconditional stabilization step.
    async fn run_motion(
        &self,
        cmd: Command,
        plan: MotionPlan,
        client: &Arc<dyn SimClient>,
    ) -> Result<(), AeroError> {
        self.execute_plan(cmd, plan, client).await?;

        // Settle: short pause, then an explicit hover so residual velocity
        // is damped. Applied whichever path performed the maneuver.
        tokio::time::sleep(self.stabilize_pause).await;
        self.execute_plan(cmd, MotionPlan::Hover, client).await?;
        Ok(())
    }

    /// Try the async primitive; on the conflict signature only, fall back
    /// to the positional maneuver. All failures are mapped to
    /// [`AeroError::MotionFailed`] carrying the underlying message.
    async fn execute_plan(
        &self,
        cmd: Command,
        plan: MotionPlan,
        client: &Arc<dyn SimClient>,
    ) -> Result<(), AeroError> {
        match primary(plan, client).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_async_conflict() => {
                debug!(command = %cmd, "async path conflicted, using positional fallback");
                positional_fallback(plan, client).await.map_err(|e| {
                    AeroError::MotionFailed {
                        command: cmd.label().to_string(),
                        details: e.to_string(),
                    }
                })
            }
            Err(e) => Err(AeroError::MotionFailed {
                command: cmd.label().to_string(),
                details: e.to_string(),
            }),
        }
    }
}

/// The simulator's asynchronous path, awaited to completion.
async fn primary(plan: MotionPlan, client: &Arc<dyn SimClient>) -> Result<(), AeroError> {
    match plan {
        MotionPlan::TakeOff => client.takeoff().await,
        MotionPlan::Land => client.land().await,
        MotionPlan::Hover => client.hover().await,
        MotionPlan::Velocity { velocity, duration } => {
            client.move_by_velocity(velocity, duration).await
        }
        MotionPlan::YawRate { rate_deg, duration } => {
            client.rotate_by_yaw_rate(rate_deg, duration).await
        }
    }
}

/// The deterministic positional rendering of `plan`: integrate the intended
/// velocity (or yaw rate) over the command duration from the current pose
/// and command the absolute result.
async fn positional_fallback(plan: MotionPlan, client: &Arc<dyn SimClient>) -> Result<(), AeroError> {
    let pose: Pose = client.get_pose().await?;
    match plan {
        MotionPlan::Velocity { velocity, duration } => {
            let target = pose.position.advanced_by(velocity, duration);
            client.move_to_position(target, velocity.norm()).await
        }
        MotionPlan::YawRate { rate_deg, duration } => {
            let target_yaw = pose.orientation.yaw_degrees() + rate_deg * duration;
            client.rotate_to_yaw(target_yaw).await
        }
        MotionPlan::TakeOff => {
            let climb = Vec3::new(0.0, 0.0, -TAKEOFF_CLIMB_SPEED);
            let target = pose.position.advanced_by(climb, MOTION_DURATION);
            client.move_to_position(target, TAKEOFF_CLIMB_SPEED).await
        }
        MotionPlan::Land => {
            // Descend to ground level at the current horizontal position.
            let target = Vec3::new(pose.position.x, pose.position.y, 0.0);
            client.move_to_position(target, LAND_SPEED).await
        }
        MotionPlan::Hover => {
            // Zero velocity integrates to the current pose.
            client.move_to_position(pose.position, LAND_SPEED).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerolink_net::EndpointResolver;
    use aerolink_rpc::{StubClient, StubFactory};

    /// Connected executor over a pinned stub client, with the
    /// stabilization pause zeroed so tests run instantly.
    async fn connected_executor() -> (CommandExecutor, Arc<StubClient>) {
        let client = StubClient::new();
        let factory = StubFactory::with_client(Arc::clone(&client));
        let resolver = EndpointResolver::new(
            Some("stub-host".to_string()),
            Duration::from_millis(100),
            vec![],
            41451,
        );
        let connection = Arc::new(Connection::new(resolver, factory));
        connection.resolve_and_connect().await.unwrap();
        let executor =
            CommandExecutor::new(connection).with_stabilize_pause(Duration::ZERO);
        (executor, client)
    }

    async fn initialized_executor() -> (CommandExecutor, Arc<StubClient>) {
        let (executor, client) = connected_executor().await;
        assert!(executor.execute("initialize").await.is_success());
        (executor, client)
    }

    #[tokio::test]
    async fn unknown_command_is_rejected_before_any_handler() {
        let (executor, client) = connected_executor().await;
        let before = client.calls().len();

        let result = executor.execute("do a barrel roll").await;
        assert!(!result.is_success());
        assert!(result.message.contains("not recognized"));
        assert_eq!(client.calls().len(), before, "no simulator call may be made");
    }

    #[tokio::test]
    async fn disconnected_executor_rejects_everything() {
        let connection = Arc::new(Connection::new(
            EndpointResolver::default(),
            StubFactory::refusing(),
        ));
        let executor = CommandExecutor::new(connection);

        let result = executor.execute("initialize").await;
        assert!(!result.is_success());
        assert!(result.message.contains("not connected"));
    }

    #[tokio::test]
    async fn motion_requires_initialization() {
        let (executor, client) = connected_executor().await;

        for raw in ["take_off", "move_forward", "rotate_left", "hover", "land"] {
            let result = executor.execute(raw).await;
            assert!(!result.is_success(), "{raw} must be rejected");
            assert!(
                result.message.contains("initialize"),
                "rejection for {raw} must mention initialization"
            );
        }
        // The connection ping is the only simulator traffic so far.
        assert!(!client.calls().iter().any(|c| c != "ping"));
    }

    #[tokio::test]
    async fn initialize_arms_and_enables_api_control() {
        let (executor, client) = connected_executor().await;

        let result = executor.execute("initialize").await;
        assert!(result.is_success());
        assert!(executor.is_initialized());
        assert!(client.is_armed());
        assert!(client.has_api_control());
    }

    #[tokio::test]
    async fn take_off_stabilizes_with_hover() {
        let (executor, client) = initialized_executor().await;

        let result = executor.execute("take off").await;
        assert!(result.is_success());
        let calls = client.calls();
        let takeoff_at = calls.iter().position(|c| c == "takeoff").unwrap();
        let hover_at = calls.iter().rposition(|c| c == "hover").unwrap();
        assert!(hover_at > takeoff_at, "stabilizing hover must follow the maneuver");
    }

    #[tokio::test]
    async fn conflict_triggers_positional_fallback_with_integrated_target() {
        let (executor, client) = initialized_executor().await;
        client
            .move_to_position(Vec3::new(1.0, 2.0, -3.0), 5.0)
            .await
            .unwrap();
        client.inject_async_conflict();

        let result = executor.execute("move_forward").await;
        assert!(result.is_success(), "fallback path must succeed: {}", result.message);

        // Target = (1,2,-3) + (5,0,0) * 2s. The trailing stabilization hover
        // also falls back to a positional hold at that same target.
        assert_eq!(client.position(), Vec3::new(11.0, 2.0, -3.0));
        assert!(
            client.calls().iter().any(|c| c.starts_with("move_to_position(11,2,-3")),
            "calls were: {:?}",
            client.calls()
        );
    }

    #[tokio::test]
    async fn conflict_triggers_rotation_fallback_to_absolute_heading() {
        let (executor, client) = initialized_executor().await;
        client.rotate_to_yaw(10.0).await.unwrap();
        client.inject_async_conflict();

        let result = executor.execute("rotate_right").await;
        assert!(result.is_success(), "{}", result.message);
        // 10° + 30°/s × 2s = 70° absolute.
        assert!((client.yaw_deg() - 70.0).abs() < 1e-3, "yaw was {}", client.yaw_deg());
    }

    #[tokio::test]
    async fn non_conflict_error_surfaces_without_fallback() {
        let (executor, client) = initialized_executor().await;
        client.inject_async_fault(AeroError::Rpc {
            call: "move_by_velocity".to_string(),
            details: "connection reset by peer".to_string(),
        });

        let result = executor.execute("move_forward").await;
        assert!(!result.is_success());
        assert!(result.message.contains("connection reset by peer"));
        assert!(
            !client.calls().iter().any(|c| c.starts_with("move_to_position")),
            "no fallback may be attempted for non-conflict errors"
        );
    }

    #[tokio::test]
    async fn fallback_failure_surfaces_as_error() {
        let (executor, client) = initialized_executor().await;
        client.inject_async_conflict();
        client.inject_positional_fault(AeroError::Rpc {
            call: "move_to_position".to_string(),
            details: "target rejected".to_string(),
        });

        let result = executor.execute("move_up").await;
        assert!(!result.is_success());
        assert!(result.message.contains("target rejected"));
    }

    #[tokio::test]
    async fn hover_conflict_holds_current_position() {
        let (executor, client) = initialized_executor().await;
        client
            .move_to_position(Vec3::new(4.0, -2.0, -5.0), 5.0)
            .await
            .unwrap();
        client.inject_async_conflict();

        let result = executor.execute("hover").await;
        assert!(result.is_success(), "{}", result.message);
        assert_eq!(client.position(), Vec3::new(4.0, -2.0, -5.0));
    }

    #[tokio::test]
    async fn land_disarms_and_clears_initialized() {
        let (executor, client) = initialized_executor().await;
        executor.execute("take_off").await;

        let result = executor.execute("land").await;
        assert!(result.is_success());
        assert!(!executor.is_initialized());
        assert!(!client.is_armed());
    }

    #[tokio::test]
    async fn reset_is_reachable_from_any_state_and_forces_uninitialized() {
        let (executor, client) = connected_executor().await;

        // Already uninitialized: reset still succeeds.
        let result = executor.execute("reset").await;
        assert!(result.is_success());
        assert!(!executor.is_initialized());

        // And from an initialized state it revokes everything.
        executor.execute("initialize").await;
        assert!(executor.is_initialized());
        let result = executor.execute("reset").await;
        assert!(result.is_success());
        assert!(!executor.is_initialized());
        assert!(!client.is_armed());
        assert!(!client.has_api_control());
    }

    #[tokio::test]
    async fn get_status_works_uninitialized_and_reports_attitude_in_range() {
        let (executor, client) = connected_executor().await;
        client.rotate_to_yaw(135.0).await.unwrap();

        let result = executor.execute("get_status").await;
        assert!(result.is_success());
        let data = result.data.expect("status carries a payload");

        assert_eq!(data["is_initialized"], false);
        assert_eq!(data["is_connected"], true);
        let yaw = data["orientation_degrees"]["yaw"].as_f64().unwrap();
        assert!((yaw - 135.0).abs() < 1e-2);
        for key in ["pitch", "roll", "yaw"] {
            let v = data["orientation_degrees"][key].as_f64().unwrap();
            assert!((-180.0..=180.0).contains(&v), "{key} out of range: {v}");
        }
    }

    #[tokio::test]
    async fn motion_success_reports_generic_message() {
        let (executor, _client) = initialized_executor().await;
        let result = executor.execute("move_back").await;
        assert!(result.is_success());
        assert!(result.message.contains("move_back"));
        assert!(result.data.is_none());
    }
}
