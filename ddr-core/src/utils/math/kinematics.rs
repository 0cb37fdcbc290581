//! Kinematics utilities for 2-wheeled differential-drive robots.
//!
//! The `DiffDriveMixer` turns a commanded linear/angular velocity pair into a
//! direction and a 12-bit PWM duty per wheel. Magnitudes below the deadband
//! are zeroed; everything else is remapped into `[duty_min, duty_max]` so the
//! motor driver never sits in its dead zone.
//!
//! # Example
//! ```rust
//! use ddr_core::utils::math::kinematics::{DiffDriveMixer, Direction};
//! let mixer = DiffDriveMixer::new(None);
//! let (left, right) = mixer.compute_wheel_commands(0.0, 1.0);
//! assert_eq!(left.direction, Direction::Backward);
//! assert_eq!(right.duty, 4095);
//! ```
//!
use libm;
use serde::{Deserialize, Serialize};

/// Wheel speeds with a smaller magnitude are treated as zero.
pub const DEADBAND: f32 = 0.05;
/// Lowest duty that still turns the motor (12-bit).
pub const DUTY_MIN: u16 = 400;
/// Full-scale duty (12-bit).
pub const DUTY_MAX: u16 = 4095;

/// Rotation direction of a single wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    Stop,
}

/// Power command for a single wheel, recomputed every control tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelCommand {
    pub direction: Direction,
    pub duty: u16,
}

impl WheelCommand {
    pub const STOP: Self = Self {
        direction: Direction::Stop,
        duty: 0,
    };
}

/// Commanded body velocity, each component nominally in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityCommand {
    pub linear: f32,
    pub angular: f32,
}

impl VelocityCommand {
    pub const ZERO: Self = Self {
        linear: 0.0,
        angular: 0.0,
    };

    pub fn new(
        linear: f32,
        angular: f32,
    ) -> Self {
        Self { linear, angular }
    }
}

/// Tunables for the deadband and the duty remap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerConfig {
    pub deadband: f32,
    pub duty_min: u16,
    pub duty_max: u16,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            deadband: DEADBAND,
            duty_min: DUTY_MIN,
            duty_max: DUTY_MAX,
        }
    }
}

/// Converts velocity commands into per-wheel direction and duty.
#[derive(Debug, Clone, Copy)]
pub struct DiffDriveMixer {
    config: MixerConfig,
}

impl DiffDriveMixer {
    /// Instantiate with the given tunables, or the TB6612 defaults.
    pub fn new(config: Option<MixerConfig>) -> Self {
        Self {
            config: config.unwrap_or_default(),
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Mix linear and angular velocity into `(left, right)` wheel speeds.
    ///
    /// Inputs are clamped to `[-1, 1]`; the sums are not, so a wheel speed
    /// can reach ±2 when both inputs are saturated.
    pub fn mix(
        linear: f32,
        angular: f32,
    ) -> (f32, f32) {
        let linear = clamp_unit(linear);
        let angular = clamp_unit(angular);
        (linear - angular, linear + angular)
    }

    /// Forward/Backward outside the deadband, Stop inside and on its edge.
    pub fn direction(
        &self,
        speed: f32,
    ) -> Direction {
        if speed > self.config.deadband {
            Direction::Forward
        } else if speed < -self.config.deadband {
            Direction::Backward
        } else {
            Direction::Stop
        }
    }

    /// Duty for a wheel speed: zero inside the deadband, otherwise `|speed|`
    /// remapped from `[0, 1]` into `[duty_min, duty_max]` and truncated.
    pub fn magnitude(
        &self,
        speed: f32,
    ) -> u16 {
        let magnitude = libm::fabsf(speed);
        if magnitude < self.config.deadband {
            return 0;
        }
        remap(
            magnitude,
            0.0,
            1.0,
            self.config.duty_min as f32,
            self.config.duty_max as f32,
        ) as u16
    }

    pub fn wheel_command(
        &self,
        speed: f32,
    ) -> WheelCommand {
        WheelCommand {
            direction: self.direction(speed),
            duty: self.magnitude(speed),
        }
    }

    /// Compute `(left, right)` wheel commands for the desired motion.
    pub fn compute_wheel_commands(
        &self,
        linear: f32,
        angular: f32,
    ) -> (WheelCommand, WheelCommand) {
        let (left, right) = Self::mix(linear, angular);
        if libm::fabsf(left) > 1.0 || libm::fabsf(right) > 1.0 {
            // Left unclamped on purpose; the duty goes past duty_max here.
            tracing::debug!(left, right, "wheel speed outside [-1, 1]");
        }
        (self.wheel_command(left), self.wheel_command(right))
    }
}

/// Clamp to `[-1, 1]`, mapping NaN to zero.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Linearly map `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
pub fn remap(
    value: f32,
    in_min: f32,
    in_max: f32,
    out_min: f32,
    out_max: f32,
) -> f32 {
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}
