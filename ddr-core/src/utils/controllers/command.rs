//! Inbound command handoff.
//!
//! Velocity commands go through a single-slot `Signal`: every update replaces
//! the pending value, and the control loop takes whatever is newest when it
//! polls. Management commands must not be dropped, so they are queued on
//! `DRIVE_CHANNEL` instead.

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel, signal::Signal};
use serde::{Deserialize, Serialize};

use crate::utils::math::kinematics::VelocityCommand;

/// Latest velocity command, last write wins.
pub static CMD_VEL: Signal<CriticalSectionRawMutex, VelocityCommand> = Signal::new();

/// Channel used to receive driver management commands (`DriveCommand` messages).
pub static DRIVE_CHANNEL: Channel<CriticalSectionRawMutex, DriveCommand, 16> = Channel::new();

/// Driver management variants.
///
/// Serialized as JSON with tag `"dc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "dc", rename_all = "snake_case")]
pub enum DriveCommand {
    /// Leave standby and accept velocity commands.
    Enable,
    /// Stop the wheels and enter standby.
    Disable,
    /// Zero the stored velocity.
    Stop,
}

/// Three-component vector in the shape of `geometry_msgs/Vector3`.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Velocity in the shape of `geometry_msgs/Twist`.
///
/// Only `linear.x` and `angular.z` mean anything to a differential drive.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl From<Twist> for VelocityCommand {
    fn from(twist: Twist) -> Self {
        VelocityCommand::new(twist.linear.x, twist.angular.z)
    }
}

/// Publish a new velocity command, replacing any pending one.
pub fn update(command: VelocityCommand) {
    CMD_VEL.signal(command);
}

/// Take the pending velocity command, if one arrived since the last call.
pub fn take() -> Option<VelocityCommand> {
    CMD_VEL.try_take()
}
