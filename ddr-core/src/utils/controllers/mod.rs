//! Module Exports
//!
//! This file exports key modules used in the drive control system.
//!
//! - `command`: velocity handoff and driver management channel.
//! - `driver`: motor driver trait and the TB6612 H-bridge implementation.
//! - `leds`: heartbeat LED toggled by the control tick.

pub mod command;
pub mod driver;
pub mod leds;

use embassy_time::{Duration, Instant, Ticker};
use embedded_hal::digital::StatefulOutputPin;
use serde::{Deserialize, Serialize};

use crate::utils::math::kinematics::{DiffDriveMixer, MixerConfig, VelocityCommand, WheelCommand};

pub use command::{DriveCommand, Twist, CMD_VEL, DRIVE_CHANNEL};
pub use driver::{HBridge, MotorDriver, Tb6612, Wheel};
pub use leds::Heartbeat;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "ct", rename_all = "snake_case")] // ct = command type
pub enum SystemCommand {
    V(VelocityCommand),
    T(Twist),
    D(DriveCommand),
}

/// Forward a parsed command to the control loop.
///
/// Velocities (and `Stop`, which is a zero velocity) replace the pending
/// velocity; `Enable`/`Disable` are queued.
pub async fn dispatch(cmd: SystemCommand) {
    match cmd {
        SystemCommand::V(velocity) => command::update(velocity),
        SystemCommand::T(twist) => command::update(twist.into()),
        SystemCommand::D(DriveCommand::Stop) => command::update(VelocityCommand::ZERO),
        SystemCommand::D(drive) => DRIVE_CHANNEL.send(drive).await,
    }
}

/// Control loop timing and tunables.
#[derive(Debug, Clone, Copy)]
pub struct DriveConfig {
    /// Period of the control tick.
    pub frame: Duration,
    /// Period at which inbound commands are picked up.
    pub poll: Duration,
    /// Zero the output when no velocity arrived for this long. `None` holds
    /// the last command forever.
    pub command_timeout: Option<Duration>,
    pub mixer: MixerConfig,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            frame: Duration::from_millis(100),
            poll: Duration::from_millis(10),
            command_timeout: None,
            mixer: MixerConfig::default(),
        }
    }
}

pub struct SystemController<M, L> {
    driver: M,
    heartbeat: Heartbeat<L>,
    mixer: DiffDriveMixer,
    config: DriveConfig,
    velocity: VelocityCommand,
    last_update: Option<Instant>,
    enabled: bool,
    timed_out: bool,
}

impl<M, L> SystemController<M, L>
where
    M: MotorDriver,
    L: StatefulOutputPin,
{
    pub fn new(
        driver: M,
        led: L,
        config: Option<DriveConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();

        SystemController {
            driver,
            heartbeat: Heartbeat::new(led),
            mixer: DiffDriveMixer::new(Some(config.mixer)),
            config,
            velocity: VelocityCommand::ZERO,
            last_update: None,
            enabled: false,
            timed_out: false,
        }
    }

    /// Bring the driver out of standby with both wheels stopped.
    ///
    /// A failure here means the hardware is unusable; callers treat it as fatal.
    pub fn init(&mut self) -> Result<(), M::Error> {
        self.driver.enable()?;
        self.driver.apply(Wheel::Left, WheelCommand::STOP)?;
        self.driver.apply(Wheel::Right, WheelCommand::STOP)?;
        self.enabled = true;
        tracing::info!(
            frame_ms = self.config.frame.as_millis(),
            poll_ms = self.config.poll.as_millis(),
            "drive ready"
        );
        Ok(())
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn heartbeat(&self) -> &Heartbeat<L> {
        &self.heartbeat
    }

    pub fn driver(&self) -> &M {
        &self.driver
    }

    /// Store the newest velocity command.
    pub fn update_velocity(
        &mut self,
        velocity: VelocityCommand,
        now: Instant,
    ) {
        tracing::trace!(linear = velocity.linear, angular = velocity.angular, "cmd_vel");
        self.velocity = velocity;
        self.last_update = Some(now);
        self.timed_out = false;
    }

    /// Execute a driver management command.
    pub fn handle(
        &mut self,
        command: DriveCommand,
    ) -> Result<(), M::Error> {
        match command {
            DriveCommand::Enable => {
                self.driver.enable()?;
                self.enabled = true;
            }
            DriveCommand::Disable => {
                self.velocity = VelocityCommand::ZERO;
                // Stay enabled until standby is confirmed so ticks keep writing STOP.
                self.driver.disable()?;
                self.enabled = false;
            }
            // `dispatch` sends Stop as a zero velocity; this arm serves direct callers.
            DriveCommand::Stop => self.velocity = VelocityCommand::ZERO,
        }
        Ok(())
    }

    /// Velocity the next tick will act on.
    pub fn target(
        &mut self,
        now: Instant,
    ) -> VelocityCommand {
        if !self.enabled {
            return VelocityCommand::ZERO;
        }
        if let (Some(timeout), Some(last)) = (self.config.command_timeout, self.last_update) {
            if now.saturating_duration_since(last) > timeout {
                if !self.timed_out {
                    tracing::warn!("no velocity command for {} ms, stopping", timeout.as_millis());
                    self.timed_out = true;
                }
                return VelocityCommand::ZERO;
            }
        }
        self.velocity
    }

    /// Run one control tick: heartbeat, mix, apply left then right.
    pub fn tick(
        &mut self,
        now: Instant,
    ) -> Result<(WheelCommand, WheelCommand), M::Error> {
        self.heartbeat.beat();

        let target = self.target(now);
        let (left, right) = self
            .mixer
            .compute_wheel_commands(target.linear, target.angular);

        if self.enabled {
            self.driver.apply(Wheel::Left, left)?;
            self.driver.apply(Wheel::Right, right)?;
        }
        tracing::trace!(?left, ?right, "tick");
        Ok((left, right))
    }

    /// Take the pending velocity, then drain queued management commands.
    ///
    /// The velocity goes first so a `Disable` queued after it still clears it.
    pub fn poll(
        &mut self,
        now: Instant,
    ) {
        if let Some(velocity) = command::take() {
            self.update_velocity(velocity, now);
        }
        while let Ok(drive_cmd) = DRIVE_CHANNEL.try_receive() {
            tracing::info!("Received drive command: {:?}", drive_cmd);
            if let Err(e) = self.handle(drive_cmd) {
                tracing::error!("drive command {:?} failed: {:?}", drive_cmd, e);
            }
        }
    }

    /// Poll every `poll` interval and tick every `frame` interval, forever.
    pub async fn run(&mut self) -> ! {
        let mut ticker = Ticker::every(self.config.poll);
        let mut next_frame = Instant::now();
        loop {
            let now = Instant::now();
            self.poll(now);
            if now >= next_frame {
                if let Err(e) = self.tick(now) {
                    tracing::error!("control tick failed: {:?}", e);
                }
                next_frame += self.config.frame;
                if next_frame < now {
                    next_frame = now + self.config.frame;
                }
            }
            ticker.next().await;
        }
    }
}
