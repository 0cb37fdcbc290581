//! Motor driver abstraction for the differential-drive robot.
//!
//! `MotorDriver` is the capability the control loop talks to. `Tb6612` drives a
//! TB6612FNG dual H-bridge through `embedded-hal` PWM channels (ENA/ENB) and
//! output pins (IN1..IN4, STBY).
//!
//! ## TB6612FNG Truth Table
//!
//! | IN1 | IN2 | Motor State |
//! |-----|-----|-------------|
//! | 1   | 0   | Forward     |
//! | 0   | 1   | Backward    |
//! | 0   | 0   | Stop        |

use embedded_hal::{digital::OutputPin, pwm::SetDutyCycle};

use crate::utils::math::kinematics::{Direction, WheelCommand, DUTY_MAX};

/// Which side of the robot a command is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    Left,
    Right,
}

/// Abstract motor-driver interface.
pub trait MotorDriver {
    type Error: core::fmt::Debug;

    /// Take the driver out of standby.
    fn enable(&mut self) -> Result<(), Self::Error>;

    /// Stop both wheels and put the driver into standby.
    fn disable(&mut self) -> Result<(), Self::Error>;

    /// Apply a direction and 12-bit duty to one wheel.
    fn apply(
        &mut self,
        wheel: Wheel,
        command: WheelCommand,
    ) -> Result<(), Self::Error>;
}

/// Errors that can occur when driving the H-bridge.
#[derive(Debug)]
pub enum DriverError<P: core::fmt::Debug, G: core::fmt::Debug> {
    Pwm(P),
    Pin(G),
}

/// One half of the TB6612: a speed PWM and two direction inputs.
pub struct HBridge<Pwm, Pin> {
    pwm: Pwm,
    in1: Pin,
    in2: Pin,
}

impl<Pwm, Pin> HBridge<Pwm, Pin>
where
    Pwm: SetDutyCycle,
    Pin: OutputPin,
{
    pub fn new(
        pwm: Pwm,
        in1: Pin,
        in2: Pin,
    ) -> Self {
        Self { pwm, in1, in2 }
    }

    /// Set the direction pins, then the duty.
    pub fn drive(
        &mut self,
        command: WheelCommand,
    ) -> Result<(), DriverError<Pwm::Error, Pin::Error>> {
        let (in1, in2) = match command.direction {
            Direction::Forward => (true, false),
            Direction::Backward => (false, true),
            Direction::Stop => (false, false),
        };
        self.in1.set_state(in1.into()).map_err(DriverError::Pin)?;
        self.in2.set_state(in2.into()).map_err(DriverError::Pin)?;

        // Duty is expressed on the 12-bit scale; the channel rescales it to its own resolution.
        self.pwm
            .set_duty_cycle_fraction(command.duty.min(DUTY_MAX), DUTY_MAX)
            .map_err(DriverError::Pwm)
    }
}

/// TB6612FNG dual H-bridge with a shared standby pin.
pub struct Tb6612<Pwm, Pin> {
    left: HBridge<Pwm, Pin>,
    right: HBridge<Pwm, Pin>,
    standby: Pin,
}

impl<Pwm, Pin> Tb6612<Pwm, Pin>
where
    Pwm: SetDutyCycle,
    Pin: OutputPin,
{
    /// Create a driver over the given bridges. The driver starts in standby
    /// until `enable` is called.
    pub fn new(
        left: HBridge<Pwm, Pin>,
        right: HBridge<Pwm, Pin>,
        standby: Pin,
    ) -> Self {
        Self {
            left,
            right,
            standby,
        }
    }
}

impl<Pwm, Pin> MotorDriver for Tb6612<Pwm, Pin>
where
    Pwm: SetDutyCycle,
    Pin: OutputPin,
{
    type Error = DriverError<Pwm::Error, Pin::Error>;

    fn enable(&mut self) -> Result<(), Self::Error> {
        self.standby.set_high().map_err(DriverError::Pin)?;
        tracing::info!("motor driver enabled");
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Self::Error> {
        self.left.drive(WheelCommand::STOP)?;
        self.right.drive(WheelCommand::STOP)?;
        self.standby.set_low().map_err(DriverError::Pin)?;
        tracing::info!("motor driver in standby");
        Ok(())
    }

    fn apply(
        &mut self,
        wheel: Wheel,
        command: WheelCommand,
    ) -> Result<(), Self::Error> {
        match wheel {
            Wheel::Left => self.left.drive(command),
            Wheel::Right => self.right.drive(command),
        }
    }
}
