//! Stand-in peripherals that log instead of driving hardware.

use std::convert::Infallible;

use embedded_hal::{
    digital::{ErrorType, OutputPin, StatefulOutputPin},
    pwm::{self, SetDutyCycle},
};
use tracing::debug;

/// 12-bit PWM channel that logs duty changes.
pub struct LogPwm {
    name: &'static str,
    duty: u16,
}

impl LogPwm {
    pub fn new(name: &'static str) -> Self {
        Self { name, duty: 0 }
    }
}

impl pwm::ErrorType for LogPwm {
    type Error = Infallible;
}

impl SetDutyCycle for LogPwm {
    fn max_duty_cycle(&self) -> u16 {
        4095
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        if duty != self.duty {
            debug!(pin = self.name, duty, "pwm");
            self.duty = duty;
        }
        Ok(())
    }
}

/// GPIO output that logs level changes.
pub struct LogPin {
    name: &'static str,
    high: bool,
    quiet: bool,
}

impl LogPin {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            high: false,
            quiet: false,
        }
    }

    /// A pin that toggles every tick; only logged at trace level.
    pub fn quiet(name: &'static str) -> Self {
        Self {
            quiet: true,
            ..Self::new(name)
        }
    }

    fn set(
        &mut self,
        high: bool,
    ) {
        if high != self.high {
            if self.quiet {
                tracing::trace!(pin = self.name, high, "gpio");
            } else {
                debug!(pin = self.name, high, "gpio");
            }
            self.high = high;
        }
    }
}

impl ErrorType for LogPin {
    type Error = Infallible;
}

impl OutputPin for LogPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true);
        Ok(())
    }
}

impl StatefulOutputPin for LogPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high)
    }
}
