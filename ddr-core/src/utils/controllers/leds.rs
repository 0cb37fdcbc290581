//! Status LED for the differential-drive robot.
//!
//! The control loop toggles a single GPIO LED once per tick so a stalled
//! loop is visible on the board.

use embedded_hal::digital::StatefulOutputPin;

/// Liveness indicator toggled by every control tick.
pub struct Heartbeat<Pin> {
    pin: Pin,
    beats: u32,
}

impl<Pin> Heartbeat<Pin>
where
    Pin: StatefulOutputPin,
{
    /// Wrap an output pin. The LED keeps whatever level it currently has.
    pub fn new(pin: Pin) -> Self {
        Self { pin, beats: 0 }
    }

    /// Flip the LED. Failures are logged and otherwise ignored.
    pub fn beat(&mut self) {
        match self.pin.toggle() {
            Ok(()) => self.beats = self.beats.wrapping_add(1),
            Err(e) => tracing::warn!("heartbeat LED toggle failed: {:?}", e),
        }
    }

    /// Number of successful toggles so far.
    pub fn beats(&self) -> u32 {
        self.beats
    }

    pub fn is_lit(&mut self) -> bool {
        self.pin.is_set_high().unwrap_or(false)
    }
}
