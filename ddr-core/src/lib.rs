//! Core mixing, motor driver and control loop for a differential-drive robot
//! on no-std embedded platforms.
//!
//! For runnable firmware, see the `ddr-app/` directory.
#![no_std]

pub mod utils;
