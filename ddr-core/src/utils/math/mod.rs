//! Math utilities for the differential-drive robot.
//!
//! This module provides velocity mixing and PWM duty mapping for two-wheeled
//! differential-drive robots.

pub mod kinematics;
