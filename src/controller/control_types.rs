// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the measured state which is passed into a tick and the command which comes out of it.
use std::time::Duration;

use crate::utils::{JointVector, Vector6};

/// Joint state of one tick, refreshed from the hardware before every call to
/// [`update`](`crate::CartesianImpedanceController::update`).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct JointState<const N: usize> {
    /// Measured joint position. Unit: \[rad\]
    pub q: JointVector<N>,
    /// Measured joint velocity. Unit: \[rad/s\]
    pub dq: JointVector<N>,
    /// Monotonic time stamp of the measurement.
    pub time: Duration,
    /// Measured wrench in the force torque sensor frame, if a sensor is configured.
    /// Forces in \[N\], torques in \[Nm\].
    pub sensor_wrench: Option<Vector6>,
}

impl<const N: usize> JointState<N> {
    /// Creates a new state without sensor measurement.
    pub fn new(q: JointVector<N>, dq: JointVector<N>, time: Duration) -> Self {
        JointState {
            q,
            dq,
            time,
            sensor_wrench: None,
        }
    }
    /// Attaches a force torque sensor measurement.
    pub fn with_sensor_wrench(mut self, wrench: Vector6) -> Self {
        self.sensor_wrench = Some(wrench);
        self
    }
}

/// Stores joint-level torque commands without gravity and friction.
#[derive(Debug, Copy, Clone, PartialEq)]
#[allow(non_snake_case)]
pub struct Torques<const N: usize> {
    /// Desired torques in \[Nm\].
    pub tau_J: JointVector<N>,
}

impl<const N: usize> From<JointVector<N>> for Torques<N> {
    fn from(vector: JointVector<N>) -> Self {
        Torques::new(vector)
    }
}

impl<const N: usize> Torques<N> {
    /// Creates a new Torques instance
    /// # Arguments
    /// * `torques` - Desired joint-level torques in \[Nm\].
    pub fn new(torques: JointVector<N>) -> Self {
        Torques { tau_J: torques }
    }
    /// A command which lets every joint go limp.
    pub fn zeros() -> Self {
        Torques::new(JointVector::<N>::zeros())
    }
    /// Determines whether all commanded torques are zero.
    pub fn is_zero(&self) -> bool {
        self.tau_J.iter().all(|x| *x == 0.)
    }
}
