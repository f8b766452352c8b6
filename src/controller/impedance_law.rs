// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the Cartesian spring-damper law which maps a motion error to joint torques.
use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};

use crate::controller::frame_transformer::display_tensor_in_base_link;
use crate::utils::{Jacobian, JointVector, Matrix6, Vector6};

/// Frame in which the stiffness and damping tensors are diagonal.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceFrame {
    /// The tensors rotate with the end effector and are re-expressed in the base frame every tick.
    #[default]
    EndEffector,
    /// The tensors are fixed in the base frame.
    Base,
}

/// Damping which critically damps a single degree of freedom with unit mass and stiffness `k`.
///
/// Every Cartesian axis is treated as decoupled from the others; cross-coupling through the
/// end effector inertia is not modeled.
pub fn critical_damping(stiffness: f64) -> f64 {
    2. * f64::sqrt(stiffness)
}

/// Stiffness and damping of the virtual spring-damper, both diagonal in their reference frame.
#[derive(Debug, Clone)]
pub struct CartesianImpedance {
    stiffness: Matrix6,
    damping: Matrix6,
    frame: ReferenceFrame,
}

impl CartesianImpedance {
    /// Creates a new impedance with critically damped axes.
    /// # Arguments
    /// * `stiffness` - Translational stiffness in \[N/m\] (entries 0-2) and rotational stiffness in
    ///   \[Nm/rad\] (entries 3-5).
    /// * `frame` - Frame in which the tensors are diagonal.
    pub fn new(stiffness: &Vector6, frame: ReferenceFrame) -> Self {
        CartesianImpedance {
            stiffness: Matrix6::from_diagonal(stiffness),
            damping: Matrix6::from_diagonal(&stiffness.map(critical_damping)),
            frame,
        }
    }
    /// Stiffness tensor in its reference frame.
    pub fn stiffness(&self) -> &Matrix6 {
        &self.stiffness
    }
    /// Damping tensor in its reference frame.
    pub fn damping(&self) -> &Matrix6 {
        &self.damping
    }
    /// Reference frame of the tensors.
    pub fn frame(&self) -> ReferenceFrame {
        self.frame
    }
    /// Stiffness and damping displayed in the base frame.
    /// # Arguments
    /// * `end_effector_rotation` - Current end effector orientation in base frame.
    pub fn in_base_frame(&self, end_effector_rotation: &UnitQuaternion<f64>) -> (Matrix6, Matrix6) {
        match self.frame {
            ReferenceFrame::EndEffector => (
                display_tensor_in_base_link(&self.stiffness, end_effector_rotation),
                display_tensor_in_base_link(&self.damping, end_effector_rotation),
            ),
            ReferenceFrame::Base => (self.stiffness, self.damping),
        }
    }
}

/// Computes the task wrench `K * e - D * x_dot + f`.
/// # Arguments
/// * `stiffness` - Stiffness tensor in the frame of the error.
/// * `damping` - Damping tensor in the frame of the error.
/// * `error` - Motion error `target - current`.
/// * `velocity` - End effector twist `J * q_dot`.
/// * `feedforward` - Wrench superimposed on the spring-damper.
pub fn task_wrench(
    stiffness: &Matrix6,
    damping: &Matrix6,
    error: &Vector6,
    velocity: &Vector6,
    feedforward: &Vector6,
) -> Vector6 {
    stiffness * error - damping * velocity + feedforward
}

/// Maps a task wrench to joint torques with the Jacobian transpose.
pub fn task_torque<const N: usize>(jacobian: &Jacobian<N>, wrench: &Vector6) -> JointVector<N> {
    jacobian.transpose() * wrench
}
