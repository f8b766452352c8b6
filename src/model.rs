// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the kinematics and dynamics provider contract and a reference serial chain model.
use crate::utils::{Frame, Jacobian, JointMatrix, JointVector};
use crate::ImpedanceResult;

#[cfg(test)]
pub(crate) mod fixtures;
mod serial_chain;

pub use serial_chain::{ChainJoint, JointKind, LinkInertia, SerialChain};

/// Calculates poses, Jacobians and dynamic properties of a manipulator with `N` actuated joints.
///
/// The controller evaluates every method with the joint state of the current tick, nothing is
/// cached across ticks. All quantities are expressed in the base frame of the chain.
pub trait KinematicsProvider<const N: usize> {
    /// Name of the root link of the chain.
    fn base_link(&self) -> &str;

    /// Name of the link whose frame is controlled.
    fn end_effector_link(&self) -> &str;

    /// Determines whether `link` is part of the chain from the base to the end effector.
    fn contains_link(&self, link: &str) -> bool;

    /// Per-joint effort limits in \[Nm\]. An entry of NaN marks an unconstrained joint.
    fn effort_limits(&self) -> JointVector<N>;

    /// Gets the pose of the given link in base frame.
    /// # Arguments
    /// * `link` - Name of the desired link.
    /// * `q` - Joint position.
    /// # Errors
    /// * ModelException if the link is not part of the chain.
    fn pose(&self, link: &str, q: &JointVector<N>) -> ImpedanceResult<Frame>;

    /// Gets the pose of the end effector in base frame.
    fn end_effector_pose(&self, q: &JointVector<N>) -> Frame;

    /// Gets the 6xN Jacobian of the end effector relative to the base frame.
    ///
    /// Rows 0-2 map to the linear velocity, rows 3-5 to the angular velocity.
    fn zero_jacobian(&self, q: &JointVector<N>) -> Jacobian<N>;

    /// Calculates the NxN mass matrix. Unit: [kg \times m^2].
    fn mass(&self, q: &JointVector<N>) -> JointMatrix<N>;

    /// Calculates the Coriolis and centrifugal torque vector `c = C(q, dq) * dq` in \[Nm\].
    fn coriolis(&self, q: &JointVector<N>, dq: &JointVector<N>) -> JointVector<N>;

    /// Calculates the gravity torque vector. Unit: \[Nm\].
    fn gravity(&self, q: &JointVector<N>) -> JointVector<N>;
}
