// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the final per-joint torque saturation.
use crate::utils::JointVector;

/// Clamps every torque to `[-limit, limit]` of its joint.
///
/// A NaN limit marks an unconstrained joint whose torque passes unchanged.
/// # Arguments
/// * `tau` - Torque command in \[Nm\].
/// * `limits` - Symmetric effort limits in \[Nm\], see
///   [`KinematicsProvider::effort_limits`](`crate::model::KinematicsProvider::effort_limits`).
pub fn limit_efforts<const N: usize>(tau: &JointVector<N>, limits: &JointVector<N>) -> JointVector<N> {
    tau.zip_map(limits, |torque, limit| {
        if limit.is_nan() {
            torque
        } else {
            let limit = limit.abs();
            torque.clamp(-limit, limit)
        }
    })
}
