// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains functions for computing the Cartesian motion and force error between the target and
//! the current end effector frame.
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::controller::frame_transformer::display_in_base_link;
use crate::utils::{Frame, Vector6};

/// Maximal orientation error in \[rad\] used to build up a restoring wrench in one tick.
pub static MAX_ANGLE: f64 = 1.0;
/// Maximal translation error in \[m\] used to build up a restoring wrench in one tick.
pub static MAX_DISTANCE: f64 = 1.0;

/// Selects how the orientation error is computed.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Rodrigues vector of the error rotation. Angle and distance are clamped to
    /// [`MAX_ANGLE`] and [`MAX_DISTANCE`].
    #[default]
    ClampedRodrigues,
    /// Half the sum of the cross products of corresponding body axes. This is a small-angle
    /// linearization without clamping and diverges from [`ErrorPolicy::ClampedRodrigues`] for
    /// large errors.
    AxisCrossProduct,
}

/// Computes the 6D motion error `target - current` in base frame.
///
/// # Arguments
/// * `target` - Target end effector frame in base frame.
/// * `current` - Current end effector frame in base frame.
/// * `policy` - How the orientation error is obtained.
/// # Return
/// Translation error in entries 0-2, rotation error in entries 3-5.
pub fn compute_motion_error(target: &Frame, current: &Frame, policy: ErrorPolicy) -> Vector6 {
    match policy {
        ErrorPolicy::ClampedRodrigues => clamped_rodrigues_error(target, current),
        ErrorPolicy::AxisCrossProduct => axis_cross_product_error(target, current),
    }
}

fn clamped_rodrigues_error(target: &Frame, current: &Frame) -> Vector6 {
    let rotation_error: UnitQuaternion<f64> = target.rotation * current.rotation.inverse();
    // only valid for angles within [0, pi)
    let rotation = match rotation_error.axis_angle() {
        Some((axis, angle)) => axis.into_inner() * f64::min(angle, MAX_ANGLE),
        None => Vector3::zeros(),
    };

    let translation = target.translation.vector - current.translation.vector;
    let distance = translation.norm();
    // the remaining error is handled in the next control cycle
    let translation = if distance > MAX_DISTANCE {
        translation * (MAX_DISTANCE / distance)
    } else {
        translation
    };

    let mut error = Vector6::zeros();
    error.fixed_rows_mut::<3>(0).copy_from(&translation);
    error.fixed_rows_mut::<3>(3).copy_from(&rotation);
    error
}

fn axis_cross_product_error(target: &Frame, current: &Frame) -> Vector6 {
    let mut rotation = Vector3::zeros();
    for axis in [Vector3::x(), Vector3::y(), Vector3::z()] {
        rotation += (current.rotation * axis).cross(&(target.rotation * axis));
    }
    let mut error = Vector6::zeros();
    error
        .fixed_rows_mut::<3>(0)
        .copy_from(&(target.translation.vector - current.translation.vector));
    error.fixed_rows_mut::<3>(3).copy_from(&(rotation * 0.5));
    error
}

/// Computes the wrench the controller has to superimpose in base frame.
///
/// # Arguments
/// * `target_wrench` - Target wrench, already in base frame.
/// * `sensor` - Measured wrench in the sensor frame together with the sensor orientation in base
///   frame, if a force torque sensor is configured.
pub fn compute_force_error(
    target_wrench: &Vector6,
    sensor: Option<(&Vector6, &UnitQuaternion<f64>)>,
) -> Vector6 {
    match sensor {
        Some((wrench, rotation)) => display_in_base_link(wrench, rotation) + target_wrench,
        None => *target_wrench,
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
    use proptest::prelude::*;

    use crate::controller::motion_error::{
        compute_force_error, compute_motion_error, ErrorPolicy, MAX_ANGLE, MAX_DISTANCE,
    };
    use crate::utils::{Frame, Vector6};

    fn any_frame() -> impl Strategy<Value = Frame> {
        (
            prop::array::uniform3(-5.0..5.0f64),
            prop::array::uniform3(-3.2..3.2f64),
        )
            .prop_map(|(p, r)| {
                Isometry3::from_parts(
                    Translation3::new(p[0], p[1], p[2]),
                    UnitQuaternion::from_euler_angles(r[0], r[1], r[2]),
                )
            })
    }

    proptest! {
        #[test]
        fn clamped_error_is_bounded(target in any_frame(), current in any_frame()) {
            let error = compute_motion_error(&target, &current, ErrorPolicy::ClampedRodrigues);
            prop_assert!(error.fixed_rows::<3>(0).norm() <= MAX_DISTANCE + 1e-12);
            prop_assert!(error.fixed_rows::<3>(3).norm() <= MAX_ANGLE + 1e-12);
        }

        #[test]
        fn policies_agree_for_small_errors(current in any_frame(), delta in prop::array::uniform3(-1e-3..1e-3f64)) {
            let target = Isometry3::from_parts(
                current.translation,
                UnitQuaternion::from_scaled_axis(Vector3::new(delta[0], delta[1], delta[2])) * current.rotation,
            );
            let rodrigues = compute_motion_error(&target, &current, ErrorPolicy::ClampedRodrigues);
            let cross = compute_motion_error(&target, &current, ErrorPolicy::AxisCrossProduct);
            prop_assert!((rodrigues - cross).norm() < 1e-6);
        }
    }

    #[test]
    fn large_translation_is_clamped_along_its_direction() {
        let target = Isometry3::translation(2.0, 0., 0.);
        let error = compute_motion_error(&target, &Isometry3::identity(), ErrorPolicy::ClampedRodrigues);
        assert!((error - Vector6::new(1., 0., 0., 0., 0., 0.)).norm() < 1e-12);
    }

    #[test]
    fn large_rotation_is_clamped() {
        let target = Isometry3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 2.5),
        );
        let error = compute_motion_error(&target, &Isometry3::identity(), ErrorPolicy::ClampedRodrigues);
        assert!((error - Vector6::new(0., 0., 0., 0., MAX_ANGLE, 0.)).norm() < 1e-12);
    }

    #[test]
    fn cross_product_policy_is_not_clamped() {
        let target = Isometry3::translation(0., -3.0, 0.);
        let error = compute_motion_error(&target, &Isometry3::identity(), ErrorPolicy::AxisCrossProduct);
        assert!((error[1] + 3.0).abs() < 1e-12);
    }

    #[test]
    fn identical_frames_have_no_error() {
        let frame = Isometry3::from_parts(
            Translation3::new(0.4, 0.1, 0.6),
            UnitQuaternion::from_euler_angles(3.1, 0.2, -1.0),
        );
        for policy in [ErrorPolicy::ClampedRodrigues, ErrorPolicy::AxisCrossProduct] {
            assert!(compute_motion_error(&frame, &frame, policy).norm() < 1e-12);
        }
    }

    #[test]
    fn sensor_wrench_is_superimposed_in_base_frame() {
        let target = Vector6::new(0., 0., -5., 0., 0., 0.);
        let measured = Vector6::new(1., 0., 0., 0., 0., 0.);
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let error = compute_force_error(&target, Some((&measured, &rotation)));
        assert!((error - Vector6::new(0., 1., -5., 0., 0., 0.)).norm() < 1e-12);
        assert_eq!(compute_force_error(&target, None), target);
    }
}
