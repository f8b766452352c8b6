// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains functions for re-expressing wrenches, twists and Cartesian tensors in another frame.
//!
//! All functions apply the pure rotation between the two frames. The translational offset between
//! the frame origins is not taken into account, i.e. a wrench is moved as if both origins coincided.
//! This matches the behavior the controllers have always had for sensor and hand frames; it is
//! exact only when the origins coincide.

use nalgebra::{Matrix3, UnitQuaternion};

use crate::utils::{Matrix6, Vector6};

/// Rotates the linear and the angular block of a 6D vector independently.
fn rotate_blocks(vector: &Vector6, rotation: &Matrix3<f64>) -> Vector6 {
    let mut out = Vector6::zeros();
    out.fixed_rows_mut::<3>(0)
        .copy_from(&(rotation * vector.fixed_rows::<3>(0)));
    out.fixed_rows_mut::<3>(3)
        .copy_from(&(rotation * vector.fixed_rows::<3>(3)));
    out
}

/// Treats the diagonal blocks as individual 2nd rank tensors and rotates them. Coupling blocks
/// are dropped.
fn rotate_tensor_blocks(tensor: &Matrix6, rotation: &Matrix3<f64>) -> Matrix6 {
    let mut out = Matrix6::zeros();
    out.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&(rotation * tensor.fixed_view::<3, 3>(0, 0) * rotation.transpose()));
    out.fixed_view_mut::<3, 3>(3, 3)
        .copy_from(&(rotation * tensor.fixed_view::<3, 3>(3, 3) * rotation.transpose()));
    out
}

/// Displays a 6D vector given in a link frame in the base frame.
/// # Arguments
/// * `vector` - Wrench or twist in the link frame.
/// * `link_rotation` - Orientation of the link in base frame.
pub fn display_in_base_link(vector: &Vector6, link_rotation: &UnitQuaternion<f64>) -> Vector6 {
    rotate_blocks(vector, link_rotation.to_rotation_matrix().matrix())
}

/// Displays a 6D vector given in the base frame in a link frame.
/// # Arguments
/// * `vector` - Wrench or twist in the base frame.
/// * `link_rotation` - Orientation of the link in base frame.
pub fn display_in_tip_link(vector: &Vector6, link_rotation: &UnitQuaternion<f64>) -> Vector6 {
    rotate_blocks(vector, link_rotation.inverse().to_rotation_matrix().matrix())
}

/// Displays a block-diagonal 6x6 tensor given in a link frame in the base frame by applying
/// `R * T * R^T` to each 3x3 diagonal block.
pub fn display_tensor_in_base_link(tensor: &Matrix6, link_rotation: &UnitQuaternion<f64>) -> Matrix6 {
    rotate_tensor_blocks(tensor, link_rotation.to_rotation_matrix().matrix())
}

/// Displays a block-diagonal 6x6 tensor given in the base frame in a link frame.
pub fn display_tensor_in_tip_link(tensor: &Matrix6, link_rotation: &UnitQuaternion<f64>) -> Matrix6 {
    rotate_tensor_blocks(
        tensor,
        link_rotation.inverse().to_rotation_matrix().matrix(),
    )
}

#[cfg(test)]
mod tests {
    use nalgebra::{UnitQuaternion, Vector3};
    use proptest::prelude::*;
    use std::f64::consts::FRAC_PI_2;

    use crate::controller::frame_transformer::{
        display_in_base_link, display_in_tip_link, display_tensor_in_base_link,
        display_tensor_in_tip_link,
    };
    use crate::utils::{Matrix6, Vector6};

    fn any_rotation() -> impl Strategy<Value = UnitQuaternion<f64>> {
        (-3.0..3.0f64, -3.0..3.0f64, -3.0..3.0f64)
            .prop_map(|(r, p, y)| UnitQuaternion::from_euler_angles(r, p, y))
    }

    fn any_vector() -> impl Strategy<Value = Vector6> {
        prop::array::uniform6(-100.0..100.0f64).prop_map(|v| Vector6::from_row_slice(&v))
    }

    proptest! {
        #[test]
        fn wrench_round_trip(wrench in any_vector(), rotation in any_rotation()) {
            let in_base = display_in_base_link(&wrench, &rotation);
            let back = display_in_tip_link(&in_base, &rotation);
            prop_assert!((back - wrench).norm() < 1e-9);
        }

        #[test]
        fn rotation_preserves_block_norms(wrench in any_vector(), rotation in any_rotation()) {
            let in_base = display_in_base_link(&wrench, &rotation);
            prop_assert!((in_base.fixed_rows::<3>(0).norm() - wrench.fixed_rows::<3>(0).norm()).abs() < 1e-9);
            prop_assert!((in_base.fixed_rows::<3>(3).norm() - wrench.fixed_rows::<3>(3).norm()).abs() < 1e-9);
        }

        #[test]
        fn tensor_round_trip(diagonal in any_vector(), rotation in any_rotation()) {
            let tensor = Matrix6::from_diagonal(&diagonal);
            let back = display_tensor_in_tip_link(&display_tensor_in_base_link(&tensor, &rotation), &rotation);
            prop_assert!((back - tensor).norm() < 1e-9);
        }
    }

    #[test]
    fn quarter_turn_swaps_axes() {
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let force_x = Vector6::new(1., 0., 0., 0., 0., 2.);
        let out = display_in_base_link(&force_x, &rotation);
        assert!((out - Vector6::new(0., 1., 0., 0., 0., 2.)).norm() < 1e-12);

        let stiffness = Matrix6::from_diagonal(&Vector6::new(100., 200., 300., 10., 20., 30.));
        let out = display_tensor_in_base_link(&stiffness, &rotation);
        let expected = Matrix6::from_diagonal(&Vector6::new(200., 100., 300., 20., 10., 30.));
        assert!((out - expected).norm() < 1e-9);
    }

    #[test]
    fn coupling_blocks_are_dropped() {
        let mut tensor = Matrix6::identity();
        tensor[(0, 4)] = 5.;
        tensor[(5, 1)] = -3.;
        let out = display_tensor_in_base_link(&tensor, &UnitQuaternion::identity());
        assert_eq!(out, Matrix6::identity());
    }

    #[test]
    fn isotropic_tensor_is_invariant() {
        let rotation = UnitQuaternion::from_euler_angles(0.3, -1.2, 2.0);
        let tensor = Matrix6::identity() * 42.;
        let out = display_tensor_in_base_link(&tensor, &rotation);
        assert!((out - tensor).norm() < 1e-9);
    }
}
