// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! contains useful type definitions and conversion functions.
use nalgebra::{Isometry3, Quaternion, SMatrix, SVector, Translation3, UnitQuaternion};

/// Orientation and position of a link, expressed in the base frame.
pub type Frame = Isometry3<f64>;
/// A 6D twist or wrench. Entries 0-2 are the linear block, entries 3-5 the angular block.
pub type Vector6 = SVector<f64, 6>;
/// A Matrix with 6 rows and 6 columns, e.g. a Cartesian stiffness or damping tensor.
pub type Matrix6 = SMatrix<f64, 6, 6>;
/// A vector with one entry per actuated joint.
pub type JointVector<const N: usize> = SVector<f64, N>;
/// A Matrix with 6 rows and one column per actuated joint.
pub type Jacobian<const N: usize> = SMatrix<f64, 6, N>;
/// A Matrix with one row and one column per actuated joint.
pub type JointMatrix<const N: usize> = SMatrix<f64, N, N>;

/// Builds a frame from a position and an orientation quaternion given as `[x, y, z, w]`.
///
/// The quaternion does not need to be normalized. Returns None if it has zero (or non-finite)
/// norm or if any entry is not finite.
pub fn pose_to_isometry(position: &[f64; 3], orientation: &[f64; 4]) -> Option<Isometry3<f64>> {
    if position
        .iter()
        .chain(orientation.iter())
        .any(|x| !x.is_finite())
    {
        return None;
    }
    let quaternion = Quaternion::new(orientation[3], orientation[0], orientation[1], orientation[2]);
    let norm = quaternion.norm();
    if norm < f64::EPSILON || !norm.is_finite() {
        return None;
    }
    Some(Isometry3::from_parts(
        Translation3::new(position[0], position[1], position[2]),
        UnitQuaternion::from_quaternion(quaternion),
    ))
}

/// Returns true if no element is NaN or infinite.
pub fn all_finite<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> bool {
    values.into_iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod test {
    use crate::utils::{all_finite, pose_to_isometry, JointVector};

    #[test]
    fn pose_normalizes_quaternion() {
        let pose = pose_to_isometry(&[0.; 3], &[0., 0., 2., 0.]).unwrap();
        assert!((pose.rotation.angle() - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn pose_keeps_position() {
        let pose = pose_to_isometry(&[0.3, -0.1, 0.5], &[0., 0., 0.38268343, 0.92387953]).unwrap();
        assert_eq!(pose.translation.vector.as_slice(), &[0.3, -0.1, 0.5]);
        assert!((pose.rotation.angle() - std::f64::consts::FRAC_PI_4).abs() < 1e-6);
    }

    #[test]
    fn pose_rejects_degenerate_input() {
        assert!(pose_to_isometry(&[0.; 3], &[0.; 4]).is_none());
        assert!(pose_to_isometry(&[f64::NAN, 0., 0.], &[0., 0., 0., 1.]).is_none());
        assert!(pose_to_isometry(&[0.; 3], &[0., 0., f64::INFINITY, 1.]).is_none());
    }

    #[test]
    fn finite_check() {
        assert!(all_finite(&JointVector::<3>::new(1., -2., 0.)));
        assert!(!all_finite(&JointVector::<3>::new(1., f64::NAN, 0.)));
        assert!(!all_finite(&[f64::NEG_INFINITY]));
        assert!(all_finite(&[] as &[f64]));
    }
}
