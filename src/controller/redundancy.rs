// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the nullspace projection which lets redundant arms pursue a postural objective
//! without disturbing the end effector.
use nalgebra::Matrix6;

use crate::controller::impedance_law::critical_damping;
use crate::utils::{Jacobian, JointMatrix, JointVector};

/// Below this manipulability the pseudo-inverse is damped.
pub static MANIPULABILITY_THRESHOLD: f64 = 0.01;
/// Damping of the pseudo-inverse at a singular configuration.
pub static MAX_DAMPING: f64 = 0.15;

/// Computes the manipulability measure `sqrt(det(J * J^T))`.
pub fn manipulability<const N: usize>(jacobian: &Jacobian<N>) -> f64 {
    let determinant = (jacobian * jacobian.transpose()).determinant();
    if determinant > 0. {
        determinant.sqrt()
    } else {
        0.
    }
}

/// Damping which grows from zero at the manipulability threshold to [`MAX_DAMPING`] at a
/// singularity (Nakamura's variable damping).
fn adaptive_damping(manipulability: f64) -> f64 {
    if manipulability < MANIPULABILITY_THRESHOLD {
        let ratio = manipulability / MANIPULABILITY_THRESHOLD;
        MAX_DAMPING * f64::sqrt(1. - ratio * ratio)
    } else {
        0.
    }
}

/// Computes the damped least-squares pseudo-inverse of `J^T`, i.e. `(J * J^T + λ² I)^-1 * J`.
///
/// Away from singularities `λ = 0` and the result is the exact pseudo-inverse. Returns `None` if
/// the regularized 6x6 matrix cannot be decomposed, which only happens for non-finite Jacobians.
pub fn jacobian_transpose_pseudo_inverse<const N: usize>(
    jacobian: &Jacobian<N>,
) -> Option<Jacobian<N>> {
    let lambda = adaptive_damping(manipulability(jacobian));
    let regularized: Matrix6<f64> =
        jacobian * jacobian.transpose() + Matrix6::identity() * (lambda * lambda);
    let inverse = regularized.cholesky()?.inverse();
    let pseudo_inverse = inverse * jacobian;
    if pseudo_inverse.iter().all(|x| x.is_finite()) {
        Some(pseudo_inverse)
    } else {
        None
    }
}

/// Computes the dynamically inconsistent nullspace projector `P = I - J^T * J^{T+}`.
///
/// If no pseudo-inverse can be formed the projector is zero, so nothing passes through it.
pub fn nullspace_projector<const N: usize>(jacobian: &Jacobian<N>) -> JointMatrix<N> {
    match jacobian_transpose_pseudo_inverse(jacobian) {
        Some(pseudo_inverse) => JointMatrix::<N>::identity() - jacobian.transpose() * pseudo_inverse,
        None => JointMatrix::<N>::zeros(),
    }
}

/// Joint-space spring-damper pulling the arm towards a reference posture inside the nullspace of
/// the end effector task.
#[derive(Debug, Clone)]
pub struct NullspaceTask<const N: usize> {
    reference_posture: JointVector<N>,
    stiffness: f64,
    damping: f64,
    enabled: bool,
}

impl<const N: usize> NullspaceTask<N> {
    /// Creates a new postural task with critical damping.
    /// # Arguments
    /// * `stiffness` - Joint stiffness in \[Nm/rad\].
    /// * `enabled` - Whether the task produces torque at all. Chains with six or fewer joints
    ///   have no nullspace and never produce torque.
    pub fn new(stiffness: f64, enabled: bool) -> Self {
        NullspaceTask {
            reference_posture: JointVector::<N>::zeros(),
            stiffness,
            damping: critical_damping(stiffness),
            enabled,
        }
    }
    /// Stores the posture the task pulls towards. Called once at activation.
    pub fn set_reference_posture(&mut self, q0: &JointVector<N>) {
        self.reference_posture = *q0;
    }
    /// The posture the task pulls towards.
    pub fn reference_posture(&self) -> &JointVector<N> {
        &self.reference_posture
    }
    /// Determines whether the task contributes torque.
    pub fn is_active(&self) -> bool {
        self.enabled && N > 6
    }
    /// Computes `P * (K_null * (q0 - q) - D_null * dq)`.
    pub fn torque(
        &self,
        jacobian: &Jacobian<N>,
        q: &JointVector<N>,
        dq: &JointVector<N>,
    ) -> JointVector<N> {
        if !self.is_active() {
            return JointVector::<N>::zeros();
        }
        let posture_torque =
            (self.reference_posture - q) * self.stiffness - dq * self.damping;
        nullspace_projector(jacobian) * posture_torque
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::controller::redundancy::{
        jacobian_transpose_pseudo_inverse, manipulability, nullspace_projector, NullspaceTask,
        MANIPULABILITY_THRESHOLD,
    };
    use crate::model::fixtures::{planar_two_link, seven_dof_arm};
    use crate::model::KinematicsProvider;
    use crate::utils::{Jacobian, JointVector};

    fn bent_posture() -> JointVector<7> {
        JointVector::<7>::from_row_slice(&[0.1, -0.4, 0.2, -2.1, 0.1, 1.7, 0.8])
    }

    proptest! {
        #[test]
        fn projector_output_does_not_move_the_end_effector(v in prop::array::uniform7(-50.0..50.0f64)) {
            let chain = seven_dof_arm();
            let jacobian = chain.zero_jacobian(&bent_posture());
            prop_assume!(manipulability(&jacobian) >= MANIPULABILITY_THRESHOLD);
            let v = JointVector::<7>::from_row_slice(&v);
            let projected = nullspace_projector(&jacobian) * v;
            prop_assert!((jacobian * projected).norm() < 1e-8 * (1. + v.norm()));
        }
    }

    #[test]
    fn bent_posture_is_not_singular() {
        let jacobian = seven_dof_arm().zero_jacobian(&bent_posture());
        assert!(manipulability(&jacobian) >= MANIPULABILITY_THRESHOLD);
    }

    #[test]
    fn projector_is_idempotent() {
        let jacobian = seven_dof_arm().zero_jacobian(&bent_posture());
        let projector = nullspace_projector(&jacobian);
        assert!((projector * projector - projector).norm() < 1e-8);
    }

    #[test]
    fn singular_jacobian_stays_finite() {
        let chain = seven_dof_arm();
        let stretched = chain.zero_jacobian(&JointVector::<7>::zeros());
        assert!(manipulability(&stretched) < MANIPULABILITY_THRESHOLD);
        for jacobian in [stretched, Jacobian::<7>::zeros()] {
            let pseudo_inverse = jacobian_transpose_pseudo_inverse(&jacobian).unwrap();
            assert!(pseudo_inverse.iter().all(|x| x.is_finite()));
            assert!(nullspace_projector(&jacobian).iter().all(|x| x.is_finite()));
        }
    }

    #[test]
    fn non_finite_jacobian_blocks_the_task() {
        let mut jacobian = Jacobian::<7>::zeros();
        jacobian[(0, 0)] = f64::NAN;
        assert!(nullspace_projector(&jacobian).iter().all(|x| *x == 0.));
    }

    #[test]
    fn disabled_task_gives_zero_torque() {
        let chain = seven_dof_arm();
        let q = bent_posture();
        let mut task = NullspaceTask::<7>::new(10., false);
        task.set_reference_posture(&JointVector::<7>::zeros());
        let torque = task.torque(&chain.zero_jacobian(&q), &q, &JointVector::<7>::repeat(0.3));
        assert_eq!(torque, JointVector::<7>::zeros());
    }

    #[test]
    fn non_redundant_chain_gives_zero_torque() {
        let chain = planar_two_link(1., 1., 1., 1.);
        let q = JointVector::<2>::new(0.3, 0.5);
        let task = NullspaceTask::<2>::new(10., true);
        assert!(!task.is_active());
        assert_eq!(task.torque(&chain.zero_jacobian(&q), &q, &q), JointVector::<2>::zeros());
    }

    #[test]
    fn task_pulls_towards_reference_posture() {
        let chain = seven_dof_arm();
        let q0 = bent_posture();
        let mut task = NullspaceTask::<7>::new(10., true);
        task.set_reference_posture(&q0);
        let jacobian = chain.zero_jacobian(&q0);
        let at_rest = task.torque(&jacobian, &q0, &JointVector::<7>::zeros());
        assert!(at_rest.norm() < 1e-12);

        let mut q = q0;
        q[2] += 0.2;
        let torque = task.torque(&jacobian, &q, &JointVector::<7>::zeros());
        assert!(torque.norm() > 0.);
        assert!((jacobian * torque).norm() < 1e-8);
        // restoring: the projected torque does negative work on the displacement
        assert!(torque.dot(&(q - q0)) < 0.);
    }
}
