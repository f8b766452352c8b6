// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the optional gravity and Coriolis feed-forward.
use crate::model::KinematicsProvider;
use crate::utils::JointVector;

/// Adds model-based torques on top of the filtered command. Both terms are independently enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicsCompensator {
    /// Adds the gravity torque.
    pub gravity: bool,
    /// Adds the Coriolis and centrifugal torque.
    pub coriolis: bool,
}

impl DynamicsCompensator {
    /// Creates a new compensator.
    pub fn new(gravity: bool, coriolis: bool) -> Self {
        DynamicsCompensator { gravity, coriolis }
    }

    /// Computes the sum of all enabled compensation torques for the current joint state.
    /// # Arguments
    /// * `model` - Provides the gravity torque.
    /// * `q` - Joint position of the tick.
    /// * `tau_coriolis` - Coriolis torque of the tick. It is evaluated once per tick because the
    ///   safety filter needs it as well.
    pub fn compensation<K: KinematicsProvider<N>, const N: usize>(
        &self,
        model: &K,
        q: &JointVector<N>,
        tau_coriolis: &JointVector<N>,
    ) -> JointVector<N> {
        let mut torque = JointVector::<N>::zeros();
        if self.gravity {
            torque += model.gravity(q);
        }
        if self.coriolis {
            torque += tau_coriolis;
        }
        torque
    }
}

#[cfg(test)]
mod tests {
    use crate::controller::dynamics::DynamicsCompensator;
    use crate::model::fixtures::{planar_two_link, vertical_pendulum};
    use crate::model::KinematicsProvider;
    use crate::utils::JointVector;

    #[test]
    fn disabled_compensation_is_zero() {
        let chain = vertical_pendulum(2., 0.5);
        let torque = DynamicsCompensator::default().compensation(
            &chain,
            &JointVector::<1>::new(0.),
            &JointVector::<1>::new(1.),
        );
        assert_eq!(torque[0], 0.);
    }

    #[test]
    fn gravity_only() {
        let chain = vertical_pendulum(2., 0.5);
        let q = JointVector::<1>::new(0.3);
        let torque =
            DynamicsCompensator::new(true, false).compensation(&chain, &q, &JointVector::<1>::new(2.));
        assert!((torque - chain.gravity(&q)).norm() < 1e-12);
    }

    #[test]
    fn terms_add_up() {
        let chain = planar_two_link(2., 1., 0.6, 0.4);
        let q = JointVector::<2>::new(0.2, 0.9);
        let dq = JointVector::<2>::new(1.0, -0.5);
        let coriolis = chain.coriolis(&q, &dq);
        let both = DynamicsCompensator::new(true, true).compensation(&chain, &q, &coriolis);
        let expected = chain.gravity(&q) + coriolis;
        assert!((both - expected).norm() < 1e-12);
        // horizontal plane: no gravity torque
        assert!(chain.gravity(&q).norm() < 1e-12);
        assert!(both.norm() > 0.);
    }
}
