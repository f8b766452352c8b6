// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains a serial chain of revolute joints which implements [`KinematicsProvider`].
use std::collections::HashSet;

use nalgebra::{Isometry3, Matrix3, Point3, Translation3, Unit, UnitQuaternion, Vector3};

use crate::exception::{create_configuration_exception, create_model_exception};
use crate::model::KinematicsProvider;
use crate::utils::{Frame, Jacobian, JointMatrix, JointVector};
use crate::ImpedanceResult;

/// Step used for the finite differences of the mass matrix.
const DIFFERENTIATION_STEP: f64 = 1e-6;

/// Type of an actuated joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointKind {
    /// Revolute joint with a finite effort limit.
    Revolute,
    /// Revolute joint without limits. Its effort limit is reported as NaN.
    Continuous,
}

/// Mass properties of the link attached to a joint, expressed in the link frame.
#[derive(Debug, Clone)]
pub struct LinkInertia {
    /// Mass in \[kg\].
    pub mass: f64,
    /// Center of mass in the link frame in \[m\].
    pub center_of_mass: Vector3<f64>,
    /// Rotational inertia with respect to the center of mass in \[kg * m^2\].
    pub inertia: Matrix3<f64>,
}

impl LinkInertia {
    /// A point mass located at `center_of_mass`.
    pub fn point_mass(mass: f64, center_of_mass: Vector3<f64>) -> Self {
        LinkInertia {
            mass,
            center_of_mass,
            inertia: Matrix3::zeros(),
        }
    }
    /// A link without mass.
    pub fn massless() -> Self {
        LinkInertia::point_mass(0., Vector3::zeros())
    }
}

/// One actuated joint of a [`SerialChain`] together with the link it moves.
#[derive(Debug, Clone)]
pub struct ChainJoint {
    /// Name of the joint.
    pub name: String,
    /// Name of the link moved by this joint.
    pub child_link: String,
    /// Static transform from the parent link frame to the joint frame.
    pub origin: Isometry3<f64>,
    /// Rotation axis in the joint frame.
    pub axis: Unit<Vector3<f64>>,
    /// Joint type.
    pub kind: JointKind,
    /// Effort limit in \[Nm\]. Ignored for continuous joints.
    pub effort_limit: f64,
    /// Mass properties of the child link.
    pub inertia: LinkInertia,
}

impl ChainJoint {
    /// Creates a massless revolute joint.
    pub fn revolute<S: Into<String>>(
        name: S,
        child_link: S,
        origin: Isometry3<f64>,
        axis: Vector3<f64>,
        effort_limit: f64,
    ) -> Self {
        ChainJoint {
            name: name.into(),
            child_link: child_link.into(),
            origin,
            axis: Unit::new_normalize(axis),
            kind: JointKind::Revolute,
            effort_limit,
            inertia: LinkInertia::massless(),
        }
    }
    /// Turns the joint into a continuous joint.
    pub fn continuous(mut self) -> Self {
        self.kind = JointKind::Continuous;
        self
    }
    /// Sets the mass properties of the child link.
    pub fn with_inertia(mut self, inertia: LinkInertia) -> Self {
        self.inertia = inertia;
        self
    }
}

/// Serial chain of `N` revolute joints from a base link to an end effector link.
///
/// Forward kinematics compose `origin * rotation(axis, q)` joint by joint. The dynamic terms are
/// derived from the link inertias: the mass matrix is accumulated from the link Jacobians,
/// the gravity vector from the potential energy and the Coriolis vector from finite differences
/// of the mass matrix.
#[derive(Debug, Clone)]
pub struct SerialChain<const N: usize> {
    base_link: String,
    end_effector_link: String,
    joints: [ChainJoint; N],
    tool_offset: Isometry3<f64>,
    gravity_earth: Vector3<f64>,
}

impl<const N: usize> SerialChain<N> {
    /// Creates a new chain.
    /// # Arguments
    /// * `base_link` - Name of the root link.
    /// * `end_effector_link` - Name of the controlled link.
    /// * `joints` - Actuated joints ordered from base to tip.
    /// * `tool_offset` - End effector pose in the frame of the last child link.
    /// # Errors
    /// * ConfigurationException if the chain is empty or link names are empty or not unique.
    pub fn new<S: Into<String>>(
        base_link: S,
        end_effector_link: S,
        joints: [ChainJoint; N],
        tool_offset: Isometry3<f64>,
    ) -> ImpedanceResult<Self> {
        let base_link = base_link.into();
        let end_effector_link = end_effector_link.into();
        if N == 0 {
            return Err(create_configuration_exception(
                "kinematic chain has no actuated joints",
            ));
        }
        let mut links = HashSet::new();
        for link in std::iter::once(&base_link)
            .chain(joints.iter().map(|joint| &joint.child_link))
            .chain(std::iter::once(&end_effector_link))
        {
            if link.is_empty() {
                return Err(create_configuration_exception(
                    "kinematic chain contains an unnamed link",
                ));
            }
            if !links.insert(link.clone()) {
                return Err(create_configuration_exception(format!(
                    "link {} appears more than once in the kinematic chain",
                    link
                )));
            }
        }
        Ok(SerialChain {
            base_link,
            end_effector_link,
            joints,
            tool_offset,
            gravity_earth: Vector3::new(0., 0., -9.81),
        })
    }

    /// Sets the gravity vector in base frame. Unit: [m / s^2]. Defaults to [0.0, 0.0, -9.81].
    pub fn with_gravity(mut self, gravity_earth: Vector3<f64>) -> Self {
        self.gravity_earth = gravity_earth;
        self
    }

    /// Joint definitions ordered from base to tip.
    pub fn joints(&self) -> &[ChainJoint; N] {
        &self.joints
    }

    /// Poses of all child links in base frame.
    pub fn link_frames(&self, q: &JointVector<N>) -> [Frame; N] {
        let mut frames = [Isometry3::identity(); N];
        let mut parent = Isometry3::identity();
        for (i, joint) in self.joints.iter().enumerate() {
            let rotation = UnitQuaternion::from_axis_angle(&joint.axis, q[i]);
            parent = parent * joint.origin * Isometry3::from_parts(Translation3::identity(), rotation);
            frames[i] = parent;
        }
        frames
    }

    /// Jacobian of a point rigidly attached to link `last`, relative to the base frame.
    /// Columns of joints after `last` are zero.
    fn point_jacobian(&self, frames: &[Frame; N], point: &Vector3<f64>, last: usize) -> Jacobian<N> {
        let mut jacobian = Jacobian::<N>::zeros();
        for (i, joint) in self.joints.iter().enumerate().take(last + 1) {
            let z = frames[i].rotation * joint.axis.into_inner();
            let lever = point - frames[i].translation.vector;
            jacobian.fixed_view_mut::<3, 1>(0, i).copy_from(&z.cross(&lever));
            jacobian.fixed_view_mut::<3, 1>(3, i).copy_from(&z);
        }
        jacobian
    }

    fn kinetic_energy_metric(&self, q: &JointVector<N>, dq: &JointVector<N>) -> f64 {
        dq.dot(&(self.mass(q) * dq))
    }
}

impl<const N: usize> KinematicsProvider<N> for SerialChain<N> {
    fn base_link(&self) -> &str {
        &self.base_link
    }

    fn end_effector_link(&self) -> &str {
        &self.end_effector_link
    }

    fn contains_link(&self, link: &str) -> bool {
        link == self.base_link
            || link == self.end_effector_link
            || self.joints.iter().any(|joint| joint.child_link == link)
    }

    fn effort_limits(&self) -> JointVector<N> {
        JointVector::<N>::from_fn(|i, _| match self.joints[i].kind {
            JointKind::Revolute => self.joints[i].effort_limit,
            JointKind::Continuous => f64::NAN,
        })
    }

    fn pose(&self, link: &str, q: &JointVector<N>) -> ImpedanceResult<Frame> {
        if link == self.base_link {
            return Ok(Isometry3::identity());
        }
        if link == self.end_effector_link {
            return Ok(self.end_effector_pose(q));
        }
        match self.joints.iter().position(|joint| joint.child_link == link) {
            Some(index) => Ok(self.link_frames(q)[index]),
            None => Err(create_model_exception(format!(
                "{} is not part of the kinematic chain from {} to {}",
                link, self.base_link, self.end_effector_link
            ))),
        }
    }

    fn end_effector_pose(&self, q: &JointVector<N>) -> Frame {
        self.link_frames(q)[N - 1] * self.tool_offset
    }

    fn zero_jacobian(&self, q: &JointVector<N>) -> Jacobian<N> {
        let frames = self.link_frames(q);
        let tip = (frames[N - 1] * self.tool_offset).translation.vector;
        self.point_jacobian(&frames, &tip, N - 1)
    }

    fn mass(&self, q: &JointVector<N>) -> JointMatrix<N> {
        let frames = self.link_frames(q);
        let mut mass = JointMatrix::<N>::zeros();
        for (k, joint) in self.joints.iter().enumerate() {
            let link = &joint.inertia;
            let center_of_mass = frames[k] * Point3::from(link.center_of_mass);
            let jacobian = self.point_jacobian(&frames, &center_of_mass.coords, k);
            let linear = jacobian.fixed_rows::<3>(0);
            let angular = jacobian.fixed_rows::<3>(3);
            let rotation = frames[k].rotation.to_rotation_matrix();
            let inertia = rotation.matrix() * link.inertia * rotation.matrix().transpose();
            mass += linear.transpose() * linear * link.mass
                + angular.transpose() * inertia * angular;
        }
        mass
    }

    fn coriolis(&self, q: &JointVector<N>, dq: &JointVector<N>) -> JointVector<N> {
        let h = DIFFERENTIATION_STEP;
        // c = dM/dt * dq - 1/2 * d(dq^T M dq)/dq
        let mass_rate = (self.mass(&(q + dq * h)) - self.mass(&(q - dq * h))) / (2. * h);
        let mut energy_gradient = JointVector::<N>::zeros();
        for i in 0..N {
            let mut step = JointVector::<N>::zeros();
            step[i] = h;
            energy_gradient[i] = (self.kinetic_energy_metric(&(q + step), dq)
                - self.kinetic_energy_metric(&(q - step), dq))
                / (2. * h);
        }
        mass_rate * dq - energy_gradient * 0.5
    }

    fn gravity(&self, q: &JointVector<N>) -> JointVector<N> {
        let frames = self.link_frames(q);
        let mut gravity = JointVector::<N>::zeros();
        for (k, joint) in self.joints.iter().enumerate() {
            let link = &joint.inertia;
            if link.mass == 0. {
                continue;
            }
            let center_of_mass = frames[k] * Point3::from(link.center_of_mass);
            let jacobian = self.point_jacobian(&frames, &center_of_mass.coords, k);
            gravity -= jacobian.fixed_rows::<3>(0).transpose() * (self.gravity_earth * link.mass);
        }
        gravity
    }
}
