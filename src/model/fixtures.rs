// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Chains shared by the unit tests.
use nalgebra::{Isometry3, Matrix3, Vector3};

use crate::model::{ChainJoint, LinkInertia, SerialChain};

/// Two-link arm moving in the horizontal plane with point masses at the link tips.
pub(crate) fn planar_two_link(m1: f64, m2: f64, l1: f64, l2: f64) -> SerialChain<2> {
    SerialChain::new(
        "base_link",
        "tool0",
        [
            ChainJoint::revolute("joint1", "link1", Isometry3::identity(), Vector3::z(), 50.)
                .with_inertia(LinkInertia::point_mass(m1, Vector3::new(l1, 0., 0.))),
            ChainJoint::revolute(
                "joint2",
                "link2",
                Isometry3::translation(l1, 0., 0.),
                Vector3::z(),
                50.,
            )
            .with_inertia(LinkInertia::point_mass(m2, Vector3::new(l2, 0., 0.))),
        ],
        Isometry3::translation(l2, 0., 0.),
    )
    .unwrap()
}

/// Single link swinging in the vertical x-z plane.
pub(crate) fn vertical_pendulum(mass: f64, length: f64) -> SerialChain<1> {
    SerialChain::new(
        "base_link",
        "tool0",
        [
            ChainJoint::revolute("joint1", "link1", Isometry3::identity(), Vector3::y(), 20.)
                .with_inertia(LinkInertia::point_mass(mass, Vector3::new(length, 0., 0.))),
        ],
        Isometry3::translation(length, 0., 0.),
    )
    .unwrap()
}

/// Redundant seven-joint arm with alternating z/y axes and a continuous last joint.
pub(crate) fn seven_dof_arm() -> SerialChain<7> {
    let origins = [
        Isometry3::translation(0., 0., 0.333),
        Isometry3::identity(),
        Isometry3::translation(0., 0., 0.316),
        Isometry3::translation(0.0825, 0., 0.),
        Isometry3::translation(-0.0825, 0., 0.384),
        Isometry3::identity(),
        Isometry3::translation(0.088, 0., 0.),
    ];
    let axes = [
        Vector3::z(),
        Vector3::y(),
        Vector3::z(),
        Vector3::y(),
        Vector3::z(),
        Vector3::y(),
        Vector3::z(),
    ];
    let limits = [87., 87., 87., 87., 12., 12., 12.];
    let masses = [4.0, 4.0, 3.0, 3.0, 2.5, 1.5, 0.7];
    let joints: [ChainJoint; 7] = std::array::from_fn(|i| {
        let joint = ChainJoint::revolute(
            format!("joint{}", i + 1),
            format!("link{}", i + 1),
            origins[i],
            axes[i],
            limits[i],
        )
        .with_inertia(LinkInertia {
            mass: masses[i],
            center_of_mass: Vector3::new(0., 0., 0.05),
            inertia: Matrix3::identity() * 0.01,
        });
        if i == 6 {
            joint.continuous()
        } else {
            joint
        }
    });
    SerialChain::new(
        "base_link",
        "tool0",
        joints,
        Isometry3::translation(0., 0., 0.107),
    )
    .unwrap()
}
