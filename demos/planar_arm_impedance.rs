// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use clap::Parser;
use impedance::{
    BarrierConfig, CartesianImpedanceController, ChainJoint, ControllerConfig, ImpedanceResult,
    JointState, JointVector, KinematicsProvider, LinkInertia, ReferenceFrame, SerialChain,
    StiffnessConfig, TargetPoseMessage,
};
use nalgebra::{Isometry3, Vector3};
use std::time::Duration;

/// An example which simulates a two-link arm in the horizontal plane and drives it with the
/// cartesian impedance controller. The end effector is pulled from its initial position towards
/// a target which is offset by `dx` and `dy`. With `--barrier` a half-space x <= barrier is
/// enforced by the planar control barrier filter.
#[derive(Parser, Debug)]
#[clap(name = "planar arm impedance")]
struct CommandLineArguments {
    /// Translational stiffness in [N/m]
    #[clap(long, default_value_t = 200.)]
    pub stiffness: f64,
    /// Target offset along x in [m]
    #[clap(long, default_value_t = 0.1)]
    pub dx: f64,
    /// Target offset along y in [m]
    #[clap(long, default_value_t = -0.1, allow_hyphen_values = true)]
    pub dy: f64,
    /// Simulated duration in [s]
    #[clap(long, default_value_t = 3.)]
    pub duration: f64,
    /// Position of a wall orthogonal to x in [m]. Enables the safety filter.
    #[clap(long)]
    pub barrier: Option<f64>,
}

fn planar_arm() -> ImpedanceResult<SerialChain<2>> {
    SerialChain::new(
        "base_link",
        "tool0",
        [
            ChainJoint::revolute("joint1", "link1", Isometry3::identity(), Vector3::z(), 40.)
                .with_inertia(LinkInertia::point_mass(2., Vector3::new(0.5, 0., 0.))),
            ChainJoint::revolute(
                "joint2",
                "link2",
                Isometry3::translation(0.5, 0., 0.),
                Vector3::z(),
                20.,
            )
            .with_inertia(LinkInertia::point_mass(1., Vector3::new(0.4, 0., 0.))),
        ],
        Isometry3::translation(0.4, 0., 0.),
    )
}

fn main() -> ImpedanceResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = CommandLineArguments::parse();
    let period = 0.001;

    let mut config = ControllerConfig::new(
        "base_link",
        "tool0",
        vec!["joint1".to_string(), "joint2".to_string()],
    );
    // the arm can only move in the plane, everything else is left compliant
    config.stiffness = StiffnessConfig {
        trans_x: args.stiffness,
        trans_y: args.stiffness,
        trans_z: 0.,
        rot_x: 0.,
        rot_y: 0.,
        rot_z: 0.,
    };
    config.stiffness_frame = ReferenceFrame::Base;
    config.compensate_coriolis = true;
    config.nominal_period = period;
    if let Some(wall) = args.barrier {
        config.safety_filter = "planar_hocbf".to_string();
        config.barriers.push(BarrierConfig {
            normal: [-1., 0., 0.],
            point: [wall, 0., 0.],
        });
    }

    let model = planar_arm()?;
    let mut controller = CartesianImpedanceController::configure(model, config)?;

    let mut q = JointVector::<2>::new(0.3, 1.2);
    let mut dq = JointVector::<2>::zeros();
    let mut time = Duration::ZERO;
    controller.activate(&JointState::new(q, dq, time))?;

    let initial = controller.model().end_effector_pose(&q);
    let target = initial.translation.vector + Vector3::new(args.dx, args.dy, 0.);
    let orientation = initial.rotation.quaternion().coords;
    controller.target_channel().on_target_pose(&TargetPoseMessage {
        frame_id: "base_link".to_string(),
        position: [target.x, target.y, target.z],
        orientation: [orientation.x, orientation.y, orientation.z, orientation.w],
    });
    println!(
        "moving end effector from [{:.3}, {:.3}] to [{:.3}, {:.3}]",
        initial.translation.x, initial.translation.y, target.x, target.y
    );

    let steps = (args.duration / period).round() as usize;
    for step in 0..steps {
        let command = controller.update(&JointState::new(q, dq, time))?;
        let model = controller.model();
        let mass = model.mass(&q);
        let bias = model.coriolis(&q, &dq);
        let ddq = mass
            .cholesky()
            .map(|cholesky| cholesky.solve(&(command.tau_J - bias)))
            .unwrap_or_else(JointVector::<2>::zeros);
        dq += ddq * period;
        q += dq * period;
        time += Duration::from_secs_f64(period);
        if step % 500 == 0 {
            let position = model.end_effector_pose(&q).translation;
            println!(
                "t = {:.2} s  x = [{:.3}, {:.3}]  tau = [{:.3}, {:.3}]",
                time.as_secs_f64(),
                position.x,
                position.y,
                command.tau_J[0],
                command.tau_J[1]
            );
        }
    }
    let position = controller.model().end_effector_pose(&q).translation.vector;
    println!("final error: {:.4} m", (position - target).norm());
    if let Some(record) = controller.flush_log().last() {
        println!("last logged record: {}", record.log());
    }
    controller.deactivate();
    Ok(())
}
