// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # cartesian-impedance-rs
//! cartesian-impedance-rs computes, once per control tick, the joint torques which make a torque
//! controlled serial manipulator behave like a virtual Cartesian spring-damper around a moving
//! target pose and wrench. A pluggable safety filter can restrict the end effector to half-spaces
//! before the torque reaches the actuators.
//!
//! **ALWAYS HAVE THE USER STOP BUTTON AT
//! HAND WHILE CONTROLLING THE ROBOT!**
//!
//! ## Design
//! The library is divided into two main Modules:
//! * [model](`crate::model`) - contains the [`KinematicsProvider`] trait through which the
//!   controller evaluates poses, Jacobians and dynamics, and the [`SerialChain`] model.
//! * [controller](`crate::controller`) - contains the [`CartesianImpedanceController`] and the
//!   stages of its control tick.
//!
//! The number of joints is a const generic parameter, so all per-tick vectors and matrices have
//! a size known at compile time and a tick does not allocate.
//!
//! The controller does not own a real-time loop, a hardware interface or a message transport.
//! It is driven by the caller, which reads the joint state, calls
//! [`update`](`CartesianImpedanceController::update`) and forwards the returned [`Torques`].
//!
//! # Example:
//!```no_run
//! use std::time::Duration;
//! use impedance::{
//!     CartesianImpedanceController, ControllerConfig, ImpedanceResult, JointState, SerialChain,
//! };
//! # use impedance::JointVector;
//! # fn read_joint_state() -> JointState<7> { unimplemented!() }
//! # fn send_torques(tau: &JointVector<7>) {}
//! fn run(model: SerialChain<7>) -> ImpedanceResult<()> {
//!     let config = ControllerConfig::from_toml_str(
//!         r#"
//!         robot_base_link = "base_link"
//!         end_effector_link = "tool0"
//!         joints = ["joint1", "joint2", "joint3", "joint4", "joint5", "joint6", "joint7"]
//!         compensate_gravity = true
//!         "#,
//!     )?;
//!     let mut controller = CartesianImpedanceController::configure(model, config)?;
//!     send_torques(&controller.activate(&read_joint_state())?.tau_J);
//!     loop {
//!         let state = read_joint_state();
//!         let command = controller.update(&state)?;
//!         send_torques(&command.tau_J);
//!         if state.time >= Duration::from_secs(5) {
//!             break;
//!         }
//!     }
//!     send_torques(&controller.deactivate().tau_J);
//!     Ok(())
//! }
//! ```
//! Target poses and wrenches are handed to the [`TargetChannel`] from any thread:
//! ```no_run
//! # use impedance::{CartesianImpedanceController, SerialChain, TargetPoseMessage};
//! # fn f(controller: &CartesianImpedanceController<SerialChain<7>, 7>) {
//! let channel = controller.target_channel();
//! std::thread::spawn(move || {
//!     channel.on_target_pose(&TargetPoseMessage {
//!         frame_id: "base_link".to_string(),
//!         position: [0.4, 0.0, 0.5],
//!         orientation: [0.0, 0.0, 0.0, 1.0],
//!     });
//! });
//! # }
//! ```
pub mod controller;
pub mod exception;
pub mod model;
pub mod utils;

pub use controller::cartesian_impedance::CartesianImpedanceController;
pub use controller::config::{BarrierConfig, ControllerConfig, SafetyConfig, StiffnessConfig};
pub use controller::control_types::*;
pub use controller::impedance_law::ReferenceFrame;
pub use controller::logger::Record;
pub use controller::low_pass_filter::MAX_CUTOFF_FREQUENCY;
pub use controller::motion_error::ErrorPolicy;
pub use controller::safety_filter::{
    BarrierSpec, PassThroughFilter, PlanarHocbfFilter, SafetyFilter, SafetyFilterInput,
};
pub use controller::target::{
    Delivery, TargetChannel, TargetPoseMessage, TargetState, TargetWrenchMessage,
};
pub use exception::{ImpedanceException, ImpedanceResult};
pub use model::{ChainJoint, JointKind, KinematicsProvider, LinkInertia, SerialChain};
pub use utils::*;
