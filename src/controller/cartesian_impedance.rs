// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the Cartesian impedance controller which runs the whole per-tick pipeline.
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::controller::config::ControllerConfig;
use crate::controller::control_types::{JointState, Torques};
use crate::controller::dynamics::DynamicsCompensator;
use crate::controller::effort_limiter::limit_efforts;
use crate::controller::frame_transformer::display_in_base_link;
use crate::controller::impedance_law::{task_torque, task_wrench, CartesianImpedance};
use crate::controller::logger::{Logger, Record};
use crate::controller::low_pass_filter::JointVelocityFilter;
use crate::controller::motion_error::{compute_force_error, compute_motion_error};
use crate::controller::redundancy::NullspaceTask;
use crate::controller::safety_filter::{
    operational_space_inertia, safety_filter_by_name, BarrierSpec, SafetyFilter,
    SafetyFilterInput,
};
use crate::controller::target::{TargetChannel, TargetState, ThrottledWarning, WrenchFrame};
use crate::exception::{create_configuration_exception, create_model_exception};
use crate::model::KinematicsProvider;
use crate::utils::{all_finite, Frame, JointVector};
use crate::{ImpedanceException, ImpedanceResult};

/// Makes a torque controlled arm behave like a Cartesian spring-damper around a moving target.
///
/// One [`update`](`Self::update`) computes the command of one control tick:
/// 1. take a snapshot of the target,
/// 2. evaluate forward kinematics and the Jacobian for the measured joint state,
/// 3. compute the bounded motion error and the force error,
/// 4. map the spring-damper wrench to joint torque and add the postural task in the nullspace,
/// 5. pass the nominal torque through the safety filter,
/// 6. add gravity and Coriolis compensation,
/// 7. saturate every joint at its effort limit.
///
/// A tick which produces a non-finite torque, or in which the model cannot be evaluated,
/// commands zero torque instead.
///
/// The controller runs on a single thread. Targets are sent from any thread through the
/// [`TargetChannel`] returned by [`target_channel`](`Self::target_channel`).
#[derive(Debug)]
pub struct CartesianImpedanceController<K: KinematicsProvider<N>, const N: usize> {
    model: K,
    config: ControllerConfig,
    impedance: CartesianImpedance,
    nullspace: NullspaceTask<N>,
    dynamics: DynamicsCompensator,
    safety_filter: Box<dyn SafetyFilter<N>>,
    barriers: Vec<BarrierSpec>,
    effort_limits: JointVector<N>,
    target: Arc<TargetChannel>,
    velocity_filter: Option<JointVelocityFilter<N>>,
    failure_warning: ThrottledWarning,
    logger: Logger<N>,
    diagnostics: Vec<f64>,
    last_time: Option<Duration>,
    active: bool,
}

impl<K: KinematicsProvider<N>, const N: usize> CartesianImpedanceController<K, N> {
    /// Configures a new, inactive controller.
    /// # Arguments
    /// * `model` - Kinematics and dynamics of the arm.
    /// * `config` - Static configuration.
    /// # Errors
    /// * ConfigurationException if the configuration is invalid, its links do not match the
    ///   model, the number of joints differs from `N` or the safety filter is unknown.
    pub fn configure(model: K, config: ControllerConfig) -> ImpedanceResult<Self> {
        config.validate()?;
        if config.joints.len() != N {
            return Err(create_configuration_exception(format!(
                "{} joints are configured but the controller is built for {}",
                config.joints.len(),
                N
            )));
        }
        if config.robot_base_link != model.base_link() {
            return Err(create_configuration_exception(format!(
                "robot_base_link {} does not match the base {} of the kinematic chain",
                config.robot_base_link,
                model.base_link()
            )));
        }
        if config.end_effector_link != model.end_effector_link() {
            return Err(create_configuration_exception(format!(
                "end_effector_link {} does not match the tip {} of the kinematic chain",
                config.end_effector_link,
                model.end_effector_link()
            )));
        }
        if let Some(link) = &config.ft_sensor_ref_link {
            if !model.contains_link(link) {
                return Err(create_configuration_exception(format!(
                    "{} from ft_sensor_ref_link is not part of the kinematic chain from {} to {}",
                    link,
                    model.base_link(),
                    model.end_effector_link()
                )));
            }
        }
        let safety_filter = safety_filter_by_name::<N>(&config.safety_filter, &config.safety)
            .ok_or_else(|| {
                create_configuration_exception(format!(
                    "unknown safety filter {}",
                    config.safety_filter
                ))
            })?;
        let barriers = config.barrier_specs()?;
        let nullspace = NullspaceTask::new(config.nullspace_stiffness, config.postural_task);
        if config.postural_task && !nullspace.is_active() {
            warn!(
                joints = N,
                "postural task requested but the chain is not redundant, it has no effect"
            );
        }
        let target = Arc::new(TargetChannel::new(
            config.robot_base_link.as_str(),
            config.end_effector_link.as_str(),
            config.hand_frame_control,
            Duration::from_millis(config.warning_throttle_ms),
        ));
        info!(
            postural_task = nullspace.is_active(),
            nullspace_stiffness = config.nullspace_stiffness,
            safety_filter = %config.safety_filter,
            barriers = barriers.len(),
            "Configured Cartesian impedance controller"
        );
        Ok(CartesianImpedanceController {
            impedance: CartesianImpedance::new(&config.stiffness.to_vector(), config.stiffness_frame),
            nullspace,
            dynamics: DynamicsCompensator::new(config.compensate_gravity, config.compensate_coriolis),
            safety_filter,
            barriers,
            effort_limits: model.effort_limits(),
            target,
            velocity_filter: config.velocity_cutoff_frequency.map(JointVelocityFilter::new),
            failure_warning: ThrottledWarning::new(Duration::from_millis(config.warning_throttle_ms)),
            logger: Logger::new(config.log_size),
            diagnostics: Vec::new(),
            last_time: None,
            active: false,
            model,
            config,
        })
    }

    /// Replaces the safety filter selected by name with a custom one.
    /// # Errors
    /// * AlreadyActiveError if the controller is running.
    pub fn set_safety_filter(&mut self, filter: Box<dyn SafetyFilter<N>>) -> ImpedanceResult<()> {
        if self.active {
            return Err(ImpedanceException::AlreadyActiveError);
        }
        info!(safety_filter = filter.name(), "Bound custom safety filter");
        self.safety_filter = filter;
        Ok(())
    }

    /// Starts the controller at the current joint state.
    ///
    /// The current joint position becomes the reference posture of the postural task and the
    /// current end effector frame becomes the target. The target wrench is cleared.
    /// # Return
    /// The zero command which has to be sent until the first [`update`](`Self::update`).
    /// # Errors
    /// * AlreadyActiveError if the controller is already running.
    /// * ModelException if the joint position is not finite.
    pub fn activate(&mut self, state: &JointState<N>) -> ImpedanceResult<Torques<N>> {
        if self.active {
            return Err(ImpedanceException::AlreadyActiveError);
        }
        if !all_finite(&state.q) {
            return Err(create_model_exception(
                "cannot activate with a non-finite joint position",
            ));
        }
        self.nullspace.set_reference_posture(&state.q);
        self.target.reset(self.model.end_effector_pose(&state.q));
        if let Some(filter) = self.velocity_filter.as_mut() {
            filter.reset();
        }
        self.diagnostics.clear();
        self.last_time = None;
        self.active = true;
        info!(
            postural_task = self.nullspace.is_active(),
            nullspace_stiffness = self.config.nullspace_stiffness,
            "Activated Cartesian impedance controller"
        );
        Ok(Torques::zeros())
    }

    /// Stops the controller. Returns the zero command which has to be sent before the actuators
    /// are released.
    pub fn deactivate(&mut self) -> Torques<N> {
        if self.active {
            info!("Deactivated Cartesian impedance controller");
        }
        self.active = false;
        self.last_time = None;
        Torques::zeros()
    }

    /// Computes the torque command of one control tick.
    /// # Arguments
    /// * `state` - Joint state measured at the start of the tick.
    /// # Errors
    /// * NoControllerRunningError if the controller is not active.
    pub fn update(&mut self, state: &JointState<N>) -> ImpedanceResult<Torques<N>> {
        if !self.active {
            return Err(ImpedanceException::NoControllerRunningError);
        }
        let dt = match self.last_time {
            Some(last) if state.time > last => (state.time - last).as_secs_f64(),
            Some(_) => {
                debug!(time = ?state.time, "joint state time did not advance, using nominal period");
                self.config.nominal_period
            }
            None => self.config.nominal_period,
        };
        self.last_time = Some(state.time);

        let (command, failed_closed) = match self.compute_torque(state, dt) {
            Ok(tau) if all_finite(&tau) => (tau, false),
            Ok(tau) => {
                self.fail_closed(&format!("non-finite torque {:?}", tau.as_slice()));
                (JointVector::<N>::zeros(), true)
            }
            Err(error) => {
                self.fail_closed(&error.to_string());
                (JointVector::<N>::zeros(), true)
            }
        };
        let command = Torques::new(limit_efforts(&command, &self.effort_limits));
        self.logger.log(Record {
            state: *state,
            command,
            dt,
            failed_closed,
        });
        Ok(command)
    }

    fn fail_closed(&mut self, reason: &str) {
        self.diagnostics.clear();
        if self.failure_warning.should_warn(Instant::now()) {
            warn!(reason, "Control tick failed, commanding zero torque");
        }
    }

    fn compute_torque(&mut self, state: &JointState<N>, dt: f64) -> ImpedanceResult<JointVector<N>> {
        if !all_finite(state.q.iter().chain(state.dq.iter())) {
            return Err(create_model_exception("joint state is not finite"));
        }
        let target = self.target.snapshot();
        let q = state.q;
        let dq = match self.velocity_filter.as_mut() {
            Some(filter) => filter.filter(dt, &state.dq),
            None => state.dq,
        };

        let current = self.model.end_effector_pose(&q);
        let jacobian = self.model.zero_jacobian(&q);
        let x_dot = jacobian * dq;

        let motion_error = compute_motion_error(&target.frame, &current, self.config.error_policy);
        let (stiffness, damping) = self.impedance.in_base_frame(&current.rotation);
        let target_wrench = match target.wrench_frame {
            WrenchFrame::Base => target.wrench,
            WrenchFrame::EndEffector => display_in_base_link(&target.wrench, &current.rotation),
        };
        let sensor = match (&self.config.ft_sensor_ref_link, &state.sensor_wrench) {
            (Some(link), Some(wrench)) => Some((wrench, self.model.pose(link, &q)?.rotation)),
            _ => None,
        };
        let force_error = compute_force_error(
            &target_wrench,
            sensor.as_ref().map(|(wrench, rotation)| (*wrench, rotation)),
        );

        let wrench = task_wrench(&stiffness, &damping, &motion_error, &x_dot, &force_error);
        let tau_nominal =
            task_torque(&jacobian, &wrench) + self.nullspace.torque(&jacobian, &q, &dq);

        let lambda = operational_space_inertia(&jacobian, &self.model.mass(&q));
        let tau_coriolis = self.model.coriolis(&q, &dq);
        let tau_filtered = self.safety_filter.filter(
            &SafetyFilterInput {
                tau_nominal: &tau_nominal,
                lambda: &lambda,
                jacobian: &jacobian,
                tau_coriolis: &tau_coriolis,
                current_frame: &current,
                x_dot: &x_dot,
                dt,
                barriers: &self.barriers,
            },
            &mut self.diagnostics,
        )?;
        self.push_reference_coordinates(&current, &target);

        // compensation is not subject to the barriers
        Ok(tau_filtered + self.dynamics.compensation(&self.model, &q, &tau_coriolis))
    }

    /// Appends the constraint reference, the current and the target coordinate along the normal
    /// of the first barrier. Without barriers the z axis with reference 0 is used.
    fn push_reference_coordinates(&mut self, current: &Frame, target: &TargetState) {
        let (normal, reference) = match self.barriers.first() {
            Some(barrier) => (barrier.normal().into_inner(), barrier.normal().dot(barrier.point())),
            None => (nalgebra::Vector3::z(), 0.),
        };
        self.diagnostics.push(reference);
        self.diagnostics.push(normal.dot(&current.translation.vector));
        self.diagnostics.push(normal.dot(&target.frame.translation.vector));
    }

    /// Channel through which target poses and wrenches are sent.
    pub fn target_channel(&self) -> Arc<TargetChannel> {
        self.target.clone()
    }

    /// Telemetry of the last tick: the safety filter's diagnostics followed by the constraint
    /// reference, the current and the target coordinate along the first barrier normal.
    /// Empty after a tick which failed closed.
    pub fn diagnostics(&self) -> &[f64] {
        &self.diagnostics
    }

    /// Returns and clears the last ticks, oldest first.
    pub fn flush_log(&mut self) -> Vec<Record<N>> {
        self.logger.flush()
    }

    /// Determines whether the controller is running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Joint position captured at activation.
    pub fn reference_posture(&self) -> &JointVector<N> {
        self.nullspace.reference_posture()
    }

    /// Static configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Kinematics and dynamics model.
    pub fn model(&self) -> &K {
        &self.model
    }
}
