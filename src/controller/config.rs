// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the static controller configuration which is read once before activation.
use std::collections::HashSet;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::controller::impedance_law::ReferenceFrame;
use crate::controller::motion_error::ErrorPolicy;
use crate::controller::safety_filter::{BarrierSpec, PASS_THROUGH};
use crate::exception::create_configuration_exception;
use crate::utils::Vector6;
use crate::ImpedanceResult;

/// Translational stiffness used if nothing else is configured. Unit: \[N/m\]
pub static DEFAULT_TRANSLATIONAL_STIFFNESS: f64 = 500.;
/// Rotational stiffness used if nothing else is configured. Unit: \[Nm/rad\]
pub static DEFAULT_ROTATIONAL_STIFFNESS: f64 = 50.;
/// Nullspace stiffness used if nothing else is configured. Unit: \[Nm/rad\]
pub static DEFAULT_NULLSPACE_STIFFNESS: f64 = 10.;
/// Window in which at most one warning per message kind is emitted. Unit: \[ms\]
pub static DEFAULT_WARNING_THROTTLE_MS: u64 = 3000;

/// Diagonal entries of the Cartesian stiffness.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct StiffnessConfig {
    pub trans_x: f64,
    pub trans_y: f64,
    pub trans_z: f64,
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
}

impl Default for StiffnessConfig {
    fn default() -> Self {
        StiffnessConfig {
            trans_x: DEFAULT_TRANSLATIONAL_STIFFNESS,
            trans_y: DEFAULT_TRANSLATIONAL_STIFFNESS,
            trans_z: DEFAULT_TRANSLATIONAL_STIFFNESS,
            rot_x: DEFAULT_ROTATIONAL_STIFFNESS,
            rot_y: DEFAULT_ROTATIONAL_STIFFNESS,
            rot_z: DEFAULT_ROTATIONAL_STIFFNESS,
        }
    }
}

impl StiffnessConfig {
    /// Stiffness as `[trans_x, trans_y, trans_z, rot_x, rot_y, rot_z]`.
    pub fn to_vector(&self) -> Vector6 {
        Vector6::new(
            self.trans_x,
            self.trans_y,
            self.trans_z,
            self.rot_x,
            self.rot_y,
            self.rot_z,
        )
    }
}

/// Gains of the control barrier filter.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SafetyConfig {
    /// Gain of the first class-K function. Unit: \[1/s\]
    pub alpha_1: f64,
    /// Gain of the second class-K function. Unit: \[1/s\]
    pub alpha_2: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        SafetyConfig {
            alpha_1: 10.,
            alpha_2: 10.,
        }
    }
}

/// Half-space the end effector position has to stay in, see [`BarrierSpec`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BarrierConfig {
    /// Normal pointing into the safe half-space. Does not need to be normalized.
    pub normal: [f64; 3],
    /// A point on the boundary plane in base frame. Unit: \[m\]
    pub point: [f64; 3],
}

impl BarrierConfig {
    /// Converts the entry to a [`BarrierSpec`]. Returns None for a zero-length normal.
    pub fn to_barrier(&self) -> Option<BarrierSpec> {
        BarrierSpec::new(Vector3::from(self.normal), Vector3::from(self.point))
    }
}

/// Static configuration of a [`CartesianImpedanceController`](`crate::CartesianImpedanceController`).
///
/// All fields have defaults except the link names and the joint list, which must be given.
/// ```
/// use impedance::ControllerConfig;
/// let config = ControllerConfig::from_toml_str(
///     r#"
///     robot_base_link = "base_link"
///     end_effector_link = "tool0"
///     joints = ["joint1", "joint2"]
///     [stiffness]
///     trans_z = 800.0
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.stiffness.trans_z, 800.);
/// assert_eq!(config.stiffness.trans_x, 500.);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Root link of the kinematic chain. Target poses must be given in this frame.
    pub robot_base_link: String,
    /// Controlled link.
    pub end_effector_link: String,
    /// Link in which measured sensor wrenches are expressed.
    pub ft_sensor_ref_link: Option<String>,
    /// Names of the actuated joints, ordered from base to tip.
    pub joints: Vec<String>,
    /// Cartesian stiffness.
    pub stiffness: StiffnessConfig,
    /// Frame in which the stiffness is diagonal.
    pub stiffness_frame: ReferenceFrame,
    /// Stiffness of the postural task. Unit: \[Nm/rad\]
    pub nullspace_stiffness: f64,
    /// Enables the postural task.
    pub postural_task: bool,
    /// Accepts target wrenches given in the end effector frame.
    pub hand_frame_control: bool,
    /// Adds the gravity torque after the safety filter.
    pub compensate_gravity: bool,
    /// Adds the Coriolis torque after the safety filter.
    pub compensate_coriolis: bool,
    /// How the orientation error is computed.
    pub error_policy: ErrorPolicy,
    /// Registered name of the safety filter.
    pub safety_filter: String,
    /// Gains of the safety filter.
    pub safety: SafetyConfig,
    /// Half-spaces enforced by the safety filter.
    pub barriers: Vec<BarrierConfig>,
    /// Time step used if no previous tick exists. Unit: \[s\]
    pub nominal_period: f64,
    /// Enables a low-pass filter on the measured joint velocities. Unit: \[Hz\]
    pub velocity_cutoff_frequency: Option<f64>,
    /// Window for rate-limited warnings. Unit: \[ms\]
    pub warning_throttle_ms: u64,
    /// Number of ticks kept in the command log.
    pub log_size: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            robot_base_link: String::new(),
            end_effector_link: String::new(),
            ft_sensor_ref_link: None,
            joints: Vec::new(),
            stiffness: StiffnessConfig::default(),
            stiffness_frame: ReferenceFrame::default(),
            nullspace_stiffness: DEFAULT_NULLSPACE_STIFFNESS,
            postural_task: true,
            hand_frame_control: true,
            compensate_gravity: false,
            compensate_coriolis: false,
            error_policy: ErrorPolicy::default(),
            safety_filter: PASS_THROUGH.to_string(),
            safety: SafetyConfig::default(),
            barriers: Vec::new(),
            nominal_period: 0.001,
            velocity_cutoff_frequency: None,
            warning_throttle_ms: DEFAULT_WARNING_THROTTLE_MS,
            log_size: 50,
        }
    }
}

fn check_non_negative(name: &str, value: f64) -> ImpedanceResult<()> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(create_configuration_exception(format!(
            "{} must be finite and non-negative, got {}",
            name, value
        )))
    }
}

fn check_positive(name: &str, value: f64) -> ImpedanceResult<()> {
    if value.is_finite() && value > 0. {
        Ok(())
    } else {
        Err(create_configuration_exception(format!(
            "{} must be finite and positive, got {}",
            name, value
        )))
    }
}

impl ControllerConfig {
    /// Creates a configuration with default parameters for the given chain.
    pub fn new<S: Into<String>>(robot_base_link: S, end_effector_link: S, joints: Vec<String>) -> Self {
        ControllerConfig {
            robot_base_link: robot_base_link.into(),
            end_effector_link: end_effector_link.into(),
            joints,
            ..Default::default()
        }
    }

    /// Parses and validates a TOML document.
    /// # Errors
    /// * ConfigurationException if the document cannot be parsed or [`validate`](`Self::validate`)
    ///   fails.
    pub fn from_toml_str(document: &str) -> ImpedanceResult<Self> {
        let config: ControllerConfig = toml::from_str(document).map_err(|error| {
            create_configuration_exception(format!("invalid controller configuration: {}", error))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything which does not need the kinematic model.
    /// # Errors
    /// * ConfigurationException for empty link names, an empty or duplicated joint list,
    ///   negative or non-finite gains, a non-positive nominal period or a barrier without normal.
    pub fn validate(&self) -> ImpedanceResult<()> {
        if self.robot_base_link.is_empty() {
            return Err(create_configuration_exception("robot_base_link is empty"));
        }
        if self.end_effector_link.is_empty() {
            return Err(create_configuration_exception("end_effector_link is empty"));
        }
        if let Some(link) = &self.ft_sensor_ref_link {
            if link.is_empty() {
                return Err(create_configuration_exception("ft_sensor_ref_link is empty"));
            }
        }
        if self.joints.is_empty() {
            return Err(create_configuration_exception("joints is empty"));
        }
        let mut names = HashSet::new();
        for joint in &self.joints {
            if !names.insert(joint.as_str()) {
                return Err(create_configuration_exception(format!(
                    "joint {} is listed more than once",
                    joint
                )));
            }
        }
        let stiffness = &self.stiffness;
        for (name, value) in [
            ("stiffness.trans_x", stiffness.trans_x),
            ("stiffness.trans_y", stiffness.trans_y),
            ("stiffness.trans_z", stiffness.trans_z),
            ("stiffness.rot_x", stiffness.rot_x),
            ("stiffness.rot_y", stiffness.rot_y),
            ("stiffness.rot_z", stiffness.rot_z),
            ("nullspace_stiffness", self.nullspace_stiffness),
        ] {
            check_non_negative(name, value)?;
        }
        check_positive("safety.alpha_1", self.safety.alpha_1)?;
        check_positive("safety.alpha_2", self.safety.alpha_2)?;
        check_positive("nominal_period", self.nominal_period)?;
        if let Some(cutoff) = self.velocity_cutoff_frequency {
            check_positive("velocity_cutoff_frequency", cutoff)?;
        }
        if self.log_size == 0 {
            return Err(create_configuration_exception("log_size must be at least 1"));
        }
        self.barrier_specs().map(|_| ())
    }

    /// Converts the configured barriers.
    /// # Errors
    /// * ConfigurationException if a barrier has a zero-length or non-finite normal.
    pub fn barrier_specs(&self) -> ImpedanceResult<Vec<BarrierSpec>> {
        self.barriers
            .iter()
            .enumerate()
            .map(|(i, barrier)| {
                barrier.to_barrier().ok_or_else(|| {
                    create_configuration_exception(format!(
                        "barrier {} needs a finite point and a non-zero normal",
                        i
                    ))
                })
            })
            .collect()
    }
}
