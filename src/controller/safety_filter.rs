// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the safety filter contract and the filters which can be selected by name.
//!
//! A safety filter receives the nominal joint torque of the impedance law together with the
//! operational space quantities of the current tick and returns a torque which keeps the end
//! effector inside the configured half-spaces. It also writes a telemetry vector whose layout
//! belongs to the filter.
use std::fmt::Debug;

use nalgebra::{Unit, Vector3};

use crate::controller::config::SafetyConfig;
use crate::controller::redundancy::jacobian_transpose_pseudo_inverse;
use crate::exception::create_safety_filter_exception;
use crate::utils::{Frame, Jacobian, JointMatrix, JointVector, Matrix6, Vector6};
use crate::ImpedanceResult;

/// Name of the filter which forwards the nominal torque.
pub const PASS_THROUGH: &str = "pass_through";
/// Name of the second order control barrier filter over half-spaces.
pub const PLANAR_HOCBF: &str = "planar_hocbf";

/// Added to `J * M^-1 * J^T` before inverting it.
static INERTIA_REGULARIZATION: f64 = 1e-9;
/// Squared norms below this value are treated as zero.
static GRADIENT_EPSILON: f64 = 1e-12;
/// Number of sweeps over all constraints.
static MAX_SWEEPS: usize = 10;

/// Half-space `normal . (x - point) >= 0` the end effector position has to stay in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarrierSpec {
    normal: Unit<Vector3<f64>>,
    point: Vector3<f64>,
}

impl BarrierSpec {
    /// Creates a new barrier. Returns None if the normal has zero length or any entry is not finite.
    pub fn new(normal: Vector3<f64>, point: Vector3<f64>) -> Option<Self> {
        if !point.iter().all(|x| x.is_finite()) {
            return None;
        }
        let normal = Unit::try_new(normal, f64::EPSILON)?;
        if !normal.iter().all(|x| x.is_finite()) {
            return None;
        }
        Some(BarrierSpec { normal, point })
    }
    /// Unit normal pointing into the safe half-space.
    pub fn normal(&self) -> &Unit<Vector3<f64>> {
        &self.normal
    }
    /// A point on the boundary plane.
    pub fn point(&self) -> &Vector3<f64> {
        &self.point
    }
    /// Signed distance of `position` to the plane, positive inside the safe half-space.
    pub fn value(&self, position: &Vector3<f64>) -> f64 {
        self.normal.dot(&(position - self.point))
    }
}

/// Everything a safety filter may use in one tick.
#[derive(Debug, Clone, Copy)]
pub struct SafetyFilterInput<'a, const N: usize> {
    /// Torque of the impedance law including the postural task.
    pub tau_nominal: &'a JointVector<N>,
    /// Operational space inertia `(J * M^-1 * J^T)^-1`.
    pub lambda: &'a Matrix6,
    /// End effector Jacobian in base frame.
    pub jacobian: &'a Jacobian<N>,
    /// Coriolis torque of the current joint state.
    pub tau_coriolis: &'a JointVector<N>,
    /// Current end effector frame in base frame.
    pub current_frame: &'a Frame,
    /// Current end effector twist `J * dq`.
    pub x_dot: &'a Vector6,
    /// Time since the last tick in \[s\]. Always positive.
    pub dt: f64,
    /// Half-spaces to enforce.
    pub barriers: &'a [BarrierSpec],
}

/// A filter which minimally changes the nominal torque such that the configured Cartesian
/// constraints hold.
///
/// The filter is bound once at configuration time and then called exactly once per tick.
pub trait SafetyFilter<const N: usize>: Send + Debug {
    /// Name under which the filter was selected.
    fn name(&self) -> &str;

    /// Filters the nominal torque.
    /// # Arguments
    /// * `input` - Quantities of the current tick.
    /// * `diagnostics` - Cleared and refilled with the filter's telemetry.
    /// # Return
    /// Filtered joint torque.
    /// # Errors
    /// * SafetyFilterException if `input.dt` is not positive or the inputs are unusable.
    fn filter(
        &mut self,
        input: &SafetyFilterInput<N>,
        diagnostics: &mut Vec<f64>,
    ) -> ImpedanceResult<JointVector<N>>;
}

fn check_period(dt: f64) -> ImpedanceResult<()> {
    if dt > 0. && dt.is_finite() {
        Ok(())
    } else {
        Err(create_safety_filter_exception(format!(
            "safety filter requires a positive time step, got {}",
            dt
        )))
    }
}

/// Selects a safety filter by its registered name.
/// # Arguments
/// * `name` - One of [`PASS_THROUGH`] or [`PLANAR_HOCBF`].
/// * `config` - Gains used by filters which need them.
/// # Return
/// None if no filter with this name exists.
pub fn safety_filter_by_name<const N: usize>(
    name: &str,
    config: &SafetyConfig,
) -> Option<Box<dyn SafetyFilter<N>>> {
    match name {
        PASS_THROUGH => Some(Box::new(PassThroughFilter)),
        PLANAR_HOCBF => Some(Box::new(PlanarHocbfFilter::new(
            config.alpha_1,
            config.alpha_2,
        ))),
        _ => None,
    }
}

/// Computes the operational space inertia `(J * M^-1 * J^T)^-1`.
///
/// Both inversions are regularized so that singular Jacobians and chains with fewer than six
/// joints still produce a finite matrix.
pub fn operational_space_inertia<const N: usize>(
    jacobian: &Jacobian<N>,
    mass: &JointMatrix<N>,
) -> Matrix6 {
    let mass_inverse = match mass.cholesky() {
        Some(cholesky) => cholesky.inverse(),
        None => match mass.try_inverse() {
            Some(inverse) => inverse,
            None => JointMatrix::<N>::zeros(),
        },
    };
    let inverse_inertia =
        jacobian * mass_inverse * jacobian.transpose() + Matrix6::identity() * INERTIA_REGULARIZATION;
    match inverse_inertia.cholesky() {
        Some(cholesky) => cholesky.inverse(),
        None => Matrix6::identity() / INERTIA_REGULARIZATION,
    }
}

/// Forwards the nominal torque and reports no telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughFilter;

impl<const N: usize> SafetyFilter<N> for PassThroughFilter {
    fn name(&self) -> &str {
        PASS_THROUGH
    }

    fn filter(
        &mut self,
        input: &SafetyFilterInput<N>,
        diagnostics: &mut Vec<f64>,
    ) -> ImpedanceResult<JointVector<N>> {
        check_period(input.dt)?;
        diagnostics.clear();
        Ok(*input.tau_nominal)
    }
}

/// Second order control barrier filter over half-spaces of the end effector position.
///
/// Each barrier `h = n . (x - p)` has relative degree two with respect to the task force `F`.
/// The filter enforces `h_ddot + (a1 + a2) * h_dot + a1 * a2 * h >= 0` with the task space model
/// `x_ddot = Λ^-1 * (F - F_c)` where `F_c = J^{T+} * tau_coriolis`. Every constraint is linear in
/// `F`, so violated constraints are resolved by projecting `F` onto their boundary, sweeping over
/// all constraints until none is violated. Only the range of `J^T` of the nominal torque is
/// touched, the nullspace part passes unchanged.
///
/// Telemetry per barrier: `h`, `h_dot`, predicted `h` after `dt`, slack of the constraint after
/// filtering and 1.0 if the nominal force violated the barrier. The last entry is the norm of the force
/// correction.
#[derive(Debug, Clone, Copy)]
pub struct PlanarHocbfFilter {
    alpha_1: f64,
    alpha_2: f64,
}

impl PlanarHocbfFilter {
    /// Creates a new filter.
    /// # Arguments
    /// * `alpha_1` - Gain of the first class-K function in \[1/s\].
    /// * `alpha_2` - Gain of the second class-K function in \[1/s\].
    pub fn new(alpha_1: f64, alpha_2: f64) -> Self {
        PlanarHocbfFilter { alpha_1, alpha_2 }
    }

    fn constraint(
        &self,
        barrier: &BarrierSpec,
        inverse_inertia: &Matrix6,
        coriolis_force: &Vector6,
        position: &Vector3<f64>,
        x_dot: &Vector6,
    ) -> (Vector6, f64) {
        let mut normal = Vector6::zeros();
        normal
            .fixed_rows_mut::<3>(0)
            .copy_from(&barrier.normal().into_inner());
        let h = barrier.value(position);
        let h_dot = barrier.normal().dot(&x_dot.fixed_rows::<3>(0));
        let gradient = inverse_inertia * normal;
        let bound = gradient.dot(coriolis_force)
            - (self.alpha_1 + self.alpha_2) * h_dot
            - self.alpha_1 * self.alpha_2 * h;
        (gradient, bound)
    }
}

impl<const N: usize> SafetyFilter<N> for PlanarHocbfFilter {
    fn name(&self) -> &str {
        PLANAR_HOCBF
    }

    fn filter(
        &mut self,
        input: &SafetyFilterInput<N>,
        diagnostics: &mut Vec<f64>,
    ) -> ImpedanceResult<JointVector<N>> {
        check_period(input.dt)?;
        diagnostics.clear();
        let inverse_inertia = input.lambda.cholesky().map(|c| c.inverse()).ok_or_else(|| {
            create_safety_filter_exception("operational space inertia is not positive definite")
        })?;
        let pseudo_inverse = jacobian_transpose_pseudo_inverse(input.jacobian).ok_or_else(|| {
            create_safety_filter_exception("Jacobian transpose cannot be inverted")
        })?;
        let position = input.current_frame.translation.vector;
        let nominal_force = pseudo_inverse * input.tau_nominal;
        let coriolis_force = pseudo_inverse * input.tau_coriolis;

        let mut force = nominal_force;
        for _ in 0..MAX_SWEEPS {
            let mut violated = false;
            for barrier in input.barriers {
                let (gradient, bound) = self.constraint(
                    barrier,
                    &inverse_inertia,
                    &coriolis_force,
                    &position,
                    input.x_dot,
                );
                let squared_norm = gradient.norm_squared();
                let slack = gradient.dot(&force) - bound;
                if slack < 0. && squared_norm > GRADIENT_EPSILON {
                    force += gradient * (-slack / squared_norm);
                    violated = true;
                }
            }
            if !violated {
                break;
            }
        }

        for barrier in input.barriers {
            let (gradient, bound) = self.constraint(
                barrier,
                &inverse_inertia,
                &coriolis_force,
                &position,
                input.x_dot,
            );
            let h = barrier.value(&position);
            let h_dot = barrier.normal().dot(&input.x_dot.fixed_rows::<3>(0));
            diagnostics.push(h);
            diagnostics.push(h_dot);
            diagnostics.push(h + h_dot * input.dt);
            diagnostics.push(gradient.dot(&force) - bound);
            diagnostics.push(if gradient.dot(&nominal_force) < bound {
                1.
            } else {
                0.
            });
        }
        let correction = force - nominal_force;
        diagnostics.push(correction.norm());
        Ok(input.tau_nominal + input.jacobian.transpose() * correction)
    }
}
