// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains functions for filtering signals with a low-pass filter.

use std::f64::consts::PI;

use crate::utils::JointVector;

/// Maximum cutoff frequency: 1000 Hz
pub static MAX_CUTOFF_FREQUENCY: f64 = 1000.0;

/// Weight of the new sample in a first-order low-pass filter.
///
/// # Arguments
/// * `sample_time` - Sample time constant
/// * `cutoff_frequency` - Cutoff frequency of the low-pass filter
/// # Return
/// None if the sample time is negative or the cutoff frequency is not positive, or if either of
/// them is not finite.
pub fn low_pass_gain(sample_time: f64, cutoff_frequency: f64) -> Option<f64> {
    if !(sample_time.is_sign_positive() && sample_time.is_finite()) {
        return None;
    }
    if !(cutoff_frequency > 0. && cutoff_frequency.is_finite()) {
        return None;
    }
    Some(sample_time / (sample_time + (1.0 / (2.0 * PI * cutoff_frequency))))
}

/// Applies a first-order low-pass filter
///
/// # Arguments
/// * `sample_time` - Sample time constant
/// * `y` - Current value of the signal to be filtered
/// * `y_last` - Value of the signal to be filtered in the previous time step
/// * `cutoff_frequency` - Cutoff frequency of the low-pass filter
/// # Return
/// Filtered value. If the filter parameters are invalid, `y` is returned unfiltered.
pub fn low_pass_filter(sample_time: f64, y: f64, y_last: f64, cutoff_frequency: f64) -> f64 {
    match low_pass_gain(sample_time, cutoff_frequency) {
        Some(gain) => gain * y + (1. - gain) * y_last,
        None => y,
    }
}

/// Low-pass filter for the measured joint velocities.
#[derive(Debug, Clone)]
pub struct JointVelocityFilter<const N: usize> {
    cutoff_frequency: f64,
    last: Option<JointVector<N>>,
}

impl<const N: usize> JointVelocityFilter<N> {
    /// Creates a new filter. The cutoff frequency is limited to [`MAX_CUTOFF_FREQUENCY`].
    pub fn new(cutoff_frequency: f64) -> Self {
        JointVelocityFilter {
            cutoff_frequency: f64::min(cutoff_frequency, MAX_CUTOFF_FREQUENCY),
            last: None,
        }
    }
    /// Cutoff frequency in \[Hz\].
    pub fn cutoff_frequency(&self) -> f64 {
        self.cutoff_frequency
    }
    /// Forgets the previous sample, the next sample passes unfiltered.
    pub fn reset(&mut self) {
        self.last = None;
    }
    /// Filters one sample joint by joint with [`low_pass_filter`].
    ///
    /// Non-finite samples are passed through and do not enter the filter state.
    pub fn filter(&mut self, sample_time: f64, dq: &JointVector<N>) -> JointVector<N> {
        if !dq.iter().all(|x| x.is_finite()) {
            return *dq;
        }
        let cutoff_frequency = self.cutoff_frequency;
        let filtered = match self.last {
            Some(last) => dq.zip_map(&last, |y, y_last| {
                low_pass_filter(sample_time, y, y_last, cutoff_frequency)
            }),
            None => *dq,
        };
        self.last = Some(filtered);
        filtered
    }
}
