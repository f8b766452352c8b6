// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the CartesianImpedanceController type and the stages of its control tick.

pub mod cartesian_impedance;
pub mod config;
pub mod control_types;
pub mod dynamics;
pub mod effort_limiter;
pub mod frame_transformer;
pub mod impedance_law;
pub mod logger;
pub mod low_pass_filter;
pub mod motion_error;
pub mod redundancy;
pub mod safety_filter;
pub mod target;
