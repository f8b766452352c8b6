// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use thiserror::Error;

/// Represents all kind of errors which can occur while configuring or running the
/// impedance controller.
#[derive(Error, Debug)]
pub enum ImpedanceException {
    /// ConfigurationException is returned if the controller cannot be configured, e.g. because
    /// a link identifier is missing or the joint list is empty. The controller never reaches the
    /// running state after this error.
    #[error("{message:?}")]
    ConfigurationException { message: String },

    /// ModelException is returned if the kinematics provider cannot evaluate a request,
    /// e.g. a pose for a link which is not part of the chain.
    #[error("{message:?}")]
    ModelException { message: String },

    /// SafetyFilterException is returned if the safety filter is called in violation of its
    /// contract, e.g. with a non-positive time step.
    #[error("{message:?}")]
    SafetyFilterException { message: String },

    /// NoControllerRunningError is returned when a control tick is requested while the
    /// controller is not active.
    #[error("Trying to compute a torque command, but no controller is running!")]
    NoControllerRunningError,

    /// AlreadyActiveError is returned when activating a controller which is already running.
    #[error("Trying to activate a controller which is already running!")]
    AlreadyActiveError,
}

/// creates a ConfigurationException from anything which can be turned into a String
pub(crate) fn create_configuration_exception<S: Into<String>>(message: S) -> ImpedanceException {
    ImpedanceException::ConfigurationException {
        message: message.into(),
    }
}

/// creates a ModelException from anything which can be turned into a String
pub(crate) fn create_model_exception<S: Into<String>>(message: S) -> ImpedanceException {
    ImpedanceException::ModelException {
        message: message.into(),
    }
}

/// creates a SafetyFilterException from anything which can be turned into a String
pub(crate) fn create_safety_filter_exception<S: Into<String>>(message: S) -> ImpedanceException {
    ImpedanceException::SafetyFilterException {
        message: message.into(),
    }
}

/// Result type which can have ImpedanceException as Error
pub type ImpedanceResult<T> = Result<T, ImpedanceException>;
