//! Error taxonomy for the core.
//!
//! Each component family gets its own variant set rather than one flat enum,
//! mirroring how `ml/policy.rs` kept model-loading failures
//! local to `Policy::from_onnx` instead of a crate-wide error type. Here we
//! still want named categories, one per owning component, so we use
//! `thiserror` instead of a blanket `Box<dyn std::error::Error>>`.

use thiserror::Error;

/// Errors raised by [`crate::model::RigidBodyModel`].
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown link id {0}")]
    UnknownLink(String),
    #[error("unknown joint id {0:?}")]
    UnknownJoint(crate::joint::JointId),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Errors raised by [`crate::rls::RecursiveLls`].
#[derive(Debug, Error)]
pub enum RlsError {
    #[error("regressor has {got} elements, estimator is dimensioned for {expected}")]
    IllDimensioned { expected: usize, got: usize },
}

/// Errors raised by [`crate::solver::TaskSolver`].
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("task '{task}' has {got} columns, solver is sized for {expected}")]
    DimensionMismatch {
        task: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Errors raised by [`crate::actuator::ActuatorGateway`].
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("joint {0:?} has no registered actuator")]
    UnknownJoint(crate::joint::JointId),
    #[error("reference value for joint {0:?} is not valid for mode {1:?}")]
    InvalidReference(crate::joint::JointId, crate::actuator::ControlMode),
    #[error("driver failed to re-arm joint {0:?} for mode {1:?}; previous mode retained")]
    ReArmFailed(crate::joint::JointId, crate::actuator::ControlMode),
}

/// Errors raised by [`crate::sensors::SensorGateway`].
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor {id} of kind {kind:?} is already registered")]
    AlreadyRegistered { kind: crate::sensors::SensorKind, id: String },
    #[error("no sensor {id} of kind {kind:?} is registered")]
    UnknownSensor { kind: crate::sensors::SensorKind, id: String },
    #[error("sample for sensor {id} has {got} elements, kind {kind:?} expects {expected}")]
    WrongSampleLen {
        kind: crate::sensors::SensorKind,
        id: String,
        expected: usize,
        got: usize,
    },
    #[error("blocking read of sensor {id} timed out waiting for a fresh sample")]
    Timeout { id: String },
}

/// Errors raised at configuration load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("subtree '{0}' has no member links")]
    EmptySubtree(String),
    #[error("subtree '{subtree}' default-contact link '{link}' is not a member of the subtree")]
    DefaultContactNotMember { subtree: String, link: String },
    #[error("subtrees do not cover link '{0}'")]
    UncoveredLink(String),
    #[error("unknown link '{0}' referenced in configuration")]
    UnknownLink(String),
}
