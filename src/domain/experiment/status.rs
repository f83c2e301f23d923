//! Experiment lifecycle status and transition rules

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Status of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Experiment is being configured, not yet routing traffic
    #[default]
    Draft,
    /// Experiment is actively routing traffic
    Running,
    /// Experiment is temporarily paused
    Paused,
    /// Experiment has finished with an analysis attached
    Completed,
    /// Experiment was abandoned
    Cancelled,
}

impl ExperimentStatus {
    /// Check if the experiment is currently routing traffic
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if no further transitions are accepted
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Check if the experiment can accept configuration changes
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Check if a transition to the target status is valid
    pub fn can_transition_to(&self, target: ExperimentStatus) -> bool {
        match (self, target) {
            (Self::Draft, Self::Running) => true,
            (Self::Running, Self::Paused) => true,
            (Self::Paused, Self::Running) => true,
            (Self::Running | Self::Paused, Self::Completed) => true,
            (Self::Draft | Self::Running | Self::Paused, Self::Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!(
                "Invalid status '{}'. Valid values: draft, running, paused, completed, cancelled",
                other
            )),
        }
    }
}

/// Errors raised by the experiment lifecycle state machine
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExperimentStateError {
    #[error("Cannot {action} an experiment in {from} status")]
    InvalidTransition {
        from: ExperimentStatus,
        action: &'static str,
    },

    #[error("Cannot start an experiment without variants")]
    NoVariants,

    #[error("Cannot start: traffic percentages sum to {0}, expected 100")]
    InvalidTrafficSum(f64),

    #[error("Variants can only be changed while in draft status (current: {0})")]
    NotEditable(ExperimentStatus),
}
