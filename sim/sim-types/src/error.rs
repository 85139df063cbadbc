//! Error types for simulation operations.
//!
//! Only registration, configuration and divergence produce errors. Collision
//! queries and the constraint solver report failure through `Option`.

use thiserror::Error;

/// Errors that can occur while building or stepping a world.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },

    /// A body handle that the world never issued.
    #[error("invalid body handle: {0}")]
    InvalidBodyHandle(usize),

    /// A collider handle that the world never issued.
    #[error("invalid collider handle: {0}")]
    InvalidColliderHandle(usize),

    /// Shape geometry that cannot support collision queries.
    #[error("degenerate shape: {reason}")]
    DegenerateShape {
        /// Description of the defect.
        reason: String,
    },

    /// The body already owns a collider.
    #[error("body {body} already has a collider")]
    BodyAlreadyHasCollider {
        /// Slot of the body.
        body: usize,
    },
}

impl SimError {
    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Create a degenerate shape error.
    #[must_use]
    pub fn degenerate_shape(reason: impl Into<String>) -> Self {
        Self::DegenerateShape {
            reason: reason.into(),
        }
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::InvalidTimestep(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::InvalidBodyHandle(42);
        assert!(err.to_string().contains("42"));

        let err = SimError::BodyAlreadyHasCollider { body: 3 };
        assert_eq!(err.to_string(), "body 3 already has a collider");

        let err = SimError::degenerate_shape("mesh has 2 vertices");
        assert!(err.to_string().contains("2 vertices"));

        let err = SimError::diverged("NaN in velocity");
        assert!(err.to_string().contains("NaN"));
    }

    #[test]
    fn test_error_predicates() {
        let err = SimError::diverged("test");
        assert!(err.is_diverged());
        assert!(!err.is_config_error());

        let err = SimError::invalid_config("bad value");
        assert!(err.is_config_error());
        assert!(!err.is_diverged());

        assert!(SimError::InvalidTimestep(-1.0).is_config_error());
        assert!(!SimError::invalid_mass("zero").is_config_error());
    }
}
