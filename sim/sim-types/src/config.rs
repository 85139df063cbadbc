//! Configuration types for simulation.
//!
//! Every tunable of the collision pipeline lives here and is owned by the
//! world. Nothing is shared through globals, so two worlds with different
//! settings can run side by side.

use crate::dynamics::Gravity;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Main configuration for a simulation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Fixed timestep used by the stepper (seconds).
    pub timestep: f64,
    /// Gravity configuration.
    pub gravity: Gravity,
    /// Integrator and constraint solver configuration.
    pub solver: SolverConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 60.0,
            gravity: Gravity::earth(),
            solver: SolverConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Create a new simulation config with the given timestep.
    #[must_use]
    pub fn with_timestep(timestep: f64) -> Self {
        Self {
            timestep,
            ..Default::default()
        }
    }

    /// Configuration for real-time simulation (60 Hz).
    #[must_use]
    pub fn realtime() -> Self {
        Self::default()
    }

    /// Configuration for high-fidelity simulation (240 Hz, more passes).
    #[must_use]
    pub fn high_fidelity() -> Self {
        Self {
            timestep: 1.0 / 240.0,
            solver: SolverConfig::high_accuracy(),
            ..Default::default()
        }
    }

    /// Set the gravity.
    #[must_use]
    pub fn gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity.
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Gravity::zero();
        self
    }

    /// Set the solver configuration.
    #[must_use]
    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.timestep));
        }

        if self.timestep > 1.0 {
            return Err(crate::SimError::invalid_config(
                "timestep > 1 second is likely an error",
            ));
        }

        if !self.gravity.acceleration.iter().all(|x| x.is_finite()) {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }

        self.solver.validate()?;

        Ok(())
    }

    /// Get the frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.timestep
    }
}

/// Configuration for integration and the contact solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Integration method for body dynamics.
    pub integration: IntegrationMethod,
    /// Number of equal sub-steps the integrator splits each tick into.
    pub integrator_iterations: usize,
    /// Number of Gauss-Seidel passes over the contact constraints.
    pub constraint_solver_iterations: usize,
    /// Fraction of penetration fed back as velocity bias each tick.
    pub baumgarte_scalar: f64,
    /// Penetration depth tolerated without positional correction (m).
    pub penetration_slop: f64,
    /// Closing speed below which restitution is ignored (m/s).
    pub restitution_slop: f64,
    /// Restitution used by colliders without their own coefficient.
    pub default_restitution: f64,
    /// Accumulated impulse each constraint starts a tick with.
    pub initial_impulse: f64,
    /// |Δλ| below which a constraint is pruned for the rest of the tick.
    pub convergence_threshold: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            integration: IntegrationMethod::Euler,
            integrator_iterations: 1,
            constraint_solver_iterations: 10,
            baumgarte_scalar: 0.2,
            penetration_slop: 0.0005,
            restitution_slop: 0.5,
            default_restitution: 0.0,
            initial_impulse: 0.0,
            convergence_threshold: 1e-9,
        }
    }
}

impl SolverConfig {
    /// High-accuracy configuration: RK4, more solver passes, tighter slop.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            integration: IntegrationMethod::RungeKutta4,
            constraint_solver_iterations: 20,
            penetration_slop: 0.0001,
            convergence_threshold: 1e-12,
            ..Default::default()
        }
    }

    /// Set the integration method.
    #[must_use]
    pub fn integration(mut self, method: IntegrationMethod) -> Self {
        self.integration = method;
        self
    }

    /// Set the number of integrator sub-steps and solver passes.
    #[must_use]
    pub fn iterations(mut self, integrator: usize, constraint_solver: usize) -> Self {
        self.integrator_iterations = integrator;
        self.constraint_solver_iterations = constraint_solver;
        self
    }

    /// Set the Baumgarte stabilization factor.
    #[must_use]
    pub fn baumgarte(mut self, beta: f64) -> Self {
        self.baumgarte_scalar = beta;
        self
    }

    /// Set the penetration and restitution slop.
    #[must_use]
    pub fn slop(mut self, penetration: f64, restitution: f64) -> Self {
        self.penetration_slop = penetration;
        self.restitution_slop = restitution;
        self
    }

    /// Set the default restitution coefficient, clamped to [0, 1].
    #[must_use]
    pub fn restitution(mut self, restitution: f64) -> Self {
        self.default_restitution = restitution.clamp(0.0, 1.0);
        self
    }

    /// Validate the solver configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.integrator_iterations == 0 {
            return Err(crate::SimError::invalid_config(
                "integrator_iterations must be at least 1",
            ));
        }

        if self.constraint_solver_iterations == 0 {
            return Err(crate::SimError::invalid_config(
                "constraint_solver_iterations must be at least 1",
            ));
        }

        // In per-tick units the stable range 0 < β < 2/Δt becomes [0, 2).
        if !(0.0..2.0).contains(&self.baumgarte_scalar) {
            return Err(crate::SimError::invalid_config(
                "baumgarte_scalar must be in [0, 2)",
            ));
        }

        if !(self.penetration_slop >= 0.0 && self.penetration_slop.is_finite()) {
            return Err(crate::SimError::invalid_config(
                "penetration_slop must be finite and non-negative",
            ));
        }

        if !(self.restitution_slop >= 0.0 && self.restitution_slop.is_finite()) {
            return Err(crate::SimError::invalid_config(
                "restitution_slop must be finite and non-negative",
            ));
        }

        if !(0.0..=1.0).contains(&self.default_restitution) {
            return Err(crate::SimError::invalid_config(
                "restitution must be between 0 and 1",
            ));
        }

        if !(self.initial_impulse >= 0.0 && self.initial_impulse.is_finite()) {
            return Err(crate::SimError::invalid_config(
                "initial_impulse must be finite and non-negative",
            ));
        }

        if !(self.convergence_threshold >= 0.0 && self.convergence_threshold.is_finite()) {
            return Err(crate::SimError::invalid_config(
                "convergence_threshold must be finite and non-negative",
            ));
        }

        Ok(())
    }
}

/// Integration method for body dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntegrationMethod {
    /// Semi-implicit Euler (symplectic, the default).
    #[default]
    Euler,
    /// Velocity Verlet (second-order, symplectic).
    Verlet,
    /// 4th-order Runge-Kutta (high accuracy, expensive).
    RungeKutta4,
}

impl IntegrationMethod {
    /// Get the order of accuracy for this method.
    #[must_use]
    pub const fn order(self) -> usize {
        match self {
            Self::Euler => 1,
            Self::Verlet => 2,
            Self::RungeKutta4 => 4,
        }
    }

    /// Check if this method is symplectic (energy-preserving).
    #[must_use]
    pub const fn is_symplectic(self) -> bool {
        matches!(self, Self::Euler | Self::Verlet)
    }
}

impl std::fmt::Display for IntegrationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Euler => write!(f, "Semi-Implicit Euler"),
            Self::Verlet => write!(f, "Velocity Verlet"),
            Self::RungeKutta4 => write!(f, "RK4"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_relative_eq!(config.timestep, 1.0 / 60.0, epsilon = 1e-10);
        assert_relative_eq!(config.gravity.acceleration.z, -9.81, epsilon = 1e-10);
    }

    #[test]
    fn test_solver_defaults() {
        let solver = SolverConfig::default();
        assert_eq!(solver.integration, IntegrationMethod::Euler);
        assert_eq!(solver.integrator_iterations, 1);
        assert_eq!(solver.constraint_solver_iterations, 10);
        assert_relative_eq!(solver.baumgarte_scalar, 0.2);
        assert_relative_eq!(solver.penetration_slop, 0.0005);
        assert_relative_eq!(solver.restitution_slop, 0.5);
        assert_eq!(solver.initial_impulse, 0.0);
    }

    #[test]
    fn test_solver_settings_copy_out_of_config() {
        let config = SimulationConfig::default().solver(SolverConfig::default().baumgarte(0.3));

        // Reading the solver settings leaves the config whole
        let solver = config.solver;
        let tuned = solver.iterations(1, 4);
        assert!(config.validate().is_ok());
        assert_eq!(config.solver, solver);
        assert_relative_eq!(config.solver.baumgarte_scalar, 0.3);
        assert_eq!(config.solver.constraint_solver_iterations, 10);
        assert_eq!(tuned.constraint_solver_iterations, 4);
    }

    #[test]
    fn test_config_presets() {
        let hifi = SimulationConfig::high_fidelity();
        assert_relative_eq!(hifi.timestep, 1.0 / 240.0, epsilon = 1e-10);
        assert_eq!(hifi.solver.integration, IntegrationMethod::RungeKutta4);
        assert!(hifi.validate().is_ok());

        assert_eq!(SimulationConfig::realtime(), SimulationConfig::default());
    }

    #[test]
    fn test_config_builder() {
        let config = SimulationConfig::with_timestep(0.001)
            .zero_gravity()
            .solver(SolverConfig::default().iterations(2, 4).baumgarte(0.3).restitution(1.5));

        assert_relative_eq!(config.timestep, 0.001, epsilon = 1e-10);
        assert!(config.gravity.is_zero());
        assert_eq!(config.solver.integrator_iterations, 2);
        assert_eq!(config.solver.constraint_solver_iterations, 4);
        assert_relative_eq!(config.solver.baumgarte_scalar, 0.3);
        assert_eq!(config.solver.default_restitution, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SimulationConfig::default();
        assert!(config.validate().is_ok());

        config.timestep = -0.01;
        assert!(config.validate().is_err());

        config.timestep = 0.0;
        assert!(config.validate().is_err());

        config.timestep = f64::NAN;
        let err = config.validate().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_solver_validation() {
        let mut solver = SolverConfig::default();
        assert!(solver.validate().is_ok());

        solver.constraint_solver_iterations = 0;
        assert!(solver.validate().is_err());

        solver = SolverConfig::default();
        solver.integrator_iterations = 0;
        assert!(solver.validate().is_err());

        solver = SolverConfig::default().baumgarte(2.0);
        assert!(solver.validate().is_err());

        solver = SolverConfig::default().baumgarte(-0.1);
        assert!(solver.validate().is_err());

        solver = SolverConfig::default().slop(-0.001, 0.5);
        assert!(solver.validate().is_err());

        solver = SolverConfig::default();
        solver.default_restitution = 1.5;
        assert!(solver.validate().is_err());

        solver = SolverConfig::default();
        solver.initial_impulse = -1.0;
        assert!(solver.validate().is_err());
    }

    #[test]
    fn test_integration_method() {
        assert_eq!(IntegrationMethod::Euler.order(), 1);
        assert_eq!(IntegrationMethod::Verlet.order(), 2);
        assert_eq!(IntegrationMethod::RungeKutta4.order(), 4);

        assert!(IntegrationMethod::Euler.is_symplectic());
        assert!(IntegrationMethod::Verlet.is_symplectic());
        assert!(!IntegrationMethod::RungeKutta4.is_symplectic());

        assert_eq!(IntegrationMethod::default(), IntegrationMethod::Euler);
        assert_eq!(IntegrationMethod::RungeKutta4.to_string(), "RK4");
    }

    #[test]
    fn test_frequency() {
        let config = SimulationConfig::with_timestep(0.01);
        assert_relative_eq!(config.frequency(), 100.0, epsilon = 1e-10);
    }
}
