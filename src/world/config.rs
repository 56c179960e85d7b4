use glam::Vec3;

use crate::collision::BroadphaseKind;
use crate::dynamics::{ContactMaterial, SolverKind};
use crate::error::PhysicsError;

/// Configuration for the physics simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    /// Gravity vector. Default: (0, -9.81, 0).
    pub gravity: Vec3,
    /// Fixed timestep for physics updates in seconds. Default: 1/60.
    pub fixed_timestep: f64,
    /// Maximum number of sub-steps per [`World::advance`](super::World::advance) call. Default: 4.
    pub max_substeps: u32,
    /// Number of constraint solver iterations. Default: 10.
    pub solver_iterations: usize,
    /// Solver stops early once an iteration changes impulses by less than this. Default: 1e-7.
    pub solver_tolerance: f32,
    pub solver: SolverKind,
    pub broadphase: BroadphaseKind,
    /// Seed contact equations with last step's impulses. Default: true.
    pub warm_starting: bool,
    /// Contact parameters used when no material pair applies.
    pub default_contact_material: ContactMaterial,
    /// Let slow bodies fall asleep. Default: false.
    pub allow_sleep: bool,
    /// Speed below which a body counts as resting. Default: 0.1.
    pub sleep_speed_limit: f32,
    /// Seconds a body must rest before it sleeps. Default: 1.0.
    pub sleep_time_limit: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 4,
            solver_iterations: 10,
            solver_tolerance: 1e-7,
            solver: SolverKind::default(),
            broadphase: BroadphaseKind::default(),
            warm_starting: true,
            default_contact_material: ContactMaterial::default(),
            allow_sleep: false,
            sleep_speed_limit: 0.1,
            sleep_time_limit: 1.0,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), PhysicsError> {
        let invalid = |msg: String| Err(PhysicsError::InvalidConfig(msg));

        if !self.gravity.is_finite() {
            return invalid(format!("gravity must be finite, got {}", self.gravity));
        }
        if !(self.fixed_timestep.is_finite() && self.fixed_timestep > 0.0) {
            return invalid(format!(
                "fixed_timestep must be positive, got {}",
                self.fixed_timestep
            ));
        }
        if self.max_substeps == 0 {
            return invalid("max_substeps must be at least 1".into());
        }
        if self.solver_iterations == 0 {
            return invalid("solver_iterations must be at least 1".into());
        }
        if !(self.solver_tolerance.is_finite() && self.solver_tolerance >= 0.0) {
            return invalid(format!(
                "solver_tolerance must be non-negative, got {}",
                self.solver_tolerance
            ));
        }
        if let BroadphaseKind::Grid {
            cell_size: Some(size),
        } = self.broadphase
        {
            if !(size.is_finite() && size > 0.0) {
                return invalid(format!("grid cell size must be positive, got {size}"));
            }
        }
        if !(self.sleep_speed_limit.is_finite() && self.sleep_speed_limit >= 0.0) {
            return invalid(format!(
                "sleep_speed_limit must be non-negative, got {}",
                self.sleep_speed_limit
            ));
        }
        if !(self.sleep_time_limit.is_finite() && self.sleep_time_limit >= 0.0) {
            return invalid(format!(
                "sleep_time_limit must be non-negative, got {}",
                self.sleep_time_limit
            ));
        }
        self.default_contact_material
            .validate()
            .map_err(PhysicsError::InvalidConfig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = WorldConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gravity, Vec3::new(0.0, -9.81, 0.0));
        assert!((config.fixed_timestep - 1.0 / 60.0).abs() < 1e-12);
        assert_eq!(config.max_substeps, 4);
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = [
            WorldConfig {
                fixed_timestep: 0.0,
                ..Default::default()
            },
            WorldConfig {
                solver_iterations: 0,
                ..Default::default()
            },
            WorldConfig {
                gravity: Vec3::new(f32::NAN, 0.0, 0.0),
                ..Default::default()
            },
            WorldConfig {
                broadphase: BroadphaseKind::Grid {
                    cell_size: Some(-1.0),
                },
                ..Default::default()
            },
            WorldConfig {
                default_contact_material: ContactMaterial::default().with_restitution(2.0),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(PhysicsError::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }
}
