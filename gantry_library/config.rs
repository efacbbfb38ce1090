//! Robot configuration
//!
//! One YAML document describes the whole robot: run loop timing, actuator
//! setpoints, roller powers, phase dwell lengths and the field constraint
//! table used by the validator. Every section has defaults, so a partial
//! file only overrides what it names.
//!
//! ```yaml
//! scheduler:
//!   period_ms: 20
//! arm:
//!   levels:
//!     low: 0.35
//!     mid: 0.9
//!     high: 1.35
//! timing:
//!   release_dwell_periods: 10
//! ```

use gantry_core::error::{GantryError, GantryResult};
use gantry_core::{DomainConstraints, Level, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default location of the configuration file inside a project
pub const DEFAULT_CONFIG_PATH: &str = ".gantry/config/robot.yaml";

/// Arm joint setpoints, in radians
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    /// Placement setpoint per grid level. A level without an entry cannot
    /// be placed at.
    pub levels: BTreeMap<Level, f64>,
    pub ground: f64,
    /// Loading station height
    pub station: f64,
    pub stow: f64,
    pub shoot: f64,
    pub tolerance: f64,
    /// Simulated travel per period
    pub slew_per_period: f64,
}

impl Default for ArmConfig {
    fn default() -> Self {
        let mut levels = BTreeMap::new();
        levels.insert(Level::Low, 0.35);
        levels.insert(Level::Mid, 0.9);
        levels.insert(Level::High, 1.35);
        Self {
            levels,
            ground: -0.2,
            station: 1.1,
            stow: 0.0,
            shoot: 0.6,
            tolerance: 0.02,
            slew_per_period: 0.05,
        }
    }
}

impl ArmConfig {
    /// Placement setpoint for `level`
    pub fn setpoint(&self, level: Level) -> GantryResult<f64> {
        self.levels.get(&level).copied().ok_or_else(|| {
            GantryError::construction("place", format!("no arm setpoint for level {:?}", level))
        })
    }
}

/// Claw positions, in meters of jaw opening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabberConfig {
    pub open: f64,
    pub closed: f64,
    pub tolerance: f64,
    pub slew_per_period: f64,
    /// Range reading at or below which a piece counts as held
    pub proximity_threshold: f64,
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self {
            open: 0.12,
            closed: 0.0,
            tolerance: 0.005,
            slew_per_period: 0.02,
            proximity_threshold: 0.05,
        }
    }
}

/// Roller powers, -1.0..=1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub intake_power: f64,
    pub eject_power: f64,
    pub shoot_power: f64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            intake_power: 0.8,
            eject_power: -0.5,
            shoot_power: -1.0,
        }
    }
}

/// Phase lengths counted in scheduler periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub release_dwell_periods: u32,
    pub shoot_dwell_periods: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            release_dwell_periods: 10,
            shoot_dwell_periods: 15,
        }
    }
}

/// Behaviour of the simulated world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Periods of intake power before a piece reaches the grabber
    pub pickup_periods: u32,
    /// Periods of eject power before a held piece is gone
    pub release_periods: u32,
    /// Range reading with nothing in the grabber, in meters
    pub empty_range: f64,
    /// Range reading with a piece in the grabber, in meters
    pub held_range: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            pickup_periods: 8,
            release_periods: 4,
            empty_range: 0.5,
            held_range: 0.02,
        }
    }
}

/// Complete robot configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GantryConfig {
    pub scheduler: SchedulerConfig,
    pub arm: ArmConfig,
    pub grabber: GrabberConfig,
    pub intake: IntakeConfig,
    pub timing: TimingConfig,
    pub constraints: DomainConstraints,
    pub sim: SimConfig,
}

impl GantryConfig {
    /// Load and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> GantryResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&yaml)?;
        log::info!("Loaded robot configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> GantryResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_yaml(yaml: &str) -> GantryResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> GantryResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the configuration, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> GantryResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn validate(&self) -> GantryResult<()> {
        self.scheduler.validate()?;

        for (name, value) in [
            ("arm.tolerance", self.arm.tolerance),
            ("arm.slew_per_period", self.arm.slew_per_period),
            ("grabber.tolerance", self.grabber.tolerance),
            ("grabber.slew_per_period", self.grabber.slew_per_period),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GantryError::config(format!("{} must be positive", name)));
            }
        }

        for (name, value) in [
            ("intake.intake_power", self.intake.intake_power),
            ("intake.eject_power", self.intake.eject_power),
            ("intake.shoot_power", self.intake.shoot_power),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(GantryError::config(format!(
                    "{} must be within -1.0..=1.0, got {}",
                    name, value
                )));
            }
        }

        if self.grabber.open <= self.grabber.closed {
            return Err(GantryError::config(
                "grabber.open must be wider than grabber.closed",
            ));
        }
        if self.sim.held_range >= self.sim.empty_range {
            return Err(GantryError::config(
                "sim.held_range must be shorter than sim.empty_range",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_yaml() {
        let config = GantryConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(GantryConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = GantryConfig::from_yaml(
            "scheduler:\n  period_ms: 10\narm:\n  levels:\n    low: 0.3\n",
        )
        .unwrap();
        assert_eq!(config.scheduler.period_ms, 10);
        assert_eq!(config.arm.stow, ArmConfig::default().stow);
        assert!(config.arm.setpoint(Level::Low).is_ok());
        assert!(matches!(
            config.arm.setpoint(Level::High),
            Err(GantryError::Construction { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        let mut config = GantryConfig::default();
        config.arm.tolerance = -0.1;
        assert!(config.validate().is_err());

        let mut config = GantryConfig::default();
        config.intake.intake_power = 1.5;
        assert!(config.validate().is_err());

        assert!(GantryConfig::from_yaml("scheduler:\n  period_ms: 0\n").is_err());
    }
}
