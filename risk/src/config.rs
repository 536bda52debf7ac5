//! Top-level configuration
//!
//! Groups the per-component settings so a deployment can keep them in a
//! single YAML or JSON document:
//!
//! ```yaml
//! returns:
//!   method: log
//!   missing_data: forward_fill
//! var:
//!   min_observations: 60
//!   monte_carlo:
//!     num_simulations: 50000
//!     seed: 7
//! stress:
//!   duration_policy:
//!     type: default
//!     years: 6.5
//! ```

use crate::error::{Result, RiskError};
use crate::returns::ReturnsConfig;
use crate::stress::StressConfig;
use crate::var::VarConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for every engine in the crate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Returns preparation settings
    #[serde(default)]
    pub returns: ReturnsConfig,

    /// VaR engine settings
    #[serde(default)]
    pub var: VarConfig,

    /// Stress applicator settings
    #[serde(default)]
    pub stress: StressConfig,
}

impl RiskConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RiskConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RiskConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a `.yaml`, `.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            Some("json") => Self::from_json(&contents),
            other => Err(RiskError::Config(format!(
                "Unsupported configuration format: {:?} ({})",
                other,
                path.display()
            ))),
        }
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.returns.validate()?;
        self.var.validate()?;
        self.stress.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::{MissingDataPolicy, ReturnMethod};
    use crate::stress::DurationPolicy;
    use crate::var::SimulationModel;

    #[test]
    fn test_defaults() {
        let config = RiskConfig::default();

        assert_eq!(config.var.min_observations, 20);
        assert_eq!(config.var.monte_carlo.num_simulations, 10_000);
        assert_eq!(config.var.monte_carlo.seed, None);
        assert_eq!(config.returns.method, ReturnMethod::Simple);
        assert_eq!(config.returns.missing_data, MissingDataPolicy::DropRow);
        assert_eq!(config.stress.duration_policy, DurationPolicy::Default { years: 5.0 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
returns:
  method: log
  missing_data: forward_fill
var:
  min_observations: 60
  monte_carlo:
    num_simulations: 50000
    seed: 7
    model:
      type: student_t
      degrees_of_freedom: 4.0
stress:
  duration_policy:
    type: require
"#;
        let config = RiskConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.returns.method, ReturnMethod::Log);
        assert_eq!(config.returns.missing_data, MissingDataPolicy::ForwardFill);
        assert_eq!(config.var.min_observations, 60);
        assert_eq!(config.var.monte_carlo.num_simulations, 50_000);
        assert_eq!(config.var.monte_carlo.seed, Some(7));
        assert_eq!(
            config.var.monte_carlo.model,
            SimulationModel::StudentT { degrees_of_freedom: 4.0 }
        );
        // Fields left out keep their defaults
        assert_eq!(config.var.max_condition_number, 1e10);
        assert_eq!(config.stress.duration_policy, DurationPolicy::Require);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{ "var": { "min_observations": 30 } }"#;
        let config = RiskConfig::from_json(json).unwrap();

        assert_eq!(config.var.min_observations, 30);
        assert_eq!(config.var.weight_tolerance, 1e-6);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let yaml = r#"
var:
  monte_carlo:
    num_simulations: 0
"#;
        assert!(matches!(
            RiskConfig::from_yaml(yaml),
            Err(RiskError::InvalidParameter { .. })
        ));

        let yaml = r#"
stress:
  duration_policy:
    type: default
    years: -1.0
"#;
        assert!(RiskConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risk.yaml");
        std::fs::write(&path, "var:\n  min_observations: 25\n").unwrap();

        let config = RiskConfig::from_file(&path).unwrap();
        assert_eq!(config.var.min_observations, 25);

        let path = dir.path().join("risk.toml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(RiskConfig::from_file(&path), Err(RiskError::Config(_))));
    }
}
