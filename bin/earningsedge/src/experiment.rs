use std::path::Path;

use serde::Deserialize;

use attribution::AnalyzerConfig;
use common::{Error, Result};
use features::FeatureConfig;
use policy::PolicyConfig;
use simulator::EnvConfig;

/// Experiment definition (TOML). Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExperimentFile {
    #[serde(default)]
    pub env: EnvConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(rename = "policy", default)]
    pub policies: Vec<PolicyConfig>,
}

impl ExperimentFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read experiment file '{}': {e}", path.display()))
        })?;
        let file: Self = toml::from_str(&content)?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<()> {
        self.env.validate()?;
        self.features.validate()?;
        self.analyzer.validate()?;
        if self.policies.is_empty() {
            return Err(Error::Config("experiment defines no [[policy]] entries".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_experiment_is_valid() {
        let file: ExperimentFile =
            toml::from_str(include_str!("../../../config/experiment.toml")).unwrap();
        file.validate().unwrap();
        assert_eq!(file.policies.len(), 3);
        assert_eq!(file.env.horizon, 252);
        assert_eq!(file.features.earnings_window, 5);
        assert!(file.policies.iter().any(|p| p.agent));
    }

    #[test]
    fn missing_policies_is_rejected() {
        let file: ExperimentFile = toml::from_str("[env]\nhorizon = 30").unwrap();
        assert!(matches!(file.validate(), Err(Error::Config(_))));
    }
}
