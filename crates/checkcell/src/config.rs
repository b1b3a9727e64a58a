//! Analysis configuration, stored as `checkcell.yaml`.
//!
//! ```yaml
//! rounds: 2719
//! significance: 0.95
//! seed: 42
//! policy:
//!   kind: mixed
//!   scale: 0.5
//! tolerance: 1.0e-9
//! statistic: mean-magnitude
//! all-outputs: true
//! parse-policy: downgrade
//! dont-perturb: ["Sheet1!B2"]
//! ```
//!
//! Every field is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::bootstrap::{
    BootstrapConfig, DEFAULT_ROUNDS, DEFAULT_TOLERANCE, PerturbationPolicy, ScoreStatistic,
};
use crate::error::{Error, Result};
use crate::flagger::{DEFAULT_SIGNIFICANCE, Significance};
use crate::graph::ParsePolicy;

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "checkcell.yaml";

/// Default sheet for unqualified addresses in `dont-perturb`.
pub const DEFAULT_SHEET: &str = "Sheet1";

/// Settings for one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Bootstrap rounds.
    pub rounds: usize,
    /// Flagging threshold, strictly between 0 and 1.
    pub significance: f64,
    /// Random seed. A fresh seed is drawn (and reported) when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// How perturbed values are drawn.
    pub policy: PerturbationPolicy,
    /// Relative change counted as an exceedance.
    pub tolerance: f64,
    /// Score reduction.
    pub statistic: ScoreStatistic,
    /// Score every formula, not only unread ones.
    pub all_outputs: bool,
    /// Handling of unparseable formulas.
    pub parse_policy: ParsePolicy,
    /// Cells never perturbed, e.g. `Sheet1!B2` or `B2`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dont_perturb: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            significance: DEFAULT_SIGNIFICANCE,
            seed: None,
            policy: PerturbationPolicy::default(),
            tolerance: DEFAULT_TOLERANCE,
            statistic: ScoreStatistic::default(),
            all_outputs: true,
            parse_policy: ParsePolicy::default(),
            dont_perturb: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    /// Parse YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed YAML or unknown keys.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load `path` if it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validated significance threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignificance`] outside (0, 1).
    pub fn significance(&self) -> Result<Significance> {
        Significance::new(self.significance)
    }

    /// Bootstrap parameters.
    #[must_use]
    pub fn bootstrap(&self) -> BootstrapConfig {
        BootstrapConfig {
            rounds: self.rounds,
            policy: self.policy,
            tolerance: self.tolerance,
            statistic: self.statistic,
            all_outputs: self.all_outputs,
        }
    }

    /// Parsed `dont-perturb` addresses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an address that does not parse.
    pub fn frozen_cells(&self) -> Result<Vec<Address>> {
        self.dont_perturb
            .iter()
            .map(|text| {
                Address::parse(text, DEFAULT_SHEET)
                    .map_err(|e| Error::Config(format!("dont-perturb entry `{text}`: {e}")))
            })
            .collect()
    }

    /// Check every setting before any work starts.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        self.significance()?;
        self.bootstrap().validate()?;
        self.frozen_cells()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = AnalysisConfig::from_yaml("{}").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.rounds, 2719);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_every_field() {
        let yaml = r"
rounds: 50
significance: 0.9
seed: 7
policy:
  kind: deviation
  scale: 2.0
tolerance: 0.01
statistic: exceedance-rate
all-outputs: false
parse-policy: strict
dont-perturb: ['Data!A1', B2]
";
        let config = AnalysisConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rounds, 50);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.policy, PerturbationPolicy::Deviation { scale: 2.0 });
        assert_eq!(config.statistic, ScoreStatistic::ExceedanceRate);
        assert!(!config.all_outputs);
        assert_eq!(config.parse_policy, ParsePolicy::Strict);
        assert_eq!(
            config.frozen_cells().unwrap(),
            [Address::new("Data", 1, 1), Address::new("Sheet1", 2, 2)]
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            AnalysisConfig::from_yaml("roundz: 3"),
            Err(Error::Config(_))
        ));
    }

    #[rstest]
    #[case::significance("significance: 1.0")]
    #[case::rounds("rounds: 0")]
    #[case::tolerance("tolerance: -0.1")]
    #[case::frozen("dont-perturb: ['not a cell']")]
    fn invalid_settings_fail_validation(#[case] yaml: &str) {
        let config = AnalysisConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = AnalysisConfig {
            seed: Some(11),
            rounds: 10,
            ..AnalysisConfig::default()
        };

        config.save(&path).unwrap();
        assert_eq!(AnalysisConfig::load(&path).unwrap(), config);
        assert_eq!(
            AnalysisConfig::load_or_default(&dir.path().join("missing.yaml")).unwrap(),
            AnalysisConfig::default()
        );
    }
}
