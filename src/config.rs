// SPDX-License-Identifier: Apache-2.0

//! Driver configuration, read from `smtbridge.toml`:
//!
//! ```toml
//! backend = "smtlib2"
//! preset = "cvc5"
//!
//! [features]
//! const_arrays = false
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::backends::BackendKind;
use crate::capabilities::{Capabilities, ProblemFeatures};
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    /// Language of the emitted command stream.
    #[serde(default)]
    pub backend: BackendKind,

    /// Capability preset (`z3`, `cvc5`, `yices` or `smtlib2-minimal`). When
    /// absent the backend's own preset is used.
    pub preset: Option<String>,

    /// Overrides of individual preset features, by feature name.
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
}

/// The named capability preset.
pub fn preset(name: &str) -> Result<Capabilities> {
    match name {
        "z3" => Ok(Capabilities::z3()),
        "cvc5" => Ok(Capabilities::cvc5()),
        "yices" => Ok(Capabilities::yices()),
        "smtlib2-minimal" => Ok(Capabilities::smtlib2_minimal()),
        _ => Err(BridgeError::Config(format!("unknown preset `{}`", name))),
    }
}

fn feature_named(name: &str) -> Result<ProblemFeatures> {
    ProblemFeatures::NAMED
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, f)| *f)
        .ok_or_else(|| BridgeError::Config(format!("unknown feature `{}`", name)))
}

impl DriverConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The capability profile: the preset, then the feature overrides.
    pub fn capabilities(&self) -> Result<Capabilities> {
        let mut caps = match &self.preset {
            Some(name) => preset(name)?,
            None => self.backend.default_capabilities(),
        };
        for (name, enabled) in &self.features {
            let flag = feature_named(name)?;
            caps = if *enabled {
                caps.with(flag)
            } else {
                caps.without(flag)
            };
        }
        log::debug!("configured capabilities: {}", caps);
        Ok(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_backend_default() {
        let config = DriverConfig::from_toml_str("").unwrap();
        assert_eq!(config.backend, BackendKind::SmtLib2);
        assert_eq!(config.capabilities().unwrap(), Capabilities::z3());
    }

    #[test]
    fn test_feature_overrides_apply_to_preset() {
        let config = DriverConfig::from_toml_str(
            r#"
backend = "yices"
preset = "yices"

[features]
function_update = false
arrays = true
"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Yices);
        let caps = config.capabilities().unwrap();
        assert!(!caps.supports(ProblemFeatures::FUNCTION_UPDATE));
        assert!(caps.supports(ProblemFeatures::ARRAYS | ProblemFeatures::LAMBDAS));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smtbridge.toml");
        std::fs::write(&path, "preset = \"smtlib2-minimal\"\n").unwrap();
        let config = DriverConfig::from_path(&path).unwrap();
        assert_eq!(config.capabilities().unwrap(), Capabilities::smtlib2_minimal());

        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            DriverConfig::from_path(&missing),
            Err(BridgeError::Io(_))
        ));
    }

    #[test]
    fn test_unknown_names_are_config_errors() {
        let config = DriverConfig::from_toml_str("preset = \"mathsat\"").unwrap();
        assert!(matches!(config.capabilities(), Err(BridgeError::Config(_))));
        let config = DriverConfig::from_toml_str("[features]\nbignums = true").unwrap();
        let err = config.capabilities().unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration: unknown feature `bignums`");
        assert!(DriverConfig::from_toml_str("solver = \"z3\"").is_err());
    }
}
