//! Service configuration.
//!
//! Loaded from a JSON file (or [`MixConfig::default`]) and then overridden from
//! the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CONTENTMIX_BIND` | `bind` |
//! | `CONTENTMIX_QUERY` | `query` |
//! | `CONTENTMIX_ABORT_POLICY` | `abort_policy` |
//!
//! `CONTENTMIX_CONFIG` names the file itself and is read by the binary.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::adapters::SampleBehavior;
use crate::engine::{AbortPolicy, EngineConfig};
use crate::error::{ConfigurationError, ValidationError};
use crate::{ProviderDescriptor, ProviderId};

pub const ENV_CONFIG_PATH: &str = "CONTENTMIX_CONFIG";
pub const ENV_BIND: &str = "CONTENTMIX_BIND";
pub const ENV_QUERY: &str = "CONTENTMIX_QUERY";
pub const ENV_ABORT_POLICY: &str = "CONTENTMIX_ABORT_POLICY";

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_QUERY: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub bind: String,
    pub query: String,
    pub items_per_fetch: usize,
    pub abort_policy: AbortPolicy,
    pub providers: Vec<ProviderDescriptor>,
    pub sample: SampleBehavior,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            bind: String::from(DEFAULT_BIND),
            query: String::from(DEFAULT_QUERY),
            items_per_fetch: 1,
            abort_policy: AbortPolicy::default(),
            providers: default_mix(),
            sample: SampleBehavior::default(),
        }
    }
}

impl MixConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|source| ConfigurationError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `CONTENTMIX_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigurationError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigurationError> {
        if let Some(bind) = lookup(ENV_BIND).filter(|value| !value.trim().is_empty()) {
            self.bind = bind.trim().to_owned();
        }
        if let Some(query) = lookup(ENV_QUERY) {
            self.query = query;
        }
        if let Some(policy) = lookup(ENV_ABORT_POLICY) {
            self.abort_policy = policy.parse()?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.items_per_fetch == 0 {
            return Err(ValidationError::ZeroItemsPerFetch.into());
        }
        self.sample.validate()?;
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            query: self.query.clone(),
            items_per_fetch: self.items_per_fetch,
            abort_policy: self.abort_policy,
        }
    }
}

/// Eight-slot mix over providers `1`, `2` and `3`.
fn default_mix() -> Vec<ProviderDescriptor> {
    const MIX: [(&str, Option<&str>); 8] = [
        ("1", Some("2")),
        ("1", Some("3")),
        ("2", Some("3")),
        ("3", Some("1")),
        ("1", Some("2")),
        ("1", Some("3")),
        ("2", None),
        ("3", Some("1")),
    ];

    MIX.iter()
        .filter_map(|(id, fallback)| {
            let id = ProviderId::parse(id).ok()?;
            let fallback = fallback.and_then(|value| ProviderId::parse(value).ok());
            Some(ProviderDescriptor::new(id, fallback))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn default_mix_has_eight_slots() {
        let config = MixConfig::default();
        assert_eq!(config.providers.len(), 8);
        assert_eq!(config.providers[0].id.as_str(), "1");
        assert!(config.providers[6].fallback.is_none());
        assert_eq!(config.abort_policy, AbortPolicy::Detach);
    }

    #[test]
    fn loads_partial_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"providers":[{{"provider":"alpha","fallback":"beta"}},{{"provider":"beta"}}],"abort_policy":"cancel"}}"#
        )
        .expect("write config");

        let config = MixConfig::load(file.path()).expect("config loads");

        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.abort_policy, AbortPolicy::Cancel);
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.query, DEFAULT_QUERY);
    }

    #[test]
    fn reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"providers":[{{"provider":""}}]}}"#).expect("write config");

        let error = MixConfig::load(file.path()).expect_err("empty id must fail");
        assert!(matches!(error, ConfigurationError::Parse { .. }));
    }

    #[test]
    fn reports_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = MixConfig::load(dir.path().join("absent.json")).expect_err("must fail");
        assert!(matches!(error, ConfigurationError::Read { .. }));
    }

    #[test]
    fn rejects_invalid_failure_rate() {
        let mut config = MixConfig::default();
        config.sample.failure_rate = -0.1;

        let error = config.validate().expect_err("must fail");
        assert!(matches!(
            error,
            ConfigurationError::Validation(ValidationError::InvalidFailureRate { .. })
        ));
    }

    #[test]
    fn rejects_zero_items_per_fetch() {
        let config = MixConfig {
            items_per_fetch: 0,
            ..MixConfig::default()
        };

        let error = config.validate().expect_err("must fail");
        assert!(matches!(
            error,
            ConfigurationError::Validation(ValidationError::ZeroItemsPerFetch)
        ));
    }

    #[test]
    fn environment_overrides_apply() {
        let env = HashMap::from([
            (ENV_BIND, String::from(" 0.0.0.0:9000 ")),
            (ENV_QUERY, String::from("sports")),
            (ENV_ABORT_POLICY, String::from("cancel")),
        ]);

        let config = MixConfig::default()
            .apply_env_from(|key| env.get(key).cloned())
            .expect("overrides are valid");

        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.query, "sports");
        assert_eq!(config.abort_policy, AbortPolicy::Cancel);
        assert_eq!(config.engine_config().query, "sports");
    }

    #[test]
    fn invalid_abort_policy_override_fails() {
        let error = MixConfig::default()
            .apply_env_from(|key| (key == ENV_ABORT_POLICY).then(|| String::from("explode")))
            .expect_err("must fail");
        assert!(matches!(
            error,
            ConfigurationError::Validation(ValidationError::InvalidAbortPolicy { .. })
        ));
    }
}
