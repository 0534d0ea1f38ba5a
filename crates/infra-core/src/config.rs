use crate::dns::HostedZoneRef;
use crate::error::{InfraError, Result};
use crate::names;
use crate::stack::Environment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Environment variable names
// ---------------------------------------------------------------------------

pub const APP_NAME: &str = "APP_NAME";
pub const AWS_REGION: &str = "AWS_REGION";
pub const AWS_ACCOUNT_ID: &str = "AWS_ACCOUNT_ID";
pub const HOSTED_ZONE_ID: &str = "HOSTED_ZONE_ID";
pub const HOSTED_ZONE_NAME: &str = "HOSTED_ZONE_NAME";
pub const HASURA_HOSTNAME: &str = "HASURA_HOSTNAME";
pub const ACTIONS_HOSTNAME: &str = "ACTIONS_HOSTNAME";

pub const MULTI_AZ: &str = "MULTI_AZ";
pub const STAGE: &str = "STAGE";
pub const ACTIONS_DIR: &str = "ACTIONS_DIR";

/// Required variables in the order they are checked.
pub const REQUIRED_VARS: &[&str] = &[
    APP_NAME,
    AWS_REGION,
    AWS_ACCOUNT_ID,
    HOSTED_ZONE_ID,
    HOSTED_ZONE_NAME,
    HASURA_HOSTNAME,
    ACTIONS_HOSTNAME,
];

const DEFAULT_STAGE: &str = "staging";
const DEFAULT_ACTIONS_DIR: &str = "actions";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// StackConfig
// ---------------------------------------------------------------------------

/// Everything the composition needs, resolved from the environment before a
/// single resource is declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub app_name: String,
    pub region: String,
    pub account: String,
    pub hosted_zone_id: String,
    pub hosted_zone_name: String,
    pub hasura_hostname: String,
    pub actions_hostname: String,
    #[serde(default)]
    pub multi_az: bool,
    #[serde(default = "default_stage")]
    pub stage: String,
    /// Directory holding `dist/` and `dependencies-layer/`, relative to the
    /// project root unless absolute.
    #[serde(default = "default_actions_dir")]
    pub actions_dir: PathBuf,
}

fn default_stage() -> String {
    DEFAULT_STAGE.to_string()
}

fn default_actions_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ACTIONS_DIR)
}

impl StackConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve configuration through `lookup`. Required variables are checked
    /// in [`REQUIRED_VARS`] order and the first absent (or empty) one aborts.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &'static str| -> Option<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(InfraError::MissingEnv { name });

        let app_name = require(APP_NAME)?;
        let region = require(AWS_REGION)?;
        let account = require(AWS_ACCOUNT_ID)?;
        let hosted_zone_id = require(HOSTED_ZONE_ID)?;
        let hosted_zone_name = require(HOSTED_ZONE_NAME)?;
        let hasura_hostname = require(HASURA_HOSTNAME)?;
        let actions_hostname = require(ACTIONS_HOSTNAME)?;

        let multi_az = match get(MULTI_AZ) {
            None => false,
            Some(v) => parse_bool(&v).ok_or_else(|| InfraError::InvalidConfig {
                name: MULTI_AZ,
                reason: format!("expected true/false, got '{v}'"),
            })?,
        };

        Ok(Self {
            app_name,
            region,
            account,
            hosted_zone_id,
            hosted_zone_name,
            hasura_hostname,
            actions_hostname,
            multi_az,
            stage: get(STAGE).unwrap_or_else(default_stage),
            actions_dir: get(ACTIONS_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(default_actions_dir),
        })
    }

    pub fn environment(&self) -> Environment {
        Environment {
            account: self.account.clone(),
            region: self.region.clone(),
        }
    }

    pub fn hosted_zone(&self) -> HostedZoneRef {
        HostedZoneRef::new(&self.hosted_zone_id, &self.hosted_zone_name)
    }

    /// `<app>-<Stage>Stack`, e.g. `acme-StagingStack`.
    pub fn stack_name(&self) -> String {
        let mut chars = self.stage.chars();
        let stage = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("{}-{}Stack", self.app_name, stage)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if names::validate_stack_name(&self.stack_name()).is_err() {
            error(format!(
                "APP_NAME '{}' does not produce a valid stack name '{}'",
                self.app_name,
                self.stack_name()
            ));
        }

        for (var, host) in [
            (HASURA_HOSTNAME, &self.hasura_hostname),
            (ACTIONS_HOSTNAME, &self.actions_hostname),
        ] {
            if let Err(e) = names::validate_domain(host) {
                error(format!("{var}: {e}"));
            } else if !names::is_within_zone(host, &self.hosted_zone_name) {
                error(format!(
                    "{var} '{host}' is not inside hosted zone '{}'",
                    self.hosted_zone_name
                ));
            }
        }

        if self.hasura_hostname.eq_ignore_ascii_case(&self.actions_hostname) {
            error(format!(
                "{HASURA_HOSTNAME} and {ACTIONS_HOSTNAME} must differ (both '{}')",
                self.hasura_hostname
            ));
        }

        if self.account.len() != 12 || !self.account.chars().all(|c| c.is_ascii_digit()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "{AWS_ACCOUNT_ID} '{}' is not a 12-digit account id",
                    self.account
                ),
            });
        }

        if self.multi_az {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "multi-AZ is enabled: the database is replicated and the service runs 2 tasks"
                    .to_string(),
            });
        }

        warnings
    }

    /// Fail when [`validate`](Self::validate) reports any error-level finding.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| format!("  - {}", w.message))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(InfraError::ConfigErrors(errors.join("\n")))
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    pub(crate) fn full_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (APP_NAME, "acme".to_string()),
            (AWS_REGION, "us-east-1".to_string()),
            (AWS_ACCOUNT_ID, "123456789012".to_string()),
            (HOSTED_ZONE_ID, "Z0123456789ABC".to_string()),
            (HOSTED_ZONE_NAME, "acme.dev".to_string()),
            (HASURA_HOSTNAME, "hasura.acme.dev".to_string()),
            (ACTIONS_HOSTNAME, "actions.acme.dev".to_string()),
        ])
    }

    pub(crate) fn config_from(env: &HashMap<&'static str, String>) -> Result<StackConfig> {
        StackConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn resolves_all_required_values() {
        let cfg = config_from(&full_env()).unwrap();
        assert_eq!(cfg.app_name, "acme");
        assert_eq!(cfg.hosted_zone_name, "acme.dev");
        assert!(!cfg.multi_az);
        assert_eq!(cfg.stage, "staging");
        assert_eq!(cfg.actions_dir, PathBuf::from("actions"));
        assert_eq!(cfg.stack_name(), "acme-StagingStack");
    }

    #[test]
    fn each_missing_variable_is_named() {
        for var in REQUIRED_VARS {
            let mut env = full_env();
            env.remove(var);
            let err = config_from(&env).unwrap_err();
            assert!(
                matches!(err, InfraError::MissingEnv { name } if name == *var),
                "expected MissingEnv for {var}, got {err:?}"
            );
            assert_eq!(err.to_string(), format!("{var} must be defined in environment"));
        }
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let mut env = full_env();
        env.insert(HOSTED_ZONE_ID, "  ".to_string());
        let err = config_from(&env).unwrap_err();
        assert!(matches!(err, InfraError::MissingEnv { name } if name == HOSTED_ZONE_ID));
    }

    #[test]
    fn first_missing_variable_wins() {
        let mut env = full_env();
        env.remove(ACTIONS_HOSTNAME);
        env.remove(AWS_REGION);
        let err = config_from(&env).unwrap_err();
        assert!(matches!(err, InfraError::MissingEnv { name } if name == AWS_REGION));
    }

    #[test]
    fn optional_values() {
        let mut env = full_env();
        env.insert(MULTI_AZ, "TRUE".to_string());
        env.insert(STAGE, "production".to_string());
        env.insert(ACTIONS_DIR, "/srv/actions".to_string());
        let cfg = config_from(&env).unwrap();
        assert!(cfg.multi_az);
        assert_eq!(cfg.stack_name(), "acme-ProductionStack");
        assert_eq!(cfg.actions_dir, PathBuf::from("/srv/actions"));
    }

    #[test]
    fn bad_multi_az_is_rejected() {
        let mut env = full_env();
        env.insert(MULTI_AZ, "sometimes".to_string());
        let err = config_from(&env).unwrap_err();
        assert!(matches!(err, InfraError::InvalidConfig { name, .. } if name == MULTI_AZ));
    }

    #[test]
    fn valid_config_has_no_errors() {
        let cfg = config_from(&full_env()).unwrap();
        assert!(cfg.validate().is_empty());
        assert!(cfg.ensure_valid().is_ok());
    }

    #[test]
    fn hostname_outside_zone_is_an_error() {
        let mut env = full_env();
        env.insert(ACTIONS_HOSTNAME, "actions.other.dev".to_string());
        let cfg = config_from(&env).unwrap();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.level == WarnLevel::Error
            && w.message.contains("not inside hosted zone")));
        assert!(matches!(cfg.ensure_valid(), Err(InfraError::ConfigErrors(_))));
    }

    #[test]
    fn invalid_app_name_is_an_error() {
        let mut env = full_env();
        env.insert(APP_NAME, "acme_corp".to_string());
        let cfg = config_from(&env).unwrap();
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("APP_NAME")));
    }

    #[test]
    fn odd_account_id_is_only_a_warning() {
        let mut env = full_env();
        env.insert(AWS_ACCOUNT_ID, "1234".to_string());
        let cfg = config_from(&env).unwrap();
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
        assert!(cfg.ensure_valid().is_ok());
    }

    #[test]
    fn config_json_roundtrip_fills_defaults() {
        let json = serde_json::json!({
            "app_name": "acme",
            "region": "eu-west-1",
            "account": "123456789012",
            "hosted_zone_id": "Z1",
            "hosted_zone_name": "acme.dev",
            "hasura_hostname": "hasura.acme.dev",
            "actions_hostname": "actions.acme.dev",
        });
        let cfg: StackConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.stage, "staging");
        assert!(!cfg.multi_az);
    }
}
