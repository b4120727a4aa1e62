//! Deployment settings: allowed schemes, default timeouts, endpoint trees.
//!
//! Settings come from a TOML or JSON file, or from `SWITCHYARD_*` environment
//! variables.
//!
//! ```toml
//! allowed_schemes = ["https"]
//! default_connect_timeout_ms = 1000
//! default_read_timeout_ms = 5000
//! user_agent = "billing/1.4"
//!
//! [endpoints]
//! selection = "random"
//! members = [
//!     { address = "https://billing-a.internal" },
//!     { address = "https://billing-b.internal" },
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::{CallConfig, CallConfigBuilder, CallMethod};
use crate::descriptor::{Descriptor, DescriptorSpec, ProtocolSet};
use crate::error::{DispatchError, Result};

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "SWITCHYARD";

/// Dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Schemes descriptors may use.
    pub allowed_schemes: Vec<String>,
    /// Total timeout for targets that set none.
    pub default_total_timeout_ms: Option<u64>,
    /// Connection timeout for targets that set none.
    pub default_connect_timeout_ms: Option<u64>,
    /// Read timeout for targets that set none.
    pub default_read_timeout_ms: Option<u64>,
    /// User agent sent with every attempt.
    pub user_agent: Option<String>,
    /// Stop failover when a non-idempotent request may have been processed.
    pub abort_on_possibly_processed: bool,
    /// Endpoint tree.
    pub endpoints: Option<DescriptorSpec>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            default_total_timeout_ms: None,
            default_connect_timeout_ms: None,
            default_read_timeout_ms: None,
            user_agent: None,
            abort_on_possibly_processed: false,
            endpoints: None,
        }
    }
}

impl DispatchSettings {
    /// Parse TOML settings.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Parse JSON settings.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load settings from a `.toml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| DispatchError::Settings("No file extension found".to_string()))?;

        let content = fs::read_to_string(path)?;
        match ext.as_str() {
            "toml" => Self::from_toml_str(&content),
            "json" => Self::from_json_str(&content),
            other => Err(DispatchError::Settings(format!(
                "Unsupported format: {}",
                other
            ))),
        }
    }

    /// Read settings from `SWITCHYARD_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Read settings from `{prefix}_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |key| env::var(key).ok())
    }

    fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}_{}", prefix, name));
        let mut settings = Self::default();

        if let Some(schemes) = var("ALLOWED_SCHEMES") {
            settings.allowed_schemes = schemes
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        settings.default_total_timeout_ms = parse_ms(prefix, "TOTAL_TIMEOUT_MS", var("TOTAL_TIMEOUT_MS"))?;
        settings.default_connect_timeout_ms =
            parse_ms(prefix, "CONNECT_TIMEOUT_MS", var("CONNECT_TIMEOUT_MS"))?;
        settings.default_read_timeout_ms = parse_ms(prefix, "READ_TIMEOUT_MS", var("READ_TIMEOUT_MS"))?;
        settings.user_agent = var("USER_AGENT");
        if let Some(flag) = var("ABORT_ON_POSSIBLY_PROCESSED") {
            settings.abort_on_possibly_processed = parse_bool(&flag).ok_or_else(|| {
                DispatchError::Settings(format!(
                    "{}_ABORT_ON_POSSIBLY_PROCESSED must be a boolean, got '{}'",
                    prefix, flag
                ))
            })?;
        }

        Ok(settings)
    }

    /// The scheme allow-list.
    pub fn protocols(&self) -> ProtocolSet {
        ProtocolSet::new(&self.allowed_schemes)
    }

    /// A configuration builder seeded with these defaults.
    pub fn call_config(&self, method: CallMethod) -> CallConfigBuilder {
        let mut builder = CallConfig::builder()
            .method(method)
            .abort_on_possibly_processed(self.abort_on_possibly_processed);
        if let Some(ms) = self.default_total_timeout_ms {
            builder = builder.total_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.default_connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.default_read_timeout_ms {
            builder = builder.read_timeout(Duration::from_millis(ms));
        }
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        builder
    }

    /// Build the configured endpoint tree, if any.
    pub fn descriptor(&self) -> Option<Result<Descriptor>> {
        let protocols = self.protocols();
        self.endpoints.as_ref().map(|spec| spec.build(&protocols))
    }
}

fn parse_ms(prefix: &str, name: &str, value: Option<String>) -> Result<Option<u64>> {
    value
        .map(|v| {
            v.trim().parse::<u64>().map_err(|_| {
                DispatchError::Settings(format!(
                    "{}_{} must be a non-negative number of milliseconds, got '{}'",
                    prefix, name, v
                ))
            })
        })
        .transpose()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = DispatchSettings::default();
        assert!(settings.protocols().contains("http"));
        assert!(settings.protocols().contains("https"));
        assert!(!settings.protocols().contains("ftp"));
        assert!(settings.descriptor().is_none());
    }

    #[test]
    fn test_from_toml() {
        let settings = DispatchSettings::from_toml_str(
            r#"
            allowed_schemes = ["https"]
            default_read_timeout_ms = 5000
            user_agent = "billing/1.4"

            [endpoints]
            selection = "random"
            members = [
                { address = "https://billing-a.internal" },
                { address = "https://billing-b.internal", read_timeout_ms = 250 },
            ]
            "#,
        )
        .unwrap();

        let descriptor = settings.descriptor().unwrap().unwrap();
        assert_eq!(descriptor.len(), 2);

        let config = settings.call_config(CallMethod::Get).build().unwrap();
        assert_eq!(config.read_timeout(), Some(Duration::from_millis(5000)));
        assert_eq!(config.user_agent(), Some("billing/1.4"));
    }

    #[test]
    fn test_toml_endpoints_respect_allow_list() {
        let settings = DispatchSettings::from_toml_str(
            r#"
            allowed_schemes = ["https"]

            [endpoints]
            address = "http://plain.internal"
            "#,
        )
        .unwrap();

        assert!(matches!(
            settings.descriptor().unwrap(),
            Err(DispatchError::UnsupportedProtocol { .. })
        ));
    }

    #[test]
    fn test_from_json() {
        let settings = DispatchSettings::from_json_str(
            r#"{ "abort_on_possibly_processed": true, "default_connect_timeout_ms": 100 }"#,
        )
        .unwrap();
        assert!(settings.abort_on_possibly_processed);
        assert_eq!(settings.default_connect_timeout_ms, Some(100));
        assert_eq!(settings.allowed_schemes, vec!["http", "https"]);
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("dispatch.toml");
        fs::write(
            &toml_path,
            "user_agent = \"from-file/1.0\"\n[endpoints]\naddress = \"https://a.internal\"\n",
        )
        .unwrap();
        let settings = DispatchSettings::from_file(&toml_path).unwrap();
        assert_eq!(settings.user_agent.as_deref(), Some("from-file/1.0"));
        assert_eq!(settings.descriptor().unwrap().unwrap().len(), 1);

        let json_path = dir.path().join("dispatch.JSON");
        fs::write(&json_path, r#"{ "default_read_timeout_ms": 900 }"#).unwrap();
        let settings = DispatchSettings::from_file(&json_path).unwrap();
        assert_eq!(settings.default_read_timeout_ms, Some(900));
    }

    #[test]
    fn test_from_file_rejects_unknown_formats() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("dispatch.yaml");
        fs::write(&yaml_path, "user_agent: yaml\n").unwrap();
        match DispatchSettings::from_file(&yaml_path) {
            Err(DispatchError::Settings(message)) => {
                assert_eq!(message, "Unsupported format: yaml")
            }
            other => panic!("expected settings error, got {:?}", other),
        }

        let bare_path = dir.path().join("dispatch");
        fs::write(&bare_path, "user_agent = \"bare\"\n").unwrap();
        assert!(matches!(
            DispatchSettings::from_file(&bare_path),
            Err(DispatchError::Settings(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DispatchSettings::from_file(dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let err = DispatchSettings::from_toml_str("allowed_schemes = ").unwrap_err();
        assert!(matches!(err, DispatchError::Settings(_)));
    }

    #[test]
    fn test_from_lookup() {
        let settings = DispatchSettings::from_lookup(
            "SWITCHYARD",
            lookup(&[
                ("SWITCHYARD_ALLOWED_SCHEMES", "https, grpc"),
                ("SWITCHYARD_READ_TIMEOUT_MS", "750"),
                ("SWITCHYARD_ABORT_ON_POSSIBLY_PROCESSED", "yes"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.allowed_schemes, vec!["https", "grpc"]);
        assert_eq!(settings.default_read_timeout_ms, Some(750));
        assert!(settings.abort_on_possibly_processed);
        assert_eq!(settings.default_total_timeout_ms, None);
    }

    #[test]
    fn test_from_lookup_rejects_negative_timeout() {
        let err = DispatchSettings::from_lookup(
            "SWITCHYARD",
            lookup(&[("SWITCHYARD_TOTAL_TIMEOUT_MS", "-1")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("SWITCHYARD_TOTAL_TIMEOUT_MS"));
    }

    #[test]
    fn test_from_env_without_variables() {
        let settings = DispatchSettings::from_env_with_prefix("SWITCHYARD_TEST_UNSET_91823").unwrap();
        assert_eq!(settings, DispatchSettings::default());
    }
}
