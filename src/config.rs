//! Configuration loading and types for azurefs.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  The `share` section says which Azure File share the
//! adapter talks to and how it authenticates; the `logging` section is
//! consumed by the CLI.
//!
//! Credentials are resolved in this order:
//!   1. `share.connection_string`
//!   2. `share.account_key` (Shared Key auth)
//!   3. `share.sas_token`
//!   4. the `AZURE_STORAGE_*` environment variables (see
//!      [`AzureAuth::from_env`])

use garde::Validate;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::client::azure::AzureAuth;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    /// File share settings.
    #[garde(dive)]
    pub share: ShareConfig,

    /// Logging settings.
    #[serde(default)]
    #[garde(skip)]
    pub logging: LoggingConfig,
}

/// Azure File share settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ShareConfig {
    /// Storage account name.  May instead come from the connection string.
    #[serde(default)]
    #[garde(skip)]
    pub account: Option<String>,

    /// Share name: 3-63 lowercase letters, digits and single hyphens.
    #[garde(length(min = 3, max = 63), pattern(r"^[a-z0-9](?:[a-z0-9]|-[a-z0-9])*$"))]
    pub share_name: String,

    /// Path prefix every adapter path is scoped under.
    #[serde(default)]
    #[garde(skip)]
    pub prefix: String,

    /// Service endpoint override (Azurite, sovereign clouds).
    #[serde(default)]
    #[garde(skip)]
    pub endpoint: Option<String>,

    /// Full storage connection string.
    #[serde(default)]
    #[garde(skip)]
    pub connection_string: Option<String>,

    /// Base64 storage account key.
    #[serde(default)]
    #[garde(skip)]
    pub account_key: Option<String>,

    /// SAS token, with or without the leading `?`.
    #[serde(default)]
    #[garde(skip)]
    pub sas_token: Option<String>,

    /// Refuse to delete directories that still have children.
    #[serde(default)]
    #[garde(skip)]
    pub disable_recursive_delete: bool,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    #[garde(range(min = 1))]
    pub timeout_secs: u64,
}

impl ShareConfig {
    /// Minimal settings for `share_name`; everything else defaulted.
    pub fn new(share_name: &str) -> Self {
        Self {
            account: None,
            share_name: share_name.to_string(),
            prefix: String::new(),
            endpoint: None,
            connection_string: None,
            account_key: None,
            sas_token: None,
            disable_recursive_delete: false,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn parsed_connection_string(&self) -> anyhow::Result<Option<ConnectionString>> {
        match self.connection_string.as_deref() {
            Some(s) if !s.trim().is_empty() => Ok(Some(ConnectionString::parse(s)?)),
            _ => Ok(None),
        }
    }

    /// The storage account name, from `account` or the connection string.
    pub fn resolve_account(&self) -> anyhow::Result<String> {
        if let Some(account) = self.account.as_deref().filter(|a| !a.is_empty()) {
            return Ok(account.to_string());
        }
        if let Some(cs) = self.parsed_connection_string()? {
            if let Some(account) = cs.account_name {
                return Ok(account);
            }
        }
        if let Ok(account) = std::env::var("AZURE_STORAGE_ACCOUNT") {
            return Ok(account);
        }
        Err(anyhow::anyhow!(
            "No storage account configured. Set share.account, an AccountName \
             in share.connection_string, or AZURE_STORAGE_ACCOUNT."
        ))
    }

    /// The endpoint override, from `endpoint` or the connection string.
    /// `None` means the public cloud default for the account.
    pub fn resolve_endpoint(&self) -> anyhow::Result<Option<String>> {
        if let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.is_empty()) {
            return Ok(Some(endpoint.to_string()));
        }
        Ok(self
            .parsed_connection_string()?
            .and_then(|cs| cs.file_endpoint()))
    }

    /// Resolve credentials, falling back to the environment.
    pub fn resolve_auth(&self) -> anyhow::Result<AzureAuth> {
        if let Some(cs) = self.parsed_connection_string()? {
            if let Some(auth) = cs.auth()? {
                return Ok(auth);
            }
        }
        if let Some(key) = self.account_key.as_deref().filter(|k| !k.is_empty()) {
            return AzureAuth::shared_key(key);
        }
        if let Some(token) = self.sas_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(AzureAuth::sas_token(token));
        }
        AzureAuth::from_env()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Connection strings ------------------------------------------------------

/// A parsed storage connection string
/// (`DefaultEndpointsProtocol=https;AccountName=...;AccountKey=...`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pub default_endpoints_protocol: Option<String>,
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub shared_access_signature: Option<String>,
    pub file_endpoint: Option<String>,
    pub endpoint_suffix: Option<String>,
}

impl ConnectionString {
    /// Parse `key=value` pairs separated by `;`.  Values may contain `=`
    /// (base64 keys, SAS tokens); unknown keys are ignored.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let mut cs = ConnectionString::default();
        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Malformed connection string segment: {}", part))?;
            let value = Some(value.to_string());
            match key {
                "DefaultEndpointsProtocol" => cs.default_endpoints_protocol = value,
                "AccountName" => cs.account_name = value,
                "AccountKey" => cs.account_key = value,
                "SharedAccessSignature" => cs.shared_access_signature = value,
                "FileEndpoint" => cs.file_endpoint = value,
                "EndpointSuffix" => cs.endpoint_suffix = value,
                _ => {}
            }
        }
        Ok(cs)
    }

    /// Credentials carried by the connection string, if any.  An account
    /// key wins over a SAS token.
    pub fn auth(&self) -> anyhow::Result<Option<AzureAuth>> {
        if let Some(key) = &self.account_key {
            return AzureAuth::shared_key(key)
                .map(Some)
                .map_err(|e| anyhow::anyhow!("Invalid AccountKey in connection string: {}", e));
        }
        Ok(self.shared_access_signature.as_deref().map(AzureAuth::sas_token))
    }

    /// The file service endpoint: `FileEndpoint` if given, otherwise built
    /// from the protocol, account name and endpoint suffix.
    pub fn file_endpoint(&self) -> Option<String> {
        if let Some(endpoint) = &self.file_endpoint {
            return Some(endpoint.trim_end_matches('/').to_string());
        }
        let account = self.account_name.as_deref()?;
        let protocol = self.default_endpoints_protocol.as_deref().unwrap_or("https");
        let suffix = self.endpoint_suffix.as_deref().unwrap_or("core.windows.net");
        Some(format!("{}://{}.file.{}", protocol, account, suffix))
    }
}

// -- Default value functions -------------------------------------------------

fn default_timeout_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load, parse and validate configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config() {
        let file = write_config("share:\n  share_name: documents\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.share.share_name, "documents");
        assert_eq!(config.share.prefix, "");
        assert!(!config.share.disable_recursive_delete);
        assert_eq!(config.share.timeout(), Duration::from_secs(300));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            "share:\n  account: myaccount\n  share_name: my-share\n  prefix: /tenant/a/\n  \
             account_key: c2VjcmV0\n  disable_recursive_delete: true\n  timeout_secs: 30\n\
             logging:\n  level: debug\n  format: json\n",
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.share.resolve_account().unwrap(), "myaccount");
        assert_eq!(config.share.prefix, "/tenant/a/");
        assert!(config.share.disable_recursive_delete);
        assert_eq!(config.share.timeout_secs, 30);
        assert!(matches!(
            config.share.resolve_auth().unwrap(),
            AzureAuth::SharedKey { .. }
        ));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_invalid_share_name_rejected() {
        for name in ["ab", "Upper", "double--hyphen", "-leading", "trailing-"] {
            let file = write_config(&format!("share:\n  share_name: \"{}\"\n", name));
            assert!(load_config(file.path()).is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn test_missing_share_section_rejected() {
        let file = write_config("logging:\n  level: info\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_parse_connection_string() {
        let cs = ConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5PQ==;EndpointSuffix=core.chinacloudapi.cn",
        )
        .unwrap();
        assert_eq!(cs.account_name.as_deref(), Some("acct"));
        assert_eq!(cs.account_key.as_deref(), Some("a2V5PQ=="));
        assert_eq!(
            cs.file_endpoint().as_deref(),
            Some("https://acct.file.core.chinacloudapi.cn")
        );
        assert!(matches!(cs.auth().unwrap(), Some(AzureAuth::SharedKey { .. })));
    }

    #[test]
    fn test_connection_string_sas_and_endpoint() {
        let cs = ConnectionString::parse(
            "FileEndpoint=http://127.0.0.1:10004/devstoreaccount1/;SharedAccessSignature=sv=2023&sig=abc",
        )
        .unwrap();
        assert_eq!(
            cs.file_endpoint().as_deref(),
            Some("http://127.0.0.1:10004/devstoreaccount1")
        );
        match cs.auth().unwrap() {
            Some(AzureAuth::SasToken { token }) => assert_eq!(token, "sv=2023&sig=abc"),
            other => panic!("unexpected auth: {:?}", other),
        }
    }

    #[test]
    fn test_connection_string_without_credentials() {
        let cs = ConnectionString::parse("AccountName=acct").unwrap();
        assert!(cs.auth().unwrap().is_none());
        assert!(ConnectionString::parse("garbage").is_err());
    }

    #[test]
    fn test_share_config_prefers_explicit_endpoint() {
        let mut share = ShareConfig::new("docs");
        share.connection_string = Some("AccountName=acct;AccountKey=a2V5".to_string());
        assert_eq!(
            share.resolve_endpoint().unwrap().as_deref(),
            Some("https://acct.file.core.windows.net")
        );
        assert_eq!(share.resolve_account().unwrap(), "acct");

        share.endpoint = Some("http://localhost:10004".to_string());
        assert_eq!(
            share.resolve_endpoint().unwrap().as_deref(),
            Some("http://localhost:10004")
        );
    }

    #[test]
    fn test_share_config_sas_token() {
        let mut share = ShareConfig::new("docs");
        share.sas_token = Some("?sv=1&sig=x".to_string());
        match share.resolve_auth().unwrap() {
            AzureAuth::SasToken { token } => assert_eq!(token, "sv=1&sig=x"),
            other => panic!("unexpected auth: {:?}", other),
        }
    }
}
