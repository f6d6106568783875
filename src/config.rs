use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub contacts: ContactsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum cleaned body length before truncation, in characters.
    pub max_body_length: usize,
    /// Hard cap on entity re-decoding passes.
    pub max_decode_passes: usize,
    /// Minimum run length before an alphanumeric blob is treated as base64.
    pub base64_min_length: usize,
    /// Minimum number of hex byte pairs before a run is treated as a hex payload.
    pub hex_min_pairs: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_length: 2000,
            max_decode_passes: 5,
            base64_min_length: 40,
            hex_min_pairs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactsConfig {
    /// Exact addresses that are always known.
    #[serde(default)]
    pub known_emails: Vec<String>,
    /// Domains whose addresses are known (exact domain match only).
    #[serde(default)]
    pub known_domains: Vec<String>,
    /// Domains trusted including all of their subdomains.
    #[serde(default)]
    pub trusted_senders: Vec<String>,
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            known_emails: vec![
                "alice@acmecorp.com".to_string(),
                "bob@acmecorp.com".to_string(),
            ],
            known_domains: vec!["acmecorp.com".to_string(), "partnerfirm.com".to_string()],
            trusted_senders: vec!["github.com".to_string(), "google.com".to_string()],
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!(
            "Loaded config from {} ({} known emails, {} known domains, {} trusted senders)",
            path.display(),
            config.contacts.known_emails.len(),
            config.contacts.known_domains.len(),
            config.contacts.trusted_senders.len()
        );
        Ok(config)
    }
}

impl ContactsConfig {
    /// Load the allow-list from a standalone JSON contacts file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read contacts file: {}", path.display()))?;
        let contacts: ContactsConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse contacts file: {}", path.display()))?;
        Ok(contacts)
    }
}
