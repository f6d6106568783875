use crate::config::ContactsConfig;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"[\w.+-]+@[\w.-]+").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderTier {
    Known,
    Unknown,
}

/// Tiers a sender against the static allow-list. Pure function of the
/// list; no lookups, no mutable state.
pub struct SenderClassifier {
    known_emails: HashSet<String>,
    known_domains: HashSet<String>,
    trusted_senders: Vec<String>,
}

impl SenderClassifier {
    pub fn new(contacts: &ContactsConfig) -> Self {
        // Lowercase once on load so per-call matching is a set lookup
        Self {
            known_emails: contacts
                .known_emails
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            known_domains: contacts
                .known_domains
                .iter()
                .map(|d| d.to_lowercase())
                .collect(),
            trusted_senders: contacts
                .trusted_senders
                .iter()
                .map(|d| d.to_lowercase())
                .collect(),
        }
    }

    /// Accepts a bare address or a `Display Name <address>` form.
    pub fn classify(&self, sender: &str) -> SenderTier {
        let email = match EMAIL_RE.find(sender) {
            Some(m) => m.as_str().to_lowercase(),
            None => return SenderTier::Unknown,
        };
        let domain = email.split('@').nth(1).unwrap_or("");

        if self.known_emails.contains(&email) {
            return SenderTier::Known;
        }
        if self.known_domains.contains(domain) {
            return SenderTier::Known;
        }
        for trusted in &self.trusted_senders {
            if domain == trusted || Self::is_subdomain_of(domain, trusted) {
                return SenderTier::Known;
            }
        }
        log::debug!("sender not in allow-list: {email}");
        SenderTier::Unknown
    }

    /// domain1 is a subdomain of domain2 when it ends with ".domain2".
    /// The dot check keeps "notgithub.com" from matching "github.com".
    fn is_subdomain_of(domain1: &str, domain2: &str) -> bool {
        if domain1.len() > domain2.len() && domain1.ends_with(domain2) {
            let prefix_len = domain1.len() - domain2.len();
            domain1.as_bytes()[prefix_len - 1] == b'.'
        } else {
            false
        }
    }
}
