pub mod config;
pub mod decoder;
pub mod detection;
pub mod normalization;
pub mod sanitizer;
pub mod sender;
pub mod stripper;

// Re-export the public surface so callers can work from the crate root
pub use config::{Config, ContactsConfig, LimitsConfig};
pub use sanitizer::{InboundMessage, SanitizationResult, SanitizerEngine, SummaryLevel};
pub use sender::{SenderClassifier, SenderTier};
