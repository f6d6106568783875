use crate::config::Config;
use crate::decoder::EntityDecoder;
use crate::detection::{
    dedup_preserving, normalize_for_detection, spaceless_view, InjectionDetector,
};
use crate::normalization::UnicodeNormalizer;
use crate::sender::{SenderClassifier, SenderTier};
use crate::stripper::StructuralStripper;
use serde::{Deserialize, Serialize};

/// An untrusted inbound message as handed over by the mail-retrieval layer.
#[derive(Debug, Default, Clone)]
pub struct InboundMessage {
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLevel {
    Full,
    Minimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizationResult {
    pub sender_tier: SenderTier,
    pub subject: String,
    pub date: String,
    pub body_clean: String,
    pub flags: Vec<String>,
    pub suspicious: bool,
    pub truncated: bool,
    pub body_length_original: usize,
    pub summary_level: SummaryLevel,
}

struct FieldOutcome {
    clean: String,
    flags: Vec<String>,
}

/// Runs the full per-field pipeline (decode, Unicode normalize, structural
/// strip, detect) and assembles the result record. Holds only immutable,
/// precompiled state; every call is a pure function of its input.
pub struct SanitizerEngine {
    config: Config,
    decoder: EntityDecoder,
    stripper: StructuralStripper,
    classifier: SenderClassifier,
}

impl SanitizerEngine {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let decoder = EntityDecoder::new(config.limits.max_decode_passes);
        let stripper = StructuralStripper::new(&config.limits)?;
        let classifier = SenderClassifier::new(&config.contacts);
        Ok(Self {
            config,
            decoder,
            stripper,
            classifier,
        })
    }

    pub fn sanitize_email(&self, message: &InboundMessage) -> SanitizationResult {
        let sender_tier = self.classifier.classify(&message.sender);
        let subject = self.sanitize_field(&message.subject);
        let body = self.sanitize_field(&message.body);
        let date = message
            .date
            .as_deref()
            .map(|d| self.clean_field(d))
            .unwrap_or_default();

        let mut flags: Vec<String> = Vec::new();
        flags.extend(subject.flags.iter().cloned());
        flags.extend(body.flags.iter().cloned());

        // A payload split across subject and body matches only when the two
        // fields are scanned joined. Candidates already caught inside a
        // single field are not cross-field hits.
        for candidate in InjectionDetector::scan_joined(&subject.clean, &body.clean) {
            if !flags.contains(&candidate) {
                flags.push(format!("cross_field_{candidate}"));
            }
        }

        let flags = dedup_preserving(flags);
        let suspicious = !flags.is_empty();

        let body_length_original = message.body.chars().count();
        let max_len = self.config.limits.max_body_length;
        let truncated = body_length_original > max_len;
        let mut body_clean = truncate(&body.clean, max_len);

        let summary_level = match sender_tier {
            SenderTier::Known => SummaryLevel::Full,
            SenderTier::Unknown => {
                // Unknown senders get a fixed triage summary; the cleaned
                // body is discarded entirely
                body_clean = format!(
                    "From: {}\nRe: {}\nAction: flag for manual review",
                    single_line(&message.sender),
                    single_line(&subject.clean)
                );
                SummaryLevel::Minimal
            }
        };

        log::debug!(
            "sanitized message from {:?} tier: {} flags, suspicious={}",
            sender_tier,
            flags.len(),
            suspicious
        );

        SanitizationResult {
            sender_tier,
            subject: subject.clean,
            date,
            body_clean,
            flags,
            suspicious,
            truncated,
            body_length_original,
            summary_level,
        }
    }

    fn sanitize_field(&self, text: &str) -> FieldOutcome {
        if text.is_empty() {
            return FieldOutcome {
                clean: String::new(),
                flags: Vec::new(),
            };
        }
        let mut flags: Vec<String> = Vec::new();

        // Scan the raw field first: tag stripping destroys evidence like
        // <|im_start|> markers or payloads hidden in comments
        flags.extend(InjectionDetector::scan(text, false));
        let raw_view = normalize_for_detection(text);
        if raw_view != text {
            flags.extend(InjectionDetector::scan(&raw_view, true));
        }
        flags.extend(UnicodeNormalizer::scan_anomalies(text));

        // Decode entities, unmask Unicode tricks, then strip structure, so
        // encoded or disguised constructs are visible to every later stage
        let decoded = self.decoder.strip_html(text);
        let unhidden = UnicodeNormalizer::remove_invisible_unicode(&decoded);
        let normalized = UnicodeNormalizer::normalize_unicode(&unhidden);
        let stripped = self.stripper.apply(&normalized);
        flags.extend(stripped.flags.iter().cloned());

        // Post-strip scans over the cleaned text and its collapsed views
        flags.extend(InjectionDetector::scan(&stripped.text, false));
        let view = normalize_for_detection(&stripped.text);
        if view != stripped.text {
            flags.extend(InjectionDetector::scan(&view, true));
        }
        flags.extend(InjectionDetector::scan(&spaceless_view(&stripped.text), true));

        // Payloads recovered from stripped base64 runs are scanned but
        // never reach the cleaned output
        for blob in &stripped.revealed {
            flags.extend(InjectionDetector::scan(blob, false));
            flags.extend(InjectionDetector::scan(&normalize_for_detection(blob), true));
        }

        FieldOutcome {
            clean: stripped.text,
            flags: dedup_preserving(flags),
        }
    }

    /// Cleaning without detection, for fields that never drive flags.
    fn clean_field(&self, text: &str) -> String {
        let decoded = self.decoder.strip_html(text);
        let unhidden = UnicodeNormalizer::remove_invisible_unicode(&decoded);
        let normalized = UnicodeNormalizer::normalize_unicode(&unhidden);
        self.stripper.apply(&normalized).text
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        let mut cut: String = text.chars().take(max_len).collect();
        cut.push_str("...");
        cut
    } else {
        text.to_string()
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
