use crate::normalization::{fold_confusables, UnicodeNormalizer};
use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// One entry per signature: compiled pattern plus the flag it reports.
/// New signatures are additive data, not new control flow.
type PatternTable = Vec<(Regex, &'static str)>;

fn entry(pattern: &str, flag: &'static str) -> (Regex, &'static str) {
    (
        Regex::new(pattern).unwrap_or_else(|e| panic!("invalid pattern for {flag}: {e}")),
        flag,
    )
}

lazy_static! {
    static ref INJECTION_PATTERNS: PatternTable = vec![
        // Direct instruction overrides
        entry(
            r"(?i)ignore\s+(?:all\s+)?previous\s+(?:instructions?|context|prompts?)",
            "injection_pattern: 'ignore previous instructions'",
        ),
        entry(r"(?i)ignore\s+above", "injection_pattern: 'ignore above'"),
        entry(
            r"(?i)disregard\s+(?:all\s+)?(?:previous\s+)?(?:instructions?|context|prompts?)",
            "injection_pattern: 'disregard instructions'",
        ),
        entry(
            r"(?i)forget\s+(?:your|all|previous)\s+(?:instructions?|context|rules)",
            "injection_pattern: 'forget instructions'",
        ),
        // Model-control delimiters
        entry(r"(?im)^\s*system\s*:", "injection_pattern: 'system: prefix'"),
        entry(r"(?i)\[SYSTEM\]", "injection_pattern: '[SYSTEM] tag'"),
        entry(r"(?i)<<SYS>>", "injection_pattern: '<<SYS>> tag'"),
        entry(r"(?i)<\|im_start\|>\s*system", "injection_pattern: 'im_start system'"),
        entry(r"(?i)\[INST\]", "injection_pattern: '[INST] tag'"),
        entry(r"(?i)###\s*System", "injection_pattern: '### System heading'"),
        entry(r"(?i)<\|system\|>", "injection_pattern: '<|system|> tag'"),
        entry(r"(?i)<\|user\|>", "injection_pattern: '<|user|> tag'"),
        entry(r"(?i)<\|assistant\|>", "injection_pattern: '<|assistant|> tag'"),
        // Authority claims at line start
        entry(r"(?im)^\s*IMPORTANT\s*:", "injection_pattern: 'IMPORTANT: prefix'"),
        entry(
            r"(?im)^\s*NEW\s+INSTRUCTIONS?\s*:",
            "injection_pattern: 'NEW INSTRUCTIONS: prefix'",
        ),
        entry(r"(?im)^\s*ADMIN\s*:", "injection_pattern: 'ADMIN: prefix'"),
        entry(r"(?im)^\s*OVERRIDE\s*:", "injection_pattern: 'OVERRIDE: prefix'"),
        // Fake thread: a human turn with an assistant turn somewhere after it
        entry(
            r"(?ims)^\s*(?:human|user)\s*:.*?^\s*assistant\s*:",
            "injection_pattern: 'fake conversation turn'",
        ),
        // Broader override variants
        entry(
            r"(?i)ignore\s+(?:the\s+)?(?:original|above|any|all|last|following)\s+\w*\s*instruction",
            "injection_pattern: 'ignore instructions variant'",
        ),
        entry(r"(?i)forget\s+everything", "injection_pattern: 'forget everything'"),
        entry(
            r"(?i)disregard\s+(?:the\s+|my\s+)?(?:last|previous|above)",
            "injection_pattern: 'disregard variant'",
        ),
        // Roleplay / identity override
        entry(
            r"(?i)(?:pretend|act)\s+(?:as|like|you\s*(?:are|'re))",
            "injection_pattern: 'role play attack'",
        ),
        entry(r"(?i)you\s+are\s+now\b", "injection_pattern: 'identity override'"),
        entry(
            r"(?i)from\s+now\s+on\s+you\s+(?:will|shall|must|are)",
            "injection_pattern: 'behavioral override'",
        ),
        entry(r"(?i)\bdo\s+anything\s+now\b", "injection_pattern: 'DAN jailbreak'"),
        // Hypothetical / scenario bypass
        entry(
            r"(?i)imagine\s+(?:you|that|a\s+scenario)",
            "injection_pattern: 'hypothetical bypass'",
        ),
        entry(r"(?i)hypothetical\s+scenario", "injection_pattern: 'hypothetical bypass'"),
        entry(r"(?i)let'?s\s+play\s+a\s+game", "injection_pattern: 'game framing bypass'"),
        // Output manipulation
        entry(
            r"(?i)(?:repeat|say|print|output|write)\s+(?:after\s+me|the\s+following|exactly|only)",
            "injection_pattern: 'output manipulation'",
        ),
        entry(
            r"(?i)your\s+(?:first|next)\s+(?:word|response|output)\s+(?:should|must|will)\s+be",
            "injection_pattern: 'output manipulation'",
        ),
    ];

    // Whitespace-optional variants, run only against collapsed views where
    // "ignorePreviousInstructions" has already lost its separators.
    static ref SPACELESS_PATTERNS: PatternTable = vec![
        entry(
            r"(?i)ignore\s*(?:all\s*)?previous\s*(?:instructions?|context|prompts?)",
            "injection_pattern: 'ignore previous instructions'",
        ),
        entry(
            r"(?i)disregard\s*(?:all\s*)?(?:previous\s*)?(?:instructions?|context|prompts?)",
            "injection_pattern: 'disregard instructions'",
        ),
        entry(
            r"(?i)forget\s*(?:your|all|previous)\s*(?:instructions?|context|rules)",
            "injection_pattern: 'forget instructions'",
        ),
        entry(
            r"(?i)(?:pretend|act)\s*(?:as|like|you\s*(?:are|'re))",
            "injection_pattern: 'role play attack'",
        ),
        entry(r"(?i)you\s*are\s*now", "injection_pattern: 'identity override'"),
        entry(r"(?i)from\s*now\s*on\s*you", "injection_pattern: 'behavioral override'"),
    ];
}

pub struct InjectionDetector;

impl InjectionDetector {
    /// Scan text against the signature tables. All patterns are checked
    /// independently; a message can accumulate any number of flags.
    pub fn scan(text: &str, include_spaceless: bool) -> Vec<String> {
        let mut flags = Vec::new();
        for (pattern, flag) in INJECTION_PATTERNS.iter() {
            if pattern.is_match(text) {
                log::debug!("injection pattern hit: {flag}");
                flags.push(flag.to_string());
            }
        }
        if include_spaceless {
            for (pattern, flag) in SPACELESS_PATTERNS.iter() {
                if pattern.is_match(text) {
                    flags.push(flag.to_string());
                }
            }
        }
        dedup_preserving(flags)
    }

    /// Re-scan subject and body joined with a space, so payloads split
    /// across fields still line up. Returns unprefixed candidate flags; the
    /// caller decides which ones are genuinely cross-field.
    pub fn scan_joined(subject: &str, body: &str) -> Vec<String> {
        let combined = format!("{subject} {body}");
        if combined.trim().is_empty() {
            return Vec::new();
        }
        let mut flags = Self::scan(&combined, false);
        let view = normalize_for_detection(&combined);
        if view != combined {
            flags.extend(Self::scan(&view, true));
        }
        dedup_preserving(flags)
    }
}

pub(crate) fn dedup_preserving(flags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    flags.into_iter().filter(|f| seen.insert(f.clone())).collect()
}

/// Collapse obfuscation so semantically-identical payloads produce the same
/// matchable substring. Used only to feed the pattern matcher, never
/// returned to callers. Built from single linear passes so adversarial
/// inputs (thousands of one-character tokens) stay cheap.
pub fn normalize_for_detection(text: &str) -> String {
    let folded = fold_confusables(text);

    // Pass 1: NFD-decompose, drop combining marks / emoji / invisibles,
    // collapse whitespace runs to a single space.
    let mut collapsed = String::with_capacity(folded.len());
    let mut pending_space = false;
    for ch in folded.nfd() {
        if UnicodeNormalizer::is_combining_mark(ch)
            || UnicodeNormalizer::is_stealth_char(ch)
            || is_emoji_or_symbol(ch)
        {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !collapsed.is_empty() {
            collapsed.push(' ');
        }
        pending_space = false;
        collapsed.push(ch);
    }

    // Pass 2: drop separator runs sandwiched between word characters
    // ("ignore[1]previous" -> "ignoreprevious").
    let chars: Vec<char> = collapsed.chars().collect();
    let mut joined = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if is_obfuscation_separator(chars[i]) {
            let start = i;
            while i < chars.len() && is_obfuscation_separator(chars[i]) {
                i += 1;
            }
            let prev_word = joined
                .chars()
                .last()
                .map(|c| c.is_alphanumeric())
                .unwrap_or(false);
            let next_word = i < chars.len() && chars[i].is_alphanumeric();
            if !(prev_word && next_word) {
                joined.extend(&chars[start..i]);
            }
            continue;
        }
        joined.push(chars[i]);
        i += 1;
    }

    // Pass 3: join runs of 3+ single letters ("i g n o r e" -> "ignore").
    // Two-letter runs stay as-is so "I am a developer" survives.
    if joined.is_empty() {
        return String::new();
    }
    let tokens: Vec<&str> = joined.split(' ').collect();
    let mut out = String::with_capacity(joined.len());
    let mut idx = 0;
    while idx < tokens.len() {
        let mut run_end = idx;
        while run_end < tokens.len() && is_single_letter(tokens[run_end]) {
            run_end += 1;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        if run_end - idx >= 3 {
            for token in &tokens[idx..run_end] {
                out.push_str(token);
            }
            idx = run_end;
        } else {
            out.push_str(tokens[idx]);
            idx += 1;
        }
    }

    out.to_lowercase()
}

/// Keep only ASCII letters, lowercased. The last resort view for payloads
/// separated by arbitrary non-letter junk.
pub fn spaceless_view(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn is_single_letter(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}

fn is_obfuscation_separator(ch: char) -> bool {
    ch.is_ascii_digit() || matches!(ch, '_' | '-' | '.' | '*' | '[' | ']' | '(' | ')' | '{' | '}')
}

fn is_emoji_or_symbol(ch: char) -> bool {
    matches!(ch as u32,
        0x1F600..=0x1F64F |  // Emoticons
        0x1F300..=0x1F5FF |  // Misc symbols and pictographs
        0x1F680..=0x1F6FF |  // Transport and map
        0x1F1E0..=0x1F1FF |  // Flags
        0x1F900..=0x1F9FF |  // Supplemental symbols
        0x1FA00..=0x1FA6F |  // Chess symbols
        0x1FA70..=0x1FAFF |  // Symbols extended-A
        0x2702..=0x27B0 |    // Dingbats
        0x25A0..=0x25FF |    // Geometric shapes
        0x2600..=0x26FF      // Misc symbols
    )
}
