use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HTML_COMMENT_RE: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    static ref HTML_TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
    // Decimal, hex, and named entities in one alternation. Bounded repetitions
    // keep the scan linear on adversarial input.
    static ref ENTITY_RE: Regex =
        Regex::new(r"&(?:#(\d{1,7})|#[xX]([0-9A-Fa-f]{1,6})|([a-zA-Z][a-zA-Z0-9]{1,31}));").unwrap();
}

/// Decodes HTML-entity-encoded text under a hard pass cap and removes
/// markup. Nested encodings like `&#38;#105;` need one pass per layer, so
/// the loop runs to a fixed point but never beyond `max_passes`.
pub struct EntityDecoder {
    max_passes: usize,
}

impl EntityDecoder {
    pub fn new(max_passes: usize) -> Self {
        Self { max_passes }
    }

    /// Remove comments and tags, then repeatedly decode entities until the
    /// text stops changing or the pass cap is reached. Malformed entities are
    /// left literal; this function never fails.
    pub fn strip_html(&self, text: &str) -> String {
        let mut current = HTML_COMMENT_RE.replace_all(text, "").into_owned();
        current = HTML_TAG_RE.replace_all(&current, "").into_owned();

        for pass in 0..self.max_passes {
            let decoded = Self::decode_entities_once(&current);
            if decoded == current {
                break;
            }
            log::debug!("entity decode pass {} changed text", pass + 1);
            current = decoded;
        }
        current
    }

    fn decode_entities_once(text: &str) -> String {
        ENTITY_RE
            .replace_all(text, |caps: &regex::Captures| {
                if let Some(decimal) = caps.get(1) {
                    if let Ok(code) = decimal.as_str().parse::<u32>() {
                        if let Some(ch) = char::from_u32(code) {
                            return ch.to_string();
                        }
                    }
                } else if let Some(hex) = caps.get(2) {
                    if let Ok(code) = u32::from_str_radix(hex.as_str(), 16) {
                        if let Some(ch) = char::from_u32(code) {
                            return ch.to_string();
                        }
                    }
                } else if let Some(named) = caps.get(3) {
                    return match named.as_str() {
                        "amp" => "&".to_string(),
                        "lt" => "<".to_string(),
                        "gt" => ">".to_string(),
                        "quot" => "\"".to_string(),
                        "apos" => "'".to_string(),
                        "nbsp" => "\u{00A0}".to_string(),
                        _ => caps.get(0).map(|m| m.as_str()).unwrap_or("").to_string(),
                    };
                }
                caps.get(0).map(|m| m.as_str()).unwrap_or("").to_string()
            })
            .into_owned()
    }
}

impl Default for EntityDecoder {
    fn default() -> Self {
        Self::new(5)
    }
}
