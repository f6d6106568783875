use lazy_static::lazy_static;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    /// Confusable code points mapped to the Latin letter they impersonate.
    /// Folding is independent of NFKC: compatibility normalization leaves
    /// Cyrillic and Greek look-alikes untouched.
    static ref CONFUSABLES: HashMap<char, char> = {
        let mut map = HashMap::new();

        // Cyrillic lowercase
        map.insert('\u{0430}', 'a'); // а
        map.insert('\u{0435}', 'e'); // е
        map.insert('\u{043a}', 'k'); // к
        map.insert('\u{043c}', 'm'); // м
        map.insert('\u{043e}', 'o'); // о
        map.insert('\u{0440}', 'p'); // р
        map.insert('\u{0441}', 'c'); // с
        map.insert('\u{0442}', 't'); // т
        map.insert('\u{0443}', 'y'); // у
        map.insert('\u{0445}', 'x'); // х
        map.insert('\u{0455}', 's'); // ѕ
        map.insert('\u{0456}', 'i'); // і
        map.insert('\u{0458}', 'j'); // ј
        map.insert('\u{0501}', 'd'); // ԁ
        map.insert('\u{04bb}', 'h'); // һ

        // Cyrillic uppercase
        map.insert('\u{0410}', 'A'); // А
        map.insert('\u{0412}', 'B'); // В
        map.insert('\u{0415}', 'E'); // Е
        map.insert('\u{041a}', 'K'); // К
        map.insert('\u{041c}', 'M'); // М
        map.insert('\u{041d}', 'H'); // Н
        map.insert('\u{041e}', 'O'); // О
        map.insert('\u{0420}', 'P'); // Р
        map.insert('\u{0421}', 'C'); // С
        map.insert('\u{0422}', 'T'); // Т
        map.insert('\u{0425}', 'X'); // Х

        // Greek
        map.insert('\u{03b1}', 'a'); // α
        map.insert('\u{03b5}', 'e'); // ε
        map.insert('\u{03b9}', 'i'); // ι
        map.insert('\u{03ba}', 'k'); // κ
        map.insert('\u{03bd}', 'v'); // ν
        map.insert('\u{03bf}', 'o'); // ο
        map.insert('\u{03c1}', 'p'); // ρ
        map.insert('\u{03c4}', 't'); // τ

        // IPA / Latin extended
        map.insert('\u{0261}', 'g'); // ɡ
        map.insert('\u{026a}', 'i'); // ɪ

        map
    };
}

/// Replace known homoglyphs with their Latin equivalents.
pub fn fold_confusables(text: &str) -> String {
    text.chars()
        .map(|ch| CONFUSABLES.get(&ch).copied().unwrap_or(ch))
        .collect()
}

pub struct UnicodeNormalizer;

impl UnicodeNormalizer {
    /// Compatibility-normalize (NFKC), then fold confusable characters.
    pub fn normalize_unicode(text: &str) -> String {
        let nfkc: String = text.nfkc().collect();
        fold_confusables(&nfkc)
    }

    /// Strip invisible and structural Unicode: zero-width characters, bidi
    /// controls, variation selectors, tag characters, and combining marks
    /// (Zalgo decoration). Decomposes to NFD first so precomposed characters
    /// split into base + mark and the base survives.
    pub fn remove_invisible_unicode(text: &str) -> String {
        text.nfd()
            .filter(|&ch| !Self::is_stealth_char(ch) && !Self::is_combining_mark(ch))
            .collect()
    }

    /// Scan raw text for Unicode tricks worth reporting. Runs on the field
    /// as received, before any stripping destroys the evidence.
    pub fn scan_anomalies(text: &str) -> Vec<String> {
        let mut flags = Vec::new();
        let invisible_count = text
            .chars()
            .filter(|&ch| Self::is_invisible(ch) || Self::is_bidi_control(ch))
            .count();
        if invisible_count > 5 {
            flags.push("unicode_anomaly: invisible characters".to_string());
        }
        if text.chars().any(Self::is_variation_selector) {
            flags.push("unicode_anomaly: variation selectors".to_string());
        }
        if text.chars().any(Self::is_tag_char) {
            flags.push("unicode_anomaly: tag characters".to_string());
        }
        flags
    }

    /// Anything that hides or restructures text without visible ink.
    pub(crate) fn is_stealth_char(ch: char) -> bool {
        Self::is_invisible(ch)
            || Self::is_bidi_control(ch)
            || Self::is_variation_selector(ch)
            || Self::is_tag_char(ch)
    }

    fn is_invisible(ch: char) -> bool {
        matches!(ch,
            '\u{200B}'..='\u{200D}' |  // ZWS, ZWNJ, ZWJ
            '\u{FEFF}' |               // BOM
            '\u{200E}' | '\u{200F}' |  // LRM, RLM
            '\u{00AD}' |               // Soft hyphen
            '\u{180E}' |               // Mongolian vowel separator
            '\u{2060}'..='\u{2064}'    // Word joiner, invisible operators
        )
    }

    fn is_bidi_control(ch: char) -> bool {
        matches!(ch,
            '\u{202A}'..='\u{202E}' |  // LRE, RLE, PDF, LRO, RLO
            '\u{2066}'..='\u{2069}'    // LRI, RLI, FSI, PDI
        )
    }

    fn is_variation_selector(ch: char) -> bool {
        matches!(ch,
            '\u{FE00}'..='\u{FE0F}' |
            '\u{E0100}'..='\u{E01EF}'  // Supplementary plane selectors
        )
    }

    fn is_tag_char(ch: char) -> bool {
        // Tag characters can smuggle an invisible ASCII payload
        matches!(ch, '\u{E0001}'..='\u{E007F}')
    }

    pub(crate) fn is_combining_mark(ch: char) -> bool {
        matches!(ch as u32,
            0x0300..=0x036F |  // Combining diacritical marks
            0x0483..=0x0489 |  // Cyrillic combining
            0x0591..=0x05BD |  // Hebrew points
            0x1AB0..=0x1AFF |  // Combining diacritical marks extended
            0x1DC0..=0x1DFF |  // Combining diacritical marks supplement
            0x20D0..=0x20FF |  // Combining marks for symbols
            0xFE20..=0xFE2F    // Combining half marks
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_cyrillic_confusables() {
        // а е о р с
        assert_eq!(fold_confusables("\u{0430}\u{0435}\u{043e}\u{0440}\u{0441}"), "aeopc");
    }

    #[test]
    fn test_fold_greek_nu() {
        assert_eq!(fold_confusables("\u{03bd}"), "v");
    }

    #[test]
    fn test_fold_leaves_latin_untouched() {
        assert_eq!(fold_confusables("ignore previous"), "ignore previous");
    }

    #[test]
    fn test_nfkc_fullwidth() {
        // Fullwidth letters compatibility-normalize to ASCII
        assert_eq!(UnicodeNormalizer::normalize_unicode("ｉｇｎｏｒｅ"), "ignore");
    }

    #[test]
    fn test_normalize_homoglyph_phrase() {
        // іgnоrе with Cyrillic і, о, е
        let text = "\u{0456}gn\u{043e}r\u{0435} previous";
        assert_eq!(UnicodeNormalizer::normalize_unicode(text), "ignore previous");
    }

    #[test]
    fn test_remove_zero_width() {
        let text = "Hel\u{200B}lo\u{FEFF} wor\u{200D}ld";
        assert_eq!(UnicodeNormalizer::remove_invisible_unicode(text), "Hello world");
    }

    #[test]
    fn test_remove_bidi_controls() {
        let text = "abc\u{202E}def\u{2066}ghi";
        assert_eq!(UnicodeNormalizer::remove_invisible_unicode(text), "abcdefghi");
    }

    #[test]
    fn test_remove_variation_selectors() {
        let text = "test\u{FE00}\u{FE01} text";
        assert_eq!(UnicodeNormalizer::remove_invisible_unicode(text), "test text");
    }

    #[test]
    fn test_zalgo_keeps_base_characters() {
        let zalgo = "i\u{0325}g\u{0323}n\u{032D}o\u{0326}r\u{032C}e";
        assert_eq!(UnicodeNormalizer::remove_invisible_unicode(zalgo), "ignore");
    }

    #[test]
    fn test_precomposed_accents_lose_marks_not_base() {
        // é decomposes to e + U+0301 under NFD; the base must survive
        assert_eq!(UnicodeNormalizer::remove_invisible_unicode("café"), "cafe");
    }

    #[test]
    fn test_anomaly_invisible_threshold() {
        let light = "ab\u{200B}cd";
        assert!(UnicodeNormalizer::scan_anomalies(light).is_empty());

        let heavy = "ab\u{200B}\u{200B}\u{200B}\u{200B}\u{200B}\u{200B}cd";
        let flags = UnicodeNormalizer::scan_anomalies(heavy);
        assert!(flags.iter().any(|f| f.contains("invisible characters")));
    }

    #[test]
    fn test_anomaly_bidi_counts_toward_invisible() {
        let text = "x\u{202E}\u{202E}\u{202E}\u{202E}\u{202E}\u{202E}y";
        let flags = UnicodeNormalizer::scan_anomalies(text);
        assert!(flags.iter().any(|f| f.contains("invisible characters")));
    }

    #[test]
    fn test_anomaly_variation_selectors() {
        let flags = UnicodeNormalizer::scan_anomalies("a\u{FE0F}b");
        assert!(flags.iter().any(|f| f.contains("variation selectors")));
    }

    #[test]
    fn test_anomaly_tag_characters() {
        let flags = UnicodeNormalizer::scan_anomalies("hi\u{E0041}\u{E0042}");
        assert!(flags.iter().any(|f| f.contains("tag characters")));
    }

    #[test]
    fn test_clean_text_no_anomalies() {
        assert!(UnicodeNormalizer::scan_anomalies("The Q1 report is ready.").is_empty());
    }
}
