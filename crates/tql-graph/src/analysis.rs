//! Vocabulary text analysis
//!
//! Turns property text into search tokens. Each indexed field is analyzed by
//! the producer registered for its name; unknown fields fall back to keyword
//! analysis, which keeps the whole value as one token.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Produces the tokens for one field value
pub trait TokenStreamProducer: Send + Sync {
    fn tokens(&self, text: &str) -> Vec<String>;

    /// Analyzer name for logging
    fn name(&self) -> &'static str;
}

/// Whole value as a single token
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnalyzer;

impl TokenStreamProducer for KeywordAnalyzer {
    fn tokens(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        }
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Word-level analysis for labels and free text
///
/// Whitespace split, edge punctuation stripped, possessive `'s` collapsed,
/// stop words removed (case-sensitively, before lowercasing), lowercased and
/// folded to ASCII.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermAnalyzer;

const EDGE_PUNCTUATION: &[char] = &['.', '!', '?', ',', ':', ';', '"', '\'', '(', ')'];

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
        "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
        "these", "they", "this", "to", "was", "will", "with",
    ]
    .into_iter()
    .collect()
});

impl TokenStreamProducer for TermAnalyzer {
    fn tokens(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|word| word.trim_matches(EDGE_PUNCTUATION).replace("'s", "s"))
            .filter(|word| !word.is_empty() && !STOP_WORDS.contains(word.as_str()))
            .map(|word| fold_to_ascii(&word.to_lowercase()))
            .collect()
    }

    fn name(&self) -> &'static str {
        "term"
    }
}

/// Replace accented Latin characters with their ASCII base
///
/// Covers Latin-1 Supplement, Latin Extended-A and the Romanian comma-below
/// letters. Characters of other scripts pass through unchanged.
pub fn fold_to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => out.push('a'),
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => out.push('A'),
            'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => out.push('c'),
            'Ç' | 'Ć' | 'Ĉ' | 'Ċ' | 'Č' => out.push('C'),
            'ď' | 'đ' | 'ð' => out.push('d'),
            'Ď' | 'Đ' | 'Ð' => out.push('D'),
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => out.push('e'),
            'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' => out.push('E'),
            'ĝ' | 'ğ' | 'ġ' | 'ģ' => out.push('g'),
            'Ĝ' | 'Ğ' | 'Ġ' | 'Ģ' => out.push('G'),
            'ĥ' | 'ħ' => out.push('h'),
            'Ĥ' | 'Ħ' => out.push('H'),
            'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => out.push('i'),
            'Ì' | 'Í' | 'Î' | 'Ï' | 'Ĩ' | 'Ī' | 'Ĭ' | 'Į' | 'İ' => out.push('I'),
            'ĵ' => out.push('j'),
            'Ĵ' => out.push('J'),
            'ķ' | 'ĸ' => out.push('k'),
            'Ķ' => out.push('K'),
            'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => out.push('l'),
            'Ĺ' | 'Ļ' | 'Ľ' | 'Ŀ' | 'Ł' => out.push('L'),
            'ñ' | 'ń' | 'ņ' | 'ň' | 'ŉ' | 'ŋ' => out.push('n'),
            'Ñ' | 'Ń' | 'Ņ' | 'Ň' | 'Ŋ' => out.push('N'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => out.push('o'),
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ŏ' | 'Ő' => out.push('O'),
            'ŕ' | 'ŗ' | 'ř' => out.push('r'),
            'Ŕ' | 'Ŗ' | 'Ř' => out.push('R'),
            'ś' | 'ŝ' | 'ş' | 'š' | 'ș' | 'ſ' => out.push('s'),
            'Ś' | 'Ŝ' | 'Ş' | 'Š' | 'Ș' => out.push('S'),
            'ţ' | 'ť' | 'ŧ' | 'ț' => out.push('t'),
            'Ţ' | 'Ť' | 'Ŧ' | 'Ț' => out.push('T'),
            'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => out.push('u'),
            'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ũ' | 'Ū' | 'Ŭ' | 'Ů' | 'Ű' | 'Ų' => out.push('U'),
            'ŵ' => out.push('w'),
            'Ŵ' => out.push('W'),
            'ý' | 'ÿ' | 'ŷ' => out.push('y'),
            'Ý' | 'Ÿ' | 'Ŷ' => out.push('Y'),
            'ź' | 'ż' | 'ž' => out.push('z'),
            'Ź' | 'Ż' | 'Ž' => out.push('Z'),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("OE"),
            'ĳ' => out.push_str("ij"),
            'Ĳ' => out.push_str("IJ"),
            'þ' => out.push_str("th"),
            'Þ' => out.push_str("TH"),
            'ß' => out.push_str("ss"),
            _ => out.push(c),
        }
    }
    out
}

static KEYWORD: KeywordAnalyzer = KeywordAnalyzer;
static TERM: TermAnalyzer = TermAnalyzer;

static FIELD_ANALYZERS: Lazy<HashMap<&'static str, &'static dyn TokenStreamProducer>> =
    Lazy::new(|| {
        let mut fields: HashMap<&'static str, &'static dyn TokenStreamProducer> = HashMap::new();
        fields.insert("label", &TERM);
        fields.insert("synonym", &TERM);
        fields.insert("definition", &TERM);
        fields
    });

/// Analyzer registered for `field`, keyword analysis otherwise
pub fn analyzer_for(field: &str) -> &'static dyn TokenStreamProducer {
    FIELD_ANALYZERS.get(field).copied().unwrap_or(&KEYWORD)
}
