//! Splits review and description text into sentences for embedding.
//! Normalizes the text first, then splits on newlines, then on sentence-terminal marks.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::config::DEFAULT_TERMINALS;

/// Japanese script plus the ideographic punctuation block. Spaces next to these
/// are dropped; spaces between two latin words are kept.
const CJK: &str = r"[\p{Han}\p{Hiragana}\p{Katakana}ー\x{3001}-\x{303F}]";

fn pattern(re: &str) -> Regex {
    Regex::new(re).unwrap_or_else(|e| unreachable!("built-in pattern {re:?}: {e}"))
}

static URL: LazyLock<Regex> = LazyLock::new(|| pattern(r"https?://[^\s]+"));
static HYPHENS: LazyLock<Regex> = LazyLock::new(|| pattern(r"[˗֊‐‑‒–⁃⁻₋−]+"));
static LONG_VOWELS: LazyLock<Regex> = LazyLock::new(|| pattern(r"[—―─━ー]+"));
/// Tildes, wave dashes and decorative symbols (stars, notes, emoji).
static SYMBOLS: LazyLock<Regex> = LazyLock::new(|| pattern(r"[~∼∾〜〰\p{So}]+"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| pattern(r"[^\S\n]+"));
static SPACE_AFTER_CJK: LazyLock<Regex> = LazyLock::new(|| pattern(&format!("({CJK}) ")));
static SPACE_BEFORE_CJK: LazyLock<Regex> = LazyLock::new(|| pattern(&format!(" ({CJK})")));

/// Sentence segmenter with a fixed set of terminal marks.
#[derive(Debug, Clone)]
pub struct Segmenter {
    terminals: Vec<char>,
}

impl Segmenter {
    /// Terminals are normalized like the text, so `！` and `!` split alike.
    pub fn new(terminals: &str) -> Self {
        let mut chars: Vec<char> = normalize(terminals).chars().collect();
        chars.sort_unstable();
        chars.dedup();
        Self { terminals: chars }
    }

    /// Normalizes `text` once; the sentences are produced lazily by [`Segments::iter`].
    pub fn segment(&self, text: &str) -> Segments<'_> {
        Segments {
            normalized: normalize(text),
            terminals: &self.terminals,
        }
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINALS)
    }
}

/// NFKC width folding, then noise removal: URLs go, hyphen and long-vowel
/// variants are unified, tildes and symbols are dropped, and whitespace is
/// collapsed and removed wherever it touches Japanese text. Newlines survive.
fn normalize(text: &str) -> String {
    let s: String = text.nfkc().collect();
    let s = URL.replace_all(&s, "");
    let s = HYPHENS.replace_all(&s, "-");
    let s = LONG_VOWELS.replace_all(&s, "ー");
    let s = SYMBOLS.replace_all(&s, "");
    let s = SPACES.replace_all(&s, " ");
    let s = SPACE_AFTER_CJK.replace_all(&s, "$1");
    SPACE_BEFORE_CJK.replace_all(&s, "$1").into_owned()
}

/// Sentences of one text. Iterate as many times as needed.
#[derive(Debug, Clone)]
pub struct Segments<'s> {
    normalized: String,
    terminals: &'s [char],
}

impl<'s> Segments<'s> {
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        let terminals = self.terminals;
        self.normalized
            .split('\n')
            .flat_map(move |line| line.split(move |c: char| terminals.contains(&c)))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }
}

impl<'a, 's> IntoIterator for &'a Segments<'s> {
    type Item = &'a str;
    type IntoIter = Box<dyn Iterator<Item = &'a str> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminals() {
        let s = Segmenter::new("。！？");
        assert_eq!(s.segment("A。B！C？").to_vec(), vec!["A", "B", "C"]);
    }

    #[test]
    fn splits_on_newlines_and_drops_empty() {
        let s = Segmenter::default();
        let got = s.segment("一行目\n\n二行目。三行目\n").to_vec();
        assert_eq!(got, vec!["一行目", "二行目", "三行目"]);
    }

    #[test]
    fn normalizes_width_variants() {
        let s = Segmenter::default();
        assert_eq!(s.segment("ＡＢＣ１２３。ｺﾒ").to_vec(), vec!["ABC123", "コメ"]);
    }

    #[test]
    fn half_width_terminals_split_too() {
        let s = Segmenter::default();
        assert_eq!(s.segment("うまい!安い?").to_vec(), vec!["うまい", "安い"]);
    }

    #[test]
    fn strips_urls_and_the_gap_they_leave() {
        let s = Segmenter::default();
        let got = s.segment("詳細は http://example.jp/rice を参照。以上").to_vec();
        assert_eq!(got, vec!["詳細はを参照", "以上"]);
    }

    #[test]
    fn strips_tildes_and_decorative_symbols() {
        let s = Segmenter::default();
        let got = s.segment("詳細は http://example.jp/rice を参照。★★★おいしい〜！").to_vec();
        assert_eq!(got, vec!["詳細はを参照", "おいしい"]);
        assert_eq!(s.segment("♪甘い～♪").to_vec(), vec!["甘い"]);
    }

    #[test]
    fn spaces_survive_only_between_latin_words() {
        let s = Segmenter::default();
        let got = s.segment("Koshihikari   rice と ゆめ ぴりか　です").to_vec();
        assert_eq!(got, vec!["Koshihikari riceとゆめぴりかです"]);
    }

    #[test]
    fn unifies_hyphens_and_long_vowels() {
        let s = Segmenter::default();
        assert_eq!(s.segment("ラ—メン、コーーヒー").to_vec(), vec!["ラーメン、コーヒー"]);
        assert_eq!(s.segment("A‐B−C").to_vec(), vec!["A-B-C"]);
    }

    #[test]
    fn restartable() {
        let s = Segmenter::default();
        let segments = s.segment("一。二。三");
        let first: Vec<&str> = segments.iter().collect();
        let second: Vec<&str> = (&segments).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn blank_text_has_no_sentences() {
        let s = Segmenter::default();
        assert!(s.segment(" \n。\n ").is_empty());
        assert!(s.segment("").is_empty());
    }
}
