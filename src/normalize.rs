//! Text normalization: markup stripping, tokenization, stopword removal,
//! verb lemmatization and stemming.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

use crate::error::{Result, TopicError};
use crate::lemma::lemmatize_verb;

/// Bounds applied by the simple preprocessing step, before stopword filtering
const MIN_RAW_TOKEN_LEN: usize = 2;
const MAX_RAW_TOKEN_LEN: usize = 15;

/// Lemmatize/stem rounds before the root is taken as final
const MAX_ROOT_ROUNDS: usize = 8;

pub struct Normalizer {
    stop_words: HashSet<String>,
    min_token_length: usize,
    stemmer: Stemmer,
    script_re: Regex,
    tag_re: Regex,
    entity_re: Regex,
    non_alpha_re: Regex,
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("min_token_length", &self.min_token_length)
            .field("stop_words", &self.stop_words.len())
            .finish()
    }
}

impl Normalizer {
    pub fn new(min_token_length: usize) -> Result<Self> {
        Ok(Normalizer {
            stop_words: default_stop_words(),
            min_token_length,
            stemmer: Stemmer::create(Algorithm::English),
            script_re: Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)\s*>")?,
            tag_re: Regex::new(r"(?s)<[^>]*>")?,
            entity_re: Regex::new(r"&(#[0-9]+|#x[0-9a-fA-F]+|[a-zA-Z]+);")?,
            non_alpha_re: Regex::new(r"[^a-zA-Z]+")?,
        })
    }

    /// Add words to the stopword set
    pub fn add_stop_words(&mut self, words: &[&str]) {
        for word in words {
            self.stop_words.insert(word.to_lowercase());
        }
    }

    pub fn min_token_length(&self) -> usize {
        self.min_token_length
    }

    /// Strip markup and everything that is not an ASCII letter, then lowercase.
    pub fn clean(&self, raw_text: &str) -> String {
        let text = self.script_re.replace_all(raw_text, " ");
        let text = self.tag_re.replace_all(&text, " ");
        let text = self.entity_re.replace_all(&text, " ");
        let text = self.non_alpha_re.replace_all(&text, " ");
        text.to_lowercase()
    }

    /// Normalize one raw document into its token sequence.
    ///
    /// `document` only labels the error when nothing survives.
    pub fn normalize_document(&self, document: &str, raw_text: &str) -> Result<Vec<String>> {
        let cleaned = self.clean(raw_text);
        let tokens: Vec<String> = cleaned
            .split_whitespace()
            .filter(|token| (MIN_RAW_TOKEN_LEN..=MAX_RAW_TOKEN_LEN).contains(&token.len()))
            .filter(|token| self.keep(token))
            .filter_map(|token| {
                let root = self.root(token);
                self.keep(&root).then_some(root)
            })
            .collect();

        if tokens.is_empty() {
            return Err(TopicError::EmptyDocument {
                document: document.to_string(),
            });
        }
        Ok(tokens)
    }

    pub fn normalize(&self, raw_text: &str) -> Result<Vec<String>> {
        self.normalize_document("<inline>", raw_text)
    }

    fn keep(&self, token: &str) -> bool {
        token.len() >= self.min_token_length && !self.stop_words.contains(token)
    }

    // Iterated so that a root fed back through the normalizer is left unchanged.
    fn root(&self, token: &str) -> String {
        let mut current = token.to_string();
        for _ in 0..MAX_ROOT_ROUNDS {
            let lemma = lemmatize_verb(&current);
            let next = self.stemmer.stem(lemma).into_owned();
            if next == current {
                break;
            }
            current = next;
        }
        current
    }
}

/// Fixed English stopword set
fn default_stop_words() -> HashSet<String> {
    let words = [
        "a", "about", "above", "across", "after", "afterwards", "again", "against", "all",
        "almost", "alone", "along", "already", "also", "although", "always", "am", "among",
        "amongst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything",
        "anyway", "anywhere", "are", "around", "as", "at", "back", "be", "became", "because",
        "become", "becomes", "becoming", "been", "before", "beforehand", "behind", "being",
        "below", "beside", "besides", "between", "beyond", "both", "bottom", "but", "by",
        "call", "can", "cannot", "cant", "co", "con", "could", "couldnt", "de", "describe",
        "detail", "did", "didn", "do", "does", "doesn", "doing", "don", "done", "down", "due",
        "during", "each", "eg", "eight", "either", "eleven", "else", "elsewhere", "empty",
        "enough", "etc", "even", "ever", "every", "everyone", "everything", "everywhere",
        "except", "few", "fifteen", "fifty", "fill", "find", "first", "five", "for", "former",
        "formerly", "forty", "found", "four", "from", "front", "full", "further", "get",
        "give", "go", "had", "has", "have", "he", "hence", "her", "here", "hereafter",
        "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his", "how",
        "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "into", "is", "it",
        "its", "itself", "just", "keep", "last", "latter", "latterly", "least", "less", "ltd",
        "made", "make", "many", "may", "me", "meanwhile", "might", "mine", "more", "moreover",
        "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
        "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
        "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto",
        "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own",
        "part", "per", "perhaps", "please", "put", "quite", "rather", "re", "really",
        "regarding", "same", "say", "see", "seem", "seemed", "seeming", "seems", "serious",
        "several", "she", "should", "show", "side", "since", "sincere", "six", "sixty", "so",
        "some", "somehow", "someone", "something", "sometime", "sometimes", "somewhere",
        "still", "such", "take", "ten", "than", "that", "the", "their", "them", "themselves",
        "then", "thence", "there", "thereafter", "thereby", "therefore", "therein",
        "thereupon", "these", "they", "thick", "thin", "third", "this", "those", "though",
        "three", "through", "throughout", "thru", "thus", "to", "together", "too", "top",
        "toward", "towards", "twelve", "twenty", "two", "un", "under", "unless", "until", "up",
        "upon", "us", "used", "using", "various", "very", "via", "was", "we", "well", "were",
        "what", "whatever", "when", "whence", "whenever", "where", "whereafter", "whereas",
        "whereby", "wherein", "whereupon", "wherever", "whether", "which", "while", "whither",
        "who", "whoever", "whole", "whom", "whose", "why", "will", "with", "within", "without",
        "would", "yet", "you", "your", "yours", "yourself", "yourselves",
    ];

    words.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_markup_and_digits() {
        let normalizer = Normalizer::new(3).unwrap();
        let cleaned = normalizer.clean("<p>Revenue grew 12% &amp; margins</p><script>var x=1;</script>");
        assert!(!cleaned.contains('<'));
        assert!(!cleaned.contains("amp"));
        assert!(!cleaned.contains("var"));
        assert!(cleaned.contains("revenue"));
    }

    #[test]
    fn test_stopwords_and_short_tokens_dropped() {
        let normalizer = Normalizer::new(3).unwrap();
        let tokens = normalizer.normalize("We are in the market for an ox").unwrap();
        assert_eq!(tokens, vec!["market".to_string()]);
    }

    #[test]
    fn test_stemming_and_irregular_verbs() {
        let normalizer = Normalizer::new(3).unwrap();
        let tokens = normalizer.normalize("sports running sold").unwrap();
        assert_eq!(tokens, vec!["sport", "run", "sell"]);
    }

    #[test]
    fn test_empty_document() {
        let normalizer = Normalizer::new(3).unwrap();
        let err = normalizer.normalize_document("doc-7", "<br/> 2019 -- the and").unwrap_err();
        assert!(matches!(err, TopicError::EmptyDocument { document } if document == "doc-7"));
    }

    #[test]
    fn test_idempotent_on_normalized_text() {
        let normalizer = Normalizer::new(3).unwrap();
        let text = "quarterly revenue agreed generously organizations declined operational";
        let once = normalizer.normalize(text).unwrap();
        let twice = normalizer.normalize(&once.join(" ")).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_custom_stop_words() {
        let mut normalizer = Normalizer::new(3).unwrap();
        normalizer.add_stop_words(&["Operator"]);
        let tokens = normalizer.normalize("operator question").unwrap();
        assert_eq!(tokens, vec!["question".to_string()]);
    }
}
