use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use stop_words::{get, LANGUAGE};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ProseConfig;

/// Natural-language analyzer for history messages
///
/// Lowercases, drops the NLTK English stopwords and stems. Query text for the `hist`
/// field goes through the same pipeline so terms line up.
pub struct ProseAnalyzer {
    config: ProseConfig,
    stemmer: Option<Stemmer>,
    stopwords: HashSet<String>,
}

impl ProseAnalyzer {
    pub fn new(config: &ProseConfig) -> Self {
        let stemmer = config.stem.then(|| Stemmer::create(Algorithm::English));
        let stopwords = if config.remove_stopwords {
            get(LANGUAGE::English)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect()
        } else {
            HashSet::new()
        };

        Self {
            config: config.clone(),
            stemmer,
            stopwords,
        }
    }

    /// Normalize one word, or `None` when it is filtered out
    pub fn normalize(&self, word: &str) -> Option<String> {
        let token = if self.config.lowercase {
            word.to_lowercase()
        } else {
            word.to_string()
        };
        if token.len() < self.config.min_token_length
            || token.len() > self.config.max_token_length
            || self.stopwords.contains(&token)
        {
            return None;
        }
        Some(match &self.stemmer {
            Some(stemmer) => stemmer.stem(&token).into_owned(),
            None => token,
        })
    }

    /// Terms in order with their positions
    ///
    /// Filtered words still advance the position so phrase distance is kept.
    pub fn terms_with_positions(&self, text: &str) -> Vec<(String, u32)> {
        text.unicode_words()
            .enumerate()
            .filter_map(|(pos, word)| self.normalize(word).map(|t| (t, pos as u32)))
            .collect()
    }

    pub fn terms(&self, text: &str) -> Vec<String> {
        self.terms_with_positions(text)
            .into_iter()
            .map(|(term, _)| term)
            .collect()
    }
}
