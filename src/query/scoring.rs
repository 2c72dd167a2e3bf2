//! Relevance scoring
//!
//! Term statistics are gathered once per search over every queried project,
//! so scores from different projects are comparable and can be merged into
//! one ranking.

use std::collections::HashMap;

use crate::config::Similarity;
use crate::models::Field;
use crate::segment::{Generation, LiveSegment};

/// Corpus-wide term statistics for one search
#[derive(Clone, Debug, Default)]
pub struct CorpusStats {
    doc_count: u64,
    total_doc_length: u64,
    length_docs: u64,
    doc_frequencies: HashMap<(Field, String), u64>,
}

impl CorpusStats {
    /// Gather statistics for `terms` over every segment of `generations`
    pub fn collect<'g, I>(generations: I, terms: &[(Field, String)]) -> Self
    where
        I: IntoIterator<Item = &'g Generation>,
    {
        Self::from_segments(
            generations.into_iter().flat_map(|g| g.segments().iter()),
            terms,
        )
    }

    pub fn from_segments<'s, I>(segments: I, terms: &[(Field, String)]) -> Self
    where
        I: IntoIterator<Item = &'s LiveSegment>,
    {
        let mut stats = CorpusStats::default();
        for segment in segments {
            let segment_stats = segment.reader.stats();
            stats.doc_count += segment.live_doc_count() as u64;
            stats.total_doc_length += segment_stats.total_doc_length;
            stats.length_docs += segment_stats.doc_count as u64;
            for (field, term) in terms {
                let df = segment.reader.doc_frequency(*field, term) as u64;
                if df > 0 {
                    *stats
                        .doc_frequencies
                        .entry((*field, term.clone()))
                        .or_insert(0) += df;
                }
            }
        }
        stats
    }

    /// Live documents across all queried projects
    pub fn doc_count(&self) -> u64 {
        self.doc_count
    }

    pub fn doc_frequency(&self, field: Field, term: &str) -> u64 {
        self.doc_frequencies
            .get(&(field, term.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Average `full` length in tokens
    pub fn avg_doc_length(&self) -> f32 {
        if self.length_docs == 0 {
            1.0
        } else {
            (self.total_doc_length as f64 / self.length_docs as f64).max(1.0) as f32
        }
    }
}

/// Scores term occurrences with the configured [`Similarity`]
#[derive(Clone, Debug, Default)]
pub struct Scorer {
    similarity: Similarity,
}

impl Scorer {
    pub fn new(similarity: Similarity) -> Self {
        Self { similarity }
    }

    pub fn similarity(&self) -> &Similarity {
        &self.similarity
    }

    /// Inverse document frequency, always positive
    pub fn idf(&self, stats: &CorpusStats, field: Field, term: &str) -> f32 {
        let n = stats.doc_count() as f32;
        let df = stats.doc_frequency(field, term) as f32;
        match self.similarity {
            Similarity::TfIdf => 1.0 + ((n + 1.0) / (df + 1.0)).ln(),
            Similarity::Bm25 { .. } => (1.0 + (n - df + 0.5).max(0.0) / (df + 0.5)).ln().max(f32::EPSILON),
        }
    }

    /// Score of `tf` occurrences of a term in a document of `doc_len` tokens
    ///
    /// Length normalization only applies to `full`; the other fields are
    /// short and their lengths are not recorded.
    pub fn score(&self, stats: &CorpusStats, field: Field, term: &str, tf: u32, doc_len: u32) -> f32 {
        if tf == 0 {
            return 0.0;
        }
        let idf = self.idf(stats, field, term);
        let tf = tf as f32;
        match self.similarity {
            Similarity::TfIdf => {
                let norm = if field == Field::Full {
                    1.0 / (doc_len.max(1) as f32).sqrt()
                } else {
                    1.0
                };
                tf.sqrt() * idf * idf * norm
            }
            Similarity::Bm25 { k1, b } => {
                let length_ratio = if field == Field::Full {
                    doc_len as f32 / stats.avg_doc_length()
                } else {
                    1.0
                };
                let norm = 1.0 - b + b * length_ratio;
                idf * (tf * (k1 + 1.0)) / (tf + k1 * norm)
            }
        }
    }
}
