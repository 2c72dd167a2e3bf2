//! Tiered merge policy for segment compaction
//!
//! Segments are grouped into size tiers; a tier holding more than
//! `segments_per_tier` segments has its smallest members merged. Segments
//! whose tombstones exceed `delete_ratio_threshold` are rewritten first.

use serde::{Deserialize, Serialize};

use super::types::SegmentId;

/// Configuration for the tiered merge policy
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicyConfig {
    /// Maximum size for a merged segment
    pub max_merged_segment_bytes: u64,
    /// Target number of segments per tier
    pub segments_per_tier: usize,
    /// Minimum number of segments to merge at once
    pub min_merge_count: usize,
    /// Maximum number of segments to merge at once
    pub max_merge_count: usize,
    /// Fraction of tombstoned documents that forces a rewrite
    pub delete_ratio_threshold: f64,
    /// Segments below this size all share the lowest tier
    pub floor_segment_bytes: u64,
}

impl Default for MergePolicyConfig {
    fn default() -> Self {
        Self {
            max_merged_segment_bytes: 1024 * 1024 * 1024, // 1GB
            segments_per_tier: 8,
            min_merge_count: 2,
            max_merge_count: 10,
            delete_ratio_threshold: 0.3,
            floor_segment_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Size and delete counts of one live segment, as seen by the policy
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentSummary {
    pub id: SegmentId,
    pub size_bytes: u64,
    pub doc_count: u32,
    pub deleted_count: u32,
}

impl SegmentSummary {
    pub fn delete_ratio(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.deleted_count as f64 / self.doc_count as f64
        }
    }

    fn live_size(&self) -> u64 {
        ((1.0 - self.delete_ratio()) * self.size_bytes as f64) as u64
    }
}

/// A candidate merge operation
#[derive(Clone, Debug)]
pub struct MergeCandidate {
    /// Segments to merge, oldest first
    pub segment_ids: Vec<SegmentId>,
    /// Estimated size of the merged segment
    pub estimated_size: u64,
    /// Higher is more urgent
    pub score: f64,
    pub reason: MergeReason,
}

/// Reason why segments should be merged
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeReason {
    /// Too many segments in a tier
    TierOverflow,
    /// Tombstones make up too much of the segment
    HighDeleteRatio,
    /// Requested explicitly, merges everything
    Forced,
}

/// Tiered merge policy implementation
pub struct TieredMergePolicy {
    config: MergePolicyConfig,
}

impl TieredMergePolicy {
    pub fn new(config: MergePolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergePolicyConfig {
        &self.config
    }

    /// Merge candidates, most urgent first
    pub fn find_merges(&self, segments: &[SegmentSummary]) -> Vec<MergeCandidate> {
        let mut candidates = Vec::new();
        if segments.is_empty() {
            return candidates;
        }

        if let Some(candidate) = self.find_high_delete_merge(segments) {
            candidates.push(candidate);
        }
        candidates.extend(self.find_tiered_merges(segments));

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }

    /// Merge every segment into one, if there is anything to gain
    pub fn forced_merge(&self, segments: &[SegmentSummary]) -> Option<MergeCandidate> {
        let worthwhile = segments.len() > 1 || segments.iter().any(|s| s.deleted_count > 0);
        if !worthwhile {
            return None;
        }
        Some(MergeCandidate {
            segment_ids: sorted_ids(segments),
            estimated_size: segments.iter().map(SegmentSummary::live_size).sum(),
            score: f64::MAX,
            reason: MergeReason::Forced,
        })
    }

    /// A single high-delete segment is rewritten alone to expunge tombstones
    fn find_high_delete_merge(&self, segments: &[SegmentSummary]) -> Option<MergeCandidate> {
        let mut high_delete: Vec<SegmentSummary> = segments
            .iter()
            .filter(|s| s.delete_ratio() > self.config.delete_ratio_threshold)
            .copied()
            .collect();
        if high_delete.is_empty() {
            return None;
        }
        high_delete.truncate(self.config.max_merge_count.max(1));

        let avg_delete_ratio = high_delete.iter().map(SegmentSummary::delete_ratio).sum::<f64>()
            / high_delete.len() as f64;
        Some(MergeCandidate {
            segment_ids: sorted_ids(&high_delete),
            estimated_size: high_delete.iter().map(SegmentSummary::live_size).sum(),
            score: avg_delete_ratio * 100.0,
            reason: MergeReason::HighDeleteRatio,
        })
    }

    fn find_tiered_merges(&self, segments: &[SegmentSummary]) -> Vec<MergeCandidate> {
        let mut candidates = Vec::new();

        for (tier_idx, tier_segments) in self.group_by_tier(segments).into_iter().enumerate() {
            if tier_segments.len() <= self.config.segments_per_tier {
                continue;
            }
            let merge_count = (tier_segments.len() - self.config.segments_per_tier + 1)
                .min(self.config.max_merge_count)
                .max(self.config.min_merge_count);

            let mut sorted = tier_segments;
            sorted.sort_by_key(|s| (s.size_bytes, s.id));
            let mut to_merge: Vec<SegmentSummary> = Vec::with_capacity(merge_count);
            let mut size = 0u64;
            for segment in sorted.into_iter().take(merge_count) {
                if size + segment.live_size() > self.config.max_merged_segment_bytes {
                    break;
                }
                size += segment.live_size();
                to_merge.push(segment);
            }

            if to_merge.len() >= self.config.min_merge_count {
                candidates.push(MergeCandidate {
                    segment_ids: sorted_ids(&to_merge),
                    estimated_size: size,
                    score: (10.0 - tier_idx as f64).max(1.0) * to_merge.len() as f64,
                    reason: MergeReason::TierOverflow,
                });
            }
        }

        candidates
    }

    fn group_by_tier(&self, segments: &[SegmentSummary]) -> Vec<Vec<SegmentSummary>> {
        let floor = self.config.floor_segment_bytes.max(1);
        let ratio = self.config.segments_per_tier.max(2) as u64;

        let max_tier = 10;
        let mut tiers: Vec<Vec<SegmentSummary>> = vec![Vec::new(); max_tier];
        for segment in segments {
            let tier = size_to_tier(segment.size_bytes.max(floor), floor, ratio).min(max_tier - 1);
            tiers[tier].push(*segment);
        }
        while tiers.last().map(|t| t.is_empty()).unwrap_or(false) {
            tiers.pop();
        }
        tiers
    }
}

impl Default for TieredMergePolicy {
    fn default() -> Self {
        Self::new(MergePolicyConfig::default())
    }
}

fn size_to_tier(size: u64, floor: u64, ratio: u64) -> usize {
    if size <= floor {
        return 0;
    }
    let mut tier_max = floor.saturating_mul(ratio);
    let mut tier = 0;
    while size > tier_max && tier < 10 {
        tier += 1;
        tier_max = tier_max.saturating_mul(ratio);
    }
    tier
}

fn sorted_ids(segments: &[SegmentSummary]) -> Vec<SegmentId> {
    let mut ids: Vec<SegmentId> = segments.iter().map(|s| s.id).collect();
    ids.sort();
    ids
}
