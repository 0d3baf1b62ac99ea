//! Session-level item aggregation.
//!
//! Committed detections arrive one at a time after the guidance layer
//! authorizes them. Each commit either merges into exactly one existing
//! aggregated item or creates exactly one new item, decided by the weighted
//! similarity scorer in `similarity`, with a lightweight spatial-temporal
//! fallback that catches identity churn the primary scorer misses.
//!
//! The item collection supports safe concurrent read: the aggregator is the
//! single writer, and any number of readers may clone an `ItemsHandle` and
//! take snapshots while the pipeline keeps mutating. The similarity
//! configuration is live-tunable through a `SimilarityControl`; each commit
//! reads exactly one consistent snapshot of it.

mod similarity;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::detect::ThumbnailRef;
use crate::geometry::BoundingBox;
use crate::track::CandidateId;

pub use similarity::{
    label_similarity, similarity, FallbackConfig, SimilarityConfig, SimilaritySubject,
    SimilarityWeights,
};

/// Aggregated-item identifier. Distinct namespace from `CandidateId`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Commit payload and items
// ----------------------------------------------------------------------------

/// Detection payload handed to the aggregator when a locked candidate
/// commits. `detection_id` is assigned by the session and is unique for the
/// session's lifetime, which makes `process_commit` idempotent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommittedDetection {
    pub detection_id: u64,
    pub candidate: CandidateId,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub category: Option<String>,
    pub label: Option<String>,
    pub thumbnail: Option<ThumbnailRef>,
    pub timestamp_ms: u64,
}

/// The deduplicated representation of one physical object across possibly
/// many commits. Mutated in place on every merge; removed only by explicit
/// staleness cleanup or session reset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregatedItem {
    pub id: ItemId,
    pub category: Option<String>,
    /// Display label: the highest-confidence label seen so far.
    pub label: Option<String>,
    /// Confidence of the commit that supplied the current label.
    pub label_confidence: f32,
    /// Box of the latest merged detection.
    pub bbox: BoundingBox,
    pub max_confidence: f32,
    /// Running mean over all merged commits.
    pub avg_confidence: f32,
    pub merge_count: u32,
    /// Detection ids of every contributing commit.
    pub source_ids: Vec<u64>,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub thumbnail: Option<ThumbnailRef>,
}

impl AggregatedItem {
    fn from_commit(id: ItemId, det: &CommittedDetection) -> Self {
        Self {
            id,
            category: det.category.clone(),
            label: det.label.clone(),
            label_confidence: if det.label.is_some() {
                det.confidence
            } else {
                0.0
            },
            bbox: det.bbox,
            max_confidence: det.confidence,
            avg_confidence: det.confidence,
            merge_count: 1,
            source_ids: vec![det.detection_id],
            first_seen_ms: det.timestamp_ms,
            last_seen_ms: det.timestamp_ms,
            thumbnail: det.thumbnail,
        }
    }

    fn merge(&mut self, det: &CommittedDetection) {
        self.bbox = det.bbox;
        self.max_confidence = self.max_confidence.max(det.confidence);
        let n = self.merge_count as f32;
        self.avg_confidence = (self.avg_confidence * n + det.confidence) / (n + 1.0);
        self.merge_count += 1;
        self.source_ids.push(det.detection_id);
        self.last_seen_ms = det.timestamp_ms;

        if det.label.is_some() && det.confidence > self.label_confidence {
            self.label = det.label.clone();
            self.label_confidence = det.confidence;
        }
        if self.category.is_none() {
            self.category = det.category.clone();
        }
        if det.thumbnail.is_some() && det.confidence >= self.max_confidence {
            self.thumbnail = det.thumbnail;
        }
    }
}

/// Whether a commit merged into an existing item or created a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged(ItemId),
    Created(ItemId),
}

impl MergeOutcome {
    pub fn item_id(&self) -> ItemId {
        match self {
            Self::Merged(id) | Self::Created(id) => *id,
        }
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, Self::Merged(_))
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_items: usize,
    /// Sum of `merge_count - 1` across items: commits that did not create.
    pub total_merges: u64,
    pub average_merges_per_item: f64,
}

/// Minimal per-item state the spatial-temporal fallback consults: box
/// center, last-update time and category. Everything else it needs (the
/// current box for the IoU arm) lives on the item itself.
#[derive(Clone, Debug)]
struct SpatialHint {
    center: (f32, f32),
    last_update_ms: u64,
    category: Option<String>,
}

// ----------------------------------------------------------------------------
// Shared handles
// ----------------------------------------------------------------------------

/// Read-side handle to the item collection. Cloneable; safe to hold on a
/// consumer thread while the pipeline keeps committing.
#[derive(Clone)]
pub struct ItemsHandle {
    inner: Arc<RwLock<Vec<AggregatedItem>>>,
}

impl ItemsHandle {
    /// Copy of the current collection. A poisoned lock still holds the last
    /// consistent collection, so we recover rather than propagate.
    pub fn snapshot(&self) -> Vec<AggregatedItem> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write-side handle to the live similarity configuration. An external
/// control may replace the config at any time; invalid updates are rejected
/// and the last valid configuration stays in force.
#[derive(Clone)]
pub struct SimilarityControl {
    inner: Arc<RwLock<SimilarityConfig>>,
}

impl SimilarityControl {
    pub fn snapshot(&self) -> SimilarityConfig {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Install a new configuration. Fail-safe: on validation error nothing
    /// changes and the error is returned.
    pub fn update(&self, config: SimilarityConfig) -> Result<()> {
        config.validate()?;
        match self.inner.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// SessionAggregator
// ----------------------------------------------------------------------------

pub struct SessionAggregator {
    config: SimilarityControl,
    items: Arc<RwLock<Vec<AggregatedItem>>>,
    hints: HashMap<ItemId, SpatialHint>,
    next_id: u64,
    fallback_merges: u64,
}

impl SessionAggregator {
    pub fn new(config: SimilarityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: SimilarityControl {
                inner: Arc::new(RwLock::new(config)),
            },
            items: Arc::new(RwLock::new(Vec::new())),
            hints: HashMap::new(),
            next_id: 1,
            fallback_merges: 0,
        })
    }

    pub fn items_handle(&self) -> ItemsHandle {
        ItemsHandle {
            inner: Arc::clone(&self.items),
        }
    }

    pub fn config_control(&self) -> SimilarityControl {
        self.config.clone()
    }

    /// Commits merged by the fallback policy rather than the primary scorer.
    pub fn fallback_merges(&self) -> u64 {
        self.fallback_merges
    }

    fn write_items(&self) -> std::sync::RwLockWriteGuard<'_, Vec<AggregatedItem>> {
        match self.items.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_items(&self) -> std::sync::RwLockReadGuard<'_, Vec<AggregatedItem>> {
        match self.items.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Merge-or-create for one committed detection.
    ///
    /// Idempotent: a detection id that already contributed resolves to its
    /// item without mutating anything. The similarity configuration is read
    /// once at entry, so a live tuning update can never change threshold or
    /// weights halfway through one decision.
    pub fn process_commit(&mut self, det: CommittedDetection) -> MergeOutcome {
        let cfg = self.config.snapshot();
        let mut items = match self.items.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(existing) = items
            .iter()
            .find(|item| item.source_ids.contains(&det.detection_id))
        {
            return MergeOutcome::Merged(existing.id);
        }

        let incoming = SimilaritySubject {
            bbox: &det.bbox,
            category: det.category.as_deref(),
            label: det.label.as_deref(),
        };

        let mut best: Option<(usize, f32)> = None;
        for (index, item) in items.iter().enumerate() {
            let candidate = SimilaritySubject {
                bbox: &item.bbox,
                category: item.category.as_deref(),
                label: item.label.as_deref(),
            };
            let score = similarity(&incoming, &candidate, &cfg);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }

        if let Some((index, score)) = best {
            if score >= cfg.threshold {
                let item = &mut items[index];
                item.merge(&det);
                let id = item.id;
                drop(items);
                self.touch_hint(id, &det);
                log::debug!(
                    "aggregate: merged {} into {} (similarity {:.3})",
                    det.detection_id,
                    id,
                    score
                );
                return MergeOutcome::Merged(id);
            }
        }

        // Primary scoring was inconclusive; try the spatial-temporal
        // fallback before creating a new item.
        if let Some(index) = self.fallback_match(&items[..], &det, &cfg) {
            let item = &mut items[index];
            item.merge(&det);
            let id = item.id;
            drop(items);
            self.touch_hint(id, &det);
            self.fallback_merges += 1;
            log::debug!(
                "aggregate: fallback merged {} into {}",
                det.detection_id,
                id
            );
            return MergeOutcome::Merged(id);
        }

        let id = ItemId(self.next_id);
        self.next_id += 1;
        let item = AggregatedItem::from_commit(id, &det);
        items.push(item);
        drop(items);
        self.touch_hint(id, &det);
        log::debug!("aggregate: created {} from {}", id, det.detection_id);
        MergeOutcome::Created(id)
    }

    pub fn process_batch(&mut self, detections: Vec<CommittedDetection>) -> Vec<MergeOutcome> {
        detections
            .into_iter()
            .map(|det| self.process_commit(det))
            .collect()
    }

    fn touch_hint(&mut self, id: ItemId, det: &CommittedDetection) {
        self.hints.insert(
            id,
            SpatialHint {
                center: det.bbox.center(),
                last_update_ms: det.timestamp_ms,
                category: det.category.clone(),
            },
        );
    }

    /// Spatial-temporal fallback: same category (when required), recent
    /// update, and either box overlap or close centers. Never the primary
    /// path; the caller runs the weighted scorer first.
    fn fallback_match(
        &self,
        items: &[AggregatedItem],
        det: &CommittedDetection,
        cfg: &SimilarityConfig,
    ) -> Option<usize> {
        if !cfg.fallback.enabled {
            return None;
        }
        let (dx, dy) = det.bbox.center();

        items.iter().enumerate().find_map(|(index, item)| {
            let hint = self.hints.get(&item.id)?;
            if det.timestamp_ms.saturating_sub(hint.last_update_ms) > cfg.fallback.window_ms {
                return None;
            }
            if cfg.fallback.require_category && hint.category.as_deref() != det.category.as_deref()
            {
                return None;
            }
            let (hx, hy) = hint.center;
            let center_distance = ((dx - hx).powi(2) + (dy - hy).powi(2)).sqrt();
            let overlap = item.bbox.iou(&det.bbox);
            (overlap >= cfg.fallback.min_iou
                || center_distance <= cfg.fallback.max_center_distance)
                .then_some(index)
        })
    }

    /// Remove items not updated within `max_age_ms` of `now_ms`. Returns how
    /// many were removed.
    pub fn remove_stale(&mut self, max_age_ms: u64, now_ms: u64) -> usize {
        let mut items = self.write_items();
        let before = items.len();
        items.retain(|item| now_ms.saturating_sub(item.last_seen_ms) <= max_age_ms);
        let removed = before - items.len();
        let kept: Vec<ItemId> = items.iter().map(|item| item.id).collect();
        drop(items);
        self.hints.retain(|id, _| kept.contains(id));
        if removed > 0 {
            log::debug!("aggregate: removed {} stale item(s)", removed);
        }
        removed
    }

    /// Clear the collection and all per-item fallback state. Item ids are
    /// not reused across a reset.
    pub fn reset(&mut self) {
        self.write_items().clear();
        self.hints.clear();
        self.fallback_merges = 0;
    }

    pub fn items(&self) -> Vec<AggregatedItem> {
        self.read_items().clone()
    }

    pub fn stats(&self) -> AggregateStats {
        let items = self.read_items();
        let total_items = items.len();
        let total_merges: u64 = items
            .iter()
            .map(|item| u64::from(item.merge_count.saturating_sub(1)))
            .sum();
        let average_merges_per_item = if total_items > 0 {
            total_merges as f64 / total_items as f64
        } else {
            0.0
        };
        AggregateStats {
            total_items,
            total_merges,
            average_merges_per_item,
        }
    }
}
