//! # Popup Region Detector
//!
//! Walks the tree once and scores every node as a candidate overlay region
//! using the signals in [`signals`]. The best node that clears its acceptance
//! threshold is the popup.
//!
//! ## Filters
//! Before scoring, a node is skipped when it is tiny, starts under the status
//! bar, or is a docked navigation/search bar.
//!
//! ## Acceptance
//! - score >= `candidate_floor` to be considered
//! - a node above `max_area_ratio` also needs a strong signal
//! - `relaxed_threshold` if a relaxed signal fired, else `strict_threshold`
//! - ties go to the later node in document order

pub mod signals;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::DetectorConfig;
use crate::keywords;
pub use signals::PopupSignal;
use signals::SignalContext;

use crate::tree::{Bounds, FlatNode, ScreenGeometry, TreeIndex, UiNode};

/// A scored overlay region.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PopupCandidate {
    pub rect: Bounds,
    /// Clamped to [0, 1].
    pub confidence: f64,
    pub signals: BTreeSet<PopupSignal>,
    /// Position of the node in document order.
    pub traversal_index: usize,
    /// The acceptance bar that applied to this node.
    pub threshold: f64,
}

impl PopupCandidate {
    pub fn is_accepted(&self) -> bool {
        self.confidence >= self.threshold
    }
}

pub struct PopupDetector {
    config: DetectorConfig,
}

impl PopupDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Returns the best accepted overlay region, or `None`.
    pub fn detect(&self, tree: &UiNode, geometry: ScreenGeometry) -> Option<PopupCandidate> {
        let best = self
            .candidates(tree, geometry)
            .into_iter()
            .filter(PopupCandidate::is_accepted)
            .max_by(|a, b| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then(a.traversal_index.cmp(&b.traversal_index))
            });

        match &best {
            Some(c) => log::debug!(
                "popup region {} confidence {:.2} signals {:?}",
                c.rect,
                c.confidence,
                c.signals
            ),
            None => log::debug!("no popup region cleared its threshold"),
        }
        best
    }

    /// Every node scoring at least `candidate_floor`, accepted or not.
    pub fn candidates(&self, tree: &UiNode, geometry: ScreenGeometry) -> Vec<PopupCandidate> {
        if geometry.width == 0 || geometry.height == 0 {
            return Vec::new();
        }

        let index = TreeIndex::build(tree);
        let close_flags: Vec<bool> = index.iter().map(|f| is_close_affordance(f.node)).collect();
        let cfg = &self.config;
        let mut out = Vec::new();

        for flat in index.iter() {
            if self.is_excluded(flat, geometry) {
                continue;
            }
            let area_ratio = geometry.area_ratio(&flat.node.bounds);
            let ctx = SignalContext {
                index: &index,
                flat,
                geometry,
                config: cfg,
                area_ratio,
                close_flags: &close_flags,
            };
            let (score, state) = signals::evaluate(&ctx);

            if score < cfg.candidate_floor {
                continue;
            }
            // Ordinary full-page content is never an overlay without structural evidence.
            if area_ratio > cfg.max_area_ratio && !state.strong {
                log::debug!(
                    "skipping near full-screen node {} without strong signal",
                    flat.node.bounds
                );
                continue;
            }

            let relaxed = state.fired.iter().any(|s| cfg.relaxed_signals.contains(s));
            out.push(PopupCandidate {
                rect: flat.node.bounds,
                confidence: score.clamp(0.0, 1.0),
                signals: state.fired,
                traversal_index: flat.position,
                threshold: if relaxed {
                    cfg.relaxed_threshold
                } else {
                    cfg.strict_threshold
                },
            });
        }
        out
    }

    fn is_excluded(&self, flat: &FlatNode, geometry: ScreenGeometry) -> bool {
        let node = flat.node;
        let b = &node.bounds;
        if b.is_empty() || geometry.area_ratio(b) < self.config.min_area_ratio {
            return true;
        }
        if b.y1 < self.config.status_bar_height {
            return true;
        }

        let dock = geometry.height as f64 * self.config.dock_zone_ratio;
        let names_match = |words: &[&str]| {
            keywords::contains_any(&node.resource_id, words)
                || keywords::contains_any(&node.class_name, words)
        };
        let bottom_docked = b.y2 as f64 >= geometry.height as f64 - dock;
        let top_docked = (b.y1 as f64) <= dock;
        (bottom_docked && names_match(keywords::NAV_BAR_KEYWORDS))
            || (top_docked && names_match(keywords::SEARCH_BAR_KEYWORDS))
    }
}

/// Close glyph text or a close/dismiss/cancel resource id.
pub fn is_close_affordance(node: &UiNode) -> bool {
    keywords::is_close_text(&node.text) || keywords::is_close_id(&node.resource_id)
}
