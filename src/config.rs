//! # Resolver Configuration
//!
//! Every tunable threshold of the pipeline lives here so tuning stays
//! auditable and testable apart from the scoring code.
//!
//! All structs use `#[serde(default)]`: a JSON file only needs the fields it
//! overrides.
//!
//! ```json
//! { "detector": { "strict_threshold": 0.9 }, "matcher": { "min_confidence": 0.8 } }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::detector::PopupSignal;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub detector: DetectorConfig,
    pub ranker: RankerConfig,
    pub matcher: MatchConfig,
}

impl ResolverConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Thresholds of the overlay region detector.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Nodes smaller than this share of the screen are never regions.
    pub min_area_ratio: f64,
    /// Nodes starting above this y (status bar) are skipped.
    pub status_bar_height: i32,
    /// Share of the screen height at the top/bottom edge counted as docked.
    pub dock_zone_ratio: f64,
    /// Minimum accumulated score to become a candidate at all.
    pub candidate_floor: f64,
    /// Acceptance bar when a relaxed-threshold signal fired.
    pub relaxed_threshold: f64,
    /// Acceptance bar otherwise.
    pub strict_threshold: f64,
    /// Above this area ratio a node needs a strong signal.
    pub max_area_ratio: f64,
    /// Width/height share of the top-right corner zone.
    pub corner_zone_ratio: f64,
    pub center_tolerance_x: f64,
    pub center_tolerance_y: f64,
    pub area_band_min: f64,
    pub area_band_max: f64,
    pub weights: SignalWeights,
    /// Signals that lift the area cap and upgrade the weak bonuses.
    pub strong_signals: BTreeSet<PopupSignal>,
    /// Signals that select `relaxed_threshold` instead of `strict_threshold`.
    pub relaxed_signals: BTreeSet<PopupSignal>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_area_ratio: 0.05,
            status_bar_height: 50,
            dock_zone_ratio: 0.15,
            candidate_floor: 0.3,
            relaxed_threshold: 0.7,
            strict_threshold: 0.85,
            max_area_ratio: 0.9,
            corner_zone_ratio: 0.15,
            center_tolerance_x: 0.15,
            center_tolerance_y: 0.25,
            area_band_min: 0.15,
            area_band_max: 0.75,
            weights: SignalWeights::default(),
            strong_signals: BTreeSet::from([
                PopupSignal::DialogClass,
                PopupSignal::DialogId,
                PopupSignal::AdId,
                PopupSignal::FullScreenDismiss,
            ]),
            relaxed_signals: BTreeSet::from([
                PopupSignal::DialogClass,
                PopupSignal::DialogId,
                PopupSignal::AdId,
            ]),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub dialog_class: f64,
    pub dialog_id: f64,
    pub ad_id: f64,
    pub close_descendant: f64,
    pub full_screen_dismiss: f64,
    pub centered_strong: f64,
    pub centered_weak: f64,
    pub area_band_strong: f64,
    pub area_band_weak: f64,
    pub on_top: f64,
    pub mask_layer: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            dialog_class: 0.5,
            dialog_id: 0.4,
            ad_id: 0.4,
            close_descendant: 0.3,
            full_screen_dismiss: 0.4,
            centered_strong: 0.2,
            centered_weak: 0.1,
            area_band_strong: 0.15,
            area_band_weak: 0.08,
            on_top: 0.1,
            mask_layer: 0.15,
        }
    }
}

/// Scores and geometry of the close-control ranker.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    pub margin_above: i32,
    pub margin_side: i32,
    pub margin_below: i32,

    pub exact_text_score: f64,
    pub desc_keyword_score: f64,
    pub id_keyword_score: f64,
    pub small_clickable_score: f64,
    pub image_icon_score: f64,

    /// Clickable size window: max(px, ratio * screen width) on each end.
    pub button_min_px: i32,
    pub button_min_ratio: f64,
    pub button_max_px: i32,
    pub button_max_ratio: f64,

    pub icon_min_px: i32,
    pub icon_max_px: i32,
    pub corner_zone_ratio: f64,

    pub top_right_bonus: f64,
    pub top_left_bonus: f64,
    pub bottom_center_bonus: f64,
    pub other_position_bonus: f64,

    pub edge_bonus_max: f64,
    /// Distance (px) at which the edge bonus has halved.
    pub edge_falloff_px: f64,
    pub floating_bonus_max: f64,

    /// A scoped (region present) top candidate must score above this.
    pub acceptance_floor: f64,
    /// An unscoped top candidate must score above this.
    pub unscoped_acceptance_floor: f64,
    /// Score mapped to confidence 1.0 in the resolution result.
    pub full_confidence_score: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            margin_above: 200,
            margin_side: 50,
            margin_below: 30,
            exact_text_score: 15.0,
            desc_keyword_score: 12.0,
            id_keyword_score: 10.0,
            small_clickable_score: 8.0,
            image_icon_score: 8.0,
            button_min_px: 20,
            button_min_ratio: 0.03,
            button_max_px: 150,
            button_max_ratio: 0.15,
            icon_min_px: 15,
            icon_max_px: 120,
            corner_zone_ratio: 0.15,
            top_right_bonus: 3.0,
            top_left_bonus: 2.0,
            bottom_center_bonus: 1.5,
            other_position_bonus: 0.5,
            edge_bonus_max: 3.0,
            edge_falloff_px: 20.0,
            floating_bonus_max: 5.0,
            acceptance_floor: 9.0,
            unscoped_acceptance_floor: 10.0,
            full_confidence_score: 15.0,
        }
    }
}

/// Multi-scale template search settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub category: String,
    pub scales: Vec<f32>,
    pub min_confidence: f32,
    /// NMS: share of the averaged box size under which centers are duplicates.
    pub overlap: f32,
    /// Scaled templates with a shorter side are skipped.
    pub min_template_side: u32,
    /// Target short side of the template in the coarse search pass.
    pub coarse_template_side: u32,
    /// Coarse peaks need `min_confidence - coarse_slack` to be refined.
    pub coarse_slack: f32,
    /// Cap on refined coarse peaks that score below `min_confidence`.
    pub max_coarse_candidates: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            category: "close_buttons".to_string(),
            scales: vec![0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 1.1, 1.2, 1.3, 1.5, 1.8, 2.0],
            min_confidence: 0.75,
            overlap: 0.3,
            min_template_side: 10,
            coarse_template_side: 12,
            coarse_slack: 0.3,
            max_coarse_candidates: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ResolverConfig =
            serde_json::from_str(r#"{ "detector": { "strict_threshold": 0.9 } }"#).unwrap();
        assert_eq!(cfg.detector.strict_threshold, 0.9);
        assert_eq!(cfg.detector.relaxed_threshold, 0.7);
        assert_eq!(cfg.matcher.scales.len(), 12);
        assert_eq!(cfg.ranker.margin_above, 200);
    }

    #[test]
    fn signal_sets_are_independent() {
        let cfg: DetectorConfig =
            serde_json::from_str(r#"{ "relaxed_signals": ["dialog_class"] }"#).unwrap();
        assert_eq!(cfg.relaxed_signals.len(), 1);
        assert!(cfg.strong_signals.contains(&PopupSignal::FullScreenDismiss));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "matcher": { "min_confidence": 0.8 } }"#).unwrap();
        let cfg = ResolverConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.matcher.min_confidence, 0.8);
        assert!(ResolverConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
