//! # Close Candidate Ranker
//!
//! Finds and scores dismiss controls.
//!
//! With a detected region the search covers the region grown by asymmetric
//! margins (close buttons often float just outside a dialog). Without one only
//! nodes carrying an explicit close signal are considered, so ordinary page
//! content is never scanned for positional guesses.
//!
//! | match             | base score                     |
//! |-------------------|--------------------------------|
//! | exact close text  | `exact_text_score` (15)        |
//! | desc keyword      | `desc_keyword_score` (12)      |
//! | id keyword        | `id_keyword_score` (10)        |
//! | small clickable   | `small_clickable_score` (8) + position |
//! | corner image icon | `image_icon_score` (8)         |
//!
//! Scoped candidates also earn an edge-proximity bonus and a floating bonus
//! when they sit in the margin band above or beside the region.

use serde::Serialize;

use crate::config::RankerConfig;
use crate::coords;
use crate::keywords;
use crate::tree::{Bounds, ScreenGeometry, TreeIndex, UiNode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseMatch {
    ExactText,
    DescKeyword,
    IdKeyword,
    SmallClickable,
    ImageIcon,
    FloatingAboveRect,
}

impl CloseMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseMatch::ExactText => "exact_text",
            CloseMatch::DescKeyword => "desc_keyword",
            CloseMatch::IdKeyword => "id_keyword",
            CloseMatch::SmallClickable => "small_clickable",
            CloseMatch::ImageIcon => "image_icon",
            CloseMatch::FloatingAboveRect => "floating_above_rect",
        }
    }
}

/// A scored dismiss control. Scores only rank relative to each other.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CloseCandidate {
    /// Tap point in device pixels, always on screen.
    pub point: (i32, i32),
    pub source_rect: Option<Bounds>,
    pub score: f64,
    pub match_type: CloseMatch,
    pub traversal_index: usize,
    /// Text, description or id of the node, for diagnostics.
    pub label: String,
}

pub struct CloseRanker {
    config: RankerConfig,
}

impl CloseRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    /// Candidates sorted by descending score; later nodes win ties.
    pub fn rank(
        &self,
        tree: &UiNode,
        geometry: ScreenGeometry,
        region: Option<&Bounds>,
    ) -> Vec<CloseCandidate> {
        let index = TreeIndex::build(tree);
        let search = region.map(|r| {
            let cfg = &self.config;
            r.expand(cfg.margin_side, cfg.margin_above, cfg.margin_side, cfg.margin_below)
        });

        let mut out: Vec<CloseCandidate> = index
            .iter()
            .filter(|f| f.node.enabled && !f.node.bounds.is_empty())
            .filter_map(|f| {
                let node = f.node;
                let scored = match (region, &search) {
                    (Some(r), Some(s)) => {
                        if !s.contains(&node.bounds) || node.bounds.area() >= r.area() {
                            return None;
                        }
                        self.score_scoped(node, geometry, r)
                    }
                    _ => self.score_explicit(node),
                };
                scored.map(|(score, match_type)| {
                    self.candidate(node, geometry, f.position, score, match_type)
                })
            })
            .collect();

        out.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.traversal_index.cmp(&a.traversal_index))
        });

        if let Some(top) = out.first() {
            log::debug!(
                "top close candidate {:?} '{}' at {:?} score {:.2} ({} total)",
                top.match_type,
                top.label,
                top.point,
                top.score,
                out.len()
            );
        }
        out
    }

    /// Whether the top candidate is good enough to tap.
    pub fn accepts(&self, candidate: &CloseCandidate, scoped: bool) -> bool {
        let floor = if scoped {
            self.config.acceptance_floor
        } else {
            self.config.unscoped_acceptance_floor
        };
        candidate.score > floor
    }

    /// Maps a score onto [0, 1] for the resolution result.
    pub fn confidence(&self, candidate: &CloseCandidate) -> f64 {
        if self.config.full_confidence_score <= 0.0 {
            return 1.0;
        }
        (candidate.score / self.config.full_confidence_score).clamp(0.0, 1.0)
    }

    fn candidate(
        &self,
        node: &UiNode,
        geometry: ScreenGeometry,
        position: usize,
        score: f64,
        match_type: CloseMatch,
    ) -> CloseCandidate {
        let (cx, cy) = node.bounds.center();
        let (x, y) = coords::clamp_to_screen(cx as f64, cy as f64, geometry.width, geometry.height);
        let label = [&node.text, &node.content_description, &node.resource_id]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_default();
        CloseCandidate {
            point: (x as i32, y as i32),
            source_rect: Some(node.bounds),
            score,
            match_type,
            traversal_index: position,
            label,
        }
    }

    /// Unscoped mode: explicit close text or close id only.
    fn score_explicit(&self, node: &UiNode) -> Option<(f64, CloseMatch)> {
        if keywords::is_close_text(&node.text) {
            Some((self.config.exact_text_score, CloseMatch::ExactText))
        } else if keywords::is_close_id(&node.resource_id) {
            Some((self.config.id_keyword_score, CloseMatch::IdKeyword))
        } else {
            None
        }
    }

    fn score_scoped(
        &self,
        node: &UiNode,
        geometry: ScreenGeometry,
        region: &Bounds,
    ) -> Option<(f64, CloseMatch)> {
        let cfg = &self.config;
        let (base, mut match_type) = if keywords::is_close_text(&node.text) {
            (cfg.exact_text_score, CloseMatch::ExactText)
        } else if keywords::contains_any(&node.content_description, keywords::CLOSE_DESC_KEYWORDS) {
            (cfg.desc_keyword_score, CloseMatch::DescKeyword)
        } else if keywords::is_close_id(&node.resource_id) {
            (cfg.id_keyword_score, CloseMatch::IdKeyword)
        } else if node.clickable && self.is_button_sized(&node.bounds, geometry) {
            let bonus = self.position_bonus(&node.bounds, region);
            (cfg.small_clickable_score + bonus, CloseMatch::SmallClickable)
        } else if !node.clickable && self.is_corner_icon(node, region) {
            (cfg.image_icon_score, CloseMatch::ImageIcon)
        } else {
            return None;
        };

        let floating = self.floating_bonus(&node.bounds, region);
        if floating > 0.0
            && matches!(match_type, CloseMatch::SmallClickable | CloseMatch::ImageIcon)
        {
            match_type = CloseMatch::FloatingAboveRect;
        }
        Some((base + self.edge_bonus(&node.bounds, region) + floating, match_type))
    }

    fn is_button_sized(&self, b: &Bounds, geometry: ScreenGeometry) -> bool {
        let cfg = &self.config;
        let w = geometry.width as f64;
        let min = (cfg.button_min_px as f64).max(w * cfg.button_min_ratio);
        let max = (cfg.button_max_px as f64).max(w * cfg.button_max_ratio);
        let (bw, bh) = (b.width() as f64, b.height() as f64);
        bw >= min && bw <= max && bh >= min && bh <= max
    }

    /// Non-clickable image in the region's top-right corner zone. Some
    /// platforms report close icons as plain images.
    fn is_corner_icon(&self, node: &UiNode, region: &Bounds) -> bool {
        let cfg = &self.config;
        if !keywords::contains_any(&node.class_name, keywords::IMAGE_CLASS_KEYWORDS) {
            return false;
        }
        let b = &node.bounds;
        let sized = |side: i32| side >= cfg.icon_min_px && side <= cfg.icon_max_px;
        if !sized(b.width()) || !sized(b.height()) {
            return false;
        }
        let (cx, cy) = b.center();
        let min_x = region.x2 as f64 - region.width() as f64 * cfg.corner_zone_ratio;
        let max_y = region.y1 as f64 + region.height() as f64 * cfg.corner_zone_ratio;
        cx as f64 >= min_x && cy as f64 <= max_y
    }

    fn position_bonus(&self, b: &Bounds, region: &Bounds) -> f64 {
        let cfg = &self.config;
        let (cx, cy) = b.center();
        let (cx, cy) = (cx as f64, cy as f64);
        let (x1, y1) = (region.x1 as f64, region.y1 as f64);
        let (w, h) = (region.width() as f64, region.height() as f64);

        let top = cy < y1 + h * 0.3;
        let bottom = cy > y1 + h * 0.7;
        let left = cx < x1 + w * 0.3;
        let right = cx > x1 + w * 0.7;

        match (top, bottom, left, right) {
            (true, _, _, true) => cfg.top_right_bonus,
            (true, _, true, _) => cfg.top_left_bonus,
            (_, true, false, false) => cfg.bottom_center_bonus,
            _ => cfg.other_position_bonus,
        }
    }

    /// Up to `edge_bonus_max`; half of it at `edge_falloff_px` from the nearest border.
    fn edge_bonus(&self, b: &Bounds, region: &Bounds) -> f64 {
        let cfg = &self.config;
        let (cx, cy) = b.center();
        let d = [
            (cx - region.x1).abs(),
            (cx - region.x2).abs(),
            (cy - region.y1).abs(),
            (cy - region.y2).abs(),
        ]
        .into_iter()
        .min()
        .unwrap_or(0) as f64;
        if cfg.edge_falloff_px <= 0.0 {
            return if d == 0.0 { cfg.edge_bonus_max } else { 0.0 };
        }
        cfg.edge_bonus_max / (1.0 + d / cfg.edge_falloff_px)
    }

    /// Bonus for a center in the margin band above or beside the region,
    /// fading out towards the band's outer edge.
    fn floating_bonus(&self, b: &Bounds, region: &Bounds) -> f64 {
        let cfg = &self.config;
        let (cx, cy) = b.center();
        if cy > region.y2 || region.contains_point(cx, cy) {
            return 0.0;
        }

        let fade = |outside: i32, margin: i32| {
            if margin <= 0 {
                0.0
            } else {
                1.0 - outside as f64 / margin as f64
            }
        };
        let mut frac: f64 = 1.0;
        if cy < region.y1 {
            frac = frac.min(fade(region.y1 - cy, cfg.margin_above));
        }
        if cx < region.x1 {
            frac = frac.min(fade(region.x1 - cx, cfg.margin_side));
        }
        if cx > region.x2 {
            frac = frac.min(fade(cx - region.x2, cfg.margin_side));
        }
        cfg.floating_bonus_max * frac.max(0.0)
    }
}
