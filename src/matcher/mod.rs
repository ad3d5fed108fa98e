//! # Template Match Engine
//!
//! Finds reference icons from the [`TemplateLibrary`] in a grayscale
//! screenshot, across the configured scale ladder.
//!
//! ## Search
//! For every (template, scale) pair the template is resized, then searched
//! coarse-to-fine: screenshot and template are box-downsampled by an integer
//! factor so the template's short side lands near `coarse_template_side`,
//! and the coarse correlation peaks are re-scored exactly at full resolution
//! in a small neighbourhood. A factor of 1 is an exhaustive search that keeps
//! every offset at or above the confidence floor.
//!
//! ## Deduplication
//! Hits are suppressed per template first, then once more across templates.

pub mod ncc;
pub mod nms;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use image::GrayImage;
use image::imageops::{self, FilterType};
use imageproc::template_matching::find_extremes;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::MatchConfig;
use crate::library::{TemplateImage, TemplateLibrary};
use ncc::{PreparedTemplate, SearchImage};

/// One located template, in screenshot pixels.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchHit {
    /// Center of the matched box.
    pub x: u32,
    pub y: u32,
    /// Size of the template at the winning scale.
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    /// In [0, 1].
    pub confidence: f32,
    /// `category/name`.
    pub template_name: String,
}

/// A template resized to one ladder step, ready to search.
struct ScalePlan {
    template: usize,
    name: String,
    scale: f32,
    full: PreparedTemplate,
    coarse: Option<PreparedTemplate>,
    factor: u32,
}

pub struct TemplateMatcher {
    config: MatchConfig,
}

impl TemplateMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Matches every template of `category`. An empty or missing category
    /// yields no hits.
    pub fn find(
        &self,
        screen: &GrayImage,
        library: &mut TemplateLibrary,
        category: &str,
        min_confidence: f32,
    ) -> anyhow::Result<Vec<MatchHit>> {
        let templates = library.load(category)?;
        if templates.is_empty() {
            log::info!("template pass {}: library is empty", category);
            return Ok(Vec::new());
        }
        let hits = self.match_templates(screen, &templates, min_confidence);
        log::info!(
            "template pass {}: {} templates, {} hits",
            category,
            templates.len(),
            hits.len()
        );
        Ok(hits)
    }

    /// Hits of all `templates` scoring at least `min_confidence`, best first.
    pub fn match_templates(
        &self,
        screen: &GrayImage,
        templates: &[Arc<TemplateImage>],
        min_confidence: f32,
    ) -> Vec<MatchHit> {
        if screen.width() == 0 || screen.height() == 0 || templates.is_empty() {
            return Vec::new();
        }
        let full = SearchImage::from_gray(screen);
        let dims = screen.dimensions();

        let plans: Vec<ScalePlan> = templates
            .par_iter()
            .enumerate()
            .flat_map_iter(|(i, t)| self.plans_for(i, t, dims))
            .collect();

        let factors: BTreeSet<u32> = plans.iter().map(|p| p.factor).filter(|f| *f > 1).collect();
        let reduced: HashMap<u32, SearchImage> = factors
            .into_par_iter()
            .map(|f| (f, full.downsample(f)))
            .collect();

        let found: Vec<Vec<MatchHit>> = plans
            .par_iter()
            .map(|plan| self.search(plan, &full, reduced.get(&plan.factor), min_confidence))
            .collect();

        let mut per_template: Vec<Vec<MatchHit>> = vec![Vec::new(); templates.len()];
        for (plan, hits) in plans.iter().zip(found) {
            per_template[plan.template].extend(hits);
        }
        let merged: Vec<MatchHit> = per_template
            .into_iter()
            .flat_map(|hits| nms::suppress_duplicates(hits, self.config.overlap))
            .collect();
        nms::suppress_duplicates(merged, self.config.overlap)
    }

    fn plans_for(&self, index: usize, template: &TemplateImage, screen: (u32, u32)) -> Vec<ScalePlan> {
        let cfg = &self.config;
        let mut plans = Vec::new();
        for &scale in &cfg.scales {
            if !scale.is_finite() || scale <= 0.0 {
                continue;
            }
            let w = (template.width() as f32 * scale) as u32;
            let h = (template.height() as f32 * scale) as u32;
            if w.min(h) < cfg.min_template_side || w > screen.0 || h > screen.1 {
                continue;
            }

            let resized = if (w, h) == template.pixels.dimensions() {
                template.pixels.clone()
            } else {
                imageops::resize(&template.pixels, w, h, FilterType::Triangle)
            };
            let search = SearchImage::from_gray(&resized);
            let Some(full) = PreparedTemplate::new(&search) else {
                log::debug!("template {} is flat at scale {}", template.key(), scale);
                continue;
            };

            let mut factor = (w.min(h) / cfg.coarse_template_side.max(1)).max(1);
            let coarse = if factor > 1 {
                PreparedTemplate::new(&search.downsample(factor))
            } else {
                None
            };
            if coarse.is_none() {
                factor = 1;
            }
            plans.push(ScalePlan {
                template: index,
                name: template.key(),
                scale,
                full,
                coarse,
                factor,
            });
        }
        plans
    }

    fn search(
        &self,
        plan: &ScalePlan,
        full: &SearchImage,
        reduced: Option<&SearchImage>,
        min_confidence: f32,
    ) -> Vec<MatchHit> {
        let (level, template, factor) = match (&plan.coarse, reduced) {
            (Some(coarse), Some(image)) => (image, coarse, plan.factor),
            _ => (full, &plan.full, 1),
        };
        let Some(map) = ncc::correlate(level, template) else {
            return Vec::new();
        };
        if ncc::has_non_finite(&map) {
            log::warn!(
                "discarding correlation map of {} at scale {}: non-finite scores",
                plan.name,
                plan.scale
            );
            return Vec::new();
        }

        let threshold = if factor > 1 {
            min_confidence - self.config.coarse_slack
        } else {
            min_confidence
        };
        let extremes = find_extremes(&map);
        if extremes.max_value < threshold {
            log::trace!(
                "{} at scale {}: best {:.3} at {:?}",
                plan.name,
                plan.scale,
                extremes.max_value,
                extremes.max_value_location
            );
            return Vec::new();
        }

        if factor == 1 {
            return ncc::above(&map, min_confidence)
                .into_iter()
                .map(|p| self.hit(plan, p.x, p.y, p.score))
                .collect();
        }

        // Seeds that already clear `min_confidence` are all refined; weaker
        // ones only up to `max_coarse_candidates`.
        let (strong, weak): (Vec<_>, Vec<_>) = ncc::local_peaks(&map, threshold)
            .into_iter()
            .partition(|p| p.score >= min_confidence);
        let seeds = strong
            .into_iter()
            .chain(weak.into_iter().take(self.config.max_coarse_candidates));

        let max_x = full.width() - plan.full.width();
        let max_y = full.height() - plan.full.height();
        let radius = factor + 1;
        let mut visited = HashSet::new();
        let mut hits = Vec::new();
        for seed in seeds {
            let (cx, cy) = (seed.x * factor, seed.y * factor);
            for y in cy.saturating_sub(radius)..=(cy + radius).min(max_y) {
                for x in cx.saturating_sub(radius)..=(cx + radius).min(max_x) {
                    if !visited.insert((x, y)) {
                        continue;
                    }
                    let score = ncc::score_at(full, &plan.full, x, y);
                    if score.is_finite() && score >= min_confidence {
                        hits.push(self.hit(plan, x, y, score));
                    }
                }
            }
        }
        hits
    }

    fn hit(&self, plan: &ScalePlan, x: u32, y: u32, score: f32) -> MatchHit {
        let (w, h) = (plan.full.width(), plan.full.height());
        MatchHit {
            x: x + w / 2,
            y: y + h / 2,
            width: w,
            height: h,
            scale: plan.scale,
            confidence: score.clamp(0.0, 1.0),
            template_name: plan.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn badge(size: u32) -> GrayImage {
        let c = size as f32 / 2.0;
        GrayImage::from_fn(size, size, |x, y| {
            let (dx, dy) = (x as f32 + 0.5 - c, y as f32 + 0.5 - c);
            let r = (dx * dx + dy * dy).sqrt();
            let on_cross = (dx - dy).abs() < 2.5 || (dx + dy).abs() < 2.5;
            let on_ring = (r - c * 0.8).abs() < 2.0;
            Luma([if (on_cross && r < c * 0.6) || on_ring { 20 } else { 235 }])
        })
    }

    fn template(name: &str, pixels: GrayImage) -> Arc<TemplateImage> {
        Arc::new(TemplateImage {
            name: name.to_string(),
            category: "close_buttons".to_string(),
            pixels,
            path: Default::default(),
        })
    }

    fn screen_with(icon: &GrayImage, x: i64, y: i64) -> GrayImage {
        let mut screen = GrayImage::from_pixel(400, 300, Luma([128]));
        imageops::replace(&mut screen, icon, x, y);
        screen
    }

    #[test]
    fn finds_embedded_icon() {
        let icon = badge(40);
        let screen = screen_with(&icon, 210, 90);
        let matcher = TemplateMatcher::new(MatchConfig::default());
        let hits = matcher.match_templates(&screen, &[template("x", icon)], 0.75);
        assert_eq!(hits.len(), 1, "{hits:?}");
        assert_eq!((hits[0].x, hits[0].y), (230, 110));
        assert_eq!(hits[0].scale, 1.0);
        assert!(hits[0].confidence > 0.99);
        assert_eq!(hits[0].template_name, "close_buttons/x");
    }

    #[test]
    fn blank_screen_has_no_hits() {
        let screen = GrayImage::from_pixel(400, 300, Luma([128]));
        let matcher = TemplateMatcher::new(MatchConfig::default());
        assert!(matcher.match_templates(&screen, &[template("x", badge(40))], 0.75).is_empty());
    }

    #[test]
    fn skips_flat_and_oversized_templates() {
        let icon = badge(40);
        let screen = screen_with(&icon, 20, 20);
        let matcher = TemplateMatcher::new(MatchConfig::default());
        let flat = template("flat", GrayImage::from_pixel(30, 30, Luma([90])));
        let huge = template("huge", badge(700));
        let hits = matcher.match_templates(&screen, &[flat, huge, template("x", icon)], 0.75);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].template_name, "close_buttons/x");
    }

    #[test]
    fn exhaustive_search_for_small_templates() {
        let icon = badge(16);
        let screen = screen_with(&icon, 100, 50);
        let config = MatchConfig {
            scales: vec![1.0],
            ..MatchConfig::default()
        };
        let hits = TemplateMatcher::new(config).match_templates(&screen, &[template("x", icon)], 0.9);
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].x, hits[0].y), (108, 58));
    }
}
