//! # Resolution Orchestrator
//!
//! Runs the tiers in order and stops at the first one that produces a tap
//! target:
//!
//! 1. popup region detection, then close candidate ranking (scoped to the
//!    region, or explicit close signals only when no region was found)
//! 2. template matching over the screenshot, if one was supplied
//! 3. `unresolved` when something popup-like was seen, else `no_popup`
//!
//! Every call is independent; the template library's cache is the only state
//! shared between calls.

use std::path::PathBuf;

use image::DynamicImage;
use serde::Serialize;

use crate::config::ResolverConfig;
use crate::coords::{self, CaptureFrame};
use crate::detector::PopupDetector;
use crate::error::ResolveError;
use crate::library::TemplateLibrary;
use crate::matcher::TemplateMatcher;
use crate::platform::ScreenSource;
use crate::ranker::CloseRanker;
use crate::tree::{Bounds, ScreenGeometry, UiNode};

#[derive(Clone, Debug)]
pub enum ScreenshotSource {
    File(PathBuf),
    /// Encoded bytes (PNG, JPEG, ...).
    Encoded(Vec<u8>),
    Decoded(DynamicImage),
}

/// Raster capture handed to the template tier.
#[derive(Clone, Debug)]
pub struct Screenshot {
    pub source: ScreenshotSource,
    /// Top-left of the capture in device pixels when it was cropped.
    pub crop_offset: (i32, i32),
}

impl Screenshot {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::new(ScreenshotSource::File(path.into()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(ScreenshotSource::Encoded(bytes))
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self::new(ScreenshotSource::Decoded(image))
    }

    fn new(source: ScreenshotSource) -> Self {
        Self {
            source,
            crop_offset: (0, 0),
        }
    }

    pub fn with_crop_offset(mut self, x: i32, y: i32) -> Self {
        self.crop_offset = (x, y);
        self
    }

    pub fn decode(&self) -> Result<DynamicImage, ResolveError> {
        match &self.source {
            ScreenshotSource::File(path) => {
                image::open(path).map_err(|source| ResolveError::Screenshot {
                    path: Some(path.clone()),
                    source,
                })
            }
            ScreenshotSource::Encoded(bytes) => image::load_from_memory(bytes)
                .map_err(|source| ResolveError::Screenshot { path: None, source }),
            ScreenshotSource::Decoded(image) => Ok(image.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    NoPopup,
    ResolvedByTree,
    ResolvedByTemplate,
    Unresolved,
}

/// Where to tap, in percent (0-100) and device pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Target {
    pub x_percent: f64,
    pub y_percent: f64,
    pub x: i32,
    pub y: i32,
}

impl Target {
    fn at(x: f64, y: f64, geometry: ScreenGeometry) -> Self {
        let (x, y) = coords::clamp_to_screen(x, y, geometry.width, geometry.height);
        let (x_percent, y_percent) = coords::to_percent(x, y, geometry.width, geometry.height);
        Self {
            x_percent,
            y_percent,
            x: x.round() as i32,
            y: y.round() as i32,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolutionResult {
    pub status: ResolutionStatus,
    /// Present only when resolved.
    pub target: Option<Target>,
    pub confidence: f64,
    /// `tree:<match>`, `template:<category>/<name>@<scale>` or `none`.
    pub method: String,
    /// The detected overlay region, if any.
    pub popup: Option<Bounds>,
}

impl ResolutionResult {
    pub fn is_resolved(&self) -> bool {
        matches!(
            self.status,
            ResolutionStatus::ResolvedByTree | ResolutionStatus::ResolvedByTemplate
        )
    }
}

pub struct PopupResolver {
    detector: PopupDetector,
    ranker: CloseRanker,
    matcher: TemplateMatcher,
}

impl PopupResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            detector: PopupDetector::new(config.detector),
            ranker: CloseRanker::new(config.ranker),
            matcher: TemplateMatcher::new(config.matcher),
        }
    }

    /// Decides whether a popup covers the screen and where to tap to close it.
    ///
    /// Fails only when the template tier is reached and the screenshot cannot
    /// be decoded, or the template library cannot be listed.
    pub fn resolve(
        &self,
        tree: &UiNode,
        geometry: ScreenGeometry,
        screenshot: Option<&Screenshot>,
        library: &mut TemplateLibrary,
    ) -> Result<ResolutionResult, ResolveError> {
        let popup = self.detector.detect(tree, geometry).map(|p| p.rect);
        let candidates = self.ranker.rank(tree, geometry, popup.as_ref());

        if let Some(top) = candidates
            .first()
            .filter(|c| self.ranker.accepts(c, popup.is_some()))
        {
            return Ok(finish(ResolutionResult {
                status: ResolutionStatus::ResolvedByTree,
                target: Some(Target::at(top.point.0 as f64, top.point.1 as f64, geometry)),
                confidence: self.ranker.confidence(top),
                method: format!("tree:{}", top.match_type.as_str()),
                popup,
            }));
        }

        if let Some(shot) = screenshot {
            if let Some(mut result) = self.resolve_by_template(shot, geometry, library)? {
                result.popup = popup;
                return Ok(finish(result));
            }
        }

        let status = if popup.is_some() || !candidates.is_empty() {
            ResolutionStatus::Unresolved
        } else {
            ResolutionStatus::NoPopup
        };
        Ok(finish(ResolutionResult {
            status,
            target: None,
            confidence: 0.0,
            method: "none".to_string(),
            popup,
        }))
    }

    /// Pulls the tree, geometry and screenshot from a device snapshot.
    /// A tree that cannot be parsed counts as an empty screen.
    pub fn resolve_source(
        &self,
        source: &dyn ScreenSource,
        library: &mut TemplateLibrary,
    ) -> Result<ResolutionResult, ResolveError> {
        let tree = source.ui_tree().unwrap_or_else(|e| {
            log::warn!("{:?} tree unreadable, treating as empty: {:#}", source.platform(), e);
            UiNode::default()
        });
        let screenshot = source.screenshot();
        self.resolve(&tree, source.screen_geometry(), screenshot.as_ref(), library)
    }

    fn resolve_by_template(
        &self,
        shot: &Screenshot,
        geometry: ScreenGeometry,
        library: &mut TemplateLibrary,
    ) -> Result<Option<ResolutionResult>, ResolveError> {
        let gray = shot.decode()?.to_luma8();
        let cfg = self.matcher.config();
        let hits = self
            .matcher
            .find(&gray, library, &cfg.category, cfg.min_confidence)
            .map_err(ResolveError::TemplateLibrary)?;
        let Some(best) = hits.first() else {
            return Ok(None);
        };

        let frame = CaptureFrame {
            displayed: gray.dimensions(),
            crop_offset: shot.crop_offset,
            original: (geometry.width, geometry.height),
        };
        let (x, y) = coords::reconcile(best.x as f64, best.y as f64, &frame);
        Ok(Some(ResolutionResult {
            status: ResolutionStatus::ResolvedByTemplate,
            target: Some(Target::at(x, y, geometry)),
            confidence: best.confidence as f64,
            method: format!("template:{}@{}", best.template_name, best.scale),
            popup: None,
        }))
    }
}

fn finish(result: ResolutionResult) -> ResolutionResult {
    match &result.target {
        Some(t) => log::info!(
            "{:?} via {} at ({}, {}) confidence {:.2}",
            result.status,
            result.method,
            t.x,
            t.y,
            result.confidence
        ),
        None => log::info!("{:?}", result.status),
    }
    result
}
