//! Platform capability seam.
//!
//! Android and iOS differ in how the tree is serialized and in the coordinate
//! space of the tree (pixels vs points). Both implement [`ScreenSource`]; the
//! resolution engine only ever talks to the trait.

use serde::{Deserialize, Serialize};

use crate::resolver::Screenshot;
use crate::tree::{ScreenGeometry, UiNode, android, ios};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    Ios,
}

/// What the resolver needs from a device driver.
pub trait ScreenSource {
    fn platform(&self) -> Platform;

    /// The current accessibility tree, rebuilt on every call.
    fn ui_tree(&self) -> anyhow::Result<UiNode>;

    /// Screen size in the coordinate space of [`ScreenSource::ui_tree`].
    fn screen_geometry(&self) -> ScreenGeometry;

    fn screenshot(&self) -> Option<Screenshot> {
        None
    }
}

/// A captured uiautomator dump plus its screen size.
#[derive(Clone, Debug)]
pub struct AndroidSnapshot {
    pub hierarchy_xml: String,
    pub geometry: ScreenGeometry,
    pub screenshot: Option<Screenshot>,
}

impl ScreenSource for AndroidSnapshot {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    fn ui_tree(&self) -> anyhow::Result<UiNode> {
        android::parse_hierarchy(&self.hierarchy_xml)
    }

    fn screen_geometry(&self) -> ScreenGeometry {
        self.geometry
    }

    fn screenshot(&self) -> Option<Screenshot> {
        self.screenshot.clone()
    }
}

/// A captured WDA JSON source. `geometry` is the window size in points.
#[derive(Clone, Debug)]
pub struct IosSnapshot {
    pub source_json: String,
    pub geometry: ScreenGeometry,
    pub screenshot: Option<Screenshot>,
}

impl ScreenSource for IosSnapshot {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    fn ui_tree(&self) -> anyhow::Result<UiNode> {
        ios::parse_source(&self.source_json)
    }

    fn screen_geometry(&self) -> ScreenGeometry {
        self.geometry
    }

    fn screenshot(&self) -> Option<Screenshot> {
        self.screenshot.clone()
    }
}
