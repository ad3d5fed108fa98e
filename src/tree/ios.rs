//! WebDriverAgent JSON page sources.
//!
//! WDA reports logical points, not pixels, and carries no clickable flag.
//! Clickability is inferred from the element type.

use anyhow::Context;
use serde::Deserialize;

use super::{Bounds, UiNode};

const TAPPABLE_TYPES: &[&str] = &[
    "XCUIElementTypeButton",
    "XCUIElementTypeLink",
    "XCUIElementTypeCell",
    "XCUIElementTypeSwitch",
    "XCUIElementTypeSegmentedControl",
    "XCUIElementTypeMenuItem",
    "XCUIElementTypeTab",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WdaElement {
    #[serde(rename = "type")]
    element_type: String,
    name: Option<String>,
    label: Option<String>,
    value: Option<serde_json::Value>,
    #[serde(rename = "rawIdentifier", alias = "identifier")]
    raw_identifier: Option<String>,
    rect: Option<WdaRect>,
    #[serde(alias = "isEnabled")]
    enabled: Option<serde_json::Value>,
    children: Vec<WdaElement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WdaRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Parses a WDA `source?format=json` document. Accepts either the bare element
/// or the `{"value": {...}}` envelope WDA returns over HTTP.
pub fn parse_source(json: &str) -> anyhow::Result<UiNode> {
    let raw: serde_json::Value = serde_json::from_str(json).context("WDA source is not JSON")?;
    let element = match raw.get("value") {
        Some(inner) if inner.is_object() && raw.get("type").is_none() => inner.clone(),
        _ => raw,
    };
    let element: WdaElement =
        serde_json::from_value(element).context("WDA source has an unexpected shape")?;

    let mut root = convert(element);
    root.renumber(0);
    Ok(root)
}

fn convert(el: WdaElement) -> UiNode {
    let bounds = el
        .rect
        .map(|r| {
            let x1 = r.x.round() as i32;
            let y1 = r.y.round() as i32;
            Bounds::new(x1, y1, (r.x + r.width).round() as i32, (r.y + r.height).round() as i32)
        })
        .unwrap_or_default();

    let enabled = match el.enabled {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::String(s)) => s != "false" && s != "0",
        Some(serde_json::Value::Number(n)) => n.as_i64() != Some(0),
        _ => true,
    };
    let value = match el.value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    };
    let text = el
        .label
        .clone()
        .filter(|s| !s.is_empty())
        .or(value)
        .unwrap_or_default();
    let clickable = enabled && TAPPABLE_TYPES.contains(&el.element_type.as_str());

    UiNode {
        resource_id: el
            .raw_identifier
            .filter(|s| !s.is_empty())
            .or_else(|| el.name.clone())
            .unwrap_or_default(),
        content_description: el.name.unwrap_or_default(),
        class_name: el.element_type,
        text,
        bounds,
        clickable,
        enabled,
        traversal_index: 0,
        children: el.children.into_iter().map(convert).collect(),
    }
}
