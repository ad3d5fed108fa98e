//! Independent overlay signals.
//!
//! Each evaluator looks at one node and returns a contribution when its
//! signal fires. The detector runs them in [`EVALUATORS`] order and sums the
//! results; later evaluators may read which earlier ones fired.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::DetectorConfig;
use crate::keywords;
use crate::tree::{FlatNode, ScreenGeometry, TreeIndex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupSignal {
    /// Class name contains a dialog/modal/alert/sheet keyword.
    DialogClass,
    /// Resource id contains a dialog/overlay/mask keyword.
    DialogId,
    /// Resource id names an ad/interstitial/reward surface.
    AdId,
    /// A close control is somewhere in the subtree.
    CloseDescendant,
    /// Near full-screen node with a close control in the top-right corner.
    FullScreenDismiss,
    Centered,
    /// Area between the configured band limits.
    AreaBand,
    /// Later half of document order.
    OnTop,
    /// A full-screen dimming layer precedes the node.
    MaskLayer,
}

/// Read-only view of one node during scoring.
pub struct SignalContext<'t, 'a> {
    pub index: &'t TreeIndex<'a>,
    pub flat: &'t FlatNode<'a>,
    pub geometry: ScreenGeometry,
    pub config: &'t DetectorConfig,
    pub area_ratio: f64,
    /// `close_flags[p]` is true when the node at position `p` looks like a close control.
    pub close_flags: &'t [bool],
}

/// What has fired so far for the current node.
#[derive(Debug, Default)]
pub struct SignalState {
    pub fired: BTreeSet<PopupSignal>,
    pub strong: bool,
}

pub type Evaluator = fn(&SignalContext, &SignalState) -> Option<f64>;

/// Keyword signals first: the positional ones weigh more once a strong signal fired.
pub const EVALUATORS: &[(PopupSignal, Evaluator)] = &[
    (PopupSignal::DialogClass, dialog_class),
    (PopupSignal::DialogId, dialog_id),
    (PopupSignal::AdId, ad_id),
    (PopupSignal::CloseDescendant, close_descendant),
    (PopupSignal::FullScreenDismiss, full_screen_dismiss),
    (PopupSignal::Centered, centered),
    (PopupSignal::AreaBand, area_band),
    (PopupSignal::OnTop, on_top),
    (PopupSignal::MaskLayer, mask_layer),
];

fn dialog_class(ctx: &SignalContext, _: &SignalState) -> Option<f64> {
    keywords::contains_any(&ctx.flat.node.class_name, keywords::DIALOG_CLASS_KEYWORDS)
        .then_some(ctx.config.weights.dialog_class)
}

fn dialog_id(ctx: &SignalContext, _: &SignalState) -> Option<f64> {
    keywords::contains_any(&ctx.flat.node.resource_id, keywords::DIALOG_ID_KEYWORDS)
        .then_some(ctx.config.weights.dialog_id)
}

fn ad_id(ctx: &SignalContext, _: &SignalState) -> Option<f64> {
    keywords::is_ad_id(&ctx.flat.node.resource_id).then_some(ctx.config.weights.ad_id)
}

fn close_descendant(ctx: &SignalContext, _: &SignalState) -> Option<f64> {
    ctx.index
        .descendants(ctx.flat.position)
        .iter()
        .any(|d| ctx.close_flags[d.position])
        .then_some(ctx.config.weights.close_descendant)
}

fn full_screen_dismiss(ctx: &SignalContext, _: &SignalState) -> Option<f64> {
    if ctx.area_ratio <= ctx.config.max_area_ratio {
        return None;
    }
    let zone = ctx.config.corner_zone_ratio;
    let min_x = ctx.geometry.width as f64 * (1.0 - zone);
    let max_y = ctx.geometry.height as f64 * zone;
    ctx.index
        .descendants(ctx.flat.position)
        .iter()
        .filter(|d| ctx.close_flags[d.position])
        .any(|d| {
            let (cx, cy) = d.node.bounds.center();
            cx as f64 >= min_x && cy as f64 <= max_y
        })
        .then_some(ctx.config.weights.full_screen_dismiss)
}

fn centered(ctx: &SignalContext, state: &SignalState) -> Option<f64> {
    let (cx, cy) = ctx.flat.node.bounds.center();
    let w = ctx.geometry.width as f64;
    let h = ctx.geometry.height as f64;
    let dx = (cx as f64 - w / 2.0).abs();
    let dy = (cy as f64 - h / 2.0).abs();
    if dx >= w * ctx.config.center_tolerance_x || dy >= h * ctx.config.center_tolerance_y {
        return None;
    }
    let weights = &ctx.config.weights;
    Some(if state.strong {
        weights.centered_strong
    } else {
        weights.centered_weak
    })
}

fn area_band(ctx: &SignalContext, state: &SignalState) -> Option<f64> {
    let cfg = ctx.config;
    if ctx.area_ratio < cfg.area_band_min || ctx.area_ratio > cfg.area_band_max {
        return None;
    }
    Some(if state.strong {
        cfg.weights.area_band_strong
    } else {
        cfg.weights.area_band_weak
    })
}

fn on_top(ctx: &SignalContext, _: &SignalState) -> Option<f64> {
    (ctx.flat.position * 2 >= ctx.index.len()).then_some(ctx.config.weights.on_top)
}

fn mask_layer(ctx: &SignalContext, _: &SignalState) -> Option<f64> {
    let position = ctx.flat.position;
    ctx.index
        .preceding(position)
        .iter()
        .filter(|p| !ctx.index.is_ancestor(p.position, position))
        .any(|p| {
            let node = p.node;
            node.is_leaf()
                && node.text.trim().is_empty()
                && node.content_description.trim().is_empty()
                && ctx.geometry.area_ratio(&node.bounds) > ctx.config.max_area_ratio
        })
        .then_some(ctx.config.weights.mask_layer)
}

/// Runs every evaluator in order against one node.
pub fn evaluate(ctx: &SignalContext) -> (f64, SignalState) {
    let mut state = SignalState::default();
    let mut score = 0.0;
    for (signal, evaluator) in EVALUATORS {
        if let Some(contribution) = evaluator(ctx, &state) {
            score += contribution;
            state.fired.insert(*signal);
            if ctx.config.strong_signals.contains(signal) {
                state.strong = true;
            }
        }
    }
    (score, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::test_support::*;

    const SCREEN: ScreenGeometry = ScreenGeometry {
        width: 1080,
        height: 2400,
    };

    fn run(root: &crate::tree::UiNode, position: usize) -> (f64, SignalState) {
        let config = DetectorConfig::default();
        let index = TreeIndex::build(root);
        let flags: Vec<bool> = index
            .iter()
            .map(|f| {
                keywords::is_close_text(&f.node.text) || keywords::is_close_id(&f.node.resource_id)
            })
            .collect();
        let flat = index.get(position).unwrap();
        let ctx = SignalContext {
            index: &index,
            flat,
            geometry: SCREEN,
            config: &config,
            area_ratio: SCREEN.area_ratio(&flat.node.bounds),
            close_flags: &flags,
        };
        evaluate(&ctx)
    }

    #[test]
    fn centering_alone_is_weak() {
        let root = numbered(with_children(
            node("FrameLayout", [0, 0, 1080, 2400]),
            vec![node("LinearLayout", [240, 900, 840, 1500])],
        ));
        let (score, state) = run(&root, 1);
        assert!(state.fired.contains(&PopupSignal::Centered));
        assert!(!state.strong);
        // weak centering + on top, area ratio ~0.14 misses the band
        assert!((score - 0.2).abs() < 1e-9, "score {score}");
    }

    #[test]
    fn keyword_upgrades_positional_signals() {
        let root = numbered(with_children(
            node("FrameLayout", [0, 0, 1080, 2400]),
            vec![node("android.app.Dialog", [108, 600, 972, 1800])],
        ));
        let (score, state) = run(&root, 1);
        assert!(state.strong);
        // 0.5 class + 0.2 centered + 0.15 band + 0.1 on top
        assert!((score - 0.95).abs() < 1e-9, "score {score}");
    }

    #[test]
    fn mask_layer_must_precede_and_not_be_an_ancestor() {
        let mut close = node("ImageView", [900, 700, 960, 760]);
        close.resource_id = "iv_close".into();
        let root = numbered(with_children(
            node("FrameLayout", [0, 0, 1080, 2400]),
            vec![
                node("View", [0, 60, 1080, 2400]),
                with_children(node("LinearLayout", [140, 650, 940, 1700]), vec![close]),
            ],
        ));
        let (_, state) = run(&root, 2);
        assert!(state.fired.contains(&PopupSignal::MaskLayer));
        assert!(state.fired.contains(&PopupSignal::CloseDescendant));

        // the root covers the screen but is an ancestor, not a mask
        let (_, root_state) = run(&root, 1);
        assert!(!root_state.fired.contains(&PopupSignal::MaskLayer));
    }

    #[test]
    fn full_screen_dismiss_needs_top_right_close() {
        let mut close = node("ImageView", [980, 80, 1060, 160]);
        close.text = "×".into();
        let ad = numbered(with_children(
            node("FrameLayout", [0, 0, 1080, 2400]),
            vec![with_children(node("FrameLayout", [0, 60, 1080, 2400]), vec![close])],
        ));
        let (_, state) = run(&ad, 1);
        assert!(state.fired.contains(&PopupSignal::FullScreenDismiss));
        assert!(state.strong);

        let mut low_close = node("ImageView", [980, 1200, 1060, 1280]);
        low_close.text = "×".into();
        let page = numbered(with_children(
            node("FrameLayout", [0, 0, 1080, 2400]),
            vec![with_children(node("FrameLayout", [0, 60, 1080, 2400]), vec![low_close])],
        ));
        let (_, state) = run(&page, 1);
        assert!(!state.fired.contains(&PopupSignal::FullScreenDismiss));
        assert!(state.fired.contains(&PopupSignal::CloseDescendant));
    }
}
