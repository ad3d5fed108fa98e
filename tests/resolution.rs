use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

use popup_resolver::config::{DetectorConfig, MatchConfig, RankerConfig};
use popup_resolver::coords::{self, CaptureFrame};
use popup_resolver::detector::PopupDetector;
use popup_resolver::library::DEFAULT_CATEGORY;
use popup_resolver::matcher::{MatchHit, TemplateMatcher, nms};
use popup_resolver::platform::AndroidSnapshot;
use popup_resolver::ranker::{CloseMatch, CloseRanker};
use popup_resolver::tree::android;
use popup_resolver::{
    Bounds, PopupResolver, ResolutionStatus, ResolverConfig, ScreenGeometry, Screenshot,
    TemplateLibrary, UiNode,
};

const SCREEN: ScreenGeometry = ScreenGeometry {
    width: 1080,
    height: 2400,
};

fn node(class: &str, b: [i32; 4], children: Vec<UiNode>) -> UiNode {
    UiNode {
        class_name: class.to_string(),
        bounds: Bounds::new(b[0], b[1], b[2], b[3]),
        enabled: true,
        children,
        ..Default::default()
    }
}

fn screen(children: Vec<UiNode>) -> UiNode {
    let mut root = node("android.widget.FrameLayout", [0, 0, 1080, 2400], children);
    root.renumber(0);
    root
}

/// Dark ring with an X inside on a light square.
fn close_icon(size: u32) -> GrayImage {
    let c = size as f32 / 2.0;
    GrayImage::from_fn(size, size, |x, y| {
        let (dx, dy) = (x as f32 + 0.5 - c, y as f32 + 0.5 - c);
        let r = (dx * dx + dy * dy).sqrt();
        let on_cross = (dx - dy).abs() < 3.0 || (dx + dy).abs() < 3.0;
        let on_ring = (r - c * 0.8).abs() < 2.5;
        Luma([if (on_cross && r < c * 0.6) || on_ring { 25 } else { 240 }])
    })
}

fn screenshot_with(icon: &GrayImage, w: u32, h: u32, at: (i64, i64)) -> GrayImage {
    let mut img = GrayImage::from_pixel(w, h, Luma([150]));
    // toolbar
    for y in 60..200.min(h) {
        for x in 0..w {
            img.put_pixel(x, y, Luma([60]));
        }
    }
    imageops::replace(&mut img, icon, at.0, at.1);
    img
}

fn library_with_icon() -> (tempfile::TempDir, TemplateLibrary) {
    let dir = tempfile::tempdir().unwrap();
    let mut lib = TemplateLibrary::new(dir.path());
    lib.add(&DynamicImage::ImageLuma8(close_icon(60)), "x_ring", DEFAULT_CATEGORY)
        .unwrap();
    (dir, lib)
}

#[test]
fn scenario_a_centered_dialog_is_detected() {
    // 864 x 1200 is 40% of the screen
    let tree = screen(vec![
        node("androidx.recyclerview.widget.RecyclerView", [0, 200, 1080, 2200], vec![]),
        node("com.shop.ui.CouponDialog", [108, 600, 972, 1800], vec![]),
    ]);
    let found = PopupDetector::new(DetectorConfig::default())
        .detect(&tree, SCREEN)
        .expect("dialog region");
    assert_eq!(found.rect, Bounds::new(108, 600, 972, 1800));
    assert!((SCREEN.area_ratio(&found.rect) - 0.4).abs() < 1e-9);
    assert!(found.confidence >= 0.7);

    // no close control: the pass goes on past the ranker and ends unresolved
    let dir = tempfile::tempdir().unwrap();
    let mut lib = TemplateLibrary::new(dir.path());
    let result = PopupResolver::new(ResolverConfig::default())
        .resolve(&tree, SCREEN, None, &mut lib)
        .unwrap();
    assert_eq!(result.status, ResolutionStatus::Unresolved);
    assert_eq!(result.popup, Some(found.rect));
}

const RATE_US_DUMP: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" content-desc="" clickable="false" enabled="true" bounds="[0,0][1080,2400]">
    <node index="0" text="" resource-id="com.app:id/feed" class="androidx.recyclerview.widget.RecyclerView" content-desc="" clickable="false" enabled="true" bounds="[0,200][1080,2200]" />
    <node index="1" text="" resource-id="" class="android.app.Dialog" content-desc="" clickable="false" enabled="true" bounds="[60,200][1040,1600]">
      <node index="0" text="Rate us" resource-id="com.app:id/title" class="android.widget.TextView" content-desc="" clickable="false" enabled="true" bounds="[120,260][980,400]" />
      <node index="1" text="OK" resource-id="com.app:id/ok" class="android.widget.Button" content-desc="" clickable="true" enabled="true" bounds="[480,1480][600,1560]" />
    </node>
    <node index="2" text="&#215;" resource-id="btn_close" class="android.widget.TextView" content-desc="" clickable="true" enabled="true" bounds="[1000,40][1060,100]" />
  </node>
</hierarchy>"#;

#[test]
fn scenario_b_close_glyph_above_dialog_wins() {
    let tree = android::parse_hierarchy(RATE_US_DUMP).unwrap();
    let region = PopupDetector::new(DetectorConfig::default())
        .detect(&tree, SCREEN)
        .expect("dialog region");
    assert_eq!(region.rect, Bounds::new(60, 200, 1040, 1600));

    let ranked = CloseRanker::new(RankerConfig::default()).rank(&tree, SCREEN, Some(&region.rect));
    let top = &ranked[0];
    assert_eq!(top.point, (1030, 70));
    assert_eq!(top.match_type, CloseMatch::ExactText);
    assert!(top.score >= 15.0 + 2.0, "score {}", top.score);
    let ok = ranked.iter().find(|c| c.label == "OK").expect("ok button ranked");
    assert_eq!(ok.match_type, CloseMatch::SmallClickable);
    assert!(ok.score < top.score);

    let dir = tempfile::tempdir().unwrap();
    let mut lib = TemplateLibrary::new(dir.path());
    let result = PopupResolver::new(ResolverConfig::default())
        .resolve(&tree, SCREEN, None, &mut lib)
        .unwrap();
    assert_eq!(result.status, ResolutionStatus::ResolvedByTree);
    let target = result.target.unwrap();
    assert_eq!((target.x, target.y), (1030, 70));
    assert_eq!(coords::to_pixel(target.x_percent, target.y_percent, 1080, 2400), (1030, 70));
}

#[test]
fn scenario_c_embedded_icon_is_found_once() {
    let (_dir, mut lib) = library_with_icon();
    let shot = screenshot_with(&close_icon(60), 1080, 2400, (500, 500));
    let matcher = TemplateMatcher::new(MatchConfig::default());

    let hits = matcher.find(&shot, &mut lib, DEFAULT_CATEGORY, 0.75).unwrap();
    assert_eq!(hits.len(), 1, "{hits:?}");
    let hit = &hits[0];
    assert!(hit.confidence >= 0.95);
    assert!(hit.x.abs_diff(530) <= 2 && hit.y.abs_diff(530) <= 2, "{hit:?}");
    assert_eq!(hit.scale, 1.0);
    assert_eq!((hit.width, hit.height), (60, 60));
}

#[test]
fn every_icon_on_a_crowded_screen_is_found() {
    let (_dir, mut lib) = library_with_icon();
    let icon = close_icon(60);
    let mut shot = screenshot_with(&icon, 1080, 2400, (-100, -100));
    let mut expected = Vec::new();
    for row in 0..8u32 {
        for col in 0..5u32 {
            let (x, y) = (40 + col * 200 + col * 7, 240 + row * 260 + row * 3);
            imageops::replace(&mut shot, &icon, x as i64, y as i64);
            expected.push((x + 30, y + 30));
        }
    }

    let hits = TemplateMatcher::new(MatchConfig::default())
        .find(&shot, &mut lib, DEFAULT_CATEGORY, 0.75)
        .unwrap();
    assert_eq!(hits.len(), expected.len(), "{hits:?}");
    for (x, y) in expected {
        assert!(
            hits.iter()
                .any(|h| h.x.abs_diff(x) <= 2 && h.y.abs_diff(y) <= 2 && h.confidence >= 0.95),
            "no hit at ({x}, {y})"
        );
    }
}

#[test]
fn scenario_d_cross_template_duplicates_collapse() {
    let hit = |name: &str, confidence: f32| MatchHit {
        x: 530,
        y: 530,
        width: 60,
        height: 60,
        scale: 1.0,
        confidence,
        template_name: name.to_string(),
    };
    let hits = vec![hit("close_buttons/thin", 0.81), hit("close_buttons/x_ring", 0.97)];
    let kept = nms::suppress_duplicates(hits, 0.3);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].template_name, "close_buttons/x_ring");

    // same thing end to end with a second, slightly different template
    let (_dir, mut lib) = library_with_icon();
    let base = close_icon(60);
    let framed = GrayImage::from_fn(60, 60, |x, y| {
        let v = base.get_pixel(x, y)[0];
        let edge = x < 3 || y < 3 || x > 56 || y > 56;
        Luma([if edge { 25 } else { v }])
    });
    lib.add(&DynamicImage::ImageLuma8(framed), "x_framed", DEFAULT_CATEGORY).unwrap();
    let shot = screenshot_with(&close_icon(60), 1080, 2400, (500, 500));
    let hits = TemplateMatcher::new(MatchConfig::default())
        .find(&shot, &mut lib, DEFAULT_CATEGORY, 0.75)
        .unwrap();
    assert_eq!(hits.len(), 1, "{hits:?}");
    assert_eq!(hits[0].template_name, "close_buttons/x_ring");
}

#[test]
fn scenario_e_empty_category_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut lib = TemplateLibrary::new(dir.path());
    let shot = screenshot_with(&close_icon(60), 1080, 2400, (500, 500));
    let hits = TemplateMatcher::new(MatchConfig::default())
        .find(&shot, &mut lib, "never_created", 0.75)
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn template_tier_resolves_when_the_tree_is_silent() {
    let (_dir, mut lib) = library_with_icon();
    let shot = Screenshot::from_image(DynamicImage::ImageLuma8(screenshot_with(
        &close_icon(60),
        1080,
        2400,
        (500, 500),
    )));
    let tree = screen(vec![node("android.webkit.WebView", [0, 200, 1080, 2400], vec![])]);

    let result = PopupResolver::new(ResolverConfig::default())
        .resolve(&tree, SCREEN, Some(&shot), &mut lib)
        .unwrap();
    assert_eq!(result.status, ResolutionStatus::ResolvedByTemplate);
    assert!(result.method.starts_with("template:close_buttons/x_ring@"), "{}", result.method);
    assert!(result.confidence >= 0.95);
    let target = result.target.unwrap();
    assert!((target.x - 530).abs() <= 2 && (target.y - 530).abs() <= 2);
}

#[test]
fn template_hits_are_mapped_back_to_device_space() {
    let (_dir, mut lib) = library_with_icon();
    let resolver = PopupResolver::new(ResolverConfig::default());
    let tree = screen(vec![]);

    // a 300x300 crop taken at (400, 400)
    let crop = screenshot_with(&close_icon(60), 300, 300, (100, 100));
    let shot = Screenshot::from_image(DynamicImage::ImageLuma8(crop)).with_crop_offset(400, 400);
    let result = resolver.resolve(&tree, SCREEN, Some(&shot), &mut lib).unwrap();
    let target = result.target.expect("cropped hit");
    assert!((target.x - 530).abs() <= 2 && (target.y - 530).abs() <= 2, "{target:?}");

    // a half-resolution capture
    let small_icon = imageops::resize(&close_icon(60), 30, 30, FilterType::Triangle);
    let half = screenshot_with(&small_icon, 540, 1200, (250, 250));
    let shot = Screenshot::from_image(DynamicImage::ImageLuma8(half));
    let result = resolver.resolve(&tree, SCREEN, Some(&shot), &mut lib).unwrap();
    assert_eq!(result.status, ResolutionStatus::ResolvedByTemplate);
    assert!(result.method.ends_with("@0.5"), "{}", result.method);
    let target = result.target.unwrap();
    assert!((target.x - 530).abs() <= 3 && (target.y - 530).abs() <= 3, "{target:?}");
}

#[test]
fn trees_without_evidence_resolve_to_no_popup() {
    let dir = tempfile::tempdir().unwrap();
    let mut lib = TemplateLibrary::new(dir.path());
    let resolver = PopupResolver::new(ResolverConfig::default());
    let detector = PopupDetector::new(DetectorConfig::default());

    let trees = [
        screen(vec![]),
        screen(vec![node("android.widget.ScrollView", [0, 200, 1080, 2200], vec![])]),
        screen(vec![
            node("android.widget.Toolbar", [0, 60, 1080, 200], vec![]),
            node(
                "android.widget.LinearLayout",
                [0, 200, 1080, 2100],
                vec![
                    node("android.widget.Button", [100, 300, 500, 400], vec![]),
                    node("android.widget.ImageView", [0, 500, 1080, 1100], vec![]),
                ],
            ),
            node("android.widget.LinearLayout", [0, 2100, 1080, 2400], vec![]),
        ]),
    ];
    for tree in &trees {
        assert!(detector.candidates(tree, SCREEN).is_empty());
        let result = resolver.resolve(tree, SCREEN, None, &mut lib).unwrap();
        assert_eq!(result.status, ResolutionStatus::NoPopup);
        assert_eq!(result.confidence, 0.0);
    }
}

#[test]
fn overflowing_bounds_in_a_dump_resolve_quietly() {
    let xml = r#"<hierarchy rotation="0">
  <node index="0" text="" class="android.widget.FrameLayout" clickable="false" enabled="true" bounds="[-2000000000,0][2000000000,2400]">
    <node index="0" text="" class="android.view.View" clickable="false" enabled="true" bounds="[-2147483648,-2147483648][2147483647,2147483647]" />
    <node index="1" text="Welcome" class="android.widget.TextView" clickable="false" enabled="true" bounds="[2147483000,2147483000][2147483647,2147483647]" />
  </node>
</hierarchy>"#;
    let source = AndroidSnapshot {
        hierarchy_xml: xml.to_string(),
        geometry: SCREEN,
        screenshot: None,
    };
    let dir = tempfile::tempdir().unwrap();
    let mut lib = TemplateLibrary::new(dir.path());
    let result = PopupResolver::new(ResolverConfig::default())
        .resolve_source(&source, &mut lib)
        .unwrap();
    assert!(!result.is_resolved(), "{result:?}");
    assert!(result.target.is_none());
    assert!(matches!(
        result.status,
        ResolutionStatus::NoPopup | ResolutionStatus::Unresolved
    ));
}

#[test]
fn near_full_screen_nodes_need_a_strong_signal() {
    let config = DetectorConfig::default();
    let detector = PopupDetector::new(config.clone());
    let classes = ["android.view.View", "android.widget.ScrollView", "android.widget.FrameLayout"];

    for (i, class) in classes.iter().enumerate() {
        // dimming layer, then a near full-screen container with a close text low on the page
        let mut close = node("android.widget.TextView", [400, 2000, 680, 2100], vec![]);
        close.text = "Close".into();
        let top = 60 + i as i32 * 10;
        let tree = screen(vec![
            node("android.view.View", [0, top, 1080, 2400], vec![]),
            node(class, [0, top, 1080, 2400], vec![close]),
        ]);
        for c in detector.candidates(&tree, SCREEN) {
            let big = SCREEN.area_ratio(&c.rect) > config.max_area_ratio;
            assert!(
                !big || c.signals.iter().any(|s| config.strong_signals.contains(s)),
                "{c:?}"
            );
        }
    }
}

#[test]
fn reconcile_adds_offsets_verbatim() {
    let frame = CaptureFrame {
        displayed: (1080, 2400),
        crop_offset: (5, 10),
        original: (1080, 2400),
    };
    for (x, y) in [(0.0, 0.0), (17.0, 1999.0), (1075.0, 2390.0)] {
        assert_eq!(coords::reconcile(x, y, &frame), (x + 5.0, y + 10.0));
    }
}
