//! # UI Tree Model
//!
//! A platform-neutral snapshot of the accessibility tree. Parsers in
//! [`android`] and [`ios`] build it fresh per call; nothing mutates it after.
//!
//! [`TreeIndex`] flattens a tree once in document order so the detector and
//! ranker can look at ancestors, descendants and preceding siblings without
//! walking the hierarchy again.

pub mod android;
pub mod ios;

use serde::{Deserialize, Serialize};

/// Integer rectangle in device pixels, `x2 >= x1` and `y2 >= y1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Coordinates are clamped to ±this so sizes and midpoints never overflow.
pub const COORD_LIMIT: i32 = 1 << 20;

impl Bounds {
    /// Builds a rectangle, swapping corners given in the wrong order and
    /// clamping each coordinate to ±[`COORD_LIMIT`].
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        let [x1, y1, x2, y2] = [x1, y1, x2, y2].map(|v| v.clamp(-COORD_LIMIT, COORD_LIMIT));
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Parses the uiautomator form `[x1,y1][x2,y2]`.
    pub fn parse(s: &str) -> Option<Self> {
        let nums: Vec<i32> = s
            .split(|c: char| c == '[' || c == ']' || c == ',')
            .filter(|p| !p.trim().is_empty())
            .map(|p| p.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .ok()?;
        match nums.as_slice() {
            [x1, y1, x2, y2] => Some(Self::new(*x1, *y1, *x2, *y2)),
            _ => None,
        }
    }

    pub fn width(&self) -> i32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> i32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn center(&self) -> (i32, i32) {
        let mid = |a: i32, b: i32| ((a as i64 + b as i64) / 2) as i32;
        (mid(self.x1, self.x2), mid(self.y1, self.y2))
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        other.x1 >= self.x1 && other.y1 >= self.y1 && other.x2 <= self.x2 && other.y2 <= self.y2
    }

    /// Grows the rectangle by per-side margins.
    pub fn expand(&self, left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(
            self.x1.saturating_sub(left),
            self.y1.saturating_sub(top),
            self.x2.saturating_add(right),
            self.y2.saturating_add(bottom),
        )
    }

    pub fn union(&self, other: &Bounds) -> Self {
        Self::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}][{},{}]", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Screen size in pixels for the current call. Never cached: orientation can
/// change between calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
}

impl ScreenGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    pub fn rect(&self) -> Bounds {
        Bounds::new(0, 0, self.width as i32, self.height as i32)
    }

    /// Share of the screen covered by `b`, 0 on a degenerate screen.
    pub fn area_ratio(&self, b: &Bounds) -> f64 {
        let screen = self.area();
        if screen <= 0.0 {
            return 0.0;
        }
        b.area() as f64 / screen
    }
}

/// One element of the accessibility tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UiNode {
    pub class_name: String,
    pub resource_id: String,
    pub text: String,
    pub content_description: String,
    pub bounds: Bounds,
    pub clickable: bool,
    pub enabled: bool,
    /// Position in document order; later index is drawn on top.
    pub traversal_index: usize,
    pub children: Vec<UiNode>,
}

impl UiNode {
    /// Assigns pre-order traversal indices to this subtree, starting at `start`.
    /// Returns the next free index.
    pub fn renumber(&mut self, start: usize) -> usize {
        self.traversal_index = start;
        let mut next = start + 1;
        for child in &mut self.children {
            next = child.renumber(next);
        }
        next
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A node seen through the flattened tree.
#[derive(Clone, Copy, Debug)]
pub struct FlatNode<'a> {
    pub node: &'a UiNode,
    /// Position in the flattened pre-order list.
    pub position: usize,
    /// Position of the last descendant (equals `position` for leaves).
    pub subtree_end: usize,
}

/// Pre-order flattening of a [`UiNode`] tree.
pub struct TreeIndex<'a> {
    nodes: Vec<FlatNode<'a>>,
}

impl<'a> TreeIndex<'a> {
    pub fn build(root: &'a UiNode) -> Self {
        let mut nodes = Vec::new();
        Self::visit(root, &mut nodes);
        Self { nodes }
    }

    fn visit(node: &'a UiNode, out: &mut Vec<FlatNode<'a>>) -> usize {
        let position = out.len();
        out.push(FlatNode {
            node,
            position,
            subtree_end: position,
        });
        let mut end = position;
        for child in &node.children {
            end = Self::visit(child, out);
        }
        out[position].subtree_end = end;
        end
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlatNode<'a>> {
        self.nodes.iter()
    }

    pub fn get(&self, position: usize) -> Option<&FlatNode<'a>> {
        self.nodes.get(position)
    }

    pub fn descendants(&self, position: usize) -> &[FlatNode<'a>] {
        match self.nodes.get(position) {
            Some(flat) => &self.nodes[position + 1..=flat.subtree_end],
            None => &[],
        }
    }

    /// Nodes before `position` in document order.
    pub fn preceding(&self, position: usize) -> &[FlatNode<'a>] {
        &self.nodes[..position.min(self.nodes.len())]
    }

    pub fn is_ancestor(&self, ancestor: usize, position: usize) -> bool {
        match self.nodes.get(ancestor) {
            Some(flat) => ancestor < position && position <= flat.subtree_end,
            None => false,
        }
    }
}
