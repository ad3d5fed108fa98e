//! # Popup Resolver
//!
//! Decides whether a transient overlay (ad, permission prompt, promo dialog)
//! covers a mobile screen and, if so, where to tap to dismiss it.
//!
//! ## Pipeline
//! 1. [`detector::PopupDetector`] scores every UI tree node as an overlay region.
//! 2. [`ranker::CloseRanker`] ranks dismiss controls inside/around that region.
//! 3. [`matcher::TemplateMatcher`] searches the screenshot for known close icons
//!    from a [`library::TemplateLibrary`] when the tree yields nothing.
//! 4. [`resolver::PopupResolver`] runs the tiers in order and returns a single
//!    [`resolver::ResolutionResult`].
//!
//! Taps, device connections and screenshot capture belong to the caller.

pub mod config;
pub mod coords;
pub mod detector;
pub mod error;
pub mod keywords;
pub mod library;
pub mod matcher;
pub mod platform;
pub mod ranker;
pub mod resolver;
pub mod tree;

pub use config::ResolverConfig;
pub use error::ResolveError;
pub use library::TemplateLibrary;
pub use resolver::{PopupResolver, ResolutionResult, ResolutionStatus, Screenshot};
pub use tree::{Bounds, ScreenGeometry, UiNode};
