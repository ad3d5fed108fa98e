//! # Template Library
//!
//! Named reference icons on disk, one image file per template, grouped in
//! category subdirectories:
//!
//! ```text
//! <root>/close_buttons/x_circle.png
//! <root>/close_buttons/auto_20261019_101530_123.png
//! ```
//!
//! Templates are decoded to grayscale on first use and cached by
//! `category/name`. Every mutation goes through this type and invalidates the
//! affected cache entry, so one instance per process (or test) stays
//! consistent. Concurrent users must wrap it in their own lock.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use image::{DynamicImage, GrayImage};
use serde::Serialize;

use crate::tree::Bounds;

pub const DEFAULT_CATEGORY: &str = "close_buttons";

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// A decoded reference icon.
#[derive(Clone, Debug)]
pub struct TemplateImage {
    pub name: String,
    pub category: String,
    pub pixels: GrayImage,
    pub path: PathBuf,
}

impl TemplateImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// `category/name`, unique across the library.
    pub fn key(&self) -> String {
        cache_key(&self.category, &self.name)
    }
}

/// Listing entry returned by [`TemplateLibrary::list`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TemplateInfo {
    pub name: String,
    pub category: String,
    pub width: u32,
    pub height: u32,
    pub path: PathBuf,
}

pub struct TemplateLibrary {
    root: PathBuf,
    cache: HashMap<String, Arc<TemplateImage>>,
}

impl TemplateLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    /// `<local data dir>/popup_resolver/templates`, or `./templates` when the
    /// platform has no data directory.
    pub fn default_root() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("popup_resolver").join("templates"))
            .unwrap_or_else(|| PathBuf::from("templates"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// All readable templates of `category`, sorted by name.
    ///
    /// A missing category directory is an empty library. Files that fail to
    /// decode are skipped with a warning.
    pub fn load(&mut self, category: &str) -> anyhow::Result<Vec<Arc<TemplateImage>>> {
        validate_component(category, "category")?;
        let files = self.template_files(category)?;
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(files.len());

        for (name, path) in files {
            let key = cache_key(category, &name);
            if !seen.insert(key.clone()) {
                log::warn!("template {} shadowed by a file with another extension", path.display());
                continue;
            }
            if let Some(hit) = self.cache.get(&key) {
                out.push(Arc::clone(hit));
                continue;
            }
            match image::open(&path) {
                Ok(img) => {
                    let template = Arc::new(TemplateImage {
                        name,
                        category: category.to_string(),
                        pixels: img.to_luma8(),
                        path,
                    });
                    self.cache.insert(key, Arc::clone(&template));
                    out.push(template);
                }
                Err(e) => log::warn!("skipping unreadable template {}: {}", path.display(), e),
            }
        }

        // Files removed behind our back must not linger in the cache.
        let prefix = format!("{category}/");
        self.cache.retain(|k, _| !k.starts_with(&prefix) || seen.contains(k));
        Ok(out)
    }

    /// Saves `image` as `<category>/<name>.png`, replacing any existing template.
    pub fn add(&mut self, image: &DynamicImage, name: &str, category: &str) -> anyhow::Result<PathBuf> {
        validate_component(name, "template name")?;
        validate_component(category, "category")?;
        if image.width() == 0 || image.height() == 0 {
            bail!("template image is empty");
        }

        let dir = self.root.join(category);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating template directory {}", dir.display()))?;
        // Drop same-named files in other formats so the name stays unique.
        for ext in EXTENSIONS.iter().filter(|e| **e != "png") {
            let stale = dir.join(format!("{name}.{ext}"));
            if stale.exists() {
                std::fs::remove_file(&stale)
                    .with_context(|| format!("removing {}", stale.display()))?;
            }
        }

        let path = dir.join(format!("{name}.png"));
        image
            .save(&path)
            .with_context(|| format!("saving template {}", path.display()))?;
        self.cache.remove(&cache_key(category, name));
        log::info!("template saved: {}", path.display());
        Ok(path)
    }

    /// Crops `rect` (screenshot pixels) out of `screenshot` and adds it.
    pub fn add_from_crop(
        &mut self,
        screenshot: &DynamicImage,
        rect: Bounds,
        name: &str,
        category: &str,
    ) -> anyhow::Result<PathBuf> {
        let (w, h) = (screenshot.width() as i32, screenshot.height() as i32);
        let clipped = Bounds::new(
            rect.x1.clamp(0, w),
            rect.y1.clamp(0, h),
            rect.x2.clamp(0, w),
            rect.y2.clamp(0, h),
        );
        if clipped.is_empty() {
            bail!("crop {} lies outside the {}x{} screenshot", rect, w, h);
        }
        let cropped = screenshot.crop_imm(
            clipped.x1 as u32,
            clipped.y1 as u32,
            clipped.width() as u32,
            clipped.height() as u32,
        );
        self.add(&cropped, name, category)
    }

    /// Like [`Self::add_from_crop`] with a generated `auto_<timestamp>` name.
    /// Returns the chosen name.
    pub fn learn_from_crop(
        &mut self,
        screenshot: &DynamicImage,
        rect: Bounds,
        category: &str,
    ) -> anyhow::Result<String> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let mut name = format!("auto_{timestamp}");
        let mut n = 1;
        while self.exists(category, &name) {
            name = format!("auto_{timestamp}_{n}");
            n += 1;
        }
        self.add_from_crop(screenshot, rect, &name, category)?;
        Ok(name)
    }

    /// Removes a template. `name` is either `category/name` or a bare name,
    /// which is removed from every category. Returns whether anything was deleted.
    pub fn delete(&mut self, name: &str) -> anyhow::Result<bool> {
        let (categories, stem) = match name.split_once('/') {
            Some((category, stem)) => (vec![category.to_string()], stem),
            None => (self.categories()?, name),
        };
        validate_component(stem, "template name")?;

        let mut removed = false;
        for category in categories {
            validate_component(&category, "category")?;
            let dir = self.root.join(&category);
            for ext in EXTENSIONS {
                let path = dir.join(format!("{stem}.{ext}"));
                if path.is_file() {
                    std::fs::remove_file(&path)
                        .with_context(|| format!("deleting template {}", path.display()))?;
                    log::info!("template deleted: {}", path.display());
                    removed = true;
                }
            }
            self.cache.remove(&cache_key(&category, stem));
        }
        Ok(removed)
    }

    /// Metadata of every template in `category`, or in all categories.
    pub fn list(&mut self, category: Option<&str>) -> anyhow::Result<Vec<TemplateInfo>> {
        let categories = match category {
            Some(c) => vec![c.to_string()],
            None => self.categories()?,
        };
        let mut out = Vec::new();
        for category in categories {
            out.extend(self.load(&category)?.iter().map(|t| TemplateInfo {
                name: t.name.clone(),
                category: t.category.clone(),
                width: t.width(),
                height: t.height(),
                path: t.path.clone(),
            }));
        }
        Ok(out)
    }

    /// Category subdirectories under the root, sorted.
    pub fn categories(&self) -> anyhow::Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("listing {}", self.root.display()));
            }
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                out.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        out.sort();
        Ok(out)
    }

    fn exists(&self, category: &str, name: &str) -> bool {
        let dir = self.root.join(category);
        EXTENSIONS
            .iter()
            .any(|ext| dir.join(format!("{name}.{ext}")).is_file())
    }

    fn template_files(&self, category: &str) -> anyhow::Result<Vec<(String, PathBuf)>> {
        let dir = self.root.join(category);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                files.push((stem.to_string_lossy().into_owned(), path));
            }
        }
        files.sort();
        Ok(files)
    }
}

fn cache_key(category: &str, name: &str) -> String {
    format!("{category}/{name}")
}

fn validate_component(value: &str, what: &str) -> anyhow::Result<()> {
    if value.trim().is_empty() {
        bail!("{what} must not be empty");
    }
    if value.contains(['/', '\\']) || value == "." || value == ".." {
        bail!("{what} '{value}' must not contain path separators");
    }
    Ok(())
}
