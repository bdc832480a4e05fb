//! Known identities: reference descriptors and their display names.
//!
//! The identity store is a directory of reference images (one face each, the
//! file stem is the label) plus a JSON list of `{id, name}` records mapping
//! labels to display names. Both are replaced wholesale on reload.

use crate::provider::EmbeddingProvider;
use crate::types::{Descriptor, Frame};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Display name for a label that has no entry in the identity map.
pub const UNREGISTERED_NAME: &str = "UNREGISTERED";

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("cannot read identity store {path}: {source}")]
    ReadDir {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot read identity map {path}: {source}")]
    ReadMap {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed identity map {path}: {source}")]
    ParseMap {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub label: String,
    pub descriptor: Descriptor,
}

/// The loaded set of known descriptors. Labels may repeat (several images
/// of one person); all descriptors share one dimensionality.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    /// Build a gallery from already-computed entries, dropping any whose
    /// dimensionality differs from the first one.
    pub fn new(entries: Vec<GalleryEntry>) -> Self {
        let mut gallery = Self::default();
        for entry in entries {
            gallery.push(entry);
        }
        gallery
    }

    /// Load every image in `dir` and describe it with `provider`.
    ///
    /// Files are visited in name order. Undecodable images and images without
    /// a face are skipped and logged; only an unreadable directory is an error.
    pub fn load(dir: &Path, provider: &mut dyn EmbeddingProvider) -> Result<Self, GalleryError> {
        let read_dir = std::fs::read_dir(dir).map_err(|source| GalleryError::ReadDir {
            path: dir.display().to_string(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image_file(p))
            .collect();
        paths.sort();

        let mut gallery = Self::default();
        for path in paths {
            let Some(label) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let image = match image::open(&path) {
                Ok(img) => Frame::from_rgb(&img.to_rgb8(), 0),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping undecodable gallery image");
                    continue;
                }
            };

            match provider.describe(&path, &image) {
                Ok(Some(descriptor)) => gallery.push(GalleryEntry { label, descriptor }),
                Ok(None) => {
                    tracing::warn!(path = %path.display(), "skipping gallery image with no face");
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping gallery image");
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            entries = gallery.len(),
            dimension = ?gallery.dimension(),
            "gallery loaded"
        );
        Ok(gallery)
    }

    fn push(&mut self, entry: GalleryEntry) {
        if let Some(dim) = self.dimension() {
            if entry.descriptor.len() != dim {
                tracing::warn!(
                    label = %entry.label,
                    expected = dim,
                    actual = entry.descriptor.len(),
                    "skipping gallery entry with mismatched descriptor length"
                );
                return;
            }
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptor length shared by all entries.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.descriptor.len())
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct IdentityRecord {
    id: String,
    name: String,
}

/// Label → display name.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    names: HashMap<String, String>,
}

impl IdentityMap {
    /// Read the `[{"id": .., "name": ..}]` file. A missing file is an empty map.
    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "identity map not found; all labels unregistered");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| GalleryError::ReadMap {
            path: path.display().to_string(),
            source,
        })?;
        let records: Vec<IdentityRecord> =
            serde_json::from_str(&raw).map_err(|source| GalleryError::ParseMap {
                path: path.display().to_string(),
                source,
            })?;

        let map = Self::from_pairs(records.into_iter().map(|r| (r.id, r.name)));
        tracing::info!(path = %path.display(), names = map.len(), "identity map loaded");
        Ok(map)
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            names: pairs.into_iter().collect(),
        }
    }

    pub fn display_name<'a>(&'a self, label: &str) -> &'a str {
        self.names
            .get(label)
            .map(String::as_str)
            .unwrap_or(UNREGISTERED_NAME)
    }

    /// Key under which a label's attendance and captures are tracked: the
    /// display name, or `UNREGISTERED (label)` for unmapped labels so that
    /// distinct unregistered people stay apart.
    pub fn attendance_key(&self, label: &str) -> String {
        match self.names.get(label) {
            Some(name) => name.clone(),
            None => format!("{UNREGISTERED_NAME} ({label})"),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Location of the reference images and the name map on disk.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    pub faces_dir: PathBuf,
    pub names_file: PathBuf,
}

impl IdentityStore {
    pub fn new(faces_dir: impl Into<PathBuf>, names_file: impl Into<PathBuf>) -> Self {
        Self {
            faces_dir: faces_dir.into(),
            names_file: names_file.into(),
        }
    }

    /// Load a fresh gallery and identity map. Nothing is returned unless both load.
    pub fn load(
        &self,
        provider: &mut dyn EmbeddingProvider,
    ) -> Result<(Gallery, IdentityMap), GalleryError> {
        let names = IdentityMap::load(&self.names_file)?;
        let gallery = Gallery::load(&self.faces_dir, provider)?;
        Ok((gallery, names))
    }
}
