/// Reference gallery: one embedding per resident, loaded once at startup.
///
/// Every regular file in the gallery directory is a candidate image. Files
/// that fail to decode, or that contain no detectable face, are skipped with
/// a warning. Only an empty result aborts startup.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::face::{Embedding, FaceEncoder};

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("gallery directory {path} is not readable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no usable face images found in {0}")]
    Empty(PathBuf),
    #[error("'{0}' is not a valid resident name")]
    InvalidName(String),
}

#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub name: String,
    pub embedding: Embedding,
}

/// Ordered resident → embedding mapping. Names are unique.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGallery {
    entries: Vec<GalleryEntry>,
}

impl ReferenceGallery {
    /// Insert a resident. Returns `false` (and keeps the first entry) when the
    /// name is already present.
    pub fn insert(&mut self, name: String, embedding: Embedding) -> bool {
        if self.entries.iter().any(|e| e.name == name) {
            return false;
        }
        self.entries.push(GalleryEntry { name, embedding });
        true
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

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

/// Display form of a resident name: first letter upper-cased, rest lower.
pub fn display_name(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Where a new reference image for `name` goes: `<dir>/<name>.png`.
///
/// The name must be a single plain file name component.
pub fn reference_image_path(dir: &Path, name: &str) -> Result<PathBuf, GalleryError> {
    let plain = !name.trim().is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && !name.contains("..");
    if !plain {
        return Err(GalleryError::InvalidName(name.to_string()));
    }
    Ok(dir.join(format!("{}.png", name)))
}

/// Build the gallery from `dir`, visiting files in name order.
pub fn load_gallery<E: FaceEncoder + ?Sized>(
    dir: &Path,
    encoder: &mut E,
) -> Result<ReferenceGallery, GalleryError> {
    let unreadable = |source| GalleryError::Unreadable { path: dir.to_path_buf(), source };

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(unreadable)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut gallery = ReferenceGallery::default();
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!("Skipping {}: file name is not valid UTF-8", path.display());
            continue;
        };
        let name = display_name(stem);

        let embedding = match reference_embedding(&path, encoder) {
            Ok(Some(e)) => e,
            Ok(None) => {
                warn!("No face found in {}. Skipping...", path.display());
                continue;
            }
            Err(e) => {
                warn!("Failed to load image {}: {}. Skipping...", path.display(), e);
                continue;
            }
        };

        if !gallery.insert(name.clone(), embedding) {
            warn!("Duplicate resident {} from {}, keeping the first image", name, path.display());
        } else {
            debug!("Loaded resident {} from {}", name, path.display());
        }
    }

    if gallery.is_empty() {
        return Err(GalleryError::Empty(dir.to_path_buf()));
    }
    info!("Loaded {} images for recognition.", gallery.len());
    Ok(gallery)
}

/// First face of a reference image, encoded at full resolution.
fn reference_embedding<E: FaceEncoder + ?Sized>(
    path: &Path,
    encoder: &mut E,
) -> anyhow::Result<Option<Embedding>> {
    let image = image::open(path)?.to_rgb8();
    let boxes = encoder.detect(&image)?;
    let Some(first) = boxes.first() else {
        return Ok(None);
    };
    if boxes.len() > 1 {
        debug!("{} faces in {}, using the first", boxes.len(), path.display());
    }
    Ok(encoder.encode(&image, std::slice::from_ref(first))?.into_iter().next())
}
