//! Uploaded image storage.
//!
//! Images are stored content-addressed with git-style 2-char sharding and
//! served back to clients under [`PUBLIC_PREFIX`].
//!
//! Layout: `<root>/<first 2 hex chars>/<remaining 62 hex chars>.<ext>`

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::vision::EncodedImage;

/// URL prefix under which stored images are served.
pub const PUBLIC_PREFIX: &str = "/images";

/// Errors from asset operations.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("invalid asset reference: {0}")]
    InvalidRef(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AssetResult<T> = std::result::Result<T, AssetError>;

/// Public URL path of a stored image, e.g. `/images/ab/cdef….jpeg`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRef(String);

impl AssetRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Split a ref into its shard directory and file name, rejecting anything
    /// that could escape the store root.
    fn components(&self) -> AssetResult<(&str, &str)> {
        let invalid = || AssetError::InvalidRef(self.0.clone());

        let rest = self
            .0
            .strip_prefix(PUBLIC_PREFIX)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(invalid)?;
        let (shard, file) = rest.split_once('/').ok_or_else(invalid)?;
        let (stem, ext) = file.split_once('.').ok_or_else(invalid)?;

        let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit());
        if shard.len() != 2 || !is_hex(shard) || stem.len() != 62 || !is_hex(stem) {
            return Err(invalid());
        }
        if media_type_for_extension(ext).is_none() {
            return Err(invalid());
        }
        Ok((shard, file))
    }
}

impl From<&str> for AssetRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssetRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetRef({})", self.0)
    }
}

/// Persistent storage for submitted images.
///
/// Blocking; async callers go through `spawn_blocking`.
pub trait AssetStore: Send + Sync {
    /// Store an image and return its public reference. Storing the same
    /// bytes twice yields the same reference.
    fn put(&self, image: &EncodedImage) -> AssetResult<AssetRef>;

    /// Load a previously stored image.
    fn get(&self, asset: &AssetRef) -> AssetResult<EncodedImage>;
}

fn extension_for(media_type: &str) -> Option<&'static str> {
    match media_type {
        "image/jpeg" => Some("jpeg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Filesystem-backed [`AssetStore`].
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> AssetResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetStore for FsAssetStore {
    fn put(&self, image: &EncodedImage) -> AssetResult<AssetRef> {
        let ext = extension_for(&image.media_type)
            .ok_or_else(|| AssetError::UnsupportedMediaType(image.media_type.clone()))?;
        let bytes = image.decode().map_err(|e| {
            AssetError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
        })?;
        let hex = hex::encode(Sha256::digest(&bytes));
        let (shard, stem) = hex.split_at(2);
        let file = format!("{stem}.{ext}");
        let asset = AssetRef(format!("{PUBLIC_PREFIX}/{shard}/{file}"));

        let shard_dir = self.root.join(shard);
        let path = shard_dir.join(&file);
        if path.exists() {
            return Ok(asset);
        }

        fs::create_dir_all(&shard_dir)?;
        let mut tmp = NamedTempFile::new_in(&shard_dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(asset)
    }

    fn get(&self, asset: &AssetRef) -> AssetResult<EncodedImage> {
        let (shard, file) = asset.components()?;
        let path = self.root.join(shard).join(file);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AssetError::NotFound(asset.to_string())
            } else {
                AssetError::Io(e)
            }
        })?;

        let media_type = file
            .rsplit_once('.')
            .and_then(|(_, ext)| media_type_for_extension(ext))
            .unwrap_or(crate::vision::DEFAULT_MEDIA_TYPE);
        Ok(EncodedImage::from_bytes(media_type, &bytes))
    }
}
