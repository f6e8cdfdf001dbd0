use std::path::{Path, PathBuf};

use crate::cache::identity::CacheIdentity;
use crate::foundation::core::Rational;
use crate::foundation::error::{FrameCacheError, FrameCacheResult};

/// Extension of cached frames (OpenEXR: lossless, high dynamic range).
pub const FRAME_EXTENSION: &str = "exr";

/// Maps timestamps to cache files: `<root>/<identity>/<num>.<den>.exr`.
///
/// External pruning tools rely on this layout.
#[derive(Clone, Debug)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every frame of `identity`, without touching the filesystem.
    pub fn identity_dir(&self, identity: &CacheIdentity) -> PathBuf {
        self.root.join(identity.as_str())
    }

    /// Resolve the cache file of `time`, creating the identity directory if needed.
    ///
    /// Safe to call concurrently: an already existing directory is not an error.
    pub fn frame_path(
        &self,
        identity: &CacheIdentity,
        time: Rational,
    ) -> FrameCacheResult<PathBuf> {
        let dir = self.identity_dir(identity);
        std::fs::create_dir_all(&dir).map_err(|e| {
            FrameCacheError::io(format!(
                "failed to create cache directory '{}': {e}",
                dir.display()
            ))
        })?;
        Ok(dir.join(frame_file_name(time)))
    }

    /// Timestamps currently on disk for `identity`, sorted ascending.
    pub fn cached_frames(&self, identity: &CacheIdentity) -> FrameCacheResult<Vec<Rational>> {
        let dir = self.identity_dir(identity);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(FrameCacheError::io(format!(
                    "failed to list cache directory '{}': {e}",
                    dir.display()
                )));
            }
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FrameCacheError::io(e.to_string()))?;
            if let Some(t) = entry.file_name().to_str().and_then(parse_frame_file_name) {
                out.push(t);
            }
        }
        out.sort();
        Ok(out)
    }
}

/// `<num>.<den>.exr` of the reduced timestamp.
pub fn frame_file_name(time: Rational) -> String {
    format!("{}.{}.{FRAME_EXTENSION}", time.num(), time.den())
}

/// Inverse of [`frame_file_name`]; `None` for anything that is not a cached frame.
pub fn parse_frame_file_name(name: &str) -> Option<Rational> {
    let stem = name.strip_suffix(FRAME_EXTENSION)?.strip_suffix('.')?;
    let (num, den) = stem.split_once('.')?;
    Rational::new(num.parse().ok()?, den.parse().ok()?).ok()
}

#[cfg(test)]
#[path = "../../tests/unit/cache/path.rs"]
mod tests;
