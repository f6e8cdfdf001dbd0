use std::fmt;

use sha2::Digest as _;

use crate::render::params::{PixelFormat, RenderParams};

/// Name of a render configuration's cache subdirectory.
///
/// Derived from the cache name, its generation time and the render parameters; a change to any
/// of them yields a different identity, so frames cached under older parameters are never read.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheIdentity(String);

impl CacheIdentity {
    /// Hash the six identity fields.
    ///
    /// Returns `None` (caching disabled) when `name` is empty or the effective dimensions are zero.
    pub fn generate(
        name: &str,
        generation_time: i64,
        width: u32,
        height: u32,
        format: PixelFormat,
        divider: u32,
    ) -> Option<Self> {
        let divider = divider.max(1);
        if name.is_empty() || width / divider == 0 || height / divider == 0 {
            return None;
        }

        let mut hasher = sha2::Sha256::new();
        for field in [
            name.to_string(),
            generation_time.to_string(),
            width.to_string(),
            height.to_string(),
            format.id().to_string(),
            divider.to_string(),
        ] {
            // Length-prefixed so adjacent fields cannot trade digits.
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }

        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for b in digest.iter() {
            hex.push_str(&format!("{b:02x}"));
        }
        Some(Self(hex))
    }

    pub fn for_params(name: &str, generation_time: i64, params: &RenderParams) -> Option<Self> {
        Self::generate(
            name,
            generation_time,
            params.width,
            params.height,
            params.format,
            params.divider,
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/identity.rs"]
mod tests;
