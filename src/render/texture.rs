use std::fmt;
use std::sync::{Arc, RwLock};

use crate::foundation::error::{FrameCacheError, FrameCacheResult};
use crate::render::params::PixelFormat;

/// An image buffer owned by a texture service (GPU or host memory).
///
/// The cache only orders calls on textures; it never looks inside them.
pub trait Texture: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> PixelFormat;

    /// Replace the texture contents with tightly packed pixels of [`Texture::format`].
    fn upload(&self, pixels: &[u8]) -> FrameCacheResult<()>;

    /// Read the texture contents back into host memory.
    fn download(&self) -> FrameCacheResult<Vec<u8>>;

    fn byte_len(&self) -> usize {
        self.format().buffer_size(self.width(), self.height())
    }
}

impl fmt::Debug for dyn Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format())
            .finish()
    }
}

/// Factory for [`Texture`]s.
pub trait TextureBackend: Send + Sync {
    fn create(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> FrameCacheResult<Arc<dyn Texture>>;
}

/// Host-memory texture, zero-initialized on creation.
pub struct CpuTexture {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: RwLock<Vec<u8>>,
}

impl CpuTexture {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> FrameCacheResult<Self> {
        if width == 0 || height == 0 {
            return Err(FrameCacheError::validation(
                "texture dimensions must be non-zero",
            ));
        }
        Ok(Self {
            width,
            height,
            format,
            pixels: RwLock::new(vec![0u8; format.buffer_size(width, height)]),
        })
    }
}

impl Texture for CpuTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn upload(&self, pixels: &[u8]) -> FrameCacheResult<()> {
        if pixels.len() != self.byte_len() {
            return Err(FrameCacheError::validation(format!(
                "texture upload size mismatch: got {} bytes, expected {}",
                pixels.len(),
                self.byte_len()
            )));
        }
        let mut guard = self
            .pixels
            .write()
            .map_err(|_| FrameCacheError::render("texture lock poisoned"))?;
        guard.copy_from_slice(pixels);
        Ok(())
    }

    fn download(&self) -> FrameCacheResult<Vec<u8>> {
        let guard = self
            .pixels
            .read()
            .map_err(|_| FrameCacheError::render("texture lock poisoned"))?;
        Ok(guard.clone())
    }
}

/// [`TextureBackend`] producing [`CpuTexture`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuTextureBackend;

impl TextureBackend for CpuTextureBackend {
    fn create(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> FrameCacheResult<Arc<dyn Texture>> {
        Ok(Arc::new(CpuTexture::new(width, height, format)?))
    }
}
