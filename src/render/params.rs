use crate::foundation::error::{FrameCacheError, FrameCacheResult};

/// Pixel layout of textures and cached frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit unsigned RGBA.
    Rgba8,
    /// 16-bit unsigned RGBA, native endian.
    Rgba16,
    /// 32-bit float RGBA, native endian.
    #[serde(rename = "rgba32f")]
    Rgba32F,
}

impl PixelFormat {
    /// Stable numeric id. Part of the cache identity, so never renumber.
    pub fn id(self) -> u32 {
        match self {
            PixelFormat::Rgba8 => 0,
            PixelFormat::Rgba16 => 1,
            PixelFormat::Rgba32F => 2,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgba16 => 8,
            PixelFormat::Rgba32F => 16,
        }
    }

    /// Tightly packed byte size of a `width` x `height` image.
    pub fn buffer_size(self, width: u32, height: u32) -> usize {
        (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(self.bytes_per_pixel())
    }
}

/// Quality mode forwarded to graph evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Full quality, used for exports.
    Offline,
    /// Interactive preview quality.
    #[default]
    Online,
}

/// Render dimensions and format of a cache pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RenderParams {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    #[serde(default)]
    pub mode: RenderMode,
    /// Downscale factor applied to width/height, >= 1.
    #[serde(default = "default_divider")]
    pub divider: u32,
}

fn default_divider() -> u32 {
    1
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            format: PixelFormat::Rgba32F,
            mode: RenderMode::Online,
            divider: 1,
        }
    }
}

impl RenderParams {
    pub fn validate(&self) -> FrameCacheResult<()> {
        if self.divider == 0 {
            return Err(FrameCacheError::validation("render divider must be >= 1"));
        }
        Ok(())
    }

    pub fn effective_width(&self) -> u32 {
        self.width / self.divider.max(1)
    }

    pub fn effective_height(&self) -> u32 {
        self.height / self.divider.max(1)
    }

    /// Byte size of one frame at the effective dimensions.
    pub fn frame_buffer_size(&self) -> usize {
        self.format
            .buffer_size(self.effective_width(), self.effective_height())
    }
}
