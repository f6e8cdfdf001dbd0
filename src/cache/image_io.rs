use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{FrameCacheError, FrameCacheResult};
use crate::render::params::PixelFormat;

/// Reads and writes cached frame images.
pub trait ImageIo: Send + Sync {
    /// Open an image for reading. Failure means "not readable", never "fatal".
    fn open(&self, path: &Path) -> FrameCacheResult<Box<dyn ImageInput>>;

    /// Persist tightly packed `pixels` of `format` at `path`.
    fn write(
        &self,
        path: &Path,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> FrameCacheResult<()>;
}

/// An opened image; dropping it closes the underlying file.
pub trait ImageInput: Send {
    /// Decode the image into `dest`, converting to `format`.
    fn read_image(&mut self, format: PixelFormat, dest: &mut [u8]) -> FrameCacheResult<()>;

    fn close(self: Box<Self>) {}
}

/// OpenEXR cache codec built on the `image` crate.
///
/// Frames are stored as 32-bit float RGBA whatever their in-memory format, so every
/// [`PixelFormat`] roundtrips losslessly. Writes land in a `.tmp` sibling and are renamed into
/// place, so readers never observe a partially written frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExrImageIo;

impl ImageIo for ExrImageIo {
    fn open(&self, path: &Path) -> FrameCacheResult<Box<dyn ImageInput>> {
        let reader = image::ImageReader::open(path)
            .with_context(|| format!("open cached frame '{}'", path.display()))?;
        Ok(Box::new(ExrImageInput {
            path: path.to_path_buf(),
            reader: Some(reader),
        }))
    }

    fn write(
        &self,
        path: &Path,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> FrameCacheResult<()> {
        let img = pixels_to_image(pixels, width, height, format)?;
        let hdr = image::DynamicImage::ImageRgba32F(img.to_rgba32f());

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        hdr.save_with_format(&tmp, image::ImageFormat::OpenExr)
            .with_context(|| format!("encode cached frame '{}'", tmp.display()))?;
        std::fs::rename(&tmp, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            FrameCacheError::io(format!(
                "failed to move cached frame into '{}': {e}",
                path.display()
            ))
        })
    }
}

struct ExrImageInput {
    path: PathBuf,
    reader: Option<image::ImageReader<BufReader<File>>>,
}

impl ImageInput for ExrImageInput {
    fn read_image(&mut self, format: PixelFormat, dest: &mut [u8]) -> FrameCacheResult<()> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| FrameCacheError::image("image input already consumed"))?;
        let img = reader
            .decode()
            .with_context(|| format!("decode cached frame '{}'", self.path.display()))?;
        image_to_pixels(&img, format, dest)
    }
}

fn pixels_to_image(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> FrameCacheResult<image::DynamicImage> {
    if pixels.len() != format.buffer_size(width, height) {
        return Err(FrameCacheError::image(format!(
            "pixel buffer is {} bytes, expected {} for {width}x{height} {format:?}",
            pixels.len(),
            format.buffer_size(width, height)
        )));
    }
    let size_err = || FrameCacheError::image("pixel buffer does not match image dimensions");

    let img = match format {
        PixelFormat::Rgba8 => image::DynamicImage::ImageRgba8(
            image::RgbaImage::from_raw(width, height, pixels.to_vec()).ok_or_else(size_err)?,
        ),
        PixelFormat::Rgba16 => {
            let data = pixels
                .chunks_exact(2)
                .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                .collect::<Vec<_>>();
            image::DynamicImage::ImageRgba16(
                image::ImageBuffer::from_raw(width, height, data).ok_or_else(size_err)?,
            )
        }
        PixelFormat::Rgba32F => {
            let data = pixels
                .chunks_exact(4)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect::<Vec<_>>();
            image::DynamicImage::ImageRgba32F(
                image::Rgba32FImage::from_raw(width, height, data).ok_or_else(size_err)?,
            )
        }
    };
    Ok(img)
}

fn image_to_pixels(
    img: &image::DynamicImage,
    format: PixelFormat,
    dest: &mut [u8],
) -> FrameCacheResult<()> {
    let expected = format.buffer_size(img.width(), img.height());
    if dest.len() != expected {
        return Err(FrameCacheError::image(format!(
            "cached frame is {}x{} ({expected} bytes) but destination holds {} bytes",
            img.width(),
            img.height(),
            dest.len()
        )));
    }

    match format {
        PixelFormat::Rgba8 => dest.copy_from_slice(img.to_rgba8().as_raw()),
        PixelFormat::Rgba16 => {
            for (out, v) in dest.chunks_exact_mut(2).zip(img.to_rgba16().as_raw()) {
                out.copy_from_slice(&v.to_ne_bytes());
            }
        }
        PixelFormat::Rgba32F => {
            for (out, v) in dest.chunks_exact_mut(4).zip(img.to_rgba32f().as_raw()) {
                out.copy_from_slice(&v.to_ne_bytes());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/cache/image_io.rs"]
mod tests;
