//! Texture loading and upload

use std::path::Path;

use image::{DynamicImage, GenericImageView};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::loader::AssetError;

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path)?;
        Ok(Self::from_image(img, &name))
    }

    /// Decode an encoded image held in memory
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    /// Create a checkerboard texture with 8 pixel cells
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            data,
            name: "checkerboard".to_string(),
        }
    }
}

/// An uploaded, sampled-only texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    /// Create and upload texture to GPU
    pub fn create(device: &mut dyn RenderDevice, data: &TextureData) -> BackendResult<Self> {
        let handle = device.create_texture(&TextureDescriptor {
            label: Some(data.name.clone()),
            width: data.width,
            height: data.height,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;

        let uploaded = device
            .create_texture_view(handle)
            .and_then(|view| {
                device.write_texture(handle, &data.data, data.width, data.height)?;
                Ok(view)
            });
        let view = match uploaded {
            Ok(view) => view,
            Err(e) => {
                let _ = device.destroy_texture(handle);
                return Err(e);
            }
        };

        Ok(Self {
            handle,
            view,
            width: data.width,
            height: data.height,
        })
    }

    pub fn destroy(&self, device: &mut dyn RenderDevice) {
        if let Err(e) = device.destroy_texture(self.handle) {
            log::warn!("Failed to destroy texture: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessDevice;

    #[test]
    fn test_checkerboard_cells() {
        let board = TextureData::checkerboard(16, [255; 4], [0, 0, 0, 255]);
        assert_eq!(board.data.len(), 16 * 16 * 4);
        assert_eq!(&board.data[0..4], &[255; 4]);
        // First pixel of the second cell
        assert_eq!(&board.data[8 * 4..8 * 4 + 4], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_from_bytes_decodes_png() {
        let mut bytes = Vec::new();
        image::RgbaImage::from_pixel(2, 3, image::Rgba([1, 2, 3, 4]))
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageOutputFormat::Png,
            )
            .unwrap();
        let data = TextureData::from_bytes(&bytes, "tiny").unwrap();
        assert_eq!((data.width, data.height), (2, 3));
        assert_eq!(&data.data[0..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_upload() {
        let mut device = HeadlessDevice::new();
        let texture =
            GpuTexture::create(&mut device, &TextureData::solid_color([9; 4], "dot")).unwrap();
        assert!(device.is_texture_alive(texture.handle));
        texture.destroy(&mut device);
        assert_eq!(device.live_texture_count(), 0);
    }
}
