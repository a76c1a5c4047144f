//! GPU-side resources backing the scene's textures

use std::collections::{HashMap, HashSet};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{SceneError, SceneResult};
use crate::render_graph::pass::PassDescriptor;
use crate::resources::{AssetLoader, GpuTexture};
use crate::scene::{Registry, TextureEntry, TextureId, TextureSource};

/// An allocated render target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Owns render targets, uploaded file textures, samplers and per-pass
/// framebuffers.
///
/// Viewport-bound targets are recreated by [`RenderTargetManager::resize`];
/// the handles they had before are destroyed and never handed out again.
#[derive(Debug, Default)]
pub struct RenderTargetManager {
    viewport: (u32, u32),
    targets: HashMap<TextureId, RenderTarget>,
    files: HashMap<TextureId, GpuTexture>,
    samplers: HashMap<TextureId, SamplerHandle>,
    /// Keyed by pass declaration index
    framebuffers: HashMap<usize, FramebufferHandle>,
}

impl RenderTargetManager {
    pub fn new(viewport: (u32, u32)) -> Self {
        Self {
            viewport,
            ..Default::default()
        }
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Allocate every texture of the scene and the framebuffers of its passes
    pub fn allocate_resources(
        &mut self,
        device: &mut dyn RenderDevice,
        loader: &dyn AssetLoader,
        textures: &Registry<TextureEntry>,
        passes: &[PassDescriptor],
    ) -> SceneResult<()> {
        for (id, name, entry) in textures.iter() {
            if !self.samplers.contains_key(&id) {
                let sampler = device.create_sampler(&entry.sampling.sampler_descriptor(name))?;
                self.samplers.insert(id, sampler);
            }

            match &entry.source {
                TextureSource::File(file) => self.upload_file(device, loader, id, name, file)?,
                TextureSource::Empty { .. } | TextureSource::Depth { .. } => {
                    self.materialize(device, textures, id)?;
                }
            }
        }

        for pass in passes {
            self.build_framebuffer(device, pass)?;
        }

        log::debug!(
            "Allocated {} render targets, {} file textures, {} framebuffers",
            self.targets.len(),
            self.files.len(),
            self.framebuffers.len()
        );
        Ok(())
    }

    fn upload_file(
        &mut self,
        device: &mut dyn RenderDevice,
        loader: &dyn AssetLoader,
        id: TextureId,
        name: &str,
        file: &std::path::Path,
    ) -> SceneResult<()> {
        if self.files.contains_key(&id) {
            return Ok(());
        }
        let asset_error = |message: String| SceneError::AssetLoad {
            path: format!("textures[{}]", id.index()),
            asset: file.to_path_buf(),
            message,
        };

        let mut data = loader
            .load_image(file)
            .map_err(|e| asset_error(e.to_string()))?;
        data.name = name.to_string();
        let texture = GpuTexture::create(device, &data)?;
        log::trace!(
            "Uploaded texture `{}` from {:?} ({}x{})",
            name,
            file,
            texture.width,
            texture.height
        );
        self.files.insert(id, texture);
        Ok(())
    }

    /// Back an Empty or Depth texture with a GPU image sized for the
    /// current viewport. Already materialized targets are returned as is.
    pub fn materialize(
        &mut self,
        device: &mut dyn RenderDevice,
        textures: &Registry<TextureEntry>,
        id: TextureId,
    ) -> SceneResult<RenderTarget> {
        if let Some(target) = self.targets.get(&id) {
            return Ok(*target);
        }

        let name = textures.name(id);
        let (size, format) = match &textures.get(id).source {
            TextureSource::Empty { size, format } | TextureSource::Depth { size, format } => {
                (*size, *format)
            }
            TextureSource::File(_) => {
                return Err(SceneError::NotRenderTarget {
                    texture: name.to_string(),
                    slot: "color",
                    path: format!("textures[{}]", id.index()),
                })
            }
        };

        let (width, height) = size.resolve(self.viewport);
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(name.to_string()),
            width,
            height,
            mip_levels: 1,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        })?;
        let view = match device.create_texture_view(texture) {
            Ok(view) => view,
            Err(e) => {
                let _ = device.destroy_texture(texture);
                return Err(e.into());
            }
        };

        log::trace!("Materialized `{}` ({}x{} {:?})", name, width, height, format);
        let target = RenderTarget {
            texture,
            view,
            width,
            height,
            format,
        };
        self.targets.insert(id, target);
        Ok(target)
    }

    fn build_framebuffer(
        &mut self,
        device: &mut dyn RenderDevice,
        pass: &PassDescriptor,
    ) -> SceneResult<()> {
        let Some(target) = &pass.target else {
            return Ok(());
        };
        if self.framebuffers.contains_key(&pass.index) {
            return Ok(());
        }

        let view_of = |id: TextureId| {
            self.targets
                .get(&id)
                .map(|target| target.view)
                .ok_or_else(|| SceneError::ResourceNotReady {
                    resource: format!("textures[{}]", id.index()),
                    pass: Some(pass.index),
                })
        };
        let color = target
            .color
            .iter()
            .map(|&id| view_of(id))
            .collect::<SceneResult<Vec<_>>>()?;
        let depth = target.depth.map(view_of).transpose()?;

        let framebuffer = device.create_framebuffer(&FramebufferDescriptor {
            label: Some(pass.name.clone()),
            color,
            depth,
        })?;
        self.framebuffers.insert(pass.index, framebuffer);
        Ok(())
    }

    /// Follow a viewport change.
    ///
    /// Recreates every viewport-bound target and the framebuffers of the
    /// passes that render into one. A zero-sized or unchanged viewport is
    /// ignored. Returns whether anything was reallocated.
    pub fn resize(
        &mut self,
        device: &mut dyn RenderDevice,
        textures: &Registry<TextureEntry>,
        passes: &[PassDescriptor],
        viewport: (u32, u32),
    ) -> SceneResult<bool> {
        if viewport == self.viewport || viewport.0 == 0 || viewport.1 == 0 {
            return Ok(false);
        }
        log::info!(
            "Viewport resized from {}x{} to {}x{}",
            self.viewport.0,
            self.viewport.1,
            viewport.0,
            viewport.1
        );
        self.viewport = viewport;

        let stale: HashSet<TextureId> = self
            .targets
            .keys()
            .copied()
            .filter(|&id| textures.get(id).source.is_viewport_bound())
            .collect();
        if stale.is_empty() {
            return Ok(false);
        }

        // Framebuffers go first, they reference the views being destroyed
        for pass in passes {
            let affected = pass.writes().any(|id| stale.contains(&id));
            if affected {
                if let Some(framebuffer) = self.framebuffers.remove(&pass.index) {
                    device.destroy_framebuffer(framebuffer)?;
                }
            }
        }
        for id in &stale {
            if let Some(target) = self.targets.remove(id) {
                device.destroy_texture(target.texture)?;
            }
        }

        for &id in &stale {
            self.materialize(device, textures, id)?;
        }
        for pass in passes {
            self.build_framebuffer(device, pass)?;
        }
        Ok(true)
    }

    pub fn target(&self, id: TextureId) -> Option<&RenderTarget> {
        self.targets.get(&id)
    }

    /// View to sample a texture through, whatever its source
    pub fn view(&self, id: TextureId) -> Option<TextureViewHandle> {
        self.targets
            .get(&id)
            .map(|target| target.view)
            .or_else(|| self.files.get(&id).map(|texture| texture.view))
    }

    pub fn sampler(&self, id: TextureId) -> Option<SamplerHandle> {
        self.samplers.get(&id).copied()
    }

    /// Framebuffer of the pass with the given declaration index
    pub fn framebuffer(&self, pass: usize) -> Option<FramebufferHandle> {
        self.framebuffers.get(&pass).copied()
    }

    /// Destroy everything this manager allocated
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        for (_, framebuffer) in self.framebuffers.drain() {
            if let Err(e) = device.destroy_framebuffer(framebuffer) {
                log::warn!("Failed to destroy framebuffer: {}", e);
            }
        }
        for (_, target) in self.targets.drain() {
            if let Err(e) = device.destroy_texture(target.texture) {
                log::warn!("Failed to destroy render target: {}", e);
            }
        }
        for (_, texture) in self.files.drain() {
            texture.destroy(device);
        }
        for (_, sampler) in self.samplers.drain() {
            if let Err(e) = device.destroy_sampler(sampler) {
                log::warn!("Failed to destroy sampler: {}", e);
            }
        }
    }
}
