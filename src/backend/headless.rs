//! Headless render device for testing and offline runs.
//!
//! This device doesn't touch a GPU. It validates handles, records every
//! command it receives, and lets callers inspect the result afterwards.

use std::collections::{HashMap, HashSet};

use crate::backend::traits::*;
use crate::backend::types::*;

/// A command recorded by [`HeadlessDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginFrame {
        width: u32,
        height: u32,
    },
    EndFrame,
    BeginRenderPass {
        label: Option<String>,
        framebuffer: Option<FramebufferHandle>,
        color_load: LoadOp,
        depth_load: DepthLoadOp,
    },
    EndRenderPass,
    SetPipeline {
        program: ProgramHandle,
        state: PipelineState,
    },
    BindTexture {
        slot: u32,
        name: String,
        view: TextureViewHandle,
        sampler: SamplerHandle,
    },
    SetUniform {
        name: String,
        value: UniformValue,
    },
    DrawIndexed {
        vertex_buffer: BufferHandle,
        index_count: u32,
    },
}

#[derive(Debug)]
struct BufferRecord {
    desc: BufferDescriptor,
    len: usize,
}

/// Recording render device.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_id: u64,
    textures: HashMap<TextureHandle, TextureDescriptor>,
    views: HashMap<TextureViewHandle, TextureHandle>,
    samplers: HashMap<SamplerHandle, SamplerDescriptor>,
    framebuffers: HashMap<FramebufferHandle, FramebufferDescriptor>,
    buffers: HashMap<BufferHandle, BufferRecord>,
    programs: HashSet<ProgramHandle>,
    programs_compiled: usize,
    commands: Vec<Command>,
    failing_labels: HashSet<String>,
    fail_next_bind: bool,
    in_frame: bool,
    in_pass: bool,
    bound_program: Option<ProgramHandle>,
}

impl HeadlessDevice {
    /// Create a new headless device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every draw of a vertex buffer with this label fail.
    pub fn fail_draws_for(&mut self, label: &str) {
        self.failing_labels.insert(label.to_string());
    }

    /// Make the next texture bind fail once.
    pub fn fail_next_texture_bind(&mut self) {
        self.fail_next_bind = true;
    }

    /// Whether a frame was begun and not ended.
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Take the recorded commands, leaving the log empty.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Whether a texture handle still refers to a live texture.
    pub fn is_texture_alive(&self, texture: TextureHandle) -> bool {
        self.textures.contains_key(&texture)
    }

    /// Descriptor a live texture was created with.
    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture)
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_program_count(&self) -> usize {
        self.programs.len()
    }

    /// Number of successful program compilations over the device lifetime.
    pub fn programs_compiled(&self) -> usize {
        self.programs_compiled
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_view(&self, view: TextureViewHandle) -> BackendResult<()> {
        if self.views.contains_key(&view) {
            Ok(())
        } else {
            Err(BackendError::InvalidHandle {
                kind: "texture view",
                id: view.0,
            })
        }
    }

    fn require_pass(&self, command: &str) -> BackendResult<()> {
        if self.in_pass {
            Ok(())
        } else {
            Err(BackendError::InvalidState(format!(
                "{command} outside of a render pass"
            )))
        }
    }
}

/// Finds the first `#error` directive in a GLSL source.
fn error_directive(source: &str) -> Option<String> {
    source
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("#error"))
        .map(|message| message.trim().to_string())
}

fn check_stage(stage: ShaderStage, source: &str) -> Result<(), ShaderDiagnostic> {
    if source.trim().is_empty() {
        return Err(ShaderDiagnostic {
            stage,
            message: "empty shader source".to_string(),
        });
    }
    if !source.contains("void main") {
        return Err(ShaderDiagnostic {
            stage,
            message: "missing entry point `main`".to_string(),
        });
    }
    match error_directive(source) {
        Some(message) => Err(ShaderDiagnostic { stage, message }),
        None => Ok(()),
    }
}

impl RenderDevice for HeadlessDevice {
    fn name(&self) -> &str {
        "Headless Device"
    }

    fn begin_frame(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if self.in_frame {
            return Err(BackendError::InvalidState(
                "begin_frame called twice".to_string(),
            ));
        }
        log::trace!("HeadlessDevice: begin frame {}x{}", width, height);
        self.in_frame = true;
        self.commands.push(Command::BeginFrame { width, height });
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if !self.in_frame {
            return Err(BackendError::InvalidState(
                "end_frame without begin_frame".to_string(),
            ));
        }
        if self.in_pass {
            return Err(BackendError::InvalidState(
                "end_frame inside a render pass".to_string(),
            ));
        }
        self.in_frame = false;
        self.commands.push(Command::EndFrame);
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::ResourceCreationFailed(format!(
                "texture {:?} has zero size",
                desc.label
            )));
        }
        log::trace!(
            "HeadlessDevice: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let handle = TextureHandle(self.allocate_id());
        self.textures.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            });
        }
        let view = TextureViewHandle(self.allocate_id());
        self.views.insert(view, texture);
        Ok(view)
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        data: &[u8],
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        let desc = self.textures.get(&texture).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        let expected = (width * height * desc.format.bytes_per_pixel()) as usize;
        if desc.width != width || desc.height != height || data.len() != expected {
            return Err(BackendError::InvalidState(format!(
                "texture write of {} bytes does not match {}x{} {:?}",
                data.len(),
                desc.width,
                desc.height,
                desc.format
            )));
        }
        Ok(())
    }

    fn texture_size(&self, texture: TextureHandle) -> BackendResult<(u32, u32)> {
        self.textures
            .get(&texture)
            .map(|desc| (desc.width, desc.height))
            .ok_or(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            })
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("HeadlessDevice: creating sampler {:?}", desc.label);
        let handle = SamplerHandle(self.allocate_id());
        self.samplers.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> BackendResult<FramebufferHandle> {
        if desc.color.is_empty() && desc.depth.is_none() {
            return Err(BackendError::ResourceCreationFailed(format!(
                "framebuffer {:?} has no attachments",
                desc.label
            )));
        }
        for &view in desc.color.iter().chain(desc.depth.iter()) {
            self.check_view(view)?;
        }
        log::trace!(
            "HeadlessDevice: creating framebuffer {:?} ({} color attachments)",
            desc.label,
            desc.color.len()
        );
        let handle = FramebufferHandle(self.allocate_id());
        self.framebuffers.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        log::trace!(
            "HeadlessDevice: creating buffer {:?} (size: {})",
            desc.label,
            data.len()
        );
        let handle = BufferHandle(self.allocate_id());
        self.buffers.insert(
            handle,
            BufferRecord {
                desc: desc.clone(),
                len: data.len(),
            },
        );
        Ok(handle)
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, ShaderDiagnostic> {
        check_stage(ShaderStage::Vertex, &source.vertex_source)?;
        check_stage(ShaderStage::Fragment, &source.fragment_source)?;
        log::trace!(
            "HeadlessDevice: linking program {:?} + {:?}",
            source.vertex_path,
            source.fragment_path
        );
        let handle = ProgramHandle(self.allocate_id());
        self.programs.insert(handle);
        self.programs_compiled += 1;
        Ok(handle)
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) -> BackendResult<()> {
        if !self.in_frame || self.in_pass {
            return Err(BackendError::InvalidState(
                "begin_render_pass outside of a frame or inside another pass".to_string(),
            ));
        }
        if let Some(framebuffer) = desc.framebuffer {
            let attachments =
                self.framebuffers
                    .get(&framebuffer)
                    .ok_or(BackendError::InvalidHandle {
                        kind: "framebuffer",
                        id: framebuffer.0,
                    })?;
            for &view in attachments.color.iter().chain(attachments.depth.iter()) {
                self.check_view(view)?;
            }
        }
        self.in_pass = true;
        self.bound_program = None;
        self.commands.push(Command::BeginRenderPass {
            label: desc.label.clone(),
            framebuffer: desc.framebuffer,
            color_load: desc.color_load,
            depth_load: desc.depth_load,
        });
        Ok(())
    }

    fn end_render_pass(&mut self) -> BackendResult<()> {
        self.require_pass("end_render_pass")?;
        self.in_pass = false;
        self.bound_program = None;
        self.commands.push(Command::EndRenderPass);
        Ok(())
    }

    fn set_pipeline(&mut self, program: ProgramHandle, state: &PipelineState) -> BackendResult<()> {
        self.require_pass("set_pipeline")?;
        if !self.programs.contains(&program) {
            return Err(BackendError::InvalidHandle {
                kind: "program",
                id: program.0,
            });
        }
        self.bound_program = Some(program);
        self.commands.push(Command::SetPipeline {
            program,
            state: *state,
        });
        Ok(())
    }

    fn bind_texture(
        &mut self,
        slot: u32,
        name: &str,
        view: TextureViewHandle,
        sampler: SamplerHandle,
    ) -> BackendResult<()> {
        self.require_pass("bind_texture")?;
        if std::mem::take(&mut self.fail_next_bind) {
            return Err(BackendError::InvalidState(format!(
                "binding `{name}` to slot {slot} failed"
            )));
        }
        self.check_view(view)?;
        if !self.samplers.contains_key(&sampler) {
            return Err(BackendError::InvalidHandle {
                kind: "sampler",
                id: sampler.0,
            });
        }
        self.commands.push(Command::BindTexture {
            slot,
            name: name.to_string(),
            view,
            sampler,
        });
        Ok(())
    }

    fn set_uniform(&mut self, name: &str, value: &UniformValue) -> BackendResult<()> {
        self.require_pass("set_uniform")?;
        if self.bound_program.is_none() {
            return Err(BackendError::InvalidState(format!(
                "uniform `{name}` set without a bound program"
            )));
        }
        self.commands.push(Command::SetUniform {
            name: name.to_string(),
            value: *value,
        });
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        vertex_buffer: BufferHandle,
        index_buffer: BufferHandle,
        index_count: u32,
    ) -> BackendResult<()> {
        self.require_pass("draw_indexed")?;
        if self.bound_program.is_none() {
            return Err(BackendError::InvalidState(
                "draw without a bound program".to_string(),
            ));
        }
        let vertices = self
            .buffers
            .get(&vertex_buffer)
            .ok_or(BackendError::InvalidHandle {
                kind: "buffer",
                id: vertex_buffer.0,
            })?;
        if let Some(label) = &vertices.desc.label {
            if self.failing_labels.contains(label) {
                return Err(BackendError::DrawFailed(format!(
                    "injected failure for `{label}`"
                )));
            }
        }
        let indices = self
            .buffers
            .get(&index_buffer)
            .ok_or(BackendError::InvalidHandle {
                kind: "buffer",
                id: index_buffer.0,
            })?;
        if !indices.desc.usage.contains(BufferUsage::INDEX)
            || (index_count as usize) * std::mem::size_of::<u32>() > indices.len
        {
            return Err(BackendError::DrawFailed(format!(
                "index buffer too small for {index_count} indices"
            )));
        }
        self.commands.push(Command::DrawIndexed {
            vertex_buffer,
            index_count,
        });
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) -> BackendResult<()> {
        if self.textures.remove(&texture).is_none() {
            return Err(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            });
        }
        self.views.retain(|_, owner| *owner != texture);
        log::trace!("HeadlessDevice: destroyed texture {}", texture.0);
        Ok(())
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) -> BackendResult<()> {
        self.samplers
            .remove(&sampler)
            .map(|_| ())
            .ok_or(BackendError::InvalidHandle {
                kind: "sampler",
                id: sampler.0,
            })
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) -> BackendResult<()> {
        self.framebuffers
            .remove(&framebuffer)
            .map(|_| ())
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> BackendResult<()> {
        self.buffers
            .remove(&buffer)
            .map(|_| ())
            .ok_or(BackendError::InvalidHandle {
                kind: "buffer",
                id: buffer.0,
            })
    }

    fn destroy_program(&mut self, program: ProgramHandle) -> BackendResult<()> {
        if self.programs.remove(&program) {
            Ok(())
        } else {
            Err(BackendError::InvalidHandle {
                kind: "program",
                id: program.0,
            })
        }
    }
}
