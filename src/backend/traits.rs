//! Render device abstraction
//!
//! The engine never talks to a graphics API directly. Everything it needs
//! from the GPU goes through [`RenderDevice`].

use thiserror::Error;

use crate::backend::types::*;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },
    #[error("failed to create resource: {0}")]
    ResourceCreationFailed(String),
    #[error("invalid command order: {0}")]
    InvalidState(String),
    #[error("draw call failed: {0}")]
    DrawFailed(String),
    #[error("device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(pub(crate) u64);

/// Handle to a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub(crate) u64);

/// Handle to a set of color and depth attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a linked vertex/fragment program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u64);

/// Attachments of an offscreen render target, color views in binding order
#[derive(Debug, Clone)]
pub struct FramebufferDescriptor {
    pub label: Option<String>,
    pub color: Vec<TextureViewHandle>,
    pub depth: Option<TextureViewHandle>,
}

/// Render pass descriptor
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    /// `None` renders into the final framebuffer
    pub framebuffer: Option<FramebufferHandle>,
    pub color_load: LoadOp,
    pub depth_load: DepthLoadOp,
}

/// Main render device trait
pub trait RenderDevice {
    /// Name used in log output
    fn name(&self) -> &str;

    /// Begin a new frame for a surface of the given size
    fn begin_frame(&mut self, width: u32, height: u32) -> BackendResult<()>;

    /// End and present the frame
    fn end_frame(&mut self) -> BackendResult<()>;

    // Resource creation

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Create a view covering the whole texture
    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle>;

    /// Write RGBA8 pixel data to a texture
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        data: &[u8],
        width: u32,
        height: u32,
    ) -> BackendResult<()>;

    /// Dimensions of a live texture
    fn texture_size(&self, texture: TextureHandle) -> BackendResult<(u32, u32)>;

    /// Create a sampler
    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;

    /// Create an offscreen framebuffer from existing views
    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> BackendResult<FramebufferHandle>;

    /// Create a buffer with initial data
    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle>;

    /// Compile and link a program
    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, ShaderDiagnostic>;

    // Command recording

    /// Begin a render pass
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) -> BackendResult<()>;

    /// End the current render pass
    fn end_render_pass(&mut self) -> BackendResult<()>;

    /// Bind a program together with its fixed-function state
    fn set_pipeline(&mut self, program: ProgramHandle, state: &PipelineState) -> BackendResult<()>;

    /// Bind a texture view and sampler to a sampler slot
    fn bind_texture(
        &mut self,
        slot: u32,
        name: &str,
        view: TextureViewHandle,
        sampler: SamplerHandle,
    ) -> BackendResult<()>;

    /// Upload a value to a named uniform of the bound program
    fn set_uniform(&mut self, name: &str, value: &UniformValue) -> BackendResult<()>;

    /// Draw indexed triangles
    fn draw_indexed(
        &mut self,
        vertex_buffer: BufferHandle,
        index_buffer: BufferHandle,
        index_count: u32,
    ) -> BackendResult<()>;

    // Resource cleanup

    /// Destroy a texture and every view created from it
    fn destroy_texture(&mut self, texture: TextureHandle) -> BackendResult<()>;

    fn destroy_sampler(&mut self, sampler: SamplerHandle) -> BackendResult<()>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) -> BackendResult<()>;

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> BackendResult<()>;

    fn destroy_program(&mut self, program: ProgramHandle) -> BackendResult<()>;
}
