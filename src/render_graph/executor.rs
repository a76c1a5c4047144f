//! Render graph executor
//!
//! Runs the compiled passes once per frame. Per pass the executor moves
//! through `Idle -> BindingTarget -> BindingResources -> Drawing -> Idle`,
//! and the frame as a whole is bracketed by `FrameStart` and `FramePresent`.

use std::collections::HashMap;

use glam::{Mat4, Vec2};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{DrawError, SceneError, SceneResult};
use crate::render_graph::pass::*;
use crate::render_graph::resource::RenderTargetManager;
use crate::resources::{GpuMesh, ShaderCache};
use crate::scene::{CameraModel, ObjectHandle, ResourceRegistry};

/// Executor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    FrameStart,
    Idle,
    BindingTarget,
    BindingResources,
    Drawing,
    FramePresent,
}

impl ExecutorState {
    pub fn can_advance_to(self, next: ExecutorState) -> bool {
        use ExecutorState::*;
        matches!(
            (self, next),
            (FramePresent, FrameStart)
                | (FrameStart, Idle)
                | (Idle, BindingTarget)
                | (BindingTarget, BindingResources)
                | (BindingResources, Drawing)
                | (Drawing, Idle)
                | (Idle, FramePresent)
        )
    }
}

/// External inputs for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub viewport: (u32, u32),
    /// Seconds since the engine started
    pub time: f32,
    /// Seconds since the previous frame
    pub delta_time: f32,
    /// Pointer position in pixels
    pub pointer: Vec2,
}

impl FrameInput {
    pub fn new(viewport: (u32, u32)) -> Self {
        Self {
            viewport,
            time: 0.0,
            delta_time: 0.0,
            pointer: Vec2::ZERO,
        }
    }

    pub fn aspect(&self) -> f32 {
        if self.viewport.1 == 0 {
            1.0
        } else {
            self.viewport.0 as f32 / self.viewport.1 as f32
        }
    }
}

/// What happened during a frame
#[derive(Debug, Default)]
pub struct FrameReport {
    /// Declaration indices of the executed passes, in execution order
    pub executed_passes: Vec<usize>,
    pub draw_calls: usize,
    /// Failed draws; each one ended its pass early
    pub draw_errors: Vec<DrawError>,
    pub trace: Vec<ExecutorState>,
    pub viewport: (u32, u32),
}

impl FrameReport {
    pub fn is_clean(&self) -> bool {
        self.draw_errors.is_empty()
    }
}

/// Everything a frame reads, borrowed from the active scene
pub struct FrameResources<'a> {
    pub passes: &'a [PassDescriptor],
    /// Positions into `passes`, in execution order
    pub order: &'a [usize],
    pub registry: &'a ResourceRegistry,
    pub shaders: &'a ShaderCache,
    pub meshes: &'a HashMap<ObjectHandle, GpuMesh>,
    pub targets: &'a RenderTargetManager,
    pub camera: &'a CameraModel,
    pub clear_color: [f32; 4],
}

/// Values of the builtin uniforms for the current frame
struct FrameUniforms {
    view: Mat4,
    projection: Mat4,
    time: f32,
    pointer: Vec2,
    viewport: Vec2,
}

impl FrameUniforms {
    fn evaluate(&self, builtin: BuiltinUniform, model: Mat4) -> UniformValue {
        match builtin {
            BuiltinUniform::Model => UniformValue::Mat4(model),
            BuiltinUniform::View => UniformValue::Mat4(self.view),
            BuiltinUniform::Projection => UniformValue::Mat4(self.projection),
            BuiltinUniform::Time => UniformValue::Float(self.time),
            BuiltinUniform::MouseX => UniformValue::Float(self.pointer.x),
            BuiltinUniform::MouseY => UniformValue::Float(self.pointer.y),
            BuiltinUniform::MousePos => UniformValue::Vec2(self.pointer),
            BuiltinUniform::WindowWidth => UniformValue::Float(self.viewport.x),
            BuiltinUniform::WindowHeight => UniformValue::Float(self.viewport.y),
            BuiltinUniform::WindowSize => UniformValue::Vec2(self.viewport),
        }
    }
}

/// Executor for running the compiled render graph
#[derive(Debug)]
pub struct FrameExecutor {
    state: ExecutorState,
    trace: Vec<ExecutorState>,
    /// A render pass was begun on the device and not yet ended
    pass_open: bool,
}

impl Default for FrameExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExecutor {
    pub fn new() -> Self {
        Self {
            state: ExecutorState::FramePresent,
            trace: Vec::new(),
            pass_open: false,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    fn advance(&mut self, next: ExecutorState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid executor transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        self.trace.push(next);
    }

    /// Check that every resource the frame needs exists before anything is
    /// submitted
    pub fn check_ready(resources: &FrameResources<'_>) -> SceneResult<()> {
        let textures = &resources.registry.textures;
        for &position in resources.order {
            let pass = &resources.passes[position];
            let not_ready = |resource: String| SceneError::ResourceNotReady {
                resource,
                pass: Some(pass.index),
            };

            if let Some(target) = &pass.target {
                for id in target.textures() {
                    if resources.targets.target(id).is_none() {
                        return Err(not_ready(textures.name(id).to_string()));
                    }
                }
                if resources.targets.framebuffer(pass.index).is_none() {
                    return Err(not_ready(format!("framebuffer of `{}`", pass.name)));
                }
            }
            for input in &pass.inputs {
                if resources.targets.view(input.texture).is_none()
                    || resources.targets.sampler(input.texture).is_none()
                {
                    return Err(not_ready(textures.name(input.texture).to_string()));
                }
            }
            for &object in &pass.objects {
                if !resources.meshes.contains_key(&object) {
                    return Err(not_ready(resources.registry.objects.name(object).to_string()));
                }
            }
        }
        Ok(())
    }

    /// Execute one frame.
    ///
    /// A device error aborts the frame: the open render pass and the frame
    /// are closed on the device and the executor returns to `FramePresent`,
    /// so the next frame starts clean.
    pub fn execute(
        &mut self,
        device: &mut dyn RenderDevice,
        resources: &FrameResources<'_>,
        input: &FrameInput,
    ) -> SceneResult<FrameReport> {
        Self::check_ready(resources)?;

        self.trace.clear();
        self.advance(ExecutorState::FrameStart);
        if let Err(e) = device.begin_frame(input.viewport.0, input.viewport.1) {
            self.reset();
            return Err(e.into());
        }

        let mut report = FrameReport {
            viewport: input.viewport,
            ..Default::default()
        };
        if let Err(e) = self.execute_passes(device, resources, input, &mut report) {
            log::error!("Frame aborted: {}", e);
            self.abort(device);
            return Err(e);
        }

        self.advance(ExecutorState::FramePresent);
        device.end_frame()?;

        report.trace = std::mem::take(&mut self.trace);
        log::trace!(
            "Frame done: {} passes, {} draws, {} draw errors",
            report.executed_passes.len(),
            report.draw_calls,
            report.draw_errors.len()
        );
        Ok(report)
    }

    fn execute_passes(
        &mut self,
        device: &mut dyn RenderDevice,
        resources: &FrameResources<'_>,
        input: &FrameInput,
        report: &mut FrameReport,
    ) -> SceneResult<()> {
        let frame = FrameUniforms {
            view: resources.camera.view_matrix(),
            projection: resources.camera.projection_matrix(input.aspect()),
            time: input.time,
            pointer: input.pointer,
            viewport: Vec2::new(input.viewport.0 as f32, input.viewport.1 as f32),
        };

        self.advance(ExecutorState::Idle);
        let mut first_to_frame = true;
        for &position in resources.order {
            let pass = &resources.passes[position];
            self.execute_pass(device, resources, pass, &frame, first_to_frame, report)?;
            if pass.draws_to_frame() {
                first_to_frame = false;
            }
            report.executed_passes.push(pass.index);
        }
        Ok(())
    }

    /// Close whatever the failed frame left open on the device
    fn abort(&mut self, device: &mut dyn RenderDevice) {
        if self.pass_open {
            if let Err(e) = device.end_render_pass() {
                log::warn!("Failed to end render pass of aborted frame: {}", e);
            }
        }
        if let Err(e) = device.end_frame() {
            log::warn!("Failed to end aborted frame: {}", e);
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.state = ExecutorState::FramePresent;
        self.pass_open = false;
        self.trace.clear();
    }

    fn execute_pass(
        &mut self,
        device: &mut dyn RenderDevice,
        resources: &FrameResources<'_>,
        pass: &PassDescriptor,
        frame: &FrameUniforms,
        first_to_frame: bool,
        report: &mut FrameReport,
    ) -> SceneResult<()> {
        let not_ready = |resource: &str| SceneError::ResourceNotReady {
            resource: resource.to_string(),
            pass: Some(pass.index),
        };

        // Target
        self.advance(ExecutorState::BindingTarget);
        let framebuffer = match pass.target {
            Some(_) => Some(
                resources
                    .targets
                    .framebuffer(pass.index)
                    .ok_or_else(|| not_ready(&pass.name))?,
            ),
            None => None,
        };
        let (color_load, depth_load) = pass.settings.load_ops(
            !pass.draws_to_frame(),
            first_to_frame && pass.draws_to_frame(),
            resources.clear_color,
        );
        device.begin_render_pass(&RenderPassDescriptor {
            label: Some(pass.name.clone()),
            framebuffer,
            color_load,
            depth_load,
        })?;
        self.pass_open = true;
        device.set_pipeline(resources.shaders.get(pass.program).handle, &pass.pipeline)?;

        // Inputs and per-frame uniforms
        self.advance(ExecutorState::BindingResources);
        for input in &pass.inputs {
            let name = resources.registry.textures.name(input.texture);
            let view = resources
                .targets
                .view(input.texture)
                .ok_or_else(|| not_ready(name))?;
            let sampler = resources
                .targets
                .sampler(input.texture)
                .ok_or_else(|| not_ready(name))?;
            device.bind_texture(input.slot, &input.sampler_name, view, sampler)?;
        }
        for (name, binding) in &pass.uniforms {
            let value = match binding {
                UniformBinding::Value(value) => *value,
                UniformBinding::Builtin(builtin) if !builtin.is_per_object() => {
                    frame.evaluate(*builtin, Mat4::IDENTITY)
                }
                UniformBinding::Builtin(_) => continue,
            };
            device.set_uniform(name, &value)?;
        }

        // Objects
        self.advance(ExecutorState::Drawing);
        for &object in &pass.objects {
            let object_name = resources.registry.objects.name(object);
            let mesh = resources
                .meshes
                .get(&object)
                .ok_or_else(|| not_ready(object_name))?;
            let model = resources.registry.objects.get(object).transform.matrix();

            let drawn = Self::draw_object(device, pass, frame, model, mesh);
            match drawn {
                Ok(()) => report.draw_calls += 1,
                Err(source) => {
                    let error = DrawError {
                        pass: pass.index,
                        pass_name: pass.name.clone(),
                        object: object_name.to_string(),
                        source,
                    };
                    log::warn!("{}", error);
                    report.draw_errors.push(error);
                    break;
                }
            }
        }

        self.pass_open = false;
        device.end_render_pass()?;
        self.advance(ExecutorState::Idle);
        Ok(())
    }

    fn draw_object(
        device: &mut dyn RenderDevice,
        pass: &PassDescriptor,
        frame: &FrameUniforms,
        model: Mat4,
        mesh: &GpuMesh,
    ) -> BackendResult<()> {
        for (name, binding) in &pass.uniforms {
            if let UniformBinding::Builtin(builtin) = binding {
                if builtin.is_per_object() {
                    device.set_uniform(name, &frame.evaluate(*builtin, model))?;
                }
            }
        }
        device.draw_indexed(mesh.vertex_buffer, mesh.index_buffer, mesh.index_count)
    }
}
