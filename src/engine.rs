//! Main engine orchestrator

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::backend::traits::*;
use crate::error::{SceneError, SceneResult};
use crate::render_graph::{
    compile, CompiledGraph, ExecutorState, FrameExecutor, FrameInput, FrameReport,
    FrameResources, PassDescriptor, RenderGraph, RenderTargetManager,
};
use crate::resources::{build_mesh, AssetLoader, GpuMesh, ShaderCache};
use crate::scene::{
    CameraInput, CameraModel, ObjectHandle, ResourceRegistry, SceneDescription, SceneFormat,
    Transform,
};
use crate::EngineConfig;

/// Lifecycle of the active scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// No scene is active; `error` holds the last load failure
    NotLoaded { error: Option<String> },
    /// A scene was just installed and has not completed a frame yet
    FirstFrame,
    Loaded,
    /// The last reload failed; the previous scene is still active
    ReloadError { error: String },
}

/// Where the active scene came from, so it can be loaded again
#[derive(Debug, Clone)]
enum SceneSource {
    File(PathBuf),
    Text { text: String, format: SceneFormat },
}

/// A scene compiled and resident on the device
#[derive(Debug)]
pub struct LoadedScene {
    pub description: SceneDescription,
    pub registry: ResourceRegistry,
    pub shaders: ShaderCache,
    /// In declaration order
    pub passes: Vec<PassDescriptor>,
    pub graph: CompiledGraph,
    pub targets: RenderTargetManager,
    pub meshes: HashMap<ObjectHandle, GpuMesh>,
}

impl LoadedScene {
    /// Compile a description and create its device resources.
    ///
    /// Either the whole scene is built or nothing stays allocated.
    pub fn build(
        device: &mut dyn RenderDevice,
        loader: &dyn AssetLoader,
        description: SceneDescription,
        viewport: (u32, u32),
    ) -> SceneResult<Self> {
        let registry = ResourceRegistry::from_description(&description)?;
        let mut scene = Self {
            description,
            registry,
            shaders: ShaderCache::new(),
            passes: Vec::new(),
            graph: CompiledGraph::default(),
            targets: RenderTargetManager::new(viewport),
            meshes: HashMap::new(),
        };

        match scene.populate(device, loader) {
            Ok(()) => Ok(scene),
            Err(e) => {
                scene.release(device);
                Err(e)
            }
        }
    }

    fn populate(
        &mut self,
        device: &mut dyn RenderDevice,
        loader: &dyn AssetLoader,
    ) -> SceneResult<()> {
        for desc in &self.description.passes {
            self.shaders.load(
                device,
                loader,
                &desc.vertex_shader,
                &desc.fragment_shader,
                &desc.path,
            )?;
        }

        self.passes = self
            .description
            .passes
            .iter()
            .enumerate()
            .map(|(index, desc)| compile(desc, index, &self.registry, &self.shaders))
            .collect::<SceneResult<Vec<_>>>()?;
        self.graph = RenderGraph::build(&self.passes, &self.registry.textures)?;

        for (handle, name, object) in self.registry.objects.iter() {
            let path = format!("objects[{}]", handle.index());
            let mesh = build_mesh(&object.geometry, loader, &path)?;
            let gpu = GpuMesh::create(device, &mesh, name)?;
            self.meshes.insert(handle, gpu);
        }

        self.targets
            .allocate_resources(device, loader, &self.registry.textures, &self.passes)
    }

    /// Passes in execution order
    pub fn ordered_passes(&self) -> impl Iterator<Item = &PassDescriptor> + '_ {
        self.graph.pass_order.iter().map(|&i| &self.passes[i])
    }

    /// Pass names in execution order
    pub fn pass_order(&self) -> Vec<&str> {
        self.ordered_passes().map(|pass| pass.name.as_str()).collect()
    }

    /// Destroy every device resource of this scene
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        self.targets.release(device);
        for (_, mesh) in self.meshes.drain() {
            mesh.destroy(device);
        }
        self.shaders.release(device);
    }
}

/// The main engine: owns the device, the asset loader and the active scene
pub struct Engine<D: RenderDevice, L: AssetLoader> {
    device: D,
    loader: L,
    config: EngineConfig,
    scene: Option<LoadedScene>,
    source: Option<SceneSource>,
    state: EngineState,
    executor: FrameExecutor,
    viewport: (u32, u32),
    reload_pending: bool,
    frame_count: u64,
}

impl<D: RenderDevice, L: AssetLoader> Engine<D, L> {
    pub fn new(device: D, loader: L, config: EngineConfig) -> Self {
        log::info!("Engine created on {}", device.name());
        Self {
            viewport: (config.width, config.height),
            device,
            loader,
            config,
            scene: None,
            source: None,
            state: EngineState::NotLoaded { error: None },
            executor: FrameExecutor::new(),
            reload_pending: false,
            frame_count: 0,
        }
    }

    /// Load a JSON or RON scene file
    pub fn load_scene(&mut self, path: &Path) -> SceneResult<()> {
        let result = SceneFormat::from_path(path)
            .and_then(|format| {
                let text = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                SceneDescription::parse(&text, format, &path.display().to_string())
            })
            .and_then(|description| self.install(description));
        self.source = Some(SceneSource::File(path.to_path_buf()));
        self.record(result)
    }

    /// Load a scene from text
    pub fn load_scene_str(&mut self, text: &str, format: SceneFormat) -> SceneResult<()> {
        let result = SceneDescription::parse(text, format, "<inline scene>")
            .and_then(|description| self.install(description));
        self.source = Some(SceneSource::Text {
            text: text.to_string(),
            format,
        });
        self.record(result)
    }

    /// Replace the active scene with a freshly built one
    fn install(&mut self, description: SceneDescription) -> SceneResult<()> {
        let mut scene =
            LoadedScene::build(&mut self.device, &self.loader, description, self.viewport)?;
        scene.registry.camera.clamp_pitch(self.config.pitch_limit);

        if let Some(mut old) = self.scene.take() {
            if old.registry.camera.same_kind(&scene.registry.camera) {
                scene.registry.camera.kind = old.registry.camera.kind;
            }
            old.release(&mut self.device);
        }

        log::info!(
            "Scene loaded: {} objects, {} textures, passes {:?}",
            scene.registry.objects.len(),
            scene.registry.textures.len(),
            scene.pass_order()
        );
        self.scene = Some(scene);
        Ok(())
    }

    fn record(&mut self, result: SceneResult<()>) -> SceneResult<()> {
        match &result {
            Ok(()) => self.state = EngineState::FirstFrame,
            Err(e) => {
                log::error!("Scene rejected: {}", e);
                self.state = if self.scene.is_some() {
                    EngineState::ReloadError {
                        error: e.to_string(),
                    }
                } else {
                    EngineState::NotLoaded {
                        error: Some(e.to_string()),
                    }
                };
            }
        }
        result
    }

    /// Reload the scene at the next frame boundary
    pub fn request_reload(&mut self) {
        self.reload_pending = true;
    }

    pub fn reload_pending(&self) -> bool {
        self.reload_pending
    }

    /// Load the active scene's source again right away
    pub fn reload(&mut self) -> SceneResult<()> {
        self.reload_pending = false;
        match self.source.clone() {
            Some(SceneSource::File(path)) => {
                log::info!("Reloading {:?}", path);
                self.load_scene(&path)
            }
            Some(SceneSource::Text { text, format }) => {
                log::info!("Reloading inline scene");
                self.load_scene_str(&text, format)
            }
            None => Err(SceneError::ResourceNotReady {
                resource: "scene".to_string(),
                pass: None,
            }),
        }
    }

    /// Run one frame: pending reload, resize, camera update, passes, present
    pub fn render_frame(
        &mut self,
        input: &FrameInput,
        camera_input: &CameraInput,
    ) -> SceneResult<FrameReport> {
        if self.reload_pending {
            // A failed reload leaves the previous scene running
            if let Err(e) = self.reload() {
                log::warn!("Keeping previous scene: {}", e);
            }
        }

        let Some(scene) = self.scene.as_mut() else {
            return Err(SceneError::ResourceNotReady {
                resource: "scene".to_string(),
                pass: None,
            });
        };

        scene.targets.resize(
            &mut self.device,
            &scene.registry.textures,
            &scene.passes,
            input.viewport,
        )?;
        self.viewport = scene.targets.viewport();

        scene.registry.camera.update(
            camera_input,
            &self.config.control_settings(),
            input.delta_time,
        );

        let resources = FrameResources {
            passes: &scene.passes,
            order: &scene.graph.pass_order,
            registry: &scene.registry,
            shaders: &scene.shaders,
            meshes: &scene.meshes,
            targets: &scene.targets,
            camera: &scene.registry.camera,
            clear_color: self.config.clear_color,
        };
        let report = self.executor.execute(&mut self.device, &resources, input)?;

        self.frame_count += 1;
        if self.state == EngineState::FirstFrame {
            self.state = EngineState::Loaded;
        }
        Ok(report)
    }

    /// Release the active scene
    pub fn unload(&mut self) {
        if let Some(mut scene) = self.scene.take() {
            scene.release(&mut self.device);
            log::info!("Scene unloaded");
        }
        self.source = None;
        self.state = EngineState::NotLoaded { error: None };
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn scene(&self) -> Option<&LoadedScene> {
        self.scene.as_ref()
    }

    /// Path of the scene file, when loaded from disk
    pub fn scene_path(&self) -> Option<&Path> {
        match &self.source {
            Some(SceneSource::File(path)) => Some(path),
            _ => None,
        }
    }

    pub fn camera(&self) -> Option<&CameraModel> {
        self.scene.as_ref().map(|scene| &scene.registry.camera)
    }

    /// Mutable transform of a named object, for animation between frames
    pub fn object_transform_mut(&mut self, name: &str) -> SceneResult<&mut Transform> {
        let scene = self.scene.as_mut().ok_or_else(|| SceneError::ResourceNotReady {
            resource: "scene".to_string(),
            pass: None,
        })?;
        let handle = scene.registry.objects.resolve(name, "engine")?;
        Ok(&mut scene.registry.objects.get_mut(handle).transform)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn executor_state(&self) -> ExecutorState {
        self.executor.state()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}
