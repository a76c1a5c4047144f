//! Common utilities for shadertool integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};

use shadertool::backend::{Command, HeadlessDevice, UniformValue};
use shadertool::resources::MemoryAssetLoader;
use shadertool::scene::{CameraInput, SceneFormat};
use shadertool::{Engine, EngineConfig, FrameInput, FrameReport, SceneResult};

pub type TestEngine = Engine<HeadlessDevice, MemoryAssetLoader>;

pub const QUAD_VERT: &str = "\
in vec3 position;
in vec2 tex_coord;
uniform mat4 model;
uniform mat4 view;
uniform mat4 projection;
void main() {}
";

pub const LIT_FRAG: &str = "\
uniform vec3 light_pos = vec3(0.5, 10, 0.5);
uniform float time;
uniform vec2 window_size;
void main() {}
";

pub const BROKEN_FRAG: &str = "\
#error missing semicolon
void main() {}
";

pub const DEFAULT_VIEWPORT: (u32, u32) = (800, 600);

/// Loader holding the standard shader pair
pub fn loader() -> MemoryAssetLoader {
    MemoryAssetLoader::new()
        .with_text("quad.vert", QUAD_VERT)
        .with_text("lit.frag", LIT_FRAG)
        .with_text("broken.frag", BROKEN_FRAG)
}

pub fn engine() -> TestEngine {
    engine_with(loader())
}

pub fn engine_with(loader: MemoryAssetLoader) -> TestEngine {
    let config = EngineConfig {
        width: DEFAULT_VIEWPORT.0,
        height: DEFAULT_VIEWPORT.1,
        clear_color: [0.1, 0.2, 0.3, 1.0],
        ..Default::default()
    };
    Engine::new(HeadlessDevice::new(), loader, config)
}

/// A pass drawing the `quad` object with the standard shaders.
///
/// An empty `writes` list draws to the framebuffer.
pub fn pass(name: &str, reads: &[&str], writes: &[&str]) -> Value {
    let mut pass = json!({
        "name": name,
        "vertex_shader": "quad.vert",
        "fragment_shader": "lit.frag",
        "objects": ["quad"],
        "textures": reads,
    });
    if !writes.is_empty() {
        pass["target"] = json!({ "color": writes });
    }
    pass
}

/// A scene with one screen quad and viewport sized color textures
pub fn scene(textures: &[&str], passes: Vec<Value>) -> Value {
    let textures: Vec<Value> = textures
        .iter()
        .map(|name| json!({ "name": name, "kind": { "empty": { "size": "viewport" } } }))
        .collect();
    json!({
        "objects": [{ "name": "quad", "kind": "screen_quad" }],
        "textures": textures,
        "passes": passes,
    })
}

pub fn load(engine: &mut TestEngine, scene: &Value) -> SceneResult<()> {
    engine.load_scene_str(&scene.to_string(), SceneFormat::Json)
}

/// Render one frame at `viewport` with no camera input
pub fn render(engine: &mut TestEngine, viewport: (u32, u32)) -> FrameReport {
    engine
        .render_frame(&FrameInput::new(viewport), &CameraInput::new())
        .expect("frame should render")
}

/// Labels of the render passes recorded, in submission order
pub fn pass_labels(commands: &[Command]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::BeginRenderPass { label, .. } => label.clone(),
            _ => None,
        })
        .collect()
}

/// Commands recorded inside the first render pass with this label
pub fn pass_commands<'a>(commands: &'a [Command], label: &str) -> &'a [Command] {
    let start = commands
        .iter()
        .position(|command| {
            matches!(command, Command::BeginRenderPass { label: Some(l), .. } if l == label)
        })
        .unwrap_or_else(|| panic!("no render pass labelled `{label}`"));
    let len = commands[start..]
        .iter()
        .position(|command| matches!(command, Command::EndRenderPass))
        .expect("render pass should be closed");
    &commands[start..start + len + 1]
}

/// Every value uploaded to the named uniform, in order
pub fn uniform_uploads(commands: &[Command], name: &str) -> Vec<UniformValue> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::SetUniform { name: n, value } if n == name => Some(*value),
            _ => None,
        })
        .collect()
}

pub fn draw_count(commands: &[Command]) -> usize {
    commands
        .iter()
        .filter(|command| matches!(command, Command::DrawIndexed { .. }))
        .count()
}
