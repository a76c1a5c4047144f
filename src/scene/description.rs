//! Scene description parsing
//!
//! Scene text (JSON or RON) is read into a value tree and deserialized into
//! the `Raw*` model, which mirrors the file layout. Validation then lowers it
//! into typed descriptions. Every error produced here names the offending
//! entry by key path, e.g. `passes[1].settings.cull`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;

use crate::backend::types::{
    AddressMode, BlendState, CompareFunction, CullMode, DepthLoadOp, DepthState, FilterMode,
    FrontFace, LoadOp, PipelineState, SamplerDescriptor, TextureFormat, UniformValue,
};
use crate::error::{SceneError, SceneResult};
use crate::scene::camera::{CameraKind, CameraModel, FreeCamera, LookAtCamera, OrbitalCamera};
use crate::scene::transform::Transform;

/// Supported scene file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneFormat {
    Json,
    Ron,
}

impl SceneFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> SceneResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(SceneFormat::Json),
            Some("ron") => Ok(SceneFormat::Ron),
            _ => Err(SceneError::InvalidConfig {
                path: path.display().to_string(),
                value: format!("{:?}", path.extension().unwrap_or_default()),
                expected: "a .json or .ron scene file".to_string(),
            }),
        }
    }

    /// Parse text into the untyped value tree
    pub fn parse(self, text: &str, origin: &str) -> SceneResult<Value> {
        let result = match self {
            SceneFormat::Json => serde_json::from_str::<Value>(text).map_err(|e| e.to_string()),
            SceneFormat::Ron => ron::from_str::<Value>(text).map_err(|e| e.to_string()),
        };
        result.map_err(|message| SceneError::Parse {
            origin: origin.to_string(),
            message,
        })
    }
}

/// Geometry of an object
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryKind {
    Cube { width: f32, height: f32, depth: f32 },
    Sphere { radius: f32, segments: u32, rings: u32 },
    Plane { width: f32, depth: f32 },
    ScreenQuad,
    /// Wavefront OBJ file
    Mesh(PathBuf),
}

/// Size of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSize {
    /// Follows the current viewport
    Viewport,
    Fixed { width: u32, height: u32 },
}

impl TargetSize {
    pub fn resolve(&self, viewport: (u32, u32)) -> (u32, u32) {
        match *self {
            TargetSize::Viewport => viewport,
            TargetSize::Fixed { width, height } => (width, height),
        }
    }
}

/// Where a texture's pixels come from
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    File(PathBuf),
    Empty { size: TargetSize, format: TextureFormat },
    Depth { size: TargetSize, format: TextureFormat },
}

impl TextureSource {
    pub fn size(&self) -> Option<TargetSize> {
        match self {
            TextureSource::File(_) => None,
            TextureSource::Empty { size, .. } | TextureSource::Depth { size, .. } => Some(*size),
        }
    }

    pub fn is_viewport_bound(&self) -> bool {
        self.size() == Some(TargetSize::Viewport)
    }
}

/// Sampler settings of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingDesc {
    pub wrap: AddressMode,
    pub filter: FilterMode,
}

impl Default for SamplingDesc {
    fn default() -> Self {
        Self {
            wrap: AddressMode::Repeat,
            filter: FilterMode::Linear,
        }
    }
}

impl SamplingDesc {
    pub fn sampler_descriptor(&self, label: &str) -> SamplerDescriptor {
        SamplerDescriptor {
            label: Some(label.to_string()),
            mag_filter: self.filter,
            min_filter: self.filter,
            address_mode: self.wrap,
        }
    }
}

/// A name together with the key path it was written at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRef {
    pub name: String,
    pub path: String,
}

/// A texture read by a pass, optionally renamed for the shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureInput {
    pub name: String,
    pub alias: Option<String>,
    pub path: String,
}

impl TextureInput {
    /// Name the shader sees this texture under
    pub fn binding_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDesc {
    pub color: Vec<NameRef>,
    pub depth: Option<NameRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullSetting {
    Clockwise,
    #[default]
    CounterClockwise,
    #[serde(alias = "disabled")]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendSetting {
    #[default]
    None,
    Alpha,
    Additive,
}

/// How a pass treats the previous contents of its target
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearSetting {
    /// Offscreen targets clear to transparent black and depth 1.0; the
    /// first framebuffer pass of a frame clears to the engine clear color
    Default,
    Never,
    Values { color: [f32; 4], depth: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSettings {
    pub cull: CullSetting,
    /// `None` disables depth testing
    pub depth: Option<DepthState>,
    pub blend: BlendSetting,
    pub clear: ClearSetting,
}

impl Default for PassSettings {
    fn default() -> Self {
        Self {
            cull: CullSetting::CounterClockwise,
            depth: Some(DepthState::default()),
            blend: BlendSetting::None,
            clear: ClearSetting::Default,
        }
    }
}

impl PassSettings {
    pub fn pipeline_state(&self) -> PipelineState {
        let (front_face, cull_mode) = match self.cull {
            CullSetting::Clockwise => (FrontFace::Cw, CullMode::Back),
            CullSetting::CounterClockwise => (FrontFace::Ccw, CullMode::Back),
            CullSetting::None => (FrontFace::Ccw, CullMode::None),
        };
        let blend = match self.blend {
            BlendSetting::None => None,
            BlendSetting::Alpha => Some(BlendState::alpha_blending()),
            BlendSetting::Additive => Some(BlendState::additive()),
        };
        PipelineState {
            front_face,
            cull_mode,
            depth: self.depth,
            blend,
        }
    }

    /// Load operations for a pass; `first_to_frame` marks the first pass of
    /// the frame drawing into the final framebuffer
    pub fn load_ops(
        &self,
        offscreen: bool,
        first_to_frame: bool,
        clear_color: [f32; 4],
    ) -> (LoadOp, DepthLoadOp) {
        match self.clear {
            ClearSetting::Never => (LoadOp::Load, DepthLoadOp::Load),
            ClearSetting::Values { color, depth } => (LoadOp::Clear(color), DepthLoadOp::Clear(depth)),
            ClearSetting::Default if offscreen => {
                (LoadOp::Clear([0.0; 4]), DepthLoadOp::Clear(1.0))
            }
            ClearSetting::Default if first_to_frame => {
                (LoadOp::Clear(clear_color), DepthLoadOp::Clear(1.0))
            }
            ClearSetting::Default => (LoadOp::Load, DepthLoadOp::Load),
        }
    }
}

/// A literal uniform value written in a pass
#[derive(Debug, Clone, PartialEq)]
pub struct UniformOverride {
    pub value: UniformValue,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDesc {
    pub name: String,
    pub path: String,
    pub geometry: GeometryKind,
    pub transform: Transform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub name: String,
    pub path: String,
    pub source: TextureSource,
    pub sampling: SamplingDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassDesc {
    pub name: String,
    pub path: String,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub objects: Vec<NameRef>,
    pub textures: Vec<TextureInput>,
    /// `None` draws to the final framebuffer
    pub target: Option<TargetDesc>,
    pub settings: PassSettings,
    pub uniforms: BTreeMap<String, UniformOverride>,
}

/// A parsed but not yet resolved scene
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDescription {
    pub objects: Vec<ObjectDesc>,
    pub textures: Vec<TextureDesc>,
    pub camera: CameraModel,
    pub passes: Vec<PassDesc>,
}

impl SceneDescription {
    /// Parse scene text in the given format
    pub fn parse(text: &str, format: SceneFormat, origin: &str) -> SceneResult<Self> {
        let value = format.parse(text, origin)?;
        Self::from_value(&value)
    }

    /// Deserialize and validate a value tree
    pub fn from_value(value: &Value) -> SceneResult<Self> {
        let raw: RawScene =
            serde_path_to_error::deserialize(value).map_err(|e| deserialize_error(value, e))?;
        for key in raw.unknown.keys() {
            log::debug!("Ignoring unknown scene key `{key}`");
        }
        raw.validate()
    }
}

/// Turn a serde failure into a key-path error
fn deserialize_error(
    root: &Value,
    error: serde_path_to_error::Error<serde_json::Error>,
) -> SceneError {
    let path = match error.path().to_string() {
        path if path == "." => "<root>".to_string(),
        path => path,
    };
    let found = lookup(root, error.path()).map_or_else(String::new, Value::to_string);
    let message = error.into_inner().to_string();

    if let Some(field) = message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.strip_suffix('`'))
    {
        return SceneError::MissingField {
            path,
            field: field.to_string(),
        };
    }
    if let Some((variant, expected)) = message
        .strip_prefix("unknown variant ")
        .and_then(|rest| rest.split_once(", expected "))
    {
        return SceneError::InvalidConfig {
            path,
            value: variant.to_string(),
            expected: expected.to_string(),
        };
    }
    let expected = match message.split_once(", expected ") {
        Some((_, expected)) => expected.to_string(),
        None => message,
    };
    SceneError::InvalidConfig {
        path,
        value: found,
        expected,
    }
}

/// Value at a deserializer path
fn lookup<'a>(root: &'a Value, path: &serde_path_to_error::Path) -> Option<&'a Value> {
    use serde_path_to_error::Segment;

    path.iter().try_fold(root, |value, segment| match segment {
        Segment::Seq { index } => value.get(*index),
        Segment::Map { key } => value.get(key.as_str()),
        Segment::Enum { variant } => value.get(variant.as_str()).or(Some(value)),
        Segment::Unknown => None,
    })
}

fn positive(path: &str, value: f32) -> SceneResult<f32> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(SceneError::InvalidConfig {
            path: path.to_string(),
            value: value.to_string(),
            expected: "a number greater than 0".to_string(),
        })
    }
}

const fn one() -> f32 {
    1.0
}

const fn enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawScene {
    #[serde(default)]
    objects: Vec<RawObject>,
    #[serde(default)]
    textures: Vec<RawTexture>,
    #[serde(default)]
    camera: Option<RawCamera>,
    #[serde(default)]
    passes: Vec<RawPass>,
    #[serde(flatten)]
    unknown: BTreeMap<String, IgnoredAny>,
}

impl RawScene {
    fn validate(self) -> SceneResult<SceneDescription> {
        let objects = self
            .objects
            .into_iter()
            .enumerate()
            .map(|(i, object)| object.validate(format!("objects[{i}]")))
            .collect::<SceneResult<Vec<_>>>()?;
        let textures = self
            .textures
            .into_iter()
            .enumerate()
            .map(|(i, texture)| texture.validate(format!("textures[{i}]")))
            .collect::<SceneResult<Vec<_>>>()?;
        let camera = match self.camera {
            Some(camera) => camera.validate()?,
            None => CameraModel::default(),
        };
        let passes = self
            .passes
            .into_iter()
            .enumerate()
            .map(|(i, pass)| pass.validate(i))
            .collect::<SceneResult<Vec<_>>>()?;

        Ok(SceneDescription {
            objects,
            textures,
            camera,
            passes,
        })
    }
}

// Objects

#[derive(Debug, Deserialize)]
struct RawObject {
    name: String,
    kind: RawGeometry,
    #[serde(default)]
    position: [f32; 3],
    /// Euler angles in degrees
    #[serde(default)]
    rotation: [f32; 3],
    #[serde(default)]
    scale: Option<RawScale>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawGeometry {
    ScreenQuad,
    Cube {
        #[serde(default = "one")]
        width: f32,
        #[serde(default = "one")]
        height: f32,
        #[serde(default = "one")]
        depth: f32,
    },
    Sphere {
        #[serde(default = "RawGeometry::default_radius")]
        radius: f32,
        #[serde(default = "RawGeometry::default_segments")]
        segments: u32,
        #[serde(default = "RawGeometry::default_rings")]
        rings: u32,
    },
    Plane {
        #[serde(default = "one")]
        width: f32,
        #[serde(default = "one")]
        depth: f32,
    },
    /// Wavefront OBJ file
    Mesh(PathBuf),
}

impl RawGeometry {
    const fn default_radius() -> f32 {
        0.5
    }

    const fn default_segments() -> u32 {
        32
    }

    const fn default_rings() -> u32 {
        16
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged, expecting = "a number or a list of 3 numbers")]
enum RawScale {
    Uniform(f32),
    Axes([f32; 3]),
}

impl RawObject {
    fn validate(self, path: String) -> SceneResult<ObjectDesc> {
        let kind = |tag: &str, field: &str| format!("{path}.kind.{tag}.{field}");
        let geometry = match self.kind {
            RawGeometry::ScreenQuad => GeometryKind::ScreenQuad,
            RawGeometry::Cube {
                width,
                height,
                depth,
            } => GeometryKind::Cube {
                width: positive(&kind("cube", "width"), width)?,
                height: positive(&kind("cube", "height"), height)?,
                depth: positive(&kind("cube", "depth"), depth)?,
            },
            RawGeometry::Sphere {
                radius,
                segments,
                rings,
            } => {
                if segments < 3 || rings < 2 {
                    return Err(SceneError::InvalidConfig {
                        path: format!("{path}.kind.sphere"),
                        value: format!("{segments} segments and {rings} rings"),
                        expected: "at least 3 segments and 2 rings".to_string(),
                    });
                }
                GeometryKind::Sphere {
                    radius: positive(&kind("sphere", "radius"), radius)?,
                    segments,
                    rings,
                }
            }
            RawGeometry::Plane { width, depth } => GeometryKind::Plane {
                width: positive(&kind("plane", "width"), width)?,
                depth: positive(&kind("plane", "depth"), depth)?,
            },
            RawGeometry::Mesh(file) => GeometryKind::Mesh(file),
        };

        let scale = match self.scale {
            Some(RawScale::Uniform(s)) => Vec3::splat(s),
            Some(RawScale::Axes(axes)) => Vec3::from_array(axes),
            None => Vec3::ONE,
        };

        Ok(ObjectDesc {
            name: self.name,
            path,
            geometry,
            transform: Transform::from_components(
                Vec3::from_array(self.position),
                Vec3::from_array(self.rotation),
                scale,
            ),
        })
    }
}

// Textures

#[derive(Debug, Deserialize)]
struct RawTexture {
    name: String,
    kind: RawTextureKind,
    #[serde(default)]
    wrap: WrapSetting,
    #[serde(default)]
    filter: FilterSetting,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawTextureKind {
    File(PathBuf),
    Empty {
        #[serde(default)]
        size: RawSize,
        #[serde(default)]
        format: ColorFormat,
    },
    Depth {
        #[serde(default)]
        size: RawSize,
        #[serde(default)]
        format: DepthFormat,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged, expecting = "\"viewport\" or {width, height}")]
enum RawSize {
    Viewport(ViewportSize),
    Fixed { width: u32, height: u32 },
}

impl Default for RawSize {
    fn default() -> Self {
        RawSize::Viewport(ViewportSize::Viewport)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ViewportSize {
    #[serde(alias = "view_port")]
    Viewport,
}

impl RawSize {
    fn validate(self, path: String) -> SceneResult<TargetSize> {
        match self {
            RawSize::Viewport(_) => Ok(TargetSize::Viewport),
            RawSize::Fixed { width, height } if width == 0 || height == 0 => {
                Err(SceneError::InvalidConfig {
                    path,
                    value: format!("{width}x{height}"),
                    expected: "a non-zero width and height".to_string(),
                })
            }
            RawSize::Fixed { width, height } => Ok(TargetSize::Fixed { width, height }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ColorFormat {
    Rgba8,
    Rgba16f,
    #[default]
    Rgba32f,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DepthFormat {
    Depth24,
    #[default]
    Depth32f,
}

impl From<ColorFormat> for TextureFormat {
    fn from(format: ColorFormat) -> Self {
        match format {
            ColorFormat::Rgba8 => TextureFormat::Rgba8Unorm,
            ColorFormat::Rgba16f => TextureFormat::Rgba16Float,
            ColorFormat::Rgba32f => TextureFormat::Rgba32Float,
        }
    }
}

impl From<DepthFormat> for TextureFormat {
    fn from(format: DepthFormat) -> Self {
        match format {
            DepthFormat::Depth24 => TextureFormat::Depth24Plus,
            DepthFormat::Depth32f => TextureFormat::Depth32Float,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WrapSetting {
    #[default]
    Repeat,
    Clamp,
    Mirror,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FilterSetting {
    #[default]
    Linear,
    Nearest,
}

impl RawTexture {
    fn validate(self, path: String) -> SceneResult<TextureDesc> {
        let source = match self.kind {
            RawTextureKind::File(file) => TextureSource::File(file),
            RawTextureKind::Empty { size, format } => TextureSource::Empty {
                size: size.validate(format!("{path}.kind.empty.size"))?,
                format: format.into(),
            },
            RawTextureKind::Depth { size, format } => TextureSource::Depth {
                size: size.validate(format!("{path}.kind.depth.size"))?,
                format: format.into(),
            },
        };
        let sampling = SamplingDesc {
            wrap: match self.wrap {
                WrapSetting::Repeat => AddressMode::Repeat,
                WrapSetting::Clamp => AddressMode::ClampToEdge,
                WrapSetting::Mirror => AddressMode::MirrorRepeat,
            },
            filter: match self.filter {
                FilterSetting::Linear => FilterMode::Linear,
                FilterSetting::Nearest => FilterMode::Nearest,
            },
        };

        Ok(TextureDesc {
            name: self.name,
            path,
            source,
            sampling,
        })
    }
}

// Camera

#[derive(Debug, Deserialize)]
struct RawCamera {
    #[serde(default)]
    kind: Option<RawCameraKind>,
    /// Vertical field of view in degrees
    #[serde(default = "RawCamera::default_fov")]
    fov: f32,
    #[serde(default)]
    sensitivity: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawCameraKind {
    Orbital {
        #[serde(default)]
        center: [f32; 3],
        #[serde(default = "RawCamera::default_distance")]
        distance: f32,
        #[serde(default)]
        yaw: f32,
        #[serde(default)]
        pitch: f32,
    },
    Free {
        #[serde(default = "RawCamera::default_eye")]
        position: [f32; 3],
        #[serde(default)]
        yaw: f32,
        #[serde(default)]
        pitch: f32,
    },
    LookAt {
        #[serde(default = "RawCamera::default_eye")]
        from: [f32; 3],
        #[serde(default)]
        to: [f32; 3],
        #[serde(default = "RawCamera::default_up")]
        up: [f32; 3],
    },
}

impl RawCamera {
    const fn default_fov() -> f32 {
        60.0
    }

    const fn default_distance() -> f32 {
        10.0
    }

    const fn default_eye() -> [f32; 3] {
        [0.0, 0.0, 5.0]
    }

    const fn default_up() -> [f32; 3] {
        [0.0, 1.0, 0.0]
    }

    fn validate(self) -> SceneResult<CameraModel> {
        let kind = match self.kind {
            None => CameraModel::default().kind,
            Some(RawCameraKind::Orbital {
                center,
                distance,
                yaw,
                pitch,
            }) => {
                let distance = positive("camera.kind.orbital.distance", distance)?;
                let mut orbit = OrbitalCamera::new(Vec3::from_array(center), distance);
                orbit.yaw = yaw.rem_euclid(360.0);
                orbit.pitch = pitch;
                CameraKind::Orbital(orbit)
            }
            Some(RawCameraKind::Free {
                position,
                yaw,
                pitch,
            }) => CameraKind::Free(FreeCamera {
                position: Vec3::from_array(position),
                yaw,
                pitch,
            }),
            Some(RawCameraKind::LookAt { from, to, up }) => CameraKind::LookAt(LookAtCamera {
                from: Vec3::from_array(from),
                to: Vec3::from_array(to),
                up: Vec3::from_array(up),
            }),
        };

        if !(self.fov > 0.0 && self.fov < 180.0) {
            return Err(SceneError::InvalidConfig {
                path: "camera.fov".to_string(),
                value: self.fov.to_string(),
                expected: "a field of view between 0 and 180 degrees".to_string(),
            });
        }
        let sensitivity = self
            .sensitivity
            .map(|s| positive("camera.sensitivity", s))
            .transpose()?;

        Ok(CameraModel {
            kind,
            fov: self.fov,
            sensitivity,
        })
    }
}

// Passes

#[derive(Debug, Deserialize)]
struct RawPass {
    #[serde(default)]
    name: Option<String>,
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,
    #[serde(default)]
    objects: Vec<String>,
    #[serde(default)]
    textures: Vec<RawTextureInput>,
    /// Absent or `"frame"` draws to the final framebuffer
    #[serde(default)]
    target: Option<RawTarget>,
    #[serde(default)]
    settings: RawSettings,
    #[serde(default)]
    uniforms: BTreeMap<String, RawUniform>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged, expecting = "a texture name or {name, as}")]
enum RawTextureInput {
    Name(String),
    Renamed {
        name: String,
        #[serde(default, rename = "as")]
        alias: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged, expecting = "\"frame\" or {color, depth}")]
enum RawTarget {
    Frame(FrameTarget),
    Textures {
        #[serde(default)]
        color: Vec<String>,
        #[serde(default)]
        depth: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FrameTarget {
    #[serde(alias = "framebuffer")]
    Frame,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    cull: CullSetting,
    depth: Option<RawDepth>,
    blend: BlendSetting,
    clear: Option<RawClear>,
}

#[derive(Debug, Deserialize)]
#[serde(
    untagged,
    expecting = "a compare function, \"disabled\", true, false, or {test, write}"
)]
enum RawDepth {
    Enabled(bool),
    Test(DepthTest),
    Full {
        #[serde(default)]
        test: Option<DepthTest>,
        #[serde(default = "enabled")]
        write: bool,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DepthTest {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    Always,
    Never,
    #[serde(alias = "none")]
    Disabled,
}

impl DepthTest {
    fn compare(self) -> Option<CompareFunction> {
        Some(match self {
            DepthTest::Less => CompareFunction::Less,
            DepthTest::LessEqual => CompareFunction::LessEqual,
            DepthTest::Greater => CompareFunction::Greater,
            DepthTest::GreaterEqual => CompareFunction::GreaterEqual,
            DepthTest::Equal => CompareFunction::Equal,
            DepthTest::NotEqual => CompareFunction::NotEqual,
            DepthTest::Always => CompareFunction::Always,
            DepthTest::Never => CompareFunction::Never,
            DepthTest::Disabled => return None,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged, expecting = "true, false, or {color, depth}")]
enum RawClear {
    Enabled(bool),
    Values {
        #[serde(default)]
        color: [f32; 4],
        #[serde(default = "one")]
        depth: f32,
    },
}

impl RawSettings {
    fn validate(self) -> PassSettings {
        let depth = match self.depth {
            None | Some(RawDepth::Enabled(true)) => Some(DepthState::default()),
            Some(RawDepth::Enabled(false)) => None,
            Some(RawDepth::Test(test)) => test.compare().map(|compare| DepthState {
                compare,
                write: true,
            }),
            Some(RawDepth::Full { test, write }) => test
                .map_or(Some(CompareFunction::Less), DepthTest::compare)
                .map(|compare| DepthState { compare, write }),
        };
        let clear = match self.clear {
            None | Some(RawClear::Enabled(true)) => ClearSetting::Default,
            Some(RawClear::Enabled(false)) => ClearSetting::Never,
            Some(RawClear::Values { color, depth }) => ClearSetting::Values { color, depth },
        };

        PassSettings {
            cull: self.cull,
            depth,
            blend: self.blend,
            clear,
        }
    }
}

/// Number, 2-4 element list, 16 element list or nested 4x4 list
#[derive(Debug, Clone, Deserialize)]
#[serde(
    untagged,
    expecting = "a number, a list of 2-4 numbers, or a 4x4 matrix"
)]
enum RawUniform {
    Scalar(f32),
    Vector(Vec<f32>),
    Matrix(Vec<Vec<f32>>),
}

impl RawUniform {
    fn value(&self, path: &str) -> SceneResult<UniformValue> {
        let invalid = |found: String| SceneError::InvalidConfig {
            path: path.to_string(),
            value: found,
            expected: "a number, a list of 2-4 numbers, or a 4x4 matrix".to_string(),
        };
        match self {
            RawUniform::Scalar(v) => Ok(UniformValue::Float(*v)),
            RawUniform::Vector(v) => match v.len() {
                2 => Ok(UniformValue::Vec2(Vec2::from_slice(v))),
                3 => Ok(UniformValue::Vec3(Vec3::from_slice(v))),
                4 => Ok(UniformValue::Vec4(Vec4::from_slice(v))),
                16 => Ok(UniformValue::Mat4(Mat4::from_cols_slice(v))),
                _ => Err(invalid(format!("{v:?}"))),
            },
            RawUniform::Matrix(columns) => {
                if columns.len() != 4 || columns.iter().any(|column| column.len() != 4) {
                    return Err(invalid(format!("{columns:?}")));
                }
                let flat: Vec<f32> = columns.iter().flatten().copied().collect();
                Ok(UniformValue::Mat4(Mat4::from_cols_slice(&flat)))
            }
        }
    }
}

impl RawPass {
    fn validate(self, index: usize) -> SceneResult<PassDesc> {
        let path = format!("passes[{index}]");
        let name_ref = |name: String, at: String| NameRef { name, path: at };

        let objects = self
            .objects
            .into_iter()
            .enumerate()
            .map(|(i, name)| name_ref(name, format!("{path}.objects[{i}]")))
            .collect();

        let textures = self
            .textures
            .into_iter()
            .enumerate()
            .map(|(i, input)| {
                let (name, alias) = match input {
                    RawTextureInput::Name(name) => (name, None),
                    RawTextureInput::Renamed { name, alias } => (name, alias),
                };
                TextureInput {
                    name,
                    alias,
                    path: format!("{path}.textures[{i}]"),
                }
            })
            .collect();

        let target = match self.target {
            None | Some(RawTarget::Frame(_)) => None,
            Some(RawTarget::Textures { color, depth }) => {
                if color.is_empty() && depth.is_none() {
                    return Err(SceneError::InvalidConfig {
                        path: format!("{path}.target"),
                        value: "{}".to_string(),
                        expected: "at least one color or depth texture".to_string(),
                    });
                }
                Some(TargetDesc {
                    color: color
                        .into_iter()
                        .enumerate()
                        .map(|(i, name)| name_ref(name, format!("{path}.target.color[{i}]")))
                        .collect(),
                    depth: depth.map(|name| name_ref(name, format!("{path}.target.depth"))),
                })
            }
        };

        let uniforms = self
            .uniforms
            .into_iter()
            .map(|(name, literal)| {
                let at = format!("{path}.uniforms.{name}");
                let value = literal.value(&at)?;
                Ok((name, UniformOverride { value, path: at }))
            })
            .collect::<SceneResult<BTreeMap<_, _>>>()?;

        Ok(PassDesc {
            name: self.name.unwrap_or_else(|| format!("pass{index}")),
            path,
            vertex_shader: self.vertex_shader,
            fragment_shader: self.fragment_shader,
            objects,
            textures,
            target,
            settings: self.settings.validate(),
            uniforms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> SceneResult<SceneDescription> {
        SceneDescription::from_value(&value)
    }

    fn invalid_path(err: SceneError) -> String {
        match err {
            SceneError::InvalidConfig { path, .. } => path,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_minimal_scene() {
        let scene = parse(json!({
            "objects": [{"name": "quad", "kind": "screen_quad"}],
            "passes": [{
                "vertex_shader": "quad.vert",
                "fragment_shader": "quad.frag",
                "objects": ["quad"]
            }]
        }))
        .unwrap();

        assert_eq!(scene.objects[0].geometry, GeometryKind::ScreenQuad);
        assert_eq!(scene.passes[0].name, "pass0");
        assert_eq!(scene.passes[0].objects[0].path, "passes[0].objects[0]");
        assert!(scene.passes[0].target.is_none());
        assert_eq!(scene.camera, CameraModel::default());
    }

    #[test]
    fn test_unknown_top_level_keys_ignored() {
        let scene = parse(json!({"version": 3, "editor": {"zoom": 2}})).unwrap();
        assert!(scene.passes.is_empty());
    }

    #[test]
    fn test_missing_kind_names_entry() {
        let err = parse(json!({"objects": [{"name": "a", "kind": "screen_quad"}, {"name": "b"}]}))
            .unwrap_err();
        assert!(matches!(
            err,
            SceneError::MissingField { ref path, ref field } if path == "objects[1]" && field == "kind"
        ));
    }

    #[test]
    fn test_missing_shader_is_fatal() {
        let err = parse(json!({"passes": [{"vertex_shader": "a.vert"}]})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "passes[0]: missing required field `fragment_shader`"
        );
    }

    #[test]
    fn test_unrecognized_cull_value() {
        let err = parse(json!({"passes": [{
            "vertex_shader": "a.vert",
            "fragment_shader": "a.frag",
            "settings": {"cull": "sideways"}
        }]}))
        .unwrap_err();
        match err {
            SceneError::InvalidConfig { path, value, .. } => {
                assert_eq!(path, "passes[0].settings.cull");
                assert_eq!(value, "`sideways`");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unknown_geometry_tag_rejected() {
        let err = parse(json!({"objects": [{"name": "p", "kind": {"pyramid": {}}}]})).unwrap_err();
        assert_eq!(invalid_path(err), "objects[0].kind");
    }

    #[test]
    fn test_wrong_type_names_field_and_value() {
        let err = parse(json!({"camera": {"fov": "wide"}})).unwrap_err();
        match err {
            SceneError::InvalidConfig { path, value, .. } => {
                assert_eq!(path, "camera.fov");
                assert_eq!(value, "\"wide\"");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_texture_kinds() {
        let scene = parse(json!({"textures": [
            {"name": "albedo", "kind": {"file": "albedo.png"}, "wrap": "clamp", "filter": "nearest"},
            {"name": "color", "kind": {"empty": {"size": "viewport", "format": "rgba8"}}},
            {"name": "shadow", "kind": {"depth": {"size": {"width": 1024, "height": 512}}}},
            {"name": "hdr", "kind": {"empty": {}}}
        ]}))
        .unwrap();

        assert_eq!(scene.textures[0].source, TextureSource::File("albedo.png".into()));
        assert_eq!(scene.textures[0].sampling.wrap, AddressMode::ClampToEdge);
        assert_eq!(scene.textures[0].sampling.filter, FilterMode::Nearest);
        assert_eq!(
            scene.textures[1].source,
            TextureSource::Empty {
                size: TargetSize::Viewport,
                format: TextureFormat::Rgba8Unorm
            }
        );
        assert_eq!(
            scene.textures[2].source,
            TextureSource::Depth {
                size: TargetSize::Fixed {
                    width: 1024,
                    height: 512
                },
                format: TextureFormat::Depth32Float
            }
        );
        assert_eq!(
            scene.textures[3].source,
            TextureSource::Empty {
                size: TargetSize::Viewport,
                format: TextureFormat::Rgba32Float
            }
        );
    }

    #[test]
    fn test_zero_texture_size_rejected() {
        let err = parse(json!({"textures": [
            {"name": "t", "kind": {"empty": {"size": {"width": 0, "height": 16}}}}
        ]}))
        .unwrap_err();
        assert_eq!(invalid_path(err), "textures[0].kind.empty.size");
    }

    #[test]
    fn test_orbital_distance_must_be_positive() {
        let err = parse(json!({"camera": {"kind": {"orbital": {"distance": 0.0}}}})).unwrap_err();
        assert_eq!(invalid_path(err), "camera.kind.orbital.distance");
    }

    #[test]
    fn test_camera_kinds() {
        let scene = parse(json!({"camera": {
            "kind": {"look_at": {"from": [1, 2, 3], "to": [0, 0, 0]}},
            "fov": 45
        }}))
        .unwrap();
        assert_eq!(scene.camera.fov, 45.0);
        assert_eq!(
            scene.camera.kind,
            CameraKind::LookAt(LookAtCamera {
                from: Vec3::new(1.0, 2.0, 3.0),
                to: Vec3::ZERO,
                up: Vec3::Y
            })
        );
    }

    #[test]
    fn test_pass_fields() {
        let scene = parse(json!({"passes": [{
            "name": "blur",
            "vertex_shader": "quad.vert",
            "fragment_shader": "blur.frag",
            "textures": ["color", {"name": "depth", "as": "scene_depth"}],
            "target": {"color": ["a", "b"], "depth": "d"},
            "settings": {
                "cull": "none",
                "depth": {"test": "less_equal", "write": false},
                "blend": "alpha",
                "clear": {"color": [0.1, 0.2, 0.3, 1.0]}
            },
            "uniforms": {"radius": 2, "tint": [1, 0, 0]}
        }]}))
        .unwrap();

        let pass = &scene.passes[0];
        assert_eq!(pass.textures[1].binding_name(), "scene_depth");
        assert_eq!(pass.textures[1].path, "passes[0].textures[1]");
        let target = pass.target.as_ref().unwrap();
        assert_eq!(target.color[1].path, "passes[0].target.color[1]");
        assert_eq!(target.depth.as_ref().unwrap().name, "d");
        assert_eq!(pass.settings.cull, CullSetting::None);
        assert_eq!(
            pass.settings.depth,
            Some(DepthState {
                compare: CompareFunction::LessEqual,
                write: false
            })
        );
        assert_eq!(pass.settings.blend, BlendSetting::Alpha);
        assert_eq!(
            pass.settings.clear,
            ClearSetting::Values {
                color: [0.1, 0.2, 0.3, 1.0],
                depth: 1.0
            }
        );
        assert_eq!(pass.uniforms["radius"].value, UniformValue::Float(2.0));
        assert_eq!(
            pass.uniforms["tint"].value,
            UniformValue::Vec3(Vec3::new(1.0, 0.0, 0.0))
        );
        assert_eq!(pass.uniforms["tint"].path, "passes[0].uniforms.tint");
    }

    #[test]
    fn test_frame_target_and_disabled_depth() {
        let scene = parse(json!({"passes": [{
            "vertex_shader": "a.vert",
            "fragment_shader": "a.frag",
            "target": "frame",
            "settings": {"depth": "disabled", "clear": false}
        }]}))
        .unwrap();
        let pass = &scene.passes[0];
        assert!(pass.target.is_none());
        assert_eq!(pass.settings.depth, None);
        assert_eq!(pass.settings.clear, ClearSetting::Never);
    }

    #[test]
    fn test_empty_target_rejected() {
        let err = parse(json!({"passes": [{
            "vertex_shader": "a.vert",
            "fragment_shader": "a.frag",
            "target": {}
        }]}))
        .unwrap_err();
        assert_eq!(invalid_path(err), "passes[0].target");
    }

    #[test]
    fn test_matrix_uniform_literals() {
        let identity: RawUniform =
            serde_json::from_value(json!([[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]]))
                .unwrap();
        assert_eq!(identity.value("m").unwrap(), UniformValue::Mat4(Mat4::IDENTITY));

        let bad: RawUniform = serde_json::from_value(json!([1, 2, 3, 4, 5])).unwrap();
        assert_eq!(invalid_path(bad.value("passes[0].uniforms.m").unwrap_err()), "passes[0].uniforms.m");
    }

    #[test]
    fn test_object_transform_defaults() {
        let scene = parse(json!({"objects": [
            {"name": "a", "kind": {"cube": {"width": 2}}, "position": [1, 2, 3], "scale": 2}
        ]}))
        .unwrap();
        let object = &scene.objects[0];
        assert_eq!(
            object.geometry,
            GeometryKind::Cube {
                width: 2.0,
                height: 1.0,
                depth: 1.0
            }
        );
        assert_eq!(object.transform.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(object.transform.scale, Vec3::splat(2.0));
    }

    #[test]
    fn test_degenerate_geometry_rejected() {
        let cases = [
            (json!({"plane": {"width": 0.0}}), "objects[0].kind.plane.width"),
            (json!({"plane": {"depth": -2.0}}), "objects[0].kind.plane.depth"),
            (json!({"cube": {"height": 0}}), "objects[0].kind.cube.height"),
            (json!({"sphere": {"segments": 2}}), "objects[0].kind.sphere"),
        ];
        for (kind, expected) in cases {
            let err = parse(json!({"objects": [{"name": "o", "kind": kind}]})).unwrap_err();
            assert_eq!(invalid_path(err), expected);
        }
    }

    #[test]
    fn test_ron_scene() {
        let text = r#"{
            "objects": [{"name": "quad", "kind": "screen_quad"}],
            "passes": [{"vertex_shader": "a.vert", "fragment_shader": "a.frag"}],
        }"#;
        let scene = SceneDescription::parse(text, SceneFormat::Ron, "inline.ron").unwrap();
        assert_eq!(scene.objects.len(), 1);
        assert_eq!(scene.passes[0].vertex_shader, PathBuf::from("a.vert"));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(SceneFormat::from_path(Path::new("a/scene.json")).unwrap(), SceneFormat::Json);
        assert_eq!(SceneFormat::from_path(Path::new("scene.ron")).unwrap(), SceneFormat::Ron);
        assert!(SceneFormat::from_path(Path::new("scene.yaml")).is_err());
    }

    #[test]
    fn test_parse_error_carries_origin() {
        let err = SceneDescription::parse("{", SceneFormat::Json, "broken.json").unwrap_err();
        assert!(matches!(err, SceneError::Parse { ref origin, .. } if origin == "broken.json"));
    }

    #[test]
    fn test_load_ops() {
        let settings = PassSettings::default();
        let clear = [0.2, 0.2, 0.2, 1.0];
        assert_eq!(
            settings.load_ops(true, false, clear),
            (LoadOp::Clear([0.0; 4]), DepthLoadOp::Clear(1.0))
        );
        assert_eq!(
            settings.load_ops(false, true, clear),
            (LoadOp::Clear(clear), DepthLoadOp::Clear(1.0))
        );
        assert_eq!(
            settings.load_ops(false, false, clear),
            (LoadOp::Load, DepthLoadOp::Load)
        );
    }
}
