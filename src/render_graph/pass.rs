//! Pass compilation
//!
//! Lowers a parsed pass description into an immutable [`PassDescriptor`]
//! with every name resolved to a handle. Nothing here touches the device.

use std::collections::HashSet;

use crate::backend::types::*;
use crate::error::{SceneError, SceneResult};
use crate::resources::{ProgramId, ShaderCache};
use crate::scene::{ObjectHandle, PassDesc, PassSettings, ResourceRegistry, TextureId};

/// Uniforms filled in by the engine every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinUniform {
    Model,
    View,
    Projection,
    Time,
    MouseX,
    MouseY,
    MousePos,
    WindowWidth,
    WindowHeight,
    WindowSize,
}

impl BuiltinUniform {
    /// Builtin bound to a declaration, matched by name and type
    pub fn from_declaration(name: &str, ty: UniformType) -> Option<Self> {
        Some(match (name, ty) {
            ("model", UniformType::Mat4) => BuiltinUniform::Model,
            ("view", UniformType::Mat4) => BuiltinUniform::View,
            ("projection", UniformType::Mat4) => BuiltinUniform::Projection,
            ("time", UniformType::Float) => BuiltinUniform::Time,
            ("mouse_x", UniformType::Float) => BuiltinUniform::MouseX,
            ("mouse_y", UniformType::Float) => BuiltinUniform::MouseY,
            ("mouse_pos", UniformType::Vec2) => BuiltinUniform::MousePos,
            ("window_width", UniformType::Float) => BuiltinUniform::WindowWidth,
            ("window_height", UniformType::Float) => BuiltinUniform::WindowHeight,
            ("window_size", UniformType::Vec2) => BuiltinUniform::WindowSize,
            _ => return None,
        })
    }

    /// Whether the value changes between objects of the same pass
    pub fn is_per_object(&self) -> bool {
        matches!(self, BuiltinUniform::Model)
    }
}

/// Where a uniform's value comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformBinding {
    Builtin(BuiltinUniform),
    /// Shader default or pass override
    Value(UniformValue),
}

/// A texture bound to a sampler slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub texture: TextureId,
    pub slot: u32,
    /// `texture_<name>`, or `texture_<alias>` when renamed
    pub sampler_name: String,
}

/// Offscreen attachments of a pass, colors in binding order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassTarget {
    pub color: Vec<TextureId>,
    pub depth: Option<TextureId>,
}

impl PassTarget {
    pub fn textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.color.iter().copied().chain(self.depth)
    }
}

/// A fully resolved pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassDescriptor {
    /// Declaration index in the scene description
    pub index: usize,
    pub name: String,
    pub program: ProgramId,
    pub inputs: Vec<TextureBinding>,
    pub objects: Vec<ObjectHandle>,
    /// `None` draws to the final framebuffer
    pub target: Option<PassTarget>,
    pub settings: PassSettings,
    pub pipeline: PipelineState,
    /// Uniforms to upload, sorted by name
    pub uniforms: Vec<(String, UniformBinding)>,
}

impl PassDescriptor {
    pub fn draws_to_frame(&self) -> bool {
        self.target.is_none()
    }

    /// Textures written by this pass
    pub fn writes(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.target.iter().flat_map(|target| target.textures())
    }

    /// Textures read by this pass
    pub fn reads(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.inputs.iter().map(|input| input.texture)
    }
}

/// Resolve and validate one pass description
pub fn compile(
    desc: &PassDesc,
    index: usize,
    registry: &ResourceRegistry,
    shaders: &ShaderCache,
) -> SceneResult<PassDescriptor> {
    let program = shaders.lookup(&desc.vertex_shader, &desc.fragment_shader, &desc.path)?;

    let objects = desc
        .objects
        .iter()
        .map(|object| registry.objects.resolve(&object.name, &object.path))
        .collect::<SceneResult<Vec<_>>>()?;

    let inputs = desc
        .textures
        .iter()
        .enumerate()
        .map(|(slot, input)| {
            Ok(TextureBinding {
                texture: registry.textures.resolve(&input.name, &input.path)?,
                slot: slot as u32,
                sampler_name: format!("texture_{}", input.binding_name()),
            })
        })
        .collect::<SceneResult<Vec<_>>>()?;

    let target = match &desc.target {
        Some(target_desc) => {
            let mut seen = HashSet::new();
            let mut check = |name: &str, path: &str, slot: &'static str| -> SceneResult<TextureId> {
                let id = registry.textures.resolve(name, path)?;
                if !registry.textures.get(id).can_attach(slot == "depth") {
                    return Err(SceneError::NotRenderTarget {
                        texture: name.to_string(),
                        slot,
                        path: path.to_string(),
                    });
                }
                if !seen.insert(id) {
                    return Err(SceneError::ConflictingTarget {
                        texture: name.to_string(),
                        first: index,
                        second: index,
                    });
                }
                Ok(id)
            };

            let color = target_desc
                .color
                .iter()
                .map(|c| check(&c.name, &c.path, "color"))
                .collect::<SceneResult<Vec<_>>>()?;
            let depth = target_desc
                .depth
                .as_ref()
                .map(|d| check(&d.name, &d.path, "depth"))
                .transpose()?;
            let target = PassTarget { color, depth };

            let sizes: Vec<_> = target
                .textures()
                .filter_map(|id| registry.textures.get(id).source.size())
                .collect();
            if let Some(other) = sizes.iter().find(|size| **size != sizes[0]) {
                return Err(SceneError::InvalidConfig {
                    path: format!("{}.target", desc.path),
                    value: format!("{:?} and {other:?}", sizes[0]),
                    expected: "attachments of the same size".to_string(),
                });
            }
            Some(target)
        }
        None => None,
    };

    let uniforms = merge_uniforms(desc, shaders, program)?;

    Ok(PassDescriptor {
        index,
        name: desc.name.clone(),
        program,
        inputs,
        objects,
        target,
        settings: desc.settings,
        pipeline: desc.settings.pipeline_state(),
        uniforms,
    })
}

/// Shader defaults and builtins, with the pass overrides applied on top
fn merge_uniforms(
    desc: &PassDesc,
    shaders: &ShaderCache,
    program: ProgramId,
) -> SceneResult<Vec<(String, UniformBinding)>> {
    let reflection = &shaders.get(program).reflection;

    for (name, value) in &desc.uniforms {
        match reflection.uniform(name) {
            Some(decl) if decl.ty != value.value.ty() => {
                return Err(SceneError::InvalidConfig {
                    path: value.path.clone(),
                    value: value.value.to_string(),
                    expected: format!("a {} value", decl.ty),
                });
            }
            Some(_) => {}
            None => log::warn!(
                "Pass `{}` overrides uniform `{}` which its program does not declare",
                desc.name,
                name
            ),
        }
    }

    let mut uniforms = Vec::new();
    for (name, decl) in &reflection.uniforms {
        let binding = match desc.uniforms.get(name) {
            Some(value) => Some(UniformBinding::Value(value.value)),
            None => BuiltinUniform::from_declaration(name, decl.ty)
                .map(UniformBinding::Builtin)
                .or(decl.default.map(UniformBinding::Value)),
        };
        if let Some(binding) = binding {
            uniforms.push((name.clone(), binding));
        }
    }
    Ok(uniforms)
}
