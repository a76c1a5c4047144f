//! Shader program cache and GLSL reflection

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{SceneError, SceneResult};
use crate::resources::loader::AssetLoader;

/// A declared uniform and its compiled-in default
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformDecl {
    pub ty: UniformType,
    pub default: Option<UniformValue>,
}

/// Inputs a program declares
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderReflection {
    /// Vertex attributes, all of them members of [`Vertex::ATTRIBUTES`]
    pub attributes: Vec<String>,
    pub uniforms: BTreeMap<String, UniformDecl>,
}

impl ShaderReflection {
    /// Reflect one stage's source
    pub fn parse(stage: ShaderStage, source: &str) -> Result<Self, String> {
        let mut reflection = Self::default();

        for statement in statements(source) {
            let mut words = statement.split_whitespace().peekable();
            let Some(qualifier) = words.next() else {
                continue;
            };

            match qualifier {
                "in" | "attribute" if stage == ShaderStage::Vertex => {
                    let name = words
                        .last()
                        .ok_or_else(|| format!("incomplete declaration `{statement}`"))?;
                    if Vertex::attribute_slot(name).is_none() {
                        return Err(format!(
                            "unsupported vertex attribute `{name}` (expected one of {})",
                            Vertex::ATTRIBUTES.join(", ")
                        ));
                    }
                    reflection.attributes.push(name.to_string());
                }
                "uniform" => {
                    while let Some(&word) = words.peek() {
                        if matches!(word, "lowp" | "mediump" | "highp") {
                            words.next();
                        } else {
                            break;
                        }
                    }
                    let (Some(ty_name), Some(name)) = (words.next(), words.next()) else {
                        return Err(format!("incomplete declaration `{statement}`"));
                    };
                    let name = name.split('=').next().unwrap_or(name);
                    let Some(ty) = UniformType::from_glsl(ty_name) else {
                        log::debug!("Skipping uniform `{name}` of unsupported type `{ty_name}`");
                        continue;
                    };
                    let default = match statement.split_once('=') {
                        Some((_, literal)) => {
                            let value = parse_literal(ty, literal.trim());
                            if value.is_none() {
                                log::warn!(
                                    "Cannot evaluate default of uniform `{name}`: `{}`",
                                    literal.trim()
                                );
                            }
                            value
                        }
                        None => None,
                    };
                    reflection
                        .uniforms
                        .insert(name.to_string(), UniformDecl { ty, default });
                }
                _ => {}
            }
        }

        Ok(reflection)
    }

    /// Combine the reflections of the two stages of a program
    pub fn merge(mut self, other: ShaderReflection) -> Result<Self, String> {
        for (name, decl) in other.uniforms {
            match self.uniforms.get_mut(&name) {
                Some(existing) if existing.ty != decl.ty => {
                    return Err(format!(
                        "uniform `{name}` declared as both {} and {}",
                        existing.ty, decl.ty
                    ));
                }
                Some(existing) => {
                    if existing.default.is_none() {
                        existing.default = decl.default;
                    }
                }
                None => {
                    self.uniforms.insert(name, decl);
                }
            }
        }
        self.attributes.extend(other.attributes);
        Ok(self)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformDecl> {
        self.uniforms.get(name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }
}

/// Split a source into declarations, dropping comments, preprocessor lines,
/// function bodies and layout qualifiers
fn statements(source: &str) -> Vec<String> {
    let mut text = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("/*") {
        text.push_str(&rest[..start]);
        rest = match rest[start..].find("*/") {
            Some(end) => &rest[start + end + 2..],
            None => "",
        };
    }
    text.push_str(rest);

    let code: String = text
        .lines()
        .map(|line| line.split("//").next().unwrap_or_default())
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    code.split(';')
        .filter_map(|statement| statement.rsplit(|c: char| c == '{' || c == '}').next())
        .map(|statement| strip_layout(statement.trim()).to_string())
        .filter(|statement| !statement.is_empty())
        .collect()
}

fn strip_layout(statement: &str) -> &str {
    match statement.strip_prefix("layout") {
        Some(rest) => rest
            .find(')')
            .map(|end| rest[end + 1..].trim_start())
            .unwrap_or(statement),
        None => statement,
    }
}

/// Evaluate a GLSL constant such as `0.5`, `vec3(1.0)` or `mat4(1.0)`
fn parse_literal(ty: UniformType, literal: &str) -> Option<UniformValue> {
    let number = |s: &str| {
        s.trim()
            .trim_end_matches(|c: char| c == 'f' || c == 'F')
            .parse::<f32>()
            .ok()
    };

    if ty == UniformType::Float {
        return number(literal).map(UniformValue::Float);
    }

    let (constructor, args) = literal.strip_suffix(')')?.split_once('(')?;
    if constructor.trim() != ty.to_string() {
        return None;
    }
    let args = args
        .split(',')
        .map(number)
        .collect::<Option<Vec<f32>>>()?;

    let splat = |n: usize| -> Option<Vec<f32>> {
        match args.len() {
            1 => Some(vec![args[0]; n]),
            len if len == n => Some(args.clone()),
            _ => None,
        }
    };

    match ty {
        UniformType::Vec2 => splat(2).map(|v| UniformValue::Vec2(Vec2::from_slice(&v))),
        UniformType::Vec3 => splat(3).map(|v| UniformValue::Vec3(Vec3::from_slice(&v))),
        UniformType::Vec4 => splat(4).map(|v| UniformValue::Vec4(Vec4::from_slice(&v))),
        UniformType::Mat4 => match args.len() {
            1 => Some(UniformValue::Mat4(Mat4::from_diagonal(Vec4::splat(args[0])))),
            16 => Some(UniformValue::Mat4(Mat4::from_cols_slice(&args))),
            _ => None,
        },
        UniformType::Float | UniformType::Sampler2D => None,
    }
}

/// Index of a program inside a [`ShaderCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(usize);

impl ProgramId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A compiled program and what it declares
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    pub handle: ProgramHandle,
    pub vertex_path: PathBuf,
    pub fragment_path: PathBuf,
    pub reflection: ShaderReflection,
}

/// Programs keyed by their (vertex, fragment) path pair
#[derive(Debug, Default)]
pub struct ShaderCache {
    programs: Vec<ShaderProgram>,
    by_paths: HashMap<(PathBuf, PathBuf), ProgramId>,
}

impl ShaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a program pair, reusing an earlier compilation of the same pair.
    /// `path` is the key path of the pass requesting it.
    pub fn load(
        &mut self,
        device: &mut dyn RenderDevice,
        loader: &dyn AssetLoader,
        vertex_path: &Path,
        fragment_path: &Path,
        path: &str,
    ) -> SceneResult<ProgramId> {
        let key = (vertex_path.to_path_buf(), fragment_path.to_path_buf());
        if let Some(&id) = self.by_paths.get(&key) {
            log::trace!("Reusing program {:?} + {:?}", vertex_path, fragment_path);
            return Ok(id);
        }

        let read = |file: &Path| {
            loader
                .read_to_string(file)
                .map_err(|e| SceneError::AssetLoad {
                    path: path.to_string(),
                    asset: file.to_path_buf(),
                    message: e.to_string(),
                })
        };
        let source = ProgramSource {
            vertex_path: vertex_path.to_path_buf(),
            fragment_path: fragment_path.to_path_buf(),
            vertex_source: read(vertex_path)?,
            fragment_source: read(fragment_path)?,
        };

        let compile_error = |stage: ShaderStage, diagnostic: String| SceneError::ShaderCompile {
            path: path.to_string(),
            file: match stage {
                ShaderStage::Vertex => vertex_path.to_path_buf(),
                ShaderStage::Fragment => fragment_path.to_path_buf(),
            },
            diagnostic,
        };

        let vertex = ShaderReflection::parse(ShaderStage::Vertex, &source.vertex_source)
            .map_err(|e| compile_error(ShaderStage::Vertex, e))?;
        let fragment = ShaderReflection::parse(ShaderStage::Fragment, &source.fragment_source)
            .map_err(|e| compile_error(ShaderStage::Fragment, e))?;
        let reflection = vertex
            .merge(fragment)
            .map_err(|e| compile_error(ShaderStage::Fragment, e))?;

        let handle = device
            .create_program(&source)
            .map_err(|diagnostic| compile_error(diagnostic.stage, diagnostic.message))?;

        log::debug!(
            "Compiled program {:?} + {:?}: attributes {:?}, uniforms {:?}",
            vertex_path,
            fragment_path,
            reflection.attributes,
            reflection.uniforms.keys().collect::<Vec<_>>()
        );

        let id = ProgramId(self.programs.len());
        self.programs.push(ShaderProgram {
            handle,
            vertex_path: key.0.clone(),
            fragment_path: key.1.clone(),
            reflection,
        });
        self.by_paths.insert(key, id);
        Ok(id)
    }

    /// Find an already loaded pair
    pub fn lookup(&self, vertex_path: &Path, fragment_path: &Path, path: &str) -> SceneResult<ProgramId> {
        self.by_paths
            .get(&(vertex_path.to_path_buf(), fragment_path.to_path_buf()))
            .copied()
            .ok_or_else(|| SceneError::UnknownReference {
                kind: "shader program",
                name: format!("{} + {}", vertex_path.display(), fragment_path.display()),
                path: path.to_string(),
            })
    }

    pub fn get(&self, id: ProgramId) -> &ShaderProgram {
        &self.programs[id.0]
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Destroy every program
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        for program in self.programs.drain(..) {
            if let Err(e) = device.destroy_program(program.handle) {
                log::warn!("Failed to destroy program: {}", e);
            }
        }
        self.by_paths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessDevice;
    use crate::resources::loader::MemoryAssetLoader;

    const VERTEX: &str = r#"
        #version 450
        layout(location = 0) in vec3 position;
        layout(location = 1) in vec3 normal;
        uniform mat4 model;
        uniform mat4 view; // camera
        uniform mat4 projection;
        void main() {
            gl_Position = projection * view * model * vec4(position, 1.0);
        }
    "#;

    const FRAGMENT: &str = r#"
        #version 450
        /* lighting inputs */
        uniform vec3 light_pos = vec3(0.5, 10, 0.5);
        uniform float strength = 2.0;
        uniform vec4 tint = vec4(1.0);
        uniform sampler2D texture_color;
        out vec4 color;
        void main() {
            color = vec4(light_pos, strength);
        }
    "#;

    #[test]
    fn test_reflects_uniforms_and_defaults() {
        let vertex = ShaderReflection::parse(ShaderStage::Vertex, VERTEX).unwrap();
        let fragment = ShaderReflection::parse(ShaderStage::Fragment, FRAGMENT).unwrap();
        let merged = vertex.merge(fragment).unwrap();

        assert_eq!(merged.attributes, vec!["position", "normal"]);
        assert_eq!(
            merged.uniform("light_pos").unwrap().default,
            Some(UniformValue::Vec3(Vec3::new(0.5, 10.0, 0.5)))
        );
        assert_eq!(
            merged.uniform("strength").unwrap().default,
            Some(UniformValue::Float(2.0))
        );
        assert_eq!(
            merged.uniform("tint").unwrap().default,
            Some(UniformValue::Vec4(Vec4::ONE))
        );
        assert_eq!(merged.uniform("model").unwrap().ty, UniformType::Mat4);
        assert_eq!(merged.uniform("model").unwrap().default, None);
        assert_eq!(merged.uniform("texture_color").unwrap().ty, UniformType::Sampler2D);
    }

    #[test]
    fn test_rejects_unknown_attribute() {
        let err = ShaderReflection::parse(ShaderStage::Vertex, "in vec4 bone_weights; void main() {}")
            .unwrap_err();
        assert!(err.contains("bone_weights"));
    }

    #[test]
    fn test_conflicting_uniform_types() {
        let a = ShaderReflection::parse(ShaderStage::Vertex, "uniform float t;").unwrap();
        let b = ShaderReflection::parse(ShaderStage::Fragment, "uniform vec2 t;").unwrap();
        assert!(a.merge(b).is_err());
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            parse_literal(UniformType::Mat4, "mat4(1.0)"),
            Some(UniformValue::Mat4(Mat4::IDENTITY))
        );
        assert_eq!(
            parse_literal(UniformType::Vec2, "vec2(1, 2)"),
            Some(UniformValue::Vec2(Vec2::new(1.0, 2.0)))
        );
        assert_eq!(parse_literal(UniformType::Vec3, "vec2(1, 2)"), None);
        assert_eq!(parse_literal(UniformType::Float, "sin(1.0)"), None);
    }

    #[test]
    fn test_identical_pairs_compile_once() {
        let mut device = HeadlessDevice::new();
        let loader = MemoryAssetLoader::new()
            .with_text("a.vert", VERTEX)
            .with_text("a.frag", FRAGMENT);
        let mut cache = ShaderCache::new();

        let first = cache
            .load(&mut device, &loader, Path::new("a.vert"), Path::new("a.frag"), "passes[0]")
            .unwrap();
        let second = cache
            .load(&mut device, &loader, Path::new("a.vert"), Path::new("a.frag"), "passes[1]")
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(device.programs_compiled(), 1);
    }

    #[test]
    fn test_compile_failure_names_file() {
        let mut device = HeadlessDevice::new();
        let loader = MemoryAssetLoader::new()
            .with_text("a.vert", VERTEX)
            .with_text("bad.frag", "#error unexpected token\nvoid main() {}");
        let mut cache = ShaderCache::new();

        let err = cache
            .load(&mut device, &loader, Path::new("a.vert"), Path::new("bad.frag"), "passes[3]")
            .unwrap_err();
        match err {
            SceneError::ShaderCompile {
                path,
                file,
                diagnostic,
            } => {
                assert_eq!(path, "passes[3]");
                assert_eq!(file, PathBuf::from("bad.frag"));
                assert_eq!(diagnostic, "unexpected token");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_unknown_pair() {
        let cache = ShaderCache::new();
        let err = cache
            .lookup(Path::new("x.vert"), Path::new("x.frag"), "passes[0]")
            .unwrap_err();
        assert!(matches!(err, SceneError::UnknownReference { kind: "shader program", .. }));
    }
}
