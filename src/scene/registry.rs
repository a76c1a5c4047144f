//! Named entity storage
//!
//! Entities live in owned arenas keyed by name. Pass descriptions refer to
//! them by string, which is resolved once at load into a typed [`Handle`].

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::error::{SceneError, SceneResult};
use crate::scene::camera::CameraModel;
use crate::scene::description::{GeometryKind, SamplingDesc, SceneDescription, TextureSource};
use crate::scene::transform::Transform;

/// Stable index of an entity inside a [`Registry`]
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize) -> Self {
        Self {
            index: index as u32,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Arena of uniquely named entities
#[derive(Debug)]
pub struct Registry<T> {
    kind: &'static str,
    names: Vec<String>,
    entries: Vec<T>,
    by_name: HashMap<String, Handle<T>>,
}

impl<T> Registry<T> {
    /// Create an empty registry; `kind` names the entity type in errors
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            names: Vec::new(),
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Insert an entity under a unique name
    pub fn register(&mut self, name: &str, entity: T, path: &str) -> SceneResult<Handle<T>> {
        if self.by_name.contains_key(name) {
            return Err(SceneError::DuplicateName {
                kind: self.kind,
                name: name.to_string(),
                path: path.to_string(),
            });
        }
        let handle = Handle::new(self.entries.len());
        self.names.push(name.to_string());
        self.entries.push(entity);
        self.by_name.insert(name.to_string(), handle);
        Ok(handle)
    }

    /// Look up a name; `path` is the key path of the referencing entry
    pub fn resolve(&self, name: &str, path: &str) -> SceneResult<Handle<T>> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SceneError::UnknownReference {
                kind: self.kind,
                name: name.to_string(),
                path: path.to_string(),
            })
    }

    pub fn get(&self, handle: Handle<T>) -> &T {
        &self.entries[handle.index()]
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.entries[handle.index()]
    }

    pub fn name(&self, handle: Handle<T>) -> &str {
        &self.names[handle.index()]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &str, &T)> {
        self.entries
            .iter()
            .zip(&self.names)
            .enumerate()
            .map(|(i, (entry, name))| (Handle::new(i), name.as_str(), entry))
    }
}

/// A named geometry instance
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub geometry: GeometryKind,
    pub transform: Transform,
}

/// A named texture
#[derive(Debug, Clone, PartialEq)]
pub struct TextureEntry {
    pub source: TextureSource,
    pub sampling: SamplingDesc,
}

impl TextureEntry {
    /// Empty textures attach as color targets, depth textures as depth
    /// targets; file textures are read only
    pub fn can_attach(&self, depth_slot: bool) -> bool {
        match self.source {
            TextureSource::Empty { .. } => !depth_slot,
            TextureSource::Depth { .. } => depth_slot,
            TextureSource::File(_) => false,
        }
    }
}

pub type ObjectHandle = Handle<SceneObject>;
pub type TextureId = Handle<TextureEntry>;

/// Every named entity of a loaded scene
#[derive(Debug)]
pub struct ResourceRegistry {
    pub objects: Registry<SceneObject>,
    pub textures: Registry<TextureEntry>,
    pub camera: CameraModel,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self {
            objects: Registry::new("object"),
            textures: Registry::new("texture"),
            camera: CameraModel::default(),
        }
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every object and texture of a description, in order
    pub fn from_description(description: &SceneDescription) -> SceneResult<Self> {
        let mut registry = Self {
            camera: description.camera,
            ..Self::default()
        };
        for object in &description.objects {
            registry.objects.register(
                &object.name,
                SceneObject {
                    geometry: object.geometry.clone(),
                    transform: object.transform,
                },
                &object.path,
            )?;
        }
        for texture in &description.textures {
            registry.textures.register(
                &texture.name,
                TextureEntry {
                    source: texture.source.clone(),
                    sampling: texture.sampling,
                },
                &texture.path,
            )?;
        }
        Ok(registry)
    }
}
