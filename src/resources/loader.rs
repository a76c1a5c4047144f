//! Asset loading
//!
//! Scene files, shader sources, images and meshes are fetched through an
//! [`AssetLoader`]. Paths are relative to the loader's root, which is the
//! directory of the scene file for [`FsAssetLoader`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::resources::mesh::Mesh;
use crate::resources::texture::TextureData;

/// Errors that can occur while reading an asset.
#[derive(Error, Debug)]
pub enum AssetError {
    /// The requested path does not exist.
    #[error("not found: {0:?}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image decoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("OBJ loading failed: {0}")]
    Mesh(#[from] tobj::LoadError),
}

/// Source of scene assets.
pub trait AssetLoader {
    /// Read a UTF-8 text file (scene descriptions and shader sources).
    fn read_to_string(&self, path: &Path) -> Result<String, AssetError>;

    /// Decode an image into RGBA8 pixels.
    fn load_image(&self, path: &Path) -> Result<TextureData, AssetError>;

    /// Load a triangulated mesh.
    fn load_mesh(&self, path: &Path) -> Result<Mesh, AssetError>;
}

/// Loader reading from the local file system.
#[derive(Debug, Clone)]
pub struct FsAssetLoader {
    root: PathBuf,
}

impl FsAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, AssetError> {
        let full = self.root.join(path);
        if full.exists() {
            Ok(full)
        } else {
            Err(AssetError::NotFound(full))
        }
    }
}

impl AssetLoader for FsAssetLoader {
    fn read_to_string(&self, path: &Path) -> Result<String, AssetError> {
        Ok(std::fs::read_to_string(self.resolve(path)?)?)
    }

    fn load_image(&self, path: &Path) -> Result<TextureData, AssetError> {
        TextureData::from_file(self.resolve(path)?)
    }

    fn load_mesh(&self, path: &Path) -> Result<Mesh, AssetError> {
        let full = self.resolve(path)?;
        let (models, _materials) = tobj::load_obj(&full, &tobj::GPU_LOAD_OPTIONS)?;
        log::debug!("Loaded {} model(s) from {:?}", models.len(), full);
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("mesh");
        Ok(Mesh::from_obj_models(name, &models))
    }
}

#[derive(Debug, Default)]
struct MemoryAssets {
    texts: HashMap<PathBuf, String>,
    images: HashMap<PathBuf, TextureData>,
    meshes: HashMap<PathBuf, Mesh>,
}

/// In-memory loader for tests and embedded scenes.
///
/// Clones share the same storage, so files can be replaced after the loader
/// has been handed to an engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetLoader {
    assets: Arc<RwLock<MemoryAssets>>,
}

impl MemoryAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a text file.
    pub fn insert_text(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.write().texts.insert(path.into(), text.into());
    }

    pub fn insert_image(&self, path: impl Into<PathBuf>, image: TextureData) {
        self.write().images.insert(path.into(), image);
    }

    pub fn insert_mesh(&self, path: impl Into<PathBuf>, mesh: Mesh) {
        self.write().meshes.insert(path.into(), mesh);
    }

    /// Builder form of [`insert_text`](Self::insert_text).
    pub fn with_text(self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.insert_text(path, text);
        self
    }

    pub fn with_image(self, path: impl Into<PathBuf>, image: TextureData) -> Self {
        self.insert_image(path, image);
        self
    }

    pub fn with_mesh(self, path: impl Into<PathBuf>, mesh: Mesh) -> Self {
        self.insert_mesh(path, mesh);
        self
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryAssets> {
        self.assets.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryAssets> {
        self.assets.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl AssetLoader for MemoryAssetLoader {
    fn read_to_string(&self, path: &Path) -> Result<String, AssetError> {
        self.read()
            .texts
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_path_buf()))
    }

    fn load_image(&self, path: &Path) -> Result<TextureData, AssetError> {
        self.read()
            .images
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_path_buf()))
    }

    fn load_mesh(&self, path: &Path) -> Result<Mesh, AssetError> {
        self.read()
            .meshes
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_path_buf()))
    }
}
