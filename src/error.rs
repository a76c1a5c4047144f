//! Error types for scene loading and frame execution

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;

/// Result alias used throughout the crate
pub type SceneResult<T> = Result<T, SceneError>;

/// Errors raised while loading a scene or running a frame.
///
/// Load-time variants carry the key path of the offending entry in the
/// scene description (for example `passes[1].target.color[0]`).
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error("{path}: missing required field `{field}`")]
    MissingField { path: String, field: String },
    #[error("{path}: invalid value {value} (expected {expected})")]
    InvalidConfig {
        path: String,
        value: String,
        expected: String,
    },
    #[error("{path}: duplicate {kind} name `{name}`")]
    DuplicateName {
        kind: &'static str,
        name: String,
        path: String,
    },
    #[error("{path}: unknown {kind} `{name}`")]
    UnknownReference {
        kind: &'static str,
        name: String,
        path: String,
    },
    #[error("{path}: texture `{texture}` cannot be used as a {slot} render target")]
    NotRenderTarget {
        texture: String,
        slot: &'static str,
        path: String,
    },
    #[error("passes {first} and {second} both target texture `{texture}`")]
    ConflictingTarget {
        texture: String,
        first: usize,
        second: usize,
    },
    #[error("cyclic dependency between passes {passes:?} through texture `{texture}`")]
    CyclicDependency { passes: Vec<usize>, texture: String },
    #[error("{path}: failed to compile {file:?}: {diagnostic}")]
    ShaderCompile {
        path: String,
        file: PathBuf,
        diagnostic: String,
    },
    #[error("{path}: failed to load {asset:?}: {message}")]
    AssetLoad {
        path: String,
        asset: PathBuf,
        message: String,
    },
    #[error("resource `{resource}` is not ready{}", .pass.map(|p| format!(" for pass {p}")).unwrap_or_default())]
    ResourceNotReady {
        resource: String,
        pass: Option<usize>,
    },
    #[error("graphics device error: {0}")]
    Backend(#[from] BackendError),
}

/// Coarse classification of [`SceneError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed, missing or unrecognized scene fields
    Config,
    /// A name that does not resolve
    Reference,
    CyclicDependency,
    ShaderCompile,
    ConflictingTarget,
    ResourceNotReady,
    /// The graphics device failed outside of a draw call
    Device,
}

impl SceneError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SceneError::Io { .. }
            | SceneError::Parse { .. }
            | SceneError::MissingField { .. }
            | SceneError::InvalidConfig { .. }
            | SceneError::DuplicateName { .. }
            | SceneError::NotRenderTarget { .. }
            | SceneError::AssetLoad { .. } => ErrorCategory::Config,
            SceneError::UnknownReference { .. } => ErrorCategory::Reference,
            SceneError::CyclicDependency { .. } => ErrorCategory::CyclicDependency,
            SceneError::ShaderCompile { .. } => ErrorCategory::ShaderCompile,
            SceneError::ConflictingTarget { .. } => ErrorCategory::ConflictingTarget,
            SceneError::ResourceNotReady { .. } => ErrorCategory::ResourceNotReady,
            SceneError::Backend(_) => ErrorCategory::Device,
        }
    }

    /// Errors that should stop the process even during a hot reload session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SceneError::ShaderCompile { .. }
                | SceneError::CyclicDependency { .. }
                | SceneError::Backend(_)
        )
    }
}

/// A single object's draw failure, isolated to the pass that issued it
#[derive(Error, Debug)]
#[error("pass {pass} (`{pass_name}`): drawing `{object}` failed: {source}")]
pub struct DrawError {
    pub pass: usize,
    pub pass_name: String,
    pub object: String,
    #[source]
    pub source: BackendError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_path_in_message() {
        let err = SceneError::MissingField {
            path: "passes[1]".into(),
            field: "vertex_shader".into(),
        };
        assert_eq!(
            err.to_string(),
            "passes[1]: missing required field `vertex_shader`"
        );
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_resource_not_ready_message() {
        let with_pass = SceneError::ResourceNotReady {
            resource: "col_target".into(),
            pass: Some(2),
        };
        assert_eq!(
            with_pass.to_string(),
            "resource `col_target` is not ready for pass 2"
        );

        let without = SceneError::ResourceNotReady {
            resource: "scene".into(),
            pass: None,
        };
        assert_eq!(without.to_string(), "resource `scene` is not ready");
    }

    #[test]
    fn test_fatal_classification() {
        let cycle = SceneError::CyclicDependency {
            passes: vec![0, 1],
            texture: "t1".into(),
        };
        assert!(cycle.is_fatal());

        let reference = SceneError::UnknownReference {
            kind: "object",
            name: "cube".into(),
            path: "passes[0].objects[0]".into(),
        };
        assert!(!reference.is_fatal());
        assert_eq!(reference.category(), ErrorCategory::Reference);
    }
}
