//! Scene file watching for hot reload

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{SceneError, SceneResult};

/// File extensions of scene descriptions and every asset kind they reference
const SCENE_EXTENSIONS: [&str; 11] = [
    "json", "ron", "vert", "frag", "glsl", "obj", "mtl", "png", "jpg", "jpeg", "bmp",
];

/// Watches a scene's directory and reports when any of its files change.
pub struct SceneWatcher {
    /// The underlying file watcher (kept alive).
    _watcher: RecommendedWatcher,
    /// Receives raw notify events from the background thread.
    event_rx: mpsc::Receiver<notify::Event>,
    root: PathBuf,
}

impl SceneWatcher {
    /// Watch the directory containing `scene_path`, recursively
    pub fn new(scene_path: &Path) -> SceneResult<Self> {
        let root = scene_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let root = root.canonicalize().map_err(|source| SceneError::Io {
            path: root.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel::<notify::Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .map_err(|e| watch_error(&root, e))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| watch_error(&root, e))?;
        log::info!("Watching {:?} for scene changes", root);

        Ok(Self {
            _watcher: watcher,
            event_rx: rx,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drain pending events and return the scene files that changed
    pub fn poll_changes(&self) -> Vec<PathBuf> {
        let mut changed = HashSet::new();

        while let Ok(event) = self.event_rx.try_recv() {
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                continue;
            }
            changed.extend(event.paths.into_iter().filter(|path| is_scene_file(path)));
        }

        let mut changed: Vec<PathBuf> = changed.into_iter().collect();
        changed.sort();
        changed
    }
}

fn watch_error(root: &Path, error: notify::Error) -> SceneError {
    SceneError::Io {
        path: root.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Other, error),
    }
}

/// Whether a changed path should trigger a reload
pub fn is_scene_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SCENE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
