use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod storage;

pub use app::{
    run_app, AppError, Body, Collider, ContactEvent, ContactPhase, Easing, InputDriver,
    InputSnapshot, Lerp, LoopConfig, Node, NodeHandle, PhysicsSettings, PhysicsStep,
    PhysicsWorld, PlayfieldBounds, PointerEvent, PointerPhase, RunSummary, Scene, SceneCommand,
    SceneKey, SceneWorld, Scheduler, StopReason, TimerHandle, Transform, Tween, Vec2, Vec3,
};
pub use storage::StorageError;

/// Overrides where the cache and saves live. Used as-is; created if missing.
pub const ROOT_ENV_VAR: &str = "MERGEFALL_ROOT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSource {
    EnvOverride,
    Workspace,
    WorkingDir,
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub root_source: RootSource,
    pub cache_dir: PathBuf,
    pub saves_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{var} is not valid unicode: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("working directory is unavailable: {0}")]
    WorkingDir(#[source] std::io::Error),
    #[error("cannot create save directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Picks the data root: the env override, else the nearest enclosing cargo
/// workspace, else the working directory.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    if let Some(root) = root_override()? {
        return app_paths_under(root, RootSource::EnvOverride);
    }
    let cwd = env::current_dir().map_err(StartupError::WorkingDir)?;
    match enclosing_workspace(&cwd) {
        Some(root) => app_paths_under(root, RootSource::Workspace),
        None => app_paths_under(cwd, RootSource::WorkingDir),
    }
}

/// Lays out `cache/saves` under `root`, creating it on the way.
pub fn app_paths_under(root: PathBuf, root_source: RootSource) -> Result<AppPaths, StartupError> {
    let cache_dir = root.join("cache");
    let saves_dir = cache_dir.join("saves");
    fs::create_dir_all(&saves_dir).map_err(|source| StartupError::CreateDir {
        path: saves_dir.clone(),
        source,
    })?;
    Ok(AppPaths {
        root,
        root_source,
        cache_dir,
        saves_dir,
    })
}

fn root_override() -> Result<Option<PathBuf>, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let trimmed = value.trim();
            Ok((!trimmed.is_empty()).then(|| PathBuf::from(trimmed)))
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn enclosing_workspace(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| declares_workspace(&dir.join("Cargo.toml")))
        .map(Path::to_path_buf)
}

fn declares_workspace(manifest: &Path) -> bool {
    fs::read_to_string(manifest)
        .is_ok_and(|text| text.lines().any(|line| line.trim() == "[workspace]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_crate_resolves_to_its_workspace() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        fs::write(temp.path().join("Cargo.toml"), "[workspace]\nmembers = []\n")
            .expect("workspace manifest");
        let member = temp.path().join("crates").join("game");
        fs::create_dir_all(&member).expect("member dir");
        fs::write(member.join("Cargo.toml"), "[package]\nname = \"game\"\n")
            .expect("member manifest");

        assert_eq!(enclosing_workspace(&member).as_deref(), Some(temp.path()));
    }

    #[test]
    fn package_manifest_alone_is_not_a_workspace() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        fs::write(temp.path().join("Cargo.toml"), "[package]\nname = \"solo\"\n")
            .expect("manifest");
        assert!(!declares_workspace(&temp.path().join("Cargo.toml")));
        assert!(!declares_workspace(&temp.path().join("missing.toml")));
    }

    #[test]
    fn app_paths_create_the_saves_directory() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let paths =
            app_paths_under(temp.path().to_path_buf(), RootSource::WorkingDir).expect("paths");
        assert!(paths.saves_dir.is_dir());
        assert!(paths.saves_dir.starts_with(&paths.cache_dir));
        assert_eq!(paths.root_source, RootSource::WorkingDir);
    }
}
