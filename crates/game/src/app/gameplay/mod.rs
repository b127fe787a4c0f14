mod config;
mod effects;
mod failure;
mod progress;
mod save;
mod scene_impl;
mod scene_state;
mod session;
mod spawn;
mod synthesis;
mod types;

use engine::{AppPaths, Scene};

pub(crate) use config::{load_config, GameConfig};
pub(crate) use types::{FAILURE_PANEL_NAME, PREVIEW_NAME, THRESHOLD_LINE_NAME};

use save::LocalSaveStore;
use scene_impl::{LobbyScene, PlayScene};

pub(crate) fn build_scene_pair(
    config: GameConfig,
    paths: &AppPaths,
    seed: u64,
) -> (Box<dyn Scene>, Box<dyn Scene>) {
    let save_store =
        LocalSaveStore::in_dir(&paths.saves_dir, &config.persistence.save_file_name);
    let play = PlayScene::new(config, seed, Some(save_store));
    (Box::new(LobbyScene::default()), Box::new(play))
}

#[cfg(test)]
mod tests;
