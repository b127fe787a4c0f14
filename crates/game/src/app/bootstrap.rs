use std::env;
use std::path::PathBuf;

use engine::{LoopConfig, PhysicsSettings, SceneKey};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use super::gameplay::{self, GameConfig};

const CONFIG_ENV_VAR: &str = "MERGEFALL_CONFIG";
const SEED_ENV_VAR: &str = "MERGEFALL_SEED";
const MAX_TICKS_ENV_VAR: &str = "MERGEFALL_MAX_TICKS";
const DEFAULT_SEED: u64 = 0x5eed;
const DEFAULT_MAX_TICKS: u64 = 60 * 180;
const AUTOPLAY_SAVE_EVERY_TICKS: u64 = 60 * 15;
const AUTOPLAY_LOBBY_EVERY_TICKS: u64 = 60 * 45;

pub(crate) struct AppWiring {
    pub(crate) loop_config: LoopConfig,
    pub(crate) play_physics: PhysicsSettings,
    pub(crate) game_config: GameConfig,
    pub(crate) seed: u64,
    pub(crate) autoplay_save_every: u64,
    pub(crate) autoplay_lobby_every: u64,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Mergefall Startup ===");

    let game_config = load_game_config(env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
    let seed = parse_u64_setting(SEED_ENV_VAR, env::var(SEED_ENV_VAR).ok()).unwrap_or(DEFAULT_SEED);
    let max_ticks = parse_u64_setting(MAX_TICKS_ENV_VAR, env::var(MAX_TICKS_ENV_VAR).ok())
        .unwrap_or(DEFAULT_MAX_TICKS);
    let loop_config = LoopConfig {
        // Zero runs until a scene quits.
        max_ticks: (max_ticks > 0).then_some(max_ticks),
        initial_scene: SceneKey::Lobby,
        ..LoopConfig::default()
    };
    info!(seed, max_ticks, levels = game_config.levels(), "app_configured");

    AppWiring {
        loop_config,
        play_physics: game_config.physics_settings(),
        game_config,
        seed,
        autoplay_save_every: AUTOPLAY_SAVE_EVERY_TICKS,
        autoplay_lobby_every: AUTOPLAY_LOBBY_EVERY_TICKS,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// Falls back to the built-in defaults when the file is missing, malformed
/// or fails validation. Missing references only switch features off.
fn load_game_config(path: Option<PathBuf>) -> GameConfig {
    let config = match path {
        None => GameConfig::default(),
        Some(path) => match gameplay::load_config(&path) {
            Ok(config) => {
                info!(path = %path.display(), "game_config_loaded");
                config
            }
            Err(error) => {
                error!(error = %error, "game_config_load_failed");
                GameConfig::default()
            }
        },
    };
    match config.validate() {
        Ok(issues) => {
            for issue in issues {
                warn!(issue = %issue, "game_config_issue");
            }
            config
        }
        Err(error) => {
            error!(error = %error, "game_config_invalid");
            GameConfig::default()
        }
    }
}

fn parse_u64_setting(name: &str, raw: Option<String>) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(var = name, value = %raw, error = %error, "env_setting_ignored");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn numeric_settings_parse_or_fall_back() {
        assert_eq!(parse_u64_setting("X", None), None);
        assert_eq!(parse_u64_setting("X", Some(" 42 ".to_string())), Some(42));
        assert_eq!(parse_u64_setting("X", Some("forty".to_string())), None);
    }

    #[test]
    fn broken_config_file_falls_back_to_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("mergefall.json");
        fs::write(&path, r#"{ "synthesis": { "goldPerLevel": -1 } }"#).expect("write");
        assert_eq!(load_game_config(Some(path)), GameConfig::default());
    }

    #[test]
    fn invalid_config_values_fall_back_to_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("mergefall.json");
        fs::write(&path, r#"{ "playfield": { "minX": 50, "maxX": -50 } }"#).expect("write");
        assert_eq!(load_game_config(Some(path)), GameConfig::default());
    }

    #[test]
    fn valid_config_file_is_used() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("mergefall.json");
        fs::write(&path, r#"{ "failure": { "failureDelaySeconds": 5.0 } }"#).expect("write");
        let config = load_game_config(Some(path));
        assert_eq!(config.failure.failure_delay_seconds, 5.0);
    }
}
