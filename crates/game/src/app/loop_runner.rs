use std::process::ExitCode;

use engine::run_app;
use tracing::{error, info};

use super::autoplay::AutoplayDriver;
use super::bootstrap::AppWiring;
use super::gameplay;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        loop_config,
        play_physics,
        game_config,
        seed,
        autoplay_save_every,
        autoplay_lobby_every,
    } = app;
    let mut driver = AutoplayDriver::new(seed, autoplay_save_every, autoplay_lobby_every);

    match run_app(loop_config, play_physics, &mut driver, |paths| {
        gameplay::build_scene_pair(game_config, paths, seed)
    }) {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                scene_switches = summary.scene_switches,
                final_scene = ?summary.final_scene,
                stop_reason = ?summary.stop_reason,
                drops = driver.drops(),
                "run_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}
