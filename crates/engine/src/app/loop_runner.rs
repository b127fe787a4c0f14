use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::{resolve_app_paths, AppPaths, StartupError};

use super::physics::PhysicsSettings;
use super::scene::SceneMachine;
use super::{InputSnapshot, Scene, SceneCommand, SceneKey, SceneWorld};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Stop after this many simulation ticks. `None` runs until a scene quits.
    pub max_ticks: Option<u64>,
    /// Pace ticks against the wall clock instead of running flat out.
    pub realtime: bool,
    pub initial_scene: SceneKey,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            max_ticks: None,
            realtime: false,
            initial_scene: SceneKey::Lobby,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
}

/// Produces the input for each simulation tick. The headless runner has no
/// window, so pointer and key activity comes from a driver (a bot, a replay,
/// or a test script).
pub trait InputDriver {
    fn next_input(&mut self, tick: u64, active: SceneKey, world: &SceneWorld) -> InputSnapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    TickLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub scene_switches: u32,
    pub final_scene: SceneKey,
    pub stop_reason: StopReason,
}

/// Resolves the app directories, lets the caller build its scenes against
/// them, then runs the headless loop until a scene quits or the tick limit.
pub fn run_app<F>(
    config: LoopConfig,
    play_physics: PhysicsSettings,
    driver: &mut dyn InputDriver,
    build_scenes: F,
) -> Result<RunSummary, AppError>
where
    F: FnOnce(&AppPaths) -> (Box<dyn Scene>, Box<dyn Scene>),
{
    let app_paths = resolve_app_paths()?;
    log_startup(&app_paths);
    let (lobby, play) = build_scenes(&app_paths);
    let mut scenes = SceneMachine::new(lobby, play, config.initial_scene, play_physics);
    Ok(run_loop(&config, &mut scenes, driver))
}

fn log_startup(app_paths: &AppPaths) {
    info!(
        root = %app_paths.root.display(),
        root_source = ?app_paths.root_source,
        cache_dir = %app_paths.cache_dir.display(),
        saves_dir = %app_paths.saves_dir.display(),
        "startup"
    );
}

pub(crate) fn run_loop(
    config: &LoopConfig,
    scenes: &mut SceneMachine,
    driver: &mut dyn InputDriver,
) -> RunSummary {
    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();

    scenes.load_active();
    scenes.apply_pending_active();
    info!(
        scene = ?scenes.active_scene(),
        node_count = scenes.active_world().node_count(),
        "scene_loaded"
    );
    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        max_ticks = ?config.max_ticks,
        realtime = config.realtime,
        "loop_config"
    );

    let mut ticks = 0u64;
    let mut scene_switches = 0u32;
    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut tick_metrics = TickMetrics::new(metrics_log_interval);

    let stop_reason = 'frames: loop {
        let ticks_to_run = if config.realtime {
            let now = Instant::now();
            let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
            last_frame_instant = now;
            accumulator = accumulator.saturating_add(clamp_frame_delta(raw_frame_dt, max_frame_delta));
            let plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
            accumulator = plan.remaining_accumulator;
            if plan.dropped_backlog > Duration::ZERO {
                warn!(
                    dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                    max_ticks_per_frame, "sim_clamp_triggered"
                );
            }
            plan.ticks_to_run
        } else {
            1
        };

        for _ in 0..ticks_to_run {
            if config.max_ticks.is_some_and(|limit| ticks >= limit) {
                break 'frames StopReason::TickLimit;
            }
            let input = driver.next_input(ticks, scenes.active_scene(), scenes.active_world());
            let command = scenes.update_active(fixed_dt_seconds, &input);
            scenes.apply_pending_active();
            ticks = ticks.saturating_add(1);
            tick_metrics.record_tick();

            let switched = match command {
                SceneCommand::SwitchTo(next_scene) => scenes.switch_to(next_scene),
                SceneCommand::HardResetTo(next_scene) => scenes.hard_reset_to(next_scene),
                SceneCommand::Quit => {
                    info!(reason = "scene_quit", "shutdown_requested");
                    break 'frames StopReason::Quit;
                }
                SceneCommand::None => false,
            };
            if input.quit_requested() {
                info!(reason = "input_quit", "shutdown_requested");
                break 'frames StopReason::Quit;
            }
            if switched {
                scenes.apply_pending_active();
                scene_switches = scene_switches.saturating_add(1);
                info!(
                    scene = ?scenes.active_scene(),
                    node_count = scenes.active_world().node_count(),
                    "scene_switched"
                );
            }
        }

        if let Some(tps) = tick_metrics.maybe_tps(Instant::now()) {
            info!(
                tps,
                ticks,
                node_count = scenes.active_world().node_count(),
                scene = ?scenes.active_scene(),
                title = scenes.debug_title_active().as_deref().unwrap_or(""),
                "loop_metrics"
            );
        }

        if config.realtime {
            let elapsed = Instant::now().saturating_duration_since(last_frame_instant);
            if elapsed < fixed_dt {
                thread::sleep(fixed_dt - elapsed);
            }
        }
    };

    let final_scene = scenes.active_scene();
    scenes.shutdown_all();
    info!(ticks, scene_switches, stop_reason = ?stop_reason, "shutdown");

    RunSummary {
        ticks,
        scene_switches,
        final_scene,
        stop_reason,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(mut accumulator: Duration, fixed_dt: Duration, max_ticks_per_frame: u32) -> StepPlan {
    let mut ticks_to_run = 0u32;
    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[derive(Debug)]
struct TickMetrics {
    interval_start: Instant,
    interval: Duration,
    ticks: u32,
}

impl TickMetrics {
    fn new(interval: Duration) -> Self {
        Self {
            interval_start: Instant::now(),
            interval,
            ticks: 0,
        }
    }

    fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    fn maybe_tps(&mut self, now: Instant) -> Option<f32> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }
        let tps = self.ticks as f32 / elapsed.as_secs_f32().max(f32::EPSILON);
        self.interval_start = now;
        self.ticks = 0;
        Some(tps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(600), max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let result = plan_sim_steps(Duration::from_millis(48), Duration::from_millis(16), 5);
        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let result = plan_sim_steps(Duration::from_millis(120), Duration::from_millis(16), 3);
        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    struct SwitchOnce;

    impl Scene for SwitchOnce {
        fn load(&mut self, world: &mut SceneWorld) {
            world.spawn("marker", Default::default(), None);
        }

        fn update(
            &mut self,
            _fixed_dt_seconds: f32,
            input: &InputSnapshot,
            _world: &mut SceneWorld,
        ) -> SceneCommand {
            if input.switch_scene_pressed() {
                SceneCommand::SwitchTo(SceneKey::Play)
            } else {
                SceneCommand::None
            }
        }

        fn unload(&mut self, _world: &mut SceneWorld) {}
    }

    struct QuitAfter(u32);

    impl Scene for QuitAfter {
        fn load(&mut self, _world: &mut SceneWorld) {}

        fn update(
            &mut self,
            _fixed_dt_seconds: f32,
            _input: &InputSnapshot,
            _world: &mut SceneWorld,
        ) -> SceneCommand {
            self.0 = self.0.saturating_sub(1);
            if self.0 == 0 {
                SceneCommand::Quit
            } else {
                SceneCommand::None
            }
        }

        fn unload(&mut self, _world: &mut SceneWorld) {}
    }

    struct SwitchOnTick(u64);

    impl InputDriver for SwitchOnTick {
        fn next_input(&mut self, tick: u64, _active: SceneKey, _world: &SceneWorld) -> InputSnapshot {
            InputSnapshot::empty().with_switch_scene_pressed(tick == self.0)
        }
    }

    #[test]
    fn headless_loop_switches_scene_then_stops_on_quit() {
        let mut scenes = SceneMachine::new(
            Box::new(SwitchOnce),
            Box::new(QuitAfter(4)),
            SceneKey::Lobby,
            PhysicsSettings::default(),
        );
        let summary = run_loop(&LoopConfig::default(), &mut scenes, &mut SwitchOnTick(2));

        assert_eq!(summary.stop_reason, StopReason::Quit);
        assert_eq!(summary.scene_switches, 1);
        assert_eq!(summary.final_scene, SceneKey::Play);
        assert_eq!(summary.ticks, 7);
    }

    #[test]
    fn headless_loop_honors_tick_limit() {
        let mut scenes = SceneMachine::new(
            Box::new(SwitchOnce),
            Box::new(QuitAfter(1000)),
            SceneKey::Lobby,
            PhysicsSettings::default(),
        );
        let config = LoopConfig {
            max_ticks: Some(25),
            ..LoopConfig::default()
        };
        let summary = run_loop(&config, &mut scenes, &mut SwitchOnTick(u64::MAX));

        assert_eq!(summary.stop_reason, StopReason::TickLimit);
        assert_eq!(summary.ticks, 25);
        assert_eq!(summary.final_scene, SceneKey::Lobby);
    }
}
