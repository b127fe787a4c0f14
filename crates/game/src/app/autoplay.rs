use engine::{Collider, InputDriver, InputSnapshot, PointerPhase, SceneKey, SceneWorld, Vec2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::gameplay::{FAILURE_PANEL_NAME, PREVIEW_NAME, THRESHOLD_LINE_NAME};

const LOBBY_DWELL_TICKS: u64 = 30;
const MIN_DROP_COOLDOWN_TICKS: u64 = 20;
const MAX_DROP_COOLDOWN_TICKS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
enum DropPlan {
    Waiting { until_tick: u64 },
    Pressed { x: f32 },
    Dragged { x: f32 },
}

/// Seeded bot that plays the playfield: drags the preview to a random column
/// and releases it, restarts after a game over and periodically saves or
/// leaves for the lobby.
#[derive(Debug)]
pub(crate) struct AutoplayDriver {
    rng: ChaCha8Rng,
    plan: DropPlan,
    lobby_ticks: u64,
    play_ticks: u64,
    save_every: u64,
    lobby_every: u64,
    drops: u64,
}

impl AutoplayDriver {
    pub(crate) fn new(seed: u64, save_every: u64, lobby_every: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            plan: DropPlan::Waiting { until_tick: 0 },
            lobby_ticks: 0,
            play_ticks: 0,
            save_every,
            lobby_every,
            drops: 0,
        }
    }

    pub(crate) fn drops(&self) -> u64 {
        self.drops
    }

    fn next_lobby_input(&mut self) -> InputSnapshot {
        self.lobby_ticks += 1;
        if self.lobby_ticks < LOBBY_DWELL_TICKS {
            return InputSnapshot::empty();
        }
        self.lobby_ticks = 0;
        InputSnapshot::empty().with_switch_scene_pressed(true)
    }

    fn next_play_input(&mut self, world: &SceneWorld) -> InputSnapshot {
        self.play_ticks += 1;
        let tick = self.play_ticks;

        if self.lobby_every > 0 && tick % self.lobby_every == 0 {
            self.plan = DropPlan::Waiting { until_tick: 0 };
            return InputSnapshot::empty().with_switch_scene_pressed(true);
        }
        let mut input = InputSnapshot::empty()
            .with_save_pressed(self.save_every > 0 && tick % self.save_every == 0);
        if world.find_by_name(FAILURE_PANEL_NAME).is_some() {
            self.plan = DropPlan::Waiting { until_tick: 0 };
            return input.with_restart_pressed(true);
        }
        let Some((line_x, line_y, half_width)) = threshold_line(world) else {
            return input;
        };

        match self.plan {
            DropPlan::Waiting { until_tick } => {
                if tick >= until_tick && world.find_by_name(PREVIEW_NAME).is_some() {
                    let x = line_x + self.rng.gen_range(-half_width..=half_width);
                    input = input.with_pointer(PointerPhase::Began, Vec2 { x, y: line_y });
                    self.plan = DropPlan::Pressed { x };
                }
            }
            DropPlan::Pressed { x } => {
                input = input.with_pointer(PointerPhase::Moved, Vec2 { x, y: line_y });
                self.plan = DropPlan::Dragged { x };
            }
            DropPlan::Dragged { x } => {
                input = input.with_pointer(PointerPhase::Ended, Vec2 { x, y: line_y });
                self.drops += 1;
                let cooldown = self
                    .rng
                    .gen_range(MIN_DROP_COOLDOWN_TICKS..=MAX_DROP_COOLDOWN_TICKS);
                self.plan = DropPlan::Waiting {
                    until_tick: tick + cooldown,
                };
                debug!(x, drops = self.drops, "autoplay_drop");
            }
        }
        input
    }
}

impl InputDriver for AutoplayDriver {
    fn next_input(&mut self, _tick: u64, active: SceneKey, world: &SceneWorld) -> InputSnapshot {
        match active {
            SceneKey::Lobby => self.next_lobby_input(),
            SceneKey::Play => self.next_play_input(world),
        }
    }
}

fn threshold_line(world: &SceneWorld) -> Option<(f32, f32, f32)> {
    let node = world.get(world.find_by_name(THRESHOLD_LINE_NAME)?)?;
    match node.body?.collider {
        Collider::Line { half_width } => Some((
            node.transform.position.x,
            node.transform.position.y,
            half_width,
        )),
        Collider::Circle { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use engine::{Body, Transform, Vec3};

    use super::*;

    fn playfield() -> SceneWorld {
        let mut world = SceneWorld::default();
        world.spawn(
            THRESHOLD_LINE_NAME,
            Transform::at(Vec3::new(0.0, 1000.0, 0.0)),
            Some(Body::line(330.0)),
        );
        world.spawn(PREVIEW_NAME, Transform::default(), Some(Body::circle(18.0).disabled()));
        world
    }

    #[test]
    fn lobby_switches_to_play_after_dwell() {
        let mut driver = AutoplayDriver::new(1, 0, 0);
        let world = SceneWorld::default();
        let switches = (0..LOBBY_DWELL_TICKS)
            .filter(|tick| {
                driver
                    .next_input(*tick, SceneKey::Lobby, &world)
                    .switch_scene_pressed()
            })
            .count();
        assert_eq!(switches, 1);
    }

    #[test]
    fn drop_is_press_move_release_inside_the_line() {
        let mut driver = AutoplayDriver::new(3, 0, 0);
        let world = playfield();
        let phases: Vec<_> = (0..3)
            .map(|tick| {
                driver
                    .next_input(tick, SceneKey::Play, &world)
                    .pointer()
                    .expect("pointer event")
            })
            .collect();
        assert_eq!(phases[0].phase, PointerPhase::Began);
        assert_eq!(phases[1].phase, PointerPhase::Moved);
        assert_eq!(phases[2].phase, PointerPhase::Ended);
        for event in &phases {
            assert!(event.position.x.abs() <= 330.0);
            assert_eq!(event.position.y, 1000.0);
        }
        assert_eq!(driver.drops(), 1);
        assert!(driver.next_input(3, SceneKey::Play, &world).pointer().is_none());
    }

    #[test]
    fn game_over_panel_triggers_restart() {
        let mut driver = AutoplayDriver::new(5, 0, 0);
        let mut world = playfield();
        world.spawn(FAILURE_PANEL_NAME, Transform::default(), None);
        let input = driver.next_input(0, SceneKey::Play, &world);
        assert!(input.restart_pressed());
        assert!(input.pointer().is_none());
    }

    #[test]
    fn same_seed_replays_same_inputs() {
        let world = playfield();
        let record = |seed| {
            let mut driver = AutoplayDriver::new(seed, 7, 0);
            (0..200)
                .map(|tick| driver.next_input(tick, SceneKey::Play, &world))
                .collect::<Vec<_>>()
        };
        assert_eq!(record(42), record(42));
    }

    #[test]
    fn periodic_save_and_lobby_visits() {
        let mut driver = AutoplayDriver::new(9, 4, 10);
        let world = playfield();
        let inputs: Vec<_> = (0..10)
            .map(|tick| driver.next_input(tick, SceneKey::Play, &world))
            .collect();
        assert!(inputs[3].save_pressed());
        assert!(inputs[7].save_pressed());
        assert!(inputs[9].switch_scene_pressed());
    }
}
