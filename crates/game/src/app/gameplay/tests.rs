use engine::{InputSnapshot, PointerPhase, Scene, SceneCommand, SceneWorld, Vec2};

use super::config::{GameConfig, ThresholdLineConfig};
use super::progress::{
    LotteryNotifier, NotifyError, ProgressCollaborator, ProgressStore,
};
use super::save::LocalSaveStore;
use super::scene_impl::PlayScene;
use super::scene_state::{CountedSnapshot, SceneSnapshot, SnapshotItem, SnapshotPosition};
use super::session::{Collaborators, GameSession};
use super::types::{ComposeCounters, GameplayEvent, FAILURE_PANEL_NAME, PREVIEW_NAME};

const DT: f32 = 1.0 / 60.0;

#[derive(Default)]
struct RecordingLottery {
    levels: Vec<usize>,
    reject: bool,
}

impl LotteryNotifier for RecordingLottery {
    fn notify_merge(&mut self, level: usize) -> Result<(), NotifyError> {
        self.levels.push(level);
        if self.reject {
            return Err(NotifyError::Rejected {
                level,
                reason: "offline".to_string(),
            });
        }
        Ok(())
    }
}

struct Harness {
    config: GameConfig,
    session: GameSession,
    world: SceneWorld,
    progress: ProgressStore,
    lottery: RecordingLottery,
    events: Vec<GameplayEvent>,
}

impl Harness {
    fn new(config: GameConfig) -> Self {
        let mut world = SceneWorld::with_physics(config.physics_settings());
        let mut session = GameSession::new(config.clone(), 7, &mut world);
        session.ensure_preview(&mut world);
        let events = session.drain_events();
        Self {
            config,
            session,
            world,
            progress: ProgressStore::default(),
            lottery: RecordingLottery::default(),
            events,
        }
    }

    /// Restores a layout of `(level, x, y)` items; restored bodies wake after
    /// the settle delay.
    fn place(&mut self, layout: &[(u32, f32, f32)]) {
        let snapshot = snapshot_of(layout);
        self.session.restore_scene_state(&snapshot, &mut self.world);
        self.events.extend(self.session.drain_events());
    }

    fn step(&mut self, input: &InputSnapshot) {
        let mut collaborators = Collaborators {
            progress: &mut self.progress,
            lottery: &mut self.lottery,
        };
        self.session
            .update(DT, input, &mut self.world, &mut collaborators);
        self.world.apply_pending();
        self.events.extend(self.session.drain_events());
    }

    fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.step(&InputSnapshot::empty());
        }
    }

    fn run_until(&mut self, max_ticks: usize, done: impl Fn(&GameplayEvent) -> bool) -> bool {
        for _ in 0..max_ticks {
            let seen = self.events.len();
            self.step(&InputSnapshot::empty());
            if self.events[seen..].iter().any(&done) {
                return true;
            }
        }
        false
    }

    fn count(&self, matches: impl Fn(&GameplayEvent) -> bool) -> usize {
        self.events.iter().filter(|event| matches(event)).count()
    }

    fn item_levels(&self) -> Vec<usize> {
        let mut levels: Vec<usize> = self
            .session
            .items()
            .values()
            .map(|item| item.level)
            .collect();
        levels.sort_unstable();
        levels
    }

    fn radius(&self, level: usize) -> f32 {
        self.config.item_prefabs[level].radius
    }
}

fn snapshot_of(layout: &[(u32, f32, f32)]) -> SceneSnapshot {
    SceneSnapshot {
        items: layout
            .iter()
            .map(|(level, x, y)| SnapshotItem {
                level: *level,
                position: SnapshotPosition {
                    x: *x,
                    y: *y,
                    z: 0.0,
                },
                prefab_index: *level,
            })
            .collect(),
        timestamp: 1_700_000_000_000,
        version: "test".to_string(),
    }
}

fn low_line_config() -> GameConfig {
    GameConfig {
        threshold_line: Some(ThresholdLineConfig {
            x: 0.0,
            y: 30.0,
            half_width: 330.0,
        }),
        ..GameConfig::default()
    }
}

#[test]
fn ordinary_merge_records_reward_and_spawns_next_level() {
    let mut h = Harness::new(GameConfig::default());
    h.place(&[(0, -17.0, 18.0), (0, 17.0, 18.0)]);

    assert!(h.run_until(120, |event| matches!(
        event,
        GameplayEvent::MergeResolved { level: 1, top_tier: false }
    )));
    let counters = h.progress.counters();
    assert_eq!(counters.gold_compose, 10);
    assert_eq!(counters.red_bag_compose, 2);
    assert_eq!(counters.times, 1);
    assert_eq!(counters.wealth_count, 0);
    assert_eq!(h.lottery.levels, vec![1]);
    assert_eq!(h.item_levels(), vec![1]);
    assert!(h.session.effects().plus_one().is_active());
    assert!(h.session.effects().active_reward_units() > 0);

    assert!(h.run_until(120, |event| matches!(
        event,
        GameplayEvent::RewardBatchFinished { .. }
    )));
    let merged = *h.session.items().keys().next().expect("merged item");
    assert!(h.world.get(merged).expect("node").physics_enabled());
}

#[test]
fn lottery_failure_does_not_block_bookkeeping() {
    let mut h = Harness::new(GameConfig::default());
    h.lottery.reject = true;
    h.place(&[(2, -25.0, 30.0), (2, 25.0, 30.0)]);
    h.run(120);
    assert_eq!(h.lottery.levels, vec![3]);
    assert_eq!(h.progress.counters().gold_compose, 30);
    assert_eq!(h.item_levels(), vec![3]);
}

#[test]
fn top_tier_merge_freezes_until_sequence_completes() {
    let mut h = Harness::new(GameConfig::default());
    let offset = h.radius(10) - 5.0;
    h.place(&[(10, -offset, 100.0), (10, offset, 100.0)]);

    assert!(h.run_until(120, |event| matches!(
        event,
        GameplayEvent::MergeResolved { level: 11, top_tier: true }
    )));
    assert!(h.session.items().is_empty());
    assert!(h.session.is_top_tier_frozen());
    assert!(!h.world.physics().is_enabled());
    assert!(h.session.is_spawning_halted());
    assert_eq!(h.progress.counters().wealth_count, 1);
    assert_eq!(h.progress.counters().gold_compose, 110);

    h.run(90);
    assert!(h.session.is_top_tier_frozen(), "still inside the 2 s sequence");
    assert_eq!(h.count(|event| *event == GameplayEvent::TopTierFinished), 0);

    assert!(h.run_until(60, |event| *event == GameplayEvent::TopTierFinished));
    assert!(!h.session.is_top_tier_frozen());
    assert!(h.world.physics().is_enabled());
    assert!(!h.session.is_spawning_halted());
    assert!(h.session.preview().is_some());
    assert_eq!(h.session.effects().pool().active_count(), 0);
}

#[test]
fn simultaneous_contacts_merge_only_one_pair() {
    let mut h = Harness::new(GameConfig::default());
    h.place(&[(2, 0.0, 30.0), (2, -40.0, 30.0), (2, 40.0, 30.0)]);
    h.run(180);

    assert_eq!(h.lottery.levels, vec![3]);
    assert_eq!(h.item_levels(), vec![2, 3]);
    assert_eq!(h.progress.counters().times, 1);
}

#[test]
fn sustained_line_contact_ends_game_once_and_restart_clears_it() {
    let mut h = Harness::new(low_line_config());
    h.place(&[(0, 100.0, 18.0)]);

    // Restart is ignored while the game is running.
    h.step(&InputSnapshot::empty().with_restart_pressed(true));
    assert_eq!(h.item_levels(), vec![0]);

    assert!(h.run_until(300, |event| *event == GameplayEvent::GameOverChanged(true)));
    h.run(300);
    assert_eq!(h.count(|event| *event == GameplayEvent::GameOverChanged(true)), 1);
    assert!(h.session.is_game_over());
    assert!(h.session.is_spawning_halted());
    assert!(h.world.find_by_name(FAILURE_PANEL_NAME).is_some());
    let item = *h.session.items().keys().next().expect("item");
    assert!(!h.world.get(item).expect("item").physics_enabled());

    h.step(&InputSnapshot::empty().with_restart_pressed(true));
    assert!(!h.session.is_game_over());
    assert!(h.session.items().is_empty());
    assert!(h.world.find_by_name(FAILURE_PANEL_NAME).is_none());
    assert!(h.session.preview().is_some());
    assert!(!h.session.is_spawning_halted());
    assert_eq!(h.count(|event| *event == GameplayEvent::GameOverChanged(false)), 1);
    assert_eq!(h.count(|event| *event == GameplayEvent::Restarted), 1);
}

#[test]
fn drag_and_release_drops_preview_as_item() {
    let mut h = Harness::new(GameConfig::default());
    let preview = h.session.preview().expect("preview");
    assert_eq!(h.world.get(preview).expect("preview").name, PREVIEW_NAME);

    h.step(&InputSnapshot::empty().with_pointer(PointerPhase::Began, Vec2 { x: 0.0, y: 1000.0 }));
    h.step(&InputSnapshot::empty().with_pointer(PointerPhase::Moved, Vec2 { x: 900.0, y: 1000.0 }));
    let x = h.world.get(preview).expect("preview").transform.position.x;
    assert_eq!(x, 330.0);
    h.step(&InputSnapshot::empty().with_pointer(PointerPhase::Ended, Vec2 { x: 900.0, y: 1000.0 }));

    assert!(h.run_until(30, |event| matches!(event, GameplayEvent::ItemDropped { .. })));
    let node = h.world.get(preview).expect("dropped item");
    assert!(node.name.starts_with("item_"));
    assert!(node.physics_enabled());
    assert_eq!(h.session.items().len(), 1);
    assert_eq!(h.session.preview(), None);

    assert!(h.run_until(60, |event| matches!(event, GameplayEvent::PreviewSpawned { .. })));
    assert!(h.session.preview().is_some());
}

#[test]
fn release_below_band_cancels_drop() {
    let mut h = Harness::new(GameConfig::default());
    let preview = h.session.preview().expect("preview");
    let home = h.world.get(preview).expect("preview").transform.position;

    h.step(&InputSnapshot::empty().with_pointer(PointerPhase::Began, Vec2 { x: -50.0, y: 990.0 }));
    h.step(&InputSnapshot::empty().with_pointer(PointerPhase::Ended, Vec2 { x: -50.0, y: 400.0 }));
    h.run(60);

    assert_eq!(h.world.get(preview).expect("preview").transform.position, home);
    assert!(h.session.items().is_empty());
    assert_eq!(h.count(|event| matches!(event, GameplayEvent::ItemDropped { .. })), 0);
}

#[test]
fn saved_layout_excludes_preview_and_restores_exactly() {
    let mut h = Harness::new(GameConfig::default());
    h.place(&[(1, -200.0, 24.0), (4, 0.0, 44.0), (7, 200.0, 70.0)]);
    h.run(60);

    let snapshot = h.session.save_scene_state(&h.world);
    assert_eq!(snapshot.items.len(), 3);
    assert!(h.session.preview().is_some());
    let mut levels: Vec<u32> = snapshot.items.iter().map(|item| item.level).collect();
    levels.sort_unstable();
    assert_eq!(levels, vec![1, 4, 7]);

    let decoded = SceneSnapshot::from_json(&snapshot.to_json().expect("encode")).expect("decode");
    let mut other = Harness::new(GameConfig::default());
    other.session.restore_scene_state(&decoded, &mut other.world);
    let recaptured = other.session.save_scene_state(&other.world);
    assert_eq!(recaptured.items, snapshot.items);
}

#[test]
fn unified_restore_prefers_fresher_remote_copy() {
    let mut h = Harness::new(GameConfig::default());
    let mut progress = ProgressStore::default();
    progress.restore_local(CountedSnapshot {
        counters: ComposeCounters {
            gold_compose: 50,
            red_bag_compose: 10,
            ..ComposeCounters::default()
        },
        snapshot: Some(snapshot_of(&[(0, -100.0, 18.0), (0, 100.0, 18.0)])),
    });
    progress.receive_remote(CountedSnapshot {
        counters: ComposeCounters {
            gold_compose: 80,
            red_bag_compose: 5,
            ..ComposeCounters::default()
        },
        snapshot: Some(snapshot_of(&[(5, 0.0, 52.0)])),
    });
    assert!(progress.should_use_server_scene_data());

    let report = h
        .session
        .unified_data_restore(&progress, &mut h.world)
        .expect("restored");
    assert_eq!(report.restored, 1);
    assert_eq!(h.item_levels(), vec![5]);
}

#[test]
fn unified_restore_without_any_copy_leaves_playfield_alone() {
    let mut h = Harness::new(GameConfig::default());
    h.place(&[(3, 0.0, 36.0)]);
    let progress = ProgressStore::default();
    assert!(h.session.unified_data_restore(&progress, &mut h.world).is_none());
    assert_eq!(h.item_levels(), vec![3]);
}

#[test]
fn missing_threshold_line_disables_spawning_and_failure() {
    let config = GameConfig {
        threshold_line: None,
        ..GameConfig::default()
    };
    let mut h = Harness::new(config);
    assert!(h.session.line().is_none());
    assert!(h.session.preview().is_none());
    h.place(&[(0, 0.0, 18.0)]);
    h.run(400);
    assert!(!h.session.is_game_over());
}

#[test]
fn missing_reward_prefabs_still_records_rewards() {
    let mut config = GameConfig::default();
    config.effects.reward_prefabs = None;
    let mut h = Harness::new(config);
    h.place(&[(0, -17.0, 18.0), (0, 17.0, 18.0)]);
    h.run(120);
    assert_eq!(h.progress.counters().gold_compose, 10);
    assert_eq!(h.session.effects().active_reward_units(), 0);
}

#[test]
fn local_save_task_repeats_on_interval() {
    let mut config = GameConfig::default();
    config.persistence.local_save_interval_seconds = 0.5;
    let mut h = Harness::new(config);
    h.run(62);
    assert_eq!(h.count(|event| *event == GameplayEvent::LocalSaveDue), 2);
}

#[test]
fn zero_save_interval_disables_periodic_saves() {
    let mut config = GameConfig::default();
    config.persistence.local_save_interval_seconds = 0.0;
    let mut h = Harness::new(config);
    h.run(120);
    assert_eq!(h.count(|event| *event == GameplayEvent::LocalSaveDue), 0);
}

#[test]
fn play_scene_persists_across_sessions() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GameConfig::default();
    let store = LocalSaveStore::in_dir(temp.path(), "playfield.save.json");
    let mut world = SceneWorld::with_physics(config.physics_settings());

    let mut scene = PlayScene::new(config.clone(), 11, Some(store.clone()));
    scene.progress_mut().receive_remote(CountedSnapshot {
        counters: ComposeCounters {
            gold_compose: 5,
            ..ComposeCounters::default()
        },
        snapshot: Some(snapshot_of(&[(1, -150.0, 24.0), (3, 150.0, 36.0)])),
    });
    scene.load(&mut world);
    assert_eq!(scene.session().expect("session").items().len(), 2);
    for _ in 0..30 {
        let command = scene.update(DT, &InputSnapshot::empty(), &mut world);
        assert_eq!(command, SceneCommand::None);
        world.apply_pending();
    }
    assert_eq!(
        scene.update(DT, &InputSnapshot::empty().with_switch_scene_pressed(true), &mut world),
        SceneCommand::SwitchTo(engine::SceneKey::Lobby)
    );
    scene.unload(&mut world);
    world.clear();
    world.apply_pending();
    assert!(scene.session().is_none());
    assert!(store.path().is_file());

    let mut reopened = PlayScene::new(config, 12, Some(store));
    reopened.load(&mut world);
    let session = reopened.session().expect("session");
    let mut levels: Vec<usize> = session.items().values().map(|item| item.level).collect();
    levels.sort_unstable();
    assert_eq!(levels, vec![1, 3]);
    assert!(!reopened.progress().should_use_server_scene_data());
    assert_eq!(reopened.lottery().notified(), 0);
}

fn scene_levels(scene: &PlayScene) -> Vec<usize> {
    let mut levels: Vec<usize> = scene
        .session()
        .expect("session")
        .items()
        .values()
        .map(|item| item.level)
        .collect();
    levels.sort_unstable();
    levels
}

fn leave_play_scene(scene: &mut PlayScene, world: &mut SceneWorld) {
    assert_eq!(
        scene.update(DT, &InputSnapshot::empty().with_switch_scene_pressed(true), world),
        SceneCommand::SwitchTo(engine::SceneKey::Lobby)
    );
    scene.unload(world);
    world.clear();
    world.apply_pending();
}

#[test]
fn reentering_play_scene_keeps_the_layout_saved_on_leave() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GameConfig::default();
    let store = LocalSaveStore::in_dir(temp.path(), "playfield.save.json");
    let mut world = SceneWorld::with_physics(config.physics_settings());

    let mut scene = PlayScene::new(config.clone(), 5, Some(store.clone()));
    scene.progress_mut().receive_remote(CountedSnapshot {
        counters: ComposeCounters {
            gold_compose: 5,
            ..ComposeCounters::default()
        },
        snapshot: Some(snapshot_of(&[(0, -17.0, 18.0), (0, 17.0, 18.0)])),
    });
    scene.load(&mut world);
    assert_eq!(scene_levels(&scene), vec![0, 0]);
    for _ in 0..120 {
        scene.update(DT, &InputSnapshot::empty(), &mut world);
        world.apply_pending();
    }
    assert_eq!(scene_levels(&scene), vec![1]);
    assert_eq!(scene.progress().counters().gold_compose, 10);

    leave_play_scene(&mut scene, &mut world);
    assert_eq!(scene.progress().counters(), ComposeCounters::default());

    scene.load(&mut world);
    assert_eq!(scene_levels(&scene), vec![1]);
    assert_eq!(scene.progress().counters(), ComposeCounters::default());
    assert_eq!(scene.lottery().notified(), 1);
    leave_play_scene(&mut scene, &mut world);
}

#[test]
fn local_save_holds_only_unreported_counters() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GameConfig::default();
    let store = LocalSaveStore::in_dir(temp.path(), "playfield.save.json");
    let mut world = SceneWorld::with_physics(config.physics_settings());

    let mut scene = PlayScene::new(config.clone(), 5, Some(store.clone()));
    scene.progress_mut().receive_remote(CountedSnapshot {
        counters: ComposeCounters {
            gold_compose: 5,
            ..ComposeCounters::default()
        },
        snapshot: Some(snapshot_of(&[(0, -17.0, 18.0), (0, 17.0, 18.0)])),
    });
    scene.load(&mut world);
    for _ in 0..120 {
        scene.update(DT, &InputSnapshot::empty(), &mut world);
        world.apply_pending();
    }
    assert_eq!(scene.progress().counters().gold_compose, 10);
    scene.update(DT, &InputSnapshot::empty().with_save_pressed(true), &mut world);

    let saved = store.load().expect("load").expect("save present");
    assert_eq!(saved.counters, ComposeCounters::default());
    leave_play_scene(&mut scene, &mut world);

    let mut restarted = PlayScene::new(config, 6, Some(store));
    restarted.load(&mut world);
    assert_eq!(restarted.progress().counters(), ComposeCounters::default());
    assert_eq!(scene_levels(&restarted), vec![1]);
    assert!(!restarted.progress().should_use_server_scene_data());
}
