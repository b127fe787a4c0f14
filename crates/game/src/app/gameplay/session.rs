use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use engine::{
    Body, ContactEvent, ContactPhase, InputSnapshot, NodeHandle, SceneWorld, Scheduler,
    Transform, Vec3,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use super::config::{seconds, GameConfig};
use super::effects::{EffectEvent, EffectOrchestrator};
use super::failure::FailureMonitor;
use super::progress::{LotteryNotifier, ProgressCollaborator};
use super::scene_state::{RestoreReport, SceneSnapshot, SceneStateManager};
use super::spawn::{PointerOutcome, SpawnController};
use super::synthesis::{MergeRejection, MergeResolution, SynthesisEngine};
use super::types::{
    GameplayEvent, ItemCatalog, ItemData, SessionTask, FAILURE_PANEL_NAME, THRESHOLD_LINE_NAME,
};

pub(crate) const SNAPSHOT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Outside parties a session reports to while it runs.
pub(crate) struct Collaborators<'a> {
    pub(crate) progress: &'a mut dyn ProgressCollaborator,
    pub(crate) lottery: &'a mut dyn LotteryNotifier,
}

/// One play-through of the playfield. Created when the play scene loads and
/// dropped when it unloads; dropping it drops every pending timer.
pub(crate) struct GameSession {
    config: GameConfig,
    catalog: ItemCatalog,
    scheduler: Scheduler<SessionTask>,
    items: HashMap<NodeHandle, ItemData>,
    spawn: SpawnController,
    synthesis: SynthesisEngine,
    effects: EffectOrchestrator,
    failure: FailureMonitor,
    scene_state: SceneStateManager,
    rng: ChaCha8Rng,
    line: Option<NodeHandle>,
    panel: Option<NodeHandle>,
    top_tier_freeze: bool,
    events: Vec<GameplayEvent>,
}

impl GameSession {
    pub(crate) fn new(config: GameConfig, seed: u64, world: &mut SceneWorld) -> Self {
        let catalog = ItemCatalog::from_config(&config);
        let mut scheduler = Scheduler::new();

        let line = config.threshold_line.map(|line| {
            world.spawn(
                THRESHOLD_LINE_NAME,
                Transform::at(Vec3::new(line.x, line.y, 0.0)),
                Some(Body::line(line.half_width)),
            )
        });
        if config.persistence.local_save_interval_seconds > 0.0 {
            scheduler.schedule_repeating(
                seconds(config.persistence.local_save_interval_seconds),
                SessionTask::LocalSave,
            );
        }
        world.physics_mut().set_enabled(true);

        info!(
            seed,
            levels = catalog.levels(),
            has_line = line.is_some(),
            "game_session_created"
        );
        Self {
            spawn: SpawnController::new(&config.spawn, config.threshold_line),
            synthesis: SynthesisEngine::new(&config.synthesis, &catalog),
            effects: EffectOrchestrator::new(&config.effects),
            failure: FailureMonitor::new(&config.failure),
            scene_state: SceneStateManager::new(
                SNAPSHOT_VERSION,
                config.synthesis.settle_delay_seconds,
            ),
            rng: ChaCha8Rng::seed_from_u64(seed),
            catalog,
            scheduler,
            items: HashMap::new(),
            line,
            panel: None,
            top_tier_freeze: false,
            events: Vec::new(),
            config,
        }
    }

    pub(crate) fn is_game_over(&self) -> bool {
        self.failure.is_game_over()
    }

    #[cfg(test)]
    pub(crate) fn is_top_tier_frozen(&self) -> bool {
        self.top_tier_freeze
    }

    pub(crate) fn items(&self) -> &HashMap<NodeHandle, ItemData> {
        &self.items
    }

    #[cfg(test)]
    pub(crate) fn preview(&self) -> Option<NodeHandle> {
        self.spawn.preview()
    }

    #[cfg(test)]
    pub(crate) fn line(&self) -> Option<NodeHandle> {
        self.line
    }

    #[cfg(test)]
    pub(crate) fn effects(&self) -> &EffectOrchestrator {
        &self.effects
    }

    #[cfg(test)]
    pub(crate) fn is_spawning_halted(&self) -> bool {
        self.spawn.is_halted()
    }

    pub(crate) fn status_line(&self) -> String {
        let pool = self.effects.pool();
        let state = if self.is_game_over() {
            " | GAME OVER"
        } else if self.effects.is_top_tier_running() {
            " | TOP TIER"
        } else {
            ""
        };
        format!(
            "items {} | locked {} | line contacts {} | fx {}/{}{}",
            self.items.len(),
            self.synthesis.locked_count(),
            self.failure.tracked_count(),
            pool.active_count(),
            pool.pooled_count(),
            state
        )
    }

    pub(crate) fn drain_events(&mut self) -> Vec<GameplayEvent> {
        std::mem::take(&mut self.events)
    }

    /// One fixed step: due tasks, input, physics, then effects.
    pub(crate) fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        world: &mut SceneWorld,
        collaborators: &mut Collaborators<'_>,
    ) {
        let dt = Duration::from_secs_f32(fixed_dt_seconds.max(0.0));
        for task in self.scheduler.advance(dt) {
            self.run_task(task, world, collaborators);
        }

        if input.restart_pressed() {
            self.restart(world);
        }
        if let Some(pointer) = input.pointer() {
            let outcome = self.spawn.handle_pointer(pointer, world, &mut self.scheduler);
            if !matches!(outcome, PointerOutcome::Ignored | PointerOutcome::Moved { .. }) {
                debug!(outcome = ?outcome, "pointer_handled");
            }
        }

        let step = world.step_physics(fixed_dt_seconds);
        for handle in step.out_of_bounds {
            self.remove_lost_item(handle, world);
        }
        for contact in &step.contacts {
            self.route_contact(contact, world);
        }

        for event in self.effects.advance(fixed_dt_seconds) {
            self.on_effect_event(event, world);
        }
    }

    /// Spawns a preview if none exists and spawning is allowed.
    pub(crate) fn ensure_preview(&mut self, world: &mut SceneWorld) {
        if self.failure.is_game_over() {
            return;
        }
        if let Some((_, level)) = self.spawn.ensure_preview(world, &self.catalog, &mut self.rng) {
            self.events.push(GameplayEvent::PreviewSpawned { level });
        }
    }

    /// Settled-item layout, excluding the preview.
    pub(crate) fn save_scene_state(&self, world: &SceneWorld) -> SceneSnapshot {
        self.scene_state.capture_snapshot(
            world,
            &self.items,
            &self.catalog,
            self.spawn.preview(),
            unix_millis(),
        )
    }

    /// Replaces the playfield with `snapshot`. Pending merges are dropped and
    /// a game over in progress is cleared.
    pub(crate) fn restore_scene_state(
        &mut self,
        snapshot: &SceneSnapshot,
        world: &mut SceneWorld,
    ) -> RestoreReport {
        let was_game_over = self.failure.is_game_over();
        self.reset_playfield(world);
        let report = self.scene_state.restore_snapshot(
            snapshot,
            world,
            &mut self.items,
            &self.catalog,
            &mut self.scheduler,
        );
        if was_game_over {
            self.events.push(GameplayEvent::GameOverChanged(false));
        }
        self.events.push(GameplayEvent::SnapshotRestored {
            restored: report.restored,
            dropped: report.dropped,
        });
        self.ensure_preview(world);
        report
    }

    /// Restores whichever copy the progress collaborator considers fresher.
    pub(crate) fn unified_data_restore(
        &mut self,
        progress: &dyn ProgressCollaborator,
        world: &mut SceneWorld,
    ) -> Option<RestoreReport> {
        let use_remote = progress.should_use_server_scene_data();
        let Some(snapshot) = progress.scene_data_to_restore() else {
            info!("scene_restore_skipped");
            return None;
        };
        info!(
            source = if use_remote { "remote" } else { "local" },
            items = snapshot.items.len(),
            "scene_restore_selected"
        );
        Some(self.restore_scene_state(&snapshot, world))
    }

    fn run_task(
        &mut self,
        task: SessionTask,
        world: &mut SceneWorld,
        collaborators: &mut Collaborators<'_>,
    ) {
        match task {
            SessionTask::CommitDrop { handle } => {
                if self.failure.is_game_over() {
                    self.spawn.abort_commit(handle, world);
                    return;
                }
                if let Some(level) =
                    self.spawn
                        .commit_drop(handle, world, &mut self.items, &mut self.scheduler)
                {
                    self.events.push(GameplayEvent::ItemDropped { level });
                }
            }
            SessionTask::GeneratePreview => self.ensure_preview(world),
            SessionTask::BeginMerge { a, b } => {
                self.synthesis.begin_merge(a, b, world, &mut self.scheduler);
            }
            SessionTask::ConsumePair { a, b } => {
                self.synthesis
                    .consume_pair(a, b, world, &mut self.items, &mut self.scheduler);
            }
            SessionTask::ResolveMerge {
                consumed_level,
                position,
            } => {
                let resolution = self.synthesis.resolve_merge(
                    consumed_level,
                    position,
                    world,
                    &mut self.items,
                    &self.catalog,
                    &mut self.scheduler,
                );
                self.apply_resolution(resolution, world, collaborators);
            }
            SessionTask::EnableBody { handle } => {
                if !self.failure.is_game_over() && self.items.contains_key(&handle) {
                    world.set_body_enabled(handle, true);
                }
            }
            SessionTask::FailurePoll => {
                let now = self.scheduler.now();
                if let Some(culprit) = self.failure.poll(world, now, &mut self.scheduler) {
                    self.enter_game_over(culprit, world);
                }
            }
            SessionTask::LocalSave => self.events.push(GameplayEvent::LocalSaveDue),
        }
    }

    fn apply_resolution(
        &mut self,
        resolution: MergeResolution,
        world: &mut SceneWorld,
        collaborators: &mut Collaborators<'_>,
    ) {
        let reward = resolution.reward();
        collaborators
            .progress
            .record_compose_reward(reward.gold, reward.red_bag, reward.is_max_level);
        if let Err(error) = collaborators.lottery.notify_merge(resolution.level()) {
            warn!(level = resolution.level(), error = %error, "lottery_notify_failed");
        }

        match resolution {
            MergeResolution::Ordinary {
                level,
                position,
                red_packets,
                gold_coins,
                ..
            } => {
                let batch =
                    self.effects
                        .spawn_rewards(position, red_packets, gold_coins, &mut self.rng);
                if batch.is_none() {
                    debug!(level, "reward_visuals_skipped");
                }
                self.effects.show_plus_one();
                self.events.push(GameplayEvent::MergeResolved {
                    level,
                    top_tier: false,
                });
            }
            MergeResolution::TopTier {
                level, position, ..
            } => {
                self.enter_top_tier(level, position, world);
                self.events.push(GameplayEvent::MergeResolved {
                    level,
                    top_tier: true,
                });
            }
        }
    }

    fn enter_top_tier(&mut self, level: usize, position: Vec3, world: &mut SceneWorld) {
        if !self.failure.is_game_over() && !self.top_tier_freeze {
            world.physics_mut().set_enabled(false);
            self.spawn.halt(world);
            let now = self.scheduler.now();
            self.failure.pause(now, &mut self.scheduler);
            self.top_tier_freeze = true;
        }
        self.effects.play_top_tier(level, position);
        self.events.push(GameplayEvent::TopTierStarted { level });
    }

    fn leave_top_tier(&mut self, world: &mut SceneWorld) {
        if !self.top_tier_freeze {
            return;
        }
        self.top_tier_freeze = false;
        world.physics_mut().set_enabled(true);
        let now = self.scheduler.now();
        self.failure.resume(now, &mut self.scheduler);
        self.spawn.resume();
        self.ensure_preview(world);
    }

    fn on_effect_event(&mut self, event: EffectEvent, world: &mut SceneWorld) {
        match event {
            EffectEvent::TopTierFinished => {
                self.leave_top_tier(world);
                let pool = self.effects.pool();
                debug!(
                    active = pool.active_count(),
                    pooled = pool.pooled_count(),
                    created = pool.created_count(),
                    destroyed = pool.destroyed_count(),
                    "effect_pool_stats"
                );
                self.events.push(GameplayEvent::TopTierFinished);
            }
            EffectEvent::RewardBatchFinished { batch } => {
                self.events
                    .push(GameplayEvent::RewardBatchFinished { batch });
            }
        }
    }

    fn route_contact(&mut self, contact: &ContactEvent, world: &SceneWorld) {
        if let Some(line) = self.line.filter(|line| contact.involves(*line)) {
            let now = self.scheduler.now();
            self.failure
                .observe_contact(contact, line, world, now, &mut self.scheduler);
            return;
        }
        if contact.phase != ContactPhase::Begin {
            return;
        }
        match self
            .synthesis
            .try_begin_merge(contact.a, contact.b, &self.items, &mut self.scheduler)
        {
            Ok(()) => {}
            Err(MergeRejection::MissingItemData | MergeRejection::LevelMismatch) => {}
            Err(rejection) => debug!(rejection = ?rejection, "merge_rejected"),
        }
    }

    fn remove_lost_item(&mut self, handle: NodeHandle, world: &mut SceneWorld) {
        let level = self.items.remove(&handle).map(|item| item.level);
        self.synthesis.forget(handle);
        world.despawn(handle);
        warn!(index = handle.index(), level = ?level, "item_left_playfield");
        self.events.push(GameplayEvent::ItemLost { level });
    }

    fn enter_game_over(&mut self, culprit: NodeHandle, world: &mut SceneWorld) {
        for handle in self.items.keys() {
            world.set_body_enabled(*handle, false);
        }
        self.synthesis.set_bodies_frozen(true);
        self.spawn.halt(world);
        let panel_position = self.config.failure.panel_position.to_vec3();
        self.panel = Some(world.spawn(FAILURE_PANEL_NAME, Transform::at(panel_position), None));
        info!(
            culprit = culprit.index(),
            items = self.items.len(),
            "game_over"
        );
        self.events.push(GameplayEvent::GameOverChanged(true));
    }

    /// Clears a finished game. Ignored while the game is still running.
    fn restart(&mut self, world: &mut SceneWorld) {
        if !self.failure.is_game_over() {
            return;
        }
        self.reset_playfield(world);
        for (handle, _) in self.items.drain() {
            world.despawn(handle);
        }
        info!("game_restarted");
        self.events.push(GameplayEvent::GameOverChanged(false));
        self.events.push(GameplayEvent::Restarted);
        self.ensure_preview(world);
    }

    fn reset_playfield(&mut self, world: &mut SceneWorld) {
        self.failure.reset(&mut self.scheduler);
        self.synthesis.abort_pending(&mut self.scheduler);
        self.synthesis.set_bodies_frozen(false);
        if let Some(panel) = self.panel.take() {
            world.despawn(panel);
        }
        self.effects.clear();
        self.top_tier_freeze = false;
        world.physics_mut().set_enabled(true);
        self.spawn.resume();
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
