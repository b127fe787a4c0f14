use engine::{InputSnapshot, Scene, SceneCommand, SceneKey, SceneWorld};
use tracing::{error, info, warn};

use super::config::GameConfig;
use super::progress::{LoggingLottery, ProgressStore};
use super::save::LocalSaveStore;
use super::session::{Collaborators, GameSession};
use super::types::GameplayEvent;

/// Title screen. Only navigates to the playfield.
#[derive(Debug, Default)]
pub(crate) struct LobbyScene {
    visits: u32,
}

impl Scene for LobbyScene {
    fn load(&mut self, _world: &mut SceneWorld) {
        self.visits += 1;
        info!(scene = "lobby", visits = self.visits, "scene_loaded");
    }

    fn update(
        &mut self,
        _fixed_dt_seconds: f32,
        input: &InputSnapshot,
        _world: &mut SceneWorld,
    ) -> SceneCommand {
        if input.switch_scene_pressed() {
            return SceneCommand::SwitchTo(SceneKey::Play);
        }
        SceneCommand::None
    }

    fn unload(&mut self, _world: &mut SceneWorld) {
        info!(scene = "lobby", "scene_unloaded");
    }

    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        Some(format!("Mergefall | lobby | visits {}", self.visits))
    }
}

/// Hosts a [`GameSession`] for as long as the playfield is the active scene.
/// Progress and the local save outlive individual sessions.
pub(crate) struct PlayScene {
    config: GameConfig,
    seed: u64,
    loads: u64,
    save_store: Option<LocalSaveStore>,
    local_loaded: bool,
    progress: ProgressStore,
    lottery: LoggingLottery,
    session: Option<GameSession>,
}

impl PlayScene {
    pub(crate) fn new(config: GameConfig, seed: u64, save_store: Option<LocalSaveStore>) -> Self {
        Self {
            config,
            seed,
            loads: 0,
            save_store,
            local_loaded: false,
            progress: ProgressStore::default(),
            lottery: LoggingLottery::default(),
            session: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    #[cfg(test)]
    pub(crate) fn progress_mut(&mut self) -> &mut ProgressStore {
        &mut self.progress
    }

    #[cfg(test)]
    pub(crate) fn lottery(&self) -> &LoggingLottery {
        &self.lottery
    }

    fn load_local_save_once(&mut self) {
        if self.local_loaded {
            return;
        }
        self.local_loaded = true;
        let Some(store) = &self.save_store else {
            return;
        };
        match store.load() {
            Ok(Some(saved)) => {
                info!(
                    path = %store.path().display(),
                    gold_compose = saved.counters.gold_compose,
                    "local_save_loaded"
                );
                self.progress.restore_local(saved);
            }
            Ok(None) => info!(path = %store.path().display(), "local_save_absent"),
            Err(error) => error!(
                path = %store.path().display(),
                error = %error,
                "local_save_load_failed"
            ),
        }
    }

    /// Captures the playfield, hands the report to the progress store and
    /// then writes the local save. Headless builds deliver reports
    /// immediately, so the file only ever holds unreported counters.
    fn persist(&mut self, world: &SceneWorld) {
        let Some(session) = &self.session else {
            return;
        };
        let snapshot = session.save_scene_state(world);
        match self.progress.build_report(&snapshot) {
            Ok(report) => {
                self.progress.acknowledge_report(report.report_id);
            }
            Err(error) => warn!(error = %error, "progress_report_failed"),
        }
        if let Some(store) = &self.save_store {
            if let Err(error) = store.save(self.progress.counters(), &snapshot) {
                error!(path = %store.path().display(), error = %error, "local_save_failed");
            }
        }
        self.progress.set_local_snapshot(snapshot);
    }
}

impl Scene for PlayScene {
    fn load(&mut self, world: &mut SceneWorld) {
        self.load_local_save_once();
        let seed = self.seed.wrapping_add(self.loads);
        self.loads += 1;

        let mut session = GameSession::new(self.config.clone(), seed, world);
        session.unified_data_restore(&self.progress, world);
        session.ensure_preview(world);
        info!(
            scene = "play",
            items = session.items().len(),
            "scene_loaded"
        );
        self.session = Some(session);
    }

    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        world: &mut SceneWorld,
    ) -> SceneCommand {
        if input.switch_scene_pressed() {
            return SceneCommand::SwitchTo(SceneKey::Lobby);
        }
        let Self {
            session,
            progress,
            lottery,
            ..
        } = self;
        let Some(session) = session.as_mut() else {
            return SceneCommand::None;
        };
        let mut collaborators = Collaborators { progress, lottery };
        session.update(fixed_dt_seconds, input, world, &mut collaborators);
        let events = session.drain_events();

        let mut persist = input.save_pressed();
        for event in events {
            match event {
                GameplayEvent::LocalSaveDue | GameplayEvent::Restarted => persist = true,
                GameplayEvent::GameOverChanged(game_over) => {
                    info!(game_over, "game_over_changed");
                }
                GameplayEvent::ItemLost { level } => {
                    warn!(level = ?level, "item_lost");
                }
                _ => {}
            }
        }
        if persist {
            self.persist(world);
        }
        SceneCommand::None
    }

    fn unload(&mut self, world: &mut SceneWorld) {
        self.persist(world);
        self.session = None;
        info!(
            scene = "play",
            lottery_notifications = self.lottery.notified(),
            "scene_unloaded"
        );
    }

    fn debug_title(&self, world: &SceneWorld) -> Option<String> {
        let session = self.session.as_ref()?;
        let counters = self.progress.counters();
        Some(format!(
            "Mergefall | nodes {} | {} | gold {} | red bags {}",
            world.node_count(),
            session.status_line(),
            counters.gold_compose,
            counters.red_bag_compose,
        ))
    }
}
