use engine::{Body, NodeHandle, SceneWorld, Transform, Vec3};
use serde::{Deserialize, Serialize};

use super::config::GameConfig;

pub(crate) const ITEM_NAME_PREFIX: &str = "item_";
pub(crate) const PREVIEW_NAME: &str = "preview_item";
pub(crate) const THRESHOLD_LINE_NAME: &str = "threshold_line";
pub(crate) const FAILURE_PANEL_NAME: &str = "failure_panel";

pub(crate) fn item_name(level: usize) -> String {
    format!("{ITEM_NAME_PREFIX}{level}")
}

/// Gameplay data attached to every settled item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ItemData {
    pub(crate) level: usize,
}

/// Per-level collider sizes. Prefab index and level coincide.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ItemCatalog {
    radii: Vec<f32>,
}

impl ItemCatalog {
    pub(crate) fn from_config(config: &GameConfig) -> Self {
        Self {
            radii: config.item_prefabs.iter().map(|prefab| prefab.radius).collect(),
        }
    }

    pub(crate) fn levels(&self) -> usize {
        self.radii.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.radii.is_empty()
    }

    pub(crate) fn max_level(&self) -> Option<usize> {
        self.radii.len().checked_sub(1)
    }

    pub(crate) fn prefab_index_for_level(&self, level: usize) -> usize {
        level
    }

    pub(crate) fn level_for_prefab(&self, prefab_index: usize) -> Option<usize> {
        (prefab_index < self.radii.len()).then_some(prefab_index)
    }

    pub(crate) fn radius(&self, level: usize) -> Option<f32> {
        self.radii.get(level).copied()
    }

    /// Spawns a settled item named after its level. Physics starts disabled
    /// unless `physics_enabled` is set.
    pub(crate) fn spawn_item(
        &self,
        world: &mut SceneWorld,
        level: usize,
        position: Vec3,
        physics_enabled: bool,
    ) -> Option<NodeHandle> {
        let radius = self.radius(level)?;
        let mut body = Body::circle(radius);
        if !physics_enabled {
            body = body.disabled();
        }
        Some(world.spawn(item_name(level), Transform::at(position), Some(body)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ComposeCounters {
    pub(crate) gold_compose: u64,
    pub(crate) red_bag_compose: u64,
    pub(crate) times: u64,
    pub(crate) wealth_count: u64,
}

impl ComposeCounters {
    pub(crate) fn saturating_add(self, other: Self) -> Self {
        Self {
            gold_compose: self.gold_compose.saturating_add(other.gold_compose),
            red_bag_compose: self.red_bag_compose.saturating_add(other.red_bag_compose),
            times: self.times.saturating_add(other.times),
            wealth_count: self.wealth_count.saturating_add(other.wealth_count),
        }
    }

    pub(crate) fn saturating_sub(self, reported: Self) -> Self {
        Self {
            gold_compose: self.gold_compose.saturating_sub(reported.gold_compose),
            red_bag_compose: self.red_bag_compose.saturating_sub(reported.red_bag_compose),
            times: self.times.saturating_sub(reported.times),
            wealth_count: self.wealth_count.saturating_sub(reported.wealth_count),
        }
    }
}

/// Bookkeeping posted to the progress collaborator once per completed merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ComposeReward {
    pub(crate) gold: u32,
    pub(crate) red_bag: u32,
    pub(crate) is_max_level: bool,
}

/// Deferred work owned by a gameplay session. Every task that names a node
/// re-validates its handle before acting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SessionTask {
    CommitDrop { handle: NodeHandle },
    GeneratePreview,
    BeginMerge { a: NodeHandle, b: NodeHandle },
    ConsumePair { a: NodeHandle, b: NodeHandle },
    ResolveMerge { consumed_level: usize, position: Vec3 },
    EnableBody { handle: NodeHandle },
    FailurePoll,
    LocalSave,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum GameplayEvent {
    GameOverChanged(bool),
    PreviewSpawned { level: usize },
    ItemDropped { level: usize },
    MergeResolved { level: usize, top_tier: bool },
    TopTierStarted { level: usize },
    TopTierFinished,
    RewardBatchFinished { batch: u64 },
    ItemLost { level: Option<usize> },
    Restarted,
    LocalSaveDue,
    SnapshotRestored { restored: usize, dropped: usize },
}
