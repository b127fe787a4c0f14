use std::collections::HashMap;
use std::time::Duration;

use engine::{NodeHandle, SceneWorld, Scheduler, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::config::seconds;
use super::types::{ComposeCounters, ItemCatalog, ItemData, SessionTask};

#[derive(Debug, Error)]
pub(crate) enum SnapshotError {
    #[error("malformed scene snapshot: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("failed to encode scene snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct SnapshotPosition {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) z: f32,
}

impl From<Vec3> for SnapshotPosition {
    fn from(value: Vec3) -> Self {
        Self {
            x: value.x,
            y: value.y,
            z: value.z,
        }
    }
}

impl From<SnapshotPosition> for Vec3 {
    fn from(value: SnapshotPosition) -> Self {
        Vec3::new(value.x, value.y, value.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SnapshotItem {
    pub(crate) level: u32,
    pub(crate) position: SnapshotPosition,
    pub(crate) prefab_index: u32,
}

/// Layout of every settled item. Never contains the preview item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SceneSnapshot {
    pub(crate) items: Vec<SnapshotItem>,
    pub(crate) timestamp: i64,
    pub(crate) version: String,
}

#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    version: String,
}

impl SceneSnapshot {
    pub(crate) fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(SnapshotError::Encode)
    }

    /// Decodes leniently: entries with missing or ill-typed fields are dropped
    /// one by one. Only a malformed document as a whole is an error.
    pub(crate) fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        let raw: RawSnapshot = serde_json::from_str(raw).map_err(SnapshotError::Malformed)?;
        let mut items = Vec::with_capacity(raw.items.len());
        for (index, value) in raw.items.into_iter().enumerate() {
            match serde_json::from_value::<SnapshotItem>(value) {
                Ok(item) => items.push(item),
                Err(error) => warn!(
                    path = %format!("items[{index}]"),
                    error = %error,
                    "snapshot_entry_dropped"
                ),
            }
        }
        Ok(Self {
            items,
            timestamp: raw.timestamp,
            version: raw.version,
        })
    }
}

/// A snapshot together with the counters that vouch for its freshness.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CountedSnapshot {
    pub(crate) counters: ComposeCounters,
    pub(crate) snapshot: Option<SceneSnapshot>,
}

/// Remote wins only when it strictly leads in gold or red-bag compose
/// counters. Without a remote copy the local one is used; without a local
/// copy the remote one is.
pub(crate) fn should_use_remote_snapshot(
    local: Option<&CountedSnapshot>,
    remote: Option<&CountedSnapshot>,
) -> bool {
    let Some(remote) = remote.filter(|remote| remote.snapshot.is_some()) else {
        return false;
    };
    let Some(local) = local.filter(|local| local.snapshot.is_some()) else {
        return true;
    };
    remote.counters.gold_compose > local.counters.gold_compose
        || remote.counters.red_bag_compose > local.counters.red_bag_compose
}

pub(crate) fn choose_snapshot_to_restore<'a>(
    local: Option<&'a CountedSnapshot>,
    remote: Option<&'a CountedSnapshot>,
) -> Option<&'a SceneSnapshot> {
    let chosen = if should_use_remote_snapshot(local, remote) {
        remote
    } else {
        local
    };
    chosen.and_then(|source| source.snapshot.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct RestoreReport {
    pub(crate) restored: usize,
    pub(crate) dropped: usize,
}

#[derive(Debug)]
pub(crate) struct SceneStateManager {
    version: String,
    settle_delay: Duration,
}

impl SceneStateManager {
    pub(crate) fn new(version: impl Into<String>, settle_delay_seconds: f32) -> Self {
        Self {
            version: version.into(),
            settle_delay: seconds(settle_delay_seconds),
        }
    }

    /// Settled items in spawn order. The preview is excluded even if it were
    /// ever given item data.
    pub(crate) fn capture_snapshot(
        &self,
        world: &SceneWorld,
        items: &HashMap<NodeHandle, ItemData>,
        catalog: &ItemCatalog,
        preview: Option<NodeHandle>,
        timestamp: i64,
    ) -> SceneSnapshot {
        let mut settled: Vec<(u64, SnapshotItem)> = items
            .iter()
            .filter(|(handle, _)| Some(**handle) != preview)
            .filter_map(|(handle, data)| {
                let node = world.get(*handle)?;
                Some((
                    node.spawn_order(),
                    SnapshotItem {
                        level: data.level as u32,
                        position: node.transform.position.into(),
                        prefab_index: catalog.prefab_index_for_level(data.level) as u32,
                    },
                ))
            })
            .collect();
        settled.sort_by_key(|(order, _)| *order);

        SceneSnapshot {
            items: settled.into_iter().map(|(_, item)| item).collect(),
            timestamp,
            version: self.version.clone(),
        }
    }

    /// Replaces every settled item with the snapshot's entries. Restored items
    /// start without physics and wake after the settle delay.
    pub(crate) fn restore_snapshot(
        &self,
        snapshot: &SceneSnapshot,
        world: &mut SceneWorld,
        items: &mut HashMap<NodeHandle, ItemData>,
        catalog: &ItemCatalog,
        scheduler: &mut Scheduler<SessionTask>,
    ) -> RestoreReport {
        for (handle, _) in items.drain() {
            world.despawn(handle);
        }

        let mut report = RestoreReport::default();
        for (index, entry) in snapshot.items.iter().enumerate() {
            let Some(level) = validate_entry(index, entry, catalog) else {
                report.dropped += 1;
                continue;
            };
            let Some(handle) = catalog.spawn_item(world, level, entry.position.into(), false)
            else {
                report.dropped += 1;
                continue;
            };
            items.insert(handle, ItemData { level });
            scheduler.schedule_once(self.settle_delay, SessionTask::EnableBody { handle });
            report.restored += 1;
        }

        info!(
            restored = report.restored,
            dropped = report.dropped,
            version = %snapshot.version,
            "snapshot_restored"
        );
        report
    }
}

fn validate_entry(index: usize, entry: &SnapshotItem, catalog: &ItemCatalog) -> Option<usize> {
    let level = entry.level as usize;
    if level >= catalog.levels() {
        warn!(
            path = %format!("items[{index}].level"),
            expected = %format!("< {}", catalog.levels()),
            got = level,
            "snapshot_entry_dropped"
        );
        return None;
    }
    let prefab_level = catalog.level_for_prefab(entry.prefab_index as usize);
    if prefab_level != Some(level) {
        warn!(
            path = %format!("items[{index}].prefabIndex"),
            expected = catalog.prefab_index_for_level(level),
            got = entry.prefab_index,
            "snapshot_entry_dropped"
        );
        return None;
    }
    if !Vec3::from(entry.position).is_finite() {
        warn!(
            path = %format!("items[{index}].position"),
            expected = "finite coordinates",
            "snapshot_entry_dropped"
        );
        return None;
    }
    Some(level)
}
