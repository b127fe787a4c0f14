use std::collections::{HashMap, HashSet};

use engine::{NodeHandle, SceneWorld, Scheduler, TimerHandle, Vec3};
use tracing::{debug, info};

use super::config::{seconds, SynthesisConfig};
use super::types::{ComposeReward, ItemCatalog, ItemData, SessionTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeRejection {
    SameItem,
    MissingItemData,
    Locked,
    LevelMismatch,
    AtMaxLevel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum MergeResolution {
    Ordinary {
        handle: Option<NodeHandle>,
        level: usize,
        position: Vec3,
        red_packets: u32,
        gold_coins: u32,
        reward: ComposeReward,
    },
    TopTier {
        level: usize,
        position: Vec3,
        reward: ComposeReward,
    },
}

impl MergeResolution {
    pub(crate) fn reward(&self) -> ComposeReward {
        match self {
            Self::Ordinary { reward, .. } | Self::TopTier { reward, .. } => *reward,
        }
    }

    pub(crate) fn level(&self) -> usize {
        match self {
            Self::Ordinary { level, .. } | Self::TopTier { level, .. } => *level,
        }
    }
}

/// Equal-level merge pipeline.
///
/// Contact handlers only lock the pair and queue `BeginMerge` for the next
/// tick; every later step runs from the scheduler and re-validates both
/// handles first.
#[derive(Debug)]
pub(crate) struct SynthesisEngine {
    config: SynthesisConfig,
    max_level: Option<usize>,
    locked: HashSet<NodeHandle>,
    chain_timers: Vec<TimerHandle>,
    bodies_frozen: bool,
}

impl SynthesisEngine {
    pub(crate) fn new(config: &SynthesisConfig, catalog: &ItemCatalog) -> Self {
        Self {
            config: config.clone(),
            max_level: catalog.max_level(),
            locked: HashSet::new(),
            chain_timers: Vec::new(),
            bodies_frozen: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self, handle: NodeHandle) -> bool {
        self.locked.contains(&handle)
    }

    pub(crate) fn locked_count(&self) -> usize {
        self.locked.len()
    }

    /// While frozen, fallback paths unlock survivors without waking their
    /// bodies.
    pub(crate) fn set_bodies_frozen(&mut self, frozen: bool) {
        self.bodies_frozen = frozen;
    }

    pub(crate) fn reward_for(&self, result_level: usize) -> ComposeReward {
        let level = result_level as u32;
        ComposeReward {
            gold: self.config.gold_per_level.saturating_mul(level),
            red_bag: self.config.red_bag_per_level.saturating_mul(level),
            is_max_level: Some(result_level) == self.max_level,
        }
    }

    pub(crate) fn try_begin_merge(
        &mut self,
        a: NodeHandle,
        b: NodeHandle,
        items: &HashMap<NodeHandle, ItemData>,
        scheduler: &mut Scheduler<SessionTask>,
    ) -> Result<(), MergeRejection> {
        if a == b {
            return Err(MergeRejection::SameItem);
        }
        let (Some(item_a), Some(item_b)) = (items.get(&a), items.get(&b)) else {
            return Err(MergeRejection::MissingItemData);
        };
        if self.locked.contains(&a) || self.locked.contains(&b) {
            return Err(MergeRejection::Locked);
        }
        if item_a.level != item_b.level {
            return Err(MergeRejection::LevelMismatch);
        }
        match self.max_level {
            Some(max_level) if item_a.level < max_level => {}
            _ => return Err(MergeRejection::AtMaxLevel),
        }

        self.locked.insert(a);
        self.locked.insert(b);
        let timer = scheduler.schedule_next_tick(SessionTask::BeginMerge { a, b });
        self.track(scheduler, timer);
        debug!(level = item_a.level, "merge_accepted");
        Ok(())
    }

    pub(crate) fn begin_merge(
        &mut self,
        a: NodeHandle,
        b: NodeHandle,
        world: &mut SceneWorld,
        scheduler: &mut Scheduler<SessionTask>,
    ) -> bool {
        if !self.both_alive(a, b, world) {
            return false;
        }
        world.set_body_enabled(a, false);
        world.set_body_enabled(b, false);
        let timer = scheduler.schedule_once(
            seconds(self.config.synthesis_delay_seconds),
            SessionTask::ConsumePair { a, b },
        );
        self.track(scheduler, timer);
        true
    }

    pub(crate) fn consume_pair(
        &mut self,
        a: NodeHandle,
        b: NodeHandle,
        world: &mut SceneWorld,
        items: &mut HashMap<NodeHandle, ItemData>,
        scheduler: &mut Scheduler<SessionTask>,
    ) -> bool {
        if !self.both_alive(a, b, world) {
            return false;
        }
        let (Some(position_a), Some(position_b)) = (
            world.get(a).map(|node| node.transform.position),
            world.get(b).map(|node| node.transform.position),
        ) else {
            return false;
        };
        let Some(level) = items.get(&a).map(|item| item.level) else {
            self.release_survivors(&[a, b], world);
            return false;
        };

        self.locked.remove(&a);
        self.locked.remove(&b);
        items.remove(&a);
        items.remove(&b);
        world.despawn(a);
        world.despawn(b);

        let timer = scheduler.schedule_once(
            seconds(self.config.post_destroy_delay_seconds),
            SessionTask::ResolveMerge {
                consumed_level: level,
                position: position_a.midpoint(position_b),
            },
        );
        self.track(scheduler, timer);
        true
    }

    pub(crate) fn resolve_merge(
        &mut self,
        consumed_level: usize,
        position: Vec3,
        world: &mut SceneWorld,
        items: &mut HashMap<NodeHandle, ItemData>,
        catalog: &ItemCatalog,
        scheduler: &mut Scheduler<SessionTask>,
    ) -> MergeResolution {
        let level = consumed_level + 1;
        let reward = self.reward_for(level);
        info!(level, top_tier = reward.is_max_level, "merge_resolved");

        if reward.is_max_level {
            return MergeResolution::TopTier {
                level,
                position,
                reward,
            };
        }

        let handle = catalog.spawn_item(world, level, position, false);
        if let Some(handle) = handle {
            items.insert(handle, ItemData { level });
            scheduler.schedule_once(
                seconds(self.config.settle_delay_seconds),
                SessionTask::EnableBody { handle },
            );
        }
        MergeResolution::Ordinary {
            handle,
            level,
            position,
            red_packets: lookup(&self.config.red_packet_counts, level),
            gold_coins: lookup(&self.config.gold_coin_counts, level),
            reward,
        }
    }

    /// Forgets an item destroyed by an unrelated path.
    pub(crate) fn forget(&mut self, handle: NodeHandle) {
        self.locked.remove(&handle);
    }

    /// Cancels every outstanding merge-chain timer and clears the lock set.
    pub(crate) fn abort_pending(&mut self, scheduler: &mut Scheduler<SessionTask>) {
        let cancelled = self
            .chain_timers
            .drain(..)
            .filter(|timer| scheduler.cancel(*timer))
            .count();
        let unlocked = self.locked.len();
        self.locked.clear();
        if cancelled > 0 || unlocked > 0 {
            debug!(cancelled, unlocked, "merge_chains_aborted");
        }
    }

    fn both_alive(&mut self, a: NodeHandle, b: NodeHandle, world: &mut SceneWorld) -> bool {
        if world.contains(a) && world.contains(b) {
            return true;
        }
        self.release_survivors(&[a, b], world);
        false
    }

    fn release_survivors(&mut self, handles: &[NodeHandle], world: &mut SceneWorld) {
        for handle in handles {
            self.locked.remove(handle);
            if world.contains(*handle) && !self.bodies_frozen {
                world.set_body_enabled(*handle, true);
            }
        }
        debug!("merge_chain_dropped_stale_pair");
    }

    fn track(&mut self, scheduler: &Scheduler<SessionTask>, timer: TimerHandle) {
        self.chain_timers.retain(|pending| scheduler.is_scheduled(*pending));
        self.chain_timers.push(timer);
    }
}

fn lookup(table: &[u32], level: usize) -> u32 {
    table.get(level).copied().unwrap_or(0)
}
