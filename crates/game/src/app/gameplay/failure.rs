use std::collections::HashMap;
use std::time::Duration;

use engine::{ContactEvent, ContactPhase, NodeHandle, SceneWorld, Scheduler, TimerHandle};
use tracing::{debug, info};

use super::config::{seconds, FailureConfig};
use super::types::{SessionTask, ITEM_NAME_PREFIX};

/// Watches contacts against the threshold line and declares game over once an
/// item has stayed in contact for the configured delay.
#[derive(Debug)]
pub(crate) struct FailureMonitor {
    failure_delay: Duration,
    poll_interval: Duration,
    contacts: HashMap<NodeHandle, Duration>,
    poll_timer: Option<TimerHandle>,
    paused_at: Option<Duration>,
    game_over: bool,
}

impl FailureMonitor {
    pub(crate) fn new(config: &FailureConfig) -> Self {
        Self {
            failure_delay: seconds(config.failure_delay_seconds),
            poll_interval: seconds(config.poll_interval_seconds),
            contacts: HashMap::new(),
            poll_timer: None,
            paused_at: None,
            game_over: false,
        }
    }

    pub(crate) fn is_game_over(&self) -> bool {
        self.game_over
    }

    #[cfg(test)]
    pub(crate) fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub(crate) fn tracked_count(&self) -> usize {
        self.contacts.len()
    }

    #[cfg(test)]
    pub(crate) fn contact_started_at(&self, handle: NodeHandle) -> Option<Duration> {
        self.contacts.get(&handle).copied()
    }

    #[cfg(test)]
    pub(crate) fn is_polling(&self) -> bool {
        self.poll_timer.is_some()
    }

    /// Routes one physics contact event. Only contacts between the line and a
    /// live drop item with a body are tracked.
    pub(crate) fn observe_contact(
        &mut self,
        event: &ContactEvent,
        line: NodeHandle,
        world: &SceneWorld,
        now: Duration,
        scheduler: &mut Scheduler<SessionTask>,
    ) {
        let Some(other) = event.other(line) else {
            return;
        };
        match event.phase {
            ContactPhase::Begin => {
                if self.game_over || !is_tracked_item(world, other, line) {
                    return;
                }
                self.contacts.entry(other).or_insert(now);
                self.ensure_polling(scheduler);
            }
            ContactPhase::End => {
                if self.contacts.remove(&other).is_some() && self.contacts.is_empty() {
                    self.stop_polling(scheduler);
                }
            }
        }
    }

    /// One poll. Drops entries whose item is gone and returns the first item
    /// whose contact has lasted at least the failure delay; at most one
    /// game-over is ever reported until `reset`.
    pub(crate) fn poll(
        &mut self,
        world: &SceneWorld,
        now: Duration,
        scheduler: &mut Scheduler<SessionTask>,
    ) -> Option<NodeHandle> {
        if self.game_over || self.paused_at.is_some() {
            return None;
        }
        self.contacts.retain(|handle, _| world.contains(*handle));
        if self.contacts.is_empty() {
            self.stop_polling(scheduler);
            return None;
        }

        let mut tracked: Vec<(NodeHandle, Duration)> =
            self.contacts.iter().map(|(handle, start)| (*handle, *start)).collect();
        tracked.sort_by_key(|(handle, start)| (*start, *handle));
        let (culprit, started) = tracked
            .into_iter()
            .find(|(_, start)| now.saturating_sub(*start) >= self.failure_delay)?;

        self.game_over = true;
        self.stop_polling(scheduler);
        info!(
            index = culprit.index(),
            contact_ms = now.saturating_sub(started).as_millis() as u64,
            "failure_triggered"
        );
        Some(culprit)
    }

    /// Suspends polling. Time spent paused never counts toward failure.
    pub(crate) fn pause(&mut self, now: Duration, scheduler: &mut Scheduler<SessionTask>) {
        if self.paused_at.is_some() {
            return;
        }
        self.paused_at = Some(now);
        self.stop_polling(scheduler);
        debug!(tracked = self.contacts.len(), "failure_monitor_paused");
    }

    pub(crate) fn resume(&mut self, now: Duration, scheduler: &mut Scheduler<SessionTask>) {
        let Some(paused_at) = self.paused_at.take() else {
            return;
        };
        let paused_for = now.saturating_sub(paused_at);
        for start in self.contacts.values_mut() {
            *start += paused_for;
        }
        if !self.contacts.is_empty() && !self.game_over {
            self.ensure_polling(scheduler);
        }
        debug!(
            paused_ms = paused_for.as_millis() as u64,
            "failure_monitor_resumed"
        );
    }

    /// Back to `Running` with no tracked contacts.
    pub(crate) fn reset(&mut self, scheduler: &mut Scheduler<SessionTask>) {
        self.contacts.clear();
        self.stop_polling(scheduler);
        self.paused_at = None;
        self.game_over = false;
    }

    fn ensure_polling(&mut self, scheduler: &mut Scheduler<SessionTask>) {
        if self.poll_timer.is_some() || self.paused_at.is_some() {
            return;
        }
        self.poll_timer =
            Some(scheduler.schedule_repeating(self.poll_interval, SessionTask::FailurePoll));
    }

    fn stop_polling(&mut self, scheduler: &mut Scheduler<SessionTask>) {
        if let Some(timer) = self.poll_timer.take() {
            scheduler.cancel(timer);
        }
    }
}

fn is_tracked_item(world: &SceneWorld, handle: NodeHandle, line: NodeHandle) -> bool {
    if handle == line {
        return false;
    }
    world
        .get(handle)
        .is_some_and(|node| node.body.is_some() && node.name.starts_with(ITEM_NAME_PREFIX))
}
