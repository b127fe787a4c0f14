use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::scene_state::{
    choose_snapshot_to_restore, should_use_remote_snapshot, CountedSnapshot, SceneSnapshot,
    SnapshotError,
};
use super::types::ComposeCounters;

/// Progress bookkeeping consumed by a gameplay session.
pub(crate) trait ProgressCollaborator {
    fn record_compose_reward(&mut self, gold: u32, red_bag: u32, is_max_level: bool);
    fn should_use_server_scene_data(&self) -> bool;
    fn scene_data_to_restore(&self) -> Option<SceneSnapshot>;
}

#[derive(Debug, Error)]
pub(crate) enum NotifyError {
    #[error("lottery notification for level {level} rejected: {reason}")]
    Rejected { level: usize, reason: String },
}

/// Fire-and-forget notification sent once per completed merge.
pub(crate) trait LotteryNotifier {
    fn notify_merge(&mut self, level: usize) -> Result<(), NotifyError>;
}

/// Notifier used when no lottery endpoint is attached.
#[derive(Debug, Default)]
pub(crate) struct LoggingLottery {
    notified: u64,
}

impl LoggingLottery {
    pub(crate) fn notified(&self) -> u64 {
        self.notified
    }
}

impl LotteryNotifier for LoggingLottery {
    fn notify_merge(&mut self, level: usize) -> Result<(), NotifyError> {
        // A merge always produces level 1 or above.
        if level == 0 {
            return Err(NotifyError::Rejected {
                level,
                reason: "no merge produces the lowest level".to_string(),
            });
        }
        self.notified += 1;
        debug!(level, notified = self.notified, "lottery_notified");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProgressReport {
    pub(crate) report_id: u64,
    pub(crate) counters: ComposeCounters,
    pub(crate) scene_data: String,
}

#[derive(Debug, Clone, PartialEq)]
struct OutstandingReport {
    id: u64,
    counters: ComposeCounters,
    snapshot: SceneSnapshot,
}

#[derive(Debug, Default)]
pub(crate) struct ProgressStore {
    counters: ComposeCounters,
    local_snapshot: Option<SceneSnapshot>,
    remote: Option<CountedSnapshot>,
    outstanding: Option<OutstandingReport>,
    next_report_id: u64,
}

impl ProgressStore {
    pub(crate) fn counters(&self) -> ComposeCounters {
        self.counters
    }

    pub(crate) fn set_local_snapshot(&mut self, snapshot: SceneSnapshot) {
        self.local_snapshot = Some(snapshot);
    }

    /// Adopts counters and snapshot read back from the local save file.
    pub(crate) fn restore_local(&mut self, saved: CountedSnapshot) {
        self.counters = saved.counters;
        self.local_snapshot = saved.snapshot;
    }

    /// Records the server's copy. Only consulted during restore.
    #[cfg(test)]
    pub(crate) fn receive_remote(&mut self, remote: CountedSnapshot) {
        info!(
            gold_compose = remote.counters.gold_compose,
            red_bag_compose = remote.counters.red_bag_compose,
            has_snapshot = remote.snapshot.is_some(),
            "remote_progress_received"
        );
        self.remote = Some(remote);
    }

    fn local(&self) -> CountedSnapshot {
        CountedSnapshot {
            counters: self.counters,
            snapshot: self.local_snapshot.clone(),
        }
    }

    /// Packages the counters accumulated so far with the given layout. A new
    /// report supersedes any unacknowledged one.
    pub(crate) fn build_report(
        &mut self,
        snapshot: &SceneSnapshot,
    ) -> Result<ProgressReport, SnapshotError> {
        let scene_data = snapshot.to_json()?;
        self.next_report_id += 1;
        let report = ProgressReport {
            report_id: self.next_report_id,
            counters: self.counters,
            scene_data,
        };
        self.outstanding = Some(OutstandingReport {
            id: report.report_id,
            counters: report.counters,
            snapshot: snapshot.clone(),
        });
        debug!(report_id = report.report_id, "progress_report_built");
        Ok(report)
    }

    /// Subtracts the acknowledged report's counters exactly once. Merges made
    /// after the report was built stay pending. The reported layout becomes
    /// the server's copy, with the reported counters added to its totals.
    pub(crate) fn acknowledge_report(&mut self, report_id: u64) -> bool {
        let outstanding = match self.outstanding.take() {
            Some(outstanding) if outstanding.id == report_id => outstanding,
            other => {
                self.outstanding = other;
                warn!(report_id, "progress_report_ack_ignored");
                return false;
            }
        };
        self.counters = self.counters.saturating_sub(outstanding.counters);
        let server_totals = self
            .remote
            .as_ref()
            .map_or(ComposeCounters::default(), |remote| remote.counters)
            .saturating_add(outstanding.counters);
        self.remote = Some(CountedSnapshot {
            counters: server_totals,
            snapshot: Some(outstanding.snapshot),
        });
        info!(
            report_id,
            server_gold_compose = server_totals.gold_compose,
            "progress_report_acknowledged"
        );
        true
    }
}

impl ProgressCollaborator for ProgressStore {
    fn record_compose_reward(&mut self, gold: u32, red_bag: u32, is_max_level: bool) {
        self.counters.gold_compose += u64::from(gold);
        self.counters.red_bag_compose += u64::from(red_bag);
        self.counters.times += 1;
        if is_max_level {
            self.counters.wealth_count += 1;
        }
    }

    fn should_use_server_scene_data(&self) -> bool {
        should_use_remote_snapshot(Some(&self.local()), self.remote.as_ref())
    }

    fn scene_data_to_restore(&self) -> Option<SceneSnapshot> {
        let local = self.local();
        choose_snapshot_to_restore(Some(&local), self.remote.as_ref()).cloned()
    }
}
