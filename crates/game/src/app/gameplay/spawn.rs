use std::collections::HashMap;

use engine::{
    Body, NodeHandle, PointerEvent, PointerPhase, SceneWorld, Scheduler, Transform, Vec3,
};
use rand::Rng;
use tracing::{debug, info};

use super::config::{seconds, SpawnConfig, ThresholdLineConfig};
use super::types::{item_name, ItemCatalog, ItemData, SessionTask, PREVIEW_NAME};

/// Picks the first level whose cumulative normalized weight exceeds a draw in
/// `[0, 1)`. All-zero weights fall back to a uniform choice over `levels`;
/// an empty table yields level 0.
pub(crate) fn select_random_item_level<R: Rng + ?Sized>(
    weights: &[f32],
    levels: usize,
    rng: &mut R,
) -> usize {
    if levels == 0 {
        return 0;
    }
    let weights = &weights[..weights.len().min(levels)];
    let total: f32 = weights.iter().copied().filter(|w| *w > 0.0).sum();
    let draw: f32 = rng.gen();
    if total <= 0.0 {
        return ((draw * levels as f32) as usize).min(levels - 1);
    }

    let mut cumulative = 0.0;
    let mut last_weighted = 0;
    for (level, weight) in weights.iter().enumerate() {
        if *weight <= 0.0 {
            continue;
        }
        cumulative += weight / total;
        last_weighted = level;
        if cumulative > draw {
            return level;
        }
    }
    last_weighted
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DragState {
    Idle,
    Armed { pre_drag: Vec3 },
    Dragging { pre_drag: Vec3 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Preview {
    handle: NodeHandle,
    level: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PointerOutcome {
    Ignored,
    Armed,
    Moved { x: f32 },
    DropScheduled { handle: NodeHandle },
    Cancelled,
}

/// Owns the single ungrounded preview item and the drag-to-place input.
#[derive(Debug)]
pub(crate) struct SpawnController {
    config: SpawnConfig,
    line: Option<ThresholdLineConfig>,
    halted: bool,
    preview: Option<Preview>,
    drag: DragState,
    committing: Option<NodeHandle>,
}

impl SpawnController {
    pub(crate) fn new(config: &SpawnConfig, line: Option<ThresholdLineConfig>) -> Self {
        Self {
            config: config.clone(),
            line,
            halted: false,
            preview: None,
            drag: DragState::Idle,
            committing: None,
        }
    }

    pub(crate) fn preview(&self) -> Option<NodeHandle> {
        self.preview.map(|preview| preview.handle)
    }

    #[cfg(test)]
    pub(crate) fn is_halted(&self) -> bool {
        self.halted
    }

    fn home_position(&self, line: ThresholdLineConfig) -> Vec3 {
        Vec3::new(line.x, line.y + self.config.preview_height, 0.0)
    }

    /// Stops preview generation and input. An in-flight drag snaps back.
    pub(crate) fn halt(&mut self, world: &mut SceneWorld) {
        if self.halted {
            return;
        }
        self.halted = true;
        self.cancel_drag(world);
        debug!("spawning_halted");
    }

    pub(crate) fn resume(&mut self) {
        if self.halted {
            self.halted = false;
            debug!("spawning_resumed");
        }
    }

    /// Spawns a preview unless one already exists, spawning is halted, or a
    /// required reference is missing.
    pub(crate) fn ensure_preview<R: Rng + ?Sized>(
        &mut self,
        world: &mut SceneWorld,
        catalog: &ItemCatalog,
        rng: &mut R,
    ) -> Option<(NodeHandle, usize)> {
        if let Some(preview) = self.preview {
            if world.contains(preview.handle) {
                return None;
            }
            self.preview = None;
            self.drag = DragState::Idle;
        }
        if self.halted || catalog.is_empty() {
            return None;
        }
        let line = self.line?;

        let level = select_random_item_level(&self.config.weights, catalog.levels(), rng);
        let radius = catalog.radius(level)?;
        let transform = Transform {
            position: self.home_position(line),
            scale: self.config.preview_scale,
            ..Transform::default()
        };
        let handle = world.spawn(PREVIEW_NAME, transform, Some(Body::circle(radius).disabled()));
        self.preview = Some(Preview { handle, level });
        debug!(level, "preview_spawned");
        Some((handle, level))
    }

    pub(crate) fn handle_pointer(
        &mut self,
        event: PointerEvent,
        world: &mut SceneWorld,
        scheduler: &mut Scheduler<SessionTask>,
    ) -> PointerOutcome {
        if self.halted {
            return PointerOutcome::Ignored;
        }
        let (Some(line), Some(preview)) = (self.line, self.preview) else {
            return PointerOutcome::Ignored;
        };
        if !world.contains(preview.handle) {
            self.preview = None;
            self.drag = DragState::Idle;
            return PointerOutcome::Ignored;
        }
        let band_floor = line.y - self.config.drop_band_offset;
        let clamped_x = event
            .position
            .x
            .clamp(line.x - line.half_width, line.x + line.half_width);

        match (self.drag, event.phase) {
            (DragState::Idle, PointerPhase::Began) => {
                if self.committing.is_some() || event.position.y < band_floor {
                    return PointerOutcome::Ignored;
                }
                let Some(node) = world.get_mut(preview.handle) else {
                    return PointerOutcome::Ignored;
                };
                let pre_drag = node.transform.position;
                node.transform.position.x = clamped_x;
                self.drag = DragState::Armed { pre_drag };
                PointerOutcome::Armed
            }
            (DragState::Armed { pre_drag } | DragState::Dragging { pre_drag }, PointerPhase::Moved) => {
                if let Some(node) = world.get_mut(preview.handle) {
                    node.transform.position.x = clamped_x;
                }
                self.drag = DragState::Dragging { pre_drag };
                PointerOutcome::Moved { x: clamped_x }
            }
            (DragState::Armed { .. } | DragState::Dragging { .. }, PointerPhase::Ended) => {
                if event.position.y < band_floor {
                    self.cancel_drag(world);
                    return PointerOutcome::Cancelled;
                }
                if let Some(node) = world.get_mut(preview.handle) {
                    node.transform.scale = 1.0;
                }
                self.drag = DragState::Idle;
                self.committing = Some(preview.handle);
                scheduler.schedule_once(
                    seconds(self.config.drop_settle_delay_seconds),
                    SessionTask::CommitDrop {
                        handle: preview.handle,
                    },
                );
                PointerOutcome::DropScheduled {
                    handle: preview.handle,
                }
            }
            (DragState::Armed { .. } | DragState::Dragging { .. }, PointerPhase::Cancelled) => {
                self.cancel_drag(world);
                PointerOutcome::Cancelled
            }
            _ => PointerOutcome::Ignored,
        }
    }

    fn cancel_drag(&mut self, world: &mut SceneWorld) {
        let (DragState::Armed { pre_drag } | DragState::Dragging { pre_drag }) = self.drag else {
            return;
        };
        self.drag = DragState::Idle;
        if let Some(preview) = self.preview {
            if let Some(node) = world.get_mut(preview.handle) {
                node.transform.position = pre_drag;
            }
        }
        debug!("drop_cancelled");
    }

    /// Turns the released preview into a live item. Returns the committed
    /// level, or `None` when the handle went stale meanwhile.
    pub(crate) fn commit_drop(
        &mut self,
        handle: NodeHandle,
        world: &mut SceneWorld,
        items: &mut HashMap<NodeHandle, ItemData>,
        scheduler: &mut Scheduler<SessionTask>,
    ) -> Option<usize> {
        if self.committing == Some(handle) {
            self.committing = None;
        }
        let preview = self.preview.filter(|preview| preview.handle == handle)?;
        if !world.contains(handle) {
            self.preview = None;
            return None;
        }

        world.set_body_enabled(handle, true);
        world.rename(handle, item_name(preview.level));
        items.insert(
            handle,
            ItemData {
                level: preview.level,
            },
        );
        self.preview = None;
        scheduler.schedule_once(
            seconds(self.config.next_preview_delay_seconds),
            SessionTask::GeneratePreview,
        );
        info!(level = preview.level, "item_dropped");
        Some(preview.level)
    }

    /// Keeps a released preview in place when the drop can no longer be
    /// committed (the game ended during the settle delay).
    pub(crate) fn abort_commit(&mut self, handle: NodeHandle, world: &mut SceneWorld) {
        if self.committing == Some(handle) {
            self.committing = None;
        }
        let (Some(line), Some(preview)) = (self.line, self.preview) else {
            return;
        };
        if preview.handle != handle {
            return;
        }
        let home = self.home_position(line);
        if let Some(node) = world.get_mut(handle) {
            node.transform.position = home;
            node.transform.scale = self.config.preview_scale;
        }
    }
}
