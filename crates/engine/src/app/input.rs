use super::scene::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerPhase {
    Began,
    Moved,
    Ended,
    Cancelled,
}

/// A single touch/mouse sample for one tick, already in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    pub position: Vec2,
}

impl PointerEvent {
    pub fn is_release(&self) -> bool {
        matches!(self.phase, PointerPhase::Ended | PointerPhase::Cancelled)
    }
}
