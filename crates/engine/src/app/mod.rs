mod input;
mod loop_runner;
mod physics;
mod scene;
mod scheduler;
mod tween;

pub use input::{PointerEvent, PointerPhase};
pub use loop_runner::{run_app, AppError, InputDriver, LoopConfig, RunSummary, StopReason};
pub use physics::{
    Body, Collider, ContactEvent, ContactPhase, PhysicsSettings, PhysicsStep, PhysicsWorld,
    PlayfieldBounds,
};
pub use scene::{
    InputSnapshot, Node, NodeHandle, Scene, SceneCommand, SceneKey, SceneWorld, Transform, Vec2,
    Vec3,
};
pub use scheduler::{Scheduler, TimerHandle};
pub use tween::{Easing, Lerp, Tween};
