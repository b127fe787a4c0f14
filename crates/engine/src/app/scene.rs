use std::ops::{Add, Mul, Sub};

use super::input::{PointerEvent, PointerPhase};
use super::physics::{Body, PhysicsSettings, PhysicsStep, PhysicsWorld};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneKey {
    Lobby,
    Play,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    SwitchTo(SceneKey),
    HardResetTo(SceneKey),
    Quit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn midpoint(self, other: Self) -> Self {
        (self + other) * 0.5
    }

    pub fn distance_xy(self, other: Self) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub scale: f32,
    pub rotation_degrees: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: 1.0,
            rotation_degrees: 0.0,
        }
    }
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    quit_requested: bool,
    switch_scene_pressed: bool,
    restart_pressed: bool,
    save_pressed: bool,
    pointer: Option<PointerEvent>,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn switch_scene_pressed(&self) -> bool {
        self.switch_scene_pressed
    }

    pub fn restart_pressed(&self) -> bool {
        self.restart_pressed
    }

    pub fn save_pressed(&self) -> bool {
        self.save_pressed
    }

    pub fn pointer(&self) -> Option<PointerEvent> {
        self.pointer
    }

    pub fn with_quit_requested(mut self, quit_requested: bool) -> Self {
        self.quit_requested = quit_requested;
        self
    }

    pub fn with_switch_scene_pressed(mut self, switch_scene_pressed: bool) -> Self {
        self.switch_scene_pressed = switch_scene_pressed;
        self
    }

    pub fn with_restart_pressed(mut self, restart_pressed: bool) -> Self {
        self.restart_pressed = restart_pressed;
        self
    }

    pub fn with_save_pressed(mut self, save_pressed: bool) -> Self {
        self.save_pressed = save_pressed;
        self
    }

    pub fn with_pointer(mut self, phase: PointerPhase, position: Vec2) -> Self {
        self.pointer = Some(PointerEvent { phase, position });
        self
    }
}

/// Generation-tagged reference into a [`SceneWorld`].
///
/// A handle outlives the node it names; once the node is despawned the slot's
/// generation moves on and every lookup through the old handle returns `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

impl NodeHandle {
    pub(crate) fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub body: Option<Body>,
    pub active: bool,
    spawn_order: u64,
}

impl Node {
    pub fn spawn_order(&self) -> u64 {
        self.spawn_order
    }

    pub fn physics_enabled(&self) -> bool {
        self.body.as_ref().is_some_and(|body| body.enabled)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) node: Option<Node>,
}

#[derive(Debug, Default)]
pub struct SceneWorld {
    slots: Vec<Slot>,
    free_indices: Vec<u32>,
    pending_free: Vec<u32>,
    live_count: usize,
    next_spawn_order: u64,
    physics: PhysicsWorld,
}

impl SceneWorld {
    pub fn with_physics(settings: PhysicsSettings) -> Self {
        Self {
            physics: PhysicsWorld::new(settings),
            ..Self::default()
        }
    }

    pub fn spawn(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        body: Option<Body>,
    ) -> NodeHandle {
        let node = Node {
            name: name.into(),
            transform,
            body,
            active: true,
            spawn_order: self.next_spawn_order,
        };
        self.next_spawn_order = self.next_spawn_order.saturating_add(1);
        self.live_count += 1;

        if let Some(index) = self.free_indices.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeHandle {
            index,
            generation: 0,
        }
    }

    /// Removes the node immediately. The slot index is recycled only after the
    /// next [`SceneWorld::apply_pending`].
    pub fn despawn(&mut self, handle: NodeHandle) -> bool {
        let Some(slot) = self.slot_mut(handle) else {
            return false;
        };
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.pending_free.push(handle.index);
        self.live_count -= 1;
        true
    }

    pub fn apply_pending(&mut self) {
        if self.pending_free.is_empty() {
            return;
        }
        self.pending_free.sort_unstable();
        self.pending_free.dedup();
        // Lowest index is reused first.
        self.free_indices.extend(self.pending_free.drain(..).rev());
    }

    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.pending_free.push(index as u32);
            }
        }
        self.live_count = 0;
        self.physics.reset_contacts();
        self.physics.set_enabled(true);
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&Node> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.slot_mut(handle)?.node.as_mut()
    }

    pub fn node_count(&self) -> usize {
        self.live_count
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &Node)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node.as_ref().map(|node| {
                (
                    NodeHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    node,
                )
            })
        })
    }

    pub fn handles(&self) -> Vec<NodeHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.iter()
            .find(|(_, node)| node.name == name)
            .map(|(handle, _)| handle)
    }

    pub fn rename(&mut self, handle: NodeHandle, name: impl Into<String>) -> bool {
        match self.get_mut(handle) {
            Some(node) => {
                node.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Returns false when the handle is stale or the node has no body.
    pub fn set_body_enabled(&mut self, handle: NodeHandle, enabled: bool) -> bool {
        let Some(body) = self.get_mut(handle).and_then(|node| node.body.as_mut()) else {
            return false;
        };
        body.enabled = enabled;
        if !enabled {
            body.velocity = Vec3::ZERO;
        }
        true
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    pub fn step_physics(&mut self, fixed_dt_seconds: f32) -> PhysicsStep {
        let Self { slots, physics, .. } = self;
        physics.step(fixed_dt_seconds, slots)
    }

    fn slot_mut(&mut self, handle: NodeHandle) -> Option<&mut Slot> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation || slot.node.is_none() {
            return None;
        }
        Some(slot)
    }
}

pub trait Scene {
    fn load(&mut self, world: &mut SceneWorld);
    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        world: &mut SceneWorld,
    ) -> SceneCommand;
    fn unload(&mut self, world: &mut SceneWorld);
    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        None
    }
}

struct SceneRuntime {
    scene: Box<dyn Scene>,
    world: SceneWorld,
    is_loaded: bool,
}

impl SceneRuntime {
    fn load(&mut self) {
        if self.is_loaded {
            return;
        }
        let (scene, world) = (&mut self.scene, &mut self.world);
        scene.load(world);
        world.apply_pending();
        self.is_loaded = true;
    }

    fn unload(&mut self) {
        if !self.is_loaded {
            return;
        }
        let (scene, world) = (&mut self.scene, &mut self.world);
        scene.unload(world);
        world.clear();
        world.apply_pending();
        self.is_loaded = false;
    }
}

/// Owns the lobby and play scenes. Only the active scene is loaded; switching
/// unloads the outgoing scene so its state is torn down with it.
pub(crate) struct SceneMachine {
    lobby: SceneRuntime,
    play: SceneRuntime,
    active_scene: SceneKey,
}

impl SceneMachine {
    pub(crate) fn new(
        lobby: Box<dyn Scene>,
        play: Box<dyn Scene>,
        active_scene: SceneKey,
        play_physics: PhysicsSettings,
    ) -> Self {
        Self {
            lobby: SceneRuntime {
                scene: lobby,
                world: SceneWorld::default(),
                is_loaded: false,
            },
            play: SceneRuntime {
                scene: play,
                world: SceneWorld::with_physics(play_physics),
                is_loaded: false,
            },
            active_scene,
        }
    }

    pub(crate) fn active_scene(&self) -> SceneKey {
        self.active_scene
    }

    pub(crate) fn load_active(&mut self) {
        self.active_runtime_mut().load();
    }

    pub(crate) fn update_active(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
    ) -> SceneCommand {
        let runtime = self.active_runtime_mut();
        let (scene, world) = (&mut runtime.scene, &mut runtime.world);
        scene.update(fixed_dt_seconds, input, world)
    }

    pub(crate) fn apply_pending_active(&mut self) {
        self.active_runtime_mut().world.apply_pending();
    }

    pub(crate) fn active_world(&self) -> &SceneWorld {
        &self.active_runtime_ref().world
    }

    pub(crate) fn debug_title_active(&self) -> Option<String> {
        let runtime = self.active_runtime_ref();
        runtime.scene.debug_title(&runtime.world)
    }

    pub(crate) fn switch_to(&mut self, next_scene: SceneKey) -> bool {
        if self.active_scene == next_scene {
            return false;
        }
        self.active_runtime_mut().unload();
        self.active_scene = next_scene;
        self.active_runtime_mut().load();
        true
    }

    pub(crate) fn hard_reset_to(&mut self, next_scene: SceneKey) -> bool {
        self.active_runtime_mut().unload();
        let changed = self.active_scene != next_scene;
        self.active_scene = next_scene;
        let runtime = self.active_runtime_mut();
        runtime.unload();
        runtime.load();
        changed
    }

    pub(crate) fn shutdown_all(&mut self) {
        self.lobby.unload();
        self.play.unload();
    }

    fn active_runtime_mut(&mut self) -> &mut SceneRuntime {
        match self.active_scene {
            SceneKey::Lobby => &mut self.lobby,
            SceneKey::Play => &mut self.play,
        }
    }

    fn active_runtime_ref(&self) -> &SceneRuntime {
        match self.active_scene {
            SceneKey::Lobby => &self.lobby,
            SceneKey::Play => &self.play,
        }
    }
}
