use std::collections::BTreeSet;

use super::scene::{NodeHandle, Slot, Vec3};

const MIN_SEPARATION: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Collider {
    Circle { radius: f32 },
    /// Static horizontal sensor segment centred on the node position.
    Line { half_width: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub collider: Collider,
    pub enabled: bool,
    pub velocity: Vec3,
}

impl Body {
    pub fn circle(radius: f32) -> Self {
        Self {
            collider: Collider::Circle { radius },
            enabled: true,
            velocity: Vec3::ZERO,
        }
    }

    pub fn line(half_width: f32) -> Self {
        Self {
            collider: Collider::Line { half_width },
            enabled: true,
            velocity: Vec3::ZERO,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayfieldBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub floor_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsSettings {
    pub gravity: f32,
    pub bounds: PlayfieldBounds,
    pub restitution: f32,
    pub linear_damping: f32,
    pub contact_slop: f32,
    pub solver_iterations: u32,
    /// Bodies that end up this far outside the bounds are reported as lost.
    pub kill_margin: f32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            gravity: 980.0,
            bounds: PlayfieldBounds {
                min_x: -360.0,
                max_x: 360.0,
                floor_y: 0.0,
            },
            restitution: 0.2,
            linear_damping: 0.5,
            contact_slop: 0.5,
            solver_iterations: 4,
            kill_margin: 200.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    Begin,
    End,
}

/// Pair is ordered so that `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEvent {
    pub phase: ContactPhase,
    pub a: NodeHandle,
    pub b: NodeHandle,
}

impl ContactEvent {
    pub fn involves(&self, handle: NodeHandle) -> bool {
        self.a == handle || self.b == handle
    }

    pub fn other(&self, handle: NodeHandle) -> Option<NodeHandle> {
        if self.a == handle {
            Some(self.b)
        } else if self.b == handle {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicsStep {
    pub contacts: Vec<ContactEvent>,
    pub out_of_bounds: Vec<NodeHandle>,
}

#[derive(Debug, Clone, Copy)]
struct CircleRef {
    slot: usize,
    handle: NodeHandle,
    radius: f32,
}

#[derive(Debug, Clone, Copy)]
struct LineRef {
    handle: NodeHandle,
    position: Vec3,
    half_width: f32,
}

#[derive(Debug)]
pub struct PhysicsWorld {
    settings: PhysicsSettings,
    enabled: bool,
    contacts: BTreeSet<(NodeHandle, NodeHandle)>,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsSettings::default())
    }
}

impl PhysicsWorld {
    pub fn new(settings: PhysicsSettings) -> Self {
        Self {
            settings,
            enabled: true,
            contacts: BTreeSet::new(),
        }
    }

    pub fn settings(&self) -> &PhysicsSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// System-wide switch. While disabled nothing moves and no contact
    /// events are produced.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn in_contact(&self, a: NodeHandle, b: NodeHandle) -> bool {
        self.contacts.contains(&ordered(a, b))
    }

    pub(crate) fn reset_contacts(&mut self) {
        self.contacts.clear();
    }

    pub(crate) fn step(&mut self, fixed_dt_seconds: f32, slots: &mut [Slot]) -> PhysicsStep {
        if !self.enabled {
            return PhysicsStep::default();
        }
        let dt = fixed_dt_seconds.max(0.0);
        let (mut circles, lines) = collect_bodies(slots);

        self.integrate(dt, slots, &circles);
        let mut step = PhysicsStep::default();
        circles.retain(|circle| {
            let lost = body_state(slots, circle.slot)
                .is_some_and(|(position, _)| self.is_lost(position));
            if lost {
                step.out_of_bounds.push(circle.handle);
            }
            !lost
        });

        for _ in 0..self.settings.solver_iterations.max(1) {
            self.resolve_circle_pairs(slots, &circles);
            self.resolve_bounds(slots, &circles);
        }

        let current = self.detect_contacts(slots, &circles, &lines);
        for pair in current.difference(&self.contacts) {
            step.contacts.push(ContactEvent {
                phase: ContactPhase::Begin,
                a: pair.0,
                b: pair.1,
            });
        }
        for pair in self.contacts.difference(&current) {
            step.contacts.push(ContactEvent {
                phase: ContactPhase::End,
                a: pair.0,
                b: pair.1,
            });
        }
        self.contacts = current;
        step
    }

    fn is_lost(&self, position: Vec3) -> bool {
        let bounds = self.settings.bounds;
        let margin = self.settings.kill_margin;
        position.y < bounds.floor_y - margin
            || position.x < bounds.min_x - margin
            || position.x > bounds.max_x + margin
    }

    fn integrate(&self, dt: f32, slots: &mut [Slot], circles: &[CircleRef]) {
        let damping = (1.0 - self.settings.linear_damping * dt).clamp(0.0, 1.0);
        for circle in circles {
            let Some((position, velocity)) = body_state_mut(slots, circle.slot) else {
                continue;
            };
            velocity.y -= self.settings.gravity * dt;
            *velocity = *velocity * damping;
            position.x += velocity.x * dt;
            position.y += velocity.y * dt;
        }
    }

    fn resolve_circle_pairs(&self, slots: &mut [Slot], circles: &[CircleRef]) {
        let restitution = self.settings.restitution;
        for i in 0..circles.len() {
            for j in (i + 1)..circles.len() {
                let (ci, cj) = (circles[i], circles[j]);
                let (Some((pi, vi)), Some((pj, vj))) =
                    (body_state(slots, ci.slot), body_state(slots, cj.slot))
                else {
                    continue;
                };
                let dx = pj.x - pi.x;
                let dy = pj.y - pi.y;
                let distance = (dx * dx + dy * dy).sqrt();
                let penetration = ci.radius + cj.radius - distance;
                if penetration <= 0.0 {
                    continue;
                }
                // Coincident centres separate vertically.
                let (nx, ny) = if distance < MIN_SEPARATION {
                    (0.0, 1.0)
                } else {
                    (dx / distance, dy / distance)
                };
                let correction = penetration * 0.5;
                let approach = (vj.x - vi.x) * nx + (vj.y - vi.y) * ny;
                let impulse = if approach < 0.0 {
                    -(1.0 + restitution) * approach * 0.5
                } else {
                    0.0
                };

                if let Some((position, velocity)) = body_state_mut(slots, ci.slot) {
                    position.x -= nx * correction;
                    position.y -= ny * correction;
                    velocity.x -= nx * impulse;
                    velocity.y -= ny * impulse;
                }
                if let Some((position, velocity)) = body_state_mut(slots, cj.slot) {
                    position.x += nx * correction;
                    position.y += ny * correction;
                    velocity.x += nx * impulse;
                    velocity.y += ny * impulse;
                }
            }
        }
    }

    fn resolve_bounds(&self, slots: &mut [Slot], circles: &[CircleRef]) {
        let bounds = self.settings.bounds;
        let restitution = self.settings.restitution;
        for circle in circles {
            let Some((position, velocity)) = body_state_mut(slots, circle.slot) else {
                continue;
            };
            let r = circle.radius;
            if position.x - r < bounds.min_x {
                position.x = bounds.min_x + r;
                if velocity.x < 0.0 {
                    velocity.x = -velocity.x * restitution;
                }
            }
            if position.x + r > bounds.max_x {
                position.x = bounds.max_x - r;
                if velocity.x > 0.0 {
                    velocity.x = -velocity.x * restitution;
                }
            }
            if position.y - r < bounds.floor_y {
                position.y = bounds.floor_y + r;
                if velocity.y < 0.0 {
                    velocity.y = -velocity.y * restitution;
                }
            }
        }
    }

    fn detect_contacts(
        &self,
        slots: &[Slot],
        circles: &[CircleRef],
        lines: &[LineRef],
    ) -> BTreeSet<(NodeHandle, NodeHandle)> {
        let slop = self.settings.contact_slop;
        let mut current = BTreeSet::new();
        for (i, ci) in circles.iter().enumerate() {
            let Some((pi, _)) = body_state(slots, ci.slot) else {
                continue;
            };
            for cj in &circles[i + 1..] {
                let Some((pj, _)) = body_state(slots, cj.slot) else {
                    continue;
                };
                if pi.distance_xy(pj) <= ci.radius + cj.radius + slop {
                    current.insert(ordered(ci.handle, cj.handle));
                }
            }
            for line in lines {
                let within_y = (pi.y - line.position.y).abs() <= ci.radius + slop;
                let within_x = (pi.x - line.position.x).abs() <= line.half_width + ci.radius;
                if within_x && within_y {
                    current.insert(ordered(ci.handle, line.handle));
                }
            }
        }
        current
    }
}

fn ordered(a: NodeHandle, b: NodeHandle) -> (NodeHandle, NodeHandle) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn collect_bodies(slots: &[Slot]) -> (Vec<CircleRef>, Vec<LineRef>) {
    let mut circles = Vec::new();
    let mut lines = Vec::new();
    for (index, slot) in slots.iter().enumerate() {
        let Some(node) = slot.node.as_ref() else {
            continue;
        };
        let Some(body) = node.body.as_ref() else {
            continue;
        };
        if !node.active || !body.enabled {
            continue;
        }
        let handle = NodeHandle::from_raw(index as u32, slot.generation);
        match body.collider {
            Collider::Circle { radius } => circles.push(CircleRef {
                slot: index,
                handle,
                radius: radius * node.transform.scale,
            }),
            Collider::Line { half_width } => lines.push(LineRef {
                handle,
                position: node.transform.position,
                half_width,
            }),
        }
    }
    (circles, lines)
}

fn body_state(slots: &[Slot], slot: usize) -> Option<(Vec3, Vec3)> {
    let node = slots.get(slot)?.node.as_ref()?;
    let body = node.body.as_ref()?;
    Some((node.transform.position, body.velocity))
}

fn body_state_mut(slots: &mut [Slot], slot: usize) -> Option<(&mut Vec3, &mut Vec3)> {
    let node = slots.get_mut(slot)?.node.as_mut()?;
    let body = node.body.as_mut()?;
    Some((&mut node.transform.position, &mut body.velocity))
}
