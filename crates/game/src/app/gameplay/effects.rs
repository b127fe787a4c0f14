use std::collections::VecDeque;

use engine::{Easing, Transform, Tween, Vec3};
use rand::Rng;
use tracing::{debug, info};

use super::config::EffectsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ContainerId(u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ContainerAnimation {
    pub(crate) scale: Tween<f32>,
    pub(crate) position: Tween<Vec3>,
}

/// Pooled visual wrapper. Holds the animated element and the level of the
/// synthesized item it is presenting.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EffectContainer {
    id: ContainerId,
    pub(crate) transform: Transform,
    pub(crate) opacity: f32,
    pub(crate) active: bool,
    pub(crate) animation: Option<ContainerAnimation>,
    pub(crate) synthesized_level: Option<usize>,
}

impl EffectContainer {
    fn new(id: ContainerId) -> Self {
        Self {
            id,
            transform: Transform::default(),
            opacity: 1.0,
            active: false,
            animation: None,
            synthesized_level: None,
        }
    }

    pub(crate) fn id(&self) -> ContainerId {
        self.id
    }

    fn reset(&mut self) {
        self.transform = Transform::default();
        self.opacity = 1.0;
        self.active = false;
        self.animation = None;
        self.synthesized_level = None;
    }
}

/// Bounded pool of effect containers.
///
/// `release` takes the container by value and runs no callbacks, so a
/// container cannot be re-acquired while its own release is in progress.
#[derive(Debug)]
pub(crate) struct EffectContainerPool {
    pooled: VecDeque<EffectContainer>,
    max_pool_size: usize,
    next_id: u32,
    active_count: usize,
    created_count: usize,
    destroyed_count: usize,
}

impl EffectContainerPool {
    pub(crate) fn new(initial_pool_size: usize, max_pool_size: usize) -> Self {
        let mut pool = Self {
            pooled: VecDeque::with_capacity(max_pool_size),
            max_pool_size,
            next_id: 0,
            active_count: 0,
            created_count: 0,
            destroyed_count: 0,
        };
        for _ in 0..initial_pool_size.min(max_pool_size) {
            let container = pool.instantiate();
            pool.pooled.push_back(container);
        }
        pool
    }

    pub(crate) fn acquire(&mut self) -> EffectContainer {
        let mut container = match self.pooled.pop_front() {
            Some(container) => container,
            None => self.instantiate(),
        };
        container.reset();
        container.active = true;
        self.active_count += 1;
        container
    }

    pub(crate) fn release(&mut self, mut container: EffectContainer) {
        self.active_count = self.active_count.saturating_sub(1);
        container.reset();
        if self.pooled.len() < self.max_pool_size {
            self.pooled.push_back(container);
        } else {
            self.destroyed_count += 1;
            debug!(container = container.id.0, "effect_container_destroyed");
        }
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active_count
    }

    pub(crate) fn pooled_count(&self) -> usize {
        self.pooled.len()
    }

    /// Containers ever instantiated, pre-warmed ones included.
    pub(crate) fn created_count(&self) -> usize {
        self.created_count
    }

    pub(crate) fn destroyed_count(&self) -> usize {
        self.destroyed_count
    }

    fn instantiate(&mut self) -> EffectContainer {
        let id = ContainerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.created_count += 1;
        EffectContainer::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TopTierPhase {
    ScalingUp,
    Holding,
    ScalingDown,
    Releasing,
    Done,
}

#[derive(Debug)]
pub(crate) struct TopTierSequence {
    phase: TopTierPhase,
    container: Option<EffectContainer>,
    hold_remaining: f32,
    scale_down: ContainerAnimation,
}

impl TopTierSequence {
    fn start(
        mut container: EffectContainer,
        level: usize,
        origin: Vec3,
        config: &EffectsConfig,
    ) -> Self {
        let timing = config.top_tier;
        let center = config.screen_center.to_vec3();
        container.synthesized_level = Some(level);
        container.transform.position = origin;
        container.transform.scale = timing.start_scale;
        container.animation = Some(ContainerAnimation {
            scale: Tween::new(
                timing.start_scale,
                timing.peak_scale,
                timing.scale_up_seconds,
                Easing::QuadOut,
            ),
            position: Tween::new(origin, center, timing.scale_up_seconds, Easing::QuadOut),
        });
        Self {
            phase: TopTierPhase::ScalingUp,
            container: Some(container),
            hold_remaining: timing.hold_seconds,
            scale_down: ContainerAnimation {
                scale: Tween::new(
                    timing.peak_scale,
                    timing.end_scale,
                    timing.scale_down_seconds,
                    Easing::QuadIn,
                ),
                position: Tween::new(
                    center,
                    config.collection_point.to_vec3(),
                    timing.scale_down_seconds,
                    Easing::QuadIn,
                ),
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> TopTierPhase {
        self.phase
    }

    #[cfg(test)]
    pub(crate) fn container(&self) -> Option<&EffectContainer> {
        self.container.as_ref()
    }

    /// Runs phase transitions for `dt` seconds, carrying leftover time into
    /// the next phase. Returns true once the sequence reaches `Done`.
    fn advance(&mut self, mut dt: f32, pool: &mut EffectContainerPool) -> bool {
        loop {
            match self.phase {
                TopTierPhase::ScalingUp | TopTierPhase::ScalingDown => {
                    let Some(container) = self.container.as_mut() else {
                        self.phase = TopTierPhase::Releasing;
                        continue;
                    };
                    let Some(animation) = container.animation.as_mut() else {
                        self.phase = TopTierPhase::Releasing;
                        continue;
                    };
                    let leftover = animation.scale.advance(dt);
                    animation.position.advance(dt);
                    container.transform.scale = animation.scale.value();
                    container.transform.position = animation.position.value();
                    let Some(leftover) = leftover else {
                        return false;
                    };
                    dt = leftover;
                    if self.phase == TopTierPhase::ScalingUp {
                        container.animation = None;
                        self.phase = TopTierPhase::Holding;
                    } else {
                        self.phase = TopTierPhase::Releasing;
                    }
                }
                TopTierPhase::Holding => {
                    if dt < self.hold_remaining {
                        self.hold_remaining -= dt;
                        return false;
                    }
                    dt -= self.hold_remaining;
                    self.hold_remaining = 0.0;
                    if let Some(container) = self.container.as_mut() {
                        container.animation = Some(self.scale_down);
                    }
                    self.phase = TopTierPhase::ScalingDown;
                }
                TopTierPhase::Releasing => {
                    if let Some(container) = self.container.take() {
                        pool.release(container);
                    }
                    self.phase = TopTierPhase::Done;
                }
                TopTierPhase::Done => return true,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RewardKind {
    GoldCoin,
    RedPacket,
}

#[derive(Debug, Clone, Copy)]
struct RewardUnit {
    kind: RewardKind,
    flight: Tween<Vec3>,
}

#[derive(Debug)]
struct RewardBatch {
    id: u64,
    units: Vec<RewardUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PlusOneIndicator {
    anchor: Vec3,
    rise: f32,
    phase_seconds: f32,
    going_up: bool,
    tween: Option<Tween<Vec3>>,
}

impl PlusOneIndicator {
    fn new(config: &EffectsConfig) -> Self {
        Self {
            anchor: config.plus_one.anchor.to_vec3(),
            rise: config.plus_one.rise,
            phase_seconds: config.plus_one.phase_seconds,
            going_up: false,
            tween: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.tween.is_some()
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> Vec3 {
        self.tween.map_or(self.anchor, |tween| tween.value())
    }

    fn show(&mut self) {
        let top = self.anchor + Vec3::new(0.0, self.rise, 0.0);
        self.going_up = true;
        self.tween = Some(Tween::new(self.anchor, top, self.phase_seconds, Easing::QuadOut));
    }

    fn advance(&mut self, dt: f32) {
        let Some(tween) = self.tween.as_mut() else {
            return;
        };
        let Some(leftover) = tween.advance(dt) else {
            return;
        };
        if self.going_up {
            let top = tween.target();
            self.going_up = false;
            let mut back = Tween::new(top, self.anchor, self.phase_seconds, Easing::QuadIn);
            if back.advance(leftover).is_some() {
                self.tween = None;
            } else {
                self.tween = Some(back);
            }
        } else {
            self.tween = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EffectEvent {
    TopTierFinished,
    RewardBatchFinished { batch: u64 },
}

/// Plays reward flights, the top-tier presentation and the "+1" indicator.
/// Purely time-driven; the session feeds it the fixed step.
#[derive(Debug)]
pub(crate) struct EffectOrchestrator {
    config: EffectsConfig,
    pool: EffectContainerPool,
    top_tier: Option<TopTierSequence>,
    batches: Vec<RewardBatch>,
    next_batch_id: u64,
    plus_one: PlusOneIndicator,
}

impl EffectOrchestrator {
    pub(crate) fn new(config: &EffectsConfig) -> Self {
        Self {
            config: config.clone(),
            pool: EffectContainerPool::new(config.initial_pool_size, config.max_pool_size),
            top_tier: None,
            batches: Vec::new(),
            next_batch_id: 0,
            plus_one: PlusOneIndicator::new(config),
        }
    }

    pub(crate) fn pool(&self) -> &EffectContainerPool {
        &self.pool
    }

    #[cfg(test)]
    pub(crate) fn top_tier(&self) -> Option<&TopTierSequence> {
        self.top_tier.as_ref()
    }

    pub(crate) fn is_top_tier_running(&self) -> bool {
        self.top_tier.is_some()
    }

    #[cfg(test)]
    pub(crate) fn plus_one(&self) -> &PlusOneIndicator {
        &self.plus_one
    }

    #[cfg(test)]
    pub(crate) fn active_reward_units(&self) -> usize {
        self.batches.iter().map(|batch| batch.units.len()).sum()
    }

    pub(crate) fn play_top_tier(&mut self, level: usize, origin: Vec3) {
        if let Some(previous) = self.top_tier.take() {
            if let Some(container) = previous.container {
                self.pool.release(container);
            }
        }
        let container = self.pool.acquire();
        info!(level, container = container.id().0, "top_tier_sequence_started");
        self.top_tier = Some(TopTierSequence::start(container, level, origin, &self.config));
    }

    /// Starts one reward batch. Returns `None` when reward prefabs are not
    /// configured; bookkeeping elsewhere is unaffected.
    pub(crate) fn spawn_rewards<R: Rng + ?Sized>(
        &mut self,
        origin: Vec3,
        red_packets: u32,
        gold_coins: u32,
        rng: &mut R,
    ) -> Option<u64> {
        self.config.reward_prefabs.as_ref()?;

        let id = self.next_batch_id;
        self.next_batch_id = self.next_batch_id.wrapping_add(1);
        let mut units = Vec::with_capacity((red_packets + gold_coins) as usize);
        let kinds = std::iter::repeat(RewardKind::RedPacket)
            .take(red_packets as usize)
            .chain(std::iter::repeat(RewardKind::GoldCoin).take(gold_coins as usize));
        for kind in kinds {
            let start = origin + random_offset(rng, self.config.spawn_radius);
            let target = match kind {
                RewardKind::GoldCoin => self.config.gold_coin_target.to_vec3(),
                RewardKind::RedPacket => self.config.red_packet_target.to_vec3(),
            };
            units.push(RewardUnit {
                kind,
                flight: Tween::new(start, target, self.config.reward_duration_seconds, Easing::Linear),
            });
        }
        debug!(batch = id, red_packets, gold_coins, "reward_batch_started");
        self.batches.push(RewardBatch { id, units });
        Some(id)
    }

    pub(crate) fn show_plus_one(&mut self) {
        self.plus_one.show();
    }

    pub(crate) fn advance(&mut self, dt: f32) -> Vec<EffectEvent> {
        let mut events = Vec::new();

        if let Some(sequence) = self.top_tier.as_mut() {
            if sequence.advance(dt, &mut self.pool) {
                self.top_tier = None;
                info!("top_tier_sequence_finished");
                events.push(EffectEvent::TopTierFinished);
            }
        }

        for batch in &mut self.batches {
            let batch_id = batch.id;
            batch.units.retain_mut(|unit| {
                if unit.flight.advance(dt).is_none() {
                    return true;
                }
                debug!(batch = batch_id, kind = ?unit.kind, "reward_landed");
                false
            });
        }
        self.batches.retain(|batch| {
            if batch.units.is_empty() {
                events.push(EffectEvent::RewardBatchFinished { batch: batch.id });
                false
            } else {
                true
            }
        });

        self.plus_one.advance(dt);
        events
    }

    /// Drops running sequences and returns their containers to the pool.
    pub(crate) fn clear(&mut self) {
        if let Some(sequence) = self.top_tier.take() {
            if let Some(container) = sequence.container {
                self.pool.release(container);
            }
        }
        self.batches.clear();
        self.plus_one.tween = None;
    }

    #[cfg(test)]
    pub(crate) fn reward_kinds(&self) -> Vec<RewardKind> {
        self.batches
            .iter()
            .flat_map(|batch| batch.units.iter().map(|unit| unit.kind))
            .collect()
    }
}

fn random_offset<R: Rng + ?Sized>(rng: &mut R, radius: f32) -> Vec3 {
    if radius <= 0.0 {
        return Vec3::ZERO;
    }
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let distance = radius * rng.gen::<f32>().sqrt();
    Vec3::new(angle.cos() * distance, angle.sin() * distance, 0.0)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    const STEP: f32 = 1.0 / 60.0;

    fn orchestrator() -> EffectOrchestrator {
        EffectOrchestrator::new(&EffectsConfig::default())
    }

    #[test]
    fn pool_prewarms_and_reuses_containers() {
        let mut pool = EffectContainerPool::new(5, 20);
        assert_eq!(pool.pooled_count(), 5);
        assert_eq!(pool.created_count(), 5);

        let mut container = pool.acquire();
        let first_id = container.id();
        container.transform.scale = 3.0;
        container.opacity = 0.2;
        container.synthesized_level = Some(4);
        pool.release(container);

        // Released containers go to the back; cycle through the rest.
        let mut held = Vec::new();
        for _ in 0..5 {
            held.push(pool.acquire());
        }
        let reused = held
            .iter()
            .find(|container| container.id() == first_id)
            .expect("container reused");
        assert_eq!(reused.transform, Transform::default());
        assert_eq!(reused.opacity, 1.0);
        assert!(reused.active);
        assert!(reused.animation.is_none());
        assert!(reused.synthesized_level.is_none());
        assert_eq!(pool.created_count(), 5);
    }

    #[test]
    fn pool_never_exceeds_bounds_under_churn() {
        let mut pool = EffectContainerPool::new(2, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut held = Vec::new();
        for _ in 0..500 {
            if held.is_empty() || rng.gen_bool(0.55) {
                held.push(pool.acquire());
            } else {
                let index = rng.gen_range(0..held.len());
                pool.release(held.swap_remove(index));
            }
            assert!(pool.pooled_count() <= 4);
            assert!(pool.active_count() + pool.pooled_count() <= pool.created_count());
            assert_eq!(pool.active_count(), held.len());
        }
        for container in held.drain(..) {
            pool.release(container);
        }
        assert_eq!(pool.pooled_count(), 4.min(pool.created_count()));
        assert_eq!(
            pool.created_count(),
            pool.pooled_count() + pool.destroyed_count()
        );
    }

    #[test]
    fn top_tier_sequence_walks_every_phase_in_order() {
        let mut effects = orchestrator();
        let origin = Vec3::new(10.0, 200.0, 0.0);
        effects.play_top_tier(11, origin);
        assert_eq!(effects.pool().active_count(), 1);

        let phase = |effects: &EffectOrchestrator| effects.top_tier().map(TopTierSequence::phase);
        assert_eq!(phase(&effects), Some(TopTierPhase::ScalingUp));

        assert!(effects.advance(0.25).is_empty());
        let container = effects.top_tier().and_then(TopTierSequence::container).expect("container");
        assert!(container.transform.scale > 1.5 && container.transform.scale < 2.0);

        assert!(effects.advance(0.3).is_empty());
        assert_eq!(phase(&effects), Some(TopTierPhase::Holding));
        let container = effects.top_tier().and_then(TopTierSequence::container).expect("container");
        assert_eq!(container.transform.scale, 2.0);
        assert_eq!(container.transform.position, Vec3::new(0.0, 640.0, 0.0));

        assert!(effects.advance(0.9).is_empty());
        assert_eq!(phase(&effects), Some(TopTierPhase::Holding));
        assert!(effects.advance(0.2).is_empty());
        assert_eq!(phase(&effects), Some(TopTierPhase::ScalingDown));

        assert_eq!(effects.advance(0.5), vec![EffectEvent::TopTierFinished]);
        assert!(!effects.is_top_tier_running());
        assert_eq!(effects.pool().active_count(), 0);
    }

    #[test]
    fn top_tier_total_duration_is_two_seconds() {
        let mut effects = orchestrator();
        effects.play_top_tier(11, Vec3::ZERO);
        let mut elapsed = 0.0;
        loop {
            elapsed += STEP;
            if effects.advance(STEP).contains(&EffectEvent::TopTierFinished) {
                break;
            }
            assert!(elapsed < 3.0, "sequence never finished");
        }
        assert!((elapsed - 2.0).abs() < 2.0 * STEP, "finished after {elapsed}");
    }

    #[test]
    fn reward_batch_finishes_once_after_every_unit_lands() {
        let mut effects = orchestrator();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let batch = effects
            .spawn_rewards(Vec3::new(0.0, 300.0, 0.0), 2, 3, &mut rng)
            .expect("rewards configured");
        assert_eq!(effects.active_reward_units(), 5);
        assert_eq!(
            effects
                .reward_kinds()
                .iter()
                .filter(|kind| **kind == RewardKind::GoldCoin)
                .count(),
            3
        );

        let mut finished = Vec::new();
        for _ in 0..60 {
            finished.extend(effects.advance(STEP));
        }
        assert_eq!(finished, vec![EffectEvent::RewardBatchFinished { batch }]);
        assert_eq!(effects.active_reward_units(), 0);
    }

    #[test]
    fn empty_batch_finishes_on_next_advance() {
        let mut effects = orchestrator();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let batch = effects.spawn_rewards(Vec3::ZERO, 0, 0, &mut rng).expect("batch");
        assert_eq!(
            effects.advance(STEP),
            vec![EffectEvent::RewardBatchFinished { batch }]
        );
    }

    #[test]
    fn rewards_are_inert_without_prefabs() {
        let config = EffectsConfig {
            reward_prefabs: None,
            ..EffectsConfig::default()
        };
        let mut effects = EffectOrchestrator::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(effects.spawn_rewards(Vec3::ZERO, 4, 4, &mut rng).is_none());
        assert!(effects.advance(STEP).is_empty());
    }

    #[test]
    fn reward_offsets_stay_within_spawn_radius() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..200 {
            let offset = random_offset(&mut rng, 80.0);
            assert!(Vec3::ZERO.distance_xy(offset) <= 80.0 + 1e-3);
        }
    }

    #[test]
    fn plus_one_is_active_only_while_animating() {
        let mut effects = orchestrator();
        assert!(!effects.plus_one().is_active());
        effects.show_plus_one();
        assert!(effects.plus_one().is_active());

        effects.advance(0.2);
        assert!(effects.plus_one().is_active());
        let top = effects.plus_one().position();
        assert!((top.y - (1180.0 + 40.0)).abs() < 1e-3);

        effects.advance(0.1);
        assert!(effects.plus_one().is_active());
        effects.advance(0.11);
        assert!(!effects.plus_one().is_active());
        assert_eq!(effects.plus_one().position(), Vec3::new(-300.0, 1180.0, 0.0));
    }
}
