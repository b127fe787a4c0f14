use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine::{PhysicsSettings, PlayfieldBounds, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config '{path}' at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed at {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// A missing reference that switches one feature off instead of failing startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum ConfigIssue {
    #[error("itemPrefabs is empty; spawning and merging are disabled")]
    NoItemPrefabs,
    #[error("thresholdLine is missing; spawning and the failure monitor are disabled")]
    NoThresholdLine,
    #[error("effects.rewardPrefabs is missing; reward visuals are disabled")]
    NoRewardPrefabs,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct ConfigPoint {
    pub(crate) x: f32,
    pub(crate) y: f32,
}

impl ConfigPoint {
    pub(crate) const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub(crate) fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct GameConfig {
    pub(crate) playfield: PlayfieldConfig,
    pub(crate) threshold_line: Option<ThresholdLineConfig>,
    pub(crate) item_prefabs: Vec<ItemPrefabConfig>,
    pub(crate) spawn: SpawnConfig,
    pub(crate) synthesis: SynthesisConfig,
    pub(crate) effects: EffectsConfig,
    pub(crate) failure: FailureConfig,
    pub(crate) persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct PlayfieldConfig {
    pub(crate) min_x: f32,
    pub(crate) max_x: f32,
    pub(crate) floor_y: f32,
    pub(crate) gravity: f32,
    pub(crate) restitution: f32,
    pub(crate) linear_damping: f32,
    pub(crate) kill_margin: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ThresholdLineConfig {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) half_width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemPrefabConfig {
    pub(crate) radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct SpawnConfig {
    /// Raw per-level weights; levels past the end of the list weigh zero.
    pub(crate) weights: Vec<f32>,
    pub(crate) preview_scale: f32,
    pub(crate) preview_height: f32,
    pub(crate) drop_band_offset: f32,
    pub(crate) drop_settle_delay_seconds: f32,
    pub(crate) next_preview_delay_seconds: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct SynthesisConfig {
    pub(crate) synthesis_delay_seconds: f32,
    pub(crate) post_destroy_delay_seconds: f32,
    pub(crate) settle_delay_seconds: f32,
    pub(crate) gold_per_level: u32,
    pub(crate) red_bag_per_level: u32,
    /// Indexed by the level a merge produces.
    pub(crate) red_packet_counts: Vec<u32>,
    pub(crate) gold_coin_counts: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RewardPrefabsConfig {
    pub(crate) gold_coin: String,
    pub(crate) red_packet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EffectsConfig {
    pub(crate) initial_pool_size: usize,
    pub(crate) max_pool_size: usize,
    pub(crate) reward_prefabs: Option<RewardPrefabsConfig>,
    pub(crate) spawn_radius: f32,
    pub(crate) reward_duration_seconds: f32,
    pub(crate) gold_coin_target: ConfigPoint,
    pub(crate) red_packet_target: ConfigPoint,
    pub(crate) screen_center: ConfigPoint,
    pub(crate) collection_point: ConfigPoint,
    pub(crate) top_tier: TopTierConfig,
    pub(crate) plus_one: PlusOneConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct TopTierConfig {
    pub(crate) scale_up_seconds: f32,
    pub(crate) hold_seconds: f32,
    pub(crate) scale_down_seconds: f32,
    pub(crate) start_scale: f32,
    pub(crate) peak_scale: f32,
    pub(crate) end_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct PlusOneConfig {
    pub(crate) anchor: ConfigPoint,
    pub(crate) rise: f32,
    pub(crate) phase_seconds: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct FailureConfig {
    pub(crate) failure_delay_seconds: f32,
    pub(crate) poll_interval_seconds: f32,
    pub(crate) panel_position: ConfigPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct PersistenceConfig {
    pub(crate) local_save_interval_seconds: f32,
    pub(crate) save_file_name: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            playfield: PlayfieldConfig::default(),
            threshold_line: Some(ThresholdLineConfig {
                x: 0.0,
                y: 1000.0,
                half_width: 330.0,
            }),
            item_prefabs: [
                18.0, 24.0, 30.0, 36.0, 44.0, 52.0, 60.0, 70.0, 80.0, 90.0, 100.0, 112.0,
            ]
            .into_iter()
            .map(|radius| ItemPrefabConfig { radius })
            .collect(),
            spawn: SpawnConfig::default(),
            synthesis: SynthesisConfig::default(),
            effects: EffectsConfig::default(),
            failure: FailureConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Default for PlayfieldConfig {
    fn default() -> Self {
        let physics = PhysicsSettings::default();
        Self {
            min_x: physics.bounds.min_x,
            max_x: physics.bounds.max_x,
            floor_y: physics.bounds.floor_y,
            gravity: physics.gravity,
            restitution: physics.restitution,
            linear_damping: physics.linear_damping,
            kill_margin: physics.kill_margin,
        }
    }
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            weights: vec![40.0, 30.0, 20.0, 10.0],
            preview_scale: 0.6,
            preview_height: 80.0,
            drop_band_offset: 150.0,
            drop_settle_delay_seconds: 0.1,
            next_preview_delay_seconds: 0.5,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            synthesis_delay_seconds: 0.1,
            post_destroy_delay_seconds: 0.05,
            settle_delay_seconds: 0.1,
            gold_per_level: 10,
            red_bag_per_level: 2,
            red_packet_counts: vec![0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6],
            gold_coin_counts: vec![0, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 8],
        }
    }
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            initial_pool_size: 5,
            max_pool_size: 20,
            reward_prefabs: Some(RewardPrefabsConfig {
                gold_coin: "fx_gold_coin".to_string(),
                red_packet: "fx_red_packet".to_string(),
            }),
            spawn_radius: 80.0,
            reward_duration_seconds: 0.6,
            gold_coin_target: ConfigPoint::new(-300.0, 1250.0),
            red_packet_target: ConfigPoint::new(300.0, 1250.0),
            screen_center: ConfigPoint::new(0.0, 640.0),
            collection_point: ConfigPoint::new(300.0, 1200.0),
            top_tier: TopTierConfig::default(),
            plus_one: PlusOneConfig::default(),
        }
    }
}

impl Default for TopTierConfig {
    fn default() -> Self {
        Self {
            scale_up_seconds: 0.5,
            hold_seconds: 1.0,
            scale_down_seconds: 0.5,
            start_scale: 1.0,
            peak_scale: 2.0,
            end_scale: 0.3,
        }
    }
}

impl Default for PlusOneConfig {
    fn default() -> Self {
        Self {
            anchor: ConfigPoint::new(-300.0, 1180.0),
            rise: 40.0,
            phase_seconds: 0.2,
        }
    }
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            failure_delay_seconds: 3.0,
            poll_interval_seconds: 0.1,
            panel_position: ConfigPoint::new(0.0, 640.0),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            local_save_interval_seconds: 10.0,
            save_file_name: "playfield.save.json".to_string(),
        }
    }
}

impl GameConfig {
    pub(crate) fn levels(&self) -> usize {
        self.item_prefabs.len()
    }

    pub(crate) fn physics_settings(&self) -> PhysicsSettings {
        PhysicsSettings {
            gravity: self.playfield.gravity,
            bounds: PlayfieldBounds {
                min_x: self.playfield.min_x,
                max_x: self.playfield.max_x,
                floor_y: self.playfield.floor_y,
            },
            restitution: self.playfield.restitution,
            linear_damping: self.playfield.linear_damping,
            kill_margin: self.playfield.kill_margin,
            ..PhysicsSettings::default()
        }
    }

    /// Hard errors reject the whole document; missing references come back as
    /// issues and only switch the dependent feature off.
    pub(crate) fn validate(&self) -> Result<Vec<ConfigIssue>, ConfigError> {
        let playfield = &self.playfield;
        if !(playfield.min_x.is_finite() && playfield.max_x.is_finite())
            || playfield.min_x >= playfield.max_x
        {
            return Err(invalid(
                "playfield",
                format!(
                    "expected minX < maxX, got minX={} maxX={}",
                    playfield.min_x, playfield.max_x
                ),
            ));
        }
        for (index, prefab) in self.item_prefabs.iter().enumerate() {
            if !(prefab.radius.is_finite() && prefab.radius > 0.0) {
                return Err(invalid(
                    "itemPrefabs",
                    format!("entry {index}: expected positive radius, got {}", prefab.radius),
                ));
            }
        }
        if self.spawn.weights.len() > self.levels() {
            return Err(invalid(
                "spawn.weights",
                format!(
                    "expected at most {} entries, got {}",
                    self.levels(),
                    self.spawn.weights.len()
                ),
            ));
        }
        if self
            .spawn
            .weights
            .iter()
            .any(|weight| !weight.is_finite() || *weight < 0.0)
        {
            return Err(invalid(
                "spawn.weights",
                "expected finite, non-negative weights".to_string(),
            ));
        }
        if !(self.spawn.preview_scale.is_finite() && self.spawn.preview_scale > 0.0) {
            return Err(invalid(
                "spawn.previewScale",
                format!("expected positive scale, got {}", self.spawn.preview_scale),
            ));
        }

        let delays = [
            ("spawn.dropSettleDelaySeconds", self.spawn.drop_settle_delay_seconds),
            ("spawn.nextPreviewDelaySeconds", self.spawn.next_preview_delay_seconds),
            ("synthesis.synthesisDelaySeconds", self.synthesis.synthesis_delay_seconds),
            ("synthesis.postDestroyDelaySeconds", self.synthesis.post_destroy_delay_seconds),
            ("synthesis.settleDelaySeconds", self.synthesis.settle_delay_seconds),
            ("effects.rewardDurationSeconds", self.effects.reward_duration_seconds),
            ("effects.topTier.scaleUpSeconds", self.effects.top_tier.scale_up_seconds),
            ("effects.topTier.holdSeconds", self.effects.top_tier.hold_seconds),
            ("effects.topTier.scaleDownSeconds", self.effects.top_tier.scale_down_seconds),
            ("effects.plusOne.phaseSeconds", self.effects.plus_one.phase_seconds),
            ("failure.failureDelaySeconds", self.failure.failure_delay_seconds),
            ("persistence.localSaveIntervalSeconds", self.persistence.local_save_interval_seconds),
        ];
        for (field, value) in delays {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(field, format!("expected non-negative seconds, got {value}")));
            }
        }
        if !(self.failure.poll_interval_seconds.is_finite() && self.failure.poll_interval_seconds > 0.0)
        {
            return Err(invalid(
                "failure.pollIntervalSeconds",
                format!(
                    "expected positive seconds, got {}",
                    self.failure.poll_interval_seconds
                ),
            ));
        }
        if self.effects.max_pool_size < self.effects.initial_pool_size {
            return Err(invalid(
                "effects.maxPoolSize",
                format!(
                    "expected at least initialPoolSize ({}), got {}",
                    self.effects.initial_pool_size, self.effects.max_pool_size
                ),
            ));
        }
        if self.persistence.save_file_name.trim().is_empty() {
            return Err(invalid(
                "persistence.saveFileName",
                "expected a file name".to_string(),
            ));
        }

        let mut issues = Vec::new();
        if self.item_prefabs.is_empty() {
            issues.push(ConfigIssue::NoItemPrefabs);
        }
        if self.threshold_line.is_none() {
            issues.push(ConfigIssue::NoThresholdLine);
        }
        if self.effects.reward_prefabs.is_none() {
            issues.push(ConfigIssue::NoRewardPrefabs);
        }
        Ok(issues)
    }
}

fn invalid(field: &'static str, message: String) -> ConfigError {
    ConfigError::Invalid { field, message }
}

pub(crate) fn seconds(value: f32) -> Duration {
    Duration::from_secs_f32(value.max(0.0))
}

pub(crate) fn load_config(path: &Path) -> Result<GameConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_json(path, &raw)
}

pub(crate) fn parse_config_json(path: &Path, raw: &str) -> Result<GameConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, GameConfig>(&mut deserializer).map_err(|error| {
        let json_path = error.path().to_string();
        ConfigError::Parse {
            path: path.to_path_buf(),
            json_path,
            source: error.into_inner(),
        }
    })
}
