//! Game configuration: map, rounds, archetypes and balance tables.
//!
//! Everything here is plain data loaded once at startup. Files are RON;
//! every field has a default, so a file only needs the values it changes.
//!
//! ```ron
//! (
//!     seed: 7,
//!     starting_gold: 500,
//!     rounds: {
//!         1: (creep_type: fast, difficulty: 1, count: 5, spawn_interval: 1.0),
//!     },
//! )
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::creep::CreepType;
use crate::error::ConfigError;
use crate::math::{fixed_serde, percent, Fixed, Vec3Fixed};
use crate::tower::{TowerType, MAX_RANK};

// ============================================================================
// Map
// ============================================================================

/// A fixed route from a spawn point to the king.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDefinition {
    /// Where creeps appear.
    pub spawn: Vec3Fixed,
    /// Waypoints in walking order; the last one is the goal.
    pub waypoints: Vec<Vec3Fixed>,
}

// ============================================================================
// Rounds and creeps
// ============================================================================

/// One scheduled wave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundDefinition {
    /// Archetype spawned this round.
    pub creep_type: CreepType,
    /// Difficulty level, 1 or higher. Scales creep health.
    pub difficulty: u32,
    /// Number of creeps.
    pub count: u32,
    /// Seconds between spawns.
    #[serde(with = "fixed_serde")]
    pub spawn_interval: Fixed,
    /// Pin every creep to this path instead of choosing randomly.
    #[serde(default)]
    pub path: Option<usize>,
}

/// Base stats for a creep type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreepArchetype {
    /// Health at difficulty 1.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,
    /// Walking speed in units per second.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Damage dealt to the king on arrival.
    pub damage_to_king: u32,
    /// Gold granted on kill.
    pub gold_value: u32,
}

// ============================================================================
// Towers
// ============================================================================

/// Stats for one tower rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankStats {
    /// Gold to reach this rank (build cost for rank 1).
    pub cost: u32,
    /// Damage per projectile.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,
    /// Seconds between attacks.
    #[serde(with = "fixed_serde")]
    pub attack_interval: Fixed,
    /// Targeting radius.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Slow applied on hit (frost).
    #[serde(default, with = "fixed_serde")]
    pub slow_amount: Fixed,
    /// Chance to crit per shot (fire).
    #[serde(default, with = "fixed_serde")]
    pub crit_chance: Fixed,
}

/// Definition of a tower type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerDefinition {
    /// Damage multiplier on a critical hit.
    #[serde(with = "fixed_serde")]
    pub crit_multiplier: Fixed,
    /// Projectile travel speed.
    #[serde(with = "fixed_serde")]
    pub projectile_speed: Fixed,
    /// Stat table indexed by `rank - 1`.
    pub ranks: Vec<RankStats>,
}

impl TowerDefinition {
    /// Highest rank this tower can reach.
    #[must_use]
    pub fn max_rank(&self) -> u8 {
        u8::try_from(self.ranks.len()).unwrap_or(u8::MAX)
    }

    /// Stats for a rank (1-based).
    #[must_use]
    pub fn rank(&self, rank: u8) -> Option<&RankStats> {
        usize::from(rank)
            .checked_sub(1)
            .and_then(|index| self.ranks.get(index))
    }
}

// ============================================================================
// Combat, augments, workers
// ============================================================================

/// Projectile resolution and effect timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Projectile-to-target distance that counts as an impact.
    #[serde(with = "fixed_serde")]
    pub impact_epsilon: Fixed,
    /// Seconds a frost slow lasts.
    #[serde(with = "fixed_serde")]
    pub slow_duration: Fixed,
    /// Seconds a burn lasts.
    #[serde(with = "fixed_serde")]
    pub burn_duration: Fixed,
    /// Burn damage per second as a percent of the critical hit.
    pub burn_percent: u32,
    /// Seconds an impact effect stays in the scene.
    #[serde(with = "fixed_serde")]
    pub impact_lifetime: Fixed,
    /// Seconds a floating damage number stays in the scene.
    #[serde(with = "fixed_serde")]
    pub floating_text_lifetime: Fixed,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            impact_epsilon: percent(50),
            slow_duration: Fixed::from_num(5),
            burn_duration: Fixed::from_num(3),
            burn_percent: 5,
            impact_lifetime: percent(30),
            floating_text_lifetime: Fixed::ONE,
        }
    }
}

/// When and how augments are offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Rounds preceded by an augment offer.
    pub offer_rounds: Vec<u32>,
    /// Maximum simultaneously active augments.
    pub max_active: usize,
    /// Augments per offer.
    pub offer_size: usize,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            offer_rounds: vec![3, 6, 9],
            max_active: 3,
            offer_size: 3,
        }
    }
}

/// Worker hiring and mining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Cost of the first worker.
    pub base_cost: u32,
    /// Added to the cost for every worker already hired.
    pub cost_increment: u32,
    /// Maximum number of workers.
    pub max_workers: usize,
    /// Walking speed.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Seconds per mining cycle.
    #[serde(with = "fixed_serde")]
    pub mining_interval: Fixed,
    /// Gold per mining cycle before modifiers.
    pub gold_per_cycle: u32,
    /// Where new workers appear.
    pub spawn_point: Vec3Fixed,
    /// Mineable resource positions; one worker per node.
    pub resource_nodes: Vec<Vec3Fixed>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            base_cost: 50,
            cost_increment: 25,
            max_workers: 4,
            speed: Fixed::from_num(3),
            mining_interval: Fixed::from_num(5),
            gold_per_cycle: 5,
            spawn_point: Vec3Fixed::from_ints(0, 0, 4),
            resource_nodes: vec![
                Vec3Fixed::from_ints(-8, 0, -16),
                Vec3Fixed::from_ints(8, 0, 16),
                Vec3Fixed::from_ints(-16, 0, 18),
                Vec3Fixed::from_ints(16, 0, -18),
            ],
        }
    }
}

// ============================================================================
// Game config
// ============================================================================

/// Complete configuration of one game session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Seed of the simulation RNG.
    pub seed: u64,
    /// Gold at game start.
    pub starting_gold: u32,
    /// King health at game start.
    pub king_max_health: u32,
    /// Rounds to clear for victory.
    pub max_rounds: u32,
    /// Countdown before round 1.
    #[serde(with = "fixed_serde")]
    pub first_round_delay: Fixed,
    /// Countdown between rounds.
    #[serde(with = "fixed_serde")]
    pub inter_round_delay: Fixed,
    /// Upper clamp for a tick's delta.
    #[serde(with = "fixed_serde")]
    pub max_tick_delta: Fixed,
    /// Percent of invested gold refunded on sale.
    pub sell_refund_percent: u32,
    /// Gold granted for clearing a round.
    pub round_clear_bonus: u32,
    /// Extra creep health per difficulty level above 1, in percent.
    pub difficulty_health_percent: u32,
    /// Distance at which a creep counts as having reached a waypoint.
    #[serde(with = "fixed_serde")]
    pub waypoint_epsilon: Fixed,
    /// Projectile and effect settings.
    pub combat: CombatConfig,
    /// Augment offers.
    pub augments: AugmentConfig,
    /// Worker settings.
    pub workers: WorkerConfig,
    /// Creep routes.
    pub paths: Vec<PathDefinition>,
    /// Round definitions by round number.
    pub rounds: BTreeMap<u32, RoundDefinition>,
    /// Creep archetypes.
    pub creeps: BTreeMap<CreepType, CreepArchetype>,
    /// Tower definitions.
    pub towers: BTreeMap<TowerType, TowerDefinition>,
    /// Build slot positions.
    pub tower_slots: Vec<Vec3Fixed>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            starting_gold: 150,
            king_max_health: 20,
            max_rounds: 10,
            first_round_delay: Fixed::from_num(10),
            inter_round_delay: Fixed::from_num(15),
            max_tick_delta: percent(10),
            sell_refund_percent: 50,
            round_clear_bonus: 20,
            difficulty_health_percent: 50,
            waypoint_epsilon: percent(10),
            combat: CombatConfig::default(),
            augments: AugmentConfig::default(),
            workers: WorkerConfig::default(),
            paths: default_paths(),
            rounds: default_rounds(),
            creeps: default_creeps(),
            towers: default_towers(),
            tower_slots: vec![
                Vec3Fixed::from_ints(-25, 0, 4),
                Vec3Fixed::from_ints(-15, 0, 4),
                Vec3Fixed::from_ints(-10, 0, 14),
                Vec3Fixed::from_ints(-4, 0, 5),
                Vec3Fixed::from_ints(25, 0, -4),
                Vec3Fixed::from_ints(15, 0, -4),
                Vec3Fixed::from_ints(10, 0, -14),
                Vec3Fixed::from_ints(4, 0, -5),
            ],
        }
    }
}

fn default_paths() -> Vec<PathDefinition> {
    vec![
        PathDefinition {
            spawn: Vec3Fixed::from_ints(-30, 0, 0),
            waypoints: vec![
                Vec3Fixed::from_ints(-20, 0, 0),
                Vec3Fixed::from_ints(-20, 0, 10),
                Vec3Fixed::from_ints(0, 0, 10),
                Vec3Fixed::from_ints(0, 0, 0),
            ],
        },
        PathDefinition {
            spawn: Vec3Fixed::from_ints(30, 0, 0),
            waypoints: vec![
                Vec3Fixed::from_ints(20, 0, 0),
                Vec3Fixed::from_ints(20, 0, -10),
                Vec3Fixed::from_ints(0, 0, -10),
                Vec3Fixed::from_ints(0, 0, 0),
            ],
        },
    ]
}

fn round(creep_type: CreepType, difficulty: u32, count: u32, interval_percent: u32) -> RoundDefinition {
    RoundDefinition {
        creep_type,
        difficulty,
        count,
        spawn_interval: percent(interval_percent),
        path: None,
    }
}

fn default_rounds() -> BTreeMap<u32, RoundDefinition> {
    use CreepType::{Armored, Boss, Fast, Swarm};
    BTreeMap::from([
        (1, round(Fast, 1, 8, 100)),
        (2, round(Swarm, 1, 12, 60)),
        (3, round(Armored, 1, 6, 150)),
        (4, round(Fast, 2, 10, 90)),
        (5, round(Boss, 1, 1, 100)),
        (6, round(Swarm, 2, 16, 50)),
        (7, round(Armored, 2, 8, 120)),
        (8, round(Fast, 3, 14, 70)),
        (9, round(Swarm, 3, 20, 40)),
        (10, round(Boss, 2, 2, 400)),
    ])
}

fn creep(health: i32, speed_percent: u32, damage_to_king: u32, gold_value: u32) -> CreepArchetype {
    CreepArchetype {
        health: Fixed::from_num(health),
        speed: percent(speed_percent),
        damage_to_king,
        gold_value,
    }
}

fn default_creeps() -> BTreeMap<CreepType, CreepArchetype> {
    BTreeMap::from([
        (CreepType::Fast, creep(40, 400, 1, 5)),
        (CreepType::Armored, creep(120, 160, 2, 10)),
        (CreepType::Swarm, creep(20, 300, 1, 2)),
        (CreepType::Boss, creep(600, 120, 10, 50)),
    ])
}

/// Rank row: cost, damage, interval %, range %, slow %, crit %.
type RankRow = (u32, i32, u32, u32, u32, u32);

fn ranks(rows: [RankRow; MAX_RANK as usize]) -> Vec<RankStats> {
    rows.iter()
        .map(|&(cost, damage, interval, range, slow, crit)| RankStats {
            cost,
            damage: Fixed::from_num(damage),
            attack_interval: percent(interval),
            range: percent(range),
            slow_amount: percent(slow),
            crit_chance: percent(crit),
        })
        .collect()
}

fn default_towers() -> BTreeMap<TowerType, TowerDefinition> {
    BTreeMap::from([
        (
            TowerType::Basic,
            TowerDefinition {
                crit_multiplier: percent(150),
                projectile_speed: Fixed::from_num(20),
                ranks: ranks([
                    (50, 10, 100, 800, 0, 0),
                    (40, 14, 90, 850, 0, 0),
                    (60, 19, 80, 900, 0, 0),
                    (90, 26, 70, 950, 0, 0),
                    (130, 35, 60, 1000, 0, 0),
                ]),
            },
        ),
        (
            TowerType::Frost,
            TowerDefinition {
                crit_multiplier: percent(150),
                projectile_speed: Fixed::from_num(16),
                ranks: ranks([
                    (75, 4, 120, 700, 20, 0),
                    (50, 5, 110, 750, 25, 0),
                    (75, 7, 100, 800, 30, 0),
                    (110, 9, 90, 850, 40, 0),
                    (150, 12, 80, 900, 50, 0),
                ]),
            },
        ),
        (
            TowerType::Fire,
            TowerDefinition {
                crit_multiplier: percent(200),
                projectile_speed: Fixed::from_num(18),
                ranks: ranks([
                    (100, 15, 150, 700, 0, 15),
                    (70, 20, 140, 750, 0, 18),
                    (100, 27, 130, 800, 0, 21),
                    (140, 36, 120, 850, 0, 25),
                    (200, 48, 100, 900, 0, 30),
                ]),
            },
        ),
    ])
}

impl GameConfig {
    /// Parse a config from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load a config from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron_str(&text)
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Archetype for a creep type.
    pub fn creep(&self, creep_type: CreepType) -> Result<&CreepArchetype, ConfigError> {
        self.creeps
            .get(&creep_type)
            .ok_or_else(|| ConfigError::MissingCreepType(creep_type.name().to_string()))
    }

    /// Definition for a tower type.
    pub fn tower(&self, tower_type: TowerType) -> Result<&TowerDefinition, ConfigError> {
        self.towers
            .get(&tower_type)
            .ok_or(ConfigError::MissingTower(tower_type))
    }

    /// Round numbers in `1..=max_rounds` with no definition.
    #[must_use]
    pub fn missing_rounds(&self) -> Vec<u32> {
        (1..=self.max_rounds)
            .filter(|n| !self.rounds.contains_key(n))
            .collect()
    }

    /// Check the config for structural problems.
    ///
    /// Every problem is collected; a missing round definition is not one
    /// of them, since it only stops that round from starting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.max_rounds == 0 {
            problems.push("max_rounds must be at least 1".to_string());
        }
        if self.king_max_health == 0 {
            problems.push("king_max_health must be at least 1".to_string());
        }
        if self.max_tick_delta <= Fixed::ZERO {
            problems.push("max_tick_delta must be positive".to_string());
        }
        if self.sell_refund_percent > 100 {
            problems.push(format!(
                "sell_refund_percent {} exceeds 100",
                self.sell_refund_percent
            ));
        }
        if self.combat.impact_epsilon <= Fixed::ZERO {
            problems.push("combat.impact_epsilon must be positive".to_string());
        }

        if self.paths.is_empty() {
            problems.push("at least one path is required".to_string());
        }
        for (index, path) in self.paths.iter().enumerate() {
            if path.waypoints.is_empty() {
                problems.push(format!("path {index} has no waypoints"));
            }
        }

        for (number, round) in &self.rounds {
            if round.difficulty == 0 {
                problems.push(format!("round {number}: difficulty must be at least 1"));
            }
            if round.spawn_interval <= Fixed::ZERO {
                problems.push(format!("round {number}: spawn_interval must be positive"));
            }
            if !self.creeps.contains_key(&round.creep_type) {
                problems.push(format!(
                    "round {number}: no archetype for creep type {}",
                    round.creep_type
                ));
            }
            if let Some(path) = round.path {
                if path >= self.paths.len() {
                    problems.push(format!("round {number}: path {path} does not exist"));
                }
            }
        }

        for (creep_type, archetype) in &self.creeps {
            if archetype.health <= Fixed::ZERO {
                problems.push(format!("creep {creep_type}: health must be positive"));
            }
        }

        for tower_type in TowerType::ALL {
            let Some(definition) = self.towers.get(&tower_type) else {
                problems.push(format!("tower {tower_type}: missing definition"));
                continue;
            };
            let rank_count = definition.ranks.len();
            if rank_count == 0 || rank_count > usize::from(MAX_RANK) {
                problems.push(format!(
                    "tower {tower_type}: expected 1 to {MAX_RANK} ranks, found {rank_count}"
                ));
            }
            for (index, stats) in definition.ranks.iter().enumerate() {
                if stats.attack_interval <= Fixed::ZERO {
                    problems.push(format!(
                        "tower {tower_type} rank {}: attack_interval must be positive",
                        index + 1
                    ));
                }
            }
        }

        if self.workers.max_workers > 0 && self.workers.mining_interval <= Fixed::ZERO {
            problems.push("workers.mining_interval must be positive".to_string());
        }
        if self.augments.offer_size == 0 && !self.augments.offer_rounds.is_empty() {
            problems.push("augments.offer_size must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}
