//! Scenario loading and configuration.
//!
//! A scenario is a game config plus a script of player actions keyed by
//! tick, used for reproducible headless runs and balance batches.

use std::path::Path;

use serde::{Deserialize, Serialize};
use td_core::config::GameConfig;
use td_core::error::ConfigError;
use td_core::tower::TowerType;
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The embedded game config is invalid.
    #[error("Scenario config is invalid: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// A scripted player action. Towers are addressed by slot so scripts do not
/// depend on id assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioAction {
    /// Build a tower.
    Build {
        /// Slot index.
        slot: usize,
        /// Tower type.
        tower_type: TowerType,
    },
    /// Upgrade the tower on a slot.
    Upgrade {
        /// Slot index.
        slot: usize,
    },
    /// Sell the tower on a slot.
    Sell {
        /// Slot index.
        slot: usize,
    },
    /// Hire a worker.
    HireWorker,
    /// Skip the countdown.
    NextRound,
}

/// An action scheduled for a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedAction {
    /// Tick before which the action is applied.
    pub tick: u64,
    /// The action.
    pub action: ScenarioAction,
}

/// A complete scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Game config. Omitted fields take their defaults.
    pub config: GameConfig,
    /// Tick length in milliseconds.
    pub tick_ms: u32,
    /// Give up after this many ticks.
    pub max_ticks: u64,
    /// Pick the first offered augment automatically.
    pub auto_augment: bool,
    /// Scripted actions.
    pub actions: Vec<TimedAction>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            description: "Default config, no player actions".to_string(),
            config: GameConfig::default(),
            tick_ms: 100,
            max_ticks: 36_000, // 1 hour at 10 tps
            auto_augment: true,
            actions: Vec::new(),
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string and validate the embedded config.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        scenario.config.validate()?;
        Ok(scenario)
    }

    /// A small scripted defence of the default map.
    #[must_use]
    pub fn standard_defence() -> Self {
        let at = |tick, action| TimedAction { tick, action };
        Self {
            name: "Standard Defence".to_string(),
            description: "Opening build on both lanes with upgrades and a worker".to_string(),
            actions: vec![
                at(0, ScenarioAction::Build { slot: 0, tower_type: TowerType::Basic }),
                at(0, ScenarioAction::Build { slot: 4, tower_type: TowerType::Basic }),
                at(5, ScenarioAction::HireWorker),
                at(300, ScenarioAction::Build { slot: 3, tower_type: TowerType::Frost }),
                at(600, ScenarioAction::Build { slot: 7, tower_type: TowerType::Frost }),
                at(900, ScenarioAction::Upgrade { slot: 0 }),
                at(900, ScenarioAction::Upgrade { slot: 4 }),
                at(1200, ScenarioAction::Build { slot: 2, tower_type: TowerType::Fire }),
                at(1500, ScenarioAction::Build { slot: 6, tower_type: TowerType::Fire }),
                at(1800, ScenarioAction::Upgrade { slot: 3 }),
                at(1800, ScenarioAction::Upgrade { slot: 7 }),
            ],
            ..Self::default()
        }
    }

    /// Look up a built-in scenario by name.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "standard_defence" => Some(Self::standard_defence()),
            _ => None,
        }
    }

    /// Load `name_or_path` as a built-in name, falling back to a file path.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match Self::builtin(name_or_path) {
            Some(scenario) => Ok(scenario),
            None => Self::load(name_or_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_ron_uses_defaults() {
        let scenario = Scenario::from_ron_str(r#"(name: "tiny", max_ticks: 50)"#).unwrap();
        assert_eq!(scenario.name, "tiny");
        assert_eq!(scenario.max_ticks, 50);
        assert_eq!(scenario.tick_ms, 100);
        assert_eq!(scenario.config, GameConfig::default());
    }

    #[test]
    fn test_actions_parse() {
        let ron = r#"(
            config: (starting_gold: 500, seed: 7),
            actions: [
                (tick: 0, action: Build(slot: 1, tower_type: frost)),
                (tick: 20, action: HireWorker),
            ],
        )"#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.config.starting_gold, 500);
        assert_eq!(scenario.config.seed, 7);
        assert_eq!(
            scenario.actions[0].action,
            ScenarioAction::Build {
                slot: 1,
                tower_type: TowerType::Frost
            }
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Scenario::from_ron_str("(config: (max_rounds: 0))").unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::load("/definitely/not/here.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_builtins_resolve() {
        assert!(Scenario::builtin("standard_defence").is_some());
        assert!(Scenario::builtin("nope").is_none());
    }
}
