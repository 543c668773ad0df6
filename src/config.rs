use crate::error::SimError;
use crate::rates::{Category, GameRates, RateBook};
use crate::sim::DEFAULT_CHUNK_SIZE;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "data/config.json";

// --- Application configuration (data/config.json) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Game used when the command line does not name one.
    pub game: String,
    pub trial_count: usize,
    pub seed: Option<u64>,
    /// Trials per work unit; each unit owns one RNG stream.
    pub chunk_size: usize,
    pub worker_max_threads: usize,
    pub worker_reserve_cores: usize,
    pub worker_stack_size_mb: usize,
    /// Extra or replacement rate tables, keyed by game name.
    pub games: BTreeMap<String, GameRates>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            game: "genshin".to_string(),
            trial_count: 100_000,
            seed: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            worker_max_threads: 0,
            worker_reserve_cores: 1,
            worker_stack_size_mb: 4,
            games: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads `path`, retrying `../../<path>` for binaries launched from `target/`.
    /// A missing file at the default location falls back to built-in defaults;
    /// a missing file the caller asked for explicitly is an error.
    pub fn load(path: &str, explicit: bool) -> Result<Self, SimError> {
        let primary = PathBuf::from(path);
        let alt = Path::new("../..").join(path);

        let found = if primary.is_file() {
            Some(primary.clone())
        } else if alt.is_file() {
            info!("[Config] Found in parent directory: {}", alt.display());
            Some(alt)
        } else {
            None
        };

        match found {
            Some(p) => Self::from_file(&p),
            None if explicit => Err(SimError::ConfigFile {
                path: primary,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            }),
            None => {
                warn!("[Config] {} not found, using defaults", path);
                Ok(Config::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        let contents = fs::read_to_string(path).map_err(|source| SimError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_json::from_str(&contents).map_err(|source| SimError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            "[Config] Loaded {} ({} custom rate table(s))",
            path.display(),
            config.games.len()
        );
        Ok(config)
    }

    pub fn rate_book(&self) -> RateBook {
        RateBook::with_overrides(&self.games)
    }
}

// --- Per-run simulation input ---

/// Everything one estimate needs. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub pull_budget: u32,
    pub starting_character_pity: u32,
    pub starting_weapon_pity: u32,
    pub character_guaranteed: bool,
    pub weapon_guaranteed: bool,
    pub character_target: u32,
    pub weapon_target: u32,
    pub trial_count: usize,
    /// Master seed; `None` seeds from the clock.
    pub seed: Option<u64>,
    pub rates: GameRates,
}

impl SimulationConfig {
    /// Fresh account (no pity, no guarantees) chasing `character_target`
    /// limited characters within `pull_budget` pulls.
    pub fn new(
        rates: GameRates,
        pull_budget: u32,
        character_target: u32,
        trial_count: usize,
    ) -> Self {
        SimulationConfig {
            pull_budget,
            starting_character_pity: 0,
            starting_weapon_pity: 0,
            character_guaranteed: false,
            weapon_guaranteed: false,
            character_target,
            weapon_target: 0,
            trial_count,
            seed: None,
            rates,
        }
    }

    pub fn starting_pity(&self, category: Category) -> u32 {
        match category {
            Category::Character => self.starting_character_pity,
            Category::Weapon => self.starting_weapon_pity,
        }
    }

    pub fn target(&self, category: Category) -> u32 {
        match category {
            Category::Character => self.character_target,
            Category::Weapon => self.weapon_target,
        }
    }

    /// Nothing to win: every trial succeeds without pulling.
    pub fn is_trivial(&self) -> bool {
        self.character_target == 0 && self.weapon_target == 0
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.trial_count == 0 {
            return Err(SimError::ZeroTrials);
        }
        self.rates.validate()?;
        for category in [Category::Character, Category::Weapon] {
            let pity = self.starting_pity(category);
            let hard = self.rates.category(category).hard_pity;
            if pity >= hard {
                return Err(SimError::StartingPityTooHigh { category, pity, hard });
            }
        }
        Ok(())
    }
}
