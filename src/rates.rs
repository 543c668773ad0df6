use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// Shared character-banner constants; weapon base rate and 50/50 odds vary per game.
pub const COMMON_CHARACTER_BASE_RATE: f64 = 0.006;
pub const COMMON_SOFT_PITY_INCREMENT: f64 = 0.062;
pub const COMMON_CHARACTER_SOFT_PITY: u32 = 74;
pub const COMMON_CHARACTER_HARD_PITY: u32 = 90;
pub const COMMON_WEAPON_SOFT_PITY: u32 = 64;
pub const COMMON_WEAPON_HARD_PITY: u32 = 80;

/// Which banner a pull's 5-star roll is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Character,
    Weapon,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Character => write!(f, "character"),
            Category::Weapon => write!(f, "weapon"),
        }
    }
}

/// Per-game rate table. Fields left out of a JSON table fall back to the
/// shared constants above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRates {
    #[serde(default = "GameRates::default_character_rate")]
    pub base_character_rate: f64,
    pub base_weapon_rate: f64,
    #[serde(default = "GameRates::default_increment")]
    pub soft_pity_increment: f64,
    #[serde(default = "GameRates::default_character_soft")]
    pub character_soft_pity_start: u32,
    #[serde(default = "GameRates::default_character_hard")]
    pub character_hard_pity: u32,
    #[serde(default = "GameRates::default_weapon_soft")]
    pub weapon_soft_pity_start: u32,
    #[serde(default = "GameRates::default_weapon_hard")]
    pub weapon_hard_pity: u32,
    pub limited_character_chance: f64,
    pub limited_weapon_chance: f64,
}

/// The slice of a rate table that governs one category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryRates {
    pub base_rate: f64,
    pub soft_pity_increment: f64,
    pub soft_pity_start: u32,
    pub hard_pity: u32,
    pub limited_chance: f64,
}

impl CategoryRates {
    /// Chance of a 5-star on the next pull given `pity` pulls since the last one.
    /// Not clamped: past soft pity the ramp may exceed 1, which still always hits.
    #[inline]
    pub fn five_star_chance(&self, pity: u32) -> f64 {
        self.base_rate + self.soft_pity_increment * pity.saturating_sub(self.soft_pity_start) as f64
    }

    /// The pull taken at counter `hard_pity - 1` is the forced one.
    #[inline]
    pub fn forces_five_star(&self, pity: u32) -> bool {
        pity + 1 >= self.hard_pity
    }
}

impl GameRates {
    const fn default_character_rate() -> f64 {
        COMMON_CHARACTER_BASE_RATE
    }

    const fn default_increment() -> f64 {
        COMMON_SOFT_PITY_INCREMENT
    }

    const fn default_character_soft() -> u32 {
        COMMON_CHARACTER_SOFT_PITY
    }

    const fn default_character_hard() -> u32 {
        COMMON_CHARACTER_HARD_PITY
    }

    const fn default_weapon_soft() -> u32 {
        COMMON_WEAPON_SOFT_PITY
    }

    const fn default_weapon_hard() -> u32 {
        COMMON_WEAPON_HARD_PITY
    }

    /// Table with the shared pity constants and game-specific weapon/limited odds.
    pub fn hoyo(
        base_weapon_rate: f64,
        limited_character_chance: f64,
        limited_weapon_chance: f64,
    ) -> Self {
        Self {
            base_character_rate: COMMON_CHARACTER_BASE_RATE,
            base_weapon_rate,
            soft_pity_increment: COMMON_SOFT_PITY_INCREMENT,
            character_soft_pity_start: COMMON_CHARACTER_SOFT_PITY,
            character_hard_pity: COMMON_CHARACTER_HARD_PITY,
            weapon_soft_pity_start: COMMON_WEAPON_SOFT_PITY,
            weapon_hard_pity: COMMON_WEAPON_HARD_PITY,
            limited_character_chance,
            limited_weapon_chance,
        }
    }

    pub fn category(&self, category: Category) -> CategoryRates {
        match category {
            Category::Character => CategoryRates {
                base_rate: self.base_character_rate,
                soft_pity_increment: self.soft_pity_increment,
                soft_pity_start: self.character_soft_pity_start,
                hard_pity: self.character_hard_pity,
                limited_chance: self.limited_character_chance,
            },
            Category::Weapon => CategoryRates {
                base_rate: self.base_weapon_rate,
                soft_pity_increment: self.soft_pity_increment,
                soft_pity_start: self.weapon_soft_pity_start,
                hard_pity: self.weapon_hard_pity,
                limited_chance: self.limited_weapon_chance,
            },
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let probabilities = [
            ("base_character_rate", self.base_character_rate),
            ("base_weapon_rate", self.base_weapon_rate),
            ("soft_pity_increment", self.soft_pity_increment),
            ("limited_character_chance", self.limited_character_chance),
            ("limited_weapon_chance", self.limited_weapon_chance),
        ];
        for (field, value) in probabilities {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(SimError::InvalidProbability { field, value });
            }
        }

        for category in [Category::Character, Category::Weapon] {
            let rates = self.category(category);
            if rates.hard_pity == 0 {
                return Err(SimError::ZeroHardPity { category });
            }
            if rates.soft_pity_start > rates.hard_pity {
                return Err(SimError::SoftPityAfterHardPity {
                    category,
                    soft: rates.soft_pity_start,
                    hard: rates.hard_pity,
                });
            }
        }
        Ok(())
    }
}

/// Immutable game-name -> rate table mapping, consulted once when a run is configured.
#[derive(Debug, Clone)]
pub struct RateBook {
    tables: HashMap<String, GameRates>,
}

impl RateBook {
    pub fn builtin() -> Self {
        let tables = HashMap::from([
            ("hsr".to_string(), GameRates::hoyo(0.008, 0.5, 0.75)),
            ("genshin".to_string(), GameRates::hoyo(0.007, 0.55, 0.75)),
            ("zzz".to_string(), GameRates::hoyo(0.01, 0.5, 0.75)),
        ]);
        Self { tables }
    }

    /// Built-in tables plus `extra`; an extra table replaces a built-in of the same name.
    pub fn with_overrides(extra: &BTreeMap<String, GameRates>) -> Self {
        let mut book = Self::builtin();
        for (name, rates) in extra {
            book.tables.insert(name.to_lowercase(), rates.clone());
        }
        book
    }

    /// Case-insensitive. Unknown games yield `None`.
    pub fn lookup(&self, game: &str) -> Option<&GameRates> {
        self.tables.get(&game.trim().to_lowercase())
    }

    /// Like `lookup`, but an unknown game is a configuration error.
    pub fn resolve(&self, game: &str) -> Result<GameRates, SimError> {
        self.lookup(game)
            .cloned()
            .ok_or_else(|| SimError::UnknownGame(game.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
