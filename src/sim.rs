use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::rates::{Category, CategoryRates};
use crate::report::{EstimateReport, Tally};
use crate::rng::Rng;
use crate::worker::TrialWorker;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Pity, guarantee and copies won for one category within a trial.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BannerState {
    pub pity: u32,
    pub guaranteed: bool,
    pub successes: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrialState {
    pub pulls_remaining: u32,
    pub character: BannerState,
    pub weapon: BannerState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PullOutcome {
    pub category: Category,
    pub five_star: bool,
    pub limited: bool,
    /// The 5-star came from the hard pity ceiling rather than the roll.
    pub forced: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrialResult {
    pub succeeded: bool,
    pub character_copies: u32,
    pub weapon_copies: u32,
    /// Pull on which both targets were first satisfied.
    pub pulls_to_goal: Option<u32>,
    /// 5-stars that went to the standard pool.
    pub lost_splits: u32,
    pub hard_pity_hits: u32,
    pub weapon_pulls: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct SimControl {
    /// Stop pulling once both targets are met. Never changes whether a trial
    /// succeeds, only how many copies it ends with.
    pub stop_when_met: bool,
}

impl TrialState {
    pub fn new(config: &SimulationConfig) -> Self {
        TrialState {
            pulls_remaining: config.pull_budget,
            character: BannerState {
                pity: config.starting_character_pity,
                guaranteed: config.character_guaranteed,
                successes: 0,
            },
            weapon: BannerState {
                pity: config.starting_weapon_pity,
                guaranteed: config.weapon_guaranteed,
                successes: 0,
            },
        }
    }

    fn banner_mut(&mut self, category: Category) -> &mut BannerState {
        match category {
            Category::Character => &mut self.character,
            Category::Weapon => &mut self.weapon,
        }
    }

    /// Characters take the roll until their target is met; weapons get it after.
    pub fn owner(&self, config: &SimulationConfig) -> Category {
        if self.character.successes < config.target(Category::Character) {
            Category::Character
        } else {
            Category::Weapon
        }
    }

    pub fn goal_met(&self, config: &SimulationConfig) -> bool {
        self.character.successes >= config.target(Category::Character)
            && self.weapon.successes >= config.target(Category::Weapon)
    }
}

/// Resolves one 5-star of `banner`'s category: the limited item if guaranteed
/// or the split roll wins, otherwise the standard item and a guarantee.
#[inline]
fn resolve_five_star(banner: &mut BannerState, rates: &CategoryRates, split_roll: f64) -> bool {
    banner.pity = 0;
    if banner.guaranteed || split_roll < rates.limited_chance {
        banner.successes += 1;
        banner.guaranteed = false;
        true
    } else {
        banner.guaranteed = true;
        false
    }
}

/// One pull. Draws one value for the 5-star check and, on a 5-star, a second
/// independent value for the limited/standard split.
pub fn roll_one(state: &mut TrialState, config: &SimulationConfig, rng: &mut Rng) -> PullOutcome {
    let category = state.owner(config);
    let rates = config.rates.category(category);
    let banner = state.banner_mut(category);

    let rolled = rng.next_f64() < rates.five_star_chance(banner.pity);
    let five_star = rolled || rates.forces_five_star(banner.pity);

    let limited = if five_star {
        let split_roll = rng.next_f64();
        resolve_five_star(banner, &rates, split_roll)
    } else {
        banner.pity += 1;
        false
    };

    state.pulls_remaining -= 1;

    PullOutcome {
        category,
        five_star,
        limited,
        forced: five_star && !rolled,
    }
}

pub fn run_trial(config: &SimulationConfig, control: &SimControl, rng: &mut Rng) -> TrialResult {
    let mut state = TrialState::new(config);
    let mut result = TrialResult {
        pulls_to_goal: if state.goal_met(config) { Some(0) } else { None },
        ..TrialResult::default()
    };

    while state.pulls_remaining > 0 {
        if control.stop_when_met && result.pulls_to_goal.is_some() {
            break;
        }
        let outcome = roll_one(&mut state, config, rng);
        if outcome.category == Category::Weapon {
            result.weapon_pulls += 1;
        }
        if outcome.five_star && !outcome.limited {
            result.lost_splits += 1;
        }
        if outcome.forced {
            result.hard_pity_hits += 1;
        }
        if result.pulls_to_goal.is_none() && state.goal_met(config) {
            result.pulls_to_goal = Some(config.pull_budget - state.pulls_remaining);
        }
    }

    result.succeeded = state.goal_met(config);
    result.character_copies = state.character.successes;
    result.weapon_copies = state.weapon.successes;
    result
}

/// Shared flag checked between trials. Cancelling aborts the whole run; no
/// partial estimate is returned.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Cancels from a detached timer thread once `limit` has passed.
    pub fn cancel_after(&self, limit: Duration) {
        let token = self.clone();
        thread::spawn(move || {
            thread::sleep(limit);
            if !token.is_cancelled() {
                warn!("[Sim] Time limit of {:.2?} reached, cancelling run", limit);
                token.cancel();
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

fn base_seed(config: &SimulationConfig) -> u64 {
    let mut master = match config.seed {
        Some(seed) => Rng::from_seed(seed),
        None => Rng::new(),
    };
    master.next_u64()
}

/// Sequential reference estimator: the fraction of `trial_count` trials that
/// reach both targets. Trial `i` draws from stream `i`, so the result for a
/// given seed matches `run_estimate` exactly.
pub fn estimate_success_probability(config: &SimulationConfig) -> Result<f64, SimError> {
    config.validate()?;
    if config.is_trivial() {
        return Ok(1.0);
    }

    let base = base_seed(config);
    let control = SimControl { stop_when_met: true };
    let successes = (0..config.trial_count)
        .filter(|&i| {
            let mut rng = Rng::stream(base, i as u64);
            run_trial(config, &control, &mut rng).succeeded
        })
        .count();

    Ok(successes as f64 / config.trial_count as f64)
}

/// Parallel estimator with full statistics. Trials run to the end of their
/// budget so the copy counts in the report are the expected haul for the budget.
pub fn run_estimate(
    config: &SimulationConfig,
    worker: &TrialWorker,
    cancel: &CancelToken,
    chunk_size: usize,
) -> Result<EstimateReport, SimError> {
    config.validate()?;
    if config.is_trivial() {
        info!("[Sim] Both targets are zero; every trial succeeds trivially.");
        return Ok(EstimateReport::trivial(config.trial_count));
    }

    let num_trials = config.trial_count;
    let chunk_size = chunk_size.max(1);
    let chunk_count = (num_trials + chunk_size - 1) / chunk_size;
    let base = base_seed(config);
    let control = SimControl { stop_when_met: false };
    let completed = AtomicUsize::new(0);

    info!(
        "[Sim] {} trials x {} pulls on {} threads ({} chunks)",
        num_trials,
        config.pull_budget,
        worker.thread_count(),
        chunk_count
    );
    let start = Instant::now();

    let chunks: Result<Vec<Tally>, SimError> = worker.execute(|| {
        (0..chunk_count)
            .into_par_iter()
            .map(|chunk_idx| {
                let begin = chunk_idx * chunk_size;
                let end = (begin + chunk_size).min(num_trials);
                let mut tally = Tally::default();
                for trial_idx in begin..end {
                    if cancel.is_cancelled() {
                        return Err(SimError::Cancelled {
                            completed: completed.load(Ordering::Relaxed),
                        });
                    }
                    let mut rng = Rng::stream(base, trial_idx as u64);
                    tally.record(&run_trial(config, &control, &mut rng));
                }
                completed.fetch_add(end - begin, Ordering::Relaxed);
                Ok(tally)
            })
            .collect()
    })?;

    let tally = chunks?
        .into_iter()
        .fold(Tally::default(), |acc, t| acc.merge(&t));

    let elapsed = start.elapsed();
    info!(
        "[Sim] Done in {:.2?} ({:.0} trials/sec)",
        elapsed,
        num_trials as f64 / elapsed.as_secs_f64().max(1e-9)
    );
    debug!("[Sim] Tally: {:?}", tally);

    Ok(EstimateReport::from_tally(&tally))
}
