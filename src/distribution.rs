//! Distribution of pulls needed for the next 5-star of one category.
//!
//! The simulated histogram is what gets exported; the exact pmf is the
//! single-event case the pity ramp does admit in closed form, used for
//! reporting expected pulls and for checking the simulation.

use crate::error::SimError;
use crate::rates::{Category, CategoryRates, GameRates};
use crate::rng::Rng;
use crate::worker::TrialWorker;
use log::info;
use rayon::prelude::*;
use std::io::Write;

/// `pmf[k - 1]` is the probability that the next 5-star lands on pull `k`,
/// starting from `starting_pity`. Sums to 1: the last entry is the ceiling.
pub fn five_star_pmf(rates: &CategoryRates, starting_pity: u32) -> Vec<f64> {
    let mut pmf = Vec::new();
    let mut survival = 1.0;
    let mut pity = starting_pity;
    loop {
        let chance = if rates.forces_five_star(pity) {
            1.0
        } else {
            rates.five_star_chance(pity).min(1.0)
        };
        pmf.push(survival * chance);
        survival *= 1.0 - chance;
        if chance >= 1.0 {
            break;
        }
        pity += 1;
    }
    pmf
}

/// Mean pulls until the next 5-star from `starting_pity`.
pub fn expected_pulls_to_five_star(rates: &CategoryRates, starting_pity: u32) -> f64 {
    five_star_pmf(rates, starting_pity)
        .iter()
        .enumerate()
        .map(|(i, p)| (i + 1) as f64 * p)
        .sum()
}

/// Pulls spent until the category's next 5-star.
pub fn pulls_until_five_star(rates: &CategoryRates, starting_pity: u32, rng: &mut Rng) -> u32 {
    let mut pity = starting_pity;
    let mut pulls = 0;
    loop {
        pulls += 1;
        if rng.next_f64() < rates.five_star_chance(pity) || rates.forces_five_star(pity) {
            return pulls;
        }
        pity += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionRow {
    pub pulls: u32,
    pub frequency: u64,
    pub percentage: f64,
    pub cumulative_frequency: u64,
    pub cumulative_probability: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullDistribution {
    pub category: Category,
    pub starting_pity: u32,
    pub trials: u64,
    /// `counts[k - 1]`: trials whose 5-star landed on pull `k`.
    pub counts: Vec<u64>,
}

impl PullDistribution {
    /// Only pull counts that actually occurred, like the frequency tables the
    /// calculator front ends consume.
    pub fn rows(&self) -> Vec<DistributionRow> {
        let n = self.trials as f64;
        let mut cumulative = 0;
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .map(|(i, &frequency)| {
                cumulative += frequency;
                DistributionRow {
                    pulls: i as u32 + 1,
                    frequency,
                    percentage: frequency as f64 / n * 100.0,
                    cumulative_frequency: cumulative,
                    cumulative_probability: cumulative as f64 / n * 100.0,
                }
            })
            .collect()
    }

    pub fn mean(&self) -> f64 {
        let total: u64 = self
            .counts
            .iter()
            .enumerate()
            .map(|(i, c)| (i as u64 + 1) * c)
            .sum();
        total as f64 / self.trials as f64
    }

    /// `pulls,frequency,percentage,cumulative_frequency,cumulative_probability`,
    /// percentages rounded to 4 decimals.
    pub fn write_csv<W: Write>(&self, mut out: W) -> Result<(), SimError> {
        writeln!(out, "pulls,frequency,percentage,cumulative_frequency,cumulative_probability")?;
        for row in self.rows() {
            writeln!(
                out,
                "{},{},{:.4},{},{:.4}",
                row.pulls,
                row.frequency,
                row.percentage,
                row.cumulative_frequency,
                row.cumulative_probability
            )?;
        }
        out.flush()?;
        Ok(())
    }
}

pub fn simulate_pull_distribution(
    rates: &GameRates,
    category: Category,
    starting_pity: u32,
    trials: usize,
    seed: Option<u64>,
    worker: &TrialWorker,
    chunk_size: usize,
) -> Result<PullDistribution, SimError> {
    if trials == 0 {
        return Err(SimError::ZeroTrials);
    }
    rates.validate()?;
    let cat_rates = rates.category(category);
    if starting_pity >= cat_rates.hard_pity {
        return Err(SimError::StartingPityTooHigh {
            category,
            pity: starting_pity,
            hard: cat_rates.hard_pity,
        });
    }

    let width = (cat_rates.hard_pity - starting_pity) as usize;
    let chunk_size = chunk_size.max(1);
    let chunk_count = (trials + chunk_size - 1) / chunk_size;
    let base_seed = match seed {
        Some(s) => Rng::from_seed(s),
        None => Rng::new(),
    }
    .next_u64();

    info!(
        "[Distribution] {} trials of {} pulls-to-5-star from pity {}",
        trials, category, starting_pity
    );

    let counts = worker.execute(|| {
        (0..chunk_count)
            .into_par_iter()
            .map(|chunk_idx| {
                let begin = chunk_idx * chunk_size;
                let end = (begin + chunk_size).min(trials);
                let mut local = vec![0u64; width];
                for trial_idx in begin..end {
                    let mut rng = Rng::stream(base_seed, trial_idx as u64);
                    let pulls = pulls_until_five_star(&cat_rates, starting_pity, &mut rng);
                    local[pulls as usize - 1] += 1;
                }
                local
            })
            .reduce(
                || vec![0u64; width],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            )
    })?;

    Ok(PullDistribution {
        category,
        starting_pity,
        trials: trials as u64,
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::RateBook;

    fn character_rates() -> CategoryRates {
        RateBook::builtin()
            .resolve("genshin")
            .unwrap()
            .category(Category::Character)
    }

    #[test]
    fn pmf_sums_to_one_and_ends_at_the_ceiling() {
        let rates = character_rates();
        let pmf = five_star_pmf(&rates, 0);
        assert_eq!(pmf.len(), 90);
        assert!((pmf.iter().sum::<f64>() - 1.0).abs() < 1e-12);

        let from_high = five_star_pmf(&rates, 85);
        assert_eq!(from_high.len(), 5);
        assert!((from_high.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn expected_pulls_match_known_values() {
        assert!((expected_pulls_to_five_star(&character_rates(), 0) - 63.495).abs() < 0.01);
        let weapon = RateBook::builtin()
            .resolve("genshin")
            .unwrap()
            .category(Category::Weapon);
        assert!((expected_pulls_to_five_star(&weapon, 0) - 55.298).abs() < 0.01);
    }

    #[test]
    fn pulls_never_exceed_the_ceiling() {
        let rates = character_rates();
        let mut rng = Rng::from_seed(21);
        for _ in 0..5_000 {
            let pulls = pulls_until_five_star(&rates, 0, &mut rng);
            assert!((1..=90).contains(&pulls));
        }
    }

    #[test]
    fn simulated_histogram_tracks_exact_pmf() {
        let rates = RateBook::builtin().resolve("hsr").unwrap();
        let worker = TrialWorker::new(2).unwrap();
        let dist = simulate_pull_distribution(
            &rates,
            Category::Character,
            0,
            200_000,
            Some(5),
            &worker,
            256,
        )
        .unwrap();
        assert_eq!(dist.counts.iter().sum::<u64>(), 200_000);

        let exact = expected_pulls_to_five_star(&rates.category(Category::Character), 0);
        assert!((dist.mean() - exact).abs() < 0.3, "{} vs {}", dist.mean(), exact);

        let pmf = five_star_pmf(&rates.category(Category::Character), 0);
        let cdf_74: f64 = pmf[..74].iter().sum();
        let sim_74 = dist.counts[..74].iter().sum::<u64>() as f64 / 200_000.0;
        assert!((cdf_74 - sim_74).abs() < 0.01);
    }

    #[test]
    fn rows_accumulate_to_one_hundred_percent() {
        let dist = PullDistribution {
            category: Category::Weapon,
            starting_pity: 0,
            trials: 4,
            counts: vec![1, 0, 2, 1],
        };
        let rows = dist.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].pulls, 3);
        assert_eq!(rows[1].cumulative_frequency, 3);
        assert_eq!(rows[2].cumulative_probability, 100.0);
        assert_eq!(dist.mean(), (1 + 6 + 4) as f64 / 4.0);

        let mut buf = Vec::new();
        dist.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "pulls,frequency,percentage,cumulative_frequency,cumulative_probability"
        );
        assert_eq!(lines[1], "1,1,25.0000,1,25.0000");
        assert_eq!(lines[3], "4,1,25.0000,4,100.0000");
    }

    #[test]
    fn rejects_pity_at_ceiling() {
        let rates = RateBook::builtin().resolve("zzz").unwrap();
        let worker = TrialWorker::new(1).unwrap();
        let err = simulate_pull_distribution(&rates, Category::Weapon, 80, 10, None, &worker, 8)
            .unwrap_err();
        assert!(matches!(err, SimError::StartingPityTooHigh { .. }));
    }
}
