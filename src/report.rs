use crate::sim::TrialResult;
use std::fmt;

// z for a two-sided 95% interval
const Z_95: f64 = 1.959963984540054;

/// Integer running sums for a batch of trials; merging is exact, so reports do
/// not depend on how trials were split across threads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub trials: u64,
    pub successes: u64,
    pub character_copies: u64,
    pub weapon_copies: u64,
    pub pulls_to_goal: u64,
    pub lost_splits: u64,
    pub hard_pity_hits: u64,
    pub weapon_pulls: u64,
}

impl Tally {
    pub fn record(&mut self, result: &TrialResult) {
        self.trials += 1;
        self.character_copies += result.character_copies as u64;
        self.weapon_copies += result.weapon_copies as u64;
        if result.succeeded {
            self.successes += 1;
        }
        if let Some(pulls) = result.pulls_to_goal {
            self.pulls_to_goal += pulls as u64;
        }
        self.lost_splits += result.lost_splits as u64;
        self.hard_pity_hits += result.hard_pity_hits as u64;
        self.weapon_pulls += result.weapon_pulls as u64;
    }

    pub fn merge(&self, other: &Tally) -> Tally {
        Tally {
            trials: self.trials + other.trials,
            successes: self.successes + other.successes,
            character_copies: self.character_copies + other.character_copies,
            weapon_copies: self.weapon_copies + other.weapon_copies,
            pulls_to_goal: self.pulls_to_goal + other.pulls_to_goal,
            lost_splits: self.lost_splits + other.lost_splits,
            hard_pity_hits: self.hard_pity_hits + other.hard_pity_hits,
            weapon_pulls: self.weapon_pulls + other.weapon_pulls,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EstimateReport {
    pub trials: usize,
    pub successes: usize,
    /// Success fraction at full precision.
    pub probability: f64,
    pub std_error: f64,
    /// Wilson score interval, 95%.
    pub ci_low: f64,
    pub ci_high: f64,
    pub mean_character_copies: f64,
    pub mean_weapon_copies: f64,
    /// Mean pull on which the goal was met, over successful trials only.
    pub mean_pulls_to_goal: Option<f64>,
    pub mean_lost_splits: f64,
    pub mean_hard_pity_hits: f64,
    pub mean_weapon_pulls: f64,
}

impl EstimateReport {
    pub fn from_tally(tally: &Tally) -> Self {
        let n = tally.trials as f64;
        let probability = tally.successes as f64 / n;
        let (ci_low, ci_high) = wilson_interval(tally.successes, tally.trials);
        let mean_pulls_to_goal = if tally.successes == 0 {
            None
        } else {
            Some(tally.pulls_to_goal as f64 / tally.successes as f64)
        };

        EstimateReport {
            trials: tally.trials as usize,
            successes: tally.successes as usize,
            probability,
            std_error: (probability * (1.0 - probability) / n).sqrt(),
            ci_low,
            ci_high,
            mean_character_copies: tally.character_copies as f64 / n,
            mean_weapon_copies: tally.weapon_copies as f64 / n,
            mean_pulls_to_goal,
            mean_lost_splits: tally.lost_splits as f64 / n,
            mean_hard_pity_hits: tally.hard_pity_hits as f64 / n,
            mean_weapon_pulls: tally.weapon_pulls as f64 / n,
        }
    }

    /// Nothing was requested, so every trial succeeds on pull zero.
    pub fn trivial(trials: usize) -> Self {
        EstimateReport {
            trials,
            successes: trials,
            probability: 1.0,
            std_error: 0.0,
            ci_low: 1.0,
            ci_high: 1.0,
            mean_character_copies: 0.0,
            mean_weapon_copies: 0.0,
            mean_pulls_to_goal: Some(0.0),
            mean_lost_splits: 0.0,
            mean_hard_pity_hits: 0.0,
            mean_weapon_pulls: 0.0,
        }
    }
}

/// Wilson score interval; stays inside [0, 1] even at 0 or n successes.
pub fn wilson_interval(successes: u64, trials: u64) -> (f64, f64) {
    if trials == 0 {
        return (0.0, 1.0);
    }
    let n = trials as f64;
    let p = successes as f64 / n;
    let z2 = Z_95 * Z_95;
    let denom = 1.0 + z2 / n;
    let centre = (p + z2 / (2.0 * n)) / denom;
    let half = Z_95 * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denom;
    // Closed ends are exact at 0 or n successes.
    let low = if successes == 0 { 0.0 } else { (centre - half).max(0.0) };
    let high = if successes >= trials { 1.0 } else { (centre + half).min(1.0) };
    (low, high)
}

/// Percentage with `precision` decimals, e.g. `58.720000%`.
pub fn format_probability(probability: f64, precision: usize) -> String {
    format!("{:.*}%", precision, probability * 100.0)
}

impl fmt::Display for EstimateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = f.precision().unwrap_or(6);
        writeln!(
            f,
            "Success probability: {} ({} / {} trials)",
            format_probability(self.probability, precision),
            self.successes,
            self.trials
        )?;
        writeln!(
            f,
            "95% interval: {} - {} (std error {:.*})",
            format_probability(self.ci_low, precision.min(4)),
            format_probability(self.ci_high, precision.min(4)),
            precision,
            self.std_error
        )?;
        writeln!(
            f,
            "Expected limited copies: {:.3} character, {:.3} weapon",
            self.mean_character_copies, self.mean_weapon_copies
        )?;
        writeln!(
            f,
            "Per run: {:.3} lost 50/50s, {:.3} hard-pity 5-stars, {:.1} weapon banner pulls",
            self.mean_lost_splits, self.mean_hard_pity_hits, self.mean_weapon_pulls
        )?;
        match self.mean_pulls_to_goal {
            Some(pulls) => write!(f, "Average pulls to goal (successful runs): {:.1}", pulls),
            None => write!(f, "Average pulls to goal: N/A (no run succeeded)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(succeeded: bool, chars: u32, weapons: u32, pulls: Option<u32>) -> TrialResult {
        TrialResult {
            succeeded,
            character_copies: chars,
            weapon_copies: weapons,
            pulls_to_goal: pulls,
            ..TrialResult::default()
        }
    }

    #[test]
    fn tally_records_and_merges() {
        let mut a = Tally::default();
        a.record(&result(true, 2, 1, Some(120)));
        a.record(&result(false, 1, 0, None));
        let mut b = Tally::default();
        b.record(&result(true, 1, 1, Some(80)));

        let merged = a.merge(&b);
        assert_eq!(
            merged,
            Tally {
                trials: 3,
                successes: 2,
                character_copies: 4,
                weapon_copies: 2,
                pulls_to_goal: 200,
                ..Tally::default()
            }
        );

        let report = EstimateReport::from_tally(&merged);
        assert!((report.probability - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.mean_pulls_to_goal, Some(100.0));
        assert!((report.mean_character_copies - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn pull_breakdown_is_averaged_per_run() {
        let mut t = Tally::default();
        t.record(&TrialResult {
            lost_splits: 2,
            hard_pity_hits: 1,
            weapon_pulls: 40,
            ..result(true, 1, 1, Some(150))
        });
        t.record(&result(false, 0, 0, None));
        let report = EstimateReport::from_tally(&t);
        assert_eq!(report.mean_lost_splits, 1.0);
        assert_eq!(report.mean_hard_pity_hits, 0.5);
        assert_eq!(report.mean_weapon_pulls, 20.0);
        let text = format!("{}", report);
        assert!(text.contains("1.000 lost 50/50s, 0.500 hard-pity 5-stars, 20.0 weapon"));
    }

    #[test]
    fn no_successes_has_no_pull_average() {
        let mut t = Tally::default();
        t.record(&result(false, 0, 0, None));
        let report = EstimateReport::from_tally(&t);
        assert_eq!(report.probability, 0.0);
        assert_eq!(report.mean_pulls_to_goal, None);
        assert_eq!(report.ci_low, 0.0);
        assert!(report.ci_high > 0.0 && report.ci_high < 1.0);
    }

    #[test]
    fn wilson_brackets_the_estimate() {
        let (lo, hi) = wilson_interval(587, 1000);
        assert!(lo < 0.587 && 0.587 < hi);
        assert!((hi - lo) < 0.07);
        assert_eq!(wilson_interval(10, 10).1, 1.0);
    }

    #[test]
    fn all_successes_keep_the_estimate_inside_the_interval() {
        let mut t = Tally::default();
        for _ in 0..10 {
            t.record(&result(true, 1, 0, Some(90)));
        }
        let report = EstimateReport::from_tally(&t);
        assert_eq!(report.probability, 1.0);
        assert_eq!(report.ci_high, 1.0);
        assert!(report.ci_low <= report.probability && report.probability <= report.ci_high);
        assert!(report.ci_low > 0.7);
    }

    #[test]
    fn display_respects_precision() {
        let report = EstimateReport::trivial(10);
        let text = format!("{:.2}", report);
        assert!(text.starts_with("Success probability: 100.00% (10 / 10 trials)"));
        assert_eq!(format_probability(0.5872046, 6), "58.720460%");
    }
}
