mod config;
mod distribution;
mod error;
mod rates;
mod report;
mod rng;
mod sim;
mod worker;

use clap::{Parser, Subcommand};
use colored::*;
use config::{Config, SimulationConfig, DEFAULT_CONFIG_PATH};
use distribution::{expected_pulls_to_five_star, simulate_pull_distribution};
use error::SimError;
use log::{error, info};
use rates::Category;
use report::format_probability;
use sim::{estimate_success_probability, run_estimate, CancelToken};
use std::fs::File;
use std::io::{self, BufWriter};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use worker::TrialWorker;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Random seed (overrides the config file)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Worker threads (0 = derive from config)
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Estimate the chance of reaching the requested limited copies
    Estimate {
        /// Game rate table (hsr, genshin, zzz, or one from the config file)
        #[arg(short, long)]
        game: Option<String>,
        /// Pulls available
        #[arg(short, long)]
        pulls: u32,
        #[arg(long, default_value_t = 0)]
        character_pity: u32,
        #[arg(long, default_value_t = 0)]
        weapon_pity: u32,
        /// Next character 5-star is guaranteed limited
        #[arg(long)]
        character_guaranteed: bool,
        /// Next weapon 5-star is guaranteed limited
        #[arg(long)]
        weapon_guaranteed: bool,
        /// Limited character copies wanted
        #[arg(long, default_value_t = 1)]
        characters: u32,
        /// Limited weapon copies wanted
        #[arg(long, default_value_t = 0)]
        weapons: u32,
        /// Number of simulated campaigns
        #[arg(short = 'n', long)]
        trials: Option<usize>,
        /// Decimals shown for the probability
        #[arg(long, default_value_t = 6)]
        precision: usize,
        /// Single-threaded, probability only; trials stop as soon as the goal is met
        #[arg(long)]
        sequential: bool,
        /// Abandon the parallel run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Tabulate pulls needed for the next 5-star of one category
    Distribution {
        #[arg(short, long)]
        game: Option<String>,
        #[arg(long, value_enum, default_value_t = Category::Character)]
        category: Category,
        #[arg(long, default_value_t = 0)]
        pity: u32,
        #[arg(short = 'n', long)]
        trials: Option<usize>,
        /// Write CSV here instead of stdout
        #[arg(long)]
        csv: Option<String>,
    },
    /// List known rate tables
    Games,
}

fn build_worker(args: &Args, config: &Config) -> Result<TrialWorker, SimError> {
    if args.threads > 0 {
        TrialWorker::new(args.threads)
    } else {
        TrialWorker::new_with_config(config)
    }
}

fn run(args: Args) -> Result<(), SimError> {
    let explicit = args.config != DEFAULT_CONFIG_PATH;
    let config = Config::load(&args.config, explicit)?;
    let book = config.rate_book();
    let seed = args.seed.or(config.seed);

    match args.command.clone() {
        Commands::Estimate {
            game,
            pulls,
            character_pity,
            weapon_pity,
            character_guaranteed,
            weapon_guaranteed,
            characters,
            weapons,
            trials,
            precision,
            sequential,
            timeout,
        } => {
            let game = game.unwrap_or_else(|| config.game.clone());
            let rates = book.resolve(&game)?;
            let trial_count = trials.unwrap_or(config.trial_count);
            let sim_config = SimulationConfig {
                starting_character_pity: character_pity,
                starting_weapon_pity: weapon_pity,
                character_guaranteed,
                weapon_guaranteed,
                weapon_target: weapons,
                seed,
                ..SimulationConfig::new(rates, pulls, characters, trial_count)
            };
            sim_config.validate()?;

            if sequential {
                let start = Instant::now();
                let p = estimate_success_probability(&sim_config)?;
                info!("[Sim] Sequential run finished in {:.2?}", start.elapsed());
                println!("{}", format_probability(p, precision).green().bold());
                return Ok(());
            }

            let worker = build_worker(&args, &config)?;
            let cancel = CancelToken::new();
            if let Some(secs) = timeout {
                cancel.cancel_after(Duration::from_secs(secs));
            }
            let report = run_estimate(&sim_config, &worker, &cancel, config.chunk_size)?;

            println!(
                "\n=== {} | {} pulls | {} character + {} weapon ===",
                game.to_uppercase().bold(),
                pulls,
                characters,
                weapons
            );
            println!(
                "Start: character pity {}{}, weapon pity {}{}",
                character_pity,
                if character_guaranteed { " (guaranteed)" } else { "" },
                weapon_pity,
                if weapon_guaranteed { " (guaranteed)" } else { "" }
            );
            let text = format!("{:.*}", precision, report);
            for (i, line) in text.lines().enumerate() {
                if i == 0 {
                    println!("{}", line.green().bold());
                } else {
                    println!("{}", line);
                }
            }
        }
        Commands::Distribution {
            game,
            category,
            pity,
            trials,
            csv,
        } => {
            let game = game.unwrap_or_else(|| config.game.clone());
            let rates = book.resolve(&game)?;
            let worker = build_worker(&args, &config)?;
            let dist = simulate_pull_distribution(
                &rates,
                category,
                pity,
                trials.unwrap_or(config.trial_count),
                seed,
                &worker,
                config.chunk_size,
            )?;
            let exact = expected_pulls_to_five_star(&rates.category(category), dist.starting_pity);
            info!(
                "[Distribution] Mean {:.3} pulls to a {} 5-star from pity {} (exact {:.3})",
                dist.mean(),
                dist.category,
                dist.starting_pity,
                exact
            );
            match csv {
                Some(path) => {
                    let file = File::create(&path)?;
                    dist.write_csv(BufWriter::new(file))?;
                    info!("[Distribution] Wrote {}", path);
                }
                None => dist.write_csv(io::stdout().lock())?,
            }
        }
        Commands::Games => {
            for name in book.names() {
                if let Some(rates) = book.lookup(name) {
                    println!(
                        concat!(
                            "{:<10} character {:.1}% base, {:.0}% limited, ~{:.1} pulls/5*",
                            "  |  weapon {:.1}% base, {:.0}% limited, ~{:.1} pulls/5*"
                        ),
                        name.bold(),
                        rates.base_character_rate * 100.0,
                        rates.limited_character_chance * 100.0,
                        expected_pulls_to_five_star(&rates.category(Category::Character), 0),
                        rates.base_weapon_rate * 100.0,
                        rates.limited_weapon_chance * 100.0,
                        expected_pulls_to_five_star(&rates.category(Category::Weapon), 0),
                    );
                }
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_configuration() => {
            error!("[Config] {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_arguments_parse() {
        let args = Args::try_parse_from([
            "gacha-odds",
            "--seed",
            "7",
            "estimate",
            "--game",
            "HSR",
            "--pulls",
            "160",
            "--character-pity",
            "30",
            "--weapon-guaranteed",
            "--weapons",
            "1",
        ])
        .unwrap();
        assert_eq!(args.seed, Some(7));
        match args.command {
            Commands::Estimate {
                game,
                pulls,
                character_pity,
                weapon_guaranteed,
                characters,
                weapons,
                trials,
                ..
            } => {
                assert_eq!(game.as_deref(), Some("HSR"));
                assert_eq!(pulls, 160);
                assert_eq!(character_pity, 30);
                assert!(weapon_guaranteed);
                assert_eq!(characters, 1);
                assert_eq!(weapons, 1);
                assert_eq!(trials, None);
            }
            _ => panic!("expected estimate"),
        }
    }

    #[test]
    fn distribution_category_parses() {
        let args = Args::try_parse_from([
            "gacha-odds",
            "distribution",
            "--category",
            "weapon",
            "--pity",
            "10",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Commands::Distribution { category: Category::Weapon, pity: 10, .. }
        ));
    }

    #[test]
    fn unknown_game_fails_as_configuration_error() {
        let args =
            Args::try_parse_from(["gacha-odds", "estimate", "--game", "fgo", "--pulls", "10"])
                .unwrap();
        let err = run(args).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn negative_pulls_are_rejected_by_the_parser() {
        assert!(Args::try_parse_from(["gacha-odds", "estimate", "--pulls", "-5"]).is_err());
    }
}
