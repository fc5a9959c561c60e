// src/cli.rs
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use crate::closure::{ClosureDriver, Summary};
use crate::config::consts::{CRITERIA_SUBDIR, DEFAULT_DATA_DIR, FSA_PREFIXES};
use crate::config::AppOptions;
use crate::core::HttpRegistry;
use crate::error::Result;
use crate::progress::LogProgress;
use crate::query::DoctorType;
use crate::refine::Refiner;
use crate::store::FileStore;
use crate::{fsa, input, log, output, permute};

/// Enumerate the CPSO physician register by postal code.
#[derive(Parser, Debug)]
#[command(name = "cpso_scrape", version)]
pub struct Cli {
    /// JSON file overlaying the default options
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Concurrent requests (overrides the config file)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Debug-level logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the level-0 FSA list into search-criteria/FSA_LDU0.json
    Fsa {
        #[arg(long, short = 'o', default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,
    },
    /// Query every code of an input file once, without refining
    Scrape(QueryArgs),
    /// Query, refine and repeat until nothing censored is left
    Crawl(CrawlArgs),
    /// Rebuild summary.csv and details.csv from raw results
    Output {
        /// Run directories (or raw directories)
        #[arg(long = "input", short = 'i', required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        #[arg(long, short = 'o', default_value = "results")]
        output_dir: PathBuf,
    },
    /// Write the next generation of censored codes as FSA_LDU<level>.json
    Permute {
        /// LDU level to generate (1, 2 or 3)
        level: usize,
        #[arg(long = "input", short = 'i', default_value = "results/summary.csv")]
        input: PathBuf,
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Postal codes (.json, .csv or one per line)
    #[arg(long = "input", short = 'i')]
    pub input: PathBuf,

    #[arg(long, short = 'd', default_value = "Any")]
    pub doctor_type: DoctorType,

    #[arg(long, short = 'l')]
    pub last_name: Option<String>,

    /// Defaults to data/<input file stem>
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,
}

impl QueryArgs {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            let stem = self.input.file_stem().and_then(|s| s.to_str()).unwrap_or("run");
            Path::new(DEFAULT_DATA_DIR).join(stem)
        })
    }
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Deepest LDU level to refine to (0..=3)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Dispatch passes per round for failing queries
    #[arg(long)]
    pub round_attempts: Option<usize>,
}

pub fn run() -> Result<ExitCode> {
    run_with(Cli::parse())
}

pub fn run_with(cli: Cli) -> Result<ExitCode> {
    let mut opts = match &cli.config {
        Some(path) => AppOptions::load(path)?,
        None => AppOptions::default(),
    };
    if let Some(w) = cli.workers {
        opts.scrape.workers = w;
    }
    if let Command::Crawl(args) = &cli.command {
        if let Some(d) = args.max_depth {
            opts.crawl.max_depth = d;
        }
        if let Some(a) = args.round_attempts {
            opts.crawl.round_attempts = a;
        }
    }
    opts.validate()?;

    match &cli.command {
        Command::Fsa { data_dir } => {
            log::init(data_dir, cli.verbose)?;
            let codes = fsa::fetch_fsas(FSA_PREFIXES, &opts.registry, &opts.scrape)?;
            fsa::save_fsas(data_dir, &codes)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Scrape(args) => {
            log::init(&args.output_dir(), cli.verbose)?;
            // One round, nothing refined.
            run_closure(&opts, args, 0, 1)
        }
        Command::Crawl(args) => {
            log::init(&args.query.output_dir(), cli.verbose)?;
            run_closure(&opts, &args.query, opts.crawl.max_depth, opts.crawl.round_attempts)
        }
        Command::Output { inputs, output_dir } => {
            log::init(output_dir, cli.verbose)?;
            let report = output::build_output(inputs, output_dir, &opts.registry.limits()?)?;
            println!("Saved summary to: {}", report.summary_path.display());
            println!("Saved details to: {}", report.details_path.display());
            if !report.skipped.is_empty() {
                eprintln!("Skipped {} unreadable raw files (see log)", report.skipped.len());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Permute { level, input, output_dir } => {
            let out = output_dir
                .clone()
                .unwrap_or_else(|| Path::new(DEFAULT_DATA_DIR).join(CRITERIA_SUBDIR));
            log::init(&out, cli.verbose)?;
            let (perm, path) = permute::permute_file(
                input,
                &out,
                *level,
                &opts.registry.limits()?,
                &opts.registry.alphabet()?,
            )?;
            if perm.codes.is_empty() {
                logf!("No censored codes at depth {}; nothing left to refine", level - 1);
            }
            println!("Generated {} permutations for LDU level {level}: {}", perm.codes.len(), path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_closure(opts: &AppOptions, args: &QueryArgs, max_depth: usize, round_attempts: usize) -> Result<ExitCode> {
    let out = args.output_dir();
    let limits = opts.registry.limits()?;
    let queries = input::load_queries(&args.input, args.doctor_type, args.last_name.as_deref())?;

    let service = HttpRegistry::new(&opts.registry, &opts.scrape)?;
    let mut store = FileStore::open(&out, limits)?;
    let refiner = Refiner::new(limits, opts.registry.alphabet()?).with_max_depth(max_depth);

    let mut progress = LogProgress::default();
    let summary = ClosureDriver::new(&service, &mut store, refiner)
        .workers(opts.scrape.workers)
        .round_attempts(round_attempts)
        .run(queries, &mut progress)?;

    let path = store.write_summary(&summary.to_rows())?;
    report(&summary, &path);
    Ok(if summary.is_complete() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn report(summary: &Summary, summary_path: &Path) {
    let c = summary.counts();
    println!(
        "{} queries over {} round(s): {} complete, {} empty, {} censored ({} irreducible)",
        summary.len(),
        summary.rounds,
        c.complete,
        c.empty,
        c.censored,
        c.irreducible
    );
    for e in summary.irreducible() {
        println!("  irreducible {} ({})", e.query.key(), e.irreducible.map(|r| r.to_string()).unwrap_or_default());
    }
    if let Some(round) = summary.stopped_at_round {
        eprintln!("Stopped at round {round}: {} queries still failing; rerun to resume", summary.failed.len());
        for (q, e) in &summary.failed {
            eprintln!("  {}: {e}", q.key());
        }
    }
    println!("Summary: {}", summary_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn crawl_flags() {
        let cli = Cli::try_parse_from([
            "cpso_scrape", "crawl", "-i", "seeds/FSA_LDU0.json", "-d", "family", "-l", "Smith", "--max-depth", "2",
        ])
        .unwrap();
        let Command::Crawl(args) = cli.command else { panic!("not crawl") };
        assert_eq!(args.query.doctor_type, DoctorType::FamilyDoctor);
        assert_eq!(args.query.last_name.as_deref(), Some("Smith"));
        assert_eq!(args.max_depth, Some(2));
        assert_eq!(args.query.output_dir(), Path::new("data").join("FSA_LDU0"));
    }

    #[test]
    fn permute_level_positional() {
        let cli = Cli::try_parse_from(["cpso_scrape", "permute", "2", "-i", "run/summary.csv"]).unwrap();
        assert!(matches!(cli.command, Command::Permute { level: 2, .. }));
    }
}
