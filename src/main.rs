//! evalcache - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evalcache::runtime::eval::{BasicCompiler, CallSiteIndex, EmptyScope, EvalFlags};
use evalcache::util::config::{load_config, load_user_config, RuntimeConfig};
use evalcache::util::logger::{self, LogLevel};
use evalcache::{simulate, Agent, SimulationOptions, SimulationReport, NAME, VERSION};
use std::path::PathBuf;

/// Bounded eval code cache with GC tracing
#[derive(Parser, Debug)]
#[command(name = "evalcache")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.config/evalcache/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a random eval workload and report cache behavior
    Simulate {
        /// Eval cache capacity per code block
        #[arg(long)]
        capacity: Option<usize>,

        /// Distinct call sites
        #[arg(long, default_value_t = 8)]
        call_sites: u32,

        /// Distinct source strings
        #[arg(long, default_value_t = 16)]
        sources: usize,

        /// Number of evals
        #[arg(long, default_value_t = 10_000)]
        iterations: usize,

        /// RNG seed
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Full collection every N evals (0 = never)
        #[arg(long, default_value_t = 0)]
        collect_every: usize,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile a piece of eval code once and describe the result
    Eval {
        /// Code to compile
        #[arg(value_name = "CODE")]
        code: String,

        /// Compile as strict mode code
        #[arg(long)]
        strict: bool,
    },

    /// Print version information
    Version,
}

fn load(args: &Args) -> Result<RuntimeConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => load_user_config().context("Failed to load user config")?,
    };
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    Ok(config)
}

fn print_report(report: &SimulationReport) {
    println!("iterations:        {}", report.iterations);
    println!("compilations:      {}", report.compilations);
    println!(
        "hits / misses:     {} / {} ({:.1}%)",
        report.cache.hits,
        report.cache.misses,
        report.cache.hit_rate()
    );
    println!("not cached (full): {}", report.cache.skipped_insertions);
    println!("failed evals:      {}", report.failed_evals);
    println!("cached entries:    {}", report.cached_entries);
    println!(
        "collections:       {} minor, {} full, {} freed",
        report.minor_collections, report.full_collections, report.freed
    );
    println!("live cells:        {}", report.live_cells);
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load(&args)?;

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        config.log.level()?
    };
    logger::init_with_level(level);

    match args.command {
        Commands::Simulate {
            capacity,
            call_sites,
            sources,
            iterations,
            seed,
            collect_every,
            json,
        } => {
            if let Some(capacity) = capacity {
                config.eval_cache.capacity = capacity;
            }
            let options = SimulationOptions {
                call_sites,
                sources,
                iterations,
                seed,
                collect_every,
            };
            let report = simulate(config, &options).context("Simulation failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Eval { code, strict } => {
            let flags = if strict {
                EvalFlags::strict()
            } else {
                EvalFlags::default()
            };
            let mut agent = Agent::new(config, BasicCompiler::new());
            let main = agent.create_code_block("cli");
            let unit = agent
                .eval(main, code.as_str(), CallSiteIndex::new(0), flags, &EmptyScope)
                .context("Failed to evaluate code")?;
            let executable = agent.executable(unit)?;
            println!(
                "compiled {} tokens{}",
                executable.token_count(),
                if executable.is_strict() {
                    " (strict)"
                } else {
                    ""
                }
            );
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
