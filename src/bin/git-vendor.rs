//! Thin CLI adapter: argv -> core calls -> exit code. No business logic
//! lives here (spec §1/§9) — every decision beyond "which core function do
//! I call and how do I print its result" belongs in the library.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use git_vendor::cache::CacheStore;
use git_vendor::cli_adapter;
use git_vendor::config_store::{self, ProjectLayout};
use git_vendor::git::RealGitClient;
use git_vendor::license::TextPatternDetector;
use git_vendor::model::VendorLock;
use git_vendor::orchestrate::{self, RunOptions};
use git_vendor::parallel::ParallelOptions;
use git_vendor::sync::{SyncOptions, SyncServices};
use git_vendor::update::{self, UpdateOptions};
use git_vendor::verify::{self, AcceptOptions, StatusOptions};

#[derive(Parser)]
#[command(name = "git-vendor", version, about = "Sync, lock and verify vendored files from external Git repositories")]
struct Cli {
    /// Project root; defaults to the current directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Directory name the config/lock/cache live under, relative to `root`.
    #[arg(long, global = true, default_value = ".git-vendor")]
    dir: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync every selected vendor.
    Sync(SelectArgs),
    /// Regenerate lockfile entries for every selected vendor.
    Update(SelectArgs),
    /// Compare disk state to the lockfile, with no network calls.
    Verify,
    /// Accept (or clear acceptance of) drift for a vendor.
    Accept {
        vendor: String,
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        clear: bool,
    },
    /// Compose `verify` with an upstream-staleness check.
    Status {
        #[arg(long)]
        offline: bool,
    },
}

#[derive(clap::Args)]
struct SelectArgs {
    #[arg(long)]
    name: Vec<String>,
    #[arg(long)]
    group: Vec<String>,
    #[arg(long)]
    internal_only: bool,
    #[arg(long)]
    force: bool,
    #[arg(long)]
    no_cache: bool,
    #[arg(long, default_value_t = 1)]
    workers: usize,
    #[arg(long, default_value_t = 300)]
    hook_timeout_secs: u64,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let root = cli.root.unwrap_or_else(|| PathBuf::from("."));
    let layout = ProjectLayout::new(&root, &cli.dir);

    let exit_code = match cli.command {
        Command::Sync(args) => run_sync(&layout, args),
        Command::Update(args) => run_update(&layout, args),
        Command::Verify => run_verify(&layout),
        Command::Accept { vendor, file, clear } => run_accept(&layout, &vendor, file.as_deref(), clear),
        Command::Status { offline } => run_status(&layout, offline),
    };

    std::process::exit(exit_code);
}

fn non_empty<T>(v: Vec<T>) -> Option<HashSet<T>>
where
    T: std::hash::Hash + Eq,
{
    if v.is_empty() { None } else { Some(v.into_iter().collect()) }
}

fn select_options(args: &SelectArgs) -> SyncOptions {
    SyncOptions {
        force: args.force,
        no_cache: args.no_cache,
        names: non_empty(args.name.clone()),
        groups: non_empty(args.group.clone()),
        internal_only: args.internal_only,
        hook_timeout: Duration::from_secs(args.hook_timeout_secs),
    }
}

/// `--workers 1` (the default) keeps the serial path; anything higher opts
/// into the bounded worker pool in `parallel.rs`.
fn parallel_options(args: &SelectArgs) -> Option<ParallelOptions> {
    if args.workers <= 1 {
        None
    } else {
        Some(ParallelOptions { worker_count: args.workers })
    }
}

fn git_identity() -> String {
    std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn load_config_and_lock(layout: &ProjectLayout) -> anyhow::Result<(git_vendor::model::VendorConfig, VendorLock)> {
    let config = config_store::load_config(&layout.config_path())?;
    let lock = config_store::load_lock(&layout.lock_path())?;
    Ok((config, lock))
}

fn run_sync(layout: &ProjectLayout, args: SelectArgs) -> i32 {
    let (config, lock) = match load_config_and_lock(layout) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let client = RealGitClient;
    let cache = CacheStore::new(layout.cache_dir());
    let services = SyncServices {
        client: &client,
        license_detector: &TextPatternDetector,
        cache: &cache,
    };

    let options = select_options(&args);
    let run_options = RunOptions {
        sync: options,
        parallel: parallel_options(&args),
        dry_run: false,
        identity: git_identity(),
    };
    let now = now_rfc3339();
    let result = orchestrate::run_sync(&services, layout, &config, lock, &run_options, &now);

    for (name, outcome) in &result.sync.outcomes {
        match outcome {
            Ok(o) => {
                for warning in &o.warnings {
                    eprintln!("warning: {name}: {warning}");
                }
                for r#ref in &o.skipped {
                    println!("{name}@{ref}: cached, skipped");
                }
            }
            Err(e) => eprintln!("error: {name}: {e}"),
        }
    }
    if let Err(e) = config_store::save_lock(&layout.lock_path(), &result.lock) {
        eprintln!("error: saving lockfile: {e}");
        return 1;
    }

    cli_adapter::sync_run_exit_code(&result.sync)
}

fn run_update(layout: &ProjectLayout, args: SelectArgs) -> i32 {
    let (config, lock) = match load_config_and_lock(layout) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let client = RealGitClient;
    let cache = CacheStore::new(layout.cache_dir());
    let services = SyncServices {
        client: &client,
        license_detector: &TextPatternDetector,
        cache: &cache,
    };

    let options = select_options(&args);
    let update_options = UpdateOptions {
        names: options.names,
        groups: options.groups,
        internal_only: options.internal_only,
        hook_timeout: options.hook_timeout,
        identity: git_identity(),
    };
    let now = now_rfc3339();
    let result = update::update_all(&services, layout, &config, &lock, &update_options, &now);

    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    for (name, e) in &result.errors {
        eprintln!("error: {name}: {e}");
    }
    if let Err(e) = config_store::save_lock(&layout.lock_path(), &result.lock) {
        eprintln!("error: saving lockfile: {e}");
        return 1;
    }

    cli_adapter::update_run_exit_code(&result)
}

fn run_verify(layout: &ProjectLayout) -> i32 {
    let (config, lock) = match load_config_and_lock(layout) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let result = verify::verify(&config, &lock, layout.project_root());
    for file in &result.files {
        println!("{} {}@{}: {:?}", file.path, file.vendor, file.r#ref, file.status);
    }
    cli_adapter::verify_exit_code(&result)
}

fn run_accept(layout: &ProjectLayout, vendor: &str, file: Option<&str>, clear: bool) -> i32 {
    let (_config, mut lock) = match load_config_and_lock(layout) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let options = AcceptOptions { file, clear };
    match verify::accept(&mut lock, layout.project_root(), vendor, &options) {
        Ok(affected) => {
            for path in &affected {
                println!("{path}");
            }
            if let Err(e) = config_store::save_lock(&layout.lock_path(), &lock) {
                eprintln!("error: saving lockfile: {e}");
                return 1;
            }
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            cli_adapter::error_exit_code(&e)
        }
    }
}

fn run_status(layout: &ProjectLayout, offline: bool) -> i32 {
    let (config, lock) = match load_config_and_lock(layout) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let client = RealGitClient;
    let client_ref: Option<&dyn git_vendor::git::GitClient> = if offline { None } else { Some(&client) };
    let reports = verify::status(client_ref, &config, &lock, layout.project_root(), &StatusOptions { offline });

    let mut worst = cli_adapter::summary_exit_code(git_vendor::verify::Summary::Pass);
    for report in &reports {
        println!(
            "{}: {:?}{}",
            report.vendor,
            report.summary,
            if report.outdated { " (outdated)" } else { "" }
        );
        worst = worst.max(cli_adapter::summary_exit_code(report.summary));
    }
    worst
}
