//! shardsync CLI - depot builder and client updater

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use shardsync::ops::{build, sync, CancelToken, SessionOptions, SessionOutcome, SyncReport};
use shardsync::transport::LocalTransport;
use shardsync::{Config, Depot, IoResultExt};

#[derive(Parser)]
#[command(name = "shardsync")]
#[command(about = "incremental binary-patch updater for game asset trees")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// write a client config file
    Init {
        /// live asset tree to keep updated
        live_dir: PathBuf,

        /// remote depot location
        remote: String,

        /// where to write the config
        #[arg(short, long, default_value = "shardsync.toml")]
        config: PathBuf,

        /// staging directory for downloads and session state
        #[arg(long, default_value = "shardsync-temp")]
        temp_dir: PathBuf,
    },

    /// build catalog, patches and archives from a depot's releases
    Build {
        /// depot storage root
        depot: PathBuf,

        /// catalog label
        #[arg(short, long, default_value = "game assets")]
        name: String,
    },

    /// synchronize the live tree against the remote depot
    Sync {
        /// client config file
        #[arg(short, long, default_value = "shardsync.toml")]
        config: PathBuf,

        /// plan only; touch nothing
        #[arg(short, long)]
        pretend: bool,

        /// examine everything even if the catalog is unchanged
        #[arg(short, long)]
        force_check: bool,
    },

    /// produce a patch file from two versions of a file
    Diff {
        old: PathBuf,
        new: PathBuf,
        patch: PathBuf,
    },

    /// apply a patch file to an old version of a file
    Patch {
        old: PathBuf,
        patch: PathBuf,
        new: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> shardsync::Result<ExitCode> {
    match cli.command {
        Commands::Init {
            live_dir,
            remote,
            config,
            temp_dir,
        } => {
            Config::new(live_dir, temp_dir, remote).save(&config)?;
            println!("wrote {}", config.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Build { depot, name } => {
            let depot = Depot::open(&depot)?;
            let report = build(&depot, &name)?;
            println!("{} files, {} versions", report.files, report.versions);
            println!(
                "{} patches built, {} removed, {} archives refreshed",
                report.patches_built, report.patches_removed, report.archives_built
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Sync {
            config,
            pretend,
            force_check,
        } => {
            let config = Config::load(&config)?;
            let transport = LocalTransport::new(&config.remote);
            let options = SessionOptions {
                pretend,
                force_check,
            };
            match sync(&config, &transport, &options, &CancelToken::new())? {
                SessionOutcome::Unchanged => {
                    println!("everything current (catalog unchanged)");
                    Ok(ExitCode::SUCCESS)
                }
                SessionOutcome::Planned(plan) => {
                    println!(
                        "would download {} file(s) ({:.1} MB), patch {} ({:.1} MB), delete {}",
                        plan.downloads.len(),
                        plan.download_bytes as f64 / (1024.0 * 1024.0),
                        plan.patches.len(),
                        plan.patch_bytes as f64 / (1024.0 * 1024.0),
                        plan.deletes.len(),
                    );
                    Ok(ExitCode::SUCCESS)
                }
                SessionOutcome::Completed { report, .. } => {
                    print_report(&report);
                    Ok(if report.is_clean() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    })
                }
            }
        }

        Commands::Diff { old, new, patch } => {
            let old_bytes = std::fs::read(&old).with_path(&old)?;
            let new_bytes = std::fs::read(&new).with_path(&new)?;
            let data = shardsync::patch::encode(&old_bytes, &new_bytes)?;
            std::fs::write(&patch, &data).with_path(&patch)?;
            println!(
                "{}: {} bytes for a {} byte target",
                patch.display(),
                data.len(),
                new_bytes.len()
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Patch { old, patch, new } => {
            let old_bytes = std::fs::read(&old).with_path(&old)?;
            let patch_bytes = std::fs::read(&patch).with_path(&patch)?;
            let out = shardsync::patch::decode_to_vec(&old_bytes, &patch_bytes)?;
            std::fs::write(&new, &out).with_path(&new)?;
            println!("wrote {} ({} bytes)", new.display(), out.len());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_report(report: &SyncReport) {
    println!(
        "{} updated, {} failed, {} already current",
        report.succeeded.len(),
        report.failed.len(),
        report.skipped.len()
    );
    for name in &report.succeeded {
        println!("  updated {}", name);
    }
    for (name, reason) in &report.failed {
        println!("  FAILED {}: {}", name, reason);
    }
}
