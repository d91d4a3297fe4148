// ABOUTME: Entry point for the waystone operator binary.
// ABOUTME: Lists, exports, imports, and migrates stored homes, invitations, and cooldowns.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde::de::DeserializeOwned;
use waystone_core::{InviteScope, Normalized, Record, SystemClock};
use waystone_store::stores::BoxedStore;
use waystone_store::{Backend, ImportReport, StoreConfig, Stores};

/// Inspect and move waystone records between backends.
#[derive(Parser)]
#[command(name = "waystone")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backend to use instead of WAYSTONE_BACKEND.
    #[arg(short, long, global = true)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show live records.
    List {
        #[command(subcommand)]
        what: ListCommand,
    },

    /// Write every live record of a kind to stdout as JSON lines.
    Export { kind: Kind },

    /// Merge records from a JSON lines file.
    Import {
        kind: Kind,

        file: PathBuf,

        /// Replace records whose key already exists.
        #[arg(long)]
        overwrite: bool,
    },

    /// Copy every record kind from one backend into the other.
    Migrate {
        #[arg(long)]
        from: Backend,

        #[arg(long)]
        to: Backend,

        /// Replace records whose key already exists in the destination.
        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Subcommand)]
enum ListCommand {
    /// Saved locations of one owner.
    Homes {
        #[arg(long)]
        owner: String,
    },

    /// Invitations addressed to a player, or handed out by one.
    Invites {
        #[arg(long, conflicts_with = "from", required_unless_present = "from")]
        to: Option<String>,

        #[arg(long)]
        from: Option<String>,
    },

    /// A player's active cooldown.
    Cooldown { player: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Homes,
    Invites,
    Cooldowns,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waystone=info,waystone_store=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = StoreConfig::from_env().context("invalid configuration")?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    match cli.command {
        Command::List { what } => list(&config, what),
        Command::Export { kind } => export(&config, kind),
        Command::Import {
            kind,
            file,
            overwrite,
        } => import(&config, kind, &file, overwrite),
        Command::Migrate {
            from,
            to,
            overwrite,
        } => migrate(&config, from, to, overwrite),
    }
}

fn open(config: &StoreConfig) -> anyhow::Result<Stores> {
    Stores::open(config, Arc::new(SystemClock))
        .with_context(|| format!("failed to open {} stores", config.backend))
}

fn list(config: &StoreConfig, what: ListCommand) -> anyhow::Result<()> {
    let mut stores = open(config)?;
    let mut out = io::stdout().lock();

    match what {
        ListCommand::Homes { owner } => {
            for home in stores.homes.list(&Normalized::new(&owner))? {
                writeln!(
                    out,
                    "{}\t{}\t{:.2} {:.2} {:.2}\t{:.1}/{:.1}",
                    home.name, home.world, home.x, home.y, home.z, home.pitch, home.yaw
                )?;
            }
        }
        ListCommand::Invites { to, from } => {
            let scope = match (to, from) {
                (Some(target), _) => InviteScope::ToTarget(Normalized::new(&target)),
                (None, Some(source)) => InviteScope::FromSource(Normalized::new(&source)),
                (None, None) => bail!("either --to or --from is required"),
            };
            for invite in stores.invites.list(&scope)? {
                let expires = invite
                    .expires
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                writeln!(
                    out,
                    "{}/{} -> {}\texpires {}\t{}",
                    invite.source,
                    invite.home,
                    invite.target,
                    expires,
                    invite.reason.as_deref().unwrap_or("")
                )?;
            }
        }
        ListCommand::Cooldown { player } => match stores.cooldowns.get(&Normalized::new(&player))? {
            Some(cooldown) => writeln!(
                out,
                "{} is cooling down until {}",
                cooldown.player,
                cooldown.expiry.to_rfc3339()
            )?,
            None => writeln!(out, "{} has no active cooldown", player)?,
        },
    }

    Ok(())
}

fn export(config: &StoreConfig, kind: Kind) -> anyhow::Result<()> {
    let mut stores = open(config)?;
    let count = match kind {
        Kind::Homes => write_json_lines(&mut stores.homes)?,
        Kind::Invites => write_json_lines(&mut stores.invites)?,
        Kind::Cooldowns => write_json_lines(&mut stores.cooldowns)?,
    };
    tracing::info!("exported {} records", count);
    Ok(())
}

fn write_json_lines<R: Record + Serialize>(store: &mut BoxedStore<R>) -> anyhow::Result<usize> {
    let records = store.all()?;
    let mut out = BufWriter::new(io::stdout().lock());
    for record in &records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(records.len())
}

fn import(config: &StoreConfig, kind: Kind, file: &Path, overwrite: bool) -> anyhow::Result<()> {
    let contents =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let mut stores = open(config)?;

    let report = match kind {
        Kind::Homes => import_json_lines(&mut stores.homes, &contents, overwrite)?,
        Kind::Invites => import_json_lines(&mut stores.invites, &contents, overwrite)?,
        Kind::Cooldowns => import_json_lines(&mut stores.cooldowns, &contents, overwrite)?,
    };
    println!("{}", report);
    Ok(())
}

/// Parse one record per non-blank line and merge them. Lines that do not
/// parse are logged and counted as failed.
fn import_json_lines<R: Record + DeserializeOwned>(
    store: &mut BoxedStore<R>,
    contents: &str,
    overwrite: bool,
) -> anyhow::Result<ImportReport> {
    let mut records = Vec::new();
    let mut unreadable = 0;

    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<R>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("skipping unreadable {} on line {}: {}", R::KIND, index + 1, e);
                unreadable += 1;
            }
        }
    }

    let mut report = store.import_batch(records, overwrite)?;
    report.failed += unreadable;
    Ok(report)
}

fn migrate(
    config: &StoreConfig,
    from: Backend,
    to: Backend,
    overwrite: bool,
) -> anyhow::Result<()> {
    if from == to {
        bail!("source and destination are both {}", from);
    }

    let mut source = open(&config.with_backend(from))?;
    let mut destination = open(&config.with_backend(to))?;

    let homes = destination
        .homes
        .import_batch(source.homes.all()?, overwrite)?;
    println!("homes: {}", homes);

    let invites = destination
        .invites
        .import_batch(source.invites.all()?, overwrite)?;
    println!("invites: {}", invites);

    let cooldowns = destination
        .cooldowns
        .import_batch(source.cooldowns.all()?, overwrite)?;
    println!("cooldowns: {}", cooldowns);

    tracing::info!("migrated {} to {}", from, to);
    Ok(())
}
