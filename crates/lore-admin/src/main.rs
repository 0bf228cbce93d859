//! lore-admin: maintenance CLI for a Lore SQLite store.
//!
//! Reads `lore.toml` (or the path given with `--config`) and `LORE_*`
//! environment variables into a [`StoreConfig`], opens the store and runs
//! one subcommand.
//!
//! ```toml
//! path          = "~/.local/share/lore/lore.db"
//! embedding_dim = 1536
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use lore_core::{migration::MigrationLedger as _, store::MemoryStore as _};
use lore_store_sqlite::{SqliteStore, StoreConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Lore store administration")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "lore.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Apply pending schema migrations and list the versions applied.
  Migrate,
  /// Show every known migration and whether it has been applied.
  Status,
  /// Print row counts as JSON.
  Stats,
  /// Delete every profile, history and citation row.
  Reset {
    /// Required; the reset cannot be undone.
    #[arg(long)]
    yes: bool,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("LORE").try_parsing(true))
    .build()
    .context("failed to read config file")?;

  let mut store_cfg: StoreConfig = settings
    .try_deserialize()
    .context("failed to deserialise StoreConfig")?;
  store_cfg.path = expand_tilde(&store_cfg.path);

  if let Command::Reset { yes: false } = cli.command {
    anyhow::bail!("refusing to reset {:?} without --yes", store_cfg.path);
  }

  // Opening applies pending migrations.
  let store = SqliteStore::open(&store_cfg)
    .await
    .with_context(|| format!("failed to open store at {:?}", store_cfg.path))?;

  match cli.command {
    Command::Migrate => {
      let mut applied = store.applied_on_open().to_vec();
      applied.extend(store.migrate().await.context("migration failed")?);
      if applied.is_empty() {
        println!("schema is up to date");
      }
      for version in applied {
        println!("applied {version}");
      }
    }
    Command::Status => {
      for m in store.migration_status().await? {
        match m.applied_at {
          Some(at) => println!("{}  applied {}  {}", m.version, at.to_rfc3339(), m.checksum),
          None => println!("{}  pending  {}", m.version, m.checksum),
        }
      }
      println!("{} ledger rows", store.applied().await?.len());
    }
    Command::Stats => {
      let stats = store.stats().await?;
      println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Command::Reset { .. } => {
      store.delete_all().await.context("reset failed")?;
      println!("store reset");
    }
  }

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
