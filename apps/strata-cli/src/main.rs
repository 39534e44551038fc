mod view;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strata_common::Snapshot;
use strata_kernel::{BoxError, FieldUpdate, Store};
use strata_persist::{FileStorage, StorageAdapter};
use strata_tools::{Direction, Inspector, InspectorConfig, NullView};
use tracing_subscriber::EnvFilter;
use view::{PrintView, SystemClipboard};

#[derive(Parser)]
#[command(name = "strata-cli", about = "CLI tool for strata stores")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Run a counter store with an attached inspector
    Demo {
        #[command(flatten)]
        storage: StorageArgs,
        /// Inspector settings (JSON)
        #[arg(long)]
        inspector_config: Option<PathBuf>,
        /// Number of increments to dispatch
        #[arg(short, long, default_value = "3")]
        steps: u32,
    },
    /// Decode and print a persisted record
    Show {
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Write the persisted state to a JSON file
    Export {
        #[command(flatten)]
        storage: StorageArgs,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        /// Inspector settings (JSON), used for the file name
        #[arg(long)]
        inspector_config: Option<PathBuf>,
    },
    /// Copy the persisted state to the system clipboard
    Copy {
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Remove a persisted record
    Clear {
        #[command(flatten)]
        storage: StorageArgs,
    },
}

#[derive(Args)]
struct StorageArgs {
    /// Storage directory
    #[arg(long, default_value = ".strata")]
    data_dir: PathBuf,
    /// Persistence key
    #[arg(short, long, default_value = "counter")]
    key: String,
    /// Obfuscation secret
    #[arg(long, default_value = "")]
    secret: String,
    /// Expiry in milliseconds for newly written records
    #[arg(long)]
    ttl_ms: Option<u64>,
}

impl StorageArgs {
    fn storage(&self) -> anyhow::Result<FileStorage> {
        FileStorage::open(&self.data_dir)
            .with_context(|| format!("opening storage at {}", self.data_dir.display()))
    }

    /// A counter store persisted under this key.
    fn open_store(&self) -> anyhow::Result<Store> {
        let mut builder = Store::builder(Snapshot::from_value(json!({"count": 0}))?)
            .persist_key(self.key.clone())
            .storage(Arc::new(self.storage()?))
            .secret(self.secret.clone())
            .action("increment", |state, payload| {
                let by = payload.as_i64().unwrap_or(1);
                let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                let mut next = state.clone();
                next.insert("count", json!(count + by));
                Ok(next)
            })
            .action("reset", |state, _| {
                let mut next = state.clone();
                next.insert("count", json!(0));
                Ok(next)
            })
            .effect("load_items", |ctx, payload| async move {
                ctx.set_field("loading", json!(true));
                ctx.set_fields([
                    ("items", FieldUpdate::from(payload)),
                    ("loading", FieldUpdate::from(json!(false))),
                ]);
                Ok::<(), BoxError>(())
            });
        if let Some(ttl) = self.ttl_ms {
            builder = builder.ttl(Duration::from_millis(ttl));
        }
        Ok(builder.build())
    }
}

fn load_inspector_config(path: Option<&PathBuf>) -> anyhow::Result<InspectorConfig> {
    match path {
        Some(path) => InspectorConfig::load(path)
            .with_context(|| format!("reading inspector config {}", path.display())),
        None => Ok(InspectorConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("strata-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", strata_common::crate_info());
            println!("persist: {}", strata_persist::crate_info());
            println!("kernel: {}", strata_kernel::crate_info());
            println!("tools: {}", strata_tools::crate_info());
        }
        Commands::Demo {
            storage,
            inspector_config,
            steps,
        } => {
            let config = load_inspector_config(inspector_config.as_ref())?;
            let store = storage.open_store()?;
            tracing::info!(key = %storage.key, data_dir = %storage.data_dir.display(), steps, "starting demo");
            println!("Demo: key={}, start={}", storage.key, store.get());

            let inspector = Inspector::attach(&store, config, Arc::new(PrintView));
            inspector.handle_key(inspector.config().toggle_key);

            for _ in 0..steps {
                store.dispatch("increment", json!(1))?;
            }
            futures::executor::block_on(store.run_effect("load_items", json!(["alpha", "beta"])))?;

            println!("Rewinding two steps");
            inspector.time_travel(Direction::Prev);
            inspector.time_travel(Direction::Prev);
            println!("Forward one step");
            inspector.time_travel(Direction::Next);

            for hit in inspector.search("count") {
                println!("search: {} = {}", hit.dotted(), hit.value);
            }
            for entry in inspector.action_log() {
                println!("logged: {} at {}", entry.record, entry.timestamp_ms);
            }
            println!(
                "Final: {} (history {} entries)",
                store.get(),
                inspector.history_len()
            );
            inspector.destroy();
        }
        Commands::Show { storage } => {
            let raw = storage.storage()?.get(&storage.key)?;
            let Some(raw) = raw else {
                println!("No record under {:?}", storage.key);
                return Ok(());
            };
            match strata_persist::decode(Some(&raw), &storage.secret) {
                Some(envelope) => {
                    println!("{}", serde_json::to_string_pretty(&envelope.data)?);
                    match envelope.expiry {
                        Some(expiry) => println!("expiry: {expiry}"),
                        None => println!("expiry: never"),
                    }
                }
                None => println!("Record under {:?} could not be decoded", storage.key),
            }
        }
        Commands::Export {
            storage,
            out,
            inspector_config,
        } => {
            let config = load_inspector_config(inspector_config.as_ref())?;
            let store = storage.open_store()?;
            let inspector = Inspector::attach(&store, config, Arc::new(NullView));
            match inspector.export_state(&out) {
                Some(path) => {
                    tracing::info!(key = %storage.key, path = %path.display(), "exported state");
                    println!("Exported to {}", path.display());
                }
                None => anyhow::bail!("export to {} failed", out.display()),
            }
            inspector.destroy();
        }
        Commands::Copy { storage } => {
            let store = storage.open_store()?;
            let inspector = Inspector::attach(&store, InspectorConfig::default(), Arc::new(NullView));
            if !inspector.copy_state(&SystemClipboard) {
                anyhow::bail!("could not copy state to the clipboard");
            }
            let fields = store.get().len();
            tracing::info!(key = %storage.key, fields, "copied state to clipboard");
            println!("Copied {fields} fields");
            inspector.destroy();
        }
        Commands::Clear { storage } => {
            storage.storage()?.remove(&storage.key)?;
            tracing::info!(key = %storage.key, data_dir = %storage.data_dir.display(), "removed persisted record");
            println!("Removed {:?}", storage.key);
        }
    }

    Ok(())
}
