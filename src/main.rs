//! IFC Converter CLI
//!
//! Runs the conversion worker against Firestore and Cloud Storage, converts a
//! single local file, or enqueues a local model as a new pending task.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use ifc_converter::converter::{ConversionJob, Converter};
use ifc_converter::store::{self, config::env, Credentials, DocumentStore, NewTask, ObjectStore};
use ifc_converter::worker::{setup_signal_handler, TaskProcessor, TaskRunner, WorkerConfig};
use ifc_converter::{BlenderConverter, ConverterConfig, StoreConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "ifc-converter")]
#[command(about = "Convert uploaded IFC models to GLTF using Blender")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as worker, polling the tasks collection for pending tasks
    Worker {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        blender: BlenderArgs,

        /// Poll interval in seconds
        #[arg(short, long, env = "POLL_INTERVAL_SECS", default_value = "10")]
        poll_interval: u64,

        /// Field holding the task status; terminal statuses are written here too
        #[arg(long, env = "STATUS_FIELD", default_value = "status")]
        status_field: String,

        /// Status value of tasks waiting for conversion
        #[arg(long, env = "PENDING_VALUE", default_value = "pending")]
        pending_value: String,

        /// Storage prefix for converted files
        #[arg(long, env = "PROCESSED_PREFIX", default_value = "processed")]
        processed_prefix: String,

        /// Parent directory for per-task workspaces (default: system temp dir)
        #[arg(long, env = "WORKSPACE_DIR")]
        workspace_dir: Option<PathBuf>,

        /// Run a single poll cycle and exit (for testing)
        #[arg(long)]
        once: bool,
    },

    /// Convert a local IFC file without touching any store
    Convert {
        /// IFC file to convert
        #[arg(short, long)]
        input: PathBuf,

        /// Output .gltf path (the .bin buffer is written next to it)
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        blender: BlenderArgs,
    },

    /// Upload a local IFC file and create a pending task for it
    Enqueue {
        /// IFC file to upload
        file: PathBuf,

        /// Storage prefix for uploaded models
        #[arg(long, default_value = "uploads")]
        upload_prefix: String,

        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// Firebase / Google Cloud project id
    #[arg(long, env = env::PROJECT_ID)]
    project_id: String,

    /// Storage bucket (e.g. my-app.firebasestorage.app)
    #[arg(long, env = env::BUCKET)]
    bucket: String,

    /// Firestore database id
    #[arg(long, env = env::DATABASE, default_value = store::config::DEFAULT_DATABASE)]
    database: String,

    /// Collection holding conversion tasks
    #[arg(long, env = env::COLLECTION, default_value = store::config::DEFAULT_COLLECTION)]
    collection: String,

    /// Service-account key file
    #[arg(long, env = env::CREDENTIALS_FILE)]
    credentials: Option<PathBuf>,

    /// Pre-issued OAuth2 access token (takes precedence over --credentials)
    #[arg(long, env = env::ACCESS_TOKEN, hide_env_values = true)]
    access_token: Option<String>,

    /// Firestore emulator host:port
    #[arg(long, env = env::FIRESTORE_EMULATOR_HOST)]
    firestore_emulator: Option<String>,

    /// Storage emulator host:port
    #[arg(long, env = env::STORAGE_EMULATOR_HOST)]
    storage_emulator: Option<String>,
}

impl StoreArgs {
    fn into_config(self) -> Result<StoreConfig> {
        let emulator = self.firestore_emulator.is_some() || self.storage_emulator.is_some();
        let credentials = Credentials::resolve(self.access_token, self.credentials, emulator)?;

        let mut config = StoreConfig::new(self.project_id, self.bucket, credentials);
        config.database = self.database;
        config.collection = self.collection;
        if let Some(host) = &self.firestore_emulator {
            config.firestore_url = store::config::emulator_firestore_url(host);
        }
        if let Some(host) = &self.storage_emulator {
            config.storage_url = store::config::emulator_storage_url(host);
        }
        Ok(config)
    }
}

#[derive(Args)]
struct BlenderArgs {
    /// Blender executable
    #[arg(long, env = "BLENDER_PATH", default_value = "blender")]
    blender_path: PathBuf,
}

impl BlenderArgs {
    fn into_converter(self) -> BlenderConverter {
        BlenderConverter::new(ConverterConfig {
            blender_path: self.blender_path,
            ..Default::default()
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present, before clap reads env fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Worker {
            store,
            blender,
            poll_interval,
            status_field,
            pending_value,
            processed_prefix,
            workspace_dir,
            once,
        } => {
            info!("Initializing worker...");

            let store_config = store.into_config()?;
            let clients = store::connect(&store_config)?;
            info!(
                "Using project {} (collection {}, bucket {})",
                store_config.project_id, store_config.collection, store_config.bucket
            );

            let config = WorkerConfig::builder()
                .poll_interval_secs(poll_interval)
                .pending_predicate(&status_field, &pending_value)
                .processed_prefix(&processed_prefix)
                .workspace_root(workspace_dir)
                .build();

            let processor = TaskProcessor::new(
                config.clone(),
                clients.objects,
                Arc::new(blender.into_converter()),
            );
            let runner = TaskRunner::new(clients.documents, config, processor);

            if once {
                info!("Running a single poll cycle...");
                let count = runner.run_once().await?;
                println!("Processed {} task(s)", count);
            } else {
                let shutdown = runner.shutdown_handle();
                setup_signal_handler(shutdown);

                runner.run().await?;
            }
        }

        Commands::Convert {
            input,
            output,
            blender,
        } => {
            if !input.is_file() {
                bail!("Input file not found: {}", input.display());
            }

            // Blender resolves relative paths against its own working directory
            let input = absolute(&input)?;
            let output = absolute(&output)?;

            let scratch = tempfile::Builder::new().prefix("ifc-convert-").tempdir()?;
            let job = ConversionJob {
                workspace: scratch.path().to_path_buf(),
                source_file: input,
                target_file: output,
            };

            let converter = blender.into_converter();
            converter.convert(&job).await?;

            if !job.target_file.exists() {
                bail!(
                    "Blender finished but no GLTF was written to {}",
                    job.target_file.display()
                );
            }

            println!("Converted: {}", job.target_file.display());
            let sidecar = job.sidecar_file();
            if sidecar.exists() {
                println!("  Buffer: {}", sidecar.display());
            }
        }

        Commands::Enqueue {
            file,
            upload_prefix,
            store,
        } => {
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .context("Input path has no file name")?;
            if !file_name.to_lowercase().ends_with(".ifc") {
                bail!("Only .ifc files can be enqueued: {}", file_name);
            }

            let clients = store::connect(&store.into_config()?)?;

            let now = Utc::now();
            let object_path = format!(
                "{}/{}_{}",
                upload_prefix.trim_end_matches('/'),
                now.timestamp_millis(),
                file_name
            );

            clients.objects.upload(&file, &object_path).await?;
            let task_id = clients
                .documents
                .create_task(&NewTask {
                    file_path: object_path.clone(),
                    file_name: Some(file_name),
                    timestamp: now,
                })
                .await?;

            println!("Task created:");
            println!("  ID: {}", task_id);
            println!("  File: {}", object_path);
        }
    }

    Ok(())
}
