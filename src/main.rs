use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use cloud_drive::store::DiskObjectStore;
use cloud_drive::{EngineConfig, StorageEngine, UploadRequest};

#[derive(Parser)]
#[command(name = "cloud-drive")]
#[command(about = "Versioned file storage engine", long_about = None)]
struct Cli {
    /// Base directory for the object store.
    #[arg(short, long, default_value = "./storage")]
    storage_path: PathBuf,

    /// Acting user id; a fresh one is generated when omitted.
    #[arg(short, long)]
    user: Option<Uuid>,

    /// Encrypt payloads at rest with this passphrase.
    #[arg(short, long)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file
    Upload {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Download a file's current version
    Download {
        #[arg(short = 'i', long = "file-id")]
        file_id: Uuid,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// List files owned by the acting user
    List,

    /// Hard-delete a file and all its versions
    Delete {
        #[arg(short = 'i', long = "file-id")]
        file_id: Uuid,
    },

    /// Show quota usage for the acting user
    Usage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloud_drive=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let user = cli.user.unwrap_or_else(Uuid::new_v4);

    let config = EngineConfig {
        encrypt_at_rest: cli.passphrase.is_some(),
        master_passphrase: cli.passphrase,
        ..EngineConfig::default()
    };
    let store = DiskObjectStore::new(&cli.storage_path)
        .await
        .context("opening object store")?;
    let engine = StorageEngine::new(Arc::new(store), config);
    engine.load_state().await.context("loading engine state")?;

    match cli.command {
        Commands::Upload { file } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("file name is not valid UTF-8")?
                .to_string();
            let mime = infer::get(&data)
                .map(|k| k.mime_type().to_string())
                .unwrap_or_else(|| "application/octet-stream".into());

            let (record, version) = engine
                .upload(UploadRequest::new(user, name, mime, data))
                .await?;
            println!("uploaded {} as {} (v{})", record.name, record.id, version.version_number);
        }
        Commands::Download { file_id, output } => {
            let downloaded = engine.download(file_id, user, None).await?;
            tokio::fs::write(&output, &downloaded.data)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "downloaded {} v{} ({} bytes) to {}",
                downloaded.file.name,
                downloaded.version.version_number,
                downloaded.data.len(),
                output.display()
            );
        }
        Commands::List => {
            let files = engine.list_files(user, false).await;
            if files.is_empty() {
                println!("no files");
            }
            for file in files {
                println!("{}", serde_json::to_string(&file)?);
            }
        }
        Commands::Delete { file_id } => {
            engine.hard_delete(file_id, user).await?;
            println!("deleted {}", file_id);
        }
        Commands::Usage => {
            let (used, total) = engine.usage(user).await;
            println!("{} / {} bytes used", used, total);
        }
    }

    engine.persist_state().await.context("persisting engine state")?;
    Ok(())
}
