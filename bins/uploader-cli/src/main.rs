//! # Uploader CLI - Local Pipeline Runner
//!
//! Drives the ingestion handlers against a filesystem-backed object store,
//! so the whole pipeline can be exercised without AWS:
//!
//! ```bash
//! # Push an event batch (the file holds the request body)
//! uploader-cli --offline --dataset-file dataset.json push envelope.json
//!
//! # Push through the queue path and drain the queue in-process
//! uploader-cli --offline --dataset-file dataset.json push envelope.json --drain
//!
//! # Issue signed upload credentials for a file-typed dataset
//! uploader-cli upload envelope.json
//! ```
//!
//! In `--offline` mode the metadata service, status API, authorizer and
//! email gateway are replaced by in-memory stand-ins; otherwise the real
//! HTTP endpoints from the environment are used. The queue and lock table
//! are always in-memory: this binary is a single-process runner, not a
//! deployment target.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use object_store::local::LocalFileSystem;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uploader_core::{Config, Dataset, EventQueue, RequestEnvelope};
use uploader_handlers::{
    generate_signed_post, handle_queue_message, push_dataset_events, Registry,
};
use uploader_io::{
    AwsCredentials, EmailClient, HttpAuthorizer, MemoryEventQueue, MemoryLockStore,
    MemoryMetadataApi, MemoryStatusApi, MemorySubscriptionStore, MetadataClient,
    RecordingEmailGateway, SchemaDriftNotifier, SignedPostGenerator, StaticAuthorizer,
    StatusClient, TableStore, WriteLock,
};

#[derive(Parser, Debug)]
#[command(name = "uploader-cli")]
#[command(about = "Local runner for the dataset uploader pipeline")]
struct Args {
    /// Directory backing the local object store
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Use in-memory stand-ins for the metadata, status, authorizer and
    /// email services instead of the HTTP endpoints from the environment
    #[arg(long)]
    offline: bool,

    /// Dataset record (JSON) to register in the offline metadata service
    #[arg(long)]
    dataset_file: Option<PathBuf>,

    /// Bearer token to attach to the request
    #[arg(long)]
    token: Option<String>,

    /// Principal id resolved by the gateway
    #[arg(long)]
    principal: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push a dataset event batch (file holds the request body)
    Push {
        envelope: PathBuf,
        /// Drain the in-process queue after pushing (exercises the v2 path)
        #[arg(long)]
        drain: bool,
    },
    /// Request signed upload credentials (file holds the request body)
    Upload { envelope: PathBuf },
}

fn offline_config() -> Config {
    Config {
        bucket: "local".into(),
        region: "eu-west-1".into(),
        metadata_api_url: "offline".into(),
        status_api_url: "offline".into(),
        event_queue_name: "dataset-events.fifo".into(),
        email_api_url: "offline".into(),
        email_api_key: String::new(),
        metadata_api_token: None,
        authorizer_api: None,
        enable_auth: false,
        lock_retries: 5,
        lock_wait: Duration::from_secs(5),
    }
}

async fn build_registry(
    args: &Args,
    config: Config,
) -> Result<(Registry, Arc<MemoryEventQueue>)> {
    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("create {}", args.data_dir.display()))?;
    let local = LocalFileSystem::new_with_prefix(&args.data_dir)
        .with_context(|| format!("open object store at {}", args.data_dir.display()))?;
    let store = TableStore::new(Arc::new(local), &config.bucket);

    let queue = Arc::new(MemoryEventQueue::default());
    let lock = WriteLock::from_config(Arc::new(MemoryLockStore::default()), &config);
    let subscriptions = Arc::new(MemorySubscriptionStore::default());

    let registry = if args.offline {
        let metadata = Arc::new(MemoryMetadataApi::default());
        if let Some(path) = &args.dataset_file {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            let dataset: Dataset = serde_json::from_str(&raw).context("parse dataset record")?;
            info!("registered dataset '{}'", dataset.id);
            metadata.put_dataset(dataset).await;
        }
        Registry {
            store,
            metadata,
            lock,
            queue: queue.clone(),
            notifier: SchemaDriftNotifier::new(
                subscriptions,
                Arc::new(RecordingEmailGateway::default()),
            ),
            status: Arc::new(MemoryStatusApi::default()),
            authorizer: Arc::new(StaticAuthorizer::allow_all()),
            signed_post: SignedPostGenerator::new(
                AwsCredentials {
                    access_key_id: "offline".into(),
                    secret_access_key: "offline".into(),
                    session_token: None,
                },
                &config.region,
                &config.bucket,
            ),
            config,
        }
    } else {
        let authorizer: Arc<dyn uploader_core::ResourceAuthorizer> =
            match &config.authorizer_api {
                Some(url) => Arc::new(HttpAuthorizer::new(url)),
                None => Arc::new(StaticAuthorizer::allow_all()),
            };
        Registry {
            store,
            metadata: Arc::new(MetadataClient::from_config(&config)),
            lock,
            queue: queue.clone(),
            notifier: SchemaDriftNotifier::new(
                subscriptions,
                Arc::new(EmailClient::from_config(&config)),
            ),
            status: Arc::new(StatusClient::from_config(&config)),
            authorizer,
            signed_post: SignedPostGenerator::from_env(&config)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?,
            config,
        }
    };

    Ok((registry, queue))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = if args.offline {
        offline_config()
    } else {
        Config::from_env().context("read configuration from the environment")?
    };
    let (registry, queue) = build_registry(&args, config).await?;

    match &args.command {
        Command::Push { envelope, drain } => {
            let request = read_envelope(&args, envelope)?;
            let response = push_dataset_events(&registry, &request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            if *drain {
                while let Some(message) = queue
                    .receive()
                    .await
                    .map_err(|e| anyhow::anyhow!(e.to_string()))?
                {
                    let edition_id = handle_queue_message(&registry, &message)
                        .await
                        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
                    info!("queue message handled, edition {}", edition_id);
                }
            }
        }
        Command::Upload { envelope } => {
            let request = read_envelope(&args, envelope)?;
            let response = generate_signed_post(&registry, &request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }
    Ok(())
}

fn read_envelope(args: &Args, path: &PathBuf) -> Result<RequestEnvelope> {
    let body =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(RequestEnvelope {
        body,
        authorization: args.token.as_ref().map(|t| format!("Bearer {t}")),
        principal_id: args.principal.clone(),
    })
}
