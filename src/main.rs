use std::path::PathBuf;

use anyhow::{Context, Error};
use clap::Parser;
use clap_stdin::MaybeStdin;
use mdoc_holder::config::HolderConfig;
use mdoc_holder::definitions::ConnectionMethod;
use mdoc_holder::document::DocumentStore;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON holder configuration. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the storage directory of the configuration.
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, clap::Subcommand)]
enum Action {
    /// Decode a hex encoded CBOR array of device engagement connection methods.
    DecodeMethods {
        /// Hex encoded payload.
        payload: MaybeStdin<String>,
    },
    /// List the names of the stored documents.
    List,
    /// Print the metadata and credentials of a stored document.
    Inspect { name: String },
    /// Delete a stored document and the keys of its credentials.
    Delete { name: String },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Action::DecodeMethods { payload } = &args.action {
        return print_methods(payload.trim());
    }

    let mut config = match &args.config {
        Some(path) => HolderConfig::load(path)
            .await
            .context("could not load configuration")?,
        None => HolderConfig::default(),
    };
    if args.storage_dir.is_some() {
        config.storage_dir = args.storage_dir;
    }
    let holder = config.bootstrap().await.context("could not open storage")?;
    let store = holder.document_store;

    match args.action {
        Action::DecodeMethods { .. } => Ok(()),
        Action::List => list(&store).await,
        Action::Inspect { name } => inspect(&store, &name).await,
        Action::Delete { name } => store
            .delete_document(&name)
            .await
            .with_context(|| format!("could not delete {name}")),
    }
}

fn decode_methods(payload: &str) -> Result<Value, Error> {
    let bytes = hex::decode(payload).context("payload is not valid hex")?;
    let decoded =
        ConnectionMethod::decode_list(&bytes).context("could not decode connection methods")?;
    Ok(json!({
        "methods": decoded.methods.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "skipped": decoded.skipped,
        "rejected": decoded
            .rejected
            .iter()
            .map(|(index, e)| json!({ "index": index, "error": e.to_string() }))
            .collect::<Vec<_>>(),
    }))
}

fn print_methods(payload: &str) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(&decode_methods(payload)?)?);
    Ok(())
}

async fn list(store: &DocumentStore) -> Result<(), Error> {
    let mut names = store
        .list_documents()
        .await
        .context("could not list documents")?;
    names.sort();
    println!("{}", serde_json::to_string_pretty(&names)?);
    Ok(())
}

async fn inspect(store: &DocumentStore, name: &str) -> Result<(), Error> {
    let document = store
        .lookup_document(name)
        .await
        .with_context(|| format!("could not load {name}"))?
        .with_context(|| format!("no document named {name}"))?;
    let metadata = document.metadata().await;
    let created_at = metadata
        .created_at()
        .map(|t| t.format(&Rfc3339))
        .transpose()?;
    let credentials = document
        .credentials()
        .await
        .into_iter()
        .map(|c| {
            json!({
                "identifier": c.identifier,
                "domain": c.domain,
                "type": c.credential_type,
                "secure_area": c.secure_area_identifier,
                "certified": c.certified,
                "usage_count": c.usage_count,
            })
        })
        .collect::<Vec<_>>();
    let out = json!({
        "name": document.name(),
        "provisioned": metadata.provisioned,
        "display_name": metadata.display_name,
        "type_display_name": metadata.type_display_name,
        "created_at": created_at,
        "credentials": credentials,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
