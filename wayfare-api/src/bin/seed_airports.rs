//! Load the European airport dataset into the airport autocomplete index.
//!
//! Usage:
//!   seed-airports --search-url http://localhost:9200

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wayfare_api::seed;
use wayfare_search::{SearchClient, SearchSettings};

#[derive(Parser, Debug)]
#[command(name = "seed-airports")]
#[command(about = "Index the static European airport dataset")]
#[command(version)]
struct Args {
    /// Document search base URL
    #[arg(long, env = "DOCUMENT_SEARCH_URL", default_value = "http://localhost:9200")]
    search_url: String,

    /// Airport index name
    #[arg(long, default_value = "airports")]
    index: String,

    /// Also install the stored search templates
    #[arg(long)]
    with_templates: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,wayfare_search=debug")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let airports = seed::european_airports()?;

    let client = SearchClient::new(
        SearchSettings { url: args.search_url.clone(), airports_index: args.index.clone(), ..Default::default() },
        None,
    )
    .context("invalid search settings")?;

    client.ensure_indices().await.context("failed to create indices")?;
    if args.with_templates {
        client.put_templates().await.context("failed to install search templates")?;
    }

    let summary = client.index_airports(&airports).await.context("bulk indexing failed")?;
    for item in &summary.errors {
        tracing::warn!(error = ?item, "airport not indexed");
    }
    tracing::info!(
        index = %args.index,
        indexed = summary.indexed,
        failed = summary.failed,
        "airport seeding finished"
    );
    if summary.failed > 0 {
        anyhow::bail!("{} airports failed to index", summary.failed);
    }
    Ok(())
}
