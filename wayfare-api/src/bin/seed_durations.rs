//! Compute great-circle flight durations between every pair of seeded
//! airports and store them as routes.
//!
//! Usage:
//!   seed-durations --target relational
//!   seed-durations --target both --dry-run

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wayfare_api::seed;
use wayfare_core::geo::all_routes;
use wayfare_core::repository::RouteStore;
use wayfare_store::{Config, DbClient, PgRouteRepository, WideColumnStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    /// Relational `flight_route_durations` table.
    Relational,
    /// Wide-column route tables read by discovery.
    WideColumn,
    Both,
}

#[derive(Parser, Debug)]
#[command(name = "seed-durations")]
#[command(about = "Seed estimated flight durations between European airports")]
#[command(version)]
struct Args {
    #[arg(long, value_enum, default_value = "relational")]
    target: Target,

    /// Compute and report without writing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,wayfare_store=debug")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let airports = seed::european_airports()?;
    let routes = all_routes(&seed::locations(&airports));
    let connecting = routes.iter().filter(|r| !r.is_direct).count();
    tracing::info!(routes = routes.len(), connecting, "route durations computed");

    if args.dry_run {
        for route in routes.iter().take(10) {
            tracing::info!(
                origin = %route.origin,
                destination = %route.destination,
                minutes = route.duration_minutes,
                km = route.distance_km,
                "sample route"
            );
        }
        return Ok(());
    }

    let config = Config::load().context("failed to load config")?;

    if matches!(args.target, Target::Relational | Target::Both) {
        let db = DbClient::new(&config.database).await.context("failed to connect to postgres")?;
        db.migrate().await.context("failed to run migrations")?;
        let written = PgRouteRepository::new(db).upsert_routes(&routes).await?;
        tracing::info!(written, "relational routes stored");
    }

    if matches!(args.target, Target::WideColumn | Target::Both) {
        let store = WideColumnStore::connect(&config.wide_column)
            .await
            .context("failed to connect to wide-column store")?;
        let written = store.upsert_routes(&routes).await?;
        tracing::info!(written, "wide-column routes stored");
    }
    Ok(())
}
