//! Keyspace and table bootstrap. Every statement is idempotent so the schema
//! can be applied on each start against a cluster operators already set up.

use scylla::client::session::Session;
use tracing::info;

use crate::error::{StoreError, StoreResult};

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS flight_inventory (
        origin text,
        destination text,
        departure_date date,
        search_timestamp timestamp,
        id uuid,
        offer_id text,
        provider text,
        airline text,
        price decimal,
        currency text,
        stops int,
        duration_minutes bigint,
        cabin_class text,
        bookable_seats int,
        offer_data text,
        PRIMARY KEY ((origin, destination), departure_date, search_timestamp, id)
    ) WITH CLUSTERING ORDER BY (departure_date ASC, search_timestamp DESC, id ASC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS price_history_cass (
        route text,
        price_date date,
        search_timestamp timestamp,
        id uuid,
        price decimal,
        currency text,
        airline text,
        provider text,
        PRIMARY KEY ((route), price_date, search_timestamp, id)
    ) WITH CLUSTERING ORDER BY (price_date ASC, search_timestamp DESC, id ASC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS search_results (
        search_request_id text,
        search_timestamp timestamp,
        id uuid,
        origin_code text,
        destination_code text,
        departure_date date,
        price decimal,
        currency text,
        offer_data text,
        PRIMARY KEY ((search_request_id), search_timestamp, id)
    ) WITH CLUSTERING ORDER BY (search_timestamp DESC, id ASC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS flight_routes (
        origin_airport text,
        destination_airport text,
        total_duration_minutes int,
        distance_km double,
        is_direct boolean,
        typical_stops int,
        PRIMARY KEY ((origin_airport), destination_airport)
    ) WITH CLUSTERING ORDER BY (destination_airport ASC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS flight_routes_by_duration (
        origin_airport text,
        total_duration_minutes int,
        destination_airport text,
        distance_km double,
        is_direct boolean,
        typical_stops int,
        PRIMARY KEY ((origin_airport), total_duration_minutes, destination_airport)
    ) WITH CLUSTERING ORDER BY (total_duration_minutes ASC, destination_airport ASC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS destinations (
        id uuid PRIMARY KEY,
        iata_code text,
        data text,
        updated_at timestamp
    )
    "#,
    "CREATE INDEX IF NOT EXISTS destinations_iata_code_idx ON destinations (iata_code)",
    r#"
    CREATE TABLE IF NOT EXISTS destinations_by_theme (
        theme_name text,
        theme_score int,
        destination_id uuid,
        iata_code text,
        city text,
        country text,
        country_code text,
        average_flight_time double,
        price_range text,
        popularity_score int,
        PRIMARY KEY ((theme_name), theme_score, destination_id)
    ) WITH CLUSTERING ORDER BY (theme_score DESC, destination_id ASC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS destinations_by_country (
        country_code text,
        destination_id uuid,
        iata_code text,
        city text,
        PRIMARY KEY ((country_code), destination_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS theme_definitions (
        theme_key text PRIMARY KEY,
        display_name text,
        description text,
        icon text
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS destination_recommendations_cache (
        cache_key text PRIMARY KEY,
        payload text,
        created_at timestamp
    ) WITH default_time_to_live = 86400
    "#,
];

/// Keyspace names go into DDL verbatim, so only plain identifiers are accepted.
pub fn is_valid_keyspace(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 48
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

pub fn create_keyspace_cql(keyspace: &str, replication_factor: u32) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace,
        replication_factor.max(1)
    )
}

/// Create the keyspace and tables if missing, then switch the session to the keyspace.
pub async fn ensure(session: &Session, keyspace: &str, replication_factor: u32) -> StoreResult<()> {
    if !is_valid_keyspace(keyspace) {
        return Err(StoreError::wide_column(format!("invalid keyspace name '{}'", keyspace)));
    }

    session
        .query_unpaged(create_keyspace_cql(keyspace, replication_factor), ())
        .await
        .map_err(StoreError::wide_column)?;
    session.use_keyspace(keyspace, false).await.map_err(StoreError::wide_column)?;

    for ddl in TABLES {
        session.query_unpaged(*ddl, ()).await.map_err(StoreError::wide_column)?;
    }
    session.await_schema_agreement().await.map_err(StoreError::wide_column)?;

    info!(keyspace, tables = TABLES.len(), "Wide-column schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspace_names() {
        assert!(is_valid_keyspace("wayfare"));
        assert!(is_valid_keyspace("wayfare_test_1"));
        assert!(!is_valid_keyspace(""));
        assert!(!is_valid_keyspace("1wayfare"));
        assert!(!is_valid_keyspace("wayfare; DROP KEYSPACE system"));
    }

    #[test]
    fn test_keyspace_replication() {
        let cql = create_keyspace_cql("wayfare", 0);
        assert!(cql.contains("'replication_factor': 1"));
        assert!(cql.starts_with("CREATE KEYSPACE IF NOT EXISTS wayfare"));
    }

    #[test]
    fn test_every_statement_is_idempotent() {
        assert!(TABLES.iter().all(|ddl| ddl.contains("IF NOT EXISTS")));
        let inventory = TABLES[0];
        assert!(inventory.contains("PRIMARY KEY ((origin, destination), departure_date, search_timestamp, id)"));
    }
}
