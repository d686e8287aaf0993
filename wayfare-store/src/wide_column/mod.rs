//! CQL-backed inventory, destination and route tables.

pub mod codec;
pub mod schema;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use scylla::client::execution_profile::ExecutionProfile;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::deserialize::row::DeserializeRow;
use scylla::serialize::row::SerializeRow;
use scylla::statement::batch::{Batch, BatchType};
use scylla::statement::prepared::PreparedStatement;
use scylla::statement::Consistency;
use scylla::value::CqlValue;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::app_config::WideColumnConfig;
use crate::error::{StoreError, StoreResult};
use crate::gate::QueryGate;
use codec::{
    date_to_cql, route_by_duration_key, route_values, theme_entry_key, theme_entry_values, timestamp_to_cql,
    InventoryRow, ObservationRow, RouteRow, SearchResultRow, ThemeDefinitionRow, ThemeEntryRow,
};
use wayfare_core::destination::{Destination, RouteDuration, Theme, ThemeDefinition, ThemeEntry};
use wayfare_core::inventory::{
    inventory_ttl, price_history_ttl, search_results_ttl, InventoryRecord, PriceObservation, SearchResultRecord,
};
use wayfare_core::repository::{DestinationStore, InventoryStore, RouteStore};
use wayfare_resilience::{presets, Executor};
use wayfare_shared::{AppError, AppResult};

/// Upper bound on statements in one logged batch.
pub const MAX_BATCH_STATEMENTS: usize = 100;

const INVENTORY_COLUMNS: &str = "origin, destination, departure_date, search_timestamp, id, offer_id, provider, \
    airline, price, currency, stops, duration_minutes, cabin_class, bookable_seats, offer_data";
const OBSERVATION_COLUMNS: &str = "route, price_date, search_timestamp, id, price, currency, airline, provider";
const SEARCH_RESULT_COLUMNS: &str = "search_request_id, search_timestamp, id, origin_code, destination_code, \
    departure_date, price, currency, offer_data";
const ROUTE_COLUMNS: &str =
    "origin_airport, destination_airport, total_duration_minutes, distance_km, is_direct, typical_stops";
const THEME_ENTRY_COLUMNS: &str = "theme_name, theme_score, destination_id, iata_code, city, country, country_code, \
    average_flight_time, price_range, popularity_score";

fn placeholders(columns: &str) -> String {
    vec!["?"; columns.split(',').count()].join(", ")
}

fn insert_cql(table: &str, columns: &str, ttl: Option<chrono::Duration>) -> String {
    let mut cql = format!("INSERT INTO {} ({}) VALUES ({})", table, columns, placeholders(columns));
    if let Some(ttl) = ttl {
        cql.push_str(&format!(" USING TTL {}", ttl.num_seconds()));
    }
    cql
}

/// One statement with its bind values; a group of these is never split across batches.
type Write = (PreparedStatement, Vec<CqlValue>);

/// Pack whole groups into batches of at most `limit` statements. A group larger
/// than `limit` gets a batch of its own.
fn pack_groups<T>(groups: Vec<Vec<T>>, limit: usize) -> Vec<Vec<T>> {
    let mut batches: Vec<Vec<T>> = Vec::new();
    let mut current: Vec<T> = Vec::new();
    for group in groups {
        if !current.is_empty() && current.len() + group.len() > limit {
            batches.push(std::mem::take(&mut current));
        }
        current.extend(group);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

struct Statements {
    insert_inventory: PreparedStatement,
    select_inventory: PreparedStatement,
    insert_observation: PreparedStatement,
    select_observations: PreparedStatement,
    insert_search_result: PreparedStatement,
    select_search_results: PreparedStatement,
    insert_route: PreparedStatement,
    select_route: PreparedStatement,
    select_routes_from_origin: PreparedStatement,
    insert_route_by_duration: PreparedStatement,
    delete_route_by_duration: PreparedStatement,
    select_routes_by_duration: PreparedStatement,
    insert_destination: PreparedStatement,
    delete_destination: PreparedStatement,
    select_destination: PreparedStatement,
    select_destination_by_code: PreparedStatement,
    insert_theme_entry: PreparedStatement,
    delete_theme_entry: PreparedStatement,
    select_theme_entries: PreparedStatement,
    insert_country_entry: PreparedStatement,
    delete_country_entry: PreparedStatement,
    select_country_entries: PreparedStatement,
    insert_theme_definition: PreparedStatement,
    select_theme_definitions: PreparedStatement,
    insert_recommendation: PreparedStatement,
    select_recommendation: PreparedStatement,
}

impl Statements {
    async fn prepare(session: &Session) -> StoreResult<Self> {
        let prepare = |cql: String| async move { session.prepare(cql).await.map_err(StoreError::wide_column) };

        Ok(Self {
            insert_inventory: prepare(insert_cql("flight_inventory", INVENTORY_COLUMNS, Some(inventory_ttl()))).await?,
            select_inventory: prepare(format!(
                "SELECT {} FROM flight_inventory WHERE origin = ? AND destination = ? AND departure_date = ?",
                INVENTORY_COLUMNS
            ))
            .await?,
            insert_observation: prepare(insert_cql(
                "price_history_cass",
                OBSERVATION_COLUMNS,
                Some(price_history_ttl()),
            ))
            .await?,
            select_observations: prepare(format!(
                "SELECT {} FROM price_history_cass WHERE route = ? AND price_date >= ? AND price_date <= ?",
                OBSERVATION_COLUMNS
            ))
            .await?,
            insert_search_result: prepare(insert_cql(
                "search_results",
                SEARCH_RESULT_COLUMNS,
                Some(search_results_ttl()),
            ))
            .await?,
            select_search_results: prepare(format!(
                "SELECT {} FROM search_results WHERE search_request_id = ?",
                SEARCH_RESULT_COLUMNS
            ))
            .await?,
            insert_route: prepare(insert_cql("flight_routes", ROUTE_COLUMNS, None)).await?,
            select_route: prepare(format!(
                "SELECT {} FROM flight_routes WHERE origin_airport = ? AND destination_airport = ?",
                ROUTE_COLUMNS
            ))
            .await?,
            select_routes_from_origin: prepare(format!(
                "SELECT {} FROM flight_routes WHERE origin_airport = ?",
                ROUTE_COLUMNS
            ))
            .await?,
            insert_route_by_duration: prepare(insert_cql("flight_routes_by_duration", ROUTE_COLUMNS, None)).await?,
            delete_route_by_duration: prepare(
                "DELETE FROM flight_routes_by_duration \
                 WHERE origin_airport = ? AND total_duration_minutes = ? AND destination_airport = ?"
                    .to_string(),
            )
            .await?,
            select_routes_by_duration: prepare(format!(
                "SELECT {} FROM flight_routes_by_duration \
                 WHERE origin_airport = ? AND total_duration_minutes >= ? AND total_duration_minutes <= ?",
                ROUTE_COLUMNS
            ))
            .await?,
            insert_destination: prepare(insert_cql("destinations", "id, iata_code, data, updated_at", None)).await?,
            delete_destination: prepare("DELETE FROM destinations WHERE id = ?".to_string()).await?,
            select_destination: prepare("SELECT data FROM destinations WHERE id = ?".to_string()).await?,
            select_destination_by_code: prepare("SELECT data FROM destinations WHERE iata_code = ?".to_string())
                .await?,
            insert_theme_entry: prepare(insert_cql("destinations_by_theme", THEME_ENTRY_COLUMNS, None)).await?,
            delete_theme_entry: prepare(
                "DELETE FROM destinations_by_theme WHERE theme_name = ? AND theme_score = ? AND destination_id = ?"
                    .to_string(),
            )
            .await?,
            select_theme_entries: prepare(format!(
                "SELECT {} FROM destinations_by_theme WHERE theme_name = ? AND theme_score >= ? LIMIT ?",
                THEME_ENTRY_COLUMNS
            ))
            .await?,
            insert_country_entry: prepare(insert_cql(
                "destinations_by_country",
                "country_code, destination_id, iata_code, city",
                None,
            ))
            .await?,
            delete_country_entry: prepare(
                "DELETE FROM destinations_by_country WHERE country_code = ? AND destination_id = ?".to_string(),
            )
            .await?,
            select_country_entries: prepare(
                "SELECT destination_id FROM destinations_by_country WHERE country_code = ?".to_string(),
            )
            .await?,
            insert_theme_definition: prepare(insert_cql(
                "theme_definitions",
                "theme_key, display_name, description, icon",
                None,
            ))
            .await?,
            select_theme_definitions: prepare(
                "SELECT theme_key, display_name, description, icon FROM theme_definitions".to_string(),
            )
            .await?,
            insert_recommendation: prepare(
                "INSERT INTO destination_recommendations_cache (cache_key, payload, created_at) \
                 VALUES (?, ?, ?) USING TTL ?"
                    .to_string(),
            )
            .await?,
            select_recommendation: prepare(
                "SELECT payload FROM destination_recommendations_cache WHERE cache_key = ?".to_string(),
            )
            .await?,
        })
    }
}

/// Wide-column store over one CQL session. Reads and writes run at QUORUM;
/// every call goes through the `wide_column` executor.
#[derive(Clone)]
pub struct WideColumnStore {
    session: Arc<Session>,
    statements: Arc<Statements>,
    executor: Executor,
    gate: QueryGate,
}

impl WideColumnStore {
    pub async fn connect(config: &WideColumnConfig) -> StoreResult<Self> {
        let profile = ExecutionProfile::builder()
            .consistency(Consistency::Quorum)
            .request_timeout(Some(Duration::from_secs(10)))
            .build();

        let session: Session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .default_execution_profile_handle(profile.into_handle())
            .build()
            .await
            .map_err(StoreError::wide_column)?;

        schema::ensure(&session, &config.keyspace, u32::from(config.replication_factor)).await?;
        let statements = Statements::prepare(&session).await?;

        info!(hosts = ?config.hosts, keyspace = %config.keyspace, "Connected to wide-column store");
        Ok(Self {
            session: Arc::new(session),
            statements: Arc::new(statements),
            executor: Executor::global(presets::database("wide_column")),
            gate: QueryGate::new("wide_column", config.max_concurrent_queries),
        })
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    async fn run<T, F, Fut>(&self, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let gate = &self.gate;
        self.executor
            .execute(|| {
                let attempt = op();
                async move {
                    let _permit = gate.acquire().await?;
                    attempt.await.map_err(AppError::from)
                }
            })
            .await
    }

    async fn select<R, V>(&self, statement: &PreparedStatement, values: V) -> StoreResult<Vec<R>>
    where
        R: for<'frame> DeserializeRow<'frame, 'frame>,
        V: SerializeRow,
    {
        let result = self
            .session
            .execute_unpaged(statement, values)
            .await
            .map_err(StoreError::wide_column)?
            .into_rows_result()
            .map_err(StoreError::wide_column)?;
        let rows = result
            .rows::<R>()
            .map_err(StoreError::wide_column)?
            .collect::<Result<Vec<R>, _>>()
            .map_err(StoreError::wide_column)?;
        Ok(rows)
    }

    /// Same statement for every row, split into logged batches.
    async fn write_rows<V>(&self, statement: &PreparedStatement, rows: &[V]) -> StoreResult<usize>
    where
        V: SerializeRow + Clone,
    {
        for chunk in rows.chunks(MAX_BATCH_STATEMENTS) {
            let mut batch = Batch::new(BatchType::Logged);
            for _ in chunk {
                batch.append_statement(statement.clone());
            }
            self.session.batch(&batch, chunk.to_vec()).await.map_err(StoreError::wide_column)?;
        }
        debug!(rows = rows.len(), "wide-column rows written");
        Ok(rows.len())
    }

    /// Mixed statements; each group lands in a single logged batch.
    async fn write_groups(&self, groups: Vec<Vec<Write>>) -> StoreResult<()> {
        for writes in pack_groups(groups, MAX_BATCH_STATEMENTS) {
            let mut batch = Batch::new(BatchType::Logged);
            let mut values = Vec::with_capacity(writes.len());
            for (statement, row) in writes {
                batch.append_statement(statement);
                values.push(row);
            }
            self.session.batch(&batch, values).await.map_err(StoreError::wide_column)?;
        }
        Ok(())
    }

    async fn load_destination(&self, statement: &PreparedStatement, key: CqlValue) -> StoreResult<Option<Destination>> {
        let rows: Vec<(String,)> = self.select(statement, vec![key]).await?;
        rows.into_iter()
            .next()
            .map(|(data,)| serde_json::from_str::<Destination>(&data).map_err(StoreError::from))
            .transpose()
    }

    /// Record, theme and country rows for `destination`, preceded by deletes of
    /// projection rows the previous versions left behind.
    fn destination_writes(&self, destination: &Destination, previous: &[Destination]) -> StoreResult<Vec<Write>> {
        let st = &self.statements;
        let entries = ThemeEntry::project(destination);
        let mut writes: Vec<Write> = Vec::new();

        for old in previous {
            for stale in ThemeEntry::project(old) {
                let still_present = entries
                    .iter()
                    .any(|e| e.theme == stale.theme && e.theme_score == stale.theme_score && e.destination_id == stale.destination_id);
                if !still_present {
                    writes.push((st.delete_theme_entry.clone(), theme_entry_key(&stale)));
                }
            }
            if old.id != destination.id || old.country_code != destination.country_code {
                writes.push((
                    st.delete_country_entry.clone(),
                    vec![CqlValue::Text(old.country_code.clone()), CqlValue::Uuid(old.id)],
                ));
            }
            if old.id != destination.id {
                writes.push((st.delete_destination.clone(), vec![CqlValue::Uuid(old.id)]));
            }
        }

        writes.push((
            st.insert_destination.clone(),
            vec![
                CqlValue::Uuid(destination.id),
                CqlValue::Text(destination.iata_code.clone()),
                CqlValue::Text(serde_json::to_string(destination)?),
                CqlValue::Timestamp(timestamp_to_cql(Utc::now())),
            ],
        ));
        for entry in &entries {
            writes.push((st.insert_theme_entry.clone(), theme_entry_values(entry)));
        }
        writes.push((
            st.insert_country_entry.clone(),
            vec![
                CqlValue::Text(destination.country_code.clone()),
                CqlValue::Uuid(destination.id),
                CqlValue::Text(destination.iata_code.clone()),
                CqlValue::Text(destination.city.clone()),
            ],
        ));
        Ok(writes)
    }
}

#[async_trait]
impl DestinationStore for WideColumnStore {
    async fn upsert_destination(&self, destination: &Destination) -> AppResult<()> {
        destination.validate()?;
        let st = &self.statements;
        self.run(|| async move {
            let mut previous = Vec::new();
            if let Some(existing) = self.load_destination(&st.select_destination, CqlValue::Uuid(destination.id)).await? {
                previous.push(existing);
            }
            // The code is unique: a different record holding it is replaced.
            if let Some(holder) = self
                .load_destination(&st.select_destination_by_code, CqlValue::Text(destination.iata_code.clone()))
                .await?
            {
                if holder.id != destination.id {
                    previous.push(holder);
                }
            }

            let writes = self.destination_writes(destination, &previous)?;
            self.write_groups(vec![writes]).await
        })
        .await
    }

    async fn get_destination(&self, id: Uuid) -> AppResult<Option<Destination>> {
        let st = &self.statements;
        self.run(|| self.load_destination(&st.select_destination, CqlValue::Uuid(id))).await
    }

    async fn get_destination_by_code(&self, iata_code: &str) -> AppResult<Option<Destination>> {
        let st = &self.statements;
        self.run(|| self.load_destination(&st.select_destination_by_code, CqlValue::Text(iata_code.to_string())))
            .await
    }

    async fn destinations_by_theme(&self, theme: Theme, min_score: u8, limit: usize) -> AppResult<Vec<ThemeEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let st = &self.statements;
        let limit = i32::try_from(limit).unwrap_or(i32::MAX);
        self.run(|| async move {
            let rows: Vec<ThemeEntryRow> = self
                .select(&st.select_theme_entries, (theme.as_str(), i32::from(min_score), limit))
                .await?;
            rows.into_iter().map(ThemeEntry::try_from).collect::<StoreResult<Vec<_>>>()
        })
        .await
    }

    async fn destinations_by_country(&self, country_code: &str) -> AppResult<Vec<Uuid>> {
        let st = &self.statements;
        self.run(|| async move {
            let rows: Vec<(Uuid,)> = self.select(&st.select_country_entries, (country_code,)).await?;
            Ok::<_, StoreError>(rows.into_iter().map(|(id,)| id).collect())
        })
        .await
    }

    async fn theme_definitions(&self) -> AppResult<Vec<ThemeDefinition>> {
        let st = &self.statements;
        self.run(|| async move {
            let rows: Vec<ThemeDefinitionRow> = self.select(&st.select_theme_definitions, ()).await?;
            let mut definitions = rows
                .into_iter()
                .map(ThemeDefinition::try_from)
                .collect::<StoreResult<Vec<_>>>()?;
            definitions.sort_by_key(|d| d.theme);
            Ok::<_, StoreError>(definitions)
        })
        .await
    }

    async fn upsert_theme_definition(&self, definition: &ThemeDefinition) -> AppResult<()> {
        let st = &self.statements;
        self.run(|| async move {
            self.session
                .execute_unpaged(
                    &st.insert_theme_definition,
                    (
                        definition.theme.as_str(),
                        definition.display_name.as_str(),
                        definition.description.as_str(),
                        definition.icon.as_deref(),
                    ),
                )
                .await
                .map_err(StoreError::wide_column)?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn routes_from_origin(&self, origin: &str) -> AppResult<Vec<RouteDuration>> {
        let st = &self.statements;
        self.run(|| async move {
            let rows: Vec<RouteRow> = self.select(&st.select_routes_from_origin, (origin,)).await?;
            rows.into_iter().map(RouteDuration::try_from).collect::<StoreResult<Vec<_>>>()
        })
        .await
    }

    async fn routes_by_duration(&self, origin: &str, min_minutes: u32, max_minutes: u32) -> AppResult<Vec<RouteDuration>> {
        if min_minutes > max_minutes {
            return Ok(Vec::new());
        }
        let st = &self.statements;
        let min = i32::try_from(min_minutes).unwrap_or(i32::MAX);
        let max = i32::try_from(max_minutes).unwrap_or(i32::MAX);
        self.run(|| async move {
            let rows: Vec<RouteRow> = self.select(&st.select_routes_by_duration, (origin, min, max)).await?;
            rows.into_iter().map(RouteDuration::try_from).collect::<StoreResult<Vec<_>>>()
        })
        .await
    }

    async fn get_cached_recommendation(&self, cache_key: &str) -> AppResult<Option<String>> {
        let st = &self.statements;
        self.run(|| async move {
            let rows: Vec<(String,)> = self.select(&st.select_recommendation, (cache_key,)).await?;
            Ok::<_, StoreError>(rows.into_iter().next().map(|(payload,)| payload))
        })
        .await
    }

    async fn put_cached_recommendation(&self, cache_key: &str, payload: &str, ttl: Duration) -> AppResult<()> {
        let st = &self.statements;
        let ttl_seconds = i32::try_from(ttl.as_secs().max(1)).unwrap_or(i32::MAX);
        self.run(|| async move {
            self.session
                .execute_unpaged(
                    &st.insert_recommendation,
                    (cache_key, payload, timestamp_to_cql(Utc::now()), ttl_seconds),
                )
                .await
                .map_err(StoreError::wide_column)?;
            Ok::<_, StoreError>(())
        })
        .await
    }
}

#[async_trait]
impl RouteStore for WideColumnStore {
    /// Both route tables are written per route in one batch. A route whose
    /// duration changed loses its old `flight_routes_by_duration` row.
    async fn upsert_routes(&self, routes: &[RouteDuration]) -> AppResult<usize> {
        for route in routes {
            route.validate()?;
        }
        let st = &self.statements;
        self.run(|| async move {
            let mut groups = Vec::with_capacity(routes.len());
            for route in routes {
                let existing: Vec<RouteRow> = self
                    .select(&st.select_route, (route.origin.as_str(), route.destination.as_str()))
                    .await?;
                let mut writes: Vec<Write> = Vec::with_capacity(3);
                if let Some(old) = existing.into_iter().next() {
                    let old = RouteDuration::try_from(old)?;
                    if old.duration_minutes != route.duration_minutes {
                        writes.push((
                            st.delete_route_by_duration.clone(),
                            route_by_duration_key(&old.origin, old.duration_minutes as i32, &old.destination),
                        ));
                    }
                }
                writes.push((st.insert_route.clone(), route_values(route)));
                writes.push((st.insert_route_by_duration.clone(), route_values(route)));
                groups.push(writes);
            }
            self.write_groups(groups).await?;
            Ok::<_, StoreError>(routes.len())
        })
        .await
    }
}

#[async_trait]
impl InventoryStore for WideColumnStore {
    async fn write_inventory(&self, rows: &[InventoryRecord]) -> AppResult<usize> {
        let encoded = rows.iter().map(InventoryRow::encode).collect::<StoreResult<Vec<_>>>()?;
        let st = &self.statements;
        self.run(|| self.write_rows(&st.insert_inventory, &encoded)).await
    }

    async fn write_observations(&self, rows: &[PriceObservation]) -> AppResult<usize> {
        let encoded: Vec<ObservationRow> = rows.iter().map(ObservationRow::from).collect();
        let st = &self.statements;
        self.run(|| self.write_rows(&st.insert_observation, &encoded)).await
    }

    async fn write_search_results(&self, rows: &[SearchResultRecord]) -> AppResult<usize> {
        let encoded = rows.iter().map(SearchResultRow::encode).collect::<StoreResult<Vec<_>>>()?;
        let st = &self.statements;
        self.run(|| self.write_rows(&st.insert_search_result, &encoded)).await
    }

    async fn inventory(&self, origin: &str, destination: &str, departure_date: NaiveDate) -> AppResult<Vec<InventoryRecord>> {
        let st = &self.statements;
        let date = date_to_cql(departure_date);
        self.run(|| async move {
            let rows: Vec<InventoryRow> = self.select(&st.select_inventory, (origin, destination, date)).await?;
            rows.into_iter().map(InventoryRecord::try_from).collect::<StoreResult<Vec<_>>>()
        })
        .await
    }

    async fn observations(&self, route: &str, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<PriceObservation>> {
        let st = &self.statements;
        let (from, to) = (date_to_cql(from), date_to_cql(to));
        self.run(|| async move {
            let rows: Vec<ObservationRow> = self.select(&st.select_observations, (route, from, to)).await?;
            rows.into_iter().map(PriceObservation::try_from).collect::<StoreResult<Vec<_>>>()
        })
        .await
    }

    async fn search_results(&self, search_request_id: &str) -> AppResult<Vec<SearchResultRecord>> {
        let st = &self.statements;
        self.run(|| async move {
            let rows: Vec<SearchResultRow> = self.select(&st.select_search_results, (search_request_id,)).await?;
            rows.into_iter().map(SearchResultRecord::try_from).collect::<StoreResult<Vec<_>>>()
        })
        .await
    }
}
