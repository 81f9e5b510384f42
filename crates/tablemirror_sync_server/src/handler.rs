//! Request handlers for mirror endpoints.

use crate::auth::WebhookVerifier;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::event::new_change_event;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tablemirror_store::{
    ChangeEvent, EventInsert, Fields, MirrorRecord, MirrorStore, RecordQuery, SortField,
};
use tablemirror_sync_engine::{apply_delta, ChangeSet, RecordSource, ReconcileOutcome, Synchronizer};
use tracing::info;

/// Service name reported by the root endpoint.
pub const SERVICE_NAME: &str = "Airtable Integration Service";

/// Service id reported by the health endpoint.
pub const HEALTH_SERVICE_ID: &str = "airtable-integration";

/// Body of a successful table sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResponse {
    /// Always `"success"`.
    pub status: String,
    /// Records newly inserted.
    pub synced_count: usize,
    /// Human-readable summary.
    pub message: String,
    /// Table that was synced.
    pub table_name: String,
}

/// One mirrored record as exposed by the list and lookup endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordResponse {
    /// Local insertion identity.
    pub id: i64,
    /// Upstream table.
    pub table_name: String,
    /// Upstream identity.
    pub record_id: String,
    /// Field payload.
    pub data: Fields,
    /// First local insertion time.
    pub created_at: DateTime<Utc>,
}

impl From<MirrorRecord> for RecordResponse {
    fn from(record: MirrorRecord) -> Self {
        Self {
            id: record.id,
            table_name: record.source_table,
            record_id: record.identity,
            data: record.fields,
            created_at: record.created_at,
        }
    }
}

/// Body of an accepted webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookResponse {
    /// Always `"received"`.
    pub status: String,
    /// Set when this delivery was already processed.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
    /// What the reconciliation did; absent for duplicates.
    #[serde(skip)]
    pub outcome: Option<ReconcileOutcome>,
}

/// One stored change event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventResponse {
    /// Local insertion identity.
    pub id: i64,
    /// Delivery id.
    pub event_id: String,
    /// Upstream base identifier.
    pub source_identifier: String,
    /// Ingestion time.
    pub received_at: DateTime<Utc>,
    /// Audit flag, never set by this service.
    pub processed: bool,
    /// Decoded notification body.
    pub payload: Value,
}

impl From<ChangeEvent> for EventResponse {
    fn from(event: ChangeEvent) -> Self {
        Self {
            id: event.id,
            event_id: event.event_id,
            source_identifier: event.source_identifier,
            received_at: event.received_at,
            processed: event.processed,
            payload: event.raw_payload,
        }
    }
}

/// Validated parameters of a record listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    /// Table filter.
    pub table_name: Option<String>,
    /// Records to skip.
    pub skip: usize,
    /// Maximum records to return.
    pub limit: usize,
    /// Sort column name.
    pub sort_by: String,
    /// Sort direction name.
    pub sort_order: String,
}

impl ListParams {
    /// Parameters with every default applied.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            table_name: None,
            skip: 0,
            limit: config.default_list_limit,
            sort_by: SortField::Id.column().to_string(),
            sort_order: "desc".to_string(),
        }
    }

    /// Parses query parameters.
    ///
    /// `skip` must be a non-negative integer and `limit` an integer between 1
    /// and the configured maximum; anything else is a validation error.
    /// Unknown parameters are ignored.
    pub fn from_query(config: &ServerConfig, query: &[(String, String)]) -> ServerResult<Self> {
        let mut params = Self::new(config);
        for (key, value) in query {
            match key.as_str() {
                "table_name" if !value.is_empty() => params.table_name = Some(value.clone()),
                "skip" => params.skip = parse_count("skip", value)?,
                "limit" => params.limit = parse_count("limit", value)?,
                "sort_by" if !value.is_empty() => params.sort_by = value.clone(),
                "sort_order" if !value.is_empty() => params.sort_order = value.clone(),
                _ => {}
            }
        }
        params.validate(config)?;
        Ok(params)
    }

    /// Restricts the listing to `table`.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    /// Checks the limit bounds.
    pub fn validate(&self, config: &ServerConfig) -> ServerResult<()> {
        if self.limit < 1 || self.limit > config.max_list_limit {
            return Err(ServerError::Validation(format!(
                "limit must be between 1 and {}",
                config.max_list_limit
            )));
        }
        Ok(())
    }

    fn to_query(&self) -> RecordQuery {
        let mut query = RecordQuery::new()
            .with_sort(&self.sort_by, &self.sort_order)
            .with_skip(self.skip)
            .with_limit(self.limit);
        if let Some(table) = &self.table_name {
            query = query.with_table(table);
        }
        query
    }
}

fn parse_count(name: &str, value: &str) -> ServerResult<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ServerError::Validation(format!("{name} must be a non-negative integer")))
}

/// Handler for mirror requests.
pub struct RequestHandler<S: RecordSource, M: MirrorStore> {
    config: ServerConfig,
    verifier: WebhookVerifier,
    synchronizer: Synchronizer<S, M>,
}

impl<S: RecordSource, M: MirrorStore> RequestHandler<S, M> {
    /// Creates a new request handler.
    pub fn new(config: ServerConfig, synchronizer: Synchronizer<S, M>) -> Self {
        let verifier = WebhookVerifier::from_config(&config);
        Self {
            config,
            verifier,
            synchronizer,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the synchronizer.
    pub fn synchronizer(&self) -> &Synchronizer<S, M> {
        &self.synchronizer
    }

    fn store(&self) -> &M {
        self.synchronizer.store()
    }

    /// Mirrors one upstream table.
    pub fn sync_table(&self, table: &str) -> ServerResult<SyncResponse> {
        let report = self.synchronizer.sync_table(table)?;
        Ok(SyncResponse {
            status: "success".to_string(),
            synced_count: report.records_inserted,
            message: format!("Synced {} records from '{}'", report.records_inserted, table),
            table_name: table.to_string(),
        })
    }

    /// Lists mirrored records.
    pub fn list_records(&self, params: &ListParams) -> ServerResult<Vec<RecordResponse>> {
        params.validate(&self.config)?;
        let records = self.store().list_records(&params.to_query())?;
        Ok(records.into_iter().map(RecordResponse::from).collect())
    }

    /// Looks up one record by upstream identity.
    pub fn get_record(&self, record_id: &str) -> ServerResult<RecordResponse> {
        self.store()
            .find_by_identity(record_id)?
            .map(RecordResponse::from)
            .ok_or_else(|| ServerError::NotFound("Record not found".to_string()))
    }

    /// Lists the most recent change events.
    pub fn list_events(&self, limit: usize) -> ServerResult<Vec<EventResponse>> {
        if limit < 1 || limit > self.config.max_list_limit {
            return Err(ServerError::Validation(format!(
                "limit must be between 1 and {}",
                self.config.max_list_limit
            )));
        }
        let events = self.store().list_events(limit)?;
        Ok(events.into_iter().map(EventResponse::from).collect())
    }

    /// Ingests one webhook delivery.
    ///
    /// The audit event and the resulting reconciliation commit together. A
    /// delivery whose event id was already stored is acknowledged without
    /// touching the mirror.
    pub fn webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> ServerResult<WebhookResponse> {
        self.verifier.check(body, signature, timestamp)?;

        let payload: Value =
            serde_json::from_slice(body).map_err(|e| ServerError::InvalidJson(e.to_string()))?;
        let changes = ChangeSet::from_payload(&payload)
            .map_err(|e| ServerError::InvalidPayload(e.to_string()))?;

        let event = new_change_event(timestamp, body, payload);
        let event_id = event.event_id.clone();
        let source = event.source_identifier.clone();

        let outcome = self.store().transaction(|txn| match txn.insert_event(event)? {
            EventInsert::Duplicate => Ok(None),
            EventInsert::Inserted(_) => apply_delta(txn, &changes).map(Some),
        })?;

        match outcome {
            None => {
                info!(event_id = %event_id, source = %source, "duplicate webhook delivery ignored");
                Ok(WebhookResponse {
                    status: "received".to_string(),
                    duplicate: true,
                    outcome: None,
                })
            }
            Some(outcome) => {
                info!(
                    event_id = %event_id,
                    source = %source,
                    changes = changes.change_count(),
                    inserted = outcome.inserted,
                    updated = outcome.updated,
                    deleted = outcome.deleted,
                    "received webhook"
                );
                Ok(WebhookResponse {
                    status: "received".to_string(),
                    duplicate: false,
                    outcome: Some(outcome),
                })
            }
        }
    }

    /// Static service description.
    pub fn root(&self) -> Value {
        json!({
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "docs": "/docs",
            "endpoints": {
                "sync": "/api/v1/sync/{table_name}",
                "records": "/api/v1/records",
                "record": "/api/v1/records/{record_id}",
                "convenience": self
                    .config
                    .convenience_tables
                    .iter()
                    .map(|t| format!("/api/v1/{t}"))
                    .collect::<Vec<_>>(),
                "events": "/api/v1/events",
                "webhook": "/webhooks/airtable-webhook",
                "health": "/health",
            }
        })
    }

    /// Liveness payload.
    pub fn health(&self) -> Value {
        json!({
            "status": "healthy",
            "service": HEALTH_SERVICE_ID,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}
