//! CLI command implementations.
//!
//! Each command builds an [`ApiRequest`]; [`Context::execute`] routes it and
//! prints the response.

pub mod info;
pub mod records;
pub mod sync;
pub mod webhook;

use std::process::ExitCode;
use std::sync::Arc;
use tablemirror_store::{MirrorStore, SqliteStore};
use tablemirror_sync_engine::{FetchClient, RecordSource, SyncConfig, Synchronizer, UreqClient};
use tablemirror_sync_server::{ApiRequest, ApiResponse, MirrorServer, Settings};
use tracing::info;

/// The service wired up from process settings.
pub struct Context<S: RecordSource = FetchClient<UreqClient>, M: MirrorStore = SqliteStore> {
    server: MirrorServer<S, M>,
}

impl Context {
    /// Opens the mirror database and builds the upstream client.
    pub fn open(settings: &Settings) -> Result<Self, Box<dyn std::error::Error>> {
        info!(database_url = %settings.database_url, base_id = %settings.airtable_base_id, "opening mirror");
        let store = Arc::new(SqliteStore::open_url(&settings.database_url)?);
        let source = Arc::new(FetchClient::over_http(settings.fetch_config()));
        let synchronizer = Synchronizer::new(SyncConfig::new(), source, store);
        Ok(Self {
            server: MirrorServer::new(settings.server_config(), synchronizer),
        })
    }
}

impl<S: RecordSource, M: MirrorStore> Context<S, M> {
    /// Wraps an already built server.
    #[cfg(test)]
    pub fn with_server(server: MirrorServer<S, M>) -> Self {
        Self { server }
    }

    /// Routes `request`, prints the body and maps the status to an exit code.
    pub fn execute(&self, request: &ApiRequest) -> Result<ExitCode, Box<dyn std::error::Error>> {
        let succeeded = self.run(request)?;
        Ok(if succeeded {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    /// Routes `request` and prints the body. Returns false for statuses of
    /// 400 and above.
    pub fn run(&self, request: &ApiRequest) -> Result<bool, serde_json::Error> {
        let response = self.server.route(request);
        println!("{}", render(&response)?);
        Ok(succeeded(&response))
    }
}

/// Pretty-prints a response body.
pub fn render(response: &ApiResponse) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&response.body)
}

/// Returns true if the response should exit successfully.
pub fn succeeded(response: &ApiResponse) -> bool {
    response.status < 400
}
