//! Root and health commands.

use tablemirror_sync_server::ApiRequest;

/// Builds the service description request.
pub fn root_request() -> ApiRequest {
    ApiRequest::get("/")
}

/// Builds the health request.
pub fn health_request() -> ApiRequest {
    ApiRequest::get("/health")
}
