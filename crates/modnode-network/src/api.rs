//! Request handlers for the node's local HTTP API.
//!
//! The handlers are thin: axum extracts the query and body, the handler calls
//! into a [`ModuleApi`] implementation (the lifecycle manager) and
//! [`ApiError`] maps domain errors to status codes.
//!
//! | Route | Success |
//! |-------|---------|
//! | `GET /test` | `{"message": "Hello, World!"}` |
//! | `GET /modules` | `{identity: kind}` |
//! | `POST /modules` | `201 {uuid, kind, address, role}` |
//! | `DELETE /module?uuid=` | `{"removed": identity}` |
//! | `GET /module/state?uuid=` | module state object |
//! | `POST /module/state?uuid=` | `{"new_state": state}` |
//!
//! Errors are always `{"error": message}`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Json, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::Router;
use futures::future::BoxFuture;
use modnode_core::{BusAddress, Error, ModuleId, ModuleInfo, ModuleKind};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Query/command surface the HTTP API needs from the node.
pub trait ModuleApi: Send + Sync {
    /// Every live module, identity to kind.
    fn list_modules(&self) -> BoxFuture<'_, BTreeMap<ModuleId, ModuleKind>>;

    /// State object of a module.
    fn module_state(&self, id: ModuleId) -> BoxFuture<'_, modnode_core::Result<Value>>;

    /// Apply a state to a control module and return its new state.
    fn set_module_state(
        &self,
        id: ModuleId,
        state: Value,
    ) -> BoxFuture<'_, modnode_core::Result<Value>>;

    /// Create a module from a kind tag, at `address` or at the first free
    /// mapped address.
    fn create_module(
        &self,
        kind: String,
        address: Option<BusAddress>,
    ) -> BoxFuture<'_, modnode_core::Result<ModuleInfo>>;

    /// Remove a module. Removing an unknown identity is not an error.
    fn remove_module(&self, id: ModuleId) -> BoxFuture<'_, ()>;
}

/// Shared handler state.
pub type ApiState = State<Arc<dyn ModuleApi>>;

/// Status code for a domain error.
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::UnknownKind(_) | Error::InvalidValue(_) | Error::InvalidAddress(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::NotControllable(_) | Error::AddressInUse(_) | Error::NoFreeAddress(_) => {
            StatusCode::CONFLICT
        }
        Error::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::PersistenceFailure(_) | Error::CoordinatorUnreachable { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Error reply of the API, rendered as `{"error": message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        match error {
            Error::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "Module not found"),
            other => Self::new(status_for(&other), other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = rejection.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE || status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
            Self::new(status, rejection.body_text())
        } else {
            Self::bad_request(format!("Invalid JSON: {}", rejection.body_text()))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `?uuid=` parameter, percent-decoded by the extractor.
#[derive(Debug, Default, Deserialize)]
pub struct UuidQuery {
    pub uuid: Option<String>,
}

impl UuidQuery {
    fn module_id(&self) -> ApiResult<ModuleId> {
        self.uuid
            .as_deref()
            .filter(|uuid| !uuid.is_empty())
            .and_then(|uuid| ModuleId::new(uuid).ok())
            .ok_or_else(|| ApiError::bad_request("Missing 'uuid' parameter"))
    }
}

#[derive(Debug, Deserialize)]
pub struct SetStateBody {
    #[serde(default)]
    pub state: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateModuleBody {
    pub kind: String,
    #[serde(default)]
    pub address: Option<u8>,
}

/// Build the API router over `api`.
///
/// Request bodies above `max_body` bytes are refused with 413.
pub fn router(api: Arc<dyn ModuleApi>, max_body: usize) -> Router {
    Router::new()
        .route("/test", get(hello))
        .route("/modules", get(list_modules).post(create_module))
        .route("/module", delete(remove_module))
        .route("/module/state", get(get_state).post(set_state))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(api)
}

pub async fn hello() -> Json<Value> {
    Json(json!({ "message": "Hello, World!" }))
}

pub async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not Found")
}

pub async fn list_modules(State(api): ApiState) -> Json<Value> {
    let modules: serde_json::Map<String, Value> = api
        .list_modules()
        .await
        .into_iter()
        .map(|(id, kind)| (id.to_string(), json!(kind.as_str())))
        .collect();
    Json(Value::Object(modules))
}

pub async fn get_state(State(api): ApiState, Query(query): Query<UuidQuery>) -> ApiResult<Json<Value>> {
    let id = query.module_id()?;
    debug!(%id, "State requested");
    Ok(Json(api.module_state(id).await?))
}

pub async fn set_state(
    State(api): ApiState,
    Query(query): Query<UuidQuery>,
    body: Result<Json<SetStateBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let id = query.module_id()?;
    let Json(body) = body?;
    let state = body
        .state
        .ok_or_else(|| ApiError::bad_request("Missing 'state' field"))?;

    debug!(%id, %state, "State change requested");
    let new_state = api.set_module_state(id, state).await?;
    Ok(Json(json!({ "new_state": new_state })))
}

pub async fn create_module(
    State(api): ApiState,
    body: Result<Json<CreateModuleBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ModuleInfo>)> {
    let Json(body) = body?;
    let address = body.address.map(BusAddress::new).transpose()?;

    let info = api.create_module(body.kind, address).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn remove_module(State(api): ApiState, Query(query): Query<UuidQuery>) -> ApiResult<Json<Value>> {
    let id = query.module_id()?;
    api.remove_module(id.clone()).await;
    Ok(Json(json!({ "removed": id })))
}
