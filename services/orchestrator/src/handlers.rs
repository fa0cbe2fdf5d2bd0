//! Orchestrator REST API handlers

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use canopy::{pack, unpack, CanopyError, Form, ServiceQuest, ServiceRecordList};

use crate::resolver::{select_service, ResolveError, Resolver};

pub struct AppState {
    pub resolver: Resolver,
}

// ==================== Error Handling ====================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(pub StatusCode, pub Json<ErrorResponse>);

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: msg.into() }),
        )
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse { error: msg.into() }),
        )
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: msg.into() }),
        )
    }
}

impl From<ResolveError> for ApiError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NoRegistrar => ApiError::service_unavailable(e.to_string()),
            ResolveError::Canopy(CanopyError::Http(_)) => {
                ApiError::service_unavailable(e.to_string())
            }
            ResolveError::NoSuchService(_) => ApiError::internal_error(e.to_string()),
            ResolveError::Canopy(_) => ApiError::internal_error(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

// ==================== Helpers ====================

fn extract_quest(headers: &HeaderMap, body: &[u8]) -> Result<ServiceQuest, ApiError> {
    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim);
    if media_type != Some("application/json") {
        return Err(ApiError::bad_request("Error parsing media type"));
    }

    match unpack(body) {
        Ok(Form::ServiceQuest(quest)) => Ok(quest),
        Ok(other) => {
            warn!(form = other.tag(), "quest carried the wrong form");
            Err(ApiError::bad_request("Error extracting the service quest"))
        }
        Err(e) => {
            warn!("error extracting the service quest: {e}");
            Err(ApiError::bad_request("Error extracting the service quest"))
        }
    }
}

fn form_response(form: Form) -> Result<Response, ApiError> {
    let body = pack(&form).map_err(|e| {
        warn!("error packing {} response: {e}", form.tag());
        ApiError::internal_error("Error encoding response")
    })?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

// ==================== Quest Handlers ====================

/// Resolve a quest to a single selected provider.
pub async fn squest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let quest = extract_quest(&headers, &body)?;

    let records = state.resolver.query(&quest).await.map_err(|e| {
        warn!(definition = %quest.service_definition, "quest failed: {e}");
        ApiError::from(e)
    })?;
    let point = select_service(&records).ok_or_else(|| {
        ApiError::internal_error(format!(
            "unable to locate any such service: {}",
            quest.service_definition
        ))
    })?;
    form_response(Form::ServicePoint(point))
}

/// Resolve a quest to the full matching record list.
pub async fn squests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let quest = extract_quest(&headers, &body)?;

    let records = state.resolver.query(&quest).await.map_err(|e| {
        warn!(definition = %quest.service_definition, "quest failed: {e}");
        ApiError::from(e)
    })?;
    form_response(Form::ServiceRecordList(ServiceRecordList { list: records }))
}
