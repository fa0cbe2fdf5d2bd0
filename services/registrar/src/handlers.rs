//! Registrar REST API handlers

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use canopy::{pack, unpack, Form, ServiceRecord, ServiceRecordList, SystemRecordList};

use crate::registry::{Registry, RegistryError};
use crate::role::SharedRole;

pub struct AppState {
    pub registry: Registry,
    pub role: SharedRole,
    pub system_name: String,
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

    pub fn gateway_timeout(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::GATEWAY_TIMEOUT,
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

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Conflict { id } => {
                ApiError::internal_error(format!("Error registering service: record {id} conflicts"))
            }
            RegistryError::Timeout => ApiError::gateway_timeout("Request timed out"),
            RegistryError::Closed => ApiError::internal_error("Registry is shut down"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

// ==================== Body Helpers ====================

fn require_json(headers: &HeaderMap) -> Result<(), ApiError> {
    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim);
    match media_type {
        Some("application/json") => Ok(()),
        _ => Err(ApiError::bad_request("Error parsing media type")),
    }
}

fn unpack_body(body: &[u8], context: &str) -> Result<Form, ApiError> {
    unpack(body).map_err(|e| {
        warn!("error extracting the {context} request: {e}");
        ApiError::bad_request(format!("Error extracting the {context} request"))
    })
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

async fn require_leading(state: &AppState) -> Result<(), ApiError> {
    let role = state.role.read().await;
    if role.leading {
        Ok(())
    } else {
        Err(ApiError::service_unavailable("Service Unavailable"))
    }
}

// ==================== Service Handlers ====================

/// Add a new service record or extend the registration life of an existing
/// one. Leader-only.
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    require_leading(&state).await?;
    require_json(&headers)?;

    let record = match unpack_body(&body, "registration")? {
        Form::ServiceRecord(record) => record,
        other => {
            warn!(form = other.tag(), "registration carried the wrong form");
            return Err(ApiError::bad_request("Error extracting the registration request"));
        }
    };
    if record.service_definition.is_empty() {
        return Err(ApiError::bad_request("serviceDefinition is required"));
    }
    if record.reg_life <= 0 {
        return Err(ApiError::bad_request("regLife must be positive"));
    }

    let stored = state.registry.add(record).await.map_err(|e| {
        warn!("error adding the new service: {e}");
        ApiError::from(e)
    })?;
    form_response(Form::ServiceRecord(stored))
}

/// Filtered discovery query, answered from whichever replica is asked.
pub async fn query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    require_json(&headers)?;

    let quest = match unpack_body(&body, "service discovery")? {
        Form::ServiceQuest(quest) => quest,
        other => {
            warn!(form = other.tag(), "discovery carried the wrong form");
            return Err(ApiError::bad_request(
                "Error extracting the service discovery request",
            ));
        }
    };

    let records = state.registry.read(Some(quest)).await.map_err(|e| {
        warn!("error retrieving service records: {e}");
        ApiError::from(e)
    })?;
    form_response(Form::ServiceRecordList(ServiceRecordList { list: records }))
}

/// Human-readable listing of the current table.
pub async fn query_page(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    let records = state.registry.read(None).await.map_err(|e| {
        warn!("error retrieving service records: {e}");
        ApiError::from(e)
    })?;
    Ok(Html(render_service_listing(&records)))
}

/// Delete a service record by id, e.g. when a provider shuts down.
/// Leader-only. Unknown ids are a no-op.
pub async fn unregister(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_leading(&state).await?;

    let id: u64 = id
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid record ID"))?;
    state.registry.delete(id).await.map_err(|e| {
        warn!(id, "error deleting the service: {e}");
        ApiError::from(e)
    })?;
    Ok(StatusCode::OK)
}

/// Role probe: 200 while leading, 503 otherwise.
pub async fn status(State(state): State<Arc<AppState>>) -> Response {
    let role = state.role.read().await;
    if role.leading {
        let since = role
            .leading_since
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        return (
            StatusCode::OK,
            format!("lead Service Registrar since {since}"),
        )
            .into_response();
    }
    match &role.leading_registrar {
        Some(url) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("On standby, leading registrar is {url}"),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        )
            .into_response(),
    }
}

/// Unique base URLs of all known provider systems.
pub async fn syslist(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let records = state.registry.read(None).await.map_err(ApiError::from)?;

    let mut system_urls: Vec<String> = Vec::new();
    for record in &records {
        let url = record.system_url().ok_or_else(|| {
            warn!(system = %record.system_name, "no http(s) port for system");
            ApiError::internal_error(format!(
                "System list error: no http(s) port for system {}",
                record.system_name
            ))
        })?;
        if !system_urls.contains(&url) {
            system_urls.push(url);
        }
    }
    form_response(Form::SystemRecordList(SystemRecordList { system_urls }))
}

// ==================== HTML Listing ====================

fn render_service_listing(records: &[ServiceRecord]) -> String {
    let mut page = String::from(
        "<!DOCTYPE html><html><body>\
         <p>The local cloud's currently available services are:</p><ul>",
    );
    for record in records {
        let ip = record.ip_addresses.first().map(String::as_str).unwrap_or("");
        let port = record.proto_port.get("http").copied().unwrap_or(0);
        let link = format!(
            "http://{}:{}/{}/{}",
            ip, port, record.system_name, record.sub_path
        );
        let asset = record.sub_path.split('/').next().unwrap_or("");
        let mut details = String::new();
        for (key, values) in &record.details {
            details.push_str(&format!("{}: {:?} ", key, values));
        }
        let expires = record
            .end_of_validity
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        page.push_str(&format!(
            "<li><p>Service ID: {} with definition <b><a href=\"{}\">{}</a></b> \
             from the <b>{}/{}</b> with details {} will expire at: {}</p></li>",
            record.id, link, record.service_definition, record.system_name, asset, details, expires
        ));
    }
    page.push_str("</ul></body></html>");
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_render_service_listing() {
        let record = ServiceRecord {
            id: 3,
            service_definition: "temperature".to_string(),
            system_name: "sensor1".to_string(),
            sub_path: "temp/measure".to_string(),
            ip_addresses: vec!["10.0.0.1".to_string()],
            proto_port: BTreeMap::from([("http".to_string(), 8081)]),
            details: BTreeMap::from([(
                "Location".to_string(),
                vec!["Kitchen".to_string()],
            )]),
            ..Default::default()
        };
        let page = render_service_listing(&[record]);

        assert!(page.contains("Service ID: 3"));
        assert!(page.contains("temperature"));
        assert!(page.contains("http://10.0.0.1:8081/sensor1/temp/measure"));
        assert!(page.contains("sensor1/temp</b>"));
        assert!(page.contains("Location"));
    }

    #[test]
    fn test_render_empty_listing() {
        let page = render_service_listing(&[]);
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("currently available services"));
    }

    #[test]
    fn test_require_json() {
        let mut headers = HeaderMap::new();
        assert!(require_json(&headers).is_err());

        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        assert!(require_json(&headers).is_err());

        headers.insert(
            header::CONTENT_TYPE,
            "application/json; charset=utf-8".parse().unwrap(),
        );
        assert!(require_json(&headers).is_ok());
    }
}
