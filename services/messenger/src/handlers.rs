//! Messenger REST API handlers

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use canopy::{unpack, Form};

use crate::store::{LogViews, MessageStore};

pub struct AppState {
    pub store: MessageStore,
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
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

// ==================== Handlers ====================

/// Store a new log message in the per-system ring.
pub async fn message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim);
    if media_type != Some("application/json") {
        return Err(ApiError::bad_request("Error parsing media type"));
    }

    let msg = match unpack(&body) {
        Ok(Form::SystemMessage(msg)) => msg,
        Ok(other) => {
            warn!(form = other.tag(), "message carried the wrong form");
            return Err(ApiError::bad_request("Error extracting the message"));
        }
        Err(e) => {
            warn!("error extracting the message: {e}");
            return Err(ApiError::bad_request("Error extracting the message"));
        }
    };

    state.store.add(msg).await;
    Ok(StatusCode::OK)
}

/// Render the dashboard from one snapshot of the log.
pub async fn dashboard(State(state): State<Arc<AppState>>) -> Html<String> {
    let views = state.store.filter_logs().await;
    Html(render_dashboard(&views))
}

// ==================== Dashboard ====================

/// Escape text for interpolation into HTML. Message fields arrive verbatim
/// from arbitrary systems on the network and must never reach the page raw.
fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn render_dashboard(views: &LogViews) -> String {
    let mut page = String::from(
        "<!DOCTYPE html><html><head><title>Messenger dashboard</title></head><body>\
         <h1>Messenger dashboard</h1>",
    );

    page.push_str("<h2>Latest errors</h2><ul>");
    for message in views.errors.values() {
        page.push_str(&format!("<li>{}</li>", html_escape(&message.to_string())));
    }
    page.push_str("</ul>");

    page.push_str("<h2>Latest warnings</h2><ul>");
    for message in views.warnings.values() {
        page.push_str(&format!("<li>{}</li>", html_escape(&message.to_string())));
    }
    page.push_str("</ul>");

    page.push_str("<h2>All messages</h2><ul>");
    for message in &views.all {
        page.push_str(&format!("<li>{}</li>", html_escape(&message.to_string())));
    }
    page.push_str("</ul></body></html>");
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Message;
    use canopy::MessageLevel;
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[test]
    fn test_render_dashboard() {
        let error = Message {
            time: Utc::now(),
            level: MessageLevel::Error,
            system: "sensor1".to_string(),
            body: "overheated".to_string(),
        };
        let views = LogViews {
            errors: BTreeMap::from([("sensor1".to_string(), error.clone())]),
            warnings: BTreeMap::new(),
            all: vec![error],
        };
        let page = render_dashboard(&views);

        assert!(page.contains("Latest errors"));
        assert!(page.contains("overheated"));
        assert!(page.contains("ERROR"));
    }

    #[test]
    fn test_render_empty_dashboard() {
        let views = LogViews {
            errors: BTreeMap::new(),
            warnings: BTreeMap::new(),
            all: Vec::new(),
        };
        let page = render_dashboard(&views);
        assert!(page.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<script>alert("x&y")</script>"#),
            "&lt;script&gt;alert(&quot;x&amp;y&quot;)&lt;/script&gt;"
        );
        assert_eq!(html_escape("it's fine"), "it&#39;s fine");
        assert_eq!(html_escape("plain text"), "plain text");
    }

    #[test]
    fn test_render_dashboard_escapes_message_fields() {
        let hostile = Message {
            time: Utc::now(),
            level: MessageLevel::Error,
            system: "<script>steal()</script>".to_string(),
            body: "<img src=x onerror=alert(1)>".to_string(),
        };
        let views = LogViews {
            errors: BTreeMap::from([("evil".to_string(), hostile.clone())]),
            warnings: BTreeMap::new(),
            all: vec![hostile],
        };
        let page = render_dashboard(&views);

        assert!(!page.contains("<script>steal()"));
        assert!(!page.contains("<img src=x"));
        assert!(page.contains("&lt;script&gt;steal()&lt;/script&gt;"));
        assert!(page.contains("&lt;img src=x onerror=alert(1)&gt;"));
    }
}
