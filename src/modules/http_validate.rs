//! CAS `serviceValidate` endpoints.
//!
//! Every validation failure is answered with the same `INVALID_TICKET` code so a
//! relying service cannot tell a stale proof from a malformed ticket. The detailed
//! reason is logged and, only when configured, copied into the message.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use url::Url;

use crate::chain::error::ValidationError;
use crate::chain::types::ValidationOutcome;
use crate::chain::validator::TicketValidator;

/// CAS code for any ticket that does not validate.
pub const INVALID_TICKET: &str = "INVALID_TICKET";

/// CAS code for a request missing a required parameter.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

/// Message sent for failed validations unless detailed reasons are enabled.
pub const GENERIC_FAILURE_MESSAGE: &str = "Ticket could not be validated";

const CAS_NAMESPACE: &str = "http://www.yale.edu/tp/cas";

/// Server state shared with the validation endpoints
pub struct ValidateState {
    pub validator: Arc<dyn TicketValidator>,
    pub expose_failure_reason: bool,
}

/// Query parameters of `serviceValidate`
#[derive(Debug, Deserialize)]
pub struct ServiceValidateQuery {
    pub service: Option<String>,
    pub ticket: Option<String>,
    pub format: Option<String>,
}

/// Turn a validation result into the outward outcome.
pub fn outcome_for(
    result: Result<String, ValidationError>,
    ticket: &str,
    expose_failure_reason: bool,
) -> ValidationOutcome {
    match result {
        Ok(username) => ValidationOutcome::success(username).with_ticket(ticket),
        Err(e) if expose_failure_reason => ValidationOutcome::failure(INVALID_TICKET, e.to_string()),
        Err(_) => ValidationOutcome::failure(INVALID_TICKET, GENERIC_FAILURE_MESSAGE.to_string()),
    }
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// CAS XML `serviceResponse` document.
pub fn render_xml(outcome: &ValidationOutcome) -> String {
    let inner = match (&outcome.username, outcome.ok) {
        (Some(user), true) => format!(
            "<cas:authenticationSuccess><cas:user>{}</cas:user>{}</cas:authenticationSuccess>",
            xml_escape(user),
            outcome
                .ticket
                .as_deref()
                .map(|ticket| format!(
                    "<cas:proxyGrantingSuccess>{}</cas:proxyGrantingSuccess>",
                    xml_escape(ticket)
                ))
                .unwrap_or_default()
        ),
        _ => format!(
            "<cas:authenticationFailure code=\"{}\">{}</cas:authenticationFailure>",
            xml_escape(outcome.code.as_deref().unwrap_or(INVALID_TICKET)),
            xml_escape(outcome.message.as_deref().unwrap_or_default())
        ),
    };
    format!(
        "<cas:serviceResponse xmlns:cas=\"{}\">{}</cas:serviceResponse>",
        CAS_NAMESPACE, inner
    )
}

/// CAS 3.0 JSON `serviceResponse` document.
pub fn render_json(outcome: &ValidationOutcome) -> serde_json::Value {
    match (&outcome.username, outcome.ok) {
        (Some(user), true) => {
            let mut success = json!({ "user": user });
            if let Some(ticket) = &outcome.ticket {
                success["proxyGrantingSuccess"] = json!(ticket);
            }
            json!({ "serviceResponse": { "authenticationSuccess": success } })
        }
        _ => json!({
            "serviceResponse": {
                "authenticationFailure": {
                    "code": outcome.code.as_deref().unwrap_or(INVALID_TICKET),
                    "description": outcome.message.as_deref().unwrap_or_default(),
                }
            }
        }),
    }
}

fn respond(outcome: &ValidationOutcome, format: Option<&str>) -> Response {
    if format.is_some_and(|f| f.eq_ignore_ascii_case("json")) {
        (StatusCode::OK, Json(render_json(outcome))).into_response()
    } else {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
            render_xml(outcome),
        )
            .into_response()
    }
}

/// Ticket validation endpoint handler
/// GET /serviceValidate?service=https://app.example.org/&ticket=ST-...
pub async fn service_validate_handler(
    State(state): State<Arc<ValidateState>>,
    Query(params): Query<ServiceValidateQuery>,
) -> Response {
    let format = params.format.as_deref();

    let (service, ticket) = match (params.service.as_deref(), params.ticket.as_deref()) {
        (Some(service), Some(ticket)) if !service.is_empty() && !ticket.is_empty() => {
            (service, ticket)
        }
        _ => {
            warn!("serviceValidate called without service or ticket");
            let outcome = ValidationOutcome::failure(
                INVALID_REQUEST,
                "Both service and ticket parameters are required".to_string(),
            );
            return respond(&outcome, format);
        }
    };

    info!("Received serviceValidate request for {}", service);

    let result = match Url::parse(service) {
        Ok(url) => state.validator.validate(&url, ticket).await,
        Err(e) => {
            warn!("Unparsable service URL {}: {}", service, e);
            Err(ValidationError::UnknownHost {
                host: service.to_string(),
            })
        }
    };

    respond(&outcome_for(result, ticket, state.expose_failure_reason), format)
}

pub async fn health_handler() -> &'static str {
    "ok"
}

/// Router for the CAS endpoints.
pub fn router(state: Arc<ValidateState>) -> Router {
    Router::new()
        .route("/serviceValidate", get(service_validate_handler))
        .route("/p3/serviceValidate", get(service_validate_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
