use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{directory::CompanyDirectory, origin::origin_allowed};

const ENABLE_LOGS: bool = true;

use crate::{widget_debug, widget_warn};

#[derive(Clone)]
pub struct ConfigState {
    pub directory: Arc<CompanyDirectory>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigQuery {
    pub company_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

/// CORS headers sent with every response. Successful responses also list
/// the allowed methods and headers.
fn cors_headers(origin: Option<&str>, allow: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let allow_origin = origin
        .and_then(|o| HeaderValue::from_str(o).ok())
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    if allow {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
    }
    headers
}

fn error(status: StatusCode, origin: Option<&str>, message: &str) -> Response {
    (
        status,
        cors_headers(origin, false),
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// GET /api/widget-config?company_id=<public id>
pub async fn get_widget_config(
    State(state): State<ConfigState>,
    Query(query): Query<ConfigQuery>,
    headers: HeaderMap,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());

    let Some(company_id) = query
        .company_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    else {
        return error(StatusCode::BAD_REQUEST, origin, "Missing company_id");
    };

    let Some(company) = state.directory.find_active(company_id) else {
        return error(
            StatusCode::NOT_FOUND,
            origin,
            "Company not found or inactive",
        );
    };

    if !origin_allowed(origin, company.website_url.as_deref()) {
        widget_warn!(
            "origin {:?} not allowed for company {} (site {:?})",
            origin,
            company_id,
            company.website_url
        );
        return error(StatusCode::FORBIDDEN, origin, "Origin not authorized");
    }

    widget_debug!("serving widget config for company {}", company_id);
    (
        StatusCode::OK,
        cors_headers(origin, true),
        Json(company.widget_config()),
    )
        .into_response()
}

/// OPTIONS /api/widget-config
pub async fn preflight(headers: HeaderMap) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    (StatusCode::NO_CONTENT, cors_headers(origin, true)).into_response()
}

pub async fn get_health() -> &'static str {
    "ok"
}
