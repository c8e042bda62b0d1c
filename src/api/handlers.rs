use super::protocol::*;
use crate::mapping::MappingEngine;
use crate::message::Message;
use crate::records::types::EntityKey;

use axum::{Extension, Json, extract::Path, http::StatusCode};
use serde_json::Value;
use std::sync::Arc;

fn unknown_domain(engine: &MappingEngine, domain: &str) -> Option<ErrorResponse> {
    if engine.options().domain == domain {
        return None;
    }
    tracing::warn!(
        "Request for domain '{}' refused, this node serves '{}'",
        domain,
        engine.options().domain
    );
    Some(ErrorResponse {
        error: format!("domain '{}' is not served here", domain),
        code: UNKNOWN_DOMAIN_CODE.to_string(),
    })
}

pub async fn handle_message(
    Extension(engine): Extension<Arc<MappingEngine>>,
    Path((domain, subdomain)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<MessageResponse>) {
    if let Some(error) = unknown_domain(&engine, &domain) {
        return (StatusCode::NOT_FOUND, Json(MessageResponse::Failed(error)));
    }
    tracing::debug!("Message received for {}/{}", domain, subdomain);

    let message = match Message::from_value(payload) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Rejected malformed message: {}", e);
            return (e.status(), Json(MessageResponse::Failed((&e).into())));
        }
    };

    match engine.dispatch(message).await {
        Ok(report) => (StatusCode::OK, Json(MessageResponse::Mapped(report))),
        Err(e) => (e.status(), Json(MessageResponse::Failed((&e).into()))),
    }
}

pub async fn handle_get_logs(
    Extension(engine): Extension<Arc<MappingEngine>>,
    Path(domain): Path<String>,
) -> (StatusCode, Json<LogsResponse>) {
    if let Some(error) = unknown_domain(&engine, &domain) {
        return (StatusCode::NOT_FOUND, Json(LogsResponse::Failed(error)));
    }
    let entries = engine.audit_entries(Some(&domain)).await;
    tracing::debug!("Serving {} audit entries for {}", entries.len(), domain);
    (StatusCode::OK, Json(LogsResponse::Entries(entries)))
}

pub async fn handle_get_languages(
    Extension(engine): Extension<Arc<MappingEngine>>,
    Path((domain, product_code)): Path<(String, String)>,
) -> (StatusCode, Json<Option<LanguagesResponse>>) {
    if unknown_domain(&engine, &domain).is_some() {
        return (StatusCode::NOT_FOUND, Json(None));
    }
    let leaflets: Vec<LeafletLanguages> = engine
        .languages(&EntityKey::product(&product_code))
        .into_iter()
        .map(|(leaflet_type, languages)| LeafletLanguages {
            leaflet_type,
            languages,
        })
        .collect();

    if leaflets.is_empty() {
        return (StatusCode::NOT_FOUND, Json(None));
    }
    (
        StatusCode::OK,
        Json(Some(LanguagesResponse {
            product_code,
            leaflets,
        })),
    )
}

pub async fn handle_health(
    Extension(engine): Extension<Arc<MappingEngine>>,
) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            domain: engine.options().domain.clone(),
            subdomain: engine.options().subdomain.clone(),
            mappings: engine.registry().handler_count(),
        }),
    )
}
