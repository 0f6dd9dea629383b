//! Runtime configuration endpoints.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

/// Copy of the config safe to show to clients: the API key is masked.
fn redacted(mut config: AppConfig) -> AppConfig {
    if !config.transcription.api_key.is_empty() {
        config.transcription.api_key = "********".to_string();
    }
    config
}

/// GET /api/v1/config
pub async fn get_config(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(redacted(state.get_config()))
}

/// PUT /api/v1/config
///
/// Accepts a partial JSON document; only the provided fields change, and the
/// merged configuration must still validate.
pub async fn update_config(
    body: web::Json<serde_json::Value>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut config = state.get_config();
    config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    state.update_config(config.clone()).map_err(AppError::ValidationError)?;

    info!("Configuration updated at runtime");
    Ok(HttpResponse::Ok().json(json!({
        "status": "updated",
        "config": redacted(config),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::ConnectionManager;
    use crate::jobs::JobStore;
    use crate::meetings::MeetingStore;
    use actix_web::{test, App};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> AppState {
        let mut config = AppConfig::default();
        config.transcription.api_key = "sk-secret".to_string();
        AppState::new(
            config,
            Arc::new(JobStore::new(Duration::from_secs(3600))),
            Arc::new(MeetingStore::new()),
            Arc::new(ConnectionManager::new(6)),
        )
    }

    #[actix_web::test]
    async fn test_get_config_masks_api_key() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .route("/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/config").to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["transcription"]["api_key"], "********");
    }

    #[actix_web::test]
    async fn test_update_config_applies_partial_document() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(serde_json::json!({"limits": {"max_connections_per_meeting": 9}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(state.get_config().limits.max_connections_per_meeting, 9);
    }

    #[actix_web::test]
    async fn test_update_config_rejects_invalid_values() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(serde_json::json!({"transcription": {"worker_count": 0}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }
}
