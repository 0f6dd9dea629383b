//! Meeting metadata endpoints.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

/// Request body for creating a meeting.
#[derive(Debug, Deserialize)]
pub struct MeetingCreateRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// POST /api/v1/meetings
pub async fn create_meeting(
    request: web::Json<MeetingCreateRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let request = request.into_inner();
    if request.title.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Meeting title must not be empty".to_string(),
        ));
    }

    let meeting = state
        .meetings
        .create(&request.title, &request.description, request.keywords);
    Ok(HttpResponse::Created().json(meeting))
}

/// GET /api/v1/meetings
pub async fn list_meetings(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.meetings.list())
}

/// GET /api/v1/meetings/{meeting_id}
pub async fn get_meeting(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    match state.meetings.get(&path.into_inner()) {
        Some(meeting) => Ok(HttpResponse::Ok().json(meeting)),
        None => Err(AppError::NotFound("Meeting not found".to_string())),
    }
}

/// DELETE /api/v1/meetings/{meeting_id}
pub async fn delete_meeting(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    if state.meetings.delete(&path.into_inner()) {
        Ok(HttpResponse::Ok().json(json!({"message": "Meeting deleted successfully"})))
    } else {
        Err(AppError::NotFound("Meeting not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::connections::ConnectionManager;
    use crate::jobs::JobStore;
    use crate::meetings::MeetingStore;
    use actix_web::{test, App};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> AppState {
        AppState::new(
            AppConfig::default(),
            Arc::new(JobStore::new(Duration::from_secs(3600))),
            Arc::new(MeetingStore::new()),
            Arc::new(ConnectionManager::new(6)),
        )
    }

    #[actix_web::test]
    async fn test_meeting_lifecycle_over_http() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/meetings", web::post().to(create_meeting))
                .route("/meetings", web::get().to(list_meetings))
                .route("/meetings/{meeting_id}", web::get().to(get_meeting))
                .route("/meetings/{meeting_id}", web::delete().to(delete_meeting)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/meetings")
            .set_json(serde_json::json!({"title": "Standup"}))
            .to_request();
        let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(created["status"], "created");
        let id = created["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri(&format!("/meetings/{}", id))
            .to_request();
        let fetched: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fetched["title"], "Standup");

        let req = test::TestRequest::delete()
            .uri(&format!("/meetings/{}", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get()
            .uri(&format!("/meetings/{}", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn test_create_meeting_requires_title() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .route("/meetings", web::post().to(create_meeting)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/meetings")
            .set_json(serde_json::json!({"title": "  "}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }
}
