use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /api/v1/config`: the effective configuration, API key redacted.
pub async fn get_config(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": state.config.redacted()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::tests::idle_state;
    use crate::state::AppState;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_config_is_redacted() {
        let mut config = AppConfig::default();
        config.recognizer.api_key = Some("secret-key".to_string());
        let state = AppState::new(config, (*idle_state().pipeline).clone());

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/v1/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["config"]["recognizer"]["api_key"], "***");
        assert_eq!(body["config"]["audio"]["sample_rate_hz"], 16000);
        assert_eq!(body["config"]["upload"]["max_upload_bytes"], 52428800);
    }
}
