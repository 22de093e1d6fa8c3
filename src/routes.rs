// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempts, grading, progress},
    state::AppState,
    utils::jwt::{auth_middleware, grader_middleware},
};

/// Assembles the main application router.
///
/// * Every route requires a valid bearer token.
/// * Grading routes additionally require an admin role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let attempt_routes = Router::new()
        .route(
            "/courses/{course_id}/quizzes/{quiz_id}/attempt",
            post(attempts::start_attempt),
        )
        .route("/sittings", get(attempts::list_sittings))
        .route("/sittings/{id}/answers", post(attempts::submit_answer))
        .route("/sittings/{id}/result", post(attempts::finish))
        .route("/progress", get(progress::get_progress));

    let grading_routes = Router::new()
        .route("/sittings/{id}/incorrect", post(grading::mark_incorrect))
        .route(
            "/sittings/{id}/incorrect/{question_id}",
            delete(grading::restore_credit),
        )
        .layer(middleware::from_fn(grader_middleware));

    let api = attempt_routes
        .merge(grading_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api", api)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::Config,
        services::AttemptService,
        store::InMemoryStore,
        utils::jwt::{ROLE_CLIENT, sign_jwt},
    };

    fn app() -> Router {
        create_router(AppState {
            attempts: AttemptService::new(Arc::new(InMemoryStore::new())),
            config: Config {
                database_url: String::new(),
                jwt_secret: "routes_test_secret".to_string(),
                rust_log: "error".to_string(),
                bind_addr: "127.0.0.1:0".to_string(),
                db_max_connections: 1,
            },
        })
    }

    #[tokio::test]
    async fn api_requires_bearer_token() {
        let response = app()
            .oneshot(Request::get("/api/progress").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn grading_requires_admin_role() {
        let token = sign_jwt(5, ROLE_CLIENT, "routes_test_secret", 60).unwrap();
        let response = app()
            .oneshot(
                Request::delete("/api/sittings/1/incorrect/2")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let response = app()
            .oneshot(Request::get("/random_path_that_does_not_exist").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
