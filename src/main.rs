use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod stats;
mod storage;

use auth::rate_limit::RateLimitState;
use config::Config;
use storage::MediaStorage;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimitState,
    pub storage: MediaStorage,
}

fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/find-email", post(handlers::auth::find_email))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/api/moods", get(handlers::entries::list_moods))
        .merge(auth_routes);

    let media_body_limit =
        DefaultBodyLimit::max((state.config.media_max_bytes + 1024 * 1024) as usize);

    let protected_routes = Router::new()
        .route("/api/me", get(handlers::auth::me))
        .route("/api/me/nickname", put(handlers::auth::update_nickname))
        .route("/api/me/password", put(handlers::auth::update_password))
        // Entries
        .route("/api/entries", get(handlers::entries::list_entries))
        .route("/api/entries", post(handlers::entries::create_entry))
        .route("/api/entries/random", get(handlers::entries::random_entry))
        .route("/api/entries/:id", get(handlers::entries::get_entry))
        .route("/api/entries/:id", put(handlers::entries::update_entry))
        .route("/api/entries/:id", delete(handlers::entries::delete_entry))
        // Statistics
        .route("/api/stats", get(handlers::stats::get_stats))
        // Media (uploads need more body headroom than the axum default)
        .route(
            "/api/media",
            post(handlers::media::upload_media)
                .delete(handlers::media::delete_media)
                .layer(media_body_limit),
        )
        // Session / account
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/account/delete",
            delete(handlers::account::delete_account),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let allowed_origins: Vec<axum::http::HeaderValue> = {
        let mut origins = vec![state
            .config
            .frontend_url
            .parse::<axum::http::HeaderValue>()
            .expect("FRONTEND_URL must be a valid origin")];
        // In dev, also allow LAN access (e.g. testing from another device)
        if let Ok(extra) = std::env::var("CORS_EXTRA_ORIGINS") {
            for o in extra.split(',') {
                if let Ok(hv) = o.trim().parse::<axum::http::HeaderValue>() {
                    origins.push(hv);
                }
            }
        }
        origins
    };
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(tower_http::compression::CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moondiary_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());

    let db = db::create_pool(&config.database_url).await;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations applied");

    let storage = MediaStorage::new(&config);
    let rate_limiter = RateLimitState::new();

    let state = AppState {
        db,
        config: config.clone(),
        rate_limiter,
        storage,
    };

    let app = build_router(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");
    // Connect info provides the client IP for rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = Arc::new(Config {
            database_url: "postgres://localhost/unused".into(),
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:3000".into(),
            jwt_secret: "test-secret".into(),
            jwt_access_ttl_secs: 900,
            jwt_refresh_ttl_secs: 604800,
            storage_url: "http://localhost:9000".into(),
            storage_service_key: String::new(),
            storage_bucket: "diary-media".into(),
            media_max_bytes: 100 * 1024 * 1024,
        });
        // Lazy pool: no connection is made unless a handler touches the DB
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool");
        AppState {
            db,
            config: config.clone(),
            rate_limiter: RateLimitState::new(),
            storage: MediaStorage::new(&config),
        }
    }

    #[tokio::test]
    async fn health_endpoint_reports_service_name() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["service"], "moondiary-api");
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn protected_routes_require_a_bearer_token() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/api/entries").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    fn bearer(config: &Config) -> String {
        let token =
            auth::jwt::create_access_token(uuid::Uuid::new_v4(), "luna@example.com", config)
                .unwrap();
        format!("Bearer {}", token)
    }

    #[tokio::test]
    async fn partial_date_range_is_rejected() {
        let state = test_state();
        let auth = bearer(&state.config);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::get("/api/entries?start_date=2025-01-01")
                    .header("authorization", auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["error"]["message"],
            "start_date and end_date must be provided together"
        );
    }

    #[tokio::test]
    async fn account_deletion_without_a_password_is_bad_request() {
        let state = test_state();
        let auth = bearer(&state.config);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::delete("/api/account/delete")
                    .header("authorization", auth)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"password":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn find_email_requires_a_nickname() {
        let app = build_router(test_state());
        let addr: std::net::SocketAddr = "127.0.0.1:4000".parse().unwrap();

        let response = app
            .oneshot(
                Request::post("/api/auth/find-email")
                    .header("content-type", "application/json")
                    .extension(axum::extract::ConnectInfo(addr))
                    .body(Body::from(r#"{"nickname":"  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn garbage_bearer_token_is_rejected() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::get("/api/stats")
                    .header("authorization", "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
