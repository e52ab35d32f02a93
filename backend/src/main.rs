use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::HeaderName;
use axum::http::{HeaderValue, Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Router};
use redis::Client as RedisClient;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use shared::rate_limit::{get_rate_limit_key, RateLimitCheck, RateLimitType, API_MAX_REQUESTS, API_WINDOW};

use crate::store::postgres::PgStore;
use crate::wheel::engine::SpinEngine;

mod auth;
mod error;
mod logging;
mod store;
mod wheel;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SpinEngine<PgStore>>,
    pub redis: RedisClient,
}

pub async fn health_check() -> impl IntoResponse {
    Response::builder().status(200).body(Body::from("OK")).unwrap()
}

pub async fn api_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: middleware::Next,
) -> Result<Response<Body>, StatusCode> {
    let user_id = request
        .extensions()
        .get::<auth::AuthUser>()
        .map(|user| user.id.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    let rate_limit_key = get_rate_limit_key(RateLimitType::Api, &user_id);

    if let Ok(mut conn) = state.redis.get_async_connection().await {
        let attempts: Option<u32> = redis::cmd("GET")
            .arg(&rate_limit_key)
            .query_async(&mut conn)
            .await
            .unwrap_or(None);

        let check = RateLimitCheck::new(attempts.unwrap_or(0), RateLimitType::Api);

        if check.is_locked {
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }

        let current_attempts = attempts.unwrap_or(0) + 1;
        if current_attempts <= API_MAX_REQUESTS {
            let _: () = redis::cmd("SETEX")
                .arg(&rate_limit_key)
                .arg(API_WINDOW.as_secs())
                .arg(current_attempts)
                .query_async(&mut conn)
                .await
                .unwrap_or(());
        }
    }

    Ok(next.run(request).await)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::setup();
    dotenvy::from_path(".env").ok();

    let pool = PgPool::connect_with(
        std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set")
            .parse::<sqlx::postgres::PgConnectOptions>()?
            .to_owned(),
    )
    .await
    .expect("Failed to create pool");

    sqlx::migrate::Migrator::new(std::path::Path::new("./migrations"))
        .await?
        .run(&pool)
        .await?;

    let redis = RedisClient::open(
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
    )
    .expect("Failed to connect to Redis");

    let engine = Arc::new(SpinEngine::new(PgStore::new(pool.clone())));
    let state = AppState {
        engine: engine.clone(),
        redis,
    };

    // The sweeper is the liveness guarantee: a due spin settles and an
    // abandoned session goes back to idle even if every client disappears.
    let sweeper = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(1000));
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.sweep().await {
                error!("Error sweeping wheel session: {:?}", e);
            }
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(vec![
            "http://127.0.0.1:8080".parse::<HeaderValue>().unwrap(),
            "http://127.0.0.1:3000".parse::<HeaderValue>().unwrap(),
        ])
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(vec![
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
        ])
        .allow_credentials(true);

    let app = Router::new()
        .route("/api/health_check", get(health_check))
        .nest("/wheel", wheel::create_router(state.clone()))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    info!("listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
