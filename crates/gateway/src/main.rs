mod api;
mod auth;
mod config;
mod cors;
mod db;
mod error;
mod metrics;
mod queen;
mod world;
mod ws;

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
    api::{
        users::{UserStore, UsersApiState},
        world::WorldApiState,
    },
    auth::jwt::JwtAccessTokenService,
    config::GatewayConfig,
    error::{
        attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
    },
    metrics::GatewayMetrics,
    queen::{QueenBackend, QueenChannel},
    world::{terrain::TerrainCache, WorldState},
    ws::registry::ClientRegistry,
};

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_filter.clone()))
        .init();

    if config.is_dev_jwt_secret() {
        warn!("using the development JWT secret; set HEXGATE_JWT_SECRET in production");
    }

    let app_metrics = Arc::new(GatewayMetrics::default());
    metrics::set_global_metrics(Arc::clone(&app_metrics));

    let jwt_service = Arc::new(
        JwtAccessTokenService::new(&config.jwt_secret).context("invalid gateway JWT secret")?,
    );

    let queen = QueenBackend::Grpc(
        QueenChannel::connect_lazy(&config.queen_url)
            .context("failed to build queen gRPC channel")?,
    );

    let user_store = match &config.database_url {
        Some(database_url) => {
            let pool = db::pool::create_pg_pool(database_url, db::pool::PoolConfig::from_env())
                .await?;
            db::migrations::run_migrations(&pool).await?;
            db::pool::check_pool_health(&pool).await?;
            UserStore::Postgres(pool)
        }
        None => {
            warn!("HEXGATE_DATABASE_URL is unset; user accounts are held in memory");
            UserStore::in_memory()
        }
    };

    let registry = Arc::new(ClientRegistry::default());
    let world = Arc::new(WorldState::new(registry));
    let terrain = Arc::new(TerrainCache::new(queen.clone()));

    tokio::spawn(world::feed::run_feed(queen.clone(), Arc::clone(&world)));

    let app = build_router(
        app_metrics,
        queen.clone(),
        config.cors_origins.clone(),
        ws::handler::WsState { world, terrain: Arc::clone(&terrain) },
        api::world::router(WorldApiState { queen: queen.clone(), terrain }),
        api::users::router(UsersApiState { store: user_store, jwt: jwt_service, queen }),
    );

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind gateway listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, queen_url = %config.queen_url, "starting gateway");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway exited unexpectedly")
}

fn build_router(
    app_metrics: Arc<GatewayMetrics>,
    queen: QueenBackend,
    cors_origins: Option<String>,
    ws_state: ws::handler::WsState,
    world_api: Router,
    users_api: Router,
) -> Router {
    apply_middleware(
        Router::new()
            .route(
                "/healthz",
                get(move || {
                    let queen = queen.clone();
                    async move { healthz(queen).await }
                }),
            )
            .route(
                "/metrics",
                get(move || {
                    let app_metrics = Arc::clone(&app_metrics);
                    async move { app_metrics.render_prometheus() }
                }),
            )
            .merge(ws::handler::router(ws_state))
            .merge(world_api)
            .merge(users_api)
            .layer(cors::cors_layer(cors_origins)),
    )
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

/// Readiness check: the gateway is healthy when the queen answers a ping.
async fn healthz(queen: QueenBackend) -> (StatusCode, &'static str) {
    match queen.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            warn!(%error, "queen health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "queen unreachable")
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response =
        with_request_id_scope(request_id.clone(), async move { next.run(request).await }).await;

    attach_request_id_header(&mut response, &request_id);

    let latency_ms = started_at.elapsed().as_millis() as u64;
    metrics::record_http_request(method.as_str(), &path, response.status().as_u16(), latency_ms);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms,
        "request completed"
    );

    response
}
