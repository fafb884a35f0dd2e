use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use recirc_api::auth::{self, AppState, AppStateInner};
use recirc_api::middleware::require_auth;
use recirc_api::{chat, items, notifications, requests};
use recirc_gateway::connection;
use recirc_gateway::dispatcher::Dispatcher;
use recirc_gateway::registry::Registry;

#[derive(Clone)]
struct ServerState {
    registry: Registry,
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recirc=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("RECIRC_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("RECIRC_DB_PATH").unwrap_or_else(|_| "recirc.db".into());
    let host = std::env::var("RECIRC_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("RECIRC_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(recirc_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let registry = Registry::new();
    let dispatcher = Dispatcher::new(registry.clone(), db.clone());
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
    });

    let state = ServerState {
        registry,
        dispatcher,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/items", get(items::list_items).post(items::create_item))
        .route(
            "/items/{item_id}",
            get(items::get_item)
                .patch(items::update_item)
                .delete(items::delete_item),
        )
        .route("/items/{item_id}/requests", get(requests::item_requests))
        .route(
            "/items/{item_id}/chat",
            get(chat::get_messages).post(chat::send_message),
        )
        .route("/requests", post(requests::create_request))
        .route("/requests/sent", get(requests::sent_requests))
        .route("/requests/received", get(requests::received_requests))
        .route("/requests/{request_id}/accept", patch(requests::accept_request))
        .route("/requests/{request_id}/reject", patch(requests::reject_request))
        .route("/requests/{request_id}/cancel", patch(requests::cancel_request))
        .route(
            "/notifications",
            get(notifications::list_notifications).post(notifications::create_notification),
        )
        .route("/notifications/{notification_id}/read", patch(notifications::mark_read))
        .route(
            "/notifications/{notification_id}",
            delete(notifications::delete_notification),
        )
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("recirc server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.registry, state.dispatcher, state.jwt_secret)
    })
}
