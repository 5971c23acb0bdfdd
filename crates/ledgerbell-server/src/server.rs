//! `NotifyServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use ledgerbell_core::Role;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse, SessionCounts};
use crate::metrics;
use crate::notifier::{DomainChange, Notifier};
use crate::registry::SessionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::event_bridge::EventBridge;
use crate::websocket::session::{SessionContext, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session directory.
    pub registry: Arc<SessionRegistry>,
    /// Domain change entry point for `POST /events`.
    pub notifier: Notifier,
    /// Per-connection session wiring.
    pub session: SessionContext,
    /// Max inbound WebSocket message size.
    pub max_message_size: usize,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics_handle: PrometheusHandle,
}

/// The notification server.
pub struct NotifyServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    notifier: Notifier,
    shutdown: Arc<ShutdownCoordinator>,
    live_connections: Arc<AtomicUsize>,
    metrics_handle: PrometheusHandle,
    start_time: Instant,
}

impl NotifyServer {
    /// Create a new server with an empty registry.
    pub fn new(config: ServerConfig, metrics_handle: PrometheusHandle) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            dispatcher: Arc::new(Dispatcher::new(registry.clone())),
            registry,
            notifier: Notifier::default(),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            live_connections: Arc::new(AtomicUsize::new(0)),
            metrics_handle,
            start_time: Instant::now(),
            config,
        }
    }

    /// Build the Axum router with all routes.
    ///
    /// Only the read routes answer cross-origin requests. `POST /events` has
    /// no CORS layer and only accepts `application/json`, so a browser page
    /// on another origin cannot reach it.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            notifier: self.notifier.clone(),
            session: SessionContext {
                registry: self.registry.clone(),
                live_connections: self.live_connections.clone(),
                send_queue_capacity: self.config.send_queue_capacity.max(1),
                heartbeat_interval: self.config.heartbeat_interval(),
                heartbeat_timeout: self.config.heartbeat_timeout(),
                shutdown: self.shutdown.token(),
            },
            max_message_size: self.config.max_message_size,
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
        };

        let read = Router::new()
            .route(&self.config.ws_path, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(CorsLayer::permissive());
        let trigger = Router::new().route("/events", post(events_handler));

        read.merge(trigger)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which finishes once shutdown is signalled and connections drain.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.socket_addr()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::bind(addr, e))?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server stopped with error");
            }
        });

        info!(addr = %local_addr, ws_path = %self.config.ws_path, "notification server listening");
        Ok((local_addr, handle))
    }

    /// Start the event bridge from the notifier to the dispatcher.
    pub fn spawn_bridge(&self) -> JoinHandle<()> {
        let bridge = EventBridge::new(
            self.notifier.subscribe(),
            self.dispatcher.clone(),
            self.shutdown.token(),
        );
        tokio::spawn(bridge.run())
    }

    /// Handle for emitting domain changes.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// The session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.live_connections.load(Ordering::Relaxed)
    }
}

/// GET {`ws_path`}
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session;
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, session))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.session.live_connections.load(Ordering::Relaxed);
    let sessions = SessionCounts {
        admin: state.registry.count_role(Role::Admin),
        user: state.registry.count_role(Role::User),
    };
    Json(health::health_check(state.start_time, connections, sessions))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics_handle)
}

/// POST /events
async fn events_handler(
    State(state): State<AppState>,
    Json(change): Json<DomainChange>,
) -> StatusCode {
    let _ = state.notifier.notify(change);
    StatusCode::ACCEPTED
}
