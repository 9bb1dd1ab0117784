//! HTTP server: dispatches requests through the route table.

use crate::config::{ConfigError, ServerSettings, StubberConfig};
use crate::openapi;
use crate::request::RequestSnapshot;
use crate::response::{self, ResolvedResponse};
use crate::routes::{resolve_method, RouteTable};
use crate::script::{ScriptLimits, ScriptRuntime};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

const RESERVED_PATHS: [&str; 2] = ["/health", "/openapi.json"];

/// Read-only state shared by all handlers.
#[derive(Debug)]
pub struct AppState {
    routes: RouteTable,
    runtime: ScriptRuntime,
    openapi: Bytes,
    settings: ServerSettings,
}

impl AppState {
    /// Build the route table, compile scripts, and render the OpenAPI document.
    pub fn new(config: StubberConfig) -> Result<Self, ConfigError> {
        let StubberConfig {
            info,
            endpoints,
            settings,
        } = config;

        let runtime = ScriptRuntime::new(ScriptLimits {
            max_operations: settings.max_script_operations,
            max_idle_contexts: settings.max_idle_contexts,
        });

        for endpoint in &endpoints {
            if RESERVED_PATHS.contains(&endpoint.path.as_str()) {
                warn!(path = %endpoint.path, "Endpoint shadowed by a built-in route");
            }
        }

        let routes = RouteTable::build(endpoints, &runtime)?;
        let document = openapi::generate(info.as_ref(), &routes);
        let openapi = Bytes::from(document.to_string());

        Ok(Self {
            routes,
            runtime,
            openapi,
            settings,
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

/// The mock HTTP server.
pub struct MockServer {
    router: Router,
    settings: ServerSettings,
}

impl MockServer {
    /// Create a server for the given configuration.
    pub fn new(config: StubberConfig) -> Result<Self, ConfigError> {
        let state = Arc::new(AppState::new(config)?);

        info!(
            routes = state.routes.len(),
            max_script_operations = state.settings.max_script_operations,
            "Mock server initialized"
        );

        let settings = state.settings.clone();
        Ok(Self {
            router: build_router(state),
            settings,
        })
    }

    /// The axum router serving all endpoints.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Serve on the given listener until Ctrl+C.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        info!(address = %addr, "Server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", any(health))
        .route("/openapi.json", get(openapi_document))
        .fallback(dispatch)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn openapi_document(State(state): State<Arc<AppState>>) -> Response {
    (
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        state.openapi.clone(),
    )
        .into_response()
}

/// Path match, method resolution, optional script, response.
async fn dispatch(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().as_str().to_string();

    let Some(hit) = state.routes.lookup(&path) else {
        debug!(method = %method, path = %path, "No matching route");
        return StatusCode::NOT_FOUND.into_response();
    };

    let Some(endpoint) = resolve_method(&hit.route.endpoints, &method) else {
        debug!(method = %method, path = %path, "Method not allowed");
        return response::method_not_allowed(hit.route.allowed_methods());
    };

    if state.settings.log_matches {
        info!(
            method = %method,
            path = %path,
            template = %hit.route.template.as_str(),
            scripted = endpoint.script.is_some(),
            "Request matched endpoint"
        );
    }

    let Some(script) = &endpoint.script else {
        return ResolvedResponse::from_static(endpoint).into_response();
    };

    let snapshot =
        RequestSnapshot::capture(request, hit.params, state.settings.max_body_bytes).await;

    match state
        .runtime
        .execute(script, &snapshot, &endpoint.definition.context)
    {
        Ok(result) => ResolvedResponse::from_script(endpoint, result).into_response(),
        Err(e) => {
            error!(method = %method, path = %path, error = %e, "Script error");
            response::script_failure(endpoint, &e)
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
