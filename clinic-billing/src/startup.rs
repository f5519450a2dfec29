//! Application startup and lifecycle management.

use crate::clients::ClinicApiClient;
use crate::config::ClinicBillingConfig;
use crate::handlers::{health, patients, sessions};
use crate::services::{init_metrics, BillingService};
use crate::AppState;
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{request_id_middleware, REQUEST_ID_HEADER};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics_handler))
        .route("/sessions", post(sessions::open_session))
        .route(
            "/sessions/:id",
            get(sessions::get_session).delete(sessions::close_session),
        )
        .route("/sessions/:id/actions", post(sessions::apply_action))
        .route("/sessions/:id/branch", put(sessions::select_branch))
        .route("/sessions/:id/patient", put(sessions::select_patient))
        .route("/sessions/:id/medicines", get(sessions::search_medicines))
        .route("/sessions/:id/doctors", get(sessions::list_doctors))
        .route("/sessions/:id/walkins", get(sessions::list_walkins))
        .route("/sessions/:id/submit", post(sessions::submit))
        .route(
            "/sessions/:id/temporary-bill",
            post(sessions::save_temporary_bill),
        )
        .route(
            "/sessions/:id/pending-bills/:bill_id",
            delete(sessions::delete_pending_bill),
        )
        .route(
            "/patients",
            get(patients::search_patients).post(patients::create_patient),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application against the configured clinic backend.
    pub async fn build(config: ClinicBillingConfig) -> Result<Self, AppError> {
        let client = ClinicApiClient::new(&config.clinic_api).map_err(AppError::ConfigError)?;
        let billing = BillingService::with_client(client, config.default_mode);
        Self::build_with_service(config, billing).await
    }

    /// Build the application around an already assembled billing service.
    pub async fn build_with_service(
        config: ClinicBillingConfig,
        billing: BillingService,
    ) -> Result<Self, AppError> {
        init_metrics();

        let address = config.common.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!(error = %e, addr = %address, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port = port,
            clinic_api_url = %config.clinic_api.url,
            default_mode = config.default_mode.as_str(),
            session_idle_secs = config.session_idle.as_secs(),
            "Clinic billing listener bound"
        );

        let billing = Arc::new(billing);
        billing.spawn_idle_sweeper(config.session_idle);
        let router = build_router(AppState::new(billing));

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = "clinic-billing",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );
        axum::serve(self.listener, self.router).await
    }
}
