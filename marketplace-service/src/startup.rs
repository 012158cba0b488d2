//! Application startup and lifecycle management.

use crate::config::{Config, StorageBackend};
use crate::handlers::{self, bookings, coupons, feedback, payments, razorpay, transactions};
use crate::services::{
    BookingService, CatalogService, CouponService, FeedbackService, InMemoryRepository,
    MongoRepository, PaymentService, RazorpayClient, Repository,
};
use axum::middleware::from_fn;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    auth::JwtService, metrics::metrics_middleware, request_id::request_id_middleware,
    request_id::REQUEST_ID_HEADER, security_headers::security_headers_middleware,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repository: Arc<dyn Repository>,
    pub razorpay: RazorpayClient,
    pub jwt: JwtService,
    pub payments: PaymentService,
    pub feedback: FeedbackService,
    pub coupons: CouponService,
    pub bookings: BookingService,
    pub catalog: CatalogService,
}

impl AsRef<JwtService> for AppState {
    fn as_ref(&self) -> &JwtService {
        &self.jwt
    }
}

impl AppState {
    /// Wires the domain services over an already-initialised store.
    pub fn new(config: Config, repository: Arc<dyn Repository>) -> Result<Self, AppError> {
        let razorpay = RazorpayClient::new(config.razorpay.clone()).map_err(|e| {
            tracing::error!("Failed to build Razorpay HTTP client: {}", e);
            AppError::ConfigError(e)
        })?;
        if razorpay.is_configured() {
            tracing::info!("Razorpay client initialized");
        } else {
            tracing::warn!("Razorpay credentials not configured - online payments are disabled");
        }

        let jwt = JwtService::new(config.jwt.secret.expose_secret(), config.jwt.expires_in);
        let coupons = CouponService::new(repository.clone());

        Ok(Self {
            payments: PaymentService::new(repository.clone(), razorpay.clone()),
            feedback: FeedbackService::new(repository.clone()),
            bookings: BookingService::new(repository.clone(), coupons.clone()),
            catalog: CatalogService::new(repository.clone()),
            coupons,
            razorpay,
            jwt,
            repository,
            config: Arc::new(config),
        })
    }
}

/// Opens the configured store; for MongoDB this also ensures the indexes.
pub async fn connect_repository(config: &Config) -> Result<Arc<dyn Repository>, AppError> {
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(InMemoryRepository::new()))
        }
        StorageBackend::Mongo => {
            let mut client_options = ClientOptions::parse(config.database.url.expose_secret())
                .await
                .map_err(|e| {
                    tracing::error!("Failed to parse MongoDB connection string: {}", e);
                    AppError::DatabaseError(e.into())
                })?;
            client_options.app_name = Some(config.service_name.clone());

            let client = Client::with_options(client_options).map_err(|e| {
                tracing::error!("Failed to create MongoDB client: {}", e);
                AppError::DatabaseError(e.into())
            })?;
            let repository = MongoRepository::new(&client.database(&config.database.db_name));

            repository.init_indexes().await.map_err(|e| {
                tracing::error!("Failed to initialize database indexes: {}", e);
                e
            })?;
            Ok(Arc::new(repository))
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let catalog = Router::new()
        .route(
            "/api/services",
            post(bookings::create_service).get(bookings::list_services),
        )
        .route("/api/services/:id", get(bookings::get_service))
        .route("/api/services/:id/feedback", get(bookings::service_feedback))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/complete", post(bookings::complete_booking));

    let feedback = Router::new()
        .route("/api/feedback", post(feedback::submit_feedback))
        .route("/api/feedback/mine", get(feedback::my_feedback))
        .route("/api/feedback/provider", get(feedback::provider_feedback))
        .route(
            "/api/feedback/provider/:id/summary",
            get(feedback::provider_summary),
        )
        .route("/api/feedback/admin", get(feedback::admin_list_feedback))
        .route(
            "/api/feedback/admin/:id",
            delete(feedback::admin_delete_feedback),
        )
        .route(
            "/api/feedback/:id",
            patch(feedback::edit_feedback).delete(feedback::delete_feedback),
        );

    let coupons = Router::new()
        .route(
            "/api/coupon",
            post(coupons::create_coupon).get(coupons::list_coupons),
        )
        .route("/api/coupon/available", get(coupons::available_coupons))
        .route("/api/coupon/validate", post(coupons::validate_coupon))
        .route(
            "/api/coupon/:id",
            axum::routing::put(coupons::update_coupon).delete(coupons::delete_coupon),
        );

    let payment = Router::new()
        .route("/api/payment/bookings/:id", post(payments::create_payment))
        .route(
            "/api/payment/bookings/:id/wallet",
            post(payments::pay_from_wallet),
        )
        .route("/api/payment/verify", post(razorpay::verify_payment))
        .route("/api/payment/webhook", post(razorpay::webhook))
        .route("/api/payment/wallet", get(payments::wallet_balance))
        .route(
            "/api/payment/transactions",
            get(transactions::list_transactions),
        )
        .route("/api/payment/earnings", get(transactions::earnings))
        .route(
            "/api/payment/withdrawals",
            post(transactions::initiate_withdrawal),
        )
        .route(
            "/api/payment/admin/withdrawals",
            get(transactions::list_withdrawals),
        )
        .route(
            "/api/payment/admin/withdrawals/:id/approve",
            post(transactions::approve_withdrawal),
        )
        .route(
            "/api/payment/admin/withdrawals/:id/reject",
            post(transactions::reject_withdrawal),
        )
        .route(
            "/api/payment/admin/wallets/:user_id/credit",
            post(payments::credit_wallet),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .merge(catalog)
        .merge(feedback)
        .merge(coupons)
        .merge(payment)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
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
                    version = ?request.version(),
                    user_id = tracing::field::Empty,
                    role = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let repository = connect_repository(&config).await?;

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid listen address: {}", e))
            })?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        let state = AppState::new(config, repository)?;
        let router = build_router(state);

        tracing::info!("Marketplace service: HTTP on port {}", port);
        Ok(Self {
            port,
            listener,
            router,
        })
    }

    /// Port the server is listening on (useful with port 0).
    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
