#![allow(dead_code)]

use marketplace_service::config::{
    Config, DatabaseConfig, JwtConfig, RazorpayConfig, StorageBackend,
};
use marketplace_service::models::{
    new_id, Booking, BookingStatus, PaymentStatus, Service, User,
};
use marketplace_service::services::Repository;
use marketplace_service::startup::connect_repository;
use marketplace_service::{build_router, AppState};
use mongodb::bson::DateTime;
use reqwest::{Client, Response};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use service_core::middleware::auth::{JwtService, Role};
use service_core::utils::signature::hmac_sha256_hex;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const KEY_ID: &str = "rzp_test_key";
pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const JWT_SECRET: &str = "test-jwt-secret";

pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub repository: Arc<dyn Repository>,
    pub razorpay: MockServer,
    pub jwt: JwtService,
}

pub fn test_config(razorpay_url: &str) -> Config {
    Config {
        server: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout_secs: 30,
        },
        storage: StorageBackend::Memory,
        database: DatabaseConfig {
            url: Secret::new(String::new()),
            db_name: "marketplace_test".to_string(),
        },
        razorpay: RazorpayConfig {
            key_id: KEY_ID.to_string(),
            key_secret: Secret::new(KEY_SECRET.to_string()),
            webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            api_base_url: razorpay_url.to_string(),
            timeout_secs: 5,
        },
        jwt: JwtConfig {
            secret: Secret::new(JWT_SECRET.to_string()),
            expires_in: chrono::Duration::hours(1),
        },
        log_level: "info".to_string(),
        otlp_endpoint: None,
        service_name: "marketplace-service-test".to_string(),
    }
}

fn use_mongo(config: &mut Config, url: String) {
    config.storage = StorageBackend::Mongo;
    config.database.url = Secret::new(url);
    config.database.db_name = format!("marketplace_test_{}", Uuid::new_v4().simple());
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Always on MongoDB (`TEST_MONGODB_URI`, default localhost).
    pub async fn spawn_mongo() -> Self {
        Self::spawn_with(|config| {
            if config.storage != StorageBackend::Mongo {
                use_mongo(config, "mongodb://localhost:27017".to_string());
            }
        })
        .await
    }

    /// Spawns the router on a random port over a fresh store: a throwaway
    /// MongoDB database when `TEST_MONGODB_URI` is set, memory otherwise.
    pub async fn spawn_with(customize: impl FnOnce(&mut Config)) -> Self {
        let razorpay = MockServer::start().await;
        let mut config = test_config(&razorpay.uri());
        if let Ok(url) = std::env::var("TEST_MONGODB_URI") {
            use_mongo(&mut config, url);
        }
        customize(&mut config);

        let repository = connect_repository(&config)
            .await
            .expect("Failed to open test storage");
        let state =
            AppState::new(config, repository.clone()).expect("Failed to build app state");
        let jwt = state.jwt.clone();
        let router = build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            client: Client::new(),
            repository,
            razorpay,
            jwt,
        }
    }

    pub fn token(&self, user_id: &str, role: Role) -> String {
        self.jwt.issue_token(user_id, role).unwrap()
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Response {
        let mut request = self.client.get(format!("{}{}", self.address, path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        let mut request = self
            .client
            .post(format!("{}{}", self.address, path))
            .json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn patch(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .patch(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .put(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str, token: &str) -> Response {
        self.client
            .delete(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Posts a raw webhook body with the given signature header.
    pub async fn webhook(&self, body: &str, signature: Option<&str>) -> Response {
        let mut request = self
            .client
            .post(format!("{}/api/payment/webhook", self.address))
            .header("content-type", "application/json")
            .body(body.to_string());
        if let Some(signature) = signature {
            request = request.header("X-Razorpay-Signature", signature);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn seed_user(&self, role: Role, wallet_balance: i64) -> String {
        let id = new_id();
        self.repository
            .insert_user(User {
                id: id.clone(),
                name: format!("{} {}", role.as_str(), &id[..8]),
                email: format!("{}@example.com", &id[..8]),
                role,
                wallet_balance,
                feedbacks: vec![],
                created_at: DateTime::now(),
            })
            .await
            .unwrap();
        id
    }

    pub async fn seed_service(&self, price: i64) -> Service {
        let now = DateTime::now();
        let service = Service {
            id: new_id(),
            name: "AC servicing".to_string(),
            category: "appliance".to_string(),
            price,
            is_active: true,
            feedback: vec![],
            rating_sum: 0,
            rating_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.repository.insert_service(service.clone()).await.unwrap();
        service
    }

    pub async fn seed_booking(
        &self,
        customer_id: &str,
        provider_id: &str,
        service_id: &str,
        service_amount: i64,
        products_amount: i64,
        status: BookingStatus,
    ) -> Booking {
        let now = DateTime::now();
        let booking = Booking {
            id: new_id(),
            customer_id: customer_id.to_string(),
            provider_id: provider_id.to_string(),
            service_id: service_id.to_string(),
            service_amount,
            products_amount,
            discount_amount: 0,
            total_amount: service_amount + products_amount,
            coupon_code: None,
            status,
            payment_status: PaymentStatus::Unpaid,
            feedback_id: None,
            created_at: now,
            updated_at: now,
        };
        self.repository.insert_booking(booking.clone()).await.unwrap();
        booking
    }

    pub async fn booking(&self, id: &str) -> Booking {
        self.repository.get_booking(id).await.unwrap().unwrap()
    }

    pub async fn wallet(&self, user_id: &str) -> i64 {
        self.repository
            .get_user(user_id)
            .await
            .unwrap()
            .unwrap()
            .wallet_balance
    }

    /// Razorpay answers `POST /orders` with `order_id` for the given amount.
    pub async fn mock_order(&self, order_id: &str, amount_paise: i64) {
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(basic_auth(KEY_ID, KEY_SECRET))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": order_id,
                "entity": "order",
                "amount": amount_paise,
                "amount_paid": 0,
                "amount_due": amount_paise,
                "currency": "INR",
                "receipt": "rcpt_test",
                "status": "created",
                "attempts": 0,
                "created_at": 1_760_000_000
            })))
            .expect(1)
            .mount(&self.razorpay)
            .await;
    }

    /// Pays a booking in cash through the API, so the provider has earnings.
    pub async fn pay_cash(&self, booking: &Booking) {
        let token = self.token(&booking.customer_id, Role::User);
        let response = self
            .post(
                &format!("/api/payment/bookings/{}", booking.id),
                Some(&token),
                json!({
                    "amount": rupees(booking.total_amount),
                    "payment_method": "cash"
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
    }
}

/// Paise as the decimal string the API exchanges.
pub fn rupees(paise: i64) -> String {
    format!("{}.{:02}", paise / 100, paise % 100)
}

pub fn checkout_signature(order_id: &str, payment_id: &str) -> String {
    hmac_sha256_hex(KEY_SECRET, format!("{}|{}", order_id, payment_id).as_bytes()).unwrap()
}

pub fn webhook_signature(body: &str) -> String {
    hmac_sha256_hex(WEBHOOK_SECRET, body.as_bytes()).unwrap()
}
