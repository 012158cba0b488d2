//! Bearer-token authentication at the trust boundary.
//!
//! Tokens are HS256 JWTs carrying the caller id (`sub`) and their marketplace
//! role. Handlers declare the role they need by taking one of the extractors
//! below; the router state only has to expose a [`JwtService`] via `AsRef`.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Provider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expires_in: Duration,
}

impl JwtService {
    pub fn new(secret: &str, expires_in: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expires_in,
        }
    }

    pub fn issue_token(&self, user_id: &str, role: Role) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: (now + self.expires_in).timestamp(),
            iat: now.timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }
}

/// Parses `JWT_EXPIRES_IN` style durations: `3600`, `90s`, `30m`, `24h`, `7d`.
pub fn parse_expiry(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let (digits, unit) = match value.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&value[..idx], Some(c)),
        _ => (value, None),
    };
    let amount: i64 = digits.parse().ok()?;
    if amount <= 0 {
        return None;
    }
    match unit {
        None | Some('s') => Some(Duration::seconds(amount)),
        Some('m') => Some(Duration::minutes(amount)),
        Some('h') => Some(Duration::hours(amount)),
        Some('d') => Some(Duration::days(amount)),
        _ => None,
    }
}

/// Any authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub role: Role,
}

/// Endpoints open to every role.
pub type AnyAuth = AuthContext;

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: AsRef<JwtService> + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("Missing or invalid Authorization header"))?;

        let claims = state.as_ref().validate_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::unauthorized("Invalid or expired token")
        })?;

        let span = tracing::Span::current();
        span.record("user_id", claims.sub.as_str());
        span.record("role", claims.role.as_str());

        Ok(AuthContext {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

macro_rules! role_extractor {
    ($(#[$meta:meta])* $name:ident, $role:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub AuthContext);

        impl $name {
            pub fn user_id(&self) -> &str {
                &self.0.user_id
            }
        }

        #[async_trait]
        impl<S> FromRequestParts<S> for $name
        where
            S: AsRef<JwtService> + Send + Sync,
        {
            type Rejection = AppError;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &S,
            ) -> Result<Self, Self::Rejection> {
                let ctx = AuthContext::from_request_parts(parts, state).await?;
                if ctx.role != $role {
                    return Err(AppError::forbidden(format!(
                        "This endpoint requires the {} role",
                        $role.as_str()
                    )));
                }
                Ok($name(ctx))
            }
        }
    };
}

role_extractor!(
    /// Customer-only endpoints.
    UserAuth,
    Role::User
);
role_extractor!(
    /// Provider-only endpoints.
    ProviderAuth,
    Role::Provider
);
role_extractor!(
    /// Admin-only endpoints.
    AdminAuth,
    Role::Admin
);
