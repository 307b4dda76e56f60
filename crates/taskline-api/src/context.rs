//! Request context extraction and authentication middleware.
//!
//! In debug mode the user identifier is supplied via the `X-User-Id` header
//! for local development. In production mode it is extracted from a verified
//! JWT; the claim carrying the identifier defaults to `sub` and is
//! configurable via `TASKLINE_JWT_USER_CLAIM`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::header::HeaderName;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;
use ulid::Ulid;

use taskline_core::UserId;

use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::server::AppState;

/// Header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request context derived from authentication and headers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Authenticated user identifier.
    pub user_id: UserId,
    /// Request ID for tracing/correlation.
    pub request_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<Self>() {
            return Ok(existing.clone());
        }

        let headers = &parts.headers;
        let request_id =
            request_id_from_headers(headers).unwrap_or_else(|| Ulid::new().to_string());

        let user_id = if state.config.debug {
            header_string(headers, "X-User-Id")
                .map(UserId::new)
                .ok_or_else(|| {
                    ApiError::unauthorized("missing X-User-Id header (debug mode)")
                        .with_request_id(request_id.clone())
                })?
        } else {
            extract_from_jwt(headers, &state.config.jwt, &request_id)?
        };

        let ctx = Self {
            user_id,
            request_id,
        };
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

fn extract_from_jwt(
    headers: &HeaderMap,
    jwt: &JwtConfig,
    request_id: &str,
) -> Result<UserId, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::missing_auth().with_request_id(request_id.to_string()))?;

    let (decoding_key, algorithm) = jwt_decoding_key(jwt, request_id)?;
    let mut validation = Validation::new(algorithm);
    validation.validate_nbf = true;

    if let Some(iss) = jwt.issuer.as_deref() {
        validation.set_issuer(&[iss]);
    }
    if let Some(aud) = jwt.audience.as_deref() {
        validation.set_audience(&[aud]);
    }

    let data = jsonwebtoken::decode::<Value>(&token, &decoding_key, &validation)
        .map_err(|_| ApiError::invalid_token().with_request_id(request_id.to_string()))?;

    data.claims
        .get(&jwt.user_claim)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(UserId::new)
        .ok_or_else(|| ApiError::invalid_token().with_request_id(request_id.to_string()))
}

fn jwt_decoding_key(jwt: &JwtConfig, request_id: &str) -> Result<(DecodingKey, Algorithm), ApiError> {
    match (
        jwt.hs256_secret.as_deref(),
        jwt.rs256_public_key_pem.as_deref(),
    ) {
        (Some(secret), None) => Ok((DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)),
        (None, Some(pem)) => DecodingKey::from_rsa_pem(pem.as_bytes())
            .map(|key| (key, Algorithm::RS256))
            .map_err(|e| {
                ApiError::internal(format!("failed to parse jwt.rs256_public_key_pem: {e}"))
                    .with_request_id(request_id.to_string())
            }),
        (Some(_), Some(_)) => Err(ApiError::internal(
            "jwt.hs256_secret and jwt.rs256_public_key_pem are mutually exclusive",
        )
        .with_request_id(request_id.to_string())),
        (None, None) => Err(ApiError::internal(
            "jwt.hs256_secret or jwt.rs256_public_key_pem is required when debug=false",
        )
        .with_request_id(request_id.to_string())),
    }
}

pub(crate) fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    header_string(headers, "X-Request-Id").or_else(|| header_string(headers, "X-Request-ID"))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = header_string(headers, "Authorization")?;
    let token = raw.strip_prefix("Bearer ")?;
    Some(token.to_string())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name)?.to_str().ok().map(str::to_string)
}

/// Authentication middleware.
///
/// Runs before the route handlers, injects a verified [`RequestContext`]
/// into request extensions, and echoes the request ID back to the client.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();

    let ctx = match RequestContext::from_request_parts(&mut parts, &state).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    let mut req = Request::from_parts(parts, body);
    let request_id = ctx.request_id.clone();
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
