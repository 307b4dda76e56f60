//! Request extractors with Taskline error contracts.

use async_trait::async_trait;
use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JSON body extractor whose rejection is the stable
/// `400 {"error":"invalid body"}` contract instead of axum's default
/// plain-text rejection.
#[derive(Debug, Clone, Copy)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "rejecting undecodable request body");
                Err(ApiError::invalid_body())
            }
        }
    }
}
