//! Request extractors whose rejections are reported as [`BookingError::BadRequest`].

use crate::error::BookingError;
use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use axum_valid::{Valid, ValidRejection};
use serde::de::DeserializeOwned;
use std::fmt::Display;
use validator::Validate;

impl<E: Display> From<ValidRejection<E>> for BookingError {
    fn from(rejection: ValidRejection<E>) -> Self {
        BookingError::bad_request(rejection.to_string())
    }
}

impl From<PathRejection> for BookingError {
    fn from(rejection: PathRejection) -> Self {
        BookingError::bad_request(rejection.body_text())
    }
}

/// JSON body, deserialized and validated.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = BookingError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Valid(Json(value)) = Valid::<Json<T>>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Query string, deserialized and validated.
pub struct ValidQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = BookingError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Valid(Query(value)) = Valid::<Query<T>>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = BookingError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}
