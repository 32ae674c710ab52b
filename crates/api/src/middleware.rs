//! Idempotency middleware for order creation.
//!
//! Requests must carry `X-Idempotency-Key`. The first request with a key runs
//! the handler; a 2xx response is stored and replayed, with
//! `X-Idempotency-Replayed: true`, to every later request with the same key.
//! Non-2xx responses pass through uncached so the client can retry.

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common::IdempotencyKey;
use idempotency::{
    GuardOutcome, IdempotencyError, IdempotencyGuard, IdempotencyStore, StoredResponse,
};

use crate::error::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";
pub const IDEMPOTENCY_REPLAYED_HEADER: &str = "x-idempotency-replayed";

/// Why a guarded request did not produce a cacheable response.
enum Uncached {
    Guard(IdempotencyError),
    Response(Response),
}

impl From<IdempotencyError> for Uncached {
    fn from(err: IdempotencyError) -> Self {
        Uncached::Guard(err)
    }
}

/// Reads the key header; `Ok(None)` when absent.
pub fn idempotency_key(headers: &HeaderMap) -> Result<Option<IdempotencyKey>, IdempotencyError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let text = value
        .to_str()
        .map_err(|_| IdempotencyError::InvalidKey("header is not valid text".to_string()))?;
    text.parse::<IdempotencyKey>()
        .map(Some)
        .map_err(|_| IdempotencyError::InvalidKey(format!("'{text}' is not a UUID")))
}

pub async fn idempotency<I: IdempotencyStore + Clone + 'static>(
    State(guard): State<IdempotencyGuard<I>>,
    request: Request,
    next: Next,
) -> Response {
    let key = match idempotency_key(request.headers()) {
        Ok(key) => key,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let outcome = guard
        .execute(key, || async move {
            let response = next.run(request).await;
            if !response.status().is_success() {
                return Err(Uncached::Response(response));
            }
            capture(response).await
        })
        .await;

    match outcome {
        Ok(GuardOutcome::Executed(stored)) => rebuild(stored, false),
        Ok(GuardOutcome::Replayed(stored)) => rebuild(stored, true),
        Err(Uncached::Response(response)) => response,
        Err(Uncached::Guard(e)) => ApiError::from(e).into_response(),
    }
}

/// Buffers a successful response into a storable form.
async fn capture(response: Response) -> Result<StoredResponse, Uncached> {
    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.map_err(|e| {
        let err = ApiError::Internal(format!("failed to read response body: {e}"));
        Uncached::Response(err.into_response())
    })?;

    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(_) => {
                tracing::warn!(status = %parts.status, "non-JSON response not stored for replay");
                let response = Response::from_parts(parts, Body::from(bytes));
                return Err(Uncached::Response(response));
            }
        }
    };

    Ok(StoredResponse::new(parts.status.as_u16(), body))
}

fn rebuild(stored: StoredResponse, replayed: bool) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK);
    let mut response = if stored.body.is_null() {
        status.into_response()
    } else {
        (status, axum::Json(stored.body)).into_response()
    };

    if replayed {
        response.headers_mut().insert(
            header::HeaderName::from_static(IDEMPOTENCY_REPLAYED_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    response
}
