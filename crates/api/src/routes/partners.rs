//! Partner credit endpoints under `/v1/partners`.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use common::{Money, PartnerId};
use domain::CreditSnapshot;
use serde::{Deserialize, Serialize};
use store::{OrderStore, PartnerStore};

use crate::AppState;
use crate::error::ApiError;
use crate::response::ApiResponse;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateCreditLimitRequest {
    pub credit_limit_cents: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreditResponse {
    pub partner_id: PartnerId,
    pub partner_code: String,
    pub credit_limit_cents: i64,
    pub available_credit_cents: i64,
    pub used_credit_cents: i64,
}

impl From<CreditSnapshot> for CreditResponse {
    fn from(snapshot: CreditSnapshot) -> Self {
        Self {
            partner_id: snapshot.partner_id,
            credit_limit_cents: snapshot.credit_limit.cents(),
            available_credit_cents: snapshot.available_credit.cents(),
            used_credit_cents: snapshot.used_credit().cents(),
            partner_code: snapshot.partner_code,
        }
    }
}

/// GET /v1/partners/{id}/credit
#[tracing::instrument(skip(state))]
pub async fn credit<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<ApiResponse<CreditResponse>>, ApiError>
where
    P: PartnerStore + 'static,
    O: OrderStore + 'static,
{
    let partner_id = parse_partner_id(id)?;
    let snapshot = state.orders.available_credit(partner_id).await?;
    Ok(Json(ApiResponse::success(snapshot.into())))
}

/// PUT /v1/partners/{id}/credit-limit
#[tracing::instrument(skip(state, body))]
pub async fn update_credit_limit<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<UpdateCreditLimitRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<CreditResponse>>, ApiError>
where
    P: PartnerStore + 'static,
    O: OrderStore + 'static,
{
    let partner_id = parse_partner_id(id)?;
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let partner = state
        .orders
        .update_credit_limit(partner_id, Money::from_cents(req.credit_limit_cents))
        .await?;
    Ok(Json(ApiResponse::success(CreditSnapshot::from(&partner).into())))
}

fn parse_partner_id(id: Result<Path<String>, PathRejection>) -> Result<PartnerId, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid id '{id}': {e}")))
}
