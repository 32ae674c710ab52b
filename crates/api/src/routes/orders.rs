//! Order endpoints under `/v1/orders`.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use common::{Money, Order, OrderId, OrderItem, OrderStatus, PartnerId};
use serde::{Deserialize, Serialize};
use store::{MAX_PAGE, OrderQuery, OrderSort, OrderStore, PartnerStore, SortDirection};

use crate::AppState;
use crate::error::ApiError;
use crate::response::ApiResponse;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateOrderRequest {
    pub partner_id: PartnerId,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderItemRequest {
    pub code: String,
    pub name: String,
    pub quantity: u32,
    pub price_cents: i64,
}

/// Query string of `GET /v1/orders`. Values are parsed by hand so that bad
/// input yields the API's own error envelope.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SearchParams {
    pub order_id: Option<String>,
    pub partner_id: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub status: String,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderResponse {
    pub id: OrderId,
    pub partner_id: PartnerId,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_value_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderItemResponse {
    pub id: String,
    pub code: String,
    pub name: String,
    pub quantity: u32,
    pub price_cents: i64,
    pub subtotal_cents: i64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let items = order
            .items()
            .iter()
            .map(|item| OrderItemResponse {
                id: item.id.to_string(),
                code: item.code.clone(),
                name: item.name.clone(),
                quantity: item.quantity,
                price_cents: item.price.cents(),
                subtotal_cents: item.subtotal().cents(),
            })
            .collect();

        Self {
            id: order.id,
            partner_id: order.partner_id,
            status: order.status,
            items,
            total_value_cents: order.total_value().cents(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            version: order.version.as_i64(),
        }
    }
}

// -- Handlers --

/// POST /v1/orders: create a PENDING order.
///
/// Wrapped by the idempotency middleware.
#[tracing::instrument(skip(state, body))]
pub async fn create<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ApiError>
where
    P: PartnerStore + 'static,
    O: OrderStore + 'static,
{
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let items = req
        .items
        .into_iter()
        .map(|item| {
            OrderItem::new(
                item.code,
                item.name,
                item.quantity,
                Money::from_cents(item.price_cents),
            )
        })
        .collect();

    let order = state.orders.create_order(req.partner_id, items).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(order.into())),
    ))
}

/// GET /v1/orders: filtered, paginated search.
#[tracing::instrument(skip(state))]
pub async fn search<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ApiError>
where
    P: PartnerStore + 'static,
    O: OrderStore + 'static,
{
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let query = build_query(params)?;

    let page = state.orders.search_orders(query).await?;
    Ok(Json(ApiResponse::page(page, OrderResponse::from)))
}

/// GET /v1/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<ApiResponse<OrderResponse>>, ApiError>
where
    P: PartnerStore + 'static,
    O: OrderStore + 'static,
{
    let order_id = parse_order_id(id)?;
    let order = state.orders.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(order.into())))
}

/// PATCH /v1/orders/{id}/status?status=APPROVED
#[tracing::instrument(skip(state))]
pub async fn update_status<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    id: Result<Path<String>, PathRejection>,
    params: Result<Query<StatusParams>, QueryRejection>,
) -> Result<Json<ApiResponse<OrderResponse>>, ApiError>
where
    P: PartnerStore + 'static,
    O: OrderStore + 'static,
{
    let order_id = parse_order_id(id)?;
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let status = parse_param::<OrderStatus>("status", &params.status)?;

    let order = state.orders.update_status(order_id, status).await?;
    Ok(Json(ApiResponse::success(order.into())))
}

/// DELETE /v1/orders/{id}: cancel the order.
///
/// Orders are never removed; the row stays with status CANCELED.
#[tracing::instrument(skip(state))]
pub async fn cancel<P, O>(
    State(state): State<Arc<AppState<P, O>>>,
    id: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, ApiError>
where
    P: PartnerStore + 'static,
    O: OrderStore + 'static,
{
    let order_id = parse_order_id(id)?;
    state.orders.cancel_order(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_order_id(id: Result<Path<String>, PathRejection>) -> Result<OrderId, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    parse_param("id", &id)
}

fn parse_param<T>(name: &str, value: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {name} '{value}': {e}")))
}

fn build_query(params: SearchParams) -> Result<OrderQuery, ApiError> {
    let mut query = OrderQuery::new();

    if let Some(id) = params.order_id.as_deref() {
        query = query.order_id(parse_param("order-id", id)?);
    }
    if let Some(id) = params.partner_id.as_deref() {
        query = query.partner_id(parse_param("partner-id", id)?);
    }
    if let Some(status) = params.status.as_deref() {
        query = query.status(parse_param("status", status)?);
    }
    if let Some(start) = params.start_date.as_deref() {
        query = query.created_from(parse_date("start-date", start, NaiveTime::MIN)?);
    }
    if let Some(end) = params.end_date.as_deref() {
        let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        query = query.created_to(parse_date("end-date", end, end_of_day)?);
    }
    if let Some(page) = params.page {
        if page > MAX_PAGE {
            return Err(ApiError::BadRequest(format!(
                "Invalid page '{page}': must be at most {MAX_PAGE}"
            )));
        }
        query = query.page(page);
    }
    if let Some(size) = params.size {
        query = query.size(size);
    }

    let sort_by = match params.sort_by.as_deref() {
        Some(value) => parse_sort(value)?,
        None => OrderSort::default(),
    };
    let direction = match params.sort_direction.as_deref() {
        Some(value) if value.eq_ignore_ascii_case("asc") => SortDirection::Asc,
        Some(value) if value.eq_ignore_ascii_case("desc") => SortDirection::Desc,
        Some(value) => {
            return Err(ApiError::BadRequest(format!(
                "Invalid sort-direction '{value}': expected ASC or DESC"
            )));
        }
        None => SortDirection::default(),
    };

    Ok(query.sort(sort_by, direction))
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates.
fn parse_date(name: &str, value: &str, time_of_day: NaiveTime) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(time_of_day).and_utc())
        .map_err(|_| {
            ApiError::BadRequest(format!(
                "Invalid {name} '{value}': expected YYYY-MM-DD or an RFC 3339 timestamp"
            ))
        })
}

fn parse_sort(value: &str) -> Result<OrderSort, ApiError> {
    let normalized: String = value
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_ascii_lowercase();

    match normalized.as_str() {
        "createdat" => Ok(OrderSort::CreatedAt),
        "updatedat" => Ok(OrderSort::UpdatedAt),
        "totalvalue" => Ok(OrderSort::TotalValue),
        "status" => Ok(OrderSort::Status),
        _ => Err(ApiError::BadRequest(format!(
            "Invalid sort-by '{value}': expected createdAt, updatedAt, totalValue or status"
        ))),
    }
}
