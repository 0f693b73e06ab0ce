//! Payment, payment-status and payment-method endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, Page, PaymentId, PaymentMethodId};
use domain::{PaymentStatus, RecordPayment, UpdatePayment};
use serde::{Deserialize, Serialize};
use store::{Payment, PaymentMethod, Store};

use super::{AppState, PageQuery, parse_id};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub order_id: String,
    pub method_id: Option<String>,
    pub amount_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentRequest {
    pub amount_cents: Option<i64>,
    pub method_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentMethodRequest {
    pub name: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub order_id: String,
    pub method_id: Option<String>,
    pub amount_cents: i64,
    pub paid_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id.to_string(),
            order_id: p.order_id.to_string(),
            method_id: p.method_id.map(|id| id.to_string()),
            amount_cents: p.amount.cents(),
            paid_at: p.paid_at,
        }
    }
}

#[derive(Serialize)]
pub struct PaymentStatusResponse {
    pub order_id: String,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub pending_cents: i64,
    pub payments: Vec<PaymentResponse>,
}

impl From<PaymentStatus> for PaymentStatusResponse {
    fn from(status: PaymentStatus) -> Self {
        Self {
            order_id: status.order_id.to_string(),
            total_cents: status.total.cents(),
            paid_cents: status.paid.cents(),
            pending_cents: status.pending.cents(),
            payments: status
                .payments
                .into_iter()
                .map(PaymentResponse::from)
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct PaymentMethodResponse {
    pub id: String,
    pub name: String,
}

impl From<PaymentMethod> for PaymentMethodResponse {
    fn from(m: PaymentMethod) -> Self {
        Self {
            id: m.id.to_string(),
            name: m.name,
        }
    }
}

fn method_id(raw: Option<&String>) -> Result<Option<PaymentMethodId>, ApiError> {
    raw.map(|id| parse_id("method_id", id)).transpose()
}

// -- Payment handlers --

/// POST /api/v1/payments
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let order_id: OrderId = parse_id("order_id", &req.order_id)?;
    let mut cmd = RecordPayment::new(order_id, Money::from_cents(req.amount_cents));
    if let Some(method_id) = method_id(req.method_id.as_ref())? {
        cmd = cmd.with_method(method_id);
    }

    let payment = state.payments.record_payment(cmd).await?;
    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// GET /api/v1/payments, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<Page<PaymentResponse>>, ApiError> {
    let page = state.payments.list_payments(query.request()).await?;
    Ok(Json(page.map(PaymentResponse::from)))
}

/// GET /api/v1/payments/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let id: PaymentId = parse_id("payment id", &id)?;
    Ok(Json(state.payments.get_payment(id).await?.into()))
}

/// PUT /api/v1/payments/:id
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdatePaymentRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment_id: PaymentId = parse_id("payment id", &id)?;
    let payment = state
        .payments
        .update_payment(UpdatePayment {
            payment_id,
            amount: req.amount_cents.map(Money::from_cents),
            method_id: method_id(req.method_id.as_ref())?,
        })
        .await?;

    Ok(Json(payment.into()))
}

/// DELETE /api/v1/payments/:id
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: PaymentId = parse_id("payment id", &id)?;
    state.payments.delete_payment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/orders/:id/payments: total, paid, pending and the payments.
#[tracing::instrument(skip(state))]
pub async fn status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let order_id: OrderId = parse_id("order id", &id)?;
    Ok(Json(state.payments.status(order_id).await?.into()))
}

// -- Payment method handlers --

/// POST /api/v1/payment-methods
#[tracing::instrument(skip(state))]
pub async fn create_method<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<PaymentMethodRequest>,
) -> Result<(StatusCode, Json<PaymentMethodResponse>), ApiError> {
    let method = state.payments.create_method(&req.name).await?;
    Ok((StatusCode::CREATED, Json(method.into())))
}

/// GET /api/v1/payment-methods, alphabetically.
#[tracing::instrument(skip(state))]
pub async fn list_methods<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<PaymentMethodResponse>>, ApiError> {
    let methods = state.payments.list_methods().await?;
    Ok(Json(
        methods
            .into_iter()
            .map(PaymentMethodResponse::from)
            .collect(),
    ))
}

/// GET /api/v1/payment-methods/:id
#[tracing::instrument(skip(state))]
pub async fn get_method<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentMethodResponse>, ApiError> {
    let id: PaymentMethodId = parse_id("payment method id", &id)?;
    Ok(Json(state.payments.get_method(id).await?.into()))
}

/// PUT /api/v1/payment-methods/:id
#[tracing::instrument(skip(state))]
pub async fn rename_method<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<PaymentMethodRequest>,
) -> Result<Json<PaymentMethodResponse>, ApiError> {
    let id: PaymentMethodId = parse_id("payment method id", &id)?;
    Ok(Json(state.payments.rename_method(id, &req.name).await?.into()))
}

/// DELETE /api/v1/payment-methods/:id
#[tracing::instrument(skip(state))]
pub async fn delete_method<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: PaymentMethodId = parse_id("payment method id", &id)?;
    state.payments.delete_method(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
