//! Product catalog and stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use common::{Money, Page, ProductId};
use domain::{CreateProduct, UpdateProduct};
use serde::{Deserialize, Serialize};
use store::{Product, Store};

use super::{AppState, PageQuery, parse_id};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub expires_on: NaiveDate,
    pub stock: i64,
}

/// Absent fields are left unchanged; zero and empty values are applied.
#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub expires_on: Option<NaiveDate>,
    pub stock: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub expires_on: NaiveDate,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name,
            description: p.description,
            price_cents: p.price.cents(),
            expires_on: p.expires_on,
            stock: p.stock,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct StockResponse {
    pub product_id: String,
    pub stock: i64,
}

fn products(list: Vec<Product>) -> Json<Vec<ProductResponse>> {
    Json(list.into_iter().map(ProductResponse::from).collect())
}

// -- Handlers --

/// POST /api/v1/products
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product = state
        .products
        .create(CreateProduct {
            name: req.name,
            description: req.description,
            price: Money::from_cents(req.price_cents),
            expires_on: req.expires_on,
            stock: req.stock,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(product.into())))
}

/// GET /api/v1/products
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<Page<ProductResponse>>, ApiError> {
    let page = state.products.list(query.request()).await?;
    Ok(Json(page.map(ProductResponse::from)))
}

/// GET /api/v1/products/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id("product id", &id)?;
    Ok(Json(state.products.get(id).await?.into()))
}

/// GET /api/v1/products/by-name/:name
#[tracing::instrument(skip(state))]
pub async fn by_name<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(name): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    Ok(Json(state.products.get_by_name(&name).await?.into()))
}

/// GET /api/v1/products/expiring?days=N
#[tracing::instrument(skip(state))]
pub async fn expiring_within<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(query): ApiQuery<ExpiringQuery>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let days = query.days.unwrap_or(domain::DEFAULT_EXPIRY_WINDOW_DAYS);
    Ok(products(state.products.expiring_within(days).await?))
}

/// GET /api/v1/products/expiring-on/:date
#[tracing::instrument(skip(state))]
pub async fn expiring_on<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(date): Path<String>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| ApiError::BadRequest(format!("Invalid date '{date}': {e}")))?;
    Ok(products(state.products.expiring_on(date).await?))
}

/// PUT /api/v1/products/:id
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id("product id", &id)?;
    let product = state
        .products
        .update(
            id,
            UpdateProduct {
                name: req.name,
                description: req.description,
                price: req.price_cents.map(Money::from_cents),
                expires_on: req.expires_on,
                stock: req.stock,
            },
        )
        .await?;

    Ok(Json(product.into()))
}

/// DELETE /api/v1/products/:id
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: ProductId = parse_id("product id", &id)?;
    state.products.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/products/:id/stock
#[tracing::instrument(skip(state))]
pub async fn adjust_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AdjustStockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    let id: ProductId = parse_id("product id", &id)?;
    let stock = state.products.adjust_stock(id, req.delta).await?;

    Ok(Json(StockResponse {
        product_id: id.to_string(),
        stock,
    }))
}
