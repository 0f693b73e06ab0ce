//! Order and line-item endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{LineItemId, Money, OrderId, Page, UserId};
use domain::{AddLineItem, AssignSeller, CreateOrder, OrderLine, RemoveLineItem, UpdateLineItem};
use serde::{Deserialize, Serialize};
use store::{LineItem, Order, Store};

use super::{AppState, PageQuery, parse_id};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub client_id: String,
    pub seller_id: Option<String>,
    pub items: Vec<LineItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct LineItemRequest {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLineItemRequest {
    pub quantity: Option<u32>,
    pub unit_price_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AssignSellerRequest {
    pub seller_id: String,
}

/// Paging plus an optional client or seller filter.
#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub client_id: Option<String>,
    pub seller_id: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub client_id: String,
    pub seller_id: Option<String>,
    pub purchased_at: DateTime<Utc>,
    pub items: Vec<LineItemResponse>,
    pub total_cents: i64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let total_cents = order.total().cents();
        Self {
            id: order.id.to_string(),
            client_id: order.client_id.to_string(),
            seller_id: order.seller_id.map(|id| id.to_string()),
            purchased_at: order.purchased_at,
            items: order.items.into_iter().map(LineItemResponse::from).collect(),
            total_cents,
        }
    }
}

#[derive(Serialize)]
pub struct LineItemResponse {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

impl From<LineItem> for LineItemResponse {
    fn from(item: LineItem) -> Self {
        Self {
            id: item.id.to_string(),
            order_id: item.order_id.to_string(),
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            subtotal_cents: item.subtotal().cents(),
        }
    }
}

impl LineItemRequest {
    fn to_line(&self) -> Result<OrderLine, ApiError> {
        Ok(OrderLine::new(
            parse_id("product_id", &self.product_id)?,
            self.quantity,
            Money::from_cents(self.unit_price_cents),
        ))
    }
}

// -- Handlers --

/// POST /api/v1/orders
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let client_id: UserId = parse_id("client_id", &req.client_id)?;
    let items = req
        .items
        .iter()
        .map(LineItemRequest::to_line)
        .collect::<Result<Vec<_>, _>>()?;

    let mut cmd = CreateOrder::new(client_id, items);
    if let Some(seller_id) = &req.seller_id {
        cmd = cmd.with_seller(parse_id("seller_id", seller_id)?);
    }

    let order = state.orders.create_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /api/v1/orders, newest first, optionally by client or seller.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(query): ApiQuery<ListOrdersQuery>,
) -> Result<Json<Page<OrderResponse>>, ApiError> {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .request();

    let orders = match (&query.client_id, &query.seller_id) {
        (Some(_), Some(_)) => {
            return Err(ApiError::BadRequest(
                "filter by client_id or seller_id, not both".to_string(),
            ));
        }
        (Some(client_id), None) => {
            let client_id: UserId = parse_id("client_id", client_id)?;
            state.orders.list_by_client(client_id, page).await?
        }
        (None, Some(seller_id)) => {
            let seller_id: UserId = parse_id("seller_id", seller_id)?;
            state.orders.list_by_seller(seller_id, page).await?
        }
        (None, None) => state.orders.list_orders(page).await?,
    };

    Ok(Json(orders.map(OrderResponse::from)))
}

/// GET /api/v1/orders/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id("order id", &id)?;
    Ok(Json(state.orders.get_order(id).await?.into()))
}

/// DELETE /api/v1/orders/:id, returning every item's units to stock.
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: OrderId = parse_id("order id", &id)?;
    state.orders.delete_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/orders/:id/seller
#[tracing::instrument(skip(state))]
pub async fn assign_seller<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AssignSellerRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order id", &id)?;
    let seller_id: UserId = parse_id("seller_id", &req.seller_id)?;

    let order = state
        .orders
        .assign_seller(AssignSeller::new(order_id, seller_id))
        .await?;
    Ok(Json(order.into()))
}

/// POST /api/v1/orders/:id/items
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<LineItemRequest>,
) -> Result<(StatusCode, Json<LineItemResponse>), ApiError> {
    let order_id: OrderId = parse_id("order id", &id)?;
    let item = state
        .orders
        .add_item(AddLineItem::new(order_id, req.to_line()?))
        .await?;

    Ok((StatusCode::CREATED, Json(item.into())))
}

/// PUT /api/v1/orders/:id/items/:item_id
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item_id)): Path<(String, String)>,
    ApiJson(req): ApiJson<UpdateLineItemRequest>,
) -> Result<Json<LineItemResponse>, ApiError> {
    let order_id: OrderId = parse_id("order id", &id)?;
    let item_id: LineItemId = parse_id("item id", &item_id)?;

    let item = state
        .orders
        .update_item(UpdateLineItem {
            order_id,
            item_id,
            quantity: req.quantity,
            unit_price: req.unit_price_cents.map(Money::from_cents),
        })
        .await?;
    Ok(Json(item.into()))
}

/// DELETE /api/v1/orders/:id/items/:item_id
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let order_id: OrderId = parse_id("order id", &id)?;
    let item_id: LineItemId = parse_id("item id", &item_id)?;

    state
        .orders
        .remove_item(RemoveLineItem::new(order_id, item_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
