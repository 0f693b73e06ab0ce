//! Review endpoints and per-product rating summaries.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Page, PageRequest, ProductId, ReviewId, UserId};
use domain::{CreateReview, UpdateReview};
use serde::{Deserialize, Serialize};
use store::{Review, Store};

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub product_id: String,
    pub client_id: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<u8>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListReviewsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub product_id: Option<String>,
}

#[derive(Serialize)]
pub struct ReviewResponse {
    pub id: String,
    pub product_id: String,
    pub client_id: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Review> for ReviewResponse {
    fn from(r: Review) -> Self {
        Self {
            id: r.id.to_string(),
            product_id: r.product_id.to_string(),
            client_id: r.client_id.to_string(),
            rating: r.rating,
            comment: r.comment,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct RatingSummaryResponse {
    pub product_id: String,
    pub average: f64,
    pub count: u64,
}

/// POST /api/v1/reviews
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), ApiError> {
    let product_id: ProductId = parse_id("product_id", &req.product_id)?;
    let client_id: UserId = parse_id("client_id", &req.client_id)?;

    let review = state
        .reviews
        .create(CreateReview {
            product_id,
            client_id,
            rating: req.rating,
            comment: req.comment,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(review.into())))
}

/// GET /api/v1/reviews, newest first, optionally for one product.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(query): ApiQuery<ListReviewsQuery>,
) -> Result<Json<Page<ReviewResponse>>, ApiError> {
    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(0));
    let reviews = match &query.product_id {
        Some(product_id) => {
            let product_id: ProductId = parse_id("product_id", product_id)?;
            state.reviews.list_for_product(product_id, page).await?
        }
        None => state.reviews.list(page).await?,
    };

    Ok(Json(reviews.map(ReviewResponse::from)))
}

/// GET /api/v1/reviews/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let id: ReviewId = parse_id("review id", &id)?;
    Ok(Json(state.reviews.get(id).await?.into()))
}

/// PUT /api/v1/reviews/:id
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateReviewRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let id: ReviewId = parse_id("review id", &id)?;
    let review = state
        .reviews
        .update(
            id,
            UpdateReview {
                rating: req.rating,
                comment: req.comment,
            },
        )
        .await?;
    Ok(Json(review.into()))
}

/// DELETE /api/v1/reviews/:id
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: ReviewId = parse_id("review id", &id)?;
    state.reviews.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/products/:id/rating
#[tracing::instrument(skip(state))]
pub async fn rating_summary<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<RatingSummaryResponse>, ApiError> {
    let product_id: ProductId = parse_id("product id", &id)?;
    let summary = state.reviews.rating_summary(product_id).await?;

    Ok(Json(RatingSummaryResponse {
        product_id: product_id.to_string(),
        average: summary.average,
        count: summary.count,
    }))
}
