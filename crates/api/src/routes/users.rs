//! User registry endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Page, UserId};
use domain::{RegisterUser, UpdateUser};
use serde::{Deserialize, Serialize};
use store::{Store, User};

use super::{AppState, PageQuery, parse_id};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id.to_string(),
            name: u.name,
            email: u.email,
            created_at: u.created_at,
        }
    }
}

/// POST /api/v1/users
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state
        .users
        .register(RegisterUser {
            name: req.name,
            email: req.email,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /api/v1/users
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<Page<UserResponse>>, ApiError> {
    let page = state.users.list(query.request()).await?;
    Ok(Json(page.map(UserResponse::from)))
}

/// GET /api/v1/users/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let id: UserId = parse_id("user id", &id)?;
    Ok(Json(state.users.get(id).await?.into()))
}

/// GET /api/v1/users/by-email/:email
#[tracing::instrument(skip(state))]
pub async fn by_email<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(email): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(state.users.get_by_email(&email).await?.into()))
}

/// PUT /api/v1/users/:id
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let id: UserId = parse_id("user id", &id)?;
    let user = state
        .users
        .update(
            id,
            UpdateUser {
                name: req.name,
                email: req.email,
            },
        )
        .await?;
    Ok(Json(user.into()))
}

/// DELETE /api/v1/users/:id
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: UserId = parse_id("user id", &id)?;
    state.users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
