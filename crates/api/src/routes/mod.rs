//! HTTP handlers, grouped by resource.

pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod system;
pub mod users;

use std::str::FromStr;

use common::PageRequest;
use domain::{OrderService, PaymentService, ProductService, ReviewService, UserService};
use serde::Deserialize;
use store::Store;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub products: ProductService<S>,
    pub orders: OrderService<S>,
    pub payments: PaymentService<S>,
    pub reviews: ReviewService<S>,
    pub users: UserService<S>,
}

impl<S: Store> AppState<S> {
    /// Builds every service over clones of the same store.
    pub fn new(store: S) -> Self {
        Self {
            products: ProductService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            payments: PaymentService::new(store.clone()),
            reviews: ReviewService::new(store.clone()),
            users: UserService::new(store),
        }
    }
}

/// `?page=&limit=` query parameters. Out-of-range values are normalized.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(1), self.limit.unwrap_or(0))
    }
}

/// Parses an identifier from a path segment or request body.
pub(crate) fn parse_id<T>(field: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
