//! HTTP API server with observability for the commerce backend.
//!
//! Provides REST endpoints for products, orders, payments, reviews and
//! users, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health::<S>))
        .nest("/api/v1", api_routes::<S>())
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

fn api_routes<S: Store>() -> Router<Arc<AppState<S>>> {
    use routes::{orders, payments, products, reviews, users};

    Router::new()
        // Products
        .route("/products", post(products::create::<S>).get(products::list::<S>))
        .route("/products/expiring", get(products::expiring_within::<S>))
        .route("/products/expiring-on/{date}", get(products::expiring_on::<S>))
        .route("/products/by-name/{name}", get(products::by_name::<S>))
        .route(
            "/products/{id}",
            get(products::get::<S>)
                .put(products::update::<S>)
                .delete(products::delete::<S>),
        )
        .route("/products/{id}/stock", put(products::adjust_stock::<S>))
        .route("/products/{id}/rating", get(reviews::rating_summary::<S>))
        // Orders and line items
        .route("/orders", post(orders::create::<S>).get(orders::list::<S>))
        .route(
            "/orders/{id}",
            get(orders::get::<S>).delete(orders::delete::<S>),
        )
        .route("/orders/{id}/seller", put(orders::assign_seller::<S>))
        .route("/orders/{id}/items", post(orders::add_item::<S>))
        .route(
            "/orders/{id}/items/{item_id}",
            put(orders::update_item::<S>).delete(orders::remove_item::<S>),
        )
        .route("/orders/{id}/payments", get(payments::status::<S>))
        // Payments
        .route("/payments", post(payments::create::<S>).get(payments::list::<S>))
        .route(
            "/payments/{id}",
            get(payments::get::<S>)
                .put(payments::update::<S>)
                .delete(payments::delete::<S>),
        )
        .route(
            "/payment-methods",
            post(payments::create_method::<S>).get(payments::list_methods::<S>),
        )
        .route(
            "/payment-methods/{id}",
            get(payments::get_method::<S>)
                .put(payments::rename_method::<S>)
                .delete(payments::delete_method::<S>),
        )
        // Reviews
        .route("/reviews", post(reviews::create::<S>).get(reviews::list::<S>))
        .route(
            "/reviews/{id}",
            get(reviews::get::<S>)
                .put(reviews::update::<S>)
                .delete(reviews::delete::<S>),
        )
        // Users
        .route("/users", post(users::create::<S>).get(users::list::<S>))
        .route("/users/by-email/{email}", get(users::by_email::<S>))
        .route(
            "/users/{id}",
            get(users::get::<S>)
                .put(users::update::<S>)
                .delete(users::delete::<S>),
        )
}
