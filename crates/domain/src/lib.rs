//! Domain layer for the commerce backend.
//!
//! Each service owns one area of the business rules and talks to storage
//! through the repository traits of the `store` crate:
//! - [`ProductService`] for the catalog and operator stock adjustments
//! - [`OrderService`] for orders, line items and the stock they consume
//! - [`PaymentService`] for payments, payment status and payment methods
//! - [`ReviewService`] for product reviews and rating summaries
//! - [`UserService`] for the clients and sellers

pub mod error;
pub mod order;
pub mod payment;
pub mod product;
pub mod review;
pub mod user;
mod validate;

pub use error::DomainError;
pub use order::{
    AddLineItem, AssignSeller, CreateOrder, OrderLine, OrderService, RemoveLineItem,
    UpdateLineItem,
};
pub use payment::{PaymentService, PaymentStatus, RecordPayment, UpdatePayment};
pub use product::{CreateProduct, DEFAULT_EXPIRY_WINDOW_DAYS, ProductService, UpdateProduct};
pub use review::{CreateReview, ReviewService, UpdateReview};
pub use user::{RegisterUser, UpdateUser, UserService};
