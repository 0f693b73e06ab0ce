//! Persistence for the commerce backend.
//!
//! Repository traits describe what the services need from storage; two
//! implementations are provided:
//! - [`InMemoryStore`] keeps every table behind one lock (tests, local runs)
//! - [`PostgresStore`] issues sqlx queries against the schema in `migrations/`

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod repository;

pub use common::{
    LineItemId, Money, OrderId, Page, PageRequest, PaymentId, PaymentMethodId, ProductId, ReviewId,
    UserId,
};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    LineItem, NewLineItem, NewOrder, NewPayment, NewProduct, NewReview, NewUser, Order,
    OrderFilter, Payment, PaymentChanges, PaymentMethod, Product, ProductChanges, RatingSummary,
    Review, ReviewChanges, User, UserChanges,
};
pub use repository::{
    OrderRepository, PaymentRepository, ProductRepository, ReviewRepository, Store,
    UserRepository,
};
