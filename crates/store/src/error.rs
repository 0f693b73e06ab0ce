use common::{Money, OrderId, ProductId};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live row matches the identifier.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A guarded stock consumption found fewer units than requested.
    /// Nothing was written.
    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// A guarded payment write would push the amount paid past the order total.
    /// Nothing was written.
    #[error("Payment of {requested} exceeds order {order_id} total {total} (already paid {paid})")]
    OverPayment {
        order_id: OrderId,
        total: Money,
        paid: Money,
        requested: Money,
    },

    /// The adjustment would take stock past the range of a stock level.
    /// Nothing was written.
    #[error("Stock adjustment of {delta} overflows the stock of product {product_id}")]
    StockOverflow { product_id: ProductId, delta: i64 },

    /// A unique constraint rejected the write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The backend refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true when the error only says the row does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
