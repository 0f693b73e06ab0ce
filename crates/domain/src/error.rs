//! Domain error types.

use common::{LineItemId, Money, OrderId, ProductId, UserId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The identifier does not resolve to a live entity.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Malformed or out-of-range input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The requested consumption exceeds available stock.
    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// The payment would push the amount paid past the order total.
    #[error("Payment of {requested} exceeds pending amount {pending}")]
    OverPayment { requested: Money, pending: Money },

    /// The client already reviewed the product.
    #[error("Client {client_id} already reviewed product {product_id}")]
    DuplicateReview {
        client_id: UserId,
        product_id: ProductId,
    },

    /// A line item was addressed under an order it does not belong to.
    #[error("Line item {item_id} does not belong to order {order_id}")]
    OwnershipMismatch {
        item_id: LineItemId,
        order_id: OrderId,
    },

    /// A uniquely named entity already exists.
    #[error("{0}")]
    AlreadyExists(String),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound { .. })
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => DomainError::NotFound { entity, id },
            StoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => DomainError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            StoreError::OverPayment {
                total,
                paid,
                requested,
                ..
            } => DomainError::OverPayment {
                requested,
                pending: (total - paid).floor_zero(),
            },
            StoreError::StockOverflow { product_id, delta } => DomainError::Validation(format!(
                "stock adjustment of {delta} is out of range for product {product_id}"
            )),
            StoreError::UniqueViolation(constraint) => {
                DomainError::AlreadyExists(format!("Unique constraint violated: {constraint}"))
            }
            other => DomainError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_with_business_meaning_are_translated() {
        let product_id = ProductId::new();
        let err: DomainError = StoreError::InsufficientStock {
            product_id,
            available: 1,
            requested: 4,
        }
        .into();
        assert!(matches!(
            err,
            DomainError::InsufficientStock {
                available: 1,
                requested: 4,
                ..
            }
        ));

        let err: DomainError = StoreError::OverPayment {
            order_id: OrderId::new(),
            total: Money::from_cents(1000),
            paid: Money::from_cents(700),
            requested: Money::from_cents(500),
        }
        .into();
        match err {
            DomainError::OverPayment { requested, pending } => {
                assert_eq!(requested.cents(), 500);
                assert_eq!(pending.cents(), 300);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err: DomainError = StoreError::NotFound {
            entity: "Order",
            id: "42".to_string(),
        }
        .into();
        assert!(err.is_not_found());
    }

    #[test]
    fn other_store_errors_stay_internal() {
        let err: DomainError = StoreError::Unavailable("disk full".to_string()).into();
        assert!(matches!(err, DomainError::Store(_)));
    }
}
