//! Payment service.

use common::{Money, OrderId, Page, PageRequest, PaymentId, PaymentMethodId};
use serde::Serialize;
use store::{
    NewPayment, OrderRepository, Payment, PaymentChanges, PaymentMethod, PaymentRepository,
    StoreError,
};

use crate::DomainError;
use crate::validate;

use super::{RecordPayment, UpdatePayment};

/// How much of an order has been paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentStatus {
    pub order_id: OrderId,
    pub total: Money,
    pub paid: Money,
    /// `total - paid`, never below zero.
    pub pending: Money,
    /// Newest first.
    pub payments: Vec<Payment>,
}

fn method_name_taken(name: &str) -> DomainError {
    DomainError::AlreadyExists(format!("a payment method named '{name}' already exists"))
}

/// Service for payments against orders and for payment methods.
pub struct PaymentService<S> {
    store: S,
}

impl<S: OrderRepository + PaymentRepository> PaymentService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn order_total(&self, order_id: OrderId) -> Result<Money, DomainError> {
        self.store
            .find_order(order_id)
            .await?
            .map(|order| order.total())
            .ok_or_else(|| DomainError::not_found("Order", order_id))
    }

    async fn ensure_method(&self, method_id: PaymentMethodId) -> Result<(), DomainError> {
        self.store
            .find_payment_method(method_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("PaymentMethod", method_id))
    }

    /// Records a payment if it fits within what is still pending on the order.
    #[tracing::instrument(skip(self))]
    pub async fn record_payment(&self, cmd: RecordPayment) -> Result<Payment, DomainError> {
        validate::positive("amount", cmd.amount)?;

        let total = self.order_total(cmd.order_id).await?;
        let paid = self.store.total_paid(cmd.order_id).await?;
        let pending = total - paid;
        if cmd.amount > pending {
            return Err(DomainError::OverPayment {
                requested: cmd.amount,
                pending: pending.floor_zero(),
            });
        }
        if let Some(method_id) = cmd.method_id {
            self.ensure_method(method_id).await?;
        }

        let payment = self
            .store
            .insert_payment(NewPayment {
                order_id: cmd.order_id,
                method_id: cmd.method_id,
                amount: cmd.amount,
            })
            .await?;

        metrics::counter!("payments_recorded_total").increment(1);
        tracing::info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            amount = %payment.amount,
            "payment recorded"
        );
        Ok(payment)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment, DomainError> {
        self.store
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Payment", payment_id))
    }

    /// Changes a payment's amount and/or method. A new amount must keep the
    /// order's payments within its total, this payment's old amount excluded.
    #[tracing::instrument(skip(self))]
    pub async fn update_payment(&self, cmd: UpdatePayment) -> Result<Payment, DomainError> {
        let payment = self.get_payment(cmd.payment_id).await?;

        if let Some(amount) = cmd.amount {
            validate::positive("amount", amount)?;

            let total = self.order_total(payment.order_id).await?;
            let paid_by_others = self.store.total_paid(payment.order_id).await? - payment.amount;
            if paid_by_others + amount > total {
                return Err(DomainError::OverPayment {
                    requested: amount,
                    pending: (total - paid_by_others).floor_zero(),
                });
            }
        }
        if let Some(method_id) = cmd.method_id {
            self.ensure_method(method_id).await?;
        }

        Ok(self
            .store
            .update_payment(
                cmd.payment_id,
                PaymentChanges {
                    amount: cmd.amount,
                    method_id: cmd.method_id,
                },
            )
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_payment(&self, payment_id: PaymentId) -> Result<(), DomainError> {
        self.store.delete_payment(payment_id).await?;
        tracing::info!(%payment_id, "payment deleted");
        Ok(())
    }

    /// Payments newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_payments(&self, page: PageRequest) -> Result<Page<Payment>, DomainError> {
        Ok(self.store.list_payments(page).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn payments_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Payment>, DomainError> {
        Ok(self.store.payments_for_order(order_id).await?)
    }

    /// Total, amount paid, amount pending and the payments of one order.
    #[tracing::instrument(skip(self))]
    pub async fn status(&self, order_id: OrderId) -> Result<PaymentStatus, DomainError> {
        let total = self.order_total(order_id).await?;
        let payments = self.store.payments_for_order(order_id).await?;
        let paid = self.store.total_paid(order_id).await?;

        Ok(PaymentStatus {
            order_id,
            total,
            paid,
            pending: (total - paid).floor_zero(),
            payments,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_method(&self, name: &str) -> Result<PaymentMethod, DomainError> {
        validate::length("name", name, 1, 50)?;

        if self.store.find_payment_method_by_name(name).await?.is_some() {
            return Err(method_name_taken(name));
        }

        self.store
            .insert_payment_method(name)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => method_name_taken(name),
                other => other.into(),
            })
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_method(&self, id: PaymentMethodId) -> Result<PaymentMethod, DomainError> {
        self.store
            .find_payment_method(id)
            .await?
            .ok_or_else(|| DomainError::not_found("PaymentMethod", id))
    }

    /// Methods in alphabetical order.
    #[tracing::instrument(skip(self))]
    pub async fn list_methods(&self) -> Result<Vec<PaymentMethod>, DomainError> {
        Ok(self.store.list_payment_methods().await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn rename_method(
        &self,
        id: PaymentMethodId,
        name: &str,
    ) -> Result<PaymentMethod, DomainError> {
        validate::length("name", name, 1, 50)?;

        self.get_method(id).await?;
        if let Some(existing) = self.store.find_payment_method_by_name(name).await?
            && existing.id != id
        {
            return Err(method_name_taken(name));
        }

        self.store
            .rename_payment_method(id, name)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => method_name_taken(name),
                other => other.into(),
            })
    }

    /// Deletes a method. Payments made with it keep no method.
    #[tracing::instrument(skip(self))]
    pub async fn delete_method(&self, id: PaymentMethodId) -> Result<(), DomainError> {
        Ok(self.store.delete_payment_method(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use common::UserId;
    use store::{InMemoryStore, NewLineItem, NewOrder, NewProduct, ProductRepository};

    use super::*;

    async fn order_worth(store: &InMemoryStore, cents: i64) -> OrderId {
        let product = store
            .insert_product(NewProduct {
                name: "Lamp".to_string(),
                description: String::new(),
                price: Money::from_cents(cents),
                expires_on: chrono::NaiveDate::from_ymd_opt(2031, 1, 1).unwrap(),
                stock: 10,
            })
            .await
            .unwrap();
        store
            .insert_order(NewOrder {
                client_id: UserId::new(),
                seller_id: None,
                items: vec![NewLineItem::new(product.id, 1, Money::from_cents(cents))],
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn update_excludes_the_payment_being_changed() {
        let store = InMemoryStore::new();
        let order_id = order_worth(&store, 1000).await;
        let service = PaymentService::new(store);

        let first = service
            .record_payment(RecordPayment::new(order_id, Money::from_cents(400)))
            .await
            .unwrap();
        service
            .record_payment(RecordPayment::new(order_id, Money::from_cents(500)))
            .await
            .unwrap();

        let err = service
            .update_payment(UpdatePayment {
                payment_id: first.id,
                amount: Some(Money::from_cents(600)),
                method_id: None,
            })
            .await
            .unwrap_err();
        match err {
            DomainError::OverPayment { requested, pending } => {
                assert_eq!(requested.cents(), 600);
                assert_eq!(pending.cents(), 500);
            }
            other => panic!("unexpected error: {other}"),
        }

        let updated = service
            .update_payment(UpdatePayment {
                payment_id: first.id,
                amount: Some(Money::from_cents(500)),
                method_id: None,
            })
            .await
            .unwrap();
        assert_eq!(updated.amount.cents(), 500);
        assert!(service.status(order_id).await.unwrap().pending.is_zero());
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let store = InMemoryStore::new();
        let order_id = order_worth(&store, 1000).await;
        let service = PaymentService::new(store);

        let err = service
            .record_payment(
                RecordPayment::new(order_id, Money::from_cents(100))
                    .with_method(PaymentMethodId::new()),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let store = InMemoryStore::new();
        let order_id = order_worth(&store, 1000).await;
        let service = PaymentService::new(store);

        assert!(matches!(
            service
                .record_payment(RecordPayment::new(order_id, Money::zero()))
                .await,
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn method_names_are_unique() {
        let service = PaymentService::new(InMemoryStore::new());
        let cash = service.create_method("cash").await.unwrap();
        let card = service.create_method("card").await.unwrap();

        assert!(matches!(
            service.create_method("cash").await,
            Err(DomainError::AlreadyExists(_))
        ));
        assert!(matches!(
            service.rename_method(card.id, "cash").await,
            Err(DomainError::AlreadyExists(_))
        ));
        assert_eq!(
            service.rename_method(cash.id, "cash").await.unwrap().name,
            "cash"
        );
        assert!(matches!(
            service.create_method("").await,
            Err(DomainError::Validation(_))
        ));
    }
}
