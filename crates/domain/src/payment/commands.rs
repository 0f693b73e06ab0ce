//! Payment commands.

use common::{Money, OrderId, PaymentId, PaymentMethodId};

/// Command to record a payment against an order.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub order_id: OrderId,
    pub method_id: Option<PaymentMethodId>,
    pub amount: Money,
}

impl RecordPayment {
    pub fn new(order_id: OrderId, amount: Money) -> Self {
        Self {
            order_id,
            method_id: None,
            amount,
        }
    }

    pub fn with_method(mut self, method_id: PaymentMethodId) -> Self {
        self.method_id = Some(method_id);
        self
    }
}

/// Command to change a recorded payment. `None` leaves a field as is.
#[derive(Debug, Clone)]
pub struct UpdatePayment {
    pub payment_id: PaymentId,
    pub amount: Option<Money>,
    pub method_id: Option<PaymentMethodId>,
}
