//! Order commands.

use common::{LineItemId, Money, OrderId, ProductId, UserId};

/// One requested line: a product, how many units, and the agreed unit price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }
}

/// Command to place a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The client placing the order.
    pub client_id: UserId,

    /// The seller handling it, if already known.
    pub seller_id: Option<UserId>,

    /// At least one line.
    pub items: Vec<OrderLine>,
}

impl CreateOrder {
    /// Creates a new CreateOrder command without a seller.
    pub fn new(client_id: UserId, items: Vec<OrderLine>) -> Self {
        Self {
            client_id,
            seller_id: None,
            items,
        }
    }

    pub fn with_seller(mut self, seller_id: UserId) -> Self {
        self.seller_id = Some(seller_id);
        self
    }
}

/// Command to append a line item to an existing order.
#[derive(Debug, Clone)]
pub struct AddLineItem {
    pub order_id: OrderId,
    pub line: OrderLine,
}

impl AddLineItem {
    pub fn new(order_id: OrderId, line: OrderLine) -> Self {
        Self { order_id, line }
    }
}

/// Command to change a line item's quantity and/or unit price.
#[derive(Debug, Clone)]
pub struct UpdateLineItem {
    pub order_id: OrderId,
    pub item_id: LineItemId,
    pub quantity: Option<u32>,
    pub unit_price: Option<Money>,
}

impl UpdateLineItem {
    pub fn quantity(order_id: OrderId, item_id: LineItemId, quantity: u32) -> Self {
        Self {
            order_id,
            item_id,
            quantity: Some(quantity),
            unit_price: None,
        }
    }

    pub fn unit_price(order_id: OrderId, item_id: LineItemId, unit_price: Money) -> Self {
        Self {
            order_id,
            item_id,
            quantity: None,
            unit_price: Some(unit_price),
        }
    }
}

/// Command to remove a line item, returning its units to stock.
#[derive(Debug, Clone, Copy)]
pub struct RemoveLineItem {
    pub order_id: OrderId,
    pub item_id: LineItemId,
}

impl RemoveLineItem {
    pub fn new(order_id: OrderId, item_id: LineItemId) -> Self {
        Self { order_id, item_id }
    }
}

/// Command to set the seller responsible for an order.
#[derive(Debug, Clone, Copy)]
pub struct AssignSeller {
    pub order_id: OrderId,
    pub seller_id: UserId,
}

impl AssignSeller {
    pub fn new(order_id: OrderId, seller_id: UserId) -> Self {
        Self {
            order_id,
            seller_id,
        }
    }
}
