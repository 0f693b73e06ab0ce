//! Rows as the services see them, plus the shapes used to create and change them.

use chrono::{DateTime, NaiveDate, Utc};
use common::{
    LineItemId, Money, OrderId, PaymentId, PaymentMethodId, ProductId, ReviewId, UserId,
};
use serde::{Deserialize, Serialize};

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub expires_on: NaiveDate,
    /// Units available. Only the unchecked `adjust_stock` path can drive it below zero.
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub expires_on: NaiveDate,
    pub stock: i64,
}

/// Partial product update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub expires_on: Option<NaiveDate>,
    pub stock: Option<i64>,
}

impl ProductChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.expires_on.is_none()
            && self.stock.is_none()
    }

    pub(crate) fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(expires_on) = self.expires_on {
            product.expires_on = expires_on;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
    }
}

/// One product-and-quantity entry within an order, priced at time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub created_at: DateTime<Utc>,
}

impl LineItem {
    /// quantity * unit_price
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLineItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl NewLineItem {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }
}

/// An order with its line items in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: UserId,
    pub seller_id: Option<UserId>,
    pub purchased_at: DateTime<Utc>,
    pub items: Vec<LineItem>,
}

impl Order {
    /// Sum of every line item's subtotal. Never stored.
    pub fn total(&self) -> Money {
        self.items.iter().map(LineItem::subtotal).sum()
    }

    pub fn item(&self, item_id: LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|item| item.id == item_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub client_id: UserId,
    pub seller_id: Option<UserId>,
    pub items: Vec<NewLineItem>,
}

/// Which orders a listing should include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderFilter {
    #[default]
    All,
    Client(UserId),
    Seller(UserId),
}

impl OrderFilter {
    pub(crate) fn matches(&self, order: &Order) -> bool {
        match self {
            OrderFilter::All => true,
            OrderFilter::Client(id) => order.client_id == *id,
            OrderFilter::Seller(id) => order.seller_id == Some(*id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub method_id: Option<PaymentMethodId>,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub method_id: Option<PaymentMethodId>,
    pub amount: Money,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentChanges {
    pub amount: Option<Money>,
    pub method_id: Option<PaymentMethodId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub client_id: UserId,
    /// 1 to 5 inclusive.
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub product_id: ProductId,
    pub client_id: UserId,
    pub rating: u8,
    pub comment: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewChanges {
    pub rating: Option<u8>,
    pub comment: Option<String>,
}

/// Average rating and number of reviews for one product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    /// 0.0 when the product has no reviews.
    pub average: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: u32, cents: i64) -> LineItem {
        LineItem {
            id: LineItemId::new(),
            order_id: OrderId::new(),
            product_id: ProductId::new(),
            quantity,
            unit_price: Money::from_cents(cents),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn order_total_sums_subtotals() {
        let order = Order {
            id: OrderId::new(),
            client_id: UserId::new(),
            seller_id: None,
            purchased_at: Utc::now(),
            items: vec![item(2, 1000), item(3, 250)],
        };

        assert_eq!(order.items[0].subtotal().cents(), 2000);
        assert_eq!(order.total().cents(), 2750);
    }

    #[test]
    fn empty_order_total_is_zero() {
        let order = Order {
            id: OrderId::new(),
            client_id: UserId::new(),
            seller_id: None,
            purchased_at: Utc::now(),
            items: vec![],
        };
        assert!(order.total().is_zero());
    }

    #[test]
    fn product_changes_apply_only_present_fields() {
        let now = Utc::now();
        let mut product = Product {
            id: ProductId::new(),
            name: "Milk".to_string(),
            description: "Whole milk".to_string(),
            price: Money::from_cents(250),
            expires_on: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            stock: 10,
            created_at: now,
            updated_at: now,
        };

        ProductChanges {
            description: Some(String::new()),
            stock: Some(0),
            ..Default::default()
        }
        .apply(&mut product);

        assert_eq!(product.name, "Milk");
        assert_eq!(product.description, "");
        assert_eq!(product.price.cents(), 250);
        assert_eq!(product.stock, 0);
    }

    #[test]
    fn order_filter_matches() {
        let client = UserId::new();
        let seller = UserId::new();
        let order = Order {
            id: OrderId::new(),
            client_id: client,
            seller_id: Some(seller),
            purchased_at: Utc::now(),
            items: vec![],
        };

        assert!(OrderFilter::All.matches(&order));
        assert!(OrderFilter::Client(client).matches(&order));
        assert!(OrderFilter::Seller(seller).matches(&order));
        assert!(!OrderFilter::Client(seller).matches(&order));
    }
}
