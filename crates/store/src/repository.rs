use async_trait::async_trait;
use chrono::NaiveDate;
use common::{
    LineItemId, Money, OrderId, Page, PageRequest, PaymentId, PaymentMethodId, ProductId,
    ReviewId, UserId,
};

use crate::Result;
use crate::records::{
    LineItem, NewLineItem, NewOrder, NewPayment, NewProduct, NewReview, NewUser, Order,
    OrderFilter, Payment, PaymentChanges, PaymentMethod, Product, ProductChanges, RatingSummary,
    Review, ReviewChanges, User, UserChanges,
};

/// Storage for catalog products.
///
/// Lookups return `None` for missing or soft-deleted rows; writes against
/// such rows fail with `StoreError::NotFound`.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn insert_product(&self, product: NewProduct) -> Result<Product>;

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn find_product_by_name(&self, name: &str) -> Result<Option<Product>>;

    /// Live products expiring exactly on `date`.
    async fn products_expiring_on(&self, date: NaiveDate) -> Result<Vec<Product>>;

    /// Live products expiring between `from` and `to`, both inclusive,
    /// soonest first.
    async fn products_expiring_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Product>>;

    async fn update_product(&self, id: ProductId, changes: ProductChanges) -> Result<Product>;

    /// Soft-deletes the product.
    async fn delete_product(&self, id: ProductId) -> Result<()>;

    async fn list_products(&self, page: PageRequest) -> Result<Page<Product>>;

    /// Applies `stock = stock + delta` in one atomic step and returns the new stock.
    ///
    /// The delta is not checked: a negative delta larger than the stock
    /// leaves the product with negative stock.
    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<i64>;

    /// Removes `quantity` units only if that many are available, returning
    /// the new stock. Fails with `StoreError::InsufficientStock` otherwise.
    async fn consume_stock(&self, id: ProductId, quantity: i64) -> Result<i64>;
}

/// Storage for orders and their line items.
///
/// Every method that moves stock does so in the same transaction as the
/// line-item write it belongs to.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists the order and its items and consumes their stock, all or nothing.
    async fn insert_order(&self, order: NewOrder) -> Result<Order>;

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Orders newest first.
    async fn list_orders(&self, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>>;

    async fn set_order_seller(&self, id: OrderId, seller_id: UserId) -> Result<Order>;

    /// Soft-deletes the order and removes its line items. Stock is not touched.
    async fn delete_order(&self, id: OrderId) -> Result<()>;

    async fn find_line_item(&self, id: LineItemId) -> Result<Option<LineItem>>;

    /// Appends an item to a live order and consumes its stock.
    async fn insert_line_item(&self, order_id: OrderId, item: NewLineItem) -> Result<LineItem>;

    /// Sets the item's quantity and price. The quantity difference against the
    /// stored row is consumed from (growth) or restored to (shrink) the product.
    async fn update_line_item(
        &self,
        id: LineItemId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<LineItem>;

    /// Deletes the item and restores its full quantity to the product.
    async fn delete_line_item(&self, id: LineItemId) -> Result<()>;
}

/// Storage for payments and payment methods.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Records a payment, failing with `StoreError::OverPayment` when the
    /// order's payments would exceed its total.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment>;

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>>;

    /// Same overpayment guard as `insert_payment`.
    async fn update_payment(&self, id: PaymentId, changes: PaymentChanges) -> Result<Payment>;

    async fn delete_payment(&self, id: PaymentId) -> Result<()>;

    /// Payments newest first.
    async fn list_payments(&self, page: PageRequest) -> Result<Page<Payment>>;

    /// Payments of one order, newest first.
    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>>;

    async fn total_paid(&self, order_id: OrderId) -> Result<Money>;

    async fn insert_payment_method(&self, name: &str) -> Result<PaymentMethod>;

    async fn find_payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>>;

    async fn find_payment_method_by_name(&self, name: &str) -> Result<Option<PaymentMethod>>;

    /// Methods in alphabetical order.
    async fn list_payment_methods(&self) -> Result<Vec<PaymentMethod>>;

    async fn rename_payment_method(&self, id: PaymentMethodId, name: &str)
    -> Result<PaymentMethod>;

    /// Deletes the method; payments that used it keep no method.
    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<()>;
}

/// Storage for product reviews.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Fails with `StoreError::UniqueViolation` when the client already
    /// reviewed the product.
    async fn insert_review(&self, review: NewReview) -> Result<Review>;

    async fn find_review(&self, id: ReviewId) -> Result<Option<Review>>;

    async fn review_exists(&self, client_id: UserId, product_id: ProductId) -> Result<bool>;

    async fn update_review(&self, id: ReviewId, changes: ReviewChanges) -> Result<Review>;

    async fn delete_review(&self, id: ReviewId) -> Result<()>;

    /// Reviews newest first, optionally restricted to one product.
    async fn list_reviews(
        &self,
        product_id: Option<ProductId>,
        page: PageRequest,
    ) -> Result<Page<Review>>;

    async fn rating_summary(&self, product_id: ProductId) -> Result<RatingSummary>;
}

/// Storage for users. Emails are unique among live users.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn update_user(&self, id: UserId, changes: UserChanges) -> Result<User>;

    /// Soft-deletes the user.
    async fn delete_user(&self, id: UserId) -> Result<()>;

    async fn list_users(&self, page: PageRequest) -> Result<Page<User>>;
}

/// Every repository at once, as the application wires it.
pub trait Store:
    ProductRepository
    + OrderRepository
    + PaymentRepository
    + ReviewRepository
    + UserRepository
    + Clone
    + 'static
{
}

impl<T> Store for T where
    T: ProductRepository
        + OrderRepository
        + PaymentRepository
        + ReviewRepository
        + UserRepository
        + Clone
        + 'static
{
}
