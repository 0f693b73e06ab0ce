use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{
    LineItemId, Money, OrderId, Page, PageRequest, PaymentId, PaymentMethodId, ProductId,
    ReviewId, UserId,
};
use tokio::sync::RwLock;

use crate::records::{
    LineItem, NewLineItem, NewOrder, NewPayment, NewProduct, NewReview, NewUser, Order,
    OrderFilter, Payment, PaymentChanges, PaymentMethod, Product, ProductChanges, RatingSummary,
    Review, ReviewChanges, User, UserChanges,
};
use crate::repository::{
    OrderRepository, PaymentRepository, ProductRepository, ReviewRepository, UserRepository,
};
use crate::{Result, StoreError};

#[derive(Debug, Clone)]
struct ProductRow {
    product: Product,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct OrderRow {
    order: Order,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct UserRow {
    user: User,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Tables {
    products: Vec<ProductRow>,
    orders: Vec<OrderRow>,
    payments: Vec<Payment>,
    payment_methods: Vec<PaymentMethod>,
    reviews: Vec<Review>,
    users: Vec<UserRow>,
    fail_order_item_at: Option<usize>,
}

impl Tables {
    fn live_product(&self, id: ProductId) -> Option<&Product> {
        self.products
            .iter()
            .find(|row| row.product.id == id && !row.deleted)
            .map(|row| &row.product)
    }

    fn live_product_mut(&mut self, id: ProductId) -> Result<&mut Product> {
        self.products
            .iter_mut()
            .find(|row| row.product.id == id && !row.deleted)
            .map(|row| &mut row.product)
            .ok_or_else(|| StoreError::not_found("Product", id))
    }

    fn live_products(&self) -> impl Iterator<Item = &Product> {
        self.products
            .iter()
            .filter(|row| !row.deleted)
            .map(|row| &row.product)
    }

    fn adjust(&mut self, id: ProductId, delta: i64, now: DateTime<Utc>) -> Result<i64> {
        let product = self.live_product_mut(id)?;
        product.stock = product
            .stock
            .checked_add(delta)
            .ok_or(StoreError::StockOverflow {
                product_id: id,
                delta,
            })?;
        product.updated_at = now;
        Ok(product.stock)
    }

    fn consume(&mut self, id: ProductId, quantity: i64, now: DateTime<Utc>) -> Result<i64> {
        let product = self.live_product_mut(id)?;
        if product.stock < quantity {
            return Err(StoreError::InsufficientStock {
                product_id: id,
                available: product.stock,
                requested: quantity,
            });
        }
        product.stock -= quantity;
        product.updated_at = now;
        Ok(product.stock)
    }

    fn live_order(&self, id: OrderId) -> Option<&Order> {
        self.orders
            .iter()
            .find(|row| row.order.id == id && !row.deleted)
            .map(|row| &row.order)
    }

    fn live_order_mut(&mut self, id: OrderId) -> Result<&mut Order> {
        self.orders
            .iter_mut()
            .find(|row| row.order.id == id && !row.deleted)
            .map(|row| &mut row.order)
            .ok_or_else(|| StoreError::not_found("Order", id))
    }

    /// (order index, item index) of a line item in a live order.
    fn locate_item(&self, id: LineItemId) -> Option<(usize, usize)> {
        self.orders.iter().enumerate().find_map(|(o, row)| {
            if row.deleted {
                return None;
            }
            row.order
                .items
                .iter()
                .position(|item| item.id == id)
                .map(|i| (o, i))
        })
    }

    fn paid(&self, order_id: OrderId, excluding: Option<PaymentId>) -> Money {
        self.payments
            .iter()
            .filter(|p| p.order_id == order_id && Some(p.id) != excluding)
            .map(|p| p.amount)
            .sum()
    }

    fn ensure_method(&self, id: PaymentMethodId) -> Result<()> {
        if self.payment_methods.iter().any(|m| m.id == id) {
            Ok(())
        } else {
            Err(StoreError::not_found("PaymentMethod", id))
        }
    }

    fn live_user_mut(&mut self, id: UserId) -> Result<&mut User> {
        self.users
            .iter_mut()
            .find(|row| row.user.id == id && !row.deleted)
            .map(|row| &mut row.user)
            .ok_or_else(|| StoreError::not_found("User", id))
    }

    fn email_taken(&self, email: &str, excluding: Option<UserId>) -> bool {
        self.users
            .iter()
            .any(|row| !row.deleted && row.user.email == email && Some(row.user.id) != excluding)
    }
}

fn paginate<T: Clone>(rows: Vec<T>, page: PageRequest) -> Page<T> {
    let total = rows.len() as u64;
    let items = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Page::new(items, total, page)
}

/// In-memory store implementation for testing and local runs.
///
/// Every table sits behind a single lock, so each operation is atomic and
/// isolated from the others, matching what the PostgreSQL store gets from
/// its transactions and guarded updates.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `insert_order` fail while persisting the item at `index`,
    /// as a storage error would halfway through a transaction.
    pub async fn fail_order_item_at(&self, index: usize) {
        self.tables.write().await.fail_order_item_at = Some(index);
    }

    /// Number of live orders.
    pub async fn order_count(&self) -> usize {
        self.tables
            .read()
            .await
            .orders
            .iter()
            .filter(|row| !row.deleted)
            .count()
    }

    /// Number of line items across live orders.
    pub async fn line_item_count(&self) -> usize {
        self.tables
            .read()
            .await
            .orders
            .iter()
            .filter(|row| !row.deleted)
            .map(|row| row.order.items.len())
            .sum()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.read().await.payments.len()
    }

    /// Clears every table.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(),
            name: product.name,
            description: product.description,
            price: product.price,
            expires_on: product.expires_on,
            stock: product.stock,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.products.push(ProductRow {
            product: product.clone(),
            deleted: false,
        });
        Ok(product)
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.live_product(id).cloned())
    }

    async fn find_product_by_name(&self, name: &str) -> Result<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables.live_products().find(|p| p.name == name).cloned())
    }

    async fn products_expiring_on(&self, date: NaiveDate) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(tables
            .live_products()
            .filter(|p| p.expires_on == date)
            .cloned()
            .collect())
    }

    async fn products_expiring_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        let mut products: Vec<_> = tables
            .live_products()
            .filter(|p| p.expires_on >= from && p.expires_on <= to)
            .cloned()
            .collect();
        products.sort_by_key(|p| p.expires_on);
        Ok(products)
    }

    async fn update_product(&self, id: ProductId, changes: ProductChanges) -> Result<Product> {
        let mut tables = self.tables.write().await;
        let product = tables.live_product_mut(id)?;
        changes.apply(product);
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables
            .products
            .iter_mut()
            .find(|row| row.product.id == id && !row.deleted)
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        row.deleted = true;
        Ok(())
    }

    async fn list_products(&self, page: PageRequest) -> Result<Page<Product>> {
        let tables = self.tables.read().await;
        Ok(paginate(tables.live_products().cloned().collect(), page))
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<i64> {
        self.tables.write().await.adjust(id, delta, Utc::now())
    }

    async fn consume_stock(&self, id: ProductId, quantity: i64) -> Result<i64> {
        self.tables.write().await.consume(id, quantity, Utc::now())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let fail_at = tables.fail_order_item_at.take();

        // Everything is checked before the first write so a failure leaves no trace.
        let mut consumed: HashMap<ProductId, i64> = HashMap::new();
        for (index, item) in order.items.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(StoreError::Unavailable(format!(
                    "line item {index} could not be persisted"
                )));
            }
            let product = tables
                .live_product(item.product_id)
                .ok_or_else(|| StoreError::not_found("Product", item.product_id))?;
            let already = consumed.entry(item.product_id).or_insert(0);
            let available = product.stock - *already;
            let requested = i64::from(item.quantity);
            if available < requested {
                return Err(StoreError::InsufficientStock {
                    product_id: item.product_id,
                    available,
                    requested,
                });
            }
            *already += requested;
        }

        let now = Utc::now();
        for (product_id, quantity) in consumed {
            tables.consume(product_id, quantity, now)?;
        }

        let order_id = OrderId::new();
        let items = order
            .items
            .into_iter()
            .map(|item| LineItem {
                id: LineItemId::new(),
                order_id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                created_at: now,
            })
            .collect();
        let order = Order {
            id: order_id,
            client_id: order.client_id,
            seller_id: order.seller_id,
            purchased_at: now,
            items,
        };
        tables.orders.push(OrderRow {
            order: order.clone(),
            deleted: false,
        });
        Ok(order)
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.live_order(id).cloned())
    }

    async fn list_orders(&self, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let tables = self.tables.read().await;
        let orders = tables
            .orders
            .iter()
            .rev()
            .filter(|row| !row.deleted && filter.matches(&row.order))
            .map(|row| row.order.clone())
            .collect();
        Ok(paginate(orders, page))
    }

    async fn set_order_seller(&self, id: OrderId, seller_id: UserId) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let order = tables.live_order_mut(id)?;
        order.seller_id = Some(seller_id);
        Ok(order.clone())
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables
            .orders
            .iter_mut()
            .find(|row| row.order.id == id && !row.deleted)
            .ok_or_else(|| StoreError::not_found("Order", id))?;
        row.deleted = true;
        row.order.items.clear();
        Ok(())
    }

    async fn find_line_item(&self, id: LineItemId) -> Result<Option<LineItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .locate_item(id)
            .map(|(o, i)| tables.orders[o].order.items[i].clone()))
    }

    async fn insert_line_item(&self, order_id: OrderId, item: NewLineItem) -> Result<LineItem> {
        let mut tables = self.tables.write().await;
        if tables.live_order(order_id).is_none() {
            return Err(StoreError::not_found("Order", order_id));
        }

        let now = Utc::now();
        tables.consume(item.product_id, i64::from(item.quantity), now)?;

        let item = LineItem {
            id: LineItemId::new(),
            order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            created_at: now,
        };
        tables.live_order_mut(order_id)?.items.push(item.clone());
        Ok(item)
    }

    async fn update_line_item(
        &self,
        id: LineItemId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<LineItem> {
        let mut tables = self.tables.write().await;
        let (o, i) = tables
            .locate_item(id)
            .ok_or_else(|| StoreError::not_found("LineItem", id))?;
        let current = tables.orders[o].order.items[i].clone();

        let now = Utc::now();
        let delta = i64::from(quantity) - i64::from(current.quantity);
        if delta > 0 {
            tables.consume(current.product_id, delta, now)?;
        } else if delta < 0 {
            tables.adjust(current.product_id, -delta, now)?;
        }

        let item = &mut tables.orders[o].order.items[i];
        item.quantity = quantity;
        item.unit_price = unit_price;
        Ok(item.clone())
    }

    async fn delete_line_item(&self, id: LineItemId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let (o, i) = tables
            .locate_item(id)
            .ok_or_else(|| StoreError::not_found("LineItem", id))?;
        let item = tables.orders[o].order.items[i].clone();

        tables.adjust(item.product_id, i64::from(item.quantity), Utc::now())?;
        tables.orders[o].order.items.remove(i);
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment> {
        let mut tables = self.tables.write().await;
        let total = tables
            .live_order(payment.order_id)
            .map(Order::total)
            .ok_or_else(|| StoreError::not_found("Order", payment.order_id))?;
        if let Some(method_id) = payment.method_id {
            tables.ensure_method(method_id)?;
        }

        let paid = tables.paid(payment.order_id, None);
        if paid + payment.amount > total {
            return Err(StoreError::OverPayment {
                order_id: payment.order_id,
                total,
                paid,
                requested: payment.amount,
            });
        }

        let payment = Payment {
            id: PaymentId::new(),
            order_id: payment.order_id,
            method_id: payment.method_id,
            amount: payment.amount,
            paid_at: Utc::now(),
        };
        tables.payments.push(payment.clone());
        Ok(payment)
    }

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.iter().find(|p| p.id == id).cloned())
    }

    async fn update_payment(&self, id: PaymentId, changes: PaymentChanges) -> Result<Payment> {
        let mut tables = self.tables.write().await;
        let index = tables
            .payments
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| StoreError::not_found("Payment", id))?;
        let order_id = tables.payments[index].order_id;

        if let Some(amount) = changes.amount {
            let total = tables
                .live_order(order_id)
                .map(Order::total)
                .ok_or_else(|| StoreError::not_found("Order", order_id))?;
            let paid = tables.paid(order_id, Some(id));
            if paid + amount > total {
                return Err(StoreError::OverPayment {
                    order_id,
                    total,
                    paid,
                    requested: amount,
                });
            }
        }
        if let Some(method_id) = changes.method_id {
            tables.ensure_method(method_id)?;
        }

        let payment = &mut tables.payments[index];
        if let Some(amount) = changes.amount {
            payment.amount = amount;
        }
        if let Some(method_id) = changes.method_id {
            payment.method_id = Some(method_id);
        }
        Ok(payment.clone())
    }

    async fn delete_payment(&self, id: PaymentId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let index = tables
            .payments
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| StoreError::not_found("Payment", id))?;
        tables.payments.remove(index);
        Ok(())
    }

    async fn list_payments(&self, page: PageRequest) -> Result<Page<Payment>> {
        let tables = self.tables.read().await;
        Ok(paginate(tables.payments.iter().rev().cloned().collect(), page))
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .iter()
            .rev()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn total_paid(&self, order_id: OrderId) -> Result<Money> {
        Ok(self.tables.read().await.paid(order_id, None))
    }

    async fn insert_payment_method(&self, name: &str) -> Result<PaymentMethod> {
        let mut tables = self.tables.write().await;
        if tables.payment_methods.iter().any(|m| m.name == name) {
            return Err(StoreError::UniqueViolation(
                "payment_methods_name_key".to_string(),
            ));
        }
        let method = PaymentMethod {
            id: PaymentMethodId::new(),
            name: name.to_string(),
        };
        tables.payment_methods.push(method.clone());
        Ok(method)
    }

    async fn find_payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>> {
        let tables = self.tables.read().await;
        Ok(tables.payment_methods.iter().find(|m| m.id == id).cloned())
    }

    async fn find_payment_method_by_name(&self, name: &str) -> Result<Option<PaymentMethod>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payment_methods
            .iter()
            .find(|m| m.name == name)
            .cloned())
    }

    async fn list_payment_methods(&self) -> Result<Vec<PaymentMethod>> {
        let tables = self.tables.read().await;
        let mut methods = tables.payment_methods.clone();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(methods)
    }

    async fn rename_payment_method(
        &self,
        id: PaymentMethodId,
        name: &str,
    ) -> Result<PaymentMethod> {
        let mut tables = self.tables.write().await;
        if tables
            .payment_methods
            .iter()
            .any(|m| m.name == name && m.id != id)
        {
            return Err(StoreError::UniqueViolation(
                "payment_methods_name_key".to_string(),
            ));
        }
        let method = tables
            .payment_methods
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::not_found("PaymentMethod", id))?;
        method.name = name.to_string();
        Ok(method.clone())
    }

    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let index = tables
            .payment_methods
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| StoreError::not_found("PaymentMethod", id))?;
        tables.payment_methods.remove(index);
        for payment in tables
            .payments
            .iter_mut()
            .filter(|p| p.method_id == Some(id))
        {
            payment.method_id = None;
        }
        Ok(())
    }
}

#[async_trait]
impl ReviewRepository for InMemoryStore {
    async fn insert_review(&self, review: NewReview) -> Result<Review> {
        let mut tables = self.tables.write().await;
        if tables.live_product(review.product_id).is_none() {
            return Err(StoreError::not_found("Product", review.product_id));
        }
        if tables
            .reviews
            .iter()
            .any(|r| r.client_id == review.client_id && r.product_id == review.product_id)
        {
            return Err(StoreError::UniqueViolation(
                "reviews_client_product_key".to_string(),
            ));
        }

        let now = Utc::now();
        let review = Review {
            id: ReviewId::new(),
            product_id: review.product_id,
            client_id: review.client_id,
            rating: review.rating,
            comment: review.comment,
            created_at: now,
            updated_at: now,
        };
        tables.reviews.push(review.clone());
        Ok(review)
    }

    async fn find_review(&self, id: ReviewId) -> Result<Option<Review>> {
        let tables = self.tables.read().await;
        Ok(tables.reviews.iter().find(|r| r.id == id).cloned())
    }

    async fn review_exists(&self, client_id: UserId, product_id: ProductId) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .iter()
            .any(|r| r.client_id == client_id && r.product_id == product_id))
    }

    async fn update_review(&self, id: ReviewId, changes: ReviewChanges) -> Result<Review> {
        let mut tables = self.tables.write().await;
        let review = tables
            .reviews
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::not_found("Review", id))?;
        if let Some(rating) = changes.rating {
            review.rating = rating;
        }
        if let Some(comment) = changes.comment {
            review.comment = comment;
        }
        review.updated_at = Utc::now();
        Ok(review.clone())
    }

    async fn delete_review(&self, id: ReviewId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let index = tables
            .reviews
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::not_found("Review", id))?;
        tables.reviews.remove(index);
        Ok(())
    }

    async fn list_reviews(
        &self,
        product_id: Option<ProductId>,
        page: PageRequest,
    ) -> Result<Page<Review>> {
        let tables = self.tables.read().await;
        let reviews = tables
            .reviews
            .iter()
            .rev()
            .filter(|r| product_id.is_none_or(|id| r.product_id == id))
            .cloned()
            .collect();
        Ok(paginate(reviews, page))
    }

    async fn rating_summary(&self, product_id: ProductId) -> Result<RatingSummary> {
        let tables = self.tables.read().await;
        let ratings: Vec<u8> = tables
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.rating)
            .collect();
        let count = ratings.len() as u64;
        let average = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().map(|&r| f64::from(r)).sum::<f64>() / count as f64
        };
        Ok(RatingSummary { average, count })
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email, None) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        let user = User {
            id: UserId::new(),
            name: user.name,
            email: user.email,
            created_at: Utc::now(),
        };
        tables.users.push(UserRow {
            user: user.clone(),
            deleted: false,
        });
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|row| row.user.id == id && !row.deleted)
            .map(|row| row.user.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|row| row.user.email == email && !row.deleted)
            .map(|row| row.user.clone()))
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> Result<User> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &changes.email
            && tables.email_taken(email, Some(id))
        {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        let user = tables.live_user_mut(id)?;
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables
            .users
            .iter_mut()
            .find(|row| row.user.id == id && !row.deleted)
            .ok_or_else(|| StoreError::not_found("User", id))?;
        row.deleted = true;
        Ok(())
    }

    async fn list_users(&self, page: PageRequest) -> Result<Page<User>> {
        let tables = self.tables.read().await;
        let users = tables
            .users
            .iter()
            .filter(|row| !row.deleted)
            .map(|row| row.user.clone())
            .collect();
        Ok(paginate(users, page))
    }
}
