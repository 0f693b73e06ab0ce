use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{
    LineItemId, Money, OrderId, Page, PageRequest, PaymentId, PaymentMethodId, ProductId,
    ReviewId, UserId,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::records::{
    LineItem, NewLineItem, NewOrder, NewPayment, NewProduct, NewReview, NewUser, Order,
    OrderFilter, Payment, PaymentChanges, PaymentMethod, Product, ProductChanges, RatingSummary,
    Review, ReviewChanges, User, UserChanges,
};
use crate::repository::{
    OrderRepository, PaymentRepository, ProductRepository, ReviewRepository, UserRepository,
};
use crate::{Result, StoreError};

const PRODUCT_COLUMNS: &str =
    "id, name, description, price_cents, expires_on, stock, created_at, updated_at";
const LINE_ITEM_COLUMNS: &str =
    "li.id, li.order_id, li.product_id, li.quantity, li.unit_price_cents, li.created_at";
const ORDER_COLUMNS: &str = "id, client_id, seller_id, purchased_at";
const PAYMENT_COLUMNS: &str = "id, order_id, method_id, amount_cents, paid_at";
const REVIEW_COLUMNS: &str =
    "id, product_id, client_id, rating, comment, created_at, updated_at";
const USER_COLUMNS: &str = "id, name, email, created_at";

/// SQLSTATE raised when `stock + delta` leaves the BIGINT range.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Items of every given order, in creation order.
    async fn load_items(&self, order_ids: &[Uuid]) -> Result<HashMap<OrderId, Vec<LineItem>>> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM line_items li WHERE li.order_id = ANY($1) ORDER BY li.seq"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<LineItem>> = HashMap::new();
        for row in rows {
            let item = row_to_line_item(&row)?;
            items.entry(item.order_id).or_default().push(item);
        }
        Ok(items)
    }

    async fn orders_with_items(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.load_items(&ids).await?;

        rows.iter()
            .map(|row| {
                let id = OrderId::from_uuid(row.try_get("id")?);
                row_to_order(row, items.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

fn narrow<T, U>(value: T, column: &str) -> Result<U>
where
    U: TryFrom<T>,
    U::Error: std::error::Error + Send + Sync + 'static,
{
    U::try_from(value).map_err(|e| {
        StoreError::Database(sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
}

fn unique_violation(e: sqlx::Error, constraint: &'static str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some(constraint)
    {
        return StoreError::UniqueViolation(constraint.to_string());
    }
    StoreError::Database(e)
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        expires_on: row.try_get("expires_on")?,
        stock: row.try_get("stock")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_line_item(row: &PgRow) -> Result<LineItem> {
    Ok(LineItem {
        id: LineItemId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        quantity: narrow(row.try_get::<i64, _>("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_order(row: &PgRow, items: Vec<LineItem>) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        client_id: UserId::from_uuid(row.try_get("client_id")?),
        seller_id: row
            .try_get::<Option<Uuid>, _>("seller_id")?
            .map(UserId::from_uuid),
        purchased_at: row.try_get("purchased_at")?,
        items,
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        method_id: row
            .try_get::<Option<Uuid>, _>("method_id")?
            .map(PaymentMethodId::from_uuid),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        paid_at: row.try_get("paid_at")?,
    })
}

fn row_to_payment_method(row: &PgRow) -> Result<PaymentMethod> {
    Ok(PaymentMethod {
        id: PaymentMethodId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
    })
}

fn row_to_review(row: &PgRow) -> Result<Review> {
    Ok(Review {
        id: ReviewId::from_uuid(row.try_get("id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        client_id: UserId::from_uuid(row.try_get("client_id")?),
        rating: narrow(row.try_get::<i16, _>("rating")?, "rating")?,
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_user(row: &PgRow) -> Result<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn count(pool: &PgPool, sql: &str, param: Option<Uuid>) -> Result<u64> {
    let mut query = sqlx::query_scalar::<_, i64>(sql);
    if let Some(param) = param {
        query = query.bind(param);
    }
    narrow(query.fetch_one(pool).await?, "count")
}

/// `stock = stock + delta`, unchecked.
async fn adjust_stock_in(
    conn: &mut PgConnection,
    id: ProductId,
    delta: i64,
    now: DateTime<Utc>,
) -> Result<i64> {
    let stock: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products SET stock = stock + $2, updated_at = $3
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING stock
        "#,
    )
    .bind(id.as_uuid())
    .bind(delta)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err)
            if db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) =>
        {
            StoreError::StockOverflow {
                product_id: id,
                delta,
            }
        }
        other => StoreError::Database(other),
    })?;

    stock.ok_or_else(|| StoreError::not_found("Product", id))
}

/// `stock = stock - quantity`, only when at least `quantity` units remain.
///
/// The guard lives in the UPDATE itself, so concurrent consumers serialize
/// on the row lock and the loser re-evaluates against the committed stock.
async fn consume_stock_in(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: i64,
    now: DateTime<Utc>,
) -> Result<i64> {
    let stock: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products SET stock = stock - $2, updated_at = $3
        WHERE id = $1 AND deleted_at IS NULL AND stock >= $2
        RETURNING stock
        "#,
    )
    .bind(id.as_uuid())
    .bind(quantity)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(stock) = stock {
        return Ok(stock);
    }

    let available: Option<i64> =
        sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 AND deleted_at IS NULL")
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;

    match available {
        Some(available) => Err(StoreError::InsufficientStock {
            product_id: id,
            available,
            requested: quantity,
        }),
        None => Err(StoreError::not_found("Product", id)),
    }
}

async fn insert_line_item_in(
    conn: &mut PgConnection,
    order_id: OrderId,
    item: NewLineItem,
    now: DateTime<Utc>,
) -> Result<LineItem> {
    let id = LineItemId::new();
    sqlx::query(
        r#"
        INSERT INTO line_items (id, order_id, product_id, quantity, unit_price_cents, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id.as_uuid())
    .bind(order_id.as_uuid())
    .bind(item.product_id.as_uuid())
    .bind(i64::from(item.quantity))
    .bind(item.unit_price.cents())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(LineItem {
        id,
        order_id,
        product_id: item.product_id,
        quantity: item.quantity,
        unit_price: item.unit_price,
        created_at: now,
    })
}

/// Locks a live line item together with its order row.
async fn lock_line_item(conn: &mut PgConnection, id: LineItemId) -> Result<LineItem> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {LINE_ITEM_COLUMNS}
        FROM line_items li
        JOIN orders o ON o.id = li.order_id
        WHERE li.id = $1 AND o.deleted_at IS NULL
        FOR UPDATE
        "#
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => row_to_line_item(&row),
        None => Err(StoreError::not_found("LineItem", id)),
    }
}

/// Locks a live order row and returns its current total.
async fn lock_order_total(conn: &mut PgConnection, order_id: OrderId) -> Result<Money> {
    let locked: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM orders WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;
    if locked.is_none() {
        return Err(StoreError::not_found("Order", order_id));
    }

    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity * unit_price_cents), 0)::BIGINT FROM line_items WHERE order_id = $1",
    )
    .bind(order_id.as_uuid())
    .fetch_one(&mut *conn)
    .await?;
    Ok(Money::from_cents(total))
}

async fn paid_in(
    conn: &mut PgConnection,
    order_id: OrderId,
    excluding: Option<PaymentId>,
) -> Result<Money> {
    let paid: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM payments
        WHERE order_id = $1 AND ($2::UUID IS NULL OR id <> $2)
        "#,
    )
    .bind(order_id.as_uuid())
    .bind(excluding.map(|id| id.as_uuid()))
    .fetch_one(&mut *conn)
    .await?;
    Ok(Money::from_cents(paid))
}

async fn ensure_method_in(conn: &mut PgConnection, id: PaymentMethodId) -> Result<()> {
    let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM payment_methods WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::not_found("PaymentMethod", id)),
    }
}

#[async_trait]
impl ProductRepository for PostgresStore {
    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (id, name, description, price_cents, expires_on, stock, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(ProductId::new().as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.expires_on)
        .bind(product.stock)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row_to_product(&row)
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn find_product_by_name(&self, name: &str) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE name = $1 AND deleted_at IS NULL
            ORDER BY seq
            LIMIT 1
            "#
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn products_expiring_on(&self, date: NaiveDate) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE expires_on = $1 AND deleted_at IS NULL
            ORDER BY seq
            "#
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn products_expiring_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE expires_on BETWEEN $1 AND $2 AND deleted_at IS NULL
            ORDER BY expires_on, seq
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn update_product(&self, id: ProductId, changes: ProductChanges) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                expires_on = COALESCE($5, expires_on),
                stock = COALESCE($6, stock),
                updated_at = $7
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.price.map(|p| p.cents()))
        .bind(changes.expires_on)
        .bind(changes.stock)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_product(&row),
            None => Err(StoreError::not_found("Product", id)),
        }
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Product", id));
        }
        Ok(())
    }

    async fn list_products(&self, page: PageRequest) -> Result<Page<Product>> {
        let total = count(
            &self.pool,
            "SELECT COUNT(*) FROM products WHERE deleted_at IS NULL",
            None,
        )
        .await?;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE deleted_at IS NULL
            ORDER BY seq
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(i64::from(page.limit()))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(row_to_product).collect::<Result<_>>()?;
        Ok(Page::new(items, total, page))
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        adjust_stock_in(&mut conn, id, delta, Utc::now()).await
    }

    async fn consume_stock(&self, id: ProductId, quantity: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        consume_stock_in(&mut conn, id, quantity, Utc::now()).await
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        let now = Utc::now();
        let order_id = OrderId::new();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (id, client_id, seller_id, purchased_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(order_id.as_uuid())
        .bind(order.client_id.as_uuid())
        .bind(order.seller_id.map(|id| id.as_uuid()))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Product rows are locked in id order so concurrent orders over the
        // same products cannot deadlock. Any failure below drops the
        // transaction, undoing stock already consumed.
        let mut requested: BTreeMap<ProductId, i64> = BTreeMap::new();
        for item in &order.items {
            *requested.entry(item.product_id).or_insert(0) += i64::from(item.quantity);
        }
        for (product_id, quantity) in requested {
            consume_stock_in(&mut tx, product_id, quantity, now).await?;
        }

        let mut items = Vec::with_capacity(order.items.len());
        for item in order.items {
            items.push(insert_line_item_in(&mut tx, order_id, item, now).await?);
        }

        tx.commit().await?;

        Ok(Order {
            id: order_id,
            client_id: order.client_id,
            seller_id: order.seller_id,
            purchased_at: now,
            items,
        })
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.orders_with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let (clause, user) = match filter {
            OrderFilter::All => ("", None),
            OrderFilter::Client(id) => (" AND client_id = $1", Some(id.as_uuid())),
            OrderFilter::Seller(id) => (" AND seller_id = $1", Some(id.as_uuid())),
        };
        let next = if user.is_some() { 2 } else { 1 };

        let total = count(
            &self.pool,
            &format!("SELECT COUNT(*) FROM orders WHERE deleted_at IS NULL{clause}"),
            user,
        )
        .await?;

        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE deleted_at IS NULL{clause} ORDER BY seq DESC LIMIT ${} OFFSET ${}",
            next,
            next + 1
        );
        let mut query = sqlx::query(&sql);
        if let Some(user) = user {
            query = query.bind(user);
        }
        let rows = query
            .bind(i64::from(page.limit()))
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let orders = self.orders_with_items(rows).await?;
        Ok(Page::new(orders, total, page))
    }

    async fn set_order_seller(&self, id: OrderId, seller_id: UserId) -> Result<Order> {
        let result =
            sqlx::query("UPDATE orders SET seller_id = $2 WHERE id = $1 AND deleted_at IS NULL")
                .bind(id.as_uuid())
                .bind(seller_id.as_uuid())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Order", id));
        }
        self.find_order(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Order", id))
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("UPDATE orders SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL")
                .bind(id.as_uuid())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Order", id));
        }

        sqlx::query("DELETE FROM line_items WHERE order_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_line_item(&self, id: LineItemId) -> Result<Option<LineItem>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {LINE_ITEM_COLUMNS}
            FROM line_items li
            JOIN orders o ON o.id = li.order_id
            WHERE li.id = $1 AND o.deleted_at IS NULL
            "#
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_line_item).transpose()
    }

    async fn insert_line_item(&self, order_id: OrderId, item: NewLineItem) -> Result<LineItem> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let locked: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM orders WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Err(StoreError::not_found("Order", order_id));
        }

        consume_stock_in(&mut tx, item.product_id, i64::from(item.quantity), now).await?;
        let item = insert_line_item_in(&mut tx, order_id, item, now).await?;

        tx.commit().await?;
        Ok(item)
    }

    async fn update_line_item(
        &self,
        id: LineItemId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<LineItem> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let current = lock_line_item(&mut tx, id).await?;
        let delta = i64::from(quantity) - i64::from(current.quantity);
        if delta > 0 {
            consume_stock_in(&mut tx, current.product_id, delta, now).await?;
        } else if delta < 0 {
            adjust_stock_in(&mut tx, current.product_id, -delta, now).await?;
        }

        sqlx::query("UPDATE line_items SET quantity = $2, unit_price_cents = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(quantity))
            .bind(unit_price.cents())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(LineItem {
            quantity,
            unit_price,
            ..current
        })
    }

    async fn delete_line_item(&self, id: LineItemId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let item = lock_line_item(&mut tx, id).await?;
        adjust_stock_in(
            &mut tx,
            item.product_id,
            i64::from(item.quantity),
            Utc::now(),
        )
        .await?;

        sqlx::query("DELETE FROM line_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;

        // The order row lock serializes concurrent payments against the same order.
        let total = lock_order_total(&mut tx, payment.order_id).await?;
        if let Some(method_id) = payment.method_id {
            ensure_method_in(&mut tx, method_id).await?;
        }
        let paid = paid_in(&mut tx, payment.order_id, None).await?;
        if paid + payment.amount > total {
            return Err(StoreError::OverPayment {
                order_id: payment.order_id,
                total,
                paid,
                requested: payment.amount,
            });
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payments (id, order_id, method_id, amount_cents, paid_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(PaymentId::new().as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.method_id.map(|id| id.as_uuid()))
        .bind(payment.amount.cents())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row_to_payment(&row)
    }

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn update_payment(&self, id: PaymentId, changes: PaymentChanges) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;

        let order_id: Option<Uuid> =
            sqlx::query_scalar("SELECT order_id FROM payments WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let order_id = OrderId::from_uuid(
            order_id.ok_or_else(|| StoreError::not_found("Payment", id))?,
        );

        if let Some(amount) = changes.amount {
            let total = lock_order_total(&mut tx, order_id).await?;
            let paid = paid_in(&mut tx, order_id, Some(id)).await?;
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
            ensure_method_in(&mut tx, method_id).await?;
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE payments SET
                amount_cents = COALESCE($2, amount_cents),
                method_id = COALESCE($3, method_id)
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(changes.amount.map(|a| a.cents()))
        .bind(changes.method_id.map(|m| m.as_uuid()))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row_to_payment(&row)
    }

    async fn delete_payment(&self, id: PaymentId) -> Result<()> {
        let result = sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Payment", id));
        }
        Ok(())
    }

    async fn list_payments(&self, page: PageRequest) -> Result<Page<Payment>> {
        let total = count(&self.pool, "SELECT COUNT(*) FROM payments", None).await?;
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY seq DESC LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(page.limit()))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(row_to_payment).collect::<Result<_>>()?;
        Ok(Page::new(items, total, page))
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY seq DESC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_payment).collect()
    }

    async fn total_paid(&self, order_id: OrderId) -> Result<Money> {
        let mut conn = self.pool.acquire().await?;
        paid_in(&mut conn, order_id, None).await
    }

    async fn insert_payment_method(&self, name: &str) -> Result<PaymentMethod> {
        let row = sqlx::query("INSERT INTO payment_methods (id, name) VALUES ($1, $2) RETURNING id, name")
            .bind(PaymentMethodId::new().as_uuid())
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| unique_violation(e, "payment_methods_name_key"))?;

        row_to_payment_method(&row)
    }

    async fn find_payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>> {
        let row = sqlx::query("SELECT id, name FROM payment_methods WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_payment_method).transpose()
    }

    async fn find_payment_method_by_name(&self, name: &str) -> Result<Option<PaymentMethod>> {
        let row = sqlx::query("SELECT id, name FROM payment_methods WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_payment_method).transpose()
    }

    async fn list_payment_methods(&self) -> Result<Vec<PaymentMethod>> {
        let rows = sqlx::query("SELECT id, name FROM payment_methods ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_payment_method).collect()
    }

    async fn rename_payment_method(
        &self,
        id: PaymentMethodId,
        name: &str,
    ) -> Result<PaymentMethod> {
        let row =
            sqlx::query("UPDATE payment_methods SET name = $2 WHERE id = $1 RETURNING id, name")
                .bind(id.as_uuid())
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| unique_violation(e, "payment_methods_name_key"))?;

        match row {
            Some(row) => row_to_payment_method(&row),
            None => Err(StoreError::not_found("PaymentMethod", id)),
        }
    }

    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<()> {
        let result = sqlx::query("DELETE FROM payment_methods WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("PaymentMethod", id));
        }
        Ok(())
    }
}

#[async_trait]
impl ReviewRepository for PostgresStore {
    async fn insert_review(&self, review: NewReview) -> Result<Review> {
        let product: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM products WHERE id = $1 AND deleted_at IS NULL")
                .bind(review.product_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        if product.is_none() {
            return Err(StoreError::not_found("Product", review.product_id));
        }

        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO reviews (id, product_id, client_id, rating, comment, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(ReviewId::new().as_uuid())
        .bind(review.product_id.as_uuid())
        .bind(review.client_id.as_uuid())
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "reviews_client_product_key"))?;

        row_to_review(&row)
    }

    async fn find_review(&self, id: ReviewId) -> Result<Option<Review>> {
        let row = sqlx::query(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_review).transpose()
    }

    async fn review_exists(&self, client_id: UserId, product_id: ProductId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE client_id = $1 AND product_id = $2)",
        )
        .bind(client_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn update_review(&self, id: ReviewId, changes: ReviewChanges) -> Result<Review> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reviews SET
                rating = COALESCE($2, rating),
                comment = COALESCE($3, comment),
                updated_at = $4
            WHERE id = $1
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(changes.rating.map(i16::from))
        .bind(changes.comment)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_review(&row),
            None => Err(StoreError::not_found("Review", id)),
        }
    }

    async fn delete_review(&self, id: ReviewId) -> Result<()> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Review", id));
        }
        Ok(())
    }

    async fn list_reviews(
        &self,
        product_id: Option<ProductId>,
        page: PageRequest,
    ) -> Result<Page<Review>> {
        let product = product_id.map(|id| id.as_uuid());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reviews WHERE ($1::UUID IS NULL OR product_id = $1)",
        )
        .bind(product)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {REVIEW_COLUMNS} FROM reviews
            WHERE ($1::UUID IS NULL OR product_id = $1)
            ORDER BY seq DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(product)
        .bind(i64::from(page.limit()))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(row_to_review).collect::<Result<_>>()?;
        Ok(Page::new(items, narrow(total, "count")?, page))
    }

    async fn rating_summary(&self, product_id: ProductId) -> Result<RatingSummary> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(AVG(rating), 0)::FLOAT8 AS average, COUNT(*) AS count
            FROM reviews
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(RatingSummary {
            average: row.try_get("average")?,
            count: narrow(row.try_get::<i64, _>("count")?, "count")?,
        })
    }
}

#[async_trait]
impl UserRepository for PostgresStore {
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, name, email, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(UserId::new().as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "users_email_key"))?;

        row_to_user(&row)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> Result<User> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email)
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(changes.name)
        .bind(changes.email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "users_email_key"))?;

        match row {
            Some(row) => row_to_user(&row),
            None => Err(StoreError::not_found("User", id)),
        }
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        let result =
            sqlx::query("UPDATE users SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL")
                .bind(id.as_uuid())
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("User", id));
        }
        Ok(())
    }

    async fn list_users(&self, page: PageRequest) -> Result<Page<User>> {
        let total = count(
            &self.pool,
            "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL",
            None,
        )
        .await?;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE deleted_at IS NULL
            ORDER BY seq
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(i64::from(page.limit()))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(row_to_user).collect::<Result<_>>()?;
        Ok(Page::new(items, total, page))
    }
}
