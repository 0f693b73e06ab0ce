//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::future::join_all;
use serial_test::serial;
use sqlx::PgPool;
use store::{
    Money, NewLineItem, NewOrder, NewPayment, NewProduct, NewReview, NewUser, OrderFilter,
    OrderRepository, PageRequest, PaymentChanges, PaymentRepository, PostgresStore, Product,
    ProductChanges, ProductRepository, ReviewChanges, ReviewRepository, StoreError, UserChanges,
    UserId, UserRepository,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_commerce_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE reviews, payments, payment_methods, line_items, orders, products, users",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

async fn create_product(store: &PostgresStore, name: &str, stock: i64) -> Product {
    store
        .insert_product(NewProduct {
            name: name.to_string(),
            description: format!("{name} description"),
            price: Money::from_cents(500),
            expires_on: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            stock,
        })
        .await
        .unwrap()
}

async fn stock_of(store: &PostgresStore, product: &Product) -> i64 {
    store.find_product(product.id).await.unwrap().unwrap().stock
}

fn order_of(items: Vec<NewLineItem>) -> NewOrder {
    NewOrder {
        client_id: UserId::new(),
        seller_id: None,
        items,
    }
}

#[tokio::test]
#[serial]
async fn product_update_and_soft_delete() {
    let store = get_test_store().await;
    let product = create_product(&store, "Cheese", 8).await;

    let updated = store
        .update_product(
            product.id,
            ProductChanges {
                price: Some(Money::from_cents(750)),
                stock: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Cheese");
    assert_eq!(updated.price.cents(), 750);
    assert_eq!(updated.stock, 0);

    store.delete_product(product.id).await.unwrap();
    assert!(store.find_product(product.id).await.unwrap().is_none());
    assert!(store.find_product_by_name("Cheese").await.unwrap().is_none());
    assert!(
        store
            .adjust_stock(product.id, 1)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
#[serial]
async fn expiring_between_is_inclusive_and_sorted() {
    let store = get_test_store().await;
    for (name, day) in [("late", 20), ("early", 10), ("outside", 25)] {
        store
            .insert_product(NewProduct {
                name: name.to_string(),
                description: String::new(),
                price: Money::from_cents(100),
                expires_on: NaiveDate::from_ymd_opt(2030, 3, day).unwrap(),
                stock: 1,
            })
            .await
            .unwrap();
    }

    let products = store
        .products_expiring_between(
            NaiveDate::from_ymd_opt(2030, 3, 10).unwrap(),
            NaiveDate::from_ymd_opt(2030, 3, 20).unwrap(),
        )
        .await
        .unwrap();
    let names: Vec<_> = products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["early", "late"]);

    let on_day = store
        .products_expiring_on(NaiveDate::from_ymd_opt(2030, 3, 25).unwrap())
        .await
        .unwrap();
    assert_eq!(on_day.len(), 1);
}

#[tokio::test]
#[serial]
async fn adjust_stock_can_go_negative() {
    let store = get_test_store().await;
    let product = create_product(&store, "Bread", 1).await;

    assert_eq!(store.adjust_stock(product.id, -3).await.unwrap(), -2);
}

#[tokio::test]
#[serial]
async fn insert_order_consumes_stock() {
    let store = get_test_store().await;
    let a = create_product(&store, "A", 10).await;
    let b = create_product(&store, "B", 4).await;

    let order = store
        .insert_order(order_of(vec![
            NewLineItem::new(a.id, 3, Money::from_cents(500)),
            NewLineItem::new(b.id, 4, Money::from_cents(250)),
        ]))
        .await
        .unwrap();

    assert_eq!(order.total().cents(), 2500);
    assert_eq!(stock_of(&store, &a).await, 7);
    assert_eq!(stock_of(&store, &b).await, 0);

    let loaded = store.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.items.len(), 2);
    assert_eq!(loaded.items[0].product_id, a.id);
    assert_eq!(loaded.total().cents(), 2500);
}

#[tokio::test]
#[serial]
async fn insert_order_rolls_back_on_shortfall() {
    let store = get_test_store().await;
    let a = create_product(&store, "A", 10).await;
    let b = create_product(&store, "B", 1).await;

    let err = store
        .insert_order(order_of(vec![
            NewLineItem::new(a.id, 3, Money::from_cents(500)),
            NewLineItem::new(b.id, 2, Money::from_cents(250)),
        ]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::InsufficientStock {
            available: 1,
            requested: 2,
            ..
        }
    ));
    assert_eq!(stock_of(&store, &a).await, 10);
    assert_eq!(stock_of(&store, &b).await, 1);

    let orders = store
        .list_orders(OrderFilter::All, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(orders.total, 0);
}

#[tokio::test]
#[serial]
async fn concurrent_orders_never_oversell() {
    let store = get_test_store().await;
    let product = create_product(&store, "Limited", 5).await;

    let attempts = (0..12).map(|_| {
        let store = store.clone();
        let product_id = product.id;
        tokio::spawn(async move {
            store
                .insert_order(order_of(vec![NewLineItem::new(
                    product_id,
                    1,
                    Money::from_cents(500),
                )]))
                .await
        })
    });

    let results = join_all(attempts).await;
    let succeeded = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|result| result.is_ok())
        .count();

    assert_eq!(succeeded, 5);
    assert_eq!(stock_of(&store, &product).await, 0);
}

#[tokio::test]
#[serial]
async fn concurrent_orders_in_opposite_product_order_both_commit() {
    let store = get_test_store().await;
    let p = create_product(&store, "P", 100).await;
    let q = create_product(&store, "Q", 100).await;

    let attempts = (0..20).map(|i| {
        let store = store.clone();
        let (first, second) = if i % 2 == 0 { (p.id, q.id) } else { (q.id, p.id) };
        tokio::spawn(async move {
            store
                .insert_order(order_of(vec![
                    NewLineItem::new(first, 1, Money::from_cents(100)),
                    NewLineItem::new(second, 1, Money::from_cents(100)),
                ]))
                .await
        })
    });

    for joined in join_all(attempts).await {
        joined.unwrap().unwrap();
    }

    assert_eq!(stock_of(&store, &p).await, 80);
    assert_eq!(stock_of(&store, &q).await, 80);
}

#[tokio::test]
#[serial]
async fn adjust_stock_past_bigint_is_rejected() {
    let store = get_test_store().await;
    let product = create_product(&store, "Salt", 5).await;

    assert!(matches!(
        store.adjust_stock(product.id, i64::MAX).await,
        Err(StoreError::StockOverflow { .. })
    ));
    assert_eq!(stock_of(&store, &product).await, 5);
}

#[tokio::test]
#[serial]
async fn line_item_changes_move_stock() {
    let store = get_test_store().await;
    let product = create_product(&store, "Eggs", 10).await;
    let order = store
        .insert_order(order_of(vec![NewLineItem::new(
            product.id,
            2,
            Money::from_cents(500),
        )]))
        .await
        .unwrap();
    let item_id = order.items[0].id;

    let grown = store
        .update_line_item(item_id, 5, Money::from_cents(450))
        .await
        .unwrap();
    assert_eq!(grown.quantity, 5);
    assert_eq!(stock_of(&store, &product).await, 5);

    store
        .update_line_item(item_id, 1, Money::from_cents(450))
        .await
        .unwrap();
    assert_eq!(stock_of(&store, &product).await, 9);

    let err = store
        .update_line_item(item_id, 20, Money::from_cents(450))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InsufficientStock { .. }));
    let unchanged = store.find_line_item(item_id).await.unwrap().unwrap();
    assert_eq!(unchanged.quantity, 1);
    assert_eq!(stock_of(&store, &product).await, 9);

    let added = store
        .insert_line_item(order.id, NewLineItem::new(product.id, 4, Money::from_cents(500)))
        .await
        .unwrap();
    assert_eq!(stock_of(&store, &product).await, 5);

    store.delete_line_item(added.id).await.unwrap();
    assert_eq!(stock_of(&store, &product).await, 9);
    assert!(store.find_line_item(added.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn delete_order_removes_items_without_touching_stock() {
    let store = get_test_store().await;
    let product = create_product(&store, "Jam", 6).await;
    let order = store
        .insert_order(order_of(vec![NewLineItem::new(
            product.id,
            2,
            Money::from_cents(500),
        )]))
        .await
        .unwrap();

    store.delete_order(order.id).await.unwrap();

    assert!(store.find_order(order.id).await.unwrap().is_none());
    assert!(
        store
            .find_line_item(order.items[0].id)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(stock_of(&store, &product).await, 4);
    assert!(store.delete_order(order.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
#[serial]
async fn list_orders_filters_and_orders_newest_first() {
    let store = get_test_store().await;
    let product = create_product(&store, "Tea", 10).await;
    let client = UserId::new();
    let seller = UserId::new();

    let first = store
        .insert_order(NewOrder {
            client_id: client,
            seller_id: Some(seller),
            items: vec![NewLineItem::new(product.id, 1, Money::from_cents(500))],
        })
        .await
        .unwrap();
    store
        .insert_order(order_of(vec![NewLineItem::new(
            product.id,
            1,
            Money::from_cents(500),
        )]))
        .await
        .unwrap();
    let third = store
        .insert_order(NewOrder {
            client_id: client,
            seller_id: None,
            items: vec![NewLineItem::new(product.id, 1, Money::from_cents(500))],
        })
        .await
        .unwrap();

    let by_client = store
        .list_orders(OrderFilter::Client(client), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(by_client.total, 2);
    assert_eq!(by_client.items[0].id, third.id);
    assert_eq!(by_client.items[1].id, first.id);
    assert_eq!(by_client.items[1].items.len(), 1);

    let by_seller = store
        .list_orders(OrderFilter::Seller(seller), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(by_seller.total, 1);

    let second_page = store
        .list_orders(OrderFilter::All, PageRequest::new(2, 2))
        .await
        .unwrap();
    assert_eq!(second_page.total, 3);
    assert_eq!(second_page.items.len(), 1);
    assert_eq!(second_page.items[0].id, first.id);
}

#[tokio::test]
#[serial]
async fn payments_never_exceed_order_total() {
    let store = get_test_store().await;
    let product = create_product(&store, "Coffee", 10).await;
    let order = store
        .insert_order(order_of(vec![NewLineItem::new(
            product.id,
            2,
            Money::from_cents(500),
        )]))
        .await
        .unwrap();

    let first = store
        .insert_payment(NewPayment {
            order_id: order.id,
            method_id: None,
            amount: Money::from_cents(600),
        })
        .await
        .unwrap();

    let err = store
        .insert_payment(NewPayment {
            order_id: order.id,
            method_id: None,
            amount: Money::from_cents(500),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::OverPayment { .. }));

    // The payment being edited does not count against itself.
    store
        .update_payment(
            first.id,
            PaymentChanges {
                amount: Some(Money::from_cents(1000)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(store.total_paid(order.id).await.unwrap().cents(), 1000);

    store.delete_payment(first.id).await.unwrap();
    assert!(store.total_paid(order.id).await.unwrap().is_zero());
}

#[tokio::test]
#[serial]
async fn concurrent_payments_respect_total() {
    let store = get_test_store().await;
    let product = create_product(&store, "Cocoa", 10).await;
    let order = store
        .insert_order(order_of(vec![NewLineItem::new(
            product.id,
            1,
            Money::from_cents(1000),
        )]))
        .await
        .unwrap();

    let attempts = (0..8).map(|_| {
        let store = store.clone();
        let order_id = order.id;
        tokio::spawn(async move {
            store
                .insert_payment(NewPayment {
                    order_id,
                    method_id: None,
                    amount: Money::from_cents(300),
                })
                .await
        })
    });
    join_all(attempts).await;

    let paid = store.total_paid(order.id).await.unwrap();
    assert_eq!(paid.cents(), 900);
    assert_eq!(store.payments_for_order(order.id).await.unwrap().len(), 3);
}

#[tokio::test]
#[serial]
async fn payment_methods_are_unique_and_detach_on_delete() {
    let store = get_test_store().await;
    let product = create_product(&store, "Rice", 10).await;
    let order = store
        .insert_order(order_of(vec![NewLineItem::new(
            product.id,
            1,
            Money::from_cents(1000),
        )]))
        .await
        .unwrap();

    let cash = store.insert_payment_method("cash").await.unwrap();
    store.insert_payment_method("card").await.unwrap();
    assert!(matches!(
        store.insert_payment_method("cash").await,
        Err(StoreError::UniqueViolation(_))
    ));
    assert!(matches!(
        store.rename_payment_method(cash.id, "card").await,
        Err(StoreError::UniqueViolation(_))
    ));

    let names: Vec<_> = store
        .list_payment_methods()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["card", "cash"]);

    let payment = store
        .insert_payment(NewPayment {
            order_id: order.id,
            method_id: Some(cash.id),
            amount: Money::from_cents(100),
        })
        .await
        .unwrap();
    store.delete_payment_method(cash.id).await.unwrap();

    let payment = store.find_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(payment.method_id, None);
}

#[tokio::test]
#[serial]
async fn reviews_are_unique_per_client_and_product() {
    let store = get_test_store().await;
    let product = create_product(&store, "Honey", 10).await;
    let client = UserId::new();

    let review = store
        .insert_review(NewReview {
            product_id: product.id,
            client_id: client,
            rating: 4,
            comment: "Good".to_string(),
        })
        .await
        .unwrap();
    assert!(store.review_exists(client, product.id).await.unwrap());

    let duplicate = store
        .insert_review(NewReview {
            product_id: product.id,
            client_id: client,
            rating: 2,
            comment: String::new(),
        })
        .await;
    assert!(matches!(duplicate, Err(StoreError::UniqueViolation(_))));

    store
        .insert_review(NewReview {
            product_id: product.id,
            client_id: UserId::new(),
            rating: 1,
            comment: String::new(),
        })
        .await
        .unwrap();

    let summary = store.rating_summary(product.id).await.unwrap();
    assert_eq!(summary.count, 2);
    assert!((summary.average - 2.5).abs() < f64::EPSILON);

    let updated = store
        .update_review(
            review.id,
            ReviewChanges {
                rating: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.rating, 5);
    assert_eq!(updated.comment, "Good");

    let listed = store
        .list_reviews(Some(product.id), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 2);

    let empty = store.rating_summary(create_product(&store, "New", 1).await.id).await.unwrap();
    assert_eq!(empty.count, 0);
    assert_eq!(empty.average, 0.0);
}

#[tokio::test]
#[serial]
async fn user_emails_are_unique_among_live_users() {
    let store = get_test_store().await;
    let ana = store
        .insert_user(NewUser {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
        })
        .await
        .unwrap();
    let bruno = store
        .insert_user(NewUser {
            name: "Bruno".to_string(),
            email: "bruno@example.com".to_string(),
        })
        .await
        .unwrap();

    let clash = store
        .update_user(
            bruno.id,
            UserChanges {
                email: Some("ana@example.com".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(clash, Err(StoreError::UniqueViolation(_))));

    store.delete_user(ana.id).await.unwrap();
    let moved = store
        .update_user(
            bruno.id,
            UserChanges {
                email: Some("ana@example.com".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.name, "Bruno");
    assert_eq!(
        store
            .find_user_by_email("ana@example.com")
            .await
            .unwrap()
            .unwrap()
            .id,
        bruno.id
    );

    let users = store.list_users(PageRequest::default()).await.unwrap();
    assert_eq!(users.total, 1);
}
