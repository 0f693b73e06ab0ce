use chrono::{Days, Utc};
use common::{Money, ProductId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    AddLineItem, CreateOrder, CreateProduct, OrderLine, OrderService, PaymentService,
    ProductService, RecordPayment, UpdateLineItem,
};
use store::InMemoryStore;

async fn stocked_product(store: &InMemoryStore, stock: i64) -> ProductId {
    ProductService::new(store.clone())
        .create(CreateProduct {
            name: "Benchmark Widget".to_string(),
            description: String::new(),
            price: Money::from_cents(1000),
            expires_on: Utc::now().date_naive() + Days::new(365),
            stock,
        })
        .await
        .unwrap()
        .id
}

fn bench_create_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let product_id = rt.block_on(stocked_product(&store, i64::MAX / 2));
    let service = OrderService::new(store);

    c.bench_function("domain/create_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let line = OrderLine::new(product_id, 1, Money::from_cents(1000));
                service
                    .create_order(CreateOrder::new(UserId::new(), vec![line]))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_add_item(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let product_id = rt.block_on(stocked_product(&store, i64::MAX / 2));
    let service = OrderService::new(store);
    let order_id = rt.block_on(async {
        let line = OrderLine::new(product_id, 1, Money::from_cents(1000));
        service
            .create_order(CreateOrder::new(UserId::new(), vec![line]))
            .await
            .unwrap()
            .id
    });

    c.bench_function("domain/add_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                let line = OrderLine::new(product_id, 1, Money::from_cents(1000));
                service
                    .add_item(AddLineItem::new(order_id, line))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_order_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/create_update_pay_delete", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStore::new();
                let product_id = stocked_product(&store, 100).await;
                let orders = OrderService::new(store.clone());
                let payments = PaymentService::new(store);

                let order = orders
                    .create_order(CreateOrder::new(
                        UserId::new(),
                        vec![OrderLine::new(product_id, 5, Money::from_cents(1000))],
                    ))
                    .await
                    .unwrap();
                orders
                    .update_item(UpdateLineItem::quantity(order.id, order.items[0].id, 3))
                    .await
                    .unwrap();
                payments
                    .record_payment(RecordPayment::new(order.id, Money::from_cents(3000)))
                    .await
                    .unwrap();
                orders.delete_order(order.id).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_create_order, bench_add_item, bench_order_cycle);
criterion_main!(benches);
