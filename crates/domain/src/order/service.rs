//! Order service: the order/inventory consistency rules.

use std::collections::HashMap;

use common::{LineItemId, OrderId, Page, PageRequest, ProductId, UserId};
use store::{
    LineItem, NewLineItem, NewOrder, Order, OrderFilter, OrderRepository, Product,
    ProductRepository,
};

use crate::DomainError;
use crate::validate;

use super::{AddLineItem, AssignSeller, CreateOrder, RemoveLineItem, UpdateLineItem};

/// Service for managing orders.
///
/// Every stock movement that belongs to an order change is committed by the
/// store together with that change, through the guarded consumption. The
/// stock checks made here beforehand only produce early, descriptive errors;
/// the store re-checks under its own atomicity.
pub struct OrderService<S> {
    store: S,
}

impl<S: ProductRepository + OrderRepository> OrderService<S> {
    /// Creates a new order service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn product_with_stock(
        &self,
        product_id: ProductId,
        requested: i64,
    ) -> Result<Product, DomainError> {
        let product = self
            .store
            .find_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", product_id))?;

        if product.stock < requested {
            return Err(DomainError::InsufficientStock {
                product_id,
                available: product.stock,
                requested,
            });
        }
        Ok(product)
    }

    async fn owned_item(
        &self,
        order_id: OrderId,
        item_id: LineItemId,
    ) -> Result<LineItem, DomainError> {
        let item = self
            .store
            .find_line_item(item_id)
            .await?
            .ok_or_else(|| DomainError::not_found("LineItem", item_id))?;

        if item.order_id != order_id {
            return Err(DomainError::OwnershipMismatch { item_id, order_id });
        }
        Ok(item)
    }

    /// Places an order, consuming stock for every line.
    ///
    /// Either the order, all its items and all their stock consumption are
    /// persisted, or nothing is.
    #[tracing::instrument(skip(self))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, DomainError> {
        if cmd.items.is_empty() {
            return Err(DomainError::validation("an order needs at least one item"));
        }

        let mut requested: HashMap<ProductId, i64> = HashMap::new();
        for line in &cmd.items {
            validate::quantity(line.quantity)?;
            validate::non_negative("unit price", line.unit_price)?;

            let total = requested.entry(line.product_id).or_insert(0);
            *total += i64::from(line.quantity);
            self.product_with_stock(line.product_id, *total).await?;
        }
        validate::order_total(cmd.items.iter().map(|line| (line.quantity, line.unit_price)))?;

        let order = self
            .store
            .insert_order(NewOrder {
                client_id: cmd.client_id,
                seller_id: cmd.seller_id,
                items: cmd
                    .items
                    .into_iter()
                    .map(|line| NewLineItem::new(line.product_id, line.quantity, line.unit_price))
                    .collect(),
            })
            .await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            total = %order.total(),
            items = order.items.len(),
            "order created"
        );
        Ok(order)
    }

    /// Loads an order by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", order_id))
    }

    /// Orders newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, page: PageRequest) -> Result<Page<Order>, DomainError> {
        Ok(self.store.list_orders(OrderFilter::All, page).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_by_client(
        &self,
        client_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Order>, DomainError> {
        Ok(self
            .store
            .list_orders(OrderFilter::Client(client_id), page)
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_by_seller(
        &self,
        seller_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Order>, DomainError> {
        Ok(self
            .store
            .list_orders(OrderFilter::Seller(seller_id), page)
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn assign_seller(&self, cmd: AssignSeller) -> Result<Order, DomainError> {
        Ok(self
            .store
            .set_order_seller(cmd.order_id, cmd.seller_id)
            .await?)
    }

    /// Adds a line item to an existing order, consuming its stock.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, cmd: AddLineItem) -> Result<LineItem, DomainError> {
        validate::quantity(cmd.line.quantity)?;
        validate::non_negative("unit price", cmd.line.unit_price)?;

        let order = self.get_order(cmd.order_id).await?;
        validate::order_total(
            order
                .items
                .iter()
                .map(|item| (item.quantity, item.unit_price))
                .chain([(cmd.line.quantity, cmd.line.unit_price)]),
        )?;
        self.product_with_stock(cmd.line.product_id, i64::from(cmd.line.quantity))
            .await?;

        let item = self
            .store
            .insert_line_item(
                cmd.order_id,
                NewLineItem::new(cmd.line.product_id, cmd.line.quantity, cmd.line.unit_price),
            )
            .await?;

        tracing::info!(order_id = %cmd.order_id, item_id = %item.id, "line item added");
        Ok(item)
    }

    /// Changes a line item's quantity and/or price.
    ///
    /// Growing the quantity consumes the difference from stock; shrinking it
    /// returns the difference.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(&self, cmd: UpdateLineItem) -> Result<LineItem, DomainError> {
        if let Some(quantity) = cmd.quantity {
            validate::quantity(quantity)?;
        }
        if let Some(unit_price) = cmd.unit_price {
            validate::non_negative("unit price", unit_price)?;
        }

        let item = self.owned_item(cmd.order_id, cmd.item_id).await?;
        let quantity = cmd.quantity.unwrap_or(item.quantity);
        let unit_price = cmd.unit_price.unwrap_or(item.unit_price);

        let order = self.get_order(cmd.order_id).await?;
        validate::order_total(order.items.iter().map(|line| {
            if line.id == cmd.item_id {
                (quantity, unit_price)
            } else {
                (line.quantity, line.unit_price)
            }
        }))?;

        let delta = i64::from(quantity) - i64::from(item.quantity);
        if delta > 0 {
            self.product_with_stock(item.product_id, delta).await?;
        }

        let item = self
            .store
            .update_line_item(cmd.item_id, quantity, unit_price)
            .await?;

        tracing::info!(order_id = %cmd.order_id, item_id = %item.id, delta, "line item updated");
        Ok(item)
    }

    /// Removes a line item and returns its full quantity to stock.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, cmd: RemoveLineItem) -> Result<(), DomainError> {
        self.owned_item(cmd.order_id, cmd.item_id).await?;
        self.store.delete_line_item(cmd.item_id).await?;

        tracing::info!(order_id = %cmd.order_id, item_id = %cmd.item_id, "line item removed");
        Ok(())
    }

    /// Deletes an order after returning every item's quantity to stock.
    ///
    /// A restoration that fails is logged and counted, and does not stop the
    /// remaining restorations or the deletion itself.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, order_id: OrderId) -> Result<(), DomainError> {
        let order = self.get_order(order_id).await?;

        for item in &order.items {
            if let Err(e) = self
                .store
                .adjust_stock(item.product_id, i64::from(item.quantity))
                .await
            {
                metrics::counter!("stock_restore_failures_total").increment(1);
                tracing::warn!(
                    %order_id,
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    error = %e,
                    "failed to restore stock"
                );
            }
        }

        self.store.delete_order(order_id).await?;
        tracing::info!(%order_id, "order deleted");
        Ok(())
    }
}
