//! Product catalog and stock ledger.

use chrono::{Days, NaiveDate, Utc};
use common::{Money, Page, PageRequest, ProductId};
use store::{NewProduct, Product, ProductChanges, ProductRepository};

use crate::DomainError;
use crate::validate;

/// Window used by `expiring_within` when the caller asks for less than a day.
pub const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 7;

/// Command to add a product to the catalog.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub expires_on: NaiveDate,
    pub stock: i64,
}

/// Command to change some fields of a product. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub expires_on: Option<NaiveDate>,
    pub stock: Option<i64>,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn check_not_expired(expires_on: NaiveDate) -> Result<(), DomainError> {
    if expires_on < today() {
        return Err(DomainError::validation(format!(
            "expiration date {expires_on} is in the past"
        )));
    }
    Ok(())
}

/// Service for the product catalog.
pub struct ProductService<S> {
    store: S,
}

impl<S: ProductRepository> ProductService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, cmd: CreateProduct) -> Result<Product, DomainError> {
        validate::length("name", &cmd.name, 1, 100)?;
        validate::non_negative("price", cmd.price)?;
        validate::stock(cmd.stock)?;
        check_not_expired(cmd.expires_on)?;

        let product = self
            .store
            .insert_product(NewProduct {
                name: cmd.name,
                description: cmd.description,
                price: cmd.price,
                expires_on: cmd.expires_on,
                stock: cmd.stock,
            })
            .await?;

        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: ProductId) -> Result<Product, DomainError> {
        self.store
            .find_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_name(&self, name: &str) -> Result<Product, DomainError> {
        self.store
            .find_product_by_name(name)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", name))
    }

    #[tracing::instrument(skip(self))]
    pub async fn expiring_on(&self, date: NaiveDate) -> Result<Vec<Product>, DomainError> {
        Ok(self.store.products_expiring_on(date).await?)
    }

    /// Products expiring between today and `days` from now, both inclusive.
    /// `days < 1` falls back to [`DEFAULT_EXPIRY_WINDOW_DAYS`].
    #[tracing::instrument(skip(self))]
    pub async fn expiring_within(&self, days: i64) -> Result<Vec<Product>, DomainError> {
        let days = if days < 1 {
            DEFAULT_EXPIRY_WINDOW_DAYS
        } else {
            days
        };
        let from = today();
        let to = u64::try_from(days)
            .ok()
            .and_then(|d| from.checked_add_days(Days::new(d)))
            .unwrap_or(NaiveDate::MAX);

        Ok(self.store.products_expiring_between(from, to).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: ProductId, cmd: UpdateProduct) -> Result<Product, DomainError> {
        if let Some(name) = &cmd.name {
            validate::length("name", name, 1, 100)?;
        }
        if let Some(price) = cmd.price {
            validate::non_negative("price", price)?;
        }
        if let Some(stock) = cmd.stock {
            validate::stock(stock)?;
        }
        if let Some(expires_on) = cmd.expires_on {
            check_not_expired(expires_on)?;
        }

        let changes = ProductChanges {
            name: cmd.name,
            description: cmd.description,
            price: cmd.price,
            expires_on: cmd.expires_on,
            stock: cmd.stock,
        };
        if changes.is_empty() {
            return self.get(id).await;
        }

        Ok(self.store.update_product(id, changes).await?)
    }

    /// Soft-deletes the product.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: ProductId) -> Result<(), DomainError> {
        self.store.delete_product(id).await?;
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, page: PageRequest) -> Result<Page<Product>, DomainError> {
        Ok(self.store.list_products(page).await?)
    }

    /// Moves stock by a signed delta on behalf of an operator.
    ///
    /// Negative deltas go through the guarded consumption, so this never takes
    /// stock below zero. Returns the new stock.
    #[tracing::instrument(skip(self))]
    pub async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<i64, DomainError> {
        validate::stock_delta(delta)?;

        let stock = if delta < 0 {
            self.store.consume_stock(id, -delta).await?
        } else {
            self.store.adjust_stock(id, delta).await?
        };
        Ok(stock)
    }
}

#[cfg(test)]
mod tests {
    use store::InMemoryStore;

    use super::*;

    fn create_cmd(name: &str, expires_on: NaiveDate) -> CreateProduct {
        CreateProduct {
            name: name.to_string(),
            description: String::new(),
            price: Money::from_cents(199),
            expires_on,
            stock: 5,
        }
    }

    fn days_from_now(days: u64) -> NaiveDate {
        today().checked_add_days(Days::new(days)).unwrap()
    }

    #[tokio::test]
    async fn create_rejects_past_expiration_and_bad_names() {
        let service = ProductService::new(InMemoryStore::new());
        let yesterday = today().pred_opt().unwrap();

        assert!(matches!(
            service.create(create_cmd("Milk", yesterday)).await,
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            service.create(create_cmd("", days_from_now(3))).await,
            Err(DomainError::Validation(_))
        ));
        assert!(service.create(create_cmd("Milk", today())).await.is_ok());
    }

    #[tokio::test]
    async fn update_sets_zero_values_explicitly() {
        let service = ProductService::new(InMemoryStore::new());
        let product = service
            .create(create_cmd("Milk", days_from_now(10)))
            .await
            .unwrap();

        let updated = service
            .update(
                product.id,
                UpdateProduct {
                    price: Some(Money::zero()),
                    stock: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(updated.price.is_zero());
        assert_eq!(updated.stock, 0);
        assert_eq!(updated.name, "Milk");
    }

    #[tokio::test]
    async fn expiring_within_defaults_to_a_week() {
        let service = ProductService::new(InMemoryStore::new());
        service
            .create(create_cmd("soon", days_from_now(6)))
            .await
            .unwrap();
        service
            .create(create_cmd("later", days_from_now(12)))
            .await
            .unwrap();

        let names: Vec<_> = service
            .expiring_within(0)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["soon"]);

        assert_eq!(service.expiring_within(12).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn operator_stock_adjustment_is_guarded() {
        let service = ProductService::new(InMemoryStore::new());
        let product = service
            .create(create_cmd("Milk", days_from_now(10)))
            .await
            .unwrap();

        assert_eq!(service.adjust_stock(product.id, 3).await.unwrap(), 8);
        assert!(matches!(
            service.adjust_stock(product.id, -9).await,
            Err(DomainError::InsufficientStock {
                available: 8,
                requested: 9,
                ..
            })
        ));
        assert_eq!(service.adjust_stock(product.id, -8).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleted_product_is_not_found() {
        let service = ProductService::new(InMemoryStore::new());
        let product = service
            .create(create_cmd("Milk", days_from_now(10)))
            .await
            .unwrap();

        service.delete(product.id).await.unwrap();

        assert!(service.get(product.id).await.unwrap_err().is_not_found());
        assert!(service.get_by_name("Milk").await.unwrap_err().is_not_found());
    }
}
