//! Product reviews: one per client and product.

use common::{Page, PageRequest, ProductId, ReviewId, UserId};
use store::{
    NewReview, ProductRepository, RatingSummary, Review, ReviewChanges, ReviewRepository,
    StoreError,
};

use crate::DomainError;
use crate::validate;

const MAX_COMMENT_CHARS: usize = 500;

/// Command to review a product.
#[derive(Debug, Clone)]
pub struct CreateReview {
    pub product_id: ProductId,
    pub client_id: UserId,
    pub rating: u8,
    pub comment: String,
}

/// Command to change a review. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct UpdateReview {
    pub rating: Option<u8>,
    pub comment: Option<String>,
}

/// Service for product reviews.
pub struct ReviewService<S> {
    store: S,
}

impl<S: ProductRepository + ReviewRepository> ReviewService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, cmd: CreateReview) -> Result<Review, DomainError> {
        validate::rating(cmd.rating)?;
        validate::max_length("comment", &cmd.comment, MAX_COMMENT_CHARS)?;

        let duplicate = || DomainError::DuplicateReview {
            client_id: cmd.client_id,
            product_id: cmd.product_id,
        };

        if self.store.find_product(cmd.product_id).await?.is_none() {
            return Err(DomainError::not_found("Product", cmd.product_id));
        }
        if self
            .store
            .review_exists(cmd.client_id, cmd.product_id)
            .await?
        {
            return Err(duplicate());
        }

        // A concurrent duplicate slips past the check above and is caught by
        // the unique index instead.
        let review = self
            .store
            .insert_review(NewReview {
                product_id: cmd.product_id,
                client_id: cmd.client_id,
                rating: cmd.rating,
                comment: cmd.comment.clone(),
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => duplicate(),
                other => other.into(),
            })?;

        metrics::counter!("reviews_created_total").increment(1);
        tracing::info!(review_id = %review.id, product_id = %review.product_id, "review created");
        Ok(review)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: ReviewId) -> Result<Review, DomainError> {
        self.store
            .find_review(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Review", id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: ReviewId, cmd: UpdateReview) -> Result<Review, DomainError> {
        if let Some(rating) = cmd.rating {
            validate::rating(rating)?;
        }
        if let Some(comment) = &cmd.comment {
            validate::max_length("comment", comment, MAX_COMMENT_CHARS)?;
        }

        Ok(self
            .store
            .update_review(
                id,
                ReviewChanges {
                    rating: cmd.rating,
                    comment: cmd.comment,
                },
            )
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: ReviewId) -> Result<(), DomainError> {
        Ok(self.store.delete_review(id).await?)
    }

    /// All reviews, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, page: PageRequest) -> Result<Page<Review>, DomainError> {
        Ok(self.store.list_reviews(None, page).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_for_product(
        &self,
        product_id: ProductId,
        page: PageRequest,
    ) -> Result<Page<Review>, DomainError> {
        Ok(self.store.list_reviews(Some(product_id), page).await?)
    }

    /// Average rating (0 without reviews) and review count.
    #[tracing::instrument(skip(self))]
    pub async fn rating_summary(
        &self,
        product_id: ProductId,
    ) -> Result<RatingSummary, DomainError> {
        Ok(self.store.rating_summary(product_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use common::Money;
    use store::{InMemoryStore, NewProduct};

    use super::*;

    async fn product(store: &InMemoryStore) -> ProductId {
        store
            .insert_product(NewProduct {
                name: "Coffee".to_string(),
                description: String::new(),
                price: Money::from_cents(900),
                expires_on: NaiveDate::from_ymd_opt(2031, 6, 1).unwrap(),
                stock: 3,
            })
            .await
            .unwrap()
            .id
    }

    fn review(product_id: ProductId, client_id: UserId, rating: u8) -> CreateReview {
        CreateReview {
            product_id,
            client_id,
            rating,
            comment: "fine".to_string(),
        }
    }

    #[tokio::test]
    async fn one_review_per_client_and_product() {
        let store = InMemoryStore::new();
        let product_id = product(&store).await;
        let service = ReviewService::new(store);
        let client = UserId::new();

        service
            .create(review(product_id, client, 4))
            .await
            .unwrap();

        assert!(matches!(
            service.create(review(product_id, client, 2)).await,
            Err(DomainError::DuplicateReview { .. })
        ));
        service
            .create(review(product_id, UserId::new(), 2))
            .await
            .unwrap();

        let summary = service.rating_summary(product_id).await.unwrap();
        assert_eq!(summary.count, 2);
        assert!((summary.average - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn rejects_bad_rating_and_long_comment() {
        let store = InMemoryStore::new();
        let product_id = product(&store).await;
        let service = ReviewService::new(store);

        for rating in [0, 6] {
            assert!(matches!(
                service.create(review(product_id, UserId::new(), rating)).await,
                Err(DomainError::Validation(_))
            ));
        }

        let mut long = review(product_id, UserId::new(), 3);
        long.comment = "x".repeat(MAX_COMMENT_CHARS + 1);
        assert!(matches!(
            service.create(long).await,
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let service = ReviewService::new(InMemoryStore::new());

        let err = service
            .create(review(ProductId::new(), UserId::new(), 5))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn summary_without_reviews_is_zero() {
        let store = InMemoryStore::new();
        let product_id = product(&store).await;
        let service = ReviewService::new(store);

        let summary = service.rating_summary(product_id).await.unwrap();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.average, 0.0);
    }

    #[tokio::test]
    async fn update_keeps_untouched_fields() {
        let store = InMemoryStore::new();
        let product_id = product(&store).await;
        let service = ReviewService::new(store);
        let created = service
            .create(review(product_id, UserId::new(), 4))
            .await
            .unwrap();

        let updated = service
            .update(
                created.id,
                UpdateReview {
                    rating: Some(5),
                    comment: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.rating, 5);
        assert_eq!(updated.comment, "fine");
        assert!(matches!(
            service
                .update(
                    created.id,
                    UpdateReview {
                        rating: Some(9),
                        comment: None,
                    },
                )
                .await,
            Err(DomainError::Validation(_))
        ));
    }
}
