//! User registry: the clients and sellers orders and reviews refer to.

use common::{Page, PageRequest, UserId};
use store::{NewUser, StoreError, User, UserChanges, UserRepository};

use crate::DomainError;
use crate::validate;

#[derive(Debug, Clone)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
}

/// Command to change a user. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
}

fn email_taken(email: &str) -> DomainError {
    DomainError::AlreadyExists(format!("email {email} is already registered"))
}

fn map_unique(email: &str) -> impl FnOnce(StoreError) -> DomainError + '_ {
    move |e| match e {
        StoreError::UniqueViolation(_) => email_taken(email),
        other => other.into(),
    }
}

pub struct UserService<S> {
    store: S,
}

impl<S: UserRepository> UserService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn register(&self, cmd: RegisterUser) -> Result<User, DomainError> {
        validate::length("name", &cmd.name, 2, 100)?;
        validate::email(&cmd.email)?;

        if self.store.find_user_by_email(&cmd.email).await?.is_some() {
            return Err(email_taken(&cmd.email));
        }

        let user = self
            .store
            .insert_user(NewUser {
                name: cmd.name,
                email: cmd.email.clone(),
            })
            .await
            .map_err(map_unique(&cmd.email))?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: UserId) -> Result<User, DomainError> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| DomainError::not_found("User", id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_email(&self, email: &str) -> Result<User, DomainError> {
        self.store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| DomainError::not_found("User", email))
    }

    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: UserId, cmd: UpdateUser) -> Result<User, DomainError> {
        if let Some(name) = &cmd.name {
            validate::length("name", name, 2, 100)?;
        }
        if let Some(email) = &cmd.email {
            validate::email(email)?;
            if let Some(existing) = self.store.find_user_by_email(email).await?
                && existing.id != id
            {
                return Err(email_taken(email));
            }
        }

        let email = cmd.email.clone().unwrap_or_default();
        Ok(self
            .store
            .update_user(
                id,
                UserChanges {
                    name: cmd.name,
                    email: cmd.email,
                },
            )
            .await
            .map_err(map_unique(&email))?)
    }

    /// Soft-deletes the user. The email becomes free to register again.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: UserId) -> Result<(), DomainError> {
        self.store.delete_user(id).await?;
        tracing::info!(user_id = %id, "user deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, page: PageRequest) -> Result<Page<User>, DomainError> {
        Ok(self.store.list_users(page).await?)
    }
}
