use std::sync::Arc;

use anyhow::Context;
use tracing::{info, instrument, warn};

use crate::auth::password::{hash_password, verify_password, DUMMY_HASH};
use crate::auth::repo::UserRepo;
use crate::auth::repo_types::{NewUser, User};
use crate::auth::validation::{validate_registration, Registration, ValidationRules};
use crate::error::{AppError, AppResult};

/// Registry of users and the check of a claimed password against it.
#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn UserRepo>,
    rules: ValidationRules,
}

impl CredentialStore {
    pub fn new(repo: Arc<dyn UserRepo>, rules: ValidationRules) -> Self {
        Self { repo, rules }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    #[instrument(skip(self, reg), fields(username = %reg.username))]
    pub async fn register(&self, reg: Registration<'_>) -> AppResult<User> {
        if let Err(e) = validate_registration(&self.rules, &reg) {
            warn!(error = %e, "registration rejected");
            return Err(e);
        }

        let password = reg.password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .context("join hash task")??;

        let user = self
            .repo
            .insert(NewUser {
                username: reg.username.to_owned(),
                email: reg.email.to_owned(),
                password_hash,
            })
            .await
            .map_err(|e| {
                if matches!(e, AppError::DuplicateUsername | AppError::DuplicateEmail) {
                    warn!(error = %e, "registration conflict");
                }
                e
            })?;

        info!(user_id = user.id, "user registered");
        Ok(user)
    }

    /// Unknown usernames and wrong passwords fail the same way.
    #[instrument(skip(self, password))]
    pub async fn verify(&self, username: &str, password: &str) -> AppResult<User> {
        let found = self.repo.find_by_username(username).await?;
        let hash = match &found {
            Some(u) => u.password_hash.clone(),
            None => DUMMY_HASH.clone(),
        };

        let password = password.to_owned();
        let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .context("join verify task")??;

        match found {
            Some(user) if ok => {
                info!(user_id = user.id, "credentials verified");
                Ok(user)
            }
            _ => {
                warn!("login rejected");
                Err(AppError::InvalidCredentials)
            }
        }
    }
}
