//! # Identity Provider
//!
//! Authentication is delegated to a Supabase (GoTrue) project. The backend never sees passwords
//! except when an administrator creates a user, and then only forwards them.
//!
//! ## Endpoints
//! - `GET /auth/v1/user`: resolve an access token, anon key
//! - `POST /auth/v1/admin/users`: create a pre-confirmed user, service role key
//! - `DELETE /auth/v1/admin/users/{id}`: delete a user, service role key
use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewIdentity {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone_number: String,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Rejected(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `None` when the token is missing, expired or unknown to the provider.
    async fn resolve(&self, token: &str) -> Result<Option<Actor>, IdentityError>;

    async fn create_user(&self, user: NewIdentity) -> Result<Actor, IdentityError>;

    /// Succeeds when the user is already gone.
    async fn delete_user(&self, id: Uuid) -> Result<(), IdentityError>;
}

#[derive(Deserialize)]
struct UserBody {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Metadata,
}

#[derive(Deserialize, Default)]
struct Metadata {
    full_name: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
}

impl From<UserBody> for Actor {
    fn from(body: UserBody) -> Self {
        Self {
            id: body.id,
            email: body.email.unwrap_or_default(),
            full_name: body.user_metadata.full_name,
        }
    }
}

pub struct SupabaseIdentity {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

impl SupabaseIdentity {
    pub fn new(base_url: &str, anon_key: String, service_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            service_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1{path}", self.base_url)
    }
}

async fn rejection(response: Response) -> IdentityError {
    let status = response.status();
    let body: ErrorBody = response.json().await.unwrap_or_default();

    let message = body
        .msg
        .or(body.message)
        .or(body.error_description)
        .unwrap_or_else(|| format!("Identity provider returned {status}"));

    IdentityError::Rejected(message)
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn resolve(&self, token: &str) -> Result<Option<Actor>, IdentityError> {
        let response = self
            .client
            .get(self.url("/user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<UserBody>().await?.into())),
            _ => Err(rejection(response).await),
        }
    }

    async fn create_user(&self, user: NewIdentity) -> Result<Actor, IdentityError> {
        let response = self
            .client
            .post(self.url("/admin/users"))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&json!({
                "email": user.email,
                "password": user.password,
                "email_confirm": true,
                "user_metadata": {
                    "full_name": user.full_name,
                    "phone_number": user.phone_number,
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let actor: Actor = response.json::<UserBody>().await?.into();
        info!(user_id = %actor.id, "Created identity");

        Ok(actor)
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), IdentityError> {
        let response = self
            .client
            .delete(self.url(&format!("/admin/users/{id}")))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                warn!(user_id = %id, "Identity already deleted");
                Ok(())
            }
            status if status.is_success() => Ok(()),
            _ => Err(rejection(response).await),
        }
    }
}

/// Fixed token table. Backs `--memory` runs and the test suites.
#[derive(Default)]
pub struct StaticIdentity {
    tokens: RwLock<HashMap<String, Actor>>,
    users: RwLock<HashMap<Uuid, Actor>>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, token: &str, actor: Actor) -> Self {
        self.insert(token, actor);
        self
    }

    pub fn insert(&self, token: &str, actor: Actor) {
        if let Ok(mut users) = self.users.write() {
            users.insert(actor.id, actor.clone());
        }
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(token.to_string(), actor);
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.users.read().is_ok_and(|users| users.contains_key(&id))
    }
}

fn poisoned<T>(_: T) -> IdentityError {
    IdentityError::Rejected("identity table poisoned".to_string())
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn resolve(&self, token: &str) -> Result<Option<Actor>, IdentityError> {
        let tokens = self.tokens.read().map_err(poisoned)?;
        let users = self.users.read().map_err(poisoned)?;

        Ok(tokens
            .get(token)
            .filter(|actor| users.contains_key(&actor.id))
            .cloned())
    }

    async fn create_user(&self, user: NewIdentity) -> Result<Actor, IdentityError> {
        let mut users = self.users.write().map_err(poisoned)?;

        if users.values().any(|actor| actor.email == user.email) {
            return Err(IdentityError::Rejected(
                "A user with this email address has already been registered".to_string(),
            ));
        }

        let actor = Actor {
            id: Uuid::new_v4(),
            email: user.email,
            full_name: Some(user.full_name),
        };
        users.insert(actor.id, actor.clone());

        Ok(actor)
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), IdentityError> {
        self.users.write().map_err(poisoned)?.remove(&id);

        Ok(())
    }
}
