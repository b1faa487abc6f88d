use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use crate::{
    error::AppError,
    identity::Actor,
    models::Account,
    state::AppState,
    utils::bearer_token,
};

/// Caller resolved from the bearer token.
pub struct AuthActor(pub Actor);

impl FromRequestParts<Arc<AppState>> for AuthActor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthenticated)?;

        let actor = state
            .identity
            .resolve(token)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        Ok(Self(actor))
    }
}

/// Caller whose profile carries the admin role.
pub struct AdminActor {
    pub actor: Actor,
    pub account: Account,
}

impl FromRequestParts<Arc<AppState>> for AdminActor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthActor(actor) = AuthActor::from_request_parts(parts, state).await?;

        match state.store.account_by_user(actor.id).await? {
            Some(account) if account.is_admin() => Ok(Self { actor, account }),
            _ => {
                warn!(user_id = %actor.id, "Rejected non-admin caller");
                Err(AppError::Forbidden)
            }
        }
    }
}
