use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{AdminActor, AuthActor},
    error::AppError,
    game::{PlayResult, RECENT_HISTORY, play},
    identity::IdentityError,
    models::{Account, NewAccount, OutcomeRecord, Role},
    payloads::{AdminCreatePayload, AdminUserPayload, ProfilePayload},
    state::AppState,
};

type Shared = State<Arc<AppState>>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|_| AppError::MalformedPayload)
}

fn profile_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path
        .map(|Path(id)| id)
        .map_err(|_| AppError::MalformedPayload)
}

async fn own_account(state: &AppState, user_id: Uuid) -> Result<Account, AppError> {
    state
        .store
        .account_by_user(user_id)
        .await?
        .ok_or(AppError::NotFound("Profile not found"))
}

pub async fn play_handler(
    State(state): Shared,
    AuthActor(actor): AuthActor,
) -> Result<Json<PlayResult>, AppError> {
    let result = play(state.store.clone(), state.dice.as_ref(), actor.id).await?;

    Ok(Json(result))
}

#[derive(Serialize)]
pub struct GameHistory {
    balance: i64,
    history: Vec<OutcomeRecord>,
}

pub async fn history_handler(
    State(state): Shared,
    AuthActor(actor): AuthActor,
) -> Result<Json<GameHistory>, AppError> {
    let account = own_account(&state, actor.id).await?;
    let history = state
        .store
        .history(account.id, Some(RECENT_HISTORY))
        .await?;

    Ok(Json(GameHistory {
        balance: account.balance,
        history,
    }))
}

pub async fn profile_handler(
    State(state): Shared,
    AuthActor(actor): AuthActor,
) -> Result<Json<Account>, AppError> {
    Ok(Json(own_account(&state, actor.id).await?))
}

/// Creates the caller's profile on first sign-in, otherwise returns the existing one.
pub async fn provision_handler(
    State(state): Shared,
    AuthActor(actor): AuthActor,
) -> Result<impl IntoResponse, AppError> {
    if let Some(account) = state.store.account_by_user(actor.id).await? {
        return Ok((StatusCode::OK, Json(account)));
    }

    let created = state
        .store
        .insert_account(NewAccount {
            user_id: actor.id,
            email: actor.email.clone(),
            full_name: actor.full_name.clone(),
            phone_number: None,
            role: Role::Client,
            balance: 0,
        })
        .await;

    match created {
        Ok(account) => {
            info!(user_id = %actor.id, "Provisioned profile");
            Ok((StatusCode::CREATED, Json(account)))
        }
        // lost a race against a concurrent first sign-in
        Err(e) => match state.store.account_by_user(actor.id).await? {
            Some(account) => Ok((StatusCode::OK, Json(account))),
            None => Err(e.into()),
        },
    }
}

pub async fn update_profile_handler(
    State(state): Shared,
    AuthActor(actor): AuthActor,
    payload: Result<Json<ProfilePayload>, JsonRejection>,
) -> Result<Json<Account>, AppError> {
    let update = body(payload)?.validate()?;

    let account = state
        .store
        .update_profile(actor.id, update)
        .await?
        .ok_or(AppError::NotFound("Profile not found"))?;

    Ok(Json(account))
}

pub async fn list_users_handler(
    State(state): Shared,
    admin: AdminActor,
) -> Result<Json<Vec<Account>>, AppError> {
    Ok(Json(state.store.accounts_except(admin.actor.id).await?))
}

pub async fn create_user_handler(
    State(state): Shared,
    admin: AdminActor,
    payload: Result<Json<AdminCreatePayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let (identity, account) = body(payload)?.validate()?;

    if state.store.account_by_email(&identity.email).await?.is_some() {
        return Err(AppError::Conflict(
            "A user with this email already exists.".to_string(),
        ));
    }

    let actor = state
        .identity
        .create_user(identity)
        .await
        .map_err(|e| match e {
            IdentityError::Rejected(message) => AppError::BadRequest(message),
            other => other.into(),
        })?;

    let inserted = state
        .store
        .insert_account(NewAccount {
            user_id: actor.id,
            email: actor.email,
            full_name: Some(account.full_name),
            phone_number: Some(account.phone_number),
            role: account.role,
            balance: account.balance,
        })
        .await;

    // an identity without a profile would block every later attempt with this email
    let created = match inserted {
        Ok(created) => created,
        Err(e) => {
            warn!(user_id = %actor.id, "Profile insert failed, removing new identity: {e}");
            if let Err(undo) = state.identity.delete_user(actor.id).await {
                error!(user_id = %actor.id, "Failed to remove orphaned identity: {undo}");
            }
            return Err(e.into());
        }
    };

    info!(admin = %admin.actor.id, user_id = %created.user_id, "Admin created user");

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_user_handler(
    State(state): Shared,
    admin: AdminActor,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AdminUserPayload>, JsonRejection>,
) -> Result<Json<Account>, AppError> {
    let id = profile_id(path)?;
    let update = body(payload)?.validate()?;

    let account = state
        .store
        .override_account(id, update)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;

    info!(
        admin = %admin.actor.id,
        profile_id = %id,
        balance = account.balance,
        "Admin updated user"
    );

    Ok(Json(account))
}

pub async fn delete_user_handler(
    State(state): Shared,
    admin: AdminActor,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = profile_id(path)?;
    let target = state
        .store
        .account_by_id(id)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;

    if target.id == admin.account.id {
        return Err(AppError::BadRequest(
            "You cannot delete your own admin account.".to_string(),
        ));
    }

    state.identity.delete_user(target.user_id).await?;
    state.store.delete_account(target.id).await?;

    info!(admin = %admin.actor.id, profile_id = %id, "Admin deleted user");

    Ok(Json(json!({ "message": "User deleted." })))
}

pub async fn user_history_handler(
    State(state): Shared,
    _admin: AdminActor,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<OutcomeRecord>>, AppError> {
    let id = profile_id(path)?;

    Ok(Json(state.store.history(id, None).await?))
}
