//! # Records
//!
//! Rows shared by the store implementations and the HTTP layer.
//!
//! - `profiles`: one row per actor, holds the points balance and role
//! - `game_history`: append-only, one row per settled round, cascades with its profile
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Client,
    Admin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "game_outcome", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

#[derive(Clone, Debug, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub newsletter: bool,
    pub marketing: bool,
    pub balance: i64,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Immutable audit row for one settled round.
#[derive(Clone, Debug, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub result: Outcome,
    pub number: i32,
    pub balance_change: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewAccount {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub role: Role,
    pub balance: i64,
}

impl NewAccount {
    pub fn into_account(self, now: DateTime<Utc>) -> Account {
        Account {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            email: self.email,
            full_name: self.full_name,
            phone_number: self.phone_number,
            bio: None,
            website: None,
            newsletter: false,
            marketing: false,
            balance: self.balance,
            role: self.role,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields an actor may change on their own profile.
#[derive(Clone, Debug)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub phone_number: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub newsletter: bool,
    pub marketing: bool,
}

/// Administrative override, including the balance.
#[derive(Clone, Debug)]
pub struct AccountOverride {
    pub full_name: String,
    pub phone_number: String,
    pub balance: i64,
    pub role: Role,
}

/// Result of one committed round.
#[derive(Clone, Debug)]
pub struct Settlement {
    pub record: OutcomeRecord,
    pub new_balance: i64,
}
