//! Request bodies. Each payload validates itself and converts into the store's update type.
use serde::Deserialize;

use crate::{
    error::AppError,
    identity::NewIdentity,
    models::{AccountOverride, ProfileUpdate, Role},
    utils::{Validator, blank_to_none},
};

const MIN_NAME: usize = 2;
const MIN_PHONE: usize = 9;
const MAX_BIO: usize = 160;
const MIN_PASSWORD: usize = 6;

#[derive(Deserialize, Default)]
pub struct Preferences {
    #[serde(default)]
    pub newsletter: bool,
    #[serde(default)]
    pub marketing: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePayload {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
}

impl ProfilePayload {
    /// The email is checked for shape only, it is owned by the identity provider.
    pub fn validate(self) -> Result<ProfileUpdate, AppError> {
        let mut v = Validator::new();
        v.min_chars(
            "fullName",
            &self.full_name,
            MIN_NAME,
            "Full name must be at least 2 characters.",
        );
        v.email("email", &self.email);
        v.min_chars(
            "phoneNumber",
            &self.phone_number,
            MIN_PHONE,
            "Phone number must be at least 9 digits.",
        );

        let bio = blank_to_none(self.bio);
        if let Some(bio) = &bio {
            v.max_chars("bio", bio, MAX_BIO, "Bio must not exceed 160 characters.");
        }

        let website = blank_to_none(self.website);
        if let Some(website) = &website {
            v.url("website", website);
        }

        v.finish()?;

        Ok(ProfileUpdate {
            full_name: self.full_name.trim().to_string(),
            phone_number: self.phone_number.trim().to_string(),
            bio,
            website,
            newsletter: self.preferences.newsletter,
            marketing: self.preferences.marketing,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserPayload {
    pub full_name: String,
    pub phone_number: String,
    pub balance: i64,
    pub role: Role,
}

impl AdminUserPayload {
    fn check(&self, v: &mut Validator) {
        v.min_chars("fullName", &self.full_name, MIN_NAME, "Full name is required.");
        v.min_chars(
            "phoneNumber",
            &self.phone_number,
            MIN_PHONE,
            "Phone number is required.",
        );
        v.non_negative("balance", self.balance, "Balance must be a positive number.");
    }

    pub fn validate(self) -> Result<AccountOverride, AppError> {
        let mut v = Validator::new();
        self.check(&mut v);
        v.finish()?;

        Ok(AccountOverride {
            full_name: self.full_name.trim().to_string(),
            phone_number: self.phone_number.trim().to_string(),
            balance: self.balance,
            role: self.role,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCreatePayload {
    #[serde(flatten)]
    pub user: AdminUserPayload,
    pub email: String,
    pub password: String,
}

impl AdminCreatePayload {
    pub fn validate(self) -> Result<(NewIdentity, AccountOverride), AppError> {
        let mut v = Validator::new();
        self.user.check(&mut v);
        v.email("email", &self.email);
        v.min_chars(
            "password",
            &self.password,
            MIN_PASSWORD,
            "Password must be at least 6 characters.",
        );
        v.finish()?;

        let identity = NewIdentity {
            email: self.email.trim().to_lowercase(),
            password: self.password,
            full_name: self.user.full_name.trim().to_string(),
            phone_number: self.user.phone_number.trim().to_string(),
        };
        let account = self.user.validate()?;

        Ok((identity, account))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn profile(value: serde_json::Value) -> Result<ProfileUpdate, AppError> {
        serde_json::from_value::<ProfilePayload>(value)
            .unwrap()
            .validate()
    }

    #[test]
    fn test_profile_accepts_blank_optionals() {
        let update = profile(json!({
            "fullName": "Ada Lovelace",
            "email": "ada@example.com",
            "phoneNumber": "0612345678",
            "bio": "",
            "website": "",
            "preferences": { "newsletter": true }
        }))
        .unwrap();

        assert_eq!(update.bio, None);
        assert_eq!(update.website, None);
        assert!(update.newsletter);
        assert!(!update.marketing);
    }

    #[test]
    fn test_profile_reports_every_field() {
        let result = profile(json!({
            "fullName": "A",
            "email": "nope",
            "phoneNumber": "123",
            "bio": "x".repeat(161),
            "website": "not a url",
            "preferences": {}
        }));

        let Err(AppError::Validation(errors)) = result else {
            panic!("expected validation failure");
        };
        let fields: Vec<&str> = errors.keys().copied().collect();
        assert_eq!(fields, vec!["bio", "email", "fullName", "phoneNumber", "website"]);
    }

    #[test]
    fn test_admin_create_flattens_user_fields() {
        let payload: AdminCreatePayload = serde_json::from_value(json!({
            "email": "New.User@Example.com",
            "password": "hunter22",
            "fullName": "New User",
            "phoneNumber": "0700000000",
            "role": "ADMIN",
            "balance": 250
        }))
        .unwrap();

        let (identity, account) = payload.validate().unwrap();
        assert_eq!(identity.email, "new.user@example.com");
        assert_eq!(account.role, Role::Admin);
        assert_eq!(account.balance, 250);
    }

    #[test]
    fn test_admin_rejects_negative_balance_and_short_password() {
        let payload: AdminCreatePayload = serde_json::from_value(json!({
            "email": "user@example.com",
            "password": "123",
            "fullName": "User",
            "phoneNumber": "0700000000",
            "role": "CLIENT",
            "balance": -5
        }))
        .unwrap();

        let Err(AppError::Validation(errors)) = payload.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.contains_key("balance"));
        assert!(errors.contains_key("password"));
    }
}
