//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// User record stored in the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Stable user ID (also used as document ID)
    pub user_id: String,
    /// Email address as entered at registration
    pub email: String,
    /// Lowercased email used for uniqueness checks
    pub email_key: String,
    /// Display name
    pub name: String,
    /// Argon2id PHC string; absent for federated-only accounts
    pub password_hash: Option<String>,
    /// Subject identifier at the federated identity provider
    pub federated_id: Option<String>,
    /// Profile picture reference
    pub picture: Option<String>,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Normalize an email into its uniqueness key.
    pub fn email_key(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// How this account signs in.
    pub fn auth_method(&self) -> AuthMethod {
        match (&self.password_hash, &self.federated_id) {
            (Some(_), Some(_)) => AuthMethod::Linked,
            (None, Some(_)) => AuthMethod::Federated,
            // A brand-new federated user without a linked id does not persist,
            // so the remaining case is a plain password account.
            _ => AuthMethod::Password,
        }
    }
}

/// Sign-in methods available to an account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum AuthMethod {
    Password,
    Federated,
    Linked,
}

/// The single client-facing user shape, returned by every auth flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub auth_method: AuthMethod,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            picture: user.picture.clone(),
            auth_method: user.auth_method(),
        }
    }
}

/// Identity asserted by the federated provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FederatedIdentity {
    /// Provider subject identifier
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Partial profile update; email is deliberately absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(password_hash: Option<&str>, federated_id: Option<&str>) -> User {
        User {
            user_id: "user_1".to_string(),
            email: "Bob@X.com".to_string(),
            email_key: User::email_key("Bob@X.com"),
            name: "Bob".to_string(),
            password_hash: password_hash.map(String::from),
            federated_id: federated_id.map(String::from),
            picture: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_email_key_is_case_insensitive() {
        assert_eq!(User::email_key(" A@X.com "), "a@x.com");
        assert_eq!(User::email_key("a@x.com"), User::email_key("A@x.COM"));
    }

    #[test]
    fn test_auth_method() {
        assert_eq!(user(Some("h"), None).auth_method(), AuthMethod::Password);
        assert_eq!(user(None, Some("g-1")).auth_method(), AuthMethod::Federated);
        assert_eq!(user(Some("h"), Some("g-1")).auth_method(), AuthMethod::Linked);
    }

    #[test]
    fn test_user_response_omits_secrets() {
        let json = serde_json::to_value(UserResponse::from(&user(Some("hash"), None))).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "Bob@X.com");
        assert_eq!(json["auth_method"], "password");
    }
}
