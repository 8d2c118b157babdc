use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A single post returned by the social API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            created_at: None,
        }
    }
}

/// Posts fetched in one cycle by one account.
#[derive(Debug, Clone)]
pub struct PostBatch {
    pub account: String,
    pub posts: Vec<Post>,
}

/// Login material for one polling account.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl AccountCredentials {
    /// Parse the JSON array held in `ACCOUNTS_JSON`.
    pub fn parse_list(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// Post ids arrive as strings from some endpoints and as bare numbers from others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials() {
        let json = r#"[
            {"email": "a@example.com", "username": "alpha", "password": "pw1"},
            {"email": "b@example.com", "username": "bravo", "password": "pw2"}
        ]"#;
        let accounts = AccountCredentials::parse_list(json).unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].username, "alpha");
        assert_eq!(accounts[1].email, "b@example.com");
    }

    #[test]
    fn test_parse_credentials_missing_field() {
        let json = r#"[{"email": "a@example.com", "username": "alpha"}]"#;
        assert!(AccountCredentials::parse_list(json).is_err());
    }

    #[test]
    fn test_parse_credentials_not_an_array() {
        assert!(AccountCredentials::parse_list("{\"username\": \"alpha\"}").is_err());
        assert!(AccountCredentials::parse_list("not json").is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = AccountCredentials {
            email: "a@example.com".into(),
            username: "alpha".into(),
            password: "hunter2".into(),
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("alpha"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_post_id_accepts_numbers() {
        let posts: Vec<Post> = serde_json::from_str(
            r#"[{"id": 1790000000000000001, "text": "$TSLA"}, {"id": "42", "text": "hi"}]"#,
        )
        .unwrap();
        assert_eq!(posts[0].id, "1790000000000000001");
        assert_eq!(posts[1].id, "42");
        assert!(posts[1].created_at.is_none());
    }
}
