use serde::{Deserialize, Serialize};
use shared::SkinType;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_type: Option<String>,
}

/// Caller identity attached to a request once its token is verified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub skin_type: Option<SkinType>,
}

impl AuthUser {
    /// Unknown skin types are treated as unset.
    pub fn from_claims(id: Uuid, claims: &Claims) -> Self {
        let skin_type = claims
            .skin_type
            .as_deref()
            .and_then(|value| SkinType::from_str(value.trim()).ok());
        Self { id, skin_type }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(skin_type: Option<&str>) -> Claims {
        Claims {
            sub: Uuid::nil().to_string(),
            email: String::new(),
            name: String::new(),
            exp: 0,
            iat: 0,
            skin_type: skin_type.map(str::to_string),
        }
    }

    #[test]
    fn skin_type_claim_is_parsed_case_insensitively() {
        let user = AuthUser::from_claims(Uuid::nil(), &claims(Some("Oily")));
        assert_eq!(user.skin_type, Some(SkinType::Oily));
    }

    #[test]
    fn unknown_or_missing_skin_type_is_unset() {
        assert_eq!(AuthUser::from_claims(Uuid::nil(), &claims(Some("scaly"))).skin_type, None);
        assert_eq!(AuthUser::from_claims(Uuid::nil(), &claims(None)).skin_type, None);
    }

    #[test]
    fn optional_claims_may_be_absent() {
        let parsed: Claims =
            serde_json::from_str(r#"{"sub":"abc","exp":10,"iat":5}"#).unwrap();
        assert_eq!(parsed.email, "");
        assert!(parsed.skin_type.is_none());
    }
}
