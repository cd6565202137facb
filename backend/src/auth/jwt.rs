use super::models::Claims;
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT decoding error: {0}")]
    Decoding(String),
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
}

/// Verifies HS256 tokens issued by the account service. Issuance lives elsewhere.
#[derive(Clone)]
pub struct JwtService {
    decoding_key: DecodingKey,
    #[cfg(test)]
    encoding_key: jsonwebtoken::EncodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            #[cfg(test)]
            encoding_key: jsonwebtoken::EncodingKey::from_secret(secret.as_ref()),
        }
    }

    #[cfg(test)]
    pub fn generate_token(&self, claims: &Claims) -> jsonwebtoken::errors::Result<String> {
        let header = jsonwebtoken::Header::new(Algorithm::HS256);
        jsonwebtoken::encode(&header, claims, &self.encoding_key)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, JwtError> {
        if token.is_empty() {
            return Err(JwtError::InvalidToken);
        }

        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(JwtError::InvalidToken);
        }

        let validation = Validation::new(Algorithm::HS256);

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(token_data) => {
                let now = Utc::now().timestamp() as usize;
                log::debug!(
                    "JWT token decoded successfully. User: {}, Exp: {}, Now: {}",
                    token_data.claims.sub,
                    token_data.claims.exp,
                    now
                );

                if token_data.claims.exp < now {
                    log::warn!(
                        "JWT token expired. Exp: {}, Now: {}",
                        token_data.claims.exp,
                        now
                    );
                    return Err(JwtError::TokenExpired);
                }
                Ok(token_data.claims)
            }
            Err(err) => {
                log::warn!("JWT token decode error: {:?}", err);
                match err.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        Err(JwtError::TokenExpired)
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidToken => Err(JwtError::InvalidToken),
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        Err(JwtError::InvalidToken)
                    }
                    _ => Err(JwtError::Decoding(err.to_string())),
                }
            }
        }
    }
}
