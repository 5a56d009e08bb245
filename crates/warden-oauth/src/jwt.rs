//! Token codec - signs and validates Warden bearer tokens
//!
//! Security features:
//! - Explicit HS256 enforcement (prevents algorithm confusion)
//! - Issuer validation on every decode
//! - Closed token type enum carried in the `tokenType` claim
//! - JTI on every token so identical claims never yield identical tokens

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use warden_core::{ExtraClaims, Result, UserInfo, WardenError};

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Minimum secret length for HS256 (256 bits)
const MIN_SECRET_LENGTH: usize = 32;

/// Kind of a bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    AuthorizationCode,
    IdToken,
    /// Validated by signature and expiry only, never against the cache
    Static,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::AuthorizationCode => "authorization_code",
            Self::IdToken => "id_token",
            Self::Static => "static",
        };
        f.write_str(s)
    }
}

/// JWT claims of every Warden token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal name
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Absent for tokens that never expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub jti: String,
    #[serde(rename = "tokenType")]
    pub token_type: TokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "ExtraClaims::is_empty")]
    pub extra: ExtraClaims,
}

impl Claims {
    /// Claims of `token_type`; subject, issuer and timestamps are set on issue
    pub fn new(token_type: TokenType) -> Self {
        Self {
            sub: String::new(),
            aud: None,
            exp: None,
            iat: 0,
            iss: String::new(),
            jti: String::new(),
            token_type,
            nonce: None,
            extra: ExtraClaims::default(),
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.aud = Some(audience.into());
        self
    }

    pub fn with_nonce(mut self, nonce: Option<String>) -> Self {
        self.nonce = nonce.filter(|n| !n.is_empty());
        self
    }

    /// Principal carried by the token
    pub fn principal(&self) -> UserInfo {
        UserInfo {
            name: self.sub.clone(),
            uid: String::new(),
            email: self
                .extra
                .pre_registration
                .as_ref()
                .map(|p| p.email.clone())
                .unwrap_or_default(),
            groups: vec![],
            extra: self.extra.clone(),
        }
    }

    /// Seconds until expiry, `None` for tokens that never expire
    pub fn remaining_secs(&self) -> Option<i64> {
        self.exp.map(|exp| exp - Utc::now().timestamp())
    }
}

/// Signs and validates tokens with a shared HMAC secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenCodec {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Result<Self> {
        if secret.is_empty() {
            return Err(WardenError::config_error("JWT secret must not be empty"));
        }
        if secret.len() < MIN_SECRET_LENGTH {
            warn!(
                "JWT secret is only {} bytes, recommended minimum is {} bytes for HS256",
                secret.len(),
                MIN_SECRET_LENGTH
            );
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn encode(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(JWT_ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| WardenError::internal_error(format!("Failed to sign token: {}", e)))
    }

    /// Validate signature, issuer and (when present) expiry
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub"]);
        validation.validate_exp = true;
        // Audience is checked by the grant that consumes the token
        validation.validate_aud = false;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            debug!(error = %e, "Token validation failed");
            match e.kind() {
                ErrorKind::ExpiredSignature => WardenError::invalid_token("token has expired"),
                _ => WardenError::invalid_token(e.to_string()),
            }
        })?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret-key-for-testing-only-32b", "warden-test").unwrap()
    }

    fn signed(codec: &TokenCodec, token_type: TokenType, exp: Option<i64>) -> String {
        let mut claims = Claims::new(token_type);
        claims.sub = "alice".to_string();
        claims.iss = codec.issuer().to_string();
        claims.iat = Utc::now().timestamp();
        claims.exp = exp;
        codec.encode(&claims).unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_type_and_audience() {
        let codec = codec();
        let mut claims = Claims::new(TokenType::AuthorizationCode)
            .with_audience("kubectl")
            .with_nonce(Some("n-1".to_string()));
        claims.sub = "alice".to_string();
        claims.iss = "warden-test".to_string();

        let decoded = codec.decode(&codec.encode(&claims).unwrap()).unwrap();
        assert_eq!(decoded.token_type, TokenType::AuthorizationCode);
        assert_eq!(decoded.aud.as_deref(), Some("kubectl"));
        assert_eq!(decoded.nonce.as_deref(), Some("n-1"));
    }

    #[test]
    fn test_wire_claim_names() {
        let mut claims = Claims::new(TokenType::IdToken);
        claims.sub = "alice".to_string();
        claims.extra.uninitialized = true;

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["tokenType"], "id_token");
        assert_eq!(json["extra"]["uninitialized"], true);
        assert!(json.get("exp").is_none());
    }

    #[test]
    fn test_token_without_expiry_is_valid() {
        let codec = codec();
        let token = signed(&codec, TokenType::Static, None);
        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.token_type, TokenType::Static);
        assert!(claims.remaining_secs().is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = codec();
        let token = signed(&codec, TokenType::Access, Some(Utc::now().timestamp() - 3600));
        let err = codec.decode(&token).unwrap_err();
        assert!(matches!(err, WardenError::InvalidToken { .. }));
    }

    #[test]
    fn test_wrong_issuer_and_secret_rejected() {
        let token = signed(&codec(), TokenType::Access, None);

        let other_issuer = TokenCodec::new("test-secret-key-for-testing-only-32b", "other").unwrap();
        assert!(other_issuer.decode(&token).is_err());

        let other_secret = TokenCodec::new("another-secret-key-for-testing-32b", "warden-test").unwrap();
        assert!(other_secret.decode(&token).is_err());

        assert!(codec().decode("invalid.token.here").is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(TokenCodec::new("", "warden").is_err());
    }
}
