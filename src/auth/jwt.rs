use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;

const STATE_TOKEN_AUDIENCE: &str = "oauth-state";
const STATE_TOKEN_EXPIRY_MINUTES: i64 = 10;

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiry: Duration::minutes(config.jwt_expiry_minutes),
        })
    }

    pub fn generate_token(
        &self,
        user_id: Uuid,
        username: &str,
        role: &str,
        tenant_id: Option<Uuid>,
    ) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = Claims {
            sub: user_id,
            username: username.to_owned(),
            role: role.to_owned(),
            tenant_id,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Signs an OAuth `state` value bound to the initiating user. The
    /// callback only accepts a state we minted, so a caller cannot attach a
    /// provider grant to an arbitrary user id.
    pub fn generate_state_token(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::minutes(STATE_TOKEN_EXPIRY_MINUTES);
        let claims = StateClaims {
            sub: user_id,
            iss: self.issuer.clone(),
            aud: STATE_TOKEN_AUDIENCE.to_owned(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_state_token(&self, token: &str) -> Result<Uuid> {
        let mut validation = Validation::default();
        validation.set_audience(&[STATE_TOKEN_AUDIENCE]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<StateClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims.sub)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: String,
    pub tenant_id: Option<Uuid>,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    sub: Uuid,
    iss: String,
    aud: String,
    iat: usize,
    exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService {
            encoding: EncodingKey::from_secret(b"test-secret"),
            decoding: DecodingKey::from_secret(b"test-secret"),
            issuer: "fintake".to_string(),
            audience: "fintake-clients".to_string(),
            expiry: Duration::minutes(5),
        }
    }

    #[test]
    fn state_token_carries_the_user_id_back() {
        let jwt = service();
        let user_id = Uuid::new_v4();
        let token = jwt.generate_state_token(user_id).unwrap();
        assert_eq!(jwt.verify_state_token(&token).unwrap(), user_id);
    }

    #[test]
    fn bare_uuid_is_not_a_valid_state() {
        let jwt = service();
        assert!(jwt.verify_state_token(&Uuid::new_v4().to_string()).is_err());
    }

    #[test]
    fn api_and_state_tokens_do_not_cross_over() {
        let jwt = service();
        let user_id = Uuid::new_v4();

        let api_token = jwt.generate_token(user_id, "dana", "accountant", None).unwrap();
        assert!(jwt.verify_state_token(&api_token).is_err());

        let state_token = jwt.generate_state_token(user_id).unwrap();
        assert!(jwt.verify_token(&state_token).is_err());
    }
}
