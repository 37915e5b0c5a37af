use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

/// HS256 signing and verification keys with issuer/audience settings.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::minutes(cfg.ttl_minutes),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    /// Mints a bearer token whose subject is the caller's mobile number.
    pub fn issue(&self, mobile_number: &str) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + self.ttl;
        let claims = Claims {
            sub: mobile_number.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(jti = %claims.jti, "jwt signed");
        Ok(token)
    }

    /// Checks signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(jti = %data.claims.jti, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{test_config, TEST_AUDIENCE, TEST_ISSUER};

    fn make_keys() -> JwtKeys {
        JwtKeys::from(&test_config().jwt)
    }

    fn keys_with(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        let mut cfg = test_config().jwt;
        cfg.secret = secret.into();
        cfg.issuer = issuer.into();
        cfg.audience = audience.into();
        JwtKeys::from(&cfg)
    }

    #[test]
    fn issue_and_verify_carries_mobile_as_subject() {
        let keys = make_keys();
        let token = keys.issue("9999999999").expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, "9999999999");
        assert_eq!(claims.iss, TEST_ISSUER);
        assert_eq!(claims.aud, TEST_AUDIENCE);
        assert!(claims.exp > claims.iat);
        assert!(Uuid::parse_str(&claims.jti).is_ok());
    }

    #[test]
    fn every_token_gets_a_fresh_jti() {
        let keys = make_keys();
        let a = keys.verify(&keys.issue("1").unwrap()).unwrap();
        let b = keys.verify(&keys.issue("1").unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn verify_rejects_wrong_issuer_audience_or_secret() {
        let token = make_keys().issue("9999999999").unwrap();
        let secret = &test_config().jwt.secret;
        assert!(keys_with(secret, "other-iss", TEST_AUDIENCE).verify(&token).is_err());
        assert!(keys_with(secret, TEST_ISSUER, "other-aud").verify(&token).is_err());
        assert!(keys_with("another-secret-another-secret-1234", TEST_ISSUER, TEST_AUDIENCE)
            .verify(&token)
            .is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = make_keys();
        let past = OffsetDateTime::now_utc() - Duration::hours(1);
        let claims = Claims {
            sub: "9999999999".into(),
            jti: Uuid::new_v4().to_string(),
            iat: (past - Duration::minutes(5)).unix_timestamp() as usize,
            exp: past.unix_timestamp() as usize,
            iss: TEST_ISSUER.into(),
            aud: TEST_AUDIENCE.into(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_garbage() {
        assert!(make_keys().verify("not-a-token").is_err());
    }
}
