use anyhow::Context;
use serde::Deserialize;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Admin account created at startup when no live user holds its number.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub mobile_number: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    /// Seconds between expiry sweeps; 0 disables the sweeper.
    pub sweep_interval_secs: u64,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = var("DATABASE_URL").filter(|v| !v.trim().is_empty());

        let secret = var("JWT_SECRET").context("JWT_SECRET is not set")?;
        anyhow::ensure!(
            secret.len() >= MIN_SECRET_LEN,
            "JWT_SECRET must be at least {MIN_SECRET_LEN} bytes"
        );

        let ttl_minutes = match var("JWT_TTL_MINUTES") {
            Some(v) => v
                .parse::<i64>()
                .with_context(|| format!("JWT_TTL_MINUTES is not a number: {v}"))?,
            None => 60,
        };
        anyhow::ensure!(ttl_minutes > 0, "JWT_TTL_MINUTES must be positive");

        let jwt = JwtConfig {
            secret,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "otpgate".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "otpgate-users".into()),
            ttl_minutes,
        };

        let sweep_interval_secs = var("SWEEP_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(300);

        let bootstrap_admin = var("BOOTSTRAP_ADMIN_MOBILE")
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .map(|mobile_number| BootstrapAdmin {
                mobile_number,
                name: var("BOOTSTRAP_ADMIN_NAME").unwrap_or_else(|| "Administrator".into()),
            });

        Ok(Self {
            database_url,
            jwt,
            sweep_interval_secs,
            bootstrap_admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_vars(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = load(&[("JWT_SECRET", SECRET)]).unwrap();
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.jwt.issuer, "otpgate");
        assert_eq!(cfg.jwt.audience, "otpgate-users");
        assert_eq!(cfg.jwt.ttl_minutes, 60);
        assert_eq!(cfg.sweep_interval_secs, 300);
        assert!(cfg.bootstrap_admin.is_none());
    }

    #[test]
    fn missing_or_short_secret_is_rejected() {
        assert!(load(&[]).is_err());
        let err = load(&[("JWT_SECRET", "short")]).unwrap_err();
        assert!(err.to_string().contains("at least"));
    }

    #[test]
    fn bad_ttl_is_rejected() {
        assert!(load(&[("JWT_SECRET", SECRET), ("JWT_TTL_MINUTES", "soon")]).is_err());
        assert!(load(&[("JWT_SECRET", SECRET), ("JWT_TTL_MINUTES", "0")]).is_err());
    }

    #[test]
    fn bootstrap_admin_is_read() {
        let cfg = load(&[
            ("JWT_SECRET", SECRET),
            ("DATABASE_URL", "postgres://localhost/otpgate"),
            ("BOOTSTRAP_ADMIN_MOBILE", " 9999999999 "),
            ("SWEEP_INTERVAL_SECS", "0"),
        ])
        .unwrap();
        let admin = cfg.bootstrap_admin.expect("bootstrap admin");
        assert_eq!(admin.mobile_number, "9999999999");
        assert_eq!(admin.name, "Administrator");
        assert_eq!(cfg.sweep_interval_secs, 0);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/otpgate"));
    }
}
