use serde::Deserialize;
use std::{env, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvBackend {
    Redis,
    Memory,
}

impl FromStr for KvBackend {
    type Err = config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(KvBackend::Redis),
            "memory" => Ok(KvBackend::Memory),
            other => Err(config::ConfigError::Message(format!(
                "unknown kv backend {other:?} (expected redis or memory)"
            ))),
        }
    }
}

impl fmt::Display for KvBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvBackend::Redis => f.write_str("redis"),
            KvBackend::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub kv_backend: KvBackend,
    pub redis_uri: String,
    pub kv_namespace: String,
    pub jwt_secret: String,
    pub lookback_days: u32,
    pub commit_retries: usize,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let kv_backend = settings
            .get_string("kv.backend")
            .or_else(|_| env::var("KV_BACKEND"))
            .unwrap_or_else(|_| "redis".to_string())
            .parse::<KvBackend>()?;

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                match env::var("REDIS_PASSWORD") {
                    Ok(password) => format!("redis://:{}@{}:{}/0", password, host, port),
                    Err(_) => format!("redis://{}:{}/0", host, port),
                }
            });

        let kv_namespace = settings
            .get_string("kv.namespace")
            .or_else(|_| env::var("KV_NAMESPACE"))
            .unwrap_or_else(|_| "emtprep".to_string());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let lookback_days = numeric(&settings, "attempts.lookback_days", "LOOKBACK_DAYS", 30)?;
        let commit_retries = numeric(
            &settings,
            "attempts.commit_retries",
            "ATTEMPT_COMMIT_RETRIES",
            3,
        )?;

        Ok(Config {
            bind_addr,
            kv_backend,
            redis_uri,
            kv_namespace,
            jwt_secret,
            lookback_days,
            commit_retries,
        })
    }
}

fn numeric<T>(
    settings: &config::Config,
    key: &str,
    env_var: &str,
    default: T,
) -> Result<T, config::ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = match settings.get_string(key).or_else(|_| env::var(env_var)) {
        Ok(raw) => raw,
        Err(_) => return Ok(default),
    };
    raw.trim()
        .parse()
        .map_err(|e| config::ConfigError::Message(format!("invalid {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn parses_backend_names() {
        assert_eq!("memory".parse::<KvBackend>().unwrap(), KvBackend::Memory);
        assert_eq!("Redis".parse::<KvBackend>().unwrap(), KvBackend::Redis);
        assert!("sled".parse::<KvBackend>().is_err());
    }

    #[test]
    #[serial]
    fn env_overrides_defaults() {
        env::set_var("SKIP_ROOT_ENV", "1");
        env::set_var("KV_BACKEND", "memory");
        env::set_var("LOOKBACK_DAYS", "14");
        env::set_var("ATTEMPT_COMMIT_RETRIES", "5");

        let config = Config::load().unwrap();
        assert_eq!(config.kv_backend, KvBackend::Memory);
        assert_eq!(config.lookback_days, 14);
        assert_eq!(config.commit_retries, 5);

        env::set_var("LOOKBACK_DAYS", "two weeks");
        assert!(Config::load().is_err());

        env::remove_var("LOOKBACK_DAYS");
        env::remove_var("ATTEMPT_COMMIT_RETRIES");
        env::remove_var("KV_BACKEND");
    }
}
