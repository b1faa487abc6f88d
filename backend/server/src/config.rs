use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub cors_origin: String,
    pub db_max_connections: u32,
    pub database_url: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub supabase_service_key: Option<String>,
}

impl Config {
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok(), read_secret_file)
    }

    /// `var` reads plain settings, `secret` reads mounted secrets. A secret that is not
    /// mounted falls back to the variable of the same name.
    pub fn from_lookup<V, S>(var: V, secret: S) -> Self
    where
        V: Fn(&str) -> Option<String>,
        S: Fn(&str) -> Option<String>,
    {
        let read_secret = |name: &str| {
            secret(name).or_else(|| var(name)).or_else(|| {
                warn!("{name} is not configured");
                None
            })
        };

        Self {
            port: try_load(&var, "RUST_PORT", 8080),
            cors_origin: try_load(&var, "CORS_ORIGIN", "http://localhost:3000".to_string()),
            db_max_connections: try_load(&var, "DB_MAX_CONNECTIONS", 10),
            database_url: read_secret("DATABASE_URL"),
            supabase_url: var("SUPABASE_URL"),
            supabase_anon_key: read_secret("SUPABASE_ANON_KEY"),
            supabase_service_key: read_secret("SUPABASE_SERVICE_ROLE_KEY"),
        }
    }
}

fn try_load<T, V>(var: &V, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
    V: Fn(&str) -> Option<String>,
{
    let Some(raw) = var(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };

    raw.parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value: {e}, using default: {default}");
        default
    })
}

fn read_secret_file(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
}
