use anyhow::Context;

/// Runtime settings, read from the environment (and `.env` in debug builds).
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub cors_origins: Vec<String>,
    pub run_migrations: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match get("PORT") {
            Some(v) => v.trim().parse().with_context(|| format!("PORT must be a port number, got '{v}'"))?,
            None => 8080,
        };
        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(v) => v.trim().parse().with_context(|| format!("DB_MAX_CONNECTIONS must be an integer, got '{v}'"))?,
            None => 5,
        };
        let cors_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        let run_migrations = get("RUN_MIGRATIONS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database_url: get("DATABASE_URL").filter(|s| !s.is_empty()),
            db_max_connections,
            cors_origins,
            run_migrations,
        })
    }
}
