use std::net::SocketAddr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} missing")]
    Missing(&'static str),
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub cors_origins: CorsOrigins,
    /// Reject responses/subscales that name questions which do not exist.
    pub enforce_references: bool,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let bind_raw = lookup("BIND_ADDR").unwrap_or_else(|| {
            let port = lookup("PORT").unwrap_or_else(|| "8000".to_string());
            format!("0.0.0.0:{}", port)
        });
        let bind_addr: SocketAddr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            cors_origins: parse_origins(lookup("CORS_ALLOWED_ORIGINS")),
            enforce_references: parse_flag(&lookup, "ENFORCE_REFERENCES", true)?,
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 1024 * 1024)?,
        })
    }

    /// Settings for tests and local runs against the in-memory store.
    pub fn local() -> Self {
        Self {
            database_url: String::new(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            db_max_connections: 1,
            cors_origins: CorsOrigins::Any,
            enforce_references: true,
            max_upload_bytes: 1024 * 1024,
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value: raw }),
        },
        None => Ok(default),
    }
}

fn parse_origins(raw: Option<String>) -> CorsOrigins {
    let Some(raw) = raw else {
        return CorsOrigins::Any;
    };
    let origins: Vec<String> = raw
        .split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsOrigins::Any
    } else {
        CorsOrigins::List(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/survey")]).unwrap();
        assert_eq!(config.bind_addr.port(), 8000);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.cors_origins, CorsOrigins::Any);
        assert!(config.enforce_references);
        assert_eq!(config.max_upload_bytes, 1024 * 1024);
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn port_and_bind_addr() {
        let config = load(&[("DATABASE_URL", "x"), ("PORT", "9100")]).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9100");

        let config =
            load(&[("DATABASE_URL", "x"), ("PORT", "9100"), ("BIND_ADDR", "127.0.0.1:7000")])
                .unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:7000");

        assert!(load(&[("DATABASE_URL", "x"), ("BIND_ADDR", "nowhere")]).is_err());
    }

    #[test]
    fn origin_list_and_flags() {
        let config = load(&[
            ("DATABASE_URL", "x"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:3000, https://admin.example.org"),
            ("ENFORCE_REFERENCES", "false"),
        ])
        .unwrap();
        assert_eq!(
            config.cors_origins,
            CorsOrigins::List(vec![
                "http://localhost:3000".to_string(),
                "https://admin.example.org".to_string()
            ])
        );
        assert!(!config.enforce_references);
    }

    #[test]
    fn bad_numbers_are_errors() {
        let err = load(&[("DATABASE_URL", "x"), ("DB_MAX_CONNECTIONS", "many")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "DB_MAX_CONNECTIONS", .. }));
        assert!(load(&[("DATABASE_URL", "x"), ("ENFORCE_REFERENCES", "maybe")]).is_err());
    }
}
