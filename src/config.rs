use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Base URL of the external rating service. When absent, every user
    /// is treated as having `default_rating`.
    pub rating_api_url: Option<String>,
    pub default_rating: Decimal,
    pub max_free_cancellation_hours: i64,
    pub max_daily_free_cancellations: i64,
    pub cancellation_fee_rate: Decimal,
    pub dispute_window_hours: i64,
    pub auto_resolve_interval_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let rating_api_url = env_map
            .get("RATING_API_URL")
            .filter(|s| !s.trim().is_empty())
            .cloned();

        let default_rating = parse_decimal(&env_map, "DEFAULT_RATING", "5.0")?;
        if default_rating < Decimal::ZERO || default_rating > Decimal::from(5) {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_RATING".to_string(),
                "must be within [0, 5]".to_string(),
            ));
        }

        let max_free_cancellation_hours =
            parse_i64(&env_map, "MAX_FREE_CANCELLATION_HOURS", "24")?;
        let max_daily_free_cancellations =
            parse_i64(&env_map, "MAX_DAILY_FREE_CANCELLATIONS", "3")?;

        let cancellation_fee_rate = parse_decimal(&env_map, "CANCELLATION_FEE_RATE", "10")?;
        if cancellation_fee_rate < Decimal::ZERO || cancellation_fee_rate > Decimal::ONE_HUNDRED {
            return Err(ConfigError::InvalidValue(
                "CANCELLATION_FEE_RATE".to_string(),
                "must be a percentage within [0, 100]".to_string(),
            ));
        }

        let dispute_window_hours = parse_i64(&env_map, "DISPUTE_WINDOW_HOURS", "72")?;
        let auto_resolve_interval_secs = env_map
            .get("AUTO_RESOLVE_INTERVAL_SECS")
            .map(|s| s.as_str())
            .unwrap_or("300")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "AUTO_RESOLVE_INTERVAL_SECS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        Ok(Config {
            port,
            database_path,
            rating_api_url,
            default_rating,
            max_free_cancellation_hours,
            max_daily_free_cancellations,
            cancellation_fee_rate,
            dispute_window_hours,
            auto_resolve_interval_secs,
        })
    }

    pub fn dispute_window_ms(&self) -> i64 {
        self.dispute_window_hours * 3_600_000
    }
}

fn parse_i64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<i64, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid i64".to_string()))
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<Decimal>()
        .map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid decimal".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_env_map(setup_required_env()).expect("config failed");
        assert_eq!(config.port, 8080);
        assert_eq!(config.rating_api_url, None);
        assert_eq!(config.default_rating, Decimal::from_str("5.0").unwrap());
        assert_eq!(config.max_free_cancellation_hours, 24);
        assert_eq!(config.max_daily_free_cancellations, 3);
        assert_eq!(config.cancellation_fee_rate, Decimal::from(10));
        assert_eq!(config.dispute_window_hours, 72);
        assert_eq!(config.auto_resolve_interval_secs, 300);
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_cancellation_fee_rate() {
        let mut env_map = setup_required_env();
        env_map.insert("CANCELLATION_FEE_RATE".to_string(), "150".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "CANCELLATION_FEE_RATE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_default_rating() {
        let mut env_map = setup_required_env();
        env_map.insert("DEFAULT_RATING".to_string(), "7".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DEFAULT_RATING"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_blank_rating_url_treated_as_absent() {
        let mut env_map = setup_required_env();
        env_map.insert("RATING_API_URL".to_string(), "  ".to_string());
        let config = Config::from_env_map(env_map).expect("config failed");
        assert_eq!(config.rating_api_url, None);
    }

    #[test]
    fn test_dispute_window_ms() {
        let mut env_map = setup_required_env();
        env_map.insert("DISPUTE_WINDOW_HOURS".to_string(), "2".to_string());
        let config = Config::from_env_map(env_map).expect("config failed");
        assert_eq!(config.dispute_window_ms(), 7_200_000);
    }
}
