use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_due_days")]
    pub payment_due_days: i64,
    #[serde(default = "default_rate")]
    pub default_rate: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_due_days() -> i64 {
    30
}

fn default_rate() -> f64 {
    5000.0
}

fn default_currency() -> String {
    "PHP".to_string()
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            payment_due_days: default_due_days(),
            default_rate: default_rate(),
            currency: default_currency(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            // Environment-specific overrides, e.g. config/production
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `CARTAGE__SERVER__PORT=9090`
            .add_source(config::Environment::with_prefix("CARTAGE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_without_sources() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.business_rules.payment_due_days, 30);
        assert_eq!(config.business_rules.currency, "PHP");
    }
}
