use std::env;
use tracing::warn;

const DEFAULT_API_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_api_url: String,
    pub store_api_key: String,
    pub notify_gateway_url: String,
    pub notify_gateway_token: String,
    pub api_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            store_api_url: env::var("STORE_API_URL")
                .unwrap_or_else(|_| {
                    warn!("STORE_API_URL not set, using empty value");
                    String::new()
                }),
            store_api_key: env::var("STORE_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("STORE_API_KEY not set, using empty value");
                    String::new()
                }),
            notify_gateway_url: env::var("NOTIFY_GATEWAY_URL")
                .unwrap_or_else(|_| {
                    warn!("NOTIFY_GATEWAY_URL not set, using empty value");
                    String::new()
                }),
            notify_gateway_token: env::var("NOTIFY_GATEWAY_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("NOTIFY_GATEWAY_TOKEN not set, using empty value");
                    String::new()
                }),
            api_port: env::var("API_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(|| {
                    warn!("API_PORT not set or invalid, using default {}", DEFAULT_API_PORT);
                    DEFAULT_API_PORT
                }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.store_api_url.is_empty() && !self.store_api_key.is_empty()
    }

    pub fn is_gateway_configured(&self) -> bool {
        !self.notify_gateway_url.is_empty()
    }
}
