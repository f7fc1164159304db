use std::sync::Arc;

use shared_config::AppConfig;

/// Canned endpoint configuration for integration tests. Store and gateway
/// URLs normally point at a wiremock server started by the test.
pub struct TestConfig {
    pub store_api_url: String,
    pub store_api_key: String,
    pub notify_gateway_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            store_api_url: "http://localhost:54321".to_string(),
            store_api_key: "test-store-key".to_string(),
            notify_gateway_url: "http://localhost:54322".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_endpoints(store_api_url: &str, notify_gateway_url: &str) -> Self {
        Self {
            store_api_url: store_api_url.to_string(),
            notify_gateway_url: notify_gateway_url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            store_api_url: self.store_api_url.clone(),
            store_api_key: self.store_api_key.clone(),
            notify_gateway_url: self.notify_gateway_url.clone(),
            notify_gateway_token: "test-gateway-token".to_string(),
            api_port: 0,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}
