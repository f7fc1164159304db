use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{Method, StatusCode};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::DocStoreClient;
use shared_utils::TtlCache;

use crate::error::{DispatchError, NotificationError};
use crate::models::{DeliveryChannel, NotificationPreferences};

const PREFERENCES_PATH: &str = "/rest/v1/notification_preferences";
const PREFERENCES_CACHE_MAX_AGE: Duration = Duration::from_secs(300);

/// Outbound delivery port. Implementations decide the wire protocol; the
/// executor decides retries, so `send` reports transient vs permanent and
/// nothing else.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        channel: DeliveryChannel,
        message: &str,
    ) -> Result<(), DispatchError>;
}

/// Recipient preference lookup port. `None` means the recipient never saved
/// preferences; delivery then falls back to in-app.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PreferenceResolver: Send + Sync {
    async fn preferences_for(
        &self,
        recipient: &str,
    ) -> Result<Option<NotificationPreferences>, NotificationError>;
}

// ============================================================================
// GATEWAY CHANNEL
// ============================================================================

/// Delivers through the clinic's notification gateway over HTTP.
pub struct GatewayChannel {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl GatewayChannel {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.notify_gateway_url.clone(),
            token: config.notify_gateway_token.clone(),
        }
    }
}

#[async_trait]
impl NotificationChannel for GatewayChannel {
    async fn send(
        &self,
        recipient: &str,
        channel: DeliveryChannel,
        message: &str,
    ) -> Result<(), DispatchError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "recipient": recipient,
            "channel": channel,
            "message": message,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Transient(format!("gateway unreachable: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            debug!("Gateway accepted {} message for {}", channel, recipient);
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        let reason = if detail.is_empty() {
            format!("gateway returned {}", status)
        } else {
            format!("gateway returned {}: {}", status, detail)
        };

        // Overload and server-side trouble are worth retrying; any other
        // client error means the request itself is bad.
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            Err(DispatchError::Transient(reason))
        } else {
            Err(DispatchError::Permanent(reason))
        }
    }
}

// ============================================================================
// PREFERENCE RESOLVERS
// ============================================================================

/// Reads recipient preferences from the document store.
pub struct RestPreferenceResolver {
    client: DocStoreClient,
}

impl RestPreferenceResolver {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: DocStoreClient::new(config),
        }
    }
}

#[async_trait]
impl PreferenceResolver for RestPreferenceResolver {
    async fn preferences_for(
        &self,
        recipient: &str,
    ) -> Result<Option<NotificationPreferences>, NotificationError> {
        let path = format!(
            "{}?recipient=eq.{}",
            PREFERENCES_PATH,
            urlencoding::encode(recipient)
        );
        let rows: Vec<NotificationPreferences> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| NotificationError::Persistence(e.to_string()))?;

        Ok(rows.into_iter().next())
    }
}

/// Wraps a resolver with a TTL cache so a batch of jobs for the same
/// recipient resolves preferences once. Negative results are cached too.
pub struct CachingPreferenceResolver<R> {
    inner: R,
    cache: Mutex<TtlCache<String, Option<NotificationPreferences>>>,
}

impl<R> CachingPreferenceResolver<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_age(inner, PREFERENCES_CACHE_MAX_AGE)
    }

    pub fn with_max_age(inner: R, max_age: Duration) -> Self {
        Self {
            inner,
            cache: Mutex::new(TtlCache::new(max_age)),
        }
    }
}

#[async_trait]
impl<R: PreferenceResolver> PreferenceResolver for CachingPreferenceResolver<R> {
    async fn preferences_for(
        &self,
        recipient: &str,
    ) -> Result<Option<NotificationPreferences>, NotificationError> {
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&recipient.to_string()) {
                return Ok(cached.clone());
            }
        }

        let resolved = self.inner.preferences_for(recipient).await?;

        let mut cache = self.cache.lock().await;
        cache.set(recipient.to_string(), resolved.clone());
        Ok(resolved)
    }
}
