//! Process-wide state shared across every handler: the store, config, the
//! API-key cache (C3), and the database-health circuit breaker used by
//! `/readyz`.

use std::sync::Arc;
use std::time::Duration;

use dispatch_shared::config::DispatchConfig;
use dispatch_shared::ids::{ApiKeyId, OrganizationId};
use dispatch_shared::resilience::ThresholdCircuitBreaker;
use dispatch_store::Store;
use dispatch_worker::{LoggingSink, Sink};
use moka::future::Cache;

/// What the cache holds for a verified `key_id`: enough to re-verify the
/// secret and know which org the request acts on, without a store round
/// trip on every request.
#[derive(Debug, Clone)]
pub struct CachedApiKey {
    pub id: ApiKeyId,
    pub organization_id: OrganizationId,
    pub key_hash: String,
    pub last_touched_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<DispatchConfig>,
    pub api_key_cache: Cache<String, CachedApiKey>,
    pub db_health: Arc<ThresholdCircuitBreaker>,
    pub sink: Arc<dyn Sink>,
}

impl AppState {
    pub fn new(store: Arc<Store>, config: Arc<DispatchConfig>) -> Self {
        let ttl = Duration::from_secs(config.api.api_key_cache_ttl_s.max(1));
        let api_key_cache = Cache::builder().time_to_live(ttl).build();
        let db_health = Arc::new(ThresholdCircuitBreaker::new(
            "database",
            5,
            Duration::from_secs(30),
        ));
        Self {
            store,
            config,
            api_key_cache,
            db_health,
            sink: Arc::new(LoggingSink),
        }
    }
}
