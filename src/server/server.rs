use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use anyhow::{anyhow, bail};
use nanoid::nanoid;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Server {
    pub session_service: Arc<dyn SessionService>,
    pub user_directory: Arc<dyn UserDirectory>,
    pub throttle: RequestThrottle,
    instance_id: String,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

/// Periodic cleanup of process-local state: idle buckets and expired entries.
struct Sweeper {
    limiters: Vec<Arc<LocalBucketLimiter>>,
    memory_store: Option<Arc<MemoryKeyValueStore>>,
    max_idle: Duration,
}

impl Sweeper {
    fn is_needed(&self) -> bool {
        !self.limiters.is_empty() || self.memory_store.is_some()
    }

    fn sweep(&self) {
        let buckets: usize = self
            .limiters
            .iter()
            .map(|limiter| limiter.sweep_idle(self.max_idle))
            .sum();
        let entries = self
            .memory_store
            .as_ref()
            .map_or(0, |store| store.purge_expired());
        if buckets > 0 || entries > 0 {
            debug!(buckets, entries, "swept idle state");
        }
    }

    async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.sweep(),
            }
        }
    }
}

/// How long an untouched bucket takes to fill up again; dropping it after
/// that loses nothing.
fn refill_span(requests_per_minute: u32, burst: u32) -> Duration {
    let capacity = f64::from(requests_per_minute) + f64::from(burst);
    Duration::from_secs_f64(60.0 * capacity / f64::from(requests_per_minute.max(1)))
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let alphabet: [char; 16] = [
            '1', '2', '3', '4', '5', '6', '7', '8', '9', '0', 'a', 'b', 'c', 'd', 'e', 'f',
        ];
        let instance_id = nanoid!(10, &alphabet);

        let mut memory_store = None;
        let kv: Arc<dyn KeyValueStore> = match settings.store.backend.as_str() {
            "memory" => {
                warn!("in-memory session store: refresh sessions are not shared across instances");
                let store = Arc::new(MemoryKeyValueStore::new());
                memory_store = Some(store.clone());
                store
            }
            "redis" => {
                let url = settings
                    .store
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("store.redis_url is required for the redis backend"))?;
                let redis_client = redis::Client::open(url)?;
                let redis_manager = redis_client.get_connection_manager().await?;
                Arc::new(RedisKeyValueStore::new(
                    redis_manager,
                    Duration::from_millis(settings.store.op_timeout_ms),
                ))
            }
            other => bail!("Unknown store backend: {}", other),
        };

        let auth = &settings.auth;
        let token_codec: Arc<dyn TokenCodec> =
            Arc::new(JwtHs256Codec::new(auth.issuer.clone()).with_leeway(auth.leeway_secs));
        let session_service: Arc<dyn SessionService> = Arc::new(RealSessionService::new(
            SessionConfig {
                issuer: auth.issuer.clone(),
                secret_version: auth.secret_version.clone(),
                access_ttl: Duration::from_secs(auth.access_ttl_secs),
                refresh_ttl: Duration::from_secs(auth.refresh_ttl_secs),
                access_secret: SigningSecret::new(auth.access_secret.as_bytes()),
                refresh_secret: SigningSecret::new(auth.refresh_secret.as_bytes()),
            },
            token_codec,
            RefreshStore::new(kv.clone(), auth.refresh_prefix.clone()),
        ));

        let user_directory: Arc<dyn UserDirectory> = Arc::new(MemoryUserDirectory::with_users(
            settings
                .users
                .iter()
                .map(|seed| User::new(UserId(seed.id), seed.role.clone())),
        ));

        let rate_limit = &settings.rate_limit;
        let mut limiters = Vec::new();
        let throttle = if !rate_limit.enabled {
            RequestThrottle::disabled()
        } else {
            match rate_limit.backend.as_str() {
                "local" => {
                    let by_ip = Arc::new(LocalBucketLimiter::new(
                        rate_limit.requests_per_minute,
                        rate_limit.burst,
                    ));
                    let by_user = Arc::new(LocalBucketLimiter::new(
                        rate_limit.requests_per_minute,
                        rate_limit.burst,
                    ));
                    limiters.push(by_ip.clone());
                    limiters.push(by_user.clone());
                    RequestThrottle::new(by_ip, by_user)
                }
                "redis" => {
                    let counter = || -> Arc<dyn RateLimiter> {
                        Arc::new(
                            CounterRateLimiter::new(
                                kv.clone(),
                                rate_limit.requests_per_minute,
                                rate_limit.prefix.clone(),
                            )
                            .with_failure_policy(rate_limit.on_store_error),
                        )
                    };
                    RequestThrottle::new(counter(), counter())
                }
                other => bail!("Unknown rate limit backend: {}", other),
            }
        };

        let sweeper = Sweeper {
            limiters,
            memory_store,
            max_idle: refill_span(rate_limit.requests_per_minute, rate_limit.burst),
        };

        let cancel = CancellationToken::new();
        let sweeper_handle = if sweeper.is_needed() {
            let interval = Duration::from_secs(rate_limit.sweep_interval_secs.max(1));
            Some(tokio::spawn(sweeper.run(interval, cancel.clone())))
        } else {
            None
        };

        info!(instance_id = %instance_id, "server started");

        Ok(Self {
            session_service,
            user_directory,
            throttle,
            instance_id,
            sweeper_handle: Mutex::new(sweeper_handle),
            cancel,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Token for one request; cancelled when the server shuts down.
    pub fn request_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub async fn shutdown(&self) {
        info!(instance_id = %self.instance_id, "server shutting down...");

        self.cancel.cancel();

        let handle = self
            .sweeper_handle
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("sweeper handle dropped: {:?}", r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refill_span_covers_burst() {
        assert_eq!(refill_span(60, 0), Duration::from_secs(60));
        assert_eq!(refill_span(60, 30), Duration::from_secs(90));
    }

    #[test]
    fn refill_span_handles_huge_burst() {
        let span = refill_span(u32::MAX, u32::MAX);
        assert_eq!(span, Duration::from_secs(120));
        assert!(refill_span(1, u32::MAX) > Duration::from_secs(60));
    }
}
