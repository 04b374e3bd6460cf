//! Application-lifetime state: the one place a backend client gets built.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::client::{ClientOptions, SupabaseClient};
use crate::config::ConfigResolver;
use crate::error::Result;

/// Owns the config resolver and the memoized client. Hosts create one of
/// these at startup and hand the `Arc<SupabaseClient>` it yields to every
/// feature wrapper.
pub struct AppState {
    resolver: ConfigResolver,
    options: ClientOptions,
    client_cell: OnceCell<Arc<SupabaseClient>>,
}

impl AppState {
    /// Standard source chain, default client options.
    pub fn new() -> Self {
        Self::with_resolver(ConfigResolver::standard(), ClientOptions::default())
    }

    pub fn with_resolver(resolver: ConfigResolver, options: ClientOptions) -> Self {
        Self {
            resolver,
            options,
            client_cell: OnceCell::new(),
        }
    }

    /// The memoized client. The initialization future itself is shared, not
    /// just its result, so any number of concurrent first callers trigger
    /// exactly one config resolution and one client construction.
    pub async fn client(&self) -> Result<Arc<SupabaseClient>> {
        self.client_cell
            .get_or_try_init(|| async {
                let config = self.resolver.resolve().await?;
                let client = SupabaseClient::new(config, self.options.clone())?;
                client.restore_persisted_session().await;
                Ok(Arc::new(client))
            })
            .await
            .cloned()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::{ConfigSource, SourceOutcome, SupabaseConfig};

    struct CountingSource {
        probes: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ConfigSource for CountingSource {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn probe(&self) -> SourceOutcome {
            self.probes.fetch_add(1, Ordering::SeqCst);
            SourceOutcome::Complete(SupabaseConfig {
                url: "https://x.test".into(),
                anon_key: "k1".into(),
            })
        }
    }

    fn counting_state(probes: Arc<AtomicUsize>) -> AppState {
        AppState::with_resolver(
            ConfigResolver::with_sources(vec![Box::new(CountingSource { probes })]),
            ClientOptions {
                persist_session: false,
                ..ClientOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_construction() {
        let _ = env_logger::builder().is_test(true).try_init();
        let probes = Arc::new(AtomicUsize::new(0));
        let state = Arc::new(counting_state(probes.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let state = state.clone();
            handles.push(tokio::spawn(async move { state.client().await.unwrap() }));
        }
        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap());
        }

        assert_eq!(probes.load(Ordering::SeqCst), 1);
        for client in &clients[1..] {
            assert!(Arc::ptr_eq(&clients[0], client));
        }
    }

    #[tokio::test]
    async fn sequential_callers_reuse_the_cached_client() {
        let probes = Arc::new(AtomicUsize::new(0));
        let state = counting_state(probes.clone());

        let a = state.client().await.unwrap();
        let b = state.client().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }
}
