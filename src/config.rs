//! Supabase connection config and the prioritized source chain.
//!
//! Sources, in priority order:
//! 1. `supabase.json` at a well-known path (stable across deployments)
//! 2. values baked into the artifact at build time
//!    (`CEREAL_SUPABASE_URL` / `CEREAL_SUPABASE_ANON_KEY`)
//! 3. process env (`NEXT_PUBLIC_SUPABASE_URL` / `SUPABASE_URL` pairs,
//!    public-prefixed names win)
//! 4. the deployment's `/api/supabase-config` endpoint, last resort since it
//!    does not exist on static hosting
//!
//! The first source that yields both a non-empty URL and a non-empty key
//! wins; the result is cached for the process lifetime.

use std::path::PathBuf;

use log::{debug, info};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::error::{Error, Result};

/// Origin queried by the remote config source when `CEREAL_API_ORIGIN` is
/// not set.
pub const DEFAULT_API_ORIGIN: &str = "https://cereal-rewards.vercel.app";

/// Resolved connection credentials. Both fields are non-empty; a source that
/// cannot satisfy that is reported unavailable instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

impl SupabaseConfig {
    fn from_parts(url: Option<String>, anon_key: Option<String>) -> Option<Self> {
        match (url, anon_key) {
            (Some(url), Some(anon_key)) if !url.is_empty() && !anon_key.is_empty() => {
                Some(Self { url, anon_key })
            }
            _ => None,
        }
    }

    /// Base URL without a trailing slash; REST and auth paths join onto it.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Outcome of probing a single source. Failures are data, not exceptions;
/// the chain decision is a plain first-complete scan.
#[derive(Debug, Clone)]
pub enum SourceOutcome {
    Complete(SupabaseConfig),
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn probe(&self) -> SourceOutcome;
}

/// Wire shape shared by the static file and the remote endpoint.
#[derive(Debug, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    url: Option<String>,
    #[serde(rename = "anonKey", default)]
    anon_key: Option<String>,
}

impl ConfigDocument {
    fn into_config(self) -> Option<SupabaseConfig> {
        SupabaseConfig::from_parts(self.url, self.anon_key)
    }
}

/// Source 1: a JSON document at a well-known path.
pub struct StaticFileSource {
    path: PathBuf,
}

impl StaticFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for StaticFileSource {
    fn default() -> Self {
        Self::new("supabase.json")
    }
}

#[async_trait::async_trait]
impl ConfigSource for StaticFileSource {
    fn name(&self) -> &'static str {
        "static supabase.json"
    }

    async fn probe(&self) -> SourceOutcome {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                return SourceOutcome::Unavailable(format!("{}: {e}", self.path.display()));
            }
        };
        let doc: ConfigDocument = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                return SourceOutcome::Unavailable(format!(
                    "malformed {}: {e}",
                    self.path.display()
                ));
            }
        };
        match doc.into_config() {
            Some(cfg) => SourceOutcome::Complete(cfg),
            None => SourceOutcome::Unavailable(format!(
                "{} is missing url or anonKey",
                self.path.display()
            )),
        }
    }
}

/// Source 2: values baked into the artifact at build time. Distributed
/// builds carry the public pair here so they work with no runtime config at
/// all.
pub struct EmbeddedSource;

#[async_trait::async_trait]
impl ConfigSource for EmbeddedSource {
    fn name(&self) -> &'static str {
        "embedded build metadata"
    }

    async fn probe(&self) -> SourceOutcome {
        let url = option_env!("CEREAL_SUPABASE_URL").map(str::to_string);
        let anon_key = option_env!("CEREAL_SUPABASE_ANON_KEY").map(str::to_string);
        match SupabaseConfig::from_parts(url, anon_key) {
            Some(cfg) => SourceOutcome::Complete(cfg),
            None => SourceOutcome::Unavailable("no values baked into this build".into()),
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Source 3: process environment, with `.env` hydration as a dev
/// convenience.
pub struct EnvSource;

#[async_trait::async_trait]
impl ConfigSource for EnvSource {
    fn name(&self) -> &'static str {
        "environment variables"
    }

    async fn probe(&self) -> SourceOutcome {
        // Missing .env file is fine.
        let _ = dotenvy::dotenv();
        let url = env_non_empty("NEXT_PUBLIC_SUPABASE_URL")
            .or_else(|| env_non_empty("SUPABASE_URL"));
        let anon_key = env_non_empty("NEXT_PUBLIC_SUPABASE_ANON_KEY")
            .or_else(|| env_non_empty("SUPABASE_ANON_KEY"));
        match SupabaseConfig::from_parts(url, anon_key) {
            Some(cfg) => SourceOutcome::Complete(cfg),
            None => SourceOutcome::Unavailable(
                "NEXT_PUBLIC_SUPABASE_URL / SUPABASE_URL pair not set".into(),
            ),
        }
    }
}

/// Source 4: the deployment's config endpoint.
pub struct ConfigServiceSource {
    origin: String,
}

impl ConfigServiceSource {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }

    /// Origin from `CEREAL_API_ORIGIN`, else the default deployment.
    pub fn from_env() -> Self {
        Self::new(env_non_empty("CEREAL_API_ORIGIN").unwrap_or_else(|| DEFAULT_API_ORIGIN.into()))
    }
}

#[async_trait::async_trait]
impl ConfigSource for ConfigServiceSource {
    fn name(&self) -> &'static str {
        "remote config endpoint"
    }

    async fn probe(&self) -> SourceOutcome {
        let endpoint = format!(
            "{}/api/supabase-config",
            self.origin.trim_end_matches('/')
        );
        let http = match reqwest::Client::builder().build() {
            Ok(http) => http,
            Err(e) => return SourceOutcome::Unavailable(format!("http client: {e}")),
        };
        let resp = match http
            .get(&endpoint)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return SourceOutcome::Unavailable(format!("{endpoint}: {e}")),
        };
        if !resp.status().is_success() {
            return SourceOutcome::Unavailable(format!(
                "{endpoint} answered {}",
                resp.status()
            ));
        }
        let doc: ConfigDocument = match resp.json().await {
            Ok(doc) => doc,
            Err(e) => return SourceOutcome::Unavailable(format!("{endpoint}: {e}")),
        };
        match doc.into_config() {
            Some(cfg) => SourceOutcome::Complete(cfg),
            None => SourceOutcome::Unavailable(format!("{endpoint} returned incomplete config")),
        }
    }
}

/// Walks the chain in order. Probing stops at the first complete source, so
/// the remote endpoint is only contacted when everything local came up
/// empty. All-unavailable surfaces as one terminal error naming every
/// checked source.
async fn first_complete(sources: &[Box<dyn ConfigSource>]) -> Result<SupabaseConfig> {
    for source in sources {
        match source.probe().await {
            SourceOutcome::Complete(cfg) => {
                info!("supabase config resolved from {}", source.name());
                return Ok(cfg);
            }
            SourceOutcome::Unavailable(reason) => {
                debug!("config source {} unavailable: {reason}", source.name());
            }
        }
    }
    let sources = sources
        .iter()
        .map(|s| s.name())
        .collect::<Vec<_>>()
        .join(", ");
    Err(Error::ConfigurationUnresolved { sources })
}

/// Ordered source chain with a memoized result.
pub struct ConfigResolver {
    sources: Vec<Box<dyn ConfigSource>>,
    cell: OnceCell<SupabaseConfig>,
}

impl ConfigResolver {
    /// The standard chain described in the module docs.
    pub fn standard() -> Self {
        Self::with_sources(vec![
            Box::new(StaticFileSource::default()),
            Box::new(EmbeddedSource),
            Box::new(EnvSource),
            Box::new(ConfigServiceSource::from_env()),
        ])
    }

    pub fn with_sources(sources: Vec<Box<dyn ConfigSource>>) -> Self {
        Self {
            sources,
            cell: OnceCell::new(),
        }
    }

    /// First complete source wins. The winner is cached for the process
    /// lifetime; later calls return it without touching any source, and
    /// concurrent first calls share a single attempt.
    pub async fn resolve(&self) -> Result<SupabaseConfig> {
        self.cell
            .get_or_try_init(|| first_complete(&self.sources))
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedSource {
        name: &'static str,
        outcome: SourceOutcome,
        probes: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ConfigSource for FixedSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn probe(&self) -> SourceOutcome {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn complete(name: &'static str, url: &str, key: &str) -> (Box<dyn ConfigSource>, Arc<AtomicUsize>) {
        let probes = Arc::new(AtomicUsize::new(0));
        let source = FixedSource {
            name,
            outcome: SourceOutcome::Complete(SupabaseConfig {
                url: url.into(),
                anon_key: key.into(),
            }),
            probes: probes.clone(),
        };
        (Box::new(source), probes)
    }

    fn unavailable(name: &'static str) -> (Box<dyn ConfigSource>, Arc<AtomicUsize>) {
        let probes = Arc::new(AtomicUsize::new(0));
        let source = FixedSource {
            name,
            outcome: SourceOutcome::Unavailable("down".into()),
            probes: probes.clone(),
        };
        (Box::new(source), probes)
    }

    const NAMES: [&str; 4] = ["file", "embedded", "env", "remote"];

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[tokio::test]
    async fn first_complete_source_wins_for_every_position() {
        init_logs();
        for winner in 0..NAMES.len() {
            let mut sources: Vec<Box<dyn ConfigSource>> = Vec::new();
            for i in 0..NAMES.len() {
                let (source, _) = if i < winner {
                    unavailable(NAMES[i])
                } else {
                    complete(NAMES[i], &format!("https://s{i}.test"), &format!("k{i}"))
                };
                sources.push(source);
            }
            let resolver = ConfigResolver::with_sources(sources);
            let cfg = resolver.resolve().await.unwrap();
            assert_eq!(cfg.url, format!("https://s{winner}.test"));
            assert_eq!(cfg.anon_key, format!("k{winner}"));
        }
    }

    #[tokio::test]
    async fn sources_after_the_winner_are_not_probed() {
        let (first, first_probes) = complete("file", "https://x.test", "k1");
        let (second, second_probes) = complete("env", "https://y.test", "k2");
        let resolver = ConfigResolver::with_sources(vec![first, second]);

        let cfg = resolver.resolve().await.unwrap();
        assert_eq!(cfg.url, "https://x.test");
        assert_eq!(first_probes.load(Ordering::SeqCst), 1);
        assert_eq!(second_probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolution_is_memoized() {
        let (source, probes) = complete("file", "https://x.test", "k1");
        let resolver = ConfigResolver::with_sources(vec![source]);

        let a = resolver.resolve().await.unwrap();
        let b = resolver.resolve().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_unavailable_names_every_checked_source() {
        let sources = NAMES
            .iter()
            .copied()
            .map(|name| unavailable(name).0)
            .collect::<Vec<_>>();
        let resolver = ConfigResolver::with_sources(sources);

        let err = resolver.resolve().await.unwrap_err();
        let message = err.to_string();
        for name in NAMES {
            assert!(message.contains(name), "{message} should name {name}");
        }
    }

    #[tokio::test]
    async fn static_file_source_reads_wellknown_document() {
        let path = std::env::temp_dir().join(format!(
            "cereal-client-config-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{"url":"https://x.test","anonKey":"k1"}"#).unwrap();

        let resolver =
            ConfigResolver::with_sources(vec![Box::new(StaticFileSource::new(&path))]);
        let cfg = resolver.resolve().await.unwrap();
        assert_eq!(
            cfg,
            SupabaseConfig {
                url: "https://x.test".into(),
                anon_key: "k1".into(),
            }
        );

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn static_file_source_rejects_incomplete_document() {
        let path = std::env::temp_dir().join(format!(
            "cereal-client-partial-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{"url":"https://x.test"}"#).unwrap();

        let source = StaticFileSource::new(&path);
        assert!(matches!(source.probe().await, SourceOutcome::Unavailable(_)));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(source.probe().await, SourceOutcome::Unavailable(_)));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn env_source_reads_unprefixed_pair() {
        std::env::set_var("SUPABASE_URL", "https://y.test");
        std::env::set_var("SUPABASE_ANON_KEY", "k2");

        let resolver = ConfigResolver::with_sources(vec![Box::new(EnvSource)]);
        let cfg = resolver.resolve().await.unwrap();
        assert_eq!(cfg.url, "https://y.test");
        assert_eq!(cfg.anon_key, "k2");

        std::env::remove_var("SUPABASE_URL");
        std::env::remove_var("SUPABASE_ANON_KEY");
    }

    #[test]
    fn from_parts_requires_both_fields_non_empty() {
        assert!(SupabaseConfig::from_parts(Some("u".into()), Some("k".into())).is_some());
        assert!(SupabaseConfig::from_parts(Some("u".into()), Some("".into())).is_none());
        assert!(SupabaseConfig::from_parts(Some("".into()), Some("k".into())).is_none());
        assert!(SupabaseConfig::from_parts(None, Some("k".into())).is_none());
        assert!(SupabaseConfig::from_parts(Some("u".into()), None).is_none());
    }

    #[test]
    fn base_url_trims_trailing_slash() {
        let cfg = SupabaseConfig {
            url: "https://x.test/".into(),
            anon_key: "k".into(),
        };
        assert_eq!(cfg.base_url(), "https://x.test");
    }
}
