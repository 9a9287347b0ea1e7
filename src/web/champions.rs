use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// One champion as served to clients: enough to render a pick grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampionInfo {
    pub id: String,
    pub name: String,
    pub image: String,
}

/// Where the catalog comes from and how long a fetch stays fresh.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub cache_ttl: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ddragon.leagueoflegends.com".into(),
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

struct CacheEntry {
    fetched_at: Instant,
    champions: Vec<ChampionInfo>,
}

/// Caching proxy for the upstream Data Dragon champion catalog. Serving it
/// from here keeps client traffic off the upstream CDN and pins every
/// client in a room to the same list.
pub struct ChampionCatalog {
    http: reqwest::Client,
    config: CatalogConfig,
    cache: RwLock<Option<CacheEntry>>,
}

impl ChampionCatalog {
    pub fn new(config: CatalogConfig) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Arc::new(Self {
            http,
            config,
            cache: RwLock::new(None),
        })
    }

    /// The current champion list, fetched through the cache. A refresh
    /// failure falls back to stale data when any exists.
    pub async fn champions(&self) -> anyhow::Result<Vec<ChampionInfo>> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref()
                && entry.fetched_at.elapsed() < self.config.cache_ttl
            {
                return Ok(entry.champions.clone());
            }
        }

        let fresh = match self.fetch_catalog().await {
            Ok(fresh) => fresh,
            Err(e) => {
                let cache = self.cache.read().await;
                if let Some(entry) = cache.as_ref() {
                    warn!(error = %e, "champion catalog refresh failed, serving stale data");
                    return Ok(entry.champions.clone());
                }
                return Err(e);
            }
        };

        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            fetched_at: Instant::now(),
            champions: fresh.clone(),
        });
        Ok(fresh)
    }

    /// Two upstream round trips: resolve the latest patch version, then
    /// pull that patch's champion file.
    async fn fetch_catalog(&self) -> anyhow::Result<Vec<ChampionInfo>> {
        let base = &self.config.base_url;
        let versions: Vec<String> = self
            .http
            .get(format!("{base}/api/versions.json"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("failed to parse version list")?;
        let version = versions.first().context("upstream version list is empty")?;

        let body = self
            .http
            .get(format!("{base}/cdn/{version}/data/en_US/champion.json"))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let champions = parse_champion_catalog(base, version, &body)?;
        info!(count = champions.len(), %version, "champion catalog refreshed");
        Ok(champions)
    }
}

#[derive(Deserialize)]
struct DataDragonFile {
    data: HashMap<String, DataDragonChampion>,
}

#[derive(Deserialize)]
struct DataDragonChampion {
    id: String,
    name: String,
    image: DataDragonImage,
}

#[derive(Deserialize)]
struct DataDragonImage {
    full: String,
}

/// Flatten the upstream champion file into our wire shape, with absolute
/// image URLs and a stable name ordering.
fn parse_champion_catalog(
    base_url: &str,
    version: &str,
    body: &str,
) -> anyhow::Result<Vec<ChampionInfo>> {
    let file: DataDragonFile =
        serde_json::from_str(body).context("failed to parse champion file")?;
    let mut champions: Vec<ChampionInfo> = file
        .data
        .into_values()
        .map(|champion| ChampionInfo {
            image: format!(
                "{base_url}/cdn/{version}/img/champion/{}",
                champion.image.full
            ),
            id: champion.id,
            name: champion.name,
        })
        .collect();
    champions.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(champions)
}
