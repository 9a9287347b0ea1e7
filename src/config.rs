use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::engine::draft_engine::EngineConfig;
use crate::web::champions::CatalogConfig;

/// Top-level server configuration, loaded from draftroom.toml.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub rooms: RoomsSection,
    pub catalog: CatalogSection,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// HTTP surface: champion catalog, draft snapshots, static frontend.
    pub web_address: String,
    /// Draft protocol listener (newline-delimited JSON over TCP).
    pub draft_address: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            web_address: "0.0.0.0:8080".into(),
            draft_address: "0.0.0.0:4500".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct RoomsSection {
    /// Seconds an unoccupied room survives before deletion.
    pub idle_timeout_secs: u64,
    /// Code of the pinned default room. Empty disables it.
    pub default_room: String,
}

impl Default for RoomsSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            default_room: "LOBBY".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    /// Upstream Data Dragon base URL.
    pub base_url: String,
    pub cache_ttl_secs: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        let defaults = CatalogConfig::default();
        Self {
            base_url: defaults.base_url,
            cache_ttl_secs: defaults.cache_ttl.as_secs(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> Self {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("failed to read config file {}: {}", path, e));
            toml::from_str(&contents)
                .unwrap_or_else(|e| panic!("failed to parse config file {}: {}", path, e))
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WEB_ADDRESS") {
            self.server.web_address = v;
        }
        // PORT (as container platforms set it) replaces only the web port.
        if let Ok(v) = std::env::var("PORT")
            && let Ok(port) = v.parse::<u16>()
            && let Some((host, _)) = self.server.web_address.rsplit_once(':')
        {
            self.server.web_address = format!("{host}:{port}");
        }
        if let Ok(v) = std::env::var("DRAFT_ADDRESS") {
            self.server.draft_address = v;
        }
        if let Ok(v) = std::env::var("ROOM_IDLE_TIMEOUT_SECS")
            && let Ok(secs) = v.parse()
        {
            self.rooms.idle_timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("DEFAULT_ROOM") {
            self.rooms.default_room = v;
        }
        if let Ok(v) = std::env::var("CHAMPIONS_URL") {
            self.catalog.base_url = v;
        }
    }

    /// The room-engine slice of the configuration.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            room_idle_timeout: Duration::from_secs(self.rooms.idle_timeout_secs),
            default_room: if self.rooms.default_room.is_empty() {
                None
            } else {
                Some(self.rooms.default_room.clone())
            },
        }
    }

    /// The champion-catalog slice of the configuration.
    pub fn to_catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            base_url: self.catalog.base_url.clone(),
            cache_ttl: Duration::from_secs(self.catalog.cache_ttl_secs),
        }
    }
}
