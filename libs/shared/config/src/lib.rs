use std::env;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which backing store the scheduling core talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Supabase,
}

impl StoreBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" => Some(StoreBackend::Memory),
            "supabase" | "postgrest" => Some(StoreBackend::Supabase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub store_backend: StoreBackend,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            store_backend: match env::var("SCHEDULING_STORE") {
                Ok(value) => StoreBackend::parse(&value).unwrap_or_else(|| {
                    warn!("SCHEDULING_STORE has unknown value '{}', using memory store", value);
                    StoreBackend::Memory
                }),
                Err(_) => StoreBackend::Memory,
            },
            server_port: env::var("PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(3000),
        };

        if config.store_backend == StoreBackend::Supabase && !config.is_configured() {
            warn!("Supabase store selected but SUPABASE_URL / SUPABASE_ANON_PUBLIC_KEY are missing");
        }

        config
    }

    /// Config for a process-local deployment with no remote store.
    pub fn in_memory() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            store_backend: StoreBackend::Memory,
            server_port: 3000,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
    }
}
