//! Configuración de cache
//!
//! Este módulo contiene la configuración y el contrato del sistema de cache.

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Configuración del cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub redis_url: String,
    pub default_ttl: u64,
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            default_ttl: 86400, // 24 horas
            key_prefix: "repair_orders".to_string(),
        }
    }
}

/// Operaciones de cache sobre valores serializados
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    async fn set_raw(&self, key: &str, value: String, ttl: u64) -> Result<()>;
}

/// Leer un valor JSON del cache. Un valor corrupto cuenta como miss.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn CacheStore, key: &str) -> Result<Option<T>> {
    match cache.get_raw(key).await? {
        Some(raw) => Ok(serde_json::from_str(&raw).ok()),
        None => Ok(None),
    }
}

/// Guardar un valor JSON en el cache
pub async fn set_json<T: Serialize + Sync>(cache: &dyn CacheStore, key: &str, value: &T, ttl: u64) -> Result<()> {
    let serialized = serde_json::to_string(value)?;
    cache.set_raw(key, serialized, ttl).await
}
