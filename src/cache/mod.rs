//! Cache
//!
//! Este módulo contiene el sistema de cache (Redis) usado para las
//! decodificaciones de VIN.

pub mod cache_config;
pub mod redis_client;

pub use cache_config::{CacheConfig, CacheStore};
