//! Decodificador de VIN (NHTSA vPIC)
//!
//! Completa año, marca y modelo a partir de un VIN válido. Un fallo de
//! decodificación nunca es fatal para la orden.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::cache_config::{get_json, set_json};
use crate::cache::CacheStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedVehicle {
    pub year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
}

impl DecodedVehicle {
    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.make.is_none() && self.model.is_none()
    }
}

#[async_trait]
pub trait VinDecoder: Send + Sync {
    async fn decode(&self, vin: &str) -> Result<DecodedVehicle>;
}

pub struct NhtsaVinDecoder {
    client: reqwest::Client,
    base_url: String,
    cache: Option<Arc<dyn CacheStore>>,
    cache_ttl: u64,
}

impl NhtsaVinDecoder {
    pub fn new(base_url: String, cache: Option<Arc<dyn CacheStore>>, cache_ttl: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
            cache_ttl,
        })
    }

    fn cache_key(vin: &str) -> String {
        format!("vin:{}", vin)
    }

    async fn fetch(&self, vin: &str) -> Result<DecodedVehicle> {
        let url = format!(
            "{}/decodevin/{}?format=json",
            self.base_url,
            urlencoding::encode(vin)
        );

        log::info!("🌐 Decodificando VIN {} en NHTSA", vin);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::error!("❌ NHTSA respondió {}: {}", status, error_text);
            return Err(anyhow!("VIN decode failed with status {}", status));
        }

        let body: Value = response.json().await?;
        let decoded = parse_decode_response(&body);
        if decoded.is_empty() {
            return Err(anyhow!("VIN decode returned no vehicle data"));
        }

        Ok(decoded)
    }
}

#[async_trait]
impl VinDecoder for NhtsaVinDecoder {
    async fn decode(&self, vin: &str) -> Result<DecodedVehicle> {
        let key = Self::cache_key(vin);

        if let Some(cache) = &self.cache {
            match get_json::<DecodedVehicle>(cache.as_ref(), &key).await {
                Ok(Some(hit)) => return Ok(hit),
                Ok(None) => {}
                Err(e) => log::warn!("⚠️ Cache de VIN no disponible: {}", e),
            }
        }

        let decoded = self.fetch(vin).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = set_json(cache.as_ref(), &key, &decoded, self.cache_ttl).await {
                log::warn!("⚠️ No se pudo cachear el VIN {}: {}", vin, e);
            }
        }

        log::info!(
            "✅ VIN decodificado: {:?} {:?} {:?}",
            decoded.year,
            decoded.make,
            decoded.model
        );
        Ok(decoded)
    }
}

/// Extraer "Model Year", "Make" y "Model" de la respuesta `decodevin`
pub fn parse_decode_response(body: &Value) -> DecodedVehicle {
    let mut decoded = DecodedVehicle::default();

    let results = body["Results"].as_array().map(Vec::as_slice).unwrap_or_default();
    for entry in results {
        let value = entry["Value"]
            .as_str()
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let Some(value) = value else { continue };

        match entry["Variable"].as_str() {
            Some("Model Year") => decoded.year = value.parse().ok(),
            Some("Make") => decoded.make = Some(value.to_string()),
            Some("Model") => decoded.model = Some(value.to_string()),
            _ => {}
        }
    }

    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MapCache {
        entries: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl CacheStore for MapCache {
        async fn get_raw(&self, key: &str) -> Result<Option<String>> {
            Ok(self.entries.lock().await.get(key).cloned())
        }

        async fn set_raw(&self, key: &str, value: String, _ttl: u64) -> Result<()> {
            self.entries.lock().await.insert(key.to_string(), value);
            Ok(())
        }
    }

    #[test]
    fn test_parse_decode_response() {
        let body = json!({
            "Count": 4,
            "Results": [
                { "Variable": "Make", "Value": "HONDA" },
                { "Variable": "Model", "Value": "Accord" },
                { "Variable": "Model Year", "Value": "2003" },
                { "Variable": "Trim", "Value": null }
            ]
        });

        let decoded = parse_decode_response(&body);
        assert_eq!(decoded.year, Some(2003));
        assert_eq!(decoded.make.as_deref(), Some("HONDA"));
        assert_eq!(decoded.model.as_deref(), Some("Accord"));
    }

    #[test]
    fn test_parse_empty_values() {
        let body = json!({ "Results": [{ "Variable": "Make", "Value": "" }] });
        assert!(parse_decode_response(&body).is_empty());
        assert!(parse_decode_response(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let cache = Arc::new(MapCache::default());
        let cached = DecodedVehicle {
            year: Some(2019),
            make: Some("MACK".to_string()),
            model: Some("Anthem".to_string()),
        };
        set_json(cache.as_ref(), "vin:1M8GDM9AXKP042788", &cached, 60)
            .await
            .unwrap();

        // URL inalcanzable: solo un hit de cache puede responder
        let decoder = NhtsaVinDecoder::new("http://127.0.0.1:9".to_string(), Some(cache), 60).unwrap();
        let decoded = decoder.decode("1M8GDM9AXKP042788").await.unwrap();
        assert_eq!(decoded, cached);
    }
}
