//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno y variables de configuración.
//! Todas las variables tienen un valor por defecto salvo las opcionales.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Datos de la empresa que aparecen en facturas y presupuestos
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyInfo {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub website: String,
}

impl Default for CompanyInfo {
    fn default() -> Self {
        Self {
            name: "Auto Repair Shop".to_string(),
            address: "123 Main Street, Anytown, USA".to_string(),
            phone: "(555) 123-4567".to_string(),
            email: "service@autorepair.example".to_string(),
            website: "www.autorepair.example".to_string(),
        }
    }
}

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub cors_origins: Vec<String>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub vin_decoder_url: String,
    pub upload_dir: String,
    pub extraction_timeout: Duration,
    pub extraction_max_retries: u32,
    pub extraction_backoff: Duration,
    pub confidence_threshold: f32,
    pub intake_queue_capacity: usize,
    pub intake_workers: usize,
    pub max_upload_bytes: usize,
    pub company: CompanyInfo,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
            jwt_secret: "development-secret-change-me".to_string(),
            jwt_expiration: 86400,
            cors_origins: Vec::new(),
            database_url: None,
            redis_url: None,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            vin_decoder_url: "https://vpic.nhtsa.dot.gov/api/vehicles".to_string(),
            upload_dir: "uploads".to_string(),
            extraction_timeout: Duration::from_secs(30),
            extraction_max_retries: 2,
            extraction_backoff: Duration::from_millis(500),
            confidence_threshold: 0.6,
            intake_queue_capacity: 64,
            intake_workers: 4,
            max_upload_bytes: 50 * 1024 * 1024,
            company: CompanyInfo::default(),
        }
    }
}

fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e)),
        _ => Ok(default),
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl EnvironmentConfig {
    /// Leer la configuración desde variables de entorno
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let company_defaults = CompanyInfo::default();

        let config = Self {
            environment: var_or("ENVIRONMENT", defaults.environment)?,
            port: var_or("PORT", defaults.port)?,
            host: var_or("HOST", defaults.host)?,
            jwt_secret: var_or("JWT_SECRET", defaults.jwt_secret)?,
            jwt_expiration: var_or("JWT_EXPIRATION", defaults.jwt_expiration)?,
            cors_origins: optional_var("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            database_url: optional_var("DATABASE_URL"),
            redis_url: optional_var("REDIS_URL"),
            openai_api_key: optional_var("OPENAI_API_KEY"),
            openai_base_url: var_or("OPENAI_BASE_URL", defaults.openai_base_url)?,
            vin_decoder_url: var_or("VIN_DECODER_URL", defaults.vin_decoder_url)?,
            upload_dir: var_or("UPLOAD_DIR", defaults.upload_dir)?,
            extraction_timeout: Duration::from_secs(var_or("EXTRACTION_TIMEOUT_SECS", 30u64)?),
            extraction_max_retries: var_or("EXTRACTION_MAX_RETRIES", defaults.extraction_max_retries)?,
            extraction_backoff: Duration::from_millis(var_or("EXTRACTION_BACKOFF_MS", 500u64)?),
            confidence_threshold: var_or("CONFIDENCE_THRESHOLD", defaults.confidence_threshold)?,
            intake_queue_capacity: var_or("INTAKE_QUEUE_CAPACITY", defaults.intake_queue_capacity)?,
            intake_workers: var_or("INTAKE_WORKERS", defaults.intake_workers)?,
            max_upload_bytes: var_or("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            company: CompanyInfo {
                name: var_or("COMPANY_NAME", company_defaults.name)?,
                address: var_or("COMPANY_ADDRESS", company_defaults.address)?,
                phone: var_or("COMPANY_PHONE", company_defaults.phone)?,
                email: var_or("COMPANY_EMAIL", company_defaults.email)?,
                website: var_or("COMPANY_WEBSITE", company_defaults.website)?,
            },
        };

        if !(0.0..=1.0).contains(&config.confidence_threshold) {
            anyhow::bail!("CONFIDENCE_THRESHOLD must be between 0 and 1");
        }
        if config.intake_workers == 0 || config.intake_queue_capacity == 0 {
            anyhow::bail!("INTAKE_WORKERS and INTAKE_QUEUE_CAPACITY must be greater than 0");
        }

        Ok(config)
    }

    /// Verificar si estamos en modo desarrollo
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Verificar si estamos en modo producción
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Obtener la dirección del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_addr(&self) -> Result<std::net::SocketAddr> {
        self.server_url()
            .parse()
            .with_context(|| format!("invalid listen address {}", self.server_url()))
    }
}
