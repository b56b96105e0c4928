//! Extraction Gateway
//!
//! Contrato estrecho hacia los servicios externos de transcripción, visión y
//! resumen, más la política de timeout y reintentos que envuelve cada llamada.

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::models::line_item::LineItemKind;
pub use crate::models::media::ExtractionErrorKind;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    pub message: String,
}

impl ExtractionError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ExtractionErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            kind: ExtractionErrorKind::UpstreamFailure,
            message: message.into(),
        }
    }

    pub fn low_confidence(message: impl Into<String>) -> Self {
        Self {
            kind: ExtractionErrorKind::LowConfidence,
            message: message.into(),
        }
    }

    /// Solo Timeout y UpstreamFailure se reintentan
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ExtractionErrorKind::Timeout | ExtractionErrorKind::UpstreamFailure
        )
    }
}

/// Blob leído del media store listo para enviar
#[derive(Debug, Clone)]
pub struct MediaBlob {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Vin,
    Odometer,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Vin => "vin",
            ImageKind::Odometer => "odometer",
        }
    }
}

/// Campos extraídos de una imagen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageExtraction {
    pub vin: Option<String>,
    pub odometer: Option<u32>,
}

/// Partida propuesta por el resumen; el total lo recalcula el motor de totales
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedLineItem {
    pub description: String,
    pub kind: LineItemKind,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkSummaryProposal {
    pub work_summary: String,
    pub line_items: Vec<ProposedLineItem>,
}

/// Contexto del vehículo que acompaña al resumen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryContext {
    pub vin: Option<String>,
    pub mileage: Option<u32>,
}

#[async_trait]
pub trait ExtractionGateway: Send + Sync {
    async fn extract_audio(&self, blob: &MediaBlob) -> Result<String, ExtractionError>;

    async fn extract_image(
        &self,
        blob: &MediaBlob,
        kind: ImageKind,
    ) -> Result<ImageExtraction, ExtractionError>;

    async fn summarize(
        &self,
        transcripts: &[String],
        context: &SummaryContext,
    ) -> Result<WorkSummaryProposal, ExtractionError>;
}

/// Timeout por llamada y reintentos con backoff exponencial
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(timeout: Duration, max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            timeout,
            max_retries,
            base_backoff,
        }
    }

    /// Espera antes del reintento `attempt` (1-based), con jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.base_backoff.saturating_mul(1u32 << exponent);
        let jitter_ceiling = (self.base_backoff.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_ceiling);
        base + Duration::from_millis(jitter)
    }

    /// Ejecutar la llamada con timeout y reintentos. Devuelve el resultado y
    /// el número de intentos realizados.
    pub async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> (Result<T, ExtractionError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExtractionError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ExtractionError::timeout(format!(
                    "{} exceeded {}s",
                    label,
                    self.timeout.as_secs_f32()
                ))),
            };

            match result {
                Ok(value) => return (Ok(value), attempts),
                Err(e) if e.is_retryable() && attempts <= self.max_retries => {
                    let wait = self.backoff(attempts);
                    log::warn!(
                        "🔁 {} falló ({}), reintento {}/{} en {:?}",
                        label,
                        e,
                        attempts,
                        self.max_retries,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return (Err(e), attempts),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(50), 2, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retries_upstream_failures_then_gives_up() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let (result, attempts) = fast_policy()
            .run("audio", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ExtractionError::upstream("502"))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ExtractionErrorKind::UpstreamFailure);
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_low_confidence_is_not_retried() {
        let (result, attempts) = fast_policy()
            .run("vin", || async {
                Err::<(), _>(ExtractionError::low_confidence("0.2 < 0.6"))
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ExtractionErrorKind::LowConfidence);
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_slow_call_becomes_timeout() {
        let policy = RetryPolicy::new(Duration::from_millis(5), 0, Duration::from_millis(1));
        let (result, attempts) = policy
            .run("odometer", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, ExtractionError>(1)
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ExtractionErrorKind::Timeout);
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let (result, attempts) = fast_policy()
            .run("summary", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ExtractionError::timeout("slow"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 2, Duration::from_millis(100));
        let first = policy.backoff(1);
        let second = policy.backoff(2);
        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(150));
        assert!(second >= Duration::from_millis(200) && second < Duration::from_millis(250));
    }
}
