//! Artefactos de media y resultados de extracción
//!
//! Un artefacto es inmutable una vez escrito. Cada corrida de extracción agrega
//! un `ExtractionRecord` nuevo; nunca se edita uno existente.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Audio,
    VinImage,
    OdometerImage,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio",
            ArtifactKind::VinImage => "vin_image",
            ArtifactKind::OdometerImage => "odometer_image",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "audio" => Some(ArtifactKind::Audio),
            "vin_image" => Some(ArtifactKind::VinImage),
            "odometer_image" => Some(ArtifactKind::OdometerImage),
            _ => None,
        }
    }

    /// Directorio del media store según el tipo
    pub fn folder(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio",
            ArtifactKind::VinImage | ArtifactKind::OdometerImage => "images",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaArtifact {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kind: ArtifactKind,
    /// Orden de llegada dentro del intake
    pub position: i32,
    pub media_key: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub content_digest: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// Clase de fallo de extracción
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionErrorKind {
    Timeout,
    UpstreamFailure,
    LowConfidence,
}

impl ExtractionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionErrorKind::Timeout => "timeout",
            ExtractionErrorKind::UpstreamFailure => "upstream_failure",
            ExtractionErrorKind::LowConfidence => "low_confidence",
        }
    }
}

impl fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Campos estructurados obtenidos de un artefacto
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractedFields {
    Transcript {
        text: String,
    },
    Vin {
        vin: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        make: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Odometer {
        mileage: u32,
    },
}

/// Resultado de un artefacto en una corrida
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArtifactOutcome {
    Succeeded { fields: ExtractedFields },
    LowConfidence { reason: String },
    Failed { kind: ExtractionErrorKind, reason: String },
}

impl ArtifactOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactOutcome::Succeeded { .. } => "succeeded",
            ArtifactOutcome::LowConfidence { .. } => "low_confidence",
            ArtifactOutcome::Failed { .. } => "failed",
        }
    }

    pub fn fields(&self) -> Option<&ExtractedFields> {
        match self {
            ArtifactOutcome::Succeeded { fields } => Some(fields),
            _ => None,
        }
    }
}

/// Entrada del arena de resultados, indexada por (artifact_id, run_id)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionRecord {
    pub id: Uuid,
    pub artifact_id: Uuid,
    pub order_id: Uuid,
    pub run_id: Uuid,
    pub outcome: ArtifactOutcome,
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_json_is_tagged() {
        let outcome = ArtifactOutcome::Failed {
            kind: ExtractionErrorKind::Timeout,
            reason: "30s elapsed".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["kind"], "timeout");

        let success = ArtifactOutcome::Succeeded {
            fields: ExtractedFields::Odometer { mileage: 45_000 },
        };
        let json = serde_json::to_value(&success).unwrap();
        assert_eq!(json["fields"]["type"], "odometer");
        assert_eq!(json["fields"]["mileage"], 45_000);
    }

    #[test]
    fn test_artifact_kind_parse() {
        assert_eq!(ArtifactKind::parse("vin_image"), Some(ArtifactKind::VinImage));
        assert_eq!(ArtifactKind::parse("selfie"), None);
        assert_eq!(ArtifactKind::OdometerImage.folder(), "images");
    }
}
