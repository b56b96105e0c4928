//! Gateway de extracción sobre la API de OpenAI
//!
//! Whisper para audio, chat con visión para placas VIN y odómetros, y un
//! prompt de resumen que devuelve JSON con resumen y partidas.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;

use super::extraction_gateway::{
    ExtractionError, ExtractionGateway, ImageExtraction, ImageKind, MediaBlob, ProposedLineItem,
    SummaryContext, WorkSummaryProposal,
};
use super::vin;
use crate::models::line_item::LineItemKind;

lazy_static! {
    static ref MILEAGE: Regex = Regex::new(r"[0-9][0-9,]*").expect("valid mileage regex");
}

const VIN_PROMPT: &str = "Extract the VIN number from this door placard image. \
Respond with a JSON object {\"value\": \"<the 17 character VIN>\", \"confidence\": <0..1>}.";

const ODOMETER_PROMPT: &str = "Read the odometer value from this image in miles. \
Respond with a JSON object {\"value\": <numeric reading>, \"confidence\": <0..1>}.";

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are an expert auto repair service writer who converts technician notes into professional work orders.";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub transcription_model: String,
    pub vision_model: String,
    pub summary_model: String,
    pub confidence_threshold: f32,
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: String, base_url: String, confidence_threshold: f32, request_timeout: Duration) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            transcription_model: "whisper-1".to_string(),
            vision_model: "gpt-4o".to_string(),
            summary_model: "gpt-4o".to_string(),
            confidence_threshold,
            request_timeout,
        }
    }
}

pub struct OpenAiGateway {
    config: OpenAiConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiGateway {
    pub fn new(config: OpenAiConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { config, client })
    }

    async fn chat_completion(&self, payload: Value) -> Result<String, ExtractionError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("❌ OpenAI respondió {}: {}", status, truncate(&body, 300));
            return Err(ExtractionError::upstream(format!("chat completion failed with status {}", status)));
        }

        let body: Value = response.json().await.map_err(map_transport_error)?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ExtractionError::upstream("chat completion without message content"))
    }
}

#[async_trait]
impl ExtractionGateway for OpenAiGateway {
    async fn extract_audio(&self, blob: &MediaBlob) -> Result<String, ExtractionError> {
        log::info!("🎙️ Transcribiendo audio: {} ({} bytes)", blob.file_name, blob.bytes.len());

        let mut part = Part::bytes(blob.bytes.clone()).file_name(blob.file_name.clone());
        if let Some(content_type) = &blob.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| ExtractionError::upstream(format!("invalid audio content type: {}", e)))?;
        }

        let form = Form::new()
            .text("model", self.config.transcription_model.clone())
            .part("file", part);

        let url = format!("{}/audio/transcriptions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("❌ Error de transcripción {}: {}", status, truncate(&body, 300));
            return Err(ExtractionError::upstream(format!("transcription failed with status {}", status)));
        }

        let transcription: TranscriptionResponse = response.json().await.map_err(map_transport_error)?;
        let text = transcription.text.trim().to_string();
        if text.is_empty() {
            return Err(ExtractionError::low_confidence("empty transcript"));
        }

        log::info!("✅ Transcripción completada ({} caracteres)", text.len());
        Ok(text)
    }

    async fn extract_image(&self, blob: &MediaBlob, kind: ImageKind) -> Result<ImageExtraction, ExtractionError> {
        log::info!("📷 Analizando imagen {}: {}", kind.as_str(), blob.file_name);

        let mime = blob.content_type.clone().unwrap_or_else(|| "image/jpeg".to_string());
        let encoded = general_purpose::STANDARD.encode(&blob.bytes);
        let prompt = match kind {
            ImageKind::Vin => VIN_PROMPT,
            ImageKind::Odometer => ODOMETER_PROMPT,
        };

        let payload = json!({
            "model": self.config.vision_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": format!("data:{};base64,{}", mime, encoded) } }
                ]
            }],
            "max_tokens": 100,
            "response_format": { "type": "json_object" }
        });

        let content = self.chat_completion(payload).await?;
        parse_image_reply(&content, kind, self.config.confidence_threshold)
    }

    async fn summarize(
        &self,
        transcripts: &[String],
        context: &SummaryContext,
    ) -> Result<WorkSummaryProposal, ExtractionError> {
        let prompt = summary_prompt(transcripts, context);
        let payload = json!({
            "model": self.config.summary_model,
            "messages": [
                { "role": "system", "content": SUMMARY_SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.2,
            "response_format": { "type": "json_object" }
        });

        let content = self.chat_completion(payload).await?;
        let proposal = parse_summary_reply(&content)?;
        log::info!("📝 Resumen generado con {} partidas", proposal.line_items.len());
        Ok(proposal)
    }
}

fn map_transport_error(e: reqwest::Error) -> ExtractionError {
    if e.is_timeout() {
        ExtractionError::timeout(e.to_string())
    } else {
        ExtractionError::upstream(e.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn summary_prompt(transcripts: &[String], context: &SummaryContext) -> String {
    let vin = context.vin.as_deref().unwrap_or("unknown");
    let mileage = context
        .mileage
        .map(|m| m.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "Based on the following voice memo transcript from an auto technician, create:\n\
         1. A summary of work performed\n\
         2. A detailed list of parts used with prices\n\
         3. An estimate of labor hours and cost (assume $100/hour)\n\n\
         Vehicle information: VIN {}, Mileage: {}\n\n\
         Voice memo transcript:\n{}\n\n\
         Format the response as JSON with these fields:\n\
         {{\"work_summary\": \"Brief description of work done\", \
         \"line_items\": [{{\"description\": \"Part or labor description\", \"type\": \"part|labor\", \
         \"quantity\": number, \"unit_price\": number}}]}}",
        vin,
        mileage,
        transcripts.join(" ")
    )
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    value_as_text(value).and_then(|text| Decimal::from_str(&text).ok())
}

/// Interpretar la respuesta de visión. Si no es JSON se toma el texto crudo
/// como valor sin confianza reportada.
pub fn parse_image_reply(
    content: &str,
    kind: ImageKind,
    threshold: f32,
) -> Result<ImageExtraction, ExtractionError> {
    let (value, confidence) = match serde_json::from_str::<Value>(content) {
        Ok(parsed) if parsed.is_object() => (
            value_as_text(&parsed["value"]),
            parsed["confidence"].as_f64().map(|c| c as f32),
        ),
        _ => (Some(content.trim().to_string()), None),
    };

    if let Some(confidence) = confidence {
        if confidence < threshold {
            return Err(ExtractionError::low_confidence(format!(
                "{} confidence {:.2} below threshold {:.2}",
                kind.as_str(),
                confidence,
                threshold
            )));
        }
    }

    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ExtractionError::low_confidence(format!("no {} value in reply", kind.as_str())))?;

    match kind {
        ImageKind::Vin => {
            let vin = vin::find_candidate(&value).unwrap_or_else(|| vin::normalize(&value));
            Ok(ImageExtraction {
                vin: Some(vin),
                odometer: None,
            })
        }
        ImageKind::Odometer => {
            let mileage = MILEAGE
                .find(&value)
                .and_then(|m| m.as_str().replace(',', "").parse::<u32>().ok())
                .ok_or_else(|| {
                    ExtractionError::low_confidence(format!("no numeric odometer reading in '{}'", value))
                })?;
            Ok(ImageExtraction {
                vin: None,
                odometer: Some(mileage),
            })
        }
    }
}

/// Interpretar el JSON del resumen. Partidas con tipo desconocido o valores
/// negativos se descartan; los totales que reporte el modelo se ignoran.
pub fn parse_summary_reply(content: &str) -> Result<WorkSummaryProposal, ExtractionError> {
    let parsed: Value = serde_json::from_str(content)
        .map_err(|e| ExtractionError::upstream(format!("summary reply is not valid JSON: {}", e)))?;

    let work_summary = parsed["work_summary"].as_str().unwrap_or_default().trim().to_string();

    let mut line_items = Vec::new();
    for raw in parsed["line_items"].as_array().map(Vec::as_slice).unwrap_or_default() {
        let description = raw["description"].as_str().unwrap_or_default().trim();
        let kind = raw["type"]
            .as_str()
            .or_else(|| raw["kind"].as_str())
            .and_then(LineItemKind::parse_loose);
        let quantity = decimal_from_json(&raw["quantity"]);
        let unit_price = decimal_from_json(&raw["unit_price"]);

        match (kind, quantity, unit_price) {
            (Some(kind), Some(quantity), Some(unit_price))
                if !description.is_empty() && !quantity.is_sign_negative() && !unit_price.is_sign_negative() =>
            {
                line_items.push(ProposedLineItem {
                    description: description.to_string(),
                    kind,
                    quantity,
                    unit_price,
                });
            }
            _ => log::warn!("⚠️ Partida propuesta descartada: {}", raw),
        }
    }

    if work_summary.is_empty() && line_items.is_empty() {
        return Err(ExtractionError::upstream("summary reply without work_summary or line_items"));
    }

    Ok(WorkSummaryProposal {
        work_summary,
        line_items,
    })
}
