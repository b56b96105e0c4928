#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use repair_orders::config::environment::EnvironmentConfig;
use repair_orders::models::line_item::LineItemKind;
use repair_orders::repositories::Repositories;
use repair_orders::services::extraction_gateway::{
    ExtractionError, ExtractionGateway, ImageExtraction, ImageKind, MediaBlob, ProposedLineItem,
    SummaryContext, WorkSummaryProposal,
};
use repair_orders::services::media_store::InMemoryMediaStore;
use repair_orders::services::vin_decoder::{DecodedVehicle, VinDecoder};
use repair_orders::utils::jwt::{generate_token, JwtConfig};
use repair_orders::{create_router, AppState};

/// VIN real con dígito de control válido
pub const VALID_VIN: &str = "1HGCM82633A004352";

/// Gateway falso con respuestas fijas por tipo de artefacto
#[derive(Clone)]
pub struct FakeGateway {
    pub vin: Result<Option<String>, ExtractionError>,
    pub odometer: Result<Option<u32>, ExtractionError>,
    pub transcript: Result<String, ExtractionError>,
    pub summary: Result<WorkSummaryProposal, ExtractionError>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            vin: Ok(Some(VALID_VIN.to_string())),
            odometer: Ok(Some(45210)),
            transcript: Ok("Replaced front brake pads, about one hour of labor".to_string()),
            summary: Ok(WorkSummaryProposal {
                work_summary: "Replaced front brake pads".to_string(),
                line_items: vec![
                    proposed("Front brake pads", LineItemKind::Part, "1", "50.00"),
                    proposed("Brake service labor", LineItemKind::Labor, "1", "120.00"),
                ],
            }),
        }
    }
}

impl FakeGateway {
    pub fn failing() -> Self {
        Self {
            vin: Err(ExtractionError::upstream("vision service unavailable")),
            odometer: Err(ExtractionError::upstream("vision service unavailable")),
            transcript: Err(ExtractionError::upstream("transcription service unavailable")),
            summary: Err(ExtractionError::upstream("summary service unavailable")),
        }
    }
}

pub fn proposed(description: &str, kind: LineItemKind, quantity: &str, unit_price: &str) -> ProposedLineItem {
    ProposedLineItem {
        description: description.to_string(),
        kind,
        quantity: dec(quantity),
        unit_price: dec(unit_price),
    }
}

#[async_trait]
impl ExtractionGateway for FakeGateway {
    async fn extract_audio(&self, _blob: &MediaBlob) -> Result<String, ExtractionError> {
        self.transcript.clone()
    }

    async fn extract_image(&self, _blob: &MediaBlob, kind: ImageKind) -> Result<ImageExtraction, ExtractionError> {
        match kind {
            ImageKind::Vin => self.vin.clone().map(|vin| ImageExtraction { vin, odometer: None }),
            ImageKind::Odometer => self
                .odometer
                .clone()
                .map(|odometer| ImageExtraction { vin: None, odometer }),
        }
    }

    async fn summarize(
        &self,
        _transcripts: &[String],
        _context: &SummaryContext,
    ) -> Result<WorkSummaryProposal, ExtractionError> {
        self.summary.clone()
    }
}

pub struct FakeDecoder;

#[async_trait]
impl VinDecoder for FakeDecoder {
    async fn decode(&self, _vin: &str) -> anyhow::Result<DecodedVehicle> {
        Ok(DecodedVehicle {
            year: Some(2003),
            make: Some("HONDA".to_string()),
            model: Some("Accord".to_string()),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub token: String,
}

pub fn test_config() -> EnvironmentConfig {
    EnvironmentConfig {
        jwt_secret: "integration-test-secret".to_string(),
        extraction_timeout: Duration::from_millis(500),
        extraction_max_retries: 0,
        extraction_backoff: Duration::from_millis(1),
        intake_workers: 2,
        ..EnvironmentConfig::default()
    }
}

/// App completa en memoria con el gateway dado
pub fn spawn_app(gateway: FakeGateway) -> TestApp {
    let config = test_config();
    let token = generate_token(Uuid::new_v4(), "front-desk", &JwtConfig::from(&config)).unwrap();

    let state = AppState::start(
        config,
        Repositories::in_memory(),
        Arc::new(InMemoryMediaStore::new()),
        Arc::new(gateway),
        Arc::new(FakeDecoder),
    )
    .unwrap();

    TestApp {
        router: create_router(state.clone()),
        state,
        token,
    }
}

pub fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

/// Los Decimal viajan como string en el JSON
pub fn json_dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

#[derive(Clone, Copy)]
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

const BOUNDARY: &str = "----repair-orders-test-boundary";

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes());
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

impl TestApp {
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {}", self.token));
        let body = match body {
            Some(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn raw(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn intake(&self, parts: &[Part<'_>]) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/work-orders")
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(multipart_body(parts)))
            .unwrap();

        let response = self.raw(request).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    /// Intake con customer inline; devuelve el id de la orden
    pub async fn intake_order(&self, files: &[Part<'_>]) -> Uuid {
        let mut parts = vec![
            Part::Text("customer_name", "Ana Torres"),
            Part::Text("customer_phone", "555-010-1234"),
        ];
        parts.extend(files.iter().copied());

        let (status, body) = self.intake(&parts).await;
        assert_eq!(status, StatusCode::ACCEPTED, "intake failed: {}", body);
        body["data"]["order_id"].as_str().unwrap().parse().unwrap()
    }

    pub async fn get_order(&self, id: Uuid) -> Value {
        let (status, body) = self.request(Method::GET, &format!("/work-orders/{}", id), None).await;
        assert_eq!(status, StatusCode::OK, "get failed: {}", body);
        body
    }

    /// Esperar a que la orden salga de pending
    pub async fn wait_until_settled(&self, id: Uuid) -> Value {
        for _ in 0..200 {
            let order = self.get_order(id).await;
            if order["status"] != "pending" {
                return order;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("work order {} stayed pending", id);
    }
}
