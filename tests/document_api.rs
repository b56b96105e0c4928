mod common;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use serde_json::json;
use uuid::Uuid;

use common::{spawn_app, FakeGateway, Part, TestApp};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
const AUDIO: &[u8] = b"fake-m4a-audio";

async fn processed_order(app: &TestApp) -> Uuid {
    let id = app
        .intake_order(&[
            Part::File("vin_image", "vin.jpg", JPEG),
            Part::File("audio", "notes.m4a", AUDIO),
        ])
        .await;
    let order = app.wait_until_settled(id).await;
    assert_eq!(order["status"], "processed");
    id
}

#[tokio::test]
async fn test_estimate_then_invoice() {
    let app = spawn_app(FakeGateway::default());
    let id = processed_order(&app).await;

    let (status, body) = app
        .request(Method::POST, &format!("/work-orders/{}/generate-estimate", id), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "success");
    assert_eq!(body["document_type"], "estimate");
    assert!(body["html_path"].as_str().unwrap().ends_with(".html"));
    assert!(body.get("pdf_path").is_none());
    assert_eq!(app.get_order(id).await["status"], "estimated");

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/work-orders/{}/generate-invoice", id),
            Some(json!({ "generate_pdf": true, "send_email": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["pdf_path"].as_str().unwrap().ends_with(".pdf"));
    assert_eq!(body["email_status"], "not_configured");
    assert_eq!(body["documents"].as_array().unwrap().len(), 2);
    assert_eq!(app.get_order(id).await["status"], "invoiced");

    let (status, body) = app
        .request(Method::GET, &format!("/work-orders/{}/documents", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_malformed_generate_body_is_rejected() {
    let app = spawn_app(FakeGateway::default());
    let id = processed_order(&app).await;

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/work-orders/{}/generate-invoice", id),
            Some(json!({ "generate_pdf": "yes", "persist": "no" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    assert_eq!(app.get_order(id).await["status"], "processed");
    let (_, body) = app
        .request(Method::GET, &format!("/work-orders/{}/documents", id), None)
        .await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_second_invoice_adds_an_identical_document() {
    let app = spawn_app(FakeGateway::default());
    let id = processed_order(&app).await;
    let uri = format!("/work-orders/{}/generate-invoice", id);

    let (first, _) = app.request(Method::POST, &uri, None).await;
    let (second, _) = app.request(Method::POST, &uri, None).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);

    let (_, body) = app
        .request(Method::GET, &format!("/work-orders/{}/documents", id), None)
        .await;
    let digests: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter(|doc| doc["document_type"] == "invoice")
        .filter_map(|doc| doc["content_digest"].as_str())
        .collect();
    assert_eq!(digests.len(), 2);
    assert_eq!(digests[0], digests[1]);
    assert_eq!(app.get_order(id).await["status"], "invoiced");
}

#[tokio::test]
async fn test_editing_after_invoice_warns() {
    let app = spawn_app(FakeGateway::default());
    let id = processed_order(&app).await;
    app.request(Method::POST, &format!("/work-orders/{}/generate-invoice", id), None)
        .await;

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/work-orders/{}", id),
            Some(json!({ "work_summary": "Brake pads and fluid flush" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "invoiced");
    assert_eq!(body["data"]["warnings"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_generation_from_error_is_rejected() {
    let app = spawn_app(FakeGateway::failing());
    let id = app.intake_order(&[Part::File("audio", "notes.m4a", AUDIO)]).await;
    assert_eq!(app.wait_until_settled(id).await["status"], "error");

    let (status, body) = app
        .request(Method::POST, &format!("/work-orders/{}/generate-invoice", id), None)
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_TRANSITION");
    assert_eq!(body["details"]["from"], "error");

    let (_, body) = app
        .request(Method::GET, &format!("/work-orders/{}/documents", id), None)
        .await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_preview_does_not_persist() {
    let app = spawn_app(FakeGateway::default());
    let id = processed_order(&app).await;

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/work-orders/{}/generate-estimate", id),
            Some(json!({ "persist": false })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["html_path"].is_null());
    assert!(body["documents"][0]["download_url"].is_null());
    assert_eq!(app.get_order(id).await["status"], "processed");
}

#[tokio::test]
async fn test_download_pdf() {
    let app = spawn_app(FakeGateway::default());
    let id = processed_order(&app).await;

    let (_, body) = app
        .request(
            Method::POST,
            &format!("/work-orders/{}/generate-invoice", id),
            Some(json!({ "generate_pdf": true })),
        )
        .await;
    let pdf = body["documents"]
        .as_array()
        .unwrap()
        .iter()
        .find(|doc| doc["format"] == "pdf")
        .unwrap();
    let url = pdf["download_url"].as_str().unwrap();

    let response = app
        .raw(
            Request::builder()
                .uri(url)
                .header(AUTHORIZATION, format!("Bearer {}", app.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/pdf");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_html_invoice_contains_order_data() {
    let app = spawn_app(FakeGateway::default());
    let id = processed_order(&app).await;

    let (_, body) = app
        .request(Method::POST, &format!("/work-orders/{}/generate-invoice", id), None)
        .await;
    let url = body["documents"][0]["download_url"].as_str().unwrap().to_string();

    let response = app
        .raw(
            Request::builder()
                .uri(url)
                .header(AUTHORIZATION, format!("Bearer {}", app.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(html.contains("INVOICE"));
    assert!(html.contains("Ana Torres"));
    assert!(html.contains(common::VALID_VIN));
    assert!(html.contains("$170.00"));
}

#[tokio::test]
async fn test_delete_requires_cascade_when_documents_exist() {
    let app = spawn_app(FakeGateway::default());
    let id = processed_order(&app).await;
    app.request(Method::POST, &format!("/work-orders/{}/generate-estimate", id), None)
        .await;

    let uri = format!("/work-orders/{}", id);
    let (status, body) = app.request(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, body) = app
        .request(Method::DELETE, &format!("{}?cascade=true", uri), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["documents_removed"], 1);

    let (status, _) = app.request(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_without_documents() {
    let app = spawn_app(FakeGateway::default());
    let id = app.intake_order(&[]).await;

    let (status, body) = app
        .request(Method::DELETE, &format!("/work-orders/{}", id), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["documents_removed"], 0);
}
