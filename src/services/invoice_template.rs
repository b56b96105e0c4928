//! Plantilla de facturas y presupuestos
//!
//! `DocumentModel` contiene el contenido de negocio ya formateado. Los
//! renderers HTML y PDF recorren el mismo modelo, así que los nombres de campo
//! y las secciones condicionales son idénticos en ambos formatos.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt::Write as _;

use crate::config::environment::CompanyInfo;
use crate::models::document::DocumentType;
use crate::models::work_order::VehicleRef;
use crate::repositories::OrderSnapshot;
use crate::services::document_generator::GenerationError;

pub const ESTIMATE_NOTE: &str = "This is an ESTIMATE only. Actual charges may vary based on additional parts or labor required. This estimate is valid for 30 days.";
pub const PAYMENT_TERMS: &str =
    "Payment due upon completion of service. We accept cash, checks, and all major credit cards.";

const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRow {
    pub description: String,
    pub kind: String,
    pub quantity: String,
    pub unit_price: String,
    pub total: String,
}

/// Contenido de negocio de un documento
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentModel {
    pub label: String,
    pub number: String,
    pub date: String,
    pub company: CompanyInfo,
    pub customer_name: String,
    /// Filas de contacto presentes (Phone, Email, Address)
    pub customer_rows: Vec<(String, String)>,
    pub vehicle_rows: Vec<(String, String)>,
    pub work_summary: String,
    pub lines: Vec<LineRow>,
    pub totals: Vec<(String, String)>,
    pub footer_title: String,
    pub footer: String,
    pub thank_you: String,
}

impl DocumentModel {
    /// Construir el modelo a partir de un snapshot consistente de la orden
    pub fn build(
        snapshot: &OrderSnapshot,
        document_type: DocumentType,
        company: &CompanyInfo,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, GenerationError> {
        let order = &snapshot.order;

        let customer = snapshot.customer.as_ref().ok_or_else(|| {
            GenerationError::incomplete(format!(
                "Work order '{}' has no customer assigned",
                order.id
            ))
        })?;

        let customer_name = Some(customer.full_name())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Customer".to_string());

        let customer_rows = [
            ("Phone", customer.phone.as_deref()),
            ("Email", customer.email.as_deref()),
            ("Address", customer.address.as_deref()),
        ]
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (label.to_string(), v.to_string()))
        })
        .collect();

        let (year, make, model, vin, mileage) = match (&order.vehicle, &snapshot.vehicle) {
            (VehicleRef::Linked(_), Some(vehicle)) => (
                vehicle.year.map(|y| y.to_string()),
                vehicle.make.clone(),
                vehicle.model.clone(),
                vehicle.vin.clone(),
                vehicle.mileage.and_then(|m| u64::try_from(m).ok()),
            ),
            (VehicleRef::Linked(vehicle_id), None) => {
                return Err(GenerationError::incomplete(format!(
                    "Linked vehicle '{}' no longer exists",
                    vehicle_id
                )))
            }
            (VehicleRef::Unstructured(info), _) => (
                info.year.map(|y| y.to_string()),
                info.make.clone(),
                info.model.clone(),
                info.vin.clone(),
                info.mileage.map(u64::from),
            ),
        };

        let or_na = |value: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };

        let vehicle_rows = vec![
            ("Year".to_string(), or_na(year)),
            ("Make".to_string(), or_na(make)),
            ("Model".to_string(), or_na(model)),
            ("VIN".to_string(), or_na(vin)),
            (
                "Mileage".to_string(),
                or_na(mileage.filter(|m| *m > 0).map(group_thousands)),
            ),
        ];

        let lines = order
            .line_items
            .iter()
            .map(|item| LineRow {
                description: item.description.clone(),
                kind: item.kind.label().to_string(),
                quantity: item.quantity.normalize().to_string(),
                unit_price: money(item.unit_price),
                total: money(item.total),
            })
            .collect();

        let totals = vec![
            ("Parts Total".to_string(), money(order.total_parts)),
            ("Labor Total".to_string(), money(order.total_labor)),
            ("GRAND TOTAL".to_string(), money(order.total)),
        ];

        let (footer_title, footer) = match document_type {
            DocumentType::Estimate => ("PLEASE NOTE", ESTIMATE_NOTE),
            DocumentType::Invoice => ("PAYMENT TERMS", PAYMENT_TERMS),
        };

        Ok(Self {
            label: document_type.label().to_string(),
            number: order.short_id(),
            date: issued_at.format("%m/%d/%Y").to_string(),
            company: company.clone(),
            customer_name,
            customer_rows,
            vehicle_rows,
            work_summary: order.work_summary.clone(),
            lines,
            totals,
            footer_title: footer_title.to_string(),
            footer: footer.to_string(),
            thank_you: format!(
                "Thank you for choosing {} for your vehicle maintenance needs. We appreciate your business!",
                company.name
            ),
        })
    }

    /// Renderizar como documento HTML autocontenido
    pub fn render_html(&self) -> Result<String, std::fmt::Error> {
        let mut html = String::with_capacity(4096);

        writeln!(html, "<!DOCTYPE html>")?;
        writeln!(html, "<html lang=\"en\">")?;
        writeln!(html, "<head>")?;
        writeln!(html, "<meta charset=\"utf-8\">")?;
        writeln!(html, "<title>{} {}</title>", escape(&self.label), escape(&self.number))?;
        writeln!(html, "<style>{}</style>", STYLE)?;
        writeln!(html, "</head>")?;
        writeln!(html, "<body>")?;

        writeln!(html, "<header class=\"header\">")?;
        writeln!(html, "<div class=\"company\">")?;
        writeln!(html, "<h2>{}</h2>", escape(&self.company.name))?;
        writeln!(html, "<p>{}</p>", escape(&self.company.address))?;
        writeln!(html, "<p>Phone: {}</p>", escape(&self.company.phone))?;
        writeln!(html, "<p>Email: {}</p>", escape(&self.company.email))?;
        writeln!(html, "<p>Website: {}</p>", escape(&self.company.website))?;
        writeln!(html, "</div>")?;
        writeln!(html, "<div class=\"document-info\">")?;
        writeln!(html, "<h1>{}</h1>", escape(&self.label))?;
        writeln!(html, "<p><b>Number:</b> {}</p>", escape(&self.number))?;
        writeln!(html, "<p><b>Date:</b> {}</p>", escape(&self.date))?;
        writeln!(html, "</div>")?;
        writeln!(html, "</header>")?;

        writeln!(html, "<h3>Customer Information</h3>")?;
        writeln!(html, "<table class=\"info\">")?;
        write_row(&mut html, "Name", &self.customer_name)?;
        for (label, value) in &self.customer_rows {
            write_row(&mut html, label, value)?;
        }
        writeln!(html, "</table>")?;

        writeln!(html, "<h3>Vehicle Information</h3>")?;
        writeln!(html, "<table class=\"info\">")?;
        for (label, value) in &self.vehicle_rows {
            write_row(&mut html, label, value)?;
        }
        writeln!(html, "</table>")?;

        writeln!(html, "<h3>Work Summary</h3>")?;
        writeln!(html, "<p class=\"summary\">{}</p>", escape(&self.work_summary))?;

        writeln!(html, "<h3>Line Items</h3>")?;
        writeln!(html, "<table class=\"items\">")?;
        writeln!(
            html,
            "<tr><th>Description</th><th>Type</th><th>Quantity</th><th>Unit Price</th><th>Total</th></tr>"
        )?;
        for line in &self.lines {
            writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&line.description),
                escape(&line.kind),
                escape(&line.quantity),
                escape(&line.unit_price),
                escape(&line.total)
            )?;
        }
        writeln!(html, "</table>")?;

        writeln!(html, "<table class=\"totals\">")?;
        for (label, value) in &self.totals {
            writeln!(html, "<tr><th>{}:</th><td>{}</td></tr>", escape(label), escape(value))?;
        }
        writeln!(html, "</table>")?;

        writeln!(html, "<footer>")?;
        writeln!(html, "<p><b>{}:</b> {}</p>", escape(&self.footer_title), escape(&self.footer))?;
        writeln!(html, "<p>{}</p>", escape(&self.thank_you))?;
        writeln!(html, "</footer>")?;

        writeln!(html, "</body>")?;
        writeln!(html, "</html>")?;

        Ok(html)
    }
}

const STYLE: &str = "body{font-family:Helvetica,Arial,sans-serif;margin:32px;color:#222}\
.header{display:flex;justify-content:space-between}\
.document-info{text-align:right}\
table{border-collapse:collapse;width:100%;margin-bottom:16px}\
td,th{border:1px solid #999;padding:6px;text-align:left}\
.info th{background:#eee;width:120px}\
.totals{width:40%;margin-left:auto}";

fn write_row(html: &mut String, label: &str, value: &str) -> std::fmt::Result {
    writeln!(html, "<tr><th>{}:</th><td>{}</td></tr>", escape(label), escape(value))
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Monto con dos decimales: `$1234.50`
pub fn money(value: Decimal) -> String {
    format!("${:.2}", value.round_dp(2))
}

/// 45000 -> "45,000"
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::customer::NewCustomer;
    use crate::models::line_item::{LineItem, LineItemKind};
    use crate::models::work_order::{VehicleInfo, WorkOrder};
    use chrono::TimeZone;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn snapshot(with_customer: bool) -> OrderSnapshot {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        let customer = NewCustomer::from_full_name("Ana Torres", Some("555-0101".to_string()), None).into_customer(now);

        let info = VehicleInfo {
            vin: Some("1HGCM82633A004352".to_string()),
            year: Some(2003),
            make: Some("Honda".to_string()),
            mileage: Some(123_456),
            ..VehicleInfo::default()
        };
        let mut order = WorkOrder::new(Some(customer.id), VehicleRef::Unstructured(info), None, now);
        order.work_summary = "Replaced front brake pads <urgent>".to_string();
        order.line_items = vec![
            LineItem::manual("Brake pads", LineItemKind::Part, dec("2"), dec("25.00")),
            LineItem::manual("Brake service", LineItemKind::Labor, dec("1.5"), dec("80.00")),
        ];
        order.recompute_totals().unwrap();

        OrderSnapshot {
            order,
            customer: with_customer.then_some(customer),
            vehicle: None,
        }
    }

    fn issued() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_invoice_model_content() {
        let model = DocumentModel::build(&snapshot(true), DocumentType::Invoice, &CompanyInfo::default(), issued()).unwrap();

        assert_eq!(model.label, "INVOICE");
        assert_eq!(model.date, "03/09/2024");
        assert_eq!(model.customer_name, "Ana Torres");
        assert_eq!(model.customer_rows, vec![("Phone".to_string(), "555-0101".to_string())]);
        assert!(model.vehicle_rows.contains(&("Model".to_string(), "N/A".to_string())));
        assert!(model.vehicle_rows.contains(&("Mileage".to_string(), "123,456".to_string())));
        assert_eq!(model.lines[1].quantity, "1.5");
        assert_eq!(model.lines[1].kind, "Labor");
        assert_eq!(model.totals[2], ("GRAND TOTAL".to_string(), "$170.00".to_string()));
        assert_eq!(model.footer, PAYMENT_TERMS);
    }

    #[test]
    fn test_estimate_differs_only_in_label_and_footer() {
        let snapshot = snapshot(true);
        let company = CompanyInfo::default();
        let invoice = DocumentModel::build(&snapshot, DocumentType::Invoice, &company, issued()).unwrap();
        let estimate = DocumentModel::build(&snapshot, DocumentType::Estimate, &company, issued()).unwrap();

        assert_eq!(estimate.label, "ESTIMATE");
        assert_eq!(estimate.footer, ESTIMATE_NOTE);
        assert_eq!(
            DocumentModel {
                label: invoice.label.clone(),
                footer_title: invoice.footer_title.clone(),
                footer: invoice.footer.clone(),
                ..estimate
            },
            invoice
        );
    }

    #[test]
    fn test_same_order_renders_identical_html() {
        let snapshot = snapshot(true);
        let company = CompanyInfo::default();

        let first = DocumentModel::build(&snapshot, DocumentType::Invoice, &company, issued()).unwrap();
        let second = DocumentModel::build(&snapshot, DocumentType::Invoice, &company, issued()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.render_html().unwrap(), second.render_html().unwrap());
    }

    #[test]
    fn test_missing_customer_is_incomplete() {
        let err = DocumentModel::build(&snapshot(false), DocumentType::Invoice, &CompanyInfo::default(), issued())
            .unwrap_err();
        assert_eq!(err.kind, crate::services::document_generator::GenerationErrorKind::IncompleteData);
    }

    #[test]
    fn test_html_escapes_and_omits_absent_rows() {
        let model = DocumentModel::build(&snapshot(true), DocumentType::Estimate, &CompanyInfo::default(), issued()).unwrap();
        let html = model.render_html().unwrap();

        assert!(html.contains("&lt;urgent&gt;"));
        assert!(html.contains("<th>Phone:</th>"));
        assert!(!html.contains("<th>Email:</th>"));
        assert!(html.contains("This is an ESTIMATE only."));
    }

    #[test]
    fn test_formatting_helpers() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(45_000), "45,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
        assert_eq!(money(dec("23.75")), "$23.75");
        assert_eq!(money(dec("5")), "$5.00");
    }
}
