//! Renderer PDF
//!
//! Dibuja el `DocumentModel` con printpdf usando fuentes builtin, en el mismo
//! orden de secciones que el HTML.

use printpdf::*;
use std::io::BufWriter;

use crate::services::document_generator::GenerationError;
use crate::services::invoice_template::DocumentModel;

const PAGE_WIDTH: f32 = 215.9;
const PAGE_HEIGHT: f32 = 279.4;
const LEFT: f32 = 15.0;
const TOP: f32 = 265.0;
const BOTTOM: f32 = 18.0;

/// Columnas de la tabla de partidas (x en mm)
const COLUMNS: [f32; 5] = [15.0, 105.0, 130.0, 152.0, 178.0];

struct PdfCursor {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    /// Textos dibujados, en orden
    drawn: Vec<String>,
}

impl PdfCursor {
    fn ensure_space(&mut self, needed: f32) {
        if self.y - needed < BOTTOM {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP;
        }
    }

    fn text(&mut self, text: &str, size: f32, x: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.font };
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
        self.drawn.push(text.to_string());
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        self.ensure_space(5.0);
        self.text(text, size, LEFT, bold);
        self.y -= 5.0;
    }

    fn heading(&mut self, text: &str) {
        self.y -= 3.0;
        self.ensure_space(10.0);
        self.text(text, 12.0, LEFT, true);
        self.y -= 6.5;
    }

    fn paragraph(&mut self, text: &str, size: f32, max_chars: usize) {
        for line in wrap_text(text, max_chars) {
            self.line(&line, size, false);
        }
    }

    fn label_row(&mut self, label: &str, value: &str) {
        self.ensure_space(5.0);
        self.text(&format!("{}:", label), 10.0, LEFT, true);
        self.text(value, 10.0, LEFT + 30.0, false);
        self.y -= 5.0;
    }
}

/// Renderizar el modelo a bytes PDF
pub fn render_pdf(model: &DocumentModel) -> Result<Vec<u8>, GenerationError> {
    let pdf = layout(model)?;

    let mut buf = BufWriter::new(Vec::new());
    pdf.doc
        .save(&mut buf)
        .map_err(|e| GenerationError::render(format!("PDF save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| GenerationError::render(format!("PDF buffer error: {e}")))
}

fn layout(model: &DocumentModel) -> Result<PdfCursor, GenerationError> {
    let title = format!("{} {}", model.label, model.number);
    let (doc, page, layer) = PdfDocument::new(&title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let layer = doc.get_page(page).get_layer(layer);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| GenerationError::render(format!("PDF font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| GenerationError::render(format!("PDF font error: {e}")))?;

    let mut pdf = PdfCursor {
        doc,
        layer,
        font,
        bold,
        y: TOP,
        drawn: Vec::new(),
    };

    // Encabezado: empresa a la izquierda, datos del documento a la derecha
    pdf.text(&model.company.name, 14.0, LEFT, true);
    pdf.text(&model.label, 16.0, 150.0, true);
    pdf.y -= 6.0;
    pdf.text(&model.company.address, 9.0, LEFT, false);
    pdf.text(&format!("Number: {}", model.number), 10.0, 150.0, false);
    pdf.y -= 4.5;
    pdf.text(&format!("Phone: {}", model.company.phone), 9.0, LEFT, false);
    pdf.text(&format!("Date: {}", model.date), 10.0, 150.0, false);
    pdf.y -= 4.5;
    pdf.line(&format!("Email: {}", model.company.email), 9.0, false);
    pdf.line(&format!("Website: {}", model.company.website), 9.0, false);

    pdf.heading("Customer Information");
    pdf.label_row("Name", &model.customer_name);
    for (label, value) in &model.customer_rows {
        pdf.label_row(label, value);
    }

    pdf.heading("Vehicle Information");
    for (label, value) in &model.vehicle_rows {
        pdf.label_row(label, value);
    }

    pdf.heading("Work Summary");
    pdf.paragraph(&model.work_summary, 10.0, 95);

    pdf.heading("Line Items");
    let header = ["Description", "Type", "Quantity", "Unit Price", "Total"];
    pdf.ensure_space(6.0);
    for (x, title) in COLUMNS.iter().zip(header) {
        pdf.text(title, 10.0, *x, true);
    }
    pdf.y -= 6.0;

    for line in &model.lines {
        let description = wrap_text(&line.description, 45);
        pdf.ensure_space(5.0 * description.len() as f32);
        let cells = [&line.kind, &line.quantity, &line.unit_price, &line.total];
        for (x, cell) in COLUMNS[1..].iter().zip(cells) {
            pdf.text(cell, 10.0, *x, false);
        }
        for part in description {
            pdf.text(&part, 10.0, COLUMNS[0], false);
            pdf.y -= 5.0;
        }
    }

    pdf.y -= 3.0;
    for (label, value) in &model.totals {
        pdf.ensure_space(5.5);
        pdf.text(&format!("{}:", label), 10.0, COLUMNS[3] - 10.0, true);
        pdf.text(value, 10.0, COLUMNS[4], label == "GRAND TOTAL");
        pdf.y -= 5.5;
    }

    pdf.y -= 6.0;
    pdf.paragraph(&format!("{}: {}", model.footer_title, model.footer), 9.0, 105);
    pdf.y -= 3.0;
    pdf.paragraph(&model.thank_you, 9.0, 105);

    Ok(pdf)
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
