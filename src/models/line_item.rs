//! Partidas (line items) de una orden de trabajo
//!
//! Tipo valor sin identidad propia. El `total` de cada partida solo lo escribe
//! el motor de totales (`services::totals`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::services::totals;

/// Tipo de partida
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LineItemKind {
    Part,
    Labor,
}

impl LineItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineItemKind::Part => "part",
            LineItemKind::Labor => "labor",
        }
    }

    /// Etiqueta capitalizada para documentos
    pub fn label(&self) -> &'static str {
        match self {
            LineItemKind::Part => "Part",
            LineItemKind::Labor => "Labor",
        }
    }

    /// Interpretar el tipo que devuelve el modelo de resumen
    pub fn parse_loose(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "part" | "parts" => Some(LineItemKind::Part),
            "labor" | "labour" => Some(LineItemKind::Labor),
            _ => None,
        }
    }
}

impl fmt::Display for LineItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origen de la partida: capturada a mano o derivada de una corrida de extracción
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum LineItemSource {
    #[default]
    Manual,
    Extracted { run_id: Uuid },
}

impl LineItemSource {
    pub fn is_extracted(&self) -> bool {
        matches!(self, LineItemSource::Extracted { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub description: String,
    pub kind: LineItemKind,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub total: Decimal,
    #[serde(default)]
    pub source: LineItemSource,
}

impl LineItem {
    pub fn new(
        description: impl Into<String>,
        kind: LineItemKind,
        quantity: Decimal,
        unit_price: Decimal,
        source: LineItemSource,
    ) -> Self {
        Self {
            description: description.into(),
            kind,
            quantity,
            unit_price,
            // Un desborde queda en cero; `totals::recompute` lo rechaza al persistir
            total: totals::line_total(quantity, unit_price).unwrap_or_default(),
            source,
        }
    }

    pub fn manual(
        description: impl Into<String>,
        kind: LineItemKind,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self::new(description, kind, quantity, unit_price, LineItemSource::Manual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn test_new_item_computes_total() {
        let item = LineItem::manual("Brake pads", LineItemKind::Part, dec("2"), dec("25.00"));
        assert_eq!(item.total, dec("50.00"));
        assert_eq!(item.source, LineItemSource::Manual);
    }

    #[test]
    fn test_source_serializes_with_origin_tag() {
        let run_id = Uuid::new_v4();
        let json = serde_json::to_value(LineItemSource::Extracted { run_id }).unwrap();
        assert_eq!(json["origin"], "extracted");
        assert_eq!(json["run_id"], run_id.to_string());

        let manual: LineItemSource = serde_json::from_str(r#"{"origin":"manual"}"#).unwrap();
        assert_eq!(manual, LineItemSource::Manual);
    }

    #[test]
    fn test_parse_loose_kind() {
        assert_eq!(LineItemKind::parse_loose(" Labor "), Some(LineItemKind::Labor));
        assert_eq!(LineItemKind::parse_loose("parts"), Some(LineItemKind::Part));
        assert_eq!(LineItemKind::parse_loose("fee"), None);
    }
}
