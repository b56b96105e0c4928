//! Motor de totales de partidas
//!
//! Función pura: recalcula el total de cada partida y luego los agregados de
//! la orden. Aritmética de punto fijo a 2 decimales, redondeo una sola vez
//! por partida; los agregados son sumas de valores ya redondeados.
//! Ningún monto puede superar `MAX_AMOUNT`, el máximo de NUMERIC(12,2).

use num_traits::Zero;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::models::line_item::{LineItem, LineItemKind};
use crate::models::work_order::WorkOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub parts: Decimal,
    pub labor: Decimal,
    pub total: Decimal,
}

/// 9,999,999,999.99
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TotalsError {
    #[error("Line item '{description}' total exceeds the maximum amount of {max}")]
    LineOutOfRange { description: String, max: Decimal },
    #[error("Work order total exceeds the maximum amount of {max}")]
    TotalOutOfRange { max: Decimal },
}

/// `round(quantity * unit_price, 2)` con redondeo half-up; None si desborda
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Option<Decimal> {
    quantity
        .checked_mul(unit_price)
        .map(|raw| raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

fn within_range(value: Decimal) -> Option<Decimal> {
    (value <= MAX_AMOUNT).then_some(value)
}

/// Recalcular el total de cada partida y devolver los agregados
pub fn recompute(items: &mut [LineItem]) -> Result<Totals, TotalsError> {
    let mut parts = Decimal::zero();
    let mut labor = Decimal::zero();
    let total_out_of_range = || TotalsError::TotalOutOfRange { max: MAX_AMOUNT };

    for item in items.iter_mut() {
        item.total = line_total(item.quantity, item.unit_price)
            .and_then(within_range)
            .ok_or_else(|| TotalsError::LineOutOfRange {
                description: item.description.clone(),
                max: MAX_AMOUNT,
            })?;

        let bucket = match item.kind {
            LineItemKind::Part => &mut parts,
            LineItemKind::Labor => &mut labor,
        };
        *bucket = bucket
            .checked_add(item.total)
            .and_then(within_range)
            .ok_or_else(total_out_of_range)?;
    }

    let total = parts
        .checked_add(labor)
        .and_then(within_range)
        .ok_or_else(total_out_of_range)?;

    Ok(Totals { parts, labor, total })
}

/// Aplicar los totales recalculados sobre la orden. Si algún monto queda
/// fuera de rango la orden no se toca.
pub fn apply_totals(order: &mut WorkOrder) -> Result<(), TotalsError> {
    let mut items = order.line_items.clone();
    let totals = recompute(&mut items)?;
    order.line_items = items;
    order.total_parts = totals.parts;
    order.total_labor = totals.labor;
    order.total = totals.total;
    Ok(())
}

/// Verificar el invariante de totales sin mutar la orden
pub fn totals_consistent(order: &WorkOrder) -> bool {
    let mut items = order.line_items.clone();
    let Ok(expected) = recompute(&mut items) else {
        return false;
    };

    items == order.line_items
        && expected.parts == order.total_parts
        && expected.labor == order.total_labor
        && expected.total == order.total
}
