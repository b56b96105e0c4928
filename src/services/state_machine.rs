//! Máquina de estados de la orden de trabajo
//!
//! `transition` es total: cualquier par (estado, evento) no listado devuelve
//! `InvalidTransition` y el estado no cambia.

use std::fmt;
use thiserror::Error;

use crate::models::document::DocumentType;
use crate::models::work_order::WorkOrderStatus;

/// Veredicto agregado de una corrida de extracción
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionVerdict {
    Succeeded,
    Ambiguous,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkOrderEvent {
    Submit,
    ExtractionCompleted(ExtractionVerdict),
    Retrigger,
    MarkReviewed,
    Abandon,
    DocumentGenerated(DocumentType),
}

impl WorkOrderEvent {
    pub const ALL: [WorkOrderEvent; 9] = [
        WorkOrderEvent::Submit,
        WorkOrderEvent::ExtractionCompleted(ExtractionVerdict::Succeeded),
        WorkOrderEvent::ExtractionCompleted(ExtractionVerdict::Ambiguous),
        WorkOrderEvent::ExtractionCompleted(ExtractionVerdict::Failed),
        WorkOrderEvent::Retrigger,
        WorkOrderEvent::MarkReviewed,
        WorkOrderEvent::Abandon,
        WorkOrderEvent::DocumentGenerated(DocumentType::Estimate),
        WorkOrderEvent::DocumentGenerated(DocumentType::Invoice),
    ];
}

impl fmt::Display for WorkOrderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkOrderEvent::Submit => f.write_str("submit"),
            WorkOrderEvent::ExtractionCompleted(ExtractionVerdict::Succeeded) => {
                f.write_str("extraction_succeeded")
            }
            WorkOrderEvent::ExtractionCompleted(ExtractionVerdict::Ambiguous) => {
                f.write_str("extraction_ambiguous")
            }
            WorkOrderEvent::ExtractionCompleted(ExtractionVerdict::Failed) => {
                f.write_str("extraction_failed")
            }
            WorkOrderEvent::Retrigger => f.write_str("retrigger"),
            WorkOrderEvent::MarkReviewed => f.write_str("mark_reviewed"),
            WorkOrderEvent::Abandon => f.write_str("abandon"),
            WorkOrderEvent::DocumentGenerated(kind) => write!(f, "{}_generated", kind),
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Invalid transition: '{event}' is not allowed from status '{from}'")]
pub struct InvalidTransition {
    pub from: WorkOrderStatus,
    pub event: WorkOrderEvent,
}

/// Aplicar un evento sobre un estado
pub fn transition(
    from: WorkOrderStatus,
    event: WorkOrderEvent,
) -> Result<WorkOrderStatus, InvalidTransition> {
    use ExtractionVerdict as V;
    use WorkOrderEvent as E;
    use WorkOrderStatus as S;

    let next = match (from, event) {
        (S::Draft, E::Submit) => S::Pending,

        (S::Pending, E::ExtractionCompleted(V::Succeeded)) => S::Processed,
        (S::Pending, E::ExtractionCompleted(V::Ambiguous)) => S::NeedsReview,
        (S::Pending, E::ExtractionCompleted(V::Failed)) => S::Error,

        (S::Draft | S::Processed | S::NeedsReview | S::Error, E::Retrigger) => S::Pending,

        (S::NeedsReview | S::Error, E::MarkReviewed) => S::Processed,

        (S::Draft | S::Pending | S::Processed | S::NeedsReview, E::Abandon) => S::Error,

        (
            S::Draft | S::Processed | S::NeedsReview | S::Estimated | S::Invoiced,
            E::DocumentGenerated(DocumentType::Estimate),
        ) => S::Estimated,
        (
            S::Draft | S::Processed | S::NeedsReview | S::Estimated | S::Invoiced,
            E::DocumentGenerated(DocumentType::Invoice),
        ) => S::Invoiced,

        _ => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

/// Aviso para ediciones que no se bloquean pero conviene señalar
pub fn edit_warning(status: WorkOrderStatus) -> Option<String> {
    match status {
        WorkOrderStatus::Invoiced => Some(
            "Work order was edited after an invoice was generated; regenerate the invoice to keep it in sync"
                .to_string(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_is_total() {
        let mut allowed = 0;
        for from in WorkOrderStatus::ALL {
            for event in WorkOrderEvent::ALL {
                match transition(from, event) {
                    Ok(_) => allowed += 1,
                    Err(err) => {
                        assert_eq!(err.from, from);
                        assert_eq!(err.event, event);
                    }
                }
            }
        }
        // 1 submit + 3 completions + 4 retrigger + 2 review + 4 abandon + 5 + 5 documents
        assert_eq!(allowed, 24);
    }

    #[test]
    fn test_happy_path() {
        let status = transition(WorkOrderStatus::Draft, WorkOrderEvent::Submit).unwrap();
        assert_eq!(status, WorkOrderStatus::Pending);

        let status = transition(
            status,
            WorkOrderEvent::ExtractionCompleted(ExtractionVerdict::Succeeded),
        )
        .unwrap();
        assert_eq!(status, WorkOrderStatus::Processed);

        let status = transition(
            status,
            WorkOrderEvent::DocumentGenerated(DocumentType::Estimate),
        )
        .unwrap();
        assert_eq!(status, WorkOrderStatus::Estimated);

        let status = transition(
            status,
            WorkOrderEvent::DocumentGenerated(DocumentType::Invoice),
        )
        .unwrap();
        assert_eq!(status, WorkOrderStatus::Invoiced);

        // repetible
        let status = transition(
            status,
            WorkOrderEvent::DocumentGenerated(DocumentType::Invoice),
        )
        .unwrap();
        assert_eq!(status, WorkOrderStatus::Invoiced);
    }

    #[test]
    fn test_recoverable_states_return_to_pending() {
        for from in [WorkOrderStatus::NeedsReview, WorkOrderStatus::Error] {
            assert_eq!(
                transition(from, WorkOrderEvent::Retrigger).unwrap(),
                WorkOrderStatus::Pending
            );
        }
    }

    #[test]
    fn test_documents_rejected_while_pending_or_error() {
        for from in [WorkOrderStatus::Pending, WorkOrderStatus::Error] {
            let err = transition(from, WorkOrderEvent::DocumentGenerated(DocumentType::Invoice))
                .unwrap_err();
            assert_eq!(err.from, from);
        }
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = transition(WorkOrderStatus::Invoiced, WorkOrderEvent::Submit).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transition: 'submit' is not allowed from status 'invoiced'"
        );
    }

    #[test]
    fn test_edit_warning_only_after_invoice() {
        assert!(edit_warning(WorkOrderStatus::Invoiced).is_some());
        assert!(edit_warning(WorkOrderStatus::Estimated).is_none());
    }
}
