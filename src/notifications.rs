use chrono::{DateTime, Utc};

use crate::models::{Notification, NotificationKind};
use crate::utils::{format_amount, generate_id};

/// A committed ledger mutation, as recorded in the audit trail
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    ClientAdded { name: String },
    ClientUpdated { name: String },
    ClientRemoved,
    PaymentReceived { client_name: String, amount: f64 },
    StatusCorrected { name: String },
    MonthReset,
    PaymentEdited,
    PaymentRemoved,
}

impl LedgerEvent {
    pub fn title(&self) -> &'static str {
        match self {
            LedgerEvent::ClientAdded { .. } => "Nuevo Cliente",
            LedgerEvent::ClientUpdated { .. } => "Cliente Actualizado",
            LedgerEvent::ClientRemoved => "Cliente Eliminado",
            LedgerEvent::PaymentReceived { .. } => "Pago Recibido",
            LedgerEvent::StatusCorrected { .. } => "Estado Corregido",
            LedgerEvent::MonthReset => "Mes Reiniciado",
            LedgerEvent::PaymentEdited => "Registro Actualizado",
            LedgerEvent::PaymentRemoved => "Registro Eliminado",
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            LedgerEvent::ClientAdded { .. } | LedgerEvent::PaymentReceived { .. } => {
                NotificationKind::Success
            }
            LedgerEvent::ClientRemoved | LedgerEvent::PaymentRemoved => NotificationKind::Warning,
            LedgerEvent::ClientUpdated { .. }
            | LedgerEvent::StatusCorrected { .. }
            | LedgerEvent::MonthReset
            | LedgerEvent::PaymentEdited => NotificationKind::Info,
        }
    }

    pub fn message(&self, currency_symbol: &str) -> String {
        match self {
            LedgerEvent::ClientAdded { name } => format!("{} ha sido agregado.", name),
            LedgerEvent::ClientUpdated { name } => format!("Se actualizaron los datos de {}", name),
            LedgerEvent::ClientRemoved => {
                "El cliente y sus datos han sido eliminados por completo.".to_string()
            }
            LedgerEvent::PaymentReceived { client_name, amount } => format!(
                "Pago de {} recibido de {}.",
                format_amount(currency_symbol, *amount),
                client_name
            ),
            LedgerEvent::StatusCorrected { name } => {
                format!("{} ha vuelto a estado Pendiente.", name)
            }
            LedgerEvent::MonthReset => {
                "Todos los estados han sido reseteados a Pendiente.".to_string()
            }
            LedgerEvent::PaymentEdited => "El historial de pago ha sido modificado.".to_string(),
            LedgerEvent::PaymentRemoved => {
                "El registro ha sido eliminado del historial.".to_string()
            }
        }
    }
}

impl Notification {
    /// Render an audit entry for an event
    pub fn from_event(event: &LedgerEvent, currency_symbol: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            title: event.title().to_string(),
            message: event.message(currency_symbol),
            kind: event.kind(),
            timestamp: at,
        }
    }
}

/// Newest-first audit trail. Entries are only ever prepended.
#[derive(Debug, Clone, Default)]
pub struct NotificationLog {
    entries: Vec<Notification>,
}

impl NotificationLog {
    pub fn new(entries: Vec<Notification>) -> Self {
        Self { entries }
    }

    pub fn emit(&mut self, event: &LedgerEvent, currency_symbol: &str) -> &Notification {
        let notification = Notification::from_event(event, currency_symbol, Utc::now());
        self.entries.insert(0, notification);
        &self.entries[0]
    }

    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
