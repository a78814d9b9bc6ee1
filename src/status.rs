//! Billing-cycle transitions between `Pendiente` and `Pagado`.
//!
//! Payment and undo are permissive: neither checks the current
//! status, so paying twice records two payments and undoing a pending client
//! still removes its latest record. A month reset flips every client back to
//! `Pendiente` but keeps `last_payment_date`, unlike undo which clears it.

use chrono::Utc;
use log::info;

use crate::database::{CollectionKey, PersistenceGateway};
use crate::ledger::Ledger;
use crate::models::{Client, ClientStatus, PaymentRecord};
use crate::notifications::LedgerEvent;
use crate::utils::{generate_id, non_blank};

/// What `undo_payment` would change for one client
#[derive(Debug, Clone, PartialEq)]
pub struct UndoPreview {
    pub client: Client,
    /// The record that would be removed, if the client has any
    pub payment: Option<PaymentRecord>,
}

/// What `reset_month` would change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetPreview {
    pub total_clients: usize,
    /// Clients currently `Pagado` that would go back to `Pendiente`
    pub paid_clients: usize,
}

/// Index of the client's payment with the latest date.
///
/// On equal dates the earliest entry in collection order wins, which is the
/// most recently recorded one since payments are prepended.
fn latest_payment_index(payments: &[PaymentRecord], client_id: &str) -> Option<usize> {
    let mut latest: Option<(usize, &PaymentRecord)> = None;
    for (index, payment) in payments.iter().enumerate() {
        if payment.client_id != client_id {
            continue;
        }
        match latest {
            Some((_, current)) if payment.date <= current.date => {}
            _ => latest = Some((index, payment)),
        }
    }
    latest.map(|(index, _)| index)
}

impl<G: PersistenceGateway> Ledger<G> {
    /// Mark a client as paid and append a payment for its monthly fee
    pub fn record_payment(&mut self, client_id: &str, notes: Option<String>) -> Option<PaymentRecord> {
        let index = self.client_index(client_id)?;
        let now = Utc::now();

        let client = &mut self.clients[index];
        client.status = ClientStatus::Pagado;
        client.last_payment_date = Some(now);

        let record = PaymentRecord {
            id: generate_id(),
            client_id: client.id.clone(),
            client_name: client.name.clone(),
            amount: client.monthly_amount,
            date: now,
            notes: non_blank(notes),
        };
        self.payments.insert(0, record.clone());

        info!("Recorded payment {} for client {}", record.id, record.client_id);
        self.commit(
            LedgerEvent::PaymentReceived {
                client_name: record.client_name.clone(),
                amount: record.amount,
            },
            &[CollectionKey::Clients, CollectionKey::Payments],
        );
        Some(record)
    }

    /// Client and payment that `undo_payment` would touch
    pub fn undo_preview(&self, client_id: &str) -> Option<UndoPreview> {
        let client = self.client(client_id)?.clone();
        let payment = latest_payment_index(&self.payments, client_id).map(|i| self.payments[i].clone());
        Some(UndoPreview { client, payment })
    }

    /// Revert a client to `Pendiente` and drop its most recent payment
    pub fn undo_payment(&mut self, client_id: &str) -> bool {
        let Some(index) = self.client_index(client_id) else {
            return false;
        };

        let client = &mut self.clients[index];
        client.status = ClientStatus::Pendiente;
        client.last_payment_date = None;
        let name = client.name.clone();

        let mut touched = vec![CollectionKey::Clients];
        if let Some(latest) = latest_payment_index(&self.payments, client_id) {
            let removed = self.payments.remove(latest);
            info!("Undid payment {} for client {}", removed.id, client_id);
            touched.push(CollectionKey::Payments);
        } else {
            info!("Reset client {} to Pendiente, no payment to remove", client_id);
        }

        self.commit(LedgerEvent::StatusCorrected { name }, &touched);
        true
    }

    pub fn reset_preview(&self) -> ResetPreview {
        ResetPreview {
            total_clients: self.clients.len(),
            paid_clients: self
                .clients
                .iter()
                .filter(|c| c.status == ClientStatus::Pagado)
                .count(),
        }
    }

    /// Start a new billing cycle: every client owes again
    pub fn reset_month(&mut self) {
        for client in &mut self.clients {
            client.status = ClientStatus::Pendiente;
        }

        info!("Month reset for {} clients", self.clients.len());
        self.commit(LedgerEvent::MonthReset, &[CollectionKey::Clients]);
    }
}
