//! Client and payment ledger.
//!
//! The [`Ledger`] owns the three collections and the gateway they are saved
//! through. Every committed mutation appends an audit notification and writes
//! the affected collections back before returning. Invalid input and unknown
//! ids are silent no-ops, reported to the caller only as `None`/`false`.

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::database::{CollectionKey, PersistenceGateway};
use crate::models::{
    Client, ClientDraft, ClientPatch, ClientStatus, Notification, PaymentPatch, PaymentRecord,
};
use crate::notifications::{LedgerEvent, NotificationLog};
use crate::utils::{generate_id, non_blank};

/// Business defaults the ledger needs from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSettings {
    pub default_monthly_amount: f64,
    pub currency_symbol: String,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            default_monthly_amount: 150.0,
            currency_symbol: "Q".to_string(),
        }
    }
}

impl From<&Config> for LedgerSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_monthly_amount: config.default_monthly_amount,
            currency_symbol: config.currency_symbol.clone(),
        }
    }
}

/// What deleting a client would destroy
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionPreview {
    pub client: Client,
    pub payments: Vec<PaymentRecord>,
}

impl DeletionPreview {
    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }
}

pub struct Ledger<G: PersistenceGateway> {
    gateway: G,
    settings: LedgerSettings,
    pub(crate) clients: Vec<Client>,
    pub(crate) payments: Vec<PaymentRecord>,
    notifications: NotificationLog,
}

impl<G: PersistenceGateway> Ledger<G> {
    /// Load every collection from the gateway.
    ///
    /// A collection that cannot be read or decoded starts out empty.
    pub fn load(gateway: G, settings: LedgerSettings) -> Self {
        let clients = load_or_empty(&gateway, CollectionKey::Clients);
        let payments = load_or_empty(&gateway, CollectionKey::Payments);
        let notifications = NotificationLog::new(load_or_empty(&gateway, CollectionKey::Notifications));

        debug!(
            "Loaded ledger: {} clients, {} payments, {} notifications",
            clients.len(),
            payments.len(),
            notifications.len()
        );

        Self {
            gateway,
            settings,
            clients,
            payments,
            notifications,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    pub fn payments(&self) -> &[PaymentRecord] {
        &self.payments
    }

    /// Audit trail, newest first
    pub fn notifications(&self) -> &[Notification] {
        self.notifications.entries()
    }

    pub fn client(&self, id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    pub fn payment(&self, id: &str) -> Option<&PaymentRecord> {
        self.payments.iter().find(|p| p.id == id)
    }

    pub(crate) fn client_index(&self, id: &str) -> Option<usize> {
        self.clients.iter().position(|c| c.id == id)
    }

    /// Create a client in the Pendiente state
    pub fn add_client(&mut self, draft: ClientDraft) -> Option<Client> {
        let name = draft.name.trim();
        let phone1 = draft.phone1.trim();
        if name.is_empty() || phone1.is_empty() {
            debug!("Skipping client without name or phone");
            return None;
        }

        let monthly_amount = match draft.monthly_amount {
            Some(amount) if amount.is_finite() && amount > 0.0 => amount,
            _ => self.settings.default_monthly_amount,
        };

        let client = Client {
            id: generate_id(),
            name: name.to_string(),
            phone1: phone1.to_string(),
            phone2: non_blank(draft.phone2).map(|p| p.trim().to_string()),
            monthly_amount,
            status: ClientStatus::Pendiente,
            created_at: Utc::now(),
            last_payment_date: None,
            image: non_blank(draft.image),
        };
        self.clients.push(client.clone());

        info!("Added client {} ({})", client.name, client.id);
        self.commit(
            LedgerEvent::ClientAdded {
                name: client.name.clone(),
            },
            &[CollectionKey::Clients],
        );
        Some(client)
    }

    /// Apply a patch to an existing client
    pub fn update_client(&mut self, id: &str, patch: &ClientPatch) -> Option<Client> {
        let index = self.client_index(id)?;
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty())
            || patch.phone1.as_deref().is_some_and(|p| p.trim().is_empty())
        {
            debug!("Skipping update of {} that would blank a required field", id);
            return None;
        }
        if patch.monthly_amount.is_some_and(|a| !a.is_finite()) {
            debug!("Skipping update of {} with a non-finite amount", id);
            return None;
        }

        let client = &mut self.clients[index];
        patch.apply(client);
        let updated = client.clone();

        info!("Updated client {}", updated.id);
        self.commit(
            LedgerEvent::ClientUpdated {
                name: updated.name.clone(),
            },
            &[CollectionKey::Clients],
        );
        Some(updated)
    }

    /// Everything `delete_client` would remove, without removing it
    pub fn deletion_preview(&self, id: &str) -> Option<DeletionPreview> {
        let client = self.client(id)?.clone();
        let payments = self
            .payments
            .iter()
            .filter(|p| p.client_id == id)
            .cloned()
            .collect();
        Some(DeletionPreview { client, payments })
    }

    /// Remove a client together with its payment history
    pub fn delete_client(&mut self, id: &str) -> bool {
        let Some(index) = self.client_index(id) else {
            return false;
        };
        let client = self.clients.remove(index);
        let before = self.payments.len();
        self.payments.retain(|p| p.client_id != id);

        info!(
            "Deleted client {} and {} payment records",
            client.id,
            before - self.payments.len()
        );
        self.commit(
            LedgerEvent::ClientRemoved,
            &[CollectionKey::Clients, CollectionKey::Payments],
        );
        true
    }

    /// Edit a payment history entry
    pub fn update_payment(&mut self, id: &str, patch: &PaymentPatch) -> Option<PaymentRecord> {
        if patch.amount.is_some_and(|a| !a.is_finite()) {
            debug!("Skipping update of payment {} with a non-finite amount", id);
            return None;
        }
        let payment = self.payments.iter_mut().find(|p| p.id == id)?;
        patch.apply(payment);
        let updated = payment.clone();

        info!("Updated payment record {}", updated.id);
        self.commit(LedgerEvent::PaymentEdited, &[CollectionKey::Payments]);
        Some(updated)
    }

    /// Remove one payment history entry
    pub fn delete_payment(&mut self, id: &str) -> bool {
        let Some(index) = self.payments.iter().position(|p| p.id == id) else {
            return false;
        };
        self.payments.remove(index);

        info!("Deleted payment record {}", id);
        self.commit(LedgerEvent::PaymentRemoved, &[CollectionKey::Payments]);
        true
    }

    /// Record the audit entry for a mutation and write everything it touched
    pub(crate) fn commit(&mut self, event: LedgerEvent, touched: &[CollectionKey]) {
        self.notifications.emit(&event, &self.settings.currency_symbol);
        for key in touched {
            self.persist(*key);
        }
        self.persist(CollectionKey::Notifications);
    }

    fn persist(&self, key: CollectionKey) {
        let encoded = match key {
            CollectionKey::Clients => encode(&self.clients),
            CollectionKey::Payments => encode(&self.payments),
            CollectionKey::Notifications => encode(self.notifications.entries()),
        };
        let payload = match encoded {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.gateway.save_collection(key, &payload) {
            warn!("Failed to save {}: {}", key, e);
        }
    }
}

fn encode<T: Serialize>(items: &[T]) -> serde_json::Result<String> {
    serde_json::to_string(items)
}

/// Decode a stored collection record by record.
///
/// An unreadable payload yields an empty collection, a single bad record is
/// dropped without taking the rest of the collection with it.
fn load_or_empty<G, T>(gateway: &G, key: CollectionKey) -> Vec<T>
where
    G: PersistenceGateway,
    T: DeserializeOwned,
{
    match gateway.load_collection(key) {
        Ok(Some(payload)) => match serde_json::from_str::<Vec<serde_json::Value>>(&payload) {
            Ok(records) => records
                .into_iter()
                .filter_map(|record| match serde_json::from_value(record) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!("Dropping undecodable record in {}: {}", key, e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                error!("Error decoding {}, starting empty: {}", key, e);
                Vec::new()
            }
        },
        Ok(None) => Vec::new(),
        Err(e) => {
            error!("Error loading {}, starting empty: {}", key, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::{Database, DatabaseError};
    use crate::models::NotificationKind;
    use std::cell::RefCell;
    use std::collections::HashMap;

    pub(crate) fn ledger() -> Ledger<Database> {
        Ledger::load(Database::open_in_memory().unwrap(), LedgerSettings::default())
    }

    pub(crate) fn draft(name: &str, phone1: &str, amount: f64) -> ClientDraft {
        ClientDraft {
            name: name.to_string(),
            phone1: phone1.to_string(),
            monthly_amount: Some(amount),
            ..Default::default()
        }
    }

    /// Gateway whose reads and writes always fail
    struct BrokenGateway;

    impl PersistenceGateway for BrokenGateway {
        fn load_collection(&self, _key: CollectionKey) -> Result<Option<String>, DatabaseError> {
            Err(DatabaseError::DirectoryError("unavailable".to_string()))
        }

        fn save_collection(&self, _key: CollectionKey, _payload: &str) -> Result<(), DatabaseError> {
            Err(DatabaseError::DirectoryError("unavailable".to_string()))
        }
    }

    /// Gateway serving fixed payloads from memory
    #[derive(Default)]
    struct MemoryGateway {
        stored: RefCell<HashMap<CollectionKey, String>>,
    }

    impl PersistenceGateway for MemoryGateway {
        fn load_collection(&self, key: CollectionKey) -> Result<Option<String>, DatabaseError> {
            Ok(self.stored.borrow().get(&key).cloned())
        }

        fn save_collection(&self, key: CollectionKey, payload: &str) -> Result<(), DatabaseError> {
            self.stored.borrow_mut().insert(key, payload.to_string());
            Ok(())
        }
    }

    /// Gateway that counts writes per collection
    #[derive(Default)]
    struct RecordingGateway {
        saves: RefCell<HashMap<CollectionKey, usize>>,
    }

    impl PersistenceGateway for RecordingGateway {
        fn load_collection(&self, _key: CollectionKey) -> Result<Option<String>, DatabaseError> {
            Ok(Some("not json".to_string()))
        }

        fn save_collection(&self, key: CollectionKey, _payload: &str) -> Result<(), DatabaseError> {
            *self.saves.borrow_mut().entry(key).or_default() += 1;
            Ok(())
        }
    }

    #[test]
    fn add_client_starts_pending_with_fresh_id() {
        let mut ledger = ledger();
        let a = ledger.add_client(draft("Ana", "5551234", 150.0)).unwrap();
        let b = ledger.add_client(draft("Beto", "5559876", 200.0)).unwrap();

        assert_eq!(a.status, ClientStatus::Pendiente);
        assert_eq!(b.status, ClientStatus::Pendiente);
        assert_ne!(a.id, b.id);
        assert!(a.last_payment_date.is_none());
        assert_eq!(ledger.clients().len(), 2);
        assert_eq!(ledger.notifications()[0].title, "Nuevo Cliente");
        assert_eq!(ledger.notifications()[0].kind, NotificationKind::Success);
    }

    #[test]
    fn add_client_without_required_fields_is_skipped() {
        let mut ledger = ledger();
        assert!(ledger.add_client(draft("", "5551234", 100.0)).is_none());
        assert!(ledger.add_client(draft("Ana", "   ", 100.0)).is_none());

        assert!(ledger.clients().is_empty());
        assert!(ledger.notifications().is_empty());
    }

    #[test]
    fn missing_amount_uses_default_fee() {
        let mut ledger = ledger();
        let client = ledger
            .add_client(ClientDraft {
                name: "Ana".to_string(),
                phone1: "5551234".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(client.monthly_amount, 150.0);
    }

    #[test]
    fn update_unknown_client_is_noop() {
        let mut ledger = ledger();
        let patch = ClientPatch {
            name: Some("Nadie".to_string()),
            ..Default::default()
        };
        assert!(ledger.update_client("missing", &patch).is_none());
        assert!(ledger.notifications().is_empty());
    }

    #[test]
    fn update_client_keeps_payment_snapshot_name() {
        let mut ledger = ledger();
        let ana = ledger.add_client(draft("Ana", "5551234", 150.0)).unwrap();
        ledger.record_payment(&ana.id, None).unwrap();

        let patch = ClientPatch {
            name: Some("Ana María".to_string()),
            ..Default::default()
        };
        let updated = ledger.update_client(&ana.id, &patch).unwrap();

        assert_eq!(updated.name, "Ana María");
        assert_eq!(updated.phone1, "5551234");
        assert_eq!(ledger.payments()[0].client_name, "Ana");
        assert_eq!(ledger.notifications()[0].title, "Cliente Actualizado");
    }

    #[test]
    fn update_cannot_blank_required_fields() {
        let mut ledger = ledger();
        let ana = ledger.add_client(draft("Ana", "5551234", 150.0)).unwrap();
        let patch = ClientPatch {
            phone1: Some(String::new()),
            ..Default::default()
        };
        assert!(ledger.update_client(&ana.id, &patch).is_none());
        assert_eq!(ledger.client(&ana.id).unwrap().phone1, "5551234");
    }

    #[test]
    fn delete_client_cascades_to_payments() {
        let mut ledger = ledger();
        let ana = ledger.add_client(draft("Ana", "5551234", 150.0)).unwrap();
        let beto = ledger.add_client(draft("Beto", "5559876", 200.0)).unwrap();
        ledger.record_payment(&ana.id, None);
        ledger.record_payment(&ana.id, Some("extra".to_string()));
        ledger.record_payment(&beto.id, None);

        let preview = ledger.deletion_preview(&ana.id).unwrap();
        assert_eq!(preview.client.id, ana.id);
        assert_eq!(preview.payment_count(), 2);
        // preview alone changes nothing
        assert_eq!(ledger.payments().len(), 3);

        assert!(ledger.delete_client(&ana.id));
        assert!(ledger.client(&ana.id).is_none());
        assert!(ledger.payments().iter().all(|p| p.client_id != ana.id));
        assert_eq!(ledger.payments().len(), 1);
        assert_eq!(ledger.notifications()[0].title, "Cliente Eliminado");
        assert_eq!(ledger.notifications()[0].kind, NotificationKind::Warning);
    }

    #[test]
    fn delete_unknown_client_is_noop() {
        let mut ledger = ledger();
        assert!(ledger.deletion_preview("missing").is_none());
        assert!(!ledger.delete_client("missing"));
        assert!(ledger.notifications().is_empty());
    }

    #[test]
    fn edit_and_delete_history_entries() {
        let mut ledger = ledger();
        let ana = ledger.add_client(draft("Ana", "5551234", 150.0)).unwrap();
        let record = ledger.record_payment(&ana.id, None).unwrap();

        let patch = PaymentPatch {
            amount: Some(120.0),
            notes: Some(Some("descuento".to_string())),
            ..Default::default()
        };
        let edited = ledger.update_payment(&record.id, &patch).unwrap();
        assert_eq!(edited.amount, 120.0);
        assert_eq!(edited.notes.as_deref(), Some("descuento"));
        assert_eq!(ledger.notifications()[0].title, "Registro Actualizado");

        assert!(ledger.delete_payment(&record.id));
        assert!(ledger.payments().is_empty());
        assert!(!ledger.delete_payment(&record.id));
        assert_eq!(ledger.notifications()[0].title, "Registro Eliminado");
    }

    #[test]
    fn reload_restores_saved_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        let path = path.to_str().unwrap();

        let ana_id = {
            let mut ledger = Ledger::load(Database::new(path).unwrap(), LedgerSettings::default());
            let ana = ledger.add_client(draft("Ana", "5551234", 150.0)).unwrap();
            ledger.record_payment(&ana.id, Some("efectivo".to_string()));
            ana.id
        };

        let ledger = Ledger::load(Database::new(path).unwrap(), LedgerSettings::default());
        assert_eq!(ledger.client(&ana_id).unwrap().status, ClientStatus::Pagado);
        assert_eq!(ledger.payments().len(), 1);
        assert_eq!(ledger.payments()[0].notes.as_deref(), Some("efectivo"));
        assert_eq!(ledger.notifications().len(), 2);
    }

    #[test]
    fn unreadable_storage_falls_back_to_empty() {
        let mut ledger = Ledger::load(BrokenGateway, LedgerSettings::default());
        assert!(ledger.clients().is_empty());

        // writes fail silently, in-memory state still changes
        let ana = ledger.add_client(draft("Ana", "5551234", 150.0)).unwrap();
        assert!(ledger.record_payment(&ana.id, None).is_some());
        assert_eq!(ledger.payments().len(), 1);
    }

    #[test]
    fn corrupt_payload_loads_empty_and_each_mutation_saves() {
        let mut ledger = Ledger::load(RecordingGateway::default(), LedgerSettings::default());
        assert!(ledger.clients().is_empty());

        let ana = ledger.add_client(draft("Ana", "5551234", 150.0)).unwrap();
        ledger.delete_client(&ana.id);

        let saves = ledger.gateway().saves.borrow();
        assert_eq!(saves.get(&CollectionKey::Clients), Some(&2));
        assert_eq!(saves.get(&CollectionKey::Payments), Some(&1));
        assert_eq!(saves.get(&CollectionKey::Notifications), Some(&2));
    }

    #[test]
    fn non_finite_amounts_are_never_stored() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        let path = path.to_str().unwrap();

        {
            let mut ledger = Ledger::load(Database::new(path).unwrap(), LedgerSettings::default());
            let ana = ledger.add_client(draft("Ana", "5551234", f64::INFINITY)).unwrap();
            assert_eq!(ana.monthly_amount, 150.0);

            let beto = ledger.add_client(draft("Beto", "5559876", 200.0)).unwrap();
            let patch = ClientPatch {
                monthly_amount: Some(f64::INFINITY),
                ..Default::default()
            };
            assert!(ledger.update_client(&beto.id, &patch).is_none());
            assert_eq!(ledger.client(&beto.id).unwrap().monthly_amount, 200.0);

            let record = ledger.record_payment(&beto.id, None).unwrap();
            let patch = PaymentPatch {
                amount: Some(f64::NAN),
                ..Default::default()
            };
            assert!(ledger.update_payment(&record.id, &patch).is_none());
            assert_eq!(ledger.payment(&record.id).unwrap().amount, 200.0);
        }

        let ledger = Ledger::load(Database::new(path).unwrap(), LedgerSettings::default());
        assert_eq!(ledger.clients().len(), 2);
        assert_eq!(ledger.payments().len(), 1);
    }

    #[test]
    fn one_bad_record_does_not_wipe_the_collection() {
        let mut ledger = Ledger::load(MemoryGateway::default(), LedgerSettings::default());
        ledger.add_client(draft("Ana", "5551234", 150.0)).unwrap();
        ledger.add_client(draft("Beto", "5559876", 200.0)).unwrap();

        // a non-finite float is serialized as null
        let stored = ledger.gateway().stored.borrow()[&CollectionKey::Clients].clone();
        let mut clients: Vec<serde_json::Value> = serde_json::from_str(&stored).unwrap();
        clients[1]["monthlyAmount"] = serde_json::Value::Null;
        ledger
            .gateway()
            .save_collection(CollectionKey::Clients, &serde_json::to_string(&clients).unwrap())
            .unwrap();

        let mut reloaded = Ledger::load(ledger.gateway, LedgerSettings::default());
        assert_eq!(reloaded.clients().len(), 1);
        assert_eq!(reloaded.clients()[0].name, "Ana");

        reloaded.add_client(draft("Carla", "5550000", 100.0)).unwrap();
        let reloaded = Ledger::load(reloaded.gateway, LedgerSettings::default());
        let names: Vec<&str> = reloaded.clients().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Carla"]);
    }
}
