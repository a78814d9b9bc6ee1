use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Billing-cycle state of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientStatus {
    /// Owes the fee for the current cycle
    Pendiente,
    /// Paid for the current cycle
    Pagado,
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientStatus::Pendiente => write!(f, "Pendiente"),
            ClientStatus::Pagado => write!(f, "Pagado"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    pub phone1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone2: Option<String>,
    pub monthly_amount: f64,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub client_id: String,
    pub client_name: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Info => write!(f, "info"),
            NotificationKind::Success => write!(f, "success"),
            NotificationKind::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
}

/// Input for creating a client. Name and first phone are required.
#[derive(Debug, Clone, Default)]
pub struct ClientDraft {
    pub name: String,
    pub phone1: String,
    pub phone2: Option<String>,
    /// `None`, zero or a non-finite value falls back to the configured default fee
    pub monthly_amount: Option<f64>,
    pub image: Option<String>,
}

/// Partial update of a client's editable fields.
///
/// Every `Some` overwrites the stored value, every `None` keeps it. The
/// optional fields use a nested `Option` so a patch can clear them:
/// `Some(None)` removes the value.
#[derive(Debug, Clone, Default)]
pub struct ClientPatch {
    pub name: Option<String>,
    pub phone1: Option<String>,
    pub phone2: Option<Option<String>>,
    pub monthly_amount: Option<f64>,
    pub image: Option<Option<String>>,
}

impl ClientPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone1.is_none()
            && self.phone2.is_none()
            && self.monthly_amount.is_none()
            && self.image.is_none()
    }

    /// Apply the patch in place
    pub fn apply(&self, client: &mut Client) {
        if let Some(name) = &self.name {
            client.name = name.clone();
        }
        if let Some(phone1) = &self.phone1 {
            client.phone1 = phone1.clone();
        }
        if let Some(phone2) = &self.phone2 {
            client.phone2 = phone2.clone().filter(|p| !p.trim().is_empty());
        }
        if let Some(amount) = self.monthly_amount.filter(|a| a.is_finite()) {
            client.monthly_amount = amount.max(0.0);
        }
        if let Some(image) = &self.image {
            client.image = image.clone().filter(|i| !i.is_empty());
        }
    }
}

/// Partial update of a payment history entry
#[derive(Debug, Clone, Default)]
pub struct PaymentPatch {
    pub client_name: Option<String>,
    pub amount: Option<f64>,
    pub date: Option<DateTime<Utc>>,
    pub notes: Option<Option<String>>,
}

impl PaymentPatch {
    pub fn is_empty(&self) -> bool {
        self.client_name.is_none()
            && self.amount.is_none()
            && self.date.is_none()
            && self.notes.is_none()
    }

    pub fn apply(&self, payment: &mut PaymentRecord) {
        if let Some(name) = &self.client_name {
            payment.client_name = name.clone();
        }
        if let Some(amount) = self.amount.filter(|a| a.is_finite()) {
            payment.amount = amount.max(0.0);
        }
        if let Some(date) = self.date {
            payment.date = date;
        }
        if let Some(notes) = &self.notes {
            payment.notes = notes.clone().filter(|n| !n.is_empty());
        }
    }
}
