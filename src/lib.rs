pub mod backup;
pub mod cli;
pub mod config;
pub mod database;
pub mod ledger;
pub mod messaging;
pub mod models;
pub mod notifications;
pub mod status;
pub mod utils;
pub mod views;

pub use config::Config;
pub use database::{CollectionKey, Database, PersistenceGateway};
pub use ledger::{DeletionPreview, Ledger, LedgerSettings};
pub use models::{Client, ClientStatus, Notification, NotificationKind, PaymentRecord};
pub use status::{ResetPreview, UndoPreview};
pub use utils::Profile;
