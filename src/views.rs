//! Read-only projections over the ledger: search, sorting, history filters
//! and dashboard totals. Nothing here is cached; callers recompute on every
//! read.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local};
use unicode_normalization::char::{decompose_canonical, is_combining_mark};

use crate::models::{Client, ClientStatus, PaymentRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Creation order
    #[default]
    Insertion,
    Name,
    Status,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insertion" | "default" => Ok(SortKey::Insertion),
            "name" => Ok(SortKey::Name),
            "status" => Ok(SortKey::Status),
            other => Err(format!("Unknown sort key: {}", other)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Insertion => write!(f, "insertion"),
            SortKey::Name => write!(f, "name"),
            SortKey::Status => write!(f, "status"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Current sort selection of the client list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortState {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Choosing the active key again flips the direction, a new key starts ascending
    pub fn select(&mut self, key: SortKey) {
        if self.key == key {
            self.direction = self.direction.toggled();
        } else {
            self.key = key;
            self.direction = SortDirection::Asc;
        }
    }
}

/// Clients whose name or phones contain `term`, ignoring case
pub fn filter_clients<'a>(clients: &'a [Client], term: &str) -> Vec<&'a Client> {
    let term = term.to_lowercase();
    clients
        .iter()
        .filter(|client| {
            term.is_empty()
                || client.name.to_lowercase().contains(&term)
                || client.phone1.to_lowercase().contains(&term)
                || client
                    .phone2
                    .as_ref()
                    .is_some_and(|p| p.to_lowercase().contains(&term))
        })
        .collect()
}

/// Sort in place. The sort is stable, equal elements keep their order.
pub fn sort_clients(clients: &mut [&Client], state: SortState) {
    match state.key {
        SortKey::Insertion => clients.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortKey::Name => clients.sort_by(|a, b| {
            let ordering = locale_compare(&a.name, &b.name);
            match state.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }),
        SortKey::Status => clients.sort_by(|a, b| {
            let ordering = status_rank(a.status).cmp(&status_rank(b.status));
            match state.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }),
    }
}

/// Search and sort in one step, the way the client list is displayed
pub fn client_list<'a>(clients: &'a [Client], term: &str, state: SortState) -> Vec<&'a Client> {
    let mut listed = filter_clients(clients, term);
    sort_clients(&mut listed, state);
    listed
}

/// Clients that still owe this cycle, in insertion order
pub fn pending_clients(clients: &[Client]) -> Vec<&Client> {
    let mut pending: Vec<&Client> = clients
        .iter()
        .filter(|c| c.status == ClientStatus::Pendiente)
        .collect();
    sort_clients(&mut pending, SortState::default());
    pending
}

fn status_rank(status: ClientStatus) -> u8 {
    match status {
        ClientStatus::Pagado => 0,
        ClientStatus::Pendiente => 1,
    }
}

/// Alphabetical order for Spanish names.
///
/// Case and accents are ignored at first, `ñ` sorts as its own letter after
/// `n`. Remaining ties put plain before accented, then lowercase first.
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| {
            a.chars()
                .map(char::is_uppercase)
                .cmp(b.chars().map(char::is_uppercase))
        })
        .then_with(|| a.cmp(b))
}

/// Lowercase base letters with diacritics stripped, `ñ` kept apart from `n`
fn collation_key(s: &str) -> Vec<char> {
    let mut key = Vec::with_capacity(s.len());
    for c in s.chars().flat_map(char::to_lowercase) {
        if c == 'ñ' {
            key.push('n');
            key.push(char::MAX);
            continue;
        }
        decompose_canonical(c, |part| {
            if !is_combining_mark(part) {
                key.push(part);
            }
        });
    }
    key
}

/// Payment history filter, every unset criterion matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub search: String,
    pub year: Option<i32>,
    /// 1 to 12
    pub month: Option<u32>,
}

impl HistoryFilter {
    pub fn matches(&self, payment: &PaymentRecord) -> bool {
        let term = self.search.to_lowercase();
        let date = payment.date.with_timezone(&Local);

        (term.is_empty() || payment.client_name.to_lowercase().contains(&term))
            && self.year.is_none_or(|year| date.year() == year)
            && self.month.is_none_or(|month| date.month() == month)
    }
}

pub fn filter_payments<'a>(payments: &'a [PaymentRecord], filter: &HistoryFilter) -> Vec<&'a PaymentRecord> {
    payments.iter().filter(|p| filter.matches(p)).collect()
}

/// Distinct years present in the history, newest first
pub fn available_years(payments: &[PaymentRecord]) -> Vec<i32> {
    let mut years: Vec<i32> = payments
        .iter()
        .map(|p| p.date.with_timezone(&Local).year())
        .collect();
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();
    years
}

/// Dashboard totals
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LedgerSummary {
    pub total_clients: usize,
    /// All-time income, never affected by history filters
    pub total_income: f64,
    pub pending_total: f64,
    pub pending_count: usize,
}

impl LedgerSummary {
    pub fn compute(clients: &[Client], payments: &[PaymentRecord]) -> Self {
        let pending = clients.iter().filter(|c| c.status == ClientStatus::Pendiente);
        Self {
            total_clients: clients.len(),
            total_income: payments.iter().map(|p| p.amount).sum(),
            pending_total: pending.clone().map(|c| c.monthly_amount).sum(),
            pending_count: pending.count(),
        }
    }
}
