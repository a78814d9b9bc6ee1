use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::backup::{BackupError, export_backup};
use crate::config::Config;
use crate::database::{DatabaseError, PersistenceGateway};
use crate::ledger::Ledger;
use crate::messaging::{pending_reminders, reminder_link};
use crate::models::{Client, ClientDraft, ClientPatch, PaymentPatch, PaymentRecord};
use crate::utils::{format_amount, parse_date};
use crate::views::{
    HistoryFilter, LedgerSummary, SortKey, SortState, available_years, client_list,
    filter_payments, pending_clients,
};

#[derive(Parser)]
#[command(name = "lavafix")]
#[command(about = "Monthly billing ledger - clients, payments and reminders")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show totals (default if no subcommand)
    Summary,
    /// Register a new client
    AddClient {
        /// Client name
        name: String,
        /// Main phone number
        phone1: String,
        /// Secondary phone number
        #[arg(long)]
        phone2: Option<String>,
        /// Monthly fee (uses the configured default if omitted)
        #[arg(long, value_parser = parse_amount)]
        amount: Option<f64>,
        /// Encoded avatar image
        #[arg(long)]
        image: Option<String>,
    },
    /// Change a client's details
    EditClient {
        /// Client ID (or unique prefix)
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone1: Option<String>,
        #[arg(long, conflicts_with = "clear_phone2")]
        phone2: Option<String>,
        /// Remove the secondary phone
        #[arg(long)]
        clear_phone2: bool,
        #[arg(long, value_parser = parse_amount)]
        amount: Option<f64>,
        #[arg(long, conflicts_with = "clear_image")]
        image: Option<String>,
        /// Remove the avatar image
        #[arg(long)]
        clear_image: bool,
    },
    /// Delete a client and its payment history
    DeleteClient {
        /// Client ID (or unique prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// List clients
    Clients {
        /// Filter by name or phone
        #[arg(short, long, default_value = "")]
        search: String,
        /// Sort key: insertion, name or status
        #[arg(long, default_value = "insertion")]
        sort: SortKey,
        /// Reverse the sort order
        #[arg(long)]
        desc: bool,
    },
    /// List clients that still owe this month
    Pending,
    /// Record this month's payment for a client
    Pay {
        /// Client ID (or unique prefix)
        id: String,
        /// Optional note stored with the payment
        #[arg(long)]
        notes: Option<String>,
    },
    /// Undo a client's latest payment and mark it pending again
    Undo {
        /// Client ID (or unique prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Start a new month: every client becomes pending
    ResetMonth {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show payment history
    History {
        /// Filter by client name
        #[arg(short, long, default_value = "")]
        search: String,
        /// Calendar year
        #[arg(long)]
        year: Option<i32>,
        /// Calendar month (1-12)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
    },
    /// Change a payment history entry
    EditPayment {
        /// Payment ID (or unique prefix)
        id: String,
        #[arg(long)]
        client_name: Option<String>,
        #[arg(long, value_parser = parse_amount)]
        amount: Option<f64>,
        /// Payment date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
        #[arg(long, conflicts_with = "clear_notes")]
        notes: Option<String>,
        /// Remove the note
        #[arg(long)]
        clear_notes: bool,
    },
    /// Delete a payment history entry
    DeletePayment {
        /// Payment ID (or unique prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the activity log
    Notifications {
        /// Maximum number of entries
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Export the payment history as CSV
    Backup {
        /// Target directory (defaults to the configured backup directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Print payment reminder links
    Remind {
        /// Client ID (or unique prefix)
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,
        /// Every pending client
        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
    #[error("Backup error: {0}")]
    BackupError(#[from] BackupError),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
    #[error("No client matches '{0}'")]
    ClientNotFound(String),
    #[error("No payment matches '{0}'")]
    PaymentNotFound(String),
    #[error("'{0}' matches more than one entry, use a longer ID")]
    AmbiguousId(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Money amounts must be finite and not negative
fn parse_amount(value: &str) -> Result<f64, String> {
    let amount: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid amount '{}': {}", value, e))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(format!("invalid amount '{}'", value));
    }
    Ok(amount)
}

/// Find the id that equals `query`, or else the single one starting with it
fn resolve_id<'a, I>(ids: I, query: &str) -> Result<Option<String>, CliError>
where
    I: Iterator<Item = &'a str>,
{
    let candidates: Vec<&str> = ids.filter(|id| id.starts_with(query)).collect();
    if candidates.iter().any(|id| *id == query) {
        return Ok(Some(query.to_string()));
    }
    match candidates.as_slice() {
        [] => Ok(None),
        [id] => Ok(Some(id.to_string())),
        _ => Err(CliError::AmbiguousId(query.to_string())),
    }
}

fn resolve_client<G: PersistenceGateway>(ledger: &Ledger<G>, query: &str) -> Result<String, CliError> {
    resolve_id(ledger.clients().iter().map(|c| c.id.as_str()), query)?
        .ok_or_else(|| CliError::ClientNotFound(query.to_string()))
}

fn resolve_payment<G: PersistenceGateway>(ledger: &Ledger<G>, query: &str) -> Result<String, CliError> {
    resolve_id(ledger.payments().iter().map(|p| p.id.as_str()), query)?
        .ok_or_else(|| CliError::PaymentNotFound(query.to_string()))
}

/// Ask a yes/no question on the terminal, anything but y/yes/s/si means no
pub fn confirm(prompt: &str) -> io::Result<bool> {
    let stdin = io::stdin();
    confirm_with(prompt, &mut stdin.lock(), &mut io::stdout())
}

fn confirm_with<R: BufRead, W: Write>(prompt: &str, input: &mut R, output: &mut W) -> io::Result<bool> {
    write!(output, "{} [y/N] ", prompt)?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "si" | "sí"
    ))
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn format_day(date: &DateTime<Utc>, config: &Config) -> String {
    date.with_timezone(&Local).format(&config.date_format).to_string()
}

fn print_client_row(client: &Client, config: &Config) {
    let phones = match &client.phone2 {
        Some(phone2) => format!("{} / {}", client.phone1, phone2),
        None => client.phone1.clone(),
    };
    let last_payment = client
        .last_payment_date
        .map(|d| format_day(&d, config))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<8}  {:<24}  {:<22}  {:>10}  {:<9}  {}",
        short_id(&client.id),
        client.name,
        phones,
        format_amount(&config.currency_symbol, client.monthly_amount),
        client.status,
        last_payment
    );
}

fn print_payment_row(payment: &PaymentRecord, config: &Config) {
    println!(
        "{:<8}  {:<10}  {:<24}  {:>10}  {}",
        short_id(&payment.id),
        format_day(&payment.date, config),
        payment.client_name,
        format_amount(&config.currency_symbol, payment.amount),
        payment.notes.as_deref().unwrap_or("")
    );
}

/// Handle the summary command
pub fn handle_summary<G: PersistenceGateway>(ledger: &Ledger<G>, config: &Config) {
    let summary = LedgerSummary::compute(ledger.clients(), ledger.payments());
    println!("Clients:         {}", summary.total_clients);
    println!("Total income:    {}", format_amount(&config.currency_symbol, summary.total_income));
    println!(
        "Pending:         {} ({} clients)",
        format_amount(&config.currency_symbol, summary.pending_total),
        summary.pending_count
    );
}

/// Handle the add-client command
pub fn handle_add_client<G: PersistenceGateway>(
    draft: ClientDraft,
    ledger: &mut Ledger<G>,
) -> Result<(), CliError> {
    match ledger.add_client(draft) {
        Some(client) => {
            println!("Client created successfully (ID: {})", client.id);
            Ok(())
        }
        None => Err(CliError::MissingField("name and phone1 are required".to_string())),
    }
}

/// Handle the edit-client command
pub fn handle_edit_client<G: PersistenceGateway>(
    id: &str,
    patch: ClientPatch,
    ledger: &mut Ledger<G>,
) -> Result<(), CliError> {
    let id = resolve_client(ledger, id)?;
    if patch.is_empty() {
        println!("Nothing to change");
        return Ok(());
    }
    match ledger.update_client(&id, &patch) {
        Some(client) => println!("Client {} updated", client.name),
        None => println!("Client not changed: name and phone1 cannot be empty"),
    }
    Ok(())
}

/// Handle the delete-client command
pub fn handle_delete_client<G: PersistenceGateway>(
    id: &str,
    yes: bool,
    ledger: &mut Ledger<G>,
) -> Result<(), CliError> {
    let id = resolve_client(ledger, id)?;
    let Some(preview) = ledger.deletion_preview(&id) else {
        return Err(CliError::ClientNotFound(id));
    };

    let prompt = format!(
        "Warning: {} and {} payment record(s) will be permanently deleted. Continue?",
        preview.client.name,
        preview.payment_count()
    );
    if !yes && !confirm(&prompt)? {
        println!("Cancelled");
        return Ok(());
    }

    ledger.delete_client(&id);
    println!("Client {} deleted", preview.client.name);
    Ok(())
}

/// Handle the clients command
pub fn handle_list_clients<G: PersistenceGateway>(
    search: &str,
    sort: SortKey,
    desc: bool,
    ledger: &Ledger<G>,
    config: &Config,
) {
    let mut state = SortState::default();
    state.select(sort);
    if desc {
        state.select(sort);
    }

    let clients = client_list(ledger.clients(), search, state);
    if clients.is_empty() {
        println!("No clients found");
        return;
    }
    for client in clients {
        print_client_row(client, config);
    }
}

/// Handle the pending command
pub fn handle_pending<G: PersistenceGateway>(ledger: &Ledger<G>, config: &Config) {
    let pending = pending_clients(ledger.clients());
    if pending.is_empty() {
        println!("No pending clients");
        return;
    }
    for client in &pending {
        print_client_row(client, config);
    }
    let total: f64 = pending.iter().map(|c| c.monthly_amount).sum();
    println!("Pending total: {}", format_amount(&config.currency_symbol, total));
}

/// Handle the pay command
pub fn handle_pay<G: PersistenceGateway>(
    id: &str,
    notes: Option<String>,
    ledger: &mut Ledger<G>,
    config: &Config,
) -> Result<(), CliError> {
    let id = resolve_client(ledger, id)?;
    let record = ledger
        .record_payment(&id, notes)
        .ok_or_else(|| CliError::ClientNotFound(id.clone()))?;
    println!(
        "Payment of {} recorded for {} (ID: {})",
        format_amount(&config.currency_symbol, record.amount),
        record.client_name,
        record.id
    );
    Ok(())
}

/// Handle the undo command
pub fn handle_undo<G: PersistenceGateway>(
    id: &str,
    yes: bool,
    ledger: &mut Ledger<G>,
    config: &Config,
) -> Result<(), CliError> {
    let id = resolve_client(ledger, id)?;
    let Some(preview) = ledger.undo_preview(&id) else {
        return Err(CliError::ClientNotFound(id));
    };

    let removal = match &preview.payment {
        Some(payment) => format!(
            "the payment of {} from {} will be removed",
            format_amount(&config.currency_symbol, payment.amount),
            format_day(&payment.date, config)
        ),
        None => "no payment record will be removed".to_string(),
    };
    let prompt = format!(
        "Correct the status of \"{}\"? It becomes PENDIENTE and {}.",
        preview.client.name, removal
    );
    if !yes && !confirm(&prompt)? {
        println!("Cancelled");
        return Ok(());
    }

    ledger.undo_payment(&id);
    println!("{} is pending again", preview.client.name);
    Ok(())
}

/// Handle the reset-month command
pub fn handle_reset_month<G: PersistenceGateway>(yes: bool, ledger: &mut Ledger<G>) -> Result<(), CliError> {
    let preview = ledger.reset_preview();
    let prompt = format!(
        "Reset the month? All {} clients become pending ({} currently paid).",
        preview.total_clients, preview.paid_clients
    );
    if !yes && !confirm(&prompt)? {
        println!("Cancelled");
        return Ok(());
    }

    ledger.reset_month();
    println!("Month reset, {} clients pending", preview.total_clients);
    Ok(())
}

/// Handle the history command
pub fn handle_history<G: PersistenceGateway>(filter: &HistoryFilter, ledger: &Ledger<G>, config: &Config) {
    let payments = filter_payments(ledger.payments(), filter);
    if payments.is_empty() {
        println!("No payments found");
    }
    for payment in &payments {
        print_payment_row(payment, config);
    }

    let shown: f64 = payments.iter().map(|p| p.amount).sum();
    println!(
        "{} payment(s), {} shown",
        payments.len(),
        format_amount(&config.currency_symbol, shown)
    );
    let years = available_years(ledger.payments());
    if !years.is_empty() {
        let years: Vec<String> = years.iter().map(i32::to_string).collect();
        println!("Years with payments: {}", years.join(", "));
    }
}

/// Parse a YYYY-MM-DD date as noon local time
fn parse_payment_date(date: &str) -> Result<DateTime<Utc>, CliError> {
    let day = parse_date(date)
        .map_err(|e| CliError::DateParseError(format!("Invalid date format '{}': {}", date, e)))?;
    let noon = NaiveTime::from_hms_opt(12, 0, 0)
        .ok_or_else(|| CliError::DateParseError(date.to_string()))?;
    day.and_time(noon)
        .and_local_timezone(Local)
        .earliest()
        .map(|d| d.with_timezone(&Utc))
        .ok_or_else(|| CliError::DateParseError(format!("'{}' does not exist in local time", date)))
}

/// Handle the edit-payment command
pub fn handle_edit_payment<G: PersistenceGateway>(
    id: &str,
    client_name: Option<String>,
    amount: Option<f64>,
    date: Option<String>,
    notes: Option<Option<String>>,
    ledger: &mut Ledger<G>,
) -> Result<(), CliError> {
    let id = resolve_payment(ledger, id)?;
    let patch = PaymentPatch {
        client_name,
        amount,
        date: date.as_deref().map(parse_payment_date).transpose()?,
        notes,
    };
    if patch.is_empty() {
        println!("Nothing to change");
        return Ok(());
    }

    let updated = ledger
        .update_payment(&id, &patch)
        .ok_or_else(|| CliError::PaymentNotFound(id.clone()))?;
    println!("Payment {} updated", updated.id);
    Ok(())
}

/// Handle the delete-payment command
pub fn handle_delete_payment<G: PersistenceGateway>(
    id: &str,
    yes: bool,
    ledger: &mut Ledger<G>,
) -> Result<(), CliError> {
    let id = resolve_payment(ledger, id)?;
    if !yes && !confirm("Permanently delete this payment record from the history?")? {
        println!("Cancelled");
        return Ok(());
    }

    if !ledger.delete_payment(&id) {
        return Err(CliError::PaymentNotFound(id));
    }
    println!("Payment {} deleted", id);
    Ok(())
}

/// Handle the notifications command
pub fn handle_notifications<G: PersistenceGateway>(limit: usize, ledger: &Ledger<G>) {
    if ledger.notifications().is_empty() {
        println!("No activity yet");
        return;
    }
    for notification in ledger.notifications().iter().take(limit) {
        println!(
            "{}  [{}] {}: {}",
            notification.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            notification.kind,
            notification.title,
            notification.message
        );
    }
}

/// Handle the backup command
pub fn handle_backup<G: PersistenceGateway>(
    dir: Option<PathBuf>,
    ledger: &Ledger<G>,
    config: &Config,
) -> Result<(), CliError> {
    let dir = dir.unwrap_or_else(|| config.get_backup_dir());
    let path = export_backup(ledger.payments(), config, &dir, Local::now().date_naive())?;
    println!(
        "Backup of {} payment(s) written to {}",
        ledger.payments().len(),
        path.display()
    );
    Ok(())
}

/// Handle the remind command
pub fn handle_remind<G: PersistenceGateway>(
    id: Option<String>,
    all: bool,
    ledger: &Ledger<G>,
    config: &Config,
) -> Result<(), CliError> {
    let links = if all {
        pending_reminders(ledger.clients(), config)
    } else {
        let query = id.ok_or_else(|| CliError::MissingField("client id".to_string()))?;
        let id = resolve_client(ledger, &query)?;
        let client = ledger
            .client(&id)
            .ok_or_else(|| CliError::ClientNotFound(id.clone()))?;
        reminder_link(client, config).into_iter().collect()
    };

    if links.is_empty() {
        println!("No reminders to send");
        return Ok(());
    }
    for link in links {
        println!("{} ({}): {}", link.client_name, link.phone, link.url);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tests::{draft, ledger};
    use std::io::Cursor;

    #[test]
    fn resolves_exact_and_prefix_ids() {
        let ids = ["abc123", "abd456", "xyz"];
        assert_eq!(resolve_id(ids.iter().copied(), "xyz").unwrap().as_deref(), Some("xyz"));
        assert_eq!(resolve_id(ids.iter().copied(), "abc").unwrap().as_deref(), Some("abc123"));
        assert!(resolve_id(ids.iter().copied(), "zzz").unwrap().is_none());
        assert!(matches!(
            resolve_id(ids.iter().copied(), "ab"),
            Err(CliError::AmbiguousId(_))
        ));
    }

    #[test]
    fn exact_id_wins_over_later_prefix_matches() {
        let ids = ["abc1", "abc2", "abc"];
        assert_eq!(resolve_id(ids.iter().copied(), "abc").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn amounts_must_be_finite_and_positive() {
        assert_eq!(parse_amount("150"), Ok(150.0));
        assert_eq!(parse_amount(" 99.5 "), Ok(99.5));
        assert!(parse_amount("inf").is_err());
        assert!(parse_amount("NaN").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("abc").is_err());

        let cli = Cli::try_parse_from(["lavafix", "add-client", "Ana", "5551234", "--amount", "inf"]);
        assert!(cli.is_err());
    }

    #[test]
    fn confirmation_accepts_yes_and_si() {
        let mut out = Vec::new();
        assert!(confirm_with("ok?", &mut Cursor::new("y\n"), &mut out).unwrap());
        assert!(confirm_with("ok?", &mut Cursor::new("Sí\n"), &mut out).unwrap());
        assert!(!confirm_with("ok?", &mut Cursor::new("\n"), &mut out).unwrap());
        assert!(!confirm_with("ok?", &mut Cursor::new("no\n"), &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().starts_with("ok? [y/N] "));
    }

    #[test]
    fn confirmed_commands_mutate_ledger() {
        let mut ledger = ledger();
        let config = Config::default();
        let ana = ledger.add_client(draft("Ana", "5551234", 150.0)).unwrap();

        handle_pay(short_id(&ana.id), None, &mut ledger, &config).unwrap();
        assert_eq!(ledger.payments().len(), 1);

        handle_undo(&ana.id, true, &mut ledger, &config).unwrap();
        assert!(ledger.payments().is_empty());

        handle_delete_client(&ana.id, true, &mut ledger).unwrap();
        assert!(ledger.clients().is_empty());
    }

    #[test]
    fn unknown_client_is_reported() {
        let mut ledger = ledger();
        let config = Config::default();
        assert!(matches!(
            handle_pay("nobody", None, &mut ledger, &config),
            Err(CliError::ClientNotFound(_))
        ));
    }

    #[test]
    fn edit_payment_parses_date() {
        let mut ledger = ledger();
        let ana = ledger.add_client(draft("Ana", "5551234", 150.0)).unwrap();
        let record = ledger.record_payment(&ana.id, None).unwrap();

        handle_edit_payment(
            &record.id,
            None,
            Some(99.0),
            Some("2025-03-15".to_string()),
            Some(None),
            &mut ledger,
        )
        .unwrap();

        let edited = ledger.payment(&record.id).unwrap();
        assert_eq!(edited.amount, 99.0);
        assert_eq!(edited.date.with_timezone(&Local).date_naive(), parse_date("2025-03-15").unwrap());

        assert!(matches!(
            handle_edit_payment(&record.id, None, None, Some("15/03/2025".to_string()), None, &mut ledger),
            Err(CliError::DateParseError(_))
        ));
    }

    #[test]
    fn backup_command_writes_into_given_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let ledger = ledger();
        handle_backup(Some(dir.path().to_path_buf()), &ledger, &Config::default()).unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }
}
