use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use csv::{QuoteStyle, WriterBuilder};
use log::info;
use thiserror::Error;

use crate::config::Config;
use crate::models::PaymentRecord;

pub const BACKUP_HEADER: [&str; 5] = ["ID", "Cliente", "Fecha", "Monto", "Notas"];

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Failed to write backup: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid date format: {0}")]
    DateFormatError(String),
}

/// `<AppName>_Respaldo_<YYYY-MM-DD>.csv`
pub fn backup_filename(app_name: &str, export_date: NaiveDate) -> String {
    format!("{}_Respaldo_{}.csv", app_name, export_date.format("%Y-%m-%d"))
}

fn format_day(payment: &PaymentRecord, date_format: &str) -> Result<String, BackupError> {
    let mut rendered = String::new();
    write!(rendered, "{}", payment.date.with_timezone(&Local).format(date_format))
        .map_err(|_| BackupError::DateFormatError(date_format.to_string()))?;
    Ok(rendered)
}

/// Text field wrapped in double quotes, inner quotes doubled
fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Write the whole payment history as CSV.
///
/// Every text field is quoted, even when it looks like a number. The amount
/// is a bare number with two decimals and the date is a calendar day
/// rendered with `date_format`.
pub fn write_backup<W: io::Write>(
    payments: &[PaymentRecord],
    date_format: &str,
    writer: W,
) -> Result<(), BackupError> {
    // fields arrive already quoted
    let mut csv_writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .from_writer(writer);

    csv_writer.write_record(BACKUP_HEADER.map(quoted))?;
    for payment in payments {
        let day = format_day(payment, date_format)?;
        csv_writer.write_record([
            quoted(&payment.id),
            quoted(&payment.client_name),
            quoted(&day),
            format!("{:.2}", payment.amount),
            quoted(payment.notes.as_deref().unwrap_or("")),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn backup_to_string(payments: &[PaymentRecord], date_format: &str) -> Result<String, BackupError> {
    let mut buffer = Vec::new();
    write_backup(payments, date_format, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| BackupError::IoError(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Write the backup file into `dir` and return its path
pub fn export_backup(
    payments: &[PaymentRecord],
    config: &Config,
    dir: &Path,
    export_date: NaiveDate,
) -> Result<PathBuf, BackupError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(backup_filename(&config.app_name, export_date));

    let file = File::create(&path)?;
    write_backup(payments, &config.date_format, BufWriter::new(file))?;

    info!("Exported {} payment records to {}", payments.len(), path.display());
    Ok(path)
}
