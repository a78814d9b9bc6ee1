use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn app_name(&self) -> &'static str {
        match self {
            Profile::Dev => "lavafix-dev",
            Profile::Prod => "lavafix",
        }
    }
}

/// Get the configuration directory path
/// If profile is Dev, uses "lavafix-dev" instead of "lavafix"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "lavafix", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "lavafix", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse a date string in ISO 8601 format (YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<chrono::NaiveDate, chrono::ParseError> {
    chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
}

/// Opaque unique identifier for ledger entities
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Currency amount with two decimals, e.g. `Q150.00`
pub fn format_amount(currency_symbol: &str, amount: f64) -> String {
    format!("{}{:.2}", currency_symbol, amount)
}

/// Keep only ASCII digits, e.g. "555-12 34" -> "5551234"
pub fn digits_only(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Treat blank optional text as absent
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
