use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, anyhow};
use sheets::{A1Range, ServiceAccount, SheetsSettings, client::DEFAULT_API_BASE};
use tracing::{debug, info};

use crate::draw::PrizeTable;

pub const DEFAULT_RANGE: &str = "GIEO QUẺ!A:E";

pub struct Config {
    pub port: u16,
    pub sheets: SheetsSettings,
    pub sheet_range: A1Range,
    pub header_rows: usize,
    pub cache_capacity: usize,
    pub prizes: PrizeTable,
    pub record_audit: bool,
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Environment first, then `/run/secrets/<NAME>`.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| var(key).or_else(|| read_secret(key)))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let service_account = match (
            lookup("GOOGLE_SERVICE_ACCOUNT_EMAIL"),
            lookup("GOOGLE_SERVICE_ACCOUNT_KEY"),
        ) {
            (Some(email), Some(key)) => Some(ServiceAccount::new(&email, &key)),
            _ => {
                info!("Service account not configured, sheet writes will fail");
                None
            }
        };

        let sheets = SheetsSettings {
            spreadsheet_id: lookup("SHEET_ID"),
            service_account,
            api_key: lookup("GOOGLE_SHEETS_API_KEY").or_else(|| lookup("GOOGLE_API_KEY")),
            api_base: lookup("SHEETS_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            timeout: Duration::from_millis(try_load(&lookup, "SHEETS_TIMEOUT_MS", "10000")?),
            ..SheetsSettings::default()
        };

        let range = lookup("SHEET_RANGE").unwrap_or_else(|| DEFAULT_RANGE.to_string());
        let sheet_range = A1Range::parse(&range).context("Invalid SHEET_RANGE value")?;

        let prizes = match lookup("PRIZE_TABLE") {
            Some(table) => PrizeTable::parse(&table).context("Invalid PRIZE_TABLE value")?,
            None => PrizeTable::default(),
        };

        Ok(Self {
            port: try_load(&lookup, "PORT", "3000")?,
            sheets,
            sheet_range,
            header_rows: try_load(&lookup, "SHEET_HEADER_ROWS", "1")?,
            cache_capacity: try_load(&lookup, "FALLBACK_CACHE_CAPACITY", "10000")?,
            prizes,
            record_audit: parse_flag(&lookup, "SHEET_RECORD_AUDIT")?,
            static_dir: lookup("STATIC_DIR").map(PathBuf::from),
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> anyhow::Result<T>
where
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value: {e}"))
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<bool> {
    match lookup(key).map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        None | Some("" | "0" | "false" | "no") => Ok(false),
        Some("1" | "true" | "yes") => Ok(true),
        Some(other) => Err(anyhow!("Invalid {key} value: {other}")),
    }
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            debug!("No secret file for {secret_name}: {e}");
        })
        .ok()
        .filter(|s| !s.is_empty())
}
