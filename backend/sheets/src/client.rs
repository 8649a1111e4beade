use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned, de::IgnoredAny};
use serde_json::Value;
use tracing::debug;

use crate::{
    Rows, RowStore, SheetsError,
    auth::{ServiceAccount, TOKEN_URL, TokenCache},
};

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";

const SERVICE_ACCOUNT_VARS: &str = "GOOGLE_SERVICE_ACCOUNT_EMAIL or GOOGLE_SERVICE_ACCOUNT_KEY";

#[derive(Debug, Clone)]
pub struct SheetsSettings {
    pub spreadsheet_id: Option<String>,
    pub service_account: Option<ServiceAccount>,
    pub api_key: Option<String>,
    pub api_base: String,
    pub token_url: String,
    pub timeout: Duration,
}

impl Default for SheetsSettings {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            service_account: None,
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Authenticated access to the spreadsheet values endpoint.
///
/// No retries. Every failure surfaces as a [`SheetsError`].
pub struct SheetsClient {
    http: Client,
    settings: SheetsSettings,
    tokens: TokenCache,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Serialize)]
struct WriteBody<'a> {
    values: &'a Rows,
}

impl SheetsClient {
    pub fn new(settings: SheetsSettings) -> Result<Self, SheetsError> {
        let http = Client::builder().timeout(settings.timeout).build()?;

        Ok(Self {
            http,
            settings,
            tokens: TokenCache::default(),
        })
    }

    fn spreadsheet_id(&self) -> Result<&str, SheetsError> {
        self.settings
            .spreadsheet_id
            .as_deref()
            .ok_or(SheetsError::MissingConfig("SHEET_ID"))
    }

    async fn bearer(&self) -> Result<String, SheetsError> {
        let account = self
            .settings
            .service_account
            .as_ref()
            .ok_or(SheetsError::MissingConfig(SERVICE_ACCOUNT_VARS))?;

        self.tokens
            .bearer(&self.http, account, &self.settings.token_url)
            .await
    }

    fn url(&self, range: &str, suffix: &str) -> Result<Url, SheetsError> {
        values_url(&self.settings.api_base, self.spreadsheet_id()?, range, suffix)
    }

    /// Read-only access with the public API key instead of the service account.
    pub async fn read_with_key(&self, range: &str) -> Result<Rows, SheetsError> {
        let (id, key) = match (&self.settings.spreadsheet_id, &self.settings.api_key) {
            (Some(id), Some(key)) => (id, key),
            _ => return Err(SheetsError::MissingConfig("SHEET_ID or GOOGLE_SHEETS_API_KEY")),
        };

        let url = values_url(&self.settings.api_base, id, range, "")?;
        let response = self.http.get(url).query(&[("key", key)]).send().await?;

        let body: ValueRange = parse_response(response, "read").await?;
        Ok(into_rows(body.values))
    }
}

impl RowStore for SheetsClient {
    async fn read(&self, range: &str) -> Result<Rows, SheetsError> {
        let url = self.url(range, "")?;
        let token = self.bearer().await?;

        debug!("Reading {range}");
        let response = self.http.get(url).bearer_auth(token).send().await?;

        let body: ValueRange = parse_response(response, "read").await?;
        Ok(into_rows(body.values))
    }

    async fn append(&self, range: &str, rows: Rows) -> Result<(), SheetsError> {
        let url = self.url(range, ":append")?;
        let token = self.bearer().await?;

        debug!("Appending {} rows to {range}", rows.len());
        let response = self
            .http
            .post(url)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token)
            .json(&WriteBody { values: &rows })
            .send()
            .await?;

        parse_response::<IgnoredAny>(response, "append").await?;
        Ok(())
    }

    async fn update(&self, range: &str, rows: Rows) -> Result<(), SheetsError> {
        let url = self.url(range, "")?;
        let token = self.bearer().await?;

        debug!("Updating {range}");
        let response = self
            .http
            .put(url)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(token)
            .json(&WriteBody { values: &rows })
            .send()
            .await?;

        parse_response::<IgnoredAny>(response, "update").await?;
        Ok(())
    }
}

/// `{base}/v4/spreadsheets/{id}/values/{range}{suffix}` with the range percent-encoded.
pub fn values_url(base: &str, id: &str, range: &str, suffix: &str) -> Result<Url, SheetsError> {
    let mut url = Url::parse(base).map_err(|e| SheetsError::upstream(None, e.to_string()))?;

    url.path_segments_mut()
        .map_err(|_| SheetsError::upstream(None, format!("Invalid API base {base}")))?
        .pop_if_empty()
        .extend(["v4", "spreadsheets", id, "values", &format!("{range}{suffix}")]);

    Ok(url)
}

pub(crate) async fn parse_response<T: DeserializeOwned>(
    response: Response,
    action: &str,
) -> Result<T, SheetsError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = upstream_message(&body)
            .unwrap_or_else(|| format!("Sheets {action} failed ({})", status.as_u16()));

        return Err(SheetsError::upstream(Some(status.as_u16()), message));
    }

    serde_json::from_str(&body).map_err(|e| {
        SheetsError::upstream(Some(status.as_u16()), format!("Malformed {action} response: {e}"))
    })
}

/// Sheets errors look like `{"error": {"message": ..}}`, token errors like
/// `{"error": "invalid_grant", "error_description": ..}`.
fn upstream_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;

    match json.get("error")? {
        Value::Object(error) => error.get("message")?.as_str().map(str::to_string),
        Value::String(error) => Some(
            json.get("error_description")
                .and_then(Value::as_str)
                .unwrap_or(error)
                .to_string(),
        ),
        _ => None,
    }
}

fn into_rows(values: Vec<Vec<Value>>) -> Rows {
    values
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect()
}

fn cell_text(cell: Value) -> String {
    match cell {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
