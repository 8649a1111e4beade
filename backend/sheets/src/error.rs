use thiserror::Error;

#[derive(Error, Debug)]
pub enum SheetsError {
    #[error("Missing {0} env")]
    MissingConfig(&'static str),

    #[error("Invalid service account key: {0}")]
    Credentials(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("{message}")]
    Upstream { status: Option<u16>, message: String },
}

impl SheetsError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        SheetsError::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Configuration problems are ours to fix, everything else came back from Google.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            SheetsError::MissingConfig(_) | SheetsError::Credentials(_)
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SheetsError::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SheetsError {
    fn from(e: reqwest::Error) -> Self {
        SheetsError::upstream(e.status().map(|s| s.as_u16()), e.to_string())
    }
}
