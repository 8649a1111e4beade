use std::sync::Arc;

use sheets::{RowStore, SheetLayout, SheetsClient};

use super::{campaign::Campaign, config::Config};

pub struct State<S> {
    pub config: Config,
    pub campaign: Campaign<S>,
    pub sheets: Arc<SheetsClient>,
}

impl State<Arc<SheetsClient>> {
    /// The live sheet backs both the campaign and the public read endpoint.
    pub fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let sheets = Arc::new(SheetsClient::new(config.sheets.clone())?);

        Ok(Self::with_store(config, sheets.clone(), sheets))
    }
}

impl<S: RowStore> State<S> {
    pub fn with_store(config: Config, store: S, sheets: Arc<SheetsClient>) -> Arc<Self> {
        let layout = SheetLayout::new(config.sheet_range.clone(), config.header_rows);
        let campaign = Campaign::new(
            store,
            layout,
            config.prizes.clone(),
            config.cache_capacity,
            config.record_audit,
        );

        Arc::new(Self {
            config,
            campaign,
            sheets,
        })
    }
}
