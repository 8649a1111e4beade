//! # Campaign Flow
//!
//! register → redeem → spend, each step re-reading the sheet.
//!
//! ## Registration
//! - One row per phone, a phone with a spin left gets its old code back
//! - The sheet being down is not the customer's problem: the code is issued anyway and the row
//!   is kept pending in the fallback cache until it can be appended
//!
//! ## Redeem
//! - Read only, never consumes the spin
//! - Answered from the fallback cache when the sheet cannot be read
//!
//! ## Spend
//! - The only commit: spin count to 0 and the voucher value, one targeted update
//! - Read, check and write happen under one lock so a code cannot be spent twice by this
//!   process. The sheet itself has no conditional writes, so separate processes sharing a
//!   sheet can still race
//! - The amount is either drawn here or checked against the prize table
use chrono::Utc;
use rand::Rng;
use sheets::{Located, RowStore, SheetLayout, SheetsError, VoucherEntry};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    cache::FallbackCache,
    draw::{Prize, PrizeTable},
    error::{AppError, INVALID_PHONE, MISSING_CODE, MISSING_NAME},
    utils::{generate_code, normalize_phone},
};

const CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub code: String,
    pub reused: bool,
}

#[derive(Debug, Default)]
pub struct SpendRequest {
    pub code: String,
    /// Drawn from the prize table when missing.
    pub amount: Option<u64>,
    pub message: Option<String>,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spend {
    pub code: String,
    pub amount: u64,
    pub message: String,
}

pub struct Campaign<S> {
    store: S,
    layout: SheetLayout,
    range: String,
    cache: FallbackCache,
    prizes: PrizeTable,
    record_audit: bool,
    write_lock: Mutex<()>,
    replay_lock: Mutex<()>,
}

impl<S: RowStore> Campaign<S> {
    pub fn new(
        store: S,
        layout: SheetLayout,
        prizes: PrizeTable,
        cache_capacity: usize,
        record_audit: bool,
    ) -> Self {
        Self {
            store,
            range: layout.range.to_string(),
            layout,
            cache: FallbackCache::new(cache_capacity),
            prizes,
            record_audit,
            write_lock: Mutex::new(()),
            replay_lock: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &FallbackCache {
        &self.cache
    }

    pub fn prizes(&self) -> &PrizeTable {
        &self.prizes
    }

    pub async fn register(&self, name: &str, phone: &str) -> Result<Registration, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation(MISSING_NAME));
        }
        let phone = normalize_phone(phone).ok_or(AppError::Validation(INVALID_PHONE))?;

        let _guard = self.write_lock.lock().await;

        let entries = match self.load().await {
            Ok(entries) => Some(entries),
            Err(e) if e.is_config() => {
                error!("Sheets not configured, registering {phone} from the fallback cache: {e}");
                None
            }
            Err(e) => {
                warn!("Sheet read failed, registering {phone} from the fallback cache: {e}");
                None
            }
        };

        let existing = match entries.as_deref() {
            Some(entries) => self
                .layout
                .find_phone(entries, &phone)
                .map(|located| located.entry.clone())
                .or_else(|| {
                    self.cache
                        .by_phone(&phone)
                        .filter(|cached| cached.pending)
                        .map(|cached| cached.entry)
                }),
            None => self.cache.by_phone(&phone).map(|cached| cached.entry),
        };

        if let Some(existing) = existing {
            if !existing.has_spins() {
                return Err(AppError::PhoneExhausted);
            }

            info!("Phone {phone} already holds code {}", existing.code);
            return Ok(Registration {
                code: existing.code,
                reused: true,
            });
        }

        let code = self
            .unique_code(entries.as_deref(), &mut rand::thread_rng())
            .ok_or(AppError::CodeUnavailable)?;
        let entry = VoucherEntry::issue(name, &phone, &code);

        match self.store.append(&self.range, vec![entry.to_row()]).await {
            Ok(()) => {
                info!("Registered {phone} with code {code}");
                self.cache.store(entry);
            }
            Err(e) => {
                warn!("Failed to append registration for {phone}, keeping it pending: {e}");
                self.cache.store_pending(entry);
            }
        }

        Ok(Registration {
            code,
            reused: false,
        })
    }

    pub async fn redeem(&self, code: &str) -> Result<String, AppError> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(AppError::Validation(MISSING_CODE));
        }

        let entry = match self.load().await {
            Ok(entries) => self
                .layout
                .find_code(&entries, &code)
                .map(|located| located.entry.clone())
                .or_else(|| {
                    self.cache
                        .by_code(&code)
                        .filter(|cached| cached.pending)
                        .map(|cached| cached.entry)
                }),
            Err(e) => match self.cache.by_code(&code) {
                Some(cached) => {
                    warn!("Sheet read failed, redeeming {code} from the fallback cache: {e}");
                    Some(cached.entry)
                }
                None => return Err(e.into()),
            },
        };

        match entry {
            None => Err(AppError::InvalidCode),
            Some(entry) if !entry.has_spins() => Err(AppError::NoSpinsLeft),
            Some(_) => Ok(code),
        }
    }

    pub async fn spend(&self, request: SpendRequest) -> Result<Spend, AppError> {
        let code = request.code.trim().to_uppercase();
        if code.is_empty() {
            return Err(AppError::Validation(MISSING_CODE));
        }

        let prize = match request.amount {
            Some(amount) => self.prizes.get(amount).ok_or(AppError::InvalidAmount)?,
            None => self.draw(),
        };
        let amount = prize.amount;
        let message = request
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| prize.message.clone());

        let _guard = self.write_lock.lock().await;

        let mut entries = self.load().await?;
        if self.layout.find_code(&entries, &code).is_none()
            && self.cache.by_code(&code).is_some_and(|cached| cached.pending)
        {
            // another request is replaying this registration, wait for it and read again
            drop(self.replay_lock.lock().await);
            entries = self.load().await?;
        }

        let located = self
            .layout
            .find_code(&entries, &code)
            .ok_or(AppError::InvalidCode)?;

        if !located.entry.has_spins() {
            return Err(AppError::NoSpinsLeft);
        }

        let mut cells = vec!["0".to_string(), amount.to_string()];
        if self.record_audit {
            cells.push(message.clone());
            cells.push(Utc::now().to_rfc3339());
        }

        let range = self.layout.spend_range(located.row, self.record_audit);
        self.store.update(&range.to_string(), vec![cells]).await?;
        self.cache.mark_spent(&code, &amount.to_string());

        info!(
            code = %code,
            amount,
            row = located.row,
            name = %request.name,
            phone = %request.phone,
            "Voucher recorded"
        );

        Ok(Spend {
            code,
            amount,
            message,
        })
    }

    /// Reads the sheet, refreshes the cache and replays pending registrations.
    async fn load(&self) -> Result<Vec<Located>, SheetsError> {
        let entries = self.read_entries().await?;

        if self.replay_pending(&entries).await {
            return self.read_entries().await;
        }

        Ok(entries)
    }

    async fn read_entries(&self) -> Result<Vec<Located>, SheetsError> {
        let rows = self.store.read(&self.range).await?;
        let entries = self.layout.entries(&rows);
        self.cache.refresh(&entries);
        debug!(rows = entries.len(), cached = self.cache.len(), "Sheet read");

        Ok(entries)
    }

    async fn replay_pending(&self, entries: &[Located]) -> bool {
        // someone else is already replaying
        let Ok(_guard) = self.replay_lock.try_lock() else {
            return false;
        };

        let pending: Vec<VoucherEntry> = self
            .cache
            .pending()
            .into_iter()
            .filter(|entry| self.layout.find_phone(entries, &entry.phone).is_none())
            .collect();

        if pending.is_empty() {
            return false;
        }

        let rows = pending.iter().map(VoucherEntry::to_row).collect();
        match self.store.append(&self.range, rows).await {
            Ok(()) => {
                info!("Replayed {} pending registrations", pending.len());
                for entry in pending {
                    self.cache.store(entry);
                }
                true
            }
            Err(e) => {
                warn!("Still unable to replay {} pending registrations: {e}", pending.len());
                false
            }
        }
    }

    fn draw(&self) -> &Prize {
        self.prizes.pick(&mut rand::thread_rng())
    }

    /// Fresh code unused in the sheet and the cache, `None` once every attempt collided.
    fn unique_code<R: Rng + ?Sized>(
        &self,
        entries: Option<&[Located]>,
        rng: &mut R,
    ) -> Option<String> {
        (0..CODE_ATTEMPTS).map(|_| generate_code(&mut *rng)).find(|code| {
            let in_sheet =
                entries.is_some_and(|entries| self.layout.find_code(entries, code).is_some());

            !in_sheet && self.cache.by_code(code).is_none()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use rand::{SeedableRng, rngs::StdRng};
    use sheets::{A1Range, MemoryStore, Rows};

    use super::*;

    /// Holds back one read response after taking its snapshot, like a slow round trip.
    struct SlowRead {
        inner: Arc<MemoryStore>,
        slow_once: AtomicBool,
    }

    impl RowStore for SlowRead {
        async fn read(&self, range: &str) -> Result<Rows, SheetsError> {
            let slow = self.slow_once.swap(false, Ordering::SeqCst);
            let rows = self.inner.read(range).await;

            if slow {
                for _ in 0..50 {
                    tokio::task::yield_now().await;
                }
            }
            rows
        }

        async fn append(&self, range: &str, rows: Rows) -> Result<(), SheetsError> {
            self.inner.append(range, rows).await
        }

        async fn update(&self, range: &str, rows: Rows) -> Result<(), SheetsError> {
            self.inner.update(range, rows).await
        }
    }

    fn header() -> Vec<String> {
        ["Name", "Phone", "Code", "Spins", "Voucher"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn campaign(store: Arc<MemoryStore>) -> Campaign<Arc<MemoryStore>> {
        let layout = SheetLayout::new(A1Range::parse("GIEO QUẺ!A:E").unwrap(), 1);

        Campaign::new(store, layout, PrizeTable::default(), 100, false)
    }

    fn fresh() -> (Arc<MemoryStore>, Campaign<Arc<MemoryStore>>) {
        let store = Arc::new(MemoryStore::with_rows(vec![header()]));
        (store.clone(), campaign(store))
    }

    fn log(code: &str, amount: u64) -> SpendRequest {
        SpendRequest {
            code: code.to_string(),
            amount: Some(amount),
            ..SpendRequest::default()
        }
    }

    #[tokio::test]
    async fn test_register_appends_row() {
        let (store, campaign) = fresh();

        let registration = campaign.register(" An ", "090 123 4567").await.unwrap();
        assert!(!registration.reused);
        assert_eq!(registration.code.len(), 6);

        let rows = store.snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "An");
        assert_eq!(rows[1][1], "'0901234567");
        assert_eq!(rows[1][2], registration.code);
        assert_eq!(rows[1][3], "1");
    }

    #[tokio::test]
    async fn test_register_twice_reuses_code() {
        let (store, campaign) = fresh();

        let first = campaign.register("An", "0901234567").await.unwrap();
        let second = campaign.register("An", "0901-234-567").await.unwrap();

        assert_eq!(first.code, second.code);
        assert!(second.reused);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (store, campaign) = fresh();

        assert!(matches!(
            campaign.register("  ", "0901234567").await,
            Err(AppError::Validation(MISSING_NAME))
        ));
        assert!(matches!(
            campaign.register("An", "12345").await,
            Err(AppError::Validation(INVALID_PHONE))
        ));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_register_exhausted_phone() {
        let (_, campaign) = fresh();

        let registration = campaign.register("An", "0901234567").await.unwrap();
        campaign.spend(log(&registration.code, 100_000)).await.unwrap();

        assert!(matches!(
            campaign.register("An", "0901234567").await,
            Err(AppError::PhoneExhausted)
        ));
    }

    #[tokio::test]
    async fn test_redeem_unknown_and_empty() {
        let (_, campaign) = fresh();

        assert!(matches!(campaign.redeem("ZZZZZZ").await, Err(AppError::InvalidCode)));
        assert!(matches!(
            campaign.redeem("   ").await,
            Err(AppError::Validation(MISSING_CODE))
        ));
    }

    #[tokio::test]
    async fn test_redeem_does_not_consume() {
        let (store, campaign) = fresh();
        let registration = campaign.register("An", "0901234567").await.unwrap();

        let lower = registration.code.to_lowercase();
        assert_eq!(campaign.redeem(&lower).await.unwrap(), registration.code);
        assert_eq!(campaign.redeem(&registration.code).await.unwrap(), registration.code);
        assert_eq!(store.snapshot()[1][3], "1");
    }

    #[tokio::test]
    async fn test_redeem_spent_row() {
        let store = Arc::new(MemoryStore::with_rows(vec![
            header(),
            ["Binh", "'0907654321", "SPENT1", "0", "200000"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ]));
        let campaign = campaign(store);

        assert!(matches!(campaign.redeem("spent1").await, Err(AppError::NoSpinsLeft)));
    }

    #[tokio::test]
    async fn test_spend_updates_row_once() {
        let (store, campaign) = fresh();
        let registration = campaign.register("An", "0901234567").await.unwrap();

        let spend = campaign.spend(log(&registration.code, 100_000)).await.unwrap();
        assert_eq!(spend.amount, 100_000);
        assert!(!spend.message.is_empty());

        let rows = store.snapshot();
        assert_eq!(rows[1][3], "0");
        assert_eq!(rows[1][4], "100000");

        assert!(matches!(
            campaign.spend(log(&registration.code, 100_000)).await,
            Err(AppError::NoSpinsLeft)
        ));
    }

    #[tokio::test]
    async fn test_spend_rejects_unknown_amount() {
        let (store, campaign) = fresh();
        let registration = campaign.register("An", "0901234567").await.unwrap();

        assert!(matches!(
            campaign.spend(log(&registration.code, 999_999)).await,
            Err(AppError::InvalidAmount)
        ));
        assert_eq!(store.snapshot()[1][3], "1");
    }

    #[tokio::test]
    async fn test_spend_unknown_code() {
        let (_, campaign) = fresh();

        assert!(matches!(
            campaign.spend(log("ZZZZZZ", 100_000)).await,
            Err(AppError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn test_server_side_draw() {
        let (store, campaign) = fresh();
        let registration = campaign.register("An", "0901234567").await.unwrap();

        let spend = campaign
            .spend(SpendRequest {
                code: registration.code,
                ..SpendRequest::default()
            })
            .await
            .unwrap();

        assert!(campaign.prizes().get(spend.amount).is_some());
        assert_eq!(store.snapshot()[1][4], spend.amount.to_string());
    }

    #[tokio::test]
    async fn test_concurrent_spend_only_once() {
        let (store, campaign) = fresh();
        let registration = campaign.register("An", "0901234567").await.unwrap();
        let writes = store.writes();

        let (first, second) = tokio::join!(
            campaign.spend(log(&registration.code, 100_000)),
            campaign.spend(log(&registration.code, 200_000)),
        );

        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
        assert!(matches!(first.err().or(second.err()), Some(AppError::NoSpinsLeft)));
        assert_eq!(store.writes(), writes + 1);
    }

    #[tokio::test]
    async fn test_audit_columns() {
        let store = Arc::new(MemoryStore::with_rows(vec![header()]));
        let layout = SheetLayout::new(A1Range::parse("GIEO QUẺ!A:E").unwrap(), 1);
        let campaign = Campaign::new(store.clone(), layout, PrizeTable::default(), 100, true);

        let registration = campaign.register("An", "0901234567").await.unwrap();
        campaign
            .spend(SpendRequest {
                message: Some("Chúc mừng".to_string()),
                ..log(&registration.code, 200_000)
            })
            .await
            .unwrap();

        let row = &store.snapshot()[1];
        assert_eq!(row[4], "200000");
        assert_eq!(row[5], "Chúc mừng");
        assert!(chrono::DateTime::parse_from_rfc3339(&row[6]).is_ok());
    }

    #[tokio::test]
    async fn test_offline_registration_then_replay() {
        let (store, campaign) = fresh();
        store.set_offline(true);

        let registration = campaign.register("An", "0901234567").await.unwrap();
        assert!(!registration.reused);
        assert_eq!(campaign.cache().pending().len(), 1);

        // same phone while still offline gets the pending code back
        let again = campaign.register("An", "0901234567").await.unwrap();
        assert_eq!(again.code, registration.code);
        assert!(again.reused);

        assert_eq!(campaign.redeem(&registration.code).await.unwrap(), registration.code);
        assert!(campaign.spend(log(&registration.code, 100_000)).await.is_err());

        store.set_offline(false);
        assert_eq!(campaign.redeem(&registration.code).await.unwrap(), registration.code);
        assert!(campaign.cache().pending().is_empty());

        let rows = store.snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][2], registration.code);

        campaign.spend(log(&registration.code, 100_000)).await.unwrap();
        assert_eq!(store.snapshot()[1][3], "0");
    }

    #[tokio::test]
    async fn test_offline_redeem_unknown_is_upstream_error() {
        let (store, campaign) = fresh();
        store.set_offline(true);

        assert!(matches!(campaign.redeem("ZZZZZZ").await, Err(AppError::Sheets(_))));
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let (_, campaign) = fresh();

        let code = campaign.register("An", "0901234567").await.unwrap().code;
        assert_eq!(campaign.redeem(&code).await.unwrap(), code);

        campaign.spend(log(&code, 100_000)).await.unwrap();
        assert!(matches!(campaign.redeem(&code).await, Err(AppError::NoSpinsLeft)));
    }

    #[tokio::test]
    async fn test_stale_read_does_not_revive_spent_code() {
        let inner = Arc::new(MemoryStore::with_rows(vec![header()]));
        let store = SlowRead {
            inner: inner.clone(),
            slow_once: AtomicBool::new(false),
        };
        let layout = SheetLayout::new(A1Range::parse("GIEO QUẺ!A:E").unwrap(), 1);
        let campaign = Campaign::new(store, layout, PrizeTable::default(), 100, false);

        let code = campaign.register("An", "0901234567").await.unwrap().code;

        campaign.store.slow_once.store(true, Ordering::SeqCst);
        let (_, spend) = tokio::join!(campaign.redeem(&code), campaign.spend(log(&code, 100_000)));
        spend.unwrap();
        assert_eq!(inner.snapshot()[1][3], "0");

        inner.set_offline(true);
        assert!(matches!(campaign.redeem(&code).await, Err(AppError::NoSpinsLeft)));
    }

    #[test]
    fn test_unique_code_checks_every_attempt() {
        let (_, campaign) = fresh();
        let seed = 9;

        let mut rng = StdRng::seed_from_u64(seed);
        let codes: Vec<String> = (0..CODE_ATTEMPTS).map(|_| generate_code(&mut rng)).collect();
        let last = codes[CODE_ATTEMPTS - 1].clone();

        for (i, code) in codes[..CODE_ATTEMPTS - 1].iter().enumerate() {
            let phone = format!("09000000{i:02}");
            campaign.cache().store(VoucherEntry::issue("An", &phone, code));
        }

        let code = campaign.unique_code(None, &mut StdRng::seed_from_u64(seed));
        assert_eq!(code, Some(last.clone()));

        let sheet = vec![Located {
            row: 2,
            entry: VoucherEntry::issue("Binh", "0900000099", &last),
        }];
        assert_eq!(
            campaign.unique_code(Some(&sheet), &mut StdRng::seed_from_u64(seed)),
            None
        );
    }

    #[tokio::test]
    async fn test_spend_waits_for_replay_in_progress() {
        let (store, campaign) = fresh();
        store.set_offline(true);
        let registration = campaign.register("An", "0901234567").await.unwrap();
        store.set_offline(false);

        let replaying = campaign.replay_lock.lock().await;
        let (spend, ()) = tokio::join!(
            campaign.spend(log(&registration.code, 100_000)),
            async move {
                for _ in 0..10 {
                    tokio::task::yield_now().await;
                }
                drop(replaying);
            }
        );

        assert_eq!(spend.unwrap().amount, 100_000);

        let rows = store.snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][2], registration.code);
        assert_eq!(rows[1][3], "0");
    }
}
