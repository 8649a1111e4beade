use std::time::Duration;

use clap::Parser;
use sheets::{A1Range, RowStore, ServiceAccount, SheetLayout, SheetsClient, SheetsSettings};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "SHEET_ID")]
    sheet_id: String,

    #[arg(long, env = "SHEET_RANGE", default_value = "GIEO QUẺ!A:E")]
    range: String,

    #[arg(long, env = "SHEET_HEADER_ROWS", default_value_t = 1)]
    header_rows: usize,

    #[arg(long, env = "GOOGLE_SERVICE_ACCOUNT_EMAIL")]
    email: String,

    #[arg(long, env = "GOOGLE_SERVICE_ACCOUNT_KEY", hide_env_values = true)]
    key: String,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let layout = SheetLayout::new(A1Range::parse(&args.range)?, args.header_rows);
    let client = SheetsClient::new(SheetsSettings {
        spreadsheet_id: Some(args.sheet_id),
        service_account: Some(ServiceAccount::new(&args.email, &args.key)),
        timeout: Duration::from_secs(args.timeout_secs),
        ..SheetsSettings::default()
    })?;

    println!("Reading {}\n", layout.range);
    let rows = client.read(&layout.range.to_string()).await?;

    print!("{}", audit::summarize(&layout.entries(&rows)));

    Ok(())
}
