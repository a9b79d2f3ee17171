//! CSV export of the price history for spreadsheets and ad-hoc analysis.

use crate::models::PriceRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Raw tokens plus their canonical values.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    time: &'a str,
    buy: &'a str,
    sell: &'a str,
    buy_value: Option<i64>,
    sell_value: Option<i64>,
}

impl<'a> From<&'a PriceRecord> for CsvRow<'a> {
    fn from(rec: &'a PriceRecord) -> Self {
        Self {
            time: &rec.timestamp_local,
            buy: &rec.buy,
            sell: &rec.sell,
            buy_value: rec.buy_value(),
            sell_value: rec.sell_value(),
        }
    }
}

pub fn write_csv<W: std::io::Write>(records: &[PriceRecord], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for rec in records {
        writer.serialize(CsvRow::from(rec))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_csv(records: &[PriceRecord], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Could not create {:?}", path))?;
    write_csv(records, file)?;
    info!("{} records written to {:?}", records.len(), path);
    Ok(())
}
