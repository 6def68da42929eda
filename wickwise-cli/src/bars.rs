//! Bar files: CSV with `timestamp,open,high,low,close,volume` columns.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use wickwise_core::domain::Bar;

#[derive(Debug, Deserialize, Serialize)]
struct CsvBar {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: u64,
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("unrecognised timestamp {raw:?}"))?;
    Ok(naive.and_utc())
}

pub fn read_bars(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let mut bars = Vec::new();
    for (line, row) in reader.deserialize::<CsvBar>().enumerate() {
        let row = row.with_context(|| format!("{}: row {}", path.display(), line + 2))?;
        bars.push(Bar {
            timestamp: parse_timestamp(&row.timestamp)
                .with_context(|| format!("{}: row {}", path.display(), line + 2))?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    if bars.is_empty() {
        bail!("{} contains no bars", path.display());
    }
    Ok(bars)
}

pub fn write_bars(path: &Path, bars: &[Bar]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for bar in bars {
        writer.serialize(CsvBar {
            timestamp: bar.timestamp.to_rfc3339(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        })?;
    }
    writer.flush()?;
    Ok(())
}
