//! `crowwatch decode`: classify a single log offline.

use alloy_primitives::B256;
use anyhow::{Context, Result};
use crowwatch_core::{Classified, LogEntry, MonitorConfig, TransferFormatter};

/// What `decode` prints for a log that is not a Transfer event.
pub const IGNORED: &str = "not a Transfer event, ignored";

pub fn run(config: &MonitorConfig, topics: &[String], data: &str) -> Result<()> {
    println!("{}", describe(config, topics, data)?);
    Ok(())
}

/// The output line for `topics` + `data` as if `config.contract` emitted it.
pub fn describe(config: &MonitorConfig, topics: &[String], data: &str) -> Result<String> {
    let log = build_log(config, topics, data)?;
    match TransferFormatter::new(config).classify_and_format(&log) {
        Classified::Event { line, .. } => Ok(line),
        Classified::Ignored => Ok(IGNORED.to_string()),
        Classified::Malformed(e) => Err(anyhow::Error::new(e).context("malformed Transfer log")),
    }
}

fn build_log(config: &MonitorConfig, topics: &[String], data: &str) -> Result<LogEntry> {
    let topics = topics
        .iter()
        .map(|t| t.parse::<B256>().with_context(|| format!("invalid topic `{t}`")))
        .collect::<Result<Vec<_>>>()?;
    let data = hex::decode(data.strip_prefix("0x").unwrap_or(data)).context("invalid data hex")?;
    Ok(LogEntry {
        address: config.contract,
        topics,
        data,
        ..LogEntry::default()
    })
}
