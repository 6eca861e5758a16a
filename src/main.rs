//! Replay node for the market contract.
//!
//! Reads one JSON [`Transaction`] per line from stdin, executes each in order and prints
//! one JSON result per line to stdout. State is loaded from and saved to
//! `MARKET_STATE_FILE` when set; a fresh node is seeded from `MARKET_GENESIS_FILE`.
//! `MARKET_AUDIT=1` writes the audit trail to stderr.

use log::{info, warn};
use peg_market::{
    ActionReport, FilePersistence, Genesis, Market, MarketConfig, PersistedState,
    StderrAuditSink, Transaction,
};
use serde::Serialize;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplayLine<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_id: Option<&'a str>,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a ActionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let _ = env_logger::try_init();
    let config = MarketConfig::from_env();
    let mut market = Market::new(config);
    if std::env::var("MARKET_AUDIT").map(|v| v == "1").unwrap_or(false) {
        market = market.with_audit_sink(Arc::new(StderrAuditSink));
    }

    let persistence = std::env::var("MARKET_STATE_FILE").ok().map(FilePersistence::new);
    let mut state = match &persistence {
        Some(p) => p.load()?,
        None => None,
    }
    .unwrap_or_default();
    if let Ok(path) = std::env::var("MARKET_GENESIS_FILE") {
        if state.apply_genesis(&Genesis::from_file(&path)?)? {
            info!("genesis applied from {}", path);
        }
    }
    if market.install(&mut state.store)? {
        info!("fresh market state");
    }

    let applied = replay_and_save(
        &market,
        &mut state,
        persistence.as_ref(),
        io::stdin().lock(),
        io::stdout().lock(),
    )?;
    info!("replay finished applied={} last_block_timestamp={}", applied, state.last_block_timestamp);
    Ok(())
}

/// Runs the replay, then saves the state whether or not the replay stopped early, so
/// transactions applied before a failure are kept.
fn replay_and_save(
    market: &Market,
    state: &mut PersistedState,
    persistence: Option<&FilePersistence>,
    input: impl BufRead,
    output: impl Write,
) -> Result<usize, Box<dyn Error>> {
    let outcome = run(market, state, input, output);
    if let Some(p) = persistence {
        p.save(state)?;
    }
    outcome
}

/// Executes every transaction line from `input`; returns how many were read.
fn run(
    market: &Market,
    state: &mut PersistedState,
    input: impl BufRead,
    mut output: impl Write,
) -> Result<usize, Box<dyn Error>> {
    let mut count = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tx: Transaction = match serde_json::from_str(&line) {
            Ok(tx) => tx,
            Err(e) => {
                warn!("skipping malformed transaction: {}", e);
                let out = ReplayLine {
                    tx_id: None,
                    ok: false,
                    report: None,
                    kind: Some("malformed"),
                    error: Some(e.to_string()),
                };
                writeln!(output, "{}", serde_json::to_string(&out)?)?;
                continue;
            }
        };
        count += 1;
        let result = market.execute(&mut state.store, &mut state.ledger, &tx);
        state.last_block_timestamp = state.last_block_timestamp.max(tx.block_timestamp);
        let out = match &result {
            Ok(report) => ReplayLine {
                tx_id: Some(tx.id.as_str()),
                ok: true,
                report: Some(report),
                kind: None,
                error: None,
            },
            Err(e) => ReplayLine {
                tx_id: Some(tx.id.as_str()),
                ok: false,
                report: None,
                kind: Some(e.kind()),
                error: Some(e.to_string()),
            },
        };
        writeln!(output, "{}", serde_json::to_string(&out)?)?;
        if let Err(peg_market::MarketError::Store(e)) = result {
            return Err(e.into());
        }
    }
    Ok(count)
}
