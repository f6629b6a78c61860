// Tabular export and import
// History is written as fully quoted CSV; payout input CSV is parsed row by
// row into validated requests, with a diagnostic for every rejected row
//
// Numan Thabit 2025 Nov

use crate::errors::PayoutError;
use crate::history::HistoryEntry;
use crate::networks::NetworkId;
use crate::payout::{AccountId, PayoutRequest};
use chrono::SecondsFormat;
use serde::Serialize;

const EXPORT_HEADER: [&str; 5] = ["Date", "Address", "Amount", "TxHash", "Network"];

pub fn export_filename(account: &AccountId) -> String {
    format!("payoutHistory_{account}.csv")
}

/// One row per entry in the given order; deterministic for the same input.
pub fn to_tabular(history: &[HistoryEntry]) -> Result<Vec<u8>, PayoutError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    let encode_err = |e: csv::Error| PayoutError::StorageFailure(format!("encode csv: {e}"));
    writer.write_record(EXPORT_HEADER).map_err(encode_err)?;
    for entry in history {
        let network = entry
            .network
            .map(|n| n.name().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        writer
            .write_record([
                entry.date.to_rfc3339_opts(SecondsFormat::Secs, true),
                entry.address.clone(),
                entry.amount.to_string(),
                entry.tx_hash.clone().unwrap_or_default(),
                network,
            ])
            .map_err(encode_err)?;
    }
    writer
        .into_inner()
        .map_err(|e| PayoutError::StorageFailure(format!("flush csv: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowDiagnostic {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub requests: Vec<PayoutRequest>,
    pub rejected: Vec<RowDiagnostic>,
}

struct Columns {
    address: usize,
    amount: usize,
    network: Option<usize>,
}

impl Columns {
    const POSITIONAL: Columns = Columns {
        address: 0,
        amount: 1,
        network: Some(2),
    };

    /// Header rows are recognised by an `address` column.
    fn from_header(record: &csv::StringRecord) -> Option<Result<Columns, String>> {
        let find = |names: &[&str]| {
            record
                .iter()
                .position(|field| names.iter().any(|n| field.eq_ignore_ascii_case(n)))
        };
        let address = find(&["address"])?;
        let Some(amount) = find(&["amount"]) else {
            return Some(Err("header has no amount column".to_string()));
        };
        let network = find(&["destinationNetwork", "destination_network", "network", "chain"]);
        Some(Ok(Columns {
            address,
            amount,
            network,
        }))
    }
}

/// Parse payout rows; invalid rows are reported, never fatal.
pub fn from_tabular(bytes: &[u8], default_network: NetworkId) -> ImportReport {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut report = ImportReport::default();
    let mut columns: Option<Columns> = None;

    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map_or(index as u64 + 1, |p| p.line());
                report.rejected.push(RowDiagnostic {
                    line,
                    reason: format!("unreadable row: {err}"),
                });
                continue;
            }
        };
        let line = record.position().map_or(index as u64 + 1, |p| p.line());

        if record.iter().all(str::is_empty) {
            continue;
        }

        if index == 0 {
            match Columns::from_header(&record) {
                Some(Ok(header)) => {
                    columns = Some(header);
                    continue;
                }
                Some(Err(reason)) => {
                    report.rejected.push(RowDiagnostic { line, reason });
                    return report;
                }
                None => {}
            }
        }

        let cols = columns.as_ref().unwrap_or(&Columns::POSITIONAL);
        let field = |i: usize| record.get(i).unwrap_or("");
        let parsed = PayoutRequest::parse(
            field(cols.address),
            field(cols.amount),
            cols.network.map(field),
            default_network,
        );
        match parsed {
            Ok(request) => report.requests.push(request),
            Err(err) => report.rejected.push(RowDiagnostic {
                line,
                reason: err.to_string(),
            }),
        }
    }

    report
}
