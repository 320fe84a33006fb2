use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info};

use crate::models::{PayoutDetail, PayoutReport};

/// Row shape handed to supervisors: identifiers stripped.
#[derive(Serialize)]
struct SupervisorRow<'a> {
    fellow_name: &'a str,
    supervisor_name: &'a str,
    payment_account_name: Option<&'a str>,
    payment_account_number: Option<&'a str>,
    total_amount: i64,
    presession_count: u32,
    session_count: u32,
}

impl<'a> From<&'a PayoutDetail> for SupervisorRow<'a> {
    fn from(detail: &'a PayoutDetail) -> Self {
        Self {
            fellow_name: &detail.fellow_name,
            supervisor_name: &detail.supervisor_name,
            payment_account_name: detail.payment_account_name.as_deref(),
            payment_account_number: detail.payment_account_number.as_deref(),
            total_amount: detail.total_amount,
            presession_count: detail.presession_count,
            session_count: detail.session_count,
        }
    }
}

pub fn write_csv<W: io::Write>(details: &[PayoutDetail], out: W) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    if details.is_empty() {
        writer.write_record(CSV_HEADER)?;
    }
    for detail in details {
        writer.serialize(detail)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_supervisor_csv<W: io::Write>(details: &[PayoutDetail], out: W) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    if details.is_empty() {
        writer.write_record(SUPERVISOR_CSV_HEADER)?;
    }
    for detail in details {
        writer.serialize(SupervisorRow::from(detail))?;
    }
    writer.flush()?;
    Ok(())
}

const CSV_HEADER: [&str; 9] = [
    "fellow_id",
    "fellow_name",
    "supervisor_id",
    "supervisor_name",
    "payment_account_name",
    "payment_account_number",
    "total_amount",
    "presession_count",
    "session_count",
];

const SUPERVISOR_CSV_HEADER: [&str; 7] = [
    "fellow_name",
    "supervisor_name",
    "payment_account_name",
    "payment_account_number",
    "total_amount",
    "presession_count",
    "session_count",
];

/// Splits a run into one report per supervisor id, each with its own totals.
pub fn split_by_supervisor(report: &PayoutReport) -> BTreeMap<String, PayoutReport> {
    let mut groups: BTreeMap<String, Vec<PayoutDetail>> = BTreeMap::new();
    for detail in &report.payout_details {
        groups
            .entry(detail.supervisor_id.clone())
            .or_default()
            .push(detail.clone());
    }

    groups
        .into_iter()
        .map(|(supervisor_id, details)| {
            (
                supervisor_id,
                PayoutReport::from_details(details, report.payout_period),
            )
        })
        .collect()
}

pub fn save_csv(report: &PayoutReport, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(&report.payout_details, file)?;
    info!(
        path = %path.display(),
        rows = report.payout_details.len(),
        "payout csv written"
    );
    Ok(())
}

/// Writes the markdown summary. Status goes to the log so stdout stays free for `--json`.
pub fn save_summary(label: &str, report: &PayoutReport, path: &Path) -> anyhow::Result<()> {
    std::fs::write(path, build_summary(label, report))
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "summary written");
    Ok(())
}

/// Writes one redacted CSV per supervisor into `dir`, returning the paths.
pub fn save_supervisor_csvs(report: &PayoutReport, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    let mut stems = HashSet::new();
    for (supervisor_id, group) in split_by_supervisor(report) {
        let stem = file_stem(&supervisor_id);
        if !stems.insert(stem.clone()) {
            anyhow::bail!("supervisor '{supervisor_id}' maps to an already written file name '{stem}'");
        }
        let path = dir.join(format!("payouts-{stem}.csv"));
        let file = std::fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        write_supervisor_csv(&group.payout_details, file)?;
        debug!(
            supervisor = %supervisor_id,
            fellows = group.payout_details.len(),
            total = group.total_payout_amount,
            "supervisor csv written"
        );
        written.push(path);
    }
    info!(dir = %dir.display(), files = written.len(), "supervisor csvs written");
    Ok(written)
}

/// Filesystem-safe stem. Ids that needed rewriting get their hex bytes appended
/// so two ids never share a file.
fn file_stem(value: &str) -> String {
    let safe: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if safe == value {
        return safe;
    }
    let hex: String = value.bytes().map(|b| format!("{b:02x}")).collect();
    format!("{safe}-{hex}")
}

pub fn build_summary(label: &str, report: &PayoutReport) -> String {
    let mut output = String::new();
    let period = &report.payout_period;

    let _ = writeln!(output, "# Fellow Payout Summary ({label})");
    let _ = writeln!(
        output,
        "Sessions from {} up to {}",
        period.start.to_rfc3339(),
        period.end.to_rfc3339()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Totals");
    let _ = writeln!(output, "- Fellows paid: {}", report.payout_details.len());
    let _ = writeln!(output, "- Total payout: {}", report.total_payout_amount);
    let _ = writeln!(
        output,
        "- Payable now (complete payment details): {}",
        report.total_payout_amount_with_complete_payment_info
    );
    let _ = writeln!(
        output,
        "- Missing payment account name: {}",
        report.incomplete_records.count_missing_payment_account_name
    );
    let _ = writeln!(
        output,
        "- Missing payment account number: {}",
        report.incomplete_records.count_missing_payment_account_number
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Fellows Missing Payment Details");
    let mut missing = report.fellows_missing_payment_info().peekable();
    if missing.peek().is_none() {
        let _ = writeln!(output, "Every fellow has complete payment details.");
    } else {
        for detail in missing {
            let _ = writeln!(
                output,
                "- {} (supervisor {}) owed {}",
                detail.fellow_name, detail.supervisor_name, detail.total_amount
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Supervisor");
    let groups = split_by_supervisor(report);
    if groups.is_empty() {
        let _ = writeln!(output, "No attendance recorded for this period.");
    } else {
        for group in groups.values() {
            let name = group
                .payout_details
                .first()
                .map(|d| d.supervisor_name.as_str())
                .unwrap_or_default();
            let _ = writeln!(
                output,
                "- {}: {} fellows, {} total",
                name,
                group.payout_details.len(),
                group.total_payout_amount
            );
        }
    }

    output
}
