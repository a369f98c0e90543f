//! Measurement records and the RFA payload parser
//!
//! The analyzer emits line-oriented text payloads. Header lines carry
//! metadata (`%Probe:`, `%Bemerkung:`, `%Datum:`), semicolon-delimited lines
//! carry one metal value each, and everything else is ignored. One payload
//! (one TCP read chunk or one file's content) yields at most one record.
//!
//! Parsing is additive and tolerant: a bad date or a bad number degrades the
//! affected field and emits a warning, it never aborts the record. Only the
//! completeness check at the end can reject a payload.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Prefix of the probe-number header line.
const PROBE_PREFIX: &str = "%Probe:";
/// Prefix of the free-text comment header line.
const COMMENT_PREFIX: &str = "%Bemerkung:";
/// Prefix of the measurement-date header line.
const DATE_PREFIX: &str = "%Datum:";
/// Fixed date format used by the analyzer (`31.12.2026`).
const DATE_FORMAT: &str = "%d.%m.%Y";
/// Field separator in metal-value lines.
const FIELD_SEPARATOR: char = ';';

/// The five metals reported by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metal {
    Au,
    Ag,
    Pt,
    Pd,
    Rh,
}

impl Metal {
    /// All metals, in column order of the target table.
    pub const ALL: [Metal; 5] = [Metal::Au, Metal::Ag, Metal::Pt, Metal::Pd, Metal::Rh];

    /// The symbol as it appears in payload lines.
    pub fn symbol(&self) -> &'static str {
        match self {
            Metal::Au => "Au",
            Metal::Ag => "Ag",
            Metal::Pt => "Pt",
            Metal::Pd => "Pd",
            Metal::Rh => "Rh",
        }
    }
}

impl FromStr for Metal {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Au" => Ok(Metal::Au),
            "Ag" => Ok(Metal::Ag),
            "Pt" => Ok(Metal::Pt),
            "Pd" => Ok(Metal::Pd),
            "Rh" => Ok(Metal::Rh),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Metal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Order classification derived from the probe-number prefix.
///
/// Selects the target database: `B-`/`B ` orders go to the Scheidgut
/// database, `G-`/`G ` orders to the Gekraetz database, everything else to
/// the shared third database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Probe number prefixed `B-` or `B ` (prefix stripped from the order).
    Scheidgut,
    /// Probe number prefixed `G-` or `G ` (prefix stripped from the order).
    Gekraetz,
    /// Any other probe number, taken verbatim as the order number.
    Other,
}

/// Measured values for all five metals, zero by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetalValues {
    pub au: Decimal,
    pub ag: Decimal,
    pub pt: Decimal,
    pub pd: Decimal,
    pub rh: Decimal,
}

impl MetalValues {
    pub fn get(&self, metal: Metal) -> Decimal {
        match metal {
            Metal::Au => self.au,
            Metal::Ag => self.ag,
            Metal::Pt => self.pt,
            Metal::Pd => self.pd,
            Metal::Rh => self.rh,
        }
    }

    pub fn set(&mut self, metal: Metal, value: Decimal) {
        match metal {
            Metal::Au => self.au = value,
            Metal::Ag => self.ag = value,
            Metal::Pt => self.pt = value,
            Metal::Pd => self.pd = value,
            Metal::Rh => self.rh = value,
        }
    }

    /// True when no metal carries a non-zero measurement.
    pub fn is_all_zero(&self) -> bool {
        Metal::ALL.iter().all(|m| self.get(*m).is_zero())
    }
}

/// One parsed measurement, the unit of work of the whole connector.
///
/// Lives only for the duration of one payload: constructed, validated,
/// persisted or dropped. Never cached across payloads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeasurementRecord {
    /// Key of the target row; probe number with the classification prefix
    /// stripped.
    pub order_no: String,
    /// Derived from the probe-number prefix; `None` until a `%Probe:` header
    /// has been seen.
    pub classification: Option<Classification>,
    /// Free-text comment, may be empty.
    pub comment: String,
    /// Measurement date from the `%Datum:` header.
    pub measure_date: Option<NaiveDate>,
    /// The five metal values.
    pub metals: MetalValues,
}

impl MeasurementRecord {
    /// Check the completeness invariant; complete records are eligible for
    /// persistence, incomplete ones are discarded.
    pub fn completeness(&self) -> Result<(), Incomplete> {
        if self.order_no.trim().is_empty() {
            return Err(Incomplete::MissingOrderNo);
        }
        if self.measure_date.is_none() {
            return Err(Incomplete::MissingMeasureDate);
        }
        if self.metals.is_all_zero() {
            return Err(Incomplete::AllMetalsZero);
        }
        Ok(())
    }
}

/// Why a payload did not yield a persistable record.
///
/// These are expected outcomes (partial chunks, status chatter from the
/// analyzer), logged and dropped without retry.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incomplete {
    #[error("missing probe number")]
    MissingOrderNo,

    #[error("missing measurement date")]
    MissingMeasureDate,

    #[error("no non-zero metal values")]
    AllMetalsZero,
}

/// Parse one payload into a measurement record.
///
/// Lines are split on any CR/LF boundary and classified by prefix; later
/// headers of the same kind overwrite earlier ones. Returns `Err` when the
/// accumulated record fails the completeness invariant.
pub fn parse_payload(payload: &str) -> Result<MeasurementRecord, Incomplete> {
    let mut record = MeasurementRecord::default();

    for line in payload.split(['\r', '\n']).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix(PROBE_PREFIX) {
            apply_probe(&mut record, rest.trim());
        } else if let Some(rest) = line.strip_prefix(COMMENT_PREFIX) {
            record.comment = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix(DATE_PREFIX) {
            apply_date(&mut record, rest.trim());
        } else if line.contains(FIELD_SEPARATOR) {
            apply_metal_line(&mut record, line);
        }
        // Anything else is analyzer chatter; skip it.
    }

    record.completeness()?;
    Ok(record)
}

/// Classify the probe number and strip the routing prefix from the order.
fn apply_probe(record: &mut MeasurementRecord, probe: &str) {
    debug!(probe, "Probe number");

    if probe.starts_with("B-") || probe.starts_with("B ") {
        record.classification = Some(Classification::Scheidgut);
        record.order_no = probe[2..].to_string();
    } else if probe.starts_with("G-") || probe.starts_with("G ") {
        record.classification = Some(Classification::Gekraetz);
        record.order_no = probe[2..].to_string();
    } else {
        record.classification = Some(Classification::Other);
        record.order_no = probe.to_string();
    }
}

/// Parse the measurement date; an unparsable date leaves the field unset.
fn apply_date(record: &mut MeasurementRecord, date_str: &str) {
    match NaiveDate::parse_from_str(date_str, DATE_FORMAT) {
        Ok(date) => record.measure_date = Some(date),
        Err(_) => {
            warn!(date = date_str, "Failed to parse measure date");
        },
    }
}

/// Apply one `Symbol;<ignored>;Value` line. Unknown symbols and short lines
/// are ignored; a bad value defaults that single metal to zero.
fn apply_metal_line(record: &mut MeasurementRecord, line: &str) {
    let parts: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if parts.len() < 3 {
        return;
    }

    let Ok(metal) = parts[0].trim().parse::<Metal>() else {
        return;
    };

    let raw = parts[2].trim();
    match parse_german_decimal(raw) {
        Some(value) => record.metals.set(metal, value),
        None => {
            warn!(metal = %metal, value = raw, "Failed to parse metal value, defaulting to 0");
            record.metals.set(metal, Decimal::ZERO);
        },
    }
}

/// Parse a decimal in the analyzer's German convention: `,` is the decimal
/// point, `.` separates thousands. `-` and blank are placeholders for zero.
fn parse_german_decimal(raw: &str) -> Option<Decimal> {
    if raw.is_empty() || raw == "-" {
        return Some(Decimal::ZERO);
    }

    let normalized: String = raw
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    Decimal::from_str(&normalized).ok()
}
