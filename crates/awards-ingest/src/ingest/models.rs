//! Data models for parsed award records and pipeline outcomes

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::FieldWarning;

/// Investigator as listed on one award; `role` belongs to the award link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investigator {
    pub name: String,
    pub role: String,
}

/// Sponsoring institution, keyed by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sponsor {
    pub name: String,
    pub address: String,
    pub phone: String,
}

/// Code/name pair used by NSF programs and field applications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedEntry {
    pub code: String,
    pub name: String,
}

/// One award file, as extracted from text.
///
/// Every scalar is independently optional: `None` means the label was not
/// found or its value did not parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub title: Option<String>,
    pub award_type: Option<String>,
    pub nsf_org: Option<String>,
    pub latest_amendment_date: Option<NaiveDate>,
    pub file_ref: Option<String>,
    pub award_number: Option<String>,
    pub award_instrument: Option<String>,
    pub program_manager: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub expected_total_amount: Option<BigDecimal>,
    pub abstract_text: Option<String>,
    pub investigators: Vec<Investigator>,
    pub sponsor: Option<Sponsor>,
    pub programs: Vec<CodedEntry>,
    pub field_applications: Vec<CodedEntry>,
    pub program_refs: Vec<String>,
}

impl ParsedRecord {
    /// True when no field at all was recognised
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.award_type.is_none()
            && self.nsf_org.is_none()
            && self.latest_amendment_date.is_none()
            && self.file_ref.is_none()
            && self.award_number.is_none()
            && self.award_instrument.is_none()
            && self.program_manager.is_none()
            && self.start_date.is_none()
            && self.expiration_date.is_none()
            && self.expected_total_amount.is_none()
            && self.abstract_text.is_none()
            && self.investigators.is_empty()
            && self.sponsor.is_none()
            && self.programs.is_empty()
            && self.field_applications.is_empty()
            && self.program_refs.is_empty()
    }

    /// Names of the scalar award columns that are null
    pub fn null_scalar_fields(&self) -> Vec<&'static str> {
        let checks = [
            ("title", self.title.is_none()),
            ("type", self.award_type.is_none()),
            ("nsf_org", self.nsf_org.is_none()),
            ("latest_amendment_date", self.latest_amendment_date.is_none()),
            ("file", self.file_ref.is_none()),
            ("award_number", self.award_number.is_none()),
            ("award_instr", self.award_instrument.is_none()),
            ("prgm_manager", self.program_manager.is_none()),
            ("start_date", self.start_date.is_none()),
            ("expires", self.expiration_date.is_none()),
            ("expected_total_amt", self.expected_total_amount.is_none()),
            ("abstract", self.abstract_text.is_none()),
        ];
        checks
            .into_iter()
            .filter_map(|(name, missing)| missing.then_some(name))
            .collect()
    }

    /// The award number, when it carries a usable key
    pub fn award_key(&self) -> Option<&str> {
        self.award_number
            .as_deref()
            .map(str::trim)
            .filter(|number| !number.is_empty())
    }
}

/// Parser output: the record plus the field-level warnings raised for it
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub record: ParsedRecord,
    pub warnings: Vec<FieldWarning>,
}

/// Counters for one successful store write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub awards: usize,
    pub investigators: usize,
    pub sponsors: usize,
    pub programs: usize,
    pub field_applications: usize,
    pub links: usize,
    pub program_refs: usize,
}

impl WriteStats {
    pub fn add(&mut self, other: &WriteStats) {
        self.awards += other.awards;
        self.investigators += other.investigators;
        self.sponsors += other.sponsors;
        self.programs += other.programs;
        self.field_applications += other.field_applications;
        self.links += other.links;
        self.program_refs += other.program_refs;
    }
}

/// Result of handing one batch to the upsert engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Records whose award row was committed
    pub committed: usize,
    /// Records rolled back in the per-record fallback
    pub failed: usize,
    /// Award numbers of the failed records
    pub failed_awards: Vec<String>,
    /// Whether the batch transaction failed and the fallback ran
    pub used_fallback: bool,
    pub stats: WriteStats,
}

/// Per-batch report produced by a worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_index: usize,
    pub keys: usize,
    /// Files filtered out by suffix, undecodable, empty, or lacking an award number
    pub skipped: usize,
    /// Files that could not be fetched
    pub fetch_failures: usize,
    /// Records handed to the upsert engine
    pub parsed: usize,
    pub upsert: UpsertOutcome,
}

/// Totals over a whole ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub keys_listed: usize,
    pub batches: usize,
    pub batches_failed: usize,
    pub batches_fell_back: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub fetch_failures: usize,
    pub records_parsed: usize,
    pub records_succeeded: usize,
    pub records_failed: usize,
}

impl IngestSummary {
    pub fn absorb(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.files_processed += report.keys;
        self.files_skipped += report.skipped;
        self.fetch_failures += report.fetch_failures;
        self.records_parsed += report.parsed;
        self.records_succeeded += report.upsert.committed;
        self.records_failed += report.upsert.failed;
        if report.upsert.used_fallback {
            self.batches_fell_back += 1;
        }
    }
}
