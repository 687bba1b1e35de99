//! Splitting of multi-valued fields and batch-level deduplication

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use super::models::{CodedEntry, Investigator, ParsedRecord, Sponsor};

/// `Jane Doe  (Principal Investigator current)` per line.
///
/// The role is the last parenthesised group, so nicknames such as
/// `Robert (Bob) Smith (Principal Investigator)` keep their parentheses
/// in the name. A line without `(` is all name with an empty role.
pub fn split_investigators(raw: &str) -> Vec<Investigator> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (name, role) = match line.rfind('(') {
                Some(open) => {
                    let role = line[open + 1..].replace(')', "");
                    (line[..open].trim().to_string(), role.trim().to_string())
                }
                None => (line.to_string(), String::new()),
            };
            (!name.is_empty()).then_some(Investigator { name, role })
        })
        .collect()
}

/// `1711      CERAMICS` per line: code, whitespace, name
pub fn split_coded_entries(raw: &str) -> Vec<CodedEntry> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(char::is_whitespace) {
            Some((code, name)) => CodedEntry {
                code: code.to_string(),
                name: name.trim().to_string(),
            },
            None => CodedEntry {
                code: line.to_string(),
                name: String::new(),
            },
        })
        .collect()
}

/// `9161,9216,AMPP,` -> `["9161", "9216", "AMPP"]`
pub fn split_program_refs(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|reference| !reference.is_empty())
        .map(str::to_string)
        .collect()
}

/// Award columns, ready for the award upsert
#[derive(Debug, Clone, PartialEq)]
pub struct AwardRow {
    pub award_number: String,
    pub title: Option<String>,
    pub award_type: Option<String>,
    pub nsf_org: Option<String>,
    pub latest_amendment_date: Option<NaiveDate>,
    pub file_ref: Option<String>,
    pub award_instrument: Option<String>,
    pub program_manager: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub expected_total_amount: Option<BigDecimal>,
    pub abstract_text: Option<String>,
}

impl AwardRow {
    fn from_record(award_number: &str, record: &ParsedRecord) -> Self {
        Self {
            award_number: award_number.to_string(),
            title: record.title.clone(),
            award_type: record.award_type.clone(),
            nsf_org: record.nsf_org.clone(),
            latest_amendment_date: record.latest_amendment_date,
            file_ref: record.file_ref.clone(),
            award_instrument: record.award_instrument.clone(),
            program_manager: record.program_manager.clone(),
            start_date: record.start_date,
            expiration_date: record.expiration_date,
            expected_total_amount: record.expected_total_amount.clone(),
            abstract_text: record.abstract_text.clone(),
        }
    }
}

/// Award to investigator link; the role lives on the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvestigatorLink {
    pub award_number: String,
    pub name: String,
    pub role: String,
}

/// Award to shared-entity link by natural key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntityLink {
    pub award_number: String,
    pub key: String,
}

/// Program reference owned by one award
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramRefRow {
    pub award_number: String,
    pub reference: String,
}

/// A batch of records flattened into per-table rows.
///
/// Within a batch each award number, entity key, and link appears once.
/// Later records win for award columns, entity attributes, and roles.
/// Program references are appended as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub awards: Vec<AwardRow>,
    pub investigators: Vec<String>,
    pub sponsors: Vec<Sponsor>,
    pub programs: Vec<CodedEntry>,
    pub field_applications: Vec<CodedEntry>,
    pub award_investigators: Vec<InvestigatorLink>,
    pub award_sponsors: Vec<EntityLink>,
    pub award_programs: Vec<EntityLink>,
    pub award_field_applications: Vec<EntityLink>,
    pub program_refs: Vec<ProgramRefRow>,
}

impl NormalizedBatch {
    pub fn from_records(records: &[ParsedRecord]) -> Self {
        let mut awards: BTreeMap<String, AwardRow> = BTreeMap::new();
        let mut investigators: BTreeSet<String> = BTreeSet::new();
        let mut sponsors: BTreeMap<String, Sponsor> = BTreeMap::new();
        let mut programs: BTreeMap<String, CodedEntry> = BTreeMap::new();
        let mut field_applications: BTreeMap<String, CodedEntry> = BTreeMap::new();
        let mut investigator_roles: BTreeMap<(String, String), String> = BTreeMap::new();
        let mut award_sponsors: BTreeSet<EntityLink> = BTreeSet::new();
        let mut award_programs: BTreeSet<EntityLink> = BTreeSet::new();
        let mut award_fields: BTreeSet<EntityLink> = BTreeSet::new();
        let mut program_refs = Vec::new();

        for record in records {
            let Some(number) = record.award_key() else {
                warn!(title = ?record.title, "Dropping record without award number");
                continue;
            };

            awards.insert(number.to_string(), AwardRow::from_record(number, record));

            for inv in record.investigators.iter().filter(|i| !i.name.is_empty()) {
                investigators.insert(inv.name.clone());
                investigator_roles.insert((number.to_string(), inv.name.clone()), inv.role.clone());
            }

            if let Some(sponsor) = record.sponsor.as_ref().filter(|s| !s.name.is_empty()) {
                sponsors.insert(sponsor.name.clone(), sponsor.clone());
                award_sponsors.insert(EntityLink {
                    award_number: number.to_string(),
                    key: sponsor.name.clone(),
                });
            }

            for entry in record.programs.iter().filter(|e| !e.code.is_empty()) {
                programs.insert(entry.code.clone(), entry.clone());
                award_programs.insert(EntityLink {
                    award_number: number.to_string(),
                    key: entry.code.clone(),
                });
            }

            for entry in record.field_applications.iter().filter(|e| !e.code.is_empty()) {
                field_applications.insert(entry.code.clone(), entry.clone());
                award_fields.insert(EntityLink {
                    award_number: number.to_string(),
                    key: entry.code.clone(),
                });
            }

            program_refs.extend(record.program_refs.iter().map(|reference| ProgramRefRow {
                award_number: number.to_string(),
                reference: reference.clone(),
            }));
        }

        Self {
            awards: awards.into_values().collect(),
            investigators: investigators.into_iter().collect(),
            sponsors: sponsors.into_values().collect(),
            programs: programs.into_values().collect(),
            field_applications: field_applications.into_values().collect(),
            award_investigators: investigator_roles
                .into_iter()
                .map(|((award_number, name), role)| InvestigatorLink {
                    award_number,
                    name,
                    role,
                })
                .collect(),
            award_sponsors: award_sponsors.into_iter().collect(),
            award_programs: award_programs.into_iter().collect(),
            award_field_applications: award_fields.into_iter().collect(),
            program_refs,
        }
    }

    /// Number of distinct awards in the batch
    pub fn len(&self) -> usize {
        self.awards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.awards.is_empty()
    }
}
