//! In-process award store
//!
//! Mirrors the Postgres schema closely enough to exercise the upsert engine
//! without a database: unique natural keys, surrogate ids, link uniqueness,
//! and the `NUMERIC(15, 2)` range of the award amount. A batch is checked
//! against the current state first and applied in place only when every row
//! would be accepted, so a write costs the size of the batch.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{AwardStore, AMOUNT_LIMIT};
use crate::ingest::error::StoreError;
use crate::ingest::models::{CodedEntry, Sponsor, WriteStats};
use crate::ingest::normalizer::{AwardRow, EntityLink, NormalizedBatch};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredAward {
    pub id: i32,
    pub row: AwardRow,
}

/// Table contents, keyed the way the schema keys them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryState {
    pub awards: BTreeMap<String, StoredAward>,
    pub investigators: BTreeMap<String, i32>,
    pub sponsors: BTreeMap<String, (i32, Sponsor)>,
    pub programs: BTreeMap<String, (i32, CodedEntry)>,
    pub field_applications: BTreeMap<String, (i32, CodedEntry)>,
    /// (award_id, investigator_id) -> role
    pub award_investigators: BTreeMap<(i32, i32), String>,
    pub award_sponsors: BTreeSet<(i32, i32)>,
    pub award_programs: BTreeSet<(i32, i32)>,
    pub award_field_applications: BTreeSet<(i32, i32)>,
    /// (award_id, reference), in insertion order
    pub program_refs: Vec<(i32, String)>,
    next_id: i32,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    /// Every check `apply` could fail, run before anything is written
    fn check(&self, batch: &NormalizedBatch) -> Result<(), StoreError> {
        let limit = BigDecimal::from(AMOUNT_LIMIT);
        for award in &batch.awards {
            if let Some(amount) = &award.expected_total_amount {
                if amount.abs() >= limit {
                    return Err(StoreError::Constraint(format!(
                        "numeric field overflow for award {}: {}",
                        award.award_number, amount
                    )));
                }
            }
        }

        let awards: BTreeSet<&str> = batch
            .awards
            .iter()
            .map(|award| award.award_number.as_str())
            .collect();
        let has_award = |number: &str| awards.contains(number) || self.awards.contains_key(number);
        let unresolved = |kind: &'static str, key: &str| StoreError::UnresolvedKey {
            kind,
            key: key.to_string(),
        };

        for link in &batch.award_investigators {
            if !has_award(&link.award_number) {
                return Err(unresolved("award", &link.award_number));
            }
            if !batch.investigators.contains(&link.name)
                && !self.investigators.contains_key(&link.name)
            {
                return Err(unresolved("investigator", &link.name));
            }
        }

        let sponsors: BTreeSet<&str> = batch.sponsors.iter().map(|s| s.name.as_str()).collect();
        let programs: BTreeSet<&str> = batch.programs.iter().map(|p| p.code.as_str()).collect();
        let fields: BTreeSet<&str> = batch
            .field_applications
            .iter()
            .map(|f| f.code.as_str())
            .collect();
        let groups = [
            ("sponsor", &batch.award_sponsors, &sponsors, keys_of(&self.sponsors)),
            ("program", &batch.award_programs, &programs, keys_of(&self.programs)),
            (
                "field application",
                &batch.award_field_applications,
                &fields,
                keys_of(&self.field_applications),
            ),
        ];
        for (kind, links, staged, stored) in groups {
            for link in links {
                if !has_award(&link.award_number) {
                    return Err(unresolved("award", &link.award_number));
                }
                if !staged.contains(link.key.as_str()) && !stored.contains(link.key.as_str()) {
                    return Err(unresolved(kind, &link.key));
                }
            }
        }

        for reference in &batch.program_refs {
            if !has_award(&reference.award_number) {
                return Err(unresolved("award", &reference.award_number));
            }
        }
        Ok(())
    }

    /// Write a batch that passed `check`
    fn apply(&mut self, batch: &NormalizedBatch) -> Result<WriteStats, StoreError> {
        for award in &batch.awards {
            let id = match self.awards.get(&award.award_number) {
                Some(existing) => existing.id,
                None => self.next_id(),
            };
            self.awards.insert(
                award.award_number.clone(),
                StoredAward {
                    id,
                    row: award.clone(),
                },
            );
        }

        for name in &batch.investigators {
            if !self.investigators.contains_key(name) {
                let id = self.next_id();
                self.investigators.insert(name.clone(), id);
            }
        }
        for sponsor in &batch.sponsors {
            let id = match self.sponsors.get(&sponsor.name) {
                Some((id, _)) => *id,
                None => self.next_id(),
            };
            self.sponsors.insert(sponsor.name.clone(), (id, sponsor.clone()));
        }
        for program in &batch.programs {
            let id = match self.programs.get(&program.code) {
                Some((id, _)) => *id,
                None => self.next_id(),
            };
            self.programs.insert(program.code.clone(), (id, program.clone()));
        }
        for field in &batch.field_applications {
            let id = match self.field_applications.get(&field.code) {
                Some((id, _)) => *id,
                None => self.next_id(),
            };
            self.field_applications.insert(field.code.clone(), (id, field.clone()));
        }

        for link in &batch.award_investigators {
            let award_id = self.award_id(&link.award_number)?;
            let investigator_id = lookup(&self.investigators, "investigator", &link.name)?;
            self.award_investigators
                .insert((award_id, investigator_id), link.role.clone());
        }
        let sponsor_links = self.entity_links(&batch.award_sponsors, "sponsor", |s, key| {
            s.sponsors.get(key).map(|(id, _)| *id)
        })?;
        self.award_sponsors.extend(sponsor_links.iter().copied());
        let program_links = self.entity_links(&batch.award_programs, "program", |s, key| {
            s.programs.get(key).map(|(id, _)| *id)
        })?;
        self.award_programs.extend(program_links.iter().copied());
        let field_links = self.entity_links(
            &batch.award_field_applications,
            "field application",
            |s, key| s.field_applications.get(key).map(|(id, _)| *id),
        )?;
        self.award_field_applications.extend(field_links.iter().copied());

        for reference in &batch.program_refs {
            let award_id = self.award_id(&reference.award_number)?;
            self.program_refs.push((award_id, reference.reference.clone()));
        }

        Ok(WriteStats {
            awards: batch.awards.len(),
            investigators: batch.investigators.len(),
            sponsors: batch.sponsors.len(),
            programs: batch.programs.len(),
            field_applications: batch.field_applications.len(),
            links: batch.award_investigators.len()
                + sponsor_links.len()
                + program_links.len()
                + field_links.len(),
            program_refs: batch.program_refs.len(),
        })
    }

    fn award_id(&self, award_number: &str) -> Result<i32, StoreError> {
        self.awards
            .get(award_number)
            .map(|award| award.id)
            .ok_or_else(|| StoreError::UnresolvedKey {
                kind: "award",
                key: award_number.to_string(),
            })
    }

    fn entity_links(
        &self,
        links: &[EntityLink],
        kind: &'static str,
        find: impl Fn(&Self, &str) -> Option<i32>,
    ) -> Result<Vec<(i32, i32)>, StoreError> {
        links
            .iter()
            .map(|link| {
                let award_id = self.award_id(&link.award_number)?;
                let entity_id = find(self, &link.key).ok_or_else(|| StoreError::UnresolvedKey {
                    kind,
                    key: link.key.clone(),
                })?;
                Ok((award_id, entity_id))
            })
            .collect()
    }

    /// Role on the award/investigator link, by natural keys
    pub fn role_of(&self, award_number: &str, investigator: &str) -> Option<&str> {
        let award_id = self.awards.get(award_number)?.id;
        let investigator_id = *self.investigators.get(investigator)?;
        self.award_investigators
            .get(&(award_id, investigator_id))
            .map(String::as_str)
    }

    /// Program references stored for one award
    pub fn refs_of(&self, award_number: &str) -> Vec<&str> {
        let Some(award) = self.awards.get(award_number) else {
            return Vec::new();
        };
        self.program_refs
            .iter()
            .filter(|(award_id, _)| *award_id == award.id)
            .map(|(_, reference)| reference.as_str())
            .collect()
    }
}

fn keys_of<V>(rows: &BTreeMap<String, V>) -> BTreeSet<&str> {
    rows.keys().map(String::as_str).collect()
}

fn lookup(ids: &BTreeMap<String, i32>, kind: &'static str, key: &str) -> Result<i32, StoreError> {
    ids.get(key).copied().ok_or_else(|| StoreError::UnresolvedKey {
        kind,
        key: key.to_string(),
    })
}

/// Award store held in memory, used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryAwardStore {
    state: Mutex<MemoryState>,
    writes: AtomicUsize,
}

impl MemoryAwardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state
    pub fn snapshot(&self) -> Result<MemoryState, StoreError> {
        self.state
            .lock()
            .map(|state| state.clone())
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    /// Number of `write_batch` calls, committed or not
    pub fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AwardStore for MemoryAwardStore {
    async fn write_batch(&self, batch: &NormalizedBatch) -> Result<WriteStats, StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);

        let mut state = self
            .state
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        state.check(batch)?;
        state.apply(batch)
    }
}
