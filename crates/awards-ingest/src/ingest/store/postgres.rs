// Postgres award store

use async_trait::async_trait;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use tracing::debug;

use super::AwardStore;
use crate::ingest::error::StoreError;
use crate::ingest::models::WriteStats;
use crate::ingest::normalizer::{EntityLink, NormalizedBatch};

/// Postgres caps a statement at 65535 bind parameters
const MAX_BIND_PARAMS: usize = 65_535;

/// Writes batches into the award schema with multi-row upserts
#[derive(Clone)]
pub struct PgAwardStore {
    pool: PgPool,
}

impl PgAwardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn write_in_tx(&self, batch: &NormalizedBatch) -> Result<WriteStats, StoreError> {
        let mut tx = self.pool.begin().await?;

        let award_ids = upsert_returning_keys(
            &mut tx,
            "INSERT INTO nsf_awards (award_number, title, type, nsf_org, latest_amendment_date, \
             file, award_instr, prgm_manager, start_date, expires, expected_total_amt, abstract) ",
            r#"
            ON CONFLICT (award_number)
            DO UPDATE SET
                title = EXCLUDED.title,
                type = EXCLUDED.type,
                nsf_org = EXCLUDED.nsf_org,
                latest_amendment_date = EXCLUDED.latest_amendment_date,
                file = EXCLUDED.file,
                award_instr = EXCLUDED.award_instr,
                prgm_manager = EXCLUDED.prgm_manager,
                start_date = EXCLUDED.start_date,
                expires = EXCLUDED.expires,
                expected_total_amt = EXCLUDED.expected_total_amt,
                abstract = EXCLUDED.abstract
            RETURNING id, award_number
            "#,
            &batch.awards,
            12,
            |mut b, award| {
                b.push_bind(&award.award_number)
                    .push_bind(&award.title)
                    .push_bind(&award.award_type)
                    .push_bind(&award.nsf_org)
                    .push_bind(award.latest_amendment_date)
                    .push_bind(&award.file_ref)
                    .push_bind(&award.award_instrument)
                    .push_bind(&award.program_manager)
                    .push_bind(award.start_date)
                    .push_bind(award.expiration_date)
                    .push_bind(&award.expected_total_amount)
                    .push_bind(&award.abstract_text);
            },
        )
        .await?;

        let investigator_ids = upsert_returning_keys(
            &mut tx,
            "INSERT INTO investigators (name) ",
            " ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id, name",
            &batch.investigators,
            1,
            |mut b, name| {
                b.push_bind(name);
            },
        )
        .await?;

        let sponsor_ids = upsert_returning_keys(
            &mut tx,
            "INSERT INTO sponsors (name, address, phone) ",
            r#"
            ON CONFLICT (name)
            DO UPDATE SET address = EXCLUDED.address, phone = EXCLUDED.phone
            RETURNING id, name
            "#,
            &batch.sponsors,
            3,
            |mut b, sponsor| {
                b.push_bind(&sponsor.name)
                    .push_bind(&sponsor.address)
                    .push_bind(&sponsor.phone);
            },
        )
        .await?;

        let program_ids = upsert_returning_keys(
            &mut tx,
            "INSERT INTO nsf_programs (code, name) ",
            " ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name RETURNING id, code",
            &batch.programs,
            2,
            |mut b, program| {
                b.push_bind(&program.code).push_bind(&program.name);
            },
        )
        .await?;

        let field_ids = upsert_returning_keys(
            &mut tx,
            "INSERT INTO field_applications (code, name) ",
            " ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name RETURNING id, code",
            &batch.field_applications,
            2,
            |mut b, field| {
                b.push_bind(&field.code).push_bind(&field.name);
            },
        )
        .await?;

        let investigator_links = batch
            .award_investigators
            .iter()
            .map(|link| {
                Ok((
                    resolve(&award_ids, "award", &link.award_number)?,
                    resolve(&investigator_ids, "investigator", &link.name)?,
                    link.role.as_str(),
                ))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        execute_chunked(
            &mut tx,
            "INSERT INTO award_investigators (award_id, investigator_id, role) ",
            " ON CONFLICT (award_id, investigator_id) DO UPDATE SET role = EXCLUDED.role",
            &investigator_links,
            3,
            |mut b, (award_id, investigator_id, role)| {
                b.push_bind(*award_id).push_bind(*investigator_id).push_bind(*role);
            },
        )
        .await?;

        let sponsor_links =
            resolve_links(&award_ids, &sponsor_ids, "sponsor", &batch.award_sponsors)?;
        execute_chunked(
            &mut tx,
            "INSERT INTO award_sponsors (award_id, sponsor_id) ",
            " ON CONFLICT (award_id, sponsor_id) DO NOTHING",
            &sponsor_links,
            2,
            bind_pair,
        )
        .await?;

        let program_links =
            resolve_links(&award_ids, &program_ids, "program", &batch.award_programs)?;
        execute_chunked(
            &mut tx,
            "INSERT INTO award_programs (award_id, program_id) ",
            " ON CONFLICT (award_id, program_id) DO NOTHING",
            &program_links,
            2,
            bind_pair,
        )
        .await?;

        let field_links = resolve_links(
            &award_ids,
            &field_ids,
            "field application",
            &batch.award_field_applications,
        )?;
        execute_chunked(
            &mut tx,
            "INSERT INTO award_field_applications (award_id, field_application_id) ",
            " ON CONFLICT (award_id, field_application_id) DO NOTHING",
            &field_links,
            2,
            bind_pair,
        )
        .await?;

        let refs = batch
            .program_refs
            .iter()
            .map(|row| {
                let award_id = resolve(&award_ids, "award", &row.award_number)?;
                Ok((award_id, row.reference.as_str()))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        execute_chunked(
            &mut tx,
            "INSERT INTO program_refs (award_id, reference) ",
            "",
            &refs,
            2,
            |mut b, (award_id, reference)| {
                b.push_bind(*award_id).push_bind(*reference);
            },
        )
        .await?;

        tx.commit().await?;

        let stats = WriteStats {
            awards: award_ids.len(),
            investigators: investigator_ids.len(),
            sponsors: sponsor_ids.len(),
            programs: program_ids.len(),
            field_applications: field_ids.len(),
            links: investigator_links.len()
                + sponsor_links.len()
                + program_links.len()
                + field_links.len(),
            program_refs: refs.len(),
        };
        debug!(?stats, "Committed batch");
        Ok(stats)
    }
}

#[async_trait]
impl AwardStore for PgAwardStore {
    async fn write_batch(&self, batch: &NormalizedBatch) -> Result<WriteStats, StoreError> {
        // the transaction is dropped, and so rolled back, on any early return
        self.write_in_tx(batch).await.map_err(classify)
    }
}

/// Multi-row upsert whose `RETURNING id, <natural key>` feeds the id map
async fn upsert_returning_keys<'a, T, F>(
    tx: &mut Transaction<'_, Postgres>,
    insert: &str,
    on_conflict: &str,
    rows: &'a [T],
    columns: usize,
    mut bind: F,
) -> Result<HashMap<String, i32>, StoreError>
where
    T: Sync,
    F: FnMut(Separated<'_, 'a, Postgres, &'static str>, &'a T) + Send,
{
    let mut ids = HashMap::with_capacity(rows.len());

    for chunk in rows.chunks(MAX_BIND_PARAMS / columns) {
        let mut query_builder: QueryBuilder<'a, Postgres> = QueryBuilder::new(insert);
        query_builder.push_values(chunk, &mut bind);
        query_builder.push(on_conflict);

        let returned: Vec<(i32, String)> = query_builder
            .build_query_as()
            .fetch_all(&mut **tx)
            .await?;
        ids.extend(returned.into_iter().map(|(id, key)| (key, id)));
    }

    Ok(ids)
}

async fn execute_chunked<'a, T, F>(
    tx: &mut Transaction<'_, Postgres>,
    insert: &str,
    on_conflict: &str,
    rows: &'a [T],
    columns: usize,
    mut bind: F,
) -> Result<(), StoreError>
where
    T: Sync,
    F: FnMut(Separated<'_, 'a, Postgres, &'static str>, &'a T) + Send,
{
    for chunk in rows.chunks(MAX_BIND_PARAMS / columns) {
        let mut query_builder: QueryBuilder<'a, Postgres> = QueryBuilder::new(insert);
        query_builder.push_values(chunk, &mut bind);
        query_builder.push(on_conflict);
        query_builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

fn bind_pair(mut b: Separated<'_, '_, Postgres, &'static str>, (award_id, entity_id): &(i32, i32)) {
    b.push_bind(*award_id).push_bind(*entity_id);
}

fn resolve(ids: &HashMap<String, i32>, kind: &'static str, key: &str) -> Result<i32, StoreError> {
    ids.get(key).copied().ok_or_else(|| StoreError::UnresolvedKey {
        kind,
        key: key.to_string(),
    })
}

fn resolve_links(
    award_ids: &HashMap<String, i32>,
    entity_ids: &HashMap<String, i32>,
    kind: &'static str,
    links: &[EntityLink],
) -> Result<Vec<(i32, i32)>, StoreError> {
    links
        .iter()
        .map(|link| {
            Ok((
                resolve(award_ids, "award", &link.award_number)?,
                resolve(entity_ids, kind, &link.key)?,
            ))
        })
        .collect()
}

/// Data exceptions (22xxx) and integrity violations (23xxx) become `Constraint`
fn classify(err: StoreError) -> StoreError {
    match err {
        StoreError::Database(sqlx::Error::Database(db_err)) => {
            let is_constraint = db_err
                .code()
                .map(|code| code.starts_with("22") || code.starts_with("23"))
                .unwrap_or(false);
            if is_constraint {
                StoreError::Constraint(db_err.message().to_string())
            } else {
                StoreError::Database(sqlx::Error::Database(db_err))
            }
        }
        other => other,
    }
}
