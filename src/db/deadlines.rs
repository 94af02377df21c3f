//! Deadline storage: seeding upserts and key-condition queries.

use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use super::repository::{format_ts, parse_ts, Repository};
use crate::errors::AppError;
use crate::models::{Deadline, Jurisdiction};
use crate::query::{ContinuationKey, DeadlinePage, Index, ItemKeys, KeyCondition, Predicate, SortBound};

/// Number of items written per transaction when seeding.
pub const SEED_BATCH_SIZE: usize = 25;

const DEADLINE_COLUMNS: &str = "id, type, name, description, jurisdiction, agency, due_date, \
     period, applicable_to, source_url, source_verified_at, last_updated, notes, \
     pk, sk, gsi1pk, gsi1sk";

impl Repository {
    /// Insert or replace deadlines, `SEED_BATCH_SIZE` per transaction.
    ///
    /// Items are matched by id, so loading the same file twice leaves the
    /// table unchanged apart from the audit timestamps it carries.
    pub async fn upsert_deadlines(&self, deadlines: &[Deadline]) -> Result<usize, AppError> {
        let mut written = 0;
        for batch in deadlines.chunks(SEED_BATCH_SIZE) {
            let mut tx = self.pool.begin().await?;
            for deadline in batch {
                let keys = ItemKeys::for_deadline(deadline);
                let applicable_to = serde_json::to_string(&deadline.applicable_to)
                    .map_err(|e| AppError::Internal(e.to_string()))?;

                sqlx::query(
                    r#"
                    INSERT INTO deadlines (
                        id, pk, sk, gsi1pk, gsi1sk, gsi2pk, gsi2sk, type, name, description,
                        jurisdiction, agency, due_date, period, applicable_to, source_url,
                        source_verified_at, last_updated, notes
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        pk = excluded.pk,
                        sk = excluded.sk,
                        gsi1pk = excluded.gsi1pk,
                        gsi1sk = excluded.gsi1sk,
                        gsi2pk = excluded.gsi2pk,
                        gsi2sk = excluded.gsi2sk,
                        type = excluded.type,
                        name = excluded.name,
                        description = excluded.description,
                        jurisdiction = excluded.jurisdiction,
                        agency = excluded.agency,
                        due_date = excluded.due_date,
                        period = excluded.period,
                        applicable_to = excluded.applicable_to,
                        source_url = excluded.source_url,
                        source_verified_at = excluded.source_verified_at,
                        last_updated = excluded.last_updated,
                        notes = excluded.notes
                    "#,
                )
                .bind(&deadline.id)
                .bind(&keys.pk)
                .bind(&keys.sk)
                .bind(&keys.gsi1pk)
                .bind(&keys.gsi1sk)
                .bind(&keys.gsi2pk)
                .bind(&keys.gsi2sk)
                .bind(&deadline.deadline_type)
                .bind(&deadline.name)
                .bind(&deadline.description)
                .bind(deadline.jurisdiction.as_str())
                .bind(&deadline.agency)
                .bind(deadline.due_date_string())
                .bind(&deadline.period)
                .bind(&applicable_to)
                .bind(&deadline.source_url)
                .bind(format_ts(&deadline.source_verified_at))
                .bind(format_ts(&deadline.last_updated))
                .bind(&deadline.notes)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            written += batch.len();
            tracing::debug!(batch = batch.len(), total = written, "deadline batch committed");
        }
        Ok(written)
    }

    /// Total number of stored deadlines.
    pub async fn count_deadlines(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM deadlines")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Run a key-condition query in index order.
    ///
    /// With a `limit`, one extra row is read to decide whether a continuation
    /// key is returned; resumption starts strictly after `start`. Without a
    /// limit the whole selection is returned and `next` is always `None`.
    pub async fn query_deadlines(
        &self,
        condition: &KeyCondition,
        predicate: &Predicate,
        limit: Option<usize>,
        start: Option<&ContinuationKey>,
    ) -> Result<DeadlinePage, AppError> {
        let (pk_col, sk_col) = match condition.index {
            Index::Gsi1 => ("gsi1pk", "gsi1sk"),
            Index::Gsi2 => ("gsi2pk", "gsi2sk"),
        };

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(DEADLINE_COLUMNS)
            .push(" FROM deadlines WHERE ")
            .push(pk_col)
            .push(" = ")
            .push_bind(condition.partition.clone());

        match &condition.sort {
            SortBound::Unbounded => {}
            SortBound::Between(from, to) => {
                qb.push(" AND ")
                    .push(sk_col)
                    .push(" BETWEEN ")
                    .push_bind(from.clone())
                    .push(" AND ")
                    .push_bind(to.clone());
            }
            SortBound::AtLeast(from) => {
                qb.push(" AND ").push(sk_col).push(" >= ").push_bind(from.clone());
            }
            SortBound::AtMost(to) => {
                qb.push(" AND ").push(sk_col).push(" <= ").push_bind(to.clone());
            }
        }

        if let Some(jurisdiction) = predicate.jurisdiction {
            qb.push(" AND jurisdiction = ").push_bind(jurisdiction.as_str());
        }

        if let Some(types) = predicate.types.accepted_types() {
            qb.push(" AND type IN (");
            let mut list = qb.separated(", ");
            for t in types {
                list.push_bind(t.to_string());
            }
            list.push_unseparated(")");
        }

        if let Some(start) = start {
            if !start.belongs_to(condition) {
                return Err(AppError::InvalidToken);
            }
            qb.push(" AND (gsi1sk, pk, sk) > (")
                .push_bind(start.gsi1sk.clone())
                .push(", ")
                .push_bind(start.pk.clone())
                .push(", ")
                .push_bind(start.sk.clone())
                .push(")");
        }

        qb.push(" ORDER BY ").push(sk_col).push(", pk, sk");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind((limit + 1) as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;

        let more = limit.is_some_and(|limit| rows.len() > limit);
        let take = limit.unwrap_or(rows.len()).min(rows.len());
        let next = if more {
            Some(continuation_from_row(&rows[take - 1]))
        } else {
            None
        };

        let items = rows[..take]
            .iter()
            .map(deadline_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DeadlinePage { items, next })
    }
}

fn continuation_from_row(row: &SqliteRow) -> ContinuationKey {
    ContinuationKey {
        pk: row.get("pk"),
        sk: row.get("sk"),
        gsi1pk: row.get("gsi1pk"),
        gsi1sk: row.get("gsi1sk"),
    }
}

fn deadline_from_row(row: &SqliteRow) -> Result<Deadline, AppError> {
    let jurisdiction: String = row.get("jurisdiction");
    let due_date: String = row.get("due_date");
    let applicable_to: String = row.get("applicable_to");
    let source_verified_at: String = row.get("source_verified_at");
    let last_updated: String = row.get("last_updated");

    Ok(Deadline {
        id: row.get("id"),
        deadline_type: row.get("type"),
        name: row.get("name"),
        description: row.get("description"),
        jurisdiction: Jurisdiction::parse(&jurisdiction).ok_or_else(|| {
            AppError::Internal(format!("stored jurisdiction {:?}", jurisdiction))
        })?,
        agency: row.get("agency"),
        due_date: NaiveDate::parse_from_str(&due_date, "%Y-%m-%d")
            .map_err(|e| AppError::Internal(format!("stored due date {:?}: {}", due_date, e)))?,
        period: row.get("period"),
        applicable_to: serde_json::from_str(&applicable_to)
            .map_err(|e| AppError::Internal(format!("stored applicable_to: {}", e)))?,
        source_url: row.get("source_url"),
        source_verified_at: parse_ts(&source_verified_at)?,
        last_updated: parse_ts(&last_updated)?,
        notes: row.get("notes"),
    })
}
