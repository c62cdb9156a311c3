// Edit-activity aggregation: the most recent distinct changesets an account
// produced before a cutoff, drawn from the live locality table and the two
// archive tables.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{Account, Store};

/// Maximum entries returned by the aggregator.
pub const MAX_UPDATES: usize = 20;

/// Row cap for each of the three source queries.
const PER_SOURCE_LIMIT: i64 = 15;

/// One grouped row from a single source query.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRow {
    pub changeset: Uuid,
    pub created: DateTime<Utc>,
    pub username: String,
    pub version: i32,
    pub edit_count: i64,
    pub locality_id: Option<i64>,
}

/// An aggregated update entry, as serialized into the feed JSON.
#[derive(Debug, Clone, Serialize)]
pub struct UserUpdate {
    pub changeset: Uuid,
    pub created: DateTime<Utc>,
    pub username: String,
    pub version: i32,
    pub edit_count: i64,
    pub locality_id: Option<i64>,
    pub nickname: String,
}

type SourceRow = (Uuid, DateTime<Utc>, String, i32, i64, Option<i64>);

fn rows_from_tuples(rows: Vec<SourceRow>) -> Vec<UpdateRow> {
    rows.into_iter()
        .map(|r| UpdateRow {
            changeset: r.0,
            created: r.1,
            username: r.2,
            version: r.3,
            edit_count: r.4,
            locality_id: r.5,
        })
        .collect()
}

/// Superseded locality versions, grouped per changeset.
async fn locality_archive_updates(
    pool: &PgPool,
    account_id: Uuid,
    cutoff: DateTime<Utc>,
) -> Result<Vec<UpdateRow>> {
    let rows = sqlx::query_as::<_, SourceRow>(
        r#"
        SELECT la.changeset_id, c.created_at, a.username, la.version,
               COUNT(*), MAX(la.object_id)
        FROM locality_archive la
        JOIN changesets c ON c.id = la.changeset_id
        JOIN accounts a ON a.id = c.account_id
        WHERE c.account_id = $1 AND c.created_at < $2
        GROUP BY la.changeset_id, c.created_at, a.username, la.version
        ORDER BY c.created_at DESC
        LIMIT $3
        "#,
    )
    .bind(account_id)
    .bind(cutoff)
    .bind(PER_SOURCE_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows_from_tuples(rows))
}

/// Superseded attribute values, grouped per changeset. First versions are
/// excluded; a value's initial write is covered by the locality row itself.
async fn value_archive_updates(
    pool: &PgPool,
    account_id: Uuid,
    cutoff: DateTime<Utc>,
) -> Result<Vec<UpdateRow>> {
    let rows = sqlx::query_as::<_, SourceRow>(
        r#"
        SELECT va.changeset_id, c.created_at, a.username, va.version,
               COUNT(*), MAX(va.locality_id)
        FROM value_archive va
        JOIN changesets c ON c.id = va.changeset_id
        JOIN accounts a ON a.id = c.account_id
        WHERE c.account_id = $1 AND c.created_at < $2 AND va.version > 1
        GROUP BY va.changeset_id, c.created_at, a.username, va.version
        ORDER BY c.created_at DESC
        LIMIT $3
        "#,
    )
    .bind(account_id)
    .bind(cutoff)
    .bind(PER_SOURCE_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows_from_tuples(rows))
}

/// Current locality versions, grouped per changeset.
async fn locality_updates(
    pool: &PgPool,
    account_id: Uuid,
    cutoff: DateTime<Utc>,
) -> Result<Vec<UpdateRow>> {
    let rows = sqlx::query_as::<_, SourceRow>(
        r#"
        SELECT l.changeset_id, c.created_at, a.username, l.version,
               COUNT(*), MAX(l.id)
        FROM localities l
        JOIN changesets c ON c.id = l.changeset_id
        JOIN accounts a ON a.id = c.account_id
        WHERE c.account_id = $1 AND c.created_at < $2
        GROUP BY l.changeset_id, c.created_at, a.username, l.version
        ORDER BY c.created_at DESC
        LIMIT $3
        "#,
    )
    .bind(account_id)
    .bind(cutoff)
    .bind(PER_SOURCE_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows_from_tuples(rows))
}

/// Merge the three source result sets: sort descending by changeset creation
/// time, collapse runs of equal timestamps to their first entry, normalize
/// versions, and truncate.
///
/// Equal timestamps are treated as the same changeset. Dedup is a single
/// order-dependent pass, not a group-by: an entry is dropped when its
/// timestamp matches the immediately preceding entry in the sorted list.
pub fn merge_updates(mut rows: Vec<UpdateRow>, limit: usize) -> Vec<UpdateRow> {
    rows.sort_by(|a, b| b.created.cmp(&a.created));

    let mut output: Vec<UpdateRow> = Vec::new();
    let mut prev_created: Option<DateTime<Utc>> = None;
    for mut row in rows {
        let duplicate = prev_created == Some(row.created);
        prev_created = Some(row.created);
        if duplicate {
            continue;
        }
        // A multi-edit changeset surfaces its second version as the
        // representative row; display it as the first.
        if row.edit_count > 1 && row.version == 2 {
            row.version = 1;
        }
        output.push(row);
    }

    output.truncate(limit);
    output
}

impl Store {
    /// Up to [`MAX_UPDATES`] most recent distinct update entries by `account`,
    /// strictly older than `cutoff`, newest first, with the editor's display
    /// name attached.
    ///
    /// A source whose table is absent or unreachable contributes nothing; the
    /// failure is logged and the remaining sources still count.
    pub async fn user_updates(
        &self,
        account: &Account,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<UserUpdate>> {
        let mut rows = Vec::new();

        for (source, result) in [
            (
                "locality_archive",
                locality_archive_updates(self.pool(), account.id, cutoff).await,
            ),
            (
                "value_archive",
                value_archive_updates(self.pool(), account.id, cutoff).await,
            ),
            (
                "localities",
                locality_updates(self.pool(), account.id, cutoff).await,
            ),
        ] {
            match result {
                Ok(source_rows) => rows.extend(source_rows),
                Err(e) => {
                    warn!(source, error = %e, "Update source query failed; skipping");
                }
            }
        }

        let merged = merge_updates(rows, MAX_UPDATES);
        let nicknames = self.screen_names_for(&merged).await?;

        Ok(merged
            .into_iter()
            .map(|row| {
                let nickname = nicknames
                    .get(&row.username)
                    .cloned()
                    .unwrap_or_else(|| row.username.clone());
                UserUpdate {
                    changeset: row.changeset,
                    created: row.created,
                    username: row.username,
                    version: row.version,
                    edit_count: row.edit_count,
                    locality_id: row.locality_id,
                    nickname,
                }
            })
            .collect())
    }

    /// Map each distinct editor username in `rows` to a display name. Falls
    /// back to the username when no profile exists or the screen name is
    /// empty.
    async fn screen_names_for(&self, rows: &[UpdateRow]) -> Result<HashMap<String, String>> {
        let mut usernames: Vec<String> = rows.iter().map(|r| r.username.clone()).collect();
        usernames.sort();
        usernames.dedup();
        if usernames.is_empty() {
            return Ok(HashMap::new());
        }

        let pairs = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT a.username, p.screen_name
            FROM accounts a
            JOIN profiles p ON p.account_id = a.id
            WHERE a.username = ANY($1)
            "#,
        )
        .bind(&usernames)
        .fetch_all(self.pool())
        .await?;

        Ok(pairs
            .into_iter()
            .filter(|(_, screen_name)| !screen_name.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap()
    }

    fn row(minute: u32, version: i32, edit_count: i64) -> UpdateRow {
        UpdateRow {
            changeset: Uuid::new_v4(),
            created: at(minute),
            username: "alice".to_string(),
            version,
            edit_count,
            locality_id: Some(1),
        }
    }

    #[test]
    fn empty_in_empty_out() {
        assert!(merge_updates(Vec::new(), MAX_UPDATES).is_empty());
    }

    #[test]
    fn sorts_descending_by_creation_time() {
        let rows = vec![row(5, 1, 1), row(30, 1, 1), row(10, 1, 1)];
        let merged = merge_updates(rows, MAX_UPDATES);
        let minutes: Vec<u32> = merged.iter().map(|r| (r.created - at(0)).num_minutes() as u32).collect();
        assert_eq!(minutes, vec![30, 10, 5]);
    }

    #[test]
    fn collapses_equal_timestamps_to_first_entry() {
        let keeper = row(10, 3, 1);
        let dup_a = row(10, 1, 1);
        let dup_b = row(10, 2, 1);
        let rows = vec![keeper.clone(), dup_a, dup_b, row(5, 1, 1)];
        let merged = merge_updates(rows, MAX_UPDATES);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], keeper);
        let times: Vec<DateTime<Utc>> = merged.iter().map(|r| r.created).collect();
        for pair in times.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn rewrites_second_version_of_multi_edit_changeset() {
        let merged = merge_updates(vec![row(10, 2, 3)], MAX_UPDATES);
        assert_eq!(merged[0].version, 1);
    }

    #[test]
    fn single_edit_version_two_is_left_alone() {
        let merged = merge_updates(vec![row(10, 2, 1)], MAX_UPDATES);
        assert_eq!(merged[0].version, 2);
    }

    #[test]
    fn version_rewrite_only_applies_to_version_two() {
        let merged = merge_updates(vec![row(10, 3, 5)], MAX_UPDATES);
        assert_eq!(merged[0].version, 3);
    }

    #[test]
    fn truncates_to_limit_after_dedup() {
        // 25 distinct timestamps; the cap keeps the 20 newest.
        let rows: Vec<UpdateRow> = (0..25).map(|m| row(m, 1, 1)).collect();
        let merged = merge_updates(rows, MAX_UPDATES);
        assert_eq!(merged.len(), MAX_UPDATES);
        assert_eq!(merged[0].created, at(24));
        assert_eq!(merged[19].created, at(5));
    }

    #[test]
    fn dedup_happens_before_truncation() {
        // 22 rows but only 2 distinct timestamps.
        let mut rows: Vec<UpdateRow> = (0..11).map(|_| row(10, 1, 1)).collect();
        rows.extend((0..11).map(|_| row(5, 1, 1)));
        let merged = merge_updates(rows, MAX_UPDATES);
        assert_eq!(merged.len(), 2);
    }
}
