use chrono::{DateTime, Utc};
use sqlx::{PgPool, SqlitePool};

use crate::db::{Database, StorePool};
use crate::models::{DueItem, ReviewState, VocabularyItem};
use srs_engine::ReviewSchedule;

const REVIEW_COLUMNS: &str = r#""id","learner_id","vocab_id","ease_factor","interval_days","repetitions",
  "next_review_at","last_reviewed_at","version""#;

#[derive(Debug, sqlx::FromRow)]
struct ReviewStateRow {
    id: String,
    learner_id: String,
    vocab_id: String,
    ease_factor: f64,
    interval_days: i64,
    repetitions: i64,
    next_review_at: i64,
    last_reviewed_at: Option<i64>,
    version: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct DueRow {
    id: String,
    learner_id: String,
    vocab_id: String,
    ease_factor: f64,
    interval_days: i64,
    repetitions: i64,
    next_review_at: i64,
    last_reviewed_at: Option<i64>,
    version: i64,
    target_text: String,
    transliteration: Option<String>,
    meaning: String,
    example_sentence: Option<String>,
}

/// One consistent read of a learner's due queue.
#[derive(Debug, Clone)]
pub struct DuePage {
    pub items: Vec<DueItem>,
    pub total_due: i64,
    pub total_items: i64,
}

pub async fn find_by_id(db: &Database, id: &str) -> Result<Option<ReviewState>, sqlx::Error> {
    let row = match db.pool() {
        StorePool::Postgres(pool) => {
            sqlx::query_as::<_, ReviewStateRow>(&format!(
                r#"SELECT {REVIEW_COLUMNS} FROM "review_states" WHERE "id" = $1"#
            ))
            .bind(id)
            .fetch_optional(pool)
            .await?
        }
        StorePool::Sqlite(pool) => {
            sqlx::query_as::<_, ReviewStateRow>(&format!(
                r#"SELECT {REVIEW_COLUMNS} FROM "review_states" WHERE "id" = ?"#
            ))
            .bind(id)
            .fetch_optional(pool)
            .await?
        }
    };
    row.map(ReviewState::try_from).transpose()
}

pub async fn find_by_pair(
    db: &Database,
    learner_id: &str,
    vocab_id: &str,
) -> Result<Option<ReviewState>, sqlx::Error> {
    let row = match db.pool() {
        StorePool::Postgres(pool) => {
            sqlx::query_as::<_, ReviewStateRow>(&format!(
                r#"SELECT {REVIEW_COLUMNS} FROM "review_states" WHERE "learner_id" = $1 AND "vocab_id" = $2"#
            ))
            .bind(learner_id)
            .bind(vocab_id)
            .fetch_optional(pool)
            .await?
        }
        StorePool::Sqlite(pool) => {
            sqlx::query_as::<_, ReviewStateRow>(&format!(
                r#"SELECT {REVIEW_COLUMNS} FROM "review_states" WHERE "learner_id" = ? AND "vocab_id" = ?"#
            ))
            .bind(learner_id)
            .bind(vocab_id)
            .fetch_optional(pool)
            .await?
        }
    };
    row.map(ReviewState::try_from).transpose()
}

/// Inserts `state` unless the learner already has a record for its
/// vocabulary item. Returns whether a row was written.
pub async fn insert_if_absent(db: &Database, state: &ReviewState) -> Result<bool, sqlx::Error> {
    let now_ms = Utc::now().timestamp_millis();
    let schedule = &state.schedule;
    let affected = match db.pool() {
        StorePool::Postgres(pool) => {
            sqlx::query(
                r#"
                INSERT INTO "review_states"
                  ("id","learner_id","vocab_id","ease_factor","interval_days","repetitions",
                   "next_review_at","last_reviewed_at","version","created_at","updated_at")
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$10)
                ON CONFLICT ("learner_id","vocab_id") DO NOTHING
                "#,
            )
            .bind(&state.id)
            .bind(&state.learner_id)
            .bind(&state.vocab_id)
            .bind(schedule.ease_factor)
            .bind(schedule.interval_days)
            .bind(schedule.repetitions)
            .bind(schedule.next_review.timestamp_millis())
            .bind(schedule.last_reviewed.map(|t| t.timestamp_millis()))
            .bind(state.version)
            .bind(now_ms)
            .execute(pool)
            .await?
            .rows_affected()
        }
        StorePool::Sqlite(pool) => {
            sqlx::query(
                r#"
                INSERT INTO "review_states"
                  ("id","learner_id","vocab_id","ease_factor","interval_days","repetitions",
                   "next_review_at","last_reviewed_at","version","created_at","updated_at")
                VALUES (?,?,?,?,?,?,?,?,?,?,?)
                ON CONFLICT ("learner_id","vocab_id") DO NOTHING
                "#,
            )
            .bind(&state.id)
            .bind(&state.learner_id)
            .bind(&state.vocab_id)
            .bind(schedule.ease_factor)
            .bind(schedule.interval_days)
            .bind(schedule.repetitions)
            .bind(schedule.next_review.timestamp_millis())
            .bind(schedule.last_reviewed.map(|t| t.timestamp_millis()))
            .bind(state.version)
            .bind(now_ms)
            .bind(now_ms)
            .execute(pool)
            .await?
            .rows_affected()
        }
    };
    Ok(affected == 1)
}

/// Writes every scheduling column of `next` in one statement, but only if the
/// stored row still carries `expected_version`. Returns `false` when another
/// writer committed first; the caller must re-read before trying again.
pub async fn compare_and_swap(
    db: &Database,
    next: &ReviewState,
    expected_version: i64,
) -> Result<bool, sqlx::Error> {
    let now_ms = Utc::now().timestamp_millis();
    let schedule = &next.schedule;
    let affected = match db.pool() {
        StorePool::Postgres(pool) => {
            sqlx::query(
                r#"
                UPDATE "review_states"
                SET "ease_factor" = $1,
                    "interval_days" = $2,
                    "repetitions" = $3,
                    "next_review_at" = $4,
                    "last_reviewed_at" = $5,
                    "updated_at" = $6,
                    "version" = "version" + 1
                WHERE "id" = $7
                  AND "version" = $8
                "#,
            )
            .bind(schedule.ease_factor)
            .bind(schedule.interval_days)
            .bind(schedule.repetitions)
            .bind(schedule.next_review.timestamp_millis())
            .bind(schedule.last_reviewed.map(|t| t.timestamp_millis()))
            .bind(now_ms)
            .bind(&next.id)
            .bind(expected_version)
            .execute(pool)
            .await?
            .rows_affected()
        }
        StorePool::Sqlite(pool) => {
            sqlx::query(
                r#"
                UPDATE "review_states"
                SET "ease_factor" = ?,
                    "interval_days" = ?,
                    "repetitions" = ?,
                    "next_review_at" = ?,
                    "last_reviewed_at" = ?,
                    "updated_at" = ?,
                    "version" = "version" + 1
                WHERE "id" = ?
                  AND "version" = ?
                "#,
            )
            .bind(schedule.ease_factor)
            .bind(schedule.interval_days)
            .bind(schedule.repetitions)
            .bind(schedule.next_review.timestamp_millis())
            .bind(schedule.last_reviewed.map(|t| t.timestamp_millis()))
            .bind(now_ms)
            .bind(&next.id)
            .bind(expected_version)
            .execute(pool)
            .await?
            .rows_affected()
        }
    };
    Ok(affected == 1)
}

/// Due items for `learner_id` at `now`, most overdue first, plus the exact
/// due and total counts. All three reads share one transaction.
pub async fn select_due_page(
    db: &Database,
    learner_id: &str,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<DuePage, sqlx::Error> {
    let now_ms = now.timestamp_millis();
    match db.pool() {
        StorePool::Postgres(pool) => select_due_page_pg(pool, learner_id, now_ms, limit).await,
        StorePool::Sqlite(pool) => select_due_page_sqlite(pool, learner_id, now_ms, limit).await,
    }
}

async fn select_due_page_pg(
    pool: &PgPool,
    learner_id: &str,
    now_ms: i64,
    limit: i64,
) -> Result<DuePage, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;

    let rows = sqlx::query_as::<_, DueRow>(
        r#"
        SELECT s."id", s."learner_id", s."vocab_id", s."ease_factor", s."interval_days",
               s."repetitions", s."next_review_at", s."last_reviewed_at", s."version",
               v."target_text", v."transliteration", v."meaning", v."example_sentence"
        FROM "review_states" s
        JOIN "vocabulary_items" v ON v."id" = s."vocab_id"
        WHERE s."learner_id" = $1
          AND s."next_review_at" <= $2
        ORDER BY s."next_review_at" ASC, s."repetitions" ASC, s."id" ASC
        LIMIT $3
        "#,
    )
    .bind(learner_id)
    .bind(now_ms)
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    let (total_due, total_items): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
          COUNT(*) FILTER (WHERE "next_review_at" <= $2) AS "total_due",
          COUNT(*) AS "total_items"
        FROM "review_states"
        WHERE "learner_id" = $1
        "#,
    )
    .bind(learner_id)
    .bind(now_ms)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(DuePage {
        items: rows.into_iter().map(DueItem::try_from).collect::<Result<_, _>>()?,
        total_due,
        total_items,
    })
}

async fn select_due_page_sqlite(
    pool: &SqlitePool,
    learner_id: &str,
    now_ms: i64,
    limit: i64,
) -> Result<DuePage, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let rows = sqlx::query_as::<_, DueRow>(
        r#"
        SELECT s."id", s."learner_id", s."vocab_id", s."ease_factor", s."interval_days",
               s."repetitions", s."next_review_at", s."last_reviewed_at", s."version",
               v."target_text", v."transliteration", v."meaning", v."example_sentence"
        FROM "review_states" s
        JOIN "vocabulary_items" v ON v."id" = s."vocab_id"
        WHERE s."learner_id" = ?
          AND s."next_review_at" <= ?
        ORDER BY s."next_review_at" ASC, s."repetitions" ASC, s."id" ASC
        LIMIT ?
        "#,
    )
    .bind(learner_id)
    .bind(now_ms)
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    let (total_due, total_items): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
          COALESCE(SUM(CASE WHEN "next_review_at" <= ? THEN 1 ELSE 0 END), 0) AS "total_due",
          COUNT(*) AS "total_items"
        FROM "review_states"
        WHERE "learner_id" = ?
        "#,
    )
    .bind(now_ms)
    .bind(learner_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(DuePage {
        items: rows.into_iter().map(DueItem::try_from).collect::<Result<_, _>>()?,
        total_due,
        total_items,
    })
}

fn millis_to_datetime(column: &str, value: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::<Utc>::from_timestamp_millis(value).ok_or_else(|| {
        sqlx::Error::Decode(format!("{column} value {value} is not a valid timestamp").into())
    })
}

fn schedule_from_columns(
    ease_factor: f64,
    interval_days: i64,
    repetitions: i64,
    next_review_at: i64,
    last_reviewed_at: Option<i64>,
) -> Result<ReviewSchedule, sqlx::Error> {
    Ok(ReviewSchedule {
        ease_factor,
        interval_days,
        repetitions,
        next_review: millis_to_datetime("next_review_at", next_review_at)?,
        last_reviewed: last_reviewed_at
            .map(|ms| millis_to_datetime("last_reviewed_at", ms))
            .transpose()?,
    })
}

impl TryFrom<ReviewStateRow> for ReviewState {
    type Error = sqlx::Error;

    fn try_from(row: ReviewStateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            schedule: schedule_from_columns(
                row.ease_factor,
                row.interval_days,
                row.repetitions,
                row.next_review_at,
                row.last_reviewed_at,
            )?,
            id: row.id,
            learner_id: row.learner_id,
            vocab_id: row.vocab_id,
            version: row.version,
        })
    }
}

impl TryFrom<DueRow> for DueItem {
    type Error = sqlx::Error;

    fn try_from(row: DueRow) -> Result<Self, Self::Error> {
        let schedule = schedule_from_columns(
            row.ease_factor,
            row.interval_days,
            row.repetitions,
            row.next_review_at,
            row.last_reviewed_at,
        )?;
        Ok(Self {
            vocabulary: VocabularyItem {
                id: row.vocab_id.clone(),
                target_text: row.target_text,
                transliteration: row.transliteration,
                meaning: row.meaning,
                example_sentence: row.example_sentence,
            },
            srs_item: ReviewState {
                id: row.id,
                learner_id: row.learner_id,
                vocab_id: row.vocab_id,
                schedule,
                version: row.version,
            },
        })
    }
}
