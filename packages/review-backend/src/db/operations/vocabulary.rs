use chrono::Utc;

use crate::db::{Database, StorePool};
use crate::models::VocabularyItem;

#[derive(Debug, sqlx::FromRow)]
struct VocabularyRow {
    id: String,
    target_text: String,
    transliteration: Option<String>,
    meaning: String,
    example_sentence: Option<String>,
}

impl From<VocabularyRow> for VocabularyItem {
    fn from(row: VocabularyRow) -> Self {
        Self {
            id: row.id,
            target_text: row.target_text,
            transliteration: row.transliteration,
            meaning: row.meaning,
            example_sentence: row.example_sentence,
        }
    }
}

pub async fn find_vocabulary(
    db: &Database,
    id: &str,
) -> Result<Option<VocabularyItem>, sqlx::Error> {
    let row = match db.pool() {
        StorePool::Postgres(pool) => {
            sqlx::query_as::<_, VocabularyRow>(
                r#"SELECT "id","target_text","transliteration","meaning","example_sentence"
                   FROM "vocabulary_items" WHERE "id" = $1"#,
            )
            .bind(id)
            .fetch_optional(pool)
            .await?
        }
        StorePool::Sqlite(pool) => {
            sqlx::query_as::<_, VocabularyRow>(
                r#"SELECT "id","target_text","transliteration","meaning","example_sentence"
                   FROM "vocabulary_items" WHERE "id" = ?"#,
            )
            .bind(id)
            .fetch_optional(pool)
            .await?
        }
    };
    Ok(row.map(VocabularyItem::from))
}

/// Content-side write path, used by seeding and tests.
pub async fn upsert_vocabulary(db: &Database, item: &VocabularyItem) -> Result<(), sqlx::Error> {
    let now_ms = Utc::now().timestamp_millis();
    match db.pool() {
        StorePool::Postgres(pool) => {
            sqlx::query(
                r#"
                INSERT INTO "vocabulary_items"
                  ("id","target_text","transliteration","meaning","example_sentence","created_at")
                VALUES ($1,$2,$3,$4,$5,$6)
                ON CONFLICT ("id") DO UPDATE SET
                  "target_text" = EXCLUDED."target_text",
                  "transliteration" = EXCLUDED."transliteration",
                  "meaning" = EXCLUDED."meaning",
                  "example_sentence" = EXCLUDED."example_sentence"
                "#,
            )
            .bind(&item.id)
            .bind(&item.target_text)
            .bind(&item.transliteration)
            .bind(&item.meaning)
            .bind(&item.example_sentence)
            .bind(now_ms)
            .execute(pool)
            .await?;
        }
        StorePool::Sqlite(pool) => {
            sqlx::query(
                r#"
                INSERT INTO "vocabulary_items"
                  ("id","target_text","transliteration","meaning","example_sentence","created_at")
                VALUES (?,?,?,?,?,?)
                ON CONFLICT ("id") DO UPDATE SET
                  "target_text" = excluded."target_text",
                  "transliteration" = excluded."transliteration",
                  "meaning" = excluded."meaning",
                  "example_sentence" = excluded."example_sentence"
                "#,
            )
            .bind(&item.id)
            .bind(&item.target_text)
            .bind(&item.transliteration)
            .bind(&item.meaning)
            .bind(&item.example_sentence)
            .bind(now_ms)
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}
