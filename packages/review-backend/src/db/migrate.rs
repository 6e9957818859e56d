use sqlx::{PgPool, SqlitePool};
use thiserror::Error;

use super::{Database, StorePool};

const POSTGRES_MIGRATIONS: &[(&str, &str)] = &[(
    "001_review_schema",
    include_str!("../../sql/001_review_schema.sql"),
)];

const SQLITE_MIGRATIONS: &[(&str, &str)] = &[(
    "001_review_schema",
    include_str!("../../sql/sqlite_schema.sql"),
)];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {name} failed: {source}")]
    Statement {
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub async fn run_migrations(db: &Database) -> Result<(), MigrationError> {
    match db.pool() {
        StorePool::Postgres(pool) => run_pg(pool).await,
        StorePool::Sqlite(pool) => run_sqlite(pool).await,
    }
}

async fn run_pg(pool: &PgPool) -> Result<(), MigrationError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "_migrations" (
            "id" SERIAL PRIMARY KEY,
            "name" TEXT NOT NULL UNIQUE,
            "applied_at" TIMESTAMP NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: Vec<String> = sqlx::query_scalar(r#"SELECT "name" FROM "_migrations" ORDER BY "id""#)
        .fetch_all(pool)
        .await?;

    for (name, sql) in POSTGRES_MIGRATIONS {
        if applied.iter().any(|a| a == name) {
            continue;
        }
        tracing::info!(migration = name, "applying migration");

        let mut tx = pool.begin().await?;
        for stmt in statements(sql) {
            sqlx::query(&stmt)
                .execute(&mut *tx)
                .await
                .map_err(|source| MigrationError::Statement { name, source })?;
        }
        sqlx::query(r#"INSERT INTO "_migrations" ("name") VALUES ($1)"#)
            .bind(*name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

async fn run_sqlite(pool: &SqlitePool) -> Result<(), MigrationError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "_migrations" (
            "id" INTEGER PRIMARY KEY AUTOINCREMENT,
            "name" TEXT NOT NULL UNIQUE,
            "applied_at" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: Vec<String> = sqlx::query_scalar(r#"SELECT "name" FROM "_migrations" ORDER BY "id""#)
        .fetch_all(pool)
        .await?;

    for (name, sql) in SQLITE_MIGRATIONS {
        if applied.iter().any(|a| a == name) {
            continue;
        }
        tracing::info!(migration = name, "applying migration");

        let mut tx = pool.begin().await?;
        for stmt in statements(sql) {
            sqlx::query(&stmt)
                .execute(&mut *tx)
                .await
                .map_err(|source| MigrationError::Statement { name, source })?;
        }
        sqlx::query(r#"INSERT INTO "_migrations" ("name") VALUES (?)"#)
            .bind(*name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

/// Statements of a schema file with comment lines stripped.
fn statements(sql: &str) -> Vec<String> {
    split_sql_statements(sql)
        .into_iter()
        .map(|stmt| {
            stmt.lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|stmt| !stmt.is_empty())
        .collect()
}

pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut prev = '\0';

    for ch in sql.chars() {
        match ch {
            '\'' if !in_double_quote && prev != '\\' => {
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
            }
            ';' if !in_single_quote && !in_double_quote => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    statements.push(stmt.to_string());
                }
                current.clear();
                prev = ch;
                continue;
            }
            _ => {}
        }

        current.push(ch);
        prev = ch;
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splitter_ignores_semicolons_in_quotes() {
        let sql = r#"INSERT INTO "a;b" VALUES ('x;y'); SELECT 1;"#;
        let parts = split_sql_statements(sql);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], r#"INSERT INTO "a;b" VALUES ('x;y')"#);
        assert_eq!(parts[1], "SELECT 1");
    }

    #[test]
    fn schema_files_split_into_tables_and_indexes() {
        for (_, sql) in POSTGRES_MIGRATIONS.iter().chain(SQLITE_MIGRATIONS) {
            let stmts = statements(sql);
            assert_eq!(stmts.len(), 4);
            assert!(stmts.iter().all(|s| !s.starts_with("--")));
            assert!(stmts[0].starts_with("CREATE TABLE"));
        }
    }

    proptest! {
        #[test]
        fn quoted_semicolons_never_split_a_statement(
            parts in proptest::collection::vec(("[a-z_]{1,8}", "[a-z ;]{0,12}"), 1..6)
        ) {
            let expected: Vec<String> = parts
                .iter()
                .map(|(column, literal)| format!("SELECT {column} FROM t WHERE v = '{literal}'"))
                .collect();
            let sql = format!("{};", expected.join(";\n"));

            prop_assert_eq!(split_sql_statements(&sql), expected);
        }
    }
}
