use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sqlx::Row;
use tracing::info;

use crate::Storage;

/// Outcome of running one ad hoc SQL script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptReport {
    pub path: PathBuf,
    pub statements: usize,
    pub rows_affected: u64,
    /// Row count of every user table after the script ran, sorted by table name.
    pub table_counts: Vec<(String, i64)>,
}

impl Storage {
    /// Executes every statement in `path` against the database as-is.
    ///
    /// Statements run in autocommit mode: a failure part-way through leaves
    /// the earlier statements applied, and nothing records that the script ran.
    pub async fn run_sql_file(&self, path: &Path) -> Result<ScriptReport> {
        let sql = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read sql script '{}'", path.display()))?;
        let statements = count_statements(&sql);

        info!(path = %path.display(), statements, "running sql script");
        let result = sqlx::raw_sql(&sql)
            .execute(self.pool())
            .await
            .with_context(|| format!("sql script '{}' failed", path.display()))?;

        let table_counts = self.table_row_counts().await?;
        Ok(ScriptReport {
            path: path.to_path_buf(),
            statements,
            rows_affected: result.rows_affected(),
            table_counts,
        })
    }

    pub async fn table_row_counts(&self) -> Result<Vec<(String, i64)>> {
        let tables: Vec<String> = sqlx::query(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%'
             ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?
        .iter()
        .map(|row| row.get::<String, _>(0))
        .collect();

        let mut counts = Vec::with_capacity(tables.len());
        for table in tables {
            let count: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM \"{}\"",
                table.replace('"', "\"\"")
            ))
            .fetch_one(self.pool())
            .await
            .with_context(|| format!("failed to count rows in '{table}'"))?;
            counts.push((table, count));
        }
        Ok(counts)
    }
}

/// Rough statement count for reporting; ignores semicolons inside quotes and comments.
fn count_statements(sql: &str) -> usize {
    let mut count = 0;
    let mut pending = false;
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                pending = true;
            }
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
            }
            ';' => {
                if pending {
                    count += 1;
                }
                pending = false;
            }
            c if !c.is_whitespace() => pending = true,
            _ => {}
        }
    }
    if pending {
        count += 1;
    }
    count
}
