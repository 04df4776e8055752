//! Statement replay against a live database under a conflict policy.

use backy_core::ConflictMode;
use sqlx::mysql::MySqlConnection;
use tracing::{error, info, warn};

use crate::error::{DbError, Result};

/// Strip the decoration a backed-up statement carries before execution:
/// leading comment lines, `DELIMITER` wrapper lines, and the trailing
/// terminator characters.
pub fn clean_statement(sql: &str) -> String {
    let body: Vec<&str> = sql
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.starts_with("--")
                && !trimmed
                    .split_whitespace()
                    .next()
                    .is_some_and(|word| word.eq_ignore_ascii_case("DELIMITER"))
        })
        .collect();
    body.join("\n")
        .trim()
        .trim_end_matches(|c: char| c == ';' || c == '/' || c == '$' || c.is_whitespace())
        .to_string()
}

/// Executes statements one at a time, reacting to database-reported
/// conflicts according to the configured policy.
pub struct Replayer {
    conflict: ConflictMode,
}

impl Replayer {
    pub fn new(conflict: ConflictMode) -> Self {
        Self { conflict }
    }

    /// Execute one raw statement. Database-reported errors (duplicate key,
    /// already-exists) go through the conflict policy; transport errors
    /// abort regardless.
    pub async fn execute(&self, conn: &mut MySqlConnection, sql: &str) -> Result<()> {
        let cleaned = clean_statement(sql);
        if cleaned.is_empty() {
            return Ok(());
        }
        match sqlx::raw_sql(&cleaned).execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) => match self.conflict {
                ConflictMode::Skip => {
                    warn!(error = %db_err, "conflict occurred, skipping statement");
                    Ok(())
                }
                ConflictMode::Abort => {
                    error!(error = %db_err, "conflict occurred, aborting operation");
                    Err(DbError::ConflictDetected(db_err.to_string()))
                }
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Replay a whole statement sequence inside one transaction. The
    /// transaction commits only if every statement succeeded under the
    /// policy; on the first propagated error it is rolled back.
    ///
    /// MySQL implicitly commits DDL, so earlier DDL statements may survive a
    /// rollback; row data does not.
    pub async fn replay_all<I>(&self, conn: &mut MySqlConnection, statements: I) -> Result<usize>
    where
        I: IntoIterator<Item = Result<String>>,
    {
        use sqlx::Connection;

        let mut tx = conn.begin().await?;
        let mut executed = 0usize;
        for statement in statements {
            let sql = match statement {
                Ok(sql) => sql,
                Err(err) => {
                    tx.rollback().await?;
                    return Err(err);
                }
            };
            if let Err(err) = self.execute(&mut *tx, &sql).await {
                tx.rollback().await?;
                return Err(err);
            }
            executed += 1;
        }
        tx.commit().await?;
        info!(executed, "replay committed");
        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_header_is_stripped() {
        assert_eq!(
            clean_statement("-- Create Users Table\nCREATE TABLE `users` (id INT);"),
            "CREATE TABLE `users` (id INT)"
        );
    }

    #[test]
    fn comment_only_statement_cleans_to_empty() {
        assert_eq!(clean_statement("-- This is a comment"), "");
        assert_eq!(clean_statement(""), "");
    }

    #[test]
    fn delimiter_wrapper_and_terminator_are_stripped() {
        let sql = "-- Create Sp_x Procedure\nDELIMITER ;;\nCREATE PROCEDURE `sp_x`()\nBEGIN\n    SELECT 1;\nEND;;\nDELIMITER ;";
        assert_eq!(
            clean_statement(sql),
            "CREATE PROCEDURE `sp_x`()\nBEGIN\n    SELECT 1;\nEND"
        );
    }

    #[test]
    fn dollar_delimiter_tail_is_stripped() {
        let sql = "DELIMITER $$\nCREATE FUNCTION `f`() RETURNS int\nBEGIN\n    RETURN 1;\nEND\n$$\nDELIMITER ;";
        assert_eq!(
            clean_statement(sql),
            "CREATE FUNCTION `f`() RETURNS int\nBEGIN\n    RETURN 1;\nEND"
        );
    }

    #[test]
    fn insert_statement_keeps_inner_rows() {
        let sql = "-- Insert Into Users Table\nINSERT INTO `users` VALUES\n\t(1, 'user_1'),\n\t(2, 'user_2');";
        assert_eq!(
            clean_statement(sql),
            "INSERT INTO `users` VALUES\n\t(1, 'user_1'),\n\t(2, 'user_2')"
        );
    }

    #[test]
    fn alter_event_statement_cleans_to_executable_form() {
        assert_eq!(
            clean_statement("-- Re-enable Nightly Event\nALTER EVENT `nightly` ENABLE;"),
            "ALTER EVENT `nightly` ENABLE"
        );
    }
}
