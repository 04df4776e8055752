//! Dependency mining: which order objects must be created in.

use indexmap::IndexMap;
use sqlx::mysql::MySqlConnection;
use sqlx::Row;
use tracing::debug;

use crate::error::Result;
use crate::sort::topological_sort;

/// Quote an identifier for interpolation into a SHOW statement.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Base tables ordered so that every referenced parent precedes its
/// children. Foreign keys are mined from the information schema;
/// self-references impose no cross-table ordering and are skipped.
pub async fn tables_sorted(conn: &mut MySqlConnection, db_name: &str) -> Result<Vec<String>> {
    let tables: Vec<String> = sqlx::query(
        "SELECT TABLE_NAME FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
    )
    .bind(db_name)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| row.try_get::<String, _>(0))
    .collect::<std::result::Result<_, _>>()?;

    let fk_rows = sqlx::query(
        "SELECT TABLE_NAME, REFERENCED_TABLE_NAME \
         FROM information_schema.KEY_COLUMN_USAGE \
         WHERE TABLE_SCHEMA = ? AND REFERENCED_TABLE_NAME IS NOT NULL",
    )
    .bind(db_name)
    .fetch_all(&mut *conn)
    .await?;

    let mut deps: IndexMap<String, Vec<String>> = IndexMap::new();
    for row in fk_rows {
        let child: String = row.try_get(0)?;
        let parent: String = row.try_get(1)?;
        if child != parent {
            deps.entry(child).or_default().push(parent);
        }
    }
    for table in &tables {
        deps.entry(table.clone()).or_default();
    }

    let sorted = topological_sort(&deps)?;
    debug!(?sorted, "tables sorted by foreign-key dependencies");
    Ok(sorted)
}

/// Views ordered by textual reference: view A depends on view B when A's
/// CREATE text mentions B's name (backtick-quoted or bare, compared
/// case-insensitively).
///
/// The bare-name comparison is a substring match and can report a false
/// positive when one view's name occurs inside an unrelated token; that only
/// tightens the order, it cannot make it wrong.
pub async fn views_sorted(conn: &mut MySqlConnection, db_name: &str) -> Result<Vec<String>> {
    let views: Vec<String> = sqlx::query(
        "SELECT TABLE_NAME FROM information_schema.VIEWS \
         WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME",
    )
    .bind(db_name)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| row.try_get::<String, _>(0))
    .collect::<std::result::Result<_, _>>()?;

    let mut definitions: IndexMap<String, String> = IndexMap::new();
    for view in &views {
        let row = sqlx::query(&format!("SHOW CREATE VIEW {}", quote_ident(view)))
            .fetch_one(&mut *conn)
            .await?;
        let create: String = row.try_get(1)?;
        definitions.insert(view.clone(), create.to_lowercase());
    }

    let sorted = topological_sort(&textual_dependencies(&definitions))?;
    debug!(?sorted, "views sorted by textual dependencies");
    Ok(sorted)
}

/// Stored functions ordered by the same textual-reference strategy as views.
pub async fn functions_sorted(conn: &mut MySqlConnection, db_name: &str) -> Result<Vec<String>> {
    let functions: Vec<String> = sqlx::query(
        "SELECT ROUTINE_NAME FROM information_schema.ROUTINES \
         WHERE ROUTINE_SCHEMA = ? AND ROUTINE_TYPE = 'FUNCTION' ORDER BY ROUTINE_NAME",
    )
    .bind(db_name)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| row.try_get::<String, _>(0))
    .collect::<std::result::Result<_, _>>()?;

    let mut definitions: IndexMap<String, String> = IndexMap::new();
    for function in &functions {
        let row = sqlx::query(&format!("SHOW CREATE FUNCTION {}", quote_ident(function)))
            .fetch_one(&mut *conn)
            .await?;
        let create: String = row.try_get(2)?;
        definitions.insert(function.clone(), create.to_lowercase());
    }

    let sorted = topological_sort(&textual_dependencies(&definitions))?;
    debug!(?sorted, "functions sorted by textual dependencies");
    Ok(sorted)
}

/// Build a dependency graph from lowercased CREATE texts. Self-references
/// are ignored.
fn textual_dependencies(definitions: &IndexMap<String, String>) -> IndexMap<String, Vec<String>> {
    let mut deps: IndexMap<String, Vec<String>> = IndexMap::new();
    for (name, definition) in definitions {
        let entry = deps.entry(name.clone()).or_default();
        for other in definitions.keys() {
            if other == name {
                continue;
            }
            let lower = other.to_lowercase();
            if definition.contains(&format!("`{lower}`")) || definition.contains(&lower) {
                entry.push(other.clone());
            }
        }
    }
    deps
}
