//! Dependency-ordered statement extraction from a live MySQL database.
//!
//! The extractor walks the enabled features in the fixed emission order and
//! hands each generated statement to a [`StatementSink`] as soon as it is
//! ready. Row data is streamed off the wire in bounded batches; nothing is
//! buffered per-database or per-table.

use backy_core::{Feature, FeatureToggles, Statement};
use futures::TryStreamExt;
use sqlx::mysql::MySqlConnection;
use sqlx::Row;
use tracing::{info, warn};

use crate::connection::MySqlSession;
use crate::error::{BoxError, DbError, Result};
use crate::sorting::{functions_sorted, quote_ident, tables_sorted, views_sorted};
use crate::values::{decode_row, encode_row};

/// Receives extracted statements one at a time.
pub trait StatementSink {
    fn write(&mut self, statement: Statement) -> std::result::Result<(), BoxError>;
}

impl StatementSink for Vec<Statement> {
    fn write(&mut self, statement: Statement) -> std::result::Result<(), BoxError> {
        self.push(statement);
        Ok(())
    }
}

/// Rows per generated INSERT statement. Bounds the size of any single
/// statement without giving up the one-logical-INSERT-per-table shape for
/// ordinary tables.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Streaming extractor for one database.
pub struct Extractor {
    db_name: String,
    batch_size: usize,
}

impl Extractor {
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run the full extraction for the enabled features.
    ///
    /// In single-file mode every statement is tagged `full` and the file
    /// preamble is emitted once, up front. In multiple-files mode each
    /// feature is tagged with its own name and restarts with the preamble,
    /// emitted lazily so that empty features produce no output at all.
    pub async fn backup(
        &self,
        session: &mut MySqlSession,
        features: &FeatureToggles,
        multiple_files: bool,
        sink: &mut dyn StatementSink,
    ) -> Result<()> {
        let enabled = features.enabled();
        info!(features = ?enabled, multiple_files, "starting extraction");

        if multiple_files {
            for feature in enabled {
                let mut tagged = TaggedSink::lazy(&mut *sink, feature, self.preamble());
                self.stream_feature(feature, session.connection(), &mut tagged)
                    .await?;
            }
        } else {
            let mut tagged = TaggedSink::lazy(sink, Feature::Full, self.preamble());
            tagged.flush_preamble()?;
            for feature in enabled {
                self.stream_feature(feature, session.connection(), &mut tagged)
                    .await?;
            }
        }
        Ok(())
    }

    fn preamble(&self) -> Vec<String> {
        let db = quote_ident(&self.db_name);
        vec![
            format!("CREATE DATABASE IF NOT EXISTS {db};"),
            format!("USE {db};"),
        ]
    }

    async fn stream_feature(
        &self,
        feature: Feature,
        conn: &mut MySqlConnection,
        sink: &mut TaggedSink<'_>,
    ) -> Result<()> {
        let result = match feature {
            Feature::Tables => self.stream_tables(conn, sink).await,
            Feature::Data => self.stream_data(conn, sink).await,
            Feature::Views => self.stream_views(conn, sink).await,
            Feature::Functions => self.stream_functions(conn, sink).await,
            Feature::Procedures => self.stream_procedures(conn, sink).await,
            Feature::Triggers => self.stream_triggers(conn, sink).await,
            Feature::Events => self.stream_events(conn, sink).await,
            Feature::Full => Ok(()),
        };
        result.map_err(|err| match err {
            sink_err @ DbError::Sink(_) => sink_err,
            other => DbError::extraction(feature, other),
        })
    }

    async fn stream_tables(
        &self,
        conn: &mut MySqlConnection,
        sink: &mut TaggedSink<'_>,
    ) -> Result<()> {
        for table in tables_sorted(conn, &self.db_name).await? {
            let row = sqlx::query(&format!("SHOW CREATE TABLE {}", quote_ident(&table)))
                .fetch_one(&mut *conn)
                .await?;
            let create: String = row.try_get(1)?;
            sink.emit(table_statement(&table, &create))?;
        }
        Ok(())
    }

    async fn stream_data(
        &self,
        conn: &mut MySqlConnection,
        sink: &mut TaggedSink<'_>,
    ) -> Result<()> {
        for table in tables_sorted(conn, &self.db_name).await? {
            let select = format!("SELECT * FROM {}", quote_ident(&table));
            let mut batch: Vec<String> = Vec::new();
            let mut emitted = false;
            {
                let mut rows = sqlx::query(&select).fetch(&mut *conn);
                while let Some(row) = rows.try_next().await? {
                    let values = decode_row(&row)?;
                    batch.push(format!("({})", encode_row(&values)));
                    if batch.len() >= self.batch_size {
                        let tuples = std::mem::take(&mut batch);
                        sink.emit(insert_statement(&table, &tuples))?;
                        emitted = true;
                    }
                }
            }
            if !batch.is_empty() {
                sink.emit(insert_statement(&table, &batch))?;
            } else if !emitted {
                warn!(table = %table, "table has no rows, skipping data statements");
            }
        }
        Ok(())
    }

    async fn stream_views(
        &self,
        conn: &mut MySqlConnection,
        sink: &mut TaggedSink<'_>,
    ) -> Result<()> {
        for view in views_sorted(conn, &self.db_name).await? {
            let row = sqlx::query(&format!("SHOW CREATE VIEW {}", quote_ident(&view)))
                .fetch_one(&mut *conn)
                .await?;
            let create: String = row.try_get(1)?;
            sink.emit(view_statement(&view, &create))?;
        }
        Ok(())
    }

    async fn stream_functions(
        &self,
        conn: &mut MySqlConnection,
        sink: &mut TaggedSink<'_>,
    ) -> Result<()> {
        for function in functions_sorted(conn, &self.db_name).await? {
            let row = sqlx::query(&format!("SHOW CREATE FUNCTION {}", quote_ident(&function)))
                .fetch_one(&mut *conn)
                .await?;
            let create: String = row.try_get(2)?;
            sink.emit(routine_statement("Function", &function, &create))?;
        }
        Ok(())
    }

    async fn stream_procedures(
        &self,
        conn: &mut MySqlConnection,
        sink: &mut TaggedSink<'_>,
    ) -> Result<()> {
        let procedures: Vec<String> = sqlx::query(
            "SELECT ROUTINE_NAME FROM information_schema.ROUTINES \
             WHERE ROUTINE_SCHEMA = ? AND ROUTINE_TYPE = 'PROCEDURE'",
        )
        .bind(&self.db_name)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|row| row.try_get::<String, _>(0))
        .collect::<std::result::Result<_, _>>()?;

        for procedure in procedures {
            let row = sqlx::query(&format!(
                "SHOW CREATE PROCEDURE {}",
                quote_ident(&procedure)
            ))
            .fetch_one(&mut *conn)
            .await?;
            let create: String = row.try_get(2)?;
            sink.emit(routine_statement("Procedure", &procedure, &create))?;
        }
        Ok(())
    }

    async fn stream_triggers(
        &self,
        conn: &mut MySqlConnection,
        sink: &mut TaggedSink<'_>,
    ) -> Result<()> {
        let triggers: Vec<String> = sqlx::query(
            "SELECT TRIGGER_NAME FROM information_schema.TRIGGERS WHERE TRIGGER_SCHEMA = ?",
        )
        .bind(&self.db_name)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|row| row.try_get::<String, _>(0))
        .collect::<std::result::Result<_, _>>()?;

        for trigger in triggers {
            let row = sqlx::query(&format!("SHOW CREATE TRIGGER {}", quote_ident(&trigger)))
                .fetch_one(&mut *conn)
                .await?;
            let create: String = row.try_get(2)?;
            sink.emit(routine_statement("Trigger", &trigger, &create))?;
        }
        Ok(())
    }

    /// Events are emitted disabled so they cannot fire mid-restore; a
    /// trailer re-enables exactly the ones that were enabled at backup time.
    async fn stream_events(
        &self,
        conn: &mut MySqlConnection,
        sink: &mut TaggedSink<'_>,
    ) -> Result<()> {
        let events: Vec<(String, String)> = sqlx::query(
            "SELECT EVENT_NAME, STATUS FROM information_schema.EVENTS WHERE EVENT_SCHEMA = ?",
        )
        .bind(&self.db_name)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|row| {
            Ok::<_, sqlx::Error>((row.try_get::<String, _>(0)?, row.try_get::<String, _>(1)?))
        })
        .collect::<std::result::Result<_, _>>()?;

        let mut originally_enabled = Vec::new();
        for (event, status) in &events {
            let row = sqlx::query(&format!("SHOW CREATE EVENT {}", quote_ident(event)))
                .fetch_one(&mut *conn)
                .await?;
            let create: String = row.try_get(3)?;
            if status == "ENABLED" {
                originally_enabled.push(event.clone());
            }
            let disabled = disable_first_enable(&create);
            sink.emit(routine_statement("Event", event, &disabled))?;
        }
        for event in originally_enabled {
            sink.emit(enable_statement(&event))?;
        }
        Ok(())
    }
}

/// Tags statements with their feature and prepends the file preamble ahead
/// of the first real statement.
struct TaggedSink<'a> {
    inner: &'a mut dyn StatementSink,
    tag: Feature,
    preamble: Option<Vec<String>>,
}

impl<'a> TaggedSink<'a> {
    fn lazy(inner: &'a mut dyn StatementSink, tag: Feature, preamble: Vec<String>) -> Self {
        Self {
            inner,
            tag,
            preamble: Some(preamble),
        }
    }

    fn flush_preamble(&mut self) -> Result<()> {
        if let Some(preamble) = self.preamble.take() {
            for sql in preamble {
                self.inner
                    .write(Statement::new(self.tag, sql))
                    .map_err(DbError::Sink)?;
            }
        }
        Ok(())
    }

    fn emit(&mut self, sql: String) -> Result<()> {
        self.flush_preamble()?;
        self.inner
            .write(Statement::new(self.tag, sql))
            .map_err(DbError::Sink)
    }
}

/// First character uppercased, the rest lowered, as used in the generated
/// comment headers.
fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn table_statement(name: &str, create: &str) -> String {
    format!("-- Create {} Table\n{create};", capitalize(name))
}

fn view_statement(name: &str, create: &str) -> String {
    format!("-- Create {} view\n{create};", capitalize(name))
}

fn routine_statement(kind: &str, name: &str, create: &str) -> String {
    format!(
        "-- Create {} {kind}\nDELIMITER ;;\n{create};;\nDELIMITER ;",
        capitalize(name)
    )
}

fn insert_statement(table: &str, tuples: &[String]) -> String {
    format!(
        "-- Insert Into {} Table\nINSERT INTO {} VALUES\n\t{};",
        capitalize(table),
        quote_ident(table),
        tuples.join(",\n\t")
    )
}

fn enable_statement(event: &str) -> String {
    format!(
        "-- Re-enable {} Event\nALTER EVENT {} ENABLE;",
        capitalize(event),
        quote_ident(event)
    )
}

/// Rewrite the first standalone `ENABLE` keyword to `DISABLE`.
fn disable_first_enable(create: &str) -> String {
    let bytes = create.as_bytes();
    let mut start = 0;
    while let Some(pos) = create[start..].find("ENABLE") {
        let begin = start + pos;
        let end = begin + "ENABLE".len();
        let before_ok = begin == 0 || !is_word_byte(bytes[begin - 1]);
        let after_ok = end == create.len() || !is_word_byte(bytes[end]);
        if before_ok && after_ok {
            return format!("{}DISABLE{}", &create[..begin], &create[end..]);
        }
        start = end;
    }
    create.to_string()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
