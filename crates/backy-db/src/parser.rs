//! Streaming SQL statement parser for the MySQL dialect.
//!
//! Splits a byte stream into complete statements, discarding comment and
//! blank lines and honoring the dialect's dynamic `DELIMITER` directive.
//! Memory stays at one line plus the statement being assembled.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::error::{DbError, Result};

const DEFAULT_DELIMITER: &str = ";";

/// Lazy iterator of complete statements, terminator stripped and both ends
/// trimmed.
pub struct StatementParser<R: BufRead> {
    lines: Lines<R>,
    delimiter: String,
    buffer: String,
    in_string: bool,
    pending: VecDeque<String>,
    done: bool,
}

impl StatementParser<BufReader<File>> {
    /// Parse a SQL file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> StatementParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            buffer: String::new(),
            in_string: false,
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Interpret one input line, queueing any statements it completes.
    fn feed_line(&mut self, line: &str) -> Result<()> {
        let trimmed = line.trim();

        // Blank lines and whole-line comments vanish in both states; a
        // DELIMITER directive retargets the terminator at a statement
        // boundary.
        if trimmed.is_empty() || trimmed.starts_with("--") {
            return Ok(());
        }
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            self.in_string = false;
            if let Some(directive) = parse_delimiter_directive(trimmed) {
                self.delimiter = directive?;
                return Ok(());
            }
        }

        let mut rest = line;
        loop {
            match self.scan_terminator(rest) {
                Some(idx) => {
                    self.buffer.push_str(&rest[..idx]);
                    let statement = std::mem::take(&mut self.buffer);
                    let statement = statement.trim();
                    if !statement.is_empty() {
                        self.pending.push_back(statement.to_string());
                    }
                    self.in_string = false;
                    rest = &rest[idx + self.delimiter.len()..];
                }
                None => {
                    self.buffer.push_str(rest);
                    self.buffer.push('\n');
                    return Ok(());
                }
            }
        }
    }

    /// Find the next terminator outside single-quoted strings, tracking the
    /// quote state across calls so strings may span lines.
    fn scan_terminator(&mut self, text: &str) -> Option<usize> {
        let mut i = 0;
        while i < text.len() {
            if !self.in_string && text[i..].starts_with(self.delimiter.as_str()) {
                return Some(i);
            }
            let c = text[i..].chars().next().expect("index is on a char boundary");
            if c == '\'' {
                self.in_string = !self.in_string;
            }
            i += c.len_utf8();
        }
        None
    }
}

impl<R: BufRead> Iterator for StatementParser<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(statement) = self.pending.pop_front() {
                return Some(Ok(statement));
            }
            if self.done {
                return None;
            }
            match self.lines.next() {
                Some(Ok(line)) => {
                    if let Err(err) = self.feed_line(&line) {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
                None => {
                    self.done = true;
                    // Unterminated tail: emit it rather than drop it.
                    let tail = std::mem::take(&mut self.buffer);
                    let tail = tail.trim();
                    if !tail.is_empty() {
                        return Some(Ok(tail.to_string()));
                    }
                    return None;
                }
            }
        }
    }
}

/// Recognise `DELIMITER <token>` (case-insensitive keyword). Returns `None`
/// for lines that are not directives, `Some(Err)` for a directive with no
/// token. An inline `--` comment after the token is discarded.
fn parse_delimiter_directive(trimmed: &str) -> Option<Result<String>> {
    let mut words = trimmed.split_whitespace();
    let keyword = words.next()?;
    if !keyword.eq_ignore_ascii_case("DELIMITER") {
        return None;
    }
    match words.next() {
        Some(token) if !token.starts_with("--") => Some(Ok(token.to_string())),
        _ => Some(Err(DbError::ParseError(format!(
            "malformed DELIMITER directive: {trimmed:?}"
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(input: &str) -> Vec<String> {
        StatementParser::new(Cursor::new(input.to_string()))
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn comments_and_blank_lines_are_dropped() {
        let statements = parse(
            "-- This is a comment\nCREATE DATABASE IF NOT EXISTS `test_db`;\n-- Another comment\n",
        );
        assert_eq!(statements, vec!["CREATE DATABASE IF NOT EXISTS `test_db`"]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n-- Comment line\n\n").is_empty());
    }

    #[test]
    fn delimiter_block_keeps_inner_semicolons() {
        let statements = parse(
            "DELIMITER //\nCREATE PROCEDURE x() BEGIN SELECT 1; END //\nDELIMITER ;\n",
        );
        assert_eq!(
            statements,
            vec!["CREATE PROCEDURE x() BEGIN SELECT 1; END"]
        );
    }

    #[test]
    fn alternative_delimiters_work() {
        let statements = parse(
            "DELIMITER $$\nCREATE TRIGGER t BEFORE INSERT ON x\nFOR EACH ROW BEGIN\nSET NEW.c = 'v';\nEND$$\nDELIMITER ;\n",
        );
        assert_eq!(
            statements,
            vec!["CREATE TRIGGER t BEFORE INSERT ON x\nFOR EACH ROW BEGIN\nSET NEW.c = 'v';\nEND"]
        );
    }

    #[test]
    fn blank_lines_inside_delimiter_block_are_dropped() {
        let statements = parse(
            "DELIMITER //\n\nCREATE PROCEDURE e()\nBEGIN\n\nSELECT 1;\n\nEND //\n\nDELIMITER ;\n",
        );
        assert_eq!(statements, vec!["CREATE PROCEDURE e()\nBEGIN\nSELECT 1;\nEND"]);
    }

    #[test]
    fn multiple_statements_inside_delimiter_block() {
        let statements = parse(
            "DELIMITER //\nCREATE PROCEDURE a()\nBEGIN\nSELECT 1;\nEND //\n//\nCREATE PROCEDURE b()\nBEGIN\nSELECT 2;\nEND //\nDELIMITER ;\n",
        );
        assert_eq!(
            statements,
            vec![
                "CREATE PROCEDURE a()\nBEGIN\nSELECT 1;\nEND",
                "CREATE PROCEDURE b()\nBEGIN\nSELECT 2;\nEND",
            ]
        );
    }

    #[test]
    fn several_statements_on_one_line_are_split() {
        let statements = parse("CREATE TABLE t (id INT); INSERT INTO t (id) VALUES (1);\n");
        assert_eq!(
            statements,
            vec!["CREATE TABLE t (id INT)", "INSERT INTO t (id) VALUES (1)"]
        );
    }

    #[test]
    fn quoted_terminators_do_not_split() {
        let statements = parse("INSERT INTO t VALUES ('a;b');\nINSERT INTO t VALUES ('c');\n");
        assert_eq!(
            statements,
            vec![
                "INSERT INTO t VALUES ('a;b')",
                "INSERT INTO t VALUES ('c')"
            ]
        );
    }

    #[test]
    fn consecutive_directives_override() {
        let statements = parse(
            "DELIMITER //\nDELIMITER $$\nCREATE PROCEDURE x()\nBEGIN\nSELECT 1;\nEND$$\n",
        );
        assert_eq!(statements, vec!["CREATE PROCEDURE x()\nBEGIN\nSELECT 1;\nEND"]);
    }

    #[test]
    fn directive_with_inline_comment() {
        let statements = parse(
            "DELIMITER // -- change delimiter\nCREATE PROCEDURE x()\nBEGIN\nSELECT 1;\nEND //\nDELIMITER ; -- back to normal\n",
        );
        assert_eq!(statements, vec!["CREATE PROCEDURE x()\nBEGIN\nSELECT 1;\nEND"]);
    }

    #[test]
    fn malformed_directive_is_an_error() {
        let result: Result<Vec<_>> =
            StatementParser::new(Cursor::new("DELIMITER\nCREATE TABLE x (id INT);\n")).collect();
        assert!(matches!(result, Err(DbError::ParseError(_))));
    }

    #[test]
    fn statements_are_trimmed() {
        let statements = parse(
            "   -- comment\n   CREATE TABLE t (id INT);\n   INSERT INTO t (id) VALUES (1);\n   ",
        );
        assert_eq!(
            statements,
            vec!["CREATE TABLE t (id INT)", "INSERT INTO t (id) VALUES (1)"]
        );
    }
}
