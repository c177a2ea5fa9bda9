//! SQL script parsing: placeholder substitution, checksums and statement
//! splitting.

use std::collections::HashMap;

/// One executable statement within a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    /// 1-based line number of the statement's first token within the script.
    pub line: u32,
    /// Statement text, without the trailing delimiter.
    pub sql: String,
}

/// A parsed SQL migration script.
#[derive(Debug, Clone)]
pub struct SqlScript {
    /// Statements in execution order.
    pub statements: Vec<SqlStatement>,
    /// CRC-32 checksum over the script's lines.
    pub checksum: u32,
}

impl SqlScript {
    /// Parse script text that has already had placeholders applied.
    pub fn parse(text: &str) -> Self {
        Self {
            statements: split_statements(text),
            checksum: checksum(text),
        }
    }
}

/// Substitute `${key}` placeholders in script text.
///
/// Applied before both checksum computation and execution, so a placeholder
/// value change is indistinguishable from a script edit.
pub fn apply_placeholders(text: &str, placeholders: &HashMap<String, String>) -> String {
    let mut out = text.to_string();
    for (key, value) in placeholders {
        out = out.replace(&format!("${{{key}}}"), value);
    }
    out
}

/// CRC-32 over the script's lines.
///
/// Hashing line contents rather than raw bytes makes the checksum
/// independent of line endings, while any literal content change is
/// detected as drift.
pub fn checksum(text: &str) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for line in text.lines() {
        hasher.update(line.as_bytes());
    }
    hasher.finalize()
}

/// Split script text into statements on top-level `;` delimiters.
///
/// Delimiters inside single-quoted literals (with `''` escapes), `--` line
/// comments and `/* */` block comments do not terminate a statement.
/// Comments preceding a statement's first token are not part of it, so the
/// recorded line number and text point at the token itself.
fn split_statements(text: &str) -> Vec<SqlStatement> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut start_line: Option<u32> = None;
    let mut line: u32 = 1;

    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while let Some(ch) = chars.next() {
        if ch == '\n' {
            line += 1;
        }

        if in_line_comment {
            if start_line.is_some() {
                current.push(ch);
            }
            if ch == '\n' {
                in_line_comment = false;
            }
            continue;
        }

        if in_block_comment {
            if start_line.is_some() {
                current.push(ch);
            }
            if ch == '*' && chars.peek() == Some(&'/') {
                let close = chars.next().unwrap();
                if start_line.is_some() {
                    current.push(close);
                }
                in_block_comment = false;
            }
            continue;
        }

        if in_string {
            current.push(ch);
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    // Escaped quote inside the literal.
                    current.push(chars.next().unwrap());
                } else {
                    in_string = false;
                }
            }
            continue;
        }

        match ch {
            '\'' => {
                start_line.get_or_insert(line);
                current.push(ch);
                in_string = true;
            }
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                if start_line.is_some() {
                    current.push_str("--");
                }
                in_line_comment = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                if start_line.is_some() {
                    current.push_str("/*");
                }
                in_block_comment = true;
            }
            ';' => {
                push_statement(&mut statements, &mut current, &mut start_line);
            }
            _ if ch.is_whitespace() => {
                if start_line.is_some() {
                    current.push(ch);
                }
            }
            _ => {
                start_line.get_or_insert(line);
                current.push(ch);
            }
        }
    }

    push_statement(&mut statements, &mut current, &mut start_line);
    statements
}

fn push_statement(
    statements: &mut Vec<SqlStatement>,
    current: &mut String,
    start_line: &mut Option<u32>,
) {
    let sql = current.trim_end();
    if let Some(line) = start_line.take()
        && !sql.is_empty()
    {
        statements.push(SqlStatement {
            line,
            sql: sql.to_string(),
        });
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_stable_across_line_endings() {
        let unix = "CREATE TABLE t (id INT);\nSELECT 1;\n";
        let dos = "CREATE TABLE t (id INT);\r\nSELECT 1;\r\n";
        assert_eq!(checksum(unix), checksum(dos));
    }

    #[test]
    fn test_checksum_detects_content_change() {
        let a = checksum("CREATE TABLE t (id INT);");
        let b = checksum("CREATE TABLE t (id BIGINT);");
        assert_ne!(a, b);

        // Even a single-character comment change counts as drift.
        let c = checksum("-- comment\nSELECT 1;");
        let d = checksum("-- Comment\nSELECT 1;");
        assert_ne!(c, d);
    }

    #[test]
    fn test_split_basic() {
        let script = SqlScript::parse("CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);");
        assert_eq!(script.statements.len(), 2);
        assert_eq!(script.statements[0].line, 1);
        assert_eq!(script.statements[1].line, 2);
        assert_eq!(script.statements[1].sql, "CREATE TABLE b (id INT)");
    }

    #[test]
    fn test_split_semicolon_within_string_literal() {
        let text = "INSERT INTO test_user (name) VALUES ('Mr. Semicolon+Linebreak;\nanother line');\nSELECT 1;";
        let script = SqlScript::parse(text);
        assert_eq!(script.statements.len(), 2);
        assert!(script.statements[0].sql.contains("Semicolon+Linebreak;"));
        assert_eq!(script.statements[1].line, 3);
    }

    #[test]
    fn test_split_escaped_quote() {
        let script = SqlScript::parse("INSERT INTO t (s) VALUES ('it''s; fine');");
        assert_eq!(script.statements.len(), 1);
        assert!(script.statements[0].sql.contains("it''s; fine"));
    }

    #[test]
    fn test_split_ignores_comments() {
        let text = "-- leading; comment\nCREATE TABLE a (id INT);\n/* block; comment */\nSELECT 1;";
        let script = SqlScript::parse(text);
        assert_eq!(script.statements.len(), 2);
        assert_eq!(script.statements[0].line, 2);
        assert_eq!(script.statements[0].sql, "CREATE TABLE a (id INT)");
        assert_eq!(script.statements[1].sql, "SELECT 1");
    }

    #[test]
    fn test_statement_line_numbers() {
        let mut text = String::new();
        for i in 0..20 {
            text.push_str(&format!("-- filler {i}\n"));
        }
        text.push_str("THIS IS NOT VALID SQL;\n");
        let script = SqlScript::parse(&text);
        let last = script.statements.last().unwrap();
        assert_eq!(last.line, 21);
        assert_eq!(last.sql, "THIS IS NOT VALID SQL");
    }

    #[test]
    fn test_apply_placeholders() {
        let mut placeholders = HashMap::new();
        placeholders.insert("tableName".to_string(), "\"before_the_error\"".to_string());
        let out = apply_placeholders("CREATE TABLE ${tableName} (id INT);", &placeholders);
        assert_eq!(out, "CREATE TABLE \"before_the_error\" (id INT);");
    }

    #[test]
    fn test_placeholder_changes_checksum() {
        let mut a = HashMap::new();
        a.insert("name".to_string(), "x".to_string());
        let mut b = HashMap::new();
        b.insert("name".to_string(), "y".to_string());
        let text = "CREATE TABLE ${name} (id INT);";
        assert_ne!(
            checksum(&apply_placeholders(text, &a)),
            checksum(&apply_placeholders(text, &b))
        );
    }
}
