//! Migration script inspection

use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Validate SQL syntax before execution to catch malformed scripts early
///
/// Returns the parser message on failure.
pub fn validate_sql_syntax(sql: &str) -> std::result::Result<(), String> {
    let dialect = DuckDbDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| {
        let msg = e.to_string();
        msg.trim_start_matches("sql parser error: ").to_string()
    })?;
    Ok(())
}

/// True when the script holds nothing but whitespace, comments and `;`
///
/// Such scripts (the generated placeholders) are not sent to the database.
pub fn is_blank(sql: &str) -> bool {
    let dialect = DuckDbDialect {};
    match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => tokens
            .iter()
            .all(|t| matches!(t, Token::Whitespace(_) | Token::SemiColon | Token::EOF)),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_placeholder_is_blank() {
        assert!(is_blank("-- File was generated automatically"));
        assert!(is_blank("\n  /* nothing */ ;\n"));
        assert!(is_blank(""));
    }

    #[test]
    fn test_statement_is_not_blank() {
        assert!(!is_blank("-- create\nCREATE TABLE t (id INTEGER);"));
    }

    #[test]
    fn test_validate_accepts_multi_statement_script() {
        let script = "CREATE TABLE users (id INTEGER, name VARCHAR);\n\
                      INSERT INTO users VALUES (1, 'a');";
        assert!(validate_sql_syntax(script).is_ok());
    }

    #[test]
    fn test_validate_rejects_garbage() {
        let err = validate_sql_syntax("CREATE TABLEE users (id INTEGER);").unwrap_err();
        assert!(!err.starts_with("sql parser error"));
    }
}
