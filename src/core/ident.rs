//! Identifier checks for names that end up inside query text.
//!
//! Path parameters are embedded into `SELECT * FROM ...` statements, so each
//! one is matched against the naming rules of its store before quoting.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Project ids, optionally domain-scoped (`example.com:my-project`).
    static ref PROJECT_ID: Regex =
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9.:_\-]{0,126}[A-Za-z0-9])?$").unwrap();
    static ref DATASET_ID: Regex = Regex::new(r"^[A-Za-z0-9_]{1,1024}$").unwrap();
    static ref TABLE_ID: Regex = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_\-$]{0,1023}$").unwrap();
    // Optionally schema-qualified SQL table name.
    static ref SQL_TABLE: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]{0,63}(?:\.[A-Za-z_][A-Za-z0-9_$]{0,63})?$").unwrap();
    static ref SQL_NAME: Regex = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_\-$]{0,127}$").unwrap();
}

pub fn is_project_id(value: &str) -> bool {
    PROJECT_ID.is_match(value)
}

pub fn is_dataset_id(value: &str) -> bool {
    DATASET_ID.is_match(value)
}

pub fn is_table_id(value: &str) -> bool {
    TABLE_ID.is_match(value)
}

pub fn is_sql_table(value: &str) -> bool {
    SQL_TABLE.is_match(value)
}

/// Instance and database names of a managed SQL target.
pub fn is_sql_name(value: &str) -> bool {
    SQL_NAME.is_match(value)
}

/// Quote each dot-separated part with `quote`.
pub fn quote_parts(name: &str, quote: char) -> String {
    name.split('.')
        .map(|part| format!("{quote}{part}{quote}"))
        .collect::<Vec<_>>()
        .join(".")
}
