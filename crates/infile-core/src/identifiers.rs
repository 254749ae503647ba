//! SQL identifier quoting and validation.
//!
//! Table and column names end up inside `LOAD DATA` and `SELECT MAX(..)`
//! statements, so they are checked when a binding is built and quoted when
//! a statement is rendered.

use std::sync::OnceLock;

use regex::Regex;

/// Quote a SQL identifier using MySQL backtick quoting.
///
/// Embedded backticks are escaped by doubling them.
///
/// # Examples
///
/// ```
/// use infile_core::quote_ident_mysql;
///
/// assert_eq!(quote_ident_mysql("customer"), "`customer`");
/// assert_eq!(quote_ident_mysql("odd`name"), "`odd``name`");
/// ```
#[inline]
pub fn quote_ident_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]{0,63}$").ok())
        .as_ref()
}

/// Is `name` a plain identifier usable as a table or column name?
///
/// Plain means ASCII letters, digits, `_` and `$`, not starting with a
/// digit, at most 64 characters (the MySQL limit).
pub fn is_valid_identifier(name: &str) -> bool {
    match identifier_pattern() {
        Some(re) => re.is_match(name),
        None => false,
    }
}

/// Quote a qualified name such as `schema.table`, part by part.
pub fn quote_qualified_mysql(name: &str) -> String {
    name.split('.')
        .map(quote_ident_mysql)
        .collect::<Vec<_>>()
        .join(".")
}
