//! Error types for bulk-load operations.

use std::fmt;

/// The primary error type for all loading operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, authenticate, disconnect)
    Connection(ConnectionError),
    /// Statement execution errors reported by the store
    Query(QueryError),
    /// Protocol errors (wire-level)
    Protocol(ProtocolError),
    /// Record metadata that cannot be turned into a table binding
    Config(ConfigError),
    /// A relationship accessor failed while walking the record graph
    Traversal(TraversalError),
    /// Locally predicted generated ids disagree with the store
    Consistency(ConsistencyError),
    /// A field value that cannot be rendered as text
    Encode(EncodeError),
    /// The loader was used before it was ready (e.g. no connection)
    Precondition(String),
    /// I/O errors
    Io(std::io::Error),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Authentication failed
    Authentication,
    /// Connection lost during operation
    Disconnected,
    /// Connection refused
    Refused,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// The server refused the LOCAL INFILE request
    InfileRejected,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    pub raw_data: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct ConfigError {
    /// Record type whose binding failed.
    pub record: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct TraversalError {
    /// Record type owning the accessor.
    pub record: &'static str,
    /// Relationship (accessor) name, if the failure is tied to one.
    pub relationship: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyError {
    pub table: String,
    /// Highest id handed out (or observed) locally.
    pub expected: i64,
    /// Highest id the store reports after the load.
    pub actual: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeError {
    pub table: String,
    pub column: String,
    pub message: String,
}

/// A recoverable oddity found while encoding a field.
///
/// Warnings never abort a load; they are accumulated on the loader that
/// produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingWarning {
    pub table: String,
    pub column: String,
    pub message: String,
}

impl MappingWarning {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }
}

impl Error {
    /// Shorthand for a binding-time configuration error.
    pub fn config(record: &'static str, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            record,
            message: message.into(),
        })
    }

    /// Shorthand for an accessor failure on `record`.
    pub fn traversal(
        record: &'static str,
        relationship: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Error::Traversal(TraversalError {
            record,
            relationship: relationship.map(str::to_string),
            message: message.into(),
        })
    }

    /// Did the store hand out ids we did not predict?
    pub fn is_consistency_error(&self) -> bool {
        matches!(self, Error::Consistency(_))
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(c) => matches!(
                c.kind,
                ConnectionErrorKind::Connect
                    | ConnectionErrorKind::Authentication
                    | ConnectionErrorKind::Disconnected
                    | ConnectionErrorKind::Refused
            ),
            Error::Protocol(_) | Error::Io(_) => true,
            _ => false,
        }
    }

    /// Get SQLSTATE if available
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Protocol(e) => write!(f, "Protocol error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Traversal(e) => write!(f, "Traversal error: {}", e),
            Error::Consistency(e) => write!(f, "Consistency error: {}", e),
            Error::Encode(e) => write!(f, "Encode error: {}", e),
            Error::Precondition(msg) => write!(f, "Precondition failed: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.record, self.message)
    }
}

impl fmt::Display for TraversalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relationship {
            Some(rel) => write!(f, "{}.{}: {}", self.record, rel, self.message),
            None => write!(f, "{}: {}", self.record, self.message),
        }
    }
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actual {
            Some(actual) => write!(
                f,
                "table '{}' reports generated id {} but {} was predicted; \
                 was the table written to outside this session?",
                self.table, actual, self.expected
            ),
            None => write!(
                f,
                "table '{}' reports no generated id but {} was predicted",
                self.table, self.expected
            ),
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.table, self.column, self.message)
    }
}

impl fmt::Display for MappingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.table, self.column, self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<TraversalError> for Error {
    fn from(err: TraversalError) -> Self {
        Error::Traversal(err)
    }
}

impl From<ConsistencyError> for Error {
    fn from(err: ConsistencyError) -> Self {
        Error::Consistency(err)
    }
}

impl From<EncodeError> for Error {
    fn from(err: EncodeError) -> Self {
        Error::Encode(err)
    }
}

/// Result type alias for loading operations.
pub type Result<T> = std::result::Result<T, Error>;
