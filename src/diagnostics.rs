//! Extraction of backend diagnostics from arbitrary errors.

use std::error::Error as StdError;
use std::fmt;

use crate::error::{BoxError, DbError};

/// Structured, backend-specific details of a database error.
///
/// Every field is `None` when the backend left it empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub code_name: Option<String>,
    pub code: Option<String>,
    pub table: Option<String>,
    pub constraint: Option<String>,
    pub where_: Option<String>,
    pub column: Option<String>,
}

impl Diagnostics {
    /// Span field names paired with the populated values.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("db.error.detail", &self.detail),
            ("db.error.hint", &self.hint),
            ("db.error.code_name", &self.code_name),
            ("db.error.code", &self.code),
            ("db.error.table", &self.table),
            ("db.error.constraint", &self.constraint),
            ("db.error.where", &self.where_),
            ("db.error.column", &self.column),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
    }
}

impl From<&DbError> for Diagnostics {
    fn from(err: &DbError) -> Self {
        fn non_empty(value: &str) -> Option<String> {
            (!value.is_empty()).then(|| value.to_string())
        }

        Self {
            detail: non_empty(&err.detail),
            hint: non_empty(&err.hint),
            code_name: non_empty(err.code_name()),
            code: non_empty(&err.code),
            table: non_empty(&err.table),
            constraint: non_empty(&err.constraint),
            where_: non_empty(&err.where_),
            column: non_empty(&err.column),
        }
    }
}

/// Errors carrying structured backend diagnostics.
///
/// Implement it for a driver's native error type and return the error through
/// [`crate::Error::diagnosed`] to get its diagnostics onto spans without
/// converting it to [`DbError`].
pub trait Diagnose {
    fn diagnostics(&self) -> Diagnostics;
}

impl Diagnose for DbError {
    fn diagnostics(&self) -> Diagnostics {
        Diagnostics::from(self)
    }
}

/// A driver error paired with the diagnostics it carries.
///
/// Displays as the wrapped error, which stays reachable through
/// [`std::error::Error::source`].
#[derive(Debug)]
pub struct Diagnosed {
    diagnostics: Diagnostics,
    inner: BoxError,
}

impl Diagnosed {
    pub fn new<E>(err: E) -> Self
    where
        E: Diagnose + StdError + Send + Sync + 'static,
    {
        Self {
            diagnostics: err.diagnostics(),
            inner: Box::new(err),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_inner(self) -> BoxError {
        self.inner
    }
}

impl fmt::Display for Diagnosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for Diagnosed {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// Find diagnostics anywhere in the error's source chain.
///
/// Intermediate wrapping layers are unwrapped through
/// [`std::error::Error::source`]. The first [`Diagnosed`] or [`DbError`]
/// found wins; any other error shape yields `None`.
pub fn extract(err: &(dyn StdError + 'static)) -> Option<Diagnostics> {
    std::iter::successors(Some(err), |&e| e.source()).find_map(|e| {
        if let Some(diagnosed) = e.downcast_ref::<Diagnosed>() {
            return Some(diagnosed.diagnostics.clone());
        }
        e.downcast_ref::<DbError>().map(Diagnose::diagnostics)
    })
}

/// Condition name for a SQLSTATE code, or `""` when unknown.
pub fn condition_name(code: &str) -> &'static str {
    match code {
        // Class 00 - Successful Completion
        "00000" => "successful_completion",
        // Class 01 - Warning
        "01000" => "warning",
        // Class 02 - No Data
        "02000" => "no_data",
        // Class 08 - Connection Exception
        "08000" => "connection_exception",
        "08003" => "connection_does_not_exist",
        "08006" => "connection_failure",
        "08001" => "sqlclient_unable_to_establish_sqlconnection",
        "08004" => "sqlserver_rejected_establishment_of_sqlconnection",
        "08007" => "transaction_resolution_unknown",
        "08P01" => "protocol_violation",
        // Class 0A - Feature Not Supported
        "0A000" => "feature_not_supported",
        // Class 21 - Cardinality Violation
        "21000" => "cardinality_violation",
        // Class 22 - Data Exception
        "22000" => "data_exception",
        "22001" => "string_data_right_truncation",
        "22003" => "numeric_value_out_of_range",
        "22007" => "invalid_datetime_format",
        "22008" => "datetime_field_overflow",
        "22012" => "division_by_zero",
        "22023" => "invalid_parameter_value",
        "22P02" => "invalid_text_representation",
        // Class 23 - Integrity Constraint Violation
        "23000" => "integrity_constraint_violation",
        "23001" => "restrict_violation",
        "23502" => "not_null_violation",
        "23503" => "foreign_key_violation",
        "23505" => "unique_violation",
        "23514" => "check_violation",
        "23P01" => "exclusion_violation",
        // Class 25 - Invalid Transaction State
        "25000" => "invalid_transaction_state",
        "25001" => "active_sql_transaction",
        "25P01" => "no_active_sql_transaction",
        "25P02" => "in_failed_sql_transaction",
        "25006" => "read_only_sql_transaction",
        // Class 28 - Invalid Authorization Specification
        "28000" => "invalid_authorization_specification",
        "28P01" => "invalid_password",
        // Class 3D / 3F - Invalid Catalog / Schema Name
        "3D000" => "invalid_catalog_name",
        "3F000" => "invalid_schema_name",
        // Class 40 - Transaction Rollback
        "40000" => "transaction_rollback",
        "40001" => "serialization_failure",
        "40002" => "transaction_integrity_constraint_violation",
        "40003" => "statement_completion_unknown",
        "40P01" => "deadlock_detected",
        // Class 42 - Syntax Error or Access Rule Violation
        "42000" => "syntax_error_or_access_rule_violation",
        "42501" => "insufficient_privilege",
        "42601" => "syntax_error",
        "42701" => "duplicate_column",
        "42702" => "ambiguous_column",
        "42703" => "undefined_column",
        "42704" => "undefined_object",
        "42710" => "duplicate_object",
        "42803" => "grouping_error",
        "42804" => "datatype_mismatch",
        "42883" => "undefined_function",
        "42P01" => "undefined_table",
        "42P07" => "duplicate_table",
        // Class 53 - Insufficient Resources
        "53000" => "insufficient_resources",
        "53100" => "disk_full",
        "53200" => "out_of_memory",
        "53300" => "too_many_connections",
        // Class 54 - Program Limit Exceeded
        "54000" => "program_limit_exceeded",
        // Class 55 - Object Not In Prerequisite State
        "55000" => "object_not_in_prerequisite_state",
        "55006" => "object_in_use",
        "55P03" => "lock_not_available",
        // Class 57 - Operator Intervention
        "57000" => "operator_intervention",
        "57014" => "query_canceled",
        "57P01" => "admin_shutdown",
        "57P02" => "crash_shutdown",
        "57P03" => "cannot_connect_now",
        // Class 58 - System Error
        "58000" => "system_error",
        "58030" => "io_error",
        // Class P0 - PL/pgSQL Error
        "P0000" => "plpgsql_error",
        "P0001" => "raise_exception",
        "P0002" => "no_data_found",
        "P0003" => "too_many_rows",
        // Class XX - Internal Error
        "XX000" => "internal_error",
        "XX001" => "data_corrupted",
        "XX002" => "index_corrupted",
        _ => "",
    }
}
