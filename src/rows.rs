//! Traced result cursors.

use crate::driver::{Rows, RowsColumnTypeDatabaseTypeName, RowsNextResultSet, Value};
use crate::error::Result;
use crate::span::QuerySpan;

/// A result cursor that owns the span of the query that produced it.
///
/// The span stays open while rows are pulled and ends the first time the
/// cursor reports [`crate::Error::EndOfRows`], is closed, or is dropped.
pub struct TracedRows {
    inner: Box<dyn Rows>,
    span: QuerySpan,
    returned: u64,
}

impl std::fmt::Debug for TracedRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedRows")
            .field("returned", &self.returned)
            .field("ended", &self.span.is_ended())
            .finish_non_exhaustive()
    }
}

impl TracedRows {
    pub(crate) fn new(inner: Box<dyn Rows>, span: QuerySpan) -> Self {
        Self {
            inner,
            span,
            returned: 0,
        }
    }

    fn end_span(&mut self) {
        if !self.span.is_ended() {
            self.span.record_rows_returned(self.returned);
            self.span.end();
        }
    }
}

impl Rows for TracedRows {
    fn columns(&self) -> Vec<String> {
        self.inner.columns()
    }

    fn next(&mut self, dest: &mut [Value]) -> Result<()> {
        let result = self.inner.next(dest);
        match &result {
            Ok(()) => self.returned += 1,
            Err(e) if e.is_end_of_rows() => self.end_span(),
            Err(e) => self.span.record_error(e),
        }
        result
    }

    fn close(&mut self) -> Result<()> {
        let result = self.inner.close();
        if let Err(e) = &result {
            self.span.record_error(e);
        }
        self.end_span();
        result
    }

    fn as_next_result_set(&mut self) -> Option<&mut dyn RowsNextResultSet> {
        self.inner.as_next_result_set()
    }

    fn as_column_type_database_type_name(&self) -> Option<&dyn RowsColumnTypeDatabaseTypeName> {
        self.inner.as_column_type_database_type_name()
    }
}

impl Drop for TracedRows {
    fn drop(&mut self) {
        self.end_span();
    }
}
