use cascade_core::{DbError, ErrorLocation, FormattedError, QueryErrorFormatter};
use tokio_postgres::error::SqlState;

/// Translates a `tokio_postgres::Error` into the engine-neutral `DbError`,
/// picking the specific constraint-violation variant from the SQLSTATE class
/// when one applies (§4.9: "unique/foreign-key/not-null get dedicated error
/// variants so application code can match without string-sniffing").
pub fn format_pg_error(error: tokio_postgres::Error, sql: &str, params: Vec<String>) -> DbError {
    let formatted = PostgresErrorFormatter.format_query_error(&error);

    match error.code() {
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => DbError::UniqueViolation(formatted),
        Some(code) if *code == SqlState::FOREIGN_KEY_VIOLATION => {
            DbError::ForeignKeyViolation(formatted)
        }
        Some(code) if *code == SqlState::NOT_NULL_VIOLATION => DbError::NotNullViolation(formatted),
        Some(code) if *code == SqlState::CHECK_VIOLATION || *code == SqlState::EXCLUSION_VIOLATION => {
            DbError::ConstraintViolation(formatted)
        }
        _ => DbError::QueryFailed {
            source: formatted,
            sql: sql.to_string(),
            params,
        },
    }
}

pub struct PostgresErrorFormatter;

impl QueryErrorFormatter for PostgresErrorFormatter {
    fn format_query_error(&self, error: &(dyn std::error::Error + 'static)) -> FormattedError {
        let pg_error = match error.downcast_ref::<tokio_postgres::Error>() {
            Some(e) => e,
            None => return FormattedError::new(error.to_string()),
        };

        let mut formatted = FormattedError::new(pg_error.to_string());
        if let Some(code) = pg_error.code() {
            formatted = formatted.with_code(code.code());
        }

        if let Some(db_error) = pg_error.as_db_error() {
            formatted = FormattedError::new(db_error.message().to_string());
            formatted = formatted.with_code(db_error.code().code());
            if let Some(detail) = db_error.detail() {
                formatted = formatted.with_detail(detail);
            }
            if let Some(hint) = db_error.hint() {
                formatted = formatted.with_hint(hint);
            }

            let mut location = ErrorLocation::new();
            if let Some(schema) = db_error.schema() {
                location = location.with_schema(schema);
            }
            if let Some(table) = db_error.table() {
                location = location.with_table(table);
            }
            if let Some(column) = db_error.column() {
                location = location.with_column(column);
            }
            if let Some(constraint) = db_error.constraint() {
                location = location.with_constraint(constraint);
            }
            if !location.is_empty() {
                formatted = formatted.with_location(location);
            }
        }

        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatter_falls_back_to_display_for_foreign_errors() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let formatted = PostgresErrorFormatter.format_query_error(&io_err);
        assert_eq!(formatted.message, "boom");
    }
}
