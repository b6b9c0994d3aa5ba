use cascade_core::{DbError, FormattedError, QueryErrorFormatter};
use mongodb::error::Error as MongoError;

const DUPLICATE_KEY_CODES: [i32; 2] = [11000, 11001];

/// Translates a `mongodb::error::Error` into the engine-neutral `DbError`,
/// picking the dedicated constraint-violation variant for a duplicate-key
/// write error the same way the Postgres driver dispatches on SQLSTATE
/// (§4.9; error code 11000/11001 is Mongo's unique-index violation).
pub fn format_mongo_error(error: MongoError) -> DbError {
    let formatted = MongoErrorFormatter.format_query_error(&error);

    if is_duplicate_key(&error) {
        return DbError::UniqueViolation(formatted);
    }

    DbError::QueryFailed {
        source: formatted,
        sql: String::new(),
        params: Vec::new(),
    }
}

/// Mongo's write-error codes are buried in a handful of differently-shaped
/// `ErrorKind` variants depending on which command failed; matching on the
/// rendered message for the well-known code is more robust than chasing the
/// kind enum through every driver version.
fn is_duplicate_key(error: &MongoError) -> bool {
    let message = error.to_string();
    DUPLICATE_KEY_CODES.iter().any(|code| message.contains(&code.to_string()))
}

pub struct MongoErrorFormatter;

impl QueryErrorFormatter for MongoErrorFormatter {
    fn format_query_error(&self, error: &(dyn std::error::Error + 'static)) -> FormattedError {
        let mongo_error = match error.downcast_ref::<MongoError>() {
            Some(e) => e,
            None => return FormattedError::new(error.to_string()),
        };

        FormattedError::new(mongo_error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatter_falls_back_to_display_for_foreign_errors() {
        let io_err = std::io::Error::other("boom");
        let formatted = MongoErrorFormatter.format_query_error(&io_err);
        assert_eq!(formatted.message, "boom");
    }
}
