use thiserror::Error;

use crate::store::StoreError;

/// Failures while wiring up the pipeline's capabilities.
#[derive(Error, Debug)]
pub enum FitcheckError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_convert_with_context() {
        let err: FitcheckError = StoreError::InvalidTableName("bad-name".into()).into();
        assert!(matches!(err, FitcheckError::Store(_)));
        assert_eq!(
            err.to_string(),
            "Store error: Invalid table name 'bad-name': use letters, digits and underscores"
        );
    }
}
