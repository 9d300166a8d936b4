//! Error recovery policy for a research run.
//!
//! A run distinguishes three kinds of failure. Configuration problems are
//! fatal and surface before any network call. Collection problems (one
//! community, one post's comments, one malformed item) are skipped so the
//! rest of the run continues. Derivation problems (sentiment scoring,
//! price extraction) fall back to a neutral value so the record is kept.

use crate::{CoreError, ErrorExt, ErrorReporter};

/// Recovery strategy for handling errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Abort the run
    Fail,
    /// Drop the current unit of work and continue with the next one
    Skip,
    /// Substitute a neutral default and keep going
    Fallback,
}

/// Result of an error recovery attempt
#[derive(Debug)]
pub enum RecoveryResult<T> {
    /// The operation succeeded
    Recovered(T),
    /// The operation failed and a default value took its place
    Degraded(T),
    /// The unit of work should be skipped
    Skipped,
    /// The error must be propagated
    Failed(CoreError),
}

impl<T> RecoveryResult<T> {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryResult::Recovered(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RecoveryResult::Degraded(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RecoveryResult::Skipped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RecoveryResult::Failed(_))
    }

    /// Returns the value if recovered or degraded
    pub fn value(self) -> Option<T> {
        match self {
            RecoveryResult::Recovered(value) | RecoveryResult::Degraded(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the error if failed, None otherwise
    pub fn err(self) -> Option<CoreError> {
        match self {
            RecoveryResult::Failed(error) => Some(error),
            _ => None,
        }
    }
}

pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        match error {
            // Needs operator intervention
            CoreError::Config(_) => RecoveryStrategy::Fail,

            // A single fetch went wrong; the remaining communities are still worth reading
            CoreError::RedditApi(_)
            | CoreError::Network(_)
            | CoreError::Timeout { .. }
            | CoreError::RateLimited { .. }
            | CoreError::NotFound { .. }
            | CoreError::InvalidInput { .. }
            | CoreError::Serialization(_) => RecoveryStrategy::Skip,

            CoreError::Derivation { .. } => RecoveryStrategy::Fallback,

            // Output problems leave the run incomplete
            CoreError::Export(_) | CoreError::Io(_) | CoreError::Internal { .. } => {
                RecoveryStrategy::Fail
            }
        }
    }

    /// Apply the recovery policy to the outcome of one unit of work.
    ///
    /// Every recovered error goes through the reporter so nothing is dropped
    /// silently.
    pub fn apply<T>(
        result: Result<T, CoreError>,
        fallback: impl FnOnce() -> T,
        reporter: &ErrorReporter,
    ) -> RecoveryResult<T> {
        let error = match result {
            Ok(value) => return RecoveryResult::Recovered(value),
            Err(error) => error,
        };

        match Self::determine_strategy(&error) {
            RecoveryStrategy::Fail => RecoveryResult::Failed(error),
            RecoveryStrategy::Skip => {
                reporter.report_error(&error);
                RecoveryResult::Skipped
            }
            RecoveryStrategy::Fallback => {
                reporter.report_warning(&error);
                tracing::debug!("Using fallback after {}", error.error_code());
                RecoveryResult::Degraded(fallback())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfigError, RedditApiError};
    use std::io;

    fn quiet() -> ErrorReporter {
        ErrorReporter::new()
            .with_error_reporting(false)
            .with_warning_reporting(false)
    }

    #[test]
    fn test_determine_strategy() {
        let config_error = CoreError::Config(ConfigError::MissingField {
            field: "client_id".to_string(),
        });
        assert_eq!(
            ErrorRecovery::determine_strategy(&config_error),
            RecoveryStrategy::Fail
        );

        let api_error = CoreError::RedditApi(RedditApiError::RequestTimeout);
        assert_eq!(
            ErrorRecovery::determine_strategy(&api_error),
            RecoveryStrategy::Skip
        );

        let derivation = CoreError::Derivation {
            operation: "sentiment".to_string(),
            reason: "empty lexicon".to_string(),
        };
        assert_eq!(
            ErrorRecovery::determine_strategy(&derivation),
            RecoveryStrategy::Fallback
        );

        let io_error = CoreError::Io(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert_eq!(
            ErrorRecovery::determine_strategy(&io_error),
            RecoveryStrategy::Fail
        );
    }

    #[test]
    fn test_skip_strategy() {
        let result: RecoveryResult<Vec<u8>> = ErrorRecovery::apply(
            Err(CoreError::RedditApi(RedditApiError::SubredditNotFound {
                subreddit: "gone".to_string(),
            })),
            Vec::new,
            &quiet(),
        );
        assert!(result.is_skipped());
    }

    #[test]
    fn test_fallback_strategy() {
        let result = ErrorRecovery::apply(
            Err(CoreError::Derivation {
                operation: "sentiment".to_string(),
                reason: "bad input".to_string(),
            }),
            || 0.0_f64,
            &quiet(),
        );
        assert!(result.is_degraded());
        assert_eq!(result.value(), Some(0.0));
    }

    #[test]
    fn test_fail_strategy_propagates() {
        let result: RecoveryResult<()> = ErrorRecovery::apply(
            Err(CoreError::Config(ConfigError::PlaceholderCredential {
                var_name: "REDDIT_CLIENT_ID".to_string(),
            })),
            || (),
            &quiet(),
        );
        assert!(result.is_failed());
        assert!(matches!(result.err(), Some(CoreError::Config(_))));
    }

    #[test]
    fn test_success_is_recovered() {
        let result = ErrorRecovery::apply(Ok(7), || 0, &quiet());
        assert!(result.is_recovered());
        assert_eq!(result.value(), Some(7));
    }
}
