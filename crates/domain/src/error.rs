use crate::envelope::ErrorKind;

/// Shared error type used across all Wardline crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient stock for supply {supply_id}: have {on_hand}, requested {requested}")]
    StockInsufficient {
        supply_id: String,
        on_hand: i64,
        requested: i64,
    },

    #[error("bed {0} is not available for assignment")]
    BedUnavailable(String),

    #[error("patient {0} is not active")]
    PatientInactive(String),

    #[error("illegal bed transition: {bed_id} cannot go from {from} via {action}")]
    IllegalTransition {
        bed_id: String,
        from: String,
        action: String,
    },

    #[error("tool already registered: {0}")]
    Registration(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("upstream {provider}: {message}")]
    TransientUpstream { provider: String, message: String },

    #[error("upstream {provider} (permanent): {message}")]
    PermanentUpstream { provider: String, message: String },

    #[error("workflow run cancelled")]
    WorkflowCancelled,

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Map this error onto the public envelope taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_)
            | Error::BedUnavailable(_)
            | Error::PatientInactive(_)
            | Error::IllegalTransition { .. }
            | Error::Registration(_) => ErrorKind::Conflict,
            Error::StockInsufficient { .. } => ErrorKind::StockInsufficient,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::TransientUpstream { .. } => ErrorKind::TransientUpstream,
            Error::PermanentUpstream { .. } => ErrorKind::PermanentUpstream,
            Error::WorkflowCancelled => ErrorKind::WorkflowCancelled,
            Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether a retry may succeed without caller changes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::TransientUpstream { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_onto_taxonomy() {
        assert_eq!(
            Error::NotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::BedUnavailable("b1".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            Error::StockInsufficient {
                supply_id: "s1".into(),
                on_hand: 5,
                requested: 7,
            }
            .kind(),
            ErrorKind::StockInsufficient
        );
        assert_eq!(Error::WorkflowCancelled.kind(), ErrorKind::WorkflowCancelled);
    }

    #[test]
    fn transient_classification() {
        assert!(Error::Timeout("llm".into()).is_transient());
        assert!(Error::TransientUpstream {
            provider: "openai".into(),
            message: "429".into()
        }
        .is_transient());
        assert!(!Error::NotFound("p".into()).is_transient());
    }
}
