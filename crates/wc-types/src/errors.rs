use thiserror::Error;

/// Main error type for the predictor
#[derive(Error, Debug)]
pub enum WcError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Trial error: {0}")]
    Trial(#[from] TrialError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Data-related errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid data format in {path}: {message}")]
    InvalidFormat { path: String, message: String },

    #[error("Data parsing error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Unknown team: {team}")]
    UnknownTeam { team: String },

    #[error("Incomplete bracket: {message}")]
    IncompleteBracket { message: String },

    #[error("No actual result recorded for {team}")]
    MissingActual { team: String },
}

/// Errors raised while executing a single trial
#[derive(Error, Debug)]
pub enum TrialError {
    #[error("Model fit failed: {message}")]
    FitFailed { message: String },

    #[error("Worker {worker_id} panicked while running {trial}")]
    WorkerPanicked { worker_id: usize, trial: String },

    #[error("Not enough training data: {message}")]
    InsufficientData { message: String },
}

/// Result type alias for predictor operations
pub type WcResult<T> = Result<T, WcError>;

impl From<csv::Error> for WcError {
    fn from(e: csv::Error) -> Self {
        WcError::Csv(e.to_string())
    }
}

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::WcError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::WcError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::WcError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DataError::ParseError {
            line: 12,
            message: "bad date".to_string(),
        };

        assert!(error.to_string().contains("line 12"));
        assert!(error.to_string().contains("bad date"));
    }

    #[test]
    fn test_error_conversion() {
        let trial_error = TrialError::FitFailed {
            message: "singular".to_string(),
        };
        let wc_error: WcError = trial_error.into();

        match wc_error {
            WcError::Trial(_) => (),
            _ => panic!("Expected Trial error"),
        }
    }

    #[test]
    fn test_macros() {
        let err = config_error!("Missing required field: {}", "training_data_end");
        assert!(matches!(err, WcError::Config(ref m) if m.contains("training_data_end")));
        let _validation_err = validation_error!("Invalid value: {}", 42);
        let _internal_err = internal_error!("Something went wrong");
    }
}
