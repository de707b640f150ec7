use thiserror::Error;

/// Errors raised by sessions, the dense backend and the collaborators.
///
/// Every error is terminal for the call that raised it; nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("session has to train a model before it can render an anonymous plot")]
    InstanceNotTrainedYet,

    #[error("no model could be retrieved for prediction")]
    NoPredictionModel,

    #[error("no model could be retrieved for aggregation")]
    NoAggregationModel,

    #[error("input value {index} is not a finite number")]
    IncorrectInputType { index: usize },

    #[error("no model was found for this prediction")]
    NoModelAvailable,

    #[error("model \"{model}\" expects {expected} inputs but got {actual}")]
    BadInput {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("config for model '{model}' does not exist and no fallback was provided")]
    ConfigLookupFailure { model: String },

    #[error("symmetric dense stack could not be generated: {0}")]
    DnnGenerator(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Stable taxonomy name of the error, independent of its message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InstanceNotTrainedYet => "InstanceNotTrainedYet",
            Error::NoPredictionModel => "NoPredictionModel",
            Error::NoAggregationModel => "NoAggregationModel",
            Error::IncorrectInputType { .. } => "IncorrectInputType",
            Error::NoModelAvailable => "NoModelAvailable",
            Error::BadInput { .. } => "BadInput",
            Error::ConfigLookupFailure { .. } => "ConfigLookupFailure",
            Error::DnnGenerator(_) => "DNNGeneratorException",
            Error::InvalidData(_) => "InvalidData",
            Error::InvalidConfig(_) => "InvalidConfig",
            Error::InvalidShape(_) => "InvalidShape",
            Error::Store(_) => "Store",
            Error::Io(_) => "Io",
            Error::Json(_) => "Json",
            Error::Csv(_) => "Csv",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
