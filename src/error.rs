use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArborErrorCode {
    Io,
    Encode,
    Decode,
    Validation,
    InvalidSchema,
    TypeMismatch,
    UnknownField,
    NodeNotFound,
    KeyNotFound,
    DuplicateKey,
    MissingField,
    KeyMismatch,
    MissingDirectory,
    IntegrityError,
}

impl ArborErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ArborErrorCode::Io => "io",
            ArborErrorCode::Encode => "encode",
            ArborErrorCode::Decode => "decode",
            ArborErrorCode::Validation => "validation",
            ArborErrorCode::InvalidSchema => "invalid_schema",
            ArborErrorCode::TypeMismatch => "type_mismatch",
            ArborErrorCode::UnknownField => "unknown_field",
            ArborErrorCode::NodeNotFound => "node_not_found",
            ArborErrorCode::KeyNotFound => "key_not_found",
            ArborErrorCode::DuplicateKey => "duplicate_key",
            ArborErrorCode::MissingField => "missing_field",
            ArborErrorCode::KeyMismatch => "key_mismatch",
            ArborErrorCode::MissingDirectory => "missing_directory",
            ArborErrorCode::IntegrityError => "integrity_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ArborError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
    #[error("type mismatch at '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },
    #[error("unknown field '{field}' in record '{record}'")]
    UnknownField { record: String, field: String },
    #[error("no node at path '{path}'")]
    NodeNotFound { path: String },
    #[error("key '{key}' not found in container '{container}'")]
    KeyNotFound { container: String, key: String },
    #[error("key '{key}' already present in container '{container}'")]
    DuplicateKey { container: String, key: String },
    #[error("field '{field}' missing while loading record '{record}'")]
    MissingField { record: String, field: String },
    #[error("element directory '{dir_name}' holds key '{actual}'")]
    KeyMismatch { dir_name: String, actual: String },
    #[error("container '{container}' has keys but no storage directory")]
    MissingDirectory { container: String },
    #[error("integrity error: {message}")]
    IntegrityError { message: String },
}

impl ArborError {
    pub fn code(&self) -> ArborErrorCode {
        match self {
            ArborError::Io(_) => ArborErrorCode::Io,
            ArborError::Encode(_) => ArborErrorCode::Encode,
            ArborError::Decode(_) => ArborErrorCode::Decode,
            ArborError::Validation(_) => ArborErrorCode::Validation,
            ArborError::InvalidSchema { .. } => ArborErrorCode::InvalidSchema,
            ArborError::TypeMismatch { .. } => ArborErrorCode::TypeMismatch,
            ArborError::UnknownField { .. } => ArborErrorCode::UnknownField,
            ArborError::NodeNotFound { .. } => ArborErrorCode::NodeNotFound,
            ArborError::KeyNotFound { .. } => ArborErrorCode::KeyNotFound,
            ArborError::DuplicateKey { .. } => ArborErrorCode::DuplicateKey,
            ArborError::MissingField { .. } => ArborErrorCode::MissingField,
            ArborError::KeyMismatch { .. } => ArborErrorCode::KeyMismatch,
            ArborError::MissingDirectory { .. } => ArborErrorCode::MissingDirectory,
            ArborError::IntegrityError { .. } => ArborErrorCode::IntegrityError,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}
