use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Missing model: {key}")]
    MissingModel { key: String },

    #[error("Missing field '{field}' on model {model}")]
    MissingField { model: String, field: String },

    #[error("Map field '{field}' on model {model} declared without a value type")]
    MapWithoutValueType { model: String, field: String },

    #[error("Map field '{field}' on model {model} has unsupported value type {value}")]
    UnsupportedMapValue {
        model: String,
        field: String,
        value: String,
    },

    #[error("Cannot resolve {variant} extension from arguments: {}", args.join(", "))]
    UnresolvableExtension { variant: String, args: Vec<String> },

    #[error("Variant mismatch for {model}: expected {expected}")]
    VariantMismatch { model: String, expected: String },

    #[error("No {ref_name} document matches query {query}")]
    NotFound { ref_name: String, query: String },

    #[error("Validation failed for {model}: {}", issues.join("; "))]
    Validation { model: String, issues: Vec<String> },

    #[error("Coercion error on field '{field}': {message}")]
    Coercion { field: String, message: String },

    #[error("Unknown query key '{key}' for {ref_name}")]
    UnknownQuery { ref_name: String, key: String },

    #[error("Unknown sort key '{key}' for {ref_name}")]
    UnknownSort { ref_name: String, key: String },

    #[error("Unknown service method: {name}")]
    UnknownMethod { name: String },

    #[error("Invalid arguments for {method}: expected {expected}, got {got}")]
    InvalidArguments {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl ModelError {
    pub fn missing_model<S: Into<String>>(key: S) -> Self {
        Self::MissingModel { key: key.into() }
    }

    pub fn missing_field<S: Into<String>>(model: S, field: S) -> Self {
        Self::MissingField {
            model: model.into(),
            field: field.into(),
        }
    }

    pub fn map_without_value_type<S: Into<String>>(model: S, field: S) -> Self {
        Self::MapWithoutValueType {
            model: model.into(),
            field: field.into(),
        }
    }

    pub fn unsupported_map_value<S: Into<String>>(model: S, field: S, value: S) -> Self {
        Self::UnsupportedMapValue {
            model: model.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn unresolvable_extension<S: Into<String>>(variant: S, args: Vec<String>) -> Self {
        Self::UnresolvableExtension {
            variant: variant.into(),
            args,
        }
    }

    pub fn variant_mismatch<S: Into<String>>(model: S, expected: S) -> Self {
        Self::VariantMismatch {
            model: model.into(),
            expected: expected.into(),
        }
    }

    pub fn not_found<S: Into<String>>(ref_name: S, query: S) -> Self {
        Self::NotFound {
            ref_name: ref_name.into(),
            query: query.into(),
        }
    }

    pub fn validation<S: Into<String>>(model: S, issues: Vec<String>) -> Self {
        Self::Validation {
            model: model.into(),
            issues,
        }
    }

    pub fn coercion<S: Into<String>>(field: S, message: S) -> Self {
        Self::Coercion {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for request-time misses that callers may recover from.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
