//! error taxonomy shared by all components
use crate::field_path::PathError;
use crate::resid::ResId;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed or incomplete plugin configuration
    #[error("invalid configuration for {plugin}: {message}")]
    Configuration { plugin: String, message: String },

    /// A selector matched zero documents where exactly one was required, or an ambiguous set
    #[error("selector {selector} matched {count} documents, expected exactly one")]
    Selector { selector: String, count: usize },

    #[error(transparent)]
    Path(#[from] PathError),

    /// A path resolved to a node that does not support the requested operation
    #[error("type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("document {0} already exists")]
    DuplicateIdentity(ResId),

    #[error("document {0} not found")]
    NotFound(ResId),

    /// A reference points at content that does not exist
    #[error("missing reference target: {0}")]
    MissingReferenceTarget(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Binary field family content could not be decoded
    #[error("unable to decode '{path}': {message}")]
    Encoding { path: String, message: String },

    #[error("unable to load {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml error")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error")]
    Json(#[from] serde_json::Error),

    #[error("invalid regular expression")]
    Regex(#[from] regex::Error),
}

impl Error {
    pub(crate) fn configuration(plugin: &str, message: impl std::fmt::Display) -> Self {
        Error::Configuration {
            plugin: plugin.to_string(),
            message: message.to_string(),
        }
    }
}
