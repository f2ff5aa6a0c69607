use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("unrecognized file extension: {0}")]
    Classification(String),

    #[error("missing required tags: {}", .0.join(", "))]
    MissingTags(Vec<String>),

    #[error("biospecimen not found: {0}")]
    BiospecimenNotFound(String),

    #[error("genomic file already registered: {0}")]
    AlreadyRegistered(String),

    #[error("dataservice request failed: {0}")]
    DataserviceHttp(String),

    #[error("dataservice returned status {status}: {message}")]
    DataserviceStatus { status: u16, message: String },

    #[error("bad response from dataservice: {0}")]
    DataserviceResponse(String),

    #[error("object store request failed: {0}")]
    ObjectStore(String),

    #[error("invalid source path: {0}")]
    InvalidSourcePath(String),

    #[error("continuation dispatch failed: {0}")]
    Dispatch(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("missing environment variable {0}")]
    MissingEnv(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("invalid notification payload: {0}")]
    InvalidPayload(String),
}
