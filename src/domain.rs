use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

pub type TagSet = BTreeMap<String, String>;

pub const TAG_GF_ID: &str = "gf_id";
pub const TAG_STUDY_ID: &str = "study_id";
pub const TAG_BS_ID: &str = "bs_id";
pub const TAG_SOURCE_PATH: &str = "cavatica_source_path";

pub const REQUIRED_TAGS: [&str; 6] = [
    "cavatica_harmonized_file",
    "cavatica_source_file",
    "cavatica_app",
    TAG_BS_ID,
    TAG_SOURCE_PATH,
    "cavatica_task",
];

pub const HARMONIZED_PREFIX: &str = "harmonized/";
pub const AVAILABILITY: &str = "Immediate Download";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "eTag", default)]
    pub e_tag: String,
    #[serde(rename = "versionId", default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

impl NotificationRecord {
    pub fn new(bucket: &str, key: &str, size: u64, e_tag: &str) -> Self {
        Self {
            s3: S3Entity {
                bucket: BucketRef {
                    name: bucket.to_string(),
                    arn: Some(format!("arn:aws:s3:::{bucket}")),
                },
                object: ObjectRef {
                    key: key.to_string(),
                    size,
                    e_tag: unquote_etag(e_tag).to_string(),
                    version_id: None,
                },
            },
        }
    }

    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    pub fn key(&self) -> &str {
        &self.s3.object.key
    }

    pub fn location(&self) -> String {
        format!("{}/{}", self.bucket(), self.key())
    }
}

pub fn unquote_etag(e_tag: &str) -> &str {
    e_tag.trim_matches('"')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomicFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kf_id: Option<String>,
    pub file_name: String,
    pub file_format: String,
    pub data_type: String,
    pub availability: String,
    pub controlled_access: bool,
    pub is_harmonized: bool,
    pub hashes: BTreeMap<String, String>,
    pub size: u64,
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biospecimen_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Study {
    pub kf_id: String,
    pub external_id: Option<String>,
}

impl Study {
    pub fn acl(&self) -> Vec<String> {
        let mut acl = vec![self.kf_id.clone()];
        if let Some(external_id) = &self.external_id {
            acl.push(external_id.clone());
        }
        acl
    }
}

/// Derives the study code from a study bucket name.
///
/// `kf-study-us-east-1-dev-sd-9pyzahhe` becomes `SD_9PYZAHHE`.
pub fn study_id_from_bucket(bucket: &str) -> String {
    let mut parts = bucket.rsplitn(3, '-');
    let suffix = parts.next().unwrap_or_default();
    match parts.next() {
        Some(prefix) => format!("{prefix}_{suffix}").to_uppercase(),
        None => suffix.to_uppercase(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

impl FromStr for SourcePath {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let trimmed = trimmed.strip_prefix("s3://").unwrap_or(trimmed);
        let (bucket, key) = trimmed
            .split_once('/')
            .ok_or_else(|| RegistryError::InvalidSourcePath(value.to_string()))?;
        if bucket.is_empty() || key.is_empty() {
            return Err(RegistryError::InvalidSourcePath(value.to_string()));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Imported,
    AlreadyImported,
    Skipped,
    Failed(String),
}

impl From<RegistryError> for Outcome {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyRegistered(_) => Outcome::AlreadyImported,
            other => Outcome::Failed(other.to_string()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Imported => write!(f, "imported"),
            Outcome::AlreadyImported => write!(f, "already imported"),
            Outcome::Skipped => write!(f, "skipped"),
            Outcome::Failed(reason) => write!(f, "{reason}"),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub harmonized: Outcome,
    pub source: Outcome,
}

pub type BatchResult = BTreeMap<String, RecordOutcome>;
