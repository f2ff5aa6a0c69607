use std::future::Future;

use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::{Tag, Tagging};
use tokio::runtime::Handle;

use crate::domain::{TagSet, unquote_etag};
use crate::error::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub e_tag: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub e_tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,
    pub next_token: Option<String>,
}

pub trait ObjectStore: Send + Sync {
    fn get_tags(&self, bucket: &str, key: &str) -> Result<TagSet, RegistryError>;
    // Replaces the full tag set of the object.
    fn put_tags(&self, bucket: &str, key: &str, tags: &TagSet) -> Result<(), RegistryError>;
    fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, RegistryError>;
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ObjectPage, RegistryError>;
}

/// Must be called from outside the runtime's worker threads, e.g. from
/// `spawn_blocking` or a plain thread holding a runtime handle.
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    inner: aws_sdk_s3::Client,
    handle: Handle,
}

impl S3ObjectStore {
    pub fn new(inner: aws_sdk_s3::Client, handle: Handle) -> Self {
        Self { inner, handle }
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

fn store_error<E: std::error::Error>(context: String, err: E) -> RegistryError {
    RegistryError::ObjectStore(format!("{context}: {}", DisplayErrorContext(err)))
}

impl ObjectStore for S3ObjectStore {
    #[tracing::instrument(skip(self))]
    fn get_tags(&self, bucket: &str, key: &str) -> Result<TagSet, RegistryError> {
        let resp = self
            .block_on(
                self.inner
                    .get_object_tagging()
                    .bucket(bucket)
                    .key(key)
                    .send(),
            )
            .map_err(|err| store_error(format!("could not get tags for {bucket}/{key}"), err))?;

        Ok(resp
            .tag_set()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect())
    }

    #[tracing::instrument(skip(self))]
    fn put_tags(&self, bucket: &str, key: &str, tags: &TagSet) -> Result<(), RegistryError> {
        let tag_set = tags
            .iter()
            .map(|(name, value)| Tag::builder().key(name).value(value).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| store_error(format!("invalid tag for {bucket}/{key}"), err))?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|err| store_error(format!("invalid tag set for {bucket}/{key}"), err))?;

        self.block_on(
            self.inner
                .put_object_tagging()
                .bucket(bucket)
                .key(key)
                .tagging(tagging)
                .send(),
        )
        .map_err(|err| store_error(format!("could not put tags for {bucket}/{key}"), err))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, RegistryError> {
        let resp = self
            .block_on(self.inner.head_object().bucket(bucket).key(key).send())
            .map_err(|err| store_error(format!("could not head {bucket}/{key}"), err))?;

        Ok(ObjectHead {
            e_tag: unquote_etag(resp.e_tag().unwrap_or_default()).to_string(),
            size: resp.content_length().unwrap_or_default().max(0) as u64,
        })
    }

    #[tracing::instrument(skip(self))]
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ObjectPage, RegistryError> {
        let resp = self
            .block_on(
                self.inner
                    .list_objects_v2()
                    .bucket(bucket)
                    .prefix(prefix)
                    .set_continuation_token(token.map(str::to_string))
                    .send(),
            )
            .map_err(|err| store_error(format!("could not list {bucket}/{prefix}"), err))?;

        let objects = resp
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ObjectSummary {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                    e_tag: unquote_etag(object.e_tag().unwrap_or_default()).to_string(),
                })
            })
            .collect::<Vec<_>>();

        let next_token = match resp.next_continuation_token() {
            Some(token) if resp.is_truncated().unwrap_or(false) => Some(token.to_string()),
            _ => None,
        };
        tracing::debug!(count = objects.len(), truncated = next_token.is_some(), "listed page");
        Ok(ObjectPage {
            objects,
            next_token,
        })
    }
}
