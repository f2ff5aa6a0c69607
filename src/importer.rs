use std::collections::{BTreeMap, HashMap};

use crate::classify::classify;
use crate::dataservice::Dataservice;
use crate::domain::{
    AVAILABILITY, GenomicFile, HARMONIZED_PREFIX, NotificationRecord, Outcome, REQUIRED_TAGS,
    RecordOutcome, SourcePath, Study, TAG_BS_ID, TAG_GF_ID, TAG_SOURCE_PATH, TAG_STUDY_ID, TagSet,
    study_id_from_bucket, unquote_etag,
};
use crate::error::RegistryError;
use crate::s3::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Imported(TagSet),
    AlreadyImported(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FileRef<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub e_tag: &'a str,
    pub size: u64,
}

/// The study cache lives as long as the importer, so build one per batch.
pub struct Importer<'a, S: ObjectStore, D: Dataservice> {
    store: &'a S,
    dataservice: &'a D,
    studies: HashMap<String, Study>,
}

impl<'a, S: ObjectStore, D: Dataservice> Importer<'a, S, D> {
    pub fn new(store: &'a S, dataservice: &'a D) -> Self {
        Self {
            store,
            dataservice,
            studies: HashMap::new(),
        }
    }

    pub fn import_from_event(&mut self, record: &NotificationRecord) -> RecordOutcome {
        let location = record.location();
        let tags = match self.import_harmonized(record) {
            Ok(Registration::Imported(tags)) => tags,
            Ok(Registration::AlreadyImported(kf_id)) => {
                tracing::info!(%location, %kf_id, "harmonized file already imported");
                return RecordOutcome {
                    harmonized: Outcome::AlreadyImported,
                    source: Outcome::Skipped,
                };
            }
            Err(err) => {
                tracing::error!(%location, error = %err, "harmonized import failed");
                return RecordOutcome {
                    harmonized: Outcome::from(err),
                    source: Outcome::Skipped,
                };
            }
        };

        let source = match self.register_input(&tags) {
            Ok(_) => Outcome::Imported,
            Err(RegistryError::AlreadyRegistered(kf_id)) => {
                tracing::info!(%location, %kf_id, "source file already imported");
                Outcome::AlreadyImported
            }
            Err(err) => {
                tracing::error!(%location, error = %err, "source registration failed");
                Outcome::from(err)
            }
        };

        RecordOutcome {
            harmonized: Outcome::Imported,
            source,
        }
    }

    pub fn import_harmonized(
        &mut self,
        record: &NotificationRecord,
    ) -> Result<Registration, RegistryError> {
        let bucket = record.bucket();
        let key = record.key();

        let mut tags = self.store.get_tags(bucket, key)?;
        if !tags.contains_key(TAG_STUDY_ID) {
            tags.insert(TAG_STUDY_ID.to_string(), study_id_from_bucket(bucket));
            self.store.put_tags(bucket, key, &tags)?;
        }

        let pending_id = match self.get_pending_id(&tags) {
            Err(RegistryError::AlreadyRegistered(kf_id)) => {
                return Ok(Registration::AlreadyImported(kf_id));
            }
            other => other?,
        };

        validate_required_tags(&tags)?;

        let bs_id = tags[TAG_BS_ID].clone();
        self.ensure_biospecimen(&bs_id)?;

        let study = self.resolve_study(&tags[TAG_STUDY_ID])?;
        let file = build_record(
            FileRef {
                bucket,
                key,
                e_tag: &record.s3.object.e_tag,
                size: record.s3.object.size,
            },
            pending_id.as_deref(),
            Some(&bs_id),
            Some(&study),
        )?;
        let kf_id = self.create(&file)?;
        tracing::info!(bucket, key, %kf_id, "registered harmonized file");

        if pending_id.is_none() {
            tags.insert(TAG_GF_ID.to_string(), kf_id);
            tags.insert(TAG_STUDY_ID.to_string(), study.kf_id.clone());
            tags.insert(TAG_BS_ID.to_string(), bs_id);
            self.store.put_tags(bucket, key, &tags)?;
        }

        Ok(Registration::Imported(tags))
    }

    pub fn register_input(&mut self, harmonized_tags: &TagSet) -> Result<String, RegistryError> {
        let raw_path = harmonized_tags
            .get(TAG_SOURCE_PATH)
            .ok_or_else(|| RegistryError::InvalidSourcePath(format!("no {TAG_SOURCE_PATH} tag")))?;
        let source: SourcePath = raw_path.parse()?;

        let mut tags = self.store.get_tags(&source.bucket, &source.key)?;
        let head = self.store.head(&source.bucket, &source.key)?;
        let pending_id = self.get_pending_id(&tags)?;

        let bs_id = harmonized_tags.get(TAG_BS_ID).cloned();
        let study = match harmonized_tags.get(TAG_STUDY_ID) {
            Some(study_id) => Some(self.resolve_study(study_id)?),
            None => None,
        };

        let mut file = build_record(
            FileRef {
                bucket: &source.bucket,
                key: &source.key,
                e_tag: &head.e_tag,
                size: head.size,
            },
            pending_id.as_deref(),
            bs_id.as_deref(),
            study.as_ref(),
        )?;
        file.is_harmonized = false;

        let kf_id = self.create(&file)?;
        tracing::info!(source = %source, %kf_id, "registered source file");

        let mut changed = false;
        let mut insert_missing = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                if !tags.contains_key(name) {
                    tags.insert(name.to_string(), value);
                    changed = true;
                }
            }
        };
        insert_missing(TAG_GF_ID, Some(kf_id.clone()));
        insert_missing(TAG_STUDY_ID, study.map(|study| study.kf_id));
        insert_missing(TAG_BS_ID, bs_id);
        if changed {
            self.store.put_tags(&source.bucket, &source.key, &tags)?;
        }

        Ok(kf_id)
    }

    // A tagged gf_id is reusable only while the dataservice does not know it.
    pub fn get_pending_id(&self, tags: &TagSet) -> Result<Option<String>, RegistryError> {
        let Some(gf_id) = tags.get(TAG_GF_ID) else {
            return Ok(None);
        };

        let resp = self.dataservice.get_genomic_file(gf_id)?;
        match resp.status {
            404 => Ok(Some(gf_id.clone())),
            _ if resp.is_success() => Err(RegistryError::AlreadyRegistered(gf_id.clone())),
            status => Err(RegistryError::DataserviceStatus {
                status,
                message: format!("could not look up genomic file {gf_id}"),
            }),
        }
    }

    pub fn resolve_study(&mut self, study_id: &str) -> Result<Study, RegistryError> {
        if let Some(study) = self.studies.get(study_id) {
            return Ok(study.clone());
        }

        let external_id = match self.dataservice.get_study(study_id) {
            Ok(resp) if resp.is_success() => resp.result_field("external_id").map(str::to_string),
            Ok(resp) => {
                tracing::warn!(study_id, status = resp.status, "study lookup failed");
                None
            }
            Err(RegistryError::DataserviceHttp(err)) => {
                tracing::warn!(study_id, error = %err, "study lookup failed");
                None
            }
            Err(err) => return Err(err),
        };

        let study = Study {
            kf_id: study_id.to_string(),
            external_id,
        };
        self.studies.insert(study_id.to_string(), study.clone());
        Ok(study)
    }

    pub fn create(&self, file: &GenomicFile) -> Result<String, RegistryError> {
        let resp = self.dataservice.create_genomic_file(file)?;
        if resp.status != 201 {
            let message = resp
                .body
                .as_ref()
                .and_then(|body| body.get("_status"))
                .and_then(|status| status.get("message"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("genomic file was not created")
                .to_string();
            return Err(RegistryError::DataserviceStatus {
                status: resp.status,
                message,
            });
        }
        resp.result_field("kf_id")
            .map(str::to_string)
            .ok_or_else(|| RegistryError::DataserviceResponse("no results.kf_id in body".into()))
    }

    fn ensure_biospecimen(&self, bs_id: &str) -> Result<(), RegistryError> {
        match self.dataservice.get_biospecimen(bs_id) {
            Ok(resp) if resp.is_success() => Ok(()),
            Ok(_) => Err(RegistryError::BiospecimenNotFound(bs_id.to_string())),
            Err(RegistryError::DataserviceHttp(err)) => {
                tracing::warn!(bs_id, error = %err, "biospecimen lookup failed");
                Err(RegistryError::BiospecimenNotFound(bs_id.to_string()))
            }
            Err(err) => Err(err),
        }
    }
}

pub fn validate_required_tags(tags: &TagSet) -> Result<(), RegistryError> {
    let missing = REQUIRED_TAGS
        .iter()
        .filter(|tag| !tags.contains_key(**tag))
        .map(|tag| tag.to_string())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(RegistryError::MissingTags(missing));
    }
    Ok(())
}

pub fn build_record(
    file: FileRef<'_>,
    pending_id: Option<&str>,
    biospecimen_id: Option<&str>,
    study: Option<&Study>,
) -> Result<GenomicFile, RegistryError> {
    let classification = classify(file.key)?;
    let file_name = file.key.rsplit('/').next().unwrap_or(file.key).to_string();

    let mut hashes = BTreeMap::new();
    hashes.insert("etag".to_string(), unquote_etag(file.e_tag).to_string());

    Ok(GenomicFile {
        kf_id: pending_id.map(str::to_string),
        file_name,
        file_format: classification.file_format,
        data_type: classification.data_type.to_string(),
        availability: AVAILABILITY.to_string(),
        controlled_access: true,
        is_harmonized: file.key.starts_with(HARMONIZED_PREFIX),
        hashes,
        size: file.size,
        urls: vec![format!("s3://{}/{}", file.bucket, file.key)],
        biospecimen_id: biospecimen_id.map(str::to_string),
        acl: study.map(Study::acl).unwrap_or_default(),
    })
}
