#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;

use kf_file_registry::dataservice::{Dataservice, ServiceResponse};
use kf_file_registry::domain::{GenomicFile, Notification, NotificationRecord, TagSet};
use kf_file_registry::error::RegistryError;
use kf_file_registry::lambda::{ContinuationDispatcher, ExecutionContext};
use kf_file_registry::s3::{ObjectHead, ObjectPage, ObjectStore, ObjectSummary};

pub const BUCKET: &str = "kf-study-us-east-1-dev-sd-9pyzahhe";
pub const OBJECT: &str = "harmonized/cram/60d33dec-98db-446c-ac64-f4d027588f26.cram";
pub const STUDY_ID: &str = "SD_9PYZAHHE";
pub const SOURCE_BUCKET: &str = "kf-seq-data-washu";
pub const SOURCE_OBJECT: &str = "OrofacialCleft/bd042b24ae844a57ace28cf70cb3c852.bam";
pub const ETAG: &str = "d41d8cd98f00b204e9800998ecf8427e";
pub const SOURCE_ETAG: &str = "098f6bcd4621d373cade4e832627b4f6";

pub fn required_tags() -> TagSet {
    [
        ("cavatica_harmonized_file", "5aea288dec701d183bbbdda6"),
        ("cavatica_source_file", "5ae2085bec701d183bbab7b3"),
        (
            "cavatica_app",
            "kfdrc-harmonization/sd-9pyzahhe-03/kfdrc-alignment-workflow/2",
        ),
        ("bs_id", "BS_QV3Z0DZM"),
        (
            "cavatica_source_path",
            "kf-seq-data-washu/OrofacialCleft/bd042b24ae844a57ace28cf70cb3c852.bam",
        ),
        ("cavatica_task", "00025011-9dd7-40a6-8141-853323885e61"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn record(bucket: &str, key: &str) -> NotificationRecord {
    NotificationRecord::new(bucket, key, 1024, &format!("\"{ETAG}\""))
}

#[derive(Debug, Clone)]
struct StoredObject {
    tags: TagSet,
    head: ObjectHead,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    puts: Mutex<Vec<(String, String, TagSet)>>,
    /// Objects per listing page; everything fits on one page when unset.
    page_size: Option<usize>,
    pages: Mutex<usize>,
}

impl MemoryStore {
    pub fn with_object(self, bucket: &str, key: &str, size: u64, e_tag: &str, tags: TagSet) -> Self {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                tags,
                head: ObjectHead {
                    e_tag: e_tag.to_string(),
                    size,
                },
            },
        );
        self
    }

    /// A harmonized object with every required tag and its source object.
    pub fn tagged() -> Self {
        Self::default()
            .with_object(BUCKET, OBJECT, 1024, ETAG, required_tags())
            .with_object(SOURCE_BUCKET, SOURCE_OBJECT, 4, SOURCE_ETAG, TagSet::new())
    }

    pub fn tags(&self, bucket: &str, key: &str) -> TagSet {
        self.objects.lock().unwrap()[&(bucket.to_string(), key.to_string())]
            .tags
            .clone()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    pub fn pages_listed(&self) -> usize {
        *self.pages.lock().unwrap()
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }
}

impl ObjectStore for MemoryStore {
    fn get_tags(&self, bucket: &str, key: &str) -> Result<TagSet, RegistryError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.tags.clone())
            .ok_or_else(|| RegistryError::ObjectStore(format!("NoSuchKey: {bucket}/{key}")))
    }

    fn put_tags(&self, bucket: &str, key: &str, tags: &TagSet) -> Result<(), RegistryError> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| RegistryError::ObjectStore(format!("NoSuchKey: {bucket}/{key}")))?;
        object.tags = tags.clone();
        self.puts
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string(), tags.clone()));
        Ok(())
    }

    fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, RegistryError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.head.clone())
            .ok_or_else(|| RegistryError::ObjectStore(format!("NotFound: {bucket}/{key}")))
    }

    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ObjectPage, RegistryError> {
        *self.pages.lock().unwrap() += 1;
        let mut listed = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), object)| ObjectSummary {
                key: k.clone(),
                size: object.head.size,
                e_tag: object.head.e_tag.clone(),
            })
            .collect::<Vec<_>>();
        listed.sort_by(|a, b| a.key.cmp(&b.key));

        let start = token.map(|t| t.parse::<usize>().unwrap()).unwrap_or(0);
        let end = match self.page_size {
            Some(size) => (start + size).min(listed.len()),
            None => listed.len(),
        };
        Ok(ObjectPage {
            objects: listed[start..end].to_vec(),
            next_token: (end < listed.len()).then(|| end.to_string()),
        })
    }
}

pub struct FakeDataservice {
    /// Status returned for genomic file lookups; unknown ids are 404.
    pub genomic_files: Mutex<HashMap<String, u16>>,
    pub biospecimens: HashSet<String>,
    /// Known studies and their external ids.
    pub studies: HashMap<String, Option<String>>,
    /// Queued create responses; when empty a 201 with a fresh kf_id is returned.
    pub create_responses: Mutex<VecDeque<ServiceResponse>>,
    pub created: Mutex<Vec<GenomicFile>>,
    pub study_lookups: Mutex<Vec<String>>,
    /// Resources whose lookups fail at the transport level, e.g. "studies".
    pub offline: HashSet<&'static str>,
}

impl Default for FakeDataservice {
    fn default() -> Self {
        Self {
            genomic_files: Mutex::new(HashMap::new()),
            biospecimens: HashSet::from(["BS_QV3Z0DZM".to_string()]),
            studies: HashMap::from([(STUDY_ID.to_string(), Some("SD".to_string()))]),
            create_responses: Mutex::new(VecDeque::new()),
            created: Mutex::new(Vec::new()),
            study_lookups: Mutex::new(Vec::new()),
            offline: HashSet::new(),
        }
    }
}

impl FakeDataservice {
    pub fn with_genomic_file(self, kf_id: &str, status: u16) -> Self {
        self.genomic_files
            .lock()
            .unwrap()
            .insert(kf_id.to_string(), status);
        self
    }

    pub fn with_create_response(self, response: ServiceResponse) -> Self {
        self.create_responses.lock().unwrap().push_back(response);
        self
    }

    pub fn with_offline(mut self, resource: &'static str) -> Self {
        self.offline.insert(resource);
        self
    }

    fn reachable(&self, resource: &str) -> Result<(), RegistryError> {
        if self.offline.contains(resource) {
            return Err(RegistryError::DataserviceHttp("connection reset".to_string()));
        }
        Ok(())
    }

    pub fn created(&self) -> Vec<GenomicFile> {
        self.created.lock().unwrap().clone()
    }

    pub fn create_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl Dataservice for FakeDataservice {
    fn get_genomic_file(&self, kf_id: &str) -> Result<ServiceResponse, RegistryError> {
        let status = self
            .genomic_files
            .lock()
            .unwrap()
            .get(kf_id)
            .copied()
            .unwrap_or(404);
        Ok(ServiceResponse::new(
            status,
            Some(json!({"results": {"kf_id": kf_id}})),
        ))
    }

    fn create_genomic_file(&self, file: &GenomicFile) -> Result<ServiceResponse, RegistryError> {
        let mut created = self.created.lock().unwrap();
        created.push(file.clone());
        if let Some(response) = self.create_responses.lock().unwrap().pop_front() {
            return Ok(response);
        }
        let kf_id = file
            .kf_id
            .clone()
            .unwrap_or_else(|| format!("GF_{:08}", created.len()));
        self.genomic_files
            .lock()
            .unwrap()
            .insert(kf_id.clone(), 200);
        Ok(ServiceResponse::new(
            201,
            Some(json!({"results": {"kf_id": kf_id}})),
        ))
    }

    fn get_biospecimen(&self, kf_id: &str) -> Result<ServiceResponse, RegistryError> {
        self.reachable("biospecimens")?;
        let status = if self.biospecimens.contains(kf_id) {
            200
        } else {
            404
        };
        Ok(ServiceResponse::new(status, None))
    }

    fn get_study(&self, kf_id: &str) -> Result<ServiceResponse, RegistryError> {
        self.study_lookups.lock().unwrap().push(kf_id.to_string());
        self.reachable("studies")?;
        match self.studies.get(kf_id) {
            Some(external_id) => Ok(ServiceResponse::new(
                200,
                Some(json!({"results": {"kf_id": kf_id, "external_id": external_id}})),
            )),
            None => Ok(ServiceResponse::new(404, None)),
        }
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub calls: Mutex<Vec<(String, Notification)>>,
    pub fail: bool,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<(String, Notification)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ContinuationDispatcher for RecordingDispatcher {
    fn invoke(&self, function_name: &str, payload: &Notification) -> Result<(), RegistryError> {
        self.calls
            .lock()
            .unwrap()
            .push((function_name.to_string(), payload.clone()));
        if self.fail {
            return Err(RegistryError::Dispatch("throttled".to_string()));
        }
        Ok(())
    }
}

/// Returns queued remaining times, then `fallback` once the queue is empty.
pub struct ScriptedContext {
    remaining: Mutex<VecDeque<Duration>>,
    fallback: Duration,
}

impl ScriptedContext {
    pub fn new(remaining: &[u64], fallback: u64) -> Self {
        Self {
            remaining: Mutex::new(remaining.iter().copied().map(Duration::from_millis).collect()),
            fallback: Duration::from_millis(fallback),
        }
    }

    pub fn plenty() -> Self {
        Self::new(&[], 900_000)
    }
}

impl ExecutionContext for ScriptedContext {
    fn remaining_time(&self) -> Duration {
        self.remaining
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }

    fn function_name(&self) -> &str {
        "kf-file-registry"
    }
}
