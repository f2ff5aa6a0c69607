use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::GenomicFile;
use crate::error::RegistryError;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ServiceResponse {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn result_field(&self, field: &str) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|body| body.get("results"))
            .and_then(|results| results.get(field))
            .and_then(Value::as_str)
    }
}

pub trait Dataservice: Send + Sync {
    fn get_genomic_file(&self, kf_id: &str) -> Result<ServiceResponse, RegistryError>;
    fn create_genomic_file(&self, file: &GenomicFile) -> Result<ServiceResponse, RegistryError>;
    fn get_biospecimen(&self, kf_id: &str) -> Result<ServiceResponse, RegistryError>;
    fn get_study(&self, kf_id: &str) -> Result<ServiceResponse, RegistryError>;
}

#[derive(Clone)]
pub struct DataserviceHttpClient {
    client: Client,
    base_url: String,
}

impl DataserviceHttpClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, RegistryError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kf-file-registry/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RegistryError::DataserviceHttp(err.to_string()))?,
        );
        if let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| RegistryError::DataserviceHttp(err.to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| RegistryError::DataserviceHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> Result<ServiceResponse, RegistryError> {
        let url = self.url(path);
        let response = self.send_with_retries(|| self.client.get(&url))?;
        Ok(into_service_response(response))
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, RegistryError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let retry = match make_req().send() {
                Ok(resp) if is_retryable_status(resp.status().as_u16()) => Ok(resp),
                Ok(resp) => return Ok(resp),
                Err(err) if is_retryable_error(&err) => Err(err),
                Err(err) => return Err(RegistryError::DataserviceHttp(err.to_string())),
            };
            if attempt >= MAX_RETRIES {
                return retry.map_err(|err| RegistryError::DataserviceHttp(err.to_string()));
            }
            attempt += 1;
            thread::sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64));
        }
    }
}

impl Dataservice for DataserviceHttpClient {
    fn get_genomic_file(&self, kf_id: &str) -> Result<ServiceResponse, RegistryError> {
        self.get(&format!("genomic-files/{kf_id}"))
    }

    // Creates are sent exactly once.
    fn create_genomic_file(&self, file: &GenomicFile) -> Result<ServiceResponse, RegistryError> {
        let response = self
            .client
            .post(self.url("genomic-files"))
            .json(file)
            .send()
            .map_err(|err| RegistryError::DataserviceHttp(err.to_string()))?;
        Ok(into_service_response(response))
    }

    fn get_biospecimen(&self, kf_id: &str) -> Result<ServiceResponse, RegistryError> {
        self.get(&format!("biospecimens/{kf_id}"))
    }

    fn get_study(&self, kf_id: &str) -> Result<ServiceResponse, RegistryError> {
        self.get(&format!("studies/{kf_id}"))
    }
}

fn into_service_response(response: reqwest::blocking::Response) -> ServiceResponse {
    let status = response.status().as_u16();
    let body = response.json::<Value>().ok();
    ServiceResponse { status, body }
}

pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    format!("{trimmed}/")
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
