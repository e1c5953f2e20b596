//! Request builders, verb primitives and resource operations for the
//! DeepDetect API.
//!
//! # Design
//! Every operation is split in two: a `build_*` method that produces an
//! `HttpRequest` from typed inputs without I/O, and the operation itself,
//! which sends the request through the client's `Transport`, rejects non-2xx
//! statuses and decodes the body according to the current `ReturnFormat`.
//! The format is the only mutable state and changing it takes `&mut self`,
//! so a shared client can't have its format switched under a concurrent
//! caller; clone the client to give each caller its own.

use serde::Serialize;
use tracing::warn;
use url::Url;

use crate::api::{ApiUrls, ClientConfig};
use crate::error::DdError;
use crate::format::{DdResponse, ReturnFormat};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::types::{ClearMode, CreateService, PredictRequest, TrainJob, TrainStatusQuery};

/// Blocking client for one DeepDetect server.
#[derive(Debug, Clone)]
pub struct DdClient<T = UreqTransport> {
    config: ClientConfig,
    base_url: String,
    base: Url,
    urls: &'static ApiUrls,
    format: ReturnFormat,
    transport: T,
}

impl DdClient<UreqTransport> {
    /// Client over HTTP with the configured timeout. Fails if the api version
    /// is not in the endpoint table.
    pub fn new(config: ClientConfig) -> Result<Self, DdError> {
        let transport = UreqTransport::new(config.timeout);
        Self::with_transport(config, transport)
    }

    /// Client for a server on localhost:8080 speaking api 0.1.
    pub fn localhost() -> Result<Self, DdError> {
        Self::new(ClientConfig::default())
    }
}

impl<T: Transport> DdClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self, DdError> {
        let urls = ApiUrls::lookup(&config.api_version)?;
        let base_url = config.base_url();
        let base = Url::parse(&base_url).map_err(|e| DdError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            base_url,
            base,
            config,
            urls,
            format: ReturnFormat::default(),
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_version(&self) -> &str {
        self.urls.version
    }

    pub fn urls(&self) -> &'static ApiUrls {
        self.urls
    }

    pub fn return_format(&self) -> ReturnFormat {
        self.format
    }

    /// Applies to every response received after the call.
    pub fn set_return_format(&mut self, format: ReturnFormat) {
        self.format = format;
    }

    /// Same as `set_return_format` for a format given by name. An unknown
    /// name leaves the current format in place.
    pub fn set_return_format_name(&mut self, name: &str) -> Result<(), DdError> {
        self.format = name.parse()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    /// Absolute URL for `path`, optionally followed by `name` as a single
    /// percent-encoded segment. Every segment is encoded, so `?`, `#`, `/`
    /// or spaces inside a name can't change which resource is addressed.
    fn resource_url(&self, path: &str, name: Option<&str>) -> String {
        let mut url = self.base.clone();
        // http(s) URLs always have a path to edit.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.clear().extend(path.split('/').filter(|s| !s.is_empty()));
            if let Some(name) = name {
                segments.push(name);
            }
        }
        url.into()
    }

    fn service_url(&self, name: &str) -> String {
        self.resource_url(self.urls.services, Some(name))
    }

    fn build_query(&self, method: HttpMethod, url: String, query: Vec<(String, String)>) -> HttpRequest {
        HttpRequest {
            method,
            url,
            query,
            headers: Vec::new(),
            body: None,
        }
    }

    fn build_json<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        url: String,
        body: &B,
    ) -> Result<HttpRequest, DdError> {
        let body = serde_json::to_string(body).map_err(|e| DdError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method,
            url,
            query: Vec::new(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        })
    }

    pub fn build_info(&self) -> HttpRequest {
        self.build_query(HttpMethod::Get, self.resource_url(self.urls.info, None), Vec::new())
    }

    pub fn build_put_service(&self, name: &str, service: &CreateService) -> Result<HttpRequest, DdError> {
        self.build_json(HttpMethod::Put, self.service_url(name), service)
    }

    pub fn build_get_service(&self, name: &str) -> HttpRequest {
        self.build_query(HttpMethod::Get, self.service_url(name), Vec::new())
    }

    /// `clear` is only put on the wire when one is given.
    pub fn build_delete_service(&self, name: &str, clear: Option<ClearMode>) -> HttpRequest {
        let query = clear
            .map(|mode| vec![("clear".to_string(), mode.as_str().to_string())])
            .unwrap_or_default();
        self.build_query(HttpMethod::Delete, self.service_url(name), query)
    }

    pub fn build_post_train(&self, job: &TrainJob) -> Result<HttpRequest, DdError> {
        self.build_json(HttpMethod::Post, self.resource_url(self.urls.train, None), job)
    }

    pub fn build_get_train(&self, query: &TrainStatusQuery) -> HttpRequest {
        self.build_query(HttpMethod::Get, self.resource_url(self.urls.train, None), query.query_pairs())
    }

    pub fn build_delete_train(&self, service: &str, job: u32) -> HttpRequest {
        let query = vec![
            ("service".to_string(), service.to_string()),
            ("job".to_string(), job.to_string()),
        ];
        self.build_query(HttpMethod::Delete, self.resource_url(self.urls.train, None), query)
    }

    pub fn build_post_predict(&self, request: &PredictRequest) -> Result<HttpRequest, DdError> {
        self.build_json(HttpMethod::Post, self.resource_url(self.urls.predict, None), request)
    }

    // -----------------------------------------------------------------------
    // Verb primitives
    // -----------------------------------------------------------------------

    pub fn get(&self, path: &str, query: Vec<(String, String)>) -> Result<DdResponse, DdError> {
        self.send(self.build_query(HttpMethod::Get, self.resource_url(path, None), query))
    }

    pub fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<DdResponse, DdError> {
        self.send(self.build_json(HttpMethod::Put, self.resource_url(path, None), body)?)
    }

    pub fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<DdResponse, DdError> {
        self.send(self.build_json(HttpMethod::Post, self.resource_url(path, None), body)?)
    }

    pub fn delete(&self, path: &str, query: Vec<(String, String)>) -> Result<DdResponse, DdError> {
        self.send(self.build_query(HttpMethod::Delete, self.resource_url(path, None), query))
    }

    /// Execute a request built by one of the `build_*` methods.
    pub fn send(&self, request: HttpRequest) -> Result<DdResponse, DdError> {
        let response = self.transport.execute(request)?;
        self.parse_response(response)
    }

    /// Reject non-2xx statuses, then decode with the current return format.
    pub fn parse_response(&self, response: HttpResponse) -> Result<DdResponse, DdError> {
        if !response.is_success() {
            warn!(status = response.status, "server returned an error status");
            return Err(DdError::Status {
                status: response.status,
                body: response.body,
            });
        }
        self.format.decode(&response.body)
    }

    // -----------------------------------------------------------------------
    // Resource operations
    // -----------------------------------------------------------------------

    /// Server information and the list of registered services.
    pub fn info(&self) -> Result<DdResponse, DdError> {
        self.send(self.build_info())
    }

    pub fn put_service(&self, name: &str, service: &CreateService) -> Result<DdResponse, DdError> {
        self.send(self.build_put_service(name, service)?)
    }

    pub fn get_service(&self, name: &str) -> Result<DdResponse, DdError> {
        self.send(self.build_get_service(name))
    }

    pub fn delete_service(&self, name: &str, clear: Option<ClearMode>) -> Result<DdResponse, DdError> {
        self.send(self.build_delete_service(name, clear))
    }

    pub fn post_train(&self, job: &TrainJob) -> Result<DdResponse, DdError> {
        self.send(self.build_post_train(job)?)
    }

    /// Status of a training job. Callers poll this until the job leaves
    /// the `running` state.
    pub fn get_train(&self, query: &TrainStatusQuery) -> Result<DdResponse, DdError> {
        self.send(self.build_get_train(query))
    }

    /// Cancel a running training job.
    pub fn delete_train(&self, service: &str, job: u32) -> Result<DdResponse, DdError> {
        self.send(self.build_delete_train(service, job))
    }

    pub fn post_predict(&self, request: &PredictRequest) -> Result<DdResponse, DdError> {
        self.send(self.build_post_predict(request)?)
    }
}
