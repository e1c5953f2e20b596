//! Request payloads for the services, train and predict resources.
//!
//! # Design
//! One struct per operation, with named fields instead of loose maps. The
//! nested `parameters` block (`input`, `mllib`, `output`) is shared by every
//! resource and stays opaque: its contents belong to the server's ML backend.
//! `data` is equally opaque because connectors decide its shape (file paths,
//! URIs, inline rows).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The `parameters` block shared by service, train and predict payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default)]
    pub input: Map<String, Value>,
    #[serde(default)]
    pub mllib: Map<String, Value>,
    #[serde(default)]
    pub output: Map<String, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    pub fn with_mllib(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.mllib.insert(key.into(), value.into());
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.output.insert(key.into(), value.into());
        self
    }
}

/// Location of the model on the server plus backend-specific options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelDescriptor {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    Supervised,
    Unsupervised,
}

/// What a service deletion also removes from the model repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearMode {
    Full,
    Lib,
    Mem,
}

impl ClearMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ClearMode::Full => "full",
            ClearMode::Lib => "lib",
            ClearMode::Mem => "mem",
        }
    }
}

/// Body of `PUT /services/{name}`. The service name travels in the path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateService {
    pub description: String,
    pub mllib: String,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub parameters: Parameters,
    pub model: ModelDescriptor,
}

impl CreateService {
    pub fn new(
        description: impl Into<String>,
        mllib: impl Into<String>,
        model: ModelDescriptor,
    ) -> Self {
        Self {
            description: description.into(),
            mllib: mllib.into(),
            task_type: TaskType::Supervised,
            parameters: Parameters::default(),
            model,
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }
}

fn default_true() -> bool {
    true
}

/// Body of `POST /train`.
///
/// `non_blocking` is sent as the `async` field; the server then answers
/// immediately with a job id instead of waiting for training to finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainJob {
    pub service: String,
    #[serde(rename = "async", default = "default_true")]
    pub non_blocking: bool,
    #[serde(default)]
    pub parameters: Parameters,
    pub data: Value,
}

impl TrainJob {
    pub fn new(service: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            service: service.into(),
            non_blocking: true,
            parameters: Parameters::default(),
            data: data.into(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn blocking(mut self) -> Self {
        self.non_blocking = false;
        self
    }
}

/// Query of `GET /train`: status of one job on a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainStatusQuery {
    pub service: String,
    #[serde(default = "default_job")]
    pub job: u32,
    /// Seconds the server may wait before answering.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub measure_hist: bool,
}

fn default_job() -> u32 {
    1
}

impl TrainStatusQuery {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            job: default_job(),
            timeout: 0,
            measure_hist: false,
        }
    }

    pub fn with_job(mut self, job: u32) -> Self {
        self.job = job;
        self
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_measure_hist(mut self, measure_hist: bool) -> Self {
        self.measure_hist = measure_hist;
        self
    }

    /// Query-string pairs; `measure_hist` is only sent when requested.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("service".to_string(), self.service.clone()),
            ("job".to_string(), self.job.to_string()),
            ("timeout".to_string(), self.timeout.to_string()),
        ];
        if self.measure_hist {
            pairs.push((
                "parameters.output.measure_hist".to_string(),
                "true".to_string(),
            ));
        }
        pairs
    }
}

/// Body of `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub service: String,
    #[serde(default)]
    pub parameters: Parameters,
    pub data: Value,
}

impl PredictRequest {
    pub fn new(service: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            service: service.into(),
            parameters: Parameters::default(),
            data: data.into(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }
}
