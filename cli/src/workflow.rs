//! End-to-end classification run: create an MLP service, train it on an
//! svm file, poll the job, then predict on a held-out file.
//!
//! The server does all of the learning. This module only sequences the
//! calls, reads the measures out of the responses, and deletes the service
//! again when asked to (also after a failure, if it created the service).

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dd_core::{
    ClearMode, CreateService, DdClient, DdError, ModelDescriptor, Parameters, PredictRequest,
    ReturnFormat, TrainJob, TrainStatusQuery, Transport,
};
use serde_json::{json, Value};
use tracing::{info, warn};

const MLP_TEMPLATES: &str = "../templates/caffe/";

/// Solver settings sent under `parameters.mllib.solver`.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    pub solver_type: String,
    pub iterations: u64,
    pub base_lr: f64,
    pub gamma: Option<f64>,
    pub stepsize: Option<u64>,
    pub momentum: Option<f64>,
    pub snapshot: Option<u64>,
}

impl SolverSettings {
    fn to_json(&self) -> Value {
        let mut solver = json!({
            "solver_type": self.solver_type,
            "iterations": self.iterations,
            "base_lr": self.base_lr,
        });
        let optional = [
            ("gamma", self.gamma.map(Value::from)),
            ("stepsize", self.stepsize.map(Value::from)),
            ("momentum", self.momentum.map(Value::from)),
            ("snapshot", self.snapshot.map(Value::from)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                solver[key] = value;
            }
        }
        solver
    }
}

#[derive(Debug, Clone)]
pub struct ClassifyPlan {
    pub service: String,
    pub repository: String,
    pub train_data: String,
    pub test_data: String,
    pub nclasses: u32,
    pub layers: Vec<u32>,
    pub batch_size: u32,
    pub class_weights: Vec<f64>,
    pub solver: SolverSettings,
    pub gpu: bool,
    pub resume: bool,
    pub poll_interval: Duration,
    pub cleanup: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyReport {
    pub job: u32,
    pub measures: Value,
    /// Best category per predicted item, keyed by item uri.
    pub predictions: Vec<(String, String)>,
    pub class_counts: BTreeMap<String, usize>,
}

impl ClassifyPlan {
    fn service_request(&self) -> CreateService {
        let mut model = ModelDescriptor::new(&self.repository);
        if !self.resume {
            model.templates = Some(MLP_TEMPLATES.to_string());
        }
        let parameters = Parameters::new()
            .with_input("connector", "svm")
            .with_mllib("template", "mlp")
            .with_mllib("nclasses", self.nclasses)
            .with_mllib("layers", self.layers.clone())
            .with_mllib("activation", "relu")
            .with_mllib("gpu", self.gpu);
        CreateService::new("classification workflow", "caffe", model).with_parameters(parameters)
    }

    fn train_request(&self) -> TrainJob {
        let mut parameters = Parameters::new()
            .with_input("connector", "svm")
            .with_mllib("gpu", self.gpu)
            .with_mllib("resume", self.resume)
            .with_mllib("net", json!({ "batch_size": self.batch_size }))
            .with_mllib("solver", self.solver.to_json())
            .with_output("measure", json!(["acc", "mcll", "f1"]));
        if !self.class_weights.is_empty() {
            parameters = parameters.with_mllib("class_weights", self.class_weights.clone());
        }
        TrainJob::new(&self.service, json!([self.train_data, self.test_data]))
            .with_parameters(parameters)
    }

    fn predict_request(&self) -> PredictRequest {
        let parameters = Parameters::new()
            .with_input("connector", "svm")
            .with_mllib("gpu", self.gpu)
            .with_output("best", 1);
        PredictRequest::new(&self.service, json!([self.test_data])).with_parameters(parameters)
    }
}

/// Run the workflow. The client reads JSON while the workflow runs, since
/// job ids and measures come out of the responses; its previous return
/// format is restored before returning.
pub fn run_classification<T: Transport>(
    client: &mut DdClient<T>,
    plan: &ClassifyPlan,
) -> Result<ClassifyReport> {
    let previous = client.return_format();
    client.set_return_format(ReturnFormat::Json);
    let result = classify_and_clean_up(client, plan);
    client.set_return_format(previous);
    result
}

fn classify_and_clean_up<T: Transport>(
    client: &DdClient<T>,
    plan: &ClassifyPlan,
) -> Result<ClassifyReport> {
    let created = match client.put_service(&plan.service, &plan.service_request()) {
        Ok(_) => {
            info!(service = %plan.service, "service created");
            true
        }
        Err(DdError::Status { status: 409, .. }) if plan.resume => {
            info!(service = %plan.service, "service exists, resuming");
            false
        }
        Err(err) => {
            return Err(err).with_context(|| format!("creating service {}", plan.service))
        }
    };

    let result = train_and_predict(client, plan);

    if plan.cleanup && (created || result.is_ok()) {
        if let Err(err) = client.delete_service(&plan.service, Some(ClearMode::Lib)) {
            warn!(service = %plan.service, error = %err, "failed to delete service");
        }
    }
    result
}

fn train_and_predict<T: Transport>(
    client: &DdClient<T>,
    plan: &ClassifyPlan,
) -> Result<ClassifyReport> {
    let started = client
        .post_train(&plan.train_request())
        .context("submitting training job")?;
    let Some(job) = started.as_json().and_then(|v| v["head"]["job"].as_u64()) else {
        bail!("training response for {} carries no job id", plan.service);
    };
    let job = u32::try_from(job).with_context(|| format!("job id {job} out of range"))?;
    info!(service = %plan.service, job, "training started");

    let measures = wait_for_job(client, &plan.service, job, plan.poll_interval)?;

    let predicted = client
        .post_predict(&plan.predict_request())
        .context("predicting on test data")?;
    let predictions = best_categories(predicted.as_json().unwrap_or(&Value::Null));
    let mut class_counts = BTreeMap::new();
    for (_, cat) in &predictions {
        *class_counts.entry(cat.clone()).or_insert(0) += 1;
    }

    Ok(ClassifyReport {
        job,
        measures,
        predictions,
        class_counts,
    })
}

/// Poll until the job leaves `running`; returns the final measures.
fn wait_for_job<T: Transport>(
    client: &DdClient<T>,
    service: &str,
    job: u32,
    interval: Duration,
) -> Result<Value> {
    let query = TrainStatusQuery::new(service).with_job(job);
    loop {
        let status = client
            .get_train(&query)
            .with_context(|| format!("polling job {job}"))?
            .into_json()
            .unwrap_or(Value::Null);
        let state = status["head"]["status"].as_str().unwrap_or("unknown");
        let measure = &status["body"]["measure"];
        match state {
            "running" => {
                info!(job, iteration = %measure["iteration"], "training");
                thread::sleep(interval);
            }
            "finished" => return Ok(measure.clone()),
            other => bail!("training job {job} ended with status {other}"),
        }
    }
}

fn best_categories(response: &Value) -> Vec<(String, String)> {
    response["body"]["predictions"]
        .as_array()
        .map(|predictions| {
            predictions
                .iter()
                .filter_map(|p| {
                    let uri = p["uri"].as_str()?.to_string();
                    let cat = p["classes"][0]["cat"].as_str()?.to_string();
                    Some((uri, cat))
                })
                .collect()
        })
        .unwrap_or_default()
}
