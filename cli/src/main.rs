//! `dd`: command-line front end for a DeepDetect server.
//!
//! Every subcommand maps onto one client operation, except `classify`,
//! which chains service creation, training, polling and prediction.

mod workflow;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dd_core::api::{DEFAULT_API_VERSION, DEFAULT_HOST, DEFAULT_PORT};
use dd_core::{
    ClearMode, ClientConfig, CreateService, DdClient, DdResponse, ModelDescriptor, Parameters,
    PredictRequest, Protocol, ReturnFormat, TaskType, TrainJob, TrainStatusQuery,
};
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use workflow::{ClassifyPlan, SolverSettings};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "dd", version, about = "Client for the DeepDetect REST API")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// How responses are printed: json, text or none.
    #[arg(long, global = true, default_value = "json")]
    format: ReturnFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConnectionArgs {
    #[arg(long, global = true, env = "DD_HOST", default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, global = true, env = "DD_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Use https instead of http.
    #[arg(long, global = true)]
    https: bool,

    #[arg(long, global = true, default_value = DEFAULT_API_VERSION)]
    api_version: String,

    /// Upper bound for a single request, in seconds.
    #[arg(long, global = true, default_value_t = 86_400)]
    timeout_secs: u64,
}

impl ConnectionArgs {
    fn to_config(&self) -> ClientConfig {
        let protocol = if self.https {
            Protocol::Https
        } else {
            Protocol::Http
        };
        ClientConfig::default()
            .with_host(self.host.clone())
            .with_port(self.port)
            .with_protocol(protocol)
            .with_api_version(self.api_version.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show server information and registered services.
    Info,

    /// Create, inspect or delete a service.
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },

    /// Start, poll or cancel a training job.
    Train {
        #[command(subcommand)]
        action: TrainAction,
    },

    /// Predict with a trained service.
    Predict(PredictArgs),

    /// Create, train and evaluate an MLP classifier on svm files.
    Classify(ClassifyArgs),
}

/// JSON objects for the `parameters` block.
#[derive(Args)]
struct ParameterArgs {
    /// Input connector parameters as a JSON object.
    #[arg(long, value_parser = parse_object)]
    input: Option<Map<String, Value>>,

    /// ML library parameters as a JSON object.
    #[arg(long = "mllib-params", value_parser = parse_object)]
    mllib_params: Option<Map<String, Value>>,

    /// Output parameters as a JSON object.
    #[arg(long, value_parser = parse_object)]
    output: Option<Map<String, Value>>,
}

impl ParameterArgs {
    fn into_parameters(self) -> Parameters {
        Parameters {
            input: self.input.unwrap_or_default(),
            mllib: self.mllib_params.unwrap_or_default(),
            output: self.output.unwrap_or_default(),
        }
    }
}

#[derive(Subcommand)]
enum ServiceAction {
    Create {
        name: String,

        /// Model repository on the server.
        #[arg(long)]
        repository: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "caffe")]
        mllib: String,

        #[arg(long)]
        templates: Option<String>,

        #[arg(long = "type", default_value = "supervised", value_parser = parse_task_type)]
        task_type: TaskType,

        #[command(flatten)]
        parameters: ParameterArgs,
    },
    Get {
        name: String,
    },
    Delete {
        name: String,

        /// Also clear repository data: full, lib or mem.
        #[arg(long, value_parser = parse_clear_mode)]
        clear: Option<ClearMode>,
    },
}

#[derive(Subcommand)]
enum TrainAction {
    Start {
        service: String,

        /// Training data, repeatable.
        #[arg(long = "data", required = true)]
        data: Vec<String>,

        /// Wait for training to finish instead of returning a job id.
        #[arg(long)]
        blocking: bool,

        #[command(flatten)]
        parameters: ParameterArgs,
    },
    Status {
        service: String,

        #[arg(long, default_value_t = 1)]
        job: u32,

        /// Seconds the server may wait before answering.
        #[arg(long, default_value_t = 0)]
        timeout: u64,

        #[arg(long)]
        measure_hist: bool,
    },
    Cancel {
        service: String,

        #[arg(long, default_value_t = 1)]
        job: u32,
    },
}

#[derive(Args)]
struct PredictArgs {
    service: String,

    /// Data to predict on, repeatable.
    #[arg(long = "data", required = true)]
    data: Vec<String>,

    #[command(flatten)]
    parameters: ParameterArgs,
}

#[derive(Args)]
struct ClassifyArgs {
    #[arg(long, default_value = "classifier")]
    service: String,

    #[arg(long)]
    repository: String,

    /// Training set in svm format, as seen by the server.
    #[arg(long)]
    train: String,

    /// Test set in svm format, used for validation and prediction.
    #[arg(long)]
    test: String,

    #[arg(long, default_value_t = 10)]
    nclasses: u32,

    #[arg(long, value_delimiter = ',', default_value = "100,100")]
    layers: Vec<u32>,

    #[arg(long, default_value_t = 128)]
    batch_size: u32,

    /// One weight per class, comma separated.
    #[arg(long, value_delimiter = ',')]
    class_weights: Vec<f64>,

    #[arg(long, default_value = "SGD")]
    solver_type: String,

    #[arg(long, default_value_t = 500)]
    iterations: u64,

    #[arg(long, default_value_t = 0.01)]
    base_lr: f64,

    #[arg(long)]
    gamma: Option<f64>,

    #[arg(long)]
    stepsize: Option<u64>,

    #[arg(long)]
    momentum: Option<f64>,

    #[arg(long)]
    snapshot: Option<u64>,

    #[arg(long)]
    gpu: bool,

    /// Continue training from the last snapshot of an existing service.
    #[arg(long)]
    resume: bool,

    /// Seconds between job status polls.
    #[arg(long, default_value_t = 5)]
    poll_secs: u64,

    /// Delete the service when done, or when a step after creation fails.
    #[arg(long)]
    cleanup: bool,
}

impl ClassifyArgs {
    fn into_plan(self) -> ClassifyPlan {
        ClassifyPlan {
            service: self.service,
            repository: self.repository,
            train_data: self.train,
            test_data: self.test,
            nclasses: self.nclasses,
            layers: self.layers,
            batch_size: self.batch_size,
            class_weights: self.class_weights,
            solver: SolverSettings {
                solver_type: self.solver_type,
                iterations: self.iterations,
                base_lr: self.base_lr,
                gamma: self.gamma,
                stepsize: self.stepsize,
                momentum: self.momentum,
                snapshot: self.snapshot,
            },
            gpu: self.gpu,
            resume: self.resume,
            poll_interval: Duration::from_secs(self.poll_secs),
            cleanup: self.cleanup,
        }
    }
}

fn parse_object(s: &str) -> Result<Map<String, Value>, String> {
    serde_json::from_str(s).map_err(|e| format!("expected a JSON object: {e}"))
}

fn parse_task_type(s: &str) -> Result<TaskType, String> {
    serde_json::from_value(Value::String(s.to_string()))
        .map_err(|_| format!("unknown service type {s}; expected supervised or unsupervised"))
}

fn parse_clear_mode(s: &str) -> Result<ClearMode, String> {
    serde_json::from_value(Value::String(s.to_string()))
        .map_err(|_| format!("unknown clear mode {s}; expected full, lib or mem"))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("info");

    let config = cli.connection.to_config();
    let mut client = DdClient::new(config).context("invalid client configuration")?;
    client.set_return_format(cli.format);
    info!(url = %client.base_url(), api = client.api_version(), "using server");

    let response = match cli.command {
        Command::Info => client.info()?,
        Command::Service { action } => run_service(&client, action)?,
        Command::Train { action } => run_train(&client, action)?,
        Command::Predict(args) => {
            let request = PredictRequest::new(args.service, args.data)
                .with_parameters(args.parameters.into_parameters());
            client.post_predict(&request)?
        }
        Command::Classify(args) => {
            let report = workflow::run_classification(&mut client, &args.into_plan())?;
            print_report(&report)?;
            return Ok(());
        }
    };
    print_response(response)
}

fn run_service(client: &DdClient, action: ServiceAction) -> Result<DdResponse> {
    let response = match action {
        ServiceAction::Create {
            name,
            repository,
            description,
            mllib,
            templates,
            task_type,
            parameters,
        } => {
            let mut model = ModelDescriptor::new(repository);
            model.templates = templates;
            let service = CreateService::new(description, mllib, model)
                .with_task_type(task_type)
                .with_parameters(parameters.into_parameters());
            client
                .put_service(&name, &service)
                .with_context(|| format!("creating service {name}"))?
        }
        ServiceAction::Get { name } => client.get_service(&name)?,
        ServiceAction::Delete { name, clear } => client
            .delete_service(&name, clear)
            .with_context(|| format!("deleting service {name}"))?,
    };
    Ok(response)
}

fn run_train(client: &DdClient, action: TrainAction) -> Result<DdResponse> {
    let response = match action {
        TrainAction::Start {
            service,
            data,
            blocking,
            parameters,
        } => {
            let mut job = TrainJob::new(service, data).with_parameters(parameters.into_parameters());
            if blocking {
                job = job.blocking();
            }
            client.post_train(&job)?
        }
        TrainAction::Status {
            service,
            job,
            timeout,
            measure_hist,
        } => {
            let query = TrainStatusQuery::new(service)
                .with_job(job)
                .with_timeout(timeout)
                .with_measure_hist(measure_hist);
            client.get_train(&query)?
        }
        TrainAction::Cancel { service, job } => client.delete_train(&service, job)?,
    };
    Ok(response)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_response(response: DdResponse) -> Result<()> {
    match response {
        DdResponse::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        DdResponse::Text(text) => println!("{text}"),
        DdResponse::None => {}
    }
    Ok(())
}

fn print_report(report: &workflow::ClassifyReport) -> Result<()> {
    println!("job {} finished", report.job);
    println!("measures: {}", serde_json::to_string_pretty(&report.measures)?);
    println!("{:>8}  {:>8}", "class", "count");
    for (class, count) in &report.class_counts {
        println!("{class:>8}  {count:>8}");
    }
    println!("{} predictions", report.predictions.len());
    Ok(())
}

/// Initialize the tracing subscriber with the given default log level.
/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
