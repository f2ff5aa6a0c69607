use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use aws_config::BehaviorVersion;
use clap::{Args, Parser, Subcommand};
use lambda_runtime::{LambdaEvent, service_fn};
use miette::IntoDiagnostic;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use kf_file_registry::config::Config;
use kf_file_registry::dataservice::DataserviceHttpClient;
use kf_file_registry::domain::{BatchResult, Notification};
use kf_file_registry::error::RegistryError;
use kf_file_registry::fanout::{Fanout, ScanRequest};
use kf_file_registry::handler::BatchHandler;
use kf_file_registry::lambda::{LambdaContext, LambdaDispatcher, WallClock};
use kf_file_registry::notify::{LogNotifier, Notifier, SlackNotifier};
use kf_file_registry::output::JsonOutput;
use kf_file_registry::s3::S3ObjectStore;

const LOCAL_FUNCTION_NAME: &str = "kf-file-registry";

#[derive(Parser)]
#[command(name = "kf-file-registry")]
#[command(about = "Registers harmonized genomic files from S3 notifications in the dataservice")]
#[command(version)]
struct Cli {
    /// Runs the registry Lambda function when no command is given.
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the bucket fan-out Lambda function")]
    Invoker,
    #[command(about = "Register the files of a notification payload locally")]
    Import(ImportArgs),
    #[command(about = "Invoke the registry for every object under a bucket prefix")]
    Scan(ScanArgs),
}

#[derive(Args)]
struct ImportArgs {
    /// Path to a JSON payload of the form {"Records": [...]}.
    event: PathBuf,

    #[arg(long, default_value_t = 900)]
    budget_secs: u64,
}

#[derive(Args)]
struct ScanArgs {
    #[arg(long)]
    bucket: String,

    #[arg(long, default_value = "")]
    prefix: String,

    #[arg(long, default_value_t = 900)]
    budget_secs: u64,
}

struct Adapters {
    store: S3ObjectStore,
    dispatcher: LambdaDispatcher,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<RegistryError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RegistryError) -> u8 {
    match error {
        RegistryError::MissingEnv(_) | RegistryError::ConfigParse(_) => 2,
        RegistryError::InvalidPayload(_) => 2,
        RegistryError::DataserviceHttp(_)
        | RegistryError::DataserviceStatus { .. }
        | RegistryError::ObjectStore(_)
        | RegistryError::Dispatch(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    let aws = runtime.block_on(aws_config::load_defaults(BehaviorVersion::latest()));
    let adapters = Adapters {
        store: S3ObjectStore::new(aws_sdk_s3::Client::new(&aws), runtime.handle().clone()),
        dispatcher: LambdaDispatcher::new(
            aws_sdk_lambda::Client::new(&aws),
            runtime.handle().clone(),
        ),
    };
    tracing::trace!("initialized aws clients");

    match cli.command {
        None => serve_registry(&runtime, &config, adapters),
        Some(Commands::Invoker) => serve_invoker(&runtime, &config, adapters),
        Some(Commands::Import(args)) => run_import(args, &config, adapters),
        Some(Commands::Scan(args)) => run_scan(args, &config, adapters),
    }
}

fn batch_handler(
    config: &Config,
    adapters: Adapters,
) -> miette::Result<BatchHandler<S3ObjectStore, DataserviceHttpClient, LambdaDispatcher>> {
    let dataservice = DataserviceHttpClient::new(
        config.require_dataservice_api()?,
        config.dataservice_token.as_deref(),
    )?;
    Ok(
        BatchHandler::new(adapters.store, dataservice, adapters.dispatcher)
            .with_low_water_mark(config.low_water_mark),
    )
}

fn notifier(config: &Config) -> miette::Result<Arc<dyn Notifier>> {
    match &config.slack_token {
        Some(token) if !config.slack_channels.is_empty() => Ok(Arc::new(SlackNotifier::new(
            token,
            config.slack_channels.clone(),
        )?)),
        _ => Ok(Arc::new(LogNotifier)),
    }
}

fn serve_registry(runtime: &Runtime, config: &Config, adapters: Adapters) -> miette::Result<()> {
    let handler = Arc::new(batch_handler(config, adapters)?);
    tracing::info!("initiating registry lambda");

    let func = service_fn(move |event: LambdaEvent<Notification>| {
        let handler = handler.clone();
        async move {
            let ctx = LambdaContext::from(&event.context);
            let payload = event.payload;
            let result =
                tokio::task::spawn_blocking(move || handler.handle(payload, &ctx)).await?;
            Ok::<BatchResult, lambda_runtime::Error>(result)
        }
    });

    runtime
        .block_on(lambda_runtime::run(func))
        .map_err(|err| miette::miette!("lambda runtime failed: {err}"))
}

fn serve_invoker(runtime: &Runtime, config: &Config, adapters: Adapters) -> miette::Result<()> {
    let target = config.require_file_registry()?.to_string();
    let notifier = notifier(config)?;
    let adapters = Arc::new(adapters);
    tracing::info!(%target, "initiating fan-out lambda");

    let func = service_fn(move |event: LambdaEvent<ScanRequest>| {
        let adapters = adapters.clone();
        let notifier = notifier.clone();
        let target = target.clone();
        async move {
            let ctx = LambdaContext::from(&event.context);
            let request = event.payload;
            let summary = tokio::task::spawn_blocking(move || {
                Fanout::new(
                    &adapters.store,
                    &adapters.dispatcher,
                    notifier.as_ref(),
                    target,
                )
                .run(&request.bucket, &request.prefix, &ctx)
            })
            .await??;
            Ok::<String, lambda_runtime::Error>(summary.to_string())
        }
    });

    runtime
        .block_on(lambda_runtime::run(func))
        .map_err(|err| miette::miette!("lambda runtime failed: {err}"))
}

fn run_import(args: ImportArgs, config: &Config, adapters: Adapters) -> miette::Result<()> {
    let raw = std::fs::read_to_string(&args.event).into_diagnostic()?;
    let notification: Notification = serde_json::from_str(&raw)
        .map_err(|err| RegistryError::InvalidPayload(err.to_string()))?;

    let function_name = config
        .file_registry
        .clone()
        .unwrap_or_else(|| LOCAL_FUNCTION_NAME.to_string());
    let ctx = WallClock::new(Duration::from_secs(args.budget_secs), function_name);

    let handler = batch_handler(config, adapters)?;
    let result = handler.handle(notification, &ctx);
    JsonOutput::print_batch(&result).into_diagnostic()?;
    Ok(())
}

fn run_scan(args: ScanArgs, config: &Config, adapters: Adapters) -> miette::Result<()> {
    let target = config.require_file_registry()?;
    let notifier = notifier(config)?;
    let ctx = WallClock::new(Duration::from_secs(args.budget_secs), target);

    let summary = Fanout::new(
        &adapters.store,
        &adapters.dispatcher,
        notifier.as_ref(),
        target,
    )
    .run(&args.bucket, &args.prefix, &ctx)?;
    JsonOutput::print_fanout(&summary).into_diagnostic()?;
    Ok(())
}
