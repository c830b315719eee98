use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use panos_reconcile::config::ProviderConfig;
use panos_reconcile::error::Error;
use panos_reconcile::plan::{Action, Plan};
use panos_reconcile::provider::Provider;
use panos_reconcile::transport::local::LocalTransport;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use xml_config_core::XmlNode;

mod cli;

use cli::{
    ApplyArgs, Cli, Command, DestroyArgs, DeviceArgs, ImportArgs, OutputFormat, ParseImportIdArgs,
    PlanArgs, ResourceArgs,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = ProviderConfig::load(cli.config.as_deref())
        .context("failed to load provider settings")?;

    match cli.command {
        Command::ImportId(args) => run_import_id(&config, args),
        Command::ParseImportId(args) => run_parse_import_id(&config, args),
        Command::Validate(args) => run_validate(&config, args),
        Command::Plan(args) => run_plan(&config, args),
        Command::Apply(args) => run_apply(&config, args),
        Command::Destroy(args) => run_destroy(&config, args),
        Command::Import(args) => run_import(&config, args),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Provider for commands that never reach a device.
fn offline(config: &ProviderConfig) -> Result<Provider> {
    let transport = Arc::new(LocalTransport::new(XmlNode::new("config")));
    Ok(Provider::configure(config, transport)?)
}

fn open_device(config: &ProviderConfig, args: &DeviceArgs) -> Result<(Arc<LocalTransport>, Provider)> {
    let mut transport = LocalTransport::from_file(&args.device)
        .with_context(|| format!("failed to parse {}", args.device.display()))?;
    if args.no_rename {
        transport = transport.without_rename();
    }
    if args.no_move_group {
        transport = transport.without_move_group();
    }
    let transport = Arc::new(transport);
    let provider = Provider::configure(config, transport.clone())?;
    Ok((transport, provider))
}

fn save_device(transport: &LocalTransport, args: &DeviceArgs) -> Result<()> {
    if transport.mutation_count() == 0 {
        return Ok(());
    }
    let path = args.output.as_ref().unwrap_or(&args.device);
    transport
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse JSON in {}", path.display()))
}

fn read_state(path: Option<&Path>) -> Result<Option<Value>> {
    match path {
        Some(path) if path.exists() => Ok(Some(read_json(path)?).filter(|v| !v.is_null())),
        _ => Ok(None),
    }
}

fn write_state(path: &Path, state: Option<&Value>) -> Result<()> {
    match state {
        Some(state) => fs::write(path, serde_json::to_string_pretty(state)? + "\n")
            .with_context(|| format!("failed to write {}", path.display())),
        None if path.exists() => {
            fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))
        }
        None => Ok(()),
    }
}

/// Print collected validation failures one per line before failing.
fn explain(err: Error) -> anyhow::Error {
    for failure in err.validation_errors() {
        eprintln!("{} [{}] {failure}", "error:".red().bold(), failure.code());
    }
    err.into()
}

fn run_import_id(config: &ProviderConfig, args: ResourceArgs) -> Result<()> {
    let provider = offline(config)?;
    let desired = read_json(&args.desired)?;
    let id = provider
        .generate_import_id(&args.resource, &desired)
        .map_err(explain)?;
    println!("{id}");
    Ok(())
}

fn run_parse_import_id(config: &ProviderConfig, args: ParseImportIdArgs) -> Result<()> {
    let provider = offline(config)?;
    let id = provider.parse_import_id(&args.id).map_err(explain)?;
    match args.format {
        OutputFormat::Text => {
            println!("type:  {}", id.type_name);
            println!("scope: {}", id.scope);
            if !id.names.is_empty() {
                println!("names: {}", id.names.join(", "));
            }
        }
        OutputFormat::Json => {
            let report = json!({
                "type": id.type_name,
                "location": id.scope.to_value(),
                "names": id.names,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn run_validate(config: &ProviderConfig, args: ResourceArgs) -> Result<()> {
    let provider = offline(config)?;
    let desired = read_json(&args.desired)?;
    provider
        .validate(&args.resource, &desired)
        .map_err(explain)
        .with_context(|| format!("{} is not a valid {}", args.desired.display(), args.resource))?;
    println!("{} {} is a valid {}", "ok".green(), args.desired.display(), args.resource);
    Ok(())
}

fn run_plan(config: &ProviderConfig, args: PlanArgs) -> Result<()> {
    let provider = offline(config)?;
    let desired = read_json(&args.resource.desired)?;
    let prior = read_state(args.state.as_deref())?;
    let plan = provider
        .plan(&args.resource.resource, Some(&desired), prior.as_ref())
        .map_err(explain)?;
    match args.format {
        OutputFormat::Text => println!("{}", render_plan(&args.resource.resource, &plan)),
        OutputFormat::Json => {
            let report = json!({
                "resource": args.resource.resource,
                "action": action_label(&plan.action),
                "replace_paths": match &plan.action {
                    Action::Replace { paths } => paths.clone(),
                    _ => Vec::new(),
                },
                "planned": plan.planned,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn run_apply(config: &ProviderConfig, args: ApplyArgs) -> Result<()> {
    let (transport, provider) = open_device(config, &args.device)?;
    let desired = read_json(&args.resource.desired)?;
    let prior = read_state(Some(args.device.state.as_path()))?;
    let (plan, state) = provider
        .apply(&args.resource.resource, Some(&desired), prior.as_ref(), &CancellationToken::new())
        .map_err(explain)?;
    save_device(&transport, &args.device)?;
    write_state(&args.device.state, state.as_ref())?;
    println!("{}", render_plan(&args.resource.resource, &plan));
    println!("{} mutating call(s)", transport.mutation_count());
    Ok(())
}

fn run_destroy(config: &ProviderConfig, args: DestroyArgs) -> Result<()> {
    let (transport, provider) = open_device(config, &args.device)?;
    let Some(prior) = read_state(Some(args.device.state.as_path()))? else {
        println!("{}: nothing to destroy", args.resource);
        return Ok(());
    };
    let (plan, _) = provider.apply(&args.resource, None, Some(&prior), &CancellationToken::new())?;
    save_device(&transport, &args.device)?;
    write_state(&args.device.state, None)?;
    println!("{}", render_plan(&args.resource, &plan));
    Ok(())
}

fn run_import(config: &ProviderConfig, args: ImportArgs) -> Result<()> {
    let (_, provider) = open_device(config, &args.device)?;
    let (resource, state) = provider
        .import(&args.id, &CancellationToken::new())
        .map_err(explain)?;
    write_state(&args.device.state, Some(&state))?;
    println!("imported {resource} into {}", args.device.state.display());
    Ok(())
}

fn action_label(action: &Action) -> &'static str {
    match action {
        Action::None => "none",
        Action::Create => "create",
        Action::Update => "update",
        Action::Replace { .. } => "replace",
        Action::Delete => "delete",
    }
}

fn render_plan(resource: &str, plan: &Plan) -> String {
    let action = plan.action.to_string();
    let action = match plan.action {
        Action::None => action.dimmed(),
        Action::Create => action.green(),
        Action::Update => action.yellow(),
        Action::Replace { .. } | Action::Delete => action.red(),
    };
    format!("{}: {action}", resource.bold())
}
