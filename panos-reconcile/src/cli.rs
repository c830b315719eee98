use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "panos-reconcile")]
#[command(about = "Plan and apply declared firewall resources against a configuration file")]
pub struct Cli {
    /// Provider settings file (TOML). PANOS_* environment variables override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Print the import identifier of a declared resource.
    ImportId(ResourceArgs),
    /// Decode an import identifier.
    ParseImportId(ParseImportIdArgs),
    /// Check a declared resource without touching any device.
    Validate(ResourceArgs),
    /// Show what applying a declared resource would do.
    Plan(PlanArgs),
    /// Apply a declared resource to a device configuration file.
    Apply(ApplyArgs),
    /// Remove a managed resource from a device configuration file.
    Destroy(DestroyArgs),
    /// Write the state of an existing object, named by its import identifier.
    Import(ImportArgs),
}

#[derive(Parser, Debug)]
pub struct ResourceArgs {
    /// Resource type, for example `address` or `security_policy`.
    pub resource: String,
    /// JSON file holding the declared value.
    pub desired: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ParseImportIdArgs {
    pub id: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,
    /// Prior state file. A missing file means the resource does not exist yet.
    #[arg(long)]
    pub state: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct DeviceArgs {
    /// Device configuration XML, read and written in place.
    #[arg(long)]
    pub device: PathBuf,
    /// Write the resulting configuration here instead of over --device.
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Resource state file, read as prior state and rewritten afterwards.
    #[arg(long)]
    pub state: PathBuf,
    /// Treat the device as unable to rename entries.
    #[arg(long)]
    pub no_rename: bool,
    /// Treat the device as unable to move several entries at once.
    #[arg(long)]
    pub no_move_group: bool,
}

#[derive(Parser, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Parser, Debug)]
pub struct DestroyArgs {
    pub resource: String,
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    pub id: String,
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
