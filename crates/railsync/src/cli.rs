//! Clap derive structures for the `railsync` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// railsync -- live panel for DCC model-railroad controllers
#[derive(Debug, Parser)]
#[command(
    name = "railsync",
    version,
    about = "Drive and watch a model-railroad controller from the command line",
    long_about = "Mirrors a model-railroad controller's connections, throttles, and\n\
        accessories by combining HTTP polling, the server-sent event stream,\n\
        and the JSON command channel.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Controller profile to use
    #[arg(long, short = 'p', env = "RAILSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller URL (overrides profile)
    #[arg(long, short = 'c', env = "RAILSYNC_CONTROLLER", global = true)]
    pub controller: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "RAILSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "RAILSYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "RAILSYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Emit diagnostic logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow the controller live: status, traffic, and channel frames
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// List command-station connections
    #[command(alias = "conn", alias = "ls")]
    Connections,

    /// List supported command-station systems
    Systems,

    /// List serial ports on the controller host
    Ports,

    /// Open a throttle and drive a train
    #[command(alias = "t")]
    Throttle(ThrottleArgs),

    /// Close or throw a turnout
    #[command(alias = "acc", alias = "a")]
    Accessory(AccessoryArgs),

    /// Ask a command station to report its version
    RequestVersion {
        /// Connection ID
        id: String,
    },

    /// Grant or revoke a controller role
    SetRole(SetRoleArgs),

    /// Create a command-station connection
    Create(CreateArgs),

    /// Switch track power through the command channel
    Power(PowerArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Write diagnostic logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Do not subscribe to the event stream
    #[arg(long)]
    pub no_events: bool,

    /// Do not open the command channel
    #[arg(long)]
    pub no_channel: bool,
}

// ── Throttle ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ThrottleArgs {
    /// DCC address of the train
    pub address: u32,

    /// Use long (4-digit) addressing
    #[arg(long, short = 'l')]
    pub long: bool,

    /// Speed in percent (0-100)
    #[arg(long, short = 's', value_parser = clap::value_parser!(u8).range(0..=100))]
    pub speed: Option<u8>,

    /// Drive in reverse
    #[arg(long, conflicts_with = "forward")]
    pub reverse: bool,

    /// Drive forward
    #[arg(long)]
    pub forward: bool,

    /// Set a function, e.g. `--function 0=on --function 5=off`
    #[arg(long = "function", short = 'f', value_name = "N=on|off", value_parser = parse_function)]
    pub functions: Vec<(u32, bool)>,

    /// Release the throttle when done
    #[arg(long)]
    pub close: bool,
}

/// Parse `N=on|off` into a function number and state.
fn parse_function(raw: &str) -> Result<(u32, bool), String> {
    let (number, state) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected N=on|off, got '{raw}'"))?;
    let number: u32 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid function number '{number}'"))?;
    let on = match state.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => true,
        "off" | "false" | "0" => false,
        other => return Err(format!("expected on or off, got '{other}'")),
    };
    Ok((number, on))
}

// ── Accessory ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AccessoryArgs {
    /// Accessory (turnout) address
    pub address: u32,

    /// Target state
    pub state: TurnoutState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TurnoutState {
    Closed,
    Thrown,
}

// ── Connections ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetRoleArgs {
    /// Connection ID
    pub id: String,

    /// Role to change
    pub role: RoleArg,

    /// Revoke the role instead of granting it
    #[arg(long)]
    pub disable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Throttles,
    Accessories,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// New connection ID
    pub id: String,

    /// System type (see `railsync systems`)
    #[arg(long)]
    pub system: String,

    /// Host of a network command station
    #[arg(long, requires = "port", conflicts_with = "serial_port")]
    pub host: Option<String>,

    /// TCP port of a network command station
    #[arg(long, requires = "host")]
    pub port: Option<u16>,

    /// Serial port of a serial command station (see `railsync ports`)
    #[arg(long, required_unless_present = "host")]
    pub serial_port: Option<String>,

    /// Serial baud rate
    #[arg(long, requires = "serial_port")]
    pub baud: Option<u32>,

    /// Serial flow control
    #[arg(long, requires = "serial_port")]
    pub flow_control: Option<String>,

    /// Display name
    #[arg(long)]
    pub user_name: Option<String>,

    /// System prefix
    #[arg(long)]
    pub prefix: Option<String>,
}

// ── Power ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PowerArgs {
    /// Connection ID
    pub id: String,

    /// Target power state
    pub state: PowerArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerArg {
    On,
    Off,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
