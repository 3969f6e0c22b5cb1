//! Clap derive structures for the `replifactory` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.
//! Compiled into `build.rs` as well, so it depends on clap only.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// replifactory -- drive a Replifactory turbidostat from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "replifactory",
    version,
    about = "Control Replifactory turbidostats from the command line",
    long_about = "Operate a Replifactory morbidostat/turbidostat through its web gateway.\n\n\
        Every command talks to the backend behind the proxy's API prefix;\n\
        the backend stays the source of truth for hardware and experiments.",
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
    /// Gateway profile to use
    #[arg(long, short = 'p', env = "REPLIFACTORY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Gateway API base URL (overrides profile), e.g. http://replifactory.local:3000/api
    #[arg(long, short = 'g', env = "REPLIFACTORY_GATEWAY", global = true)]
    pub gateway: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "REPLIFACTORY_OUTPUT",
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

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "REPLIFACTORY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    JsonCompact,
    Yaml,
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

// ── Command Tree ─────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect and actuate the device hardware
    #[command(alias = "dev", alias = "devices")]
    Device(DeviceArgs),

    /// Manage experiments and their parameters
    #[command(alias = "exp", alias = "experiment")]
    Experiments(ExperimentsArgs),

    /// Fetch per-vial culture or simulation plots
    Plot(PlotArgs),

    /// Follow backend notifications and progress messages
    #[command(alias = "notify")]
    Notifications(NotificationsArgs),

    /// Show the backend host name
    Host,

    /// Manage the public tunnel through the proxy
    Tunnel(TunnelArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━ DEVICE ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hardware part family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PartArg {
    Valves,
    Pumps,
    Stirrers,
    Ods,
    #[value(alias = "temperatures")]
    Thermometers,
    Leds,
}

#[derive(Debug, Args)]
pub struct DeviceArgs {
    #[command(subcommand)]
    pub command: DeviceCommand,
}

#[derive(Debug, Subcommand)]
pub enum DeviceCommand {
    /// Fetch and show the device tree
    #[command(alias = "get")]
    Show {
        /// Only show this part family
        #[arg(long)]
        part: Option<PartArg>,

        /// Include calibration maps
        #[arg(long)]
        calibration: bool,
    },

    /// Connect the backend to the hardware
    Connect,

    /// Set one part's state (e.g. `valves 1 open`, `stirrers 3 high`)
    SetState {
        part: PartArg,
        index: u8,
        /// New state: a label, or a number for numeric parts
        state: String,
        /// Extra JSON input sent alongside the state
        #[arg(long)]
        input: Option<String>,
    },

    /// Replace one part's calibration map
    Calibrate {
        part: PartArg,
        index: u8,
        /// Calibration point as INPUT=OUTPUT (repeatable; empty OUTPUT clears it)
        #[arg(long = "point", value_name = "INPUT=OUTPUT", required_unless_present = "from_file")]
        points: Vec<String>,
        /// Read the calibration map from a JSON file
        #[arg(long, conflicts_with = "points")]
        from_file: Option<PathBuf>,
    },

    /// Save a valve calibration map
    ValveCalibrate {
        index: u8,
        /// Calibration point as INPUT=OUTPUT (repeatable; empty OUTPUT clears it)
        #[arg(long = "point", value_name = "INPUT=OUTPUT", required_unless_present = "from_file")]
        points: Vec<String>,
        /// Read the calibration map from a JSON file
        #[arg(long, conflicts_with = "points")]
        from_file: Option<PathBuf>,
    },

    /// Take a reading from one part
    Measure { part: PartArg, index: u8 },

    /// Measure several OD sensors at once (all vials when none given)
    MeasureOds {
        #[arg(value_delimiter = ',')]
        vials: Vec<u8>,
    },

    /// Set every stirrer to the same state
    Stirrers { state: String },

    /// Set an LED color
    Led {
        vial: u8,
        red: u8,
        green: u8,
        blue: u8,
    },

    /// Edit the OD calibration table
    #[command(name = "od-cal")]
    OdCal(OdCalArgs),

    /// Run the pump calibration sequence
    PumpCalibrate {
        pump: u8,
        /// Rotations per iteration
        #[arg(long, default_value_t = 10.0)]
        rotations: f64,
        /// Number of iterations
        #[arg(long, default_value_t = 1)]
        iterations: u32,
    },

    /// Persist the current calibration on the backend
    SaveCalibration,

    /// List saved device configs
    Configs,

    /// Load a saved device config
    LoadConfig { filename: String },

    /// Measure the speed of every stirrer
    StirrerSpeeds,

    /// Drive every OD sensor to its maximum signal and show the maxima
    OdTest,

    /// Sweep every stirrer and show the measured speed profiles
    StirrerTest,
}

#[derive(Debug, Args)]
pub struct OdCalArgs {
    #[command(subcommand)]
    pub command: OdCalCommand,
}

#[derive(Debug, Subcommand)]
pub enum OdCalCommand {
    /// Set one sensor's reading for a reference OD (omit VALUE to clear)
    Set {
        od: String,
        sensor: u8,
        value: Option<f64>,
    },

    /// Rename a reference OD row across every sensor
    Rename { old: String, new: String },

    /// Remove a reference OD row from every sensor
    Remove { od: String },

    /// Measure every sensor for a reference OD
    Measure { od: String },
}

// ━━━ EXPERIMENTS ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ExperimentsArgs {
    #[command(subcommand)]
    pub command: ExperimentsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ExperimentsCommand {
    /// List all experiments
    #[command(alias = "ls")]
    List,

    /// Create an experiment and make it current
    Create { name: String },

    /// Make an experiment current
    Select { id: i64 },

    /// Show the current experiment
    Current,

    /// Start the current experiment
    Start,

    /// Stop the current experiment
    Stop,

    /// Pause the current experiment
    Pause,

    /// Show or replace experiment parameters
    Params {
        /// Experiment id (default: current)
        #[arg(long, conflicts_with = "from_file")]
        id: Option<i64>,
        /// Replace the current experiment's parameters from a JSON file
        #[arg(long)]
        from_file: Option<PathBuf>,
    },

    /// Show or replace the current experiment's growth parameters
    Growth {
        /// Replace growth parameters from a JSON file
        #[arg(long)]
        from_file: Option<PathBuf>,
    },

    /// Run a growth simulation for one vial
    Simulate {
        vial: u8,
        /// Simulated duration in hours (1-240)
        #[arg(long, default_value_t = 48)]
        hours: u32,
    },
}

// ━━━ PLOT ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct PlotArgs {
    /// Vial number, or `all`
    pub target: String,

    /// Vials to include with `all` (default: every vial)
    #[arg(long, value_delimiter = ',')]
    pub vials: Vec<u8>,

    /// Fetch the simulation plot instead of the culture plot
    #[arg(long)]
    pub simulation: bool,
}

// ━━━ NOTIFICATIONS ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct NotificationsArgs {
    #[command(subcommand)]
    pub command: NotificationsCommand,
}

#[derive(Debug, Subcommand)]
pub enum NotificationsCommand {
    /// Print notifications and progress until interrupted
    Watch {
        /// Stop after this many messages
        #[arg(long, short = 'n')]
        count: Option<usize>,

        /// Hide progress messages
        #[arg(long)]
        no_progress: bool,
    },
}

// ━━━ TUNNEL ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct TunnelArgs {
    #[command(subcommand)]
    pub command: TunnelCommand,
}

#[derive(Debug, Subcommand)]
pub enum TunnelCommand {
    /// Send a tunnel auth token to the proxy and restart the tunnel
    SetToken {
        /// Token value (prompted when omitted)
        #[arg(long, env = "REPLIFACTORY_TUNNEL_AUTHTOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Also store the token in the local keyring
        #[arg(long)]
        store: bool,
    },

    /// Show the public tunnel URL
    Url,

    /// Start the tunnel
    Start,

    /// Stop the tunnel
    Stop,
}

// ━━━ CONFIG ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive setup wizard
    Init,

    /// Show the resolved configuration
    Show,

    /// Print the config file path
    Path,
}

// ━━━ COMPLETIONS ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
