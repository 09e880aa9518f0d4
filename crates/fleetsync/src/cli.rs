//! Clap derive structures for the `fleetsync` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fleetsync -- operate a kiosk fleet from the command line
#[derive(Debug, Parser)]
#[command(
    name = "fleetsync",
    version,
    about = "Operate unattended rental kiosk stations from the command line",
    long_about = "Lock, unlock and eject slots, toggle stations, open tunnels and \
        refund rentals.\n\n\
        Commands go out over the command channel; station state comes from \
        the document store. Every mutating command waits for its confirmation.",
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
    /// Fleet profile to use
    #[arg(long, short = 'p', env = "FLEETSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Command channel WebSocket URL (overrides profile)
    #[arg(long, env = "FLEETSYNC_CHANNEL_URL", global = true)]
    pub channel_url: Option<String>,

    /// Document store base URL (overrides profile)
    #[arg(long, env = "FLEETSYNC_STORE_URL", global = true)]
    pub store_url: Option<String>,

    /// Fleet token
    #[arg(long, env = "FLEETSYNC_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Connect as the administrative channel
    #[arg(long, global = true)]
    pub admin: bool,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "FLEETSYNC_OUTPUT",
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

    /// Seconds to wait for connection, first snapshot, and confirmation
    #[arg(long, env = "FLEETSYNC_TIMEOUT", default_value = "30", global = true)]
    pub timeout: u64,
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
    /// Stream notices and connection state until interrupted
    Watch(WatchArgs),

    /// List stations from the first snapshot
    #[command(alias = "ls")]
    Stations(StationsArgs),

    /// Lock, unlock or eject a single slot
    Slot(SlotArgs),

    /// Station-level operations
    #[command(alias = "st")]
    Station(StationArgs),

    /// Rental records and refunds
    Rental(RentalArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Also print a line whenever a station changes
    #[arg(long)]
    pub stations: bool,
}

// ── Stations ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StationsArgs {
    /// Only show disabled stations
    #[arg(long)]
    pub disabled: bool,
}

// ── Slot ─────────────────────────────────────────────────────────────

/// A `(station, module, slot)` address.
#[derive(Debug, Args)]
pub struct SlotAddress {
    /// Station id
    pub station: String,
    /// Module id
    pub module: u32,
    /// Slot position within the module
    pub slot: u32,
}

#[derive(Debug, Args)]
pub struct SlotArgs {
    #[command(subcommand)]
    pub command: SlotCommand,
}

#[derive(Debug, Subcommand)]
pub enum SlotCommand {
    /// Lock a slot
    Lock {
        #[command(flatten)]
        at: SlotAddress,
        /// Reason shown to other operators
        #[arg(long, short = 'r')]
        reason: Option<String>,
    },
    /// Unlock a slot
    Unlock {
        #[command(flatten)]
        at: SlotAddress,
    },
    /// Eject the power bank in a slot
    Eject {
        #[command(flatten)]
        at: SlotAddress,
    },
}

// ── Station ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StationArgs {
    #[command(subcommand)]
    pub command: StationCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EjectScope {
    /// Every occupied slot
    All,
    /// Every fully charged slot
    Full,
    /// Every empty slot
    Empty,
    /// Every locked slot
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TunnelArg {
    Ngrok,
    Ssh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TunnelAction {
    Connect,
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UpdateArg {
    Flow,
    Ui,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

#[derive(Debug, Subcommand)]
pub enum StationCommand {
    /// Show one station with every slot
    Show {
        /// Station id
        station: String,
    },
    /// Put a station back into service
    Enable {
        /// Station id
        station: String,
    },
    /// Take a station out of service
    Disable {
        /// Station id
        station: String,
    },
    /// Eject a whole module or every slot matching a scope
    #[command(group = clap::ArgGroup::new("target").required(true))]
    Eject {
        /// Station id
        station: String,
        /// Eject every slot of one module
        #[arg(long, short = 'm', group = "target")]
        module: Option<u32>,
        /// Eject every slot matching a scope
        #[arg(long, short = 's', group = "target")]
        scope: Option<EjectScope>,
    },
    /// Open or close a remote maintenance tunnel
    Tunnel {
        /// Station id
        station: String,
        /// Tunnel kind
        kind: TunnelArg,
        /// Connect or disconnect
        action: TunnelAction,
    },
    /// Update station software
    Update {
        /// Station id
        station: String,
        /// What to update
        target: UpdateArg,
    },
    /// Register a new station
    Provision {
        /// Provisioning handle for the new station
        station: String,
    },
    /// Switch a module's charging output
    Output {
        /// Station id
        station: String,
        /// Module id
        module: u32,
        /// On or off
        state: Switch,
    },
    /// Change station settings (KEY=VALUE, values parsed as JSON when possible)
    Set {
        /// Station id
        station: String,
        /// Settings to change
        #[arg(required = true, value_name = "KEY=VALUE")]
        settings: Vec<String>,
    },
    /// Drop every pending marker on a station
    ClearPending {
        /// Station id
        station: String,
    },
}

// ── Rental ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RentalArgs {
    #[command(subcommand)]
    pub command: RentalCommand,
}

#[derive(Debug, Subcommand)]
pub enum RentalCommand {
    /// List rentals from the first snapshot
    List {
        /// Only rentals started at this station
        #[arg(long)]
        station: Option<String>,
    },
    /// Refund a rental
    Refund {
        /// Station the rental belongs to
        station: String,
        /// Rental id
        rental: String,
        /// Amount in minor units (full refund if omitted)
        #[arg(long)]
        amount: Option<i64>,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display current resolved configuration
    Show,

    /// Write a profile to the config file
    Init {
        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,
        /// Command channel WebSocket URL
        #[arg(long = "channel", value_name = "URL")]
        channel: String,
        /// Document store base URL
        #[arg(long = "store", value_name = "URL")]
        store: String,
        /// Environment variable holding the token
        #[arg(long)]
        token_env: Option<String>,
        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },

    /// List configured profiles
    Profiles,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
