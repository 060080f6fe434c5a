//! Binary entrypoint for the kenflow launcher tools.
use std::{path::PathBuf, process};

use clap::{Parser, Subcommand, ValueEnum};
use kenflow_coord::CoordConfig;
use kenflow_protocol::ItemKind;
use logging::LogArgs;
use tracing::error;

/// One-shot commands against the backend and the local state.
mod commands;
/// Headless interactive session driven from stdin.
mod session;

#[derive(Parser, Debug)]
#[command(name = "kenflow", about = "Quick message launcher tools", version)]
/// Command-line interface for the `kenflow` binary.
struct Cli {
    /// Backend base URL (default: $KENFLOW_BACKEND_URL, then http://127.0.0.1:5000/api)
    #[arg(long, value_name = "URL", global = true)]
    backend: Option<String>,

    /// Directory holding local state (default: $KENFLOW_DATA_DIR, then the platform data dir)
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Logging controls
    #[command(flatten)]
    log: LogArgs,

    /// Which subcommand to run
    #[command(subcommand)]
    command: Command,
}

/// Library item kind on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ItemArg {
    /// A single message.
    Message,
    /// An ordered combination of messages.
    Combination,
}

impl From<ItemArg> for ItemKind {
    fn from(a: ItemArg) -> Self {
        match a {
            ItemArg::Message => Self::Message,
            ItemArg::Combination => Self::Combination,
        }
    }
}

#[derive(Subcommand, Debug)]
/// Top-level CLI subcommands.
enum Command {
    /// Wait until the backend answers, then exit.
    Wait,

    /// Persisted window geometry.
    #[command(subcommand)]
    Geometry(GeometryCmd),

    /// The overlay's quick-access list.
    #[command(subcommand)]
    Selection(SelectionCmd),

    /// Windows message delivery is restricted to.
    #[command(subcommand)]
    Targets(TargetsCmd),

    /// Hotkey ownership.
    #[command(subcommand)]
    Hotkey(HotkeyCmd),

    /// Global hotkey listener.
    #[command(subcommand)]
    Listener(ListenerCmd),

    /// Type a message or combination into the target windows.
    Send {
        /// Item kind
        #[arg(value_enum)]
        kind: ItemArg,
        /// Item id
        id: i64,
    },

    /// Dark or light theme.
    #[command(subcommand)]
    Theme(ThemeCmd),

    /// Run every surface headless, reading commands from stdin.
    ///
    /// Type `help` inside the session for the command list.
    Session,
}

#[derive(Subcommand, Debug)]
/// `geometry` subcommands.
enum GeometryCmd {
    /// Print the saved Main and Overlay geometry.
    Show,
}

#[derive(Subcommand, Debug)]
/// `selection` subcommands.
enum SelectionCmd {
    /// Print the quick-access list in order.
    List,
    /// Append an item.
    Add {
        /// Item kind
        #[arg(value_enum)]
        kind: ItemArg,
        /// Item id
        id: i64,
    },
    /// Remove an item.
    Remove {
        /// Item kind
        #[arg(value_enum)]
        kind: ItemArg,
        /// Item id
        id: i64,
    },
    /// Move the entry at FROM to TO (zero-based).
    Move {
        /// Current position
        from: usize,
        /// New position
        to: usize,
    },
}

#[derive(Subcommand, Debug)]
/// `targets` subcommands.
enum TargetsCmd {
    /// Print the committed target windows.
    Show,
    /// Print the windows currently open.
    Available,
    /// Restrict delivery to the given titles.
    Set {
        /// Window titles
        #[arg(num_args = 1.., value_name = "TITLE")]
        titles: Vec<String>,
    },
    /// Deliver to every window.
    Clear,
}

#[derive(Subcommand, Debug)]
/// `hotkey` subcommands.
enum HotkeyCmd {
    /// Report which item, if any, holds a combo.
    Check {
        /// Key combo, e.g. ctrl+shift+1
        combo: String,
    },
    /// Give a combo to an item.
    Assign {
        /// Key combo, e.g. ctrl+shift+1
        combo: String,
        /// Item kind
        #[arg(value_enum)]
        kind: ItemArg,
        /// Item id
        id: i64,
        /// Take the combo from its current holder without asking
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
/// `listener` subcommands.
enum ListenerCmd {
    /// Register the global hotkeys.
    Start,
    /// Unregister the global hotkeys.
    Stop,
    /// Print whether the listener is active.
    Status,
    /// Re-read hotkey assignments.
    Refresh,
}

#[derive(Subcommand, Debug)]
/// `theme` subcommands.
enum ThemeCmd {
    /// Print the active theme.
    Show,
    /// Switch between dark and light.
    Toggle,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log);
    let config = CoordConfig::resolve(cli.backend, cli.data_dir);

    if let Err(e) = commands::run(cli.command, config).await {
        error!(error = %e, "command failed");
        eprintln!("error: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "kenflow",
            "hotkey",
            "assign",
            "ctrl+1",
            "message",
            "4",
            "--yes",
            "--backend",
            "http://localhost:9000/api",
        ])
        .unwrap();
        assert_eq!(cli.backend.as_deref(), Some("http://localhost:9000/api"));
        match cli.command {
            Command::Hotkey(HotkeyCmd::Assign { combo, kind, id, yes }) => {
                assert_eq!(combo, "ctrl+1");
                assert_eq!(kind, ItemArg::Message);
                assert_eq!(id, 4);
                assert!(yes);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn targets_set_needs_a_title() {
        assert!(Cli::try_parse_from(["kenflow", "targets", "set"]).is_err());
    }
}
