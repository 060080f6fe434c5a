use std::{result::Result as StdResult, str::FromStr, sync::Arc};

use kenflow_backend::Backend;
use kenflow_coord::{
    CoordConfig, Coordinator, Error, Result,
    host::MemoryHost,
    notify::ToastEvent,
    surfaces::{MainAction, OverlayAction, PickerAction, TargetAction},
};
use kenflow_protocol::{ItemKind, SelectionEntry, WindowKind};
use keycombo::{Combo, KeyEvent};
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    sync::mpsc::{self, UnboundedReceiver},
};
use tracing::{debug, info, warn};

/// Session command list printed by `help`.
const HELP: &str = "\
open KIND | close KIND          open or close a window (main, overlay, items, targets)
move KIND X Y | resize KIND W H simulate the user moving or resizing a window
windows                         list open windows and their bounds
view KIND                       print what a window currently shows
pick message|combination ID     toggle an item in the item picker
reorder FROM TO                 move an entry in the item picker
target TITLE                    toggle a window in the target picker
all-windows                     clear the target picker selection
send INDEX                      press an overlay button (zero-based)
run message|combination ID      send an item from the main window
key KIND COMBO                  press a key in a window, e.g. key items escape
overlay | theme | listener      toggle from the main window
quit                            close everything and exit";

/// One parsed session line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Print the command list.
    Help,
    /// Open a window.
    Open(WindowKind),
    /// Close a window.
    Close(WindowKind),
    /// The user dragged a window.
    Move(WindowKind, i32, i32),
    /// The user resized a window.
    Resize(WindowKind, u32, u32),
    /// List open windows.
    Windows,
    /// Print a window's view.
    View(WindowKind),
    /// Toggle an item in the item picker.
    Pick(SelectionEntry),
    /// Reorder the item picker list.
    Reorder(usize, usize),
    /// Toggle a target window.
    Target(String),
    /// Clear the target set.
    AllWindows,
    /// Press an overlay button.
    Send(usize),
    /// Send from Main.
    Run(ItemKind, i64),
    /// Key press in a window.
    Key(WindowKind, KeyEvent),
    /// Main's overlay button.
    ToggleOverlay,
    /// Main's theme button.
    ToggleTheme,
    /// Main's listener button.
    ToggleListener,
    /// Leave the session.
    Quit,
}

/// Parse a window kind argument.
fn kind_arg(arg: Option<&str>) -> StdResult<WindowKind, String> {
    let arg = arg.ok_or("missing window kind")?;
    WindowKind::from_name(arg).ok_or_else(|| format!("unknown window kind '{arg}'"))
}

/// Parse a numeric argument.
fn num_arg<T: FromStr>(arg: Option<&str>, what: &str) -> StdResult<T, String> {
    let arg = arg.ok_or_else(|| format!("missing {what}"))?;
    arg.parse().map_err(|_| format!("bad {what} '{arg}'"))
}

/// Parse an item kind argument.
fn item_arg(arg: Option<&str>) -> StdResult<ItemKind, String> {
    let arg = arg.ok_or("missing item kind")?;
    ItemKind::from_name(arg).ok_or_else(|| format!("unknown item kind '{arg}'"))
}

/// A key press from a combo spec such as `ctrl+enter`.
fn key_event(spec: &str) -> StdResult<KeyEvent, String> {
    let combo = Combo::parse(spec).map_err(|e| format!("bad key '{spec}': {e}"))?;
    Ok(combo
        .modifiers()
        .fold(KeyEvent::plain(combo.key()), KeyEvent::with))
}

/// Parse one input line; blank lines yield `None`.
fn parse(line: &str) -> StdResult<Option<Line>, String> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(None);
    };
    let parsed = match cmd.to_ascii_lowercase().as_str() {
        "help" | "?" => Line::Help,
        "open" => Line::Open(kind_arg(words.next())?),
        "close" => Line::Close(kind_arg(words.next())?),
        "move" => Line::Move(
            kind_arg(words.next())?,
            num_arg(words.next(), "x")?,
            num_arg(words.next(), "y")?,
        ),
        "resize" => Line::Resize(
            kind_arg(words.next())?,
            num_arg(words.next(), "width")?,
            num_arg(words.next(), "height")?,
        ),
        "windows" => Line::Windows,
        "view" => Line::View(kind_arg(words.next())?),
        "pick" => {
            let kind = item_arg(words.next())?;
            let id: i64 = num_arg(words.next(), "id")?;
            Line::Pick(SelectionEntry::new(id, kind))
        }
        "reorder" => Line::Reorder(num_arg(words.next(), "from")?, num_arg(words.next(), "to")?),
        "target" => {
            let title = words.collect::<Vec<_>>().join(" ");
            if title.is_empty() {
                return Err("missing window title".into());
            }
            Line::Target(title)
        }
        "all-windows" => Line::AllWindows,
        "send" => Line::Send(num_arg(words.next(), "index")?),
        "run" => Line::Run(item_arg(words.next())?, num_arg(words.next(), "id")?),
        "key" => {
            let kind = kind_arg(words.next())?;
            let spec = words.next().ok_or("missing key")?;
            Line::Key(kind, key_event(spec)?)
        }
        "overlay" => Line::ToggleOverlay,
        "theme" => Line::ToggleTheme,
        "listener" => Line::ToggleListener,
        "quit" | "exit" => Line::Quit,
        other => return Err(format!("unknown command '{other}', try help")),
    };
    Ok(Some(parsed))
}

/// Print toasts as they are raised.
async fn print_toasts(mut rx: UnboundedReceiver<ToastEvent>) {
    while let Some((kind, toast)) = rx.recv().await {
        println!("[{kind}] {:?}: {}", toast.kind, toast.text);
    }
}

/// A running session.
struct Session {
    /// Coordinator under control.
    coord: Coordinator,
    /// Windows live here.
    host: Arc<MemoryHost>,
}

impl Session {
    /// Fail unless `kind` is open.
    fn require_open(&self, kind: WindowKind) -> Result<()> {
        if self.coord.registry().is_open(kind) {
            Ok(())
        } else {
            Err(Error::Invalid(format!("{kind} is not open")))
        }
    }

    /// Apply one line. Returns `false` once the session should end.
    async fn apply(&self, line: Line) -> Result<bool> {
        let coord = &self.coord;
        let closed = || Error::Invalid("window is not open".into());
        match line {
            Line::Help => println!("{HELP}"),
            Line::Open(kind) => {
                if !coord.open_window(kind)? {
                    println!("{kind} already open");
                }
            }
            Line::Close(kind) => {
                if !coord.close_window(kind) {
                    println!("{kind} was not open");
                }
            }
            Line::Move(kind, x, y) => {
                let handle = coord.registry().handle(kind).ok_or_else(closed)?;
                self.host.user_move(handle.native(), x, y);
                coord.window_moved(kind);
            }
            Line::Resize(kind, w, h) => {
                let handle = coord.registry().handle(kind).ok_or_else(closed)?;
                self.host.user_resize(handle.native(), w, h);
                coord.window_resized(kind);
            }
            Line::Windows => {
                for kind in coord.registry().open_kinds() {
                    match coord.registry().bounds(kind) {
                        Some(b) => println!("{kind}: {}x{} at {},{}", b.width, b.height, b.x, b.y),
                        None => println!("{kind}"),
                    }
                }
            }
            Line::View(kind) => self.print_view(kind)?,
            Line::Pick(entry) => {
                let picker = coord.item_picker().ok_or_else(closed)?;
                picker.dispatch(PickerAction::Toggle(entry)).await?;
            }
            Line::Reorder(from, to) => {
                let picker = coord.item_picker().ok_or_else(closed)?;
                picker.dispatch(PickerAction::Reorder { from, to }).await?;
            }
            Line::Target(title) => {
                let picker = coord.target_picker().ok_or_else(closed)?;
                picker.dispatch(TargetAction::Toggle(title)).await?;
            }
            Line::AllWindows => {
                let picker = coord.target_picker().ok_or_else(closed)?;
                picker.dispatch(TargetAction::SelectAll).await?;
            }
            Line::Send(index) => {
                let overlay = coord.overlay().ok_or_else(closed)?;
                let entry = overlay
                    .view()
                    .buttons
                    .get(index)
                    .map(|b| b.entry.clone())
                    .ok_or_else(|| Error::Invalid(format!("no overlay button {index}")))?;
                overlay.dispatch(OverlayAction::Send(entry)).await?;
            }
            Line::Run(kind, id) => self.main_action(MainAction::Send(kind, id)).await?,
            Line::Key(kind, ev) => match kind {
                WindowKind::Main => self.main_action(MainAction::Key(ev)).await?,
                WindowKind::ItemPicker => {
                    let picker = coord.item_picker().ok_or_else(closed)?;
                    picker.dispatch(PickerAction::Key(ev)).await?;
                }
                WindowKind::TargetPicker => {
                    let picker = coord.target_picker().ok_or_else(closed)?;
                    picker.dispatch(TargetAction::Key(ev)).await?;
                }
                WindowKind::Overlay => {
                    return Err(Error::Invalid("the overlay takes no key input".into()));
                }
            },
            Line::ToggleOverlay => self.main_action(MainAction::ToggleOverlay).await?,
            Line::ToggleTheme => self.main_action(MainAction::ToggleTheme).await?,
            Line::ToggleListener => self.main_action(MainAction::ToggleListener).await?,
            Line::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Dispatch to Main.
    async fn main_action(&self, action: MainAction) -> Result<()> {
        let main = self
            .coord
            .main()
            .ok_or_else(|| Error::Invalid("main window is not open".into()))?;
        main.dispatch(action).await
    }

    /// Print a short rendering of `kind`.
    fn print_view(&self, kind: WindowKind) -> Result<()> {
        self.require_open(kind)?;
        let coord = &self.coord;
        match kind {
            WindowKind::Main => {
                if let Some(main) = coord.main() {
                    let v = main.view();
                    println!(
                        "ready={} listener={} hotkeys={} enter={} targets={} overlay={} theme={}",
                        v.ready,
                        v.listener_active,
                        v.hotkey_count,
                        v.enter_enabled,
                        v.target_count,
                        v.overlay_open,
                        v.theme
                    );
                    for m in &v.messages {
                        println!("  message {} {}", m.id, m.name);
                    }
                    for c in &v.combinations {
                        println!("  combination {} {}", c.id, c.name);
                    }
                }
            }
            WindowKind::Overlay => {
                if let Some(overlay) = coord.overlay() {
                    let v = overlay.view();
                    if let Some(empty) = v.empty {
                        println!("  ({empty:?})");
                    }
                    for (i, b) in v.buttons.iter().enumerate() {
                        println!("  {i}. {} {}", b.kind(), b.name);
                    }
                    println!(
                        "  listener={} enter={} targets={}",
                        v.status.listener_active, v.status.enter_enabled, v.status.target_count
                    );
                }
            }
            WindowKind::ItemPicker => {
                if let Some(picker) = coord.item_picker() {
                    for (i, row) in picker.view().rows.iter().enumerate() {
                        let mark = if row.selected() { "x" } else { " " };
                        println!("  {i}. [{mark}] {} {}", row.item.kind(), row.item.name);
                    }
                }
            }
            WindowKind::TargetPicker => {
                if let Some(picker) = coord.target_picker() {
                    let v = picker.view();
                    if v.all_windows {
                        println!("  (all windows)");
                    }
                    for row in &v.rows {
                        let mark = if row.selected { "x" } else { " " };
                        let gone = if row.open { "" } else { " (closed)" };
                        println!("  [{mark}] {}{gone}", row.title);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Run every surface over an in-memory window host, reading commands from
/// stdin until `quit`, end of input, or Main closing.
pub async fn run(config: CoordConfig, backend: Arc<dyn Backend>) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(print_toasts(rx));
    let host = Arc::new(MemoryHost::default());
    let coord = Coordinator::new(config, backend, host.clone(), Some(tx));
    coord.start()?;
    info!("session started");
    println!("kenflow session; type help for commands");

    let session = Session { coord, host };
    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let next = tokio::select! {
            _ = session.coord.closed() => break,
            next = lines.next_line() => next,
        };
        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        match parse(&line) {
            Ok(None) => {}
            Ok(Some(cmd)) => {
                debug!(?cmd, "session command");
                match session.apply(cmd).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("error: {e}"),
                }
            }
            Err(msg) => println!("error: {msg}"),
        }
    }
    session.coord.shutdown().await;
    info!("session ended");
    Ok(())
}
