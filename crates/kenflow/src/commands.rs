use std::sync::Arc;

use kenflow_backend::{Backend, HttpBackend, wait_until_ready};
use kenflow_coord::{
    CoordConfig, Error, Result,
    bus::Bus,
    geometry::{Geometry, GeometryStore},
    hotkeys::{HotkeyResolver, OwnerRef, parse_combo},
    selection::{SelectionState, SelectionStore, resolve_entry},
    store::LocalStore,
    targets::TargetSelector,
    theme::ThemeStore,
};
use kenflow_protocol::{ItemKind, SelectionEntry, WindowKind};
use tracing::{debug, info};

use crate::{
    Command, GeometryCmd, HotkeyCmd, ListenerCmd, SelectionCmd, TargetsCmd, ThemeCmd, session,
};

/// HTTP client for the configured backend.
fn connect(config: &CoordConfig) -> Result<Arc<dyn Backend>> {
    let backend = HttpBackend::new(&config.backend_url, config.request_timeout())?;
    debug!(url = %backend.base_url(), "backend client ready");
    Ok(Arc::new(backend))
}

/// Services a one-shot command needs.
struct Env {
    /// Resolved configuration.
    config: CoordConfig,
    /// Backend client.
    backend: Arc<dyn Backend>,
    /// Local key/value state.
    store: Arc<LocalStore>,
    /// Refresh bus; nothing listens in one-shot mode.
    bus: Bus,
}

impl Env {
    /// Build from `config`.
    fn new(config: CoordConfig) -> Result<Self> {
        let backend = connect(&config)?;
        let store = Arc::new(LocalStore::new(config.local_state_path()));
        Ok(Self {
            config,
            backend,
            store,
            bus: Bus::new(),
        })
    }

    /// Quick-access persistence.
    fn selection(&self) -> SelectionStore {
        SelectionStore::new(self.store.clone())
    }
}

/// Run one subcommand.
pub async fn run(cmd: Command, config: CoordConfig) -> Result<()> {
    let env = Env::new(config)?;
    match cmd {
        Command::Wait => {
            wait_until_ready(env.backend.as_ref(), env.config.readiness).await?;
            println!("backend ready at {}", env.config.backend_url);
        }
        Command::Geometry(GeometryCmd::Show) => show_geometry(&env),
        Command::Selection(c) => selection(&env, c).await?,
        Command::Targets(c) => targets(&env, c).await?,
        Command::Hotkey(c) => hotkey(&env, c).await?,
        Command::Listener(c) => listener(&env, c).await?,
        Command::Send { kind, id } => {
            env.backend.send_item(kind.into(), id).await?;
            println!("sent {} {id}", ItemKind::from(kind));
        }
        Command::Theme(ThemeCmd::Show) => println!("{}", ThemeStore::new(env.store.clone()).get()),
        Command::Theme(ThemeCmd::Toggle) => {
            let theme = ThemeStore::new(env.store.clone()).toggle(&env.bus)?;
            println!("{theme}");
        }
        Command::Session => session::run(env.config, env.backend).await?,
    }
    Ok(())
}

/// One `geometry show` line.
fn geometry_line(kind: WindowKind, g: Geometry) -> String {
    match g.position() {
        Some((x, y)) => format!("{kind}: {}x{} at {x},{y}", g.width, g.height),
        None => format!("{kind}: {}x{} (default position)", g.width, g.height),
    }
}

/// `geometry show`.
fn show_geometry(env: &Env) {
    let store = GeometryStore::new(env.config.window_state_path());
    let record = store.load();
    for kind in [WindowKind::Main, WindowKind::Overlay] {
        println!("{}", geometry_line(kind, record.get(kind)));
    }
}

/// `selection ...`.
async fn selection(env: &Env, cmd: SelectionCmd) -> Result<()> {
    let store = env.selection();
    let mut state = SelectionState::load(&store);
    match cmd {
        SelectionCmd::List => {
            let messages = env.backend.messages(None).await?;
            let combinations = env.backend.combinations().await?;
            if state.entries().is_empty() {
                println!("no items selected");
            }
            for (i, e) in state.entries().iter().enumerate() {
                match resolve_entry(e, &messages, &combinations) {
                    Some(item) => println!(
                        "{i}. {} {} {}{}",
                        item.kind(),
                        item.id,
                        item.name,
                        item.trigger_key
                            .as_deref()
                            .map(|k| format!(" [{k}]"))
                            .unwrap_or_default()
                    ),
                    None => println!("{i}. {} {} (missing)", e.item_type, e.item_id),
                }
            }
            return Ok(());
        }
        SelectionCmd::Add { kind, id } => {
            state.toggle(SelectionEntry::new(id, kind.into()), true);
        }
        SelectionCmd::Remove { kind, id } => {
            state.toggle(SelectionEntry::new(id, kind.into()), false);
        }
        SelectionCmd::Move { from, to } => {
            if !state.reorder(from, to) {
                return Err(Error::Invalid(format!(
                    "cannot move {from} to {to}: the list has {} entries",
                    state.entries().len()
                )));
            }
        }
    }
    if state.is_dirty() {
        state.commit(&store, &env.bus)?;
        info!(count = state.entries().len(), "quick-access list saved");
    }
    println!("{} items selected", state.entries().len());
    Ok(())
}

/// `targets ...`.
async fn targets(env: &Env, cmd: TargetsCmd) -> Result<()> {
    let targets = TargetSelector::new(env.backend.clone());
    match cmd {
        TargetsCmd::Show => {
            let set = targets.get_targets().await?;
            if set.is_empty() {
                println!("all windows");
            }
            for t in set {
                println!("{t}");
            }
        }
        TargetsCmd::Available => {
            for t in targets.list_available_windows().await? {
                println!("{t}");
            }
        }
        TargetsCmd::Set { titles } => {
            targets.set_targets(&titles).await?;
            println!("{} target windows", titles.len());
        }
        TargetsCmd::Clear => {
            targets.set_targets(&[]).await?;
            println!("all windows");
        }
    }
    Ok(())
}

/// Owner reference for a command-line item.
fn owner_of(kind: ItemKind, id: i64) -> OwnerRef {
    match kind {
        ItemKind::Message => OwnerRef::message(id),
        ItemKind::Combination => OwnerRef::combination(id),
    }
}

/// `hotkey ...`.
async fn hotkey(env: &Env, cmd: HotkeyCmd) -> Result<()> {
    let resolver = HotkeyResolver::new(env.backend.clone());
    match cmd {
        HotkeyCmd::Check { combo } => {
            let combo = parse_combo(&combo)?;
            match resolver.check_conflict(&combo, None).await? {
                Some(owner) => println!("{combo}: used by {} '{}'", owner.owner.kind, owner.name),
                None => println!("{combo}: free"),
            }
        }
        HotkeyCmd::Assign {
            combo,
            kind,
            id,
            yes,
        } => {
            let combo = parse_combo(&combo)?;
            let owner = owner_of(kind.into(), id);
            let cleared = match resolver.assign(&combo, owner, None).await {
                Err(Error::Conflict(conflict)) if yes => {
                    let confirmed = conflict.confirm();
                    resolver.assign(&combo, owner, Some(&confirmed)).await?
                }
                Err(Error::Conflict(conflict)) => {
                    return Err(Error::Invalid(format!("{conflict}; rerun with --yes to take it")));
                }
                other => other?,
            };
            for prior in cleared {
                println!("cleared {combo} from {} '{}'", prior.owner.kind, prior.name);
            }
            env.backend.refresh_listener().await?;
            println!("{combo} assigned to {owner}");
        }
    }
    Ok(())
}

/// `listener ...`.
async fn listener(env: &Env, cmd: ListenerCmd) -> Result<()> {
    let backend = &env.backend;
    match cmd {
        ListenerCmd::Start => {
            backend.start_listener().await?;
            println!("listener started");
        }
        ListenerCmd::Stop => {
            backend.stop_listener().await?;
            println!("listener stopped");
        }
        ListenerCmd::Status => {
            let status = backend.listener_status().await?;
            let state = if status.active { "active" } else { "inactive" };
            println!("listener {state}, {} hotkeys", status.hotkey_count);
        }
        ListenerCmd::Refresh => {
            backend.refresh_listener().await?;
            println!("hotkeys reloaded");
        }
    }
    Ok(())
}
