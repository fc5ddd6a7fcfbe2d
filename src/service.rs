use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use notify::{EventKind, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::create::{CreateOptions, FolderTemplates, TemplateHook, create_attached_note};
use crate::panel::{Panel, ViewMode, build_panel};
use crate::relations::{AttachedNote, attach_note, detach_note};
use crate::{
    Debouncer, Error, Relationships, Result, Settings, TypeRecord, TypeTaxonomy, Vault,
    VaultIndex, VaultPath, search_types,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchKind {
    Create,
    Modify,
    ModifyData,
    ModifyMetadata,
    Remove,
    Rename,
    Access,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexCause {
    /// A write made through this service.
    Local,
    /// A filesystem watch event triggered the reindex.
    Watch { kind: WatchKind, event_kind: String },
}

impl ReindexCause {
    fn watch_kind(&self) -> Option<&WatchKind> {
        match self {
            ReindexCause::Watch { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ViewId(u64);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum VaultEvent {
    Indexed {
        path: VaultPath,
        cause: ReindexCause,
        /// Whether the note's front matter differs from before.
        frontmatter_changed: bool,
    },
    Removed {
        path: VaultPath,
        cause: ReindexCause,
    },
    Renamed {
        from: VaultPath,
        to: VaultPath,
        cause: ReindexCause,
    },
    FolderCreated {
        path: VaultPath,
    },
    /// The type set will be recomputed on next read.
    TypesInvalidated,
    /// A view's panel was recomputed.
    Refreshed {
        view: ViewId,
        path: VaultPath,
    },
    Error {
        path: Option<VaultPath>,
        error: String,
    },
}

#[derive(Debug, Clone)]
struct ViewState {
    path: VaultPath,
    mode: ViewMode,
    panel: Option<Panel>,
}

#[derive(Debug, Default)]
struct ViewRegistry {
    next_id: u64,
    active: Option<ViewId>,
    views: BTreeMap<ViewId, ViewState>,
}

/// State shared between the service handle and its watch loop.
struct Shared {
    vault: Vault,
    settings: RwLock<Settings>,
    index: RwLock<VaultIndex>,
    taxonomy: Mutex<TypeTaxonomy>,
    views: Mutex<ViewRegistry>,
    events: broadcast::Sender<VaultEvent>,
}

impl Shared {
    fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn all_types(&self) -> Vec<TypeRecord> {
        let mut tax = self.taxonomy.lock().unwrap_or_else(|e| e.into_inner());
        tax.all_types(&self.vault).to_vec()
    }

    fn invalidate_types(&self) {
        self.taxonomy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .invalidate();
        debug!("type cache invalidated");
        let _ = self.events.send(VaultEvent::TypesInvalidated);
    }

    fn reindex(&self, path: &VaultPath) -> Result<bool> {
        let mut guard = self.index.write().unwrap_or_else(|e| e.into_inner());
        guard.upsert_path(&self.vault, path.clone())
    }

    fn compute_panel(&self, path: &VaultPath, mode: ViewMode) -> Option<Panel> {
        let settings = self.settings();
        let types = self.all_types();
        let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
        build_panel(&guard, &settings, &types, path, mode)
    }

    /// Recomputes the panel of every open view.
    fn ensure_panels(&self) {
        let targets: Vec<(ViewId, VaultPath, ViewMode)> = {
            let reg = self.views.lock().unwrap_or_else(|e| e.into_inner());
            reg.views
                .iter()
                .map(|(id, v)| (*id, v.path.clone(), v.mode))
                .collect()
        };
        self.refresh_views(targets);
    }

    /// Recomputes views showing a changed note, its current parents, or a
    /// panel that lists it.
    fn refresh_paths(&self, paths: &BTreeSet<VaultPath>) {
        let mut affected = paths.clone();
        {
            let key = self.settings().link_key().to_string();
            let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
            let rel = Relationships::new(&guard, &key);
            for path in paths {
                affected.extend(rel.all_parent_notes(path));
            }
        }
        let targets: Vec<(ViewId, VaultPath, ViewMode)> = {
            let reg = self.views.lock().unwrap_or_else(|e| e.into_inner());
            reg.views
                .iter()
                .filter(|(_, v)| {
                    affected.contains(&v.path)
                        || v.panel.as_ref().is_some_and(|panel| {
                            panel.parents.iter().any(|p| paths.contains(&p.path))
                                || panel.attached.iter().any(|a| paths.contains(&a.path))
                        })
                })
                .map(|(id, v)| (*id, v.path.clone(), v.mode))
                .collect()
        };
        self.refresh_views(targets);
    }

    fn refresh_views(&self, targets: Vec<(ViewId, VaultPath, ViewMode)>) {
        for (id, path, mode) in targets {
            let panel = self.compute_panel(&path, mode);
            let mut reg = self.views.lock().unwrap_or_else(|e| e.into_inner());
            // Closed while the panel was being computed.
            let Some(view) = reg.views.get_mut(&id) else {
                continue;
            };
            view.panel = panel;
            drop(reg);
            let _ = self.events.send(VaultEvent::Refreshed { view: id, path });
        }
    }
}

/// Work the controller coalesces before acting on it.
#[derive(Debug)]
enum Signal {
    Fs(std::result::Result<notify::Event, notify::Error>),
    /// Views were opened, focused or closed.
    Layout,
    /// A note's front matter changed.
    Metadata(VaultPath),
    /// The folder structure changed.
    Structure,
}

/// Owns the live index, the type cache and the open views of one vault.
pub struct VaultService {
    shared: Arc<Shared>,
    custom_hook: Option<Arc<dyn TemplateHook>>,
    signals: Option<mpsc::UnboundedSender<Signal>>,
    shutdown_tx: watch::Sender<bool>,
    watcher: Option<notify::RecommendedWatcher>,
    watch_task: Option<tokio::task::JoinHandle<()>>,
}

impl VaultService {
    /// Opens the service with the settings stored in the vault.
    pub fn new(vault: Vault) -> Result<Self> {
        let settings = Settings::load(&vault)?;
        Ok(Self::with_settings(vault, settings))
    }

    pub fn with_settings(vault: Vault, settings: Settings) -> Self {
        let (events, _) = broadcast::channel(512);
        let (shutdown_tx, _) = watch::channel(false);
        let taxonomy = TypeTaxonomy::new(&settings);
        Self {
            shared: Arc::new(Shared {
                vault,
                settings: RwLock::new(settings),
                index: RwLock::new(VaultIndex::default()),
                taxonomy: Mutex::new(taxonomy),
                views: Mutex::new(ViewRegistry::default()),
                events,
            }),
            custom_hook: None,
            signals: None,
            shutdown_tx,
            watcher: None,
            watch_task: None,
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.shared.vault
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.shared.events.subscribe()
    }

    pub fn settings(&self) -> Settings {
        self.shared.settings()
    }

    /// Adopts new settings: the type cache is reconfigured and every open panel recomputed.
    pub fn update_settings(&self, settings: Settings) {
        self.shared
            .taxonomy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .configure(&settings);
        *self
            .shared
            .settings
            .write()
            .unwrap_or_else(|e| e.into_inner()) = settings;
        let _ = self.shared.events.send(VaultEvent::TypesInvalidated);
        self.shared.ensure_panels();
    }

    pub fn save_settings(&self) -> Result<std::path::PathBuf> {
        self.settings().save(self.vault())
    }

    /// Replaces the folder-template collaborator derived from settings.
    pub fn set_template_hook(&mut self, hook: Option<Arc<dyn TemplateHook>>) {
        self.custom_hook = hook;
    }

    fn template_hook(&self) -> Option<Arc<dyn TemplateHook>> {
        if let Some(hook) = &self.custom_hook {
            return Some(Arc::clone(hook));
        }
        FolderTemplates::from_settings(&self.settings())
            .map(|t| Arc::new(t) as Arc<dyn TemplateHook>)
    }

    pub fn with_index<R>(&self, f: impl FnOnce(&VaultIndex) -> R) -> R {
        let guard = self.shared.index.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    pub fn index_snapshot(&self) -> VaultIndex {
        self.with_index(|idx| idx.clone())
    }

    pub async fn build_index(&self) -> Result<()> {
        let vault = self.shared.vault.clone();
        let built = tokio::task::spawn_blocking(move || VaultIndex::build(&vault))
            .await
            .map_err(|e| Error::Task(format!("index build task failed: {e}")))??;

        let count = built.len();
        for (path, error) in built.notes_with_broken_frontmatter() {
            debug!(%path, %error, "front matter unreadable; note has no metadata");
        }
        {
            let mut guard = self.shared.index.write().unwrap_or_else(|e| e.into_inner());
            *guard = built;
        }
        self.shared
            .taxonomy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .invalidate();
        info!(notes = count, "index ready");
        self.shared.ensure_panels();
        Ok(())
    }

    pub fn all_types(&self) -> Vec<TypeRecord> {
        self.shared.all_types()
    }

    pub fn invalidate_types(&self) {
        self.shared.invalidate_types();
    }

    /// Type whose folder is exactly `folder`.
    pub fn type_for_path(&self, folder: &str) -> Option<TypeRecord> {
        let mut tax = self.shared.taxonomy.lock().unwrap_or_else(|e| e.into_inner());
        tax.type_for_path(&self.shared.vault, folder)
    }

    pub fn type_by_name(&self, name: &str) -> Option<TypeRecord> {
        let mut tax = self.shared.taxonomy.lock().unwrap_or_else(|e| e.into_inner());
        tax.type_by_name(&self.shared.vault, name)
    }

    /// Exact (case-insensitive) name match, else the best fuzzy match.
    pub fn find_type(&self, query: &str) -> Option<TypeRecord> {
        if let Some(t) = self.type_by_name(query) {
            return Some(t);
        }
        search_types(&self.all_types(), query, 1).into_iter().next()
    }

    /// Resolves a note reference the way a link would be, from the vault root.
    pub fn resolve_note(&self, reference: &str) -> Option<VaultPath> {
        let reference = reference.trim();
        let name = crate::LinkToken::parse(reference).target_name();
        // Any root-level path: only its folder matters to the resolver.
        let anchor = VaultPath::try_from("_").ok()?;
        self.with_index(|idx| {
            if let Ok(direct) = VaultPath::try_from(name.as_str()) {
                if idx.contains(&direct) {
                    return Some(direct);
                }
            }
            idx.link_resolver().resolve(&name, &anchor).resolved()
        })
    }

    /// Type of the folder holding the note.
    pub fn type_of_note(&self, path: &VaultPath) -> Option<TypeRecord> {
        self.type_for_path(&path.folder())
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.shared
            .taxonomy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_excluded(path)
    }

    pub fn attached_notes(&self, parent: &VaultPath) -> Vec<AttachedNote> {
        let key = self.settings().link_key().to_string();
        let types = self.all_types();
        self.with_index(|idx| Relationships::new(idx, &key).attached_notes(parent, &types))
    }

    pub fn all_parent_notes(&self, child: &VaultPath) -> Vec<VaultPath> {
        let key = self.settings().link_key().to_string();
        self.with_index(|idx| Relationships::new(idx, &key).all_parent_notes(child))
    }

    pub fn parent_note(&self, child: &VaultPath) -> Option<VaultPath> {
        let key = self.settings().link_key().to_string();
        self.with_index(|idx| Relationships::new(idx, &key).parent_note(child))
    }

    pub fn attach_note(&self, child: &VaultPath, parent: &VaultPath) -> Result<()> {
        let key = self.settings().link_key().to_string();
        attach_note(self.vault(), &key, child, parent)?;
        self.after_write(child)
    }

    pub fn detach_note(&self, child: &VaultPath) -> Result<()> {
        let key = self.settings().link_key().to_string();
        detach_note(self.vault(), &key, child)?;
        self.after_write(child)
    }

    /// Writes a single front matter key, as a badge edit does.
    pub fn set_property(&self, path: &VaultPath, key: &str, value: &str) -> Result<()> {
        crate::process_frontmatter(self.vault(), path, |fm| fm.set(key, value))?;
        debug!(path = %path, key, value, "property set");
        self.after_write(path)
    }

    pub async fn create_attached_note(
        &self,
        parent: &VaultPath,
        note_type: &TypeRecord,
        title: &str,
        opts: &CreateOptions,
    ) -> Result<VaultPath> {
        let key = self.settings().link_key().to_string();
        let path = create_attached_note(
            self.vault(),
            &key,
            self.template_hook(),
            parent,
            note_type,
            title,
            opts,
        )
        .await?;

        self.shared.reindex(&path)?;
        let _ = self.shared.events.send(VaultEvent::Indexed {
            path: path.clone(),
            cause: ReindexCause::Local,
            frontmatter_changed: true,
        });
        if path.as_str_lossy().contains('/') {
            self.signal(Signal::Structure);
        }
        self.signal(Signal::Layout);
        Ok(path)
    }

    fn after_write(&self, path: &VaultPath) -> Result<()> {
        let changed = self.shared.reindex(path)?;
        let _ = self.shared.events.send(VaultEvent::Indexed {
            path: path.clone(),
            cause: ReindexCause::Local,
            frontmatter_changed: changed,
        });
        if changed {
            self.signal(Signal::Metadata(path.clone()));
        }
        Ok(())
    }

    /// Hands work to the watch loop, or does it right away when not watching.
    fn signal(&self, signal: Signal) {
        let signal = match &self.signals {
            Some(tx) => match tx.send(signal) {
                Ok(()) => return,
                Err(mpsc::error::SendError(signal)) => signal,
            },
            None => signal,
        };
        match signal {
            Signal::Layout => self.shared.ensure_panels(),
            Signal::Metadata(path) => self.shared.refresh_paths(&BTreeSet::from([path])),
            Signal::Structure => self.shared.invalidate_types(),
            Signal::Fs(_) => {}
        }
    }

    pub fn panel(&self, path: &VaultPath, mode: ViewMode) -> Option<Panel> {
        self.shared.compute_panel(path, mode)
    }

    pub fn open_view(&self, path: VaultPath, mode: ViewMode) -> ViewId {
        let id = {
            let mut reg = self.shared.views.lock().unwrap_or_else(|e| e.into_inner());
            let id = ViewId(reg.next_id);
            reg.next_id += 1;
            reg.views.insert(
                id,
                ViewState {
                    path,
                    mode,
                    panel: None,
                },
            );
            reg.active = Some(id);
            id
        };
        self.signal(Signal::Layout);
        id
    }

    /// Points an open view at another note.
    pub fn navigate_view(&self, id: ViewId, path: VaultPath) -> bool {
        {
            let mut reg = self.shared.views.lock().unwrap_or_else(|e| e.into_inner());
            let Some(view) = reg.views.get_mut(&id) else {
                return false;
            };
            view.path = path;
            view.panel = None;
        }
        self.signal(Signal::Layout);
        true
    }

    pub fn focus_view(&self, id: ViewId) -> bool {
        {
            let mut reg = self.shared.views.lock().unwrap_or_else(|e| e.into_inner());
            if !reg.views.contains_key(&id) {
                return false;
            }
            reg.active = Some(id);
        }
        self.signal(Signal::Layout);
        true
    }

    pub fn close_view(&self, id: ViewId) -> bool {
        let removed = {
            let mut reg = self.shared.views.lock().unwrap_or_else(|e| e.into_inner());
            if reg.active == Some(id) {
                reg.active = None;
            }
            reg.views.remove(&id).is_some()
        };
        if removed {
            self.signal(Signal::Layout);
        }
        removed
    }

    pub fn active_view(&self) -> Option<ViewId> {
        self.shared
            .views
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active
    }

    /// Last computed panel of every open view that shows one.
    pub fn panels(&self) -> HashMap<ViewId, Panel> {
        let reg = self.shared.views.lock().unwrap_or_else(|e| e.into_inner());
        reg.views
            .iter()
            .filter_map(|(id, v)| v.panel.clone().map(|p| (*id, p)))
            .collect()
    }

    pub async fn start_watching(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel::<Signal>();
        let fs_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = fs_tx.send(Signal::Fs(res));
        })?;
        watcher.watch(self.shared.vault.root(), RecursiveMode::Recursive)?;

        let shared = Arc::clone(&self.shared);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.watch_task = Some(tokio::spawn(async move {
            watch_loop(shared, rx, &mut shutdown_rx).await;
        }));
        self.watcher = Some(watcher);
        self.signals = Some(tx);
        info!(root = %self.shared.vault.root().display(), "watching vault");

        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.watcher.take();
        self.signals.take();
        if let Some(handle) = self.watch_task.take() {
            let _ = handle.await;
        }
    }

    /// Stops watching and releases every view.
    pub async fn dispose(&mut self) {
        self.shutdown().await;
        let mut reg = self.shared.views.lock().unwrap_or_else(|e| e.into_inner());
        let n = reg.views.len();
        *reg = ViewRegistry::default();
        debug!(views = n, "views released");
    }
}

impl Drop for VaultService {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn watch_loop(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Signal>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let cfg = shared.vault.config().clone();
    let debouncer = |window| {
        if cfg.trailing_refresh {
            Debouncer::new(window)
        } else {
            Debouncer::leading_only(window)
        }
    };
    let mut layout = debouncer(cfg.view_debounce);
    let mut metadata = debouncer(cfg.metadata_debounce);
    let mut structure = debouncer(cfg.structure_debounce);
    let mut dirty: BTreeSet<VaultPath> = BTreeSet::new();

    let timer = tokio::time::sleep(std::time::Duration::from_secs(60 * 60 * 24 * 365 * 10));
    tokio::pin!(timer);
    let mut timer_armed = false;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            maybe = rx.recv() => {
                let Some(signal) = maybe else { break; };
                let mut pending = vec![signal];
                // Drain what is already queued so a burst is handled in one go.
                while let Ok(more) = rx.try_recv() {
                    pending.push(more);
                }

                let mut batch = Vec::new();
                let mut wants_layout = false;
                let mut wants_structure = false;
                let mut changed = BTreeSet::new();
                for signal in pending {
                    match signal {
                        Signal::Fs(Ok(ev)) => batch.push(ev),
                        Signal::Fs(Err(err)) => {
                            let _ = shared.events.send(VaultEvent::Error { path: None, error: err.to_string() });
                        }
                        Signal::Layout => wants_layout = true,
                        Signal::Metadata(path) => {
                            changed.insert(path);
                        }
                        Signal::Structure => wants_structure = true,
                    }
                }

                if !batch.is_empty() {
                    let shared2 = Arc::clone(&shared);
                    let applied = tokio::task::spawn_blocking(move || {
                        apply_events(&shared2.vault, &shared2.index, batch)
                    })
                    .await;
                    match applied {
                        Ok(list) => {
                            for ev in list {
                                match &ev {
                                    VaultEvent::Indexed { path, cause, frontmatter_changed } => {
                                        if *frontmatter_changed {
                                            changed.insert(path.clone());
                                        }
                                        if is_structural(path, cause) {
                                            wants_structure = true;
                                        }
                                    }
                                    VaultEvent::FolderCreated { path } => {
                                        if path.as_str_lossy().contains('/') {
                                            wants_structure = true;
                                        }
                                    }
                                    VaultEvent::Removed { path, .. } => {
                                        changed.insert(path.clone());
                                        wants_structure = true;
                                    }
                                    VaultEvent::Renamed { from, to, .. } => {
                                        changed.insert(from.clone());
                                        changed.insert(to.clone());
                                        wants_structure = true;
                                    }
                                    _ => {}
                                }
                                let _ = shared.events.send(ev);
                            }
                        }
                        Err(join_err) => {
                            let _ = shared.events.send(VaultEvent::Error { path: None, error: join_err.to_string() });
                        }
                    }
                }

                let now = Instant::now();
                if wants_structure && structure.on_event(now) {
                    shared.invalidate_types();
                }
                if !changed.is_empty() {
                    dirty.extend(changed);
                    if metadata.on_event(now) {
                        shared.refresh_paths(&std::mem::take(&mut dirty));
                    }
                }
                if wants_layout && layout.on_event(now) {
                    shared.ensure_panels();
                }
            }

            _ = &mut timer, if timer_armed => {
                let now = Instant::now();
                if structure.poll(now) {
                    shared.invalidate_types();
                }
                if metadata.poll(now) {
                    shared.refresh_paths(&std::mem::take(&mut dirty));
                }
                if layout.poll(now) {
                    shared.ensure_panels();
                }
            }
        }

        let next = [layout.deadline(), metadata.deadline(), structure.deadline()]
            .into_iter()
            .flatten()
            .min();
        timer_armed = next.is_some();
        if let Some(at) = next {
            timer
                .as_mut()
                .reset(tokio::time::Instant::from_std(at));
        }
    }
    debug!("watch loop stopped");
}

/// Nested creates, renames and removals change the folder tree.
fn is_structural(path: &VaultPath, cause: &ReindexCause) -> bool {
    match cause.watch_kind() {
        Some(WatchKind::Create) => path.as_str_lossy().contains('/'),
        Some(WatchKind::Rename) | Some(WatchKind::Remove) => true,
        _ => false,
    }
}

#[derive(Debug, Clone)]
enum Op {
    Upsert {
        path: VaultPath,
        cause: ReindexCause,
    },
    Remove {
        path: VaultPath,
        cause: ReindexCause,
    },
    Rename {
        from: VaultPath,
        to: VaultPath,
        cause: ReindexCause,
    },
}

fn apply_events(
    vault: &Vault,
    index: &RwLock<VaultIndex>,
    batch: Vec<notify::Event>,
) -> Vec<VaultEvent> {
    let ops = events_to_ops(vault, &batch);

    let mut out = Vec::new();
    let mut guard = index.write().unwrap_or_else(|e| e.into_inner());

    for op in ops {
        match op {
            Op::Upsert { path, cause } => {
                let abs = vault.to_abs(&path);
                match std::fs::metadata(&abs) {
                    Ok(meta) if meta.is_dir() => {
                        // A folder moved in arrives as a single rename-to event.
                        if matches!(cause.watch_kind(), Some(WatchKind::Create | WatchKind::Rename)) {
                            index_folder(vault, &mut guard, &path, &cause, &mut out);
                        }
                        if cause.watch_kind() == Some(&WatchKind::Create) {
                            out.push(VaultEvent::FolderCreated { path });
                        }
                        continue;
                    }
                    Ok(_) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        guard.remove_path(&path);
                        sweep_folder(&mut guard, &path, &cause, &mut out);
                        out.push(VaultEvent::Removed { path, cause });
                        continue;
                    }
                    Err(err) => {
                        out.push(VaultEvent::Error {
                            path: Some(path),
                            error: err.to_string(),
                        });
                        continue;
                    }
                }

                if !vault.is_note_rel(path.as_path()) {
                    continue;
                }
                match guard.upsert_path(vault, path.clone()) {
                    Ok(frontmatter_changed) => out.push(VaultEvent::Indexed {
                        path,
                        cause,
                        frontmatter_changed,
                    }),
                    Err(Error::Io { source, .. })
                        if source.kind() == std::io::ErrorKind::NotFound =>
                    {
                        guard.remove_path(&path);
                        out.push(VaultEvent::Removed { path, cause });
                    }
                    Err(err) => out.push(VaultEvent::Error {
                        path: Some(path),
                        error: err.to_string(),
                    }),
                }
            }
            Op::Remove { path, cause } => {
                guard.remove_path(&path);
                sweep_folder(&mut guard, &path, &cause, &mut out);
                out.push(VaultEvent::Removed { path, cause });
            }
            Op::Rename { from, to, cause } => {
                guard.remove_path(&from);
                sweep_folder(&mut guard, &from, &cause, &mut out);
                if vault.to_abs(&to).is_dir() {
                    index_folder(vault, &mut guard, &to, &cause, &mut out);
                } else if vault.is_note_rel(to.as_path()) {
                    if let Err(err) = guard.upsert_path(vault, to.clone()) {
                        warn!(path = %to, error = %err, "cannot index renamed note");
                        out.push(VaultEvent::Error {
                            path: Some(to.clone()),
                            error: err.to_string(),
                        });
                    }
                }
                out.push(VaultEvent::Renamed { from, to, cause });
            }
        }
    }

    out
}

/// Drops the notes that lived below a removed or renamed folder.
fn sweep_folder(
    index: &mut VaultIndex,
    folder: &VaultPath,
    cause: &ReindexCause,
    out: &mut Vec<VaultEvent>,
) {
    for path in index.remove_under(folder) {
        out.push(VaultEvent::Removed {
            path,
            cause: cause.clone(),
        });
    }
}

/// Indexes every note found below a folder that appeared.
fn index_folder(
    vault: &Vault,
    index: &mut VaultIndex,
    folder: &VaultPath,
    cause: &ReindexCause,
    out: &mut Vec<VaultEvent>,
) {
    for path in vault.note_paths_under(folder) {
        match index.upsert_path(vault, path.clone()) {
            Ok(frontmatter_changed) => out.push(VaultEvent::Indexed {
                path,
                cause: cause.clone(),
                frontmatter_changed,
            }),
            Err(err) => {
                warn!(path = %path, error = %err, "cannot index moved note");
                out.push(VaultEvent::Error {
                    path: Some(path),
                    error: err.to_string(),
                });
            }
        }
    }
}

fn events_to_ops(vault: &Vault, batch: &[notify::Event]) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut upsert_ix: HashMap<VaultPath, usize> = HashMap::new();
    let mut remove_ix: HashMap<VaultPath, usize> = HashMap::new();

    for ev in batch {
        // Reads (ours included) produce access and metadata events; they change nothing.
        match &ev.kind {
            EventKind::Access(_) => continue,
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => continue,
            _ => {}
        }

        let ev_cause = cause_from_event_kind(&ev.kind);

        match &ev.kind {
            EventKind::Modify(notify::event::ModifyKind::Name(_)) if ev.paths.len() == 2 => {
                let (Some(from), Some(to)) = (
                    to_vault_path(vault, &ev.paths[0]),
                    to_vault_path(vault, &ev.paths[1]),
                ) else {
                    continue;
                };
                match (
                    vault.is_ignored_rel(from.as_path()),
                    vault.is_ignored_rel(to.as_path()),
                ) {
                    (true, true) => {}
                    // An editor saving through a hidden temp file.
                    (true, false) => ops.push(Op::Upsert {
                        path: to,
                        cause: ReindexCause::Watch {
                            kind: WatchKind::ModifyData,
                            event_kind: format!("{:?}", ev.kind),
                        },
                    }),
                    (false, true) => ops.push(Op::Remove {
                        path: from,
                        cause: ev_cause.clone(),
                    }),
                    (false, false) => ops.push(Op::Rename {
                        from,
                        to,
                        cause: ev_cause.clone(),
                    }),
                }
            }

            EventKind::Remove(_) => {
                for p in &ev.paths {
                    let Some(rel) = to_vault_path(vault, p) else {
                        continue;
                    };
                    if vault.is_ignored_rel(rel.as_path()) {
                        continue;
                    }
                    if let Some(ix) = remove_ix.get(&rel).copied() {
                        if let Op::Remove { cause, .. } = &mut ops[ix] {
                            *cause = merge_cause(cause.clone(), ev_cause.clone());
                        }
                    } else {
                        remove_ix.insert(rel.clone(), ops.len());
                        ops.push(Op::Remove {
                            path: rel,
                            cause: ev_cause.clone(),
                        });
                    }
                }
            }

            _ => {
                for p in &ev.paths {
                    let Some(rel) = to_vault_path(vault, p) else {
                        continue;
                    };
                    if vault.is_ignored_rel(rel.as_path()) {
                        continue;
                    }
                    if let Some(ix) = upsert_ix.get(&rel).copied() {
                        if let Op::Upsert { cause, .. } = &mut ops[ix] {
                            *cause = merge_cause(cause.clone(), ev_cause.clone());
                        }
                    } else {
                        upsert_ix.insert(rel.clone(), ops.len());
                        ops.push(Op::Upsert {
                            path: rel,
                            cause: ev_cause.clone(),
                        });
                    }
                }
            }
        }
    }

    ops
}

fn to_vault_path(vault: &Vault, abs: &Path) -> Option<VaultPath> {
    vault.to_rel(abs).ok()
}

fn cause_from_event_kind(kind: &EventKind) -> ReindexCause {
    ReindexCause::Watch {
        kind: watch_kind_from_event_kind(kind),
        event_kind: format!("{:?}", kind),
    }
}

fn watch_kind_from_event_kind(kind: &EventKind) -> WatchKind {
    match kind {
        EventKind::Create(_) => WatchKind::Create,
        EventKind::Remove(_) => WatchKind::Remove,
        EventKind::Access(_) => WatchKind::Access,
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => WatchKind::Rename,
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => WatchKind::ModifyMetadata,
        EventKind::Modify(notify::event::ModifyKind::Data(_)) => WatchKind::ModifyData,
        EventKind::Modify(_) => WatchKind::Modify,
        _ => WatchKind::Other,
    }
}

fn merge_cause(old: ReindexCause, new: ReindexCause) -> ReindexCause {
    if rank_cause(&new) >= rank_cause(&old) {
        new
    } else {
        old
    }
}

fn rank_cause(cause: &ReindexCause) -> u8 {
    match cause {
        ReindexCause::Local => 100,
        ReindexCause::Watch { kind, .. } => match kind {
            WatchKind::Remove => 90,
            WatchKind::Rename => 80,
            WatchKind::Create => 70,
            WatchKind::ModifyData => 60,
            WatchKind::Modify => 50,
            WatchKind::ModifyMetadata => 40,
            WatchKind::Access => 30,
            WatchKind::Other => 20,
        },
    }
}
