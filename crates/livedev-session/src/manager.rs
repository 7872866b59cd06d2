//! Session Manager
//!
//! Drives one live development session at a time: picks the page to preview,
//! prepares a server for it, launches the browser and keeps the status in
//! step with what the browser and the editor report.
//!
//! Every entry point runs on the caller's task. State lives behind a
//! `parking_lot` lock that is never held across an `.await`; `open` checks a
//! generation counter after each suspension point so a newer `open` or a
//! `close` supersedes it.

use livedev_documents::{
    create_live_document, DocumentChange, Language, LiveDocumentKind, RelatedUpdate,
    SharedDocument, SharedLiveDocument, SyncOutcome, UrlResolver,
};
use livedev_protocol::{
    ClientId, LiveDevProtocol, ProtocolEvent, ResponseHandle, TextPosition, Transport,
    TransportEvent,
};
use livedev_server::{
    is_html_file_ext, is_server_html_file_ext, ServerConfig, ServerManager, SharedServer,
};
use livedev_storage::Database;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::SessionError;
use crate::host::{Dialogs, HostEvent, Launcher, SetupFailure, Workspace};
use crate::launcher::SystemLauncher;
use crate::resolve::find_index_file;
use crate::status::{CloseReason, LiveStatus, StatusChange};
use crate::Result;

pub const HIGHLIGHT_SETTING: &str = "livedev.highlight";

const STATUS_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Push HTML edits without reloading (needs the page-side agent)
    pub html_live_edit: bool,
    /// Check that a user server answers before launching the browser
    pub probe_user_server: bool,
    /// Highlight default when no preference is stored
    pub highlight: bool,
    /// Give up on a browser that never connects; `None` waits forever
    pub connect_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            html_live_edit: false,
            probe_user_server: true,
            highlight: true,
            connect_timeout: None,
        }
    }
}

#[derive(Default)]
struct SessionState {
    /// `None` until `init` publishes the first status
    status: Option<LiveStatus>,
    close_reason: Option<CloseReason>,
    session_id: Option<Uuid>,
    primary: Option<SharedLiveDocument>,
    /// Related stylesheets keyed by the URL the browser reported
    related: BTreeMap<String, SharedLiveDocument>,
    server: Option<SharedServer>,
    open_generation: u64,
    /// Bumped whenever live documents are torn down
    doc_epoch: u64,
    connecting_since: Option<Instant>,
    highlight_enabled: bool,
}

/// Resolve URLs through the session's server without keeping it alive
fn url_resolver(server: &SharedServer) -> UrlResolver {
    let server = Arc::downgrade(server);
    Arc::new(move |path: &Path| server.upgrade()?.path_to_url(path))
}

fn fire(result: livedev_protocol::Result<ResponseHandle>, kind: &'static str) {
    if let Err(e) = result {
        tracing::warn!(kind, error = %e, "Failed to send to browser");
    }
}

#[derive(Clone)]
pub struct SessionManager {
    state: Arc<RwLock<SessionState>>,
    protocol: LiveDevProtocol,
    servers: ServerManager,
    workspace: Arc<dyn Workspace>,
    dialogs: Arc<dyn Dialogs>,
    launcher: Arc<RwLock<Arc<dyn Launcher>>>,
    db: Database,
    options: SessionOptions,
    status_tx: broadcast::Sender<StatusChange>,
}

impl SessionManager {
    pub fn new(
        protocol: LiveDevProtocol,
        servers: ServerManager,
        workspace: Arc<dyn Workspace>,
        dialogs: Arc<dyn Dialogs>,
        db: Database,
        options: SessionOptions,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            protocol,
            servers,
            workspace,
            dialogs,
            launcher: Arc::new(RwLock::new(Arc::new(SystemLauncher))),
            db,
            options,
            status_tx,
        }
    }

    /// Load preferences and publish the initial Inactive status
    pub fn init(&self) -> Result<()> {
        let highlight = self
            .db
            .get_bool_setting(HIGHLIGHT_SETTING, self.options.highlight)?;
        self.state.write().highlight_enabled = highlight;
        self.set_status(LiveStatus::Inactive, None);

        tracing::info!(highlight, "Initialized live development");
        Ok(())
    }

    pub fn status(&self) -> LiveStatus {
        self.state.read().status.unwrap_or(LiveStatus::Inactive)
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.state.read().close_reason
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.state.read().session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.status_tx.subscribe()
    }

    pub fn protocol(&self) -> &LiveDevProtocol {
        &self.protocol
    }

    /// Publish `status`. Setting the current status again does nothing.
    pub(crate) fn set_status(&self, status: LiveStatus, reason: Option<CloseReason>) {
        let change = {
            let mut state = self.state.write();
            if state.status == Some(status) {
                return;
            }
            let reason = if status == LiveStatus::Inactive {
                reason
            } else {
                None
            };

            state.status = Some(status);
            if status == LiveStatus::Inactive {
                state.close_reason = reason;
            }
            state.connecting_since = (status == LiveStatus::Connecting).then(Instant::now);
            StatusChange { status, reason }
        };

        tracing::info!(
            status = %change.status,
            code = change.status.code(),
            reason = change.reason.map(|r| r.as_str()),
            "Live development status changed"
        );
        // No subscribers is fine
        let _ = self.status_tx.send(change);
    }

    // -------------------------------------------------------------------
    // Opening
    // -------------------------------------------------------------------

    /// Start a session for the current page, or the nearest index page.
    /// Setup failures are reported to the user once and returned.
    pub async fn open(&self) -> Result<()> {
        let generation = {
            let mut state = self.state.write();
            state.open_generation += 1;
            state.open_generation
        };

        match self.prepare_open(generation).await {
            Ok((document, server)) => self.start_session(document, server),
            Err(SessionError::Cancelled) => {
                tracing::debug!(generation, "Open superseded");
                Err(SessionError::Cancelled)
            }
            Err(e) => {
                let failure = match &e {
                    SessionError::ServerNotReady(_) => SetupFailure::ServerNotReady,
                    _ => SetupFailure::NeedHtmlFile,
                };
                tracing::warn!(error = %e, "Could not start live development");
                self.dialogs.show_error(failure);
                Err(e)
            }
        }
    }

    fn ensure_current(&self, generation: u64) -> Result<()> {
        if self.state.read().open_generation == generation {
            Ok(())
        } else {
            Err(SessionError::Cancelled)
        }
    }

    async fn prepare_open(&self, generation: u64) -> Result<(SharedDocument, SharedServer)> {
        let document = self.initial_document().await?;
        self.ensure_current(generation)?;
        let document = document.ok_or(SessionError::NoHtmlFile)?;

        let server = self.prepare_server(document.path(), generation).await?;
        Ok((document, server))
    }

    /// The current document when it is a page, else the closest index page
    async fn initial_document(&self) -> Result<Option<SharedDocument>> {
        let current = self.workspace.current_document();
        if current
            .as_ref()
            .is_some_and(|doc| is_html_file_ext(doc.path()))
        {
            return Ok(current);
        }

        let root = self.workspace.project_root();
        let has_base_url = self.db.project_base_url(&root)?.is_some();
        let start = current
            .as_ref()
            .and_then(|doc| doc.path().parent().map(Path::to_path_buf))
            .unwrap_or_else(|| root.clone());

        let files = self.workspace.all_files().await;
        match find_index_file(&files, &start, &root, has_base_url) {
            Some(found) => {
                tracing::debug!(path = %found.display(), "Resolved index page");
                Ok(self.workspace.document_for_path(&found).await)
            }
            None => {
                tracing::debug!(start = %start.display(), "No index page in project");
                Ok(None)
            }
        }
    }

    fn server_config(&self) -> Result<ServerConfig> {
        let root = self.workspace.project_root();
        let base_url = self.db.project_base_url(&root)?;
        Ok(ServerConfig {
            root,
            base_url,
            probe: self.options.probe_user_server,
        })
    }

    async fn prepare_server(&self, path: &Path, generation: u64) -> Result<SharedServer> {
        loop {
            let config = self.server_config()?;

            let Some(server) = self.servers.get_server(path, &config) else {
                if !is_server_html_file_ext(path) {
                    return Err(SessionError::NoHtmlFile);
                }

                // Server-side pages need the project's own server
                let entered = self.dialogs.prompt_base_url(&config.root).await;
                self.ensure_current(generation)?;

                let entered = entered
                    .map(|url| url.trim().to_string())
                    .filter(|url| !url.is_empty());
                match entered {
                    Some(url) => {
                        tracing::info!(base_url = %url, "Saved project base URL");
                        self.db.set_project_base_url(&config.root, Some(&url))?;
                        continue;
                    }
                    None => return Err(SessionError::NoHtmlFile),
                }
            };

            let Some(ready) = server.ready_to_serve() else {
                return Err(SessionError::ServerNotReady(format!(
                    "{} server cannot report readiness",
                    server.kind()
                )));
            };
            let ready = ready.await;
            self.ensure_current(generation)?;

            return match ready {
                Ok(()) => Ok(server),
                Err(e) => Err(SessionError::ServerNotReady(e.to_string())),
            };
        }
    }

    fn start_session(&self, document: SharedDocument, server: SharedServer) -> Result<()> {
        self.teardown();

        let session_id = Uuid::new_v4();
        {
            let mut state = self.state.write();
            state.session_id = Some(session_id);
            state.server = Some(Arc::clone(&server));
        }
        self.set_status(LiveStatus::Connecting, None);

        self.workspace.ensure_editor(&document);
        let path = document.path().to_path_buf();
        if let Err(e) = self.create_primary(document, &server) {
            tracing::error!(path = %path.display(), error = %e, "Failed to create live document");
            self.close_with(CloseReason::Unknown);
            return Err(e);
        }
        server.start();

        tracing::info!(
            session_id = %session_id,
            path = %path.display(),
            server = server.kind(),
            "Opening live development session"
        );
        self.launch_or_navigate()
    }

    fn create_primary(
        &self,
        document: SharedDocument,
        server: &SharedServer,
    ) -> Result<SharedLiveDocument> {
        let live = create_live_document(
            document,
            self.protocol.clone(),
            url_resolver(server),
            Vec::new(),
        )?;
        if self.options.html_live_edit && live.read().kind() == LiveDocumentKind::Html {
            live.write().set_instrumentation_enabled(true);
        }

        server.add(Arc::clone(&live));
        self.state.write().primary = Some(Arc::clone(&live));
        Ok(live)
    }

    /// Launch a browser for a new session, or navigate the existing one
    /// after a restart
    fn launch_or_navigate(&self) -> Result<()> {
        let url = self.primary().and_then(|primary| primary.read().url());
        let Some(url) = url else {
            tracing::error!("Primary document has no served URL");
            self.close_with(CloseReason::Unknown);
            return Err(SessionError::NoHtmlFile);
        };

        let status = self.status();
        if status < LiveStatus::Active {
            let launcher = Arc::clone(&*self.launcher.read());
            // The browser can still be pointed at the URL by hand
            if let Err(e) = launcher.launch(&url) {
                tracing::warn!(url = %url, error = %e, "Browser launch failed");
            }
        }
        if status == LiveStatus::Restarting {
            fire(self.protocol.navigate(url), "Page.navigate");
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Closing
    // -------------------------------------------------------------------

    pub fn close(&self) {
        self.close_with(CloseReason::ExplicitClose);
    }

    /// Tear down an open session and go Inactive. Also cancels a pending
    /// `open`.
    pub fn close_with(&self, reason: CloseReason) {
        let (was_open, session_id) = {
            let mut state = self.state.write();
            state.open_generation += 1;
            (
                state.status.is_some_and(|s| s != LiveStatus::Inactive),
                state.session_id,
            )
        };

        if was_open {
            self.teardown();
            tracing::info!(
                session_id = ?session_id,
                reason = reason.as_str(),
                "Closed live development session"
            );
        }
        self.set_status(LiveStatus::Inactive, Some(reason));
    }

    /// Close live documents, browser connections and the server
    fn teardown(&self) {
        self.close_documents();
        self.protocol.close_all_connections();

        let server = self.state.write().server.take();
        if let Some(server) = server {
            server.stop();
        }
    }

    fn close_documents(&self) {
        let (primary, related, server) = {
            let mut state = self.state.write();
            state.doc_epoch += 1;
            (
                state.primary.take(),
                std::mem::take(&mut state.related),
                state.server.clone(),
            )
        };

        if let Some(server) = server {
            server.clear();
        }
        for doc in primary.into_iter().chain(related.into_values()) {
            doc.write().close();
        }
    }

    // -------------------------------------------------------------------
    // Browser events
    // -------------------------------------------------------------------

    /// Feed one transport event through the protocol layer
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        if let Some(event) = self.protocol.handle_transport_event(event) {
            self.handle_protocol_event(event).await;
        }
    }

    pub async fn handle_protocol_event(&self, event: ProtocolEvent) {
        if self.status() == LiveStatus::Inactive {
            tracing::trace!("Ignoring browser event while inactive");
            return;
        }

        match event {
            ProtocolEvent::ConnectionConnect { client, url } => self.on_connect(client, &url),
            ProtocolEvent::ConnectionClose { client } => self.on_connection_close(client),
            ProtocolEvent::DocumentRelated { related, .. } => {
                let stylesheets: Vec<(String, Vec<String>)> = related
                    .stylesheets
                    .iter()
                    .map(|(href, roots)| (href.clone(), roots.clone()))
                    .collect();
                self.update_primary(RelatedUpdate::Related(related));
                for (href, roots) in stylesheets {
                    self.stylesheet_added(href, roots).await;
                }
            }
            ProtocolEvent::StylesheetAdded { href, roots, .. } => {
                self.update_primary(RelatedUpdate::StylesheetAdded(href.clone()));
                self.stylesheet_added(href, roots).await;
            }
            ProtocolEvent::StylesheetRemoved { href, .. } => {
                self.update_primary(RelatedUpdate::StylesheetRemoved(href.clone()));
                self.remove_related(&href);
            }
            ProtocolEvent::ScriptAdded { src, .. } => {
                self.update_primary(RelatedUpdate::ScriptAdded(src));
            }
            ProtocolEvent::ScriptRemoved { src, .. } => {
                self.update_primary(RelatedUpdate::ScriptRemoved(src));
            }
        }
    }

    fn on_connect(&self, client: ClientId, url: &str) {
        if self.protocol.connection_ids().len() != 1 {
            return;
        }

        let primary = self.primary();
        let expected = primary.as_ref().and_then(|primary| primary.read().url());
        if expected.as_deref() == Some(url) {
            self.set_status(LiveStatus::Active, None);
            // Errors found while connecting had no status to flip
            if primary.is_some_and(|primary| primary.read().has_errors()) {
                self.set_status(LiveStatus::SyncError, None);
            }
        } else {
            tracing::debug!(
                client,
                url,
                expected = ?expected,
                "Connection is for a different page"
            );
        }
    }

    fn on_connection_close(&self, client: ClientId) {
        if !self.protocol.connection_ids().is_empty() {
            return;
        }
        // Reloading and Restarting expect the page to reconnect
        if self.status() <= LiveStatus::Active {
            tracing::debug!(client, "Last browser connection closed");
            self.close_with(CloseReason::DetachedTargetClosed);
        }
    }

    fn update_primary(&self, update: RelatedUpdate) {
        if let Some(primary) = self.primary() {
            primary.write().apply_related(update);
        }
    }

    async fn stylesheet_added(&self, href: String, roots: Vec<String>) {
        let (server, primary, epoch) = {
            let state = self.state.read();
            if state.related.contains_key(&href) {
                return;
            }
            (state.server.clone(), state.primary.clone(), state.doc_epoch)
        };
        let Some(server) = server else {
            return;
        };
        let Some(path) = server.url_to_path(&href) else {
            tracing::debug!(href = %href, "Stylesheet is not a project file");
            return;
        };
        if primary
            .as_ref()
            .is_some_and(|primary| primary.read().path() == path.as_path())
        {
            return;
        }

        let Some(document) = self.workspace.document_for_path(&path).await else {
            tracing::debug!(path = %path.display(), "No document for stylesheet");
            return;
        };
        if document.language() != Language::Css {
            return;
        }

        let live = match create_live_document(
            document,
            self.protocol.clone(),
            url_resolver(&server),
            roots,
        ) {
            Ok(live) => live,
            Err(e) => {
                tracing::warn!(href = %href, error = %e, "Failed to create related document");
                return;
            }
        };

        let stale = {
            let mut state = self.state.write();
            let stale = state.doc_epoch != epoch || state.related.contains_key(&href);
            if !stale {
                state.related.insert(href.clone(), Arc::clone(&live));
            }
            stale
        };
        if stale {
            live.write().close();
            return;
        }

        server.add(live);
        tracing::debug!(href = %href, path = %path.display(), "Tracking related stylesheet");
    }

    fn remove_related(&self, href: &str) {
        let (doc, server) = {
            let mut state = self.state.write();
            (state.related.remove(href), state.server.clone())
        };
        let Some(doc) = doc else {
            return;
        };

        if let Some(server) = server {
            server.remove(&doc);
        }
        doc.write().close();
        tracing::debug!(href, "Stopped tracking related stylesheet");
    }

    // -------------------------------------------------------------------
    // Editor events
    // -------------------------------------------------------------------

    pub fn handle_host_event(&self, event: HostEvent) {
        match event {
            HostEvent::CurrentFileChanged => self.on_current_file_changed(),
            HostEvent::DocumentChanged { path, change } => self.on_document_changed(&path, &change),
            HostEvent::DirtyFlagChanged { path, is_dirty } => {
                self.on_dirty_flag_changed(&path, is_dirty)
            }
            HostEvent::DocumentSaved { path } => self.on_document_saved(&path),
            HostEvent::FileDeleted { path } => self.on_file_deleted(&path),
            HostEvent::CursorMoved { path, cursor } => self.show_highlight(&path, cursor),
            HostEvent::BeforeProjectClose | HostEvent::BeforeAppClose => {
                self.close_with(CloseReason::ExplicitClose)
            }
        }
    }

    /// Follow the editor to another page the current server can serve
    fn on_current_file_changed(&self) {
        if self.status() == LiveStatus::Inactive {
            return;
        }
        let Some(document) = self.workspace.current_document() else {
            return;
        };
        let (server, primary) = {
            let state = self.state.read();
            (state.server.clone(), state.primary.clone())
        };
        let Some(server) = server else {
            return;
        };

        let path = document.path().to_path_buf();
        if primary
            .as_ref()
            .is_some_and(|primary| primary.read().path() == path.as_path())
        {
            return;
        }
        if !server.can_serve(&path) {
            return;
        }

        tracing::info!(path = %path.display(), "Restarting live development");
        self.close_documents();
        self.workspace.ensure_editor(&document);
        if let Err(e) = self.create_primary(document, &server) {
            tracing::error!(path = %path.display(), error = %e, "Failed to create live document");
            self.close_with(CloseReason::Unknown);
            return;
        }

        self.set_status(LiveStatus::Restarting, None);
        // Errors already closed the session
        let _ = self.launch_or_navigate();
    }

    fn on_document_changed(&self, path: &Path, change: &DocumentChange) {
        if self.status() == LiveStatus::Inactive {
            return;
        }
        let Some(live) = self.live_doc_for_path(path) else {
            return;
        };

        let (outcome, stale_roots) = {
            let mut live = live.write();
            let outcome = live.on_change(change);
            (outcome, live.take_stale_roots())
        };
        self.apply_sync_outcome(outcome);
        self.update_roots(&stale_roots);
    }

    /// Push root stylesheets again so the browser picks up their imports
    fn update_roots(&self, roots: &[String]) {
        if roots.is_empty() {
            return;
        }
        let Some(server) = self.state.read().server.clone() else {
            return;
        };

        for root in roots {
            let doc = server.url_to_path(root).and_then(|path| server.get(&path));
            match doc {
                Some(doc) => doc.write().update_browser(),
                None => tracing::debug!(root = %root, "Root stylesheet is not live"),
            }
        }
    }

    fn apply_sync_outcome(&self, outcome: SyncOutcome) {
        let SyncOutcome::ErrorStatusChanged { has_errors } = outcome else {
            return;
        };
        if !self.status().is_connected() {
            return;
        }
        let status = if has_errors {
            LiveStatus::SyncError
        } else {
            LiveStatus::Active
        };
        self.set_status(status, None);
    }

    fn on_dirty_flag_changed(&self, path: &Path, is_dirty: bool) {
        if !matches!(self.status(), LiveStatus::Active | LiveStatus::OutOfSync) {
            return;
        }
        let Some(primary) = self.primary() else {
            return;
        };
        if !primary.read().is_related(path) {
            return;
        }

        let live_editing = self
            .live_doc_for_path(path)
            .is_some_and(|doc| doc.read().is_live_editing_enabled());
        let status = if is_dirty && !live_editing {
            LiveStatus::OutOfSync
        } else {
            LiveStatus::Active
        };
        self.set_status(status, None);
    }

    /// Saving a related file the browser cannot patch reloads the page
    fn on_document_saved(&self, path: &Path) {
        if self.status() == LiveStatus::Inactive {
            return;
        }
        let Some(primary) = self.primary() else {
            return;
        };
        if self
            .live_doc_for_path(path)
            .is_some_and(|doc| doc.read().is_live_editing_enabled())
        {
            return;
        }

        if primary.read().is_related(path) {
            self.set_status(LiveStatus::Reloading, None);
            self.reload();
        }
    }

    fn on_file_deleted(&self, path: &Path) {
        let href = {
            let state = self.state.read();
            state
                .related
                .iter()
                .find(|(_, doc)| doc.read().path() == path)
                .map(|(href, _)| href.clone())
        };
        if let Some(href) = href {
            self.remove_related(&href);
        }
    }

    // -------------------------------------------------------------------
    // Highlighting
    // -------------------------------------------------------------------

    pub fn is_highlight_enabled(&self) -> bool {
        self.state.read().highlight_enabled
    }

    /// Persist the preference; turning it off clears the page
    pub fn set_highlight_enabled(&self, enabled: bool) -> Result<()> {
        self.db.set_bool_setting(HIGHLIGHT_SETTING, enabled)?;
        self.state.write().highlight_enabled = enabled;
        if !enabled {
            self.hide_highlight();
        }
        Ok(())
    }

    /// Highlight what the cursor is on in the page
    pub fn show_highlight(&self, path: &Path, cursor: TextPosition) {
        if !self.is_highlight_enabled() || self.status() == LiveStatus::Inactive {
            return;
        }
        if let Some(doc) = self.live_doc_for_path(path) {
            doc.write().update_highlight(cursor);
        }
    }

    pub fn hide_highlight(&self) {
        fire(self.protocol.evaluate("_LD.hideHighlight()"), "Runtime.evaluate");
    }

    pub fn redraw_highlight(&self) {
        fire(
            self.protocol.evaluate("_LD.redrawHighlights()"),
            "Runtime.evaluate",
        );
    }

    // -------------------------------------------------------------------
    // Queries and host hooks
    // -------------------------------------------------------------------

    fn primary(&self) -> Option<SharedLiveDocument> {
        self.state.read().primary.clone()
    }

    pub fn primary_path(&self) -> Option<PathBuf> {
        self.primary()
            .map(|primary| primary.read().path().to_path_buf())
    }

    pub fn related_urls(&self) -> Vec<String> {
        self.state.read().related.keys().cloned().collect()
    }

    pub fn live_doc_for_path(&self, path: &Path) -> Option<SharedLiveDocument> {
        let server = self.state.read().server.clone()?;
        server.get(path)
    }

    pub fn server_base_url(&self) -> Option<String> {
        self.state
            .read()
            .server
            .as_ref()
            .map(|server| server.base_url())
    }

    /// Reload every connected page
    pub fn reload(&self) {
        fire(self.protocol.reload(true), "Page.reload");
    }

    pub fn set_launcher(&self, launcher: Arc<dyn Launcher>) {
        *self.launcher.write() = launcher;
    }

    pub fn set_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        self.protocol.set_transport(transport)?;
        Ok(())
    }

    pub fn remote_script(&self) -> String {
        self.protocol.remote_script()
    }

    pub fn project_base_url(&self) -> Result<Option<String>> {
        let root = self.workspace.project_root();
        Ok(self.db.project_base_url(&root)?)
    }

    pub fn set_project_base_url(&self, base_url: Option<&str>) -> Result<()> {
        let root = self.workspace.project_root();
        self.db.set_project_base_url(&root, base_url)?;
        Ok(())
    }

    /// When a Connecting session gives up, if a timeout is configured
    pub fn connect_deadline(&self) -> Option<Instant> {
        let timeout = self.options.connect_timeout?;
        let state = self.state.read();
        if state.status != Some(LiveStatus::Connecting) {
            return None;
        }
        state.connecting_since.map(|since| since + timeout)
    }

    /// Close the session if it has been connecting past its deadline
    pub fn check_connect_timeout(&self, now: Instant) -> bool {
        match self.connect_deadline() {
            Some(deadline) if deadline <= now => {
                tracing::warn!("No browser connected in time");
                self.close_with(CloseReason::ConnectTimeout);
                true
            }
            _ => false,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use livedev_documents::InMemoryDocument;
    use livedev_protocol::{event_channel, LoopbackTransport, TransportEventReceiver};
    use livedev_server::{DocumentRegistry, FileServer, LiveServer, ReadyFuture};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const INDEX: &str = "/proj/index.html";
    const INDEX_URL: &str = "file:///proj/index.html";
    const CSS: &str = "/proj/main.css";
    const CSS_URL: &str = "file:///proj/main.css";
    const STYLESHEET_ADDED: &str = r#"{"type":"StylesheetAdded","href":"file:///proj/main.css","roots":["file:///proj/main.css"]}"#;

    struct FakeWorkspace {
        current: Mutex<Option<PathBuf>>,
        docs: HashMap<PathBuf, Arc<InMemoryDocument>>,
        files: Vec<PathBuf>,
        ensured: Mutex<Vec<PathBuf>>,
    }

    impl FakeWorkspace {
        fn doc(&self, path: &str) -> Arc<InMemoryDocument> {
            Arc::clone(&self.docs[Path::new(path)])
        }

        fn set_current(&self, path: &str) {
            *self.current.lock() = Some(PathBuf::from(path));
        }
    }

    #[async_trait]
    impl Workspace for FakeWorkspace {
        fn project_root(&self) -> PathBuf {
            PathBuf::from("/proj")
        }

        fn current_document(&self) -> Option<SharedDocument> {
            let path = self.current.lock().clone()?;
            self.docs
                .get(&path)
                .map(|doc| Arc::clone(doc) as SharedDocument)
        }

        async fn document_for_path(&self, path: &Path) -> Option<SharedDocument> {
            self.docs
                .get(path)
                .map(|doc| Arc::clone(doc) as SharedDocument)
        }

        async fn all_files(&self) -> Vec<PathBuf> {
            self.files.clone()
        }

        fn ensure_editor(&self, document: &SharedDocument) {
            self.ensured.lock().push(document.path().to_path_buf());
        }
    }

    #[derive(Default)]
    struct FakeDialogs {
        errors: Mutex<Vec<SetupFailure>>,
        base_url: Mutex<Option<String>>,
        prompts: AtomicUsize,
        prompt_entered: Notify,
        /// When set, the prompt waits for a permit before answering
        prompt_gate: Option<Notify>,
    }

    #[async_trait]
    impl Dialogs for FakeDialogs {
        fn show_error(&self, failure: SetupFailure) {
            self.errors.lock().push(failure);
        }

        async fn prompt_base_url(&self, _project_root: &Path) -> Option<String> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            self.prompt_entered.notify_one();
            if let Some(gate) = &self.prompt_gate {
                gate.notified().await;
            }
            self.base_url.lock().clone()
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        urls: Mutex<Vec<String>>,
    }

    impl Launcher for RecordingLauncher {
        fn launch(&self, url: &str) -> Result<()> {
            self.urls.lock().push(url.to_string());
            Ok(())
        }
    }

    /// File server that counts `stop` calls
    struct CountingServer {
        inner: FileServer,
        stops: Arc<AtomicUsize>,
    }

    impl LiveServer for CountingServer {
        fn kind(&self) -> &'static str {
            "file"
        }

        fn root(&self) -> &Path {
            self.inner.root()
        }

        fn registry(&self) -> &DocumentRegistry {
            self.inner.registry()
        }

        fn path_to_url(&self, path: &Path) -> Option<String> {
            self.inner.path_to_url(path)
        }

        fn url_to_path(&self, url: &str) -> Option<PathBuf> {
            self.inner.url_to_path(url)
        }

        fn can_serve(&self, path: &Path) -> bool {
            self.inner.can_serve(path)
        }

        fn ready_to_serve(&self) -> Option<ReadyFuture> {
            self.inner.ready_to_serve()
        }

        fn base_url(&self) -> String {
            self.inner.base_url()
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.inner.stop();
        }
    }

    struct Harness {
        session: SessionManager,
        transport: LoopbackTransport,
        workspace: Arc<FakeWorkspace>,
        dialogs: Arc<FakeDialogs>,
        launcher: Arc<RecordingLauncher>,
        stops: Arc<AtomicUsize>,
        db: Database,
        statuses: broadcast::Receiver<StatusChange>,
        _events: TransportEventReceiver,
    }

    impl Harness {
        fn drain(&mut self) -> Vec<LiveStatus> {
            let mut out = Vec::new();
            while let Ok(change) = self.statuses.try_recv() {
                out.push(change.status);
            }
            out
        }

        async fn connect(&self, client: ClientId, url: &str) {
            self.session
                .handle_transport_event(TransportEvent::Connect {
                    client,
                    url: url.to_string(),
                })
                .await;
        }

        async fn disconnect(&self, client: ClientId) {
            self.session
                .handle_transport_event(TransportEvent::Close { client })
                .await;
        }

        async fn message(&self, client: ClientId, text: &str) {
            self.session
                .handle_transport_event(TransportEvent::Message {
                    client,
                    text: text.to_string(),
                })
                .await;
        }

        fn host(&self, event: HostEvent) {
            self.session.handle_host_event(event);
        }

        fn stop_count(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }

        fn live(&self, path: &str) -> Option<SharedLiveDocument> {
            self.session.live_doc_for_path(Path::new(path))
        }
    }

    fn test_options() -> SessionOptions {
        SessionOptions {
            probe_user_server: false,
            ..SessionOptions::default()
        }
    }

    fn harness_with(
        files: &[(&str, &str)],
        current: Option<&str>,
        dialogs: FakeDialogs,
        options: SessionOptions,
    ) -> Harness {
        let docs = files
            .iter()
            .map(|(path, text)| (PathBuf::from(path), InMemoryDocument::shared(*path, *text)))
            .collect();
        let workspace = Arc::new(FakeWorkspace {
            current: Mutex::new(current.map(PathBuf::from)),
            docs,
            files: files.iter().map(|(path, _)| PathBuf::from(path)).collect(),
            ensured: Mutex::default(),
        });

        let stops = Arc::new(AtomicUsize::new(0));
        let servers = ServerManager::with_defaults();
        {
            let stops = Arc::clone(&stops);
            servers.register(
                "file",
                0,
                Arc::new(move |config: &ServerConfig| {
                    Some(Arc::new(CountingServer {
                        inner: FileServer::new(config.root.clone()),
                        stops: Arc::clone(&stops),
                    }) as SharedServer)
                }),
            );
        }

        let (tx, rx) = event_channel();
        let protocol = LiveDevProtocol::new(tx);
        let transport = LoopbackTransport::new();
        protocol.set_transport(Arc::new(transport.clone())).unwrap();

        let db = Database::open_in_memory().unwrap();
        let dialogs = Arc::new(dialogs);
        let session = SessionManager::new(
            protocol,
            servers,
            workspace.clone(),
            dialogs.clone(),
            db.clone(),
            options,
        );
        let launcher = Arc::new(RecordingLauncher::default());
        session.set_launcher(launcher.clone());

        let statuses = session.subscribe();
        session.init().unwrap();

        Harness {
            session,
            transport,
            workspace,
            dialogs,
            launcher,
            stops,
            db,
            statuses,
            _events: rx,
        }
    }

    fn site() -> Vec<(&'static str, &'static str)> {
        vec![
            (INDEX, "<html><head></head><body><p>hi</p></body></html>"),
            ("/proj/about.html", "<p>about</p>"),
            (CSS, "body { color: red; }"),
            ("/proj/app.js", "console.log(1);"),
        ]
    }

    async fn open_site() -> Harness {
        let h = harness_with(&site(), Some(INDEX), FakeDialogs::default(), test_options());
        h.session.open().await.unwrap();
        h
    }

    async fn active_site() -> Harness {
        let mut h = open_site().await;
        h.connect(1, INDEX_URL).await;
        assert_eq!(h.session.status(), LiveStatus::Active);
        h.drain();
        h
    }

    #[tokio::test]
    async fn test_setting_same_status_is_silent() {
        let mut h = harness_with(&site(), None, FakeDialogs::default(), test_options());
        h.session.set_status(LiveStatus::Inactive, None);
        h.session.set_status(LiveStatus::Inactive, Some(CloseReason::Unknown));

        assert_eq!(h.drain(), vec![LiveStatus::Inactive]);
        assert_eq!(h.session.close_reason(), None);
    }

    #[tokio::test]
    async fn test_open_launches_browser() {
        let mut h = open_site().await;

        assert_eq!(h.session.status(), LiveStatus::Connecting);
        assert_eq!(*h.launcher.urls.lock(), vec![INDEX_URL.to_string()]);
        assert_eq!(*h.workspace.ensured.lock(), vec![PathBuf::from(INDEX)]);
        assert!(h.session.session_id().is_some());
        assert_eq!(h.session.server_base_url().as_deref(), Some("file:///proj/"));
        assert_eq!(h.session.primary_path(), Some(PathBuf::from(INDEX)));
        assert!(h.live(INDEX).is_some());
        assert_eq!(h.drain(), vec![LiveStatus::Inactive, LiveStatus::Connecting]);
    }

    #[tokio::test]
    async fn test_first_connection_activates_once() {
        let mut h = open_site().await;
        h.drain();

        h.connect(1, INDEX_URL).await;
        h.connect(2, INDEX_URL).await;

        assert_eq!(h.drain(), vec![LiveStatus::Active]);
    }

    #[tokio::test]
    async fn test_connection_for_other_page_is_ignored() {
        let mut h = open_site().await;
        h.drain();

        h.connect(1, "file:///proj/b.html").await;

        assert_eq!(h.session.status(), LiveStatus::Connecting);
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn test_last_connection_close_ends_session() {
        let mut h = active_site().await;
        h.connect(2, INDEX_URL).await;

        h.disconnect(1).await;
        assert_eq!(h.session.status(), LiveStatus::Active);
        assert!(h.drain().is_empty());

        h.disconnect(2).await;
        assert_eq!(h.session.status(), LiveStatus::Inactive);
        assert_eq!(
            h.session.close_reason(),
            Some(CloseReason::DetachedTargetClosed)
        );
        assert_eq!(h.stop_count(), 1);
        assert!(h.session.server_base_url().is_none());
    }

    #[tokio::test]
    async fn test_close_when_inactive_does_nothing() {
        let h = harness_with(&site(), Some(INDEX), FakeDialogs::default(), test_options());
        h.session.close();
        assert_eq!(h.stop_count(), 0);
        assert_eq!(h.session.close_reason(), None);

        let mut h = active_site().await;
        let primary = h.live(INDEX).unwrap();
        h.disconnect(1).await;
        assert!(primary.read().is_closed());
        assert_eq!(h.stop_count(), 1);
        assert_eq!(h.drain(), vec![LiveStatus::Inactive]);

        h.session.close();
        assert_eq!(h.stop_count(), 1);
        assert_eq!(
            h.session.close_reason(),
            Some(CloseReason::DetachedTargetClosed)
        );
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_close_tears_down() {
        let h = active_site().await;
        let primary = h.live(INDEX).unwrap();

        h.session.close();

        assert_eq!(h.session.status(), LiveStatus::Inactive);
        assert_eq!(h.session.close_reason(), Some(CloseReason::ExplicitClose));
        assert!(primary.read().is_closed());
        assert_eq!(h.transport.closed_clients(), vec![1]);
        assert!(h.session.protocol().connection_ids().is_empty());
        assert_eq!(h.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_related_stylesheet_lifecycle() {
        let h = active_site().await;

        h.message(1, STYLESHEET_ADDED).await;
        assert_eq!(h.session.related_urls(), vec![CSS_URL.to_string()]);
        let css = h.live(CSS).unwrap();
        assert_eq!(css.read().kind(), LiveDocumentKind::Css);

        h.message(1, STYLESHEET_ADDED).await;
        assert_eq!(h.session.related_urls().len(), 1);
        assert!(Arc::ptr_eq(&css, &h.live(CSS).unwrap()));

        h.message(
            1,
            r#"{"type":"Stylesheet.Removed","href":"file:///proj/main.css"}"#,
        )
        .await;
        assert!(h.session.related_urls().is_empty());
        assert!(css.read().is_closed());
        assert!(h.live(CSS).is_none());
    }

    #[tokio::test]
    async fn test_document_related_report() {
        let h = active_site().await;

        h.message(
            1,
            r#"{"type":"Document.Related","related":{
                "stylesheets":{"file:///proj/main.css":["file:///proj/main.css"]},
                "scripts":{"file:///proj/app.js":true}}}"#,
        )
        .await;

        assert_eq!(h.session.related_urls(), vec![CSS_URL.to_string()]);
        let primary = h.live(INDEX).unwrap();
        assert!(primary.read().is_related(Path::new("/proj/app.js")));
    }

    #[tokio::test]
    async fn test_browser_events_ignored_while_inactive() {
        let h = harness_with(&site(), Some(INDEX), FakeDialogs::default(), test_options());
        h.connect(1, INDEX_URL).await;
        h.message(1, STYLESHEET_ADDED).await;

        assert_eq!(h.session.status(), LiveStatus::Inactive);
        assert!(h.session.related_urls().is_empty());
    }

    #[tokio::test]
    async fn test_index_page_closest_to_current_file() {
        let files = [
            ("/proj/sub/a.js", ""),
            ("/proj/sub/index.htm", "<p>sub</p>"),
            ("/proj/index.html", "<p>top</p>"),
        ];
        let h = harness_with(
            &files,
            Some("/proj/sub/a.js"),
            FakeDialogs::default(),
            test_options(),
        );

        h.session.open().await.unwrap();

        assert_eq!(
            h.session.primary_path(),
            Some(PathBuf::from("/proj/sub/index.htm"))
        );
        assert_eq!(
            *h.launcher.urls.lock(),
            vec!["file:///proj/sub/index.htm".to_string()]
        );
    }

    #[tokio::test]
    async fn test_no_page_shows_one_dialog() {
        let files = [("/proj/sub/a.js", ""), ("/proj/main.css", "")];
        let h = harness_with(
            &files,
            Some("/proj/sub/a.js"),
            FakeDialogs::default(),
            test_options(),
        );

        let result = h.session.open().await;

        assert!(matches!(result, Err(SessionError::NoHtmlFile)));
        assert_eq!(*h.dialogs.errors.lock(), vec![SetupFailure::NeedHtmlFile]);
        assert_eq!(h.session.status(), LiveStatus::Inactive);
        assert!(h.launcher.urls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_sync_round_trip() {
        let mut h = active_site().await;
        h.message(1, r#"{"type":"ScriptAdded","src":"file:///proj/app.js"}"#)
            .await;
        let script = PathBuf::from("/proj/app.js");

        h.host(HostEvent::DirtyFlagChanged {
            path: script.clone(),
            is_dirty: true,
        });
        assert_eq!(h.session.status(), LiveStatus::OutOfSync);

        h.host(HostEvent::DirtyFlagChanged {
            path: script.clone(),
            is_dirty: false,
        });
        assert_eq!(h.session.status(), LiveStatus::Active);

        h.host(HostEvent::DirtyFlagChanged {
            path: script.clone(),
            is_dirty: true,
        });
        h.host(HostEvent::DocumentSaved {
            path: script.clone(),
        });
        assert_eq!(h.session.status(), LiveStatus::Reloading);
        assert_eq!(h.transport.sent_of_type("Page.reload").len(), 1);
        assert_eq!(
            h.drain(),
            vec![
                LiveStatus::OutOfSync,
                LiveStatus::Active,
                LiveStatus::OutOfSync,
                LiveStatus::Reloading
            ]
        );

        // The reloaded page reconnects
        h.disconnect(1).await;
        assert_eq!(h.session.status(), LiveStatus::Reloading);
        h.connect(2, INDEX_URL).await;
        assert_eq!(h.session.status(), LiveStatus::Active);
    }

    #[tokio::test]
    async fn test_live_stylesheet_never_out_of_sync() {
        let h = active_site().await;
        h.message(1, STYLESHEET_ADDED).await;

        h.host(HostEvent::DirtyFlagChanged {
            path: PathBuf::from(CSS),
            is_dirty: true,
        });
        h.host(HostEvent::DocumentSaved {
            path: PathBuf::from(CSS),
        });

        assert_eq!(h.session.status(), LiveStatus::Active);
        assert!(h.transport.sent_of_type("Page.reload").is_empty());
    }

    #[tokio::test]
    async fn test_unrelated_file_is_ignored() {
        let h = active_site().await;

        h.host(HostEvent::DirtyFlagChanged {
            path: PathBuf::from("/proj/app.js"),
            is_dirty: true,
        });
        h.host(HostEvent::DocumentSaved {
            path: PathBuf::from("/proj/app.js"),
        });

        assert_eq!(h.session.status(), LiveStatus::Active);
        assert!(h.transport.sent_of_type("Page.reload").is_empty());
    }

    #[tokio::test]
    async fn test_restart_tears_down_documents() {
        let mut h = active_site().await;
        h.message(1, STYLESHEET_ADDED).await;
        let old_primary = h.live(INDEX).unwrap();
        let css = h.live(CSS).unwrap();

        h.workspace.set_current("/proj/about.html");
        h.host(HostEvent::CurrentFileChanged);

        assert!(old_primary.read().is_closed());
        assert!(css.read().is_closed());
        assert!(h.session.related_urls().is_empty());
        assert!(h.live(INDEX).is_none());
        assert_eq!(
            h.session.primary_path(),
            Some(PathBuf::from("/proj/about.html"))
        );
        assert_eq!(h.session.status(), LiveStatus::Restarting);

        let navigations = h.transport.sent_of_type("Page.navigate");
        assert_eq!(navigations.len(), 1);
        assert_eq!(navigations[0]["url"], "file:///proj/about.html");
        assert_eq!(h.launcher.urls.lock().len(), 1);

        h.disconnect(1).await;
        assert_eq!(h.session.status(), LiveStatus::Restarting);
        h.connect(2, "file:///proj/about.html").await;
        assert_eq!(h.session.status(), LiveStatus::Active);
        assert_eq!(
            h.drain(),
            vec![LiveStatus::Restarting, LiveStatus::Active]
        );
    }

    #[tokio::test]
    async fn test_switching_to_unservable_file_keeps_session() {
        let h = active_site().await;

        h.workspace.set_current(CSS);
        h.host(HostEvent::CurrentFileChanged);

        assert_eq!(h.session.status(), LiveStatus::Active);
        assert_eq!(h.session.primary_path(), Some(PathBuf::from(INDEX)));
        assert!(h.transport.sent_of_type("Page.navigate").is_empty());
    }

    #[tokio::test]
    async fn test_stylesheet_errors_toggle_sync_error() {
        let h = active_site().await;
        h.message(1, STYLESHEET_ADDED).await;
        let doc = h.workspace.doc(CSS);

        let broken = DocumentChange::insert(TextPosition::new(0, 20), " a {");
        doc.apply(&broken).unwrap();
        h.host(HostEvent::DocumentChanged {
            path: PathBuf::from(CSS),
            change: broken,
        });
        assert_eq!(h.session.status(), LiveStatus::SyncError);

        let fixed = DocumentChange::insert(TextPosition::new(0, 24), "}");
        doc.apply(&fixed).unwrap();
        h.host(HostEvent::DocumentChanged {
            path: PathBuf::from(CSS),
            change: fixed,
        });
        assert_eq!(h.session.status(), LiveStatus::Active);

        let pushed = h.transport.sent_of_type("CSS.setStylesheetText");
        assert_eq!(pushed.last().unwrap()["text"], "body { color: red; } a {}");
    }

    #[tokio::test]
    async fn test_imported_stylesheet_edit_pushes_root() {
        let mut files = site();
        files.push(("/proj/reset.css", "* { margin: 0; }"));
        let h = harness_with(&files, Some(INDEX), FakeDialogs::default(), test_options());
        h.session.open().await.unwrap();
        h.connect(1, INDEX_URL).await;

        h.message(1, STYLESHEET_ADDED).await;
        h.message(
            1,
            r#"{"type":"StylesheetAdded","href":"file:///proj/reset.css","roots":["file:///proj/main.css"]}"#,
        )
        .await;
        assert_eq!(h.session.related_urls().len(), 2);

        let doc = h.workspace.doc("/proj/reset.css");
        let change = DocumentChange::insert(TextPosition::new(0, 14), " padding: 0;");
        doc.apply(&change).unwrap();
        h.host(HostEvent::DocumentChanged {
            path: PathBuf::from("/proj/reset.css"),
            change,
        });

        let pushed = h.transport.sent_of_type("CSS.setStylesheetText");
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0]["url"], CSS_URL);
        assert_eq!(pushed[0]["text"], "body { color: red; }");
        assert_eq!(h.session.status(), LiveStatus::Active);
    }

    #[tokio::test]
    async fn test_page_broken_before_connect_reports_sync_error() {
        let options = SessionOptions {
            html_live_edit: true,
            ..test_options()
        };
        let mut h = harness_with(
            &[(INDEX, "<div><span>x</div>")],
            Some(INDEX),
            FakeDialogs::default(),
            options,
        );
        h.session.open().await.unwrap();
        h.drain();

        h.connect(1, INDEX_URL).await;
        assert_eq!(h.drain(), vec![LiveStatus::Active, LiveStatus::SyncError]);

        let doc = h.workspace.doc(INDEX);
        let still_broken = DocumentChange::insert(TextPosition::new(0, 12), "y");
        doc.apply(&still_broken).unwrap();
        h.host(HostEvent::DocumentChanged {
            path: PathBuf::from(INDEX),
            change: still_broken,
        });
        assert_eq!(h.session.status(), LiveStatus::SyncError);
        assert!(h.transport.sent_of_type("Document.applyEdit").is_empty());

        let fixed = DocumentChange::insert(TextPosition::new(0, 13), "</span>");
        doc.apply(&fixed).unwrap();
        h.host(HostEvent::DocumentChanged {
            path: PathBuf::from(INDEX),
            change: fixed,
        });
        assert_eq!(h.session.status(), LiveStatus::Active);

        let resync = h.transport.sent_of_type("Document.setText");
        assert_eq!(resync.len(), 1);
        assert_eq!(resync[0]["text"], "<div><span>xy</span></div>");
    }

    #[tokio::test]
    async fn test_deleted_stylesheet_is_dropped() {
        let h = active_site().await;
        h.message(1, STYLESHEET_ADDED).await;
        let css = h.live(CSS).unwrap();

        h.host(HostEvent::FileDeleted {
            path: PathBuf::from(CSS),
        });

        assert!(h.session.related_urls().is_empty());
        assert!(css.read().is_closed());
    }

    #[tokio::test]
    async fn test_project_close_ends_session() {
        let h = active_site().await;
        h.host(HostEvent::BeforeProjectClose);

        assert_eq!(h.session.status(), LiveStatus::Inactive);
        assert_eq!(h.session.close_reason(), Some(CloseReason::ExplicitClose));
    }

    #[tokio::test]
    async fn test_base_url_prompt_for_server_page() {
        let dialogs = FakeDialogs {
            base_url: Mutex::new(Some(" http://localhost:8000 ".to_string())),
            ..FakeDialogs::default()
        };
        let h = harness_with(
            &[("/proj/index.php", "<?php echo 1; ?>")],
            Some("/proj/index.php"),
            dialogs,
            test_options(),
        );

        h.session.open().await.unwrap();

        assert_eq!(h.dialogs.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.db.project_base_url(Path::new("/proj")).unwrap().as_deref(),
            Some("http://localhost:8000")
        );
        assert_eq!(
            *h.launcher.urls.lock(),
            vec!["http://localhost:8000/index.php".to_string()]
        );
        assert!(h.dialogs.errors.lock().is_empty());
        assert_eq!(h.session.status(), LiveStatus::Connecting);
    }

    #[tokio::test]
    async fn test_dismissed_prompt_needs_html_file() {
        let h = harness_with(
            &[("/proj/index.php", "")],
            Some("/proj/index.php"),
            FakeDialogs::default(),
            test_options(),
        );

        let result = h.session.open().await;

        assert!(matches!(result, Err(SessionError::NoHtmlFile)));
        assert_eq!(h.dialogs.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(*h.dialogs.errors.lock(), vec![SetupFailure::NeedHtmlFile]);
        assert_eq!(h.session.project_base_url().unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable_user_server_shows_one_dialog() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let options = SessionOptions {
            probe_user_server: true,
            ..SessionOptions::default()
        };
        let h = harness_with(&site(), Some(INDEX), FakeDialogs::default(), options);
        h.session
            .set_project_base_url(Some(&format!("http://127.0.0.1:{port}/")))
            .unwrap();

        let result = h.session.open().await;

        assert!(matches!(result, Err(SessionError::ServerNotReady(_))));
        assert_eq!(*h.dialogs.errors.lock(), vec![SetupFailure::ServerNotReady]);
        assert_eq!(h.session.status(), LiveStatus::Inactive);
        assert!(h.launcher.urls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_close_cancels_pending_open() {
        let dialogs = FakeDialogs {
            base_url: Mutex::new(Some("http://localhost:8000".to_string())),
            prompt_gate: Some(Notify::new()),
            ..FakeDialogs::default()
        };
        let h = harness_with(
            &[("/proj/index.php", "")],
            Some("/proj/index.php"),
            dialogs,
            test_options(),
        );

        let (result, ()) = tokio::join!(h.session.open(), async {
            h.dialogs.prompt_entered.notified().await;
            h.session.close();
            if let Some(gate) = &h.dialogs.prompt_gate {
                gate.notify_one();
            }
        });

        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert!(h.dialogs.errors.lock().is_empty());
        assert!(h.launcher.urls.lock().is_empty());
        assert_eq!(h.session.status(), LiveStatus::Inactive);
        assert_eq!(h.session.project_base_url().unwrap(), None);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let options = SessionOptions {
            connect_timeout: Some(Duration::from_secs(5)),
            ..test_options()
        };
        let h = harness_with(&site(), Some(INDEX), FakeDialogs::default(), options);
        h.session.open().await.unwrap();

        let deadline = h.session.connect_deadline().unwrap();
        assert!(!h.session.check_connect_timeout(deadline - Duration::from_secs(1)));
        assert!(h.session.check_connect_timeout(deadline));

        assert_eq!(h.session.status(), LiveStatus::Inactive);
        assert_eq!(h.session.close_reason(), Some(CloseReason::ConnectTimeout));
        assert!(h.session.connect_deadline().is_none());
    }

    #[tokio::test]
    async fn test_no_deadline_without_timeout() {
        let h = open_site().await;
        assert!(h.session.connect_deadline().is_none());
        assert!(!h.session.check_connect_timeout(Instant::now()));
    }

    #[tokio::test]
    async fn test_highlight_follows_cursor_and_preference() {
        let h = active_site().await;
        assert!(h.session.is_highlight_enabled());

        h.host(HostEvent::CursorMoved {
            path: PathBuf::from(INDEX),
            cursor: TextPosition::new(0, 28),
        });
        let evaluated = h.transport.sent_of_type("Runtime.evaluate");
        assert_eq!(evaluated.len(), 1);
        assert!(evaluated[0]["expression"]
            .as_str()
            .unwrap()
            .starts_with("_LD.highlight("));

        h.session.set_highlight_enabled(false).unwrap();
        assert!(!h.db.get_bool_setting(HIGHLIGHT_SETTING, true).unwrap());
        let evaluated = h.transport.sent_of_type("Runtime.evaluate");
        assert_eq!(evaluated.len(), 2);
        assert_eq!(evaluated[1]["expression"], "_LD.hideHighlight()");

        h.host(HostEvent::CursorMoved {
            path: PathBuf::from(INDEX),
            cursor: TextPosition::new(0, 28),
        });
        assert_eq!(h.transport.sent_of_type("Runtime.evaluate").len(), 2);

        h.session.redraw_highlight();
        let evaluated = h.transport.sent_of_type("Runtime.evaluate");
        assert_eq!(evaluated[2]["expression"], "_LD.redrawHighlights()");
    }

    #[tokio::test]
    async fn test_reopen_replaces_previous_session() {
        let h = active_site().await;
        let first = h.session.session_id();
        let old_primary = h.live(INDEX).unwrap();

        h.session.open().await.unwrap();

        assert!(old_primary.read().is_closed());
        assert_ne!(h.session.session_id(), first);
        assert_eq!(h.session.status(), LiveStatus::Connecting);
        assert_eq!(h.stop_count(), 1);
        assert_eq!(h.launcher.urls.lock().len(), 2);
    }
}
