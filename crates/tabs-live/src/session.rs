use tabs_core::actions::Disposition;
use tabs_core::actions::Operation;
use tabs_core::actions::TabIntent;
use tabs_core::config::SessionConfig;
use tabs_core::persistence::OperationStore;
use tabs_core::persistence::StoreError;
use tabs_core::reducer::TABS_REDUCER;
use tabs_core::state::LiveState;
use tabs_core::state::SessionState;
use tabs_core::state::SessionView;
use tabs_core::state::TabId;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::broadcast::StateBroadcaster;
use crate::broadcast::SubscriberId;
use crate::broadcast::Subscription;
use crate::contracts::context_menu_entries;
use crate::contracts::ContextMenuItem;
use crate::contracts::EngineNotification;
use crate::contracts::HandleId;
use crate::contracts::MenuEntry;
use crate::engine::DevtoolsHost;
use crate::engine::EngineError;
use crate::engine::TabEngine;
use crate::reconcile::Observed;
use crate::reconcile::ReconcileOutcome;
use crate::reconcile::Reconciler;

const MAX_PUMP_ROUNDS: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open session: {0}")]
    Open(#[source] StoreError),
    #[error("append to operation store failed: {0}")]
    Append(#[from] StoreError),
}

pub struct Session<S, E> {
    store: S,
    engine: E,
    kind: String,
    path: String,
    state: SessionState,
    reconciler: Reconciler,
    broadcaster: StateBroadcaster,
    devtools: Option<Box<dyn DevtoolsHost + Send>>,
    batching: bool,
    dirty: bool,
}

impl<S, E> Session<S, E>
where
    S: OperationStore,
    E: TabEngine,
{
    pub fn open(mut store: S, engine: E, config: &SessionConfig) -> Result<Self, SessionError> {
        store
            .register(&config.kind, TABS_REDUCER)
            .map_err(SessionError::Open)?;
        let state = store
            .get(&config.kind, &config.path)
            .map_err(SessionError::Open)?;
        info!(
            kind = %config.kind,
            path = %config.path,
            version = state.version,
            tabs = state.tabs.len(),
            "session opened"
        );
        let mut session = Self {
            store,
            engine,
            kind: config.kind.clone(),
            path: config.path.clone(),
            state,
            reconciler: Reconciler::new(),
            broadcaster: StateBroadcaster::new(),
            devtools: None,
            batching: false,
            dirty: false,
        };
        session.settle();
        Ok(session)
    }

    pub fn with_devtools(mut self, devtools: Box<dyn DevtoolsHost + Send>) -> Self {
        self.devtools = Some(devtools);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn view(&self) -> SessionView {
        self.reconciler.view(&self.state)
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn subscribe(&mut self) -> Subscription {
        self.broadcaster.subscribe()
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    pub fn new_tab(&mut self) -> Result<TabId, SessionError> {
        let tab_id = TabId::generate();
        self.push(Operation::New {
            disposition: Disposition::NewTab,
            tab_id: tab_id.clone(),
            url: None,
        })?;
        Ok(tab_id)
    }

    pub fn open_url(&mut self, url: &str, disposition: Disposition) -> Result<TabId, SessionError> {
        let tab_id = TabId::generate();
        self.push(Operation::New {
            disposition,
            tab_id: tab_id.clone(),
            url: Some(url.to_string()),
        })?;
        Ok(tab_id)
    }

    pub fn commit(&mut self) -> Result<(), SessionError> {
        self.push(Operation::Commit)
    }

    pub fn close(&mut self, tab_id: Option<TabId>) -> Result<(), SessionError> {
        self.push(Operation::Close {
            tab_id,
            next_tab_id: TabId::generate(),
        })
    }

    pub fn recover(&mut self) -> Result<(), SessionError> {
        self.push(Operation::Recover)
    }

    pub fn select(&mut self, tab_id: TabId) -> Result<(), SessionError> {
        self.push(Operation::Select { tab_id })
    }

    pub fn select_next(&mut self) -> Result<(), SessionError> {
        self.select_neighbour(1)
    }

    pub fn select_prev(&mut self) -> Result<(), SessionError> {
        self.select_neighbour(-1)
    }

    pub fn load(&mut self, url: &str) -> Result<(), SessionError> {
        let Some(active) = self.state.active_tab() else {
            debug!(url, "load ignored without an active tab");
            return Ok(());
        };
        let tab_id = active.tab_id.clone();
        self.push(Operation::Load {
            tab_id,
            url: url.to_string(),
        })
    }

    pub fn back(&mut self) -> Result<(), SessionError> {
        self.on_active("back", |engine, handle| engine.back(handle));
        Ok(())
    }

    pub fn forward(&mut self) -> Result<(), SessionError> {
        self.on_active("forward", |engine, handle| engine.forward(handle));
        Ok(())
    }

    pub fn reload(&mut self) -> Result<(), SessionError> {
        self.on_active("reload", |engine, handle| engine.reload(handle));
        Ok(())
    }

    pub fn dispatch(&mut self, intent: TabIntent) -> Result<(), SessionError> {
        match intent {
            TabIntent::NewTab => self.new_tab().map(|_| ()),
            TabIntent::Commit => self.commit(),
            TabIntent::Close(tab_id) => self.close(tab_id),
            TabIntent::Back => self.back(),
            TabIntent::Forward => self.forward(),
            TabIntent::Reload => self.reload(),
            TabIntent::Recover => self.recover(),
            TabIntent::Select(tab_id) => self.select(tab_id),
            TabIntent::SelectAndCommit(tab_id) => {
                self.select(tab_id)?;
                self.commit()
            }
            TabIntent::SelectNext => self.select_next(),
            TabIntent::SelectPrev => self.select_prev(),
            TabIntent::Load(url) => self.load(&url),
        }
    }

    pub fn context_menu(&self, handle: HandleId) -> Vec<MenuEntry> {
        context_menu_entries(self.reconciler.live_state_for_handle(handle))
    }

    pub fn handle_notification(&mut self, notification: EngineNotification) {
        match notification {
            EngineNotification::StateChanged {
                handle,
                state,
                version,
            } => self.on_state_changed(handle, state, version),
            EngineNotification::TabCreated {
                disposition,
                handle,
            } => self.on_tab_created(disposition, handle),
            EngineNotification::ContextMenu { handle, item } => self.on_context_menu(handle, item),
        }
    }

    // Feeds queued engine notifications back in until the engine goes
    // quiet. Returns how many were handled.
    pub fn pump_engine(&mut self) -> usize {
        let mut handled = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            let batch = self.engine.take_notifications();
            if batch.is_empty() {
                break;
            }
            handled += batch.len();
            for notification in batch {
                self.handle_notification(notification);
            }
        }
        handled
    }

    // Closes every engine tab owned by this session.
    pub fn end(&mut self) -> usize {
        let closed = self.reconciler.teardown(&mut self.engine);
        info!(closed, "session ended");
        closed
    }

    pub(crate) fn begin_batch(&mut self) {
        self.batching = true;
    }

    pub(crate) fn end_batch(&mut self) -> Option<ReconcileOutcome> {
        self.batching = false;
        if !self.dirty {
            return None;
        }
        Some(self.settle())
    }

    fn select_neighbour(&mut self, offset: isize) -> Result<(), SessionError> {
        let Some(tab) = self.state.neighbour(offset) else {
            return Ok(());
        };
        let tab_id = tab.tab_id.clone();
        self.select(tab_id)
    }

    fn on_active<F>(&mut self, command: &'static str, run: F)
    where
        F: FnOnce(&mut E, HandleId) -> Result<(), EngineError>,
    {
        let Some(handle) = self.reconciler.active_handle(&self.state) else {
            debug!(command, "no live tab to receive command");
            return;
        };
        if let Err(err) = run(&mut self.engine, handle) {
            warn!(command, %handle, error = %err, "engine command failed");
        }
    }

    fn on_state_changed(&mut self, handle: HandleId, live: LiveState, version: u64) {
        match self.reconciler.observe(handle, live.clone(), version) {
            Observed::Stale => {
                debug!(%handle, version, "ignoring stale engine state");
            }
            Observed::Unknown => {
                debug!(%handle, "ignoring state for unknown handle");
            }
            Observed::Placeholder => self.publish(),
            Observed::Tab(tab_id) => {
                let differs = self.state.get(&tab_id).is_some_and(|record| {
                    !record.is_placeholder()
                        && (record.url != live.url || record.title != live.title)
                });
                if !differs {
                    self.publish();
                    return;
                }
                let op = Operation::StateUpdate {
                    tab_id: tab_id.clone(),
                    title: live.title,
                    url: live.url,
                };
                if let Err(err) = self.push(op) {
                    warn!(%tab_id, error = %err, "failed to record engine state");
                    self.publish();
                }
            }
        }
    }

    fn on_tab_created(&mut self, disposition: Disposition, handle: HandleId) {
        // The engine already has a document, so it is never a placeholder.
        let disposition = if disposition.is_foreground() {
            Disposition::NewForegroundTab
        } else {
            Disposition::NewBackgroundTab
        };
        let tab_id = TabId::generate();
        debug!(%tab_id, %handle, disposition = disposition.label(), "adopting engine-created tab");
        self.reconciler.adopt(tab_id.clone(), handle);
        let op = Operation::New {
            disposition,
            tab_id: tab_id.clone(),
            url: None,
        };
        if let Err(err) = self.push(op) {
            warn!(%tab_id, %handle, error = %err, "failed to record engine-created tab");
            self.settle();
        }
    }

    fn on_context_menu(&mut self, handle: HandleId, item: ContextMenuItem) {
        let result = match item {
            ContextMenuItem::Reload => self.engine.reload(handle),
            ContextMenuItem::Back => self.engine.back(handle),
            ContextMenuItem::Forward => self.engine.forward(handle),
            ContextMenuItem::InspectElement | ContextMenuItem::CloseDevTools => {
                match self.devtools.as_mut() {
                    Some(devtools) if item == ContextMenuItem::InspectElement => {
                        devtools.inspect_element(handle)
                    }
                    Some(devtools) => devtools.close_devtools(),
                    None => debug!(item = item.label(), "no devtools host attached"),
                }
                Ok(())
            }
        };
        if let Err(err) = result {
            let tab_id = self.reconciler.tab_for_handle(handle).cloned();
            warn!(
                item = item.label(),
                %handle,
                tab_id = ?tab_id,
                error = %err,
                "context menu command failed"
            );
        }
    }

    fn push(&mut self, op: Operation) -> Result<(), SessionError> {
        let label = op.label();
        let target = op.tab_id().cloned();
        let next = self.store.append(&self.kind, &self.path, op)?;
        debug!(op = label, tab_id = ?target, version = next.version, "appended operation");
        self.state = next;
        self.settle();
        Ok(())
    }

    fn settle(&mut self) -> ReconcileOutcome {
        if self.batching {
            self.dirty = true;
            return ReconcileOutcome::default();
        }
        self.dirty = false;
        let outcome = self.reconciler.reconcile(&mut self.engine, &self.state);
        self.publish();
        outcome
    }

    fn publish(&mut self) {
        let view = self.reconciler.view(&self.state);
        self.broadcaster.publish(view);
    }
}

#[cfg(test)]
mod tests;
