use std::collections::BTreeMap;

use tabs_core::state::LiveState;
use tabs_core::state::SessionState;
use tabs_core::state::SessionView;
use tabs_core::state::TabId;
use tabs_core::state::TabRecord;
use tabs_core::state::TabView;
use tracing::debug;
use tracing::warn;

use crate::contracts::CreateTab;
use crate::contracts::HandleId;
use crate::engine::EngineError;
use crate::engine::TabEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTabHandle {
    pub tab_id: TabId,
    pub handle: HandleId,
    pub last_load: u64,
    pub requested_url: Option<String>,
    pub issued_version: u64,
    pub state: Option<LiveState>,
}

impl LiveTabHandle {
    // Last URL the engine reported, or the one we asked for if it has not
    // reported yet.
    pub fn known_url(&self) -> Option<&str> {
        match &self.state {
            Some(state) => state.url.as_deref(),
            None => self.requested_url.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderHandle {
    pub handle: HandleId,
    pub issued_version: u64,
    pub state: Option<LiveState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShownTab {
    Placeholder,
    Tab(TabId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Placeholder,
    Tab(TabId),
    Stale,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub navigated: usize,
    pub closed: usize,
    pub shown: bool,
    pub titled: bool,
    pub failures: usize,
}

impl ReconcileOutcome {
    pub fn is_quiet(&self) -> bool {
        self.created == 0
            && self.navigated == 0
            && self.closed == 0
            && !self.shown
            && !self.titled
            && self.failures == 0
    }
}

// Drives the engine towards the canonical session. Commands are
// fire-and-forget; a failed command leaves bookkeeping unchanged so the
// next pass retries it.
#[derive(Debug, Default)]
pub struct Reconciler {
    handles: BTreeMap<TabId, LiveTabHandle>,
    placeholder: Option<PlaceholderHandle>,
    shown: Option<HandleId>,
    title: Option<Option<String>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, tab_id: &TabId) -> Option<&LiveTabHandle> {
        self.handles.get(tab_id)
    }

    pub fn handles(&self) -> impl Iterator<Item = &LiveTabHandle> {
        self.handles.values()
    }

    pub fn placeholder(&self) -> Option<&PlaceholderHandle> {
        self.placeholder.as_ref()
    }

    pub fn shown_handle(&self) -> Option<HandleId> {
        self.shown
    }

    pub fn tab_for_handle(&self, handle: HandleId) -> Option<&TabId> {
        self.handles
            .values()
            .find(|live| live.handle == handle)
            .map(|live| &live.tab_id)
    }

    pub fn live_state(&self, tab_id: &TabId) -> Option<&LiveState> {
        self.handles.get(tab_id).and_then(|live| live.state.as_ref())
    }

    pub fn live_state_for_handle(&self, handle: HandleId) -> Option<&LiveState> {
        if let Some(placeholder) = &self.placeholder {
            if placeholder.handle == handle {
                return placeholder.state.as_ref();
            }
        }
        self.handles
            .values()
            .find(|live| live.handle == handle)
            .and_then(|live| live.state.as_ref())
    }

    pub fn target(&self, state: &SessionState) -> Option<ShownTab> {
        let tab = state.active_tab()?;
        if tab.is_placeholder() {
            Some(ShownTab::Placeholder)
        } else {
            Some(ShownTab::Tab(tab.tab_id.clone()))
        }
    }

    pub fn active_handle(&self, state: &SessionState) -> Option<HandleId> {
        match self.target(state)? {
            ShownTab::Placeholder => self.placeholder.as_ref().map(|p| p.handle),
            ShownTab::Tab(tab_id) => self.handles.get(&tab_id).map(|live| live.handle),
        }
    }

    // Tabs the engine opened on its own get bound to a fresh record before
    // the New operation lands, so the next pass does not create a second
    // engine tab for them.
    pub fn adopt(&mut self, tab_id: TabId, handle: HandleId) {
        self.handles.insert(
            tab_id.clone(),
            LiveTabHandle {
                tab_id,
                handle,
                last_load: 0,
                requested_url: None,
                issued_version: 0,
                state: None,
            },
        );
    }

    pub fn observe(&mut self, handle: HandleId, state: LiveState, version: u64) -> Observed {
        if let Some(placeholder) = self.placeholder.as_mut() {
            if placeholder.handle == handle {
                if version < placeholder.issued_version {
                    return Observed::Stale;
                }
                placeholder.state = Some(state);
                return Observed::Placeholder;
            }
        }
        let Some(live) = self.handles.values_mut().find(|live| live.handle == handle) else {
            return Observed::Unknown;
        };
        if version < live.issued_version {
            return Observed::Stale;
        }
        live.state = Some(state);
        Observed::Tab(live.tab_id.clone())
    }

    pub fn view(&self, state: &SessionState) -> SessionView {
        let tabs = state
            .tabs
            .iter()
            .map(|record| TabView {
                record: record.clone(),
                state: self.live_state(&record.tab_id).cloned(),
            })
            .collect();
        SessionView {
            active: state.active,
            tabs,
        }
    }

    pub fn reconcile<E>(&mut self, engine: &mut E, state: &SessionState) -> ReconcileOutcome
    where
        E: TabEngine + ?Sized,
    {
        let mut outcome = ReconcileOutcome::default();
        self.create_missing(engine, state, &mut outcome);
        self.navigate_changed(engine, state, &mut outcome);
        self.close_removed(engine, state, &mut outcome);
        self.show_active(engine, state, &mut outcome);
        self.propagate_title(engine, state, &mut outcome);
        if !outcome.is_quiet() {
            debug!(
                version = state.version,
                created = outcome.created,
                navigated = outcome.navigated,
                closed = outcome.closed,
                shown = outcome.shown,
                failures = outcome.failures,
                "reconciled session"
            );
        }
        outcome
    }

    // Closes every engine tab this reconciler owns, placeholder included.
    pub fn teardown<E>(&mut self, engine: &mut E) -> usize
    where
        E: TabEngine + ?Sized,
    {
        let mut closed = 0;
        let handles: Vec<HandleId> = self
            .handles
            .values()
            .map(|live| live.handle)
            .chain(self.placeholder.as_ref().map(|p| p.handle))
            .collect();
        for handle in handles {
            match engine.close_tab(handle) {
                Ok(()) => closed += 1,
                Err(err) => warn!(%handle, error = %err, "engine close failed during teardown"),
            }
        }
        self.handles.clear();
        self.placeholder = None;
        self.shown = None;
        self.title = None;
        closed
    }

    fn create_missing<E>(
        &mut self,
        engine: &mut E,
        state: &SessionState,
        outcome: &mut ReconcileOutcome,
    ) where
        E: TabEngine + ?Sized,
    {
        for (index, record) in state.tabs.iter().enumerate() {
            if record.is_placeholder() || self.handles.contains_key(&record.tab_id) {
                continue;
            }
            let visible = state.active == Some(index);
            let request = CreateTab {
                url: record.url.clone(),
                visible,
                focus: visible,
                version: state.version,
            };
            match engine.create_tab(request) {
                Ok(handle) => {
                    self.handles.insert(
                        record.tab_id.clone(),
                        LiveTabHandle {
                            tab_id: record.tab_id.clone(),
                            handle,
                            last_load: 0,
                            requested_url: record.url.clone(),
                            issued_version: state.version,
                            state: None,
                        },
                    );
                    if visible {
                        self.shown = Some(handle);
                    }
                    outcome.created += 1;
                }
                Err(err) => {
                    warn!(tab_id = %record.tab_id, error = %err, "engine create failed");
                    outcome.failures += 1;
                }
            }
        }
    }

    fn navigate_changed<E>(
        &mut self,
        engine: &mut E,
        state: &SessionState,
        outcome: &mut ReconcileOutcome,
    ) where
        E: TabEngine + ?Sized,
    {
        for record in state.tabs.iter().filter(|record| !record.is_placeholder()) {
            let Some(live) = self.handles.get_mut(&record.tab_id) else {
                continue;
            };
            if !needs_navigation(record, live) {
                continue;
            }
            let Some(url) = record.url.as_deref() else {
                continue;
            };
            match engine.navigate(live.handle, url, state.version) {
                Ok(()) => {
                    live.last_load = record.load;
                    live.requested_url = Some(url.to_string());
                    live.issued_version = state.version;
                    outcome.navigated += 1;
                }
                Err(err) => {
                    warn!(tab_id = %record.tab_id, error = %err, "engine navigate failed");
                    outcome.failures += 1;
                }
            }
        }
    }

    fn close_removed<E>(
        &mut self,
        engine: &mut E,
        state: &SessionState,
        outcome: &mut ReconcileOutcome,
    ) where
        E: TabEngine + ?Sized,
    {
        let removed: Vec<TabId> = self
            .handles
            .keys()
            .filter(|tab_id| state.get(tab_id).is_none())
            .cloned()
            .collect();
        for tab_id in removed {
            let Some(handle) = self.handles.get(&tab_id).map(|live| live.handle) else {
                continue;
            };
            match engine.close_tab(handle) {
                Ok(()) | Err(EngineError::UnknownHandle(_)) => {
                    self.handles.remove(&tab_id);
                    if self.shown == Some(handle) {
                        self.shown = None;
                    }
                    outcome.closed += 1;
                }
                Err(err) => {
                    warn!(%tab_id, error = %err, "engine close failed");
                    outcome.failures += 1;
                }
            }
        }
    }

    fn show_active<E>(
        &mut self,
        engine: &mut E,
        state: &SessionState,
        outcome: &mut ReconcileOutcome,
    ) where
        E: TabEngine + ?Sized,
    {
        let handle = match self.target(state) {
            None => return,
            Some(ShownTab::Placeholder) => match self.ensure_placeholder(engine, state, outcome) {
                Some(handle) => handle,
                None => return,
            },
            Some(ShownTab::Tab(tab_id)) => match self.handles.get(&tab_id) {
                Some(live) => live.handle,
                None => return,
            },
        };
        if self.shown == Some(handle) {
            return;
        }
        match engine.show(handle, true) {
            Ok(()) => {
                self.shown = Some(handle);
                outcome.shown = true;
            }
            Err(err) => {
                warn!(%handle, error = %err, "engine show failed");
                outcome.failures += 1;
            }
        }
    }

    fn ensure_placeholder<E>(
        &mut self,
        engine: &mut E,
        state: &SessionState,
        outcome: &mut ReconcileOutcome,
    ) -> Option<HandleId>
    where
        E: TabEngine + ?Sized,
    {
        if let Some(placeholder) = &self.placeholder {
            return Some(placeholder.handle);
        }
        let request = CreateTab {
            url: None,
            visible: true,
            focus: true,
            version: state.version,
        };
        match engine.create_tab(request) {
            Ok(handle) => {
                self.placeholder = Some(PlaceholderHandle {
                    handle,
                    issued_version: state.version,
                    state: None,
                });
                self.shown = Some(handle);
                outcome.created += 1;
                outcome.shown = true;
                Some(handle)
            }
            Err(err) => {
                warn!(error = %err, "engine create failed for new-tab page");
                outcome.failures += 1;
                None
            }
        }
    }

    fn propagate_title<E>(
        &mut self,
        engine: &mut E,
        state: &SessionState,
        outcome: &mut ReconcileOutcome,
    ) where
        E: TabEngine + ?Sized,
    {
        let Some(active) = state.active_tab() else {
            return;
        };
        let title = active.title.clone();
        if self.title.as_ref() == Some(&title) {
            return;
        }
        match engine.set_title(title.as_deref()) {
            Ok(()) => {
                self.title = Some(title);
                outcome.titled = true;
            }
            Err(err) => {
                warn!(error = %err, "engine set_title failed");
                outcome.failures += 1;
            }
        }
    }
}

// The load counter guards against echoes: a URL mismatch alone is not
// enough, the record must also have been loaded since our last navigate.
fn needs_navigation(record: &TabRecord, live: &LiveTabHandle) -> bool {
    record.url.as_deref() != live.known_url() && record.load > live.last_load
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tabs_core::actions::Disposition;
    use tabs_core::actions::Operation;
    use tabs_core::reducer::reduce_log;

    use super::*;
    use crate::contracts::EngineCommand;
    use crate::engine::SimulatedTabEngine;

    fn id(value: &str) -> TabId {
        TabId::from(value)
    }

    fn foreground(tab: &str, url: &str) -> Operation {
        Operation::New {
            disposition: Disposition::NewForegroundTab,
            tab_id: id(tab),
            url: Some(url.to_string()),
        }
    }

    #[test]
    fn second_pass_issues_no_commands() {
        let state = reduce_log(&[foreground("a", "https://a"), foreground("b", "https://b")]);
        let mut engine = SimulatedTabEngine::new();
        let mut reconciler = Reconciler::new();

        let first = reconciler.reconcile(&mut engine, &state);
        assert_eq!(first.created, 2);
        engine.take_commands();

        let second = reconciler.reconcile(&mut engine, &state);
        assert!(second.is_quiet());
        assert_eq!(engine.commands(), &[] as &[EngineCommand]);
    }

    #[test]
    fn active_tab_is_created_visible_and_not_shown_twice() {
        let state = reduce_log(&[foreground("a", "https://a")]);
        let mut engine = SimulatedTabEngine::new();
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&mut engine, &state);

        let commands = engine.take_commands();
        assert_eq!(
            commands[0],
            EngineCommand::Create {
                url: Some("https://a".to_string()),
                visible: true,
                focus: true,
                version: 1,
            }
        );
        assert!(!commands
            .iter()
            .any(|command| matches!(command, EngineCommand::Show { .. })));
    }

    #[test]
    fn load_navigates_once_and_ignores_unchanged_url() {
        let mut log = vec![foreground("a", "https://a")];
        let mut engine = SimulatedTabEngine::new();
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&mut engine, &reduce_log(&log));
        engine.take_commands();

        log.push(Operation::Load {
            tab_id: id("a"),
            url: "https://b".to_string(),
        });
        let state = reduce_log(&log);
        let outcome = reconciler.reconcile(&mut engine, &state);
        assert_eq!(outcome.navigated, 1);
        assert_eq!(
            engine.take_commands(),
            vec![EngineCommand::Navigate {
                handle: reconciler.handle(&id("a")).expect("handle").handle,
                url: "https://b".to_string(),
                version: 2,
            }]
        );

        // Engine still reports the old URL; the counter already matches.
        let handle = reconciler.handle(&id("a")).expect("handle").handle;
        let stale = LiveState {
            url: Some("https://a".to_string()),
            ..LiveState::default()
        };
        assert_eq!(reconciler.observe(handle, stale, 2), Observed::Tab(id("a")));
        assert!(reconciler.reconcile(&mut engine, &state).is_quiet());
    }

    #[test]
    fn removed_records_close_their_handles() {
        let mut log = vec![foreground("a", "https://a"), foreground("b", "https://b")];
        let mut engine = SimulatedTabEngine::new();
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&mut engine, &reduce_log(&log));
        let handle_b = reconciler.handle(&id("b")).expect("b").handle;

        log.push(Operation::Close {
            tab_id: Some(id("b")),
            next_tab_id: id("n"),
        });
        let outcome = reconciler.reconcile(&mut engine, &reduce_log(&log));
        assert_eq!(outcome.closed, 1);
        assert!(reconciler.handle(&id("b")).is_none());
        assert!(!engine.open_handles().contains(&handle_b));
    }

    #[test]
    fn failed_close_is_retried_on_next_pass() {
        let mut log = vec![foreground("a", "https://a"), foreground("b", "https://b")];
        let mut engine = SimulatedTabEngine::new();
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&mut engine, &reduce_log(&log));

        log.push(Operation::Close {
            tab_id: Some(id("a")),
            next_tab_id: id("n"),
        });
        let state = reduce_log(&log);
        engine.set_offline(Some("busy"));
        let outcome = reconciler.reconcile(&mut engine, &state);
        assert_eq!(outcome.closed, 0);
        assert!(outcome.failures > 0);
        assert!(reconciler.handle(&id("a")).is_some());

        engine.set_offline(None);
        let outcome = reconciler.reconcile(&mut engine, &state);
        assert_eq!(outcome.closed, 1);
        assert!(reconciler.handle(&id("a")).is_none());
    }

    #[test]
    fn placeholder_sentinel_is_created_once() {
        let new_tab = |tab: &str| Operation::New {
            disposition: Disposition::NewTab,
            tab_id: id(tab),
            url: None,
        };
        let mut engine = SimulatedTabEngine::new();
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&mut engine, &reduce_log(&[new_tab("p1")]));
        let sentinel = reconciler.placeholder().expect("sentinel").handle;

        let state = reduce_log(&[new_tab("p1"), new_tab("p2")]);
        reconciler.reconcile(&mut engine, &state);
        assert_eq!(reconciler.placeholder().map(|p| p.handle), Some(sentinel));
        assert_eq!(engine.open_handles(), vec![sentinel]);
        assert_eq!(reconciler.active_handle(&state), Some(sentinel));
    }

    #[test]
    fn stale_observation_is_reported() {
        let state = reduce_log(&[foreground("a", "https://a")]);
        let mut engine = SimulatedTabEngine::new();
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&mut engine, &state);
        let handle = reconciler.handle(&id("a")).expect("a").handle;

        assert_eq!(
            reconciler.observe(handle, LiveState::default(), 0),
            Observed::Stale
        );
        assert_eq!(
            reconciler.observe(HandleId(404), LiveState::default(), 9),
            Observed::Unknown
        );
    }

    #[test]
    fn title_is_sent_only_when_it_changes() {
        let mut log = vec![foreground("a", "https://a")];
        let mut engine = SimulatedTabEngine::new();
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&mut engine, &reduce_log(&log));
        assert_eq!(engine.window_title(), None);

        log.push(Operation::StateUpdate {
            tab_id: id("a"),
            title: Some("A".to_string()),
            url: Some("https://a".to_string()),
        });
        let outcome = reconciler.reconcile(&mut engine, &reduce_log(&log));
        assert!(outcome.titled);
        assert_eq!(engine.window_title(), Some("A"));

        log.push(Operation::Commit);
        let outcome = reconciler.reconcile(&mut engine, &reduce_log(&log));
        assert!(!outcome.titled);
    }
}
