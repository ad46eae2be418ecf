use std::sync::Arc;
use std::sync::Mutex;

pub(super) use super::Session;
pub(super) use super::SessionError;
pub(super) use crate::contracts::ContextMenuItem;
pub(super) use crate::contracts::EngineCommand;
pub(super) use crate::contracts::EngineNotification;
pub(super) use crate::contracts::HandleId;
pub(super) use crate::contracts::MenuEntry;
pub(super) use crate::engine::DevtoolsHost;
pub(super) use crate::engine::SimulatedTabEngine;
pub(super) use crate::engine::TabEngine;
pub(super) use tabs_core::actions::Disposition;
pub(super) use tabs_core::actions::TabIntent;
pub(super) use tabs_core::config::SessionConfig;
pub(super) use tabs_core::persistence::JsonlOperationStore;
pub(super) use tabs_core::persistence::MemoryOperationStore;
pub(super) use tabs_core::persistence::StoreError;
pub(super) use tabs_core::state::LiveState;
pub(super) use tabs_core::state::TabId;

mod actions;
mod failures;

type TestSession = Session<MemoryOperationStore, SimulatedTabEngine>;

fn open() -> TestSession {
    Session::open(
        MemoryOperationStore::new(),
        SimulatedTabEngine::new(),
        &SessionConfig::default(),
    )
    .expect("open session")
}

fn tab_ids(session: &TestSession) -> Vec<TabId> {
    session
        .state()
        .tabs
        .iter()
        .map(|tab| tab.tab_id.clone())
        .collect()
}

fn active_id(session: &TestSession) -> Option<TabId> {
    session.state().active_tab().map(|tab| tab.tab_id.clone())
}

fn handle_of(session: &TestSession, tab_id: &TabId) -> HandleId {
    session
        .reconciler()
        .handle(tab_id)
        .map(|live| live.handle)
        .expect("live handle")
}

fn settle(session: &mut TestSession) {
    session.pump_engine();
    session.engine_mut().take_commands();
}

#[derive(Clone, Default)]
struct RecordingDevtools {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingDevtools {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl DevtoolsHost for RecordingDevtools {
    fn inspect_element(&mut self, handle: HandleId) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("inspect {handle}"));
        }
    }

    fn close_devtools(&mut self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push("close".to_string());
        }
    }
}
