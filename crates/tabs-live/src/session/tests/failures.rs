use pretty_assertions::assert_eq;

use super::*;

#[test]
fn append_failure_leaves_state_and_engine_untouched() {
    let mut session = open();
    session
        .open_url("https://a", Disposition::NewForegroundTab)
        .expect("a");
    settle(&mut session);
    let before = session.state().clone();

    session.store_mut().set_unavailable(Some("disk full"));
    let err = session.close(None).expect_err("append should fail");
    assert!(matches!(
        err,
        SessionError::Append(StoreError::Unavailable { .. })
    ));
    assert_eq!(session.state(), &before);
    assert_eq!(session.engine().commands(), &[] as &[EngineCommand]);
}

#[test]
fn failed_engine_commands_are_retried_on_next_change() {
    let mut session = open();
    session.engine_mut().set_offline(Some("starting"));
    let a = session
        .open_url("https://a", Disposition::NewForegroundTab)
        .expect("append succeeds");
    assert!(session.reconciler().handle(&a).is_none());

    session.engine_mut().set_offline(None);
    session.commit().expect("commit");
    let handle = handle_of(&session, &a);
    assert_eq!(session.engine().shown(), Some(handle));
}

#[test]
fn open_reports_unavailable_store() {
    let mut store = MemoryOperationStore::new();
    store.set_unavailable(Some("locked"));
    let result = Session::open(store, SimulatedTabEngine::new(), &SessionConfig::default());
    assert!(matches!(result, Err(SessionError::Open(_))));
}

#[test]
fn reopening_a_persisted_session_rebuilds_engine_tabs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("operations.jsonl");
    let config = SessionConfig::default();

    let store = JsonlOperationStore::open(&log_path).expect("store");
    let mut session = Session::open(store, SimulatedTabEngine::new(), &config).expect("open");
    let a = session
        .open_url("https://a", Disposition::NewForegroundTab)
        .expect("a");
    let b = session
        .open_url("https://b", Disposition::NewBackgroundTab)
        .expect("b");
    let saved = session.state().clone();
    drop(session);

    let store = JsonlOperationStore::open(&log_path).expect("reopen");
    let session = Session::open(store, SimulatedTabEngine::new(), &config).expect("open");
    assert_eq!(session.state(), &saved);

    let creates: Vec<Option<String>> = session
        .engine()
        .commands()
        .iter()
        .filter_map(|command| match command {
            EngineCommand::Create { url, .. } => Some(url.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        creates,
        vec![Some("https://a".to_string()), Some("https://b".to_string())]
    );
    assert_eq!(session.engine().shown(), Some(handle_of_any(&session, &a)));
    assert!(session.reconciler().handle(&b).is_some());
}

fn handle_of_any<S>(session: &Session<S, SimulatedTabEngine>, tab_id: &TabId) -> HandleId
where
    S: tabs_core::persistence::OperationStore,
{
    session
        .reconciler()
        .handle(tab_id)
        .map(|live| live.handle)
        .expect("live handle")
}
