use pretty_assertions::assert_eq;

use super::*;

#[test]
fn opening_an_empty_session_issues_no_commands() {
    let session = open();
    assert!(session.state().tabs.is_empty());
    assert_eq!(session.engine().commands(), &[] as &[EngineCommand]);
}

#[test]
fn new_tab_shows_the_placeholder_page() {
    let mut session = open();
    let tab_id = session.new_tab().expect("new tab");

    assert_eq!(tab_ids(&session), vec![tab_id]);
    let sentinel = session.reconciler().placeholder().expect("sentinel").handle;
    assert_eq!(session.engine().shown(), Some(sentinel));
    assert_eq!(
        session.engine().commands()[0],
        EngineCommand::Create {
            url: None,
            visible: true,
            focus: true,
            version: 1,
        }
    );
}

#[test]
fn loading_into_the_placeholder_creates_a_real_tab() {
    let mut session = open();
    let tab_id = session.new_tab().expect("new tab");
    settle(&mut session);

    session.load("https://a").expect("load");
    let record = session.state().get(&tab_id).expect("record");
    assert!(!record.is_placeholder());
    assert_eq!(record.load, 1);

    let handle = handle_of(&session, &tab_id);
    assert_eq!(session.engine().shown(), Some(handle));
    assert_eq!(
        session.engine_mut().take_commands(),
        vec![EngineCommand::Create {
            url: Some("https://a".to_string()),
            visible: true,
            focus: true,
            version: 2,
        }]
    );
}

#[test]
fn strip_select_moves_tab_to_front() {
    let mut session = open();
    let a = session
        .open_url("https://a", Disposition::NewForegroundTab)
        .expect("a");
    let b = session
        .open_url("https://b", Disposition::NewBackgroundTab)
        .expect("b");
    assert_eq!(tab_ids(&session), vec![a.clone(), b.clone()]);
    assert_eq!(active_id(&session), Some(a.clone()));

    session
        .dispatch(TabIntent::SelectAndCommit(b.clone()))
        .expect("select");
    assert_eq!(tab_ids(&session), vec![b.clone(), a]);
    assert_eq!(session.engine().shown(), Some(handle_of(&session, &b)));
}

#[test]
fn next_and_prev_wrap_around_the_strip() {
    let mut session = open();
    let a = session
        .open_url("https://a", Disposition::NewForegroundTab)
        .expect("a");
    session
        .open_url("https://b", Disposition::NewForegroundTab)
        .expect("b");
    let c = session
        .open_url("https://c", Disposition::NewForegroundTab)
        .expect("c");
    assert_eq!(active_id(&session), Some(c.clone()));

    session.select_prev().expect("prev");
    assert_eq!(active_id(&session), Some(a));
    session.select_next().expect("next");
    assert_eq!(active_id(&session), Some(c));
}

#[test]
fn recovered_tab_gets_a_fresh_engine_handle() {
    let mut session = open();
    let a = session
        .open_url("https://a", Disposition::NewForegroundTab)
        .expect("a");
    let b = session
        .open_url("https://b", Disposition::NewForegroundTab)
        .expect("b");
    let old_handle = handle_of(&session, &b);

    session.close(None).expect("close");
    assert_eq!(tab_ids(&session), vec![a.clone()]);
    assert!(!session.engine().open_handles().contains(&old_handle));

    session.recover().expect("recover");
    assert_eq!(tab_ids(&session), vec![b.clone(), a]);
    let new_handle = handle_of(&session, &b);
    assert_ne!(new_handle, old_handle);
    assert_eq!(session.engine().shown(), Some(new_handle));
}

#[test]
fn every_close_followed_by_new_tab_fills_recover() {
    let mut session = open();
    session.new_tab().expect("new tab");
    session.load("https://a").expect("load");
    let loaded = active_id(&session).expect("active tab");

    let mut placeholders = Vec::new();
    for _ in 0..9 {
        session.close(None).expect("close");
        placeholders.push(session.new_tab().expect("new tab"));
    }

    let recover = &session.state().recover;
    assert_eq!(recover.len(), 9);
    let closed: Vec<TabId> = recover.iter().map(|tab| tab.tab_id.clone()).collect();
    let mut expected = vec![loaded];
    expected.extend(placeholders[..8].iter().cloned());
    assert_eq!(closed, expected);
    assert_eq!(session.state().placeholder_count(), 1);

    session.recover().expect("recover");
    assert_eq!(tab_ids(&session), vec![placeholders[7].clone()]);
    assert_eq!(session.state().placeholder_count(), 1);
    assert_eq!(session.state().recover.len(), 8);
}

#[test]
fn back_and_forward_follow_engine_history() {
    let mut session = open();
    let a = session
        .open_url("https://a", Disposition::NewForegroundTab)
        .expect("a");
    session.load("https://b").expect("load");
    settle(&mut session);

    session.back().expect("back");
    let handle = handle_of(&session, &a);
    assert_eq!(session.engine().commands(), &[EngineCommand::Back { handle }]);
    session.pump_engine();
    let record = session.state().get(&a).expect("record");
    assert_eq!(record.url.as_deref(), Some("https://a"));
    let live = session.reconciler().live_state(&a).expect("live");
    assert!(live.can_go_forward);

    session.forward().expect("forward");
    session.pump_engine();
    let record = session.state().get(&a).expect("record");
    assert_eq!(record.url.as_deref(), Some("https://b"));
    assert!(!session
        .engine()
        .commands()
        .iter()
        .any(|command| matches!(command, EngineCommand::Navigate { .. })));
}

#[test]
fn subscribers_see_snapshot_and_changes() {
    let mut session = open();
    let subscription = session.subscribe();
    let initial = subscription.try_recv().expect("snapshot");
    assert!(initial.tabs.is_empty());

    let tab_id = session.new_tab().expect("new tab");
    let view = subscription.latest().expect("view");
    assert_eq!(view.active_tab().map(|tab| tab.record.tab_id.clone()), Some(tab_id));

    assert!(session.unsubscribe(subscription.id()));
}

#[test]
fn ending_the_session_closes_every_engine_tab() {
    let mut session = open();
    session.new_tab().expect("new tab");
    session
        .open_url("https://a", Disposition::NewBackgroundTab)
        .expect("a");
    assert_eq!(session.engine().open_handles().len(), 2);

    assert_eq!(session.end(), 2);
    assert!(session.engine().open_handles().is_empty());
}
