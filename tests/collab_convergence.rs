use draftsmith::app::{Args, Controller, File, ManualClock, MemoryStorage};
use draftsmith::collab::LocalHub;
use draftsmith::markdown;
use draftsmith::state::Selection;
use draftsmith::state::input::InputEvent;

fn peer(hub: &LocalHub, name: &str) -> Controller {
    let mut ctrl = Controller::new(MemoryStorage::new(), hub.clone(), ManualClock::new()).with_user(name);
    ctrl.init(Args::default());
    ctrl
}

fn settle(peers: &mut [&mut Controller]) {
    for _ in 0..4 {
        for ctrl in peers.iter_mut() {
            ctrl.tick();
        }
    }
}

fn text(ctrl: &Controller) -> String {
    markdown::serialize(ctrl.state().unwrap().doc())
}

fn client(ctrl: &Controller) -> u64 {
    ctrl.session().unwrap().client()
}

fn type_at_end(ctrl: &mut Controller, text: &str) {
    let state = ctrl.state().unwrap();
    let mut tr = state.tr();
    tr.set_selection(Selection::at_end(state.doc()));
    ctrl.apply(tr);
    assert!(ctrl.handle_input(&InputEvent::Text(text.to_string())));
}

fn joined_pair(hub: &LocalHub) -> (Controller, Controller) {
    let mut a = peer(hub, "Ada");
    a.open_file(File {
        body: Some("one\n\ntwo\n".into()),
        ..File::default()
    });
    a.start_collab(None);
    let room = a.model().collab.as_ref().unwrap().room.clone();

    let mut b = peer(hub, "Bo");
    b.start_collab(Some(room));
    settle(&mut [&mut a, &mut b]);
    assert_eq!(text(&b), "one\n\ntwo\n");
    (a, b)
}

/// Both peers edit different blocks while offline, then come back in the
/// given order.
fn offline_edits_converge(a_first: bool) {
    let hub = LocalHub::new();
    let (mut a, mut b) = joined_pair(&hub);
    let (client_a, client_b) = (client(&a), client(&b));
    hub.set_online(client_a, false);
    hub.set_online(client_b, false);

    assert!(a.handle_input(&InputEvent::Click { pos: 4 }));
    assert!(a.handle_input(&InputEvent::Text("A".into())));
    type_at_end(&mut b, "B");
    settle(&mut [&mut a, &mut b]);
    assert_eq!(text(&a), "oneA\n\ntwo\n");
    assert_eq!(text(&b), "one\n\ntwoB\n");

    let order = if a_first {
        [client_a, client_b]
    } else {
        [client_b, client_a]
    };
    for id in order {
        hub.set_online(id, true);
    }
    if a_first {
        settle(&mut [&mut a, &mut b]);
    } else {
        settle(&mut [&mut b, &mut a]);
    }

    assert_eq!(text(&a), "oneA\n\ntwoB\n");
    assert_eq!(text(&a), text(&b));
}

#[test]
fn test_offline_edits_converge_when_first_peer_returns_first() {
    offline_edits_converge(true);
}

#[test]
fn test_offline_edits_converge_when_second_peer_returns_first() {
    offline_edits_converge(false);
}

#[test]
fn test_three_peers_see_each_other() {
    let hub = LocalHub::new();
    let (mut a, mut b) = joined_pair(&hub);
    let room = a.model().collab.as_ref().unwrap().room.clone();
    let mut c = peer(&hub, "Cy");
    c.start_collab(Some(room.clone()));
    settle(&mut [&mut a, &mut b, &mut c]);

    assert_eq!(hub.peers(&room).len(), 3);
    assert_eq!(text(&c), "one\n\ntwo\n");

    type_at_end(&mut c, "!");
    settle(&mut [&mut a, &mut b, &mut c]);
    assert_eq!(text(&a), "one\n\ntwo!\n");
    assert_eq!(text(&b), text(&a));

    c.stop_collab();
    assert_eq!(hub.peers(&room).len(), 2);
}
