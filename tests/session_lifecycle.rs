use keywrite::keysym::{char_to_keysym, LogicalKey, NamedKey};
use keywrite::model::KeyState;
use keywrite::modifiers::Modifier;
use keywrite::session::{Keyboard, SessionOptions, X11Session};
use keywrite::sim::{SimDelivery, SimDisplay};
use keywrite::KeyboardError;
use pretty_assertions::assert_eq;

fn open(display: &SimDisplay) -> X11Session<SimDisplay> {
    X11Session::open(display.clone(), SessionOptions::default()).expect("sim session opens")
}

fn ctrl() -> LogicalKey {
    LogicalKey::Named(NamedKey::Modifier(Modifier::Ctrl))
}

fn releases_of(display: &SimDisplay, keycode: u8) -> usize {
    display
        .events()
        .iter()
        .filter(|e| e.keycode == keycode && e.state == KeyState::Released)
        .count()
}

#[test]
fn reset_all_releases_once_per_press() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display);

    kb.press(&LogicalKey::Char('a')).unwrap();
    kb.press(&LogicalKey::Char('a')).unwrap();
    kb.press(&ctrl()).unwrap();
    kb.reset_all().unwrap();

    assert_eq!(releases_of(&display, 38), 2);
    assert_eq!(releases_of(&display, 37), 1);
    assert!(display.held_keycodes().is_empty());
    assert!(kb.pressed().is_empty());
    assert!(kb.modifiers().is_empty());
    assert!(!kb.is_closed());

    display.clear_events();
    kb.press(&LogicalKey::Char('z')).unwrap();
    kb.release(&LogicalKey::Char('z')).unwrap();
    assert_eq!(display.typed_text(), "z");
}

#[test]
fn close_is_idempotent() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display);

    kb.press(&LogicalKey::Char('q')).unwrap();
    kb.close().unwrap();
    kb.close().unwrap();

    assert!(kb.is_closed());
    assert!(!display.is_connected());
    assert_eq!(releases_of(&display, 24), 1);
    assert!(matches!(
        kb.release(&LogicalKey::Char('q')),
        Err(KeyboardError::Closed)
    ));
}

#[test]
fn unknown_key_without_registration_writes_nothing() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display);

    let err = kb.press(&LogicalKey::Char('é')).unwrap_err();

    assert!(matches!(err, KeyboardError::NoSuchKey { keysym: 0xe9, .. }));
    assert_eq!(display.mapping_writes(), 0);
    assert!(kb.is_closed());
}

#[test]
fn a_full_keymap_closes_the_session() {
    let display = SimDisplay::us_qwerty();
    display.fill_void_rows(0x1008_ff11);
    let mut kb = open(&display);

    let err = kb.press_with(&LogicalKey::Char('中'), true).unwrap_err();

    assert!(matches!(err, KeyboardError::NoSpareSlots(keysym) if keysym == char_to_keysym('中')));
    assert!(kb.is_closed());
    assert_eq!(display.mapping_writes(), 0);
}

#[test]
fn registered_slot_is_reused_once_released() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display);
    kb.press_with(&LogicalKey::Char('中'), true).unwrap();
    kb.release(&LogicalKey::Char('中')).unwrap();
    let slot = kb.registered()[&char_to_keysym('中')];

    // Every other spare row taken: the next registration has to recycle.
    display.fill_void_rows(0x1008_ff11);
    kb.press_with(&LogicalKey::Char('文'), true).unwrap();

    assert_eq!(kb.registered().len(), 1);
    assert_eq!(kb.registered()[&char_to_keysym('文')], slot);
    assert_eq!(display.row(slot.keycode)[0], char_to_keysym('文'));
}

#[test]
fn held_registered_slots_are_never_recycled() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display);
    kb.press_with(&LogicalKey::Char('中'), true).unwrap();

    display.fill_void_rows(0x1008_ff11);
    let err = kb.press_with(&LogicalKey::Char('文'), true).unwrap_err();

    assert!(matches!(err, KeyboardError::NoSpareSlots(_)));
    assert!(display.held_keycodes().is_empty());
}

#[test]
fn failed_key_event_cleans_up_the_keymap() {
    let display = SimDisplay::us_qwerty();
    let before = display.table_snapshot();
    let mut kb = open(&display);

    kb.press(&LogicalKey::Char('a')).unwrap();
    kb.press_with(&LogicalKey::Char('中'), true).unwrap();
    assert_eq!(kb.registered().len(), 1);

    display.set_fail_key_events(true);
    let err = kb.press(&LogicalKey::Char('b')).unwrap_err();

    assert!(matches!(err, KeyboardError::Backend(_)));
    assert!(kb.is_closed());
    assert!(kb.registered().is_empty());
    assert_eq!(display.table_snapshot(), before);
    assert!(!display.is_connected());
}

#[test]
fn failed_mapping_write_closes_the_session() {
    let display = SimDisplay::us_qwerty();
    display.set_fail_mapping_writes(true);
    let mut kb = open(&display);

    let err = kb.press_with(&LogicalKey::Char('中'), true).unwrap_err();

    assert!(matches!(err, KeyboardError::Backend(_)));
    assert!(kb.is_closed());
    assert_eq!(display.mapping_writes(), 0);
    assert!(display.events().is_empty());
}

#[test]
fn close_reports_cleanup_failures_but_still_disconnects() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display);
    kb.press_with(&LogicalKey::Char('中'), true).unwrap();
    kb.release(&LogicalKey::Char('中')).unwrap();

    display.set_fail_mapping_writes(true);
    assert!(kb.close().is_err());

    assert!(kb.is_closed());
    assert!(kb.registered().is_empty());
    assert!(!display.is_connected());
}

#[test]
fn releasing_an_unheld_registered_key_sends_nothing() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display);

    kb.release(&LogicalKey::Char('中')).unwrap();
    kb.release(&LogicalKey::Char('a')).unwrap();

    assert_eq!(display.labels(), vec!["-a"]);
    assert!(!kb.is_closed());
}

#[test]
fn aliases_of_one_modifier_key_release_together() {
    let display = SimDisplay::us_qwerty().without_xtest();
    let mut kb = open(&display);
    let ctrl_l = LogicalKey::parse("ctrl_l").unwrap();

    kb.press(&ctrl()).unwrap();
    kb.press(&ctrl_l).unwrap();
    kb.release(&ctrl_l).unwrap();
    assert!(kb.modifiers().is_held(Modifier::Ctrl));
    kb.release(&ctrl()).unwrap();

    assert!(kb.pressed().is_empty());
    assert!(kb.modifiers().is_empty());

    kb.press(&ctrl_l).unwrap();
    kb.press(&ctrl()).unwrap();
    kb.release(&ctrl()).unwrap();
    kb.release(&ctrl_l).unwrap();
    assert!(kb.modifiers().is_empty());

    display.clear_events();
    kb.press(&LogicalKey::Char('a')).unwrap();
    kb.release(&LogicalKey::Char('a')).unwrap();
    assert_eq!(display.events()[0].modifiers, 0);
    assert_eq!(display.typed_text(), "a");
}

#[test]
fn modifiers_and_registered_keys_share_the_xtest_route() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display);

    kb.press(&ctrl()).unwrap();
    kb.press_with(&LogicalKey::Char('中'), true).unwrap();
    kb.release(&LogicalKey::Char('中')).unwrap();
    kb.release(&ctrl()).unwrap();

    let events = display.events();
    assert!(events.iter().all(|e| e.delivery == SimDelivery::Xtest));
    assert_eq!(display.labels(), vec!["+Control_L", "+中", "-中", "-Control_L"]);
    assert_eq!(display.typed_text(), "");
}
