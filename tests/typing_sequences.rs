use keywrite::keysym::{char_to_keysym, LogicalKey};
use keywrite::session::allocator::RESERVED_KEYCODES;
use keywrite::session::dispatch::Route;
use keywrite::session::{Keyboard, SessionOptions, X11Session};
use keywrite::sim::{SimDelivery, SimDisplay};
use keywrite::typing::{press_chord, type_text, Pacing};
use pretty_assertions::assert_eq;

fn open(display: &SimDisplay, options: SessionOptions) -> X11Session<SimDisplay> {
    X11Session::open(display.clone(), options).expect("sim session opens")
}

fn no_delay() -> Pacing {
    Pacing::default()
}

#[test]
fn uppercase_is_wrapped_in_shift() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display, SessionOptions::default());

    let report = type_text(&mut kb, "Ab1", &no_delay()).unwrap();

    assert_eq!(report.typed, 3);
    assert!(report.skipped.is_empty());
    assert_eq!(
        display.labels(),
        vec!["+Shift_L", "+A", "-A", "-Shift_L", "+b", "-b", "+1", "-1"]
    );
    assert_eq!(display.typed_text(), "Ab1");
    assert!(kb.pressed().is_empty());
}

#[test]
fn ctrl_chord_holds_the_modifier_around_the_key() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display, SessionOptions::default());

    let keys = LogicalKey::parse_all(&["ctrl", "c"]).unwrap();
    press_chord(&mut kb, &keys).unwrap();

    assert_eq!(display.labels(), vec!["+Control_L", "+c", "-c", "-Control_L"]);
    assert_eq!(display.typed_text(), "");
    assert!(kb.modifiers().is_empty());
}

#[test]
fn characters_outside_the_layout_are_registered_and_removed() {
    let display = SimDisplay::us_qwerty();
    let before = display.table_snapshot();
    let mut kb = open(&display, SessionOptions::default());

    let report = type_text(&mut kb, "中文", &no_delay()).unwrap();
    assert_eq!(report.typed, 2);
    assert_eq!(display.typed_text(), "中文");
    assert_eq!(display.labels(), vec!["+中", "-中", "+文", "-文"]);

    let registered = kb.registered().clone();
    assert_eq!(registered.len(), 2);
    let first_free = 8 + RESERVED_KEYCODES;
    for c in ['中', '文'] {
        let slot = registered[&char_to_keysym(c)];
        assert!(usize::from(slot.keycode) >= first_free);
        assert_eq!(display.row(slot.keycode)[0], char_to_keysym(c));
    }
    assert_eq!(display.mapping_writes(), 2);

    // Typing the same character again reuses its slot.
    type_text(&mut kb, "中", &no_delay()).unwrap();
    assert_eq!(display.mapping_writes(), 2);

    kb.close().unwrap();
    assert!(kb.registered().is_empty());
    assert_eq!(display.table_snapshot(), before);
}

#[test]
fn ascii_only_skips_everything_else() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display, SessionOptions::default());
    let pacing = Pacing {
        ascii_only: true,
        ..Pacing::default()
    };

    let report = type_text(&mut kb, "héllo", &pacing).unwrap();

    assert_eq!(report.typed, 4);
    assert_eq!(report.skipped, vec!['é']);
    assert_eq!(display.typed_text(), "hllo");
    assert_eq!(display.mapping_writes(), 0);
}

#[test]
fn control_characters_without_a_key_are_skipped() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display, SessionOptions::default());

    let report = type_text(&mut kb, "a\u{7}b", &no_delay()).unwrap();

    assert_eq!(report.typed, 2);
    assert_eq!(report.skipped, vec!['\u{7}']);
    assert_eq!(display.typed_text(), "ab");
    assert!(!kb.is_closed());
}

#[test]
fn tab_and_newline_use_their_keys() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display, SessionOptions::default());

    type_text(&mut kb, "a\tb\n", &no_delay()).unwrap();

    assert_eq!(
        display.labels(),
        vec!["+a", "-a", "+Tab", "-Tab", "+b", "-b", "+Return", "-Return"]
    );
    assert_eq!(display.typed_text(), "a\tb\n");
}

#[test]
fn focus_events_carry_shift_in_the_state_mask() {
    let display = SimDisplay::us_qwerty().without_xtest();
    let mut kb = open(&display, SessionOptions::default());
    assert_eq!(kb.route(), Route::Focus);

    type_text(&mut kb, "Hi", &no_delay()).unwrap();

    let events = display.events();
    assert!(events.iter().all(|e| e.delivery == SimDelivery::Focus));
    assert_eq!(display.typed_text(), "Hi");
}

#[test]
fn forced_focus_events_bypass_xtest() {
    let display = SimDisplay::us_qwerty();
    let options = SessionOptions {
        force_focus_events: true,
        ..SessionOptions::default()
    };
    let mut kb = open(&display, options);

    type_text(&mut kb, "ok", &no_delay()).unwrap();

    assert!(display
        .events()
        .iter()
        .all(|e| e.delivery == SimDelivery::Focus));
    assert_eq!(display.typed_text(), "ok");
}

#[test]
fn allocator_only_sessions_still_type_shifted_characters() {
    let display = SimDisplay::us_qwerty();
    let options = SessionOptions {
        static_table: false,
        ..SessionOptions::default()
    };
    let mut kb = open(&display, options);
    assert!(!kb.uses_static_table());

    type_text(&mut kb, "Ab", &no_delay()).unwrap();

    assert_eq!(
        display.labels(),
        vec!["+Shift_L", "+A", "-A", "-Shift_L", "+b", "-b"]
    );
    assert_eq!(display.typed_text(), "Ab");
    assert_eq!(display.mapping_writes(), 0);
}

#[test]
fn named_keys_parse_from_their_aliases() {
    let display = SimDisplay::us_qwerty();
    let mut kb = open(&display, SessionOptions::default());

    let keys = LogicalKey::parse_all(&["Control", "Shift", "t"]).unwrap();
    press_chord(&mut kb, &keys).unwrap();

    assert_eq!(
        display.labels(),
        vec!["+Control_L", "+Shift_L", "+T", "-T", "-Shift_L", "-Control_L"]
    );
}
