// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Ensure that all version of each macro can be used

use std::rc::Rc;

use interlink_track::entity::{Entity, toplevel};
use interlink_track::{Id, debug, enter, error, exit, info, test_helpers, test_init, trace, value, warn};

macro_rules! build_with_entity {
    ($name:ident, $macro:ident, $slvl:expr) => (
        #[test]
        fn $name() {
            let (test_tracker, tracker) = test_init!(100);

            let top = toplevel(&tracker, "top");
            test_helpers::check_and_clear(&test_tracker, &["0: created 100, top, 0, 0 bytes"]);
            assert_eq!(top.id, Id(100));

            $macro!(top ; "Loc with no args");
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl, ": Loc with no args")]);

            $macro!(top ; "Loc with {} argument", 1);
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl, ": Loc with 1 argument")]);

            $macro!(top ; "Loc with {}, {} arguments", 1, 1 + 1);
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl,": Loc with 1, 2 arguments")]);

            drop(top);
            test_helpers::check_and_clear(&test_tracker, &["100: destroyed"]);
        }
    );
}

build_with_entity!(trace_with_entity, trace, "TRACE");
build_with_entity!(info_with_entity, info, "INFO");
build_with_entity!(debug_with_entity, debug, "DEBUG");
build_with_entity!(warn_with_entity, warn, "WARN");
build_with_entity!(error_with_entity, error, "ERROR");

#[test]
fn hierarchy_names() {
    let (test_tracker, tracker) = test_init!(10);

    let top = toplevel(&tracker, "top");
    let site = Rc::new(Entity::new(&top, "site0"));
    let tor = Entity::new(&site, "tor3");
    test_helpers::check_and_clear(
        &test_tracker,
        &[
            "0: created 10, top, 0, 0 bytes",
            "10: created 11, top::site0, 0, 0 bytes",
            "11: created 12, top::site0::tor3, 0, 0 bytes",
        ],
    );

    assert_eq!(tor.full_name(), "top::site0::tor3");
    assert_eq!(format!("{tor}"), "top::site0::tor3");

    drop(tor);
    test_helpers::check_and_clear(&test_tracker, &["12: destroyed 11"]);
}

#[test]
fn enter_exit_value() {
    let (test_tracker, tracker) = test_init!(20);

    let top = toplevel(&tracker, "top");
    test_helpers::check_and_clear(&test_tracker, &["0: created 20"]);

    enter!(top ; Id(7));
    exit!(top ; Id(7));
    value!(top ; 3);
    test_helpers::check_and_clear(
        &test_tracker,
        &["20: 7 entered", "20: 7 exited", "20: value 3"],
    );
}
