//! Screen/buffer translation around hard tabs, paired characters and folds.

mod common;

use common::{
    display_layer, expect_position_translations, flat_token_boundaries, p, sp, tb,
    Translation::{Clipped, Exact},
};
use stoat_display_layer::{ClipDirection, ClipOptions, DisplayLayerSettings, Point};

#[test]
fn hard_tabs_expand_to_tab_stops() {
    let settings = DisplayLayerSettings::default().with_tab_length(4);
    let mut layer = display_layer("\ta\tbc\tdef\tg\n\th", settings);
    assert_eq!(layer.text().unwrap(), "    a   bc  def g\n    h");

    let leading = "hard-tab leading-whitespace";
    assert_eq!(
        flat_token_boundaries(&mut layer),
        vec![
            tb("    ", &[], &[leading]),
            tb("a", &[leading], &[]),
            tb("   ", &[], &["hard-tab"]),
            tb("bc", &["hard-tab"], &[]),
            tb("  ", &[], &["hard-tab"]),
            tb("def", &["hard-tab"], &[]),
            tb(" ", &[], &["hard-tab"]),
            tb("g", &["hard-tab"], &[]),
            tb("    ", &[], &[leading]),
            tb("h", &[leading], &[]),
        ]
    );

    expect_position_translations(
        &mut layer,
        &[
            (sp(0, 0), Exact(p(0, 0))),
            (sp(0, 1), Clipped(p(0, 0), p(0, 1))),
            (sp(0, 2), Clipped(p(0, 0), p(0, 1))),
            (sp(0, 3), Clipped(p(0, 0), p(0, 1))),
            (sp(0, 4), Exact(p(0, 1))),
            (sp(0, 5), Exact(p(0, 2))),
            (sp(0, 6), Clipped(p(0, 2), p(0, 3))),
            (sp(0, 7), Clipped(p(0, 2), p(0, 3))),
            (sp(0, 8), Exact(p(0, 3))),
            (sp(0, 9), Exact(p(0, 4))),
            (sp(0, 10), Exact(p(0, 5))),
            (sp(0, 11), Clipped(p(0, 5), p(0, 6))),
            (sp(0, 12), Exact(p(0, 6))),
            (sp(0, 13), Exact(p(0, 7))),
            (sp(0, 14), Exact(p(0, 8))),
            (sp(0, 15), Exact(p(0, 9))),
            (sp(0, 16), Exact(p(0, 10))),
            (sp(0, 17), Exact(p(0, 11))),
            (sp(0, 18), Clipped(p(0, 11), p(1, 0))),
            (sp(1, 0), Exact(p(1, 0))),
            (sp(1, 1), Clipped(p(1, 0), p(1, 1))),
            (sp(1, 2), Clipped(p(1, 0), p(1, 1))),
            (sp(1, 3), Clipped(p(1, 0), p(1, 1))),
            (sp(1, 4), Exact(p(1, 1))),
            (sp(1, 5), Exact(p(1, 2))),
            (sp(1, 6), Clipped(p(1, 2), p(1, 2))),
        ],
    );
}

#[test]
fn paired_characters_are_atomic() {
    let mut layer = display_layer("abc🐲def", DisplayLayerSettings::default());
    let mut cases: Vec<_> = (0..=3).map(|column| (sp(0, column), Exact(p(0, column)))).collect();
    cases.push((sp(0, 4), Clipped(p(0, 3), p(0, 5))));
    cases.extend((5..=8).map(|column| (sp(0, column), Exact(p(0, column)))));
    expect_position_translations(&mut layer, &cases);
}

#[test]
fn clip_direction_is_honored_inside_atomic_units() {
    let settings = DisplayLayerSettings::default().with_tab_length(4);
    let mut layer = display_layer("    hello world\nhow is it going\ni am good", settings);
    layer.fold_buffer_range(p(0, 7)..p(2, 7)).unwrap();
    assert_eq!(layer.text().unwrap(), "    hel⋯od");

    use ClipDirection::{Backward, Closest, Forward};
    let screen_cases = [
        (1, Backward, 0),
        (1, Closest, 0),
        (1, Forward, 4),
        (2, Backward, 0),
        (2, Closest, 0),
        (2, Forward, 4),
        (3, Backward, 0),
        (3, Closest, 4),
        (3, Forward, 4),
    ];
    for (column, direction, expected) in screen_cases {
        let options = ClipOptions::with_direction(direction);
        assert_eq!(
            layer.clip_screen_position(sp(0, column), options).unwrap(),
            sp(0, expected),
            "clip (0, {column}) {direction:?}"
        );
        assert_eq!(
            layer
                .translate_screen_position(sp(0, column), options)
                .unwrap(),
            p(0, expected),
            "translate (0, {column}) {direction:?}"
        );
    }

    let buffer_cases = [
        (p(0, 12), Backward, 7),
        (p(0, 12), Closest, 7),
        (p(0, 12), Forward, 8),
        (p(1, 7), Backward, 7),
        (p(1, 7), Closest, 7),
        (p(1, 7), Forward, 8),
        (p(1, 8), Backward, 7),
        (p(1, 8), Closest, 8),
        (p(1, 8), Forward, 8),
    ];
    for (position, direction, expected) in buffer_cases {
        let options = ClipOptions::with_direction(direction);
        assert_eq!(
            layer.translate_buffer_position(position, options).unwrap(),
            sp(0, expected),
            "translate {position:?} {direction:?}"
        );
    }
}

#[test]
fn buffer_positions_past_the_end_are_clipped() {
    let mut layer = display_layer("abc\ndef", DisplayLayerSettings::default());
    assert_eq!(
        layer
            .translate_buffer_position(p(0, u32::MAX), ClipOptions::default())
            .unwrap(),
        sp(0, 3)
    );
    assert_eq!(
        layer
            .translate_buffer_position(Point::MAX, ClipOptions::default())
            .unwrap(),
        sp(1, 3)
    );
    assert_eq!(
        layer
            .clip_screen_position(sp(9, 9), ClipOptions::default())
            .unwrap(),
        sp(1, 3)
    );
}
