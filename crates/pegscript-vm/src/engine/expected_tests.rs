use super::*;

#[test]
fn first_failure_populates_the_set() {
    let mut set = ExpectedSet::new();
    set.record(0, 0, Expectation::Single('a'));
    assert_eq!(set.entries(), &[Expectation::Single('a')]);
}

#[test]
fn failure_behind_ffp_is_ignored() {
    let mut set = ExpectedSet::new();
    set.record(5, 5, Expectation::Single('a'));
    set.record(2, 5, Expectation::Single('b'));
    assert_eq!(set.entries(), &[Expectation::Single('a')]);
}

#[test]
fn failure_past_ffp_clears_and_restarts() {
    let mut set = ExpectedSet::new();
    set.record(3, 3, Expectation::Single('a'));
    set.record(5, 3, Expectation::Single('b'));
    assert_eq!(set.entries(), &[Expectation::Single('b')]);
}

#[test]
fn failure_at_same_ffp_accumulates() {
    let mut set = ExpectedSet::new();
    set.record(3, 3, Expectation::Single('a'));
    set.record(3, 3, Expectation::Single('b'));
    assert_eq!(
        set.entries(),
        &[Expectation::Single('a'), Expectation::Single('b')]
    );
}

#[test]
fn whitespace_and_nul_are_suppressed() {
    let mut set = ExpectedSet::new();
    set.record(0, 0, Expectation::Single(' '));
    set.record(0, 0, Expectation::Single('\0'));
    set.record(0, 0, Expectation::Single('\n'));
    assert!(set.entries().is_empty());
}

#[test]
fn buffer_stops_growing_past_capacity() {
    let mut set = ExpectedSet::new();
    for i in 0..40u32 {
        let c = char::from_u32('A' as u32 + i).unwrap();
        set.record(0, 0, Expectation::Single(c));
    }
    assert_eq!(set.entries().len(), CAPACITY);
}

#[test]
fn record_many_folds_a_charsets_ranges_in_one_call() {
    let mut set = ExpectedSet::new();
    set.record_many(
        0,
        0,
        [
            Expectation::Range('0', '9'),
            Expectation::Range('a', 'z'),
        ],
    );
    assert_eq!(set.entries().len(), 2);
}
