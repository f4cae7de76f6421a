use super::*;

#[test]
fn index_zero_is_the_empty_sentinel() {
    let mut builder = StringTableBuilder::new();
    builder.push("hello");
    let (offsets, blob, count) = builder.finish();
    let table = StringTable::new(&offsets, &blob, count);
    assert_eq!(table.get(0), "");
}

#[test]
fn round_trips_pushed_strings() {
    let mut builder = StringTableBuilder::new();
    let a = builder.push("alpha");
    let b = builder.push("beta");
    let (offsets, blob, count) = builder.finish();
    let table = StringTable::new(&offsets, &blob, count);

    assert_eq!(table.get(a), "alpha");
    assert_eq!(table.get(b), "beta");
    assert_eq!(table.len(), count);
}

#[test]
fn iter_yields_every_entry_in_order() {
    let mut builder = StringTableBuilder::new();
    builder.push("one");
    builder.push("two");
    let (offsets, blob, count) = builder.finish();
    let table = StringTable::new(&offsets, &blob, count);

    let all: Vec<&str> = table.iter().collect();
    assert_eq!(all, vec!["", "one", "two"]);
}

#[test]
fn handles_non_ascii_strings() {
    let mut builder = StringTableBuilder::new();
    let idx = builder.push("héllo wörld");
    let (offsets, blob, count) = builder.finish();
    let table = StringTable::new(&offsets, &blob, count);
    assert_eq!(table.get(idx), "héllo wörld");
}
