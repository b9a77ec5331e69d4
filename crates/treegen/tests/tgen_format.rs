//! Round-trip tests for the TGen program text format.

use treegen::{StringInterner, TGenProgram};

fn roundtrip(text: &str) {
    let mut interner = StringInterner::new();
    let table = TGenProgram::parse(text, &mut interner).unwrap();
    let rendered = table.to_text(&interner);
    assert_eq!(rendered, text, "first render differs");

    let reparsed = TGenProgram::parse(&rendered, &mut interner).unwrap();
    assert_eq!(reparsed, table, "reparse differs");
    assert_eq!(reparsed.to_text(&interner), rendered, "second render differs");
}

#[test]
fn simple_programs() {
    roundtrip("WRITE_TYPE UP WRITE_TYPE\n");
    roundtrip("empty\n");
    roundtrip("PREV_NODE_VALUE WRITE_VALUE =eq= UP WRITE_TYPE WRITE_POS\n");
}

#[test]
fn switch_lines() {
    roundtrip("switch WRITE_TYPE: on \"Property\" goto 1; else goto 0\nempty\nUP WRITE_TYPE\n");
    roundtrip(
        "switch WRITE_TYPE RIGHT WRITE_TYPE: on \"\" goto 1; on \"Expression\" goto 2; on \"Loop -1\" goto 3; else goto 0\n",
    );
    roundtrip("switch WRITE_TYPE UP WRITE_TYPE: on \"If\\sExpr If\" goto 1; else goto 0\n");
}

#[test]
fn seven_entry_table() {
    roundtrip(
        "WRITE_TYPE LEFT WRITE_TYPE\n\
         UP WRITE_TYPE\n\
         switch WRITE_TYPE: on \"Property\" goto 1; else goto 0\n\
         UP UP RIGHT WRITE_TYPE WRITE_VALUE\n\
         switch UP WRITE_TYPE: on \"Expr\" goto 2; else goto 3\n\
         UP UP WRITE_TYPE\n\
         switch UP UP WRITE_TYPE: on \"Expr\" goto 4; else goto 5\n",
    );
}

#[test]
fn cases_sharing_a_target_merge_into_one_group() {
    let mut interner = StringInterner::new();
    let table = TGenProgram::parse(
        "empty\nswitch WRITE_TYPE: on \"B\" goto 1; on \"A\" goto 1; else goto 0\n",
        &mut interner,
    )
    .unwrap();
    // Groups are keyed by target; cases inside a group follow key order,
    // which is interning order here ("B" was interned first).
    assert_eq!(
        table.to_text(&interner),
        "empty\nswitch WRITE_TYPE: on \"B|A\" goto 1; else goto 0\n"
    );
}

#[test]
fn cases_mapped_to_the_default_fold_into_else() {
    let mut interner = StringInterner::new();
    let table = TGenProgram::parse(
        "empty\nswitch WRITE_TYPE: on \"A\" goto 1; on \"B\" goto 0; else goto 0\n",
        &mut interner,
    )
    .unwrap();
    assert_eq!(
        table.to_text(&interner),
        "empty\nswitch WRITE_TYPE: on \"A\" goto 1; else goto 0\n"
    );
}

#[test]
fn blank_lines_are_skipped() {
    let mut interner = StringInterner::new();
    let table = TGenProgram::parse("\nempty\n\nUP WRITE_TYPE\n\n", &mut interner).unwrap();
    assert_eq!(table.len(), 2);
}

#[test]
fn file_roundtrip() {
    let mut path = std::env::temp_dir();
    path.push(format!("treegen-tgen-{}.txt", std::process::id()));

    let text = "empty\nUP WRITE_TYPE\nswitch type: on \"Property\" goto 1; else goto 0\n";
    let mut interner = StringInterner::new();
    let table = TGenProgram::parse(text, &mut interner).unwrap();
    table.save_to_path(&path, &interner).unwrap();

    let mut interner2 = StringInterner::new();
    let loaded = TGenProgram::load_from_path(&path, &mut interner2).unwrap();
    std::fs::remove_file(&path).unwrap();

    // The `type` shorthand desugars on parse and stays desugared.
    assert_eq!(
        loaded.to_text(&interner2),
        "empty\nUP WRITE_TYPE\nswitch WRITE_TYPE: on \"Property\" goto 1; else goto 0\n"
    );
}
