//! End-to-end filtering and patching against database and CSV files

use catsql_core::{
    Bookmark, Error, HighlightDiff, OrderBy, Session, Settings, Value, ValueMap,
};
use rusqlite::Connection;
use std::fs;
use std::path::Path;

fn create_sheet(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE sheet (NAME TEXT, DIGIT INTEGER);
         INSERT INTO sheet VALUES ('one', 1), ('two', 2), ('thrEE', 3), ('foUR', 4), ('five', NULL);",
    )
    .unwrap();
}

fn url_for(path: &Path) -> String {
    format!("sqlite:///{}", path.display())
}

fn conditions(pairs: &[(&str, Value)]) -> ValueMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn sheet_filters() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("numbers.sqlite");
    create_sheet(&db);

    let session = Session::connect(&url_for(&db), &Settings::default()).unwrap();
    assert_eq!(session.tables(), vec!["sheet"]);

    let mut q = session.query();
    q.where_equals(&conditions(&[("DIGIT", Value::Integer(4))]));
    let row = q.row().unwrap().unwrap();
    assert_eq!(row.get("NAME"), Some(&Value::from("foUR")));

    let mut q = session.query();
    q.grep("three", false);
    let row = q.row().unwrap().unwrap();
    assert_eq!(row.get("NAME"), Some(&Value::from("thrEE")));

    let mut q = session.query();
    q.order(&OrderBy::parse(&["DIGIT-"]));
    let rows = q.rows().unwrap();
    assert_eq!(rows[0].get("NAME"), Some(&Value::from("foUR")));
    assert_eq!(rows[4].get("NAME"), Some(&Value::from("five")));
}

#[test]
fn sheet_patch_persists() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("numbers.sqlite");
    create_sheet(&db);

    let diff = HighlightDiff::parse("@@,NAME,DIGIT\n->,two,2->22\n->,ten,10->11\n".as_bytes())
        .unwrap();

    {
        let session = Session::connect(&url_for(&db), &Settings::default()).unwrap();
        let keys = session.catalog().table("sheet").unwrap().primary_key.clone();
        let mut engine = session.reconcile("sheet").unwrap();
        engine.apply_all(&diff.to_change_ops(&keys, false)).unwrap();
        let result = engine.finish();
        assert_eq!(result.updates, 1);
        assert_eq!(result.skips, 1);
        session.finalize(result.changed()).unwrap();
    }

    let session = Session::connect(db.to_str().unwrap(), &Settings::default()).unwrap();
    let mut q = session.query();
    q.where_equals(&conditions(&[("NAME", Value::from("two"))]));
    let row = q.row().unwrap().unwrap();
    assert_eq!(row.get("DIGIT"), Some(&Value::Integer(22)));
}

#[test]
fn csv_patch_writes_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sheet.csv");
    fs::write(&path, "NAME,DIGIT\none,1\ntwo,2\nfive,\n").unwrap();

    let session = Session::connect(path.to_str().unwrap(), &Settings::default()).unwrap();
    let diff = HighlightDiff::parse(
        "@@,NAME,DIGIT\n->,two,2->22\n+++,six,6\n---,five,\n".as_bytes(),
    )
    .unwrap();
    let keys = session.catalog().table("sheet").unwrap().primary_key.clone();

    let mut engine = session.reconcile("sheet").unwrap();
    engine.apply_all(&diff.to_change_ops(&keys, false)).unwrap();
    let result = engine.finish();
    assert_eq!(
        (result.updates, result.inserts, result.deletes, result.skips),
        (1, 1, 1, 0)
    );
    session.finalize(result.changed()).unwrap();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "NAME,DIGIT\none,1\ntwo,22\nsix,6\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("sheet.csv.bak")).unwrap(),
        "NAME,DIGIT\none,1\ntwo,2\nfive,\n"
    );
}

#[test]
fn table_restriction_and_bookmark() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("numbers.sqlite");
    create_sheet(&db);
    {
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch("CREATE TABLE extra (NAME TEXT); INSERT INTO extra VALUES ('two');")
            .unwrap();
    }

    let all = Session::connect(&url_for(&db), &Settings::default()).unwrap();
    let mut q = all.query();
    q.where_equals(&conditions(&[("NAME", Value::from("two"))]));
    assert!(matches!(q.rows(), Err(Error::AmbiguousTables { .. })));

    let mut bookmark = Bookmark::new(url_for(&db));
    bookmark.table = Some(vec!["sheet".to_string()]);
    bookmark.context = conditions(&[("NAME", Value::from("two"))]);
    let saved = dir.path().join("view.json");
    bookmark.save(&saved).unwrap();

    let bookmark = Bookmark::load(&saved).unwrap();
    let session = bookmark.open(&Settings::default()).unwrap();
    let mut q = session.query();
    bookmark.apply(&mut q).unwrap();
    let row = q.row().unwrap().unwrap();
    assert_eq!(row.get("DIGIT"), Some(&Value::Integer(2)));
}

#[test]
fn connection_errors() {
    let settings = Settings::default();
    assert!(matches!(
        Session::connect("mysql://user@host/db", &settings),
        Err(Error::Connection { .. })
    ));
    assert!(matches!(
        Session::connect("/nonexistent/dir/data.sqlite", &settings),
        Err(Error::Connection { .. })
    ));
}
