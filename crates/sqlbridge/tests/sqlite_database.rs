use sqlbridge::prelude::*;
use sqlbridge::{ParamStyle, TransactionErrorKind};
use tempfile::TempDir;

fn open(dir: &TempDir) -> Database {
    let path = dir.path().join("people.db");
    let params = ConnectParams::new("sqlite").db(path.to_string_lossy());
    let db = Environment::new()
        .open(&params, DatabaseOptions::new().log_queries(true))
        .expect("open sqlite database");
    db.exec("CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)")
        .expect("create table");
    db
}

fn person(name: &str, age: i32) -> ColumnValues {
    let mut row = ColumnValues::new();
    row.insert("name".into(), Bind::from(name));
    row.insert("age".into(), Bind::from(age));
    row
}

fn names(db: &Database) -> Vec<String> {
    db.select(["person"])
        .what("name")
        .order("id")
        .fetch()
        .expect("select names")
        .into_iter()
        .map(|row| row.get_named::<String>("name").expect("name column"))
        .collect()
}

#[test]
fn insert_returns_rowid_and_select_reads_it_back() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);

    let id = db.insert("person", person("Ann", 31)).execute().unwrap();
    assert_eq!(id, Some(1));

    let row = db
        .select(["person"])
        .where_(1_i64)
        .first()
        .unwrap()
        .expect("row 1");
    assert_eq!(row.get_named::<String>("name").unwrap(), "Ann");
    assert_eq!(row.get_named::<i64>("age").unwrap(), 31);
}

#[test]
fn quotes_in_values_are_bound_not_spliced() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.insert("person", person("O'Brien", 40)).no_id().execute().unwrap();

    let request = db
        .select(["person"])
        .where_("name = $name")
        .var("name", "O'Brien");
    let rendered = request.build().unwrap().render(ParamStyle::Qmark);
    assert_eq!(rendered.sql, "SELECT * FROM person WHERE name = ?");
    assert_eq!(rendered.params, vec![Value::Text("O'Brien".into())]);

    let rows = request.fetch().unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn multiple_insert_runs_row_by_row_and_reports_each_id() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);

    let ids = db
        .multiple_insert("person", vec![person("Ann", 31), person("Bob", 27)])
        .execute()
        .unwrap();
    assert_eq!(ids, Some(vec![1, 2]));
    assert_eq!(names(&db), vec!["Ann", "Bob"]);
}

#[test]
fn multiple_insert_rejects_mismatched_rows() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);

    let mut partial = ColumnValues::new();
    partial.insert("name".into(), Bind::from("Cy"));
    let err = db
        .multiple_insert("person", vec![person("Ann", 31), partial])
        .execute()
        .unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch(_)));
    assert!(names(&db).is_empty());
}

#[test]
fn update_and_delete_report_affected_rows() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.multiple_insert("person", vec![person("Ann", 31), person("Bob", 27)])
        .execute()
        .unwrap();

    let mut older = ColumnValues::new();
    older.insert("age".into(), Bind::from(32));
    let changed = db
        .update(["person"], "name = $name", older)
        .var("name", "Ann")
        .execute()
        .unwrap();
    assert_eq!(changed, 1);

    let removed = db
        .delete("person", Some(Where::from(2_i64)))
        .execute()
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(names(&db), vec!["Ann"]);

    let removed = db.delete("person", None).execute().unwrap();
    assert_eq!(removed, 1);
}

#[test]
fn rolled_back_savepoint_keeps_outer_work() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);

    let outer = db.transaction().unwrap();
    db.insert("person", person("Ann", 31)).execute().unwrap();
    let inner = db.transaction().unwrap();
    assert_eq!(inner.depth(), 1);
    db.insert("person", person("Bob", 27)).execute().unwrap();
    inner.rollback().unwrap();
    outer.commit().unwrap();

    assert_eq!(names(&db), vec!["Ann"]);
}

#[test]
fn outer_rollback_discards_committed_savepoint() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);

    let outer = db.transaction().unwrap();
    let inner = db.transaction().unwrap();
    db.insert("person", person("Ann", 31)).execute().unwrap();
    inner.commit().unwrap();
    outer.rollback().unwrap();

    assert!(names(&db).is_empty());
}

#[test]
fn dropped_transaction_rolls_back() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    {
        let _tx = db.transaction().unwrap();
        db.insert("person", person("Ann", 31)).execute().unwrap();
    }
    assert!(names(&db).is_empty());
    assert_eq!(db.context().unwrap().depth(), 0);
}

#[test]
fn finishing_an_outer_level_closes_inner_ones() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);

    let outer = db.transaction().unwrap();
    let inner = db.transaction().unwrap();
    outer.commit().unwrap();
    let err = inner.commit().unwrap_err();
    assert!(matches!(
        err,
        Error::Transaction(ref t) if t.kind == TransactionErrorKind::AlreadyFinished
    ));
}

#[test]
fn failed_statement_replaces_the_context() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.insert("person", person("Ann", 31)).execute().unwrap();
    let before = db.context_id().unwrap();

    let tx = db.transaction().unwrap();
    db.insert("person", person("Bob", 27)).execute().unwrap();
    assert!(db.exec("SELECT * FROM no_such_table").is_err());
    assert_ne!(db.context_id().unwrap(), before);

    let err = tx.commit().unwrap_err();
    assert!(matches!(
        err,
        Error::Transaction(ref t) if t.kind == TransactionErrorKind::ContextClosed
    ));

    assert_eq!(names(&db), vec!["Ann"]);
    assert!(db.active());
}

#[test]
fn rows_serialize_as_objects() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    db.insert("person", person("Ann", 31)).execute().unwrap();

    let rows = db
        .select(["person"])
        .what("id, name, age")
        .fetch()
        .unwrap();
    assert_eq!(
        serde_json::to_value(&rows).unwrap(),
        serde_json::json!([{"id": 1, "name": "Ann", "age": 31}])
    );
}

#[test]
fn statements_are_counted_per_context() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let before = db.statement_count().unwrap();
    db.insert("person", person("Ann", 31)).no_id().execute().unwrap();
    db.exec("SELECT 1").unwrap();
    assert_eq!(db.statement_count().unwrap(), before + 2);
}
