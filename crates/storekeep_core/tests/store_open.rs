use rusqlite::Connection;
use storekeep_core::{
    BaseRepository, EntityKind, FailureCause, FieldType, MappingContract, Operation,
    PersistedRecord, PersistenceClient, Repository, Schema, Severity, StoreConfig,
};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq)]
struct Note {
    title: String,
}

impl MappingContract for Note {
    const KIND: &'static str = "note";

    fn write_record(&self, record: &mut PersistedRecord) {
        record.set("title", self.title.as_str());
    }

    fn from_record(record: &PersistedRecord) -> Self {
        Self {
            title: record.text("title").unwrap_or_default().to_string(),
        }
    }
}

fn note_schema() -> Schema {
    Schema::new().with_kind(EntityKind::new("note").field("title", FieldType::Text))
}

#[test]
fn reopening_a_file_store_keeps_committed_notes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.sqlite3");

    {
        let client =
            PersistenceClient::open(StoreConfig::at_path("notes", &path, note_schema())).unwrap();
        let repo: Repository<Note> = Repository::new(&client).unwrap();
        repo.save(Note {
            title: "durable".into(),
        })
        .unwrap();
        client.close().unwrap();
    }

    let client =
        PersistenceClient::open(StoreConfig::at_path("notes", &path, note_schema())).unwrap();
    let repo: Repository<Note> = Repository::new(&client).unwrap();
    assert_eq!(
        repo.fetch_all().unwrap(),
        vec![Note {
            title: "durable".into()
        }]
    );
}

#[test]
fn store_opens_from_json_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("json.sqlite3");
    let json = format!(
        r#"{{
            "name": "json",
            "location": {{ "mode": "file", "path": {path:?} }},
            "schema": [
                {{ "name": "note", "fields": [{{ "name": "title", "type": "text" }}] }}
            ],
            "fetch_batch_hint": 4
        }}"#,
        path = path.to_str().unwrap()
    );

    let client = PersistenceClient::open(StoreConfig::from_json_str(&json).unwrap()).unwrap();
    assert_eq!(client.name(), "json");
    assert!(client.schema().kind("note").is_some());
    assert!(path.exists());
}

#[test]
fn mismatched_existing_table_is_unrecoverable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy.sqlite3");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE note (record_id TEXT PRIMARY KEY NOT NULL, title INTEGER);")
        .unwrap();
    drop(conn);

    let failure =
        match PersistenceClient::open(StoreConfig::at_path("legacy", &path, note_schema())) {
            Ok(_) => panic!("open should reject the mismatched table"),
            Err(failure) => failure,
        };

    assert_eq!(failure.operation(), Operation::Open);
    assert_eq!(failure.severity(), Severity::Unrecoverable);
    assert!(failure.to_string().contains("title"));
}

#[test]
fn invalid_config_is_rejected_before_touching_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("never.sqlite3");
    let config = StoreConfig::at_path("", &path, note_schema());

    let failure = match PersistenceClient::open(config) {
        Ok(_) => panic!("empty store name must be rejected"),
        Err(failure) => failure,
    };

    assert!(matches!(failure.cause(), FailureCause::Config(_)));
    assert!(!path.exists());
}

#[test]
fn missing_tables_are_created_next_to_existing_ones() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("grow.sqlite3");
    PersistenceClient::open(StoreConfig::at_path("grow", &path, note_schema()))
        .unwrap()
        .close()
        .unwrap();

    let wider = note_schema().with_kind(EntityKind::new("tag").field("label", FieldType::Text));
    PersistenceClient::open(StoreConfig::at_path("grow", &path, wider)).unwrap();

    let conn = Connection::open(&path).unwrap();
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('note', 'tag');",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 2);
}
