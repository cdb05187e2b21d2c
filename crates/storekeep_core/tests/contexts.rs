use std::thread;
use storekeep_core::{
    BaseRepository, CommitOutcome, ContextKind, EntityKind, FailureCause, FieldType,
    MappingContract, Operation, PersistedRecord, PersistenceClient, QueryRequest, RepoError,
    Repository, Schema, StoreConfig,
};

#[derive(Debug, Clone, PartialEq)]
struct Task {
    name: String,
    done: bool,
}

impl MappingContract for Task {
    const KIND: &'static str = "task";

    fn write_record(&self, record: &mut PersistedRecord) {
        record.set("name", self.name.as_str());
        record.set("done", self.done);
    }

    fn from_record(record: &PersistedRecord) -> Self {
        Self {
            name: record.text("name").unwrap_or_default().to_string(),
            done: record.bool("done").unwrap_or_default(),
        }
    }
}

fn task(name: &str) -> Task {
    Task {
        name: name.to_string(),
        done: false,
    }
}

fn open_store() -> PersistenceClient {
    let schema = Schema::new().with_kind(
        EntityKind::new("task")
            .field("name", FieldType::Text)
            .field("done", FieldType::Bool),
    );
    PersistenceClient::open(StoreConfig::in_memory("contexts", schema)).unwrap()
}

fn count_in(client: &PersistenceClient, context: ContextKind) -> usize {
    client
        .perform(context, Operation::Query, |session| {
            Ok(session.query(&QueryRequest::new("task"))?.len())
        })
        .unwrap()
}

#[test]
fn other_threads_use_the_background_context() {
    let client = open_store();
    let repo: Repository<Task> = Repository::new(&client).unwrap();
    assert_eq!(repo.context(), ContextKind::Primary);

    let worker_client = client.clone();
    let seen = thread::spawn(move || {
        let repo: Repository<Task> = Repository::new(&worker_client).unwrap();
        repo.save(task("from worker")).unwrap();
        repo.context()
    })
    .join()
    .unwrap();

    assert_eq!(seen, ContextKind::Background);
    assert_eq!(repo.fetch_all().unwrap(), vec![task("from worker")]);
}

#[test]
fn background_changes_reach_primary_only_after_commit() {
    let client = open_store();
    client
        .perform(ContextKind::Background, Operation::Save, |session| {
            session.insert_with("task", |record| task("draft").write_record(record))
        })
        .unwrap();

    assert_eq!(count_in(&client, ContextKind::Background), 1);
    assert_eq!(count_in(&client, ContextKind::Primary), 0);

    let outcome = client.commit(ContextKind::Background).unwrap();
    assert_eq!(
        outcome,
        CommitOutcome::Committed {
            inserted: 1,
            deleted: 0
        }
    );
    assert_eq!(count_in(&client, ContextKind::Primary), 1);
    assert!(!client.has_changes(ContextKind::Primary).unwrap());
}

#[test]
fn primary_commit_leaves_background_changes_staged() {
    let client = open_store();
    client
        .perform(ContextKind::Background, Operation::Save, |session| {
            session.insert_with("task", |record| task("background").write_record(record))
        })
        .unwrap();
    client
        .perform(ContextKind::Primary, Operation::Save, |session| {
            session.insert_with("task", |record| task("primary").write_record(record))?;
            session.commit()
        })
        .unwrap();

    assert!(client.has_changes(ContextKind::Background).unwrap());
    assert_eq!(count_in(&client, ContextKind::Primary), 1);
    assert_eq!(count_in(&client, ContextKind::Background), 2);

    client.commit(ContextKind::Background).unwrap();
    assert_eq!(count_in(&client, ContextKind::Primary), 2);
}

#[test]
fn delete_all_records_clears_staged_and_durable_rows() {
    let client = open_store();
    let repo: Repository<Task> = Repository::with_context(&client, ContextKind::Primary).unwrap();
    repo.save_several(vec![task("a"), task("b")]).unwrap();
    client
        .perform(ContextKind::Primary, Operation::Save, |session| {
            session.insert_with("task", |record| task("staged").write_record(record))
        })
        .unwrap();

    let removed = client.delete_all_records(ContextKind::Primary).unwrap();

    assert_eq!(removed, 3);
    assert_eq!(count_in(&client, ContextKind::Primary), 0);
    assert!(!client.has_changes(ContextKind::Primary).unwrap());
}

#[derive(Debug, Clone, PartialEq)]
struct Tag {
    label: String,
}

impl MappingContract for Tag {
    const KIND: &'static str = "tag";

    fn write_record(&self, record: &mut PersistedRecord) {
        record.set("label", self.label.as_str());
    }

    fn from_record(record: &PersistedRecord) -> Self {
        Self {
            label: record.text("label").unwrap_or_default().to_string(),
        }
    }
}

#[test]
fn delete_all_commits_each_populated_kind() {
    let schema = Schema::new()
        .with_kind(
            EntityKind::new("task")
                .field("name", FieldType::Text)
                .field("done", FieldType::Bool),
        )
        .with_kind(EntityKind::new("tag").field("label", FieldType::Text))
        .with_kind(EntityKind::new("archive").field("note", FieldType::Text));
    let client = PersistenceClient::open(StoreConfig::in_memory("kinds", schema)).unwrap();
    let tasks: Repository<Task> = Repository::new(&client).unwrap();
    let tags: Repository<Tag> = Repository::new(&client).unwrap();
    tasks.save_several(vec![task("a"), task("b")]).unwrap();
    tags.save(Tag {
        label: "home".into(),
    })
    .unwrap();
    let commits_before = client.commit_count();

    let removed = client.delete_all_records(ContextKind::Primary).unwrap();

    assert_eq!(removed, 3);
    assert!(tasks.fetch_all().unwrap().is_empty());
    assert!(tags.fetch_all().unwrap().is_empty());
    // The empty kind stages nothing, so it adds no commit.
    assert_eq!(client.commit_count(), commits_before + 2);
}

#[test]
fn concurrent_writers_are_serialized() {
    let client = open_store();
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let client = client.clone();
            thread::spawn(move || {
                let repo: Repository<Task> = Repository::new(&client).unwrap();
                for index in 0..5 {
                    repo.save(task(&format!("w{worker}-{index}"))).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let repo: Repository<Task> = Repository::new(&client).unwrap();
    assert_eq!(repo.fetch_all().unwrap().len(), 20);
    assert_eq!(client.commit_count(), 20);
}

#[test]
fn closed_store_fails_every_call() {
    let client = open_store();
    let repo: Repository<Task> = Repository::new(&client).unwrap();
    repo.save(task("before close")).unwrap();

    client.close().unwrap();

    let err = repo.fetch_all().unwrap_err();
    match err {
        RepoError::Storage(failure) => {
            assert_eq!(failure.operation(), Operation::Query);
            assert!(matches!(failure.cause(), FailureCause::StoreClosed));
        }
        other => panic!("unexpected error: {other}"),
    }
}
