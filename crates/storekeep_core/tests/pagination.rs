use storekeep_core::{
    BaseRepository, ContextKind, EntityKind, FieldType, MappingContract, Operation, PageSpec,
    PersistedRecord, PersistenceClient, Predicate, QueryRequest, Repository, Schema, SortSpec,
    StoreConfig,
};

#[derive(Debug, Clone, PartialEq)]
struct Item {
    label: String,
    weight: f64,
}

impl MappingContract for Item {
    const KIND: &'static str = "item";

    fn write_record(&self, record: &mut PersistedRecord) {
        record.set("label", self.label.as_str());
        record.set("weight", self.weight);
    }

    fn from_record(record: &PersistedRecord) -> Self {
        Self {
            label: record.text("label").unwrap_or_default().to_string(),
            weight: record.real("weight").unwrap_or_default(),
        }
    }
}

fn open_store(batch_hint: usize) -> PersistenceClient {
    let schema = Schema::new().with_kind(
        EntityKind::new("item")
            .field("label", FieldType::Text)
            .field("weight", FieldType::Real),
    );
    PersistenceClient::open(
        StoreConfig::in_memory("paging", schema).with_fetch_batch_hint(batch_hint),
    )
    .unwrap()
}

fn item(index: usize) -> Item {
    Item {
        label: format!("item-{index:02}"),
        weight: index as f64 / 2.0,
    }
}

fn labels_in_context(
    client: &PersistenceClient,
    context: ContextKind,
    request: QueryRequest,
) -> Vec<String> {
    client
        .perform(context, Operation::Query, move |session| {
            Ok(session
                .query(&request)?
                .iter()
                .map(|record| record.text("label").unwrap_or_default().to_string())
                .collect::<Vec<_>>())
        })
        .unwrap()
}

#[test]
fn fetch_window_follows_the_paging_law() {
    for count in 0..5usize {
        let client = open_store(2);
        let repo: Repository<Item> = Repository::new(&client).unwrap();
        repo.save_several((0..count).map(item).collect()).unwrap();
        let full = repo
            .fetch(None, Some(SortSpec::ascending("label")), None)
            .unwrap();
        assert_eq!(full.len(), count);

        for limit in 0..6usize {
            for offset in 0..7usize {
                let page = repo
                    .fetch(
                        None,
                        Some(SortSpec::ascending("label")),
                        Some(PageSpec::new(limit, offset)),
                    )
                    .unwrap();
                if limit == 0 {
                    assert_eq!(page, full);
                    continue;
                }
                let start = offset.min(count);
                let expected_len = limit.min(count.saturating_sub(offset));
                assert_eq!(page.len(), expected_len, "n={count} l={limit} o={offset}");
                assert_eq!(page[..], full[start..start + expected_len]);
            }
        }
    }
}

#[test]
fn offset_past_the_end_is_empty() {
    let client = open_store(20);
    let repo: Repository<Item> = Repository::new(&client).unwrap();
    repo.save_several((0..3).map(item).collect()).unwrap();

    let page = repo.fetch(None, None, Some(PageSpec::new(2, 3))).unwrap();
    assert!(page.is_empty());
}

#[test]
fn batch_hint_never_changes_results() {
    let expected: Vec<Item> = (0..7).map(item).collect();
    for hint in [1, 3, 7, 20] {
        let client = open_store(hint);
        let repo: Repository<Item> = Repository::new(&client).unwrap();
        repo.save_several(expected.clone()).unwrap();
        assert_eq!(repo.fetch_all().unwrap(), expected, "hint={hint}");
    }
}

#[test]
fn pushed_down_and_sliced_windows_agree() {
    let client = open_store(20);
    let repo: Repository<Item> = Repository::with_context(&client, ContextKind::Primary).unwrap();
    repo.save_several((0..4).map(item).collect()).unwrap();

    // Stage more items in the background context without committing them.
    client
        .perform(ContextKind::Background, Operation::Save, |session| {
            for index in 4..8 {
                let staged = item(index);
                session.insert_with("item", |record| staged.write_record(record))?;
            }
            Ok(())
        })
        .unwrap();

    let sort = SortSpec::descending("weight");
    let filter = Predicate::ge("weight", 1.0);
    let full = QueryRequest::new("item")
        .filter(Some(filter.clone()))
        .sorted(Some(sort.clone()));
    let staged_view = labels_in_context(&client, ContextKind::Background, full.clone());
    assert_eq!(
        staged_view,
        vec!["item-07", "item-06", "item-05", "item-04", "item-03", "item-02"]
    );

    let paged = full.clone().paged(Some(PageSpec::new(3, 2)));
    let sliced = labels_in_context(&client, ContextKind::Background, paged.clone());
    assert_eq!(sliced, staged_view[2..5].to_vec());

    client.commit(ContextKind::Background).unwrap();
    let pushed_down = labels_in_context(&client, ContextKind::Primary, paged);
    assert_eq!(pushed_down, sliced);
}

#[test]
fn staged_deletes_hide_rows_from_their_context() {
    let client = open_store(20);
    let repo: Repository<Item> = Repository::with_context(&client, ContextKind::Primary).unwrap();
    repo.save_several((0..3).map(item).collect()).unwrap();

    let remaining = client
        .perform(ContextKind::Background, Operation::Delete, |session| {
            let first = session.query(
                &QueryRequest::new("item").filter(Some(Predicate::eq("label", "item-00"))),
            )?;
            session.delete(&first)?;
            let rest = session.query(&QueryRequest::new("item"))?;
            Ok(rest.len())
        })
        .unwrap();
    assert_eq!(remaining, 2);
    assert_eq!(repo.fetch_all().unwrap().len(), 3);
}
