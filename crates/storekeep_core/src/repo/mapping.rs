//! Entity ↔ record conversion contract.

use crate::model::record::PersistedRecord;

/// Maps one entity type onto records of one kind.
///
/// Implementations must satisfy `from_record(write_record(e)) == e`; see
/// [`round_trip`].
pub trait MappingContract: Sized + Send + 'static {
    /// Schema kind the entity is stored as.
    const KIND: &'static str;

    /// Writes every persisted attribute of `self` into `record`.
    fn write_record(&self, record: &mut PersistedRecord);

    /// Builds an entity snapshot from the record's current fields.
    fn from_record(record: &PersistedRecord) -> Self;
}

/// Converts `entity` through a detached record and back.
pub fn round_trip<E: MappingContract>(entity: &E) -> E {
    let mut record = PersistedRecord::blank(E::KIND);
    entity.write_record(&mut record);
    E::from_record(&record)
}

#[cfg(test)]
mod tests {
    use super::{round_trip, MappingContract};
    use crate::model::record::PersistedRecord;

    #[derive(Debug, Clone, PartialEq)]
    struct Bookmark {
        url: String,
        visits: i64,
        note: Option<String>,
    }

    impl MappingContract for Bookmark {
        const KIND: &'static str = "bookmark";

        fn write_record(&self, record: &mut PersistedRecord) {
            record.set("url", self.url.as_str());
            record.set("visits", self.visits);
            record.set("note", self.note.clone());
        }

        fn from_record(record: &PersistedRecord) -> Self {
            Self {
                url: record.text("url").unwrap_or_default().to_string(),
                visits: record.integer("visits").unwrap_or_default(),
                note: record.text("note").map(str::to_string),
            }
        }
    }

    #[test]
    fn round_trip_preserves_optional_fields() {
        let with_note = Bookmark {
            url: "https://example.org".into(),
            visits: 3,
            note: Some("later".into()),
        };
        let without_note = Bookmark {
            note: None,
            ..with_note.clone()
        };
        assert_eq!(round_trip(&with_note), with_note);
        assert_eq!(round_trip(&without_note), without_note);
    }
}
