//! Type-erased repository handle.

use crate::model::query::{PageSpec, Predicate, SortSpec};
use crate::repo::repository::{BaseRepository, UpdateBlock};
use crate::repo::RepoResult;
use std::sync::Arc;

type FetchFn<E> =
    dyn Fn(Option<Predicate>, Option<SortSpec>, Option<PageSpec>) -> RepoResult<Vec<E>>
        + Send
        + Sync;

/// Any [`BaseRepository`] of entity `E`, behind one boxed function per
/// operation.
///
/// The entity type stays part of the handle's type, so a repository of a
/// different entity cannot be wrapped.
pub struct AnyRepository<E> {
    save: Box<dyn Fn(E) -> RepoResult<()> + Send + Sync>,
    save_several: Box<dyn Fn(Vec<E>) -> RepoResult<()> + Send + Sync>,
    update: Box<dyn Fn(UpdateBlock) -> RepoResult<()> + Send + Sync>,
    delete: Box<dyn Fn(Predicate) -> RepoResult<()> + Send + Sync>,
    delete_all: Box<dyn Fn() -> RepoResult<()> + Send + Sync>,
    fetch: Box<FetchFn<E>>,
}

impl<E: 'static> AnyRepository<E> {
    pub fn new<R>(repository: R) -> Self
    where
        R: BaseRepository<Entity = E> + Send + Sync + 'static,
    {
        let repository = Arc::new(repository);
        let save = Arc::clone(&repository);
        let save_several = Arc::clone(&repository);
        let update = Arc::clone(&repository);
        let delete = Arc::clone(&repository);
        let delete_all = Arc::clone(&repository);
        let fetch = repository;

        Self {
            save: Box::new(move |item: E| save.save(item)),
            save_several: Box::new(move |items: Vec<E>| save_several.save_several(items)),
            update: Box::new(move |block: UpdateBlock| update.update(block)),
            delete: Box::new(move |predicate: Predicate| delete.delete(predicate)),
            delete_all: Box::new(move || delete_all.delete_all()),
            fetch: Box::new(
                move |predicate: Option<Predicate>,
                      sort: Option<SortSpec>,
                      page: Option<PageSpec>| { fetch.fetch(predicate, sort, page) },
            ),
        }
    }
}

impl<E> BaseRepository for AnyRepository<E> {
    type Entity = E;

    fn save(&self, item: E) -> RepoResult<()> {
        (self.save)(item)
    }

    fn save_several(&self, items: Vec<E>) -> RepoResult<()> {
        (self.save_several)(items)
    }

    fn update(&self, block: UpdateBlock) -> RepoResult<()> {
        (self.update)(block)
    }

    fn delete(&self, predicate: Predicate) -> RepoResult<()> {
        (self.delete)(predicate)
    }

    fn delete_all(&self) -> RepoResult<()> {
        (self.delete_all)()
    }

    fn fetch(
        &self,
        predicate: Option<Predicate>,
        sort: Option<SortSpec>,
        page: Option<PageSpec>,
    ) -> RepoResult<Vec<E>> {
        (self.fetch)(predicate, sort, page)
    }
}
