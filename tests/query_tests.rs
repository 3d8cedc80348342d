mod common;

use folio::query::ID_FIELD;
use folio::{Book, DocumentStore, FolioError, LibraryUser};
use serde_json::{Value, json};

use common::INDEX_TIMEOUT;

fn store_books(store: &DocumentStore, books: Vec<Book>) -> Vec<String> {
    let mut session = store.open_session();
    let mut ids = Vec::new();
    for mut book in books {
        session.store(&mut book).unwrap();
        ids.push(book.id);
    }
    session.save_changes().unwrap();
    ids
}

#[test]
fn test_session_changes_are_invisible_until_saved() {
    let store = DocumentStore::open_in_memory().unwrap();
    let mut session = store.open_session();
    let mut book = Book::new("Draft", "Nobody");
    session.store(&mut book).unwrap();
    assert!(session.has_changes());

    // Visible inside the session, not outside
    assert!(session.load::<Book>(&book.id).unwrap().is_some());
    assert!(store.open_session().load::<Book>(&book.id).unwrap().is_none());

    drop(session);
    assert!(store.open_session().load::<Book>(&book.id).unwrap().is_none());
    assert_eq!(store.document_count(), 0);
}

#[test]
fn test_ids_are_per_collection_sequences() {
    let store = DocumentStore::open_in_memory().unwrap();
    let ids = store_books(&store, vec![Book::new("A", "a"), Book::new("B", "b")]);
    assert_eq!(ids, vec!["books/1", "books/2"]);

    let mut session = store.open_session();
    let mut user = LibraryUser::new("Grace", "Hopper");
    session.store(&mut user).unwrap();
    session.save_changes().unwrap();
    assert_eq!(user.id, "libraryusers/1");
}

#[test]
fn test_include_prefetches_referenced_document() {
    let store = DocumentStore::open_in_memory().unwrap();
    let mut session = store.open_session();
    let mut user = LibraryUser::new("Grace", "Hopper");
    session.store(&mut user).unwrap();
    let mut book = Book::new("Compilers", "Aho");
    session.store(&mut book).unwrap();
    session.save_changes().unwrap();

    let mut session = store.open_session();
    let mut loaned: Book = session.load(&book.id).unwrap().unwrap();
    loaned.mark_loaned(&user.id, chrono::Utc::now());
    session.store(&mut loaned).unwrap();
    session.save_changes().unwrap();

    let mut session = store.open_session();
    let loaded: Book = session.include("LoanedBy").load(&book.id).unwrap().unwrap();
    assert_eq!(loaded.loaned_by.as_deref(), Some(user.id.as_str()));

    // Delete the user behind the session's back; the prefetched copy is served
    let mut other = store.open_session();
    other.delete(&user.id).unwrap();
    other.save_changes().unwrap();
    let cached: LibraryUser = session.load(&user.id).unwrap().unwrap();
    assert_eq!(cached.first_name, "Grace");
}

#[test]
fn test_non_stale_query_sees_every_prior_commit() {
    let store = DocumentStore::open_in_memory().unwrap();
    for round in 0..20 {
        store_books(&store, vec![Book::new(format!("Round{round}"), "Looper")]);
        let count = store
            .open_session()
            .query::<Book>()
            .wait_for_non_stale_results()
            .where_equals("Author", "Looper")
            .count()
            .unwrap();
        assert_eq!(count, round + 1);
    }
}

#[test]
fn test_statistics_converge_after_indexing() {
    let store = DocumentStore::open_in_memory().unwrap();
    store_books(&store, vec![Book::new("A", "a"), Book::new("B", "b"), Book::new("C", "c")]);
    let mut session = store.open_session();
    session.store(&mut LibraryUser::new("Ada", "Lovelace")).unwrap();
    session.save_changes().unwrap();

    store.wait_for_indexing(INDEX_TIMEOUT).unwrap();
    let statistics = store.collection_statistics();
    assert_eq!(statistics.count("Books"), 3);
    assert_eq!(statistics.count("LibraryUsers"), 1);
    assert_eq!(statistics.count("Magazines"), 0);
    assert_eq!(statistics.total(), 4);
}

#[test]
fn test_ordering_and_projection() {
    let store = DocumentStore::open_in_memory().unwrap();
    store_books(
        &store,
        vec![
            Book::new("Charlie", "x").with_isbn("3"),
            Book::new("Alpha", "x").with_isbn("1"),
            Book::new("Bravo", "x").with_isbn("2"),
        ],
    );

    let titles: Vec<String> = store
        .open_session()
        .query::<Book>()
        .wait_for_non_stale_results()
        .order_by("Title")
        .to_list()
        .unwrap()
        .into_iter()
        .map(|book| book.title)
        .collect();
    assert_eq!(titles, vec!["Alpha", "Bravo", "Charlie"]);

    let isbns = store
        .open_session()
        .query::<Book>()
        .wait_for_non_stale_results()
        .order_by_descending("ISBN")
        .select_field("ISBN")
        .to_list()
        .unwrap();
    assert_eq!(isbns, vec![json!("3"), json!("2"), json!("1")]);

    let first = store
        .open_session()
        .query::<Book>()
        .wait_for_non_stale_results()
        .order_by("Title")
        .first_or_default()
        .unwrap()
        .unwrap();
    assert_eq!(first.title, "Alpha");
}

#[test]
fn test_id_field_and_search() {
    let store = DocumentStore::open_in_memory().unwrap();
    let ids = store_books(
        &store,
        vec![Book::new("The Left Hand of Darkness", "Le Guin"), Book::new("Dune", "Herbert")],
    );

    let projected = store
        .open_session()
        .query::<Book>()
        .wait_for_non_stale_results()
        .where_equals(ID_FIELD, ids[1].as_str())
        .select_field("Title")
        .single_or_default()
        .unwrap();
    assert_eq!(projected, Some(Value::from("Dune")));

    let found = store
        .open_session()
        .query::<Book>()
        .wait_for_non_stale_results()
        .search("Title", "darkness")
        .to_list()
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ids[0]);

    // Search matches whole words only
    let partial = store
        .open_session()
        .query::<Book>()
        .wait_for_non_stale_results()
        .search("Title", "dark")
        .count()
        .unwrap();
    assert_eq!(partial, 0);
}

#[test]
fn test_single_or_default_rejects_ambiguity() {
    let store = DocumentStore::open_in_memory().unwrap();
    store_books(&store, vec![Book::new("Twin", "x"), Book::new("Twin", "y")]);

    let result = store
        .open_session()
        .query::<Book>()
        .wait_for_non_stale_results()
        .where_equals("Title", "Twin")
        .single_or_default();
    assert!(matches!(
        result,
        Err(FolioError::MultipleResults { found: 2, .. })
    ));
}
