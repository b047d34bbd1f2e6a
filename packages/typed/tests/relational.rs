mod common;

use std::sync::Arc;

use common::{clear_events, events, order, user, Note, Order, User};
use stowage_core::provider::{Exec, RelationalExecutor};
use stowage_core::{
    Aggregate, Condition, Context, Direction, Error, Params, Query, Update, Value,
};
use stowage_memory::MemoryDb;
use stowage_typed::Table;

fn params(pairs: &[(&str, Value)]) -> Params {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn orders(db: &Arc<MemoryDb>) -> Table<Order, MemoryDb> {
    let table = Table::new(Arc::clone(db), "orders").unwrap();
    db.create_table(table.def()).unwrap();
    table
}

async fn seeded() -> (Arc<MemoryDb>, Table<Order, MemoryDb>) {
    let ctx = Context::background();
    let db = Arc::new(MemoryDb::new());
    let table = orders(&db);
    for mut o in [
        order(1, "acme", 10.0, "open"),
        order(2, "acme", 25.5, "paid"),
        order(3, "globex", 7.25, "open"),
        order(4, "initech", 100.0, "cancelled"),
    ] {
        table.set(&ctx, &mut o).await.unwrap();
    }
    (db, table)
}

#[tokio::test]
async fn test_set_get_replaces_whole_row() {
    let ctx = Context::background();
    let db = Arc::new(MemoryDb::new());
    let table = orders(&db);

    let mut first = order(7, "acme", 12.0, "open");
    first.note = Some("rush".into());
    table.set(&ctx, &mut first).await.unwrap();
    assert_eq!(table.get(&ctx, "7").await.unwrap(), first);
    assert!(table.exists(&ctx, "7").await.unwrap());

    let mut second = order(7, "acme", 12.0, "paid");
    table.set(&ctx, &mut second).await.unwrap();
    let got = table.get(&ctx, "7").await.unwrap();
    assert_eq!(got.status, "paid");
    assert_eq!(got.note, None);

    table.delete(&ctx, "7").await.unwrap();
    assert!(table.get(&ctx, "7").await.unwrap_err().is_not_found());
    assert!(table.delete(&ctx, "7").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_rows_use_storage_columns() {
    let ctx = Context::background();
    let (db, table) = seeded().await;

    let row = db
        .get(&ctx, Exec::Direct, table.def(), &Value::Integer(2))
        .await
        .unwrap();
    assert_eq!(row.get("customer_id"), Some(&Value::from("acme")));
    assert!(!row.contains_key("customer"));
    assert_eq!(row.get("note"), Some(&Value::Null));
}

#[tokio::test]
async fn test_integer_key_must_parse() {
    let ctx = Context::background();
    let (_db, table) = seeded().await;

    assert!(matches!(
        table.get(&ctx, "two").await,
        Err(Error::InvalidKey { .. })
    ));
    assert!(matches!(table.get(&ctx, "").await, Err(Error::InvalidKey { .. })));
}

#[tokio::test]
async fn test_unique_violation() {
    let ctx = Context::background();
    let db = Arc::new(MemoryDb::new());
    let users: Table<User, MemoryDb> = Table::new(Arc::clone(&db), "users").unwrap();
    db.create_table(users.def()).unwrap();

    users.set(&ctx, &mut user("alice", 30)).await.unwrap();
    let mut copycat = user("bob", 20);
    copycat.email = "alice@example.com".into();
    assert!(matches!(
        users.set(&ctx, &mut copycat).await,
        Err(Error::Duplicate { .. })
    ));
    assert!(!users.exists(&ctx, "bob").await.unwrap());

    // Rewriting the same row keeps its own email.
    users.set(&ctx, &mut user("alice", 31)).await.unwrap();
    assert_eq!(users.get(&ctx, "alice").await.unwrap().age, 31);
}

#[tokio::test]
async fn test_query_filters_orders_and_pages() {
    let ctx = Context::background();
    let (_db, table) = seeded().await;

    let acme = Query::new().filter(Condition::eq("customer", "c"));
    let got = table
        .query(&ctx, &acme, &params(&[("c", "acme".into())]))
        .await
        .unwrap();
    assert_eq!(got.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1, 2]);

    let by_total = Query::new()
        .filter(Condition::is_in("status", "statuses"))
        .order_by("total", Direction::Desc)
        .offset(1)
        .limit(2);
    let statuses = Value::Array(vec!["open".into(), "paid".into(), "cancelled".into()]);
    let got = table
        .query(&ctx, &by_total, &params(&[("statuses", statuses)]))
        .await
        .unwrap();
    assert_eq!(got.iter().map(|o| o.id).collect::<Vec<_>>(), vec![2, 1]);

    let pattern = Query::new().filter(Condition::like("customer", "p"));
    let got = table
        .query(&ctx, &pattern, &params(&[("p", "%tech".into())]))
        .await
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].customer, "initech");

    let no_note = Query::new().filter(Condition::is_null("note"));
    assert_eq!(table.query(&ctx, &no_note, &Params::new()).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_select_first_match() {
    let ctx = Context::background();
    let (_db, table) = seeded().await;

    let cheapest = Query::new().order_by("total", Direction::Asc);
    assert_eq!(table.select(&ctx, &cheapest, &Params::new()).await.unwrap().id, 3);

    let none = Query::new().filter(Condition::eq("status", "s"));
    let err = table
        .select(&ctx, &none, &params(&[("s", "refunded".into())]))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_bad_statements_are_invalid_queries() {
    let ctx = Context::background();
    let (_db, table) = seeded().await;

    let unknown = Query::new().filter(Condition::eq("colour", "c"));
    assert!(matches!(
        table.query(&ctx, &unknown, &params(&[("c", "red".into())])).await,
        Err(Error::InvalidQuery { .. })
    ));

    let missing = Query::new().filter(Condition::eq("status", "s"));
    assert!(matches!(
        table.query(&ctx, &missing, &Params::new()).await,
        Err(Error::InvalidQuery { .. })
    ));
}

#[tokio::test]
async fn test_update_counts_rows() {
    let ctx = Context::background();
    let (_db, table) = seeded().await;

    let close = Update::new()
        .set("status", "new")
        .filter(Condition::eq("status", "old"));
    let changed = table
        .update(
            &ctx,
            &close,
            &params(&[("new", "closed".into()), ("old", "open".into())]),
        )
        .await
        .unwrap();
    assert_eq!(changed, 2);
    assert_eq!(table.get(&ctx, "3").await.unwrap().status, "closed");

    let again = table
        .update(
            &ctx,
            &close,
            &params(&[("new", "closed".into()), ("old", "open".into())]),
        )
        .await
        .unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn test_aggregates() {
    let ctx = Context::background();
    let (_db, table) = seeded().await;
    let acme = params(&[("c", "acme".into())]);

    assert_eq!(table.aggregate(&ctx, &Aggregate::count(), &Params::new()).await.unwrap(), 4.0);
    let sum = Aggregate::sum("total").filter(Condition::eq("customer", "c"));
    assert_eq!(table.aggregate(&ctx, &sum, &acme).await.unwrap(), 35.5);
    let avg = Aggregate::avg("total").filter(Condition::eq("customer", "c"));
    assert_eq!(table.aggregate(&ctx, &avg, &acme).await.unwrap(), 17.75);
    assert_eq!(
        table.aggregate(&ctx, &Aggregate::max("total"), &Params::new()).await.unwrap(),
        100.0
    );
    assert_eq!(
        table.aggregate(&ctx, &Aggregate::min("total"), &Params::new()).await.unwrap(),
        7.25
    );

    let nobody = params(&[("c", "nobody".into())]);
    let sum = Aggregate::sum("total").filter(Condition::eq("customer", "c"));
    assert_eq!(table.aggregate(&ctx, &sum, &nobody).await.unwrap(), 0.0);
}

#[tokio::test]
async fn test_transaction_commit_and_rollback() {
    let ctx = Context::background();
    let (db, table) = seeded().await;

    let tx = db.begin();
    table.set_tx(&ctx, &tx, &mut order(5, "umbrella", 1.0, "open")).await.unwrap();
    table.delete_tx(&ctx, &tx, "1").await.unwrap();
    assert!(table.exists_tx(&ctx, &tx, "5").await.unwrap());
    assert!(!table.exists(&ctx, "5").await.unwrap());
    assert!(table.exists(&ctx, "1").await.unwrap());
    db.commit(tx).unwrap();

    assert!(table.exists(&ctx, "5").await.unwrap());
    assert!(!table.exists(&ctx, "1").await.unwrap());

    let tx = db.begin();
    table.delete_tx(&ctx, &tx, "2").await.unwrap();
    let count = table.aggregate_tx(&ctx, &tx, &Aggregate::count(), &Params::new()).await.unwrap();
    assert_eq!(count, 3.0);
    db.rollback(tx);
    assert!(table.exists(&ctx, "2").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_write_conflicts() {
    let ctx = Context::background();
    let (db, table) = seeded().await;

    let tx = db.begin();
    let mut o = table.get_tx(&ctx, &tx, "1").await.unwrap();
    o.total = 11.0;
    table.set_tx(&ctx, &tx, &mut o).await.unwrap();

    table.set(&ctx, &mut order(9, "hooli", 3.0, "open")).await.unwrap();

    assert!(matches!(db.commit(tx), Err(Error::Conflict { .. })));
    assert_eq!(table.get(&ctx, "1").await.unwrap().total, 10.0);
}

#[tokio::test]
async fn test_table_lifecycle() {
    let ctx = Context::background();
    let db = Arc::new(MemoryDb::new());
    let table: Table<Order, MemoryDb> = Table::new(Arc::clone(&db), "orders").unwrap();

    assert!(matches!(
        table.get(&ctx, "1").await,
        Err(Error::TableNotFound { .. })
    ));
    db.create_table(table.def()).unwrap();
    assert!(matches!(
        db.create_table(table.def()),
        Err(Error::TableExists { .. })
    ));
    assert_eq!(db.table_names(), vec!["orders"]);

    db.drop_table("orders").unwrap();
    assert!(matches!(db.drop_table("orders"), Err(Error::TableNotFound { .. })));
}

#[tokio::test]
async fn test_atomic_table_shares_rows() {
    let ctx = Context::background();
    let (_db, table) = seeded().await;
    let atomic = table.atomic();

    let atom = atomic.get(&ctx, "2").await.unwrap();
    assert_eq!(atom.int("id"), Some(&2));
    assert_eq!(atom.string("customer").map(String::as_str), Some("acme"));
    assert_eq!(atom.string_ptr("note"), Some(None));

    let mut edited = atom.clone();
    edited.set_string("status", "refunded");
    atomic.set(&ctx, &edited).await.unwrap();
    assert_eq!(table.get(&ctx, "2").await.unwrap().status, "refunded");
}

#[tokio::test]
async fn test_table_hooks() {
    let ctx = Context::background();
    let db = Arc::new(MemoryDb::new());
    let notes: Table<Note, MemoryDb> = Table::new(Arc::clone(&db), "notes").unwrap();
    db.create_table(notes.def()).unwrap();
    clear_events();

    notes.set(&ctx, &mut Note::new("a", " hi ")).await.unwrap();
    let got = notes.get(&ctx, "a").await.unwrap();
    assert_eq!(got.body, "hi");
    assert!(got.loaded);

    assert!(matches!(
        notes.delete(&ctx, "locked").await,
        Err(Error::Hook { .. })
    ));
    notes.delete(&ctx, "a").await.unwrap();
    assert_eq!(
        events(),
        vec![
            "before_save:a",
            "after_save:a",
            "after_load:a",
            "before_delete:locked",
            "before_delete:a",
            "after_delete:a",
        ]
    );
}

#[tokio::test]
async fn test_transaction_errors_match_direct_path() {
    let ctx = Context::background();
    let db = Arc::new(MemoryDb::new());
    let users: Table<User, MemoryDb> = Table::new(Arc::clone(&db), "users").unwrap();
    db.create_table(users.def()).unwrap();
    users.set(&ctx, &mut user("alice", 30)).await.unwrap();

    let tx = db.begin();
    assert!(users.get_tx(&ctx, &tx, "ghost").await.unwrap_err().is_not_found());
    assert!(users.delete_tx(&ctx, &tx, "ghost").await.unwrap_err().is_not_found());
    assert!(users.atomic().get_tx(&ctx, &tx, "ghost").await.unwrap_err().is_not_found());

    let mut copycat = user("bob", 20);
    copycat.email = "alice@example.com".into();
    assert!(matches!(
        users.set_tx(&ctx, &tx, &mut copycat).await,
        Err(Error::Duplicate { .. })
    ));
    assert!(!users.exists_tx(&ctx, &tx, "bob").await.unwrap());

    let none = Query::new().filter(Condition::eq("age", "a"));
    let err = users
        .select_tx(&ctx, &tx, &none, &params(&[("a", Value::Integer(99))]))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    // The failed writes left nothing to commit.
    db.commit(tx).unwrap();
    assert!(!users.exists(&ctx, "bob").await.unwrap());
}
