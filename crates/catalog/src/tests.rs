use super::*;
use types::{FieldDesc, FieldType};

fn desc() -> TupleDesc {
    TupleDesc::try_new(vec![FieldDesc::new("id", FieldType::Int32)]).unwrap()
}

#[test]
fn register_and_look_up_by_name_and_id() {
    let mut cat = InMemoryCatalog::new();
    let id = cat.register_table("people", desc(), "/data/people.tbl").unwrap();
    assert_eq!(cat.get_table_name(id).unwrap(), "people");
    assert_eq!(cat.get_database_file(id).unwrap(), Path::new("/data/people.tbl"));
    assert_eq!(cat.tuple_desc(id).unwrap(), &desc());
}

#[test]
fn duplicate_table_name_is_rejected() {
    let mut cat = InMemoryCatalog::new();
    cat.register_table("people", desc(), "/data/people.tbl").unwrap();
    let err = cat.register_table("people", desc(), "/data/other.tbl").unwrap_err();
    assert!(matches!(err, DbError::Catalog(_)));
}

#[test]
fn unknown_table_id_is_an_error() {
    let cat = InMemoryCatalog::new();
    assert!(cat.get_table_name(TableId(42)).is_err());
}

#[test]
fn table_id_iterator_covers_every_registered_table() {
    let mut cat = InMemoryCatalog::new();
    let a = cat.register_table("a", desc(), "/a.tbl").unwrap();
    let b = cat.register_table("b", desc(), "/b.tbl").unwrap();
    let mut ids: Vec<TableId> = cat.table_id_iterator().collect();
    ids.sort_by_key(|id| id.0);
    assert_eq!(ids, vec![a, b]);
}
