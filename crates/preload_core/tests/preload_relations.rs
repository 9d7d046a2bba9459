use preload_core::db::open_db_in_memory;
use preload_core::{
    CatalogRepository, Direction, Item, Query, QueryError, SqliteCatalogRepository, SubTag, Tag,
};
use rusqlite::Connection;

fn setup_db() -> Connection {
    open_db_in_memory().unwrap()
}

fn create_items(conn: &mut Connection, items: &mut [Item]) {
    let mut repo = SqliteCatalogRepository::try_new(conn).unwrap();
    for item in items.iter_mut() {
        repo.create_item(item).unwrap();
    }
}

fn active_via_item_tags_join(query: Query<Item>) -> Query<Item> {
    query.preload_with("Tags", |scope| {
        scope
            .joins("JOIN item_tags ON item_tags.tag_id = tags.id")
            .where_sql("tags.status = ?", ["active"])
    })
}

#[test]
fn default_preload_loads_all_tags() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags("Item1", vec![Tag::new("Tag1", "active")])],
    );

    let items = Query::<Item>::new().preload("Tags").find(&conn).unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].tags.len(), 1);
    assert_eq!(items[0].tags[0].name, "Tag1");
}

#[test]
fn custom_join_with_condition_keeps_only_matching_tags() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags(
            "Item1",
            vec![Tag::new("Tag1", "active"), Tag::new("Tag2", "inactive")],
        )],
    );

    let items = active_via_item_tags_join(Query::new()).find(&conn).unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].tags.len(), 1);
    assert_eq!(items[0].tags[0].status, "active");
}

#[test]
fn nested_preload_with_custom_join_filters_sub_tags() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags(
            "Item1",
            vec![Tag::with_sub_tags(
                "Tag1",
                "active",
                vec![SubTag::new("SubTag1", "active")],
            )],
        )],
    );

    let items = Query::<Item>::new()
        .preload_with("Tags.SubTags", |scope| {
            scope
                .joins("JOIN tag_sub_tags ON tag_sub_tags.sub_tag_id = sub_tags.id")
                .where_sql("sub_tags.status = ?", ["active"])
        })
        .find(&conn)
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].tags.len(), 1);
    assert_eq!(items[0].tags[0].sub_tags.len(), 1);
    assert_eq!(items[0].tags[0].sub_tags[0].name, "SubTag1");
}

#[test]
fn owner_without_matching_tags_keeps_empty_container() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags("Item1", vec![Tag::new("Tag1", "inactive")])],
    );

    let items = active_via_item_tags_join(Query::new()).find(&conn).unwrap();

    assert_eq!(items.len(), 1);
    assert!(items[0].tags.is_empty());
}

#[test]
fn empty_database_returns_no_items() {
    let conn = setup_db();

    let items = Query::<Item>::new().preload("Tags").find(&conn).unwrap();

    assert!(items.is_empty());
}

#[test]
fn filter_partitions_tags_across_items() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [
            Item::with_tags("Item1", vec![Tag::new("Tag1", "active")]),
            Item::with_tags("Item2", vec![Tag::new("Tag2", "inactive")]),
        ],
    );

    let items = active_via_item_tags_join(Query::new()).find(&conn).unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].name, "Item1");
    assert_eq!(items[0].tags.len(), 1);
    assert_eq!(items[1].name, "Item2");
    assert!(items[1].tags.is_empty());
}

#[test]
fn sequential_preloads_with_exclusive_conditions_are_disjoint() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags(
            "Item1",
            vec![Tag::new("Tag1", "active"), Tag::new("Tag2", "inactive")],
        )],
    );

    let active = Query::<Item>::new()
        .preload_with("Tags", |scope| scope.where_sql("status = ?", ["active"]))
        .find(&conn)
        .unwrap();
    let inactive = Query::<Item>::new()
        .preload_with("Tags", |scope| scope.where_sql("status = ?", ["inactive"]))
        .find(&conn)
        .unwrap();

    assert_eq!(active.len(), 1);
    assert_eq!(active[0].tags.len(), 1);
    assert_eq!(active[0].tags[0].status, "active");
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].tags.len(), 1);
    assert_eq!(inactive[0].tags[0].status, "inactive");
    assert_ne!(active[0].tags[0].id, inactive[0].tags[0].id);
}

#[test]
fn find_without_preload_leaves_relations_empty() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags("Item1", vec![Tag::new("Tag1", "active")])],
    );

    let items = Query::<Item>::new().find(&conn).unwrap();

    assert_eq!(items.len(), 1);
    assert!(items[0].tags.is_empty());
    assert!(items[0].created_at.is_some());
}

#[test]
fn nested_filters_apply_independently_per_level() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags(
            "Item1",
            vec![
                Tag::with_sub_tags(
                    "Tag1",
                    "active",
                    vec![
                        SubTag::new("SubTag1", "active"),
                        SubTag::new("SubTag2", "inactive"),
                    ],
                ),
                Tag::with_sub_tags("Tag2", "inactive", vec![SubTag::new("SubTag3", "active")]),
            ],
        )],
    );

    let items = Query::<Item>::new()
        .preload_with("Tags", |scope| scope.where_eq("tags.status", "active"))
        .preload_with("Tags.SubTags", |scope| {
            scope.where_eq("sub_tags.status", "inactive")
        })
        .find(&conn)
        .unwrap();

    assert_eq!(items[0].tags.len(), 1);
    assert_eq!(items[0].tags[0].name, "Tag1");
    let sub_tag_names: Vec<&str> = items[0].tags[0]
        .sub_tags
        .iter()
        .map(|sub_tag| sub_tag.name.as_str())
        .collect();
    assert_eq!(sub_tag_names, vec!["SubTag2"]);
}

#[test]
fn nested_path_loads_intermediate_level_unfiltered() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags(
            "Item1",
            vec![
                Tag::with_sub_tags("Tag1", "active", vec![SubTag::new("SubTag1", "inactive")]),
                Tag::with_sub_tags("Tag2", "inactive", vec![SubTag::new("SubTag2", "active")]),
            ],
        )],
    );

    let items = Query::<Item>::new()
        .preload_with("Tags.SubTags", |scope| {
            scope.where_eq("sub_tags.status", "active")
        })
        .find(&conn)
        .unwrap();

    let tags = &items[0].tags;
    assert_eq!(tags.len(), 2);
    assert!(tags[0].sub_tags.is_empty());
    assert_eq!(tags[1].sub_tags.len(), 1);
    assert_eq!(tags[1].sub_tags[0].name, "SubTag2");
}

#[test]
fn shared_tag_is_loaded_once_per_owner_even_with_junction_join() {
    let mut conn = setup_db();
    let mut shared = Tag::new("Shared", "active");
    {
        let mut repo = SqliteCatalogRepository::try_new(&mut conn).unwrap();
        repo.create_tag(&mut shared).unwrap();
    }
    create_items(
        &mut conn,
        &mut [
            Item::with_tags("Item1", vec![shared.clone()]),
            Item::with_tags("Item2", vec![shared.clone()]),
        ],
    );

    let items = active_via_item_tags_join(Query::new()).find(&conn).unwrap();

    assert_eq!(items.len(), 2);
    for item in &items {
        assert_eq!(item.tags.len(), 1);
        assert_eq!(item.tags[0].id, shared.id);
    }
    let tag_rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM tags;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(tag_rows, 1);
}

#[test]
fn preload_scope_ordering_is_applied_per_owner() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags(
            "Item1",
            vec![
                Tag::new("Alpha", "active"),
                Tag::new("Charlie", "active"),
                Tag::new("Bravo", "active"),
            ],
        )],
    );

    let items = Query::<Item>::new()
        .preload_with("Tags", |scope| scope.order_by("tags.name", Direction::Desc))
        .find(&conn)
        .unwrap();

    let names: Vec<&str> = items[0].tags.iter().map(|tag| tag.name.as_str()).collect();
    assert_eq!(names, vec!["Charlie", "Bravo", "Alpha"]);
}

#[test]
fn wildcard_preloads_every_relation_of_a_level() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags(
            "Item1",
            vec![Tag::with_sub_tags("Tag1", "active", vec![SubTag::new("SubTag1", "active")])],
        )],
    );

    let items = Query::<Item>::new().preload("Tags.*").find(&conn).unwrap();
    assert_eq!(items[0].tags[0].sub_tags.len(), 1);

    let top_only = Query::<Item>::new().preload("*").find(&conn).unwrap();
    assert_eq!(top_only[0].tags.len(), 1);
    assert!(top_only[0].tags[0].sub_tags.is_empty());
}

#[test]
fn unknown_relation_fails_even_without_rows() {
    let conn = setup_db();

    let err = Query::<Item>::new().preload("Owners").find(&conn).unwrap_err();
    match err {
        QueryError::UnknownRelation { model, relation } => {
            assert_eq!(model, "Item");
            assert_eq!(relation, "Owners");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn tag_queries_preload_sub_tags() {
    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags(
            "Item1",
            vec![
                Tag::with_sub_tags("Tag1", "active", vec![SubTag::new("SubTag1", "active")]),
                Tag::new("Tag2", "inactive"),
            ],
        )],
    );

    let tags = Query::<Tag>::new()
        .where_eq("status", "active")
        .preload("SubTags")
        .find(&conn)
        .unwrap();

    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].sub_tags.len(), 1);
    assert_eq!(tags[0].sub_tags[0].name, "SubTag1");
}

#[test]
fn root_filters_paging_first_and_count() {
    let mut conn = setup_db();
    let mut items: Vec<Item> = (1..=5)
        .map(|idx| {
            let status = if idx % 2 == 0 { "inactive" } else { "active" };
            Item::with_tags(format!("Item{idx}"), vec![Tag::new(format!("Tag{idx}"), status)])
        })
        .collect();
    create_items(&mut conn, &mut items);

    let with_active_tags = Query::<Item>::new()
        .joins("JOIN item_tags ON item_tags.item_id = items.id")
        .joins("JOIN tags ON tags.id = item_tags.tag_id")
        .where_eq("tags.status", "active");
    assert_eq!(with_active_tags.count(&conn).unwrap(), 3);

    let page = with_active_tags
        .clone()
        .preload("Tags")
        .limit(2)
        .offset(1)
        .find(&conn)
        .unwrap();
    let names: Vec<&str> = page.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["Item3", "Item5"]);
    assert!(page.iter().all(|item| item.tags.len() == 1));

    let first = Query::<Item>::new()
        .where_in("name", ["Item4", "Item2"])
        .order_by("items.name", Direction::Desc)
        .first(&conn)
        .unwrap()
        .expect("one item should match");
    assert_eq!(first.name, "Item4");

    let none = Query::<Item>::new()
        .where_eq("name", "missing")
        .first(&conn)
        .unwrap();
    assert!(none.is_none());
    assert_eq!(Query::<Item>::new().count(&conn).unwrap(), 5);
}

#[test]
fn invalid_scope_is_reported_before_execution() {
    let empty = setup_db();
    let err = Query::<Item>::new()
        .preload_with("Tags", |scope| scope.where_sql("status = ? AND name = ?", ["active"]))
        .find(&empty)
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidClause { .. }));

    let nested_err = Query::<Item>::new()
        .preload_with("Tags.SubTags", |scope| scope.joins("JOIN tag_sub_tags ON 1 = ?"))
        .first(&empty)
        .unwrap_err();
    assert!(matches!(nested_err, QueryError::InvalidClause { .. }));

    let mut conn = setup_db();
    create_items(
        &mut conn,
        &mut [Item::with_tags("Item1", vec![Tag::new("Tag1", "active")])],
    );

    let err = Query::<Item>::new()
        .preload_with("Tags", |scope| scope.where_sql("status = ? AND name = ?", ["active"]))
        .find(&conn)
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidClause { .. }));
}
