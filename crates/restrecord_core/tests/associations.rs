mod common;

use common::{def, props, registry, synced, MockHttpClient};
use restrecord_core::{
    AssociationOptions, Method, ModelDef, ModelRegistry, Record, RecordError, RecordService,
    SyncOptions, TransportError,
};
use serde_json::json;

fn posts_registry(comments: AssociationOptions) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register(
            ModelDef::builder("Post")
                .plural("Posts")
                .url_root("/api/posts")
                .has_many("Comment", comments)
                .build(),
        )
        .unwrap();
    registry
        .register(
            ModelDef::builder("Comment")
                .plural("Comments")
                .url_root("/api/comments")
                .belongs_to("Post", AssociationOptions::key("postId"))
                .build(),
        )
        .unwrap();
    registry
}

fn post_with_comments(registry: &ModelRegistry, ids: &[u64]) -> Record {
    let comments = ids
        .iter()
        .map(|id| json!({"id": id, "body": format!("comment {id}")}))
        .collect::<Vec<_>>();
    let mut post = Record::new(def(registry, "Post"));
    post.compute_data(props(json!({"id": 1, "comments": comments})), registry)
        .unwrap();
    post
}

#[test]
fn new_parents_are_saved_before_the_record() {
    let mock = MockHttpClient::new();
    mock.respond(json!({"id": 9})).respond(json!({"id": 1}));
    let service = RecordService::new(&mock, registry());

    let mut group = Record::new(def(service.registry(), "Group"));
    group.set("title", json!("Admins"));
    let mut user = Record::new(def(service.registry(), "User"));
    user.set("name", json!("Ann"));
    user.set_parent("Group", group).unwrap();

    service.save(&mut user, None, SyncOptions::default()).unwrap();

    assert_eq!(
        mock.calls(),
        vec![
            (Method::Post, "/api/groups".to_string()),
            (Method::Post, "/api/users".to_string()),
        ]
    );
    assert_eq!(mock.requests()[0].data, Some(json!({"title": "Admins"})));
    assert_eq!(
        mock.requests()[1].data,
        Some(json!({"name": "Ann", "groupId": 9}))
    );
    assert_eq!(user.parent("group").and_then(Record::id), Some(&json!(9)));
}

#[test]
fn parent_without_identifier_after_save_fails_the_save() {
    let mock = MockHttpClient::new();
    mock.respond_empty();
    let service = RecordService::new(&mock, registry());

    let mut user = Record::new(def(service.registry(), "User"));
    user.set("name", json!("Ann"));
    user.set_parent("Group", Record::new(def(service.registry(), "Group")))
        .unwrap();

    let err = service
        .save(&mut user, None, SyncOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        RecordError::AssociationNotPersisted { ref association } if association == "Group"
    ));
    assert_eq!(mock.requests().len(), 1);
}

#[test]
fn save_orders_parents_self_then_children() {
    let mock = MockHttpClient::new();
    mock.respond(json!({"id": 9}))
        .respond(json!({"id": 1}))
        .respond(json!({"id": 5, "body": "edited", "userId": 1}));
    let service = RecordService::new(&mock, registry());

    let mut user = Record::new(def(service.registry(), "User"));
    user.set("name", json!("Ann"));
    user.set_parent("Group", Record::new(def(service.registry(), "Group")))
        .unwrap();
    let comment = synced(service.registry(), "Comment", json!({"id": 5, "body": "draft"}));
    user.add_has_many("Comment", comment, None, service.registry())
        .unwrap();
    user.collection_mut("comments").unwrap()[0].set("body", json!("edited"));

    service.save(&mut user, None, SyncOptions::default()).unwrap();

    assert_eq!(
        mock.calls(),
        vec![
            (Method::Post, "/api/groups".to_string()),
            (Method::Post, "/api/users".to_string()),
            (Method::Put, "/api/comments/5".to_string()),
        ]
    );
    assert_eq!(
        mock.requests()[2].data,
        Some(json!({"body": "edited", "userId": 1}))
    );
    let saved = &user.collection("comments").unwrap()[0];
    assert!(!saved.has_changed());
    assert_eq!(user.previous_collection("comments").map(<[Record]>::len), Some(1));
}

#[test]
fn unchanged_children_are_not_saved() {
    let mock = MockHttpClient::new();
    let service = RecordService::new(&mock, registry());

    let mut user = synced(service.registry(), "User", json!({"id": 1, "name": "Ann"}));
    let comment = synced(service.registry(), "Comment", json!({"id": 6, "body": "kept"}));
    user.add_has_many("Comment", comment, None, service.registry())
        .unwrap();

    service.save(&mut user, None, SyncOptions::default()).unwrap();
    assert_eq!(mock.calls(), vec![(Method::Put, "/api/users/1".to_string())]);
    assert_eq!(mock.requests()[0].data, Some(json!({})));
}

#[test]
fn removed_members_are_deleted_one_by_one() {
    let registry = posts_registry(AssociationOptions::default());
    let mock = MockHttpClient::new();
    let service = RecordService::new(&mock, registry);

    let mut post = post_with_comments(service.registry(), &[5, 6]);
    let removed = post.collection("comments").unwrap()[1].clone();
    post.remove_has_many("Comment", &removed, service.registry())
        .unwrap();

    service.save(&mut post, None, SyncOptions::default()).unwrap();
    assert_eq!(
        mock.calls(),
        vec![
            (Method::Put, "/api/posts/1".to_string()),
            (Method::Delete, "/api/posts/1/comments/6".to_string()),
        ]
    );
    assert!(post.pending_removals("comments").is_none());
    assert_eq!(post.previous_collection("comments").map(<[Record]>::len), Some(1));

    service.save(&mut post, None, SyncOptions::default()).unwrap();
    assert_eq!(mock.requests().len(), 3);
    assert_eq!(mock.calls()[2].0, Method::Put);
}

#[test]
fn failed_removal_is_retried_on_the_next_save() {
    let registry = posts_registry(AssociationOptions::default());
    let mock = MockHttpClient::new();
    mock.respond_empty()
        .fail(TransportError::Network("connection reset".to_string()));
    let service = RecordService::new(&mock, registry);

    let mut post = post_with_comments(service.registry(), &[5, 6]);
    let removed = post.collection("comments").unwrap()[1].clone();
    post.remove_has_many("Comment", &removed, service.registry())
        .unwrap();

    let err = service
        .save(&mut post, None, SyncOptions::default())
        .unwrap_err();
    assert!(matches!(err, RecordError::Transport(TransportError::Network(_))));
    assert_eq!(post.previous_collection("comments").map(<[Record]>::len), Some(2));

    service.save(&mut post, None, SyncOptions::default()).unwrap();
    assert_eq!(
        mock.calls(),
        vec![
            (Method::Put, "/api/posts/1".to_string()),
            (Method::Delete, "/api/posts/1/comments/6".to_string()),
            (Method::Put, "/api/posts/1".to_string()),
            (Method::Delete, "/api/posts/1/comments/6".to_string()),
        ]
    );
    assert_eq!(post.previous_collection("comments").map(<[Record]>::len), Some(1));
}

#[test]
fn children_are_not_sent_when_the_parent_gets_no_identifier() {
    let mock = MockHttpClient::new();
    mock.respond_empty();
    let service = RecordService::new(&mock, registry());

    let mut user = Record::new(def(service.registry(), "User"));
    user.set("name", json!("Ann"));
    let comment = synced(service.registry(), "Comment", json!({"id": 5, "body": "hi"}));
    user.add_has_many("Comment", comment, None, service.registry())
        .unwrap();
    user.collection_mut("comments").unwrap()[0].set("body", json!("edited"));

    let err = service
        .save(&mut user, None, SyncOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        RecordError::ParentNotPersisted { ref model } if model == "User"
    ));
    assert_eq!(mock.calls(), vec![(Method::Post, "/api/users".to_string())]);
    assert!(user.collection("comments").unwrap()[0].has_changed());
}

#[test]
fn batched_removals_use_one_request() {
    let registry = posts_registry(AssociationOptions::default().batched());
    let mock = MockHttpClient::new();
    let service = RecordService::new(&mock, registry);

    let mut post = post_with_comments(service.registry(), &[1, 2, 3]);
    let members = post.collection("comments").unwrap().to_vec();
    post.remove_has_many("Comment", &members[0], service.registry())
        .unwrap();
    post.remove_has_many("Comment", &members[2], service.registry())
        .unwrap();

    service.save(&mut post, None, SyncOptions::default()).unwrap();
    assert_eq!(
        mock.calls(),
        vec![
            (Method::Put, "/api/posts/1".to_string()),
            (
                Method::Delete,
                "/api/posts/1/comments?ids[]=1&ids[]=3".to_string()
            ),
        ]
    );
}

#[test]
fn parent_managed_members_send_no_requests() {
    let registry = posts_registry(AssociationOptions::default().parent_managed());
    let mock = MockHttpClient::new();
    let service = RecordService::new(&mock, registry);

    let mut post = post_with_comments(service.registry(), &[1]);
    let fresh = Record::new(def(service.registry(), "Comment"));
    post.add_has_many("Comment", fresh, None, service.registry())
        .unwrap();
    let first = post.collection("comments").unwrap()[0].clone();
    post.remove_has_many("Comment", &first, service.registry())
        .unwrap();

    service.save(&mut post, None, SyncOptions::default()).unwrap();
    assert_eq!(mock.calls(), vec![(Method::Put, "/api/posts/1".to_string())]);
}

#[test]
fn children_need_an_inverse_belongs_to() {
    let mut registry = ModelRegistry::new();
    registry
        .register(
            ModelDef::builder("Author")
                .url_root("/api/authors")
                .has_many("Book", AssociationOptions::default())
                .build(),
        )
        .unwrap();
    registry
        .register(ModelDef::builder("Book").url_root("/api/books").build())
        .unwrap();
    let mock = MockHttpClient::new();
    let service = RecordService::new(&mock, registry);

    let mut author = synced(service.registry(), "Author", json!({"id": 1}));
    let book = synced(service.registry(), "Book", json!({"id": 2}));
    author
        .add_has_many("Book", book, None, service.registry())
        .unwrap();
    author.collection_mut("book").unwrap()[0].set("title", json!("Dune"));

    let err = service
        .save(&mut author, None, SyncOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        RecordError::MissingInverseAssociation { ref model, ref parent }
            if model == "Book" && parent == "Author"
    ));
}

#[test]
fn join_records_are_created_with_both_keys() {
    let mock = MockHttpClient::new();
    mock.respond_empty().respond(json!({"id": 70}));
    let service = RecordService::new(&mock, registry());

    let mut user = synced(service.registry(), "User", json!({"id": 1, "name": "Ann"}));
    let role = synced(service.registry(), "Role", json!({"id": 2}));
    user.add_has_many("Role", role, Some(props(json!({"level": 3}))), service.registry())
        .unwrap();

    service.save(&mut user, None, SyncOptions::default()).unwrap();

    assert_eq!(
        mock.calls(),
        vec![
            (Method::Put, "/api/users/1".to_string()),
            (Method::Post, "/api/user_roles".to_string()),
        ]
    );
    assert_eq!(
        mock.requests()[1].data,
        Some(json!({"level": 3, "roleId": 2, "userId": 1}))
    );
    assert_eq!(
        user.collection("userRoles").unwrap()[0].id(),
        Some(&json!(70))
    );
}

#[test]
fn removed_join_records_are_deleted_under_the_parent() {
    let mock = MockHttpClient::new();
    let service = RecordService::new(&mock, registry());

    let mut user = Record::new(def(service.registry(), "User"));
    user.compute_data(
        props(json!({
            "id": 1,
            "name": "Ann",
            "userRoles": [{"id": 70, "role": {"id": 2}}]
        })),
        service.registry(),
    )
    .unwrap();
    let role = synced(service.registry(), "Role", json!({"id": 2}));
    user.remove_has_many("Role", &role, service.registry())
        .unwrap();

    service.save(&mut user, None, SyncOptions::default()).unwrap();
    assert_eq!(
        mock.calls()[1],
        (Method::Delete, "/api/users/1/userRoles/70".to_string())
    );
}
