#![allow(dead_code)]

use restrecord_core::{
    AssociationOptions, HttpClient, HttpRequest, HttpResponse, Method, ModelDef, ModelRegistry,
    Record, RecordOptions, TransportError,
};
use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

/// Scripted in-memory client: answers queued responses in order and records
/// every request. Falls back to `204 No Content` once the queue is empty.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: RefCell<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, data: Value) -> &Self {
        self.responses
            .borrow_mut()
            .push_back(Ok(HttpResponse::ok(data)));
        self
    }

    pub fn respond_empty(&self) -> &Self {
        self.responses
            .borrow_mut()
            .push_back(Ok(HttpResponse::no_content()));
        self
    }

    pub fn fail(&self, error: TransportError) -> &Self {
        self.responses.borrow_mut().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    /// `(method, url)` of every captured request.
    pub fn calls(&self) -> Vec<(Method, String)> {
        self.requests
            .borrow()
            .iter()
            .map(|request| (request.method, request.url.clone()))
            .collect()
    }
}

impl HttpClient for MockHttpClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::no_content()))
    }
}

pub fn props(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object fixture")
}

/// Users belong to a group, own comments and hold roles through user roles.
pub fn registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register(
            ModelDef::builder("Group")
                .plural("Groups")
                .url_root("/api/groups")
                .build(),
        )
        .unwrap();
    registry
        .register(
            ModelDef::builder("User")
                .plural("Users")
                .url_root("/api/users")
                .validate("name", "required", json!(true))
                .belongs_to("Group", AssociationOptions::key("groupId"))
                .has_many("Comment", AssociationOptions::default())
                .has_many(
                    "Role",
                    AssociationOptions::default().with_through("UserRole"),
                )
                .build(),
        )
        .unwrap();
    registry
        .register(
            ModelDef::builder("Comment")
                .plural("Comments")
                .url_root("/api/comments")
                .belongs_to("User", AssociationOptions::key("userId"))
                .build(),
        )
        .unwrap();
    registry
        .register(
            ModelDef::builder("Role")
                .plural("Roles")
                .url_root("/api/roles")
                .build(),
        )
        .unwrap();
    registry
        .register(
            ModelDef::builder("UserRole")
                .plural("UserRoles")
                .url_root("/api/user_roles")
                .belongs_to("User", AssociationOptions::key("userId"))
                .belongs_to("Role", AssociationOptions::key("roleId"))
                .build(),
        )
        .unwrap();
    registry
}

pub fn def(registry: &ModelRegistry, name: &str) -> Arc<ModelDef> {
    registry.require(name).unwrap()
}

/// A record whose properties are its synced state.
pub fn synced(registry: &ModelRegistry, model: &str, value: Value) -> Record {
    Record::with_properties(def(registry, model), props(value), &RecordOptions::default())
}
