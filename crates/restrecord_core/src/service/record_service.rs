//! Record lifecycle service.
//!
//! # Responsibility
//! - Fetch, save and destroy records through the injected HTTP client.
//! - Persist association graphs in dependency order: belongs-to parents,
//!   then the record itself, then has-many children.
//! - Reconcile removed collection members against the prior snapshot.
//!
//! # Invariants
//! - A record is only sent after it validates.
//! - Snapshots are refreshed only after a successful backend response.
//! - Transport errors surface unchanged.

use crate::error::{
    AssociationError, RecordError, RecordResult, INVALID_COLLECTION_RESPONSE,
    INVALID_RECORD_RESPONSE,
};
use crate::model::definition::{AssociationDef, AssociationKind, ModelDef};
use crate::model::filter::apply_filters;
use crate::model::naming::lcfirst;
use crate::model::record::{collection_slot, Record, RecordOptions};
use crate::registry::ModelRegistry;
use crate::sync::http::HttpClient;
use crate::sync::request::{
    build_request, encode_uri_component, send, value_to_url_text, Operation, SyncOptions,
};
use log::{info, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of `fetch_all`.
#[derive(Debug, Clone)]
pub enum Collection {
    /// The backend answered with a plain array.
    List(Vec<Record>),
    /// The backend answered with `{meta: {count}, data: [...]}`.
    Page { count: u64, records: Vec<Record> },
}

impl Collection {
    pub fn records(&self) -> &[Record] {
        match self {
            Self::List(records) | Self::Page { records, .. } => records,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::List(records) | Self::Page { records, .. } => records,
        }
    }

    /// Backend-reported total, for paginated responses.
    pub fn total(&self) -> Option<u64> {
        match self {
            Self::List(_) => None,
            Self::Page { count, .. } => Some(*count),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

/// Lifecycle entry points over a client and a model registry.
#[derive(Debug)]
pub struct RecordService<C: HttpClient> {
    client: C,
    registry: ModelRegistry,
}

impl<C: HttpClient> RecordService<C> {
    pub fn new(client: C, registry: ModelRegistry) -> Self {
        Self { client, registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Builds a record of a registered model.
    pub fn build(
        &self,
        model: &str,
        properties: Map<String, Value>,
        options: &RecordOptions,
    ) -> RecordResult<Record> {
        let def = self.registry.require(model)?;
        Ok(Record::with_properties(def, properties, options))
    }

    /// (Re)loads `record` from the backend.
    pub fn fetch(&self, record: &mut Record, options: SyncOptions) -> RecordResult<()> {
        let request = build_request(Operation::Read, &options, || record.url())?;
        let response = send(&self.client, Operation::Read, &request)?;

        let Value::Object(mut data) = record.def().parse(response.data, &options) else {
            warn!(
                "event=record_fetch module=service status=error model={} \
                 error_code=invalid_response",
                record.model_name()
            );
            return Err(RecordError::InvalidResponse(INVALID_RECORD_RESPONSE));
        };

        record.apply_read_filters(&mut data);
        record.compute_data(data, &self.registry)?;
        record.validate();
        record.take_snapshot();
        info!(
            "event=record_fetch module=service status=ok model={} valid={}",
            record.model_name(),
            record.is_valid()
        );
        Ok(())
    }

    /// Sets one attribute, then saves.
    pub fn save_field(
        &self,
        record: &mut Record,
        name: &str,
        value: Value,
        options: SyncOptions,
    ) -> RecordResult<()> {
        let mut values = Map::new();
        values.insert(name.to_string(), value);
        self.save(record, Some(values), options)
    }

    /// Validates and persists `record` together with its association graph.
    ///
    /// New records are created with every attribute, persisted ones are
    /// updated with their changed attributes only.
    pub fn save(
        &self,
        record: &mut Record,
        values: Option<Map<String, Value>>,
        mut options: SyncOptions,
    ) -> RecordResult<()> {
        if let Some(values) = values {
            record.extend(values);
        }

        if !record.validate() {
            warn!(
                "event=record_save module=service status=rejected model={} invalid_fields={}",
                record.model_name(),
                record.errors().len()
            );
            return Err(RecordError::Validation(record.errors().clone()));
        }

        self.save_parents(record)?;

        let operation = if record.is_new() {
            Operation::Create
        } else {
            Operation::Update
        };
        if options.data.is_none() {
            let mut payload = match operation {
                Operation::Create => record.attributes().clone(),
                _ => record.changed_attributes().into_payload(),
            };
            payload.retain(|key, _| !record.attribute_in_association(key));
            apply_filters(record.def().write_filters(), &mut payload);
            options.data = Some(Value::Object(payload));
        }

        let prior_collections = record_collections_snapshot(record);
        let request = build_request(operation, &options, || record.url())?;
        let response = send(&self.client, operation, &request)?;

        match record.def().parse(response.data, &options) {
            Value::Object(mut data) => {
                record.apply_read_filters(&mut data);
                record.compute_data(data, &self.registry)?;
            }
            _ => record.take_snapshot(),
        }

        if let Err(err) = self.save_children(record, &prior_collections) {
            record.restore_collection_snapshot(prior_collections);
            warn!(
                "event=record_save module=service status=error model={} stage=children",
                record.model_name()
            );
            return Err(err);
        }
        record.snapshot_collections();
        record.clear_pending_removals();

        info!(
            "event=record_save module=service status=ok model={} operation={}",
            record.model_name(),
            operation.as_str()
        );
        Ok(())
    }

    /// Deletes `record` on the backend; new records need no request.
    pub fn destroy(&self, record: &Record, options: SyncOptions) -> RecordResult<()> {
        if record.is_new() {
            return Ok(());
        }
        let request = build_request(Operation::Delete, &options, || record.url())?;
        send(&self.client, Operation::Delete, &request)?;
        info!(
            "event=record_destroy module=service status=ok model={}",
            record.model_name()
        );
        Ok(())
    }

    /// Loads a single record by identifier.
    pub fn fetch_one(&self, model: &str, id: Value, options: SyncOptions) -> RecordResult<Record> {
        let mut record = Record::new(self.registry.require(model)?);
        record.set_id(id);
        self.fetch(&mut record, options)?;
        Ok(record)
    }

    /// Loads a collection from the model URL.
    pub fn fetch_all(&self, model: &str, options: SyncOptions) -> RecordResult<Collection> {
        let def = self.registry.require(model)?;
        let blank = Record::new(Arc::clone(&def));
        let request = build_request(Operation::Read, &options, || blank.url())?;
        let response = send(&self.client, Operation::Read, &request)?;

        let collection = match def.parse(response.data, &options) {
            Value::Array(items) => Collection::List(self.hydrate_all(&def, items)?),
            Value::Object(mut envelope) => {
                let count = envelope
                    .get("meta")
                    .and_then(|meta| meta.get("count"))
                    .and_then(parse_count);
                match (count, envelope.remove("data")) {
                    (Some(count), Some(Value::Array(items))) => Collection::Page {
                        count,
                        records: self.hydrate_all(&def, items)?,
                    },
                    _ => return Err(invalid_collection(&def)),
                }
            }
            _ => return Err(invalid_collection(&def)),
        };

        info!(
            "event=record_fetch_all module=service status=ok model={} count={}",
            def.name(),
            collection.len()
        );
        Ok(collection)
    }

    /// Deletes persisted `records` with one request carrying `ids[]` query
    /// extensions. Nothing is sent when no record has an identifier.
    pub fn destroy_all(
        &self,
        model: &str,
        records: &[Record],
        mut options: SyncOptions,
    ) -> RecordResult<()> {
        let def = self.registry.require(model)?;
        let ids = records
            .iter()
            .filter_map(|record| record.id().cloned())
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return Ok(());
        }

        let count = ids.len();
        options.filters.insert("ids".to_string(), Value::Array(ids));
        let blank = Record::new(Arc::clone(&def));
        let request = build_request(Operation::Delete, &options, || blank.url())?;
        send(&self.client, Operation::Delete, &request)?;
        info!(
            "event=record_destroy_all module=service status=ok model={} count={count}",
            def.name()
        );
        Ok(())
    }

    fn hydrate_all(&self, def: &Arc<ModelDef>, items: Vec<Value>) -> RecordResult<Vec<Record>> {
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let mut record = Record::new(Arc::clone(def));
            if let Value::Object(mut data) = item {
                apply_filters(def.read_filters(), &mut data);
                record.compute_data(data, &self.registry)?;
            }
            record.validate();
            records.push(record);
        }
        Ok(records)
    }

    fn save_parents(&self, record: &mut Record) -> RecordResult<()> {
        let def = Arc::clone(record.def());
        for assoc in belongs_to(&def) {
            let slot = assoc.parent_slot();
            let Some(parent) = record.parent_mut(&slot) else {
                continue;
            };
            if parent.is_new() {
                self.save(parent, None, SyncOptions::default())?;
                if parent.is_new() {
                    return Err(RecordError::AssociationNotPersisted {
                        association: assoc.name.clone(),
                    });
                }
            }
            let parent_id = parent.id().cloned();
            if let (Some(key), Some(parent_id)) = (&assoc.options.key, parent_id) {
                record.set(key.clone(), parent_id);
            }
        }
        Ok(())
    }

    fn save_children(
        &self,
        record: &mut Record,
        prior_collections: &BTreeMap<String, Vec<Record>>,
    ) -> RecordResult<()> {
        let def = Arc::clone(record.def());
        let parent_id = record.id().cloned();

        for assoc in def
            .associations()
            .iter()
            .filter(|assoc| assoc.kind == AssociationKind::HasMany && !assoc.options.parent_managed)
        {
            let slot = collection_slot(assoc, &self.registry)?;
            let Some(current) = record.collection(&slot) else {
                continue;
            };
            if parent_id.is_none()
                && current
                    .iter()
                    .any(|member| member.is_new() || member.has_changed())
            {
                return Err(RecordError::ParentNotPersisted {
                    model: def.name().to_string(),
                });
            }

            let removed = prior_collections
                .get(&slot)
                .map(|previous| removed_members(previous, current))
                .unwrap_or_default();
            if !removed.is_empty() {
                let base = self.nested_url(record, assoc)?;
                self.destroy_removed(assoc, &base, &removed)?;
            }

            let Some(members) = record.collection_mut(&slot) else {
                continue;
            };
            for member in members.iter_mut() {
                if !member.is_new() && !member.has_changed() {
                    continue;
                }
                let key = inverse_key(member, def.name())?;
                if let Some(parent_id) = &parent_id {
                    member.set(key, parent_id.clone());
                }
                self.save(member, None, SyncOptions::default())?;
                if member.is_new() {
                    return Err(RecordError::AssociationNotPersisted {
                        association: assoc.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn destroy_removed(
        &self,
        assoc: &AssociationDef,
        base: &str,
        removed: &[Record],
    ) -> RecordResult<()> {
        if assoc.options.batch {
            return self.destroy_all(assoc.member_model(), removed, SyncOptions::with_url(base));
        }
        for member in removed {
            let Some(id) = member.id() else {
                continue;
            };
            let url = format!("{base}/{}", encode_uri_component(&value_to_url_text(id)));
            self.destroy(member, SyncOptions::with_url(url))?;
        }
        Ok(())
    }

    /// `<record url>/<resource>` where the resource is the member model's
    /// URL resource, else its collection slot name.
    ///
    /// The member (or join) model's naming is used on purpose instead of the
    /// association key, so nested paths match that model's own endpoints.
    fn nested_url(&self, record: &Record, assoc: &AssociationDef) -> RecordResult<String> {
        let member = self.registry.require(assoc.member_model())?;
        let resource = match member.url_resource() {
            Some(resource) => resource.to_string(),
            None => lcfirst(member.collection_name()),
        };
        let base = record.url()?;
        if base.ends_with('/') || resource.starts_with('/') {
            Ok(format!("{base}{resource}"))
        } else {
            Ok(format!("{base}/{resource}"))
        }
    }
}

fn belongs_to(def: &ModelDef) -> impl Iterator<Item = &AssociationDef> {
    def.associations()
        .iter()
        .filter(|assoc| assoc.kind == AssociationKind::BelongsTo)
}

fn record_collections_snapshot(record: &Record) -> BTreeMap<String, Vec<Record>> {
    record
        .collections()
        .keys()
        .filter_map(|slot| {
            record
                .previous_collection(slot)
                .map(|members| (slot.clone(), members.to_vec()))
        })
        .collect()
}

/// Persisted members of `previous` whose identifier left `current`.
fn removed_members(previous: &[Record], current: &[Record]) -> Vec<Record> {
    previous
        .iter()
        .filter(|old| {
            old.id().is_some_and(|old_id| {
                !current
                    .iter()
                    .any(|member| member.id() == Some(old_id))
            })
        })
        .cloned()
        .collect()
}

/// Foreign key of `member`'s belongs-to association back to `parent_model`.
fn inverse_key(member: &Record, parent_model: &str) -> RecordResult<String> {
    let inverse = member
        .def()
        .association(parent_model)
        .filter(|assoc| assoc.kind == AssociationKind::BelongsTo)
        .ok_or_else(|| RecordError::MissingInverseAssociation {
            model: member.model_name().to_string(),
            parent: parent_model.to_string(),
        })?;
    inverse.options.key.clone().ok_or_else(|| {
        AssociationError::MissingKey {
            model: member.model_name().to_string(),
            association: parent_model.to_string(),
        }
        .into()
    })
}

fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn invalid_collection(def: &ModelDef) -> RecordError {
    warn!(
        "event=record_fetch_all module=service status=error model={} error_code=invalid_response",
        def.name()
    );
    RecordError::InvalidResponse(INVALID_COLLECTION_RESPONSE)
}
