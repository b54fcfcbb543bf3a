//! Record: one in-memory instance of a backend entity.
//!
//! # Responsibility
//! - Hold attribute values and the snapshot taken at the last sync.
//! - Compute what changed since that snapshot.
//! - Hold related records in to-one (parent) and to-many (collection) slots.
//! - Resolve nested response data into related records.
//!
//! # Invariants
//! - A record without an identifier value (missing or `null`) is new.
//! - Snapshots are deep copies taken at construction, fetch and save
//!   completion; diffing never compares against anything else.
//! - `local_id` is unique per constructed record and survives cloning, so
//!   copies of an unsaved record still match each other.

use crate::error::{AssociationError, RecordError, RecordResult};
use crate::model::definition::{AssociationDef, AssociationKind, ModelDef};
use crate::model::filter::apply_filters;
use crate::model::naming::{lcfirst, to_camel_case};
use crate::registry::ModelRegistry;
use crate::sync::request::{encode_uri_component, value_to_url_text, SyncOptions};
use crate::validation::ErrorMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static LAST_LOCAL_ID: AtomicU64 = AtomicU64::new(0);

fn next_local_id() -> u64 {
    LAST_LOCAL_ID.fetch_add(1, Ordering::Relaxed) + 1
}

/// Construction options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordOptions {
    /// Run the model parser over the initial properties.
    pub parse: bool,
    /// Apply the model read filters to the initial properties.
    pub read_filters: bool,
    /// Fixed URL for this record, bypassing URL generation.
    pub url: Option<String>,
    /// URL root for this record instead of the model's.
    pub url_root: Option<String>,
}

/// One changed property.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Set(Value),
    /// Present in the snapshot, absent now.
    Removed,
}

/// Properties that differ from the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet(BTreeMap<String, Change>);

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, property: &str) -> bool {
        self.0.contains_key(property)
    }

    pub fn get(&self, property: &str) -> Option<&Change> {
        self.0.get(property)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Change)> {
        self.0.iter()
    }

    /// Values to send to the backend; removals are dropped.
    pub fn into_payload(self) -> Map<String, Value> {
        self.0
            .into_iter()
            .filter_map(|(key, change)| match change {
                Change::Set(value) => Some((key, value)),
                Change::Removed => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    attributes: Map<String, Value>,
    collections: BTreeMap<String, Vec<Record>>,
}

#[derive(Debug, Clone)]
pub struct Record {
    def: Arc<ModelDef>,
    local_id: u64,
    attributes: Map<String, Value>,
    snapshot: Snapshot,
    pub(crate) errors: ErrorMap,
    url: Option<String>,
    url_root: Option<String>,
    parents: BTreeMap<String, Record>,
    collections: BTreeMap<String, Vec<Record>>,
    pending_removals: BTreeMap<String, Vec<Record>>,
}

impl Record {
    /// Creates an empty record with the model defaults applied.
    pub fn new(def: Arc<ModelDef>) -> Self {
        let attributes = def.defaults().clone();
        Self {
            def,
            local_id: next_local_id(),
            attributes,
            snapshot: Snapshot::default(),
            errors: ErrorMap::new(),
            url: None,
            url_root: None,
            parents: BTreeMap::new(),
            collections: BTreeMap::new(),
            pending_removals: BTreeMap::new(),
        }
    }

    /// Creates a record from initial properties, which become the snapshot.
    pub fn with_properties(
        def: Arc<ModelDef>,
        properties: Map<String, Value>,
        options: &RecordOptions,
    ) -> Self {
        let mut record = Self::new(def);
        let mut properties = properties;
        if options.parse {
            if let Value::Object(parsed) = record
                .def
                .parse(Value::Object(properties.clone()), &SyncOptions::default())
            {
                properties = parsed;
            }
        }
        if options.read_filters {
            apply_filters(record.def.read_filters(), &mut properties);
        }
        record.extend(properties.clone());
        record.snapshot.attributes = properties;
        record.url = options.url.clone();
        record.url_root = options.url_root.clone();
        record
    }

    pub fn def(&self) -> &Arc<ModelDef> {
        &self.def
    }

    pub fn model_name(&self) -> &str {
        self.def.name()
    }

    /// Process-unique identity assigned at construction.
    pub fn local_id(&self) -> u64 {
        self.local_id
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    pub fn extend(&mut self, values: Map<String, Value>) -> &mut Self {
        self.attributes.extend(values);
        self
    }

    /// Identifier value; `None` when missing or `null`.
    pub fn id(&self) -> Option<&Value> {
        self.attributes
            .get(self.def.id_attribute())
            .filter(|value| !value.is_null())
    }

    pub fn set_id(&mut self, id: Value) -> &mut Self {
        let key = self.def.id_attribute().to_string();
        self.set(key, id)
    }

    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    /// Whether every given attribute equals the current value.
    pub fn has_attributes(&self, attrs: &Map<String, Value>) -> bool {
        attrs
            .iter()
            .all(|(key, value)| self.attributes.get(key) == Some(value))
    }

    /// Whitelisted attributes, or all attributes when no whitelist exists.
    pub fn get_attributes(&self) -> Map<String, Value> {
        match self.def.attributes() {
            Some(names) => names
                .iter()
                .filter_map(|name| {
                    self.attributes
                        .get(name)
                        .map(|value| (name.clone(), value.clone()))
                })
                .collect(),
            None => self.attributes.clone(),
        }
    }

    pub fn attribute_in_association(&self, name: &str) -> bool {
        self.def.attribute_in_association(name)
    }

    /// Changes since the snapshot, including removed properties.
    pub fn changed_attributes(&self) -> ChangeSet {
        let mut changed = BTreeMap::new();
        for property in self.snapshot.attributes.keys() {
            if !self.attributes.contains_key(property) {
                changed.insert(property.clone(), Change::Removed);
            }
        }
        self.collect_changes(&self.attributes, &mut changed);
        ChangeSet(changed)
    }

    /// Which of `diff`'s properties would change this record.
    pub fn changed_attributes_against(&self, diff: &Map<String, Value>) -> ChangeSet {
        let mut changed = BTreeMap::new();
        self.collect_changes(diff, &mut changed);
        ChangeSet(changed)
    }

    fn collect_changes(
        &self,
        current: &Map<String, Value>,
        changed: &mut BTreeMap<String, Change>,
    ) {
        let whitelist = self.def.attributes();
        for (property, value) in current {
            if property.starts_with('$') || self.attribute_in_association(property) {
                continue;
            }
            if whitelist.is_some_and(|names| !names.iter().any(|name| name == property)) {
                continue;
            }
            if self.snapshot.attributes.get(property) != Some(value) {
                changed.insert(property.clone(), Change::Set(value.clone()));
            }
        }
    }

    pub fn has_changed(&self) -> bool {
        !self.changed_attributes().is_empty()
    }

    pub fn has_property_changed(&self, property: &str) -> bool {
        self.changed_attributes().contains(property)
    }

    /// Snapshot value of `property`.
    pub fn previous(&self, property: &str) -> Option<&Value> {
        self.snapshot.attributes.get(property)
    }

    pub fn previous_attributes(&self) -> &Map<String, Value> {
        &self.snapshot.attributes
    }

    /// Collection members as of the snapshot.
    pub fn previous_collection(&self, slot: &str) -> Option<&[Record]> {
        self.snapshot.collections.get(slot).map(Vec::as_slice)
    }

    /// Makes the current state the new sync baseline.
    pub fn take_snapshot(&mut self) {
        self.snapshot = Snapshot {
            attributes: self.attributes.clone(),
            collections: self.collections.clone(),
        };
    }

    pub(crate) fn snapshot_collections(&mut self) {
        self.snapshot.collections = self.collections.clone();
    }

    /// Puts back collection baselines that were replaced by a save whose
    /// association writes did not complete.
    pub(crate) fn restore_collection_snapshot(
        &mut self,
        collections: BTreeMap<String, Vec<Record>>,
    ) {
        self.snapshot.collections.extend(collections);
    }

    /// Endpoint for this record: `<root>[<resource>]/<encoded id>`.
    pub fn url(&self) -> RecordResult<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let root = self.url_root.as_deref().or(self.def.url_root());
        let root = match (root, self.def.url_resource()) {
            (Some(root), Some(resource)) => Some(format!("{root}{resource}")),
            (Some(root), None) => Some(root.to_string()),
            (None, Some(resource)) => Some(resource.to_string()),
            (None, None) => None,
        };
        let root = root.ok_or_else(|| RecordError::MissingUrl {
            model: self.model_name().to_string(),
        })?;

        match self.id() {
            None => Ok(root),
            Some(id) => {
                let separator = if root.ends_with('/') { "" } else { "/" };
                Ok(format!(
                    "{root}{separator}{}",
                    encode_uri_component(&value_to_url_text(id))
                ))
            }
        }
    }

    pub fn set_url(&mut self, url: Option<String>) {
        self.url = url;
    }

    pub fn parent(&self, slot: &str) -> Option<&Record> {
        self.parents.get(slot)
    }

    pub fn parent_mut(&mut self, slot: &str) -> Option<&mut Record> {
        self.parents.get_mut(slot)
    }

    pub fn parents(&self) -> &BTreeMap<String, Record> {
        &self.parents
    }

    pub fn collection(&self, slot: &str) -> Option<&[Record]> {
        self.collections.get(slot).map(Vec::as_slice)
    }

    pub fn collection_mut(&mut self, slot: &str) -> Option<&mut Vec<Record>> {
        self.collections.get_mut(slot)
    }

    pub fn collections(&self) -> &BTreeMap<String, Vec<Record>> {
        &self.collections
    }

    /// Members taken out with `remove_has_many` since the last save.
    pub fn pending_removals(&self, slot: &str) -> Option<&[Record]> {
        self.pending_removals.get(slot).map(Vec::as_slice)
    }

    pub(crate) fn clear_pending_removals(&mut self) {
        self.pending_removals.clear();
    }

    /// Whether `other` is this record or a copy of it.
    pub fn same_record(&self, other: &Record) -> bool {
        if self.local_id == other.local_id {
            return true;
        }
        matches!((self.id(), other.id()), (Some(a), Some(b)) if a == b)
    }

    fn association_of(
        &self,
        entity: &str,
        kind: AssociationKind,
    ) -> Result<AssociationDef, AssociationError> {
        let assoc = self
            .def
            .association(entity)
            .ok_or_else(|| AssociationError::UnknownAssociation {
                model: self.model_name().to_string(),
                association: entity.to_string(),
            })?;
        if assoc.kind != kind {
            return Err(AssociationError::WrongKind {
                model: self.model_name().to_string(),
                association: entity.to_string(),
            });
        }
        Ok(assoc.clone())
    }

    /// Attaches a persisted parent and copies its identifier into the
    /// foreign key.
    pub fn add_belongs_to(
        &mut self,
        entity: &str,
        parent: Record,
    ) -> Result<&Record, AssociationError> {
        let assoc = self.association_of(entity, AssociationKind::BelongsTo)?;
        let Some(parent_id) = parent.id().cloned() else {
            return Err(AssociationError::NewRecord);
        };
        let key = assoc
            .options
            .key
            .clone()
            .ok_or_else(|| AssociationError::MissingKey {
                model: self.model_name().to_string(),
                association: entity.to_string(),
            })?;

        self.attributes.insert(key, parent_id);
        let slot = assoc.parent_slot();
        self.parents.insert(slot.clone(), parent);
        Ok(&self.parents[&slot])
    }

    /// Stores a parent without requiring it to be persisted; `save`
    /// persists new parents first.
    pub fn set_parent(&mut self, entity: &str, parent: Record) -> Result<(), AssociationError> {
        let assoc = self.association_of(entity, AssociationKind::BelongsTo)?;
        self.parents.insert(assoc.parent_slot(), parent);
        Ok(())
    }

    /// Appends `child` to a has-many collection. With `through`, a join
    /// record built from `related_data` wraps the child.
    pub fn add_has_many(
        &mut self,
        entity: &str,
        child: Record,
        related_data: Option<Map<String, Value>>,
        registry: &ModelRegistry,
    ) -> RecordResult<&mut Self> {
        let assoc = self.association_of(entity, AssociationKind::HasMany)?;
        if !assoc.options.parent_managed && child.is_new() {
            return Err(AssociationError::NewRecord.into());
        }

        let slot = collection_slot(&assoc, registry)?;
        let member = match &assoc.options.through {
            Some(through) => {
                let join_def = registry.require(through)?;
                let mut join = Record::with_properties(
                    join_def,
                    related_data.unwrap_or_default(),
                    &RecordOptions::default(),
                );
                join.add_belongs_to(entity, child)?;
                join
            }
            None => child,
        };

        self.collections.entry(slot).or_default().push(member);
        Ok(self)
    }

    /// Moves a member out of a has-many collection into the pending
    /// removals. Members match by identity, identifier or local identity;
    /// with `through`, the join record holding `child` is removed.
    pub fn remove_has_many(
        &mut self,
        entity: &str,
        child: &Record,
        registry: &ModelRegistry,
    ) -> RecordResult<&mut Self> {
        let assoc = self.association_of(entity, AssociationKind::HasMany)?;
        let slot = collection_slot(&assoc, registry)?;
        let join_slot = match &assoc.options.through {
            Some(through) => {
                let join_def = registry.require(through)?;
                let join_assoc = join_def.association(entity).ok_or_else(|| {
                    AssociationError::UnknownAssociation {
                        model: through.clone(),
                        association: entity.to_string(),
                    }
                })?;
                Some(join_assoc.parent_slot())
            }
            None => None,
        };

        let members = self.collections.entry(slot.clone()).or_default();
        let position = members.iter().position(|member| match &join_slot {
            Some(join_slot) => member
                .parent(join_slot)
                .is_some_and(|held| held.same_record(child)),
            None => member.same_record(child),
        });
        let Some(position) = position else {
            return Err(AssociationError::NotFound.into());
        };

        let removed = members.remove(position);
        self.pending_removals.entry(slot).or_default().push(removed);
        Ok(self)
    }

    /// Merges response data, turning keys that name an association into
    /// related records, then refreshes the snapshot.
    pub fn compute_data(
        &mut self,
        data: Map<String, Value>,
        registry: &ModelRegistry,
    ) -> RecordResult<()> {
        let def = Arc::clone(&self.def);
        for (key, value) in data {
            match resolve_nested(&def, &key, &value, registry)? {
                Some(target) => self.assign_nested(target, value, registry)?,
                None => {
                    self.attributes.insert(key, value);
                }
            }
        }
        self.take_snapshot();
        Ok(())
    }

    fn assign_nested(
        &mut self,
        target: NestedTarget,
        value: Value,
        registry: &ModelRegistry,
    ) -> RecordResult<()> {
        let nested_def = registry.require(&target.model)?;
        match value {
            Value::Array(items) => {
                let mut members = Vec::with_capacity(items.len());
                for item in items {
                    members.push(Record::from_nested(Arc::clone(&nested_def), item, registry)?);
                }
                self.collections.insert(target.slot, members);
            }
            Value::Null => {
                self.parents.remove(&target.slot);
            }
            other => {
                let record = Record::from_nested(nested_def, other, registry)?;
                self.parents.insert(target.slot, record);
            }
        }
        Ok(())
    }

    fn from_nested(
        def: Arc<ModelDef>,
        value: Value,
        registry: &ModelRegistry,
    ) -> RecordResult<Record> {
        let mut record = Record::new(Arc::clone(&def));
        if let Value::Object(map) = def.parse(value, &SyncOptions::default()) {
            record.compute_data(map, registry)?;
        }
        Ok(record)
    }

    pub(crate) fn apply_read_filters(&self, data: &mut Map<String, Value>) {
        apply_filters(self.def.read_filters(), data);
    }

    /// JSON projection: attributes plus related records under their slots.
    pub fn to_json(&self) -> Value {
        let mut object = self.attributes.clone();
        for (slot, parent) in &self.parents {
            object.insert(slot.clone(), parent.to_json());
        }
        for (slot, members) in &self.collections {
            object.insert(
                slot.clone(),
                Value::Array(members.iter().map(Record::to_json).collect()),
            );
        }
        Value::Object(object)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Collection slot of a has-many association:
/// `lcfirst(plural or name)` of the member (or join) model.
pub fn collection_slot(assoc: &AssociationDef, registry: &ModelRegistry) -> RecordResult<String> {
    let member = registry.require(assoc.member_model())?;
    Ok(lcfirst(member.collection_name()))
}

#[derive(Debug)]
struct NestedTarget {
    slot: String,
    model: String,
}

enum NestedMatch {
    Name,
    TargetPlural(String),
    Join(String),
}

fn resolve_nested(
    def: &ModelDef,
    key: &str,
    value: &Value,
    registry: &ModelRegistry,
) -> RecordResult<Option<NestedTarget>> {
    if !matches!(value, Value::Object(_) | Value::Array(_) | Value::Null) {
        return Ok(None);
    }
    let wanted = to_camel_case(key).to_lowercase();

    for assoc in def.associations() {
        let target = registry
            .get(&assoc.name)
            .or_else(|| assoc.options.model.as_deref().and_then(|model| registry.get(model)));

        let singular = assoc.options.singular.as_deref().map(str::to_lowercase);
        let matched = if wanted == assoc.name.to_lowercase()
            || singular.as_deref() == Some(wanted.as_str())
        {
            Some(NestedMatch::Name)
        } else if let Some(plural) = target
            .as_deref()
            .and_then(ModelDef::plural)
            .filter(|plural| plural.to_lowercase() == wanted)
        {
            Some(NestedMatch::TargetPlural(plural.to_string()))
        } else if let Some(through) = &assoc.options.through {
            let join = registry.require(through)?;
            let relation = join.collection_name();
            (relation.to_lowercase() == wanted).then(|| NestedMatch::Join(relation.to_string()))
        } else {
            None
        };

        let Some(matched) = matched else {
            continue;
        };

        let model = match &matched {
            NestedMatch::Join(_) => assoc.options.through.clone().unwrap_or_default(),
            _ => assoc.target_model().to_string(),
        };
        let slot = match (&matched, assoc.kind, value) {
            (_, AssociationKind::BelongsTo, Value::Object(_) | Value::Null) => assoc.parent_slot(),
            (NestedMatch::Join(relation), _, _) => lcfirst(relation),
            (_, AssociationKind::HasMany, _) if assoc.options.through.is_none() => {
                collection_slot(assoc, registry)?
            }
            (NestedMatch::TargetPlural(plural), _, _) => lcfirst(plural),
            (NestedMatch::Name, _, _) => lcfirst(&assoc.name),
        };
        return Ok(Some(NestedTarget { slot, model }));
    }

    Ok(None)
}
