//! Purpose: Catalog entry shapes (record, node, container, dataset, location).
//! Exports: `Record`, `Node`, `Container`, `Dataset`, `DatasetLocation`, `Entity`,
//!          `CatalogRecord`, `CatalogNode`, `ContainerKind`, `validate_create_fields`.
//! Role: Immutable-by-construction attribute bags; the codec reads and builds them.
//! Invariants: Builders drop falsy values, so a present field is always truthy.
//! Invariants: Extra fields never shadow a named field and never hold `_type`.
use super::error::{Error, ErrorKind};
use super::metadata::{Metadata, Truthy};
use super::tags::EntityKind;
use serde_json::{Map, Value};

pub(crate) const TYPE_KEY: &str = "_type";

pub(crate) const CONTAINER_FIELDS: &[&str] = &["pk", "path", "name", "parentPk", "metadata"];
pub(crate) const DATASET_FIELDS: &[&str] = &[
    "pk",
    "path",
    "name",
    "parentPk",
    "dataType",
    "fileFormat",
    "metadata",
    "versionId",
    "processInstance",
    "taskName",
    "versionMetadata",
    "locations",
];
pub(crate) const LOCATION_FIELDS: &[&str] = &["pk", "path", "site", "resource", "metadata"];

fn keep<T: Truthy>(value: T) -> Option<T> {
    value.is_truthy().then_some(value)
}

fn insert_extra(extra: &mut Map<String, Value>, named: &[&str], key: String, value: Value) {
    if key == TYPE_KEY || named.contains(&key.as_str()) || !value.is_truthy() {
        return;
    }
    extra.insert(key, value);
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pk: Option<i64>,
    path: Option<String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    record: Record,
    name: Option<String>,
    parent_pk: Option<i64>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Accessors and builders for the base record fields.
pub trait CatalogRecord {
    fn record(&self) -> &Record;
    fn record_mut(&mut self) -> &mut Record;

    fn pk(&self) -> Option<i64> {
        self.record().pk
    }

    fn path(&self) -> Option<&str> {
        self.record().path.as_deref()
    }

    fn with_pk(mut self, pk: i64) -> Self
    where
        Self: Sized,
    {
        self.record_mut().pk = keep(pk);
        self
    }

    fn with_path(mut self, path: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.record_mut().path = keep(path.into());
        self
    }
}

/// Accessors and builders for named, parented catalog nodes.
pub trait CatalogNode: CatalogRecord {
    fn node(&self) -> &Node;
    fn node_mut(&mut self) -> &mut Node;

    fn name(&self) -> Option<&str> {
        self.node().name.as_deref()
    }

    fn parent_pk(&self) -> Option<i64> {
        self.node().parent_pk
    }

    fn with_name(mut self, name: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.node_mut().name = keep(name.into());
        self
    }

    fn with_parent_pk(mut self, parent_pk: i64) -> Self
    where
        Self: Sized,
    {
        self.node_mut().parent_pk = keep(parent_pk);
        self
    }
}

impl CatalogRecord for Record {
    fn record(&self) -> &Record {
        self
    }

    fn record_mut(&mut self) -> &mut Record {
        self
    }
}

impl CatalogRecord for Node {
    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

impl CatalogNode for Node {
    fn node(&self) -> &Node {
        self
    }

    fn node_mut(&mut self) -> &mut Node {
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContainerKind {
    Folder,
    Group,
}

impl ContainerKind {
    pub fn entity_kind(self) -> EntityKind {
        match self {
            ContainerKind::Folder => EntityKind::Folder,
            ContainerKind::Group => EntityKind::Group,
        }
    }
}

/// Folder or group body. The two differ only by wire tag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Container {
    node: Node,
    metadata: Option<Metadata>,
    extra: Map<String, Value>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = keep(metadata);
        self
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Attach an unnamed field. Ignored for `_type`, named fields and falsy values.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        insert_extra(&mut self.extra, CONTAINER_FIELDS, key.into(), value.into());
        self
    }
}

impl CatalogRecord for Container {
    fn record(&self) -> &Record {
        &self.node.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.node.record
    }
}

impl CatalogNode for Container {
    fn node(&self) -> &Node {
        &self.node
    }

    fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetLocation {
    record: Record,
    site: Option<String>,
    resource: Option<String>,
    metadata: Option<Metadata>,
    extra: Map<String, Value>,
}

impl DatasetLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = keep(site.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = keep(resource.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = keep(metadata);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        insert_extra(&mut self.extra, LOCATION_FIELDS, key.into(), value.into());
        self
    }
}

impl CatalogRecord for DatasetLocation {
    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    node: Node,
    data_type: Option<String>,
    file_format: Option<String>,
    metadata: Option<Metadata>,
    version_id: Option<i64>,
    process_instance: Option<i64>,
    task_name: Option<String>,
    version_metadata: Option<Metadata>,
    locations: Vec<DatasetLocation>,
    extra: Map<String, Value>,
}

impl Dataset {
    /// Field names accepted in a create-dataset request body.
    pub const REQ_JSON_ALLOWED: [&'static str; 10] = [
        "name",
        "path",
        "dataType",
        "fileFormat",
        "metadata",
        "versionId",
        "processInstance",
        "taskName",
        "versionMetadata",
        "locations",
    ];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_type(&self) -> Option<&str> {
        self.data_type.as_deref()
    }

    pub fn file_format(&self) -> Option<&str> {
        self.file_format.as_deref()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn version_id(&self) -> Option<i64> {
        self.version_id
    }

    pub fn process_instance(&self) -> Option<i64> {
        self.process_instance
    }

    pub fn task_name(&self) -> Option<&str> {
        self.task_name.as_deref()
    }

    pub fn version_metadata(&self) -> Option<&Metadata> {
        self.version_metadata.as_ref()
    }

    pub fn locations(&self) -> &[DatasetLocation] {
        &self.locations
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = keep(data_type.into());
        self
    }

    pub fn with_file_format(mut self, file_format: impl Into<String>) -> Self {
        self.file_format = keep(file_format.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = keep(metadata);
        self
    }

    pub fn with_version_id(mut self, version_id: i64) -> Self {
        self.version_id = keep(version_id);
        self
    }

    pub fn with_process_instance(mut self, process_instance: i64) -> Self {
        self.process_instance = keep(process_instance);
        self
    }

    pub fn with_task_name(mut self, task_name: impl Into<String>) -> Self {
        self.task_name = keep(task_name.into());
        self
    }

    pub fn with_version_metadata(mut self, metadata: Metadata) -> Self {
        self.version_metadata = keep(metadata);
        self
    }

    pub fn with_locations(mut self, locations: Vec<DatasetLocation>) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_location(mut self, location: DatasetLocation) -> Self {
        self.locations.push(location);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        insert_extra(&mut self.extra, DATASET_FIELDS, key.into(), value.into());
        self
    }
}

impl CatalogRecord for Dataset {
    fn record(&self) -> &Record {
        &self.node.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.node.record
    }
}

impl CatalogNode for Dataset {
    fn node(&self) -> &Node {
        &self.node
    }

    fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }
}

/// Reject keys a create-dataset request may not carry.
pub fn validate_create_fields(body: &Map<String, Value>) -> Result<(), Error> {
    let rejected: Vec<&str> = body
        .keys()
        .map(String::as_str)
        .filter(|key| !Dataset::REQ_JSON_ALLOWED.contains(key))
        .collect();
    if rejected.is_empty() {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Usage)
        .with_message(format!(
            "fields not allowed when creating a dataset: {}",
            rejected.join(", ")
        ))
        .with_field(rejected[0])
        .with_hint(format!(
            "allowed fields: {}",
            Dataset::REQ_JSON_ALLOWED.join(", ")
        )))
}

/// A catalog entry together with its wire tag.
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    Dataset(Dataset),
    Folder(Container),
    Group(Container),
    Location(DatasetLocation),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Dataset(_) => EntityKind::Dataset,
            Entity::Folder(_) => EntityKind::Folder,
            Entity::Group(_) => EntityKind::Group,
            Entity::Location(_) => EntityKind::Location,
        }
    }

    pub fn as_dataset(&self) -> Option<&Dataset> {
        match self {
            Entity::Dataset(dataset) => Some(dataset),
            _ => None,
        }
    }

    pub fn into_dataset(self) -> Option<Dataset> {
        match self {
            Entity::Dataset(dataset) => Some(dataset),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Entity::Folder(container) | Entity::Group(container) => Some(container),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<&DatasetLocation> {
        match self {
            Entity::Location(location) => Some(location),
            _ => None,
        }
    }
}

impl CatalogRecord for Entity {
    fn record(&self) -> &Record {
        match self {
            Entity::Dataset(dataset) => dataset.record(),
            Entity::Folder(container) | Entity::Group(container) => container.record(),
            Entity::Location(location) => location.record(),
        }
    }

    fn record_mut(&mut self) -> &mut Record {
        match self {
            Entity::Dataset(dataset) => dataset.record_mut(),
            Entity::Folder(container) | Entity::Group(container) => container.record_mut(),
            Entity::Location(location) => location.record_mut(),
        }
    }
}

impl From<Dataset> for Entity {
    fn from(dataset: Dataset) -> Self {
        Entity::Dataset(dataset)
    }
}

impl From<DatasetLocation> for Entity {
    fn from(location: DatasetLocation) -> Self {
        Entity::Location(location)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CatalogNode, CatalogRecord, Container, Dataset, DatasetLocation, Entity,
        validate_create_fields,
    };
    use crate::core::error::ErrorKind;
    use crate::core::metadata::Metadata;
    use serde_json::{Map, json};

    #[test]
    fn builders_drop_falsy_values() {
        let dataset = Dataset::new()
            .with_pk(0)
            .with_name("")
            .with_version_id(0)
            .with_data_type("")
            .with_metadata(Metadata::new())
            .with_path("/EXO/Data/run1");
        assert_eq!(dataset.pk(), None);
        assert_eq!(dataset.name(), None);
        assert_eq!(dataset.version_id(), None);
        assert_eq!(dataset.data_type(), None);
        assert_eq!(dataset.metadata(), None);
        assert_eq!(dataset.path(), Some("/EXO/Data/run1"));
    }

    #[test]
    fn extra_fields_never_shadow_named_ones() {
        let folder = Container::new()
            .with_name("Raw")
            .with_field("name", "other")
            .with_field("_type", "folder")
            .with_field("description", "raw runs")
            .with_field("empty", "");
        assert_eq!(folder.name(), Some("Raw"));
        assert_eq!(folder.extra().len(), 1);
        assert_eq!(folder.extra()["description"], json!("raw runs"));
    }

    #[test]
    fn location_extras_exclude_site_and_resource() {
        let location = DatasetLocation::new()
            .with_site("SLAC")
            .with_field("site", "IN2P3")
            .with_field("size", 1024);
        assert_eq!(location.site(), Some("SLAC"));
        assert_eq!(location.extra().len(), 1);
        assert_eq!(location.extra()["size"], json!(1024));
    }

    #[test]
    fn entity_exposes_record_fields() {
        let entity = Entity::from(Dataset::new().with_pk(42));
        assert_eq!(entity.pk(), Some(42));
        assert!(entity.as_dataset().is_some());
        assert!(entity.as_container().is_none());
    }

    #[test]
    fn create_fields_whitelist() {
        let mut body = Map::new();
        body.insert("name".to_string(), json!("run1"));
        body.insert("versionMetadata".to_string(), json!([]));
        assert!(validate_create_fields(&body).is_ok());

        body.insert("pk".to_string(), json!(7));
        let err = validate_create_fields(&body).expect_err("pk rejected");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.field(), Some("pk"));
    }
}
