//! Purpose: Translate between catalog records and the tagged JSON wire format.
//! Exports: `Codec`, `Encode`, `Decoded`, `pack`, `unpack`.
//! Role: Stateless, single-pass tree transforms driven by local shape inspection.
//! Invariants: Encode omits falsy fields; `Entity` values carry a canonical `_type`.
//! Invariants: Metadata is a `{key, value, type}` triple array on the wire, in order.
//! Invariants: Decode dispatch order is `_type` prefix, metadata triple, default kind.
#![allow(clippy::result_large_err)]

use super::error::{Error, ErrorKind};
use super::metadata::{Metadata, Scalar, Truthy};
use super::model::{
    CatalogNode, CatalogRecord, Container, Dataset, DatasetLocation, Entity, Record, TYPE_KEY,
    validate_create_fields,
};
use super::tags::{DEFAULT_TYPES, EntityKind, ScalarKind, TypeTable};
use serde_json::{Map, Number, Value};

type CodecResult<T> = Result<T, Error>;

const METADATA_KEY: &str = "metadata";
const VERSION_METADATA_KEY: &str = "versionMetadata";

/// Result tree of a decode: JSON shape with objects replaced by typed values.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    Entity(Entity),
    /// A collapsed metadata triple.
    Pair(String, Scalar),
    List(Vec<Decoded>),
    /// Any non-object, non-array JSON value.
    Json(Value),
}

impl Decoded {
    pub fn into_entity(self) -> CodecResult<Entity> {
        match self {
            Decoded::Entity(entity) => Ok(entity),
            other => Err(Error::new(ErrorKind::Malformed)
                .with_message(format!("expected a catalog entry, found {}", other.describe()))),
        }
    }

    /// Accept a single entry or a list of entries.
    pub fn into_entities(self) -> CodecResult<Vec<Entity>> {
        match self {
            Decoded::List(items) => items.into_iter().map(Decoded::into_entity).collect(),
            other => Ok(vec![other.into_entity()?]),
        }
    }

    pub fn as_pair(&self) -> Option<(&str, &Scalar)> {
        match self {
            Decoded::Pair(key, value) => Some((key, value)),
            _ => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Decoded::Entity(_) => "an entry",
            Decoded::Pair(_, _) => "a metadata pair",
            Decoded::List(_) => "a list",
            Decoded::Json(_) => "a bare json value",
        }
    }
}

/// Values with a wire representation.
pub trait Encode {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value>;
}

#[derive(Clone, Copy, Debug)]
pub struct Codec<'a> {
    types: TypeTable<'a>,
    default_kind: Option<EntityKind>,
}

impl Codec<'static> {
    pub fn new() -> Self {
        Self {
            types: DEFAULT_TYPES,
            default_kind: None,
        }
    }
}

impl Default for Codec<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Codec<'a> {
    /// Swap the scalar kind <-> metadata tag table.
    pub fn with_types<'b>(self, types: TypeTable<'b>) -> Codec<'b> {
        Codec {
            types,
            default_kind: self.default_kind,
        }
    }

    /// Kind used for untyped objects that are not metadata triples.
    pub fn with_default_kind(mut self, kind: Option<EntityKind>) -> Self {
        self.default_kind = kind;
        self
    }

    pub fn types(&self) -> &TypeTable<'a> {
        &self.types
    }

    pub fn default_kind(&self) -> Option<EntityKind> {
        self.default_kind
    }

    pub fn encode<T: Encode + ?Sized>(&self, value: &T) -> CodecResult<Value> {
        value.encode(self)
    }

    pub fn pack<T: Encode + ?Sized>(&self, value: &T) -> CodecResult<String> {
        let value = value.encode(self)?;
        serde_json::to_string(&value).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to render json")
                .with_source(err)
        })
    }

    pub fn unpack(&self, content: &str) -> CodecResult<Decoded> {
        let value: Value = serde_json::from_str(content).map_err(|err| {
            Error::new(ErrorKind::Malformed)
                .with_message("invalid json")
                .with_source(err)
        })?;
        self.decode(value)
    }

    pub fn decode(&self, value: Value) -> CodecResult<Decoded> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.decode(item))
                .collect::<CodecResult<Vec<_>>>()
                .map(Decoded::List),
            Value::Object(map) => self.decode_object(map),
            other => Ok(Decoded::Json(other)),
        }
    }

    pub fn encode_scalar(&self, scalar: &Scalar) -> CodecResult<Value> {
        match scalar {
            Scalar::Integer(value) => Ok(Value::from(*value)),
            Scalar::Decimal(value) => Number::from_f64(*value).map(Value::Number).ok_or_else(|| {
                Error::new(ErrorKind::UnsupportedType)
                    .with_message(format!("decimal {value} has no json representation"))
            }),
            Scalar::String(value) => Ok(Value::String(value.clone())),
        }
    }

    pub fn encode_metadata(&self, metadata: &Metadata) -> CodecResult<Value> {
        metadata
            .iter()
            .map(|(key, value)| self.encode_triple(key, value))
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array)
    }

    fn encode_triple(&self, key: &str, value: &Scalar) -> CodecResult<Value> {
        let tag = self.types.tag_for(value.kind()).ok_or_else(|| {
            Error::new(ErrorKind::UnsupportedType)
                .with_message(format!("no metadata type tag for {:?}", value.kind()))
                .with_field(key)
        })?;
        let encoded = self
            .encode_scalar(value)
            .map_err(|err| err.with_field(key))?;
        let mut triple = Map::new();
        triple.insert("key".to_string(), Value::String(key.to_string()));
        triple.insert("value".to_string(), encoded);
        triple.insert("type".to_string(), Value::String(tag.to_string()));
        Ok(Value::Object(triple))
    }

    fn decode_object(&self, map: Map<String, Value>) -> CodecResult<Decoded> {
        if let Some(kind) = tagged_kind(&map)? {
            return self.build_entity(kind, map).map(Decoded::Entity);
        }
        if is_triple(&map) {
            // A triple with an unmapped tag only falls back when a default kind exists.
            let known = map
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|tag| self.types.kind_for(tag).is_some());
            if known || self.default_kind.is_none() {
                let (key, value) = self.decode_triple(map)?;
                return Ok(Decoded::Pair(key, value));
            }
        }
        match self.default_kind {
            Some(kind) => {
                tracing::trace!(?kind, "untyped object decoded with default kind");
                self.build_entity(kind, map).map(Decoded::Entity)
            }
            None => Err(Error::new(ErrorKind::NoTypeInformation)
                .with_message("object has no recognized _type and is not a metadata triple")
                .with_hint("pass a default type to decode untyped objects")),
        }
    }

    fn decode_triple(&self, map: Map<String, Value>) -> CodecResult<(String, Scalar)> {
        let key = match map.get("key") {
            Some(Value::String(key)) => key.clone(),
            _ => {
                return Err(Error::new(ErrorKind::Malformed)
                    .with_message("metadata key must be a string")
                    .with_field("key"));
            }
        };
        let tag = map.get("type").and_then(Value::as_str).unwrap_or_default();
        let kind = self.types.kind_for(tag).ok_or_else(|| {
            Error::new(ErrorKind::UnknownMetadataType)
                .with_message(format!("no mapping for metadata type {tag:?}"))
                .with_field(key.clone())
        })?;
        let value = map.get("value").unwrap_or(&Value::Null);
        let scalar = coerce_scalar(kind, value).map_err(|err| err.with_field(key.clone()))?;
        Ok((key, scalar))
    }

    fn decode_metadata(&self, field: &str, value: Value) -> CodecResult<Option<Metadata>> {
        let mut metadata = Metadata::new();
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    let (key, scalar) = match item {
                        Value::Object(entry) if is_triple(&entry) => self.decode_triple(entry)?,
                        Value::Object(_) => {
                            return Err(Error::new(ErrorKind::NoTypeInformation)
                                .with_message("metadata entry is not a key/value/type triple")
                                .with_field(field));
                        }
                        Value::Array(pair) => pair_entry(field, pair)?,
                        _ => return Err(malformed_metadata(field)),
                    };
                    metadata.insert(key, scalar);
                }
            }
            Value::Object(entries) => {
                for (key, value) in entries {
                    let scalar = infer_scalar(&value).ok_or_else(|| malformed_metadata(field))?;
                    metadata.insert(key, scalar);
                }
            }
            _ => return Err(malformed_metadata(field)),
        }
        Ok(metadata.is_truthy().then_some(metadata))
    }

    /// Validate stray metadata and store it in canonical triple form.
    fn canonical_metadata(&self, field: &str, value: Value) -> CodecResult<Value> {
        match self.decode_metadata(field, value)? {
            Some(metadata) => self.encode_metadata(&metadata),
            None => Ok(Value::Null),
        }
    }

    /// Nested objects and arrays in unnamed fields go through the same dispatch and
    /// are stored in canonical form.
    fn canonical_extra(&self, field: &str, value: Value) -> CodecResult<Value> {
        match value {
            Value::Object(_) | Value::Array(_) => {
                let decoded = self.decode(value).map_err(|err| {
                    if err.field().is_some() {
                        err
                    } else {
                        err.with_field(field)
                    }
                })?;
                self.canonical_value(&decoded)
            }
            other => Ok(other),
        }
    }

    fn canonical_value(&self, decoded: &Decoded) -> CodecResult<Value> {
        match decoded {
            Decoded::Entity(entity) => entity.encode(self),
            Decoded::Pair(key, value) => self.encode_triple(key, value),
            Decoded::List(items) => items
                .iter()
                .map(|item| self.canonical_value(item))
                .collect::<CodecResult<Vec<_>>>()
                .map(Value::Array),
            Decoded::Json(value) => Ok(value.clone()),
        }
    }

    fn build_entity(&self, kind: EntityKind, map: Map<String, Value>) -> CodecResult<Entity> {
        Ok(match kind {
            EntityKind::Dataset => Entity::Dataset(self.build_dataset(map)?),
            EntityKind::Folder => Entity::Folder(self.build_container(map)?),
            EntityKind::Group => Entity::Group(self.build_container(map)?),
            EntityKind::Location => Entity::Location(self.build_location(map)?),
        })
    }

    fn build_container(&self, map: Map<String, Value>) -> CodecResult<Container> {
        let mut container = Container::new();
        for (key, value) in map {
            container = match key.as_str() {
                "pk" => with_opt(container, int_field(&key, &value)?, Container::with_pk),
                "path" => with_opt(container, string_field(&key, value)?, Container::with_path),
                "name" => with_opt(container, string_field(&key, value)?, Container::with_name),
                "parentPk" => with_opt(
                    container,
                    int_field(&key, &value)?,
                    Container::with_parent_pk,
                ),
                METADATA_KEY => with_opt(
                    container,
                    self.decode_metadata(&key, value)?,
                    Container::with_metadata,
                ),
                VERSION_METADATA_KEY => {
                    let canonical = self.canonical_metadata(&key, value)?;
                    container.with_field(key, canonical)
                }
                _ => {
                    let canonical = self.canonical_extra(&key, value)?;
                    container.with_field(key, canonical)
                }
            };
        }
        Ok(container)
    }

    fn build_location(&self, map: Map<String, Value>) -> CodecResult<DatasetLocation> {
        let mut location = DatasetLocation::new();
        for (key, value) in map {
            location = match key.as_str() {
                "pk" => with_opt(location, int_field(&key, &value)?, DatasetLocation::with_pk),
                "path" => with_opt(
                    location,
                    string_field(&key, value)?,
                    DatasetLocation::with_path,
                ),
                "site" => with_opt(
                    location,
                    string_field(&key, value)?,
                    DatasetLocation::with_site,
                ),
                "resource" => with_opt(
                    location,
                    string_field(&key, value)?,
                    DatasetLocation::with_resource,
                ),
                METADATA_KEY => with_opt(
                    location,
                    self.decode_metadata(&key, value)?,
                    DatasetLocation::with_metadata,
                ),
                VERSION_METADATA_KEY => {
                    let canonical = self.canonical_metadata(&key, value)?;
                    location.with_field(key, canonical)
                }
                _ => {
                    let canonical = self.canonical_extra(&key, value)?;
                    location.with_field(key, canonical)
                }
            };
        }
        Ok(location)
    }

    fn build_dataset(&self, map: Map<String, Value>) -> CodecResult<Dataset> {
        let mut dataset = Dataset::new();
        for (key, value) in map {
            dataset = match key.as_str() {
                "pk" => with_opt(dataset, int_field(&key, &value)?, Dataset::with_pk),
                "path" => with_opt(dataset, string_field(&key, value)?, Dataset::with_path),
                "name" => with_opt(dataset, string_field(&key, value)?, Dataset::with_name),
                "parentPk" => with_opt(dataset, int_field(&key, &value)?, Dataset::with_parent_pk),
                "dataType" => with_opt(
                    dataset,
                    string_field(&key, value)?,
                    Dataset::with_data_type,
                ),
                "fileFormat" => with_opt(
                    dataset,
                    string_field(&key, value)?,
                    Dataset::with_file_format,
                ),
                "versionId" => with_opt(dataset, int_field(&key, &value)?, Dataset::with_version_id),
                "processInstance" => with_opt(
                    dataset,
                    int_field(&key, &value)?,
                    Dataset::with_process_instance,
                ),
                "taskName" => with_opt(
                    dataset,
                    string_field(&key, value)?,
                    Dataset::with_task_name,
                ),
                METADATA_KEY => with_opt(
                    dataset,
                    self.decode_metadata(&key, value)?,
                    Dataset::with_metadata,
                ),
                VERSION_METADATA_KEY => with_opt(
                    dataset,
                    self.decode_metadata(&key, value)?,
                    Dataset::with_version_metadata,
                ),
                "locations" => dataset.with_locations(self.decode_locations(value)?),
                _ => {
                    let canonical = self.canonical_extra(&key, value)?;
                    dataset.with_field(key, canonical)
                }
            };
        }
        Ok(dataset)
    }

    fn decode_locations(&self, value: Value) -> CodecResult<Vec<DatasetLocation>> {
        let items = match value {
            Value::Null => return Ok(Vec::new()),
            Value::Array(items) => items,
            _ => {
                return Err(Error::new(ErrorKind::Malformed)
                    .with_message("locations must be an array")
                    .with_field("locations"));
            }
        };
        let mut locations = Vec::with_capacity(items.len());
        for item in items {
            let Value::Object(map) = item else {
                return Err(Error::new(ErrorKind::Malformed)
                    .with_message("location entries must be objects")
                    .with_field("locations"));
            };
            match tagged_kind(&map)? {
                None | Some(EntityKind::Location) => locations.push(self.build_location(map)?),
                Some(other) => {
                    return Err(Error::new(ErrorKind::Malformed)
                        .with_message(format!("locations may not hold a {}", other.tag()))
                        .with_field("locations"));
                }
            }
        }
        Ok(locations)
    }

    fn record_fields(&self, record: &impl CatalogRecord, out: &mut Map<String, Value>) {
        put_int(out, "pk", record.pk());
        put_string(out, "path", record.path());
    }

    fn node_fields(&self, node: &impl CatalogNode, out: &mut Map<String, Value>) {
        self.record_fields(node, out);
        put_string(out, "name", node.name());
        put_int(out, "parentPk", node.parent_pk());
    }

    fn put_metadata(
        &self,
        out: &mut Map<String, Value>,
        key: &str,
        metadata: Option<&Metadata>,
    ) -> CodecResult<()> {
        if let Some(metadata) = metadata.filter(|metadata| metadata.is_truthy()) {
            out.insert(key.to_string(), self.encode_metadata(metadata)?);
        }
        Ok(())
    }

    fn container_fields(&self, container: &Container) -> CodecResult<Map<String, Value>> {
        let mut out = Map::new();
        self.node_fields(container, &mut out);
        self.put_metadata(&mut out, METADATA_KEY, container.metadata())?;
        put_extra(&mut out, container.extra());
        Ok(out)
    }

    fn location_fields(&self, location: &DatasetLocation) -> CodecResult<Map<String, Value>> {
        let mut out = Map::new();
        self.record_fields(location, &mut out);
        put_string(&mut out, "site", location.site());
        put_string(&mut out, "resource", location.resource());
        self.put_metadata(&mut out, METADATA_KEY, location.metadata())?;
        put_extra(&mut out, location.extra());
        Ok(out)
    }

    fn dataset_fields(&self, dataset: &Dataset) -> CodecResult<Map<String, Value>> {
        let mut out = Map::new();
        self.node_fields(dataset, &mut out);
        put_string(&mut out, "dataType", dataset.data_type());
        put_string(&mut out, "fileFormat", dataset.file_format());
        self.put_metadata(&mut out, METADATA_KEY, dataset.metadata())?;
        put_int(&mut out, "versionId", dataset.version_id());
        put_int(&mut out, "processInstance", dataset.process_instance());
        put_string(&mut out, "taskName", dataset.task_name());
        self.put_metadata(&mut out, VERSION_METADATA_KEY, dataset.version_metadata())?;
        if !dataset.locations().is_empty() {
            let locations = dataset
                .locations()
                .iter()
                .map(|location| self.location_fields(location).map(Value::Object))
                .collect::<CodecResult<Vec<_>>>()?;
            out.insert("locations".to_string(), Value::Array(locations));
        }
        put_extra(&mut out, dataset.extra());
        Ok(out)
    }
}

impl Dataset {
    /// Body of a create-dataset request. Fails with `Usage` when a field outside
    /// `REQ_JSON_ALLOWED` is present.
    pub fn create_request(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        let body = codec.dataset_fields(self)?;
        validate_create_fields(&body)?;
        Ok(Value::Object(body))
    }
}

/// Encode with the default tables.
pub fn pack<T: Encode + ?Sized>(value: &T) -> CodecResult<String> {
    Codec::new().pack(value)
}

/// Decode with the default tables and an optional fallback kind.
pub fn unpack(content: &str, default_kind: Option<EntityKind>) -> CodecResult<Decoded> {
    Codec::new().with_default_kind(default_kind).unpack(content)
}

impl Encode for Record {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        let mut out = Map::new();
        codec.record_fields(self, &mut out);
        Ok(Value::Object(out))
    }
}

impl Encode for super::model::Node {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        let mut out = Map::new();
        codec.node_fields(self, &mut out);
        Ok(Value::Object(out))
    }
}

impl Encode for Container {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        codec.container_fields(self).map(Value::Object)
    }
}

impl Encode for DatasetLocation {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        codec.location_fields(self).map(Value::Object)
    }
}

impl Encode for Dataset {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        codec.dataset_fields(self).map(Value::Object)
    }
}

impl Encode for Entity {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        let body = match self {
            Entity::Dataset(dataset) => codec.dataset_fields(dataset)?,
            Entity::Folder(container) | Entity::Group(container) => {
                codec.container_fields(container)?
            }
            Entity::Location(location) => codec.location_fields(location)?,
        };
        let mut out = Map::new();
        out.insert(
            TYPE_KEY.to_string(),
            Value::String(self.kind().tag().to_string()),
        );
        out.extend(body);
        Ok(Value::Object(out))
    }
}

impl Encode for Metadata {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        codec.encode_metadata(self)
    }
}

impl Encode for Scalar {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        codec.encode_scalar(self)
    }
}

impl Encode for Decoded {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        match self {
            Decoded::Entity(entity) => entity.encode(codec),
            Decoded::Pair(key, value) => Ok(Value::Array(vec![
                Value::String(key.clone()),
                codec.encode_scalar(value)?,
            ])),
            Decoded::List(items) => items.as_slice().encode(codec),
            Decoded::Json(value) => Ok(value.clone()),
        }
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        self.iter()
            .map(|item| item.encode(codec))
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        self.as_slice().encode(codec)
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, codec: &Codec<'_>) -> CodecResult<Value> {
        (**self).encode(codec)
    }
}

fn tagged_kind(map: &Map<String, Value>) -> CodecResult<Option<EntityKind>> {
    match map.get(TYPE_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(tag)) => Ok(EntityKind::from_tag(tag)),
        Some(_) => Err(Error::new(ErrorKind::Malformed)
            .with_message("_type must be a string")
            .with_field(TYPE_KEY)),
    }
}

fn is_triple(map: &Map<String, Value>) -> bool {
    map.contains_key("key") && map.contains_key("value") && map.contains_key("type")
}

fn coerce_scalar(kind: ScalarKind, value: &Value) -> CodecResult<Scalar> {
    let coerced = match (kind, value) {
        (ScalarKind::Integer, Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(truncate_to_i64))
            .map(Scalar::Integer),
        (ScalarKind::Integer, Value::String(text)) => {
            text.trim().parse::<i64>().ok().map(Scalar::Integer)
        }
        (ScalarKind::Decimal, Value::Number(number)) => number.as_f64().map(Scalar::Decimal),
        (ScalarKind::Decimal, Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Scalar::Decimal),
        (ScalarKind::String, Value::String(text)) => Some(Scalar::String(text.clone())),
        (ScalarKind::String, Value::Number(number)) => Some(Scalar::String(number.to_string())),
        _ => None,
    };
    coerced.ok_or_else(|| {
        Error::new(ErrorKind::Malformed).with_message(format!("cannot read {value} as {kind:?}"))
    })
}

fn truncate_to_i64(value: f64) -> Option<i64> {
    let truncated = value.trunc();
    (truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64)
        .then_some(truncated as i64)
}

fn infer_scalar(value: &Value) -> Option<Scalar> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .map(Scalar::Integer)
            .or_else(|| number.as_f64().map(Scalar::Decimal)),
        Value::String(text) => Some(Scalar::String(text.clone())),
        _ => None,
    }
}

fn pair_entry(field: &str, pair: Vec<Value>) -> CodecResult<(String, Scalar)> {
    match pair.as_slice() {
        [Value::String(key), value] => infer_scalar(value)
            .map(|scalar| (key.clone(), scalar))
            .ok_or_else(|| malformed_metadata(field)),
        _ => Err(malformed_metadata(field)),
    }
}

fn malformed_metadata(field: &str) -> Error {
    Error::new(ErrorKind::Malformed)
        .with_message("metadata must be triples, [key, value] pairs or an object of scalars")
        .with_field(field)
}

fn int_field(key: &str, value: &Value) -> CodecResult<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number.as_i64().map(Some).ok_or_else(|| {
            Error::new(ErrorKind::Malformed)
                .with_message(format!("expected an integer, found {number}"))
                .with_field(key)
        }),
        other => Err(Error::new(ErrorKind::Malformed)
            .with_message(format!("expected an integer, found {other}"))
            .with_field(key)),
    }
}

fn string_field(key: &str, value: Value) -> CodecResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        other => Err(Error::new(ErrorKind::Malformed)
            .with_message(format!("expected a string, found {other}"))
            .with_field(key)),
    }
}

fn with_opt<S, T>(subject: S, value: Option<T>, apply: impl FnOnce(S, T) -> S) -> S {
    match value {
        Some(value) => apply(subject, value),
        None => subject,
    }
}

fn put_int(out: &mut Map<String, Value>, key: &str, value: Option<i64>) {
    if let Some(value) = value.filter(Truthy::is_truthy) {
        out.insert(key.to_string(), Value::from(value));
    }
}

fn put_string(out: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| value.is_truthy()) {
        out.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn put_extra(out: &mut Map<String, Value>, extra: &Map<String, Value>) {
    for (key, value) in extra {
        if value.is_truthy() {
            out.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Codec, Decoded, pack, unpack};
    use crate::core::error::ErrorKind;
    use crate::core::metadata::{Metadata, Scalar};
    use crate::core::model::{
        CatalogNode, CatalogRecord, Container, Dataset, DatasetLocation, Entity, Record,
    };
    use crate::core::tags::{EntityKind, ScalarKind, TypeTable};
    use serde_json::{Value, json};

    fn encode<T: super::Encode + ?Sized>(value: &T) -> Value {
        Codec::new().encode(value).expect("encode")
    }

    #[test]
    fn all_falsy_records_encode_to_empty_objects() {
        assert_eq!(encode(&Record::new().with_pk(0).with_path("")), json!({}));
        assert_eq!(
            encode(&Dataset::new().with_name("").with_version_id(0)),
            json!({})
        );
        assert_eq!(
            encode(&Container::new().with_field("note", "")),
            json!({})
        );
        assert_eq!(
            encode(&DatasetLocation::new().with_site("").with_metadata(Metadata::new())),
            json!({})
        );
    }

    #[test]
    fn mixed_fields_omit_exactly_the_falsy_ones() {
        let dataset = Dataset::new()
            .with_name("run6201")
            .with_pk(0)
            .with_data_type("EXODATA")
            .with_file_format("")
            .with_version_id(3)
            .with_process_instance(0)
            .with_field("fileSystemPath", "/nfs/exo/run6201.root")
            .with_field("size", 0);
        assert_eq!(
            encode(&dataset),
            json!({
                "name": "run6201",
                "dataType": "EXODATA",
                "versionId": 3,
                "fileSystemPath": "/nfs/exo/run6201.root"
            })
        );
    }

    #[test]
    fn metadata_encodes_as_ordered_triples() {
        let mut md = Metadata::new();
        md.insert("nRun", 6201);
        md.insert("quality", "GO");
        md.insert("livetime", 12.5);
        assert_eq!(
            encode(&md),
            json!([
                {"key": "nRun", "value": 6201, "type": "integer"},
                {"key": "quality", "value": "GO", "type": "string"},
                {"key": "livetime", "value": 12.5, "type": "decimal"}
            ])
        );
    }

    #[test]
    fn non_finite_decimal_is_unsupported() {
        let md: Metadata = [("ratio", f64::NAN)].into_iter().collect();
        let err = Codec::new().encode(&md).expect_err("nan");
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
        assert_eq!(err.field(), Some("ratio"));
    }

    #[test]
    fn missing_table_entry_is_unsupported() {
        static INTEGERS_ONLY: TypeTable<'static> =
            TypeTable::new(&[(ScalarKind::Integer, "integer")]);
        let md: Metadata = [("quality", "GO")].into_iter().collect();
        let err = Codec::new()
            .with_types(INTEGERS_ONLY)
            .encode(&md)
            .expect_err("string kind missing");
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    }

    #[test]
    fn entity_encoding_leads_with_type_tag() {
        let entity = Entity::Group(Container::new().with_name("runs"));
        let value = encode(&entity);
        let first = value.as_object().and_then(|map| map.keys().next().cloned());
        assert_eq!(first.as_deref(), Some("_type"));
        assert_eq!(value, json!({"_type": "group", "name": "runs"}));
    }

    #[test]
    fn versioned_dataset_tag_decodes_to_dataset() {
        let decoded = unpack(r#"{"_type": "dataset-v2", "name": "run1"}"#, None).expect("decode");
        let dataset = decoded.into_entity().expect("entity").into_dataset().expect("dataset");
        assert_eq!(dataset.name(), Some("run1"));
        assert!(dataset.extra().is_empty());
    }

    #[test]
    fn untyped_object_without_default_has_no_type_information() {
        let err = unpack(r#"{"name": "run1"}"#, None).expect_err("untyped");
        assert_eq!(err.kind(), ErrorKind::NoTypeInformation);

        let err = unpack(r#"{"_type": "version", "name": "run1"}"#, None).expect_err("unknown tag");
        assert_eq!(err.kind(), ErrorKind::NoTypeInformation);
    }

    #[test]
    fn default_kind_builds_untyped_objects() {
        let decoded =
            unpack(r#"{"name": "Raw", "pk": 12}"#, Some(EntityKind::Folder)).expect("decode");
        let Decoded::Entity(Entity::Folder(folder)) = decoded else {
            panic!("expected folder, got {decoded:?}");
        };
        assert_eq!(folder.name(), Some("Raw"));
        assert_eq!(folder.pk(), Some(12));
    }

    #[test]
    fn integer_triple_coerces_string_value() {
        let decoded =
            unpack(r#"{"key": "nRun", "value": "6201", "type": "integer"}"#, None).expect("pair");
        assert_eq!(decoded, Decoded::Pair("nRun".to_string(), Scalar::Integer(6201)));
    }

    #[test]
    fn triples_take_priority_over_default_kind() {
        let decoded = unpack(
            r#"{"key": "ratio", "value": 1.5, "type": "decimal"}"#,
            Some(EntityKind::Dataset),
        )
        .expect("pair");
        assert_eq!(decoded.as_pair(), Some(("ratio", &Scalar::Decimal(1.5))));
    }

    #[test]
    fn unknown_triple_type_is_rejected() {
        let err = unpack(r#"{"key": "flag", "value": true, "type": "boolean"}"#, None)
            .expect_err("boolean");
        assert_eq!(err.kind(), ErrorKind::UnknownMetadataType);
        assert_eq!(err.field(), Some("flag"));
    }

    #[test]
    fn unknown_triple_type_falls_back_to_default_kind() {
        let decoded = unpack(
            r#"{"key": "flag", "value": 1, "type": "boolean"}"#,
            Some(EntityKind::Dataset),
        )
        .expect("default kind");
        let dataset = decoded.into_entity().expect("entity").into_dataset().expect("dataset");
        assert_eq!(dataset.extra()["type"], json!("boolean"));

        let err = unpack(
            r#"{"_type": "dataset", "metadata": [{"key": "flag", "value": 1, "type": "boolean"}]}"#,
            Some(EntityKind::Dataset),
        )
        .expect_err("metadata entries stay strict");
        assert_eq!(err.kind(), ErrorKind::UnknownMetadataType);
    }

    #[test]
    fn untagged_nested_extra_has_no_type_information() {
        let err = unpack(r#"{"_type": "dataset", "name": "d", "owner": {"name": "x"}}"#, None)
            .expect_err("nested untyped");
        assert_eq!(err.kind(), ErrorKind::NoTypeInformation);
        assert_eq!(err.field(), Some("owner"));
    }

    #[test]
    fn nested_extras_are_decoded_to_canonical_form() {
        let decoded = unpack(
            r#"{"_type": "dataset", "name": "d",
                "parent": {"_type": "folder-v1", "name": "Raw", "pk": 0},
                "tags": [{"key": "nRun", "value": "7", "type": "integer"}, "raw"]}"#,
            None,
        )
        .expect("decode");
        let dataset = decoded.into_entity().expect("entity").into_dataset().expect("dataset");
        assert_eq!(dataset.extra()["parent"], json!({"_type": "folder", "name": "Raw"}));
        assert_eq!(
            dataset.extra()["tags"],
            json!([{"key": "nRun", "value": 7, "type": "integer"}, "raw"])
        );

        let err = unpack(
            r#"{"_type": "folder", "parent": {"_type": "dataset", "pk": "1"}}"#,
            None,
        )
        .expect_err("nested bad field");
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert_eq!(err.field(), Some("pk"));
    }

    #[test]
    fn nested_untyped_extra_uses_default_kind() {
        let decoded = unpack(r#"{"name": "d", "owner": {"name": "x"}}"#, Some(EntityKind::Dataset))
            .expect("decode");
        let dataset = decoded.into_entity().expect("entity").into_dataset().expect("dataset");
        assert_eq!(dataset.extra()["owner"], json!({"_type": "dataset", "name": "x"}));
    }

    #[test]
    fn uncoercible_value_is_malformed() {
        let err = unpack(r#"{"key": "nRun", "value": "abc", "type": "integer"}"#, None)
            .expect_err("abc");
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn metadata_accepts_pairs_and_objects() {
        let decoded = unpack(
            r#"[
                {"_type": "dataset", "metadata": [["nRun", 6201], ["quality", "GO"]]},
                {"_type": "dataset", "metadata": {"nRun": 6202, "ratio": 0.25}}
            ]"#,
            None,
        )
        .expect("decode");
        let datasets = decoded.into_entities().expect("entities");
        let first = datasets[0].as_dataset().and_then(Dataset::metadata).expect("md");
        assert_eq!(first.get("quality"), Some(&Scalar::String("GO".to_string())));
        let second = datasets[1].as_dataset().and_then(Dataset::metadata).expect("md");
        assert_eq!(second.get("ratio"), Some(&Scalar::Decimal(0.25)));
    }

    #[test]
    fn empty_metadata_is_absent() {
        let decoded = unpack(r#"{"_type": "dataset", "metadata": []}"#, None).expect("decode");
        let dataset = decoded.into_entity().expect("entity").into_dataset().expect("dataset");
        assert_eq!(dataset.metadata(), None);
    }

    #[test]
    fn untagged_locations_decode_inside_datasets() {
        let decoded = unpack(
            r#"{"_type": "dataset", "locations": [
                {"site": "SLAC", "resource": "/nfs/a.root", "size": 10},
                {"_type": "location", "site": "IN2P3"}
            ]}"#,
            None,
        )
        .expect("decode");
        let dataset = decoded.into_entity().expect("entity").into_dataset().expect("dataset");
        let locations = dataset.locations();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].resource(), Some("/nfs/a.root"));
        assert_eq!(locations[0].extra()["size"], json!(10));
        assert_eq!(locations[1].site(), Some("IN2P3"));
    }

    #[test]
    fn wrong_field_type_names_the_field() {
        let err = unpack(r#"{"_type": "folder", "pk": "12"}"#, None).expect_err("string pk");
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert_eq!(err.field(), Some("pk"));
    }

    #[test]
    fn container_version_metadata_is_canonicalized() {
        let decoded = unpack(
            r#"{"_type": "folder", "versionMetadata": {"nRun": 5}}"#,
            None,
        )
        .expect("decode");
        let entity = decoded.into_entity().expect("entity");
        let folder = entity.as_container().expect("container");
        assert_eq!(
            folder.extra()["versionMetadata"],
            json!([{"key": "nRun", "value": 5, "type": "integer"}])
        );
    }

    #[test]
    fn tagged_dataset_round_trips() {
        let mut md = Metadata::new();
        md.insert("nRun", 6201);
        md.insert("exo.runQuality", "GOOD");
        md.insert("livetime", 3599.5);
        let entity = Entity::Dataset(
            Dataset::new()
                .with_pk(1001)
                .with_name("run6201.root")
                .with_path("/EXO/Data/Raw/run6201.root")
                .with_parent_pk(17)
                .with_metadata(md.clone())
                .with_version_metadata(md)
                .with_location(DatasetLocation::new().with_site("SLAC").with_pk(5))
                .with_field("fileSystemPath", "/nfs/exo/run6201.root"),
        );
        let text = pack(&entity).expect("pack");
        let decoded = unpack(&text, None).expect("unpack");
        assert_eq!(decoded, Decoded::Entity(entity));
    }

    #[test]
    fn bare_dataset_round_trips_with_default_kind() {
        let md: Metadata = [("nRun", Scalar::from(6201)), ("alpha", Scalar::from("a"))]
            .into_iter()
            .collect();
        let dataset = Dataset::new().with_name("d1").with_metadata(md);
        let text = pack(&dataset).expect("pack");
        let decoded = unpack(&text, Some(EntityKind::Dataset)).expect("unpack");
        assert_eq!(decoded, Decoded::Entity(Entity::Dataset(dataset)));
    }

    #[test]
    fn decoded_pairs_encode_as_two_element_arrays() {
        let pair = Decoded::Pair("nRun".to_string(), Scalar::Integer(1));
        assert_eq!(encode(&pair), json!(["nRun", 1]));
    }

    #[test]
    fn create_request_rejects_server_assigned_fields() {
        let codec = Codec::new();
        let ok = Dataset::new()
            .with_name("run1")
            .with_data_type("EXODATA")
            .with_version_id(-1);
        assert_eq!(
            ok.create_request(&codec).expect("allowed"),
            json!({"name": "run1", "dataType": "EXODATA", "versionId": -1})
        );

        let err = ok
            .clone()
            .with_parent_pk(3)
            .create_request(&codec)
            .expect_err("parentPk");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let err = ok
            .with_field("datasetSource", "RAW")
            .create_request(&codec)
            .expect_err("extra");
        assert_eq!(err.field(), Some("datasetSource"));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = unpack("{", None).expect_err("syntax");
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn non_object_values_pass_through() {
        let decoded = unpack(r#"[1, "a", null]"#, None).expect("decode");
        assert_eq!(
            decoded,
            Decoded::List(vec![
                Decoded::Json(json!(1)),
                Decoded::Json(json!("a")),
                Decoded::Json(Value::Null),
            ])
        );
    }
}
