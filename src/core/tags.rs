//! Purpose: Static lookup tables that drive codec dispatch.
//! Exports: `EntityKind`, `TAG_DISPATCH`, `ScalarKind`, `TypeTable`.
//! Role: Keeps wire tag spellings in one place; tables are plain values a caller can swap.
//! Invariants: `_type` dispatch is by prefix, first matching entry wins.
//! Invariants: The default scalar table maps each kind to exactly one tag.

/// Wire-taggable entity shapes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EntityKind {
    Dataset,
    Folder,
    Group,
    Location,
}

/// Prefix table for `_type`. Versioned tags such as `dataset-v2` resolve to the
/// entry whose prefix they start with.
pub static TAG_DISPATCH: &[(&str, EntityKind)] = &[
    ("dataset", EntityKind::Dataset),
    ("folder", EntityKind::Folder),
    ("group", EntityKind::Group),
    ("location", EntityKind::Location),
];

impl EntityKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        TAG_DISPATCH
            .iter()
            .find(|(prefix, _)| tag.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }

    /// Canonical tag written on encode.
    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::Dataset => "dataset",
            EntityKind::Folder => "folder",
            EntityKind::Group => "group",
            EntityKind::Location => "location",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "dataset" => Some(EntityKind::Dataset),
            "folder" => Some(EntityKind::Folder),
            "group" => Some(EntityKind::Group),
            "location" => Some(EntityKind::Location),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ScalarKind {
    Integer,
    Decimal,
    String,
}

/// Mapping between scalar kinds and their metadata `type` tags.
#[derive(Clone, Copy, Debug)]
pub struct TypeTable<'a> {
    entries: &'a [(ScalarKind, &'a str)],
}

pub static DEFAULT_TYPES: TypeTable<'static> = TypeTable::new(&[
    (ScalarKind::Integer, "integer"),
    (ScalarKind::Decimal, "decimal"),
    (ScalarKind::String, "string"),
]);

impl<'a> TypeTable<'a> {
    pub const fn new(entries: &'a [(ScalarKind, &'a str)]) -> Self {
        Self { entries }
    }

    pub fn tag_for(&self, kind: ScalarKind) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == kind)
            .map(|(_, tag)| *tag)
    }

    pub fn kind_for(&self, tag: &str) -> Option<ScalarKind> {
        self.entries
            .iter()
            .find(|(_, entry)| *entry == tag)
            .map(|(kind, _)| *kind)
    }
}

impl Default for TypeTable<'static> {
    fn default() -> Self {
        DEFAULT_TYPES
    }
}
