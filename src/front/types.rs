//! Schema Model
//!
//! The normalized front-end representation of the JSON-Schema dialect: a tagged
//! union of schema nodes, each carrying its source location and the vendor
//! extensions recognized on it.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{Diagnostic, DiagnosticKind, SourceLocation};

// =============================================================================
// Vendor extensions
// =============================================================================

/// Prefixes spelling the same codegen extension
pub const VENDOR_PREFIXES: [&str; 3] = ["x-usrv-cpp-", "x-taxi-cpp-", "x-cpp-"];

const CANONICAL_PREFIX: &str = "x-usrv-cpp-";

/// A codegen vendor extension, normalized across its spellings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VendorKey {
    /// `x-usrv-cpp-type`: user type override
    Type,
    /// `x-usrv-cpp-typedef-tag`: strong typedef tag
    TypedefTag,
    /// `x-usrv-cpp-container`: array container
    Container,
    /// `x-usrv-cpp-extra-type`: container for typed extras
    ExtraType,
    /// `x-usrv-cpp-extra-member`: keep free-form extras as a member
    ExtraMember,
    /// `x-usrv-cpp-strict-parsing`
    StrictParsing,
    /// `x-usrv-cpp-indirect`: ref may form a cycle through an owning wrapper
    Indirect,
    /// `x-usrv-cpp-name`: field rename
    Name,
    /// Codegen-prefixed key nobody recognizes; keeps the original spelling
    Unknown(String),
}

impl VendorKey {
    /// Parse a schema key. Returns `None` for keys that are not codegen
    /// extensions (plain `x-*` annotations are tolerated and dropped).
    pub fn parse(key: &str) -> Option<Self> {
        let suffix = VENDOR_PREFIXES
            .iter()
            .find_map(|prefix| key.strip_prefix(prefix))?;
        let known = match suffix {
            "type" => Self::Type,
            "typedef-tag" => Self::TypedefTag,
            "container" => Self::Container,
            "extra-type" => Self::ExtraType,
            "extra-member" => Self::ExtraMember,
            "strict-parsing" => Self::StrictParsing,
            "indirect" => Self::Indirect,
            "name" => Self::Name,
            _ => Self::Unknown(key.to_string()),
        };
        Some(known)
    }

    fn suffix(&self) -> &str {
        match self {
            Self::Type => "type",
            Self::TypedefTag => "typedef-tag",
            Self::Container => "container",
            Self::ExtraType => "extra-type",
            Self::ExtraMember => "extra-member",
            Self::StrictParsing => "strict-parsing",
            Self::Indirect => "indirect",
            Self::Name => "name",
            Self::Unknown(key) => key,
        }
    }
}

impl fmt::Display for VendorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(key) => f.write_str(key),
            known => write!(f, "{}{}", CANONICAL_PREFIX, known.suffix()),
        }
    }
}

/// Vendor extensions recognized on a schema node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extensions(IndexMap<VendorKey, Value>);

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous value when the key was already present
    /// (i.e. two spellings of the same extension were used).
    pub fn insert(&mut self, key: VendorKey, value: Value) -> Option<Value> {
        self.0.insert(key, value)
    }

    pub fn get(&self, key: &VendorKey) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &VendorKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &VendorKey> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String-valued extension; a non-string value is a diagnostic.
    pub fn get_str(
        &self,
        key: &VendorKey,
        source: &SourceLocation,
    ) -> Result<Option<&str>, Diagnostic> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(Diagnostic::new(
                source,
                DiagnosticKind::InvalidFieldValue(format!(
                    "\"{key}\" must be a string, got {other}"
                )),
            )),
        }
    }

    /// Boolean-valued extension; a non-boolean value is a diagnostic.
    pub fn get_bool(
        &self,
        key: &VendorKey,
        source: &SourceLocation,
    ) -> Result<Option<bool>, Diagnostic> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(Diagnostic::new(
                source,
                DiagnosticKind::InvalidFieldValue(format!(
                    "\"{key}\" must be a boolean, got {other}"
                )),
            )),
        }
    }
}

// =============================================================================
// Scalar formats
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerFormat {
    Int32,
    Int64,
}

impl IntegerFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "int32" => Some(Self::Int32),
            "int64" => Some(Self::Int64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberFormat {
    Float,
    Double,
}

impl NumberFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringFormat {
    Date,
    DateTime,
    DateTimeIsoBasic,
    Uuid,
}

impl StringFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "date" => Some(Self::Date),
            "date-time" => Some(Self::DateTime),
            "date-time-iso-basic" => Some(Self::DateTimeIsoBasic),
            "uuid" => Some(Self::Uuid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::DateTime => "date-time",
            Self::DateTimeIsoBasic => "date-time-iso-basic",
            Self::Uuid => "uuid",
        }
    }
}

// =============================================================================
// Schema nodes
// =============================================================================

/// A parsed schema node
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub source_location: SourceLocation,
    pub extensions: Extensions,
    pub description: Option<String>,
    pub nullable: bool,
    pub kind: SchemaKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    Boolean(BooleanSchema),
    Integer(IntegerSchema),
    Number(NumberSchema),
    String(StringSchema),
    Array(ArraySchema),
    Object(ObjectSchema),
    Ref(RefSchema),
    AllOf(AllOfSchema),
    OneOf(OneOfSchema),
    OneOfWithDiscriminator(OneOfWithDiscriminatorSchema),
}

impl SchemaKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Ref(_) => "$ref",
            Self::AllOf(_) => "allOf",
            Self::OneOf(_) => "oneOf",
            Self::OneOfWithDiscriminator(_) => "oneOf with discriminator",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BooleanSchema {
    pub default: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegerSchema {
    pub default: Option<i64>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub exclusive_minimum: Option<i64>,
    pub exclusive_maximum: Option<i64>,
    pub enumeration: Option<Vec<i64>>,
    pub format: Option<IntegerFormat>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberSchema {
    pub default: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub format: Option<NumberFormat>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringSchema {
    pub default: Option<String>,
    pub enumeration: Option<Vec<String>>,
    pub pattern: Option<String>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub format: Option<StringFormat>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    pub items: Box<Schema>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdditionalProperties {
    Bool(bool),
    Schema(Box<Schema>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    pub properties: IndexMap<String, Schema>,
    pub required: Vec<String>,
    pub additional_properties: AdditionalProperties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefSchema {
    /// Absolute reference `<vfilepath>#<pointer>`
    pub reference: String,
    pub indirect: bool,
    pub self_ref: bool,
    /// Key of the final target in the resolved pools; set by the resolver
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllOfSchema {
    pub all_of: Vec<Schema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneOfSchema {
    pub one_of: Vec<Schema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneOfWithDiscriminatorSchema {
    /// Every element is a `$ref`
    pub one_of: Vec<Schema>,
    pub property_name: String,
    /// Parallel to `one_of`: discriminator values selecting each variant
    pub mapping: Vec<Vec<String>>,
}

impl Schema {
    pub fn new(source_location: SourceLocation, kind: SchemaKind) -> Self {
        Self {
            source_location,
            extensions: Extensions::new(),
            description: None,
            nullable: false,
            kind,
        }
    }

    pub fn as_ref_schema(&self) -> Option<&RefSchema> {
        match &self.kind {
            SchemaKind::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match &self.kind {
            SchemaKind::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Copy of the tree with descriptions and source locations stripped,
    /// used for structural comparison.
    pub fn without_metadata(&self) -> Schema {
        let kind = match &self.kind {
            SchemaKind::Array(a) => SchemaKind::Array(ArraySchema {
                items: Box::new(a.items.without_metadata()),
                min_items: a.min_items,
                max_items: a.max_items,
            }),
            SchemaKind::Object(o) => SchemaKind::Object(ObjectSchema {
                properties: o
                    .properties
                    .iter()
                    .map(|(name, s)| (name.clone(), s.without_metadata()))
                    .collect(),
                required: o.required.clone(),
                additional_properties: match &o.additional_properties {
                    AdditionalProperties::Bool(b) => AdditionalProperties::Bool(*b),
                    AdditionalProperties::Schema(s) => {
                        AdditionalProperties::Schema(Box::new(s.without_metadata()))
                    }
                },
            }),
            SchemaKind::AllOf(a) => SchemaKind::AllOf(AllOfSchema {
                all_of: a.all_of.iter().map(Schema::without_metadata).collect(),
            }),
            SchemaKind::OneOf(o) => SchemaKind::OneOf(OneOfSchema {
                one_of: o.one_of.iter().map(Schema::without_metadata).collect(),
            }),
            SchemaKind::OneOfWithDiscriminator(o) => {
                SchemaKind::OneOfWithDiscriminator(OneOfWithDiscriminatorSchema {
                    one_of: o.one_of.iter().map(Schema::without_metadata).collect(),
                    property_name: o.property_name.clone(),
                    mapping: o.mapping.clone(),
                })
            }
            other => other.clone(),
        };
        Schema {
            source_location: SourceLocation::default(),
            extensions: self.extensions.clone(),
            description: None,
            nullable: self.nullable,
            kind,
        }
    }
}

// =============================================================================
// Discriminator lookup
// =============================================================================

/// Outcome of looking for a discriminator property on a oneOf target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyLookup {
    Present,
    Missing,
    NotAnObject,
    /// Some ref on the way is not known yet
    Unresolved,
}

/// Check whether `schema` (an object, an allOf of objects, or a ref chain to
/// one of those) declares `property`.
pub fn find_property<'a, F>(schema: &'a Schema, property: &str, lookup: &F) -> PropertyLookup
where
    F: Fn(&str) -> Option<&'a Schema>,
{
    find_property_bounded(schema, property, lookup, 0)
}

const MAX_LOOKUP_DEPTH: usize = 64;

fn find_property_bounded<'a, F>(
    schema: &'a Schema,
    property: &str,
    lookup: &F,
    depth: usize,
) -> PropertyLookup
where
    F: Fn(&str) -> Option<&'a Schema>,
{
    if depth > MAX_LOOKUP_DEPTH {
        return PropertyLookup::Unresolved;
    }
    match &schema.kind {
        SchemaKind::Object(o) => {
            if o.properties.contains_key(property) {
                PropertyLookup::Present
            } else {
                PropertyLookup::Missing
            }
        }
        SchemaKind::Ref(r) => {
            let key = r.target.as_deref().unwrap_or(&r.reference);
            match lookup(key) {
                Some(target) => find_property_bounded(target, property, lookup, depth + 1),
                None => PropertyLookup::Unresolved,
            }
        }
        SchemaKind::AllOf(a) => {
            let mut result = PropertyLookup::Missing;
            for parent in &a.all_of {
                match find_property_bounded(parent, property, lookup, depth + 1) {
                    PropertyLookup::Present => return PropertyLookup::Present,
                    PropertyLookup::Unresolved => result = PropertyLookup::Unresolved,
                    _ => {}
                }
            }
            result
        }
        _ => PropertyLookup::NotAnObject,
    }
}

// =============================================================================
// Schema collections
// =============================================================================

/// Schemas produced by one or more parser instances, keyed by
/// `<vfilepath>#<pointer>`.
#[derive(Debug, Clone, Default)]
pub struct ParsedSchemas {
    pub schemas: IndexMap<String, Schema>,
}

impl ParsedSchemas {
    /// Merge several parser outputs, rejecting paths claimed twice.
    pub fn merge(parts: impl IntoIterator<Item = ParsedSchemas>) -> Result<Self, Diagnostic> {
        let mut schemas = IndexMap::new();
        for part in parts {
            for (path, schema) in part.schemas {
                if schemas.contains_key(&path) {
                    return Err(Diagnostic::new(
                        &schema.source_location,
                        DiagnosticKind::DuplicatePath(path),
                    ));
                }
                schemas.insert(path, schema);
            }
        }
        Ok(Self { schemas })
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Schemas in dependency order: for every direct edge `A -> B`, `B` comes first.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSchemas {
    pub schemas: IndexMap<String, Schema>,
}

impl ResolvedSchemas {
    pub fn get(&self, path: &str) -> Option<&Schema> {
        self.schemas.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.schemas.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Schema)> {
        self.schemas.iter()
    }

    pub fn index_of(&self, path: &str) -> Option<usize> {
        self.schemas.get_index_of(path)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
