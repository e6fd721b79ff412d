//! Front-end Schema Parser
//!
//! Walks an in-memory document and produces [`Schema`] nodes. The parser is
//! strict: any key that is not recognized for the node being parsed is a
//! diagnostic, except vendor `x-*` annotations and a few documentation keys.
//!
//! One parser instance covers one document; the in-file path of every subtree
//! is tracked so that each node knows where it came from.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{Diagnostic, DiagnosticKind, SchemaDialect, SourceLocation};

use super::types::{
    find_property, AdditionalProperties, AllOfSchema, ArraySchema, BooleanSchema, Extensions,
    IntegerFormat, IntegerSchema, NumberFormat, NumberSchema, ObjectSchema, OneOfSchema,
    OneOfWithDiscriminatorSchema, ParsedSchemas, PropertyLookup, RefSchema, Schema, SchemaKind,
    StringFormat, StringSchema, VendorKey,
};

type ParseResult<T> = Result<T, Diagnostic>;

/// Keys accepted on every node
const COMMON_FIELDS: &[&str] = &["description", "example", "nullable"];

const BOOLEAN_FIELDS: &[&str] = &["type", "default"];
const INTEGER_FIELDS: &[&str] = &[
    "type",
    "default",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "enum",
    "format",
];
const NUMBER_FIELDS: &[&str] = &[
    "type",
    "default",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "format",
];
const STRING_FIELDS: &[&str] = &[
    "type",
    "default",
    "enum",
    "pattern",
    "minLength",
    "maxLength",
    "format",
];
const ARRAY_FIELDS: &[&str] = &["type", "items", "minItems", "maxItems"];
const OBJECT_FIELDS: &[&str] = &["type", "properties", "required", "additionalProperties"];
const ALL_OF_FIELDS: &[&str] = &["allOf"];
const ONE_OF_FIELDS: &[&str] = &["oneOf", "discriminator"];
const DISCRIMINATOR_FIELDS: &[&str] = &["propertyName", "mapping"];

/// Parser settings shared by every document of a run
#[derive(Debug, Clone, Default)]
pub struct ParserConfig {
    /// Prefix stripped from absolute (`/`-rooted) file refs
    pub erase_prefix: String,
    pub dialect: SchemaDialect,
}

/// Parses the schemas of a single document
pub struct SchemaParser {
    config: ParserConfig,
    full_filepath: String,
    full_vfilepath: String,
    path: String,
    schemas: IndexMap<String, Schema>,
}

impl SchemaParser {
    /// `full_filepath` is the real file, `full_vfilepath` the virtual path
    /// produced by the file map; refs and locations use the latter.
    pub fn new(
        config: ParserConfig,
        full_filepath: impl Into<String>,
        full_vfilepath: impl Into<String>,
    ) -> Self {
        Self {
            config,
            full_filepath: full_filepath.into(),
            full_vfilepath: full_vfilepath.into(),
            path: String::new(),
            schemas: IndexMap::new(),
        }
    }

    pub fn full_filepath(&self) -> &str {
        &self.full_filepath
    }

    pub fn full_vfilepath(&self) -> &str {
        &self.full_vfilepath
    }

    /// Parse the schema found at `infile_path` of the document.
    pub fn parse_schema(&mut self, infile_path: &str, input: &Value) -> ParseResult<()> {
        self.path = infile_path.to_string();
        let schema = self.parse(input)?;

        let key = format!("{}#{}", self.full_vfilepath, infile_path);
        if self.schemas.contains_key(&key) {
            return Err(self.error(DiagnosticKind::DuplicatePath(key)));
        }
        self.schemas.insert(key, schema);
        Ok(())
    }

    pub fn into_parsed_schemas(self) -> ParsedSchemas {
        ParsedSchemas {
            schemas: self.schemas,
        }
    }

    // ===== Path tracking =====

    fn in_segment<T>(
        &mut self,
        segment: &str,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let saved = self.path.len();
        self.path.push('/');
        self.path.push_str(&segment.replace('~', "~0").replace('/', "~1"));
        let result = f(self);
        self.path.truncate(saved);
        result
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.full_vfilepath.clone(), self.path.clone())
    }

    fn error(&self, kind: DiagnosticKind) -> Diagnostic {
        Diagnostic::new(&self.location(), kind).with_dialect(self.config.dialect)
    }

    fn error_at(&mut self, segment: &str, kind: DiagnosticKind) -> Diagnostic {
        let saved = self.path.len();
        self.path.push('/');
        self.path.push_str(segment);
        let diag = self.error(kind);
        self.path.truncate(saved);
        diag
    }

    // ===== Dispatch =====

    fn parse(&mut self, input: &Value) -> ParseResult<Schema> {
        let Some(object) = input.as_object() else {
            return Err(self.error(DiagnosticKind::InvalidFieldValue(format!(
                "schema must be an object, got {input}"
            ))));
        };

        if object.contains_key("type") {
            self.parse_typed(object)
        } else if object.contains_key("$ref") {
            self.parse_ref(object)
        } else if object.contains_key("allOf") {
            self.parse_all_of(object)
        } else if object.contains_key("oneOf") {
            self.parse_one_of(object)
        } else {
            Err(self.error(DiagnosticKind::TypeMissing))
        }
    }

    fn parse_typed(&mut self, object: &Map<String, Value>) -> ParseResult<Schema> {
        let type_name = match object.get("type") {
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                return Err(self.error_at(
                    "type",
                    DiagnosticKind::InvalidFieldValue(format!(
                        "\"type\" must be a string, got {other}"
                    )),
                ))
            }
            None => return Err(self.error(DiagnosticKind::TypeMissing)),
        };

        let (fields, kind) = match type_name {
            "boolean" => (BOOLEAN_FIELDS, SchemaKind::Boolean(self.parse_boolean(object)?)),
            "integer" => (INTEGER_FIELDS, SchemaKind::Integer(self.parse_integer(object)?)),
            "number" => (NUMBER_FIELDS, SchemaKind::Number(self.parse_number(object)?)),
            "string" => (STRING_FIELDS, SchemaKind::String(self.parse_string(object)?)),
            "array" => (ARRAY_FIELDS, SchemaKind::Array(self.parse_array(object)?)),
            "object" => (OBJECT_FIELDS, SchemaKind::Object(self.parse_object(object)?)),
            other => return Err(self.error(DiagnosticKind::TypeUnknown(other.to_string()))),
        };

        self.finish(object, fields, kind)
    }

    /// Check for unknown keys and collect the shared attributes.
    fn finish(
        &mut self,
        object: &Map<String, Value>,
        fields: &[&str],
        kind: SchemaKind,
    ) -> ParseResult<Schema> {
        self.check_fields(object, fields)?;
        let extensions = self.collect_extensions(object)?;

        let description = match object.get("description") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(self.error_at(
                    "description",
                    DiagnosticKind::InvalidFieldValue(format!("expected string, got {other}")),
                ))
            }
        };
        let nullable = match object.get("nullable") {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(self.error_at(
                    "nullable",
                    DiagnosticKind::InvalidFieldValue(format!("expected boolean, got {other}")),
                ))
            }
        };

        Ok(Schema {
            source_location: self.location(),
            extensions,
            description,
            nullable,
            kind,
        })
    }

    fn check_fields(&self, object: &Map<String, Value>, fields: &[&str]) -> ParseResult<()> {
        for key in object.keys() {
            if key.starts_with("x-")
                || fields.contains(&key.as_str())
                || COMMON_FIELDS.contains(&key.as_str())
            {
                continue;
            }
            let known: Vec<&str> = fields.iter().chain(COMMON_FIELDS).copied().collect();
            return Err(self.error(DiagnosticKind::UnknownField {
                field: key.clone(),
                known: known.join(", "),
            }));
        }
        Ok(())
    }

    fn collect_extensions(&self, object: &Map<String, Value>) -> ParseResult<Extensions> {
        let mut extensions = Extensions::new();
        for (key, value) in object {
            let Some(vendor_key) = VendorKey::parse(key) else {
                continue;
            };
            if extensions.insert(vendor_key.clone(), value.clone()).is_some() {
                return Err(self.error(DiagnosticKind::VendorConflict(format!(
                    "\"{key}\" is a second spelling of \"{vendor_key}\""
                ))));
            }
        }
        Ok(extensions)
    }

    // ===== Scalars =====

    fn parse_boolean(&mut self, object: &Map<String, Value>) -> ParseResult<BooleanSchema> {
        let default = match object.get("default") {
            None => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                return Err(self.error_at(
                    "default",
                    DiagnosticKind::InvalidFieldValue(format!("expected boolean, got {other}")),
                ))
            }
        };
        Ok(BooleanSchema { default })
    }

    fn get_i64(&mut self, object: &Map<String, Value>, key: &str) -> ParseResult<Option<i64>> {
        match object.get(key) {
            None => Ok(None),
            Some(value) => match value.as_i64() {
                Some(i) => Ok(Some(i)),
                None => Err(self.error_at(
                    key,
                    DiagnosticKind::InvalidFieldValue(format!("expected integer, got {value}")),
                )),
            },
        }
    }

    fn get_u64(&mut self, object: &Map<String, Value>, key: &str) -> ParseResult<Option<u64>> {
        match object.get(key) {
            None => Ok(None),
            Some(value) => match value.as_u64() {
                Some(i) => Ok(Some(i)),
                None => Err(self.error_at(
                    key,
                    DiagnosticKind::InvalidFieldValue(format!(
                        "expected non-negative integer, got {value}"
                    )),
                )),
            },
        }
    }

    fn get_f64(&mut self, object: &Map<String, Value>, key: &str) -> ParseResult<Option<f64>> {
        match object.get(key) {
            None => Ok(None),
            Some(value) => match value.as_f64() {
                Some(f) => Ok(Some(f)),
                None => Err(self.error_at(
                    key,
                    DiagnosticKind::InvalidFieldValue(format!("expected number, got {value}")),
                )),
            },
        }
    }

    fn get_format<'a>(&mut self, object: &'a Map<String, Value>) -> ParseResult<Option<&'a str>> {
        match object.get("format") {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.error_at(
                "format",
                DiagnosticKind::InvalidFieldValue(format!("expected string, got {other}")),
            )),
        }
    }

    /// OpenAPI 3.0 spells exclusive bounds as a boolean next to
    /// `minimum`/`maximum`; JSON Schema spells them as numbers.
    fn exclusive_bound<T: Copy>(
        &mut self,
        object: &Map<String, Value>,
        key: &str,
        inclusive: &mut Option<T>,
        read: impl FnOnce(&mut Self) -> ParseResult<Option<T>>,
    ) -> ParseResult<Option<T>> {
        match object.get(key) {
            Some(Value::Bool(true)) => Ok(inclusive.take()),
            Some(Value::Bool(false)) => Ok(None),
            _ => read(self),
        }
    }

    fn parse_integer(&mut self, object: &Map<String, Value>) -> ParseResult<IntegerSchema> {
        let default = self.get_i64(object, "default")?;
        let mut minimum = self.get_i64(object, "minimum")?;
        let mut maximum = self.get_i64(object, "maximum")?;
        let exclusive_minimum = self.exclusive_bound(object, "exclusiveMinimum", &mut minimum, |p| {
            p.get_i64(object, "exclusiveMinimum")
        })?;
        let exclusive_maximum = self.exclusive_bound(object, "exclusiveMaximum", &mut maximum, |p| {
            p.get_i64(object, "exclusiveMaximum")
        })?;

        let format = match self.get_format(object)? {
            None => None,
            Some(f) => match IntegerFormat::parse(f) {
                Some(format) => Some(format),
                None => {
                    let kind = DiagnosticKind::FormatUnsupported(f.to_string());
                    return Err(self.error_at("format", kind));
                }
            },
        };

        let enumeration = match object.get("enum") {
            None => None,
            Some(value) => Some(self.in_segment("enum", |p| {
                let items = p.enum_items(value)?;
                items
                    .iter()
                    .map(|item| match item {
                        Value::Number(n) if n.is_i64() || n.is_u64() => n.as_i64().ok_or_else(|| {
                            let message = format!("{n} does not fit in 64 bits");
                            p.error(DiagnosticKind::EnumTypeMismatch(message))
                        }),
                        other => Err(p.error(DiagnosticKind::EnumTypeMismatch(format!(
                            "expected integer, got {other}"
                        )))),
                    })
                    .collect::<ParseResult<Vec<i64>>>()
            })?),
        };

        if let (Some(items), Some(default)) = (&enumeration, default) {
            if !items.contains(&default) {
                return Err(self.error_at(
                    "default",
                    DiagnosticKind::InvalidFieldValue(format!(
                        "default {default} is not an enum member"
                    )),
                ));
            }
        }

        Ok(IntegerSchema {
            default,
            minimum,
            maximum,
            exclusive_minimum,
            exclusive_maximum,
            enumeration,
            format,
        })
    }

    fn parse_number(&mut self, object: &Map<String, Value>) -> ParseResult<NumberSchema> {
        let default = self.get_f64(object, "default")?;
        let mut minimum = self.get_f64(object, "minimum")?;
        let mut maximum = self.get_f64(object, "maximum")?;
        let exclusive_minimum = self.exclusive_bound(object, "exclusiveMinimum", &mut minimum, |p| {
            p.get_f64(object, "exclusiveMinimum")
        })?;
        let exclusive_maximum = self.exclusive_bound(object, "exclusiveMaximum", &mut maximum, |p| {
            p.get_f64(object, "exclusiveMaximum")
        })?;

        let format = match self.get_format(object)? {
            None => None,
            Some(f) => match NumberFormat::parse(f) {
                Some(format) => Some(format),
                None => {
                    let kind = DiagnosticKind::FormatUnsupported(f.to_string());
                    return Err(self.error_at("format", kind));
                }
            },
        };

        Ok(NumberSchema {
            default,
            minimum,
            maximum,
            exclusive_minimum,
            exclusive_maximum,
            format,
        })
    }

    fn parse_string(&mut self, object: &Map<String, Value>) -> ParseResult<StringSchema> {
        let default = match object.get("default") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(self.error_at(
                    "default",
                    DiagnosticKind::InvalidFieldValue(format!("expected string, got {other}")),
                ))
            }
        };
        let pattern = match object.get("pattern") {
            None => None,
            Some(Value::String(s)) => {
                if let Err(err) = regex::Regex::new(s) {
                    return Err(self.error_at(
                        "pattern",
                        DiagnosticKind::InvalidFieldValue(format!("bad regex: {err}")),
                    ));
                }
                Some(s.clone())
            }
            Some(other) => {
                return Err(self.error_at(
                    "pattern",
                    DiagnosticKind::InvalidFieldValue(format!("expected string, got {other}")),
                ))
            }
        };
        let min_length = self.get_u64(object, "minLength")?;
        let max_length = self.get_u64(object, "maxLength")?;

        let format = match self.get_format(object)? {
            None => None,
            Some(f) => match StringFormat::parse(f) {
                Some(format) => Some(format),
                None => {
                    let kind = DiagnosticKind::FormatUnsupported(f.to_string());
                    return Err(self.error_at("format", kind));
                }
            },
        };

        let enumeration = match object.get("enum") {
            None => None,
            Some(value) => Some(self.in_segment("enum", |p| {
                let items = p.enum_items(value)?;
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.clone()),
                        other => Err(p.error(DiagnosticKind::EnumTypeMismatch(format!(
                            "expected string, got {other}"
                        )))),
                    })
                    .collect::<ParseResult<Vec<String>>>()
            })?),
        };

        if let (Some(items), Some(default)) = (&enumeration, &default) {
            if !items.contains(default) {
                return Err(self.error_at(
                    "default",
                    DiagnosticKind::InvalidFieldValue(format!(
                        "default \"{default}\" is not an enum member"
                    )),
                ));
            }
        }

        Ok(StringSchema {
            default,
            enumeration,
            pattern,
            min_length,
            max_length,
            format,
        })
    }

    fn enum_items<'a>(&self, value: &'a Value) -> ParseResult<&'a Vec<Value>> {
        match value {
            Value::Array(items) if !items.is_empty() => Ok(items),
            Value::Array(_) => Err(self.error(DiagnosticKind::InvalidFieldValue(
                "enum must be non-empty".to_string(),
            ))),
            other => Err(self.error(DiagnosticKind::InvalidFieldValue(format!(
                "enum must be an array, got {other}"
            )))),
        }
    }

    // ===== Containers =====

    fn parse_array(&mut self, object: &Map<String, Value>) -> ParseResult<ArraySchema> {
        let Some(items) = object.get("items") else {
            return Err(self.error(DiagnosticKind::InvalidFieldValue(
                "\"items\" is missing".to_string(),
            )));
        };
        let items = self.in_segment("items", |p| p.parse(items))?;
        Ok(ArraySchema {
            items: Box::new(items),
            min_items: self.get_u64(object, "minItems")?,
            max_items: self.get_u64(object, "maxItems")?,
        })
    }

    fn parse_object(&mut self, object: &Map<String, Value>) -> ParseResult<ObjectSchema> {
        let mut properties = IndexMap::new();
        match object.get("properties") {
            None => {}
            Some(Value::Object(props)) => {
                self.in_segment("properties", |p| {
                    for (name, value) in props {
                        let schema = p.in_segment(name, |p| p.parse(value))?;
                        properties.insert(name.clone(), schema);
                    }
                    Ok(())
                })?;
            }
            Some(other) => {
                return Err(self.error_at(
                    "properties",
                    DiagnosticKind::InvalidFieldValue(format!("expected object, got {other}")),
                ))
            }
        }

        let mut required = Vec::new();
        match object.get("required") {
            None => {}
            Some(Value::Array(items)) => {
                for item in items {
                    let Some(name) = item.as_str() else {
                        return Err(self.error_at(
                            "required",
                            DiagnosticKind::InvalidFieldValue(format!(
                                "expected string, got {item}"
                            )),
                        ));
                    };
                    if !properties.contains_key(name) {
                        return Err(self.error_at(
                            "required",
                            DiagnosticKind::RequiredMissingProperty(name.to_string()),
                        ));
                    }
                    required.push(name.to_string());
                }
            }
            Some(other) => {
                return Err(self.error_at(
                    "required",
                    DiagnosticKind::InvalidFieldValue(format!("expected array, got {other}")),
                ))
            }
        }

        let additional_properties = match object.get("additionalProperties") {
            None => AdditionalProperties::Bool(false),
            Some(Value::Bool(b)) => AdditionalProperties::Bool(*b),
            Some(value) => {
                let schema = self.in_segment("additionalProperties", |p| p.parse(value))?;
                AdditionalProperties::Schema(Box::new(schema))
            }
        };

        Ok(ObjectSchema {
            properties,
            required,
            additional_properties,
        })
    }

    // ===== References =====

    fn parse_ref(&mut self, object: &Map<String, Value>) -> ParseResult<Schema> {
        for key in object.keys() {
            let allowed = match key.as_str() {
                "$ref" | "description" => true,
                other => matches!(
                    VendorKey::parse(other),
                    Some(VendorKey::Indirect | VendorKey::Name)
                ),
            };
            if !allowed {
                return Err(self.error(DiagnosticKind::UnknownField {
                    field: key.clone(),
                    known: "$ref, description, x-usrv-cpp-indirect, x-usrv-cpp-name".to_string(),
                }));
            }
        }

        let reference = match object.get("$ref") {
            Some(Value::String(s)) => self.normalize_ref(s),
            Some(other) => {
                return Err(self.error_at(
                    "$ref",
                    DiagnosticKind::InvalidFieldValue(format!("expected string, got {other}")),
                ))
            }
            None => return Err(self.error(DiagnosticKind::TypeMissing)),
        };

        let placeholder = SchemaKind::Boolean(BooleanSchema::default());
        let mut schema = self.finish(object, &["$ref"], placeholder)?;
        let indirect = schema
            .extensions
            .get_bool(&VendorKey::Indirect, &schema.source_location)?
            .unwrap_or(false);
        schema.kind = SchemaKind::Ref(RefSchema {
            reference,
            indirect,
            self_ref: false,
            target: None,
        });
        Ok(schema)
    }

    /// Turn a ref into `<vfilepath>#<pointer>`.
    fn normalize_ref(&self, reference: &str) -> String {
        if reference.starts_with('#') {
            return format!("{}{}", self.full_vfilepath, reference);
        }

        let (file, pointer) = match reference.split_once('#') {
            Some((file, pointer)) => (file, pointer),
            None => (reference, ""),
        };

        let joined = if let Some(absolute) = file.strip_prefix('/') {
            let erased = if self.config.erase_prefix.is_empty() {
                absolute
            } else {
                let prefix = self.config.erase_prefix.trim_start_matches('/');
                absolute.strip_prefix(prefix).unwrap_or(absolute)
            };
            erased.trim_start_matches('/').to_string()
        } else {
            match self.full_vfilepath.rsplit_once('/') {
                Some((dir, _)) => format!("{dir}/{file}"),
                None => file.to_string(),
            }
        };

        format!("{}#{}", normalize_path(&joined), pointer)
    }

    // ===== Compositions =====

    fn parse_all_of(&mut self, object: &Map<String, Value>) -> ParseResult<Schema> {
        let items = self.composition_items(object, "allOf")?;
        let all_of = self.in_segment("allOf", |p| {
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    p.in_segment(&i.to_string(), |p| {
                        let schema = p.parse(item)?;
                        if matches!(schema.kind, SchemaKind::Object(_) | SchemaKind::Ref(_)) {
                            Ok(schema)
                        } else {
                            Err(p.error(DiagnosticKind::InvalidFieldValue(format!(
                                "allOf item must be an object or a $ref, got {}",
                                schema.kind.name()
                            ))))
                        }
                    })
                })
                .collect::<ParseResult<Vec<_>>>()
        })?;

        self.finish(object, ALL_OF_FIELDS, SchemaKind::AllOf(AllOfSchema { all_of }))
    }

    fn parse_one_of(&mut self, object: &Map<String, Value>) -> ParseResult<Schema> {
        let items = self.composition_items(object, "oneOf")?;
        let one_of = self.in_segment("oneOf", |p| {
            items
                .iter()
                .enumerate()
                .map(|(i, item)| p.in_segment(&i.to_string(), |p| p.parse(item)))
                .collect::<ParseResult<Vec<_>>>()
        })?;

        let kind = match object.get("discriminator") {
            None => SchemaKind::OneOf(OneOfSchema { one_of }),
            Some(discriminator) => {
                let kind = self.in_segment("discriminator", |p| {
                    p.parse_discriminator(discriminator, one_of)
                })?;
                SchemaKind::OneOfWithDiscriminator(kind)
            }
        };

        self.finish(object, ONE_OF_FIELDS, kind)
    }

    fn composition_items<'a>(
        &mut self,
        object: &'a Map<String, Value>,
        key: &str,
    ) -> ParseResult<&'a Vec<Value>> {
        match object.get(key) {
            Some(Value::Array(items)) if !items.is_empty() => Ok(items),
            Some(Value::Array(_)) => Err(self.error_at(
                key,
                DiagnosticKind::InvalidFieldValue(format!("\"{key}\" must be non-empty")),
            )),
            other => Err(self.error_at(
                key,
                DiagnosticKind::InvalidFieldValue(format!(
                    "\"{key}\" must be an array, got {}",
                    other.unwrap_or(&Value::Null)
                )),
            )),
        }
    }

    fn parse_discriminator(
        &mut self,
        value: &Value,
        one_of: Vec<Schema>,
    ) -> ParseResult<OneOfWithDiscriminatorSchema> {
        let Some(object) = value.as_object() else {
            return Err(self.error(DiagnosticKind::DiscriminatorViolation(format!(
                "discriminator must be an object, got {value}"
            ))));
        };
        self.check_fields(object, DISCRIMINATOR_FIELDS)?;

        let property_name = match object.get("propertyName") {
            Some(Value::String(s)) => s.clone(),
            _ => {
                return Err(self.error(DiagnosticKind::DiscriminatorViolation(
                    "\"propertyName\" must be a string".to_string(),
                )))
            }
        };

        let mut refs = Vec::with_capacity(one_of.len());
        for variant in &one_of {
            let Some(r) = variant.as_ref_schema() else {
                return Err(self.error(DiagnosticKind::DiscriminatorViolation(format!(
                    "oneOf item at \"{}\" must be a $ref, got {}",
                    variant.source_location.location,
                    variant.kind.name()
                ))));
            };
            if refs.contains(&r.reference) {
                return Err(self.error(DiagnosticKind::DiscriminatorViolation(format!(
                    "duplicate $ref \"{}\" in oneOf",
                    r.reference
                ))));
            }
            refs.push(r.reference.clone());
        }

        let mapping = match object.get("mapping") {
            None => refs
                .iter()
                .map(|r| vec![r.rsplit('/').next().unwrap_or(r).to_string()])
                .collect(),
            Some(mapping) => self.in_segment("mapping", |p| p.reorder_mapping(mapping, &refs))?,
        };

        for reference in &refs {
            let Some(target) = self.schemas.get(reference) else {
                continue;
            };
            let lookup = |key: &str| self.schemas.get(key);
            match find_property(target, &property_name, &lookup) {
                PropertyLookup::Present | PropertyLookup::Unresolved => {}
                PropertyLookup::Missing => {
                    return Err(self.error(DiagnosticKind::DiscriminatorViolation(format!(
                        "no discriminator property \"{property_name}\" in \"{reference}\""
                    ))))
                }
                PropertyLookup::NotAnObject => {
                    return Err(self.error(DiagnosticKind::DiscriminatorViolation(format!(
                        "\"{reference}\" is not an object"
                    ))))
                }
            }
        }

        Ok(OneOfWithDiscriminatorSchema {
            one_of,
            property_name,
            mapping,
        })
    }

    /// Bring a user `mapping` (value -> ref) into oneOf order.
    fn reorder_mapping(
        &mut self,
        mapping: &Value,
        refs: &[String],
    ) -> ParseResult<Vec<Vec<String>>> {
        let Some(mapping) = mapping.as_object() else {
            return Err(self.error(DiagnosticKind::DiscriminatorViolation(format!(
                "mapping must be an object, got {mapping}"
            ))));
        };

        let mut result: Vec<Vec<String>> = vec![Vec::new(); refs.len()];
        for (value, reference) in mapping {
            let Some(reference) = reference.as_str() else {
                return Err(self.error(DiagnosticKind::DiscriminatorViolation(format!(
                    "mapping value for \"{value}\" must be a string, got {reference}"
                ))));
            };
            let reference = self.normalize_ref(reference);
            let Some(index) = refs.iter().position(|r| *r == reference) else {
                return Err(self.error(DiagnosticKind::DiscriminatorViolation(format!(
                    "mapping refers to \"{reference}\" which is not in oneOf"
                ))));
            };
            result[index].push(value.clone());
        }

        if let Some(index) = result.iter().position(Vec::is_empty) {
            return Err(self.error(DiagnosticKind::DiscriminatorViolation(format!(
                "no mapping for \"{}\"",
                refs[index]
            ))));
        }
        Ok(result)
    }
}

/// Collapse `.` and `..` segments of a `/`-separated path.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
