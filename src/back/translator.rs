//! Schema to C++ translation
//!
//! Lowers [`ResolvedSchemas`] into the [`CppTypes`] arena: names every type,
//! applies vendor extensions, checks user-type includes and finally patches
//! ref targets once all types exist.

use std::collections::HashSet;
use std::path::PathBuf;

use heck::ToUpperCamelCase;
use indexmap::IndexMap;
use serde_json::{Number, Value};
use tracing::debug;

use crate::config::{ChaoticConfig, RuntimeConfig};
use crate::error::{Diagnostic, DiagnosticKind, SourceLocation};
use crate::front::types::{
    AdditionalProperties, IntegerFormat, NumberFormat, ResolvedSchemas, Schema, SchemaKind,
    StringFormat, VendorKey,
};
use crate::name_map::NameMap;

use super::types::{
    io_include_path, ArrayValidator, CppName, CppStructField, CppType, CppTypeKind, CppTypes,
    DiscriminatedVariant, ExternalType, ExtraType, PrimitiveValidator, RefTarget, StringEnumItem,
    TypeId,
};

type TranslateResult<T> = Result<T, Diagnostic>;

const COMPOSITE_KEYS: &[VendorKey] = &[VendorKey::Type];
const SCALAR_KEYS: &[VendorKey] = &[VendorKey::Type, VendorKey::TypedefTag];
const ARRAY_KEYS: &[VendorKey] = &[VendorKey::Type, VendorKey::Container];
const OBJECT_KEYS: &[VendorKey] = &[
    VendorKey::Type,
    VendorKey::ExtraType,
    VendorKey::ExtraMember,
    VendorKey::StrictParsing,
];
const REF_KEYS: &[VendorKey] = &[VendorKey::Indirect];

/// Translator settings
#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    /// Virtual file -> C++ namespace
    pub namespaces: IndexMap<String, String>,
    /// In-file path -> type name
    pub infile_to_name: NameMap,
    /// Search path for user-type headers; `None` skips the check
    pub include_dirs: Option<Vec<PathBuf>>,
    pub strict_parsing: bool,
    pub autodiscover_default_dict: bool,
    pub runtime: RuntimeConfig,
}

impl GeneratorConfig {
    pub fn from_config(config: &ChaoticConfig, infile_to_name: NameMap) -> Self {
        Self {
            namespaces: config
                .namespaces
                .iter()
                .map(|rule| (rule.file.clone(), rule.namespace.clone()))
                .collect(),
            infile_to_name,
            include_dirs: None,
            strict_parsing: config.generator.strict_parsing,
            autodiscover_default_dict: config.generator.autodiscover_default_dict,
            runtime: config.runtime.clone(),
        }
    }
}

/// Translates resolved schemas into C++ types
pub struct Generator {
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Translate every schema of `resolved`, in order. Refs may land in
    /// `external`, the output of an earlier run.
    pub fn generate_types(
        &self,
        resolved: &ResolvedSchemas,
        external: Option<&CppTypes>,
    ) -> TranslateResult<CppTypes> {
        let mut state = Translation {
            config: &self.config,
            types: CppTypes::new(),
            refs: Vec::new(),
        };

        for (path, schema) in resolved.iter() {
            let (vfilepath, infile_path) = path.split_once('#').unwrap_or((path.as_str(), ""));
            let name = self.fq_name(vfilepath, infile_path, &schema.source_location)?;
            let key = name.to_string();
            if state.types.types.contains_key(&key) {
                let kind = DiagnosticKind::DuplicatePath(key);
                return Err(Diagnostic::new(&schema.source_location, kind));
            }

            let scope = Scope {
                namespace: infile_path,
            };
            let id = state.translate(name, schema, &scope)?;
            state.types.types.insert(key, id);
            state.types.by_schema_path.insert(path.clone(), id);
        }

        state.fixup_refs(external)?;
        debug!(
            "Translated {} schemas into {} types",
            state.types.types.len(),
            state.types.len()
        );
        Ok(state.types)
    }

    fn fq_name(
        &self,
        vfilepath: &str,
        infile_path: &str,
        source: &SourceLocation,
    ) -> TranslateResult<CppName> {
        let Some(name) = self.config.infile_to_name.apply(infile_path) else {
            let kind = DiagnosticKind::NameNotMapped(infile_path.to_string());
            return Err(Diagnostic::new(source, kind));
        };
        let namespace = self.config.namespaces.get(vfilepath).map(String::as_str).unwrap_or("");
        Ok(CppName::from_full(&format!("{namespace}::{name}")))
    }
}

/// Per-top-level context for nested types
struct Scope<'a> {
    /// In-file path of the top-level schema; names the validator constants
    namespace: &'a str,
}

struct Translation<'a> {
    config: &'a GeneratorConfig,
    types: CppTypes,
    refs: Vec<TypeId>,
}

impl Translation<'_> {
    fn translate(
        &mut self,
        name: CppName,
        schema: &Schema,
        scope: &Scope,
    ) -> TranslateResult<TypeId> {
        let (kind, allowed): (_, &[VendorKey]) = match &schema.kind {
            SchemaKind::Boolean(_)
            | SchemaKind::Integer(_)
            | SchemaKind::Number(_)
            | SchemaKind::String(_) => {
                return self.translate_scalar(name, schema, scope);
            }
            SchemaKind::Array(_) => return self.translate_array(name, schema, scope),
            SchemaKind::Object(_) => return self.translate_object(name, schema, scope),
            SchemaKind::AllOf(all_of) => {
                let parents = all_of
                    .all_of
                    .iter()
                    .enumerate()
                    .map(|(i, parent)| {
                        self.translate(name.add_suffix(&format!("__P{i}")), parent, scope)
                    })
                    .collect::<TranslateResult<Vec<_>>>()?;
                (CppTypeKind::StructAllOf { parents }, COMPOSITE_KEYS)
            }
            SchemaKind::OneOf(one_of) => {
                let variants = one_of
                    .one_of
                    .iter()
                    .enumerate()
                    .map(|(i, variant)| {
                        self.translate(name.add_suffix(&format!("__O{i}")), variant, scope)
                    })
                    .collect::<TranslateResult<Vec<_>>>()?;
                (CppTypeKind::Variant { variants }, COMPOSITE_KEYS)
            }
            SchemaKind::OneOfWithDiscriminator(one_of) => {
                let variants = one_of
                    .one_of
                    .iter()
                    .zip(&one_of.mapping)
                    .enumerate()
                    .map(|(i, (variant, values))| {
                        let variant_name = name.add_suffix(&format!("__O{i}"));
                        let schema = self.translate(variant_name, variant, scope)?;
                        Ok(DiscriminatedVariant {
                            values: values.clone(),
                            schema,
                        })
                    })
                    .collect::<TranslateResult<Vec<_>>>()?;
                (
                    CppTypeKind::VariantWithDiscriminator {
                        property_name: one_of.property_name.clone(),
                        variants,
                    },
                    COMPOSITE_KEYS,
                )
            }
            SchemaKind::Ref(r) => {
                let kind = CppTypeKind::Ref {
                    reference: r.target.clone().unwrap_or_else(|| r.reference.clone()),
                    target: None,
                    indirect: r.indirect,
                    self_ref: r.self_ref,
                };
                self.check_vendor_keys(schema, REF_KEYS, kind.name())?;
                let id = self.add(Some(name), schema, None, kind);
                self.refs.push(id);
                return Ok(id);
            }
        };

        self.check_vendor_keys(schema, allowed, kind.name())?;
        let user_cpp_type = self.user_cpp_type(schema)?;
        Ok(self.add(Some(name), schema, user_cpp_type, kind))
    }

    fn add(
        &mut self,
        name: Option<CppName>,
        schema: &Schema,
        user_cpp_type: Option<String>,
        kind: CppTypeKind,
    ) -> TypeId {
        self.types.add(CppType {
            name,
            source: schema.source_location.clone(),
            description: schema.description.clone(),
            user_cpp_type,
            nullable: schema.nullable,
            only_json_reason: None,
            kind,
        })
    }

    // ===== Vendor extensions =====

    fn check_vendor_keys(
        &self,
        schema: &Schema,
        allowed: &[VendorKey],
        variant: &str,
    ) -> TranslateResult<()> {
        for key in schema.extensions.keys() {
            if *key == VendorKey::Name || allowed.contains(key) {
                continue;
            }
            return Err(Diagnostic::new(
                &schema.source_location,
                DiagnosticKind::UnknownVendorExtension {
                    key: key.to_string(),
                    variant: variant.to_string(),
                },
            ));
        }
        Ok(())
    }

    /// `x-usrv-cpp-type`, with its header checked against the include dirs
    fn user_cpp_type(&self, schema: &Schema) -> TranslateResult<Option<String>> {
        let source = &schema.source_location;
        let Some(user) = schema.extensions.get_str(&VendorKey::Type, source)? else {
            return Ok(None);
        };
        self.check_include(user, source)?;
        Ok(Some(user.to_string()))
    }

    fn check_include(&self, user_cpp_type: &str, source: &SourceLocation) -> TranslateResult<()> {
        let Some(include_dirs) = &self.config.include_dirs else {
            return Ok(());
        };
        let include = io_include_path(user_cpp_type, &self.config.runtime);
        if include_dirs.iter().any(|dir| dir.join(&include).exists()) {
            return Ok(());
        }
        let tried: Vec<String> = include_dirs
            .iter()
            .map(|dir| dir.join(&include).display().to_string())
            .collect();
        Err(Diagnostic::new(
            source,
            DiagnosticKind::IncludeNotFound {
                include,
                tried: tried.join(", "),
            },
        ))
    }

    // ===== Scalars =====

    fn translate_scalar(
        &mut self,
        name: CppName,
        schema: &Schema,
        scope: &Scope,
    ) -> TranslateResult<TypeId> {
        let config = self.config;
        let runtime = &config.runtime;
        let mut validators = PrimitiveValidator {
            namespace: scope.namespace.to_string(),
            prefix: name.last_component().to_string(),
            ..Default::default()
        };

        let kind = match &schema.kind {
            SchemaKind::Boolean(b) => CppTypeKind::Primitive {
                raw_cpp_type: "bool".to_string(),
                default: b.default.map(Value::Bool).unwrap_or(Value::Null),
                validators,
            },
            SchemaKind::Integer(int) => {
                if let Some(enums) = &int.enumeration {
                    self.check_vendor_keys(schema, &[], "integer enum")?;
                    let kind = CppTypeKind::IntEnum {
                        enums: enums.clone(),
                        default: int.default,
                    };
                    return Ok(self.add(Some(name), schema, None, kind));
                }
                validators.minimum = int.minimum.map(Number::from);
                validators.maximum = int.maximum.map(Number::from);
                validators.exclusive_minimum = int.exclusive_minimum.map(Number::from);
                validators.exclusive_maximum = int.exclusive_maximum.map(Number::from);
                let raw_cpp_type = match int.format {
                    None => "int",
                    Some(IntegerFormat::Int32) => "std::int32_t",
                    Some(IntegerFormat::Int64) => "std::int64_t",
                };
                CppTypeKind::Primitive {
                    raw_cpp_type: raw_cpp_type.to_string(),
                    default: int.default.map(Value::from).unwrap_or(Value::Null),
                    validators,
                }
            }
            SchemaKind::Number(num) => {
                validators.minimum = num.minimum.and_then(Number::from_f64);
                validators.maximum = num.maximum.and_then(Number::from_f64);
                validators.exclusive_minimum = num.exclusive_minimum.and_then(Number::from_f64);
                validators.exclusive_maximum = num.exclusive_maximum.and_then(Number::from_f64);
                let raw_cpp_type = match num.format {
                    Some(NumberFormat::Float) => "float",
                    None | Some(NumberFormat::Double) => "double",
                };
                CppTypeKind::Primitive {
                    raw_cpp_type: raw_cpp_type.to_string(),
                    default: num
                        .default
                        .and_then(Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                    validators,
                }
            }
            SchemaKind::String(string) => {
                if let Some(enums) = &string.enumeration {
                    self.check_vendor_keys(schema, &[], "string enum")?;
                    let kind = CppTypeKind::StringEnum {
                        enums: string_enum_items(enums, &schema.source_location)?,
                        default: string.default.clone(),
                    };
                    return Ok(self.add(Some(name), schema, None, kind));
                }
                if let Some(format) = string.format {
                    let format_cpp_type = match format {
                        StringFormat::Date => &runtime.date,
                        StringFormat::DateTime => &runtime.date_time,
                        StringFormat::DateTimeIsoBasic => &runtime.date_time_iso_basic,
                        StringFormat::Uuid => &runtime.uuid,
                    };
                    CppTypeKind::StringWithFormat {
                        format,
                        format_cpp_type: format_cpp_type.clone(),
                        default: string.default.clone(),
                    }
                } else {
                    validators.min_length = string.min_length;
                    validators.max_length = string.max_length;
                    validators.pattern = string.pattern.clone();
                    CppTypeKind::Primitive {
                        raw_cpp_type: runtime.string.clone(),
                        default: string.default.clone().map(Value::String).unwrap_or(Value::Null),
                        validators,
                    }
                }
            }
            _ => unreachable!("translate_scalar called for {}", schema.kind.name()),
        };

        self.check_vendor_keys(schema, SCALAR_KEYS, kind.name())?;
        let mut user_cpp_type = self.user_cpp_type(schema)?;
        if let Some(tag) = schema
            .extensions
            .get_str(&VendorKey::TypedefTag, &schema.source_location)?
        {
            if user_cpp_type.is_some() {
                return Err(Diagnostic::new(
                    &schema.source_location,
                    DiagnosticKind::VendorConflict(format!(
                        "\"{}\" and \"{}\" are mutually exclusive",
                        VendorKey::TypedefTag,
                        VendorKey::Type
                    )),
                ));
            }
            let raw = match &kind {
                CppTypeKind::Primitive { raw_cpp_type, .. } => raw_cpp_type,
                CppTypeKind::StringWithFormat { format_cpp_type, .. } => format_cpp_type,
                _ => unreachable!("typedef tag on {}", kind.name()),
            };
            user_cpp_type = Some(format!("{}<{}, {}>", runtime.strong_typedef, tag, raw));
        }

        Ok(self.add(Some(name), schema, user_cpp_type, kind))
    }

    // ===== Containers =====

    fn translate_array(
        &mut self,
        name: CppName,
        schema: &Schema,
        scope: &Scope,
    ) -> TranslateResult<TypeId> {
        let SchemaKind::Array(array) = &schema.kind else {
            unreachable!("translate_array called for {}", schema.kind.name());
        };
        self.check_vendor_keys(schema, ARRAY_KEYS, "array")?;

        let items = self.translate(name.add_suffix("A"), &array.items, scope)?;

        let mut user_cpp_type = schema
            .extensions
            .get_str(&VendorKey::Type, &schema.source_location)?
            .map(str::to_string);
        let container = match schema
            .extensions
            .get_str(&VendorKey::Container, &schema.source_location)?
        {
            Some(container) => container.to_string(),
            None => match user_cpp_type.take() {
                // set-like user types name the container itself
                Some(user) if self.config.runtime.set_like_containers.contains(&user) => user,
                other => {
                    user_cpp_type = other;
                    self.config.runtime.array_container.clone()
                }
            },
        };
        if let Some(user) = &user_cpp_type {
            self.check_include(user, &schema.source_location)?;
        }

        let validators = ArrayValidator {
            min_items: array.min_items,
            max_items: array.max_items,
            namespace: scope.namespace.to_string(),
            prefix: name.last_component().to_string(),
        };
        let kind = CppTypeKind::Array {
            items,
            container,
            validators,
        };
        Ok(self.add(None, schema, user_cpp_type, kind))
    }

    fn translate_object(
        &mut self,
        name: CppName,
        schema: &Schema,
        scope: &Scope,
    ) -> TranslateResult<TypeId> {
        let SchemaKind::Object(object) = &schema.kind else {
            unreachable!("translate_object called for {}", schema.kind.name());
        };
        self.check_vendor_keys(schema, OBJECT_KEYS, "object")?;
        let source = &schema.source_location;

        let mut fields = IndexMap::with_capacity(object.properties.len());
        let mut type_names: HashSet<String> = HashSet::with_capacity(object.properties.len());
        for (field_name, field_schema) in &object.properties {
            let cpp_name = match field_schema
                .extensions
                .get_str(&VendorKey::Name, &field_schema.source_location)?
            {
                Some(renamed) => renamed.to_string(),
                None => cpp_identifier(field_name),
            };

            let mut type_name = field_name.to_upper_camel_case();
            if type_name.is_empty() {
                type_name = "Field".to_string();
            }
            while type_name == *field_name
                || type_name == cpp_name
                || type_name == name.last_component()
                || type_names.contains(&type_name)
            {
                type_name.push('_');
            }
            type_names.insert(type_name.clone());

            let field_type = self.translate(name.joinns(&type_name), field_schema, scope)?;
            fields.insert(
                field_name.clone(),
                CppStructField {
                    name: field_name.clone(),
                    cpp_name,
                    required: object.required.contains(field_name),
                    schema: field_type,
                },
            );
        }

        let extra_member = schema.extensions.get_bool(&VendorKey::ExtraMember, source)?;
        let extra_type = match &object.additional_properties {
            AdditionalProperties::Bool(false) => ExtraType::Disabled,
            AdditionalProperties::Bool(true) => ExtraType::Any {
                member: extra_member.unwrap_or(true),
            },
            AdditionalProperties::Schema(extra) => {
                if extra_member.is_some() {
                    return Err(Diagnostic::new(source, DiagnosticKind::ExtraMemberMisuse));
                }
                ExtraType::Typed(self.translate(name.joinns("Extra"), extra, scope)?)
            }
        };
        let extra_container = schema
            .extensions
            .get_str(&VendorKey::ExtraType, source)?
            .unwrap_or(&self.config.runtime.extra_container)
            .to_string();
        let strict_parsing = schema
            .extensions
            .get_bool(&VendorKey::StrictParsing, source)?
            .unwrap_or(self.config.strict_parsing);

        let mut default_dict = false;
        if self.config.autodiscover_default_dict {
            if let (AdditionalProperties::Schema(extra), Some(default)) =
                (&object.additional_properties, object.properties.get("__default__"))
            {
                if object.properties.len() == 1
                    && default.without_metadata() == extra.without_metadata()
                {
                    default_dict = true;
                    if let Some(field) = fields.get_mut("__default__") {
                        field.required = false;
                    }
                }
            }
        }

        let user_cpp_type = self.user_cpp_type(schema)?;
        let kind = CppTypeKind::Struct {
            fields,
            extra_type,
            extra_container,
            strict_parsing,
            default_dict,
        };
        Ok(self.add(Some(name), schema, user_cpp_type, kind))
    }

    // ===== Ref fixup =====

    fn fixup_refs(&mut self, external: Option<&CppTypes>) -> TranslateResult<()> {
        for id in std::mem::take(&mut self.refs) {
            let (reference, source) = match &self.types.get(id).kind {
                CppTypeKind::Ref { reference, .. } => {
                    (reference.clone(), self.types.get(id).source.clone())
                }
                _ => continue,
            };

            let resolved = if let Some(local) = self.types.by_schema_path.get(&reference) {
                RefTarget::Local(*local)
            } else if let Some((pool, target)) =
                external.and_then(|pool| pool.by_schema_path.get(&reference).map(|id| (pool, *id)))
            {
                let node = pool.get(target);
                RefTarget::External(ExternalType {
                    name: node.name.clone(),
                    user_cpp_name: pool.cpp_user_name(target, &self.config.runtime),
                    source: node.source.clone(),
                    only_json_reason: node.only_json_reason.clone(),
                })
            } else {
                return Err(Diagnostic::new(&source, DiagnosticKind::RefUnresolved(reference)));
            };

            if let CppTypeKind::Ref { target, .. } = &mut self.types.get_mut(id).kind {
                *target = Some(resolved);
            }
        }
        Ok(())
    }
}

/// Enumerator names: `kFooBar` for `foo-bar`
fn string_enum_items(
    enums: &[String],
    source: &SourceLocation,
) -> TranslateResult<Vec<StringEnumItem>> {
    let mut items: Vec<StringEnumItem> = Vec::with_capacity(enums.len());
    for raw in enums {
        let sanitized: String = raw
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let mut camel = sanitized.to_upper_camel_case();
        if camel.is_empty() {
            camel = "Empty".to_string();
        }
        let cpp_name = format!("k{camel}");
        if let Some(clash) = items.iter().find(|item| item.cpp_name == cpp_name) {
            return Err(Diagnostic::new(
                source,
                DiagnosticKind::InvalidFieldValue(format!(
                    "enum items \"{}\" and \"{raw}\" both map to {cpp_name}",
                    clash.raw_name
                )),
            ));
        }
        items.push(StringEnumItem {
            raw_name: raw.clone(),
            cpp_name,
        });
    }
    Ok(items)
}

const CPP_KEYWORDS: &[&str] = &[
    "alignas", "alignof", "and", "asm", "auto", "bool", "break", "case", "catch", "char", "class",
    "const", "constexpr", "continue", "default", "delete", "do", "double", "else", "enum",
    "explicit", "export", "extern", "false", "float", "for", "friend", "goto", "if", "inline",
    "int", "long", "mutable", "namespace", "new", "not", "nullptr", "operator", "or", "private",
    "protected", "public", "register", "return", "short", "signed", "sizeof", "static", "struct",
    "switch", "template", "this", "throw", "true", "try", "typedef", "typename", "union",
    "unsigned", "using", "virtual", "void", "volatile", "while", "xor",
];

/// Field name usable as a C++ member
pub fn cpp_identifier(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if result.is_empty() || result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }
    if CPP_KEYWORDS.contains(&result.as_str()) {
        result.push('_');
    }
    result
}
