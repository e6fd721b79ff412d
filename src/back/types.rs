//! Target IR
//!
//! C++ types produced by the translator. Nodes live in an arena
//! ([`CppTypes`]) and refer to each other by [`TypeId`]; owning edges form a
//! DAG, while [`CppTypeKind::Ref`] edges may close cycles through indirect or
//! self references.

use std::collections::HashMap;
use std::fmt;

use heck::ToSnakeCase;
use indexmap::IndexMap;
use serde_json::{Number, Value};

use crate::config::RuntimeConfig;
use crate::error::SourceLocation;
use crate::front::types::StringFormat;

/// Index into [`CppTypes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub usize);

// =============================================================================
// Names
// =============================================================================

/// `::`-separated C++ name
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CppName {
    components: Vec<String>,
}

impl CppName {
    pub fn from_full(full: &str) -> Self {
        Self {
            components: full
                .split("::")
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Nested name `self::name`
    pub fn joinns(&self, name: &str) -> Self {
        let mut components = self.components.clone();
        components.push(name.to_string());
        Self { components }
    }

    /// Same scope, last component suffixed
    pub fn add_suffix(&self, suffix: &str) -> Self {
        let mut components = self.components.clone();
        match components.last_mut() {
            Some(last) => last.push_str(suffix),
            None => components.push(suffix.to_string()),
        }
        Self { components }
    }

    pub fn last_component(&self) -> &str {
        self.components.last().map(String::as_str).unwrap_or("")
    }

    /// Enclosing scope, `a::b` for `a::b::C`
    pub fn namespace(&self) -> String {
        match self.components.split_last() {
            Some((_, scope)) => scope.join("::"),
            None => String::new(),
        }
    }

    pub fn in_global_scope(&self) -> String {
        format!("::{}", self.components.join("::"))
    }
}

impl fmt::Display for CppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components.join("::"))
    }
}

/// Header a user type is expected to live in: `io_include_dir/ns/type.hpp`
pub fn io_include_path(user_cpp_type: &str, runtime: &RuntimeConfig) -> String {
    let base = user_cpp_type.split('<').next().unwrap_or(user_cpp_type);
    let path: Vec<String> = base
        .split("::")
        .filter(|c| !c.is_empty())
        .map(|c| c.to_snake_case())
        .collect();
    format!("{}/{}.hpp", runtime.io_include_dir, path.join("/"))
}

// =============================================================================
// Nodes
// =============================================================================

/// A generated (or referenced) C++ type
#[derive(Debug, Clone, PartialEq)]
pub struct CppType {
    /// Raw generated name; arrays have none, their spelling is the container
    pub name: Option<CppName>,
    pub source: SourceLocation,
    pub description: Option<String>,
    /// Type override from `x-usrv-cpp-type` (or a typedef/default-dict wrapper)
    pub user_cpp_type: Option<String>,
    pub nullable: bool,
    /// Set by the format chooser when only JSON can represent this type
    pub only_json_reason: Option<String>,
    pub kind: CppTypeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CppTypeKind {
    Primitive {
        raw_cpp_type: String,
        default: Value,
        validators: PrimitiveValidator,
    },
    StringWithFormat {
        format: StringFormat,
        format_cpp_type: String,
        default: Option<String>,
    },
    IntEnum {
        enums: Vec<i64>,
        default: Option<i64>,
    },
    StringEnum {
        enums: Vec<StringEnumItem>,
        default: Option<String>,
    },
    Array {
        items: TypeId,
        container: String,
        validators: ArrayValidator,
    },
    Struct {
        fields: IndexMap<String, CppStructField>,
        extra_type: ExtraType,
        extra_container: String,
        strict_parsing: bool,
        /// Collapsed into the default-dict wrapper over the typed extras
        default_dict: bool,
    },
    StructAllOf {
        parents: Vec<TypeId>,
    },
    Variant {
        variants: Vec<TypeId>,
    },
    VariantWithDiscriminator {
        property_name: String,
        variants: Vec<DiscriminatedVariant>,
    },
    Ref {
        /// Schema path of the target, `<vfilepath>#<pointer>`
        reference: String,
        /// Filled in by the ref fixup
        target: Option<RefTarget>,
        indirect: bool,
        self_ref: bool,
    },
}

impl CppTypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Primitive { .. } => "primitive",
            Self::StringWithFormat { .. } => "string with format",
            Self::IntEnum { .. } => "integer enum",
            Self::StringEnum { .. } => "string enum",
            Self::Array { .. } => "array",
            Self::Struct { .. } => "object",
            Self::StructAllOf { .. } => "allOf",
            Self::Variant { .. } => "oneOf",
            Self::VariantWithDiscriminator { .. } => "oneOf with discriminator",
            Self::Ref { .. } => "$ref",
        }
    }
}

/// Bounds of a scalar, plus the names under which the generated checks live
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimitiveValidator {
    pub minimum: Option<Number>,
    pub maximum: Option<Number>,
    pub exclusive_minimum: Option<Number>,
    pub exclusive_maximum: Option<Number>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<String>,
    /// In-file path of the enclosing top-level schema
    pub namespace: String,
    pub prefix: String,
}

impl PrimitiveValidator {
    pub fn is_empty(&self) -> bool {
        self.minimum.is_none()
            && self.maximum.is_none()
            && self.exclusive_minimum.is_none()
            && self.exclusive_maximum.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.pattern.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayValidator {
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub namespace: String,
    pub prefix: String,
}

impl ArrayValidator {
    pub fn is_empty(&self) -> bool {
        self.min_items.is_none() && self.max_items.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringEnumItem {
    pub raw_name: String,
    pub cpp_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CppStructField {
    /// Property name in the document
    pub name: String,
    pub cpp_name: String,
    pub required: bool,
    pub schema: TypeId,
}

/// What a struct does with properties it does not declare
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraType {
    Disabled,
    /// Free-form extras; `member` keeps them in an `extra` field
    Any { member: bool },
    Typed(TypeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscriminatedVariant {
    pub values: Vec<String>,
    pub schema: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefTarget {
    Local(TypeId),
    External(ExternalType),
}

/// A type generated by an earlier run, seen through a ref
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalType {
    pub name: Option<CppName>,
    pub user_cpp_name: String,
    pub source: SourceLocation,
    pub only_json_reason: Option<String>,
}

// =============================================================================
// Arena
// =============================================================================

/// Every generated type, with the top-level ones indexed by name
#[derive(Debug, Clone, Default)]
pub struct CppTypes {
    nodes: Vec<CppType>,
    /// Fully-qualified name -> top-level type, in resolution order
    pub types: IndexMap<String, TypeId>,
    /// Schema path -> top-level type
    pub by_schema_path: HashMap<String, TypeId>,
}

impl CppTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: CppType) -> TypeId {
        self.nodes.push(node);
        TypeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: TypeId) -> &CppType {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut CppType {
        &mut self.nodes[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.nodes.len()).map(TypeId)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<&CppType> {
        self.types.get(name).map(|id| self.get(*id))
    }

    /// Children reached through owning edges
    pub fn owned_children(&self, id: TypeId) -> Vec<TypeId> {
        match &self.get(id).kind {
            CppTypeKind::Array { items, .. } => vec![*items],
            CppTypeKind::Struct { fields, extra_type, .. } => {
                let mut children: Vec<TypeId> = fields.values().map(|f| f.schema).collect();
                if let ExtraType::Typed(extra) = extra_type {
                    children.push(*extra);
                }
                children
            }
            CppTypeKind::StructAllOf { parents } => parents.clone(),
            CppTypeKind::Variant { variants } => variants.clone(),
            CppTypeKind::VariantWithDiscriminator { variants, .. } => {
                variants.iter().map(|v| v.schema).collect()
            }
            CppTypeKind::Primitive { .. }
            | CppTypeKind::StringWithFormat { .. }
            | CppTypeKind::IntEnum { .. }
            | CppTypeKind::StringEnum { .. }
            | CppTypeKind::Ref { .. } => Vec::new(),
        }
    }

    /// The node and every node it owns, parents before children
    pub fn subtree(&self, id: TypeId) -> Vec<TypeId> {
        let mut result = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            result.push(next);
            let mut children = self.owned_children(next);
            children.reverse();
            pending.extend(children);
        }
        result
    }

    /// Types whose C++ definition this generator writes
    pub fn has_generated_user_cpp_type(&self, id: TypeId) -> bool {
        matches!(
            self.get(id).kind,
            CppTypeKind::IntEnum { .. }
                | CppTypeKind::StringEnum { .. }
                | CppTypeKind::Struct { .. }
                | CppTypeKind::StructAllOf { .. }
                | CppTypeKind::Variant { .. }
                | CppTypeKind::VariantWithDiscriminator { .. }
        )
    }

    /// The generated spelling, ignoring any user override
    pub fn raw_cpp_name(&self, id: TypeId, runtime: &RuntimeConfig) -> String {
        self.raw_name_in(id, runtime, &mut Vec::new())
    }

    /// The spelling users of this type see
    pub fn cpp_user_name(&self, id: TypeId, runtime: &RuntimeConfig) -> String {
        self.user_name_in(id, runtime, &mut Vec::new())
    }

    /// Name of a node met again while it is being spelled. Only recursion
    /// through refs gets here; the C++ name of the node itself ends it.
    fn recursive_name(&self, id: TypeId) -> String {
        if let Some(name) = &self.get(id).name {
            return name.in_global_scope();
        }
        self.types
            .iter()
            .find(|(_, top)| **top == id)
            .map(|(name, _)| CppName::from_full(name).in_global_scope())
            .unwrap_or_default()
    }

    fn raw_name_in(
        &self,
        id: TypeId,
        runtime: &RuntimeConfig,
        visiting: &mut Vec<TypeId>,
    ) -> String {
        let node = self.get(id);
        match &node.kind {
            CppTypeKind::Primitive { raw_cpp_type, .. } => raw_cpp_type.clone(),
            CppTypeKind::StringWithFormat { format_cpp_type, .. } => format_cpp_type.clone(),
            CppTypeKind::Array { items, container, .. } => {
                if visiting.contains(&id) {
                    return self.recursive_name(id);
                }
                visiting.push(id);
                let items = self.user_name_in(*items, runtime, visiting);
                visiting.pop();
                format!("{container}<{items}>")
            }
            CppTypeKind::Ref { .. } => self.user_name_in(id, runtime, visiting),
            _ => node
                .name
                .as_ref()
                .map(CppName::in_global_scope)
                .unwrap_or_default(),
        }
    }

    fn user_name_in(
        &self,
        id: TypeId,
        runtime: &RuntimeConfig,
        visiting: &mut Vec<TypeId>,
    ) -> String {
        let node = self.get(id);
        if let Some(user) = &node.user_cpp_type {
            return user.clone();
        }
        match &node.kind {
            CppTypeKind::Struct {
                default_dict: true,
                extra_type: ExtraType::Typed(extra),
                ..
            } => {
                if visiting.contains(&id) {
                    return self.recursive_name(id);
                }
                visiting.push(id);
                let extra = self.user_name_in(*extra, runtime, visiting);
                visiting.pop();
                format!("{}<{}>", runtime.default_dict, extra)
            }
            CppTypeKind::Ref {
                reference,
                target,
                indirect,
                ..
            } => {
                let name = match target {
                    Some(RefTarget::Local(target)) => self.user_name_in(*target, runtime, visiting),
                    Some(RefTarget::External(external)) => external.user_cpp_name.clone(),
                    None => reference.clone(),
                };
                if *indirect {
                    format!("{}<{}>", runtime.box_type, name)
                } else {
                    name
                }
            }
            _ => self.raw_name_in(id, runtime, visiting),
        }
    }

    /// Follow refs to the type that is actually defined
    pub fn resolve_ref(&self, id: TypeId) -> TypeId {
        let mut current = id;
        for _ in 0..self.nodes.len() {
            match &self.get(current).kind {
                CppTypeKind::Ref {
                    target: Some(RefTarget::Local(target)),
                    ..
                } => current = *target,
                _ => break,
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primitive(raw: &str) -> CppType {
        CppType {
            name: Some(CppName::from_full("ns::T")),
            source: SourceLocation::default(),
            description: None,
            user_cpp_type: None,
            nullable: false,
            only_json_reason: None,
            kind: CppTypeKind::Primitive {
                raw_cpp_type: raw.to_string(),
                default: Value::Null,
                validators: PrimitiveValidator::default(),
            },
        }
    }

    #[test]
    fn test_cpp_name_ops() {
        let name = CppName::from_full("::ns::inner::Foo");
        assert_eq!(name.to_string(), "ns::inner::Foo");
        assert_eq!(name.in_global_scope(), "::ns::inner::Foo");
        assert_eq!(name.namespace(), "ns::inner");
        assert_eq!(name.add_suffix("A").last_component(), "FooA");
        assert_eq!(name.joinns("Extra").to_string(), "ns::inner::Foo::Extra");
    }

    #[test]
    fn test_io_include_path() {
        let runtime = RuntimeConfig::default();
        assert_eq!(
            io_include_path("my::CustomType", &runtime),
            "userver/chaotic/io/my/custom_type.hpp"
        );
    }

    #[test]
    fn test_user_names() {
        let runtime = RuntimeConfig::default();
        let mut types = CppTypes::new();
        let int = types.add(primitive("int"));
        let mut array = primitive("unused");
        array.name = None;
        array.kind = CppTypeKind::Array {
            items: int,
            container: "std::vector".to_string(),
            validators: ArrayValidator::default(),
        };
        let array = types.add(array);
        assert_eq!(types.cpp_user_name(array, &runtime), "std::vector<int>");

        let mut reference = primitive("unused");
        reference.kind = CppTypeKind::Ref {
            reference: "a.yaml#/definitions/T".to_string(),
            target: Some(RefTarget::Local(array)),
            indirect: true,
            self_ref: false,
        };
        let reference = types.add(reference);
        assert_eq!(
            types.cpp_user_name(reference, &runtime),
            "userver::utils::Box<std::vector<int>>"
        );
        assert_eq!(types.resolve_ref(reference), array);
        assert_eq!(types.subtree(array), vec![array, int]);
        assert!(!types.has_generated_user_cpp_type(int));
    }
}
