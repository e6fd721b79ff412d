//! C++ templates
//!
//! The renderer only prepares a [`RenderContext`]; turning it into text is the
//! job of a [`Templates`] implementation. [`CppTemplates`] is the built-in one
//! and emits the four artifacts per source document.

use serde_json::Value;

use crate::config::RuntimeConfig;
use crate::error::Result;

use super::types::{CppName, CppTypeKind, CppTypes, ExtraType, RefTarget, TypeId};

const NS: &str = "USERVER_NAMESPACE";

// =============================================================================
// Template identities
// =============================================================================

/// The artifacts rendered for every source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    ForwardHeader,
    Header,
    ParsersInline,
    Source,
}

impl Template {
    pub const ALL: [Template; 4] = [
        Template::ForwardHeader,
        Template::Header,
        Template::ParsersInline,
        Template::Source,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::ForwardHeader => "_fwd.hpp",
            Self::Header => ".hpp",
            Self::ParsersInline => "_parsers.ipp",
            Self::Source => ".cpp",
        }
    }

    pub fn subdir(&self) -> &'static str {
        match self {
            Self::Source => "src",
            _ => "include",
        }
    }
}

/// Document formats parsers are emitted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Yaml,
    YamlConfig,
}

impl Format {
    pub fn value_type(&self) -> String {
        match self {
            Self::Json => format!("{NS}::formats::json::Value"),
            Self::Yaml => format!("{NS}::formats::yaml::Value"),
            Self::YamlConfig => format!("{NS}::yaml_config::Value"),
        }
    }

    pub fn include(&self) -> &'static str {
        match self {
            Self::Json => "userver/formats/json/value.hpp",
            Self::Yaml => "userver/formats/yaml/value.hpp",
            Self::YamlConfig => "userver/yaml_config/yaml_config.hpp",
        }
    }
}

/// Everything a template needs to render one source document
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    /// Document path without extension; artifacts are named after it
    pub rel_path: String,
    pub types: &'a CppTypes,
    /// Top-level types of the document with their names, in resolution order
    pub group: Vec<(CppName, TypeId)>,
    /// Other documents this one refers to (by `rel_path`)
    pub includes: Vec<String>,
    /// Headers of user-provided types
    pub user_includes: Vec<String>,
    pub parse_extra_formats: bool,
    pub generate_serializers: bool,
    pub runtime: &'a RuntimeConfig,
}

impl RenderContext<'_> {
    /// Header the other artifacts of this document belong to
    pub fn pair_header(&self) -> String {
        format!("{}.hpp", self.rel_path)
    }

    /// Formats a type gets parsers for; JSON-only types never get extras.
    pub fn formats_for(&self, id: TypeId) -> Vec<Format> {
        if self.parse_extra_formats && self.types.get(id).only_json_reason.is_none() {
            vec![Format::Json, Format::Yaml, Format::YamlConfig]
        } else {
            vec![Format::Json]
        }
    }

    /// Every format used by any type of the document
    pub fn all_formats(&self) -> Vec<Format> {
        let mut formats = vec![Format::Json];
        if self.parse_extra_formats
            && self
                .group
                .iter()
                .any(|(_, id)| self.types.get(*id).only_json_reason.is_none())
        {
            formats.extend([Format::Yaml, Format::YamlConfig]);
        }
        formats
    }
}

/// Template engine seam
pub trait Templates {
    fn render(&self, template: Template, context: &RenderContext) -> Result<String>;
}

/// Built-in C++ emitter
#[derive(Debug, Clone, Copy, Default)]
pub struct CppTemplates;

impl Templates for CppTemplates {
    fn render(&self, template: Template, context: &RenderContext) -> Result<String> {
        let emitter = Emitter { ctx: context };
        Ok(match template {
            Template::ForwardHeader => emitter.forward_header(),
            Template::Header => emitter.header(),
            Template::ParsersInline => emitter.parsers_inline(),
            Template::Source => emitter.source(),
        })
    }
}

// =============================================================================
// Emission helpers
// =============================================================================

struct Writer {
    out: String,
    indent: usize,
}

impl Writer {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, text: &str) {
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.out.push_str("  ");
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    fn open_namespace(&mut self, namespace: &str) {
        if !namespace.is_empty() {
            self.line(&format!("namespace {namespace} {{"));
            self.line("");
        }
    }

    fn close_namespace(&mut self, namespace: &str) {
        if !namespace.is_empty() {
            self.line("");
            self.line(&format!("}}  // namespace {namespace}"));
        }
    }
}

fn cpp_string_literal(value: &str) -> String {
    let mut result = String::with_capacity(value.len() + 2);
    result.push('"');
    for c in value.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            other => result.push(other),
        }
    }
    result.push('"');
    result
}

fn int_enum_item(value: i64) -> String {
    if value < 0 {
        format!("kMinus{}", value.unsigned_abs())
    } else {
        format!("k{value}")
    }
}

/// Identifier of the pattern constant of a string type; unique per type name
pub fn pattern_constant(name: &CppName) -> String {
    format!("k{}_Pattern", name.components().join("_"))
}

fn settings_constant(name: &CppName) -> String {
    format!("k{}_Settings", name.components().join("_"))
}

struct Emitter<'c, 'a> {
    ctx: &'c RenderContext<'a>,
}

impl Emitter<'_, '_> {
    fn types(&self) -> &CppTypes {
        self.ctx.types
    }

    fn user_name(&self, id: TypeId) -> String {
        self.ctx.types.cpp_user_name(id, self.ctx.runtime)
    }

    fn namespace_of(name: &CppName) -> String {
        name.namespace()
    }

    /// Generated types reachable from the document's top-level types through
    /// owning edges, each with its name.
    fn generated(&self) -> Vec<(CppName, TypeId)> {
        let mut result = Vec::new();
        for (_, top) in &self.ctx.group {
            for id in self.types().subtree(*top) {
                let node = self.types().get(id);
                let parsed = matches!(
                    node.kind,
                    CppTypeKind::IntEnum { .. }
                        | CppTypeKind::StringEnum { .. }
                        | CppTypeKind::Struct { .. }
                        | CppTypeKind::StructAllOf { .. }
                );
                if let (true, Some(name)) = (parsed, &node.name) {
                    result.push((name.clone(), id));
                }
            }
        }
        result
    }

    fn wrap_user_type(&self, id: TypeId, parser: String) -> String {
        let node = self.types().get(id);
        let user = match (&node.user_cpp_type, &node.kind) {
            (Some(user), _) => user.clone(),
            (
                None,
                CppTypeKind::Struct {
                    default_dict: true, ..
                },
            ) => self.user_name(id),
            _ => return parser,
        };
        format!("{NS}::chaotic::WithType<{parser}, {user}>")
    }

    /// Parser spelling used with `value.As<...>()`
    fn parser_type(&self, id: TypeId, depth: usize) -> String {
        let node = self.types().get(id);
        match &node.kind {
            CppTypeKind::Primitive {
                raw_cpp_type,
                validators,
                ..
            } => {
                let mut args = vec![raw_cpp_type.clone()];
                if let Some(v) = &validators.minimum {
                    args.push(format!("{NS}::chaotic::Minimum<{v}>"));
                }
                if let Some(v) = &validators.maximum {
                    args.push(format!("{NS}::chaotic::Maximum<{v}>"));
                }
                if let Some(v) = &validators.exclusive_minimum {
                    args.push(format!("{NS}::chaotic::ExclusiveMinimum<{v}>"));
                }
                if let Some(v) = &validators.exclusive_maximum {
                    args.push(format!("{NS}::chaotic::ExclusiveMaximum<{v}>"));
                }
                if let Some(v) = validators.min_length {
                    args.push(format!("{NS}::chaotic::MinLength<{v}>"));
                }
                if let Some(v) = validators.max_length {
                    args.push(format!("{NS}::chaotic::MaxLength<{v}>"));
                }
                if let (Some(_), Some(name)) = (&validators.pattern, &node.name) {
                    args.push(format!("{NS}::chaotic::Pattern<::{}>", pattern_constant(name)));
                }
                self.wrap_user_type(id, format!("{NS}::chaotic::Primitive<{}>", args.join(", ")))
            }
            CppTypeKind::StringWithFormat { format_cpp_type, .. } => self.wrap_user_type(
                id,
                format!(
                    "{NS}::chaotic::WithType<{NS}::chaotic::Primitive<{}>, {format_cpp_type}>",
                    self.ctx.runtime.string
                ),
            ),
            CppTypeKind::IntEnum { .. }
            | CppTypeKind::StringEnum { .. }
            | CppTypeKind::Struct { .. }
            | CppTypeKind::StructAllOf { .. } => {
                let raw = self.types().raw_cpp_name(id, self.ctx.runtime);
                self.wrap_user_type(id, format!("{NS}::chaotic::Primitive<{raw}>"))
            }
            CppTypeKind::Array {
                items,
                container,
                validators,
            } => {
                let mut args = vec![
                    self.parser_type(*items, depth + 1),
                    format!("{}<{}>", container, self.user_name(*items)),
                ];
                if let Some(v) = validators.min_items {
                    args.push(format!("{NS}::chaotic::MinItems<{v}>"));
                }
                if let Some(v) = validators.max_items {
                    args.push(format!("{NS}::chaotic::MaxItems<{v}>"));
                }
                self.wrap_user_type(id, format!("{NS}::chaotic::Array<{}>", args.join(", ")))
            }
            CppTypeKind::Variant { variants } => {
                let args: Vec<String> =
                    variants.iter().map(|v| self.parser_type(*v, depth + 1)).collect();
                self.wrap_user_type(id, format!("{NS}::chaotic::Variant<{}>", args.join(", ")))
            }
            CppTypeKind::VariantWithDiscriminator { variants, .. } => {
                let settings = node
                    .name
                    .as_ref()
                    .map(settings_constant)
                    .unwrap_or_default();
                let mut args = vec![format!("&::{settings}")];
                args.extend(variants.iter().map(|v| self.parser_type(v.schema, depth + 1)));
                let parser = format!("{NS}::chaotic::OneOfWithDiscriminator<{}>", args.join(", "));
                self.wrap_user_type(id, parser)
            }
            CppTypeKind::Ref {
                target,
                indirect,
                self_ref,
                ..
            } => {
                let inner = match target {
                    Some(RefTarget::Local(target)) if !*indirect && !*self_ref && depth < 32 => {
                        self.parser_type(*target, depth + 1)
                    }
                    Some(RefTarget::Local(target)) => {
                        let target_id = self.types().resolve_ref(*target);
                        format!(
                            "{NS}::chaotic::Primitive<{}>",
                            self.types().raw_cpp_name(target_id, self.ctx.runtime)
                        )
                    }
                    Some(RefTarget::External(external)) => {
                        format!("{NS}::chaotic::Primitive<{}>", external.user_cpp_name)
                    }
                    None => format!("{NS}::chaotic::Primitive<void>"),
                };
                if *indirect {
                    format!("{NS}::chaotic::Ref<{inner}, {}>", self.user_name(id))
                } else {
                    inner
                }
            }
        }
    }

    fn default_literal(&self, id: TypeId) -> Option<String> {
        let node = self.types().get(id);
        match &node.kind {
            CppTypeKind::Primitive { default, .. } => match default {
                Value::Null => None,
                Value::Bool(b) => Some(b.to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) => Some(cpp_string_literal(s)),
                _ => None,
            },
            CppTypeKind::IntEnum { default, .. } => {
                default.map(|d| format!("{}::{}", self.user_name(id), int_enum_item(d)))
            }
            CppTypeKind::StringEnum { enums, default } => default.as_ref().and_then(|d| {
                enums
                    .iter()
                    .find(|item| item.raw_name == *d)
                    .map(|item| format!("{}::{}", self.user_name(id), item.cpp_name))
            }),
            CppTypeKind::StringWithFormat { default, format_cpp_type, .. } => default
                .as_ref()
                .map(|d| {
                    format!(
                        "{NS}::chaotic::convert::Convert({}, {NS}::chaotic::convert::To<{}>{{}})",
                        cpp_string_literal(d),
                        format_cpp_type
                    )
                }),
            _ => None,
        }
    }

    // ===== Forward header =====

    fn forward_header(&self) -> String {
        let mut w = Writer::new();
        w.line("#pragma once");
        w.line("");
        for (name, id) in &self.ctx.group {
            let namespace = Self::namespace_of(name);
            let decl = match self.types().get(*id).kind {
                CppTypeKind::Struct { .. } | CppTypeKind::StructAllOf { .. } => "struct",
                CppTypeKind::IntEnum { .. } | CppTypeKind::StringEnum { .. } => "enum class",
                _ => continue,
            };
            w.open_namespace(&namespace);
            w.line(&format!("{decl} {};", name.last_component()));
            w.close_namespace(&namespace);
            w.line("");
        }
        w.out
    }

    // ===== Header =====

    fn header(&self) -> String {
        let mut w = Writer::new();
        w.line("#pragma once");
        w.line("");
        w.line(&format!("#include <{}_fwd.hpp>", self.ctx.rel_path));
        w.line("");
        for include in ["cstdint", "optional", "string", "unordered_map", "variant", "vector"] {
            w.line(&format!("#include <{include}>"));
        }
        w.line("");
        w.line("#include <userver/chaotic/type_bundle_hpp.hpp>");
        for format in self.ctx.all_formats() {
            w.line(&format!("#include <{}>", format.include()));
        }
        for include in &self.ctx.includes {
            w.line(&format!("#include <{include}.hpp>"));
        }
        for include in &self.ctx.user_includes {
            w.line(&format!("#include <{include}>"));
        }
        w.line("");

        for (name, id) in &self.ctx.group {
            let namespace = Self::namespace_of(name);
            w.open_namespace(&namespace);
            self.declare_with_deps(&mut w, *id, Some(name));
            self.declare_functions(&mut w, *id);
            w.close_namespace(&namespace);
            w.line("");
        }
        w.out
    }

    /// Declare the same-scope dependencies of `id` (items, allOf parents,
    /// oneOf variants), then `id` itself. `alias` names top-level types that
    /// are not generated (arrays, refs, primitives).
    fn declare_with_deps(&self, w: &mut Writer, id: TypeId, alias: Option<&CppName>) {
        match &self.types().get(id).kind {
            CppTypeKind::Array { items, .. } => self.declare_with_deps(w, *items, None),
            CppTypeKind::StructAllOf { parents } => {
                for parent in parents {
                    self.declare_with_deps(w, *parent, None);
                }
            }
            CppTypeKind::Variant { variants } => {
                for variant in variants {
                    self.declare_with_deps(w, *variant, None);
                }
            }
            CppTypeKind::VariantWithDiscriminator { variants, .. } => {
                for variant in variants {
                    self.declare_with_deps(w, variant.schema, None);
                }
            }
            _ => {}
        }
        self.declare(w, id, alias);
    }

    fn declare(&self, w: &mut Writer, id: TypeId, alias: Option<&CppName>) {
        let node = self.types().get(id);
        let local = node
            .name
            .as_ref()
            .or(alias)
            .map(|n| n.last_component().to_string())
            .unwrap_or_default();

        if let Some(description) = &node.description {
            for line in description.lines() {
                w.line(&format!("// {line}"));
            }
        }

        match &node.kind {
            CppTypeKind::IntEnum { enums, .. } => {
                w.line(&format!("enum class {local} {{"));
                w.indent += 1;
                for value in enums {
                    w.line(&format!("{} = {value},", int_enum_item(*value)));
                }
                w.indent -= 1;
                w.line("};");
                w.line("");
            }
            CppTypeKind::StringEnum { enums, .. } => {
                w.line(&format!("enum class {local} {{"));
                w.indent += 1;
                for item in enums {
                    w.line(&format!("{},", item.cpp_name));
                }
                w.indent -= 1;
                w.line("};");
                w.line("");
            }
            CppTypeKind::Struct {
                fields, extra_type, extra_container, ..
            } => {
                w.line(&format!("struct {local} {{"));
                w.indent += 1;
                for field in fields.values() {
                    self.declare_with_deps(w, field.schema, None);
                }
                if let ExtraType::Typed(extra) = extra_type {
                    self.declare_with_deps(w, *extra, None);
                }
                for field in fields.values() {
                    let mut member = self.user_name(field.schema);
                    let default = self.default_literal(field.schema);
                    let optional = (!field.required && default.is_none())
                        || self.types().get(field.schema).nullable;
                    if optional {
                        member = format!("{}<{member}>", self.ctx.runtime.optional);
                    }
                    let init = match (&default, optional) {
                        (Some(d), false) => d.clone(),
                        _ => String::new(),
                    };
                    w.line(&format!("{member} {}{{{init}}};", field.cpp_name));
                }
                match extra_type {
                    ExtraType::Any { member: true } => {
                        w.line(&format!("{} extra;", self.ctx.runtime.json_value));
                    }
                    ExtraType::Typed(extra) => {
                        w.line(&format!(
                            "{extra_container}<{}, {}> extra;",
                            self.ctx.runtime.string,
                            self.user_name(*extra)
                        ));
                    }
                    _ => {}
                }
                w.indent -= 1;
                w.line("};");
                w.line("");
            }
            CppTypeKind::StructAllOf { parents } => {
                let bases: Vec<String> = parents
                    .iter()
                    .map(|p| format!("public {}", self.user_name(*p)))
                    .collect();
                w.line(&format!("struct {local} : {} {{}};", bases.join(", ")));
                w.line("");
            }
            CppTypeKind::Variant { variants } => {
                let members: Vec<String> = variants.iter().map(|v| self.user_name(*v)).collect();
                let variant = &self.ctx.runtime.variant;
                w.line(&format!("using {local} = {variant}<{}>;", members.join(", ")));
                w.line("");
            }
            CppTypeKind::VariantWithDiscriminator { variants, .. } => {
                let members: Vec<String> =
                    variants.iter().map(|v| self.user_name(v.schema)).collect();
                let variant = &self.ctx.runtime.variant;
                w.line(&format!("using {local} = {variant}<{}>;", members.join(", ")));
                w.line("");
            }
            CppTypeKind::Primitive { .. }
            | CppTypeKind::StringWithFormat { .. }
            | CppTypeKind::Array { .. }
            | CppTypeKind::Ref { .. } => {
                if alias.is_some() {
                    w.line(&format!("using {local} = {};", self.user_name(id)));
                    w.line("");
                }
            }
        }
    }

    /// Parse/serialize/compare declarations for `top` and its nested types
    fn declare_functions(&self, w: &mut Writer, top: TypeId) {
        for id in self.types().subtree(top) {
            let node = self.types().get(id);
            let Some(name) = &node.name else {
                continue;
            };
            let full = name.in_global_scope();
            match node.kind {
                CppTypeKind::Struct { .. } | CppTypeKind::StructAllOf { .. } => {
                    w.line(&format!("bool operator==(const {full}& lhs, const {full}& rhs);"));
                }
                CppTypeKind::IntEnum { .. } | CppTypeKind::StringEnum { .. } => {}
                _ => continue,
            }
            if let CppTypeKind::StringEnum { .. } = node.kind {
                w.line(&format!("std::string ToString({full} value);"));
                w.line(&format!(
                    "{full} FromString(std::string_view value, {NS}::formats::parse::To<{full}>);"
                ));
            }
            for format in self.ctx.formats_for(id) {
                w.line(&format!(
                    "{full} Parse({} value, {NS}::formats::parse::To<{full}>);",
                    format.value_type()
                ));
            }
            if self.ctx.generate_serializers {
                let json = Format::Json.value_type();
                w.line(&format!(
                    "{json} Serialize(const {full}& value, {NS}::formats::serialize::To<{json}>);"
                ));
            }
            w.line("");
        }
    }

    // ===== Parsers =====

    fn parsers_inline(&self) -> String {
        let mut w = Writer::new();
        w.line("#pragma once");
        w.line("");
        w.line(&format!("#include <{}>", self.ctx.pair_header()));
        w.line("");
        w.line("#include <userver/chaotic/type_bundle_ipp.hpp>");
        for include in &self.ctx.includes {
            w.line(&format!("#include <{include}_parsers.ipp>"));
        }
        w.line("");

        // pattern constants and discriminator settings live at global scope
        for (_, top) in &self.ctx.group {
            for id in self.types().subtree(*top) {
                let node = self.types().get(id);
                if let (CppTypeKind::Primitive { validators, .. }, Some(name)) =
                    (&node.kind, &node.name)
                {
                    if let Some(pattern) = &validators.pattern {
                        w.line(&format!(
                            "inline constexpr std::string_view {} = {};",
                            pattern_constant(name),
                            cpp_string_literal(pattern)
                        ));
                        w.line("");
                    }
                }
                if let (
                    CppTypeKind::VariantWithDiscriminator { property_name, variants },
                    Some(name),
                ) = (&node.kind, &node.name)
                {
                    let values: Vec<String> = variants
                        .iter()
                        .map(|v| {
                            let items: Vec<String> =
                                v.values.iter().map(|s| cpp_string_literal(s)).collect();
                            format!("{{{}}}", items.join(", "))
                        })
                        .collect();
                    w.line(&format!(
                        "inline const {NS}::chaotic::OneOfSettings {} = {{{}, {{{}}}}};",
                        settings_constant(name),
                        cpp_string_literal(property_name),
                        values.join(", ")
                    ));
                    w.line("");
                }
            }
        }

        for (name, top) in &self.ctx.group {
            let namespace = Self::namespace_of(name);
            w.open_namespace(&namespace);
            for (nested, id) in self.generated_under(*top) {
                self.parse_template(&mut w, &nested, id);
            }
            w.close_namespace(&namespace);
            w.line("");
        }
        w.out
    }

    fn generated_under(&self, top: TypeId) -> Vec<(CppName, TypeId)> {
        let subtree = self.types().subtree(top);
        self.generated()
            .into_iter()
            .filter(|(_, id)| subtree.contains(id))
            .collect()
    }

    fn parse_template(&self, w: &mut Writer, name: &CppName, id: TypeId) {
        let full = name.in_global_scope();
        w.line("template <typename Value>");
        w.line(&format!("{full} Parse(Value value, {NS}::formats::parse::To<{full}>) {{"));
        w.indent += 1;
        match &self.types().get(id).kind {
            CppTypeKind::IntEnum { enums, .. } => {
                w.line("const auto raw = value.template As<int>();");
                w.line("switch (raw) {");
                w.indent += 1;
                for value in enums {
                    w.line(&format!("case {value}: return {full}::{};", int_enum_item(*value)));
                }
                w.indent -= 1;
                w.line("}");
                w.line(&format!(
                    "{NS}::chaotic::ThrowForValue(fmt::format(\"Invalid enum value ({{}}) for type {full}\", raw), value);"
                ));
            }
            CppTypeKind::StringEnum { enums, .. } => {
                let string = &self.ctx.runtime.string;
                w.line(&format!("const auto raw = value.template As<{string}>();"));
                for item in enums {
                    w.line(&format!(
                        "if (raw == {}) return {full}::{};",
                        cpp_string_literal(&item.raw_name),
                        item.cpp_name
                    ));
                }
                w.line(&format!(
                    "{NS}::chaotic::ThrowForValue(fmt::format(\"Invalid enum value ({{}}) for type {full}\", raw), value);"
                ));
            }
            CppTypeKind::Struct {
                fields,
                extra_type,
                strict_parsing,
                ..
            } => {
                w.line("value.CheckNotMissing();");
                w.line("value.CheckObjectOrNull();");
                w.line(&format!("{full} res;"));
                for field in fields.values() {
                    let parser = self.parser_type(field.schema, 0);
                    let key = cpp_string_literal(&field.name);
                    let line = match (field.required, self.default_literal(field.schema)) {
                        (true, _) => format!(
                            "res.{} = value[{key}].template As<{parser}>();",
                            field.cpp_name
                        ),
                        (false, Some(default)) => format!(
                            "res.{} = value[{key}].template As<std::optional<{parser}>>().value_or({default});",
                            field.cpp_name
                        ),
                        (false, None) => format!(
                            "res.{} = value[{key}].template As<std::optional<{parser}>>();",
                            field.cpp_name
                        ),
                    };
                    w.line(&line);
                }
                let known: Vec<String> = fields.keys().map(|k| cpp_string_literal(k)).collect();
                w.line(&format!(
                    "static constexpr {NS}::utils::TrivialSet kFieldNames = {{{}}};",
                    known.join(", ")
                ));
                match extra_type {
                    ExtraType::Any { member: true } => {
                        w.line(&format!(
                            "res.extra = {NS}::chaotic::ExtractAdditionalPropertiesTrue(value, kFieldNames);"
                        ));
                    }
                    ExtraType::Any { member: false } => {}
                    ExtraType::Typed(extra) => {
                        w.line(&format!(
                            "res.extra = {NS}::chaotic::ExtractAdditionalProperties<{}>(value, kFieldNames);",
                            self.parser_type(*extra, 0)
                        ));
                    }
                    ExtraType::Disabled => {
                        if *strict_parsing {
                            w.line(&format!(
                                "{NS}::chaotic::ValidateNoAdditionalProperties(value, kFieldNames);"
                            ));
                        }
                    }
                }
                w.line("return res;");
            }
            CppTypeKind::StructAllOf { parents } => {
                w.line(&format!("{full} res;"));
                for parent in parents {
                    let user = self.user_name(*parent);
                    w.line(&format!(
                        "static_cast<{user}&>(res) = value.template As<{}>();",
                        self.parser_type(*parent, 0)
                    ));
                }
                w.line("return res;");
            }
            _ => {}
        }
        w.indent -= 1;
        w.line("}");
        w.line("");
    }

    // ===== Source =====

    fn source(&self) -> String {
        let mut w = Writer::new();
        w.line(&format!("#include <{}>", self.ctx.pair_header()));
        w.line("");
        w.line(&format!("#include <{}_parsers.ipp>", self.ctx.rel_path));
        w.line("");
        w.line("#include <userver/chaotic/type_bundle_cpp.hpp>");
        w.line("");

        for (name, top) in &self.ctx.group {
            let namespace = Self::namespace_of(name);
            w.open_namespace(&namespace);
            for (nested, id) in self.generated_under(*top) {
                self.define_functions(&mut w, &nested, id);
            }
            w.close_namespace(&namespace);
            w.line("");
        }
        w.out
    }

    fn define_functions(&self, w: &mut Writer, name: &CppName, id: TypeId) {
        let full = name.in_global_scope();
        let node = self.types().get(id);

        match &node.kind {
            CppTypeKind::Struct { fields, extra_type, .. } => {
                let mut compared: Vec<String> = fields
                    .values()
                    .map(|f| format!("lhs.{0} == rhs.{0}", f.cpp_name))
                    .collect();
                if matches!(extra_type, ExtraType::Any { member: true } | ExtraType::Typed(_)) {
                    compared.push("lhs.extra == rhs.extra".to_string());
                }
                compared.push("true".to_string());
                w.line(&format!("bool operator==(const {full}& lhs, const {full}& rhs) {{"));
                w.line(&format!("  return {};", compared.join(" && ")));
                w.line("}");
                w.line("");
            }
            CppTypeKind::StructAllOf { parents } => {
                let compared: Vec<String> = parents
                    .iter()
                    .map(|p| {
                        let user = self.user_name(*p);
                        format!(
                            "static_cast<const {user}&>(lhs) == static_cast<const {user}&>(rhs)"
                        )
                    })
                    .collect();
                w.line(&format!("bool operator==(const {full}& lhs, const {full}& rhs) {{"));
                w.line(&format!("  return {};", compared.join(" && ")));
                w.line("}");
                w.line("");
            }
            CppTypeKind::StringEnum { enums, .. } => {
                w.line(&format!("std::string ToString({full} value) {{"));
                w.line("  switch (value) {");
                for item in enums {
                    w.line(&format!(
                        "    case {full}::{}: return {};",
                        item.cpp_name,
                        cpp_string_literal(&item.raw_name)
                    ));
                }
                w.line("  }");
                w.line("  return {};");
                w.line("}");
                w.line("");
                w.line(&format!(
                    "{full} FromString(std::string_view value, {NS}::formats::parse::To<{full}>) {{"
                ));
                for item in enums {
                    w.line(&format!(
                        "  if (value == {}) return {full}::{};",
                        cpp_string_literal(&item.raw_name),
                        item.cpp_name
                    ));
                }
                w.line(&format!(
                    "  throw std::runtime_error(fmt::format(\"Invalid enum value ({{}}) for type {full}\", value));"
                ));
                w.line("}");
                w.line("");
            }
            _ => {}
        }

        for format in self.ctx.formats_for(id) {
            let value_type = format.value_type();
            w.line(&format!(
                "{full} Parse({value_type} value, {NS}::formats::parse::To<{full}> to) {{"
            ));
            w.line(&format!("  return Parse<{value_type}>(std::move(value), to);"));
            w.line("}");
            w.line("");
        }

        if self.ctx.generate_serializers {
            self.serializer(w, &full, id);
        }
    }

    fn serializer(&self, w: &mut Writer, full: &str, id: TypeId) {
        let json = Format::Json.value_type();
        w.line(&format!(
            "{json} Serialize([[maybe_unused]] const {full}& value, {NS}::formats::serialize::To<{json}>) {{"
        ));
        w.indent += 1;
        match &self.types().get(id).kind {
            CppTypeKind::IntEnum { .. } => {
                w.line(&format!(
                    "return {NS}::formats::json::ValueBuilder(static_cast<int>(value)).ExtractValue();"
                ));
            }
            CppTypeKind::StringEnum { .. } => {
                w.line(&format!(
                    "return {NS}::formats::json::ValueBuilder(ToString(value)).ExtractValue();"
                ));
            }
            CppTypeKind::Struct { fields, extra_type, .. } => {
                w.line(&format!("{NS}::formats::json::ValueBuilder vb;"));
                match extra_type {
                    ExtraType::Any { member: true } => w.line("vb = value.extra;"),
                    _ => w.line(&format!("vb = {NS}::formats::common::Type::kObject;")),
                }
                if let ExtraType::Typed(_) = extra_type {
                    w.line("for (const auto& [key, item] : value.extra) vb[key] = item;");
                }
                for field in fields.values() {
                    let parser = self.parser_type(field.schema, 0);
                    let key = cpp_string_literal(&field.name);
                    let optional = (!field.required && self.default_literal(field.schema).is_none())
                        || self.types().get(field.schema).nullable;
                    if optional {
                        w.line(&format!("if (value.{}) {{", field.cpp_name));
                        w.line(&format!("  vb[{key}] = {parser}{{*value.{}}};", field.cpp_name));
                        w.line("}");
                    } else {
                        w.line(&format!("vb[{key}] = {parser}{{value.{}}};", field.cpp_name));
                    }
                }
                w.line("return vb.ExtractValue();");
            }
            CppTypeKind::StructAllOf { parents } => {
                w.line(&format!(
                    "{NS}::formats::json::ValueBuilder vb = {NS}::formats::common::Type::kObject;"
                ));
                for parent in parents {
                    let user = self.user_name(*parent);
                    w.line(&format!(
                        "{NS}::chaotic::ExtractIntoObject(vb, {}{{static_cast<const {user}&>(value)}});",
                        self.parser_type(*parent, 0)
                    ));
                }
                w.line("return vb.ExtractValue();");
            }
            _ => {
                w.line("return {};");
            }
        }
        w.indent -= 1;
        w.line("}");
        w.line("");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_placement() {
        let placed: Vec<(&str, &str)> =
            Template::ALL.iter().map(|t| (t.subdir(), t.suffix())).collect();
        assert_eq!(
            placed,
            vec![
                ("include", "_fwd.hpp"),
                ("include", ".hpp"),
                ("include", "_parsers.ipp"),
                ("src", ".cpp"),
            ]
        );
    }

    #[test]
    fn test_pattern_constant() {
        let name = CppName::from_full("ns::T::Inner::Id");
        assert_eq!(pattern_constant(&name), "kns_T_Inner_Id_Pattern");
    }

    #[test]
    fn test_literals() {
        assert_eq!(cpp_string_literal("a\"b\\"), "\"a\\\"b\\\\\"");
        assert_eq!(int_enum_item(-3), "kMinus3");
        assert_eq!(int_enum_item(7), "k7");
    }
}
