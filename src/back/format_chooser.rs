//! Format propagation
//!
//! Some types only make sense for JSON: structs keeping free-form extras and
//! discriminated variants both hold raw JSON values. Anything that contains
//! or refers to such a type inherits the restriction.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::debug;

use super::types::{CppTypeKind, CppTypes, ExtraType, RefTarget, TypeId};

/// Mark every JSON-only type in `types` with an `only_json_reason`.
pub fn propagate_only_json(types: &mut CppTypes) {
    // child -> parent, target -> ref
    let mut graph: DiGraph<TypeId, ()> = DiGraph::with_capacity(types.len(), types.len());
    let nodes: Vec<NodeIndex> = types.ids().map(|id| graph.add_node(id)).collect();
    for id in types.ids() {
        for child in types.owned_children(id) {
            graph.add_edge(nodes[child.0], nodes[id.0], ());
        }
        if let CppTypeKind::Ref {
            target: Some(RefTarget::Local(target)),
            ..
        } = &types.get(id).kind
        {
            graph.add_edge(nodes[target.0], nodes[id.0], ());
        }
    }

    let mut pending: Vec<(TypeId, String)> = types
        .ids()
        .filter_map(|id| intrinsic_reason(types, id).map(|r| (id, r)))
        .collect();
    let seeds = pending.len();
    let mut marked = 0;

    while let Some((id, reason)) = pending.pop() {
        let node = types.get_mut(id);
        if node.only_json_reason.is_some() {
            continue;
        }
        node.only_json_reason = Some(reason.clone());
        marked += 1;
        for parent in graph.neighbors_directed(nodes[id.0], Direction::Outgoing) {
            let parent = graph[parent];
            if types.get(parent).only_json_reason.is_none() {
                pending.push((parent, reason.clone()));
            }
        }
    }

    debug!("{} JSON-only seeds marked {} types", seeds, marked);
}

fn intrinsic_reason(types: &CppTypes, id: TypeId) -> Option<String> {
    let node = types.get(id);
    let what = node
        .name
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| node.kind.name().to_string());
    match &node.kind {
        CppTypeKind::Struct {
            extra_type: ExtraType::Any { member: true },
            ..
        } => Some(format!(
            "{what} ({}) keeps free-form extra properties (additionalProperties: true)",
            node.source
        )),
        CppTypeKind::VariantWithDiscriminator { .. } => Some(format!(
            "{what} ({}) is a oneOf with discriminator",
            node.source
        )),
        CppTypeKind::Ref {
            target: Some(RefTarget::External(external)),
            ..
        } => external.only_json_reason.clone(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::translator::{Generator, GeneratorConfig};
    use crate::front::{parser::ParserConfig, ref_resolver::sort_schemas, SchemaParser};
    use crate::name_map::NameMap;
    use serde_json::{json, Value};

    fn generate(defs: &[(&str, Value)]) -> CppTypes {
        let mut parser = SchemaParser::new(ParserConfig::default(), "a.yaml", "a.yaml");
        for (name, value) in defs {
            parser.parse_schema(&format!("/definitions/{name}"), value).unwrap();
        }
        let resolved = sort_schemas(parser.into_parsed_schemas(), None).unwrap();
        let generator = Generator::new(GeneratorConfig {
            infile_to_name: NameMap::from_rules(&["/definitions/([^/]*)={0}"]).unwrap(),
            ..Default::default()
        });
        let mut types = generator.generate_types(&resolved, None).unwrap();
        propagate_only_json(&mut types);
        types
    }

    #[test]
    fn test_free_form_extras_contaminate_ancestors() {
        let types = generate(&[
            ("Free", json!({"type": "object", "properties": {}, "additionalProperties": true})),
            (
                "Holder",
                json!({
                    "type": "object",
                    "properties": {
                        "list": {"type": "array", "items": {"$ref": "#/definitions/Free"}}
                    }
                }),
            ),
            ("Plain", json!({"type": "object", "properties": {"x": {"type": "integer"}}})),
        ]);

        let reason = types.by_name("Free").unwrap().only_json_reason.clone().unwrap();
        assert!(reason.contains("Free"));
        assert!(reason.contains("additionalProperties"));

        let holder = types.types["Holder"];
        for id in types.subtree(holder) {
            let node = types.get(id);
            if matches!(node.kind, CppTypeKind::Primitive { .. }) {
                continue;
            }
            assert!(node.only_json_reason.is_some(), "{:?} is not marked", node.name);
        }
        assert_eq!(types.get(holder).only_json_reason.as_deref(), Some(reason.as_str()));
        assert!(types.by_name("Plain").unwrap().only_json_reason.is_none());
    }

    #[test]
    fn test_discriminated_variant_marked() {
        let object = json!({"type": "object", "properties": {"foo": {"type": "string"}}});
        let types = generate(&[
            ("A", object.clone()),
            ("B", object),
            (
                "T",
                json!({
                    "oneOf": [{"$ref": "#/definitions/A"}, {"$ref": "#/definitions/B"}],
                    "discriminator": {"propertyName": "foo"}
                }),
            ),
            ("U", json!({"type": "object", "properties": {"t": {"$ref": "#/definitions/T"}}})),
        ]);

        let t = types.by_name("T").unwrap();
        let CppTypeKind::VariantWithDiscriminator { variants, .. } = &t.kind else {
            panic!("expected discriminated variant");
        };
        assert_eq!(variants[0].values, vec!["A".to_string()]);
        assert!(t.only_json_reason.as_deref().unwrap_or("").contains("discriminator"));
        assert!(types.by_name("U").unwrap().only_json_reason.is_some());
        assert!(types.by_name("A").unwrap().only_json_reason.is_none());
    }

    #[test]
    fn test_extras_without_member_not_json_only() {
        let types = generate(&[(
            "T",
            json!({
                "type": "object",
                "properties": {},
                "additionalProperties": true,
                "x-usrv-cpp-extra-member": false
            }),
        )]);
        assert!(types.by_name("T").unwrap().only_json_reason.is_none());
    }
}
