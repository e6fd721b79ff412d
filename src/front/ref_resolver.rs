//! Reference Resolution
//!
//! Follows `$ref` chains, marks indirect and self references, and sorts
//! schemas so that every referent precedes its referrers.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use tracing::debug;

use crate::error::{Diagnostic, DiagnosticKind};

use super::types::{
    find_property, AdditionalProperties, ParsedSchemas, PropertyLookup, ResolvedSchemas, Schema,
    SchemaKind, VendorKey,
};

// =============================================================================
// Post-parse sort
// =============================================================================

/// Resolve every ref of `parsed` and order the result.
///
/// Refs may point into `external`, a pool resolved by an earlier run; those
/// never produce ordering edges.
pub fn sort_schemas(
    parsed: ParsedSchemas,
    external: Option<&ResolvedSchemas>,
) -> Result<ResolvedSchemas, Diagnostic> {
    let mut schemas = parsed.schemas;

    let aliases: HashMap<String, (String, bool)> = schemas
        .iter()
        .filter_map(|(key, schema)| {
            schema
                .as_ref_schema()
                .map(|r| (key.clone(), (r.reference.clone(), r.indirect)))
        })
        .collect();
    let local: HashSet<String> = schemas.keys().cloned().collect();

    let mut edges: Vec<(String, String)> = Vec::new();
    for (key, schema) in schemas.iter_mut() {
        let mut walk = Walk {
            owner: key,
            aliases: &aliases,
            local: &local,
            external,
            edges: &mut edges,
        };
        walk.visit(schema, false)?;
    }

    check_discriminators(&schemas, external)?;

    let order = topological_order(&schemas, &edges)?;
    debug!("Resolved {} schemas ({} ordering edges)", order.len(), edges.len());

    let mut sorted = IndexMap::with_capacity(order.len());
    for key in order {
        if let Some(schema) = schemas.shift_remove(&key) {
            sorted.insert(key, schema);
        }
    }
    Ok(ResolvedSchemas { schemas: sorted })
}

/// Where a ref chain ends
struct ChainEnd {
    target: String,
    indirect: bool,
    is_local: bool,
}

struct Walk<'a> {
    owner: &'a str,
    aliases: &'a HashMap<String, (String, bool)>,
    local: &'a HashSet<String>,
    external: Option<&'a ResolvedSchemas>,
    edges: &'a mut Vec<(String, String)>,
}

impl Walk<'_> {
    fn visit(&mut self, schema: &mut Schema, in_items: bool) -> Result<(), Diagnostic> {
        match &mut schema.kind {
            SchemaKind::Ref(r) => {
                let end = self
                    .follow(&r.reference, r.indirect)
                    .map_err(|kind| Diagnostic::new(&schema.source_location, kind))?;
                r.indirect = end.indirect;
                if end.is_local && in_items && end.target == self.owner {
                    r.self_ref = true;
                } else if end.is_local && !end.indirect {
                    self.edges.push((self.owner.to_string(), end.target.clone()));
                }
                r.target = Some(end.target);
            }
            SchemaKind::Array(a) => self.visit(&mut a.items, true)?,
            SchemaKind::Object(o) => {
                for property in o.properties.values_mut() {
                    self.visit(property, in_items)?;
                }
                if let AdditionalProperties::Schema(extra) = &mut o.additional_properties {
                    self.visit(extra, in_items)?;
                }
            }
            SchemaKind::AllOf(a) => {
                for parent in &mut a.all_of {
                    self.visit(parent, in_items)?;
                }
            }
            SchemaKind::OneOf(o) => {
                for variant in &mut o.one_of {
                    self.visit(variant, in_items)?;
                }
            }
            SchemaKind::OneOfWithDiscriminator(o) => {
                for variant in &mut o.one_of {
                    self.visit(variant, in_items)?;
                }
            }
            SchemaKind::Boolean(_)
            | SchemaKind::Integer(_)
            | SchemaKind::Number(_)
            | SchemaKind::String(_) => {}
        }
        Ok(())
    }

    fn follow(&self, reference: &str, mut indirect: bool) -> Result<ChainEnd, DiagnosticKind> {
        let mut seen: Vec<String> = Vec::new();
        let mut current = reference.to_string();
        loop {
            if seen.contains(&current) {
                seen.push(current);
                return Err(DiagnosticKind::RefCycle(seen));
            }
            seen.push(current.clone());

            if let Some((next, hop_indirect)) = self.aliases.get(&current) {
                indirect |= *hop_indirect;
                current = next.clone();
                continue;
            }
            if self.local.contains(&current) {
                return Ok(ChainEnd {
                    target: current,
                    indirect,
                    is_local: true,
                });
            }
            if let Some(schema) = self.external.and_then(|pool| pool.get(&current)) {
                let target = match &schema.kind {
                    SchemaKind::Ref(r) => {
                        indirect |= r.indirect;
                        r.target.clone().unwrap_or(current)
                    }
                    _ => current,
                };
                return Ok(ChainEnd {
                    target,
                    indirect,
                    is_local: false,
                });
            }
            return Err(DiagnosticKind::RefUnresolved(current));
        }
    }
}

/// Discriminated variants that could not be checked at parse time are
/// checked here, now that every target is known.
fn check_discriminators(
    schemas: &IndexMap<String, Schema>,
    external: Option<&ResolvedSchemas>,
) -> Result<(), Diagnostic> {
    let lookup = |key: &str| schemas.get(key).or_else(|| external.and_then(|pool| pool.get(key)));

    let mut pending: Vec<&Schema> = schemas.values().collect();
    while let Some(schema) = pending.pop() {
        match &schema.kind {
            SchemaKind::OneOfWithDiscriminator(o) => {
                for variant in &o.one_of {
                    let reference = variant
                        .as_ref_schema()
                        .map(|r| r.target.as_deref().unwrap_or(&r.reference))
                        .unwrap_or_default();
                    let violation = match find_property(variant, &o.property_name, &lookup) {
                        PropertyLookup::Present => continue,
                        PropertyLookup::Missing => {
                            let property = &o.property_name;
                            format!("no discriminator property \"{property}\" in \"{reference}\"")
                        }
                        PropertyLookup::NotAnObject => format!("\"{reference}\" is not an object"),
                        PropertyLookup::Unresolved => format!("cannot resolve \"{reference}\""),
                    };
                    return Err(Diagnostic::new(
                        &schema.source_location,
                        DiagnosticKind::DiscriminatorViolation(violation),
                    ));
                }
            }
            SchemaKind::OneOf(o) => pending.extend(&o.one_of),
            SchemaKind::AllOf(a) => pending.extend(&a.all_of),
            SchemaKind::Array(a) => pending.push(&a.items),
            SchemaKind::Object(o) => {
                pending.extend(o.properties.values());
                if let AdditionalProperties::Schema(extra) = &o.additional_properties {
                    pending.push(extra);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first post-order over the ordering edges. Roots and neighbours are
/// taken in insertion order so the output is deterministic.
fn topological_order(
    schemas: &IndexMap<String, Schema>,
    edges: &[(String, String)],
) -> Result<Vec<String>, Diagnostic> {
    let mut graph: DiGraph<&str, ()> = DiGraph::with_capacity(schemas.len(), edges.len());
    let mut indices: HashMap<&str, NodeIndex> = HashMap::with_capacity(schemas.len());
    for key in schemas.keys() {
        indices.insert(key.as_str(), graph.add_node(key.as_str()));
    }
    for (from, to) in edges {
        if let (Some(&a), Some(&b)) = (indices.get(from.as_str()), indices.get(to.as_str())) {
            graph.update_edge(a, b, ());
        }
    }

    let mut marks = vec![Mark::Unvisited; graph.node_count()];
    let mut stack: Vec<NodeIndex> = Vec::new();
    let mut order = Vec::with_capacity(graph.node_count());
    for node in graph.node_indices() {
        visit_node(&graph, node, &mut marks, &mut stack, &mut order, schemas)?;
    }
    Ok(order)
}

fn visit_node(
    graph: &DiGraph<&str, ()>,
    node: NodeIndex,
    marks: &mut [Mark],
    stack: &mut Vec<NodeIndex>,
    order: &mut Vec<String>,
    schemas: &IndexMap<String, Schema>,
) -> Result<(), Diagnostic> {
    match marks[node.index()] {
        Mark::Done => return Ok(()),
        Mark::OnStack => {
            let start = stack.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle: Vec<String> =
                stack[start..].iter().map(|n| graph[*n].to_string()).collect();
            cycle.push(graph[node].to_string());
            let location = schemas
                .get(graph[node])
                .map(|s| s.source_location.clone())
                .unwrap_or_default();
            return Err(Diagnostic::new(&location, DiagnosticKind::RefCycle(cycle)));
        }
        Mark::Unvisited => {}
    }

    marks[node.index()] = Mark::OnStack;
    stack.push(node);

    let mut neighbors: Vec<NodeIndex> = graph.neighbors(node).collect();
    neighbors.reverse();
    for next in neighbors {
        visit_node(graph, next, marks, stack, order, schemas)?;
    }

    stack.pop();
    marks[node.index()] = Mark::Done;
    order.push(graph[node].to_string());
    Ok(())
}

// =============================================================================
// Pre-parse sort
// =============================================================================

/// Order raw top-level schemas (keyed by in-file path) so that local
/// referents come first. Refs under `items` and indirect refs are ignored.
/// Cycles are left to the post-parse sort to report.
pub fn sort_json_types(types: &IndexMap<String, Value>) -> Vec<String> {
    let keys: Vec<&String> = types.keys().collect();
    let mut deps: IndexMap<&str, Vec<&str>> = IndexMap::with_capacity(types.len());

    for (key, value) in types {
        let mut refs = Vec::new();
        collect_local_refs(value, &mut refs);
        let targets = refs
            .iter()
            .filter_map(|pointer| {
                keys.iter()
                    .find(|k| pointer == k.as_str() || pointer.starts_with(&format!("{}/", k)))
                    .map(|k| k.as_str())
            })
            .filter(|target| target != key)
            .collect();
        deps.insert(key.as_str(), targets);
    }

    let mut visited: HashSet<&str> = HashSet::with_capacity(types.len());
    let mut order = Vec::with_capacity(types.len());
    for key in deps.keys() {
        visit_json(key, &deps, &mut visited, &mut order);
    }
    order
}

fn visit_json<'a>(
    key: &'a str,
    deps: &IndexMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    order: &mut Vec<String>,
) {
    if !visited.insert(key) {
        return;
    }
    if let Some(targets) = deps.get(key) {
        for target in targets {
            visit_json(target, deps, visited, order);
        }
    }
    order.push(key.to_string());
}

fn collect_local_refs(value: &Value, refs: &mut Vec<String>) {
    match value {
        Value::Object(object) => {
            let indirect = object
                .iter()
                .any(|(k, v)| {
                    VendorKey::parse(k) == Some(VendorKey::Indirect) && v == &Value::Bool(true)
                });
            if let Some(Value::String(reference)) = object.get("$ref") {
                if let Some(pointer) = reference.strip_prefix('#') {
                    if !indirect {
                        refs.push(pointer.to_string());
                    }
                }
            }
            // array items may refer back without ordering constraints; a
            // property that happens to be called `items` is not one
            let is_array = object.get("type") == Some(&Value::String("array".to_string()));
            for (key, child) in object {
                if !(is_array && key == "items") {
                    collect_local_refs(child, refs);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_local_refs(item, refs);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parser::{ParserConfig, SchemaParser};
    use serde_json::json;

    fn parse(defs: &[(&str, Value)]) -> ParsedSchemas {
        let mut parser = SchemaParser::new(ParserConfig::default(), "a.yaml", "a.yaml");
        for (name, value) in defs {
            parser.parse_schema(&format!("/definitions/{name}"), value).unwrap();
        }
        parser.into_parsed_schemas()
    }

    fn position(resolved: &ResolvedSchemas, name: &str) -> usize {
        resolved.index_of(&format!("a.yaml#/definitions/{name}")).unwrap()
    }

    #[test]
    fn test_referents_come_first() {
        let parsed = parse(&[
            ("A", json!({"type": "object", "properties": {"b": {"$ref": "#/definitions/B"}}})),
            ("B", json!({"type": "object", "properties": {"c": {"$ref": "#/definitions/C"}}})),
            ("C", json!({"type": "string"})),
        ]);
        let resolved = sort_schemas(parsed, None).unwrap();
        assert!(position(&resolved, "C") < position(&resolved, "B"));
        assert!(position(&resolved, "B") < position(&resolved, "A"));

        let a = resolved.get("a.yaml#/definitions/A").unwrap();
        let r = a.as_object().unwrap().properties["b"].as_ref_schema().unwrap();
        assert_eq!(r.target.as_deref(), Some("a.yaml#/definitions/B"));
    }

    #[test]
    fn test_self_ref_through_array_items() {
        let parsed = parse(&[(
            "A",
            json!({
                "type": "object",
                "properties": {"children": {"type": "array", "items": {"$ref": "#/definitions/A"}}}
            }),
        )]);
        let resolved = sort_schemas(parsed, None).unwrap();
        let a = resolved.get("a.yaml#/definitions/A").unwrap();
        let SchemaKind::Array(array) = &a.as_object().unwrap().properties["children"].kind else {
            panic!("expected array");
        };
        assert!(array.items.as_ref_schema().unwrap().self_ref);
    }

    #[test]
    fn test_direct_cycle_rejected() {
        let parsed = parse(&[(
            "A",
            json!({"type": "object", "properties": {"p": {"$ref": "#/definitions/A"}}}),
        )]);
        let err = sort_schemas(parsed, None).unwrap_err();
        let DiagnosticKind::RefCycle(cycle) = err.kind else {
            panic!("expected cycle, got {err}");
        };
        assert!(cycle.contains(&"a.yaml#/definitions/A".to_string()));
    }

    #[test]
    fn test_indirect_cycle_allowed() {
        let parsed = parse(&[
            (
                "A",
                json!({"type": "object", "properties": {"b": {"$ref": "#/definitions/B"}}}),
            ),
            (
                "B",
                json!({
                    "type": "object",
                    "properties": {"a": {"$ref": "#/definitions/A", "x-usrv-cpp-indirect": true}}
                }),
            ),
        ]);
        let resolved = sort_schemas(parsed, None).unwrap();
        assert!(position(&resolved, "B") < position(&resolved, "A"));
    }

    #[test]
    fn test_unresolved_ref() {
        let parsed = parse(&[("A", json!({"$ref": "#/definitions/Missing"}))]);
        let err = sort_schemas(parsed, None).unwrap_err();
        assert_eq!(
            err.kind,
            DiagnosticKind::RefUnresolved("a.yaml#/definitions/Missing".to_string())
        );
    }

    #[test]
    fn test_indirect_propagates_along_alias_chain() {
        let parsed = parse(&[
            ("A", json!({"type": "object", "properties": {"x": {"$ref": "#/definitions/Alias"}}})),
            ("Alias", json!({"$ref": "#/definitions/A", "x-taxi-cpp-indirect": true})),
        ]);
        let resolved = sort_schemas(parsed, None).unwrap();
        let a = resolved.get("a.yaml#/definitions/A").unwrap();
        let r = a.as_object().unwrap().properties["x"].as_ref_schema().unwrap();
        assert!(r.indirect);
        assert_eq!(r.target.as_deref(), Some("a.yaml#/definitions/A"));
    }

    #[test]
    fn test_external_pool() {
        let external = sort_schemas(parse(&[("E", json!({"type": "string"}))]), None).unwrap();
        let mut parser = SchemaParser::new(ParserConfig::default(), "b.yaml", "b.yaml");
        parser
            .parse_schema("/definitions/U", &json!({"$ref": "a.yaml#/definitions/E"}))
            .unwrap();
        let resolved = sort_schemas(parser.into_parsed_schemas(), Some(&external)).unwrap();
        let r = resolved.get("b.yaml#/definitions/U").unwrap().as_ref_schema().unwrap();
        assert_eq!(r.target.as_deref(), Some("a.yaml#/definitions/E"));
    }

    #[test]
    fn test_discriminator_checked_after_resolution() {
        let parsed = parse(&[
            (
                "T",
                json!({
                    "oneOf": [{"$ref": "#/definitions/A"}],
                    "discriminator": {"propertyName": "kind"}
                }),
            ),
            ("A", json!({"type": "object", "properties": {"other": {"type": "string"}}})),
        ]);
        let err = sort_schemas(parsed, None).unwrap_err();
        assert!(matches!(err.kind, DiagnosticKind::DiscriminatorViolation(_)));
        assert_eq!(err.location, "/definitions/T");
    }

    #[test]
    fn test_pre_parse_sort() {
        let mut types = IndexMap::new();
        types.insert(
            "/definitions/A".to_string(),
            json!({
                "type": "object",
                "properties": {"b": {"$ref": "#/definitions/B/properties/x"}}
            }),
        );
        types.insert(
            "/definitions/B".to_string(),
            json!({
                "type": "object",
                "properties": {"x": {"type": "array", "items": {"$ref": "#/definitions/A"}}}
            }),
        );
        types.insert("/definitions/C".to_string(), json!({"type": "string"}));
        assert_eq!(
            sort_json_types(&types),
            vec!["/definitions/B", "/definitions/A", "/definitions/C"]
        );
    }

    #[test]
    fn test_pre_parse_sort_follows_property_named_items() {
        let mut types = IndexMap::new();
        types.insert(
            "/definitions/A".to_string(),
            json!({"type": "object", "properties": {"items": {"$ref": "#/definitions/B"}}}),
        );
        types.insert("/definitions/B".to_string(), json!({"type": "object", "properties": {}}));
        assert_eq!(sort_json_types(&types), vec!["/definitions/B", "/definitions/A"]);
    }
}
