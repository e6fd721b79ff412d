//! Front end: documents in, ordered schema model out.

pub mod parser;
pub mod ref_resolver;
pub mod scan;
pub mod types;

pub use parser::{ParserConfig, SchemaParser};
pub use ref_resolver::{sort_json_types, sort_schemas};
pub use scan::extract_schemas_to_scan;
pub use types::{ParsedSchemas, ResolvedSchemas, Schema, SchemaKind};
