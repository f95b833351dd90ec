use serde::{Deserialize, Serialize};

/// An application's declared name and constructor parameters. Concrete
/// application kinds (static-file server, simple response, redirector)
/// are external collaborators (spec.md §1); this crate only needs enough
/// of the shape to resolve a mount's `application` name at endpoint
/// start-time (spec.md §4.6) and to hand `params` to whatever factory the
/// embedding binary registers for `kind`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ApplicationConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}
