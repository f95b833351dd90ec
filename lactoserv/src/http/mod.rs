//! HTTP-adjacent primitives that sit below the dispatch pipeline: strict
//! cookie parsing/writing, conditional-GET/range evaluation, header
//! helpers, and the request record (spec.md §3, §4.7, §4.8).

pub mod conditional;
pub mod cookie;
pub mod headers;
pub mod request;

pub use conditional::{is_content_fresh, is_range_applicable, ResourceStats};
pub use cookie::{Cookie, SameSite, SetCookie};
pub use request::{PseudoHeaders, Request};
