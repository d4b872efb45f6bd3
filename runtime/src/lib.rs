//! Compilation and evaluation of client filter payloads.
//!
//! A [`Query`] is compiled once per subscription against the accessor
//! registry of the requested payload kind and then applied to every
//! snapshot and live event. Evaluation is pure and does not allocate:
//! accessors are plain function pointers handing out borrowed
//! [`FieldValue`]s, and condition literals are parsed into their runtime
//! types at compile time.

mod error;
mod query;
pub mod registry;
mod value;

pub use error::FilterError;
pub use query::Query;
pub use registry::{registry, Extractor, FieldAccessor, Registry, SemanticType};
pub use value::{FieldValue, Literal};

/// Forces construction of all accessor registries. Called once during node
/// startup so that registry building cannot race subscription traffic.
pub fn init() {
    registry::init();
}
