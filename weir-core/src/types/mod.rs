//! Shared data types: collections, interned identifiers, source locations,
//! and findings.

pub mod collections;
pub mod findings;
pub mod identifiers;
pub mod interning;
pub mod location;

pub use collections::{FxHashMap, FxHashSet, SmallVec, SmallVec4, SmallVec8};
pub use findings::{Finding, PathStep};
pub use identifiers::{NodeKeyId, RoutineId};
pub use interning::KeyInterner;
pub use location::SourceLocation;
