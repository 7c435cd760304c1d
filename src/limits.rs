//! Numeric limits shared by the scanner, compiler, and evaluator.
//!
//! These bound all recursive/iterative work in the crate: no cancellation
//! tokens are offered, only these fixed caps.

/// Largest document `query`/`set`/`delete` will accept, in bytes.
pub const MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024;

/// Largest element nesting depth the scanner will descend.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Largest number of segments a compiled path may contain.
pub const MAX_PATH_SEGMENTS: usize = 100;

/// Largest byte length of a field/element/attribute name segment.
pub const MAX_FIELD_NAME_LENGTH: usize = 256;

/// Largest byte length of a namespace prefix before it is folded back to
/// unprefixed matching.
pub const MAX_NAMESPACE_PREFIX_LENGTH: usize = 256;

/// Largest number of results a wildcard/recursive-wildcard/filter-all/
/// field-extraction query will emit before silently truncating.
pub const MAX_WILDCARD_RESULTS: usize = 1000;

/// Largest single token (element/attribute name, quoted value run, comment,
/// CDATA block...) the scanner will scan before failing as malformed.
pub const MAX_TOKEN_SIZE: usize = 1024 * 1024;

/// Largest number of attributes tracked per element.
pub const MAX_ATTRIBUTES: usize = 512;

/// Capacity of the process-global compiled-path cache.
pub const PATH_CACHE_CAPACITY: usize = 256;
