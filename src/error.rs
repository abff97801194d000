use crate::path::FieldPath;

/// Errors raised while walking a schema along a field path, either to locate a value inside a
/// document or to synthesize flags for it.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no field named `{field}` defined for {schema} (path `{path}`)")]
    FieldNotFound {
        field: String,
        schema: String,
        path: FieldPath,
    },
    #[error("cannot index items of unmergeable list at `{path}`")]
    UnmergeableList { path: FieldPath },
    #[error("merge key of list at `{path}` is not a string: {value}")]
    MergeKeyNotString {
        path: FieldPath,
        value: serde_json::Value,
    },
    #[error("expected {expected} at `{path}`, found {found}")]
    TypeMismatch {
        path: FieldPath,
        expected: &'static str,
        found: &'static str,
    },
    #[error("malformed index `{0}`, index must be in brackets")]
    MalformedIndex(String),
    #[error("primitive field at `{path}` cannot have additional path elements `{remaining}`")]
    PathBeyondPrimitive {
        path: FieldPath,
        remaining: FieldPath,
    },
    #[error("reference to `{0}` cannot be resolved")]
    UnresolvedReference(String),
    #[error("field `{field}` is managed by the server and cannot be set with flags (path `{path}`)")]
    BlacklistedField { field: String, path: FieldPath },
    #[error("path must have at least one element")]
    EmptyPath,
    #[error("invalid value for flag `{flag}`: {message}")]
    InvalidFlag { flag: String, message: String },
    #[error("flag `{0}` is already registered for another field")]
    FlagConflict(String),
    #[error("paths disagree about the shape of `{0}`")]
    ConflictingPaths(String),
    #[error("flag `{flag}` has {found} values but {expected} list items are selected")]
    ElementCount {
        flag: String,
        expected: usize,
        found: usize,
    },
    #[error("values given for list items without any `{0}` to select them")]
    MissingElementKey(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
