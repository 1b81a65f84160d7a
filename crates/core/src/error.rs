/// Fatal errors raised while building a form tree from a schema.
///
/// These describe defects in the schema itself. They abort construction and
/// are not recovered locally. Every variant carries the JSON pointer of the
/// schema location that caused it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// A `oneOf`/`anyOf`/`allOf` member declares a `type` other than its parent's.
    #[error("composition member at {path} redefines type '{parent}' as '{member}'")]
    CompositionTypeRedefinition {
        path: String,
        parent: String,
        member: String,
    },

    /// A composition branch redeclares a property of the parent's `properties`.
    #[error("property '{property}' at {path} is already declared by the parent schema")]
    CompositionPropertyRedefinition { path: String, property: String },

    /// Two `anyOf` branches declare the same property.
    #[error("property '{property}' at {path} is declared by more than one anyOf branch")]
    CompositionExclusivenessRedefinition { path: String, property: String },

    /// A combination of composition keywords the engine refuses to merge.
    #[error("unsupported composition at {path}: {message}")]
    CompositionUnsupported { path: String, message: String },

    /// `allOf` members declare incompatible types.
    #[error("allOf at {path} intersects incompatible types '{left}' and '{right}'")]
    AllOfTypeConflict {
        path: String,
        left: String,
        right: String,
    },

    /// `allOf` members declare different `const` values, or a `const` outside an `enum`.
    #[error("allOf at {path} intersects conflicting constants {left} and {right}")]
    AllOfConstConflict {
        path: String,
        left: serde_json::Value,
        right: serde_json::Value,
    },

    /// The intersection of `enum` lists is empty.
    #[error("allOf at {path} intersects enums with no common value")]
    AllOfEmptyEnum { path: String },

    /// A lower bound exceeds its upper bound after intersection.
    #[error("allOf at {path} produces an empty range: {lower} > {upper}")]
    AllOfInvalidRange {
        path: String,
        lower: String,
        upper: String,
    },

    /// A computed expression could not be parsed.
    #[error("invalid expression at {path}: {message} (in `{source_text}`)")]
    InvalidExpression {
        path: String,
        source_text: String,
        message: String,
    },

    /// The schema is structurally unusable (e.g. not an object).
    #[error("invalid schema at {path}: {message}")]
    InvalidSchema { path: String, message: String },
}

impl BuildError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            BuildError::CompositionTypeRedefinition { .. } => "COMPOSITION_TYPE_REDEFINITION",
            BuildError::CompositionPropertyRedefinition { .. } => {
                "COMPOSITION_PROPERTY_REDEFINITION"
            }
            BuildError::CompositionExclusivenessRedefinition { .. } => {
                "COMPOSITION_EXCLUSIVENESS_REDEFINITION"
            }
            BuildError::CompositionUnsupported { .. } => "COMPOSITION_UNSUPPORTED",
            BuildError::AllOfTypeConflict { .. } => "ALL_OF_TYPE_CONFLICT",
            BuildError::AllOfConstConflict { .. } => "ALL_OF_CONST_CONFLICT",
            BuildError::AllOfEmptyEnum { .. } => "ALL_OF_EMPTY_ENUM",
            BuildError::AllOfInvalidRange { .. } => "ALL_OF_INVALID_RANGE",
            BuildError::InvalidExpression { .. } => "INVALID_EXPRESSION",
            BuildError::InvalidSchema { .. } => "INVALID_SCHEMA",
        }
    }

    /// Schema pointer the error refers to.
    pub fn path(&self) -> &str {
        match self {
            BuildError::CompositionTypeRedefinition { path, .. }
            | BuildError::CompositionPropertyRedefinition { path, .. }
            | BuildError::CompositionExclusivenessRedefinition { path, .. }
            | BuildError::CompositionUnsupported { path, .. }
            | BuildError::AllOfTypeConflict { path, .. }
            | BuildError::AllOfConstConflict { path, .. }
            | BuildError::AllOfEmptyEnum { path }
            | BuildError::AllOfInvalidRange { path, .. }
            | BuildError::InvalidExpression { path, .. }
            | BuildError::InvalidSchema { path, .. } => path,
        }
    }

    /// Serialize to the JSON shape the CLI reports.
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "code":    self.code(),
            "path":    self.path(),
            "message": self.to_string(),
        })
    }
}
