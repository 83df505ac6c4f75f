use std::rc::Rc;

use parse_display::Display;

/// Error type returned by compute, validate and transform callbacks.
pub type BoxError = Box<dyn std::error::Error + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[non_exhaustive]
#[derive(Display, Debug)]
pub enum Error {
    /// A property table could not be normalized.
    #[display("invalid configuration for `{property}`: {message}")]
    Configuration { property: String, message: String },

    /// A write that the property does not accept.
    #[display("invalid mutation of `{property}`: {message}")]
    InvalidMutation { property: String, message: String },

    /// A computed property was read again while its own evaluation was still running.
    #[display("circular dependency in computed property `{property}`")]
    CircularDependency {
        property: String,
        computing: Vec<String>,
    },

    /// A compute function failed. The property stays stale.
    #[display("error computing property `{property}`: {source}")]
    ComputationFailure { property: String, source: BoxError },

    #[display("unknown property `{property}`")]
    UnknownProperty { property: String },

    #[display("public subscription to `{event}` is not allowed")]
    SubscriptionDenied { event: String },

    #[display("model has been destroyed")]
    Destroyed,

    /// A deferred initial value failed to resolve.
    #[display("error initializing property `{property}`: {source}")]
    Initialization { property: String, source: BoxError },
}

impl Error {
    pub(crate) fn configuration(property: &str, message: impl Into<String>) -> Self {
        Error::Configuration {
            property: property.to_owned(),
            message: message.into(),
        }
    }
    pub(crate) fn invalid_mutation(property: &str, message: impl Into<String>) -> Self {
        Error::InvalidMutation {
            property: property.to_owned(),
            message: message.into(),
        }
    }
    pub(crate) fn unknown_property(property: &str) -> Self {
        Error::UnknownProperty {
            property: property.to_owned(),
        }
    }

    pub fn is_circular_dependency(&self) -> bool {
        matches!(self, Error::CircularDependency { .. })
    }
    pub fn is_invalid_mutation(&self) -> bool {
        matches!(self, Error::InvalidMutation { .. })
    }

    /// Wraps an error raised by a compute function.
    ///
    /// Cycles are passed through unchanged so that the outermost read reports them as such.
    pub(crate) fn computation(property: &str, source: BoxError) -> Self {
        match source.downcast::<Error>() {
            Ok(e) if e.is_circular_dependency() => *e,
            Ok(e) => Error::ComputationFailure {
                property: property.to_owned(),
                source: e,
            },
            Err(source) => Error::ComputationFailure {
                property: property.to_owned(),
                source,
            },
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ComputationFailure { source, .. } | Error::Initialization { source, .. } => {
                Some(source.as_ref())
            }
            _ => None,
        }
    }
}

/// Shared form of [`Error`], used where one failure is delivered to several observers.
pub type SharedError = Rc<Error>;
