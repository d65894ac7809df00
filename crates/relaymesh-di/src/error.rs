//! DI container error taxonomy.

use thiserror::Error;

/// Result alias for DI operations.
pub type DiResult<T> = std::result::Result<T, DiError>;

/// Errors produced while registering or resolving services.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum DiError {
    /// No descriptor is registered for the requested key.
    #[error("no service registered for {0}")]
    NotRegistered(String),

    /// A parameter could not be resolved; the parameter name is attached
    /// so the caller can surface a useful diagnostic (per the injection
    /// plan's execution contract).
    #[error("failed to resolve parameter `{parameter}`: {reason}")]
    ParameterResolution {
        /// The failing parameter's declared name.
        parameter: String,
        /// Human-readable reason for the failure.
        reason: String,
    },

    /// A value-strategy parameter could not be converted to its target
    /// scalar or collection type.
    #[error("cannot convert value for parameter `{parameter}` to {target}: {reason}")]
    ValueConversion {
        /// The failing parameter's declared name.
        parameter: String,
        /// The requested target type name.
        target: String,
        /// Human-readable reason for the failure.
        reason: String,
    },

    /// A factory or constructor raised while building an instance.
    #[error("construction failed for {key}: {reason}")]
    ConstructionFailed {
        /// The service key being constructed.
        key: String,
        /// Human-readable reason for the failure.
        reason: String,
    },

    /// A hosted service's start or stop routine failed.
    #[error("hosted service `{name}` {phase} failed: {reason}")]
    HostedLifecycle {
        /// The hosted service's registered type name.
        name: String,
        /// Either `"start"` or `"stop"`.
        phase: &'static str,
        /// Human-readable reason for the failure.
        reason: String,
    },
}
