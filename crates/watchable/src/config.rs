#![forbid(unsafe_code)]

//! Cell configuration.
//!
//! The only knob that changes observable behavior is the [`DispatchPolicy`]:
//! what `set` does when a listener returns an error. Configuration can be
//! built in code or read from the environment:
//!
//! | Variable | Values |
//! |----------|--------|
//! | `WATCHABLE_DISPATCH_POLICY` | `continue`, `aggregate`, `fail-fast`, `failfast` |
//! | `WATCHABLE_TRACE_DISPATCH` | `1`, `true`, `yes`, `on` |

use std::fmt;
use std::str::FromStr;

/// Environment variable selecting the dispatch policy.
pub const DISPATCH_POLICY_ENV: &str = "WATCHABLE_DISPATCH_POLICY";

/// Environment variable enabling per-listener trace events.
pub const TRACE_DISPATCH_ENV: &str = "WATCHABLE_TRACE_DISPATCH";

/// What `set` does when a listener fails.
///
/// Both policies report failures to the caller as
/// [`WatchError::ListenerDispatch`](crate::WatchError::ListenerDispatch); they
/// differ only in whether later listeners still run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchPolicy {
    /// Invoke every listener, then report all failures together.
    #[default]
    ContinueAndAggregate,
    /// Stop at the first failing listener and report it.
    FailFast,
}

impl DispatchPolicy {
    /// Read the policy from `WATCHABLE_DISPATCH_POLICY`, if set and valid.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read the policy through a custom environment lookup.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        get_env(DISPATCH_POLICY_ENV).and_then(|value| value.parse().ok())
    }

    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContinueAndAggregate => "continue",
            Self::FailFast => "fail-fast",
        }
    }
}

impl fmt::Display for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a policy label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePolicyError(String);

impl fmt::Display for ParsePolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown dispatch policy: {}", self.0)
    }
}

impl std::error::Error for ParsePolicyError {}

impl FromStr for DispatchPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" | "aggregate" | "continue-and-aggregate" => Ok(Self::ContinueAndAggregate),
            "fail-fast" | "failfast" | "fail_fast" => Ok(Self::FailFast),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

#[inline]
fn env_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Configuration for a [`Watchable`](crate::Watchable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchableConfig {
    /// Listener failure policy.
    pub dispatch_policy: DispatchPolicy,
    /// Emit a `trace` event before each listener invocation.
    pub trace_dispatch: bool,
}

impl WatchableConfig {
    /// Default configuration: continue-and-aggregate, no per-listener tracing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from the process environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Build a config through a custom environment lookup.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            dispatch_policy: DispatchPolicy::from_env_with(&get_env)
                .unwrap_or(defaults.dispatch_policy),
            trace_dispatch: get_env(TRACE_DISPATCH_ENV)
                .map(|value| env_flag(&value))
                .unwrap_or(defaults.trace_dispatch),
        }
    }

    /// Set the listener failure policy.
    #[must_use]
    pub fn with_dispatch_policy(mut self, policy: DispatchPolicy) -> Self {
        self.dispatch_policy = policy;
        self
    }

    /// Enable or disable per-listener trace events.
    #[must_use]
    pub fn with_trace_dispatch(mut self, enabled: bool) -> Self {
        self.trace_dispatch = enabled;
        self
    }
}
