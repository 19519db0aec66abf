use std::fmt;

/// Failures surfaced by a render or by a dispatch.
///
/// A render that fails is discarded as a whole; the committed tree is never
/// touched by a failing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A component requested a different number of hooks than it did in the
    /// committed render.
    HookCountMismatch {
        component: &'static str,
        previous: usize,
        current: usize,
    },
    /// The hook at `index` changed kind between renders.
    HookKindMismatch {
        component: &'static str,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    /// The hook at `index` was read back with a different value type.
    HookTypeMismatch {
        component: &'static str,
        index: usize,
        expected: &'static str,
    },
    /// The bits do not name exactly one known lane.
    UnknownLane { bits: u32 },
    /// The root a dispatcher points at has been dropped.
    RootUnavailable,
    /// The root is already rendering or committing on this thread.
    Reentrant,
    /// A component function reported a failure.
    Component {
        component: Option<&'static str>,
        message: String,
    },
}

impl ReconcileError {
    /// Error raised from inside a component function. The walker fills in the
    /// component name on the way out.
    pub fn render(message: impl Into<String>) -> Self {
        ReconcileError::Component {
            component: None,
            message: message.into(),
        }
    }

    pub(crate) fn with_component(self, name: &'static str) -> Self {
        match self {
            ReconcileError::Component {
                component: None,
                message,
            } => ReconcileError::Component {
                component: Some(name),
                message,
            },
            other => other,
        }
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::HookCountMismatch {
                component,
                previous,
                current,
            } => write!(
                f,
                "{component} rendered {current} hooks, previous render had {previous}"
            ),
            ReconcileError::HookKindMismatch {
                component,
                index,
                expected,
                found,
            } => write!(
                f,
                "{component} hook #{index} changed kind; expected {expected}, found {found}"
            ),
            ReconcileError::HookTypeMismatch {
                component,
                index,
                expected,
            } => write!(
                f,
                "{component} hook #{index} type mismatch; expected {expected}"
            ),
            ReconcileError::UnknownLane { bits } => {
                write!(f, "lane bits {bits:#b} do not name a single known lane")
            }
            ReconcileError::RootUnavailable => f.write_str("root has been dropped"),
            ReconcileError::Reentrant => f.write_str("root is already rendering"),
            ReconcileError::Component {
                component: Some(name),
                message,
            } => write!(f, "{name} failed to render: {message}"),
            ReconcileError::Component {
                component: None,
                message,
            } => write!(f, "render failed: {message}"),
        }
    }
}

impl std::error::Error for ReconcileError {}
