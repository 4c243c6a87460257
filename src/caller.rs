//! Attribution of a query to the application code that issued it.
//!
//! The stack at hook time is mostly instrumentation: this crate, the
//! `backtrace` machinery, async glue and the database client. The resolver
//! walks outward past all of that and reports the first frame that belongs
//! to somebody else.

use std::borrow::Cow;

/// Innermost physical frames skipped before inspection (the unwinder's entry point).
const SKIP_FRAMES: usize = 1;

/// Physical frames inspected after skipping.
const MAX_DEPTH: usize = 16;

/// Namespaces that never count as "the caller".
const INTERNAL_NAMESPACES: &[&str] = &[
    env!("CARGO_CRATE_NAME"),
    "backtrace",
    "core",
    "std",
    "alloc",
    "async_trait",
    "sea_orm",
    "tracing",
    "futures",
    "futures_util",
    "tokio",
];

/// One resolved stack frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Fully-qualified, demangled function path.
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// The call site a query is attributed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    /// Last path segment of the function, e.g. `list_users`.
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// Finds the first stack frame outside a set of internal namespaces.
#[derive(Debug, Clone)]
pub struct CallerResolver {
    namespaces: Vec<Cow<'static, str>>,
}

impl Default for CallerResolver {
    fn default() -> Self {
        Self {
            namespaces: INTERNAL_NAMESPACES.iter().map(|ns| Cow::Borrowed(*ns)).collect(),
        }
    }
}

impl CallerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat another namespace (a crate or module path) as internal.
    ///
    /// Useful when the application wraps the connection in its own
    /// repository layer and wants the repository's callers instead.
    pub fn with_internal_namespace(mut self, namespace: impl Into<Cow<'static, str>>) -> Self {
        self.namespaces.push(namespace.into());
        self
    }

    /// Resolve the caller from the live stack.
    pub fn resolve(&self) -> Caller {
        let caller = self.first_external(capture_frames());
        if caller.function.is_empty() {
            tracing::trace!("no resolvable caller frame");
        }
        caller
    }

    /// Walk `frames` from innermost outward and pick the first external one.
    ///
    /// When every frame is internal the last frame examined is returned; an
    /// empty walk yields an empty [`Caller`].
    pub fn first_external<I>(&self, frames: I) -> Caller
    where
        I: IntoIterator<Item = Frame>,
    {
        let mut last = None;
        for frame in frames {
            let internal = self.is_internal(&frame.function);
            last = Some(frame);
            if !internal {
                break;
            }
        }

        match last {
            Some(frame) => Caller {
                function: short_name(&frame.function).to_string(),
                file: frame.file,
                line: frame.line,
            },
            None => Caller::default(),
        }
    }

    fn is_internal(&self, function: &str) -> bool {
        let path = owner_path(function);
        self.namespaces.iter().any(|ns| {
            path.strip_prefix(ns.as_ref())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
        })
    }
}

/// The path that owns a symbol: `<a::B as c::D>::f` is owned by `a::B`.
fn owner_path(function: &str) -> &str {
    function.strip_prefix('<').unwrap_or(function)
}

/// Last path segment, ignoring closure markers.
fn short_name(function: &str) -> &str {
    let mut path = function;
    while let Some(stripped) = path.strip_suffix("::{{closure}}") {
        path = stripped;
    }
    path.rsplit("::").next().unwrap_or(path)
}

/// Capture up to [`MAX_DEPTH`] frames of the current stack, innermost first.
///
/// Inlined functions resolve to several symbols within one physical frame;
/// each becomes its own [`Frame`]. Symbols without a name are dropped.
fn capture_frames() -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut seen = 0usize;

    backtrace::trace(|raw| {
        seen += 1;
        if seen <= SKIP_FRAMES {
            return true;
        }
        backtrace::resolve_frame(raw, |symbol| {
            let Some(name) = symbol.name() else {
                return;
            };
            frames.push(Frame {
                function: format!("{name:#}"),
                file: symbol
                    .filename()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default(),
                line: symbol.lineno().unwrap_or_default(),
            });
        });
        seen < SKIP_FRAMES + MAX_DEPTH
    });

    frames
}
