//! A small handle for producing [`Entry`] records.

use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    backend::{Backend, BackendError, outer::OuterLog},
    format::{FormatError, TemplateFormatter},
    record::Entry,
    rule::{Operator, Rule},
    types::{Level, Tags},
};

/// Scope name that sets the default threshold in [`Logger::set_level`].
pub const ALL_SCOPES: &str = "all";

/// Builds an [`Entry`] stamped with the call site's file, line, module and
/// enclosing function.
///
/// ```
/// use fieldlog::{entry, types::Level};
///
/// fn serve() -> fieldlog::record::Entry {
///     entry!(Level::Info, "listening on {}", 8080)
/// }
///
/// let e = serve();
/// assert_eq!(e.msg, "listening on 8080");
/// assert_eq!(e.func, "serve");
/// assert!(e.file.contains(':'));
/// ```
#[macro_export]
macro_rules! entry {
    ($level:expr, $($arg:tt)+) => {{
        fn here() {}
        let mut entry = $crate::record::Entry::new($level, format!($($arg)+));
        entry.file = concat!(file!(), ":", line!()).to_string();
        entry.pkg = module_path!().to_string();
        entry.func = $crate::logger::enclosing_fn(::std::any::type_name_of_val(&here)).to_string();
        entry
    }};
}

/// Name of the function enclosing a marker fn, given the marker's type name.
///
/// `"app::net::serve::{{closure}}::here"` becomes `"serve"`. Used by
/// [`entry!`].
#[doc(hidden)]
pub fn enclosing_fn(marker: &'static str) -> &'static str {
    let mut path = marker.strip_suffix("::here").unwrap_or(marker);
    while let Some(outer) = path.strip_suffix("::{{closure}}") {
        path = outer;
    }
    path.rsplit("::").next().unwrap_or(path)
}

#[derive(Debug, Default)]
struct LevelPolicy {
    default: Option<Level>,
    scopes: Vec<(String, Level)>,
}

impl LevelPolicy {
    fn set(&mut self, scope: &str, level: Level) {
        if scope == ALL_SCOPES {
            self.default = Some(level);
            return;
        }
        match self.scopes.iter_mut().find(|(s, _)| s == scope) {
            Some((_, l)) => *l = level,
            None => self.scopes.push((scope.to_string(), level)),
        }
        // Longest prefix first so nested modules beat their parents.
        self.scopes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    }

    fn rule(&self) -> Rule {
        let at_least = |level: Level| Rule::compare(Operator::Ge, "level", level);
        let branches = self
            .scopes
            .iter()
            .map(|(scope, level)| (Rule::compare(Operator::Prefix, "pkg", scope.as_str()), at_least(*level)));
        let default = self.default.map_or(Rule::True, at_least);
        Rule::select(branches, default)
    }
}

/// Cheap-to-clone handle committing [`Entry`] records to one backend.
///
/// Clones share the backend and the level policy; domain and tags are per
/// handle.
#[derive(Clone)]
pub struct Logger {
    backend: Arc<dyn Backend<Entry>>,
    domain: String,
    tags: Tags,
    policy: Arc<Mutex<LevelPolicy>>,
}

impl Logger {
    /// Logger over `backend`.
    pub fn new(backend: Arc<dyn Backend<Entry>>) -> Self {
        Self {
            backend,
            domain: String::new(),
            tags: Tags::new(),
            policy: Arc::default(),
        }
    }

    /// Copy of this logger stamping `domain` on entries that have none.
    pub fn with_domain(&self, domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..self.clone()
        }
    }

    /// Copy of this logger adding `tag` to every entry.
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.tags.insert(tag);
        next
    }

    /// The backend records go to.
    pub fn backend(&self) -> &Arc<dyn Backend<Entry>> {
        &self.backend
    }

    /// Sets the minimum level for entries whose `pkg` starts with `scope`,
    /// or for every entry when `scope` is `"all"`. Installs the resulting
    /// rule as the backend's filter.
    pub fn set_level(&self, scope: &str, level: Level) {
        let rule = {
            let mut policy = self.policy.lock().unwrap_or_else(PoisonError::into_inner);
            policy.set(scope, level);
            policy.rule()
        };
        self.backend.set_filter(rule);
    }

    /// Stamps the logger's domain and tags on `entry` and commits it.
    pub async fn commit(&self, mut entry: Entry) {
        if entry.domain.is_empty() {
            entry.domain.clone_from(&self.domain);
        }
        for tag in self.tags.iter() {
            entry.tags.insert(tag);
        }
        self.backend.commit(Arc::new(entry)).await;
    }

    /// Installs a [`TemplateFormatter`] over `template` on the backend,
    /// replacing whatever formatter it had.
    pub fn set_template(&self, mark: &str, template: &str) -> Result<(), FormatError> {
        let formatter = TemplateFormatter::new(mark, template)?;
        self.backend.set_formatter(Arc::new(formatter));
        Ok(())
    }

    /// Commits `msg` at `level`.
    pub async fn log(&self, level: Level, msg: impl Into<String>) {
        self.commit(Entry::new(level, msg)).await;
    }

    /// Commits `msg` at [`Level::Debug`].
    pub async fn debug(&self, msg: impl Into<String>) {
        self.log(Level::Debug, msg).await;
    }

    /// Commits `msg` at [`Level::Info`].
    pub async fn info(&self, msg: impl Into<String>) {
        self.log(Level::Info, msg).await;
    }

    /// Commits `msg` at [`Level::Warn`].
    pub async fn warn(&self, msg: impl Into<String>) {
        self.log(Level::Warn, msg).await;
    }

    /// Commits `msg` at [`Level::Error`].
    pub async fn error(&self, msg: impl Into<String>) {
        self.log(Level::Error, msg).await;
    }

    /// Bridge turning lines written by other code into entries on this
    /// logger's backend.
    pub fn outer_log(&self, level: Level, tag: impl Into<String>) -> OuterLog<Entry> {
        OuterLog::new(Arc::clone(&self.backend), level, tag)
    }

    /// Closes the backend.
    pub async fn close(&self) -> Result<(), BackendError> {
        self.backend.close().await
    }
}
