//! Route predicates.
//!
//! A route is selected when its predicate accepts the message. Predicates can be
//! supplied directly as closures, or described declaratively with
//! [`PredicateSpec`] (the form used by control-message descriptors and config
//! files) and compiled against the available caches.
//!
//! # Design Decisions
//! - Header matching is exact and case-sensitive
//! - Empty `all` matches everything, empty `any` matches nothing
//! - No regex, evaluation is a bounded walk over the compiled tree

use crate::cache::{CacheRegistry, SharedCache};
use crate::error::ConfigurationError;
use crate::message::Message;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Decides whether a route accepts a message.
pub trait Predicate: Send + Sync {
    fn matches(&self, message: &Message) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    fn matches(&self, message: &Message) -> bool {
        self(message)
    }
}

/// Wraps a closure as a shareable predicate.
pub fn predicate_fn<F>(f: F) -> Arc<dyn Predicate>
where
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Declarative matcher description.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredicateSpec {
    #[default]
    Always,
    Never,
    HeaderEquals {
        name: String,
        value: String,
    },
    HeaderPresent {
        name: String,
    },
    HeaderPrefix {
        name: String,
        prefix: String,
    },
    /// Compares the value at a JSON pointer (RFC 6901) inside the payload.
    PayloadFieldEquals {
        pointer: String,
        value: Value,
    },
    All {
        predicates: Vec<PredicateSpec>,
    },
    Any {
        predicates: Vec<PredicateSpec>,
    },
    Not {
        predicate: Box<PredicateSpec>,
    },
    /// Memoizes `predicate` per value of `key_header` in a named shared cache.
    Cached {
        cache: String,
        key_header: String,
        predicate: Box<PredicateSpec>,
    },
}

impl PredicateSpec {
    /// Compiles the description into an executable predicate.
    ///
    /// Cache references are resolved here, so a missing cache surfaces at
    /// subscribe time rather than on the dispatch path.
    pub fn compile(&self, caches: &CacheRegistry) -> Result<Arc<dyn Predicate>, ConfigurationError> {
        let predicate: Arc<dyn Predicate> = Arc::new(self.compile_node(caches)?);
        Ok(predicate)
    }

    fn compile_node(&self, caches: &CacheRegistry) -> Result<Compiled, ConfigurationError> {
        let compiled = match self {
            PredicateSpec::Always => Compiled::Constant(true),
            PredicateSpec::Never => Compiled::Constant(false),
            PredicateSpec::HeaderEquals { name, value } => {
                Compiled::HeaderEquals(non_empty("predicate.name", name)?, value.clone())
            }
            PredicateSpec::HeaderPresent { name } => {
                Compiled::HeaderPresent(non_empty("predicate.name", name)?)
            }
            PredicateSpec::HeaderPrefix { name, prefix } => {
                Compiled::HeaderPrefix(non_empty("predicate.name", name)?, prefix.clone())
            }
            PredicateSpec::PayloadFieldEquals { pointer, value } => {
                if !pointer.is_empty() && !pointer.starts_with('/') {
                    return Err(ConfigurationError::new(
                        "predicate.pointer",
                        format!("{pointer:?} is not a JSON pointer"),
                    ));
                }
                Compiled::PayloadFieldEquals(pointer.clone(), value.clone())
            }
            PredicateSpec::All { predicates } => Compiled::All(
                predicates
                    .iter()
                    .map(|spec| spec.compile_node(caches))
                    .collect::<Result<_, _>>()?,
            ),
            PredicateSpec::Any { predicates } => Compiled::Any(
                predicates
                    .iter()
                    .map(|spec| spec.compile_node(caches))
                    .collect::<Result<_, _>>()?,
            ),
            PredicateSpec::Not { predicate } => {
                Compiled::Not(Box::new(predicate.compile_node(caches)?))
            }
            PredicateSpec::Cached {
                cache,
                key_header,
                predicate,
            } => {
                let slot = caches.slot(cache).ok_or_else(|| {
                    ConfigurationError::new("predicate.cache", format!("unknown cache {cache:?}"))
                })?;
                let key_header = non_empty("predicate.key_header", key_header)?;
                let inner = Box::new(predicate.compile_node(caches)?);
                // Resolve last so a rejected description never creates the cache.
                Compiled::Cached {
                    cache: slot.resolve()?,
                    namespace: Uuid::new_v4().to_string(),
                    key_header,
                    inner,
                }
            }
        };
        Ok(compiled)
    }
}

impl fmt::Display for PredicateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateSpec::Always => write!(f, "always"),
            PredicateSpec::Never => write!(f, "never"),
            PredicateSpec::HeaderEquals { name, value } => write!(f, "{name}=={value:?}"),
            PredicateSpec::HeaderPresent { name } => write!(f, "has({name})"),
            PredicateSpec::HeaderPrefix { name, prefix } => {
                write!(f, "{name}^={prefix:?}")
            }
            PredicateSpec::PayloadFieldEquals { pointer, value } => {
                write!(f, "payload{pointer}=={value}")
            }
            PredicateSpec::All { predicates } => write_joined(f, "all", predicates),
            PredicateSpec::Any { predicates } => write_joined(f, "any", predicates),
            PredicateSpec::Not { predicate } => write!(f, "not({predicate})"),
            PredicateSpec::Cached {
                cache,
                key_header,
                predicate,
            } => write!(f, "cached[{cache}:{key_header}]({predicate})"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, op: &str, specs: &[PredicateSpec]) -> fmt::Result {
    write!(f, "{op}(")?;
    for (i, spec) in specs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{spec}")?;
    }
    write!(f, ")")
}

fn non_empty(field: &str, value: &str) -> Result<String, ConfigurationError> {
    if value.is_empty() {
        return Err(ConfigurationError::new(field, "must not be empty"));
    }
    Ok(value.to_string())
}

enum Compiled {
    Constant(bool),
    HeaderEquals(String, String),
    HeaderPresent(String),
    HeaderPrefix(String, String),
    PayloadFieldEquals(String, Value),
    All(Vec<Compiled>),
    Any(Vec<Compiled>),
    Not(Box<Compiled>),
    Cached {
        cache: Arc<SharedCache>,
        /// Unique per compiled node; entries of other predicates sharing the cache never collide.
        namespace: String,
        key_header: String,
        inner: Box<Compiled>,
    },
}

impl Compiled {
    fn evaluate(&self, message: &Message) -> bool {
        match self {
            Compiled::Constant(verdict) => *verdict,
            Compiled::HeaderEquals(name, value) => message.header(name) == Some(value.as_str()),
            Compiled::HeaderPresent(name) => message.headers.contains_key(name),
            Compiled::HeaderPrefix(name, prefix) => message
                .header(name)
                .map(|value| value.starts_with(prefix.as_str()))
                .unwrap_or(false),
            Compiled::PayloadFieldEquals(pointer, value) => {
                message.payload.pointer(pointer) == Some(value)
            }
            Compiled::All(children) => children.iter().all(|child| child.evaluate(message)),
            Compiled::Any(children) => children.iter().any(|child| child.evaluate(message)),
            Compiled::Not(child) => !child.evaluate(message),
            Compiled::Cached {
                cache,
                namespace,
                key_header,
                inner,
            } => {
                let Some(value) = message.header(key_header) else {
                    return inner.evaluate(message);
                };
                let key = cache_key(namespace, key_header, value);
                if let Some(Value::Bool(verdict)) = cache.get(&key) {
                    return verdict;
                }
                let verdict = inner.evaluate(message);
                cache.put(key, Value::Bool(verdict));
                verdict
            }
        }
    }
}

fn cache_key(namespace: &str, key_header: &str, value: &str) -> String {
    format!("{namespace}\u{0}{key_header}\u{0}{value}")
}

impl Predicate for Compiled {
    fn matches(&self, message: &Message) -> bool {
        self.evaluate(message)
    }
}
