//! Handler registry: which handler owns which key of which group

use std::collections::BTreeMap;
use std::sync::Arc;

use ledgerconf_common::{ConfigTxError, GroupPath, Result};
use tracing::{debug, info, warn};

use crate::handler::{HandlerFactory, HandlerSet, Initializer, PolicyHandler};
use crate::policy_handler::{MembershipSource, TreePolicyHandler};
use crate::resources::Resources;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Segment {
    Literal(String),
    Any,
}

/// A group path where `*` matches any single group name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathPattern(Vec<Segment>);

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let trimmed = pattern.strip_prefix('/').unwrap_or(pattern);
        if trimmed.is_empty() {
            return Ok(Self(Vec::new()));
        }
        trimmed
            .split('/')
            .map(|segment| match segment {
                "" => Err(ConfigTxError::Registry(format!(
                    "pattern '{}' contains an empty segment",
                    pattern
                ))),
                "*" => Ok(Segment::Any),
                name => Ok(Segment::Literal(name.to_string())),
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn matches(&self, path: &GroupPath) -> bool {
        self.0.len() == path.depth()
            && self.0.iter().zip(path.segments()).all(|(segment, name)| match segment {
                Segment::Any => true,
                Segment::Literal(literal) => literal == name,
            })
    }

    /// Whether some path would match both patterns
    pub fn overlaps(&self, other: &PathPattern) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(&other.0).all(|(a, b)| match (a, b) {
                (Segment::Literal(x), Segment::Literal(y)) => x == y,
                _ => true,
            })
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.0 {
            match segment {
                Segment::Any => write!(f, "/*")?,
                Segment::Literal(name) => write!(f, "/{}", name)?,
            }
        }
        Ok(())
    }
}

/// Identity of one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerToken(usize);

struct PatternEntry {
    pattern: PathPattern,
    tokens: Vec<HandlerToken>,
    keys: BTreeMap<String, HandlerToken>,
}

/// Maps `(path pattern, key)` to the handler factory that owns it.
///
/// Every group path matches at most one registered pattern and every key of
/// a pattern has exactly one owner, so routing a proposal never depends on
/// registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: Vec<Arc<dyn HandlerFactory>>,
    entries: Vec<PatternEntry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a group that carries no values of its own
    pub fn register_group(&mut self, pattern: &str) -> Result<()> {
        let pattern = PathPattern::parse(pattern)?;
        self.entry_mut(pattern)?;
        Ok(())
    }

    /// Register `factory` as the owner of `keys` on groups matching `pattern`
    pub fn register(
        &mut self,
        pattern: &str,
        keys: &[&str],
        factory: Arc<dyn HandlerFactory>,
    ) -> Result<HandlerToken> {
        let pattern = PathPattern::parse(pattern)?;
        let token = HandlerToken(self.factories.len());
        let name = factory.name();

        let entry = self.entry_mut(pattern)?;
        if let Some(key) = keys.iter().find(|k| entry.keys.contains_key(**k)) {
            return Err(ConfigTxError::Registry(format!(
                "key '{}' at {} is already owned by another handler",
                key, entry.pattern
            )));
        }
        for key in keys {
            entry.keys.insert((*key).to_string(), token);
        }
        entry.tokens.push(token);
        debug!(pattern = %entry.pattern, handler = name, keys = keys.len(), "Registered config handler");

        self.factories.push(factory);
        Ok(token)
    }

    fn entry_mut(&mut self, pattern: PathPattern) -> Result<&mut PatternEntry> {
        if let Some(conflict) = self
            .entries
            .iter()
            .find(|e| e.pattern != pattern && e.pattern.overlaps(&pattern))
        {
            return Err(ConfigTxError::Registry(format!(
                "pattern {} overlaps registered pattern {}",
                pattern, conflict.pattern
            )));
        }
        let index = match self.entries.iter().position(|e| e.pattern == pattern) {
            Some(index) => index,
            None => {
                self.entries.push(PatternEntry {
                    pattern,
                    tokens: Vec::new(),
                    keys: BTreeMap::new(),
                });
                self.entries.len() - 1
            }
        };
        Ok(&mut self.entries[index])
    }

    fn resolve(&self, path: &GroupPath) -> Option<&PatternEntry> {
        self.entries.iter().find(|e| e.pattern.matches(path))
    }

    pub fn is_registered(&self, path: &GroupPath) -> bool {
        self.resolve(path).is_some()
    }

    /// The registration owning `key` at `path`
    pub fn owner(&self, path: &GroupPath, key: &str) -> Result<HandlerToken> {
        self.resolve(path)
            .and_then(|e| e.keys.get(key).copied())
            .ok_or_else(|| ConfigTxError::unknown_key(path, key))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &PathPattern> {
        self.entries.iter().map(|e| &e.pattern)
    }

    /// Begin every handler registered for `path`. If one fails to begin, the
    /// handlers already begun for it are rolled back.
    pub fn begin(&self, path: &GroupPath, committed: &Resources) -> Result<HandlerSet> {
        let entry = self
            .resolve(path)
            .ok_or_else(|| ConfigTxError::HandlerInitFailure {
                path: path.clone(),
                reason: "no handlers are registered for this group".to_string(),
            })?;

        let mut set = HandlerSet::new(path.clone());
        for token in &entry.tokens {
            let factory = &self.factories[token.0];
            match factory.begin_config(path, committed) {
                Ok(handler) => {
                    let keys = entry
                        .keys
                        .iter()
                        .filter(|(_, owner)| *owner == token)
                        .map(|(key, _)| key.clone());
                    set.add(keys, handler);
                }
                Err(e) => {
                    warn!(path = %path, handler = factory.name(), "Handler failed to begin: {}", e);
                    set.rollback();
                    return Err(match e {
                        ConfigTxError::HandlerInitFailure { .. } => e,
                        other => ConfigTxError::HandlerInitFailure {
                            path: path.clone(),
                            reason: other.to_string(),
                        },
                    });
                }
            }
        }
        Ok(set)
    }
}

/// Initializer backed by a handler registry and the tree policy handler
pub struct RegistryInitializer {
    registry: HandlerRegistry,
    membership: Arc<dyn MembershipSource>,
}

impl RegistryInitializer {
    pub fn new(registry: HandlerRegistry, membership: Arc<dyn MembershipSource>) -> Self {
        info!(patterns = registry.entries.len(), handlers = registry.factories.len(), "Config handler registry ready");
        Self {
            registry,
            membership,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }
}

impl Initializer for RegistryInitializer {
    fn begin_config(&self, path: &GroupPath, committed: &Resources) -> Result<HandlerSet> {
        self.registry.begin(path, committed)
    }

    fn begin_policy(&self, _committed: &Resources) -> Result<Box<dyn PolicyHandler>> {
        Ok(Box::new(TreePolicyHandler::new(Arc::clone(&self.membership))))
    }
}
