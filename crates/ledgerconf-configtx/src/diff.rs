//! Candidate construction and structural comparison of configuration trees

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ledgerconf_common::{ConfigTxError, GroupPath, Result};

use crate::envelope::{MutationOp, MutationSet};
use crate::tree::{ConfigGroup, ConfigPolicy, ConfigValue};

/// Apply a normalized mutation set on top of `base`.
///
/// Only the groups on a mutated path are copied; every other subtree of the
/// candidate is shared with `base`. Mutations that would not change anything
/// are skipped, so they bump no version. A new element starts at version 0, a
/// modified one gets its previous version plus one, and a group's version is
/// bumped once when its mod policy changes or a key is added to or removed
/// from it.
pub fn merge(base: &Arc<ConfigGroup>, set: &MutationSet) -> Result<Arc<ConfigGroup>> {
    let mut merger = Merger {
        root: Arc::clone(base),
        bumped: BTreeSet::new(),
    };

    for (path, mod_policy) in set.group_puts() {
        merger.put_group(path, mod_policy)?;
    }
    for mutation in set.edits() {
        let path = &mutation.path;
        match &mutation.op {
            MutationOp::PutValue { key, value } => {
                let current = merger.existing_group(path)?.values.get(key);
                if current.is_some_and(|c| c.value == *value) {
                    continue;
                }
                let version = current.map(|c| c.version + 1);
                let group = merger.group_mut(path)?;
                group.values.insert(
                    key.clone(),
                    ConfigValue::new(value.clone()).with_version(version.unwrap_or(0)),
                );
                if version.is_none() {
                    merger.bump(path);
                }
            }
            MutationOp::PutPolicy { key, policy } => {
                let current = merger.existing_group(path)?.policies.get(key);
                if current.is_some_and(|c| c.policy == *policy) {
                    continue;
                }
                let version = current.map(|c| c.version + 1);
                let group = merger.group_mut(path)?;
                group.policies.insert(
                    key.clone(),
                    ConfigPolicy {
                        version: version.unwrap_or(0),
                        policy: policy.clone(),
                    },
                );
                if version.is_none() {
                    merger.bump(path);
                }
            }
            MutationOp::DeleteValue { key } => {
                if merger.lookup(path).is_some_and(|g| g.values.contains_key(key)) {
                    merger.group_mut(path)?.values.remove(key);
                    merger.bump(path);
                }
            }
            MutationOp::DeletePolicy { key } => {
                if merger.lookup(path).is_some_and(|g| g.policies.contains_key(key)) {
                    merger.group_mut(path)?.policies.remove(key);
                    merger.bump(path);
                }
            }
            MutationOp::PutGroup { .. } | MutationOp::DeleteGroup => {}
        }
    }
    for path in set.group_deletes() {
        merger.delete_group(path)?;
    }

    let mut root = merger.root;
    let bumped = merger.bumped;
    apply_bumps(&mut root, &GroupPath::root(), base, &bumped);
    Ok(root)
}

struct Merger {
    root: Arc<ConfigGroup>,
    /// Groups whose version is settled for this update: bumped, or created
    bumped: BTreeSet<GroupPath>,
}

impl Merger {
    fn lookup(&self, path: &GroupPath) -> Option<&ConfigGroup> {
        self.root.group(path)
    }

    fn existing_group(&self, path: &GroupPath) -> Result<&ConfigGroup> {
        self.lookup(path)
            .ok_or_else(|| ConfigTxError::InvalidEnvelope(format!("group {} does not exist", path)))
    }

    fn group_mut(&mut self, path: &GroupPath) -> Result<&mut ConfigGroup> {
        let mut current = Arc::make_mut(&mut self.root);
        for segment in path.segments() {
            let child = current.groups.get_mut(segment).ok_or_else(|| {
                ConfigTxError::InvalidEnvelope(format!("group {} does not exist", path))
            })?;
            current = Arc::make_mut(child);
        }
        Ok(current)
    }

    fn bump(&mut self, path: &GroupPath) {
        self.bumped.insert(path.clone());
    }

    fn put_group(&mut self, path: &GroupPath, mod_policy: &str) -> Result<()> {
        if let Some(existing) = self.lookup(path) {
            if existing.mod_policy != mod_policy {
                self.group_mut(path)?.mod_policy = mod_policy.to_string();
                self.bump(path);
            }
            return Ok(());
        }

        let (Some(parent), Some(name)) = (path.parent(), path.name()) else {
            return Err(ConfigTxError::InvalidEnvelope(format!(
                "group {} cannot be created",
                path
            )));
        };
        if self.lookup(&parent).is_none() {
            return Err(ConfigTxError::InvalidEnvelope(format!(
                "cannot create {}: parent group {} does not exist",
                path, parent
            )));
        }
        self.group_mut(&parent)?
            .groups
            .insert(name.to_string(), Arc::new(ConfigGroup::new(mod_policy)));
        self.bump(&parent);
        // Created groups start at version 0
        self.bumped.insert(path.clone());
        Ok(())
    }

    fn delete_group(&mut self, path: &GroupPath) -> Result<()> {
        if self.lookup(path).is_none() {
            return Ok(());
        }
        let (Some(parent), Some(name)) = (path.parent(), path.name()) else {
            return Err(ConfigTxError::InvalidEnvelope(
                "the root group cannot be deleted".to_string(),
            ));
        };
        self.group_mut(&parent)?.groups.remove(name);
        self.bump(&parent);
        Ok(())
    }
}

/// Bump the version of every group in `bumped` that existed in `base`.
/// Untouched subtrees are left shared.
fn apply_bumps(
    node: &mut Arc<ConfigGroup>,
    path: &GroupPath,
    base: &Arc<ConfigGroup>,
    bumped: &BTreeSet<GroupPath>,
) {
    if !bumped.iter().any(|b| b.starts_with(path)) {
        return;
    }
    let base_version = base.group(path).map(|g| g.version);
    let group = Arc::make_mut(node);
    if bumped.contains(path)
        && let Some(version) = base_version
    {
        group.version = version + 1;
    }
    for (name, child) in group.groups.iter_mut() {
        apply_bumps(child, &path.child(name), base, bumped);
    }
}

/// A change to a single keyed element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<T> {
    Added(T),
    Modified { before: T, after: T },
    Removed(T),
}

impl<T> Change<T> {
    /// The element as it will be after the update, `None` for a removal
    pub fn after(&self) -> Option<&T> {
        match self {
            Change::Added(after) | Change::Modified { after, .. } => Some(after),
            Change::Removed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Added,
    Modified,
    Removed,
}

/// Everything that changed within one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDiff {
    pub status: GroupStatus,
    pub mod_policy_changed: bool,
    pub children_changed: bool,
    pub values: BTreeMap<String, Change<ConfigValue>>,
    pub policies: BTreeMap<String, Change<ConfigPolicy>>,
}

impl GroupDiff {
    fn new(status: GroupStatus) -> Self {
        Self {
            status,
            mod_policy_changed: false,
            children_changed: false,
            values: BTreeMap::new(),
            policies: BTreeMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.status == GroupStatus::Modified
            && !self.mod_policy_changed
            && !self.children_changed
            && self.values.is_empty()
            && self.policies.is_empty()
    }
}

/// Structural difference between the committed tree and a candidate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    groups: BTreeMap<GroupPath, GroupDiff>,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&GroupPath, &GroupDiff)> {
        self.groups.iter()
    }

    pub fn group(&self, path: &GroupPath) -> Option<&GroupDiff> {
        self.groups.get(path)
    }

    /// Every group that was added, removed, or changed, in path order
    pub fn touched_paths(&self) -> Vec<GroupPath> {
        self.groups.keys().cloned().collect()
    }

    /// Touched groups that exist on both sides. Each is authorized by its
    /// committed mod policy; added and removed groups are covered by their
    /// parent, whose child set changed.
    pub fn authorization_paths(&self) -> Vec<GroupPath> {
        self.groups
            .iter()
            .filter(|(_, d)| d.status == GroupStatus::Modified)
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Touched groups that survive the update, plus all of their ancestors.
    /// These are the groups whose mod policy must remain satisfiable.
    pub fn surviving_paths(&self) -> Vec<GroupPath> {
        let mut paths = BTreeSet::new();
        for (path, diff) in &self.groups {
            if diff.status == GroupStatus::Removed {
                continue;
            }
            paths.insert(path.clone());
            paths.extend(path.ancestors());
        }
        paths.into_iter().collect()
    }
}

/// Compare two trees. Subtrees shared between them are skipped without
/// being walked.
pub fn diff(before: &Arc<ConfigGroup>, after: &Arc<ConfigGroup>) -> ConfigDiff {
    let mut out = ConfigDiff::default();
    diff_group(&GroupPath::root(), Some(before), Some(after), &mut out);
    out
}

fn diff_group(
    path: &GroupPath,
    before: Option<&Arc<ConfigGroup>>,
    after: Option<&Arc<ConfigGroup>>,
    out: &mut ConfigDiff,
) {
    let mut group_diff = match (before, after) {
        (Some(b), Some(a)) if Arc::ptr_eq(b, a) => return,
        (Some(b), Some(a)) => {
            let mut d = GroupDiff::new(GroupStatus::Modified);
            d.mod_policy_changed = b.mod_policy != a.mod_policy;
            d.children_changed = !b.groups.keys().eq(a.groups.keys());
            d
        }
        (None, Some(_)) => GroupDiff::new(GroupStatus::Added),
        (Some(_), None) => GroupDiff::new(GroupStatus::Removed),
        (None, None) => return,
    };

    let empty = ConfigGroup::default();
    let b = before.map(Arc::as_ref).unwrap_or(&empty);
    let a = after.map(Arc::as_ref).unwrap_or(&empty);
    group_diff.values = diff_map(&b.values, &a.values);
    group_diff.policies = diff_map(&b.policies, &a.policies);

    if !group_diff.is_empty() {
        out.groups.insert(path.clone(), group_diff);
    }

    let names: BTreeSet<&String> = b.groups.keys().chain(a.groups.keys()).collect();
    for name in names {
        diff_group(&path.child(name), b.groups.get(name), a.groups.get(name), out);
    }
}

fn diff_map<T: Clone + PartialEq>(
    before: &BTreeMap<String, T>,
    after: &BTreeMap<String, T>,
) -> BTreeMap<String, Change<T>> {
    let mut changes = BTreeMap::new();
    for (key, old) in before {
        match after.get(key) {
            None => {
                changes.insert(key.clone(), Change::Removed(old.clone()));
            }
            Some(new) if new != old => {
                changes.insert(
                    key.clone(),
                    Change::Modified {
                        before: old.clone(),
                        after: new.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }
    for (key, new) in after {
        if !before.contains_key(key) {
            changes.insert(key.clone(), Change::Added(new.clone()));
        }
    }
    changes
}
