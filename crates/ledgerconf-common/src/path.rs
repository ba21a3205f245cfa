//! Group paths inside a channel configuration tree
//!
//! A path is relative to the channel root group and is written with `/`
//! separators, e.g. `/Application/Org1`. The root itself is `/`.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigTxError;

/// Address of a group in the configuration tree.
///
/// Ordering is segment-wise lexicographic, so a parent always sorts before
/// its descendants and iteration over sorted paths is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupPath(Vec<String>);

impl GroupPath {
    /// The channel root group
    pub fn root() -> Self {
        GroupPath(Vec::new())
    }

    /// Build a path from segments, validating each one
    pub fn new<I, S>(segments: I) -> Result<Self, ConfigTxError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(GroupPath(segments))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Last segment, `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<GroupPath> {
        if self.is_root() {
            return None;
        }
        Some(GroupPath(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Path of a direct child. The name is trusted to be a valid segment
    /// because it always comes from an existing map key.
    pub fn child(&self, name: &str) -> GroupPath {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        GroupPath(segments)
    }

    /// Whether `self` equals `prefix` or lies beneath it
    pub fn starts_with(&self, prefix: &GroupPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Strict ancestors, nearest first, ending with the root
    pub fn ancestors(&self) -> impl Iterator<Item = GroupPath> + '_ {
        (0..self.0.len()).rev().map(|len| GroupPath(self.0[..len].to_vec()))
    }
}

fn validate_segment(segment: &str) -> Result<(), ConfigTxError> {
    if segment.is_empty() {
        return Err(ConfigTxError::InvalidEnvelope(
            "group path contains an empty segment".to_string(),
        ));
    }
    if segment.contains('/') {
        return Err(ConfigTxError::InvalidEnvelope(format!(
            "group name '{}' must not contain '/'",
            segment
        )));
    }
    Ok(())
}

impl Display for GroupPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for segment in &self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for GroupPath {
    type Err = ConfigTxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Ok(GroupPath::root());
        }
        GroupPath::new(trimmed.split('/'))
    }
}

impl TryFrom<String> for GroupPath {
    type Error = ConfigTxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GroupPath> for String {
    fn from(value: GroupPath) -> Self {
        value.to_string()
    }
}
