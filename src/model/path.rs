use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which kind of node a path segment addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Step,
    Task,
}

impl NodeKind {
    /// The one-letter prefix used on the wire (`s` or `t`)
    pub fn prefix(self) -> char {
        match self {
            NodeKind::Step => 's',
            NodeKind::Task => 't',
        }
    }

    pub fn from_prefix(raw: &str) -> Option<NodeKind> {
        match raw {
            "s" => Some(NodeKind::Step),
            "t" => Some(NodeKind::Task),
            _ => None,
        }
    }

    /// Kind of the children of a node of this kind
    pub fn child_kind(self) -> NodeKind {
        match self {
            NodeKind::Step => NodeKind::Task,
            NodeKind::Task => NodeKind::Step,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Step => "step",
            NodeKind::Task => "task",
        }
    }
}

/// One `kind:index` element of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment {
    pub kind: NodeKind,
    pub index: usize,
}

impl Segment {
    pub fn new(kind: NodeKind, index: usize) -> Self {
        Segment { kind, index }
    }

    pub fn step(index: usize) -> Self {
        Segment::new(NodeKind::Step, index)
    }

    pub fn task(index: usize) -> Self {
        Segment::new(NodeKind::Task, index)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.index)
    }
}

/// Why a path string was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("segment {position} ({part:?}) is not of the form kind:index")]
    MissingSeparator { position: usize, part: String },
    #[error("segment {position} has unknown kind {kind:?} (expected s or t)")]
    UnknownKind { position: usize, kind: String },
    #[error("segment {position} has invalid index {index:?}")]
    InvalidIndex { position: usize, index: String },
    #[error("path must start with a step segment (s:<n>)")]
    FirstNotStep,
    #[error("segments {position} and {next} share the same kind", next = .position + 1)]
    RepeatedKind { position: usize },
}

/// A validated address of a node in the step/task tree.
///
/// The segment list is never empty, starts with a step segment and
/// alternates kinds. Every constructor upholds this, so holding a
/// `NodePath` is proof of a well-formed address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath {
    segments: Vec<Segment>,
}

impl NodePath {
    /// Parse the dotted wire form (`s:0.t:1.s:2`).
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments: Vec<Segment> = Vec::new();
        for (position, part) in raw.split('.').enumerate() {
            let Some((kind_raw, index_raw)) = part.split_once(':') else {
                return Err(PathError::MissingSeparator {
                    position,
                    part: part.to_string(),
                });
            };
            let kind = NodeKind::from_prefix(kind_raw).ok_or_else(|| PathError::UnknownKind {
                position,
                kind: kind_raw.to_string(),
            })?;
            let index = parse_index(index_raw).ok_or_else(|| PathError::InvalidIndex {
                position,
                index: index_raw.to_string(),
            })?;

            match segments.last() {
                None if kind != NodeKind::Step => return Err(PathError::FirstNotStep),
                Some(prev) if prev.kind == kind => {
                    return Err(PathError::RepeatedKind {
                        position: position - 1,
                    });
                }
                _ => {}
            }
            segments.push(Segment { kind, index });
        }

        Ok(NodePath { segments })
    }

    /// Build a path from raw segments, validating the same invariants as `parse`.
    pub fn from_segments(segments: Vec<Segment>) -> Result<Self, PathError> {
        let Some(first) = segments.first() else {
            return Err(PathError::Empty);
        };
        if first.kind != NodeKind::Step {
            return Err(PathError::FirstNotStep);
        }
        if let Some(position) = segments.windows(2).position(|w| w[0].kind == w[1].kind) {
            return Err(PathError::RepeatedKind { position });
        }
        Ok(NodePath { segments })
    }

    /// Path of the root-level step at `index`
    pub fn root(index: usize) -> Self {
        NodePath {
            segments: vec![Segment::step(index)],
        }
    }

    /// Path of this node's child at `index`. The child kind is implied by
    /// alternation: steps contain tasks, tasks contain steps.
    pub fn child(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::new(self.kind().child_kind(), index));
        NodePath { segments }
    }

    /// Parent path, or `None` for a root step
    pub fn parent(&self) -> Option<NodePath> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(NodePath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn last(&self) -> Segment {
        // Non-empty by construction
        self.segments[self.segments.len() - 1]
    }

    /// Kind of the addressed node
    pub fn kind(&self) -> NodeKind {
        self.last().kind
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_task_addressed(&self) -> bool {
        self.kind() == NodeKind::Task
    }

    /// True if `self` is `other` or lies beneath it
    pub fn starts_with(&self, other: &NodePath) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

/// Digits only: no sign, no whitespace.
fn parse_index(raw: &str) -> Option<usize> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for NodePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodePath::parse(s)
    }
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NodePath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// String-level helpers
// ---------------------------------------------------------------------------

/// Append a `kind:index` segment to a serialized base path.
/// A missing or empty base yields just the new segment.
pub fn build_path(base: Option<&str>, kind: NodeKind, index: usize) -> String {
    let segment = Segment::new(kind, index);
    match base {
        Some(base) if !base.is_empty() => format!("{}.{}", base, segment),
        _ => segment.to_string(),
    }
}

/// True iff `raw` is a valid path whose last segment addresses a task node.
pub fn is_task_addressed(raw: &str) -> bool {
    NodePath::parse(raw).is_ok_and(|p| p.is_task_addressed())
}
