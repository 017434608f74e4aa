//! Repository events and trigger matching

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of repository event that may start a workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventKind {
    Push,
    PullRequest,
    /// Any other event name (e.g. `schedule`, `workflow_dispatch`)
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::Other(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err("event name cannot be empty".to_string());
        }
        Ok(match name {
            "push" => EventKind::Push,
            "pull_request" | "pull-request" => EventKind::PullRequest,
            other => EventKind::Other(other.to_string()),
        })
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(EventKind::Other(s))
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// An incoming repository event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEvent {
    pub kind: EventKind,

    /// Branch the event refers to, when known
    pub branch: Option<String>,
}

impl RepositoryEvent {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, branch: None }
    }

    pub fn push() -> Self {
        Self::new(EventKind::Push)
    }

    pub fn pull_request() -> Self {
        Self::new(EventKind::PullRequest)
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

impl fmt::Display for RepositoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.branch {
            Some(branch) => write!(f, "{} ({})", self.kind, branch),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Glob pattern over branch names (`*` stays within a path segment, `**` crosses them)
#[derive(Debug, Clone)]
pub struct BranchPattern {
    source: String,
    regex: Regex,
}

impl BranchPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut expr = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    expr.push_str(".*");
                }
                '*' => expr.push_str("[^/]*"),
                '?' => expr.push_str("[^/]"),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        Ok(Self {
            source: pattern.to_string(),
            regex: Regex::new(&expr)?,
        })
    }

    pub fn matches(&self, branch: &str) -> bool {
        self.regex.is_match(branch)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// A single trigger entry: an event kind with optional branch filters
#[derive(Debug, Clone)]
pub struct Trigger {
    pub kind: EventKind,
    pub branches: Vec<BranchPattern>,
    pub branches_ignore: Vec<BranchPattern>,
}

impl Trigger {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            branches: Vec::new(),
            branches_ignore: Vec::new(),
        }
    }

    /// Check whether the event satisfies this trigger.
    ///
    /// Branch filters only apply when the event carries a branch.
    pub fn matches(&self, event: &RepositoryEvent) -> bool {
        if self.kind != event.kind {
            return false;
        }

        let Some(branch) = event.branch.as_deref() else {
            return true;
        };

        if !self.branches.is_empty() && !self.branches.iter().any(|p| p.matches(branch)) {
            return false;
        }

        !self.branches_ignore.iter().any(|p| p.matches(branch))
    }
}

/// The immutable set of events that start a workflow
#[derive(Debug, Clone, Default)]
pub struct TriggerSet {
    triggers: Vec<Trigger>,
}

impl TriggerSet {
    pub fn new(triggers: Vec<Trigger>) -> Self {
        Self { triggers }
    }

    pub fn from_kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self::new(kinds.into_iter().map(Trigger::new).collect())
    }

    pub fn matches(&self, event: &RepositoryEvent) -> bool {
        self.triggers.iter().any(|t| t.matches(event))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &EventKind> {
        self.triggers.iter().map(|t| &t.kind)
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}
