//! Cluster/ensemble data model: the Member/View/Cluster types the
//! routing layer and discovery loop both close over.
//!
//! A [`Cluster`] is a named, flagged-local-or-remote group of [`Node`]s that
//! share one hash ring. An [`Ensemble`] is the stable set of all
//! known clusters. A [`View`] is what `Membership` reports: an unordered
//! snapshot of [`Member`]s, compared by set difference during discovery.

pub mod node;
pub mod ring;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub use node::Node;

/// `{name, host, port}` triple identifying a participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Member {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }
}

/// Snapshot of Members reported by a Node on request. Two Views diff by set
/// difference on `members`, never by position or arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub members: HashSet<Member>,
}

impl View {
    pub fn new(members: HashSet<Member>) -> Self {
        Self { members }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Members present in `self` but absent from `previous`: joiners when
    /// `previous` is the last known view, or everything when
    /// `previous` is empty.
    pub fn joined_since<'a>(&'a self, previous: &View) -> impl Iterator<Item = &'a Member> {
        self.members.difference(&previous.members)
    }

    /// Members present in `previous` but absent from `self`: leavers.
    pub fn left_since<'a>(&'a self, previous: &'a View) -> impl Iterator<Item = &'a Member> {
        previous.members.difference(&self.members)
    }
}

/// Whether a [`Cluster`] is the process's own cluster (membership driven by
/// a runtime callback) or a federated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterKind {
    Local,
    Remote,
}

/// Named identity of a cluster, independent of its live membership. The
/// Ensemble is keyed by this name; the live node set lives in
/// [`crate::router::Router`], not here, since membership changes far more
/// often than identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub String);

impl ClusterId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static description of a cluster: its identity and whether it is local.
/// The ensemble (the set of all known clusters) is stable across the
/// lifetime of the process; only the per-cluster node set churns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub kind: ClusterKind,
}

impl Cluster {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            id: ClusterId::new(name),
            kind: ClusterKind::Local,
        }
    }

    pub fn remote(name: impl Into<String>) -> Self {
        Self {
            id: ClusterId::new(name),
            kind: ClusterKind::Remote,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.kind, ClusterKind::Local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str) -> Member {
        Member::new(name, "localhost", 9000)
    }

    #[test]
    fn view_diff_against_empty_yields_all_members() {
        let view = View::new(HashSet::from([member("n1"), member("n2")]));
        let previous = View::empty();
        let mut joined: Vec<_> = view.joined_since(&previous).map(|m| m.name.clone()).collect();
        joined.sort();
        assert_eq!(joined, vec!["n1".to_string(), "n2".to_string()]);
        assert_eq!(view.left_since(&previous).count(), 0);
    }

    #[test]
    fn view_diff_detects_joiners_and_leavers() {
        let previous = View::new(HashSet::from([member("n1"), member("n2")]));
        let current = View::new(HashSet::from([member("n2"), member("n3")]));

        let joined: Vec<_> = current.joined_since(&previous).map(|m| m.name.clone()).collect();
        let left: Vec<_> = current.left_since(&previous).map(|m| m.name.clone()).collect();
        assert_eq!(joined, vec!["n3".to_string()]);
        assert_eq!(left, vec!["n1".to_string()]);
    }

    #[test]
    fn unchanged_view_has_no_diff() {
        let view = View::new(HashSet::from([member("n1")]));
        assert_eq!(view.joined_since(&view).count(), 0);
        assert_eq!(view.left_since(&view).count(), 0);
    }
}
