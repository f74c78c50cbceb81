use std::fmt;

/// A repository as seen during one traversal.
///
/// `forked_from` names the repository being walked when this one was found
/// in its fork list. Roots have no lineage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub forked_from: Option<String>,
}

impl RepoRef {
    pub fn root(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            forked_from: None,
        }
    }

    /// A fork discovered while walking `parent`.
    pub fn fork_of(parent: &RepoRef, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            forked_from: Some(parent.full_name()),
        }
    }

    /// `owner/name`, also the lineage tag handed to forks.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
