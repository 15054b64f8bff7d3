//! Changes detected since the previous execution of a unit of work

use std::fmt;
use std::path::PathBuf;

/// Whether a property is an input or an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyRole {
    /// Input property
    Input,
    /// Output property
    Output,
}

impl fmt::Display for PropertyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("Input"),
            Self::Output => f.write_str("Output"),
        }
    }
}

/// What happened to a file of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// The file did not exist before
    Added,
    /// The file no longer exists
    Removed,
    /// Content or type of the file changed
    Modified,
}

/// One reason why a unit of work is out of date
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// The previous execution did not succeed
    PreviousExecutionFailed,
    /// A property exists now but did not before
    PropertyAdded {
        /// Input or output
        role: PropertyRole,
        /// Property name
        property: String,
    },
    /// A property existed before but does not now
    PropertyRemoved {
        /// Input or output
        role: PropertyRole,
        /// Property name
        property: String,
    },
    /// A file below a property changed
    File {
        /// Input or output
        role: PropertyRole,
        /// Property name
        property: String,
        /// Absolute path of the file
        path: PathBuf,
        /// What happened to it
        kind: FileChangeKind,
    },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreviousExecutionFailed => f.write_str("Previous execution failed."),
            Self::PropertyAdded { role, property } => {
                write!(f, "{role} property '{property}' has been added.")
            }
            Self::PropertyRemoved { role, property } => {
                write!(f, "{role} property '{property}' has been removed.")
            }
            Self::File {
                role,
                property,
                path,
                kind,
            } => {
                let what = match kind {
                    FileChangeKind::Added => "has been added",
                    FileChangeKind::Removed => "has been removed",
                    FileChangeKind::Modified => "has changed",
                };
                write!(
                    f,
                    "{role} property '{property}' file {} {what}.",
                    path.display()
                )
            }
        }
    }
}

/// Report of everything that changed since the previous execution
///
/// An empty report means the unit of work is up to date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStateChanges {
    changes: Vec<Change>,
}

impl ExecutionStateChanges {
    /// Wrap a list of changes
    #[must_use]
    pub fn new(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    /// A report without changes
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Visit changes in order until `visitor` returns `false`
    pub fn visit(&self, mut visitor: impl FnMut(&Change) -> bool) {
        for change in &self.changes {
            if !visitor(change) {
                break;
            }
        }
    }

    /// Whether nothing changed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// All changes
    #[must_use]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_stops_when_visitor_declines() {
        let changes = ExecutionStateChanges::new(
            (0..10)
                .map(|i| Change::PropertyAdded {
                    role: PropertyRole::Input,
                    property: format!("p{i}"),
                })
                .collect(),
        );
        let mut seen = 0;
        changes.visit(|_| {
            seen += 1;
            seen < 3
        });
        assert_eq!(seen, 3);
    }

    #[test]
    fn test_change_messages() {
        let change = Change::File {
            role: PropertyRole::Output,
            property: "classes".to_string(),
            path: PathBuf::from("/build/classes/A.class"),
            kind: FileChangeKind::Removed,
        };
        assert_eq!(
            change.to_string(),
            "Output property 'classes' file /build/classes/A.class has been removed."
        );
        assert_eq!(
            Change::PreviousExecutionFailed.to_string(),
            "Previous execution failed."
        );
    }
}
