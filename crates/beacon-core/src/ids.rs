//! Branded ID newtypes.
//!
//! Entity IDs are assigned by the server and arrive as opaque strings, so the
//! newtypes only exist to keep a `TaskId` from being passed where a
//! `WorkerId` is expected. IDs minted on the client (notifications, ack
//! correlation) are UUID v7.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh time-ordered ID (UUID v7).
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Borrow the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id! {
    /// Identifier of a scheduled task.
    TaskId
}

branded_id! {
    /// Identifier of a worker that executes tasks.
    WorkerId
}

branded_id! {
    /// Identifier of a workflow.
    WorkflowId
}

branded_id! {
    /// Identifier of a node inside a workflow graph.
    NodeId
}

branded_id! {
    /// Identifier of a pending human review on a workflow node.
    ReviewId
}

branded_id! {
    /// Identifier of a user-facing notification.
    NotificationId
}

branded_id! {
    /// Client-generated correlation ID pairing a request with its reply.
    CorrelationId
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn generated_ids_are_unique() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = TaskId::from("T1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"T1\"");
        let back: TaskId = serde_json::from_str("\"T1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = HashMap::new();
        let _ = map.insert(WorkerId::from("w-1"), 3);
        assert_eq!(map.get("w-1"), Some(&3));
    }

    #[test]
    fn display_matches_inner() {
        assert_eq!(WorkflowId::from("wf-9").to_string(), "wf-9");
    }
}
