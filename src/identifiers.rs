//! Strongly-typed identifier newtypes for execution-service records.
//!
//! Identifiers are opaque lookup keys: they are stored verbatim (no trimming,
//! no splitting on `/`) and only ever percent-encoded as a single path
//! segment when a request URL is built.
//!
//! ```ignore
//! use actorpad::ActorId;
//!
//! let actor: ActorId = "apify/web-scraper".into();
//! assert_eq!(actor.as_str(), "apify/web-scraper");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generates string wrapper newtypes with consistent implementations.
///
/// Each generated type:
/// - Keeps the input value unchanged
/// - Implements `From<&str>`, `From<String>`, `Into<String>`
/// - Implements `Display` for string formatting
/// - Serializes/deserializes as a plain string
macro_rules! string_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// True when the identifier is empty or whitespace-only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_id_type!(
    ActorId,
    "Actor identifier, e.g. `apify/web-scraper` or a bare record id."
);

string_id_type!(RunId, "Identifier of one actor run.");

string_id_type!(DatasetId, "Identifier of the dataset a run writes into.");
