//! Newtype domain identifiers.
//!
//! Slices and steps are both counted from 1 and both travel as `u32`. Wrapping
//! them in distinct newtypes prevents passing a step number where a slice
//! number is expected, and makes the 1-based contract a type-level guarantee
//! (there is no slice 0 to underflow on).

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for 1-based counters.
// Generates: struct (Copy, Ord), new() returning Option<Self>, first(),
// get(), index() (0-based), next(), Display.
// ---------------------------------------------------------------------------
macro_rules! ordinal_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Creates a new ordinal, returning `None` for zero.
            pub fn new(value: u32) -> Option<Self> {
                NonZeroU32::new(value).map(Self)
            }

            /// The first ordinal (1).
            pub const fn first() -> Self {
                Self(NonZeroU32::MIN)
            }

            /// Returns the 1-based value.
            pub fn get(self) -> u32 {
                self.0.get()
            }

            /// Returns the 0-based position, suitable for indexing.
            pub fn index(self) -> usize {
                (self.0.get() - 1) as usize
            }

            /// Builds an ordinal from a 0-based position.
            ///
            /// Returns `None` if the position does not fit in a `u32` ordinal.
            pub fn from_index(index: usize) -> Option<Self> {
                u32::try_from(index)
                    .ok()
                    .and_then(|i| i.checked_add(1))
                    .and_then(Self::new)
            }

            /// Returns the following ordinal, or `None` on overflow.
            pub fn next(self) -> Option<Self> {
                self.0.checked_add(1).map(Self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single sectioning run (one call into the scheduler).
///
/// Generated fresh for every run; recorded on the `run` span and on the
/// [`crate::RunReport`] so all activity from one run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`RunId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: configuration names
// ---------------------------------------------------------------------------

string_id! {
    /// Operator-facing name of a configured step (e.g. `"laser mill"`).
    ///
    /// Names are unique within a plan; the experiment loader enforces this.
    StepName
}

// ---------------------------------------------------------------------------
// Identifiers: 1-based counters
// ---------------------------------------------------------------------------

ordinal_id! {
    /// Index of a slice within a run. Slice 1 uses every step's initial
    /// position unmodified.
    SliceNumber
}

ordinal_id! {
    /// Position of a step within a plan's fixed step order.
    StepNumber
}
