//! Capsule membrane — Symbolic Constants
//!
//! The closed registry of language-intrinsic protocol markers. Both
//! membranes share it, so a marker crosses the boundary by name and comes
//! out as the same canonical constant on the other side.
//!
//! Anything outside the registry has no wire encoding.

use serde::{Deserialize, Serialize};

/// The fixed set of well-known protocol markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WellKnownSymbol {
    AsyncIterator,
    HasInstance,
    IsConcatSpreadable,
    Iterator,
    Match,
    MatchAll,
    Replace,
    Search,
    Species,
    Split,
    ToPrimitive,
    ToStringTag,
    Unscopables,
}

impl WellKnownSymbol {
    /// Every registered marker, in registry order.
    pub const ALL: [WellKnownSymbol; 13] = [
        WellKnownSymbol::AsyncIterator,
        WellKnownSymbol::HasInstance,
        WellKnownSymbol::IsConcatSpreadable,
        WellKnownSymbol::Iterator,
        WellKnownSymbol::Match,
        WellKnownSymbol::MatchAll,
        WellKnownSymbol::Replace,
        WellKnownSymbol::Search,
        WellKnownSymbol::Species,
        WellKnownSymbol::Split,
        WellKnownSymbol::ToPrimitive,
        WellKnownSymbol::ToStringTag,
        WellKnownSymbol::Unscopables,
    ];

    /// Wire name of the marker.
    pub fn name(self) -> &'static str {
        match self {
            WellKnownSymbol::AsyncIterator => "asyncIterator",
            WellKnownSymbol::HasInstance => "hasInstance",
            WellKnownSymbol::IsConcatSpreadable => "isConcatSpreadable",
            WellKnownSymbol::Iterator => "iterator",
            WellKnownSymbol::Match => "match",
            WellKnownSymbol::MatchAll => "matchAll",
            WellKnownSymbol::Replace => "replace",
            WellKnownSymbol::Search => "search",
            WellKnownSymbol::Species => "species",
            WellKnownSymbol::Split => "split",
            WellKnownSymbol::ToPrimitive => "toPrimitive",
            WellKnownSymbol::ToStringTag => "toStringTag",
            WellKnownSymbol::Unscopables => "unscopables",
        }
    }

    /// Look a marker up by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|symbol| symbol.name() == name)
    }
}

/// A symbol as seen by live code on either side.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    /// A registered marker; transmissible.
    WellKnown(WellKnownSymbol),
    /// A user-defined symbol; has no wire encoding.
    Unregistered(String),
}

impl From<WellKnownSymbol> for Symbol {
    fn from(symbol: WellKnownSymbol) -> Self {
        Symbol::WellKnown(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_thirteen_markers() {
        assert_eq!(WellKnownSymbol::ALL.len(), 13);
    }

    #[test]
    fn names_resolve_back_to_markers() {
        for symbol in WellKnownSymbol::ALL {
            assert_eq!(WellKnownSymbol::from_name(symbol.name()), Some(symbol));
        }
        assert_eq!(WellKnownSymbol::from_name("dispose"), None);
    }
}
