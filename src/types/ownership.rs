//! Value ownership kinds

use strum::{Display, EnumString};

/// Ownership tag of an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OwnershipKind {
    /// Trivial value, or ownership not tracked
    #[default]
    None,
    /// The holder must consume the value
    Owned,
    /// Borrowed for a scope
    Guaranteed,
    /// Unmanaged, must be copied before use
    Unowned,
}

impl OwnershipKind {
    /// Combine the kinds of values aggregated into one. Owned dominates
    /// guaranteed, which dominates unowned; trivial values do not contribute.
    pub fn merge(self, other: OwnershipKind) -> OwnershipKind {
        use OwnershipKind::*;
        match (self, other) {
            (Owned, _) | (_, Owned) => Owned,
            (Guaranteed, _) | (_, Guaranteed) => Guaranteed,
            (Unowned, _) | (_, Unowned) => Unowned,
            _ => None,
        }
    }

    pub fn merge_all(kinds: impl IntoIterator<Item = OwnershipKind>) -> OwnershipKind {
        kinds.into_iter().fold(OwnershipKind::None, OwnershipKind::merge)
    }

    /// `@owned` style attribute used in block argument declarations
    pub fn attribute(self) -> Option<String> {
        match self {
            OwnershipKind::None => None,
            kind => Some(format!("@{}", kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        use OwnershipKind::*;
        assert_eq!(OwnershipKind::merge_all([None, Guaranteed, Owned]), Owned);
        assert_eq!(OwnershipKind::merge_all([Unowned, Guaranteed]), Guaranteed);
        assert_eq!(OwnershipKind::merge_all([None, None]), None);
        assert_eq!(OwnershipKind::merge_all([]), None);
        assert_eq!(Unowned.merge(None), Unowned);
    }

    #[test]
    fn test_attribute() {
        assert_eq!(OwnershipKind::Guaranteed.attribute().as_deref(), Some("@guaranteed"));
        assert_eq!(OwnershipKind::None.attribute(), None);
        assert_eq!("owned".parse::<OwnershipKind>(), Ok(OwnershipKind::Owned));
    }
}
