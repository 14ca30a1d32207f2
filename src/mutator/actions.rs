use std::fmt;

use enum_map::Enum;
use itertools::Itertools;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// Things a mutator step can do, in the order they are applied within one step.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Enum,
    EnumIter,
    EnumCount,
    EnumString,
    Display,
    IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ActionKind {
    /// Push a new frame.
    Call,
    /// Pop the current frame, unless it is the root frame.
    Return,
    /// Allocate an object into the current frame's locals.
    Newobj,
    /// Move a local into the static roots.
    PutStatic,
    /// Replace a static root with a local.
    ChangeStatic,
    /// Drop a static root.
    EraseStatic,
    /// Store a local into a reference field of a reachable object, preferring null fields.
    PutRef,
    /// Store a local into any reference field of a reachable object.
    ChangeRef,
    /// Null a reference field of a reachable object.
    EraseRef,
}

const_assert!(<ActionKind as strum::EnumCount>::COUNT <= u16::BITS as usize);

/// A set of [`ActionKind`]s, iterated in declaration order.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct ActionSet(u16);

impl ActionSet {
    pub const EMPTY: ActionSet = ActionSet(0);

    fn bit(kind: ActionKind) -> u16 {
        1 << (kind as u16)
    }

    pub fn single(kind: ActionKind) -> Self {
        ActionSet(Self::bit(kind))
    }

    pub fn insert(&mut self, kind: ActionKind) {
        self.0 |= Self::bit(kind);
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.0 & Self::bit(kind) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = ActionKind> {
        let set = *self;
        ActionKind::iter().filter(move |kind| set.contains(*kind))
    }
}

impl FromIterator<ActionKind> for ActionSet {
    fn from_iter<I: IntoIterator<Item = ActionKind>>(iter: I) -> Self {
        let mut set = ActionSet::EMPTY;
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl fmt::Display for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        write!(f, "{}", self.iter().join("|"))
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionSet({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_in_priority_order() {
        let set: ActionSet = [ActionKind::EraseRef, ActionKind::Call, ActionKind::Newobj]
            .into_iter()
            .collect();
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![ActionKind::Call, ActionKind::Newobj, ActionKind::EraseRef]
        );
        assert_eq!(set.len(), 3);
        assert_eq!(set.to_string(), "Call|Newobj|EraseRef");
    }

    #[test]
    fn empty_set() {
        assert!(ActionSet::EMPTY.is_empty());
        assert_eq!(ActionSet::EMPTY.iter().count(), 0);
        assert!(ActionSet::single(ActionKind::Return).contains(ActionKind::Return));
        assert!(!ActionSet::single(ActionKind::Return).contains(ActionKind::Call));
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("putstatic".parse::<ActionKind>().unwrap(), ActionKind::PutStatic);
        assert_eq!("NEWOBJ".parse::<ActionKind>().unwrap(), ActionKind::Newobj);
        assert!("jump".parse::<ActionKind>().is_err());
    }
}
