// ABOUTME: Tagged event kinds with an explicit is-a table used for dispatch
// ABOUTME: Interest sets describe which kinds a handler wants to receive

use std::collections::HashSet;
use std::fmt;

/// The variant tag every event reports.
///
/// Kinds form a small tree rooted at [`EventKind::Event`]. A handler
/// interested in a kind also receives every kind below it, so a handler for
/// `Message` sees `Command` events too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Root of the tree; every event is-a `Event`
    Event,
    /// Plain-text message
    Message,
    /// Message explicitly shaped as a bot command (e.g. `/start`)
    Command,
    /// Someone joined the channel
    MemberJoined,
    /// Someone left the channel
    MemberLeft,
    /// Broadcast post in a channel without a regular sender
    ChannelPost,
    /// Backend-specific occurrence (e.g. "dubtrack.playing")
    Custom(&'static str),
    /// Backend-specific message flavour; is-a `Message`
    CustomMessage(&'static str),
}

impl EventKind {
    /// Direct parent in the is-a table, `None` only for the root.
    pub fn parent(self) -> Option<EventKind> {
        match self {
            EventKind::Event => None,
            EventKind::Command | EventKind::CustomMessage(_) => Some(EventKind::Message),
            EventKind::Message
            | EventKind::MemberJoined
            | EventKind::MemberLeft
            | EventKind::ChannelPost
            | EventKind::Custom(_) => Some(EventKind::Event),
        }
    }

    /// Iterate this kind and its ancestors, most specific first.
    pub fn ancestry(self) -> Ancestry {
        Ancestry { next: Some(self) }
    }

    /// Whether `self` counts as `other` for dispatch purposes.
    pub fn is_a(self, other: EventKind) -> bool {
        self.ancestry().any(|kind| kind == other)
    }

    /// Whether events of this kind carry plain-text content.
    pub fn is_message(self) -> bool {
        self.is_a(EventKind::Message)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Event => f.write_str("event"),
            EventKind::Message => f.write_str("message"),
            EventKind::Command => f.write_str("command"),
            EventKind::MemberJoined => f.write_str("member_joined"),
            EventKind::MemberLeft => f.write_str("member_left"),
            EventKind::ChannelPost => f.write_str("channel_post"),
            EventKind::Custom(name) => write!(f, "custom:{}", name),
            EventKind::CustomMessage(name) => write!(f, "custom_message:{}", name),
        }
    }
}

/// Iterator over an [`EventKind`] lineage.
#[derive(Debug, Clone)]
pub struct Ancestry {
    next: Option<EventKind>,
}

impl Iterator for Ancestry {
    type Item = EventKind;

    fn next(&mut self) -> Option<EventKind> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

/// Set of event kinds a handler is registered for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interest {
    kinds: HashSet<EventKind>,
}

impl Interest {
    /// Empty interest. Registering a handler with it is an error.
    pub fn none() -> Self {
        Self::default()
    }

    /// Interest in a single kind.
    pub fn of(kind: EventKind) -> Self {
        Self::none().or(kind)
    }

    /// Add another member to the union.
    pub fn or(mut self, kind: EventKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Interest in every event.
    pub fn all() -> Self {
        Self::of(EventKind::Event)
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Merge another interest into this one.
    pub fn extend(&mut self, other: Interest) {
        self.kinds.extend(other.kinds);
    }
}

impl From<EventKind> for Interest {
    fn from(kind: EventKind) -> Self {
        Interest::of(kind)
    }
}

impl<const N: usize> From<[EventKind; N]> for Interest {
    fn from(kinds: [EventKind; N]) -> Self {
        kinds.into_iter().collect()
    }
}

impl From<Vec<EventKind>> for Interest {
    fn from(kinds: Vec<EventKind>) -> Self {
        kinds.into_iter().collect()
    }
}

impl FromIterator<EventKind> for Interest {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ancestry_most_specific_first() {
        let lineage: Vec<_> = EventKind::Command.ancestry().collect();
        assert_eq!(
            lineage,
            vec![EventKind::Command, EventKind::Message, EventKind::Event]
        );
    }

    #[test]
    fn test_root_has_no_parent() {
        assert_eq!(EventKind::Event.parent(), None);
        assert_eq!(EventKind::Event.ancestry().count(), 1);
    }

    #[test]
    fn test_custom_kinds_attach_to_expected_parents() {
        assert_eq!(
            EventKind::Custom("dubtrack.playing").parent(),
            Some(EventKind::Event)
        );
        assert!(EventKind::CustomMessage("dubtrack.chat").is_message());
        assert!(!EventKind::Custom("dubtrack.playing").is_message());
    }

    #[test]
    fn test_is_a_is_not_symmetric() {
        assert!(EventKind::Command.is_a(EventKind::Message));
        assert!(!EventKind::Message.is_a(EventKind::Command));
        assert!(EventKind::MemberJoined.is_a(EventKind::Event));
        assert!(!EventKind::MemberJoined.is_a(EventKind::MemberLeft));
    }

    #[test]
    fn test_interest_union_builder() {
        let interest = Interest::of(EventKind::MemberJoined).or(EventKind::MemberLeft);
        assert_eq!(interest.len(), 2);
        assert!(interest.contains(EventKind::MemberJoined));
        assert!(interest.contains(EventKind::MemberLeft));
        assert!(!interest.contains(EventKind::Message));
    }

    #[test]
    fn test_interest_from_array_dedupes() {
        let interest = Interest::from([EventKind::Message, EventKind::Message]);
        assert_eq!(interest.len(), 1);
        assert!(Interest::none().is_empty());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(EventKind::MemberJoined.to_string(), "member_joined");
        assert_eq!(EventKind::Custom("x").to_string(), "custom:x");
    }
}
