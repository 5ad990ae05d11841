//! Subscription Registry
//!
//! Authoritative record of which instruments the client wants to stream and
//! in which mode. The registry is the only durable client-side state: after
//! every reconnect it is replayed verbatim so the server-side subscription
//! set matches it again.
//!
//! # Design
//!
//! Every mutation updates the registry first and then reports the upstream
//! changes needed to bring the server in line. The caller sends those
//! changes if the channel is open; if it is not, nothing is rolled back and
//! the next resubscription carries the intent.
//!
//! The registry is owned by the session event loop and is never shared
//! across tasks, so it needs no locking.

use std::collections::{BTreeMap, HashMap};

use crate::domain::instrument::{InstrumentToken, StreamMode};

// =============================================================================
// Subscription Changes
// =============================================================================

/// Upstream changes produced by a registry mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Tokens to subscribe upstream.
    pub subscribe: Vec<InstrumentToken>,
    /// Tokens to unsubscribe upstream.
    pub unsubscribe: Vec<InstrumentToken>,
    /// Mode to apply to a set of tokens.
    pub mode: Option<ModeGroup>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty() && self.mode.is_none()
    }
}

/// Tokens that share one streaming mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeGroup {
    /// Mode shared by all tokens in the group.
    pub mode: StreamMode,
    /// Tokens in ascending order.
    pub tokens: Vec<InstrumentToken>,
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Mapping of instrument token to desired streaming mode.
///
/// # Example
///
/// ```rust
/// use kite_ticker::domain::instrument::{InstrumentToken, StreamMode};
/// use kite_ticker::domain::subscription::SubscriptionRegistry;
///
/// let mut registry = SubscriptionRegistry::new();
/// let reliance = InstrumentToken::new(738_561);
///
/// let changes = registry.subscribe(&[reliance]);
/// assert_eq!(changes.subscribe, vec![reliance]);
/// assert_eq!(registry.mode_of(reliance), Some(StreamMode::Quote));
///
/// // Subscribing again is a no-op.
/// assert!(registry.subscribe(&[reliance]).is_empty());
///
/// registry.set_mode(StreamMode::Full, &[reliance]);
/// assert_eq!(registry.mode_of(reliance), Some(StreamMode::Full));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<InstrumentToken, StreamMode>,
    default_mode: StreamMode,
}

impl SubscriptionRegistry {
    /// Create an empty registry with `Quote` as the default mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add tokens at the default mode.
    ///
    /// Tokens already present keep their mode. Only newly added tokens are
    /// reported for upstream subscription.
    pub fn subscribe(&mut self, tokens: &[InstrumentToken]) -> SubscriptionChanges {
        let subscribe = self.insert_absent(tokens, self.default_mode);
        SubscriptionChanges {
            subscribe,
            ..SubscriptionChanges::default()
        }
    }

    /// Remove tokens, ignoring those not present.
    pub fn unsubscribe(&mut self, tokens: &[InstrumentToken]) -> SubscriptionChanges {
        let mut unsubscribe = Vec::new();
        for token in tokens {
            if self.entries.remove(token).is_some() && !unsubscribe.contains(token) {
                unsubscribe.push(*token);
            }
        }

        SubscriptionChanges {
            unsubscribe,
            ..SubscriptionChanges::default()
        }
    }

    /// Set the mode for tokens, adding any that are absent.
    ///
    /// Absent tokens are reported for upstream subscription as well, so the
    /// server never receives a mode change for a token it does not stream.
    pub fn set_mode(&mut self, mode: StreamMode, tokens: &[InstrumentToken]) -> SubscriptionChanges {
        let subscribe = self.insert_absent(tokens, mode);

        let mut group = Vec::with_capacity(tokens.len());
        for token in tokens {
            self.entries.insert(*token, mode);
            if !group.contains(token) {
                group.push(*token);
            }
        }

        SubscriptionChanges {
            subscribe,
            unsubscribe: Vec::new(),
            mode: (!group.is_empty()).then_some(ModeGroup {
                mode,
                tokens: group,
            }),
        }
    }

    /// Partition the registry by mode for replay after a reconnect.
    ///
    /// Groups are ordered from `Ltp` to `Full` and tokens within a group
    /// ascend, so replay order is deterministic.
    #[must_use]
    pub fn mode_groups(&self) -> Vec<ModeGroup> {
        let mut groups: BTreeMap<StreamMode, Vec<InstrumentToken>> = BTreeMap::new();
        for (token, mode) in &self.entries {
            groups.entry(*mode).or_default().push(*token);
        }

        groups
            .into_iter()
            .map(|(mode, mut tokens)| {
                tokens.sort_unstable();
                ModeGroup { mode, tokens }
            })
            .collect()
    }

    /// Mode of a token, if subscribed.
    #[must_use]
    pub fn mode_of(&self, token: InstrumentToken) -> Option<StreamMode> {
        self.entries.get(&token).copied()
    }

    /// Whether a token is subscribed.
    #[must_use]
    pub fn contains(&self, token: InstrumentToken) -> bool {
        self.entries.contains_key(&token)
    }

    /// Number of subscribed tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no tokens are subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the token to mode mapping.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<InstrumentToken, StreamMode> {
        self.entries.clone()
    }

    fn insert_absent(&mut self, tokens: &[InstrumentToken], mode: StreamMode) -> Vec<InstrumentToken> {
        let mut added = Vec::new();
        for token in tokens {
            if !self.entries.contains_key(token) {
                self.entries.insert(*token, mode);
                added.push(*token);
            }
        }
        added
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[u32]) -> Vec<InstrumentToken> {
        raw.iter().copied().map(InstrumentToken::new).collect()
    }

    #[test]
    fn subscribe_adds_at_quote() {
        let mut registry = SubscriptionRegistry::new();
        let changes = registry.subscribe(&tokens(&[1, 2]));

        assert_eq!(changes.subscribe, tokens(&[1, 2]));
        assert!(changes.unsubscribe.is_empty());
        assert!(changes.mode.is_none());
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.mode_of(InstrumentToken::new(1)),
            Some(StreamMode::Quote)
        );
    }

    #[test]
    fn subscribe_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&tokens(&[7]));
        let changes = registry.subscribe(&tokens(&[7]));

        assert!(changes.is_empty());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.mode_of(InstrumentToken::new(7)),
            Some(StreamMode::Quote)
        );
    }

    #[test]
    fn subscribe_keeps_existing_mode() {
        let mut registry = SubscriptionRegistry::new();
        registry.set_mode(StreamMode::Full, &tokens(&[7]));
        let changes = registry.subscribe(&tokens(&[7, 8]));

        assert_eq!(changes.subscribe, tokens(&[8]));
        assert_eq!(
            registry.mode_of(InstrumentToken::new(7)),
            Some(StreamMode::Full)
        );
    }

    #[test]
    fn duplicate_tokens_in_one_call_are_collapsed() {
        let mut registry = SubscriptionRegistry::new();
        let changes = registry.subscribe(&tokens(&[5, 5, 5]));
        assert_eq!(changes.subscribe, tokens(&[5]));

        let changes = registry.unsubscribe(&tokens(&[5, 5]));
        assert_eq!(changes.unsubscribe, tokens(&[5]));
    }

    #[test]
    fn unsubscribe_ignores_absent_tokens() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&tokens(&[1, 2]));

        let changes = registry.unsubscribe(&tokens(&[2, 3]));
        assert_eq!(changes.unsubscribe, tokens(&[2]));
        assert!(registry.contains(InstrumentToken::new(1)));
        assert!(!registry.contains(InstrumentToken::new(2)));

        let changes = registry.unsubscribe(&tokens(&[99]));
        assert!(changes.is_empty());
    }

    #[test]
    fn set_mode_upserts() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&tokens(&[1]));

        let changes = registry.set_mode(StreamMode::Ltp, &tokens(&[1, 2]));

        assert_eq!(changes.subscribe, tokens(&[2]));
        assert_eq!(
            changes.mode,
            Some(ModeGroup {
                mode: StreamMode::Ltp,
                tokens: tokens(&[1, 2]),
            })
        );
        assert_eq!(registry.mode_of(InstrumentToken::new(1)), Some(StreamMode::Ltp));
        assert_eq!(registry.mode_of(InstrumentToken::new(2)), Some(StreamMode::Ltp));
    }

    #[test]
    fn set_mode_with_no_tokens_is_empty() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.set_mode(StreamMode::Full, &[]).is_empty());
    }

    #[test]
    fn mode_groups_partition_registry() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&tokens(&[30, 10, 20]));
        registry.set_mode(StreamMode::Full, &tokens(&[20, 40]));
        registry.set_mode(StreamMode::Ltp, &tokens(&[50]));

        let groups = registry.mode_groups();

        assert_eq!(
            groups,
            vec![
                ModeGroup {
                    mode: StreamMode::Ltp,
                    tokens: tokens(&[50]),
                },
                ModeGroup {
                    mode: StreamMode::Quote,
                    tokens: tokens(&[10, 30]),
                },
                ModeGroup {
                    mode: StreamMode::Full,
                    tokens: tokens(&[20, 40]),
                },
            ]
        );
    }

    #[test]
    fn mode_groups_of_empty_registry() {
        assert!(SubscriptionRegistry::new().mode_groups().is_empty());
    }

    #[test]
    fn snapshot_reflects_entries() {
        let mut registry = SubscriptionRegistry::new();
        registry.set_mode(StreamMode::Full, &tokens(&[1]));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&InstrumentToken::new(1)], StreamMode::Full);
    }
}
