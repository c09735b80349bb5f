//! Request coalescing.
//!
//! Before a consumer acts on a drained batch, queued request events of the
//! same kind are merged into one. Which kinds merge, and how, is decided by
//! a [`CoalescePolicy`] mapping each mergeable [`EventKind`] to a
//! [`Coalesce`] strategy. Kinds without a strategy are never merged.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use homelink_domain::event::{Event, EventKind};

/// Merges one event into an accumulated event of the same kind.
pub trait Coalesce: Send + Sync {
    fn merge(&self, acc: &mut Event, next: Event);
}

/// Unions the zone sets of `ZonesReportRequested` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZoneReportUnion;

impl Coalesce for ZoneReportUnion {
    fn merge(&self, acc: &mut Event, next: Event) {
        if let (
            Event::ZonesReportRequested { zone_ids },
            Event::ZonesReportRequested { zone_ids: more },
        ) = (acc, next)
        {
            zone_ids.extend(more);
        }
    }
}

#[derive(Clone)]
pub struct CoalescePolicy {
    strategies: HashMap<EventKind, Arc<dyn Coalesce>>,
}

impl Default for CoalescePolicy {
    fn default() -> Self {
        Self::none().with(EventKind::ZonesReportRequested, ZoneReportUnion)
    }
}

impl CoalescePolicy {
    /// A policy that merges nothing.
    #[must_use]
    pub fn none() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, kind: EventKind, strategy: impl Coalesce + 'static) -> Self {
        self.strategies.insert(kind, Arc::new(strategy));
        self
    }

    #[must_use]
    pub fn is_mergeable(&self, kind: EventKind) -> bool {
        self.strategies.contains_key(&kind)
    }

    /// Merge `next` into `acc` when both share a mergeable kind; otherwise
    /// hand `next` back.
    pub fn absorb(&self, acc: &mut Event, next: Event) -> Option<Event> {
        if acc.kind() != next.kind() {
            return Some(next);
        }
        match self.strategies.get(&next.kind()) {
            Some(strategy) => {
                strategy.merge(acc, next);
                None
            }
            None => Some(next),
        }
    }

    /// Collapse a drained batch: every mergeable kind is folded into its
    /// first occurrence, everything else keeps its position.
    #[must_use]
    pub fn coalesce(&self, batch: Vec<Event>) -> Vec<Event> {
        let mut merged: Vec<Event> = Vec::with_capacity(batch.len());
        let mut first_of: HashMap<EventKind, usize> = HashMap::new();
        for event in batch {
            let kind = event.kind();
            if !self.is_mergeable(kind) {
                merged.push(event);
                continue;
            }
            match first_of.get(&kind) {
                Some(&idx) => {
                    if let Some(rest) = self.absorb(&mut merged[idx], event) {
                        merged.push(rest);
                    }
                }
                None => {
                    first_of.insert(kind, merged.len());
                    merged.push(event);
                }
            }
        }
        merged
    }
}

impl fmt::Debug for CoalescePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.strategies.keys()).finish()
    }
}
