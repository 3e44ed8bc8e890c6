//! Event types and sinks for observing tree growth.
//!
//! [`crate::growth::builder::MacrocellTree::build_with_events`] reports every cycle and
//! subcycle through an [`EventSink`]. Use `()` to ignore events, [`VecSink`] to collect them or
//! [`FnSink`] to forward them to a closure.

/// Describes events emitted while a tree grows.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum GrowthEvent {
    /// Emitted before the cell size is reduced for a cycle.
    CycleStarted {
        /// Zero-based cycle index.
        cycle: usize,
        /// Probability that a cell clones itself.
        grow_probability: f64,
        /// Probability that a cell dies.
        die_probability: f64,
        /// Cell radius used for this cycle.
        cell_radius: f64,
        /// Candidate sites at this radius.
        sites: usize,
    },

    /// Emitted after every grow/die pass of a cycle.
    SubcycleFinished {
        cycle: usize,
        /// Vessels in the tree after the pass.
        vessels: usize,
        attempted: usize,
        created: usize,
        died: usize,
    },

    /// Emitted once a cycle has been filled and normalized.
    CycleFinished {
        cycle: usize,
        /// Change in the number of macrocells over the cycle.
        change: i64,
        macrocells: usize,
        /// Whether the tree passed validation after the cycle.
        valid: bool,
    },

    /// Non-fatal warning.
    Warning { context: String, message: String },
}

/// A generic event sink that accepts [`GrowthEvent`]s.
pub trait EventSink {
    fn send(&mut self, event: GrowthEvent);
}

/// A no-op event sink.
impl EventSink for () {
    #[inline]
    fn send(&mut self, _event: GrowthEvent) {}
}

/// An event sink that forwards to a user-provided closure.
pub struct FnSink<F>
where
    F: FnMut(GrowthEvent),
{
    f: F,
}

impl<F> FnSink<F>
where
    F: FnMut(GrowthEvent),
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EventSink for FnSink<F>
where
    F: FnMut(GrowthEvent),
{
    #[inline]
    fn send(&mut self, event: GrowthEvent) {
        (self.f)(event);
    }
}

/// An event sink that collects all events in a `Vec`.
#[derive(Debug, Default)]
pub struct VecSink {
    events: Vec<GrowthEvent>,
}

impl VecSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn into_inner(self) -> Vec<GrowthEvent> {
        self.events
    }

    pub fn as_slice(&self) -> &[GrowthEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for VecSink {
    #[inline]
    fn send(&mut self, event: GrowthEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning() -> GrowthEvent {
        GrowthEvent::Warning {
            context: "cycle 1".into(),
            message: "invalid tree".into(),
        }
    }

    #[test]
    fn vec_sink_collects_events() {
        let mut sink = VecSink::new();
        assert!(sink.is_empty());
        sink.send(warning());
        sink.send(warning());
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.into_inner()[0], warning());
    }

    #[test]
    fn fn_sink_invokes_callback() {
        let mut count = 0;
        let mut sink = FnSink::new(|_event| {
            count += 1;
        });
        sink.send(warning());
        assert_eq!(count, 1);
    }
}
