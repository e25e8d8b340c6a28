//! Horizon discretization with event handling.
//!
//! The grid is uniform with spacing at most `dt` between consecutive
//! breakpoints (horizon ends and event times). Each interior event
//! contributes a `PreEvent` node immediately followed by an `Interior` node
//! at the same numeric time; the pair marks the discontinuity where the
//! dynamics are transcribed as a state-to-state jump with no decision input.
//! Because each inter-event segment is subdivided uniformly, no post-event
//! node can land closer than one spacing to the next tick.

/// Shift applied to pre-event node times for trajectory lookups, so the
/// interpolation resolves to the pre-event branch of a duplicated pair.
const LOOKUP_EPS: f64 = 1e-9;

// ---------------------------------------------------------------------------
// AnnotatedTime
// ---------------------------------------------------------------------------

/// Role of a grid node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Ordinary shooting node.
    Interior,
    /// Node at an event time, transcribed as a jump map.
    PreEvent,
}

/// One node of the time grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotatedTime {
    /// Node time.
    pub time: f64,
    /// Node role.
    pub event: EventKind,
}

impl AnnotatedTime {
    /// Interior node at `time`.
    #[must_use]
    pub const fn interior(time: f64) -> Self {
        Self {
            time,
            event: EventKind::Interior,
        }
    }

    /// Pre-event node at `time`.
    #[must_use]
    pub const fn pre_event(time: f64) -> Self {
        Self {
            time,
            event: EventKind::PreEvent,
        }
    }
}

/// Time to use when interpolating stored trajectories at this node.
#[must_use]
pub fn interpolation_time(node: &AnnotatedTime) -> f64 {
    match node.event {
        EventKind::Interior => node.time,
        EventKind::PreEvent => node.time - LOOKUP_EPS,
    }
}

// ---------------------------------------------------------------------------
// Grid construction
// ---------------------------------------------------------------------------

/// Build the annotated grid over `[t0, tf]`.
///
/// Event times at or outside the horizon (within a small tolerance of the
/// ends) are ignored, as are events closer than the tolerance to a previous
/// event. First and last nodes are always `Interior`.
///
/// # Panics
/// Panics unless `tf > t0` and `dt > 0`.
#[must_use]
pub fn time_discretization(t0: f64, tf: f64, dt: f64, event_times: &[f64]) -> Vec<AnnotatedTime> {
    assert!(tf > t0, "horizon must have positive length");
    assert!(dt > 0.0, "grid spacing must be positive");

    // Events merge with the horizon ends (or each other) within this
    // tolerance.
    let eps = 1e-3 * dt;

    let mut grid = vec![AnnotatedTime::interior(t0)];
    let mut segment_start = t0;
    for &te in event_times {
        if te < segment_start + eps || te > tf - eps {
            continue;
        }
        push_uniform(&mut grid, segment_start, te, dt);
        grid.last_mut().expect("grid is never empty").event = EventKind::PreEvent;
        grid.push(AnnotatedTime::interior(te));
        segment_start = te;
    }
    push_uniform(&mut grid, segment_start, tf, dt);
    grid
}

/// Append interior nodes subdividing `(start, end]` with uniform spacing at
/// most `dt`.
fn push_uniform(grid: &mut Vec<AnnotatedTime>, start: f64, end: f64, dt: f64) {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let steps = (((end - start) / dt - 1e-9).ceil() as usize).max(1);
    #[allow(clippy::cast_precision_loss)]
    let h = (end - start) / steps as f64;
    for k in 1..steps {
        #[allow(clippy::cast_precision_loss)]
        grid.push(AnnotatedTime::interior(start + k as f64 * h));
    }
    grid.push(AnnotatedTime::interior(end));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
