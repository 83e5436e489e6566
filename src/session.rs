//! Session records grouping temporally related calls.

use serde::{Deserialize, Serialize};

use crate::{
    call::Call,
    types::{CallId, Phase, Seconds, SessionId},
};

/// Interval snapshot of a member call.
///
/// Member calls are persisted and removed from the live set long before
/// their session expires, so the session keeps each member's interval for
/// overlap checks and gap scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemberSpan {
    /// Member call id.
    pub call: CallId,
    /// Member start time.
    pub start: Seconds,
    /// Member end time, tracked while the member is open.
    pub end: Seconds,
}

impl MemberSpan {
    /// Strict interval overlap; touching endpoints are compatible.
    pub fn overlaps(&self, start: Seconds, end: Seconds) -> bool {
        self.start < end && start < self.end
    }
}

/// A cluster of temporally related, mutually non-overlapping calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Stable identifier from the shared entity counter.
    pub id: SessionId,
    /// Member intervals in admission order.
    pub members: Vec<MemberSpan>,
    /// First member's start time; never rewound by later admissions.
    pub start_time: Seconds,
    /// Latest member end; non-decreasing while open.
    pub end_time: Seconds,
    /// Lifecycle phase.
    pub phase: Phase,
}

impl Session {
    /// Builds a fresh session seeded with its first member.
    pub fn open_from(id: SessionId, call: &Call) -> Self {
        Self {
            id,
            members: vec![MemberSpan {
                call: call.id,
                start: call.start_time,
                end: call.end_time,
            }],
            start_time: call.start_time,
            end_time: call.end_time,
            phase: Phase::Open,
        }
    }

    /// Scores how well `call` fits this session.
    ///
    /// Any overlap with a member disqualifies the session outright: two
    /// calls occupying the same wall-clock time are independent
    /// transmissions, not one interaction. Otherwise the smallest gap from a
    /// member's end to the candidate's start is weighted against the
    /// separation window, so a call resuming just inside the window scores
    /// close to 1. Non-positive scores are ineligible; a candidate that
    /// precedes every member scores above 1 and stays eligible.
    pub fn score(&self, call: &Call, separation_secs: Seconds) -> Option<f64> {
        let mut min_gap: Option<Seconds> = None;
        for span in &self.members {
            if span.overlaps(call.start_time, call.end_time) {
                return None;
            }
            let gap = call.start_time - span.end;
            min_gap = Some(min_gap.map_or(gap, |g| g.min(gap)));
        }
        let gap = min_gap?;
        let score = (separation_secs - gap) / separation_secs;
        (score > 0.0).then_some(score)
    }

    /// Admits `call` as a new member and extends the session window.
    pub fn admit(&mut self, call: &Call) {
        self.members.push(MemberSpan {
            call: call.id,
            start: call.start_time,
            end: call.end_time,
        });
        self.end_time = self.end_time.max(call.end_time);
    }

    /// Tracks an open member's extension to `end`.
    pub fn extend_member(&mut self, call: CallId, end: Seconds) {
        if let Some(span) = self.members.iter_mut().find(|span| span.call == call) {
            span.end = span.end.max(end);
        }
        self.end_time = self.end_time.max(end);
    }

    /// Number of member calls.
    pub fn call_count(&self) -> usize {
        self.members.len()
    }
}
