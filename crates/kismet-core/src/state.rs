//! Screen state machine.
//!
//! `Idle -> Loading -> Success | Error`, plus a per-segment "resolving" flag
//! inside a `Success` result. [`reduce`] is pure and always returns a fresh
//! value; the previous state is never edited in place.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, KismetError};
use crate::model::{AssetRef, GenerationResult, Segment, SegmentId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&KismetError> for UiError {
    fn from(err: &KismetError) -> Self {
        Self {
            kind: err.kind(),
            message: err.user_message(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiState {
    pub phase: Phase,
    pub result: Option<GenerationResult>,
    pub error: Option<UiError>,
    /// True while any image segment of the result is being resolved.
    pub secondary_loading: bool,
}

impl UiState {
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.title.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A generation request was dispatched.
    Started,
    /// Input was refused before anything was dispatched.
    Rejected(UiError),
    Generated(GenerationResult),
    /// A saved record was loaded for display.
    Restored(GenerationResult),
    Failed(UiError),
    ResolutionStarted(SegmentId),
    Resolved { id: SegmentId, asset: AssetRef },
    /// Resolution ended without an asset (service error or no image produced).
    ResolutionFailed(SegmentId),
}

pub fn reduce(state: &UiState, event: Event) -> UiState {
    match event {
        Event::Started => UiState {
            phase: Phase::Loading,
            ..UiState::default()
        },
        Event::Rejected(error) | Event::Failed(error) => UiState {
            phase: Phase::Error,
            result: None,
            error: Some(error),
            secondary_loading: false,
        },
        Event::Generated(result) | Event::Restored(result) => UiState {
            phase: Phase::Success,
            secondary_loading: result.any_resolving(),
            result: Some(result),
            error: None,
        },
        Event::ResolutionStarted(id) => update_segment(state, &id, |segment| match segment {
            Segment::ImagePrompt { resolving, .. } if !*resolving => {
                *resolving = true;
                true
            }
            _ => false,
        }),
        Event::Resolved { id, asset } => update_segment(state, &id, |segment| match segment {
            Segment::ImagePrompt {
                resolving,
                resolved,
                ..
            } if *resolving => {
                *resolving = false;
                *resolved = Some(asset);
                true
            }
            _ => false,
        }),
        Event::ResolutionFailed(id) => update_segment(state, &id, |segment| match segment {
            Segment::ImagePrompt { resolving, .. } if *resolving => {
                *resolving = false;
                true
            }
            _ => false,
        }),
    }
}

/// Copy `state`, apply `f` to the segment `id`, and recompute the secondary
/// loading flag. Returns an unchanged copy unless the state is `Success`, the
/// segment exists and `f` reports a change.
fn update_segment<F>(state: &UiState, id: &SegmentId, f: F) -> UiState
where
    F: FnOnce(&mut Segment) -> bool,
{
    let mut next = state.clone();
    if next.phase != Phase::Success {
        return next;
    }
    let Some(result) = next.result.as_mut() else {
        return next;
    };
    let Some(segment) = result.segments.iter_mut().find(|s| s.id() == id) else {
        tracing::debug!(segment = %id, "segment event for unknown id ignored");
        return next;
    };
    if f(segment) {
        next.secondary_loading = result.any_resolving();
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn story() -> GenerationResult {
        GenerationResult::new(
            Some("Foo".into()),
            vec![
                Segment::text("t0".into(), "Hello", 0),
                Segment::image_prompt("i1".into(), "A cat", 1),
                Segment::image_prompt("i2".into(), "A dog", 2),
            ],
        )
    }

    fn success() -> UiState {
        reduce(&UiState::default(), Event::Generated(story()))
    }

    fn asset(name: &str) -> AssetRef {
        AssetRef::new(PathBuf::from(format!("/tmp/{name}.png")))
    }

    fn error(kind: ErrorKind, message: &str) -> UiError {
        UiError {
            kind,
            message: message.into(),
        }
    }

    #[test]
    fn test_initial_state_is_idle() {
        let state = UiState::default();
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.result.is_none());
        assert!(!state.secondary_loading);
    }

    #[test]
    fn test_started_clears_previous_error_and_result() {
        let failed = reduce(
            &UiState::default(),
            Event::Failed(error(ErrorKind::ExternalServiceFailure, "boom")),
        );
        let loading = reduce(&failed, Event::Started);
        assert_eq!(loading.phase, Phase::Loading);
        assert!(loading.error.is_none());

        let loading = reduce(&success(), Event::Started);
        assert!(loading.result.is_none());
    }

    #[test]
    fn test_failure_clears_displayed_result() {
        let state = reduce(
            &success(),
            Event::Failed(error(ErrorKind::EmptyResult, "nothing came back")),
        );
        assert_eq!(state.phase, Phase::Error);
        assert!(state.result.is_none());
        assert_eq!(state.error_message(), Some("nothing came back"));
    }

    #[test]
    fn test_rejected_goes_straight_to_error() {
        let state = reduce(
            &UiState::default(),
            Event::Rejected(error(ErrorKind::InvalidInput, "Prompt cannot be empty")),
        );
        assert_eq!(state.phase, Phase::Error);
        assert_eq!(state.error.unwrap().kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_resolution_lifecycle() {
        let state = reduce(&success(), Event::ResolutionStarted("i1".into()));
        assert!(state.secondary_loading);
        assert!(state.result.as_ref().unwrap().segments[1].is_resolving());

        let state = reduce(
            &state,
            Event::Resolved {
                id: "i1".into(),
                asset: asset("cat"),
            },
        );
        assert!(!state.secondary_loading);
        assert_eq!(state.phase, Phase::Success);
        match &state.result.as_ref().unwrap().segments[1] {
            Segment::ImagePrompt {
                resolved, resolving, ..
            } => {
                assert_eq!(resolved.as_ref(), Some(&asset("cat")));
                assert!(!resolving);
            }
            other => panic!("unexpected segment {other:?}"),
        }
    }

    #[test]
    fn test_resolution_touches_only_its_segment() {
        let state = reduce(&success(), Event::ResolutionStarted("i1".into()));
        let state = reduce(&state, Event::ResolutionStarted("i2".into()));
        let before = state.result.clone().unwrap();

        // i2 completes first.
        let state = reduce(
            &state,
            Event::Resolved {
                id: "i2".into(),
                asset: asset("dog"),
            },
        );
        let after = state.result.as_ref().unwrap();
        assert_eq!(after.segments[0], before.segments[0]);
        assert_eq!(after.segments[1], before.segments[1]);
        assert!(after.segments[1].is_resolving());
        assert!(state.secondary_loading);

        let state = reduce(&state, Event::ResolutionFailed("i1".into()));
        assert!(!state.secondary_loading);
        assert_eq!(state.phase, Phase::Success);
    }

    #[test]
    fn test_resolution_failure_never_leaves_success() {
        let state = reduce(&success(), Event::ResolutionStarted("i1".into()));
        let state = reduce(&state, Event::ResolutionFailed("i1".into()));
        assert_eq!(state.phase, Phase::Success);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_second_start_for_same_segment_is_noop() {
        let once = reduce(&success(), Event::ResolutionStarted("i1".into()));
        let twice = reduce(&once, Event::ResolutionStarted("i1".into()));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_completion_without_start_is_ignored() {
        let state = success();
        let next = reduce(
            &state,
            Event::Resolved {
                id: "i1".into(),
                asset: asset("cat"),
            },
        );
        assert_eq!(state, next);
    }

    #[test]
    fn test_segment_events_ignored_outside_success() {
        let loading = reduce(&success(), Event::Started);
        let next = reduce(&loading, Event::ResolutionStarted("i1".into()));
        assert_eq!(loading, next);

        let next = reduce(
            &loading,
            Event::Resolved {
                id: "i1".into(),
                asset: asset("cat"),
            },
        );
        assert_eq!(next.phase, Phase::Loading);
    }

    #[test]
    fn test_unknown_or_text_segment_is_ignored() {
        let state = success();
        assert_eq!(reduce(&state, Event::ResolutionStarted("nope".into())), state);
        assert_eq!(reduce(&state, Event::ResolutionStarted("t0".into())), state);
    }

    #[test]
    fn test_state_snapshot_roundtrip() {
        let state = reduce(&success(), Event::ResolutionStarted("i2".into()));
        let json = serde_json::to_string(&state).unwrap();
        let restored: UiState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
