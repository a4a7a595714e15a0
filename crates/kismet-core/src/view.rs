//! Projection of screen state into what a renderer draws.

use std::sync::Arc;

use serde::Serialize;

use crate::model::{AssetRef, FilterParams, Segment, SegmentId};
use crate::state::{Phase, UiState};

/// Placeholder shown wherever content has not arrived yet.
pub const LOADING: &str = "Loading...";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssetView {
    /// No resolution requested yet.
    Pending,
    /// Resolution in flight; draw a placeholder.
    Resolving { placeholder: String },
    Ready { asset: AssetRef },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemView {
    Text {
        id: SegmentId,
        text: String,
    },
    Field {
        id: SegmentId,
        label: String,
        value: String,
    },
    Image {
        id: SegmentId,
        prompt: String,
        asset: AssetView,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    pub title: String,
    pub items: Vec<ItemView>,
    pub error: Option<String>,
    pub show_spinner: bool,
    pub show_error: bool,
    pub show_secondary_spinner: bool,
    pub can_refresh: bool,
    pub can_save: bool,
    pub filter_summary: Option<String>,
}

pub fn project<F: FilterParams>(state: &UiState, filters: &F) -> ViewState {
    let mut segments: Vec<&Segment> = state
        .result
        .iter()
        .flat_map(|r| r.segments.iter())
        .collect();
    segments.sort_by_key(|s| s.order());

    let items = segments
        .into_iter()
        .map(|segment| match segment {
            Segment::Text { id, text, .. } => ItemView::Text {
                id: id.clone(),
                text: text.clone(),
            },
            Segment::Field {
                id, label, value, ..
            } => ItemView::Field {
                id: id.clone(),
                label: label.clone(),
                value: value.clone(),
            },
            Segment::ImagePrompt {
                id,
                prompt,
                resolved,
                resolving,
                ..
            } => ItemView::Image {
                id: id.clone(),
                prompt: prompt.clone(),
                asset: match (resolved, resolving) {
                    (_, true) => AssetView::Resolving {
                        placeholder: LOADING.to_string(),
                    },
                    (Some(asset), false) => AssetView::Ready {
                        asset: asset.clone(),
                    },
                    (None, false) => AssetView::Pending,
                },
            },
        })
        .collect();

    let title = match (state.phase, state.title()) {
        (Phase::Success, Some(title)) => title.to_string(),
        (Phase::Success, None) => String::new(),
        _ => LOADING.to_string(),
    };

    ViewState {
        title,
        items,
        error: state.error_message().map(str::to_string),
        show_spinner: state.phase == Phase::Loading,
        show_error: state.phase == Phase::Error,
        show_secondary_spinner: state.secondary_loading,
        can_refresh: state.phase != Phase::Loading,
        can_save: state.phase == Phase::Success,
        filter_summary: filters.summary(),
    }
}

/// Memoizing wrapper around [`project`].
///
/// Returns the same `Arc` for inputs equal to the previous call so a renderer
/// can skip work with `Arc::ptr_eq`.
#[derive(Debug)]
pub struct Projector<F> {
    last: Option<(UiState, F, Arc<ViewState>)>,
}

impl<F> Default for Projector<F> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<F: FilterParams> Projector<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&mut self, state: &UiState, filters: &F) -> Arc<ViewState> {
        if let Some((last_state, last_filters, view)) = &self.last {
            if last_state == state && last_filters == filters {
                return Arc::clone(view);
            }
        }
        let view = Arc::new(project(state, filters));
        self.last = Some((state.clone(), filters.clone(), Arc::clone(&view)));
        view
    }
}
