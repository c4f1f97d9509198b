//! View planning for one focused path.
//!
//! # Responsibility
//! - Decide which subheadings and children a focus renders as, from graph
//!   queries alone.
//! - Read child lists from the context index; planning never scans items.
//! - Apply the configured redirect policy to empty derived contexts.
//!
//! # Invariants
//! - Planning is read-only; it never writes to either index.
//! - The `from` breadcrumb is only used for ordering and is not validated.

use crate::config::{EngineConfig, RedirectPolicy};
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::queries::{sort_by_display, sort_paths_by_display, GraphQueries};
use crate::model::path::{child_path, is_root, paths_equal, signifier, Context};

/// One child row under a subheading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewChild {
    pub path: Context,
    pub is_leaf: bool,
    /// Number of contexts the child belongs to.
    pub context_count: usize,
}

/// One subheading and its sorted children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subheading {
    pub path: Context,
    pub children: Vec<ViewChild>,
    /// Grandchildren reachable through `children`.
    pub grandchild_count: usize,
    /// Whether children should render their own children inline.
    pub expanded: bool,
}

/// Renderable plan for a focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPlan {
    pub focus: Context,
    pub from: Option<Context>,
    pub subheadings: Vec<Subheading>,
    /// Number of contexts the focus signifier belongs to.
    pub other_contexts: usize,
}

/// Result of planning a focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOutcome {
    Render(ViewPlan),
    /// Navigate to this path instead, replacing the current history entry.
    Redirect(Context),
}

/// Plans the view of `focus`, optionally reached from breadcrumb `from`.
///
/// # Errors
/// - `GraphError::NotFound` when the focus signifier does not exist.
/// - `GraphError::EmptyDerivedContext` under `RedirectPolicy::Reject`.
pub fn plan_view(
    graph: &GraphQueries<'_>,
    focus: &[String],
    from: Option<&[String]>,
    config: &EngineConfig,
) -> GraphResult<ViewOutcome> {
    let value = signifier(focus).unwrap_or_default();
    let other_contexts = graph.parents_of(focus)?.len();
    let has_direct_children = graph.has_children(focus);

    if graph.is_empty_derived_context(focus)? {
        match config.redirect_policy {
            RedirectPolicy::Redirect => return Ok(ViewOutcome::Redirect(vec![value.to_string()])),
            RedirectPolicy::Reject => return Err(GraphError::EmptyDerivedContext(focus.to_vec())),
            RedirectPolicy::RenderEmpty => {}
        }
    }

    let subheading_paths = if has_direct_children {
        vec![focus.to_vec()]
    } else {
        let mut views = graph.context_views_of(focus)?;
        sort_paths_by_display(&mut views);
        if let Some(from) = from {
            let breadcrumb: Context = from.iter().chain(focus.iter()).cloned().collect();
            move_to_front(&mut views, &breadcrumb);
        }
        views
    };

    let mut subheadings = Vec::with_capacity(subheading_paths.len());
    for (position, path) in subheading_paths.into_iter().enumerate() {
        let children = build_children(graph, focus, &path)?;
        let grandchild_count = children
            .iter()
            .map(|child| graph.ranked_children_of(&child.path).len())
            .sum::<usize>();
        let expandable = (from.is_some() && position == 0) || has_direct_children;
        subheadings.push(Subheading {
            path,
            expanded: expandable && grandchild_count > 0 && grandchild_count < config.expand_max,
            children,
            grandchild_count,
        });
    }

    Ok(ViewOutcome::Render(ViewPlan {
        focus: focus.to_vec(),
        from: from.map(<[String]>::to_vec),
        subheadings,
        other_contexts,
    }))
}

fn build_children(
    graph: &GraphQueries<'_>,
    focus: &[String],
    subheading: &[String],
) -> GraphResult<Vec<ViewChild>> {
    let mut values: Vec<&str> = graph
        .ranked_children_of(subheading)
        .iter()
        .map(|child| child.key.as_str())
        .collect();
    sort_by_display(&mut values);

    let base: &[String] = if is_root(focus) { &[] } else { subheading };
    values
        .into_iter()
        .map(|value| -> GraphResult<ViewChild> {
            let path = child_path(base, value);
            Ok(ViewChild {
                is_leaf: graph.is_leaf(&path)?,
                context_count: graph.parents_of(&path)?.len(),
                path,
            })
        })
        .collect()
}

fn move_to_front(paths: &mut Vec<Context>, target: &[String]) {
    if let Some(position) = paths.iter().position(|path| paths_equal(path, target)) {
        let found = paths.remove(position);
        paths.insert(0, found);
    }
}
