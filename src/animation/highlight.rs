use std::collections::{HashMap, HashSet};

use crate::model::{GraphEdge, NodeOrigin, QueryPath};

use super::{AnimationState, AnimationStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HighlightClass {
    High,
    Medium,
    Low,
    Local,
    Global,
    Both,
}

impl HighlightClass {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn style(self) -> HighlightStyle {
        let (size_multiplier, opacity) = match self {
            Self::High => (1.5, 1.0),
            Self::Medium => (1.25, 0.85),
            Self::Low => (1.0, 0.6),
            Self::Local | Self::Global => (1.3, 0.95),
            Self::Both => (1.5, 1.0),
        };
        HighlightStyle {
            class: self,
            size_multiplier,
            opacity,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Local => "local",
            Self::Global => "global",
            Self::Both => "both",
        }
    }
}

impl From<NodeOrigin> for HighlightClass {
    fn from(origin: NodeOrigin) -> Self {
        match origin {
            NodeOrigin::Local => Self::Local,
            NodeOrigin::Global => Self::Global,
            NodeOrigin::Both => Self::Both,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HighlightStyle {
    pub class: HighlightClass,
    pub size_multiplier: f32,
    pub opacity: f32,
}

/// Origin tags win over the score tier when both are present.
pub fn classify(path: &QueryPath, node_id: &str) -> HighlightClass {
    path.origin(node_id)
        .map(HighlightClass::from)
        .unwrap_or_else(|| HighlightClass::from_score(path.score(node_id)))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathHighlight {
    pub nodes: HashMap<String, HighlightStyle>,
    pub edges: HashSet<String>,
    pub current: Option<String>,
}

impl PathHighlight {
    pub fn node(&self, id: &str) -> Option<&HighlightStyle> {
        self.nodes.get(id)
    }

    pub fn contains_edge(&self, id: &str) -> bool {
        self.edges.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Highlight for `path` revealed up to `step`; `None` shows the whole path.
/// A path edge is included once both of its endpoints have been visited. A
/// hyperedge waits for every member that lies on the path.
pub fn path_highlight<'a>(
    path: &QueryPath,
    edges: impl IntoIterator<Item = &'a GraphEdge>,
    step: Option<usize>,
) -> PathHighlight {
    let visited_until = step.unwrap_or(usize::MAX);
    let index = path
        .nodes
        .iter()
        .enumerate()
        .map(|(position, id)| (id.as_str(), position))
        .collect::<HashMap<_, _>>();

    let nodes = path
        .nodes
        .iter()
        .enumerate()
        .take_while(|(position, _)| *position <= visited_until)
        .map(|(_, id)| (id.clone(), classify(path, id).style()))
        .collect();

    let wanted = path.edges.iter().map(String::as_str).collect::<HashSet<_>>();
    let visited = |id: &str| index.get(id).is_some_and(|position| *position <= visited_until);
    let edges = edges
        .into_iter()
        .filter(|edge| wanted.contains(edge.id.as_str()))
        .filter(|edge| {
            if step.is_none() {
                true
            } else if edge.is_hyperedge() {
                let mut on_path = edge.members().filter(|id| index.contains_key(id)).peekable();
                on_path.peek().is_some() && on_path.all(|id| visited(id))
            } else {
                visited(&edge.source) && visited(&edge.target)
            }
        })
        .map(|edge| edge.id.clone())
        .collect();

    PathHighlight {
        nodes,
        edges,
        current: step.and_then(|step| path.nodes.get(step).cloned()),
    }
}

/// Step to reveal the path up to, `None` for the whole path, or nothing at
/// all while playback has started but not revealed its first node yet.
pub fn highlight_step(state: &AnimationState) -> Option<Option<usize>> {
    match state.visible_step() {
        Some(step) => Some(Some(step)),
        None if state.status == AnimationStatus::Idle => Some(None),
        None => None,
    }
}

pub fn playback_highlight<'a>(
    path: &QueryPath,
    edges: impl IntoIterator<Item = &'a GraphEdge>,
    state: &AnimationState,
) -> PathHighlight {
    match highlight_step(state) {
        Some(step) if !path.is_empty() => path_highlight(path, edges, step),
        _ => PathHighlight::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationCommand, apply};

    fn path() -> QueryPath {
        QueryPath {
            nodes: vec!["a".into(), "b".into(), "c".into()],
            edges: vec!["ab".into(), "bc".into(), "ac".into()],
            scores: HashMap::from([
                ("a".into(), 0.9),
                ("b".into(), 0.5),
                ("c".into(), 0.1),
            ]),
            node_types: None,
        }
    }

    fn edges() -> Vec<GraphEdge> {
        vec![
            GraphEdge::binary("ab", "a", "b", 1.0),
            GraphEdge::binary("bc", "b", "c", 1.0),
            GraphEdge::binary("ac", "a", "c", 1.0),
            GraphEdge::binary("unrelated", "a", "b", 1.0),
        ]
    }

    #[test]
    fn score_tiers_have_distinct_styles() {
        assert_eq!(HighlightClass::from_score(0.7), HighlightClass::High);
        assert_eq!(HighlightClass::from_score(0.69), HighlightClass::Medium);
        assert_eq!(HighlightClass::from_score(0.4), HighlightClass::Medium);
        assert_eq!(HighlightClass::from_score(0.39), HighlightClass::Low);

        let high = HighlightClass::High.style();
        let low = HighlightClass::Low.style();
        assert!(high.size_multiplier > low.size_multiplier);
        assert!(high.opacity > low.opacity);
    }

    #[test]
    fn origin_tag_overrides_score_tier() {
        let mut path = path();
        path.node_types = Some(HashMap::from([("c".into(), NodeOrigin::Both)]));
        assert_eq!(classify(&path, "c"), HighlightClass::Both);
        assert_eq!(classify(&path, "a"), HighlightClass::High);
    }

    #[test]
    fn edges_appear_once_both_endpoints_are_visited() {
        let path = path();
        let edges = edges();

        let first = path_highlight(&path, &edges, Some(0));
        assert_eq!(first.nodes.len(), 1);
        assert!(first.edges.is_empty());
        assert_eq!(first.current.as_deref(), Some("a"));

        let second = path_highlight(&path, &edges, Some(1));
        assert_eq!(second.edges, HashSet::from(["ab".to_owned()]));

        let third = path_highlight(&path, &edges, Some(2));
        assert_eq!(third.edges.len(), 3);
        assert!(second.edges.is_subset(&third.edges));
    }

    #[test]
    fn no_step_shows_full_path() {
        let highlight = path_highlight(&path(), &edges(), None);
        assert_eq!(highlight.nodes.len(), 3);
        assert_eq!(highlight.edges.len(), 3);
        assert!(!highlight.contains_edge("unrelated"));
        assert_eq!(highlight.current, None);
        assert_eq!(
            highlight.node("b").map(|style| style.class),
            Some(HighlightClass::Medium)
        );
    }

    #[test]
    fn hyperedge_waits_for_every_member_on_the_path() {
        let path = QueryPath {
            nodes: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            edges: vec!["team".into()],
            ..QueryPath::default()
        };
        let edges = vec![GraphEdge::hyper("team", &["a", "b", "c", "d"], 1.0)];

        for step in 0..3 {
            assert!(!path_highlight(&path, &edges, Some(step)).contains_edge("team"));
        }
        assert!(path_highlight(&path, &edges, Some(3)).contains_edge("team"));
        assert!(path_highlight(&path, &edges, None).contains_edge("team"));
    }

    #[test]
    fn manual_steps_while_idle_narrow_the_highlight() {
        let path = path();
        let edges = edges();
        let idle = AnimationState::default();
        assert_eq!(highlight_step(&idle), Some(None));
        assert_eq!(playback_highlight(&path, &edges, &idle).nodes.len(), 3);

        let (stepped, _) = apply(&idle, &path, AnimationCommand::StepForward).unwrap();
        assert_eq!(stepped.status, AnimationStatus::Idle);
        assert_eq!(highlight_step(&stepped), Some(Some(0)));
        let highlight = playback_highlight(&path, &edges, &stepped);
        assert_eq!(highlight.nodes.len(), 1);
        assert_eq!(highlight.current.as_deref(), Some("a"));

        let (scrubbed, _) = apply(&stepped, &path, AnimationCommand::Scrub(1)).unwrap();
        assert_eq!(playback_highlight(&path, &edges, &scrubbed).nodes.len(), 2);
    }

    #[test]
    fn playing_before_first_tick_shows_nothing() {
        let path = path();
        let (playing, _) =
            apply(&AnimationState::default(), &path, AnimationCommand::Play).unwrap();
        assert_eq!(highlight_step(&playing), None);
        assert!(playback_highlight(&path, &edges(), &playing).is_empty());
        assert!(playback_highlight(&QueryPath::default(), &edges(), &AnimationState::default()).is_empty());
    }
}
