//! Pure planning for node consolidation.
//!
//! Merges and retags are executed in the database inside one transaction,
//! but the decisions (which mentions move, which links survive) are made
//! here from rows the engine has already locked and loaded. Keeping them
//! free of I/O lets them be tested exhaustively.

use std::collections::HashSet;

use crate::models::{Link, Mention};

/// Exact position of a mention inside a note, the unit of duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanKey {
    pub note_id: i64,
    pub start: i32,
    pub end: i32,
}

impl SpanKey {
    pub fn of(mention: &Mention) -> Self {
        Self {
            note_id: mention.note_id,
            start: mention.start_pos,
            end: mention.end_pos,
        }
    }
}

/// Which mentions move to the surviving node and which are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReattributionPlan {
    /// Mention ids to repoint at the surviving node.
    pub reassign: Vec<i64>,
    /// Mention ids whose span the surviving node already covers.
    pub discard: Vec<i64>,
}

/// Decide how mentions of absorbed nodes move onto `survivor_spans`' owner.
///
/// A mention moves unless the survivor already covers its exact span. Moved
/// spans count as covered, so two absorbed mentions at one span never both
/// move. Mentions are processed in id order.
pub fn plan_reattribution(
    survivor_spans: impl IntoIterator<Item = SpanKey>,
    absorbed: &[Mention],
) -> ReattributionPlan {
    let mut covered: HashSet<SpanKey> = survivor_spans.into_iter().collect();
    let mut ordered: Vec<&Mention> = absorbed.iter().collect();
    ordered.sort_by_key(|m| m.id);

    let mut plan = ReattributionPlan::default();
    for mention in ordered {
        if covered.insert(SpanKey::of(mention)) {
            plan.reassign.push(mention.id);
        } else {
            plan.discard.push(mention.id);
        }
    }
    plan
}

/// New endpoints for a link that survives a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRepoint {
    pub link_id: i64,
    pub source_node_id: i64,
    pub target_node_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkRewirePlan {
    pub repoint: Vec<LinkRepoint>,
    /// Link ids to delete: duplicates of a survivor edge, or self-loops.
    pub drop: Vec<i64>,
}

/// Plan how the links of `absorbed` are folded into `survivor`.
///
/// `links` must contain every link with either node at either end. Links
/// that do not touch `absorbed` are kept as they are. Each link of
/// `absorbed` has that endpoint replaced by `survivor`; it is dropped when
/// the result is a self-loop or when the survivor already has an edge with
/// the same source and target.
pub fn plan_link_rewire(absorbed: i64, survivor: i64, links: &[Link]) -> LinkRewirePlan {
    let touches = |l: &Link| l.source_node_id == absorbed || l.target_node_id == absorbed;

    let mut edges: HashSet<(i64, i64)> = links
        .iter()
        .filter(|l| !touches(l))
        .map(|l| (l.source_node_id, l.target_node_id))
        .collect();

    let mut moving: Vec<&Link> = links.iter().filter(|l| touches(l)).collect();
    moving.sort_by_key(|l| l.id);

    let swap = |id: i64| if id == absorbed { survivor } else { id };

    let mut plan = LinkRewirePlan::default();
    for link in moving {
        let source = swap(link.source_node_id);
        let target = swap(link.target_node_id);
        if source == target || !edges.insert((source, target)) {
            plan.drop.push(link.id);
        } else {
            plan.repoint.push(LinkRepoint {
                link_id: link.id,
                source_node_id: source,
                target_node_id: target,
            });
        }
    }
    plan
}

/// Ordered pairs of distinct nodes that co-occur in one note.
///
/// Input order is kept and repeated ids collapse to their first occurrence.
pub fn cooccurrence_pairs(node_ids: &[i64]) -> Vec<(i64, i64)> {
    let mut seen = HashSet::new();
    let distinct: Vec<i64> = node_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect();

    let mut pairs = Vec::with_capacity(distinct.len() * distinct.len().saturating_sub(1));
    for (i, a) in distinct.iter().enumerate() {
        for b in &distinct[i + 1..] {
            pairs.push((*a, *b));
            pairs.push((*b, *a));
        }
    }
    pairs
}
