use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::ir::Edge;

/// Longest-path ranks over a topological order. Cycles are broken by taking the
/// earliest-declared remaining node as a source, so its incoming edges act as
/// back-edges.
pub(super) fn compute_ranks(node_ids: &[String], edges: &[Edge]) -> HashMap<String, usize> {
    let order_key: HashMap<&str, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx))
        .collect();
    let key = |id: &str| order_key.get(id).copied().unwrap_or(usize::MAX);

    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indeg: HashMap<&str, usize> = node_ids.iter().map(|id| (id.as_str(), 0)).collect();
    for edge in edges {
        if edge.from == edge.to
            || !order_key.contains_key(edge.from.as_str())
            || !order_key.contains_key(edge.to.as_str())
        {
            continue;
        }
        adj.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
        if let Some(deg) = indeg.get_mut(edge.to.as_str()) {
            *deg += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<(usize, &str)>> = indeg
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| Reverse((key(*id), *id)))
        .collect();

    let mut order: Vec<&str> = Vec::with_capacity(node_ids.len());
    let mut processed: HashSet<&str> = HashSet::new();
    loop {
        while let Some(Reverse((_, id))) = ready.pop() {
            if !processed.insert(id) {
                continue;
            }
            order.push(id);
            for next in adj.get(id).into_iter().flatten() {
                if processed.contains(next) {
                    continue;
                }
                if let Some(deg) = indeg.get_mut(next) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(Reverse((key(*next), *next)));
                    }
                }
            }
        }

        if processed.len() >= node_ids.len() {
            break;
        }
        let next_source = node_ids
            .iter()
            .map(String::as_str)
            .find(|id| !processed.contains(id));
        match next_source {
            Some(id) => ready.push(Reverse((key(id), id))),
            None => break,
        }
    }

    let position: HashMap<&str, usize> = order.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
    let mut ranks: HashMap<String, usize> = HashMap::new();
    for node in &order {
        let rank = *ranks.entry((*node).to_string()).or_insert(0);
        let from_idx = position[node];
        for next in adj.get(node).into_iter().flatten() {
            if position.get(next).copied().unwrap_or(from_idx) <= from_idx {
                continue;
            }
            let entry = ranks.entry((*next).to_string()).or_insert(0);
            *entry = (*entry).max(rank + 1);
        }
    }
    ranks
}

/// Reduces crossings with alternating down/up median sweeps.
pub(super) fn order_rank_nodes(rank_nodes: &mut [Vec<String>], edges: &[Edge], passes: usize) {
    if rank_nodes.len() <= 1 {
        return;
    }
    let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        outgoing.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
        incoming.entry(edge.to.as_str()).or_default().push(edge.from.as_str());
    }

    let mut positions = positions_of(rank_nodes);
    for _ in 0..passes.max(1) {
        for rank in 1..rank_nodes.len() {
            sort_bucket(&mut rank_nodes[rank], &incoming, &positions);
            positions = positions_of(rank_nodes);
        }
        for rank in (0..rank_nodes.len() - 1).rev() {
            sort_bucket(&mut rank_nodes[rank], &outgoing, &positions);
            positions = positions_of(rank_nodes);
        }
    }
}

fn positions_of(rank_nodes: &[Vec<String>]) -> HashMap<String, usize> {
    rank_nodes
        .iter()
        .flat_map(|bucket| bucket.iter().enumerate().map(|(idx, id)| (id.clone(), idx)))
        .collect()
}

fn sort_bucket(bucket: &mut [String], neighbors: &HashMap<&str, Vec<&str>>, positions: &HashMap<String, usize>) {
    if bucket.len() <= 1 {
        return;
    }
    let current: HashMap<String, usize> = bucket.iter().enumerate().map(|(idx, id)| (id.clone(), idx)).collect();
    // Stable sort keeps declaration order on ties.
    bucket.sort_by(|a, b| {
        let a_score = median_position(a, neighbors, positions, current[a]);
        let b_score = median_position(b, neighbors, positions, current[b]);
        a_score.total_cmp(&b_score)
    });
}

fn median_position(
    node_id: &str,
    neighbors: &HashMap<&str, Vec<&str>>,
    positions: &HashMap<String, usize>,
    fallback: usize,
) -> f32 {
    let mut values: Vec<f32> = neighbors
        .get(node_id)
        .into_iter()
        .flatten()
        .filter_map(|n| positions.get(*n).map(|p| *p as f32))
        .collect();
    if values.is_empty() {
        return fallback as f32;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) * 0.5
    }
}
