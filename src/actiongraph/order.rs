use std::{cmp::Reverse, collections::BinaryHeap};

use petgraph::{algo::tarjan_scc, graph::NodeIndex, Direction};

use devicegraph::Sid;

use super::{dependencies::ActionPetgraph, PlanError};

/// Topological order of the actions. Among the actions that are ready, the
/// one with the lowest sid runs first, then the one emitted first.
pub(super) fn order(graph: &ActionPetgraph) -> Result<Vec<NodeIndex>, PlanError> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<(Sid, usize)>> = graph
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .map(|idx| Reverse((graph[idx].sid(), idx.index())))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse((_, index))) = ready.pop() {
        let idx = NodeIndex::new(index);
        order.push(idx);
        for next in graph.neighbors_directed(idx, Direction::Outgoing) {
            in_degree[next.index()] -= 1;
            if in_degree[next.index()] == 0 {
                ready.push(Reverse((graph[next].sid(), next.index())));
            }
        }
    }

    if order.len() < graph.node_count() {
        return Err(cycle_error(graph));
    }
    Ok(order)
}

fn cycle_error(graph: &ActionPetgraph) -> PlanError {
    let component = tarjan_scc(graph)
        .into_iter()
        .find(|component| component.len() > 1)
        .unwrap_or_default();

    let mut sids: Vec<Sid> = component.iter().map(|idx| graph[*idx].sid()).collect();
    sids.sort();
    sids.dedup();

    let descriptions: Vec<&str> = component
        .iter()
        .map(|idx| graph[*idx].description())
        .collect();

    PlanError::Unplannable {
        reason: format!(
            "Cyclic dependency between actions: {}",
            descriptions.join("; ")
        ),
        sids,
    }
}
