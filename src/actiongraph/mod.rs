//! Planning of the actions that turn one devicegraph into another.
//!
//! The planner compares the probed devicegraph (lhs) with the staging
//! devicegraph (rhs) by sid, emits one [`Action`] per difference, derives the
//! dependencies between the actions and orders them topologically. The
//! result is deterministic: identical inputs give identical plans.

use std::{
    fmt::{self, Display},
    fs,
    path::Path,
};

use anyhow::{Context, Error};
use log::{debug, info};
use petgraph::{
    dot::{Config, Dot},
    graph::NodeIndex,
};

use devicegraph::{Devicegraph, DevicegraphError, Sid};

use crate::config::TargetMode;

pub mod action;
mod compare;
pub mod dependencies;
mod describe;
mod order;

pub use action::{
    format_size, Action, ActionKind, ActionState, InvalidTransition, ReallotMode, ResizeDirection,
};
use dependencies::ActionPetgraph;

fn join_sids(sids: &[Sid]) -> String {
    sids.iter()
        .map(Sid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Unplannable: {reason} (sids: {})", join_sids(.sids))]
    Unplannable { reason: String, sids: Vec<Sid> },

    #[error(transparent)]
    Devicegraph(#[from] DevicegraphError),
}

impl PlanError {
    pub fn sids(&self) -> Vec<Sid> {
        match self {
            Self::Unplannable { sids, .. } => sids.clone(),
            Self::Devicegraph(e) => e.sids(),
        }
    }
}

/// The ordered actions that turn `lhs` into `rhs`, together with their
/// dependency graph.
#[derive(Debug)]
pub struct Actiongraph {
    lhs: Devicegraph,
    rhs: Devicegraph,
    target_mode: TargetMode,
    graph: ActionPetgraph,
    order: Vec<NodeIndex>,
}

impl Actiongraph {
    /// Plans the transition from `lhs` to `rhs`. Both graphs have to be
    /// consistent and share their sids.
    #[tracing::instrument(skip_all)]
    pub fn new(
        lhs: &Devicegraph,
        rhs: &Devicegraph,
        target_mode: TargetMode,
    ) -> Result<Self, PlanError> {
        let actions = compare::compare(lhs, rhs, target_mode)?;
        let graph = dependencies::build(actions, lhs, rhs)?;
        let order = order::order(&graph)?;

        if order.is_empty() {
            debug!("Devicegraphs are equal, nothing to do");
        } else {
            info!("Planned {} actions", order.len());
        }

        Ok(Self {
            lhs: lhs.copy(),
            rhs: rhs.copy(),
            target_mode,
            graph,
            order,
        })
    }

    pub fn lhs(&self) -> &Devicegraph {
        &self.lhs
    }

    pub fn rhs(&self) -> &Devicegraph {
        &self.rhs
    }

    pub fn target_mode(&self) -> TargetMode {
        self.target_mode
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// The actions in the order they have to be executed.
    pub fn commit_actions(&self) -> Vec<&Action> {
        self.order.iter().map(|idx| &self.graph[*idx]).collect()
    }

    /// Writes the dependency graph in graphviz dot format.
    pub fn write_graphviz(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let dot = Dot::with_config(&self.graph, &[Config::GraphContentOnly]);
        fs::write(
            path.as_ref(),
            format!("digraph actiongraph {{\n    rankdir=LR;\n{dot}}}\n"),
        )
        .with_context(|| {
            format!(
                "Failed to write action graph to '{}'",
                path.as_ref().display()
            )
        })
    }
}

impl Display for Actiongraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, action) in self.commit_actions().into_iter().enumerate() {
            writeln!(f, "{}. {action}", position + 1)?;
        }
        Ok(())
    }
}
