//! Structural verification of a graph.

use crate::{
    ir::{Graph, InstId},
    utils::graph::NodeId,
    Error, Result,
};

/// Verifies the invariants every finished graph must satisfy.
///
/// - every instruction listed in a block points back to that block
/// - the input and user lists mirror each other exactly
/// - every operand is placed in a block
/// - every `Phi` has one input per predecessor
/// - every operand of a save state or ordinary instruction dominates its consumer
///
/// # Examples
///
/// ```rust
/// use irscope::{ir::{Graph, GraphChecker, GraphMode}, runtime::MethodPtr};
///
/// let mut graph = Graph::new(MethodPtr::new(0), GraphMode::default());
/// graph.analyze();
/// assert!(GraphChecker::new(&graph).check().is_ok());
/// ```
pub struct GraphChecker<'a> {
    graph: &'a Graph,
}

impl<'a> GraphChecker<'a> {
    /// Creates a checker for `graph`.
    #[must_use]
    pub fn new(graph: &'a Graph) -> Self {
        GraphChecker { graph }
    }

    /// Runs every check and reports the first violation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VerificationFailed`] describing the first broken invariant.
    pub fn check(&self) -> Result<()> {
        for block in self.graph.blocks() {
            for id in block.all_insts() {
                self.check_placement(id, block.id())?;
                self.check_inputs(id)?;
                self.check_users(id)?;
            }
        }
        Ok(())
    }

    fn check_placement(&self, id: InstId, block: NodeId) -> Result<()> {
        let inst = self.graph.inst(id);
        if inst.block() != Some(block) {
            return Err(Error::VerificationFailed(format!(
                "{id} is listed in {block} but placed in {:?}",
                inst.block()
            )));
        }
        if inst.is_phi() {
            let preds = self.graph.block(block).preds().len();
            if inst.inputs().len() != preds {
                return Err(Error::VerificationFailed(format!(
                    "phi {id} has {} inputs but {block} has {preds} predecessors",
                    inst.inputs().len()
                )));
            }
        }
        Ok(())
    }

    fn check_inputs(&self, id: InstId) -> Result<()> {
        let inst = self.graph.inst(id);
        for (index, input) in inst.inputs().iter().enumerate() {
            let producer = self.graph.inst(input.inst);
            if producer.block().is_none() {
                return Err(Error::VerificationFailed(format!(
                    "input {index} of {id} refers to removed {}",
                    input.inst
                )));
            }
            if !producer
                .users()
                .iter()
                .any(|user| user.inst == id && user.index == index)
            {
                return Err(Error::VerificationFailed(format!(
                    "{} does not list {id}:{index} as a user",
                    input.inst
                )));
            }
            if !inst.opcode().is_phi_like() && !self.graph.inst_dominates(input.inst, id) {
                let what = if inst.is_save_state() {
                    "save state"
                } else {
                    "instruction"
                };
                return Err(Error::VerificationFailed(format!(
                    "input {} of {what} {id} does not dominate it",
                    input.inst
                )));
            }
        }
        Ok(())
    }

    fn check_users(&self, id: InstId) -> Result<()> {
        for user in self.graph.inst(id).users() {
            let consumer = self.graph.inst(user.inst);
            if consumer.input(user.index) != Some(id) {
                return Err(Error::VerificationFailed(format!(
                    "{id} lists {}:{} as a user but that operand is {:?}",
                    user.inst,
                    user.index,
                    consumer.input(user.index)
                )));
            }
            if consumer.block().is_none() {
                return Err(Error::VerificationFailed(format!(
                    "{id} is used by removed {}",
                    user.inst
                )));
            }
        }
        Ok(())
    }
}
