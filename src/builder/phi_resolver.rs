//! Phi typing, dead phi removal and save-state pruning.
//!
//! The instruction builder creates phis eagerly and leaves most of them untyped. The
//! resolver runs once all operands are in place and
//!
//! 1. marks every phi that feeds a real user, directly or through other phis
//! 2. types the remaining untyped phis from the values reaching them
//! 3. removes phis without real users, together with the save-state operands referring
//!    to them
//! 4. removes values from save states that are not on a path to one of their real users
//! 5. folds phis whose operands all agree, and phis left with a wrong operand count
//!
//! Save-state operands of environment slots are never pruned. Passes repeat until a full
//! round changes nothing, so running the resolver on its own output is a no-op.
//!
//! # Usage
//!
//! ```rust,ignore
//! use irscope::builder::{BuilderOptions, PhiResolver};
//!
//! PhiResolver::new(&mut graph, BuilderOptions::default()).run();
//! ```

use rustc_hash::FxHashSet;

use crate::{
    builder::BuilderOptions,
    ir::{DataType, Graph, InstId},
    utils::graph::NodeId,
};

/// Types and prunes the phis of a freshly built graph.
pub struct PhiResolver<'a> {
    graph: &'a mut Graph,

    options: BuilderOptions,

    /// Phi-like instructions that reach a real user
    has_real_user: FxHashSet<InstId>,

    /// Blocks lying entirely on a path from a definition to one of its users
    marked_blocks: FxHashSet<NodeId>,

    /// Instructions between a definition and a user in partially covered blocks
    marked_insts: FxHashSet<InstId>,

    /// Something changed in the current round
    changed: bool,
}

impl<'a> PhiResolver<'a> {
    /// Creates a resolver for `graph`, which must have been analyzed.
    pub fn new(graph: &'a mut Graph, options: BuilderOptions) -> Self {
        PhiResolver {
            graph,
            options,
            has_real_user: FxHashSet::default(),
            marked_blocks: FxHashSet::default(),
            marked_insts: FxHashSet::default(),
            changed: false,
        }
    }

    /// Runs resolution rounds until the graph is stable.
    pub fn run(mut self) {
        let mut rounds = 0;
        loop {
            self.changed = false;
            self.mark_phis_with_real_users();
            self.resolve_blocks();
            self.remove_dead_phis();
            rounds += 1;
            if !self.changed {
                break;
            }
        }
        log::debug!("phi resolution finished after {rounds} rounds");
    }

    fn phi_like_insts(&self) -> Vec<InstId> {
        self.graph
            .blocks_rpo()
            .iter()
            .flat_map(|&block| self.graph.block(block).all_insts())
            .filter(|&id| self.graph.inst(id).opcode().is_phi_like())
            .collect()
    }

    fn mark_phis_with_real_users(&mut self) {
        self.has_real_user.clear();
        for phi in self.phi_like_insts() {
            let has_real_user = self.graph.inst(phi).users().iter().any(|user| {
                let consumer = self.graph.inst(user.inst);
                if consumer.opcode().is_phi_like() {
                    return false;
                }
                if consumer.is_save_state() {
                    return consumer.vreg(user.index).is_some_and(|vreg| vreg.is_env());
                }
                true
            });
            if has_real_user {
                self.mark_has_real_user_rec(phi);
            }
        }
    }

    fn mark_has_real_user_rec(&mut self, phi: InstId) {
        let mut worklist = vec![phi];
        while let Some(id) = worklist.pop() {
            if !self.has_real_user.insert(id) {
                continue;
            }
            for input in self.graph.inst(id).inputs() {
                if self.graph.inst(input.inst).opcode().is_phi_like()
                    && !self.has_real_user.contains(&input.inst)
                {
                    worklist.push(input.inst);
                }
            }
        }
    }

    fn resolve_blocks(&mut self) {
        let order = self.graph.blocks_rpo().to_vec();
        for block in order {
            let insts: Vec<InstId> = self.graph.block(block).all_insts().collect();
            for id in insts {
                if self.graph.inst(id).block().is_none() {
                    continue;
                }
                if !self.graph.inst(id).opcode().is_phi_like() {
                    self.try_remove_from_save_states(id);
                    continue;
                }

                self.check_phi_inputs(id);
                let inst = self.graph.inst(id);
                let keeps_type = inst.is_phi()
                    || (inst.is_catch_phi() && inst.ty() == Some(DataType::Any));
                if keeps_type && inst.has_type() && !inst.users().is_empty() {
                    self.try_remove_from_save_states(id);
                } else if !self.has_real_user.contains(&id) {
                    self.remove_phi_inst(id);
                } else if !inst.has_type() {
                    self.set_type_by_inputs(id);
                }
            }
        }
    }

    /// Types an untyped phi when every value reaching it has the same type, integer
    /// constants being compatible with every integer type.
    fn check_phi_inputs(&mut self, phi: InstId) {
        let inst = self.graph.inst(phi);
        if inst.has_type() {
            return;
        }
        if inst.is_phi() {
            let Some(block) = inst.block() else {
                return;
            };
            let preds = self.graph.block(block).preds();
            if inst.inputs().len() != preds.len() {
                return;
            }
            for (input, &pred) in inst.inputs().iter().zip(preds) {
                let dominates = self
                    .graph
                    .inst(input.inst)
                    .block()
                    .is_some_and(|def| self.graph.block_dominates(def, pred));
                if !dominates {
                    return;
                }
            }
        }

        let leaves = self.find_inputs_rec(phi);
        if leaves.is_empty() {
            return;
        }

        let mut ty: Option<DataType> = None;
        let mut has_const = false;
        for leaf in leaves {
            let leaf = self.graph.inst(leaf);
            let Some(leaf_ty) = leaf.ty() else {
                return;
            };
            if leaf.is_const() && leaf_ty == DataType::Int64 {
                if ty.is_some_and(|ty| ty.common_type() != DataType::Int64) {
                    return;
                }
                has_const = true;
            } else {
                if has_const && leaf_ty.common_type() != DataType::Int64 {
                    return;
                }
                match ty {
                    None => ty = Some(leaf_ty),
                    Some(known) if known != leaf_ty => return,
                    Some(_) => {}
                }
            }
        }

        let ty = match ty {
            Some(ty) => ty,
            None if has_const => DataType::Int64,
            None => return,
        };
        log::debug!("phi {phi} typed as {ty} from its inputs");
        self.graph.set_type(phi, ty);
        self.changed = true;
    }

    /// Values reaching `phi` through chains of untyped phis.
    fn find_inputs_rec(&self, phi: InstId) -> Vec<InstId> {
        let mut visited = FxHashSet::default();
        visited.insert(phi);
        let mut leaves = Vec::new();
        let mut stack = vec![phi];
        while let Some(id) = stack.pop() {
            // A phi without inputs cannot be typed and fails the check as an untyped leaf
            if self.graph.inst(id).inputs().is_empty() {
                leaves.push(id);
                continue;
            }
            for input in self.graph.inst(id).inputs() {
                if !visited.insert(input.inst) {
                    continue;
                }
                let producer = self.graph.inst(input.inst);
                if producer.opcode().is_phi_like() && !producer.has_type() {
                    stack.push(input.inst);
                } else {
                    leaves.push(input.inst);
                }
            }
        }
        leaves
    }

    fn set_type_by_inputs(&mut self, phi: InstId) {
        let inst = self.graph.inst(phi);
        let ty = if inst.is_acc_catch_phi() {
            Some(DataType::Reference)
        } else {
            inst.inputs()
                .iter()
                .find_map(|input| self.graph.inst(input.inst).ty())
        };
        if let Some(ty) = ty {
            self.graph.set_type(phi, ty);
            self.changed = true;
        }
    }

    /// Removes a phi without real users, every phi using it, and their save-state
    /// operands.
    fn remove_phi_inst(&mut self, phi: InstId) {
        let mut closure = vec![phi];
        let mut seen = FxHashSet::default();
        seen.insert(phi);
        let mut index = 0;
        while index < closure.len() {
            for user in self.graph.inst(closure[index]).users() {
                if self.graph.inst(user.inst).opcode().is_phi_like() && seen.insert(user.inst) {
                    closure.push(user.inst);
                }
            }
            index += 1;
        }

        for &id in &closure {
            let save_states: Vec<InstId> = self
                .graph
                .inst(id)
                .users()
                .iter()
                .map(|user| user.inst)
                .filter(|&user| self.graph.inst(user).is_save_state())
                .collect();
            for save_state in save_states {
                self.graph.remove_input_from(save_state, id);
            }
        }
        for &id in &closure {
            self.graph.remove_users(id);
        }
        for &id in &closure {
            if self.graph.inst(id).block().is_some() {
                log::debug!("remove phi {id} without real users");
                self.graph.remove_inst(id);
            }
        }
        self.changed = true;
    }

    /// Drops `inst` from every save state that is not on a path to one of its real users.
    fn try_remove_from_save_states(&mut self, inst: InstId) {
        if self.options.non_optimizing {
            return;
        }
        let users = self.graph.inst(inst).users().to_vec();
        if users.iter().any(|user| {
            self.graph.inst(user.inst).opcode().is_phi_like()
                && self.has_real_user.contains(&user.inst)
        }) {
            return;
        }

        self.marked_blocks.clear();
        self.marked_insts.clear();
        for user in &users {
            let consumer = self.graph.inst(user.inst);
            if consumer.is_save_state() || consumer.opcode().is_phi_like() {
                continue;
            }
            if let Some(block) = consumer.block() {
                self.mark_insts_on_paths(block, inst, Some(user.inst));
            }
        }

        let mut save_states: Vec<InstId> = users
            .iter()
            .map(|user| user.inst)
            .filter(|&user| self.graph.inst(user).is_save_state())
            .collect();
        save_states.dedup();

        for save_state in save_states {
            let on_path = self
                .graph
                .inst(save_state)
                .block()
                .is_some_and(|block| self.marked_blocks.contains(&block))
                || self.marked_insts.contains(&save_state);
            if on_path {
                continue;
            }
            let mut index = 0;
            while index < self.graph.inst(save_state).inputs().len() {
                let input = self.graph.inst(save_state).inputs()[index];
                if input.inst == inst && !input.vreg.is_some_and(|vreg| vreg.is_env()) {
                    self.graph.remove_input(save_state, index);
                    self.changed = true;
                } else {
                    index += 1;
                }
            }
        }
    }

    /// Walks backwards from `start_from` in `block` to the definition of `inst`, marking
    /// what lies in between.
    fn mark_insts_on_paths(&mut self, block: NodeId, inst: InstId, start_from: Option<InstId>) {
        let mut visited = FxHashSet::default();
        let mut worklist = vec![(block, start_from)];
        while let Some((block, from)) = worklist.pop() {
            let insts: Vec<InstId> = self.graph.block(block).all_insts().collect();
            let end = from
                .and_then(|from| insts.iter().position(|&id| id == from))
                .unwrap_or(insts.len());

            let mut reached_def = false;
            for &id in insts[..end].iter().rev() {
                if id == inst {
                    reached_def = true;
                    break;
                }
                self.marked_insts.insert(id);
            }
            if reached_def {
                continue;
            }
            if from.is_none() {
                self.marked_blocks.insert(block);
            }
            for &pred in self.graph.block(block).preds() {
                if visited.insert(pred) {
                    worklist.push((pred, None));
                }
            }
        }
    }

    /// Folds phis that merge a single value and phis whose operand count no longer
    /// matches their block.
    fn remove_dead_phis(&mut self) {
        let order = self.graph.blocks_rpo().to_vec();
        for block in order {
            let phis = self.graph.block(block).phis().to_vec();
            let preds = self.graph.block(block).preds().len();
            for phi in phis {
                if self.graph.inst(phi).block().is_none() {
                    continue;
                }
                let inputs: Vec<InstId> = self
                    .graph
                    .inst(phi)
                    .inputs()
                    .iter()
                    .map(|input| input.inst)
                    .collect();

                debug_assert!(
                    inputs.len() <= preds,
                    "phi {phi} has more inputs than its block has predecessors"
                );
                if inputs.len() != preds {
                    if let Some(&first) = inputs.iter().find(|&&input| input != phi) {
                        debug_assert!(
                            self.graph.inst(phi).users().is_empty()
                                || inputs.iter().all(|&input| input == first || input == phi),
                            "dead phi {phi} with users merges different values"
                        );
                        self.replace_phi(phi, first);
                    } else if self.graph.inst(phi).users().is_empty() {
                        self.graph.remove_inst(phi);
                        self.changed = true;
                    }
                    continue;
                }

                let mut value = None;
                let mut trivial = true;
                for &input in inputs.iter().filter(|&&input| input != phi) {
                    match value {
                        None => value = Some(input),
                        Some(known) if known != input => {
                            trivial = false;
                            break;
                        }
                        Some(_) => {}
                    }
                }
                let Some(value) = value.filter(|_| trivial) else {
                    continue;
                };
                let dominates = self
                    .graph
                    .inst(value)
                    .block()
                    .is_some_and(|def| self.graph.block_dominates(def, block));
                if dominates {
                    self.replace_phi(phi, value);
                }
            }
        }
    }

    fn replace_phi(&mut self, phi: InstId, value: InstId) {
        log::debug!("replace phi {phi} with {value}");
        self.graph.replace_users(phi, value);
        self.graph.remove_inst(phi);
        self.changed = true;

        let save_states: Vec<InstId> = self
            .graph
            .inst(value)
            .users()
            .iter()
            .map(|user| user.inst)
            .filter(|&user| self.graph.inst(user).is_save_state())
            .collect();
        for save_state in save_states {
            if !self.graph.inst_dominates(value, save_state) {
                self.graph.remove_input_from(save_state, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{GraphMode, InstData, Opcode, VRegKind, VirtualRegister},
        runtime::MethodPtr,
    };

    /// start -> entry -> {left, right} -> merge -> end
    fn diamond() -> (Graph, [NodeId; 4]) {
        let mut graph = Graph::new(MethodPtr::new(0), GraphMode::default());
        let entry = graph.create_block(Some(0));
        let left = graph.create_block(Some(4));
        let right = graph.create_block(Some(8));
        let merge = graph.create_block(Some(12));
        let start = graph.start_block();
        let end = graph.end_block();
        graph.add_edge(start, entry);
        graph.add_edge(entry, left);
        graph.add_edge(entry, right);
        graph.add_edge(left, merge);
        graph.add_edge(right, merge);
        graph.add_edge(merge, end);
        graph.analyze();
        (graph, [entry, left, right, merge])
    }

    fn phi(graph: &mut Graph, block: NodeId, inputs: &[InstId]) -> InstId {
        let phi = graph.create_inst(
            Opcode::Phi,
            None,
            Some(12),
            InstData::Phi { linear_number: 0 },
        );
        graph.append_inst(block, phi);
        for &input in inputs {
            graph.append_input(phi, input, None);
        }
        phi
    }

    fn inst(
        graph: &mut Graph,
        block: NodeId,
        opcode: Opcode,
        ty: DataType,
        inputs: &[InstId],
    ) -> InstId {
        let id = graph.create_inst(opcode, Some(ty), Some(0), InstData::None);
        graph.append_inst(block, id);
        for &input in inputs {
            graph.append_input(id, input, Some(ty));
        }
        id
    }

    #[test]
    fn test_phi_typed_from_int32_and_constant() {
        let (mut graph, [_entry, left, _right, merge]) = diamond();
        let param = graph.add_parameter(0, DataType::Int32);
        let zero = graph.find_or_create_int(0);
        let add = inst(&mut graph, left, Opcode::Add, DataType::Int32, &[param, param]);
        let phi = phi(&mut graph, merge, &[add, zero]);
        inst(&mut graph, merge, Opcode::Return, DataType::Int32, &[phi]);

        PhiResolver::new(&mut graph, BuilderOptions::default()).run();
        assert_eq!(graph.inst(phi).ty(), Some(DataType::Int32));
        assert_eq!(graph.inst(phi).block(), Some(merge));
    }

    #[test]
    fn test_untyped_phi_gets_common_type() {
        let (mut graph, [_entry, left, right, merge]) = diamond();
        let a = inst(&mut graph, left, Opcode::NewObject, DataType::Reference, &[]);
        let b = inst(&mut graph, right, Opcode::NewObject, DataType::Reference, &[]);
        let phi = phi(&mut graph, merge, &[a, b]);
        let ret = graph.create_inst(Opcode::Return, Some(DataType::Void), Some(12), InstData::None);
        graph.append_inst(merge, ret);
        graph.append_input(ret, phi, None);

        PhiResolver::new(&mut graph, BuilderOptions::default()).run();
        assert_eq!(graph.inst(phi).ty(), Some(DataType::Reference));
    }

    #[test]
    fn test_phi_without_real_user_is_removed() {
        let (mut graph, [_entry, _left, _right, merge]) = diamond();
        let a = graph.find_or_create_int(1);
        let b = graph.find_or_create_int(2);
        let phi = phi(&mut graph, merge, &[a, b]);
        let ss = graph.create_inst(Opcode::SaveState, None, Some(12), InstData::None);
        graph.append_inst(merge, ss);
        graph.append_save_state_input(ss, phi, VirtualRegister::new(0, VRegKind::Vreg));

        PhiResolver::new(&mut graph, BuilderOptions::default()).run();
        assert!(graph.inst(phi).block().is_none());
        assert!(graph.inst(ss).inputs().is_empty());
        assert!(graph.block(merge).phis().is_empty());
    }

    #[test]
    fn test_trivial_phi_is_folded() {
        let (mut graph, [entry, _left, _right, merge]) = diamond();
        let value = inst(&mut graph, entry, Opcode::NewObject, DataType::Reference, &[]);
        let phi = phi(&mut graph, merge, &[value, value]);
        let ret = inst(&mut graph, merge, Opcode::Return, DataType::Reference, &[phi]);

        PhiResolver::new(&mut graph, BuilderOptions::default()).run();
        assert!(graph.inst(phi).block().is_none());
        assert_eq!(graph.inst(ret).input(0), Some(value));
    }

    #[test]
    fn test_save_state_pruning() {
        let (mut graph, [entry, left, right, _merge]) = diamond();
        let value = inst(&mut graph, entry, Opcode::NewObject, DataType::Reference, &[]);
        let live = graph.create_inst(Opcode::SaveState, None, Some(4), InstData::None);
        graph.append_inst(left, live);
        graph.append_save_state_input(live, value, VirtualRegister::new(0, VRegKind::Vreg));
        inst(&mut graph, left, Opcode::Return, DataType::Reference, &[value]);
        let dead = graph.create_inst(Opcode::SaveState, None, Some(8), InstData::None);
        graph.append_inst(right, dead);
        graph.append_save_state_input(dead, value, VirtualRegister::new(0, VRegKind::Vreg));

        PhiResolver::new(&mut graph, BuilderOptions::default()).run();
        assert_eq!(graph.inst(live).inputs().len(), 1);
        assert!(graph.inst(dead).inputs().is_empty());
    }

    #[test]
    fn test_non_optimizing_keeps_save_states() {
        let (mut graph, [entry, _left, right, _merge]) = diamond();
        let value = inst(&mut graph, entry, Opcode::NewObject, DataType::Reference, &[]);
        let ss = graph.create_inst(Opcode::SaveState, None, Some(8), InstData::None);
        graph.append_inst(right, ss);
        graph.append_save_state_input(ss, value, VirtualRegister::new(0, VRegKind::Vreg));

        PhiResolver::new(&mut graph, BuilderOptions::non_optimizing()).run();
        assert_eq!(graph.inst(ss).inputs().len(), 1);
    }

    #[test]
    fn test_resolver_is_idempotent() {
        let (mut graph, [_entry, left, right, merge]) = diamond();
        let param = graph.add_parameter(0, DataType::Int64);
        let a = inst(&mut graph, left, Opcode::Neg, DataType::Int64, &[param]);
        let b = inst(&mut graph, right, Opcode::Not, DataType::Int64, &[param]);
        let phi = phi(&mut graph, merge, &[a, b]);
        inst(&mut graph, merge, Opcode::Return, DataType::Int64, &[phi]);

        PhiResolver::new(&mut graph, BuilderOptions::default()).run();
        let first = graph.to_string();
        PhiResolver::new(&mut graph, BuilderOptions::default()).run();
        assert_eq!(graph.to_string(), first);
        assert_eq!(graph.inst(phi).ty(), Some(DataType::Int64));
    }

    #[test]
    fn test_phi_over_empty_phi_stays_untyped() {
        let (mut graph, [_entry, left, _right, merge]) = diamond();
        let empty = phi(&mut graph, left, &[]);
        let literal = graph.find_or_create_int(7);
        let merged = phi(&mut graph, merge, &[empty, literal]);

        let mut resolver = PhiResolver::new(&mut graph, BuilderOptions::default());
        resolver.check_phi_inputs(merged);
        assert!(!resolver.changed);
        drop(resolver);
        assert_eq!(graph.inst(merged).ty(), None);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "more inputs than its block has predecessors")]
    fn test_phi_with_extra_inputs_is_rejected() {
        let (mut graph, [entry, _left, _right, merge]) = diamond();
        let value = inst(&mut graph, entry, Opcode::NewObject, DataType::Reference, &[]);
        let phi = phi(&mut graph, merge, &[value, value, value]);
        inst(&mut graph, merge, Opcode::Return, DataType::Reference, &[phi]);

        PhiResolver::new(&mut graph, BuilderOptions::default()).run();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "merges different values")]
    fn test_dead_phi_merging_different_values_is_rejected() {
        // start -> entry -> {a, b, c} -> merge -> end
        let mut graph = Graph::new(MethodPtr::new(0), GraphMode::default());
        let entry = graph.create_block(Some(0));
        let arms: Vec<NodeId> = (1..=3).map(|i| graph.create_block(Some(i * 4))).collect();
        let merge = graph.create_block(Some(16));
        let (start, end) = (graph.start_block(), graph.end_block());
        graph.add_edge(start, entry);
        for &arm in &arms {
            graph.add_edge(entry, arm);
            graph.add_edge(arm, merge);
        }
        graph.add_edge(merge, end);
        graph.analyze();

        let a = inst(&mut graph, arms[0], Opcode::NewObject, DataType::Reference, &[]);
        let b = inst(&mut graph, arms[1], Opcode::NewObject, DataType::Reference, &[]);
        let phi = phi(&mut graph, merge, &[a, b]);
        inst(&mut graph, merge, Opcode::Return, DataType::Reference, &[phi]);

        PhiResolver::new(&mut graph, BuilderOptions::default()).run();
    }
}
