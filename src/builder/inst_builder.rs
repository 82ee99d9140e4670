//! Per-instruction SSA construction.
//!
//! [`InstBuilder`] walks the blocks in reverse postorder and keeps, for every visited block,
//! the instruction currently defining each virtual register. Virtual registers are laid out
//! as
//!
//! ```text
//! [ registers | arguments | acc | ThisFunc ConstPool LexEnv ]
//!   0 ..                    count  count + 1 ..
//! ```
//!
//! where the environment slots only exist for dynamic methods.
//!
//! # Phi placement
//!
//! Phis are created while entering a block rather than at dominance frontiers:
//!
//! - a reducible loop header gets one phi per register defined in its pre-header
//! - a merge block gets a phi where its predecessors disagree, or where one of them has not
//!   been visited yet
//!
//! Phi operands are only filled in once every block has been translated, by
//! [`InstBuilder::fix_instructions`], which then hands the graph to the
//! [`PhiResolver`](crate::builder::PhiResolver) for typing and cleanup.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    builder::{blocks::BlockMap, BuilderOptions, PhiResolver},
    bytecode::BytecodeInstruction,
    ir::{
        DataType, EnvSlot, Graph, InstData, InstId, Opcode, VRegKind, VirtualRegister,
    },
    runtime::{ClassPtr, MethodPtr, ResolvedField, RuntimeInterface, SlotKind},
    utils::graph::{GraphBase, NodeId},
    Error, Result,
};

/// Translates the bytecode of one block at a time into IR.
pub(crate) struct InstBuilder<'a> {
    /// The graph under construction
    pub(crate) graph: &'a mut Graph,

    pub(crate) runtime: &'a dyn RuntimeInterface,

    /// Leader offsets and try regions
    pub(crate) blocks: &'a BlockMap,

    pub(crate) options: BuilderOptions,

    /// The method being compiled
    pub(crate) method: MethodPtr,

    /// Definition of every virtual register at the current point of each visited block
    defs: Vec<Vec<Option<InstId>>>,

    visited: FxHashSet<NodeId>,

    /// Block receiving new instructions
    current: NodeId,

    /// Catch-phis of every catch-begin block, indexed by virtual register
    catch_phis: FxHashMap<NodeId, Vec<InstId>>,

    /// Set once a register was read before its definition; the graph is unusable
    failed: bool,

    /// Number of registers, arguments excluded
    registers: usize,

    /// Registers plus arguments, which is also the index of the accumulator
    count: usize,

    /// Offset of the bytecode instruction being translated
    pc: u32,

    /// Instructions added for the bytecode instruction being translated
    added: Vec<InstId>,
}

impl<'a> InstBuilder<'a> {
    /// Creates the builder and the catch-phis of every catch-begin block.
    ///
    /// The graph must have been analyzed and its register count set.
    pub fn new(
        graph: &'a mut Graph,
        runtime: &'a dyn RuntimeInterface,
        blocks: &'a BlockMap,
        options: BuilderOptions,
    ) -> Self {
        let method = graph.method();
        let registers = runtime.registers_count(method);
        let count = registers + runtime.arguments_count(method);
        let defs = vec![vec![None; graph.vregs_count()]; graph.node_count()];
        let start = graph.start_block();

        let mut builder = InstBuilder {
            graph,
            runtime,
            blocks,
            options,
            method,
            defs,
            visited: FxHashSet::default(),
            current: start,
            catch_phis: FxHashMap::default(),
            failed: false,
            registers,
            count,
            pc: 0,
            added: Vec::new(),
        };
        builder.create_catch_phis();
        builder
    }

    fn create_catch_phis(&mut self) {
        let catch_begins: Vec<(NodeId, Option<u32>)> = self
            .graph
            .blocks()
            .filter(|block| block.is_catch_begin())
            .map(|block| (block.id(), block.guest_pc()))
            .collect();

        for (block, pc) in catch_begins {
            let mut phis = Vec::with_capacity(self.graph.vregs_count());
            for vreg in 0..self.graph.vregs_count() {
                let ty = (vreg > self.count).then_some(DataType::Any);
                let phi = self.graph.create_inst(
                    Opcode::CatchPhi,
                    ty,
                    pc,
                    InstData::CatchPhi {
                        is_acc: vreg == self.count,
                        throwables: Vec::new(),
                    },
                );
                self.graph.append_inst(block, phi);
                phis.push(phi);
            }
            self.catch_phis.insert(block, phis);
        }
    }

    /// Creates the parameters and the initial safe point in the start block.
    pub fn prepare(&mut self) {
        let start = self.graph.start_block();
        self.current = start;
        self.visited.insert(start);

        for index in 0..self.count - self.registers {
            let ty = self.runtime.argument_type(self.method, index);
            let param = self.graph.add_parameter(index, ty);
            self.defs[start.index()][self.registers + index] = Some(param);
        }

        if self.options.use_safepoint {
            let safepoint = self.create_save_state(Opcode::SafePoint, 0);
            self.add_instruction(safepoint);
        }
    }

    /// Loads the constant pool and the lexical environment from the function object, at
    /// the head of the first bytecode block of a dynamic method.
    pub fn init_env(&mut self) -> Result<()> {
        if self.count == self.registers {
            return Err(malformed_error!(
                "dynamic method {} has no function object argument",
                self.runtime.method_name(self.method)
            ));
        }
        let this_func = self.get_definition(self.registers)?;

        let const_pool =
            self.graph
                .create_inst(Opcode::LoadConstantPool, Some(DataType::Any), None, InstData::None);
        self.graph.append_input(const_pool, this_func, Some(DataType::Any));
        self.add_instruction(const_pool);

        let lex_env =
            self.graph
                .create_inst(Opcode::LoadLexicalEnv, Some(DataType::Any), None, InstData::None);
        self.graph.append_input(lex_env, this_func, Some(DataType::Any));
        self.add_instruction(lex_env);

        for (slot, value) in [this_func, const_pool, lex_env].into_iter().enumerate() {
            self.update_definition(self.env_index(slot), value);
        }
        Ok(())
    }

    /// Makes `block` the target of new instructions.
    pub fn set_current_block(&mut self, block: NodeId) {
        self.current = block;
    }

    pub fn current_block(&self) -> NodeId {
        self.current
    }

    /// Sets the offset reported by errors and attached to new instructions.
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Returns true once a register was read before any definition.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Index of the accumulator.
    pub fn acc_index(&self) -> usize {
        self.count
    }

    /// Index of environment slot `slot`.
    pub fn env_index(&self, slot: usize) -> usize {
        self.count + 1 + slot
    }

    /// Computes the definitions at the entry of `block` from its predecessors, creating
    /// phis where they are needed.
    pub fn update_defs(&mut self, block: NodeId) {
        self.visited.insert(block);
        let preds = self.graph.block(block).preds().to_vec();

        if self.graph.block(block).is_catch_begin() {
            if let Some(phis) = self.catch_phis.get(&block) {
                for (vreg, &phi) in phis.iter().enumerate() {
                    self.defs[block.index()][vreg] = Some(phi);
                }
            }
            return;
        }

        if self.graph.is_reducible_loop_header(block) {
            let preheader = self
                .graph
                .loop_of_header(block)
                .and_then(|info| info.preheader);
            if let Some(preheader) = preheader {
                for vreg in 0..self.defs[block.index()].len() {
                    if let Some(def) = self.defs[preheader.index()][vreg] {
                        let phi = self.create_phi(block, vreg);
                        log::debug!("create phi {phi} for r{vreg} (def {def})");
                        self.defs[block.index()][vreg] = Some(phi);
                    }
                }
                return;
            }
        }

        match preds.as_slice() {
            [] => {}
            [pred] => {
                let defs = self.defs[pred.index()].clone();
                self.defs[block.index()] = defs;
            }
            _ => {
                for vreg in 0..self.defs[block.index()].len() {
                    let mut value: Option<Option<InstId>> = None;
                    let mut need_phi = false;
                    for pred in &preds {
                        if !self.visited.contains(pred) {
                            need_phi = true;
                            break;
                        }
                        let def = self.defs[pred.index()][vreg];
                        match value {
                            None => value = Some(def),
                            Some(known) if known != def => {
                                need_phi = true;
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                    if need_phi {
                        let phi = self.create_phi(block, vreg);
                        self.defs[block.index()][vreg] = Some(phi);
                    } else if let Some(value) = value {
                        self.defs[block.index()][vreg] = value;
                    }
                }
            }
        }
    }

    fn create_phi(&mut self, block: NodeId, vreg: usize) -> InstId {
        let ty = (vreg > self.count).then_some(DataType::Any);
        let pc = self.graph.block(block).guest_pc();
        let phi = self.graph.create_inst(
            Opcode::Phi,
            ty,
            pc,
            InstData::Phi { linear_number: vreg },
        );
        self.graph.append_inst(block, phi);
        phi
    }

    /// The instruction currently defining `vreg`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedRegister`] if no definition reaches the current point; the
    /// builder is marked as failed.
    pub fn get_definition(&mut self, vreg: usize) -> Result<InstId> {
        match self.defs[self.current.index()].get(vreg).copied().flatten() {
            Some(def) => Ok(def),
            None => {
                self.failed = true;
                log::error!("no definition for v{vreg} at pc {:#x}", self.pc);
                Err(Error::UndefinedRegister { vreg, pc: self.pc })
            }
        }
    }

    /// The instruction currently defining the accumulator.
    pub fn get_definition_acc(&mut self) -> Result<InstId> {
        self.get_definition(self.count)
    }

    /// Makes `inst` the definition of `vreg`.
    pub fn update_definition(&mut self, vreg: usize, inst: InstId) {
        if let Some(slot) = self.defs[self.current.index()].get_mut(vreg) {
            *slot = Some(inst);
        }
    }

    /// Makes `inst` the definition of the accumulator.
    pub fn update_definition_acc(&mut self, inst: InstId) {
        self.update_definition(self.count, inst);
    }

    /// Clears the accumulator after an instruction without result.
    pub fn update_definition_acc_none(&mut self) {
        let acc = self.count;
        self.defs[self.current.index()][acc] = None;
    }

    /// Definitions at the current point, for catch-phi inputs.
    pub fn snapshot_defs(&self) -> Vec<Option<InstId>> {
        self.defs[self.current.index()].clone()
    }

    /// Appends `inst` to the current block.
    pub fn add_instruction(&mut self, inst: InstId) {
        self.graph.append_inst(self.current, inst);
        self.added.push(inst);
    }

    /// Starts recording the instructions of a new bytecode instruction.
    pub fn begin_instruction(&mut self, inst: &BytecodeInstruction) {
        self.pc = inst.pc;
        self.added.clear();
    }

    /// Creates an instruction at the current offset without placing it.
    pub fn create(&mut self, opcode: Opcode, ty: Option<DataType>, data: InstData) -> InstId {
        self.graph.create_inst(opcode, ty, Some(self.pc), data)
    }

    /// Creates a save state capturing the registers and the accumulator, plus the
    /// environment of dynamic methods. Safe points leave out numeric values.
    ///
    /// The save state is not placed in a block.
    pub fn create_save_state(&mut self, opcode: Opcode, pc: u32) -> InstId {
        let save_state = self.graph.create_inst(opcode, None, Some(pc), InstData::None);
        let block = self.current.index();

        for vreg in 0..=self.count {
            let Some(def) = self.defs[block][vreg] else {
                continue;
            };
            if opcode == Opcode::SafePoint
                && self.graph.inst(def).ty().is_some_and(DataType::is_numeric)
            {
                continue;
            }
            let kind = if vreg == self.count {
                VRegKind::Acc
            } else {
                VRegKind::Vreg
            };
            self.graph
                .append_save_state_input(save_state, def, VirtualRegister::new(vreg, kind));
        }

        let has_env = self.defs[block]
            .get(self.count + 1)
            .is_some_and(Option::is_some);
        if self.graph.mode().dynamic && has_env {
            for slot in 0..EnvSlot::COUNT {
                let vreg = self.env_index(slot);
                let (Some(Some(def)), Some(env)) =
                    (self.defs[block].get(vreg).copied(), EnvSlot::from_index(slot))
                else {
                    continue;
                };
                self.graph.append_save_state_input(
                    save_state,
                    def,
                    VirtualRegister::new(vreg, VRegKind::Env(env)),
                );
            }
        }
        save_state
    }

    /// Creates a save state of kind `SaveState` at the current offset and places it.
    pub fn add_save_state(&mut self) -> InstId {
        let save_state = self.create_save_state(Opcode::SaveState, self.pc);
        self.add_instruction(save_state);
        save_state
    }

    /// Feeds the catch-phis of every handler covering the current instruction with the
    /// definitions it saw, once per instruction that may throw.
    pub fn process_throwables(&mut self, defs: &[Option<InstId>]) {
        let handlers = self.blocks.handlers_at(self.pc);
        if handlers.is_empty() {
            return;
        }

        let mut throwables = Vec::new();
        for &id in &self.added {
            let inst = self.graph.inst(id);
            if inst.is_save_state() || !inst.opcode().can_throw() {
                continue;
            }
            // A check throws on behalf of the instruction it guards
            let throwable = if inst.opcode().is_check() {
                inst.users().first().map_or(id, |user| user.inst)
            } else {
                id
            };
            if !throwables.contains(&throwable) {
                throwables.push(throwable);
            }
        }

        for throwable in throwables {
            self.add_catch_phi_inputs(&handlers, defs, throwable);
        }
    }

    fn add_catch_phi_inputs(
        &mut self,
        handlers: &[NodeId],
        defs: &[Option<InstId>],
        throwable: InstId,
    ) {
        for &catch_block in handlers {
            self.graph.append_throwable_inst(throwable, catch_block);
            let Some(phis) = self.catch_phis.get(&catch_block) else {
                continue;
            };
            for (vreg, &catch_phi) in phis.iter().enumerate() {
                if self.graph.inst(catch_phi).is_acc_catch_phi() {
                    continue;
                }
                if let Some(Some(input)) = defs.get(vreg) {
                    if *input != catch_phi {
                        self.graph.append_catch_phi_input(catch_phi, *input, throwable);
                    }
                }
            }
        }
    }

    /// Resolves a callee, unless resolution is forced to run time.
    pub fn resolve_method(&self, method_id: u32) -> Option<MethodPtr> {
        if self.options.force_unresolved {
            return None;
        }
        self.runtime.resolve_method(self.method, method_id)
    }

    /// Resolves a field, unless resolution is forced to run time.
    pub fn resolve_field(&self, field_id: u32, is_static: bool) -> Option<ResolvedField> {
        if self.options.force_unresolved {
            return None;
        }
        self.runtime.resolve_field(self.method, field_id, is_static)
    }

    /// Resolves a class, unless resolution is forced to run time.
    pub fn resolve_class(&self, type_id: u32) -> Option<ClassPtr> {
        if self.options.force_unresolved {
            return None;
        }
        self.runtime.resolve_class(self.method, type_id)
    }

    /// Registers the runtime-resolution slot of an unresolved symbol. AOT graphs own no
    /// table slots.
    pub fn add_table_slot(&self, id: u32, kind: SlotKind) {
        if self.graph.mode().aot {
            return;
        }
        self.runtime
            .unresolved_types()
            .add_table_slot(self.method, id, kind);
    }

    /// Appends a `NullCheck` of `value`.
    pub fn null_check(&mut self, value: InstId, save_state: InstId) -> InstId {
        let check = self.create(Opcode::NullCheck, Some(DataType::Reference), InstData::None);
        self.graph
            .append_input(check, value, Some(DataType::Reference));
        self.graph.append_input(check, save_state, None);
        self.add_instruction(check);
        check
    }

    /// Appends the load of class `type_id`, initializing it if needed.
    ///
    /// Unresolved classes go through `UnresolvedLoadAndInitClass` and a class slot.
    pub fn load_and_init_class(&mut self, type_id: u32, save_state: InstId) -> InstId {
        let class = self.resolve_class(type_id);
        let opcode = if class.is_some() {
            Opcode::LoadAndInitClass
        } else {
            self.add_table_slot(type_id, SlotKind::Class);
            Opcode::UnresolvedLoadAndInitClass
        };
        let init = self.create(
            opcode,
            Some(DataType::Reference),
            InstData::Class { type_id, class },
        );
        self.graph.append_input(init, save_state, None);
        self.add_instruction(init);
        init
    }

    /// Completes the graph after all blocks were translated: fills phi operands, drops
    /// save-state operands that do not dominate, types phis from their users, resolves
    /// phis and splits integer constants used as floating point values.
    pub fn fix_instructions(&mut self) {
        let order = self.graph.blocks_rpo().to_vec();

        for &block in &order {
            let phis = self.graph.block(block).phis().to_vec();
            let preds = self.graph.block(block).preds().to_vec();
            for phi in phis {
                let Some(vreg) = self.graph.inst(phi).linear_number() else {
                    continue;
                };
                for pred in &preds {
                    let def = self
                        .defs
                        .get(pred.index())
                        .and_then(|defs| defs.get(vreg).copied())
                        .flatten();
                    if let Some(def) = def {
                        self.graph.append_input(phi, def, None);
                    }
                }
            }
        }

        for &block in &order {
            let insts: Vec<InstId> = self.graph.block(block).all_insts().collect();
            for id in insts {
                if self.graph.inst(id).is_save_state() {
                    self.remove_not_dominate_inputs(id);
                    continue;
                }
                for index in 0..self.graph.inst(id).inputs().len() {
                    let inst = self.graph.inst(id);
                    let input = inst.inputs()[index].inst;
                    let producer = self.graph.inst(input);
                    if !producer.opcode().is_phi_like() || producer.has_type() {
                        continue;
                    }
                    if let Some(ty) = inst.input_type(index) {
                        self.set_type_rec(input, ty);
                    }
                }
            }
        }

        PhiResolver::new(self.graph, self.options).run();
        self.resolve_constants();
    }

    /// Types an untyped phi and, transitively, its untyped phi operands.
    fn set_type_rec(&mut self, inst: InstId, ty: DataType) {
        let mut worklist = vec![inst];
        while let Some(id) = worklist.pop() {
            if self.graph.inst(id).has_type() {
                continue;
            }
            self.graph.set_type(id, ty);
            for input in self.graph.inst(id).inputs() {
                let producer = self.graph.inst(input.inst);
                if producer.opcode().is_phi_like() && !producer.has_type() {
                    worklist.push(input.inst);
                }
            }
        }
    }

    fn remove_not_dominate_inputs(&mut self, save_state: InstId) {
        let Some(block) = self.graph.inst(save_state).block() else {
            return;
        };
        let mut index = 0;
        while index < self.graph.inst(save_state).inputs().len() {
            let input = self.graph.inst(save_state).inputs()[index].inst;
            let keep = self
                .graph
                .inst(input)
                .block()
                .is_some_and(|def| def == block || self.graph.block_dominates(def, block));
            if keep {
                index += 1;
            } else {
                self.graph.remove_input(save_state, index);
            }
        }
    }

    fn resolve_constants(&mut self) {
        let start = self.graph.start_block();
        let constants: Vec<InstId> = self
            .graph
            .block(start)
            .insts()
            .iter()
            .copied()
            .filter(|&id| {
                let inst = self.graph.inst(id);
                inst.is_const() && inst.ty() == Some(DataType::Int64) && !inst.users().is_empty()
            })
            .collect();
        for constant in constants {
            self.split_constant(constant);
        }
    }

    /// Redirects floating point users of an integer constant to a constant with the same
    /// bit pattern and the right type.
    #[allow(clippy::cast_possible_truncation)]
    fn split_constant(&mut self, constant: InstId) {
        let Some(value) = self.graph.inst(constant).const_value() else {
            return;
        };
        let raw = value.raw_bits();
        let users = self.graph.inst(constant).users().to_vec();
        for user in users {
            let replacement = match self.graph.inst(user.inst).input_type(user.index) {
                Some(DataType::Float32) => self.graph.find_or_create_f32(f32::from_bits(raw as u32)),
                Some(DataType::Float64) => self.graph.find_or_create_f64(f64::from_bits(raw)),
                _ => continue,
            };
            self.graph.set_input(user.inst, user.index, replacement);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{ConstValue, GraphMode},
        runtime::MethodDesc,
        test::TestRuntime,
    };

    /// One register and one `Int32` argument: r0, a0 = v1, acc = v2.
    fn runtime() -> TestRuntime {
        TestRuntime::with_desc(
            MethodDesc::new("test", &[DataType::Int32], DataType::Void).registers(1),
        )
    }

    /// A graph over `blocks` fresh blocks wired with `edges`, where index 0 is the start
    /// block and `blocks + 1` the end block.
    fn graph(runtime: &TestRuntime, blocks: usize, edges: &[(usize, usize)]) -> (Graph, Vec<NodeId>) {
        let mut graph = Graph::new(runtime.method, GraphMode::default());
        graph.set_vregs_count(3, 0);
        let mut ids = vec![graph.start_block()];
        for pc in 0..blocks {
            ids.push(graph.create_block(Some(pc as u32 * 4)));
        }
        ids.push(graph.end_block());
        for &(from, to) in edges {
            graph.add_edge(ids[from], ids[to]);
        }
        graph.analyze();
        (graph, ids)
    }

    /// start -> entry -> {left, right} -> merge -> end
    const DIAMOND: &[(usize, usize)] = &[(0, 1), (1, 2), (1, 3), (2, 4), (3, 4), (4, 5)];

    fn object(builder: &mut InstBuilder<'_>) -> InstId {
        let id = builder.create(Opcode::NewObject, Some(DataType::Reference), InstData::None);
        builder.add_instruction(id);
        id
    }

    #[test]
    fn test_single_predecessor_copies_definitions() {
        let runtime = runtime();
        let (mut graph, ids) = graph(&runtime, 4, DIAMOND);
        let blocks = BlockMap::default();
        let mut builder = InstBuilder::new(&mut graph, &*runtime, &blocks, BuilderOptions::default());
        builder.prepare();

        builder.set_current_block(ids[1]);
        builder.update_defs(ids[1]);
        assert_eq!(builder.defs[ids[1].index()], builder.defs[ids[0].index()]);
        assert!(builder.get_definition(1).is_ok());
        assert!(builder.graph.block(ids[1]).phis().is_empty());
    }

    #[test]
    fn test_agreeing_predecessors_need_no_phi() {
        let runtime = runtime();
        let (mut graph, ids) = graph(&runtime, 4, DIAMOND);
        let blocks = BlockMap::default();
        let mut builder = InstBuilder::new(&mut graph, &*runtime, &blocks, BuilderOptions::default());
        builder.prepare();

        builder.set_current_block(ids[1]);
        builder.update_defs(ids[1]);
        let value = object(&mut builder);
        builder.update_definition(0, value);
        for &arm in &ids[2..4] {
            builder.set_current_block(arm);
            builder.update_defs(arm);
        }

        builder.set_current_block(ids[4]);
        builder.update_defs(ids[4]);
        assert!(builder.graph.block(ids[4]).phis().is_empty());
        assert_eq!(builder.get_definition(0).ok(), Some(value));
    }

    #[test]
    fn test_disagreeing_predecessors_get_a_phi() {
        let runtime = runtime();
        let (mut graph, ids) = graph(&runtime, 4, DIAMOND);
        let blocks = BlockMap::default();
        let mut builder = InstBuilder::new(&mut graph, &*runtime, &blocks, BuilderOptions::default());
        builder.prepare();

        builder.set_current_block(ids[1]);
        builder.update_defs(ids[1]);
        let before = object(&mut builder);
        builder.update_definition(0, before);
        builder.set_current_block(ids[2]);
        builder.update_defs(ids[2]);
        let redefined = object(&mut builder);
        builder.update_definition(0, redefined);
        builder.set_current_block(ids[3]);
        builder.update_defs(ids[3]);

        builder.set_current_block(ids[4]);
        builder.update_defs(ids[4]);
        let phis = builder.graph.block(ids[4]).phis().to_vec();
        assert_eq!(phis.len(), 1);
        assert_eq!(builder.graph.inst(phis[0]).linear_number(), Some(0));
        assert_eq!(builder.get_definition(0).ok(), Some(phis[0]));
    }

    #[test]
    fn test_unvisited_predecessor_forces_phis() {
        // Cycle a <-> b entered from both sides: start -> entry -> {a, b}
        let runtime = runtime();
        let (mut graph, ids) =
            graph(&runtime, 3, &[(0, 1), (1, 2), (1, 3), (2, 3), (3, 2), (3, 4)]);
        assert!(!graph.is_reducible_loop_header(ids[2]));
        let blocks = BlockMap::default();
        let mut builder = InstBuilder::new(&mut graph, &*runtime, &blocks, BuilderOptions::default());
        builder.prepare();

        builder.set_current_block(ids[1]);
        builder.update_defs(ids[1]);
        let param = builder.get_definition(1).ok();

        builder.set_current_block(ids[2]);
        builder.update_defs(ids[2]);
        let phis = builder.graph.block(ids[2]).phis().to_vec();
        assert_eq!(phis.len(), 3);
        assert_ne!(builder.get_definition(1).ok(), param);
    }

    #[test]
    fn test_reading_undefined_register_marks_failure() {
        let runtime = runtime();
        let (mut graph, _ids) = graph(&runtime, 1, &[(0, 1), (1, 2)]);
        let blocks = BlockMap::default();
        let mut builder = InstBuilder::new(&mut graph, &*runtime, &blocks, BuilderOptions::default());
        builder.prepare();

        assert!(!builder.has_failed());
        let err = builder.get_definition(0).unwrap_err();
        assert!(matches!(err, Error::UndefinedRegister { vreg: 0, .. }));
        assert!(builder.has_failed());
    }

    #[test]
    fn test_save_state_captures_registers_and_acc() {
        let runtime = runtime();
        let (mut graph, ids) = graph(&runtime, 1, &[(0, 1), (1, 2)]);
        let blocks = BlockMap::default();
        let mut builder = InstBuilder::new(&mut graph, &*runtime, &blocks, BuilderOptions::default());
        builder.prepare();
        builder.set_current_block(ids[1]);
        builder.update_defs(ids[1]);
        let value = object(&mut builder);
        builder.update_definition(0, value);
        let param = builder.get_definition(1).ok();
        builder.update_definition_acc(value);

        let save_state = builder.create_save_state(Opcode::SaveState, 0);
        let inst = builder.graph.inst(save_state);
        assert!(inst.block().is_none());
        let captured: Vec<(Option<InstId>, Option<VirtualRegister>)> =
            (0..inst.inputs().len()).map(|i| (inst.input(i), inst.vreg(i))).collect();
        assert_eq!(
            captured,
            vec![
                (Some(value), Some(VirtualRegister::new(0, VRegKind::Vreg))),
                (param, Some(VirtualRegister::new(1, VRegKind::Vreg))),
                (Some(value), Some(VirtualRegister::new(2, VRegKind::Acc))),
            ]
        );

        let safepoint = builder.create_save_state(Opcode::SafePoint, 0);
        let inst = builder.graph.inst(safepoint);
        assert_eq!(inst.inputs().len(), 2);
        assert!((0..2).all(|i| inst.input(i) == Some(value)));
    }

    #[test]
    fn test_set_type_rec_types_untyped_phi_chain() {
        let runtime = runtime();
        let (mut graph, ids) = graph(&runtime, 4, DIAMOND);
        let blocks = BlockMap::default();
        let mut builder = InstBuilder::new(&mut graph, &*runtime, &blocks, BuilderOptions::default());

        let literal = builder.graph.find_or_create_int(3);
        let inner = builder.create_phi(ids[4], 0);
        let outer = builder.create_phi(ids[4], 1);
        builder.graph.append_input(inner, literal, None);
        builder.graph.append_input(outer, inner, None);
        builder.graph.append_input(outer, literal, None);

        builder.set_type_rec(outer, DataType::Int32);
        assert_eq!(builder.graph.inst(outer).ty(), Some(DataType::Int32));
        assert_eq!(builder.graph.inst(inner).ty(), Some(DataType::Int32));
        assert_eq!(builder.graph.inst(literal).ty(), Some(DataType::Int64));
    }

    #[test]
    fn test_split_constant_for_float_users() {
        let runtime = runtime();
        let (mut graph, ids) = graph(&runtime, 1, &[(0, 1), (1, 2)]);
        let blocks = BlockMap::default();
        let mut builder = InstBuilder::new(&mut graph, &*runtime, &blocks, BuilderOptions::default());
        builder.set_current_block(ids[1]);

        let one = 1.0f64.to_bits() as i64;
        let constant = builder.graph.find_or_create_int(one);
        let float_user = builder.create(Opcode::Return, Some(DataType::Float64), InstData::None);
        builder.add_instruction(float_user);
        builder.graph.append_input(float_user, constant, Some(DataType::Float64));
        let int_user = builder.create(Opcode::Return, Some(DataType::Int64), InstData::None);
        builder.add_instruction(int_user);
        builder.graph.append_input(int_user, constant, Some(DataType::Int64));

        builder.split_constant(constant);
        let replaced = builder.graph.inst(float_user).input(0);
        assert_ne!(replaced, Some(constant));
        let replaced = replaced.map(|id| builder.graph.inst(id).const_value());
        assert_eq!(replaced, Some(Some(ConstValue::from_f64(1.0))));
        assert_eq!(builder.graph.inst(int_user).input(0), Some(constant));
    }
}
