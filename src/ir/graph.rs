//! The IR graph of one method.
//!
//! [`Graph`] owns every basic block and every instruction of a compilation. Instructions
//! live in a single arena and are never freed: removing one detaches it from its block and
//! from the user lists of its operands. All edits of operands go through the graph so the
//! input and user sides of every edge stay mirrored.

use rustc_hash::FxHashMap;

use crate::{
    ir::{
        loops::{detect_loops, LoopForest, LoopInfo},
        BasicBlock, BlockFlags, ConstValue, DataType, Input, Inst, InstData, InstFlags, InstId,
        Opcode, User, VirtualRegister,
    },
    runtime::MethodPtr,
    utils::graph::{
        algorithms::{compute_dominators_rooted, reverse_postorder, DominatorTree},
        GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    },
};

/// Compilation mode of a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphMode {
    /// Ahead-of-time compilation, no runtime table slots are registered
    pub aot: bool,
    /// On-stack-replacement compilation entered from loop headers
    pub osr: bool,
    /// The method belongs to a dynamic language and carries environment slots
    pub dynamic: bool,
}

/// SSA graph of one method.
#[derive(Debug, Clone)]
pub struct Graph {
    method: MethodPtr,
    mode: GraphMode,
    insts: Vec<Inst>,
    blocks: Vec<BasicBlock>,
    start: NodeId,
    end: NodeId,
    constants: FxHashMap<ConstValue, InstId>,
    null_ptr: Option<InstId>,
    parameters: Vec<InstId>,
    rpo: Vec<NodeId>,
    dominators: Option<DominatorTree>,
    loops: LoopForest,
    throwables: FxHashMap<InstId, Vec<NodeId>>,
    vregs_count: usize,
    env_count: usize,
}

impl Graph {
    /// Creates an empty graph with a start block and an end block.
    #[must_use]
    pub fn new(method: MethodPtr, mode: GraphMode) -> Self {
        let mut graph = Graph {
            method,
            mode,
            insts: Vec::new(),
            blocks: Vec::new(),
            start: NodeId::new(0),
            end: NodeId::new(0),
            constants: FxHashMap::default(),
            null_ptr: None,
            parameters: Vec::new(),
            rpo: Vec::new(),
            dominators: None,
            loops: LoopForest::default(),
            throwables: FxHashMap::default(),
            vregs_count: 0,
            env_count: 0,
        };
        graph.start = graph.create_block(None);
        graph.end = graph.create_block(None);
        graph.blocks[graph.start.index()].flags |= BlockFlags::START;
        graph.blocks[graph.end.index()].flags |= BlockFlags::END;
        graph
    }

    /// The compiled method.
    #[must_use]
    pub fn method(&self) -> MethodPtr {
        self.method
    }

    /// Compilation mode.
    #[must_use]
    pub fn mode(&self) -> GraphMode {
        self.mode
    }

    /// Size of the builder's definition tables: registers, arguments, accumulator and
    /// environment slots.
    #[must_use]
    pub fn vregs_count(&self) -> usize {
        self.vregs_count
    }

    /// Number of environment slots after the accumulator.
    #[must_use]
    pub fn env_count(&self) -> usize {
        self.env_count
    }

    pub(crate) fn set_vregs_count(&mut self, vregs_count: usize, env_count: usize) {
        self.vregs_count = vregs_count;
        self.env_count = env_count;
    }

    // ------------------------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------------------------

    /// Creates a detached block.
    pub fn create_block(&mut self, guest_pc: Option<u32>) -> NodeId {
        let id = NodeId::new(self.blocks.len());
        self.blocks.push(BasicBlock::new(id, guest_pc));
        id
    }

    /// Adds the edge `from -> to` at the end of both edge lists.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.blocks[from.index()].succs.push(to);
        self.blocks[to.index()].preds.push(from);
    }

    /// Removes every edge of `block`, leaving it detached.
    pub fn detach_block(&mut self, block: NodeId) {
        let succs = std::mem::take(&mut self.blocks[block.index()].succs);
        for succ in succs {
            self.blocks[succ.index()].preds.retain(|&p| p != block);
        }
        let preds = std::mem::take(&mut self.blocks[block.index()].preds);
        for pred in preds {
            self.blocks[pred.index()].succs.retain(|&s| s != block);
        }
    }

    /// The entry block.
    #[must_use]
    pub fn start_block(&self) -> NodeId {
        self.start
    }

    /// The exit block.
    #[must_use]
    pub fn end_block(&self) -> NodeId {
        self.end
    }

    /// Block `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    #[must_use]
    pub fn block(&self, id: NodeId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub(crate) fn block_mut(&mut self, id: NodeId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// All blocks that are still connected to the graph, by ascending id.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter(|block| !block.is_detached())
    }

    /// Blocks in reverse postorder, as computed by the last [`Graph::analyze`].
    #[must_use]
    pub fn blocks_rpo(&self) -> &[NodeId] {
        &self.rpo
    }

    // ------------------------------------------------------------------------------------
    // Instructions
    // ------------------------------------------------------------------------------------

    /// Creates an instruction that is not yet placed in a block.
    pub fn create_inst(
        &mut self,
        opcode: Opcode,
        ty: Option<DataType>,
        pc: Option<u32>,
        data: InstData,
    ) -> InstId {
        let id = InstId::new(self.insts.len());
        self.insts.push(Inst::new(id, opcode, ty, pc, data));
        id
    }

    /// Instruction `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    #[must_use]
    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    pub(crate) fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.index()]
    }

    /// Number of instructions ever created, removed ones included.
    #[must_use]
    pub fn inst_count(&self) -> usize {
        self.insts.len()
    }

    /// All placed instructions, block by block in reverse postorder.
    pub fn instructions(&self) -> impl Iterator<Item = &Inst> {
        self.rpo
            .iter()
            .flat_map(|&bb| self.blocks[bb.index()].all_insts())
            .map(|id| &self.insts[id.index()])
    }

    /// Sets the result type of an instruction.
    pub fn set_type(&mut self, id: InstId, ty: DataType) {
        self.insts[id.index()].ty = Some(ty);
    }

    /// Appends `id` at the end of `block`. Phis go to the phi list.
    pub fn append_inst(&mut self, block: NodeId, id: InstId) {
        self.insts[id.index()].block = Some(block);
        if self.insts[id.index()].is_phi() {
            self.blocks[block.index()].phis.push(id);
        } else {
            self.blocks[block.index()].insts.push(id);
        }
    }

    /// Inserts `id` as the first non-phi instruction of `block`.
    pub fn prepend_inst(&mut self, block: NodeId, id: InstId) {
        self.insts[id.index()].block = Some(block);
        self.blocks[block.index()].insts.insert(0, id);
    }

    /// Inserts `id` right before `anchor` in the anchor's block.
    pub fn insert_before(&mut self, anchor: InstId, id: InstId) {
        let Some(block) = self.insts[anchor.index()].block else {
            return;
        };
        let list = &mut self.blocks[block.index()].insts;
        let position = list.iter().position(|&i| i == anchor).unwrap_or(list.len());
        list.insert(position, id);
        self.insts[id.index()].block = Some(block);
    }

    /// Detaches `id` from its block and from the user lists of its operands.
    ///
    /// The instruction must not have users left.
    pub fn remove_inst(&mut self, id: InstId) {
        debug_assert!(
            self.insts[id.index()].users.is_empty(),
            "removing {id} which still has users"
        );
        let inputs = std::mem::take(&mut self.insts[id.index()].inputs);
        for (index, input) in inputs.iter().enumerate() {
            self.remove_user_entry(input.inst, id, index);
        }
        if let Some(block) = self.insts[id.index()].block.take() {
            let block = &mut self.blocks[block.index()];
            block.phis.retain(|&i| i != id);
            block.insts.retain(|&i| i != id);
        }
        self.throwables.remove(&id);
    }

    /// Appends an operand and returns its index.
    pub fn append_input(&mut self, inst: InstId, input: InstId, ty: Option<DataType>) -> usize {
        self.push_input(
            inst,
            Input {
                inst: input,
                ty,
                vreg: None,
            },
        )
    }

    /// Appends a save-state operand tagged with its register.
    pub fn append_save_state_input(
        &mut self,
        save_state: InstId,
        input: InstId,
        vreg: VirtualRegister,
    ) -> usize {
        self.push_input(
            save_state,
            Input {
                inst: input,
                ty: None,
                vreg: Some(vreg),
            },
        )
    }

    fn push_input(&mut self, inst: InstId, input: Input) -> usize {
        let index = self.insts[inst.index()].inputs.len();
        self.insts[input.inst.index()]
            .users
            .push(User { inst, index });
        self.insts[inst.index()].inputs.push(input);
        index
    }

    /// Appends an operand of a catch-phi together with the instruction that throws it.
    pub fn append_catch_phi_input(&mut self, catch_phi: InstId, input: InstId, throwable: InstId) {
        self.append_input(catch_phi, input, None);
        if let InstData::CatchPhi { throwables, .. } = &mut self.insts[catch_phi.index()].data {
            throwables.push(throwable);
        }
    }

    /// Adds `flags` to an instruction.
    pub fn set_inst_flags(&mut self, id: InstId, flags: InstFlags) {
        self.insts[id.index()].flags |= flags;
    }

    /// Sets the declared type of operand `index`.
    pub fn set_input_type(&mut self, inst: InstId, index: usize, ty: DataType) {
        if let Some(input) = self.insts[inst.index()].inputs.get_mut(index) {
            input.ty = Some(ty);
        }
    }

    /// Replaces the producer of operand `index`, keeping its type and register tag.
    pub fn set_input(&mut self, inst: InstId, index: usize, new_input: InstId) {
        let old = self.insts[inst.index()].inputs[index].inst;
        if old == new_input {
            return;
        }
        self.remove_user_entry(old, inst, index);
        self.insts[inst.index()].inputs[index].inst = new_input;
        self.insts[new_input.index()]
            .users
            .push(User { inst, index });
    }

    /// Removes operand `index`. The last operand takes its place.
    pub fn remove_input(&mut self, inst: InstId, index: usize) {
        let last = self.insts[inst.index()].inputs.len() - 1;
        let removed = self.insts[inst.index()].inputs.swap_remove(index);
        self.remove_user_entry(removed.inst, inst, index);
        if index != last {
            let moved = self.insts[inst.index()].inputs[index].inst;
            if let Some(user) = self.insts[moved.index()]
                .users
                .iter_mut()
                .find(|u| u.inst == inst && u.index == last)
            {
                user.index = index;
            }
        }
        if let InstData::CatchPhi { throwables, .. } = &mut self.insts[inst.index()].data {
            if index < throwables.len() {
                throwables.swap_remove(index);
            }
        }
    }

    /// Removes every operand of `save_state` that refers to `value`.
    pub fn remove_input_from(&mut self, save_state: InstId, value: InstId) {
        while let Some(index) = self.insts[save_state.index()]
            .inputs
            .iter()
            .position(|input| input.inst == value)
        {
            self.remove_input(save_state, index);
        }
    }

    /// Makes every user of `old` use `new` instead.
    pub fn replace_users(&mut self, old: InstId, new: InstId) {
        let users = std::mem::take(&mut self.insts[old.index()].users);
        for user in users {
            self.insts[user.inst.index()].inputs[user.index].inst = new;
            self.insts[new.index()].users.push(user);
        }
    }

    /// Removes `inst` from the operand lists of all of its users.
    pub fn remove_users(&mut self, inst: InstId) {
        while let Some(user) = self.insts[inst.index()].users.first().copied() {
            self.remove_input(user.inst, user.index);
        }
    }

    fn remove_user_entry(&mut self, producer: InstId, consumer: InstId, index: usize) {
        let users = &mut self.insts[producer.index()].users;
        if let Some(position) = users
            .iter()
            .position(|u| u.inst == consumer && u.index == index)
        {
            users.swap_remove(position);
        }
    }

    // ------------------------------------------------------------------------------------
    // Constants and parameters
    // ------------------------------------------------------------------------------------

    /// Returns the interned constant for `value`, creating it in the start block on first
    /// use.
    pub fn find_or_create_constant(&mut self, value: ConstValue) -> InstId {
        if let Some(&id) = self.constants.get(&value) {
            return id;
        }
        let id = self.create_inst(
            Opcode::Constant,
            Some(value.data_type()),
            None,
            InstData::Constant(value),
        );
        self.append_inst(self.start, id);
        self.constants.insert(value, id);
        log::debug!("create constant {id} = {value} ({})", value.data_type());
        id
    }

    /// Interned integer constant. Integer literals of every width are stored as `Int64`.
    pub fn find_or_create_int(&mut self, value: i64) -> InstId {
        self.find_or_create_constant(ConstValue::Int64(value))
    }

    /// Interned `Float32` constant.
    pub fn find_or_create_f32(&mut self, value: f32) -> InstId {
        self.find_or_create_constant(ConstValue::from_f32(value))
    }

    /// Interned `Float64` constant.
    pub fn find_or_create_f64(&mut self, value: f64) -> InstId {
        self.find_or_create_constant(ConstValue::from_f64(value))
    }

    /// Looks up an existing constant.
    #[must_use]
    pub fn find_constant(&self, value: ConstValue) -> Option<InstId> {
        self.constants.get(&value).copied()
    }

    /// The null reference of this graph.
    pub fn null_ptr(&mut self) -> InstId {
        if let Some(id) = self.null_ptr {
            return id;
        }
        let id = self.create_inst(
            Opcode::NullPtr,
            Some(DataType::Reference),
            None,
            InstData::None,
        );
        self.append_inst(self.start, id);
        self.null_ptr = Some(id);
        id
    }

    /// Creates the `Parameter` for argument `arg_number` in the start block.
    pub fn add_parameter(&mut self, arg_number: usize, ty: DataType) -> InstId {
        let id = self.create_inst(
            Opcode::Parameter,
            Some(ty),
            None,
            InstData::Parameter { arg_number },
        );
        self.append_inst(self.start, id);
        self.parameters.push(id);
        id
    }

    /// Parameters in argument order.
    #[must_use]
    pub fn parameters(&self) -> &[InstId] {
        &self.parameters
    }

    // ------------------------------------------------------------------------------------
    // Exceptions
    // ------------------------------------------------------------------------------------

    /// Records that `inst` may throw into the handler starting at `catch_block`.
    pub fn append_throwable_inst(&mut self, inst: InstId, catch_block: NodeId) {
        let handlers = self.throwables.entry(inst).or_default();
        if !handlers.contains(&catch_block) {
            handlers.push(catch_block);
        }
    }

    /// Catch-begin blocks `inst` may throw into.
    #[must_use]
    pub fn throwable_handlers(&self, inst: InstId) -> &[NodeId] {
        self.throwables.get(&inst).map_or(&[], Vec::as_slice)
    }

    // ------------------------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------------------------

    /// Computes block order, dominators and loops, inserting loop pre-headers where a
    /// reducible loop has none.
    pub fn analyze(&mut self) {
        self.compute_analyses();
        if self.insert_preheaders() {
            self.compute_analyses();
        }
    }

    fn compute_analyses(&mut self) {
        self.rpo = reverse_postorder(&*self, self.start);
        let dominators = compute_dominators_rooted(&*self);
        self.loops = detect_loops(&*self, &dominators);
        self.dominators = Some(dominators);
    }

    fn insert_preheaders(&mut self) -> bool {
        let candidates: Vec<(NodeId, Vec<NodeId>)> = self
            .loops
            .iter()
            .filter(|l| !l.irreducible)
            .map(|l| {
                let outside = self.blocks[l.header.index()]
                    .preds
                    .iter()
                    .copied()
                    .filter(|p| !l.contains(*p))
                    .collect();
                (l.header, outside)
            })
            .collect();

        let mut changed = false;
        for (header, outside) in candidates {
            if outside.is_empty() || self.is_suitable_preheader(&outside) {
                continue;
            }
            self.create_preheader(header, &outside);
            changed = true;
        }
        changed
    }

    fn is_suitable_preheader(&self, outside: &[NodeId]) -> bool {
        let [pred] = outside else {
            return false;
        };
        let block = &self.blocks[pred.index()];
        block.succs.len() == 1
            && !block.is_start()
            && !block.is_try_begin()
            && !block.is_catch_begin()
    }

    fn create_preheader(&mut self, header: NodeId, outside: &[NodeId]) {
        let guest_pc = self.blocks[header.index()].guest_pc;
        let preheader = self.create_block(guest_pc);
        self.blocks[preheader.index()].flags |= BlockFlags::LOOP_PREHEADER;
        self.blocks[preheader.index()].try_id = self.blocks[header.index()].try_id;
        if self.blocks[header.index()].is_try() {
            self.blocks[preheader.index()].flags |= BlockFlags::TRY;
        }

        for &pred in outside {
            for succ in &mut self.blocks[pred.index()].succs {
                if *succ == header {
                    *succ = preheader;
                }
            }
        }

        let old_preds = std::mem::take(&mut self.blocks[header.index()].preds);
        let mut new_preds = Vec::with_capacity(old_preds.len());
        for pred in old_preds {
            if outside.contains(&pred) {
                self.blocks[preheader.index()].preds.push(pred);
                if !new_preds.contains(&preheader) {
                    new_preds.push(preheader);
                }
            } else {
                new_preds.push(pred);
            }
        }
        self.blocks[header.index()].preds = new_preds;
        self.blocks[preheader.index()].succs.push(header);
        log::debug!("created pre-header {preheader} for loop {header}");
    }

    /// Dominator tree from the last [`Graph::analyze`].
    #[must_use]
    pub fn dominators(&self) -> Option<&DominatorTree> {
        self.dominators.as_ref()
    }

    /// Returns true if block `a` dominates block `b`.
    #[must_use]
    pub fn block_dominates(&self, a: NodeId, b: NodeId) -> bool {
        self.dominators
            .as_ref()
            .is_some_and(|tree| tree.dominates(a, b))
    }

    /// Returns true if instruction `a` is defined before `b` on every path reaching `b`.
    ///
    /// Within one block this is program order, with phis preceding everything else.
    #[must_use]
    pub fn inst_dominates(&self, a: InstId, b: InstId) -> bool {
        let (Some(block_a), Some(block_b)) = (self.inst(a).block, self.inst(b).block) else {
            return false;
        };
        if block_a != block_b {
            return self.block_dominates(block_a, block_b);
        }
        let block = &self.blocks[block_a.index()];
        let position = |id: InstId| block.all_insts().position(|i| i == id);
        matches!((position(a), position(b)), (Some(pa), Some(pb)) if pa <= pb)
    }

    /// Loop forest from the last [`Graph::analyze`].
    #[must_use]
    pub fn loops(&self) -> &LoopForest {
        &self.loops
    }

    /// The loop headed by `block`, if any.
    #[must_use]
    pub fn loop_of_header(&self, block: NodeId) -> Option<&LoopInfo> {
        self.loops.loop_for_header(block)
    }

    /// Returns true if `block` is the header of a reducible loop.
    #[must_use]
    pub fn is_reducible_loop_header(&self, block: NodeId) -> bool {
        self.loop_of_header(block).is_some_and(|l| !l.irreducible)
    }
}

impl GraphBase for Graph {
    fn node_count(&self) -> usize {
        self.blocks.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.blocks.len()).map(NodeId::new)
    }
}

impl Successors for Graph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.blocks[node.index()].succs.iter().copied()
    }
}

impl Predecessors for Graph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.blocks[node.index()].preds.iter().copied()
    }
}

impl RootedGraph for Graph {
    fn entry(&self) -> NodeId {
        self.start
    }
}
