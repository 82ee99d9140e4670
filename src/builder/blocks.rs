//! Control flow graph construction from method bytecode.
//!
//! Blocks are created at every leader offset: the method entry, jump targets, the
//! instruction after a conditional jump, try range boundaries and handler entries. Edges
//! follow straight-line fall-through and jumps; returns and throws flow into the end block.
//!
//! Exception flow is modelled with two kinds of auxiliary blocks:
//!
//! - a **try-begin** block in front of every protected range that contains a throwing
//!   instruction, with edges into the catch-begin blocks of its handlers
//! - a **catch-begin** block in front of every handler entry, holding the catch-phis
//!
//! Try ranges with identical bounds share one try-begin block, and handlers entered at the
//! same offset share one catch-begin block.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    bytecode::MethodCode,
    ir::{BlockFlags, Graph},
    utils::graph::{algorithms::reverse_postorder, NodeId},
    Result,
};

/// A protected range after merging try blocks with identical bounds.
#[derive(Debug, Clone)]
pub(crate) struct TryRegion {
    /// Index of the first try block with these bounds
    pub index: usize,
    /// First protected offset
    pub start_pc: u32,
    /// Offset right after the last protected instruction
    pub end_pc: u32,
    /// Handler entry offsets in declaration order, without duplicates
    handler_pcs: Vec<u32>,
    /// The try-begin block, `None` when nothing in the range can throw
    pub begin: Option<NodeId>,
    /// Catch-begin blocks of the handlers
    pub handlers: Vec<NodeId>,
}

impl TryRegion {
    fn contains(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }
}

/// Mapping between bytecode offsets and the blocks built for them.
#[derive(Debug, Default)]
pub(crate) struct BlockMap {
    blocks: FxHashMap<u32, NodeId>,
    regions: Vec<TryRegion>,
}

impl BlockMap {
    /// Block starting at leader offset `pc`.
    pub fn block_at(&self, pc: u32) -> Option<NodeId> {
        self.blocks.get(&pc).copied()
    }

    /// Returns true if a block starts at `pc`.
    pub fn is_leader(&self, pc: u32) -> bool {
        self.blocks.contains_key(&pc)
    }

    /// Connected protected ranges.
    pub fn regions(&self) -> impl Iterator<Item = &TryRegion> {
        self.regions.iter().filter(|region| region.begin.is_some())
    }

    /// Catch-begin blocks of every connected try range covering `pc`.
    pub fn handlers_at(&self, pc: u32) -> Vec<NodeId> {
        let mut handlers = Vec::new();
        for region in self.regions().filter(|region| region.contains(pc)) {
            for &handler in &region.handlers {
                if !handlers.contains(&handler) {
                    handlers.push(handler);
                }
            }
        }
        handlers
    }
}

/// Builds the blocks and edges of a graph from bytecode.
pub(crate) struct BlockBuilder<'a> {
    graph: &'a mut Graph,
    code: &'a MethodCode,
    blocks: FxHashMap<u32, NodeId>,
    regions: Vec<TryRegion>,
}

impl<'a> BlockBuilder<'a> {
    pub fn new(graph: &'a mut Graph, code: &'a MethodCode) -> Self {
        BlockBuilder {
            graph,
            code,
            blocks: FxHashMap::default(),
            regions: Vec::new(),
        }
    }

    /// Creates and connects all blocks.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for empty methods and methods whose last
    /// instruction falls through past the end of the bytecode.
    pub fn build(mut self) -> Result<BlockMap> {
        if self.code.instructions().is_empty() {
            return Err(malformed_error!("method has no instructions"));
        }

        self.create_blocks();
        self.connect_blocks()?;
        self.collect_try_regions();

        let start = self.graph.start_block();
        let normal_flow: FxHashSet<NodeId> =
            reverse_postorder(&*self.graph, start).into_iter().collect();

        self.connect_try_catch_blocks();
        self.remove_unreachable_blocks();
        self.mark_catch_blocks(&normal_flow);
        self.mark_try_blocks();

        log::debug!(
            "created {} blocks, {} try regions",
            self.blocks.len(),
            self.regions.iter().filter(|r| r.begin.is_some()).count()
        );
        Ok(BlockMap {
            blocks: self.blocks,
            regions: self.regions,
        })
    }

    fn create_blocks(&mut self) {
        let size = self.code.size();
        let mut leaders = BTreeSet::new();
        leaders.insert(0);

        for inst in self.code.instructions() {
            if let Some(target) = inst.jump_target() {
                leaders.insert(target);
                if inst.opcode.is_conditional() && inst.next_pc() < size {
                    leaders.insert(inst.next_pc());
                }
            }
        }
        for try_block in self.code.try_blocks() {
            leaders.insert(try_block.start_pc);
            if try_block.end_pc < size {
                leaders.insert(try_block.end_pc);
            }
            leaders.extend(try_block.catches.iter().map(|catch| catch.handler_pc));
        }

        let leaders: Vec<u32> = leaders.into_iter().collect();
        for (position, &pc) in leaders.iter().enumerate() {
            let block = self.graph.create_block(Some(pc));
            self.graph.block_mut(block).bytecode_end =
                Some(leaders.get(position + 1).copied().unwrap_or(size));
            self.blocks.insert(pc, block);
        }
    }

    fn leader(&self, pc: u32) -> Result<NodeId> {
        self.blocks
            .get(&pc)
            .copied()
            .ok_or_else(|| malformed_error!("no block starts at {:#x}", pc))
    }

    fn connect_blocks(&mut self) -> Result<()> {
        let handler_pcs: FxHashSet<u32> = self
            .code
            .try_blocks()
            .iter()
            .flat_map(|try_block| try_block.catches.iter().map(|catch| catch.handler_pc))
            .collect();

        let start = self.graph.start_block();
        let end = self.graph.end_block();
        let mut current = self.leader(0)?;
        self.graph.add_edge(start, current);

        let code = self.code;
        let mut dead = false;
        let mut fallthrough = false;
        for inst in code.instructions() {
            if fallthrough {
                let next = self.leader(inst.pc)?;
                self.graph.add_edge(current, next);
                current = next;
                fallthrough = false;
            } else if let Some(&block) = self.blocks.get(&inst.pc) {
                if block != current && !dead && !handler_pcs.contains(&inst.pc) {
                    self.graph.add_edge(current, block);
                }
                current = block;
                dead = false;
            } else if dead {
                continue;
            }

            let opcode = inst.opcode;
            if opcode.is_terminator() && !opcode.is_jump() {
                self.graph.add_edge(current, end);
                dead = true;
            } else if opcode.is_jump() {
                let target = inst
                    .jump_target()
                    .ok_or_else(|| malformed_error!("jump without target at {:#x}", inst.pc))?;
                let target = self.leader(target)?;
                self.graph.add_edge(current, target);
                if opcode.is_conditional() {
                    fallthrough = true;
                } else {
                    dead = true;
                }
            }
        }

        if fallthrough || !dead {
            return Err(malformed_error!(
                "execution falls through the end of the method at {:#x}",
                self.code.size()
            ));
        }
        Ok(())
    }

    fn collect_try_regions(&mut self) {
        let mut regions: Vec<TryRegion> = Vec::new();
        for (index, try_block) in self.code.try_blocks().iter().enumerate() {
            let region = match regions
                .iter_mut()
                .find(|r| r.start_pc == try_block.start_pc && r.end_pc == try_block.end_pc)
            {
                Some(region) => region,
                None => {
                    regions.push(TryRegion {
                        index,
                        start_pc: try_block.start_pc,
                        end_pc: try_block.end_pc,
                        handler_pcs: Vec::new(),
                        begin: None,
                        handlers: Vec::new(),
                    });
                    let last = regions.len() - 1;
                    &mut regions[last]
                }
            };
            for catch in &try_block.catches {
                if !region.handler_pcs.contains(&catch.handler_pc) {
                    region.handler_pcs.push(catch.handler_pc);
                }
            }
        }
        // Outer ranges first, so nested try-begin blocks end up inside the outer ones
        regions.sort_by(|a, b| a.start_pc.cmp(&b.start_pc).then(b.end_pc.cmp(&a.end_pc)));
        self.regions = regions;
    }

    fn connect_try_catch_blocks(&mut self) {
        let mut catch_begins: FxHashMap<u32, NodeId> = FxHashMap::default();

        for position in 0..self.regions.len() {
            let (start_pc, end_pc, index) = {
                let region = &self.regions[position];
                (region.start_pc, region.end_pc, region.index)
            };
            let can_throw = self
                .code
                .instructions()
                .iter()
                .any(|inst| start_pc <= inst.pc && inst.pc < end_pc && inst.opcode.can_throw());
            if !can_throw {
                log::debug!("try block {index} cannot throw, not connected");
                continue;
            }
            let Some(&first) = self.blocks.get(&start_pc) else {
                continue;
            };

            let try_begin = self.graph.create_block(Some(start_pc));
            {
                let block = self.graph.block_mut(try_begin);
                block.flags |= BlockFlags::TRY_BEGIN;
                block.try_id = Some(index);
            }
            self.insert_block_before(first, try_begin);

            let handler_pcs = self.regions[position].handler_pcs.clone();
            let mut handlers = Vec::with_capacity(handler_pcs.len());
            for handler_pc in handler_pcs {
                let catch_begin = if let Some(&block) = catch_begins.get(&handler_pc) {
                    block
                } else {
                    let block = self.graph.create_block(Some(handler_pc));
                    self.graph.block_mut(block).flags |= BlockFlags::CATCH_BEGIN | BlockFlags::CATCH;
                    if let Some(&entry) = self.blocks.get(&handler_pc) {
                        self.graph.add_edge(block, entry);
                    }
                    catch_begins.insert(handler_pc, block);
                    block
                };
                if !self.graph.block(try_begin).succs().contains(&catch_begin) {
                    self.graph.add_edge(try_begin, catch_begin);
                }
                handlers.push(catch_begin);
            }

            let region = &mut self.regions[position];
            region.begin = Some(try_begin);
            region.handlers = handlers;
        }
    }

    /// Places `new` on every incoming edge of `block`.
    fn insert_block_before(&mut self, block: NodeId, new: NodeId) {
        let preds = std::mem::take(&mut self.graph.block_mut(block).preds);
        for &pred in &preds {
            for succ in &mut self.graph.block_mut(pred).succs {
                if *succ == block {
                    *succ = new;
                }
            }
        }
        self.graph.block_mut(new).preds = preds;
        self.graph.add_edge(new, block);
    }

    fn remove_unreachable_blocks(&mut self) {
        let start = self.graph.start_block();
        let end = self.graph.end_block();
        let reachable: FxHashSet<NodeId> =
            reverse_postorder(&*self.graph, start).into_iter().collect();

        let unreachable: Vec<NodeId> = self
            .graph
            .blocks()
            .map(|block| block.id())
            .filter(|id| *id != start && *id != end && !reachable.contains(id))
            .collect();
        for block in unreachable {
            log::debug!("removing unreachable block {block}");
            self.graph.detach_block(block);
        }
    }

    fn mark_catch_blocks(&mut self, normal_flow: &FxHashSet<NodeId>) {
        let start = self.graph.start_block();
        let order = reverse_postorder(&*self.graph, start);

        for &id in &order {
            let block = self.graph.block(id);
            if !normal_flow.contains(&id) && !block.is_try_begin() && !block.is_catch_begin() {
                self.graph.block_mut(id).flags |= BlockFlags::CATCH;
            }
        }
        for &id in &order {
            let block = self.graph.block(id);
            if block.is_try_begin() {
                if let Some(&first) = block.succs().first() {
                    if self.graph.block(first).is_catch() {
                        self.graph.block_mut(id).flags |= BlockFlags::CATCH;
                    }
                }
            }
        }
    }

    /// Inner ranges are visited after the outer ones and win.
    fn mark_try_blocks(&mut self) {
        for region in self.regions.iter().filter(|r| r.begin.is_some()) {
            for (&pc, &block) in &self.blocks {
                if region.contains(pc) {
                    let block = self.graph.block_mut(block);
                    block.flags |= BlockFlags::TRY;
                    block.try_id = Some(region.index);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{MethodAssembler, Opcode},
        ir::GraphMode,
        runtime::MethodPtr,
        Error,
    };

    fn graph() -> Graph {
        Graph::new(MethodPtr::new(0), GraphMode::default())
    }

    #[test]
    fn test_diamond_blocks() {
        let code = MethodAssembler::new()
            .ldai(0)
            .jump(Opcode::Jeqz, &[], "else")
            .movi(0, 5)
            .jmp("merge")
            .label("else")
            .movi(0, 7)
            .label("merge")
            .lda(0)
            .ret()
            .finish()
            .unwrap();
        let pcs: Vec<u32> = code.instructions().iter().map(|inst| inst.pc).collect();

        let mut graph = graph();
        let map = BlockBuilder::new(&mut graph, &code).build().unwrap();

        let entry = map.block_at(0).unwrap();
        let then_block = map.block_at(pcs[2]).unwrap();
        let else_block = map.block_at(pcs[4]).unwrap();
        let merge = map.block_at(pcs[5]).unwrap();

        assert_eq!(graph.block(graph.start_block()).succs(), &[entry]);
        assert_eq!(graph.block(entry).succs(), &[else_block, then_block]);
        assert_eq!(graph.block(merge).preds(), &[then_block, else_block]);
        assert_eq!(graph.block(graph.end_block()).preds(), &[merge]);
        assert_eq!(graph.block(entry).bytecode_range(), Some((0, pcs[2])));
        assert!(!map.is_leader(pcs[1]));
    }

    #[test]
    fn test_unreachable_code_is_dropped() {
        let code = MethodAssembler::new()
            .ret_void()
            .label("dead")
            .movi(0, 1)
            .jmp("dead")
            .finish()
            .unwrap();
        let dead_pc = code.instructions()[1].pc;

        let mut graph = graph();
        let map = BlockBuilder::new(&mut graph, &code).build().unwrap();

        let dead = map.block_at(dead_pc).unwrap();
        assert!(graph.block(dead).is_detached());
        assert_eq!(graph.blocks().count(), 3);
    }

    #[test]
    fn test_falling_off_the_end() {
        let code = MethodAssembler::new().movi(0, 1).finish().unwrap();
        let mut graph = graph();
        let result = BlockBuilder::new(&mut graph, &code).build();
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_try_catch_blocks() {
        let code = MethodAssembler::new()
            .label("try")
            .call(3, &[])
            .label("try_end")
            .ret_void()
            .label("handler")
            .ret_void()
            .try_block("try", "try_end", &[("handler", None)])
            .finish()
            .unwrap();
        let pcs: Vec<u32> = code.instructions().iter().map(|inst| inst.pc).collect();

        let mut graph = graph();
        let map = BlockBuilder::new(&mut graph, &code).build().unwrap();

        let body = map.block_at(0).unwrap();
        let after = map.block_at(pcs[1]).unwrap();
        let handler = map.block_at(pcs[2]).unwrap();

        let try_begin = graph.block(graph.start_block()).succs()[0];
        assert!(graph.block(try_begin).is_try_begin());
        assert_eq!(graph.block(try_begin).try_id(), Some(0));
        assert!(graph.block(try_begin).is_auxiliary());

        let catch_begin = graph.block(try_begin).succs()[1];
        assert_eq!(graph.block(try_begin).succs(), &[body, catch_begin]);
        assert!(graph.block(catch_begin).is_catch_begin());
        assert_eq!(graph.block(catch_begin).succs(), &[handler]);

        assert!(graph.block(body).is_try());
        assert!(!graph.block(after).is_try());
        assert!(graph.block(handler).is_catch());
        assert!(!graph.block(body).is_catch());

        assert_eq!(map.handlers_at(0), vec![catch_begin]);
        assert!(map.handlers_at(pcs[1]).is_empty());
    }

    #[test]
    fn test_try_without_throwing_instruction() {
        let code = MethodAssembler::new()
            .label("try")
            .movi(0, 1)
            .label("try_end")
            .ret_void()
            .label("handler")
            .ret_void()
            .try_block("try", "try_end", &[("handler", None)])
            .finish()
            .unwrap();
        let handler_pc = code.instructions()[2].pc;

        let mut graph = graph();
        let map = BlockBuilder::new(&mut graph, &code).build().unwrap();

        assert!(map.handlers_at(0).is_empty());
        assert!(graph.block(map.block_at(handler_pc).unwrap()).is_detached());
        assert!(!graph.blocks().any(|block| block.is_try_begin()));
    }

    #[test]
    fn test_shared_try_ranges() {
        let code = MethodAssembler::new()
            .label("try")
            .call(3, &[])
            .label("try_end")
            .ret_void()
            .label("first")
            .ret_void()
            .label("second")
            .ret_void()
            .try_block("try", "try_end", &[("first", Some(1))])
            .try_block("try", "try_end", &[("second", Some(2)), ("first", None)])
            .finish()
            .unwrap();

        let mut graph = graph();
        let map = BlockBuilder::new(&mut graph, &code).build().unwrap();

        assert_eq!(map.regions().count(), 1);
        assert_eq!(map.handlers_at(0).len(), 2);
        assert_eq!(graph.blocks().filter(|b| b.is_try_begin()).count(), 1);
        assert_eq!(graph.blocks().filter(|b| b.is_catch_begin()).count(), 2);
    }
}
