//! The graph construction driver.
//!
//! [`IrBuilder`] checks the method against the configured limits, builds the control flow
//! graph, walks its blocks in reverse postorder through an [`InstBuilder`] and finally
//! resolves phis. Loop blocks receive the save states later passes rely on:
//!
//! - a `SaveState` at the head of every loop pre-header and post-exit block
//! - a `SaveStateOsr` at every loop header in OSR mode
//! - a `SafePoint` at every loop header when safe points are enabled
//! - a `SaveStateDeoptimize` before the jump that ends a pre-header

use crate::{
    builder::{blocks::BlockBuilder, inst_builder::InstBuilder, BuilderOptions},
    bytecode::{BytecodeFlags, MethodCode},
    ir::{BlockFlags, EnvSlot, Graph, GraphMode, InstFlags, Opcode, VirtualRegister},
    runtime::{MethodPtr, RuntimeInterface},
    utils::graph::{GraphBase, NodeId},
    Error, Result,
};

/// Largest number of try blocks a method may declare.
const TRY_BLOCKS_LIMIT: usize = 128;

/// Builds the SSA graph of one method.
///
/// # Examples
///
/// ```rust
/// use irscope::{
///     builder::IrBuilder,
///     bytecode::MethodAssembler,
///     ir::DataType,
///     runtime::{MethodDesc, StaticRuntime},
/// };
///
/// let mut runtime = StaticRuntime::new();
/// let method = runtime.add_method(0, MethodDesc::new("id", &[DataType::Int32], DataType::Int32));
/// let code = MethodAssembler::new().lda(0).ret().finish()?;
///
/// let graph = IrBuilder::new(&runtime, method, &code).build()?;
/// assert_eq!(graph.parameters().len(), 1);
/// # Ok::<(), irscope::Error>(())
/// ```
pub struct IrBuilder<'a> {
    runtime: &'a dyn RuntimeInterface,
    method: MethodPtr,
    code: &'a MethodCode,
    options: BuilderOptions,
    mode: GraphMode,
}

impl<'a> IrBuilder<'a> {
    /// Creates a builder for `method` with the default options.
    pub fn new(runtime: &'a dyn RuntimeInterface, method: MethodPtr, code: &'a MethodCode) -> Self {
        IrBuilder {
            runtime,
            method,
            code,
            options: BuilderOptions::default(),
            mode: GraphMode {
                dynamic: runtime.is_dynamic_method(method),
                ..GraphMode::default()
            },
        }
    }

    /// Replaces the builder options.
    #[must_use]
    pub fn options(mut self, options: BuilderOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the compilation mode. Dynamic methods stay dynamic.
    #[must_use]
    pub fn mode(mut self, mode: GraphMode) -> Self {
        self.mode = GraphMode {
            dynamic: self.mode.dynamic || mode.dynamic,
            ..mode
        };
        self
    }

    /// Builds the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the method exceeds a limit, if its bytecode is malformed, if a
    /// register is read before being defined, or if OSR compilation is requested for an
    /// unsupported method shape. No graph is returned in that case.
    pub fn build(self) -> Result<Graph> {
        let registers = self.runtime.registers_count(self.method);
        let arguments = self.runtime.arguments_count(self.method);
        log::info!(
            "start building ir for method: {}(args={}, regs={})",
            self.runtime.method_name(self.method),
            arguments,
            registers
        );

        let vregs = registers + arguments + 1;
        self.check_method_limitations(vregs)?;

        let mut graph = Graph::new(self.method, self.mode);
        let env_count = if self.mode.dynamic { EnvSlot::COUNT } else { 0 };
        graph.set_vregs_count(vregs + env_count, env_count);

        let blocks = BlockBuilder::new(&mut graph, self.code).build()?;
        graph.analyze();

        let mut builder = InstBuilder::new(&mut graph, self.runtime, &blocks, self.options);
        builder.prepare();
        log::info!("start instructions building...");

        let rpo = builder.graph.blocks_rpo().to_vec();
        let start = builder.graph.start_block();
        let first = builder.graph.block(start).succs().first().copied();
        for block in rpo {
            self.build_block(&mut builder, block, first == Some(block))?;
        }

        debug_assert!(!builder.has_failed());
        builder.graph.analyze();
        builder.fix_instructions();
        drop(builder);

        log::info!(
            "ir successfully built: {} basic blocks, {} instructions",
            graph.node_count(),
            graph.inst_count()
        );
        Ok(graph)
    }

    fn check_method_limitations(&self, vregs: usize) -> Result<()> {
        let limit = self.options.max_vregs_num;
        if limit > VirtualRegister::MAX_NUM_VIRT_REGS {
            log::info!(
                "big limit for virtual registers: {limit}, max value: {}",
                VirtualRegister::MAX_NUM_VIRT_REGS
            );
            return Err(Error::VRegLimitTooBig {
                limit,
                max: VirtualRegister::MAX_NUM_VIRT_REGS,
            });
        }

        let size = self.code.size() as usize;
        if size > self.options.max_bytecode_size {
            log::info!(
                "method is too big: size={size}, limit={}",
                self.options.max_bytecode_size
            );
            return Err(Error::MethodTooLarge {
                size,
                limit: self.options.max_bytecode_size,
            });
        }

        if vregs >= limit {
            log::info!("method has too many virtual registers: {vregs}, limit={limit}");
            return Err(Error::TooManyVRegs {
                count: vregs,
                limit,
            });
        }

        let tries = self.code.try_blocks().len();
        if tries > TRY_BLOCKS_LIMIT {
            log::info!("method has too many try blocks: {tries}, limit={TRY_BLOCKS_LIMIT}");
            return Err(Error::TooManyTryBlocks {
                count: tries,
                limit: TRY_BLOCKS_LIMIT,
            });
        }

        if self.mode.osr && tries > 0 {
            return Err(Error::OsrNotSupported(
                "methods with try blocks cannot be entered from loops".to_string(),
            ));
        }
        Ok(())
    }

    fn build_block(&self, builder: &mut InstBuilder<'_>, block: NodeId, first: bool) -> Result<()> {
        builder.set_current_block(block);
        builder.update_defs(block);
        if self.mode.dynamic && first {
            builder.init_env()?;
        }

        self.create_loop_save_states(builder, block)?;

        let is_preheader = !self.mode.osr && builder.graph.loops().is_preheader(block);
        match builder.graph.block(block).bytecode_range() {
            Some((start, end)) => self.build_instructions(builder, block, start, end, is_preheader),
            None => {
                if is_preheader {
                    let pc = builder.graph.block(block).guest_pc().unwrap_or_default();
                    let deopt = builder.create_save_state(Opcode::SaveStateDeoptimize, pc);
                    builder.add_instruction(deopt);
                }
                log::trace!("auxiliary block {block}, skipping");
                Ok(())
            }
        }
    }

    fn create_loop_save_states(&self, builder: &mut InstBuilder<'_>, block: NodeId) -> Result<()> {
        let graph = &*builder.graph;
        let pc = graph.block(block).guest_pc().unwrap_or_default();

        if block != graph.end_block()
            && !self.mode.osr
            && (graph.loops().is_preheader(block) || graph.loops().is_post_exit(block))
        {
            let save_state = builder.create_save_state(Opcode::SaveState, pc);
            builder.graph.set_inst_flags(save_state, InstFlags::NO_DCE);
            builder.add_instruction(save_state);
        }

        let Some(info) = builder.graph.loop_of_header(block) else {
            return Ok(());
        };
        if self.mode.osr {
            let catch_latch = info
                .latches
                .iter()
                .any(|&latch| builder.graph.block(latch).is_catch());
            if catch_latch {
                log::warn!("osr-entry for loops with catch-handler as back-edge is not supported");
                return Err(Error::OsrNotSupported(format!(
                    "loop {block} has a catch block as back edge"
                )));
            }
            builder.graph.block_mut(block).flags |= BlockFlags::OSR_ENTRY;
            let save_state = builder.create_save_state(Opcode::SaveStateOsr, pc);
            builder.graph.set_inst_flags(save_state, InstFlags::OSR_ENTRY);
            builder.add_instruction(save_state);
            log::debug!("create save state OSR: {}", builder.graph.inst(save_state));
        }

        if self.options.use_safepoint {
            let safepoint = builder.create_save_state(Opcode::SafePoint, pc);
            builder.add_instruction(safepoint);
            log::debug!("create safepoint: {}", builder.graph.inst(safepoint));
        }
        Ok(())
    }

    /// Translates the bytecode in `[start, end)`, stopping after a terminator.
    fn build_instructions(
        &self,
        builder: &mut InstBuilder<'_>,
        block: NodeId,
        start: u32,
        end: u32,
        is_preheader: bool,
    ) -> Result<()> {
        let mut deopt_built = false;
        for inst in self.code.iter_from(start).take_while(|inst| inst.pc < end) {
            log::trace!("bytecode {:#x}: {inst}", inst.pc);
            builder.begin_instruction(inst);
            let defs = builder.snapshot_defs();
            let flags = inst.flags();

            if is_preheader && flags.contains(BytecodeFlags::JUMP) {
                let deopt = builder.create_save_state(Opcode::SaveStateDeoptimize, inst.pc);
                builder.add_instruction(deopt);
                deopt_built = true;
            }

            builder.build_instruction(inst)?;

            if flags.contains(BytecodeFlags::CAN_THROW) {
                builder.process_throwables(&defs);
            }
            if flags.intersects(BytecodeFlags::RETURN | BytecodeFlags::THROW)
                || (flags.contains(BytecodeFlags::JUMP) && !flags.contains(BytecodeFlags::CONDITIONAL))
            {
                break;
            }
        }

        if is_preheader && !deopt_built {
            let pc = builder
                .graph
                .block(block)
                .succs()
                .first()
                .and_then(|&succ| builder.graph.block(succ).guest_pc())
                .unwrap_or(end);
            let deopt = builder.create_save_state(Opcode::SaveStateDeoptimize, pc);
            builder.add_instruction(deopt);
        }
        Ok(())
    }
}
