//! Textual form of graphs and instructions, used by logging and tests.
//!
//! ```text
//! BB 2 (pc 0x0) preds: [bb0, bb5] succs: [bb3]
//!     v4 = Phi.i64 r0 v1, v9 [v1<-bb0] [v9<-bb5]
//!     v7 = SaveState v4(vr0), v2(acc)
//!     v8 = Add.i32 v4, v6
//! ```

use std::fmt;

use crate::{
    ir::{Graph, Inst, InstData},
    utils::graph::NodeId,
};

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.id, self.opcode)?;
        if let Some(ty) = self.ty {
            write!(f, ".{ty}")?;
        }
        match &self.data {
            InstData::None => {}
            InstData::Constant(value) => write!(f, " {value}")?,
            InstData::Parameter { arg_number } => write!(f, " arg{arg_number}")?,
            InstData::Phi { linear_number } => write!(f, " r{linear_number}")?,
            InstData::CatchPhi { is_acc, .. } => {
                if *is_acc {
                    write!(f, " acc")?;
                }
            }
            InstData::Compare { cc, operands } => write!(f, " {cc} {operands}")?,
            InstData::IfImm { cc, operands, imm } => write!(f, " {cc} {operands} {imm:#x}")?,
            InstData::Operands(operands) => write!(f, " {operands}")?,
            InstData::Call { method_id, method } => match method {
                Some(method) => write!(f, " {method}")?,
                None => write!(f, " id{method_id}")?,
            },
            InstData::Intrinsic(id) => write!(f, " {id}")?,
            InstData::Field {
                field_id,
                field,
                volatile,
            } => {
                match field {
                    Some(field) => write!(f, " {field}")?,
                    None => write!(f, " id{field_id}")?,
                }
                if *volatile {
                    write!(f, " volatile")?;
                }
            }
            InstData::Class { type_id, class } => match class {
                Some(class) => write!(f, " {class}")?,
                None => write!(f, " id{type_id}")?,
            },
            InstData::Literal { id } => write!(f, " id{id}")?,
            InstData::ConstArray { id, size } => write!(f, " id{id}[{size}]")?,
            InstData::Monitor { entry } => {
                write!(f, " {}", if *entry { "entry" } else { "exit" })?;
            }
        }

        for (index, input) in self.inputs.iter().enumerate() {
            f.write_str(if index == 0 { " " } else { ", " })?;
            write!(f, "{}", input.inst)?;
            if let Some(vreg) = input.vreg {
                write!(f, "({vreg})")?;
            }
        }
        Ok(())
    }
}

fn write_blocks(f: &mut fmt::Formatter<'_>, blocks: &[NodeId]) -> fmt::Result {
    f.write_str("[")?;
    for (index, block) in blocks.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{block}")?;
    }
    f.write_str("]")
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Method: {}", self.method())?;
        let order: Vec<_> = if self.blocks_rpo().is_empty() {
            self.blocks().map(|block| block.id()).collect()
        } else {
            self.blocks_rpo().to_vec()
        };

        for id in order {
            let block = self.block(id);
            write!(f, "BB {}", id.index())?;
            if let Some(pc) = block.guest_pc() {
                write!(f, " (pc {pc:#x})")?;
            }
            f.write_str(" preds: ")?;
            write_blocks(f, block.preds())?;
            f.write_str(" succs: ")?;
            write_blocks(f, block.succs())?;
            if !block.flags().is_empty() {
                write!(f, " {:?}", block.flags())?;
            }
            writeln!(f)?;

            for inst in block.all_insts() {
                let inst = self.inst(inst);
                write!(f, "    {inst}")?;
                if inst.is_phi() {
                    for (input, pred) in inst.inputs().iter().zip(block.preds()) {
                        write!(f, " [{}<-{pred}]", input.inst)?;
                    }
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
