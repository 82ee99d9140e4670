//! Array allocation and element accesses.

use crate::{
    builder::inst_builder::InstBuilder,
    bytecode::BytecodeInstruction,
    ir::{DataType, InstData, InstFlags, InstId, Opcode},
    runtime::{Literal, LiteralArray},
    Result,
};

impl InstBuilder<'_> {
    /// `vd = new T[vs]`
    pub(crate) fn build_new_array(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        let type_id = inst.id()?;
        let size = self.get_definition(inst.vreg(1)?)?;
        let save_state = self.add_save_state();
        let array = self.new_array(type_id, size, save_state);
        self.update_definition(inst.vreg(0)?, array);
        Ok(())
    }

    fn new_array(&mut self, type_id: u32, size: InstId, save_state: InstId) -> InstId {
        let init = self.load_and_init_class(type_id, save_state);

        let check = self.create(Opcode::NegativeCheck, Some(DataType::Int32), InstData::None);
        self.graph.append_input(check, size, Some(DataType::Int32));
        self.graph.append_input(check, save_state, None);
        self.add_instruction(check);

        let class = self.resolve_class(type_id);
        let array = self.create(
            Opcode::NewArray,
            Some(DataType::Reference),
            InstData::Class { type_id, class },
        );
        self.graph
            .append_input(array, init, Some(DataType::Reference));
        self.graph.append_input(array, check, Some(DataType::Int32));
        self.graph.append_input(array, save_state, None);
        self.add_instruction(array);
        array
    }

    /// `acc = vs.length`
    pub(crate) fn build_len_array(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        let array = self.get_definition(inst.vreg(0)?)?;
        let save_state = self.add_save_state();
        let checked = self.null_check(array, save_state);
        let length = self.len_array(checked);
        self.update_definition_acc(length);
        Ok(())
    }

    fn len_array(&mut self, array: InstId) -> InstId {
        let length = self.create(Opcode::LenArray, Some(DataType::Int32), InstData::None);
        self.graph
            .append_input(length, array, Some(DataType::Reference));
        self.add_instruction(length);
        length
    }

    /// Null and bounds checks of an element access. Returns the checked array and index.
    fn checked_element(&mut self, array: InstId, index: InstId, save_state: InstId) -> (InstId, InstId) {
        let array = self.null_check(array, save_state);
        let length = self.len_array(array);
        let check = self.create(Opcode::BoundsCheck, Some(DataType::Int32), InstData::None);
        self.graph.append_input(check, length, Some(DataType::Int32));
        self.graph.append_input(check, index, Some(DataType::Int32));
        self.graph.append_input(check, save_state, None);
        self.add_instruction(check);
        (array, check)
    }

    /// `acc = vs[acc]`
    pub(crate) fn build_load_array(&mut self, inst: &BytecodeInstruction, ty: DataType) -> Result<()> {
        let array = self.get_definition(inst.vreg(0)?)?;
        let index = self.get_definition_acc()?;
        let save_state = self.add_save_state();
        let (array, index) = self.checked_element(array, index, save_state);

        let load = self.create(Opcode::LoadArray, Some(ty), InstData::None);
        self.graph.append_input(load, array, Some(DataType::Reference));
        self.graph.append_input(load, index, Some(DataType::Int32));
        self.add_instruction(load);
        self.update_definition_acc(load);
        Ok(())
    }

    /// `vs1[vs2] = acc`
    ///
    /// Stored references are checked against the component type of the array.
    pub(crate) fn build_store_array(&mut self, inst: &BytecodeInstruction, ty: DataType) -> Result<()> {
        let array = self.get_definition(inst.vreg(0)?)?;
        let index = self.get_definition(inst.vreg(1)?)?;
        let value = self.get_definition_acc()?;
        let save_state = self.add_save_state();
        let (array, index) = self.checked_element(array, index, save_state);

        let value = if ty == DataType::Reference {
            let check = self.create(Opcode::RefTypeCheck, Some(DataType::Reference), InstData::None);
            self.graph.append_input(check, array, Some(DataType::Reference));
            self.graph.append_input(check, value, Some(DataType::Reference));
            self.graph.append_input(check, save_state, None);
            self.add_instruction(check);
            check
        } else {
            value
        };
        self.store_array(array, index, value, ty);
        Ok(())
    }

    fn store_array(&mut self, array: InstId, index: InstId, value: InstId, ty: DataType) {
        let store = self.create(Opcode::StoreArray, Some(ty), InstData::None);
        self.graph.append_input(store, array, Some(DataType::Reference));
        self.graph.append_input(store, index, Some(DataType::Int32));
        self.graph.append_input(store, value, Some(ty));
        if ty == DataType::Reference {
            self.graph.set_inst_flags(store, InstFlags::NEEDS_BARRIER);
        }
        self.add_instruction(store);
    }

    /// `vd = literal array`
    ///
    /// Small arrays are allocated and stored element by element. Larger arrays are filled
    /// from the literal in one step, and large string arrays are loaded as a whole.
    pub(crate) fn build_load_const_array(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        let id = inst.id()?;
        let vd = inst.vreg(0)?;
        let literals = self
            .runtime
            .literal_array(self.method, id)
            .ok_or_else(|| malformed_error!("unknown literal array {} at {:#x}", id, inst.pc))?;
        let size = literals.values.len();
        let unfold = size <= self.options.unfold_const_array_max_size;

        if literals.component == DataType::Reference && !unfold {
            let save_state = self.add_save_state();
            let load = self.create(
                Opcode::LoadConstArray,
                Some(DataType::Reference),
                InstData::ConstArray { id, size },
            );
            self.graph.append_input(load, save_state, None);
            self.add_instruction(load);
            self.update_definition(vd, load);
            return Ok(());
        }

        let length = self.graph.find_or_create_int(size as i64);
        let save_state = self.add_save_state();
        let array = self.new_array(literals.type_id, length, save_state);

        if unfold {
            self.unfold_const_array(array, &literals);
        } else {
            let save_state = self.add_save_state();
            let fill = self.create(
                Opcode::FillConstArray,
                Some(literals.component),
                InstData::ConstArray { id, size },
            );
            self.graph
                .append_input(fill, array, Some(DataType::Reference));
            self.graph.append_input(fill, save_state, None);
            self.add_instruction(fill);
        }
        self.update_definition(vd, array);
        Ok(())
    }

    fn unfold_const_array(&mut self, array: InstId, literals: &LiteralArray) {
        for (index, literal) in literals.values.iter().enumerate() {
            let value = match *literal {
                Literal::Int(value) => self.graph.find_or_create_int(value),
                Literal::Float32(value) => self.graph.find_or_create_f32(value),
                Literal::Float64(value) => self.graph.find_or_create_f64(value),
                Literal::String(id) => self.load_string(id),
            };
            let index = self.graph.find_or_create_int(index as i64);
            self.store_array(array, index, value, literals.component);
        }
    }
}
