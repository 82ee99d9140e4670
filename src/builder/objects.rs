//! Object allocation, field accesses, type checks and loads from the constant pool.
//!
//! Resolved fields are accessed directly through `LoadObject` / `StoreObject` and, for
//! static fields, through the class returned by `LoadAndInitClass`. Unresolved fields get
//! their offset (or address) from a `ResolveObjectField*` instruction reading a field slot
//! of the unresolved types table.

use crate::{
    builder::inst_builder::InstBuilder,
    bytecode::BytecodeInstruction,
    ir::{DataType, EnvSlot, InstData, InstFlags, InstId, Opcode},
    runtime::{ResolvedField, SlotKind},
    Result,
};

impl InstBuilder<'_> {
    /// `vd = new T`
    pub(crate) fn build_new_object(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        let type_id = inst.id()?;
        let save_state = self.add_save_state();
        let init = self.load_and_init_class(type_id, save_state);
        let class = self.resolve_class(type_id);
        let object = self.create(
            Opcode::NewObject,
            Some(DataType::Reference),
            InstData::Class { type_id, class },
        );
        self.graph
            .append_input(object, init, Some(DataType::Reference));
        self.graph.append_input(object, save_state, None);
        self.add_instruction(object);
        self.update_definition(inst.vreg(0)?, object);
        Ok(())
    }

    fn field_type(&self, field_id: u32, is_ref: bool) -> DataType {
        if is_ref {
            DataType::Reference
        } else {
            self.runtime.field_type_by_id(self.method, field_id)
        }
    }

    /// Field data of an access, resolved or not.
    fn field_data(field_id: u32, resolved: Option<&ResolvedField>) -> InstData {
        InstData::Field {
            field_id,
            field: resolved.map(|resolved| resolved.field),
            volatile: resolved.is_some_and(|resolved| resolved.volatile),
        }
    }

    /// Appends the runtime resolution of an unresolved field: its offset for instance
    /// fields, its address for static ones.
    fn resolve_field_slot(&mut self, opcode: Opcode, field_id: u32, save_state: InstId) -> InstId {
        let ty = if opcode == Opcode::ResolveObjectFieldStatic {
            DataType::Reference
        } else {
            DataType::Uint32
        };
        let resolve = self.create(opcode, Some(ty), Self::field_data(field_id, None));
        self.graph.append_input(resolve, save_state, None);
        self.add_instruction(resolve);
        self.add_table_slot(field_id, SlotKind::Field);
        resolve
    }

    /// `acc = vs.field`
    pub(crate) fn build_load_object(
        &mut self,
        inst: &BytecodeInstruction,
        is_ref: bool,
    ) -> Result<()> {
        let field_id = inst.id()?;
        let ty = self.field_type(field_id, is_ref);
        let object = self.get_definition(inst.vreg(0)?)?;

        let save_state = self.add_save_state();
        let checked = self.null_check(object, save_state);
        let load = match self.resolve_field(field_id, false) {
            Some(resolved) => {
                let load = self.create(
                    Opcode::LoadObject,
                    Some(ty),
                    Self::field_data(field_id, Some(&resolved)),
                );
                self.graph
                    .append_input(load, checked, Some(DataType::Reference));
                load
            }
            None => {
                let resolve =
                    self.resolve_field_slot(Opcode::ResolveObjectField, field_id, save_state);
                let load = self.create(
                    Opcode::LoadResolvedObjectField,
                    Some(ty),
                    Self::field_data(field_id, None),
                );
                self.graph
                    .append_input(load, checked, Some(DataType::Reference));
                self.graph
                    .append_input(load, resolve, Some(DataType::Uint32));
                load
            }
        };
        self.add_instruction(load);
        self.update_definition_acc(load);
        Ok(())
    }

    /// `vs.field = acc`
    pub(crate) fn build_store_object(
        &mut self,
        inst: &BytecodeInstruction,
        is_ref: bool,
    ) -> Result<()> {
        let field_id = inst.id()?;
        let ty = self.field_type(field_id, is_ref);
        let object = self.get_definition(inst.vreg(0)?)?;
        let value = self.get_definition_acc()?;

        let save_state = self.add_save_state();
        let checked = self.null_check(object, save_state);
        let store = match self.resolve_field(field_id, false) {
            Some(resolved) => {
                let store = self.create(
                    Opcode::StoreObject,
                    Some(ty),
                    Self::field_data(field_id, Some(&resolved)),
                );
                self.graph
                    .append_input(store, checked, Some(DataType::Reference));
                self.graph.append_input(store, value, Some(ty));
                store
            }
            None => {
                let resolve =
                    self.resolve_field_slot(Opcode::ResolveObjectField, field_id, save_state);
                let store = self.create(
                    Opcode::StoreResolvedObjectField,
                    Some(ty),
                    Self::field_data(field_id, None),
                );
                self.graph
                    .append_input(store, checked, Some(DataType::Reference));
                self.graph.append_input(store, value, Some(ty));
                self.graph
                    .append_input(store, resolve, Some(DataType::Uint32));
                store
            }
        };
        if ty == DataType::Reference {
            self.graph.set_inst_flags(store, InstFlags::NEEDS_BARRIER);
        }
        self.add_instruction(store);
        Ok(())
    }

    /// `LoadAndInitClass` of the class declaring a resolved static field.
    fn init_field_class(&mut self, resolved: &ResolvedField, save_state: InstId) -> InstId {
        let init = self.create(
            Opcode::LoadAndInitClass,
            Some(DataType::Reference),
            InstData::Class {
                type_id: resolved.class_id,
                class: Some(resolved.class),
            },
        );
        self.graph.append_input(init, save_state, None);
        self.add_instruction(init);
        init
    }

    /// `acc = T.field`
    pub(crate) fn build_load_static(
        &mut self,
        inst: &BytecodeInstruction,
        is_ref: bool,
    ) -> Result<()> {
        let field_id = inst.id()?;
        let ty = self.field_type(field_id, is_ref);

        let save_state = self.add_save_state();
        let load = match self.resolve_field(field_id, true) {
            Some(resolved) => {
                let init = self.init_field_class(&resolved, save_state);
                let load = self.create(
                    Opcode::LoadStatic,
                    Some(ty),
                    Self::field_data(field_id, Some(&resolved)),
                );
                self.graph
                    .append_input(load, init, Some(DataType::Reference));
                load
            }
            None => {
                let resolve =
                    self.resolve_field_slot(Opcode::ResolveObjectFieldStatic, field_id, save_state);
                let load = self.create(
                    Opcode::LoadResolvedObjectFieldStatic,
                    Some(ty),
                    Self::field_data(field_id, None),
                );
                self.graph
                    .append_input(load, resolve, Some(DataType::Reference));
                load
            }
        };
        self.add_instruction(load);
        self.update_definition_acc(load);
        Ok(())
    }

    /// `T.field = acc`
    ///
    /// Unresolved reference stores go through `UnresolvedStoreStatic`, which resolves the
    /// field and applies the barrier in the runtime.
    pub(crate) fn build_store_static(
        &mut self,
        inst: &BytecodeInstruction,
        is_ref: bool,
    ) -> Result<()> {
        let field_id = inst.id()?;
        let ty = self.field_type(field_id, is_ref);
        let value = self.get_definition_acc()?;

        let save_state = self.add_save_state();
        let store = match self.resolve_field(field_id, true) {
            Some(resolved) => {
                let init = self.init_field_class(&resolved, save_state);
                let store = self.create(
                    Opcode::StoreStatic,
                    Some(ty),
                    Self::field_data(field_id, Some(&resolved)),
                );
                self.graph
                    .append_input(store, init, Some(DataType::Reference));
                self.graph.append_input(store, value, Some(ty));
                store
            }
            None if ty == DataType::Reference => {
                let store = self.create(
                    Opcode::UnresolvedStoreStatic,
                    Some(ty),
                    Self::field_data(field_id, None),
                );
                self.graph.append_input(store, value, Some(ty));
                self.graph.append_input(store, save_state, None);
                self.add_table_slot(field_id, SlotKind::Field);
                store
            }
            None => {
                let resolve =
                    self.resolve_field_slot(Opcode::ResolveObjectFieldStatic, field_id, save_state);
                let store = self.create(
                    Opcode::StoreResolvedObjectFieldStatic,
                    Some(ty),
                    Self::field_data(field_id, None),
                );
                self.graph
                    .append_input(store, resolve, Some(DataType::Reference));
                self.graph.append_input(store, value, Some(ty));
                store
            }
        };
        if ty == DataType::Reference {
            self.graph.set_inst_flags(store, InstFlags::NEEDS_BARRIER);
        }
        self.add_instruction(store);
        Ok(())
    }

    /// `LoadClass` of `type_id`, without initialization.
    fn load_class(&mut self, type_id: u32, save_state: InstId) -> InstId {
        let class = self.resolve_class(type_id);
        if class.is_none() {
            self.add_table_slot(type_id, SlotKind::Class);
        }
        let load = self.create(
            Opcode::LoadClass,
            Some(DataType::Reference),
            InstData::Class { type_id, class },
        );
        self.graph.append_input(load, save_state, None);
        self.add_instruction(load);
        load
    }

    /// Throws unless the accumulator is null or an instance of the class.
    pub(crate) fn build_check_cast(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        let type_id = inst.id()?;
        let object = self.get_definition_acc()?;
        let save_state = self.add_save_state();
        let class = self.load_class(type_id, save_state);
        let class_ptr = self.resolve_class(type_id);

        let check = self.create(
            Opcode::CheckCast,
            Some(DataType::Void),
            InstData::Class {
                type_id,
                class: class_ptr,
            },
        );
        self.graph
            .append_input(check, object, Some(DataType::Reference));
        self.graph
            .append_input(check, class, Some(DataType::Reference));
        self.graph.append_input(check, save_state, None);
        self.add_instruction(check);
        Ok(())
    }

    /// `acc = acc instanceof T`
    pub(crate) fn build_is_instance(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        let type_id = inst.id()?;
        let object = self.get_definition_acc()?;
        let save_state = self.add_save_state();
        let class = self.load_class(type_id, save_state);
        let class_ptr = self.resolve_class(type_id);

        let test = self.create(
            Opcode::IsInstance,
            Some(DataType::Bool),
            InstData::Class {
                type_id,
                class: class_ptr,
            },
        );
        self.graph
            .append_input(test, object, Some(DataType::Reference));
        self.graph
            .append_input(test, class, Some(DataType::Reference));
        self.graph.append_input(test, save_state, None);
        self.add_instruction(test);
        self.update_definition_acc(test);
        Ok(())
    }

    /// `acc = T.class`
    pub(crate) fn build_load_type(&mut self, type_id: u32) -> Result<()> {
        let save_state = self.add_save_state();
        let class = self.resolve_class(type_id);
        let opcode = if class.is_some() {
            Opcode::LoadType
        } else {
            self.add_table_slot(type_id, SlotKind::ManagedClass);
            Opcode::UnresolvedLoadType
        };
        let load = self.create(
            opcode,
            Some(DataType::Reference),
            InstData::Class { type_id, class },
        );
        self.graph.append_input(load, save_state, None);
        self.add_instruction(load);
        self.update_definition_acc(load);
        Ok(())
    }

    /// `acc = "..."`
    ///
    /// Dynamic methods read strings from their constant pool.
    pub(crate) fn build_load_string(&mut self, id: u32) -> Result<()> {
        let load = if self.graph.mode().dynamic {
            let pool = self.get_definition(self.env_index(EnvSlot::ConstPool.index()))?;
            let load = self.create(
                Opcode::LoadFromConstantPool,
                Some(DataType::Any),
                InstData::Literal { id },
            );
            self.graph.append_input(load, pool, Some(DataType::Any));
            self.add_instruction(load);
            load
        } else {
            self.load_string(id)
        };
        self.update_definition_acc(load);
        Ok(())
    }

    pub(crate) fn load_string(&mut self, id: u32) -> InstId {
        let save_state = self.add_save_state();
        let load = self.create(
            Opcode::LoadString,
            Some(DataType::Reference),
            InstData::Literal { id },
        );
        self.graph.append_input(load, save_state, None);
        self.add_instruction(load);
        load
    }
}
