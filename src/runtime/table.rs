//! A table-driven [`RuntimeInterface`].

use rustc_hash::FxHashMap;

use crate::{
    ir::DataType,
    runtime::{
        ClassPtr, FieldPtr, IntrinsicId, LiteralArray, MethodPtr, ResolvedField,
        RuntimeInterface, UnresolvedTypes,
    },
};

/// Description of a method known to a [`StaticRuntime`].
///
/// # Examples
///
/// ```rust
/// use irscope::{ir::DataType, runtime::MethodDesc};
///
/// let getter = MethodDesc::new("Point.getX", &[], DataType::Int32)
///     .instance()
///     .class(3)
///     .registers(1);
/// assert!(!getter.is_static);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDesc {
    /// Printable name
    pub name: String,
    /// Type id of the declaring class
    pub class_id: u32,
    /// Static method
    pub is_static: bool,
    /// Declared argument types, `this` excluded
    pub args: Vec<DataType>,
    /// Return type
    pub ret: DataType,
    /// Register count, arguments excluded
    pub registers: usize,
    /// Whether calls to this method resolve at compile time
    pub resolved: bool,
    /// Declared by an interface
    pub interface: bool,
    /// Maps to an intrinsic
    pub intrinsic: Option<IntrinsicId>,
    /// Belongs to a dynamic language
    pub dynamic: bool,
}

impl MethodDesc {
    /// A resolved static method of class 0 with no registers.
    #[must_use]
    pub fn new(name: &str, args: &[DataType], ret: DataType) -> Self {
        MethodDesc {
            name: name.to_string(),
            class_id: 0,
            is_static: true,
            args: args.to_vec(),
            ret,
            registers: 0,
            resolved: true,
            interface: false,
            intrinsic: None,
            dynamic: false,
        }
    }

    /// Makes the method an instance method with an implicit `this`.
    #[must_use]
    pub fn instance(mut self) -> Self {
        self.is_static = false;
        self
    }

    /// Sets the declaring class.
    #[must_use]
    pub fn class(mut self, class_id: u32) -> Self {
        self.class_id = class_id;
        self
    }

    /// Sets the register count.
    #[must_use]
    pub fn registers(mut self, registers: usize) -> Self {
        self.registers = registers;
        self
    }

    /// Makes calls to the method unresolvable at compile time.
    #[must_use]
    pub fn unresolved(mut self) -> Self {
        self.resolved = false;
        self
    }

    /// Marks the method as declared by an interface.
    #[must_use]
    pub fn interface(mut self) -> Self {
        self.interface = true;
        self
    }

    /// Maps the method to an intrinsic.
    #[must_use]
    pub fn intrinsic(mut self, id: IntrinsicId) -> Self {
        self.intrinsic = Some(id);
        self
    }

    /// Marks the method as belonging to a dynamic language.
    #[must_use]
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }
}

/// Description of a field known to a [`StaticRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    /// Field type
    pub ty: DataType,
    /// Type id of the declaring class
    pub class_id: u32,
    /// Whether accesses resolve at compile time
    pub resolved: bool,
    /// Volatile field
    pub volatile: bool,
}

impl FieldDesc {
    /// A resolved, non-volatile field.
    #[must_use]
    pub const fn new(ty: DataType, class_id: u32) -> Self {
        FieldDesc {
            ty,
            class_id,
            resolved: true,
            volatile: false,
        }
    }

    /// Makes accesses unresolvable at compile time.
    #[must_use]
    pub const fn unresolved(mut self) -> Self {
        self.resolved = false;
        self
    }

    /// Makes the field volatile.
    #[must_use]
    pub const fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }
}

/// A [`RuntimeInterface`] answering from tables filled before compilation.
///
/// Method, field, type and literal array ids are global rather than relative to the
/// caller. Unknown methods behave like unresolved static `void` methods without
/// arguments, unknown fields like unresolved `i32` fields and unknown classes are
/// unresolved.
#[derive(Debug, Default)]
pub struct StaticRuntime {
    methods: Vec<MethodDesc>,
    method_ids: FxHashMap<u32, usize>,
    fields: FxHashMap<u32, FieldDesc>,
    classes: FxHashMap<u32, bool>,
    array_components: FxHashMap<u32, DataType>,
    literal_arrays: FxHashMap<u32, LiteralArray>,
    compressed_strings: bool,
    unresolved: UnresolvedTypes,
}

impl StaticRuntime {
    /// Creates an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method reachable through `method_id` and returns its handle.
    pub fn add_method(&mut self, method_id: u32, desc: MethodDesc) -> MethodPtr {
        let index = self.methods.len();
        self.methods.push(desc);
        self.method_ids.insert(method_id, index);
        MethodPtr::new(index as u64)
    }

    /// Adds a field.
    pub fn add_field(&mut self, field_id: u32, desc: FieldDesc) {
        self.fields.insert(field_id, desc);
    }

    /// Adds a class, resolvable or not.
    pub fn add_class(&mut self, type_id: u32, resolved: bool) {
        self.classes.insert(type_id, resolved);
    }

    /// Adds an array class with its component type.
    pub fn add_array_class(&mut self, type_id: u32, component: DataType, resolved: bool) {
        self.classes.insert(type_id, resolved);
        self.array_components.insert(type_id, component);
    }

    /// Adds a literal array.
    pub fn add_literal_array(&mut self, id: u32, array: LiteralArray) {
        self.literal_arrays.insert(id, array);
    }

    /// Enables compressed strings.
    pub fn set_compressed_strings(&mut self, enabled: bool) {
        self.compressed_strings = enabled;
    }

    fn desc(&self, method: MethodPtr) -> Option<&MethodDesc> {
        usize::try_from(method.raw())
            .ok()
            .and_then(|index| self.methods.get(index))
    }

    fn desc_by_id(&self, method_id: u32) -> Option<&MethodDesc> {
        self.method_ids
            .get(&method_id)
            .and_then(|&index| self.methods.get(index))
    }
}

impl RuntimeInterface for StaticRuntime {
    fn method_name(&self, method: MethodPtr) -> String {
        self.desc(method)
            .map_or_else(|| method.to_string(), |desc| desc.name.clone())
    }

    fn registers_count(&self, method: MethodPtr) -> usize {
        self.desc(method).map_or(0, |desc| desc.registers)
    }

    fn arguments_count(&self, method: MethodPtr) -> usize {
        self.desc(method)
            .map_or(0, |desc| desc.args.len() + usize::from(!desc.is_static))
    }

    fn argument_type(&self, method: MethodPtr, index: usize) -> DataType {
        let Some(desc) = self.desc(method) else {
            return DataType::Any;
        };
        if desc.dynamic {
            return DataType::Any;
        }
        match (desc.is_static, index) {
            (false, 0) => DataType::Reference,
            (false, i) => desc.args.get(i - 1).copied().unwrap_or(DataType::Any),
            (true, i) => desc.args.get(i).copied().unwrap_or(DataType::Any),
        }
    }

    fn return_type(&self, method: MethodPtr) -> DataType {
        self.desc(method).map_or(DataType::Void, |desc| desc.ret)
    }

    fn is_method_static(&self, method: MethodPtr) -> bool {
        self.desc(method).is_none_or(|desc| desc.is_static)
    }

    fn is_dynamic_method(&self, method: MethodPtr) -> bool {
        self.desc(method).is_some_and(|desc| desc.dynamic)
    }

    fn class_id_of_method(&self, method: MethodPtr) -> u32 {
        self.desc(method).map_or(0, |desc| desc.class_id)
    }

    fn resolve_method(&self, _caller: MethodPtr, method_id: u32) -> Option<MethodPtr> {
        let &index = self.method_ids.get(&method_id)?;
        self.methods[index]
            .resolved
            .then(|| MethodPtr::new(index as u64))
    }

    fn is_method_static_by_id(&self, _caller: MethodPtr, method_id: u32) -> bool {
        self.desc_by_id(method_id).is_none_or(|desc| desc.is_static)
    }

    fn method_arguments_count_by_id(&self, _caller: MethodPtr, method_id: u32) -> usize {
        self.desc_by_id(method_id).map_or(0, |desc| desc.args.len())
    }

    fn method_argument_type_by_id(
        &self,
        _caller: MethodPtr,
        method_id: u32,
        index: usize,
    ) -> DataType {
        self.desc_by_id(method_id)
            .and_then(|desc| desc.args.get(index).copied())
            .unwrap_or(DataType::Any)
    }

    fn method_return_type_by_id(&self, _caller: MethodPtr, method_id: u32) -> DataType {
        self.desc_by_id(method_id)
            .map_or(DataType::Void, |desc| desc.ret)
    }

    fn class_id_of_method_id(&self, _caller: MethodPtr, method_id: u32) -> u32 {
        self.desc_by_id(method_id).map_or(0, |desc| desc.class_id)
    }

    fn is_interface_method(&self, method: MethodPtr) -> bool {
        self.desc(method).is_some_and(|desc| desc.interface)
    }

    fn intrinsic_id(&self, _caller: MethodPtr, method_id: u32) -> Option<IntrinsicId> {
        self.desc_by_id(method_id).and_then(|desc| desc.intrinsic)
    }

    fn resolve_field(
        &self,
        _caller: MethodPtr,
        field_id: u32,
        _is_static: bool,
    ) -> Option<ResolvedField> {
        let desc = self.fields.get(&field_id)?;
        desc.resolved.then_some(ResolvedField {
            field: FieldPtr::new(u64::from(field_id)),
            class: ClassPtr::new(u64::from(desc.class_id)),
            class_id: desc.class_id,
            volatile: desc.volatile,
        })
    }

    fn field_type_by_id(&self, _caller: MethodPtr, field_id: u32) -> DataType {
        self.fields
            .get(&field_id)
            .map_or(DataType::Int32, |desc| desc.ty)
    }

    fn field_class_id_by_id(&self, _caller: MethodPtr, field_id: u32) -> u32 {
        self.fields.get(&field_id).map_or(0, |desc| desc.class_id)
    }

    fn resolve_class(&self, _caller: MethodPtr, type_id: u32) -> Option<ClassPtr> {
        self.classes
            .get(&type_id)
            .copied()
            .unwrap_or(false)
            .then(|| ClassPtr::new(u64::from(type_id)))
    }

    fn array_component_type(&self, _caller: MethodPtr, type_id: u32) -> DataType {
        self.array_components
            .get(&type_id)
            .copied()
            .unwrap_or(DataType::Reference)
    }

    fn literal_array(&self, _caller: MethodPtr, id: u32) -> Option<LiteralArray> {
        self.literal_arrays.get(&id).cloned()
    }

    fn is_compressed_strings_enabled(&self) -> bool {
        self.compressed_strings
    }

    fn unresolved_types(&self) -> &UnresolvedTypes {
        &self.unresolved
    }
}
