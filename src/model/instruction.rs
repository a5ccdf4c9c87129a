//! Instruction representation and stack-effect metadata.
//!
//! The instruction model keeps only what the rewriting engine needs: the original IL
//! offset (used as the source location of diagnostics), a tagged operation, and enough
//! signature information to compute the exact stack transition of every instruction.
//! Branch targets, exception regions and encoding sizes are the concern of the external
//! loader that produced the method bodies.
//!
//! # Key Components
//!
//! - [`Instruction`] - An operation plus its original offset
//! - [`Op`] - The tagged operation: constants, calls, constructors, field access, type
//!   operands and everything else
//! - [`StackBehavior`] - Pops, pushes and net effect of one instruction
//! - [`Constant`] - Literal values pushed by `ldc.*`, `ldstr` and `ldnull`
//!
//! # Stack Contract
//!
//! Every rewrite performed by a handler must keep the net stack effect of the replaced
//! window unchanged. [`Instruction::stack_behavior`] is therefore derived from the operand
//! signature rather than stored: a `call` to a method with two parameters and a return
//! value pops three slots (including `this`) and pushes one, whatever the method is
//! called.
//!
//! # Examples
//!
//! ```rust
//! use cilshim::model::{Instruction, MethodRef, TypeRef};
//!
//! let get_size = MethodRef::new_instance(
//!     TypeRef::system("System.IntPtr"),
//!     "ToInt32",
//!     TypeRef::system("System.Int32"),
//!     vec![],
//! );
//! let call = Instruction::call(0x10, get_size);
//!
//! assert_eq!(call.stack_behavior().pops, 1);
//! assert_eq!(call.stack_behavior().pushes, 1);
//! assert_eq!(call.stack_behavior().net_effect(), 0);
//! assert_eq!(call.mnemonic(), "call");
//! ```

use std::fmt;

use crate::model::symbol::{FieldRef, MethodRef, SymbolRef, TypeRef};

/// How an instruction affects the evaluation stack.
///
/// # Examples
///
/// ```rust
/// use cilshim::model::StackBehavior;
///
/// let stfld = StackBehavior::new(2, 0);
/// assert_eq!(stfld.net_effect(), -2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u16,
    /// Number of items pushed to stack
    pub pushes: u16,
}

impl StackBehavior {
    /// Creates a stack behaviour from pop and push counts.
    #[must_use]
    pub const fn new(pops: u16, pushes: u16) -> Self {
        StackBehavior { pops, pushes }
    }

    /// Net effect on stack depth (pushes - pops).
    #[must_use]
    pub fn net_effect(&self) -> i32 {
        i32::from(self.pushes) - i32::from(self.pops)
    }
}

/// A literal value embedded in the instruction stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `ldnull`
    Null,
    /// `ldc.i4` and its short forms
    I4(i32),
    /// `ldc.i8`
    I8(i64),
    /// `ldc.r4`
    R4(f32),
    /// `ldc.r8`
    R8(f64),
    /// `ldstr`
    Str(String),
}

impl Constant {
    /// Returns the IL mnemonic that loads this constant.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Constant::Null => "ldnull",
            Constant::I4(_) => "ldc.i4",
            Constant::I8(_) => "ldc.i8",
            Constant::R4(_) => "ldc.r4",
            Constant::R8(_) => "ldc.r8",
            Constant::Str(_) => "ldstr",
        }
    }

    /// Returns the string payload of `ldstr`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::I4(value) => write!(f, "{value}"),
            Constant::I8(value) => write!(f, "{value}"),
            Constant::R4(value) => write!(f, "{value}"),
            Constant::R8(value) => write!(f, "{value}"),
            Constant::Str(value) => write!(f, "{value:?}"),
        }
    }
}

/// Instructions taking a single type operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeOp {
    /// `castclass` - pops an object, pushes the cast object
    CastClass,
    /// `isinst` - pops an object, pushes the object or null
    IsInst,
    /// `box` - pops a value, pushes an object
    Box,
    /// `unbox.any` - pops an object, pushes a value
    UnboxAny,
    /// `newarr` - pops a length, pushes an array
    NewArr,
    /// `ldtoken` - pushes a runtime handle
    LdToken,
    /// `initobj` - pops an address
    InitObj,
    /// `sizeof` - pushes a size
    SizeOf,
}

impl TypeOp {
    /// Returns the IL mnemonic.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            TypeOp::CastClass => "castclass",
            TypeOp::IsInst => "isinst",
            TypeOp::Box => "box",
            TypeOp::UnboxAny => "unbox.any",
            TypeOp::NewArr => "newarr",
            TypeOp::LdToken => "ldtoken",
            TypeOp::InitObj => "initobj",
            TypeOp::SizeOf => "sizeof",
        }
    }

    /// Returns the stack behaviour of this operation.
    #[must_use]
    pub fn stack_behavior(&self) -> StackBehavior {
        match self {
            TypeOp::CastClass
            | TypeOp::IsInst
            | TypeOp::Box
            | TypeOp::UnboxAny
            | TypeOp::NewArr => StackBehavior::new(1, 1),
            TypeOp::LdToken | TypeOp::SizeOf => StackBehavior::new(0, 1),
            TypeOp::InitObj => StackBehavior::new(1, 0),
        }
    }
}

/// Any instruction without a symbol operand, described by its mnemonic and stack shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawOp {
    /// Human-readable instruction mnemonic (e.g., "add", "ldloc.0", "ret")
    pub mnemonic: String,
    /// How this instruction affects the evaluation stack
    pub stack: StackBehavior,
}

/// The operation performed by an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Pushes a literal
    LoadConstant(Constant),
    /// `call`
    Call(MethodRef),
    /// `callvirt`
    CallVirtual(MethodRef),
    /// `newobj`
    Construct(MethodRef),
    /// `ldfld`
    LoadField(FieldRef),
    /// `stfld`
    StoreField(FieldRef),
    /// `ldsfld`
    LoadStaticField(FieldRef),
    /// `stsfld`
    StoreStaticField(FieldRef),
    /// Instructions with a type operand
    TypeToken(TypeOp, TypeRef),
    /// Everything else
    Other(RawOp),
}

impl Op {
    /// Returns how this operation affects the evaluation stack, derived from its operand.
    #[must_use]
    pub fn stack_behavior(&self) -> StackBehavior {
        match self {
            Op::LoadConstant(_) => StackBehavior::new(0, 1),
            Op::Call(method) | Op::CallVirtual(method) => {
                StackBehavior::new(method.stack_pops(), method.stack_pushes())
            }
            Op::Construct(ctor) => StackBehavior::new(ctor.parameter_slots(), 1),
            Op::LoadField(_) => StackBehavior::new(1, 1),
            Op::StoreField(_) => StackBehavior::new(2, 0),
            Op::LoadStaticField(_) => StackBehavior::new(0, 1),
            Op::StoreStaticField(_) => StackBehavior::new(1, 0),
            Op::TypeToken(op, _) => op.stack_behavior(),
            Op::Other(raw) => raw.stack,
        }
    }

    /// Returns a copy with `map` applied to every type the operand names directly: the
    /// declaring type, return, parameter, generic argument and field types, or the type
    /// token. `map` is responsible for descending into generic arguments.
    #[must_use]
    pub fn map_types(&self, map: &impl Fn(&TypeRef) -> TypeRef) -> Op {
        let method = |m: &MethodRef| MethodRef {
            declaring_type: map(&m.declaring_type),
            name: m.name.clone(),
            has_this: m.has_this,
            return_type: map(&m.return_type),
            parameters: m.parameters.iter().map(map).collect(),
            generic_arguments: m.generic_arguments.iter().map(map).collect(),
        };
        let field = |f: &FieldRef| {
            FieldRef::new(map(&f.declaring_type), f.name.clone(), map(&f.field_type))
        };

        match self {
            Op::Call(m) => Op::Call(method(m)),
            Op::CallVirtual(m) => Op::CallVirtual(method(m)),
            Op::Construct(m) => Op::Construct(method(m)),
            Op::LoadField(f) => Op::LoadField(field(f)),
            Op::StoreField(f) => Op::StoreField(field(f)),
            Op::LoadStaticField(f) => Op::LoadStaticField(field(f)),
            Op::StoreStaticField(f) => Op::StoreStaticField(field(f)),
            Op::TypeToken(kind, ty) => Op::TypeToken(*kind, map(ty)),
            Op::LoadConstant(_) | Op::Other(_) => self.clone(),
        }
    }
}

/// A single instruction of a method body.
///
/// `offset` is the IL offset the instruction had when the module was loaded. Instructions
/// inserted by a rewrite inherit the offset of the instruction they replace, so every
/// diagnostic can be traced back to a location in the original method body.
#[derive(Clone, PartialEq)]
pub struct Instruction {
    /// Original IL offset
    pub offset: u32,
    /// The operation
    pub op: Op,
}

impl Instruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(offset: u32, op: Op) -> Self {
        Instruction { offset, op }
    }

    /// `call method`
    #[must_use]
    pub fn call(offset: u32, method: MethodRef) -> Self {
        Instruction::new(offset, Op::Call(method))
    }

    /// `callvirt method`
    #[must_use]
    pub fn callvirt(offset: u32, method: MethodRef) -> Self {
        Instruction::new(offset, Op::CallVirtual(method))
    }

    /// `newobj ctor`
    #[must_use]
    pub fn newobj(offset: u32, ctor: MethodRef) -> Self {
        Instruction::new(offset, Op::Construct(ctor))
    }

    /// `ldfld field`
    #[must_use]
    pub fn ldfld(offset: u32, field: FieldRef) -> Self {
        Instruction::new(offset, Op::LoadField(field))
    }

    /// `stfld field`
    #[must_use]
    pub fn stfld(offset: u32, field: FieldRef) -> Self {
        Instruction::new(offset, Op::StoreField(field))
    }

    /// `ldsfld field`
    #[must_use]
    pub fn ldsfld(offset: u32, field: FieldRef) -> Self {
        Instruction::new(offset, Op::LoadStaticField(field))
    }

    /// `stsfld field`
    #[must_use]
    pub fn stsfld(offset: u32, field: FieldRef) -> Self {
        Instruction::new(offset, Op::StoreStaticField(field))
    }

    /// A constant load.
    #[must_use]
    pub fn constant(offset: u32, value: Constant) -> Self {
        Instruction::new(offset, Op::LoadConstant(value))
    }

    /// `ldstr value`
    #[must_use]
    pub fn ldstr(offset: u32, value: impl Into<String>) -> Self {
        Instruction::constant(offset, Constant::Str(value.into()))
    }

    /// `ldnull`
    #[must_use]
    pub fn ldnull(offset: u32) -> Self {
        Instruction::constant(offset, Constant::Null)
    }

    /// An instruction with a type operand.
    #[must_use]
    pub fn type_token(offset: u32, op: TypeOp, ty: TypeRef) -> Self {
        Instruction::new(offset, Op::TypeToken(op, ty))
    }

    /// Any other instruction, described by mnemonic and stack shape.
    #[must_use]
    pub fn other(offset: u32, mnemonic: impl Into<String>, pops: u16, pushes: u16) -> Self {
        Instruction::new(
            offset,
            Op::Other(RawOp {
                mnemonic: mnemonic.into(),
                stack: StackBehavior::new(pops, pushes),
            }),
        )
    }

    /// `ret` for a method returning a value (`returns_value`) or void.
    #[must_use]
    pub fn ret(offset: u32, returns_value: bool) -> Self {
        Instruction::other(offset, "ret", u16::from(returns_value), 0)
    }

    /// Returns a copy of this instruction with a different operation but the same offset.
    #[must_use]
    pub fn with_op(&self, op: Op) -> Self {
        Instruction::new(self.offset, op)
    }

    /// Returns the IL mnemonic.
    #[must_use]
    pub fn mnemonic(&self) -> &str {
        match &self.op {
            Op::LoadConstant(constant) => constant.mnemonic(),
            Op::Call(_) => "call",
            Op::CallVirtual(_) => "callvirt",
            Op::Construct(_) => "newobj",
            Op::LoadField(_) => "ldfld",
            Op::StoreField(_) => "stfld",
            Op::LoadStaticField(_) => "ldsfld",
            Op::StoreStaticField(_) => "stsfld",
            Op::TypeToken(op, _) => op.mnemonic(),
            Op::Other(raw) => &raw.mnemonic,
        }
    }

    /// Returns how this instruction affects the evaluation stack.
    #[must_use]
    pub fn stack_behavior(&self) -> StackBehavior {
        self.op.stack_behavior()
    }

    /// Returns the method operand of `call`, `callvirt` and `newobj`.
    #[must_use]
    pub fn method_ref(&self) -> Option<&MethodRef> {
        match &self.op {
            Op::Call(method) | Op::CallVirtual(method) | Op::Construct(method) => Some(method),
            _ => None,
        }
    }

    /// Returns the field operand of the four field access instructions.
    #[must_use]
    pub fn field_ref(&self) -> Option<&FieldRef> {
        match &self.op {
            Op::LoadField(field)
            | Op::StoreField(field)
            | Op::LoadStaticField(field)
            | Op::StoreStaticField(field) => Some(field),
            _ => None,
        }
    }

    /// Returns the constant operand of a constant load.
    #[must_use]
    pub fn constant_value(&self) -> Option<&Constant> {
        match &self.op {
            Op::LoadConstant(constant) => Some(constant),
            _ => None,
        }
    }

    /// Returns the symbol referenced by this instruction, if any.
    #[must_use]
    pub fn symbol(&self) -> Option<SymbolRef> {
        match &self.op {
            Op::Call(method) | Op::CallVirtual(method) | Op::Construct(method) => {
                Some(SymbolRef::Method(method.clone()))
            }
            Op::LoadField(field)
            | Op::StoreField(field)
            | Op::LoadStaticField(field)
            | Op::StoreStaticField(field) => Some(SymbolRef::Field(field.clone())),
            Op::TypeToken(_, ty) => Some(SymbolRef::Type(ty.clone())),
            Op::LoadConstant(_) | Op::Other(_) => None,
        }
    }

    /// Returns true for field loads (`ldfld`, `ldsfld`).
    #[must_use]
    pub fn is_field_load(&self) -> bool {
        matches!(self.op, Op::LoadField(_) | Op::LoadStaticField(_))
    }

    /// Returns true for static field access (`ldsfld`, `stsfld`).
    #[must_use]
    pub fn is_static_field_access(&self) -> bool {
        matches!(self.op, Op::LoadStaticField(_) | Op::StoreStaticField(_))
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {:<10}", self.offset, self.mnemonic())?;

        match &self.op {
            Op::LoadConstant(Constant::Null) | Op::Other(_) => {}
            Op::LoadConstant(constant) => write!(f, " {constant}")?,
            Op::Call(method) | Op::CallVirtual(method) | Op::Construct(method) => {
                write!(f, " {method}")?;
            }
            Op::LoadField(field)
            | Op::StoreField(field)
            | Op::LoadStaticField(field)
            | Op::StoreStaticField(field) => write!(f, " {field}")?,
            Op::TypeToken(_, ty) => write!(f, " {ty}")?,
        }

        // Add stack effect if non-zero
        let effect = self.stack_behavior().net_effect();
        if effect != 0 {
            write!(f, " | stack:{effect:+}")?;
        }

        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.mnemonic())?;
        match self.symbol() {
            Some(symbol) => write!(f, " {symbol}"),
            None => match self.constant_value() {
                Some(Constant::Null) | None => Ok(()),
                Some(constant) => write!(f, " {constant}"),
            },
        }
    }
}
