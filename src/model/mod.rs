//! The binary-module model: modules own methods, methods own linear instruction
//! sequences, and instructions reference external symbols by structured name.
//!
//! # Key Components
//!
//! - [`Module`] - One extension unit, identified by name and version
//! - [`Method`] - A mutable instruction body with balanced replacement primitives
//! - [`Instruction`] / [`Op`] - One operation and its operand
//! - [`TypeRef`], [`MethodRef`], [`FieldRef`], [`SymbolRef`] - Structural references
//!
//! # Example
//!
//! ```rust
//! use cilshim::model::{Instruction, Method, MethodRef, Module, TypeRef, Version};
//!
//! let foo = MethodRef::new_static(TypeRef::new("Host", "OldType"), "Foo", TypeRef::void(), vec![]);
//! let mut module = Module::new("Mod", Version::new(1, 0)).with_method(Method::new(
//!     "System.Void Mod.Entry::Run()",
//!     vec![Instruction::call(0, foo), Instruction::ret(5, false)],
//! ));
//!
//! let bar = MethodRef::new_static(TypeRef::new("Host", "NewType"), "Bar", TypeRef::void(), vec![]);
//! module.methods_mut()[0].replace(0, Instruction::call(0, bar)).unwrap();
//! ```

mod instruction;
mod method;
mod module;
mod symbol;

pub use instruction::{Constant, Instruction, Op, RawOp, StackBehavior, TypeOp};
pub use method::{window_effect, Method};
pub use module::{AssemblyReference, Module, Platform, Version};
pub use symbol::{FieldRef, MemberKind, MethodRef, SymbolRef, TypeRef, CONSTRUCTOR_NAME, VOID_TYPE};
pub(crate) use symbol::join_types;
