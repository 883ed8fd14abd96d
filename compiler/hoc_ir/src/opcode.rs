//! The opcode table.
//!
//! Every opcode is declared exactly once in the `opcodes!` invocation below,
//! together with its legacy name and its operand signature. The engine, the
//! validator and the encoder all read arity from this one table, so they
//! cannot disagree about how many words follow an opcode.
//!
//! Signature characters:
//! - `s`: symbol operand (`Inst::Sym`)
//! - `i`: integer operand (`Inst::Int`)
//! - `r`: relative offset (`Inst::Rel`), target is the operand's own position
//!   plus the offset
//! - `c`: member-dispatch cache slot (`Inst::Cache`)

use bitflags::bitflags;

/// Kind of a single operand word, decoded from a signature character.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Symbol,
    Int,
    Rel,
    Cache,
}

impl OperandKind {
    /// Decode one signature character.
    #[inline]
    pub const fn from_char(c: u8) -> Option<Self> {
        match c {
            b's' => Some(Self::Symbol),
            b'i' => Some(Self::Int),
            b'r' => Some(Self::Rel),
            b'c' => Some(Self::Cache),
            _ => None,
        }
    }

    pub const fn as_char(self) -> char {
        match self {
            Self::Symbol => 's',
            Self::Int => 'i',
            Self::Rel => 'r',
            Self::Cache => 'c',
        }
    }
}

/// Generates `Opcode` plus its name/signature lookup tables.
///
/// Discriminants are assigned in declaration order starting at zero, so
/// `Opcode::ALL[op.id()] == op` holds for every opcode.
macro_rules! opcodes {
    ($( $(#[$doc:meta])* $variant:ident = $name:literal, $sig:literal; )*) => {
        /// A bytecode operation.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum Opcode {
            $( $(#[$doc])* $variant, )*
        }

        impl Opcode {
            /// Every opcode, in id order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$variant, )* ];

            /// Legacy name of the handler, stable across builds.
            pub const fn name(self) -> &'static str {
                match self {
                    $( Opcode::$variant => $name, )*
                }
            }

            /// Operand signature string.
            pub const fn signature(self) -> &'static str {
                match self {
                    $( Opcode::$variant => $sig, )*
                }
            }
        }
    };
}

opcodes! {
    // Stack and variables
    /// Discard the top entry.
    Pop = "nopop", "";
    PushZero = "pushzero", "";
    /// Push the value of a numeric constant symbol.
    ConstPush = "constpush", "s";
    /// Push a string constant or a string variable cell.
    PushString = "hoc_push_string", "s";
    /// Push a symbol for a later `Eval`, `Assign` or loop opcode.
    VarPush = "varpush", "s";
    Eval = "eval", "";
    EvalPointer = "hoc_evalpointer", "";
    /// Operand is the compound operator (`0`, `+`, `-`, `*`, `/`).
    Assign = "assign", "i";
    AssignStr = "assstr", "";
    /// Built-in numeric function of one argument.
    Bltin = "bltin", "s";

    // Arithmetic
    Add = "add", "";
    Sub = "hoc_sub", "";
    Mul = "mul", "";
    Div = "hoc_div", "";
    Cyclic = "hoc_cyclic", "";
    Negate = "hoc_negate", "";
    Power = "hoc_power", "";

    // Comparison and logic
    Gt = "gt", "";
    Lt = "lt", "";
    Ge = "ge", "";
    Le = "le", "";
    Eq = "eq", "";
    Ne = "ne", "";
    And = "hoc_and", "";
    Or = "hoc_or", "";
    Not = "hoc_not", "";

    // Output
    Print = "print", "";
    PrExpr = "prexpr", "";
    PrStr = "prstr", "";
    Newline = "hoc_newline", "";

    // Control flow
    /// `[then, else (0 = none), next]`, condition follows inline.
    If = "ifcode", "rrr";
    /// `[body, next, increment (0 = none)]`, condition follows inline.
    For = "forcode", "rrr";
    /// `[body, next]`; symbol, begin and end are on the stack.
    ShortFor = "shortfor", "rr";
    /// `[mode, body, next]`; mode 1 includes the end points 0 and 1.
    ForSegment = "for_segment", "irr";
    Break = "hoc_Break", "";
    Continue = "hoc_Continue", "";
    /// Unwind every enclosing loop and call up to the outermost boundary.
    HardStop = "hoc_Stop", "";

    // Calls and arguments
    Call = "call", "si";
    /// `$i`; index 0 takes the index from the stack.
    Arg = "arg", "i";
    /// `[index, operator]`.
    ArgAssign = "argassign", "ii";
    StringArg = "hoc_stringarg", "i";
    ObjectArg = "hoc_objectarg", "i";
    /// `[index, subscripted]`; reads through a `$&i` pointer argument.
    ArgRef = "hoc_argref", "ii";
    /// `[index, subscripted, operator]`.
    ArgRefAssign = "hoc_argrefasgn", "iii";
    /// Push the `$&i` pointer itself.
    ArgRefArg = "hoc_argrefarg", "i";
    FuncRet = "funcret", "";
    ProcRet = "procret", "";
    ObjRet = "hocobjret", "";

    // Locals and iterators
    AutoObject = "hoc_autoobject", "s";
    /// `[iterator, argcount, statement begin, statement end]`.
    Iterator = "hoc_iterator", "sirr";
    IteratorStmt = "hoc_iterator_stmt", "";
    PushCurrentObject = "hoc_push_current_object", "";

    // Objects
    ObjectVar = "hoc_objectvar", "s";
    /// `[symbol, number of subscripts]`.
    ObjVarDecl = "hoc_objvardecl", "si";
    /// `[template, narg]`; assigns into the object cell below the arguments.
    NewObj = "hoc_newobj", "si";
    /// `[template, narg]`; leaves a temporary object.
    NewObjArg = "hoc_newobj_arg", "si";
    /// `[member, nindex, narg, cache, flags]`.
    ObjectComponent = "hoc_object_component", "siici";
    /// `[iterator member, narg, cache, statement begin, statement end]`.
    ObjectIter = "hoc_object_iterator", "sicrr";
    ObjectEval = "hoc_object_eval", "";
    ObjectAsgn = "hoc_object_asgn", "i";
    ObPointer = "hoc_ob_pointer", "";
    AsgnObjToStr = "hoc_asgn_obj_to_str", "";
    /// `T[i]`: template symbol, index on the stack.
    ConstObject = "hoc_constobject", "s";

    // Type markers
    CmpOtype = "hoc_cmp_otype", "i";
    KnownType = "hoc_known_type", "i";

    // Declarations
    DeleteSymbol = "hoc_delete_symbol", "s";
    /// Operand is the number of dimensions; symbol and sizes are on the stack.
    ArrayInstall = "hoc_arayinstal", "i";
}

impl Opcode {
    /// Stable numeric id used by the encoded form.
    #[inline]
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Opcode for an encoded id, if the id is in range.
    #[inline]
    pub fn from_id(id: u16) -> Option<Opcode> {
        Self::ALL.get(usize::from(id)).copied()
    }

    /// Number of operand words following the opcode.
    #[inline]
    pub const fn arity(self) -> usize {
        self.signature().len()
    }

    /// Operand kinds in order.
    pub fn operands(self) -> impl Iterator<Item = OperandKind> {
        self.signature()
            .bytes()
            .filter_map(OperandKind::from_char)
    }

    /// Whether the opcode is followed by inline code ending in `Stop`.
    ///
    /// `If` and `For` carry their condition directly after the operands.
    #[inline]
    pub const fn has_inline_condition(self) -> bool {
        matches!(self, Opcode::If | Opcode::For)
    }
}

bitflags! {
    /// Flags carried by `ObjectComponent`.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct ComponentFlags: u32 {
        /// The member was written with call parentheses.
        const CALL = 1 << 0;
        /// The member is the final target of an assignment.
        const LVALUE = 1 << 1;
    }
}
