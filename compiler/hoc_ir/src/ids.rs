//! Arena indices shared by the bytecode and the interpreter.
//!
//! Symbols, templates and objects all live in arenas owned by the
//! interpreter; bytecode and stack entries refer to them by `u32` index.
//! Object ids are never reused, so a stale `ObjectId` is detected by a
//! failed lookup rather than aliasing a newer object.

use std::fmt;

/// Macro to define `u32` index newtypes.
///
/// Each generated type has:
/// - `INVALID` sentinel constant (also the `Default`)
/// - `new()`, `index()`, `raw()` and `is_valid()`
/// - `Debug` showing `TypeName(n)` or `TypeName::INVALID`
macro_rules! define_id {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => { $(
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel value that never names a live entry.
            pub const INVALID: $name = $name(u32::MAX);

            #[inline]
            pub const fn new(index: u32) -> Self {
                $name(index)
            }

            /// Index into the owning arena.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", stringify!($name), self.0)
                } else {
                    write!(f, "{}::INVALID", stringify!($name))
                }
            }
        }
    )* };
}

define_id!(
    /// Index into the interpreter's symbol arena.
    SymbolId,
    /// Template (class) id. Ids start at 1 and grow with every definition.
    TemplateId,
    /// Object id. Allocated in ascending order, never reused.
    ObjectId,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_invalid() {
        assert_eq!(SymbolId::default(), SymbolId::INVALID);
        assert!(!ObjectId::default().is_valid());
    }

    #[test]
    fn index_round_trips_raw() {
        let id = TemplateId::new(7);
        assert_eq!(id.index(), 7);
        assert_eq!(id.raw(), 7);
        assert!(id.is_valid());
    }

    #[test]
    fn debug_formats_name() {
        assert_eq!(format!("{:?}", SymbolId::new(3)), "SymbolId(3)");
        assert_eq!(format!("{:?}", ObjectId::INVALID), "ObjectId::INVALID");
    }
}
