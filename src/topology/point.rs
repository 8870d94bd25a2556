//! `CellId` / `FaceId`: strong, zero-cost handles for tree entities
//!
//! Cells and cell interfaces live in slot arenas (see [`crate::topology::arena`]).
//! Both handles wrap a nonzero `u64` so that 0 stays reserved as an invalid or
//! sentinel value, exactly like a one-based slot number: slot `i` is handle `i + 1`.
//!
//! Handles are local to one process. Anything that has to agree across ranks
//! (ghost mirroring, restart streams) goes through [`crate::topology::tree_key`]
//! instead.

use std::{fmt, num::NonZeroU64};

macro_rules! arena_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
        )]
        #[repr(transparent)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Creates a handle from a raw one-based value; `None` for 0.
            #[inline]
            pub fn new(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map(Self)
            }

            /// Handle of the arena slot `index`.
            #[inline]
            pub fn from_index(index: usize) -> Self {
                Self(NonZeroU64::MIN.saturating_add(index as u64))
            }

            /// Arena slot addressed by this handle.
            #[inline]
            pub const fn index(self) -> usize {
                (self.0.get() - 1) as usize
            }

            /// Raw one-based value.
            #[inline]
            pub const fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple($label).field(&self.get()).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $label, self.get())
            }
        }
    };
}

arena_handle!(
    /// Handle of a [`Cell`](crate::topology::cell::Cell) in a [`CellTree`](crate::amr::tree::CellTree).
    CellId,
    "CellId"
);

arena_handle!(
    /// Handle of a [`CellInterface`](crate::topology::interface::CellInterface).
    FaceId,
    "FaceId"
);


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert!(CellId::new(0).is_none());
        assert_eq!(FaceId::new(3).map(FaceId::get), Some(3));
    }

    #[test]
    fn index_round_trip() {
        for idx in [0usize, 1, 17, 4096] {
            let c = CellId::from_index(idx);
            assert_eq!(c.index(), idx);
            assert_eq!(c.get(), idx as u64 + 1);
        }
    }

    #[test]
    fn debug_and_display() {
        let c = CellId::from_index(6);
        assert_eq!(format!("{c:?}"), "CellId(7)");
        assert_eq!(format!("{c}"), "CellId#7");
    }

    #[test]
    fn json_roundtrip() {
        let f = FaceId::from_index(122);
        let s = serde_json::to_string(&f).unwrap();
        let back: FaceId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, f);
    }
}
