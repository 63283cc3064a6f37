//! Arena keys and handle types

use slotmap::new_key_type;

pub use slotmap::SlotMap;

new_key_type! {
    /// Stable handle of a node in a root's scene arena
    ///
    /// Keys are generational: a handle to a removed node never aliases a
    /// node created later in the same slot.
    pub struct NodeId;
}

/// Identity of one mounted root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(pub u32);

/// Identity of a pointer (mouse, pen, or one touch contact)
pub type PointerId = i32;
