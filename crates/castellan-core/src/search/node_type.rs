//! Node classification for the alpha-beta search.

/// Kind of node being searched. PV nodes keep a full window and maintain a
/// principal variation; non-PV nodes run with a zero-width window. The split
/// point stores this as data so a slave can re-enter the right search shape.
/// The root itself is driven by the root-move loop and never becomes a
/// split point, so it carries no tag of its own.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeType {
    Pv,
    NonPv,
}

impl NodeType {
    #[inline(always)]
    pub const fn is_pv(self) -> bool {
        matches!(self, NodeType::Pv)
    }
}
