//! Effect flags recorded on work nodes during the render phase and consumed by
//! the commit phase.

bitflags::bitflags! {
    /// Pending host mutation or lifecycle work on a single node.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u16 {
        /// Insert (or move) the node's host subtree.
        const PLACEMENT = 1 << 0;
        /// Re-apply props or text content to an existing host object.
        const UPDATE = 1 << 1;
        /// `deletions` holds previous-generation children to remove.
        const CHILD_DELETION = 1 << 2;
        /// The ref identity changed; detach the old one, attach the new one.
        const REF = 1 << 3;
        /// A passive effect cell needs to run.
        const PASSIVE = 1 << 4;
        /// A layout effect cell needs to run.
        const LAYOUT = 1 << 5;
        /// An offscreen boundary switched between visible and hidden.
        const VISIBILITY = 1 << 6;
    }
}

impl Flags {
    /// Work handled by the mutation pass.
    pub const MUTATION_MASK: Flags = Flags::PLACEMENT
        .union(Flags::UPDATE)
        .union(Flags::CHILD_DELETION)
        .union(Flags::REF)
        .union(Flags::LAYOUT)
        .union(Flags::VISIBILITY);
    /// Work handled by the layout pass.
    pub const LAYOUT_MASK: Flags = Flags::REF.union(Flags::LAYOUT);
    /// Work that requires a deferred passive flush.
    pub const PASSIVE_MASK: Flags = Flags::PASSIVE.union(Flags::CHILD_DELETION);
}

bitflags::bitflags! {
    /// Tags on an individual effect record.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct HookFlags: u8 {
        /// The effect must run in this commit.
        const HAS_EFFECT = 1 << 0;
        /// Runs after paint, in a separate task.
        const PASSIVE = 1 << 1;
        /// Runs synchronously inside commit.
        const LAYOUT = 1 << 2;
    }
}
