use slotmap::new_key_type;

new_key_type! {
    pub struct ContainerId;
    pub struct SelectionId;
    pub struct ElementKey;
}

/// Identity of a single stored element.
///
/// A handle pairs the identity of the owning container with the generational
/// key of the element inside that container's store. Handles are totally
/// ordered (container first, then key), and selections keep their handles
/// sorted by this order so that set algebra can run as linear merges.
///
/// Keys never move when the store grows, and a cleared or compacted container
/// continues under a fresh [`ContainerId`], so a handle can never silently
/// start pointing at a different element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle {
    container: ContainerId,
    key: ElementKey,
}

impl Handle {
    pub(crate) fn new(container: ContainerId, key: ElementKey) -> Self {
        Self { container, key }
    }

    /// The container that owns the addressed element.
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// The generational key of the element within its container.
    pub fn key(&self) -> ElementKey {
        self.key
    }
}
