//! Handle for a set of leased resources.

use poolbatch_types::{Address, HolderId, Resource};

/// Resources leased by one holder, returned by selection.
///
/// A lease must end in [`ResourcePool::consume`] once the resources are
/// spent, or [`ResourcePool::release`] if they were not. A dropped lease
/// stays locked until it expires.
///
/// [`ResourcePool::consume`]: crate::ResourcePool::consume
/// [`ResourcePool::release`]: crate::ResourcePool::release
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Lease {
    pub address: Address,
    pub holder: HolderId,
    pub resources: Vec<Resource>,
    pub total: u64,
}

impl Lease {
    pub(crate) fn new(address: Address, holder: HolderId) -> Self {
        Self {
            address,
            holder,
            resources: Vec::new(),
            total: 0,
        }
    }

    pub(crate) fn push(&mut self, resource: Resource) {
        self.total += resource.amount;
        self.resources.push(resource);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Copies of the leased resources, for use as transaction inputs.
    #[must_use]
    pub fn inputs(&self) -> Vec<Resource> {
        self.resources.clone()
    }
}
