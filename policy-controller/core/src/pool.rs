use crate::subnet::{Error, Ipv4Subnet};

/// A pool of free IPv4 subnets, bucketed by prefix length.
///
/// Each bucket holds non-overlapping blocks of one size, sorted by address.
/// Requests for a size with an empty bucket are satisfied by splitting the
/// nearest larger block top-down, so the pool fragments lazily toward the
/// sizes actually in use. Freed blocks are not re-merged with their buddies.
///
/// An empty pool behaves as if every address were allocated; seeding it is
/// just `free`-ing the cluster CIDR into it.
#[derive(Debug)]
pub struct SubnetPool {
    buckets: [Vec<Ipv4Subnet>; 33],
}

// === impl SubnetPool ===

impl Default for SubnetPool {
    fn default() -> Self {
        Self {
            buckets: std::array::from_fn(|_| Vec::new()),
        }
    }
}

impl SubnetPool {
    /// Removes and returns a free block with the given prefix length.
    ///
    /// Fails with `OutOfAddresses` when no block of that size can be carved
    /// out of the remaining free space.
    pub fn alloc(&mut self, prefix: u8) -> Result<Ipv4Subnet, Error> {
        if prefix > 32 {
            return Err(Error::InvalidPrefix(prefix));
        }

        // Take the first block at the nearest level that has one, preferring
        // an exact fit.
        let mut level = prefix;
        let mut block = loop {
            if !self.buckets[level as usize].is_empty() {
                break self.buckets[level as usize].remove(0);
            }
            if level == 0 {
                return Err(Error::OutOfAddresses(prefix));
            }
            level -= 1;
        };

        // Split an oversized block down to the requested size, returning the
        // high half to the pool at each step.
        while block.prefix() < prefix {
            let (lo, hi) = block.split()?;
            self.free(hi)?;
            block = lo;
        }
        Ok(block)
    }

    /// Returns a block to the pool, keeping its bucket sorted.
    ///
    /// A block equal to one already in the pool is a double free.
    pub fn free(&mut self, subnet: Ipv4Subnet) -> Result<(), Error> {
        let bucket = &mut self.buckets[subnet.prefix() as usize];
        match bucket.binary_search(&subnet) {
            Ok(_) => Err(Error::DoubleFree(subnet)),
            Err(i) => {
                bucket.insert(i, subnet);
                Ok(())
            }
        }
    }
}
