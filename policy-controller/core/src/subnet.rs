use std::{cmp::Ordering, fmt, net::Ipv4Addr, str::FromStr};
use thiserror::Error;

#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid CIDR prefix /{0}")]
    InvalidPrefix(u8),

    #[error("invalid subnet syntax; expected `a.b.c.d/m`")]
    InvalidSubnet,

    #[error("cannot split a /32 subnet")]
    SplitHost,

    #[error("subnets {0} and {1} are not buddies")]
    NotBuddies(Ipv4Subnet, Ipv4Subnet),

    #[error("no free /{0} subnet available")]
    OutOfAddresses(u8),

    #[error("double free of {0}")]
    DoubleFree(Ipv4Subnet),
}

/// An IPv4 network in CIDR form.
///
/// Host bits are cleared on construction, so two subnets are equal exactly
/// when they describe the same block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ipv4Subnet {
    addr: Ipv4Addr,
    prefix: u8,
}

// === impl Ipv4Subnet ===

impl Ipv4Subnet {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, Error> {
        if prefix > 32 {
            return Err(Error::InvalidPrefix(prefix));
        }
        let network = u32::from(addr) & mask_bits(prefix);
        Ok(Self {
            addr: network.into(),
            prefix,
        })
    }

    /// The network address, i.e. the first address of the block.
    pub fn address(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// The traditional dotted netmask, e.g. 255.255.255.0 for a /24.
    pub fn netmask(&self) -> Ipv4Addr {
        mask_bits(self.prefix).into()
    }

    /// Splits the block into its low and high halves.
    pub fn split(self) -> Result<(Self, Self), Error> {
        if self.prefix == 32 {
            return Err(Error::SplitHost);
        }
        let bit = 1u32 << (31 - self.prefix);
        let lo = Self {
            addr: self.addr,
            prefix: self.prefix + 1,
        };
        let hi = Self {
            addr: (u32::from(self.addr) | bit).into(),
            prefix: self.prefix + 1,
        };
        Ok((lo, hi))
    }

    /// Two equal-sized subnets are buddies when they are the halves of the
    /// same parent block. The /0 space has no buddy.
    pub fn is_buddy_of(&self, other: &Self) -> bool {
        self.prefix > 0
            && self.prefix == other.prefix
            && self != other
            && u32::from(self.addr) & mask_bits(self.prefix - 1)
                == u32::from(other.addr) & mask_bits(other.prefix - 1)
    }

    /// Merges two buddies back into their parent block.
    pub fn merge(self, other: Self) -> Result<Self, Error> {
        if !self.is_buddy_of(&other) {
            return Err(Error::NotBuddies(self, other));
        }
        Self::new(self.addr, self.prefix - 1)
    }
}

impl Ord for Ipv4Subnet {
    fn cmp(&self, other: &Self) -> Ordering {
        // A subnet with a smaller prefix (a larger block) sorts after one
        // with a larger prefix; ties break on the network address.
        other
            .prefix
            .cmp(&self.prefix)
            .then_with(|| u32::from(self.addr).cmp(&u32::from(other.addr)))
    }
}

impl PartialOrd for Ipv4Subnet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Ipv4Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for Ipv4Subnet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let (addr, prefix) = s.split_once('/').ok_or(Error::InvalidSubnet)?;
        let addr = addr.parse::<Ipv4Addr>().map_err(|_| Error::InvalidSubnet)?;
        let prefix = prefix.parse::<u8>().map_err(|_| Error::InvalidSubnet)?;
        Self::new(addr, prefix)
    }
}

fn mask_bits(prefix: u8) -> u32 {
    debug_assert!(prefix <= 32);
    ((!0u64) << (32 - prefix)) as u32
}
