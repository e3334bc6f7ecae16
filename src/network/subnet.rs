//! Subnet prefixes and the range they are leased from.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::NetworkError;

/// A three-octet private network prefix such as `192.168.7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubnetPrefix([u8; 3]);

impl SubnetPrefix {
    /// Build a prefix from its three octets.
    #[must_use]
    pub const fn new(first: u8, second: u8, third: u8) -> Self {
        Self([first, second, third])
    }

    /// The octet that varies between tenants.
    #[must_use]
    pub const fn third_octet(self) -> u8 {
        let [_, _, third] = self.0;
        third
    }

    /// The tenant container's address inside this subnet.
    #[must_use]
    pub fn container_address(self, host_octet: u8) -> String {
        format!("{self}.{host_octet}")
    }

    /// The network in CIDR notation, `<prefix>.0/24`.
    #[must_use]
    pub fn cidr(self) -> String {
        format!("{self}.0/24")
    }
}

impl fmt::Display for SubnetPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

impl Serialize for SubnetPrefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for SubnetPrefix {
    type Err = NetworkError;

    /// Parses `a.b.c`; a full `a.b.c.d` address is accepted and truncated to
    /// its prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NetworkError::InvalidPrefix {
            value: s.to_owned(),
        };
        let octets: Vec<u8> = s
            .trim()
            .split('.')
            .map(str::parse::<u8>)
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        match octets.as_slice() {
            [a, b, c] | [a, b, c, _] => Ok(Self::new(*a, *b, *c)),
            _ => Err(invalid()),
        }
    }
}

/// The leasable range: a two-octet base and an inclusive third-octet span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetRange {
    base: [u8; 2],
    first: u8,
    last: u8,
}

impl SubnetRange {
    /// Build a range from a dotted two-octet base such as `192.168`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidPrefix` if `base` is not two octets.
    pub fn new(base: &str, first: u8, last: u8) -> Result<Self, NetworkError> {
        let invalid = || NetworkError::InvalidPrefix {
            value: base.to_owned(),
        };
        let octets: Vec<u8> = base
            .split('.')
            .map(str::parse::<u8>)
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        match octets.as_slice() {
            [a, b] => Ok(Self {
                base: [*a, *b],
                first,
                last,
            }),
            _ => Err(invalid()),
        }
    }

    /// Candidates in ascending order.
    pub fn candidates(self) -> impl Iterator<Item = SubnetPrefix> {
        let [a, b] = self.base;
        (self.first..=self.last).map(move |c| SubnetPrefix::new(a, b, c))
    }

    /// Whether `prefix` belongs to this range.
    #[must_use]
    pub const fn contains(self, prefix: SubnetPrefix) -> bool {
        let [a, b, c] = prefix.0;
        let [base_a, base_b] = self.base;
        a == base_a && b == base_b && c >= self.first && c <= self.last
    }

    pub(crate) fn exhausted(self) -> NetworkError {
        let [a, b] = self.base;
        NetworkError::ResourceExhausted {
            base: format!("{a}.{b}"),
            first: self.first,
            last: self.last,
        }
    }
}
