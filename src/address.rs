// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The parent endpoint's view of an assigned address.

use core::fmt::Debug;

use net_types::ip::{AddrSubnet, Ipv6Addr};
use net_types::UnicastAddr;

/// The assignment state of an address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressKind {
    /// The address is assigned but Duplicate Address Detection has not yet
    /// resolved for it, so it must not be used as a source address.
    PermanentTentative,

    /// The address is assigned and usable.
    Permanent,
}

/// How an address was configured on the endpoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddrConfigType {
    /// The address was manually configured by an administrator.
    Manual,

    /// The address is a stable address configured by SLAAC.
    Slaac,

    /// The address is a temporary (privacy) address configured by SLAAC.
    TemporarySlaac,
}

/// The flavor of a SLAAC address being generated.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum SlaacType {
    /// A long-lived address whose interface identifier is stable across
    /// regenerations of the prefix.
    Stable,

    /// A short-lived privacy address, as per RFC 4941.
    Temporary,
}

impl Debug for SlaacType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SlaacType::Stable => f.write_str("stable"),
            SlaacType::Temporary => f.write_str("temporary"),
        }
    }
}

/// A reference-counted handle to an address assigned to the parent
/// endpoint.
///
/// The endpoint owns the address table; NDP holds one handle per address it
/// tracks and releases it (by dropping) on invalidation. Cloning a handle
/// acquires another reference to the same underlying address, so mutations
/// made through one handle are observed through all of them.
pub trait AddressEndpoint: Clone + Debug {
    /// The address and its subnet.
    fn addr_sub(&self) -> AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>;

    /// The assignment state of the address.
    fn kind(&self) -> AddressKind;

    /// Sets the assignment state of the address.
    fn set_kind(&self, kind: AddressKind);

    /// True if the address is deprecated and should not be used for new
    /// connections.
    fn is_deprecated(&self) -> bool;

    /// Marks the address deprecated (or un-deprecates it).
    fn set_deprecated(&self, deprecated: bool);

    /// How the address was configured.
    fn config_type(&self) -> AddrConfigType;
}
