// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The per-interface NDP state.

use std::collections::{HashMap, HashSet};
use core::time::Duration;

use net_types::ip::{AddrSubnet, Ipv6Addr, Subnet};
use net_types::{LinkLocalUnicastAddr, UnicastAddr};
use rand::distributions::Uniform;
use rand::{Rng as _, RngCore};

use crate::address::AddressEndpoint;
use crate::config::{NdpConfigurations, MAX_DESYNC_FACTOR};
use crate::dispatcher::Dhcpv6Configuration;
use crate::opaque_iid::TEMP_IID_HISTORY_BYTES;
use crate::Instant;

/// State associated with an address undergoing Duplicate Address Detection.
///
/// An entry exists exactly while DAD transmits remain for a
/// `PermanentTentative` address. The entry's timer is keyed by the address;
/// a firing that finds no entry is a cancellation bug and panics.
pub(crate) struct DadState<A> {
    /// The address being probed.
    pub(crate) addr_endpoint: A,

    /// The number of Neighbor Solicitations still to be transmitted.
    pub(crate) transmits_remaining: u8,
}

/// State associated with a temporary SLAAC address.
pub(crate) struct TempSlaacAddrState<I, A> {
    /// When the address was created, fixing the upper bounds of its
    /// lifetimes.
    pub(crate) created_at: I,

    /// The address's handle on the parent endpoint.
    pub(crate) addr_endpoint: A,

    /// Whether a successor for this address has already been generated.
    pub(crate) regenerated: bool,
}

/// State associated with the stable address generated for a SLAAC prefix.
pub(crate) struct StableAddrState<A> {
    /// The address's handle on the parent endpoint.
    ///
    /// May only be `None` while the address is being (re-)generated;
    /// otherwise all SLAAC prefixes have a stable address.
    pub(crate) addr_endpoint: Option<A>,

    /// The number of times an address was generated that the IPv6 endpoint
    /// already owned.
    pub(crate) local_generation_failures: u8,
}

/// State associated with a SLAAC prefix.
pub(crate) struct SlaacPrefixState<I, A> {
    /// The stable address slot.
    pub(crate) stable_addr: StableAddrState<A>,

    /// The temporary (short-lived) addresses generated for the prefix,
    /// keyed by address.
    pub(crate) temp_addrs: HashMap<UnicastAddr<Ipv6Addr>, TempSlaacAddrState<I, A>>,

    /// When the prefix stops being valid. `None` means forever.
    pub(crate) valid_until: Option<I>,

    /// When the prefix stops being preferred. `None` means forever.
    pub(crate) preferred_until: Option<I>,

    // The next two fields are used by both stable and temporary address
    // generation for the prefix. This is unambiguous because only one
    // address is in the generation and DAD process at any time for a given
    // SLAAC prefix.
    /// The number of times an address has been generated and added to the
    /// IPv6 endpoint for this prefix.
    pub(crate) generation_attempts: u8,

    /// The ceiling for `generation_attempts` when regenerating in response
    /// to DAD conflicts.
    pub(crate) max_generation_attempts: u8,
}

/// The types of NDP timers.
///
/// Timer IDs carry the owning entry's key, never a reference to the entry:
/// each firing looks the entry up again, which is what lets entries own
/// their timers without forming reference cycles.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub(crate) enum InnerNdpTimerId {
    /// Timer to transmit the next DAD probe for, or to resolve, a
    /// tentative address.
    DadTransmit { addr: UnicastAddr<Ipv6Addr> },

    /// Timer to send the next Router Solicitation message.
    RouterSolicitationTransmit,

    /// Timer to invalidate a default router.
    ///
    /// `ip` is the identifying link-local address of the router.
    RouterInvalidation { ip: LinkLocalUnicastAddr<Ipv6Addr> },

    /// Timer to invalidate an on-link prefix.
    OnLinkPrefixInvalidation { subnet: Subnet<Ipv6Addr> },

    /// Timer to deprecate a SLAAC prefix's stable address.
    SlaacPrefixDeprecation { subnet: Subnet<Ipv6Addr> },

    /// Timer to invalidate a SLAAC prefix.
    SlaacPrefixInvalidation { subnet: Subnet<Ipv6Addr> },

    /// Timer to deprecate a temporary SLAAC address.
    TempSlaacAddrDeprecation { addr_subnet: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>> },

    /// Timer to invalidate a temporary SLAAC address.
    TempSlaacAddrInvalidation { addr_subnet: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>> },

    /// Timer to generate a new temporary SLAAC address before an existing
    /// one is deprecated.
    TempSlaacAddrRegeneration { addr_subnet: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>> },
}

/// The identifier for timer events in NDP operations.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct NdpTimerId<DeviceId> {
    pub(crate) device_id: DeviceId,
    pub(crate) inner: InnerNdpTimerId,
}

impl<DeviceId: Copy> NdpTimerId<DeviceId> {
    fn new(device_id: DeviceId, inner: InnerNdpTimerId) -> NdpTimerId<DeviceId> {
        NdpTimerId { device_id, inner }
    }

    pub(crate) fn new_dad_transmit(
        device_id: DeviceId,
        addr: UnicastAddr<Ipv6Addr>,
    ) -> NdpTimerId<DeviceId> {
        NdpTimerId::new(device_id, InnerNdpTimerId::DadTransmit { addr })
    }

    pub(crate) fn new_router_solicitation(device_id: DeviceId) -> NdpTimerId<DeviceId> {
        NdpTimerId::new(device_id, InnerNdpTimerId::RouterSolicitationTransmit)
    }

    pub(crate) fn new_router_invalidation(
        device_id: DeviceId,
        ip: LinkLocalUnicastAddr<Ipv6Addr>,
    ) -> NdpTimerId<DeviceId> {
        NdpTimerId::new(device_id, InnerNdpTimerId::RouterInvalidation { ip })
    }

    pub(crate) fn new_on_link_prefix_invalidation(
        device_id: DeviceId,
        subnet: Subnet<Ipv6Addr>,
    ) -> NdpTimerId<DeviceId> {
        NdpTimerId::new(device_id, InnerNdpTimerId::OnLinkPrefixInvalidation { subnet })
    }

    pub(crate) fn new_slaac_prefix_deprecation(
        device_id: DeviceId,
        subnet: Subnet<Ipv6Addr>,
    ) -> NdpTimerId<DeviceId> {
        NdpTimerId::new(device_id, InnerNdpTimerId::SlaacPrefixDeprecation { subnet })
    }

    pub(crate) fn new_slaac_prefix_invalidation(
        device_id: DeviceId,
        subnet: Subnet<Ipv6Addr>,
    ) -> NdpTimerId<DeviceId> {
        NdpTimerId::new(device_id, InnerNdpTimerId::SlaacPrefixInvalidation { subnet })
    }

    pub(crate) fn new_temp_slaac_addr_deprecation(
        device_id: DeviceId,
        addr_subnet: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
    ) -> NdpTimerId<DeviceId> {
        NdpTimerId::new(device_id, InnerNdpTimerId::TempSlaacAddrDeprecation { addr_subnet })
    }

    pub(crate) fn new_temp_slaac_addr_invalidation(
        device_id: DeviceId,
        addr_subnet: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
    ) -> NdpTimerId<DeviceId> {
        NdpTimerId::new(device_id, InnerNdpTimerId::TempSlaacAddrInvalidation { addr_subnet })
    }

    pub(crate) fn new_temp_slaac_addr_regeneration(
        device_id: DeviceId,
        addr_subnet: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
    ) -> NdpTimerId<DeviceId> {
        NdpTimerId::new(device_id, InnerNdpTimerId::TempSlaacAddrRegeneration { addr_subnet })
    }

    /// The device the timer belongs to.
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }
}

/// The state associated with an instance of the Neighbor Discovery
/// Protocol.
///
/// Each interface holds one `NdpState` to track its discovery operations.
/// All mutation happens under the owning endpoint's lock, i.e. through the
/// `&mut` the context hands out.
pub struct NdpState<I: Instant, A: AddressEndpoint> {
    /// The per-interface NDP configurations.
    pub(crate) config: NdpConfigurations,

    /// Addresses currently undergoing Duplicate Address Detection.
    pub(crate) dad: HashMap<UnicastAddr<Ipv6Addr>, DadState<A>>,

    /// The default routers discovered through Router Advertisements,
    /// identified by their link-local address.
    pub(crate) default_routers: HashSet<LinkLocalUnicastAddr<Ipv6Addr>>,

    /// The on-link prefixes discovered through Router Advertisements'
    /// Prefix Information options.
    pub(crate) on_link_prefixes: HashSet<Subnet<Ipv6Addr>>,

    /// The SLAAC prefixes discovered through Router Advertisements' Prefix
    /// Information options.
    pub(crate) slaac_prefixes: HashMap<Subnet<Ipv6Addr>, SlaacPrefixState<I, A>>,

    /// Number of remaining Router Solicitation messages to send.
    pub(crate) router_solicitations_remaining: u8,

    /// The last DHCPv6 configuration learned from an RA. `None` until the
    /// first RA is processed (and again after state cleanup), so the next
    /// RA always notifies the integrator.
    pub(crate) dhcpv6_configuration: Option<Dhcpv6Configuration>,

    /// The history value used to generate the next temporary IID.
    pub(crate) temporary_iid_history: [u8; TEMP_IID_HISTORY_BYTES],

    /// The preferred lifetime's desync factor for temporary SLAAC
    /// addresses, drawn once per interface.
    pub(crate) desync_factor: Duration,
}

impl<I: Instant, A: AddressEndpoint> NdpState<I, A> {
    /// Creates NDP state with the given configuration.
    ///
    /// Invalid configuration values are replaced as documented on
    /// [`NdpConfigurations::validate`]. `rng` seeds the temporary-IID
    /// history and draws the per-interface desync factor uniformly from
    /// `[0, MAX_DESYNC_FACTOR)`.
    pub fn new<R: RngCore>(mut config: NdpConfigurations, rng: &mut R) -> NdpState<I, A> {
        config.validate();

        let mut temporary_iid_history = [0; TEMP_IID_HISTORY_BYTES];
        rng.fill_bytes(&mut temporary_iid_history);

        let desync_factor = rng.sample(Uniform::new(Duration::ZERO, MAX_DESYNC_FACTOR));

        NdpState {
            config,
            dad: HashMap::new(),
            default_routers: HashSet::new(),
            on_link_prefixes: HashSet::new(),
            slaac_prefixes: HashMap::new(),
            router_solicitations_remaining: 0,
            dhcpv6_configuration: None,
            temporary_iid_history,
            desync_factor,
        }
    }

    /// The interface's NDP configuration.
    pub fn configs(&self) -> &NdpConfigurations {
        &self.config
    }

    /// The currently remembered default routers.
    pub fn default_routers(&self) -> impl Iterator<Item = &LinkLocalUnicastAddr<Ipv6Addr>> {
        self.default_routers.iter()
    }

    /// The currently remembered on-link prefixes.
    pub fn on_link_prefixes(&self) -> impl Iterator<Item = &Subnet<Ipv6Addr>> {
        self.on_link_prefixes.iter()
    }

    /// The subnets with SLAAC state.
    pub fn slaac_prefixes(&self) -> impl Iterator<Item = &Subnet<Ipv6Addr>> {
        self.slaac_prefixes.keys()
    }

    /// The last DHCPv6 configuration learned from an RA, if any RA has been
    /// processed since the state was created or cleaned up.
    pub fn dhcpv6_configuration(&self) -> Option<Dhcpv6Configuration> {
        self.dhcpv6_configuration
    }

    /// True if DAD is currently being performed for `addr`.
    pub fn is_performing_dad(&self, addr: &UnicastAddr<Ipv6Addr>) -> bool {
        self.dad.contains_key(addr)
    }
}
