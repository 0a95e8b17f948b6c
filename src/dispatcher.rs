// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The outbound event port to the integrator.

use net_types::ip::{AddrSubnet, Ipv6Addr, Subnet};
use net_types::{LinkLocalUnicastAddr, UnicastAddr};
use packet_formats::icmp::ndp::NonZeroNdpLifetime;

use crate::error::TransmitError;

/// A configuration available via DHCPv6, as signalled by a Router
/// Advertisement's M and O flags.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Dhcpv6Configuration {
    /// No configuration is available via DHCPv6.
    NoConfiguration,

    /// Addresses are available via DHCPv6.
    ///
    /// `ManagedAddress` also implies `OtherConfigurations` because DHCPv6
    /// returns all available configuration information when serving
    /// addresses.
    ManagedAddress,

    /// Configuration information other than addresses is available via
    /// DHCPv6, such as a recursive DNS server list or DNS search lists.
    OtherConfigurations,
}

/// The interface integrators implement to receive and handle NDP events.
///
/// Callbacks must not block and must not re-enter the stack; NDP assumes
/// they return synchronously and quickly. Callbacks returning `bool` may
/// veto the event: returning `false` prevents the state change that the
/// event announces.
pub trait NdpDispatcher<DeviceId> {
    /// Called when the DAD process for `addr` on `device_id` completes.
    ///
    /// `resolved` is true if DAD completed successfully (no duplicate was
    /// detected), and false if DAD was stopped for some other reason, such
    /// as the address being removed. If an error occurred transmitting a
    /// probe, `err` is set and `resolved` must be ignored.
    fn on_duplicate_address_detection_status(
        &mut self,
        device_id: DeviceId,
        addr: UnicastAddr<Ipv6Addr>,
        resolved: bool,
        err: Option<TransmitError>,
    );

    /// Called when a new default router is discovered.
    ///
    /// Returns true if the newly discovered router should be remembered.
    fn on_default_router_discovered(
        &mut self,
        device_id: DeviceId,
        addr: LinkLocalUnicastAddr<Ipv6Addr>,
    ) -> bool;

    /// Called when a remembered default router is invalidated.
    fn on_default_router_invalidated(
        &mut self,
        device_id: DeviceId,
        addr: LinkLocalUnicastAddr<Ipv6Addr>,
    );

    /// Called when a new on-link prefix is discovered.
    ///
    /// Returns true if the newly discovered prefix should be remembered.
    fn on_on_link_prefix_discovered(
        &mut self,
        device_id: DeviceId,
        prefix: Subnet<Ipv6Addr>,
    ) -> bool;

    /// Called when a remembered on-link prefix is invalidated.
    fn on_on_link_prefix_invalidated(&mut self, device_id: DeviceId, prefix: Subnet<Ipv6Addr>);

    /// Called when SLAAC generated a new address.
    ///
    /// Returns false to prevent the stack from assigning the address to
    /// the interface.
    fn on_auto_gen_address(
        &mut self,
        device_id: DeviceId,
        addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
    ) -> bool;

    /// Called when an auto-generated address is deprecated but still valid.
    ///
    /// If an address is invalidated at the same time it is deprecated, the
    /// deprecation event may not be received.
    fn on_auto_gen_address_deprecated(
        &mut self,
        device_id: DeviceId,
        addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
    );

    /// Called when an auto-generated address is invalidated.
    fn on_auto_gen_address_invalidated(
        &mut self,
        device_id: DeviceId,
        addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
    );

    /// Called when a Router Advertisement carries a Recursive DNS Server
    /// option.
    ///
    /// The addresses may contain link-local addresses. It is up to the
    /// integrator to use the servers only for their valid lifetime;
    /// `lifetime` of `None` invalidates previously learned servers.
    fn on_recursive_dns_server_option(
        &mut self,
        device_id: DeviceId,
        addresses: Vec<Ipv6Addr>,
        lifetime: Option<NonZeroNdpLifetime>,
    );

    /// Called when a Router Advertisement carries a DNS Search List option.
    ///
    /// It is up to the integrator to use the domain names only for their
    /// valid lifetime. Note that the wire parser currently does not surface
    /// this option, so this callback is reserved for integrators that parse
    /// it out-of-band.
    fn on_dns_search_list_option(
        &mut self,
        device_id: DeviceId,
        domain_names: Vec<String>,
        lifetime: Option<NonZeroNdpLifetime>,
    );

    /// Called with an updated DHCPv6 configuration, only when the learned
    /// configuration changes.
    fn on_dhcpv6_configuration(&mut self, device_id: DeviceId, configuration: Dhcpv6Configuration);
}
