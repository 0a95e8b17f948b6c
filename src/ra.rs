// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Router Advertisement processing, as per [RFC 4861 section 6.3.4].
//!
//! [RFC 4861 section 6.3.4]: https://tools.ietf.org/html/rfc4861#section-6.3.4

use log::trace;
use net_types::ip::Ipv6Addr;
use net_types::{LinkLocalAddress as _, LinkLocalUnicastAddr, UnicastAddr};
use packet_formats::icmp::ndp::options::NdpOption;
use packet_formats::icmp::ndp::{Options, RouterAdvertisement};
use zerocopy::ByteSlice;

use crate::dispatcher::Dhcpv6Configuration;
use crate::ndp::NdpContext;
use crate::{route_discovery, slaac};

/// Handles a Router Advertisement received from `src_ip`.
///
/// Returns immediately if the interface is not configured to handle RAs or
/// if the stack is operating as a router.
pub(crate) fn handle_router_advertisement<C: NdpContext, B: ByteSlice>(
    ctx: &mut C,
    device_id: C::DeviceId,
    src_ip: LinkLocalUnicastAddr<Ipv6Addr>,
    ra: &RouterAdvertisement,
    options: &Options<B>,
) {
    {
        let state = ctx.get_state(device_id);
        if !state.config.handle_ras || ctx.is_forwarding_enabled(device_id) {
            trace!("handle_router_advertisement: not configured to handle RAs, discarding");
            return;
        }
    }

    // Only worry about the DHCPv6 configuration if a dispatcher is
    // registered, as the signal is only ever forwarded on change; nothing
    // else is done with it.
    if ctx.dispatcher_mut().is_some() {
        let configuration = if ra.managed_flag() {
            Dhcpv6Configuration::ManagedAddress
        } else if ra.other_config_flag() {
            Dhcpv6Configuration::OtherConfigurations
        } else {
            Dhcpv6Configuration::NoConfiguration
        };

        let state = ctx.get_state_mut(device_id);
        let changed = state.dhcpv6_configuration != Some(configuration);
        if changed {
            state.dhcpv6_configuration = Some(configuration);
            if let Some(dispatcher) = ctx.dispatcher_mut() {
                dispatcher.on_dhcpv6_configuration(device_id, configuration);
            }
        }
    }

    if ctx.get_state(device_id).config.discover_default_routers {
        route_discovery::update_default_router(ctx, device_id, src_ip, ra.router_lifetime());
    }

    for option in options.iter() {
        match option {
            NdpOption::RecursiveDnsServer(rdnss) => {
                let addresses: Vec<Ipv6Addr> = rdnss.iter_addresses().copied().collect();
                let lifetime = rdnss.lifetime();
                if let Some(dispatcher) = ctx.dispatcher_mut() {
                    dispatcher.on_recursive_dns_server_option(device_id, addresses, lifetime);
                }
            }
            NdpOption::PrefixInformation(prefix_info) => {
                trace!("handle_router_advertisement: prefix information option {:?}", prefix_info);

                if prefix_info.prefix().is_link_local() {
                    // As per RFC 4861 section 6.3.4 (on-link determination)
                    // and RFC 4862 section 5.5.3.b (SLAAC), ignore options
                    // with the link-local prefix.
                    trace!("handle_router_advertisement: prefix is link-local, ignoring");
                    continue;
                }

                if prefix_info.prefix_length() == 0 {
                    // A zero-length prefix would make all IPv6 addresses
                    // on-link.
                    trace!("handle_router_advertisement: prefix length is 0, ignoring");
                    continue;
                }

                let subnet = match prefix_info.subnet() {
                    Ok(subnet) => subnet,
                    Err(err) => {
                        trace!(
                            "handle_router_advertisement: malformed prefix information ({:?}), \
                             ignoring",
                            err
                        );
                        continue;
                    }
                };

                match UnicastAddr::new(subnet.network()) {
                    Some(UnicastAddr { .. }) => {}
                    None => {
                        trace!(
                            "handle_router_advertisement: non-unicast prefix {}, ignoring",
                            subnet
                        );
                        continue;
                    }
                }

                // Both flags may be set simultaneously and both are then
                // processed.
                if prefix_info.on_link_flag() {
                    route_discovery::apply_on_link_prefix_update(
                        ctx,
                        device_id,
                        subnet,
                        prefix_info.valid_lifetime(),
                    );
                }

                if prefix_info.autonomous_address_configuration_flag() {
                    slaac::apply_autonomous_prefix_update(
                        ctx,
                        device_id,
                        subnet,
                        prefix_info.preferred_lifetime(),
                        prefix_info.valid_lifetime(),
                    );
                }
            }
            // Unknown and unhandled options are ignored.
            _ => {}
        }
    }
}
