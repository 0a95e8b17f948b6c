// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The NDP execution context and operation surface.

use core::fmt::Debug;
use core::hash::Hash;

use net_types::ethernet::Mac;
use net_types::ip::{AddrSubnet, Ipv6, Ipv6Addr};
use net_types::{LinkLocalUnicastAddr, SpecifiedAddr, UnicastAddr};
use packet::{EmptyBuf, InnerPacketBuilder as _, Serializer};
use packet_formats::icmp::ndp::options::NdpOptionBuilder;
use packet_formats::icmp::ndp::{OptionSequenceBuilder, Options, RouterAdvertisement};
use packet_formats::icmp::{IcmpMessage, IcmpPacketBuilder, IcmpUnusedCode};
use packet_formats::ip::Ipv6Proto;
use packet_formats::ipv6::Ipv6PacketBuilder;
use zerocopy::ByteSlice;

use crate::address::{AddressEndpoint, SlaacType};
use crate::context::{RngContext, TimerContext};
use crate::dispatcher::NdpDispatcher;
use crate::error::{ExistsError, NotSupportedError, TransmitError};
use crate::state::{InnerNdpTimerId, NdpState, NdpTimerId};
use crate::{dad, ra, route_discovery, router_solicitation, slaac};

/// The IP packet hop limit for all NDP packets.
///
/// See [RFC 4861 section 4.1] through [RFC 4861 section 4.5] for more
/// information.
///
/// [RFC 4861 section 4.1]: https://tools.ietf.org/html/rfc4861#section-4.1
/// [RFC 4861 section 4.5]: https://tools.ietf.org/html/rfc4861#section-4.5
pub(crate) const REQUIRED_NDP_IP_PACKET_HOP_LIMIT: u8 = 255;

/// A context that identifies devices.
pub trait DeviceIdContext {
    /// An ID identifying an interface.
    type DeviceId: Copy + Clone + Eq + PartialEq + Hash + Debug + 'static;
}

/// The execution context for NDP.
///
/// Everything the state machine needs from its environment comes through
/// this trait: the clock and timers, randomness, the per-interface state,
/// the parent endpoint's address table, frame transmission, and the
/// integrator dispatcher. The `&mut self` on every effectful method is the
/// endpoint lock.
pub trait NdpContext:
    Sized
    + DeviceIdContext
    + RngContext
    + TimerContext<NdpTimerId<<Self as DeviceIdContext>::DeviceId>>
{
    /// The parent endpoint's reference-counted address handle.
    type AddressEndpoint: AddressEndpoint;

    /// The integrator's event dispatcher.
    type Dispatcher: NdpDispatcher<Self::DeviceId>;

    /// Gets the NDP state for `device_id`.
    fn get_state(
        &self,
        device_id: Self::DeviceId,
    ) -> &NdpState<Self::Instant, Self::AddressEndpoint>;

    /// Gets the NDP state for `device_id`, mutably.
    fn get_state_mut(
        &mut self,
        device_id: Self::DeviceId,
    ) -> &mut NdpState<Self::Instant, Self::AddressEndpoint>;

    /// Gets the integrator's dispatcher, if one is registered.
    ///
    /// Events that would be delivered to the dispatcher are skipped when
    /// no dispatcher is registered, including the discoveries that the
    /// dispatcher could have vetoed.
    fn dispatcher_mut(&mut self) -> Option<&mut Self::Dispatcher>;

    /// Is the stack forwarding IPv6 packets?
    ///
    /// Router Advertisements are not processed while operating as a
    /// router.
    fn is_forwarding_enabled(&self, device_id: Self::DeviceId) -> bool;

    /// The device's link-layer address, if the device has a valid unicast
    /// Ethernet address.
    fn link_layer_addr(&self, device_id: Self::DeviceId) -> Option<UnicastAddr<Mac>>;

    /// Adds a SLAAC-generated address to the parent endpoint and acquires
    /// a handle to it.
    ///
    /// The returned handle must be in the `PermanentTentative` state; the
    /// caller is responsible for starting DAD on it. Fails if the endpoint
    /// already owns `addr_sub`'s address.
    fn add_slaac_addr(
        &mut self,
        device_id: Self::DeviceId,
        addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
        slaac_type: SlaacType,
        deprecated: bool,
    ) -> Result<Self::AddressEndpoint, ExistsError>;

    /// Removes a previously added SLAAC address from the parent endpoint.
    ///
    /// The removal must not cascade back into this crate: the caller is
    /// already performing the invalidation and delivers the event itself.
    ///
    /// # Panics
    ///
    /// Panics if the endpoint does not own `addr`.
    fn remove_slaac_addr(&mut self, device_id: Self::DeviceId, addr: &UnicastAddr<Ipv6Addr>);

    /// Does the parent endpoint own `addr` (in any state)?
    fn has_addr(&self, device_id: Self::DeviceId, addr: &UnicastAddr<Ipv6Addr>) -> bool;

    /// An address suitable as the source of an outgoing Router
    /// Solicitation: a primary address assigned to the interface, if any.
    fn get_outgoing_source_address(
        &self,
        device_id: Self::DeviceId,
    ) -> Option<UnicastAddr<Ipv6Addr>>;

    /// Sends an IPv6 frame to `next_hop`.
    ///
    /// The NIC's writer is acquired transiently; no NDP state is held
    /// across the transmission.
    fn send_ipv6_frame<S: Serializer<Buffer = EmptyBuf>>(
        &mut self,
        device_id: Self::DeviceId,
        next_hop: SpecifiedAddr<Ipv6Addr>,
        frame: S,
    ) -> Result<(), TransmitError>;
}

/// An NDP handler for NDP events.
///
/// `NdpHandler` is implemented for any type which implements
/// [`NdpContext`], and it can also be mocked for use in testing.
pub trait NdpHandler: NdpContext {
    /// Handles a Router Advertisement received from `src_ip`.
    ///
    /// Does nothing if the interface is not configured to handle RAs or if
    /// the stack is forwarding. Routers must use their link-local address
    /// as the source of RAs, which the `src_ip` witness type enforces.
    fn handle_router_advertisement<B: ByteSlice>(
        &mut self,
        device_id: Self::DeviceId,
        src_ip: LinkLocalUnicastAddr<Ipv6Addr>,
        ra: &RouterAdvertisement,
        options: &Options<B>,
    );

    /// Performs Duplicate Address Detection for a newly added tentative
    /// address.
    ///
    /// If `dup_addr_detect_transmits` is zero the address is immediately
    /// promoted to `Permanent` and the integrator is notified with
    /// `resolved = true`.
    ///
    /// # Panics
    ///
    /// Panics if `addr_endpoint` is not `PermanentTentative` or if DAD is
    /// already being performed for `addr`.
    fn start_duplicate_address_detection(
        &mut self,
        device_id: Self::DeviceId,
        addr: Ipv6Addr,
        addr_endpoint: Self::AddressEndpoint,
    ) -> Result<(), NotSupportedError>;

    /// Ends a running Duplicate Address Detection process, notifying the
    /// integrator with `resolved = false`.
    ///
    /// Does nothing if DAD is not being performed for `addr`.
    fn stop_duplicate_address_detection(
        &mut self,
        device_id: Self::DeviceId,
        addr: UnicastAddr<Ipv6Addr>,
    );

    /// Handles the discovery (by NS/NA processing, outside this crate)
    /// that a tentative address is a duplicate on the link.
    ///
    /// Stops DAD, removes and invalidates the address, and for SLAAC
    /// addresses attempts regeneration under the owning prefix.
    fn handle_duplicate_address_detected(
        &mut self,
        device_id: Self::DeviceId,
        addr: UnicastAddr<Ipv6Addr>,
    );

    /// Generates the SLAAC link-local address for the interface with
    /// infinite lifetimes, as if `fe80::/64` had been advertised as an
    /// autonomous prefix.
    ///
    /// Invoked by the integrator when the endpoint becomes enabled. The
    /// resulting prefix entry is what `cleanup_state(host_only = true)`
    /// later retains.
    ///
    /// # Panics
    ///
    /// Panics if the link-local prefix already has SLAAC state.
    fn perform_link_local_slaac(&mut self, device_id: Self::DeviceId);

    /// Starts soliciting routers, as per [RFC 4861 section 6.3.7].
    ///
    /// Does nothing if routers are already being solicited or if
    /// `max_router_solicitations` is zero.
    ///
    /// [RFC 4861 section 6.3.7]: https://tools.ietf.org/html/rfc4861#section-6.3.7
    fn start_soliciting_routers(&mut self, device_id: Self::DeviceId);

    /// Stops soliciting routers.
    ///
    /// Does nothing if routers are not being solicited.
    fn stop_soliciting_routers(&mut self, device_id: Self::DeviceId);

    /// Invalidates all SLAAC prefixes and their addresses.
    ///
    /// If `keep_link_local` is true, the SLAAC-generated link-local
    /// address is retained, as routers are also expected to generate one.
    fn remove_slaac_addresses(&mut self, device_id: Self::DeviceId, keep_link_local: bool);

    /// Cleans up the interface's NDP state: all SLAAC prefixes (sparing
    /// the link-local one if `host_only`), then all on-link prefixes, then
    /// all default routers; the DHCPv6 signal is reset.
    fn cleanup_state(&mut self, device_id: Self::DeviceId, host_only: bool);

    /// Handles a timer firing.
    fn handle_timer(&mut self, id: NdpTimerId<Self::DeviceId>);
}

impl<C: NdpContext> NdpHandler for C {
    fn handle_router_advertisement<B: ByteSlice>(
        &mut self,
        device_id: C::DeviceId,
        src_ip: LinkLocalUnicastAddr<Ipv6Addr>,
        router_advertisement: &RouterAdvertisement,
        options: &Options<B>,
    ) {
        ra::handle_router_advertisement(self, device_id, src_ip, router_advertisement, options)
    }

    fn start_duplicate_address_detection(
        &mut self,
        device_id: C::DeviceId,
        addr: Ipv6Addr,
        addr_endpoint: C::AddressEndpoint,
    ) -> Result<(), NotSupportedError> {
        dad::start_duplicate_address_detection(self, device_id, addr, addr_endpoint)
    }

    fn stop_duplicate_address_detection(
        &mut self,
        device_id: C::DeviceId,
        addr: UnicastAddr<Ipv6Addr>,
    ) {
        dad::stop_duplicate_address_detection(self, device_id, addr)
    }

    fn handle_duplicate_address_detected(
        &mut self,
        device_id: C::DeviceId,
        addr: UnicastAddr<Ipv6Addr>,
    ) {
        slaac::handle_duplicate_address_detected(self, device_id, addr)
    }

    fn perform_link_local_slaac(&mut self, device_id: C::DeviceId) {
        slaac::perform_link_local_slaac(self, device_id)
    }

    fn start_soliciting_routers(&mut self, device_id: C::DeviceId) {
        router_solicitation::start_soliciting_routers(self, device_id)
    }

    fn stop_soliciting_routers(&mut self, device_id: C::DeviceId) {
        router_solicitation::stop_soliciting_routers(self, device_id)
    }

    fn remove_slaac_addresses(&mut self, device_id: C::DeviceId, keep_link_local: bool) {
        slaac::remove_slaac_addresses(self, device_id, keep_link_local)
    }

    fn cleanup_state(&mut self, device_id: C::DeviceId, host_only: bool) {
        cleanup_state(self, device_id, host_only)
    }

    fn handle_timer(&mut self, id: NdpTimerId<C::DeviceId>) {
        handle_timer(self, id)
    }
}

fn handle_timer<C: NdpContext>(ctx: &mut C, id: NdpTimerId<C::DeviceId>) {
    let NdpTimerId { device_id, inner } = id;
    match inner {
        InnerNdpTimerId::DadTransmit { addr } => dad::handle_dad_timer(ctx, device_id, addr),
        InnerNdpTimerId::RouterSolicitationTransmit => {
            router_solicitation::handle_router_solicitation_timer(ctx, device_id)
        }
        InnerNdpTimerId::RouterInvalidation { ip } => {
            route_discovery::handle_router_invalidation_timer(ctx, device_id, ip)
        }
        InnerNdpTimerId::OnLinkPrefixInvalidation { subnet } => {
            route_discovery::handle_on_link_prefix_invalidation_timer(ctx, device_id, subnet)
        }
        InnerNdpTimerId::SlaacPrefixDeprecation { subnet } => {
            slaac::handle_prefix_deprecation_timer(ctx, device_id, subnet)
        }
        InnerNdpTimerId::SlaacPrefixInvalidation { subnet } => {
            slaac::handle_prefix_invalidation_timer(ctx, device_id, subnet)
        }
        InnerNdpTimerId::TempSlaacAddrDeprecation { addr_subnet } => {
            slaac::handle_temp_addr_deprecation_timer(ctx, device_id, addr_subnet)
        }
        InnerNdpTimerId::TempSlaacAddrInvalidation { addr_subnet } => {
            slaac::handle_temp_addr_invalidation_timer(ctx, device_id, addr_subnet)
        }
        InnerNdpTimerId::TempSlaacAddrRegeneration { addr_subnet } => {
            slaac::handle_temp_addr_regeneration_timer(ctx, device_id, addr_subnet)
        }
    }
}

/// Cleans up the interface's NDP state.
///
/// Invalidates all discovered on-link prefixes, discovered routers, and
/// auto-generated addresses. If `host_only` is true, the link-local
/// auto-generated address is not invalidated, as routers are also expected
/// to generate a link-local address.
fn cleanup_state<C: NdpContext>(ctx: &mut C, device_id: C::DeviceId, host_only: bool) {
    slaac::remove_slaac_addresses(ctx, device_id, host_only /* keep_link_local */);

    route_discovery::invalidate_all_on_link_prefixes(ctx, device_id);
    let remaining = ctx.get_state(device_id).on_link_prefixes.len();
    assert_eq!(remaining, 0, "still have {} discovered on-link prefixes after cleanup", remaining);

    route_discovery::invalidate_all_default_routers(ctx, device_id);
    let remaining = ctx.get_state(device_id).default_routers.len();
    assert_eq!(remaining, 0, "still have {} discovered default routers after cleanup", remaining);

    ctx.get_state_mut(device_id).dhcpv6_configuration = None;
}

/// Constructs and transmits an NDP packet.
///
/// The serializer stack computes the ICMPv6 checksum and sets the required
/// hop limit of 255.
pub(crate) fn send_ndp_packet<C: NdpContext, B: ByteSlice, M>(
    ctx: &mut C,
    device_id: C::DeviceId,
    src_ip: Ipv6Addr,
    dst_ip: SpecifiedAddr<Ipv6Addr>,
    message: M,
    options: &[NdpOptionBuilder<'_>],
) -> Result<(), TransmitError>
where
    M: IcmpMessage<Ipv6, B, Code = IcmpUnusedCode>,
{
    log::trace!("send_ndp_packet: src_ip={:?} dst_ip={:?}", src_ip, dst_ip);

    ctx.send_ipv6_frame(
        device_id,
        dst_ip,
        OptionSequenceBuilder::<_>::new(options.iter())
            .into_serializer()
            .encapsulate(IcmpPacketBuilder::<Ipv6, B, M>::new(
                src_ip,
                dst_ip,
                IcmpUnusedCode,
                message,
            ))
            .encapsulate(Ipv6PacketBuilder::new(
                src_ip,
                dst_ip,
                REQUIRED_NDP_IP_PACKET_HOP_LIMIT,
                Ipv6Proto::Icmpv6,
            )),
    )
}
