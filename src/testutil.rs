// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Testing-related utilities.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Once;

use net_types::ethernet::Mac;
use net_types::ip::{AddrSubnet, Ipv6, Ipv6Addr, Subnet};
use net_types::{LinkLocalUnicastAddr, SpecifiedAddr, UnicastAddr, Witness as _};
use packet::{InnerPacketBuilder as _, Serializer as _};
use packet_formats::icmp::ndp::options::{NdpOption, NdpOptionBuilder, PrefixInformation, RecursiveDnsServer};
use packet_formats::icmp::ndp::{
    NeighborSolicitation, NonZeroNdpLifetime, OptionSequenceBuilder, Options, RouterAdvertisement,
    RouterSolicitation,
};
use packet_formats::ip::Ipv6Proto;
use packet_formats::testutil::{parse_icmp_packet, parse_ip_packet};

use crate::address::{AddrConfigType, AddressEndpoint, AddressKind, SlaacType};
use crate::config::NdpConfigurations;
use crate::context::testutil::{FakeCryptoRng, FakeInstant, FakeTimerCtx};
use crate::context::{InstantBindingsTypes, InstantContext, RngContext, TimerContext};
use crate::dispatcher::{Dhcpv6Configuration, NdpDispatcher};
use crate::error::{ExistsError, TransmitError};
use crate::ndp::{DeviceIdContext, NdpContext, NdpHandler as _, REQUIRED_NDP_IP_PACKET_HOP_LIMIT};
use crate::state::{NdpState, NdpTimerId};

/// Install a logger for tests.
///
/// Call this method at the beginning of the test for which logging is
/// desired. This function sets global program state, so all tests that run
/// after this function is called will use the logger.
#[allow(dead_code)]
pub(crate) fn set_logger_for_test() {
    struct Logger;

    impl log::Log for Logger {
        fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            println!("{}", record.args())
        }

        fn flush(&self) {}
    }

    static LOGGER: Logger = Logger;
    static LOGGER_ONCE: Once = Once::new();

    // log::set_logger will panic if called multiple times.
    LOGGER_ONCE.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Trace);
    })
}

/// A fake device ID.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub(crate) struct FakeDeviceId;

pub(crate) const FAKE_DEVICE_ID: FakeDeviceId = FakeDeviceId;

pub(crate) fn local_mac() -> UnicastAddr<Mac> {
    UnicastAddr::new(Mac::new([0, 1, 2, 3, 4, 5])).unwrap()
}

pub(crate) fn remote_mac() -> UnicastAddr<Mac> {
    UnicastAddr::new(Mac::new([6, 7, 8, 9, 10, 11])).unwrap()
}

/// The link-local address of the fake router all test RAs come from.
pub(crate) fn router_ip() -> LinkLocalUnicastAddr<Ipv6Addr> {
    remote_mac().to_ipv6_link_local().addr()
}

/// The EUI-64 derived link-local address of the device under test.
pub(crate) fn link_local_addr_sub() -> AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>> {
    AddrSubnet::new(local_mac().to_ipv6_link_local().addr().get().get(), 64).unwrap()
}

#[derive(Debug)]
struct FakeAddressInner {
    addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
    kind: AddressKind,
    deprecated: bool,
    config_type: AddrConfigType,
}

/// A fake reference-counted address handle, emulating an entry in the
/// parent endpoint's address table.
#[derive(Clone, Debug)]
pub(crate) struct FakeAddressEndpoint(Rc<RefCell<FakeAddressInner>>);

impl FakeAddressEndpoint {
    fn new(
        addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
        config_type: AddrConfigType,
        deprecated: bool,
    ) -> FakeAddressEndpoint {
        FakeAddressEndpoint(Rc::new(RefCell::new(FakeAddressInner {
            addr_sub,
            kind: AddressKind::PermanentTentative,
            deprecated,
            config_type,
        })))
    }
}

impl AddressEndpoint for FakeAddressEndpoint {
    fn addr_sub(&self) -> AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>> {
        self.0.borrow().addr_sub
    }

    fn kind(&self) -> AddressKind {
        self.0.borrow().kind
    }

    fn set_kind(&self, kind: AddressKind) {
        self.0.borrow_mut().kind = kind;
    }

    fn is_deprecated(&self) -> bool {
        self.0.borrow().deprecated
    }

    fn set_deprecated(&self, deprecated: bool) {
        self.0.borrow_mut().deprecated = deprecated;
    }

    fn config_type(&self) -> AddrConfigType {
        self.0.borrow().config_type
    }
}

/// An event observed by the fake dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DispatchedEvent {
    DadStatus {
        addr: UnicastAddr<Ipv6Addr>,
        resolved: bool,
        err: Option<TransmitError>,
    },
    RouterDiscovered(LinkLocalUnicastAddr<Ipv6Addr>),
    RouterInvalidated(LinkLocalUnicastAddr<Ipv6Addr>),
    PrefixDiscovered(Subnet<Ipv6Addr>),
    PrefixInvalidated(Subnet<Ipv6Addr>),
    AddressGenerated(AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>),
    AddressDeprecated(AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>),
    AddressInvalidated(AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>),
    RecursiveDnsServers {
        addresses: Vec<Ipv6Addr>,
        lifetime: Option<NonZeroNdpLifetime>,
    },
    Dhcpv6(Dhcpv6Configuration),
}

/// A recording [`NdpDispatcher`] with veto knobs.
#[derive(Default)]
pub(crate) struct FakeDispatcher {
    events: Vec<DispatchedEvent>,
    pub(crate) reject_router_discovery: bool,
    pub(crate) reject_prefix_discovery: bool,
    pub(crate) reject_auto_gen_addr: bool,
}

impl FakeDispatcher {
    pub(crate) fn take_events(&mut self) -> Vec<DispatchedEvent> {
        core::mem::take(&mut self.events)
    }
}

impl NdpDispatcher<FakeDeviceId> for FakeDispatcher {
    fn on_duplicate_address_detection_status(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        addr: UnicastAddr<Ipv6Addr>,
        resolved: bool,
        err: Option<TransmitError>,
    ) {
        self.events.push(DispatchedEvent::DadStatus { addr, resolved, err });
    }

    fn on_default_router_discovered(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        addr: LinkLocalUnicastAddr<Ipv6Addr>,
    ) -> bool {
        self.events.push(DispatchedEvent::RouterDiscovered(addr));
        !self.reject_router_discovery
    }

    fn on_default_router_invalidated(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        addr: LinkLocalUnicastAddr<Ipv6Addr>,
    ) {
        self.events.push(DispatchedEvent::RouterInvalidated(addr));
    }

    fn on_on_link_prefix_discovered(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        prefix: Subnet<Ipv6Addr>,
    ) -> bool {
        self.events.push(DispatchedEvent::PrefixDiscovered(prefix));
        !self.reject_prefix_discovery
    }

    fn on_on_link_prefix_invalidated(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        prefix: Subnet<Ipv6Addr>,
    ) {
        self.events.push(DispatchedEvent::PrefixInvalidated(prefix));
    }

    fn on_auto_gen_address(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
    ) -> bool {
        self.events.push(DispatchedEvent::AddressGenerated(addr_sub));
        !self.reject_auto_gen_addr
    }

    fn on_auto_gen_address_deprecated(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
    ) {
        self.events.push(DispatchedEvent::AddressDeprecated(addr_sub));
    }

    fn on_auto_gen_address_invalidated(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
    ) {
        self.events.push(DispatchedEvent::AddressInvalidated(addr_sub));
    }

    fn on_recursive_dns_server_option(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        addresses: Vec<Ipv6Addr>,
        lifetime: Option<NonZeroNdpLifetime>,
    ) {
        self.events.push(DispatchedEvent::RecursiveDnsServers { addresses, lifetime });
    }

    fn on_dns_search_list_option(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        _domain_names: Vec<String>,
        _lifetime: Option<NonZeroNdpLifetime>,
    ) {
    }

    fn on_dhcpv6_configuration(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        configuration: Dhcpv6Configuration,
    ) {
        self.events.push(DispatchedEvent::Dhcpv6(configuration));
    }
}

/// A fake [`NdpContext`] backed by fake time, a fake address table and a
/// recording frame sink.
pub(crate) struct FakeNdpCtx {
    state: NdpState<FakeInstant, FakeAddressEndpoint>,
    pub(crate) timers: FakeTimerCtx<NdpTimerId<FakeDeviceId>>,
    rng: FakeCryptoRng,
    addrs: HashMap<UnicastAddr<Ipv6Addr>, FakeAddressEndpoint>,
    /// Transmitted IPv6 frames as `(next_hop, bytes)` pairs.
    pub(crate) frames: Vec<(SpecifiedAddr<Ipv6Addr>, Vec<u8>)>,
    pub(crate) dispatcher: FakeDispatcher,
    pub(crate) dispatcher_registered: bool,
    pub(crate) forwarding_enabled: bool,
    pub(crate) link_layer_addr: Option<UnicastAddr<Mac>>,
    pub(crate) source_address: Option<UnicastAddr<Ipv6Addr>>,
    pub(crate) transmit_should_fail: bool,
}

impl Default for FakeNdpCtx {
    fn default() -> FakeNdpCtx {
        FakeNdpCtx::with_config(NdpConfigurations::default())
    }
}

impl FakeNdpCtx {
    pub(crate) fn with_config(config: NdpConfigurations) -> FakeNdpCtx {
        let mut rng = FakeCryptoRng::new_xorshift(0);
        let state = NdpState::new(config, &mut rng);
        FakeNdpCtx {
            state,
            timers: FakeTimerCtx::default(),
            rng,
            addrs: HashMap::new(),
            frames: Vec::new(),
            dispatcher: FakeDispatcher::default(),
            dispatcher_registered: true,
            forwarding_enabled: false,
            link_layer_addr: Some(local_mac()),
            source_address: None,
            transmit_should_fail: false,
        }
    }

    /// Adds an address to the fake address table the way an administrator
    /// would, returning its (tentative) handle.
    pub(crate) fn add_manual_addr(&mut self, addr: Ipv6Addr) -> FakeAddressEndpoint {
        let addr_sub = AddrSubnet::new(addr, 64).unwrap();
        let endpoint = FakeAddressEndpoint::new(addr_sub, AddrConfigType::Manual, false);
        assert!(self.addrs.insert(addr_sub.addr(), endpoint.clone()).is_none());
        endpoint
    }

    /// Parses `options_bytes` as NDP options and feeds the RA through the
    /// handler.
    pub(crate) fn receive_ra(
        &mut self,
        ra: &RouterAdvertisement,
        options_bytes: &[u8],
        src_ip: LinkLocalUnicastAddr<Ipv6Addr>,
    ) {
        let options = Options::parse(options_bytes).expect("parse NDP options");
        self.handle_router_advertisement(FAKE_DEVICE_ID, src_ip, ra, &options);
    }

    pub(crate) fn receive_ra_without_options(
        &mut self,
        ra: &RouterAdvertisement,
        src_ip: LinkLocalUnicastAddr<Ipv6Addr>,
    ) {
        self.receive_ra(ra, &[], src_ip)
    }

    /// Triggers the next scheduled timer, advancing the fake clock to its
    /// deadline, and returns its ID.
    pub(crate) fn trigger_next_timer(&mut self) -> Option<NdpTimerId<FakeDeviceId>> {
        self.timers.pop_next().map(|id| {
            self.handle_timer(id);
            id
        })
    }
}

impl InstantBindingsTypes for FakeNdpCtx {
    type Instant = FakeInstant;
}

impl InstantContext for FakeNdpCtx {
    fn now(&self) -> FakeInstant {
        self.timers.now()
    }
}

impl TimerContext<NdpTimerId<FakeDeviceId>> for FakeNdpCtx {
    fn schedule_timer_instant(
        &mut self,
        time: FakeInstant,
        id: NdpTimerId<FakeDeviceId>,
    ) -> Option<FakeInstant> {
        self.timers.schedule_timer_instant(time, id)
    }

    fn cancel_timer(&mut self, id: NdpTimerId<FakeDeviceId>) -> Option<FakeInstant> {
        self.timers.cancel_timer(id)
    }

    fn cancel_timers_with<F: FnMut(&NdpTimerId<FakeDeviceId>) -> bool>(&mut self, f: F) {
        self.timers.cancel_timers_with(f)
    }

    fn scheduled_instant(&self, id: NdpTimerId<FakeDeviceId>) -> Option<FakeInstant> {
        self.timers.scheduled_instant(id)
    }
}

impl RngContext for FakeNdpCtx {
    type Rng<'a> = &'a mut FakeCryptoRng;

    fn rng(&mut self) -> &mut FakeCryptoRng {
        &mut self.rng
    }
}

impl DeviceIdContext for FakeNdpCtx {
    type DeviceId = FakeDeviceId;
}

impl NdpContext for FakeNdpCtx {
    type AddressEndpoint = FakeAddressEndpoint;
    type Dispatcher = FakeDispatcher;

    fn get_state(&self, FakeDeviceId: FakeDeviceId) -> &NdpState<FakeInstant, FakeAddressEndpoint> {
        &self.state
    }

    fn get_state_mut(
        &mut self,
        FakeDeviceId: FakeDeviceId,
    ) -> &mut NdpState<FakeInstant, FakeAddressEndpoint> {
        &mut self.state
    }

    fn dispatcher_mut(&mut self) -> Option<&mut FakeDispatcher> {
        if self.dispatcher_registered {
            Some(&mut self.dispatcher)
        } else {
            None
        }
    }

    fn is_forwarding_enabled(&self, FakeDeviceId: FakeDeviceId) -> bool {
        self.forwarding_enabled
    }

    fn link_layer_addr(&self, FakeDeviceId: FakeDeviceId) -> Option<UnicastAddr<Mac>> {
        self.link_layer_addr
    }

    fn add_slaac_addr(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
        slaac_type: SlaacType,
        deprecated: bool,
    ) -> Result<FakeAddressEndpoint, ExistsError> {
        if self.addrs.contains_key(&addr_sub.addr()) {
            return Err(ExistsError);
        }

        let config_type = match slaac_type {
            SlaacType::Stable => AddrConfigType::Slaac,
            SlaacType::Temporary => AddrConfigType::TemporarySlaac,
        };
        let endpoint = FakeAddressEndpoint::new(addr_sub, config_type, deprecated);
        assert!(self.addrs.insert(addr_sub.addr(), endpoint.clone()).is_none());
        Ok(endpoint)
    }

    fn remove_slaac_addr(&mut self, FakeDeviceId: FakeDeviceId, addr: &UnicastAddr<Ipv6Addr>) {
        let _: FakeAddressEndpoint =
            self.addrs.remove(addr).unwrap_or_else(|| panic!("no address {} to remove", addr));
    }

    fn has_addr(&self, FakeDeviceId: FakeDeviceId, addr: &UnicastAddr<Ipv6Addr>) -> bool {
        self.addrs.contains_key(addr)
    }

    fn get_outgoing_source_address(
        &self,
        FakeDeviceId: FakeDeviceId,
    ) -> Option<UnicastAddr<Ipv6Addr>> {
        self.source_address
    }

    fn send_ipv6_frame<S: packet::Serializer<Buffer = packet::EmptyBuf>>(
        &mut self,
        FakeDeviceId: FakeDeviceId,
        next_hop: SpecifiedAddr<Ipv6Addr>,
        frame: S,
    ) -> Result<(), TransmitError> {
        if self.transmit_should_fail {
            return Err(TransmitError);
        }

        let buffer = frame.serialize_vec_outer().map_err(|_| TransmitError)?;
        self.frames.push((next_hop, buffer.as_ref().to_vec()));
        Ok(())
    }
}

/// Builds an RA message and the serialized bytes of a single Prefix
/// Information option.
pub(crate) fn ra_with_prefix(
    router_lifetime_secs: u16,
    prefix: Subnet<Ipv6Addr>,
    on_link_flag: bool,
    autonomous_flag: bool,
    valid_lifetime_secs: u32,
    preferred_lifetime_secs: u32,
) -> (RouterAdvertisement, Vec<u8>) {
    let ra = RouterAdvertisement::new(
        0,     /* current_hop_limit */
        false, /* managed_flag */
        false, /* other_config_flag */
        router_lifetime_secs,
        0, /* reachable_time */
        0, /* retransmit_timer */
    );

    let p = PrefixInformation::new(
        prefix.prefix(),
        on_link_flag,
        autonomous_flag,
        valid_lifetime_secs,
        preferred_lifetime_secs,
        prefix.network(),
    );
    let options = [NdpOptionBuilder::PrefixInformation(p)];
    let bytes = OptionSequenceBuilder::new(options.iter())
        .into_serializer()
        .serialize_vec_outer()
        .unwrap()
        .unwrap_b()
        .as_ref()
        .to_vec();

    (ra, bytes)
}

/// Serialized bytes of a single Recursive DNS Server option.
pub(crate) fn rdnss_options_bytes(lifetime_secs: u32, servers: &[Ipv6Addr]) -> Vec<u8> {
    let rdnss = RecursiveDnsServer::new(lifetime_secs, servers);
    let options = [NdpOptionBuilder::RecursiveDnsServer(rdnss)];
    OptionSequenceBuilder::new(options.iter())
        .into_serializer()
        .serialize_vec_outer()
        .unwrap()
        .unwrap_b()
        .as_ref()
        .to_vec()
}

/// Parses a transmitted frame as a Neighbor Solicitation, returning the
/// IPv6 source and destination, the message, and the number of options it
/// carried.
pub(crate) fn parse_neighbor_solicitation(
    frame: &[u8],
) -> (Ipv6Addr, Ipv6Addr, NeighborSolicitation, usize) {
    let (body, src_ip, dst_ip, proto, ttl) =
        parse_ip_packet::<Ipv6>(frame).expect("parse IPv6 packet");
    assert_eq!(proto, Ipv6Proto::Icmpv6);
    assert_eq!(ttl, REQUIRED_NDP_IP_PACKET_HOP_LIMIT);

    let mut num_options = 0;
    let (message, _code) =
        parse_icmp_packet::<Ipv6, _, NeighborSolicitation, _>(body, src_ip, dst_ip, |p| {
            num_options = p.body().iter().count();
        })
        .expect("parse neighbor solicitation");

    (src_ip, dst_ip, message, num_options)
}

/// Parses a transmitted frame as a Router Solicitation, returning the IPv6
/// source and destination and the bytes of the Source Link-Layer Address
/// option, if present.
pub(crate) fn parse_router_solicitation(frame: &[u8]) -> (Ipv6Addr, Ipv6Addr, Option<Vec<u8>>) {
    let (body, src_ip, dst_ip, proto, ttl) =
        parse_ip_packet::<Ipv6>(frame).expect("parse IPv6 packet");
    assert_eq!(proto, Ipv6Proto::Icmpv6);
    assert_eq!(ttl, REQUIRED_NDP_IP_PACKET_HOP_LIMIT);

    let mut sll_bytes = None;
    let (_message, _code) =
        parse_icmp_packet::<Ipv6, _, RouterSolicitation, _>(body, src_ip, dst_ip, |p| {
            sll_bytes = p.body().iter().find_map(|o| match o {
                NdpOption::SourceLinkLayerAddress(a) => Some(a.to_vec()),
                _ => None,
            });
        })
        .expect("parse router solicitation");

    (src_ip, dst_ip, sll_bytes)
}
