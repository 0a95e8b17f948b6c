// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Router Solicitation, as per [RFC 4861 section 6.3.7].
//!
//! [RFC 4861 section 6.3.7]: https://tools.ietf.org/html/rfc4861#section-6.3.7

use core::time::Duration;

use log::{error, trace};
use net_types::ip::{Ipv6, Ipv6Addr};
use net_types::{MulticastAddress as _, UnicastAddr, Witness as _};
use packet_formats::icmp::ndp::options::NdpOptionBuilder;
use packet_formats::icmp::ndp::RouterSolicitation;
use rand::Rng as _;

use crate::context::{RngContext as _, TimerContext as _};
use crate::ndp::{send_ndp_packet, NdpContext};
use crate::state::NdpTimerId;

/// Starts soliciting routers.
///
/// Does nothing if routers are already being solicited or if the interface
/// is configured to send no solicitations. As per [RFC 4861 section
/// 6.3.7], the first transmission is delayed by a random amount of time
/// between 0 and `max_rtr_solicitation_delay` to alleviate congestion when
/// many hosts start up on a link at the same time.
///
/// [RFC 4861 section 6.3.7]: https://tools.ietf.org/html/rfc4861#section-6.3.7
pub(crate) fn start_soliciting_routers<C: NdpContext>(ctx: &mut C, device_id: C::DeviceId) {
    let timer_id = NdpTimerId::new_router_solicitation(device_id);
    if ctx.scheduled_instant(timer_id).is_some() {
        // Already soliciting routers.
        return;
    }

    let state = ctx.get_state_mut(device_id);
    let remaining = state.config.max_router_solicitations;
    if remaining == 0 {
        trace!(
            "start_soliciting_routers: device {:?} configured to send no router solicitations",
            device_id
        );
        return;
    }

    state.router_solicitations_remaining = remaining;

    let max_delay = state.config.max_rtr_solicitation_delay;
    let delay = if max_delay == Duration::ZERO {
        Duration::ZERO
    } else {
        ctx.rng().gen_range(Duration::ZERO..max_delay)
    };

    trace!("start_soliciting_routers: start soliciting routers for device {:?}", device_id);
    let _: Option<C::Instant> = ctx.schedule_timer(delay, timer_id);
}

/// Stops soliciting routers.
///
/// Does nothing if routers are not currently being solicited.
pub(crate) fn stop_soliciting_routers<C: NdpContext>(ctx: &mut C, device_id: C::DeviceId) {
    trace!("stop_soliciting_routers: stop soliciting routers for device {:?}", device_id);

    let _: Option<C::Instant> = ctx.cancel_timer(NdpTimerId::new_router_solicitation(device_id));
    ctx.get_state_mut(device_id).router_solicitations_remaining = 0;
}

/// Solicits routers once and schedules the next transmission.
///
/// A transmit failure stops the burst.
pub(crate) fn handle_router_solicitation_timer<C: NdpContext>(ctx: &mut C, device_id: C::DeviceId) {
    assert!(ctx.get_state(device_id).router_solicitations_remaining > 0);

    // As per RFC 4861 section 4.1, the source of the RS is an address
    // assigned to the sending interface, or the unspecified address if no
    // suitable address is assigned.
    let src_ip = ctx.get_outgoing_source_address(device_id);

    trace!(
        "handle_router_solicitation_timer: soliciting routers for device {:?} using src_ip {:?}",
        device_id,
        src_ip
    );

    let result = send_router_solicitation(ctx, device_id, src_ip);

    let state = ctx.get_state_mut(device_id);
    match result {
        Ok(()) => state.router_solicitations_remaining -= 1,
        Err(err) => {
            error!(
                "handle_router_solicitation_timer: error sending router solicitation on device \
                 {:?}: {}",
                device_id, err
            );
            // Don't send any more messages if there was an error.
            state.router_solicitations_remaining = 0;
        }
    }

    if state.router_solicitations_remaining > 0 {
        let interval = state.config.rtr_solicitation_interval;
        let _: Option<C::Instant> =
            ctx.schedule_timer(interval, NdpTimerId::new_router_solicitation(device_id));
    } else {
        trace!(
            "handle_router_solicitation_timer: done sending router solicitations for device {:?}",
            device_id
        );
    }
}

/// Sends a Router Solicitation to the all-routers multicast address.
///
/// As per [RFC 4861 section 4.1], the Source Link-Layer Address option
/// SHOULD be included when the source address is specified and MUST NOT be
/// included when it is unspecified.
///
/// [RFC 4861 section 4.1]: https://tools.ietf.org/html/rfc4861#section-4.1
fn send_router_solicitation<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    src_ip: Option<UnicastAddr<Ipv6Addr>>,
) -> Result<(), crate::error::TransmitError> {
    let dst_ip = Ipv6::ALL_ROUTERS_LINK_LOCAL_MULTICAST_ADDRESS.into_specified();

    match src_ip {
        Some(src_ip) => match ctx.link_layer_addr(device_id) {
            Some(link_addr) => {
                let bytes = link_addr.bytes();
                send_ndp_packet::<_, &[u8], _>(
                    ctx,
                    device_id,
                    src_ip.get(),
                    dst_ip,
                    RouterSolicitation::default(),
                    &[NdpOptionBuilder::SourceLinkLayerAddress(&bytes[..])],
                )
            }
            None => send_ndp_packet::<_, &[u8], _>(
                ctx,
                device_id,
                src_ip.get(),
                dst_ip,
                RouterSolicitation::default(),
                &[],
            ),
        },
        None => send_ndp_packet::<_, &[u8], _>(
            ctx,
            device_id,
            Ipv6::UNSPECIFIED_ADDRESS,
            dst_ip,
            RouterSolicitation::default(),
            &[],
        ),
    }
}
