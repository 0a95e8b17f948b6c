// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Duplicate Address Detection, as per [RFC 4862 section 5.4].
//!
//! [RFC 4862 section 5.4]: https://tools.ietf.org/html/rfc4862#section-5.4

use core::time::Duration;

use assert_matches::assert_matches;
use log::trace;
use net_types::ip::{Ipv6, Ipv6Addr};
use net_types::{UnicastAddr, Witness as _};
use packet_formats::icmp::ndp::NeighborSolicitation;

use crate::address::{AddrConfigType, AddressEndpoint, AddressKind};
use crate::context::TimerContext as _;
use crate::error::NotSupportedError;
use crate::ndp::{send_ndp_packet, NdpContext};
use crate::slaac;
use crate::state::{DadState, NdpTimerId};

/// Starts Duplicate Address Detection for a tentative address.
///
/// If `dup_addr_detect_transmits` is zero, the address is promoted to
/// `Permanent` immediately and the integrator is notified with
/// `resolved = true`. Otherwise the first probe is scheduled with a zero
/// delay so it is transmitted outside the caller's critical section.
///
/// # Panics
///
/// Panics if `addr_endpoint` is not in the `PermanentTentative` state, or
/// if DAD is already being performed for `addr`.
pub(crate) fn start_duplicate_address_detection<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    addr: Ipv6Addr,
    addr_endpoint: C::AddressEndpoint,
) -> Result<(), NotSupportedError> {
    // The address must be a valid unicast IPv6 address.
    let addr = UnicastAddr::new(addr).ok_or(NotSupportedError)?;

    assert_eq!(
        addr_endpoint.kind(),
        AddressKind::PermanentTentative,
        "dad: address {} is not tentative on device {:?}",
        addr,
        device_id,
    );

    let state = ctx.get_state_mut(device_id);

    let transmits_remaining = state.config.dup_addr_detect_transmits;
    if transmits_remaining == 0 {
        addr_endpoint.set_kind(AddressKind::Permanent);

        // DAD is considered to have resolved even though no probes were
        // actually transmitted.
        if let Some(dispatcher) = ctx.dispatcher_mut() {
            dispatcher.on_duplicate_address_detection_status(device_id, addr, true, None);
        }

        return Ok(());
    }

    // Only ever called for newly created addresses; a second start for the
    // same address means the caller's bookkeeping is corrupt.
    assert_matches!(
        state.dad.insert(addr, DadState { addr_endpoint, transmits_remaining }),
        None,
        "dad: already performing DAD for {} on device {:?}",
        addr,
        device_id,
    );

    // Fire immediately so the first probe is sent outside the critical
    // section the caller currently holds.
    let _: Option<C::Instant> =
        ctx.schedule_timer(Duration::ZERO, NdpTimerId::new_dad_transmit(device_id, addr));

    Ok(())
}

/// Ends a running Duplicate Address Detection process.
///
/// This may leave a tentative address in that state forever, unless some
/// other external event resolves it; that is up to the caller to handle.
/// Does nothing if DAD is not being performed for `addr`. The integrator
/// is notified with `resolved = false`.
pub(crate) fn stop_duplicate_address_detection<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    addr: UnicastAddr<Ipv6Addr>,
) {
    let state = ctx.get_state_mut(device_id);
    let DadState { addr_endpoint: _, transmits_remaining: _ } = match state.dad.remove(&addr) {
        Some(dad_state) => dad_state,
        // Not currently performing DAD on `addr`.
        None => return,
    };

    let _: Option<C::Instant> = ctx.cancel_timer(NdpTimerId::new_dad_transmit(device_id, addr));

    if let Some(dispatcher) = ctx.dispatcher_mut() {
        dispatcher.on_duplicate_address_detection_status(device_id, addr, false, None);
    }
}

/// Handles a DAD timer: transmits the next probe or resolves the address.
///
/// # Panics
///
/// Panics if no DAD entry exists for `addr` (the timer should have been
/// cancelled) or if the address is no longer tentative.
pub(crate) fn handle_dad_timer<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    addr: UnicastAddr<Ipv6Addr>,
) {
    let retransmit_timer = ctx.get_state(device_id).config.retransmit_timer;

    let (addr_endpoint, transmits_remaining) = {
        let state = ctx.get_state_mut(device_id);
        let DadState { addr_endpoint, transmits_remaining } =
            state.dad.get(&addr).unwrap_or_else(|| {
                panic!("dad: timer fired but no DAD state for {} on device {:?}", addr, device_id)
            });
        (addr_endpoint.clone(), *transmits_remaining)
    };

    // The address must still be tentative while DAD runs on it.
    assert_eq!(
        addr_endpoint.kind(),
        AddressKind::PermanentTentative,
        "dad: address {} is no longer tentative on device {:?}",
        addr,
        device_id,
    );

    let dad_done = transmits_remaining == 0;

    let err = if dad_done { None } else { send_dad_probe(ctx, device_id, addr).err() };

    if !dad_done && err.is_none() {
        // More probes to go and the last one was transmitted fine; keep
        // counting down.
        let state = ctx.get_state_mut(device_id);
        let dad_state = state.dad.get_mut(&addr).unwrap();
        dad_state.transmits_remaining -= 1;

        let _: Option<C::Instant> =
            ctx.schedule_timer(retransmit_timer, NdpTimerId::new_dad_transmit(device_id, addr));
        return;
    }

    // Either DAD is done or the probe failed to transmit. Clean up the DAD
    // state and let the integrator know how it went.
    if dad_done {
        addr_endpoint.set_kind(AddressKind::Permanent);
    }

    assert_matches!(ctx.get_state_mut(device_id).dad.remove(&addr), Some(_));

    if let Some(dispatcher) = ctx.dispatcher_mut() {
        dispatcher.on_duplicate_address_detection_status(device_id, addr, dad_done, err);
    }

    // A stable SLAAC address that just resolved unblocks temporary address
    // generation for its prefix.
    if dad_done && addr_endpoint.config_type() == AddrConfigType::Slaac {
        slaac::regenerate_temporary_slaac_addr(
            ctx,
            device_id,
            addr_endpoint.addr_sub().subnet(),
            true, /* reset_generation_attempts */
        );
    }
}

/// Transmits one DAD probe: a Neighbor Solicitation for `addr` sent to its
/// solicited-node multicast address with the unspecified source.
fn send_dad_probe<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    addr: UnicastAddr<Ipv6Addr>,
) -> Result<(), crate::error::TransmitError> {
    trace!("send_dad_probe: probing {} on device {:?}", addr, device_id);

    let dst_ip = addr.to_solicited_node_address();
    send_ndp_packet::<_, &[u8], _>(
        ctx,
        device_id,
        Ipv6::UNSPECIFIED_ADDRESS,
        dst_ip.into_specified(),
        NeighborSolicitation::new(addr.get()),
        &[],
    )
}
