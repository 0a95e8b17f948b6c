// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Stateless Address Autoconfiguration, as per [RFC 4862 section 5.5],
//! with the temporary (privacy) address extensions of [RFC 4941].
//!
//! Each SLAAC prefix owns one stable address and any number of temporary
//! addresses. Prefix-level deprecation/invalidation timers and per-address
//! deprecation/invalidation/regeneration timers all carry the prefix or
//! address key and re-look-up their entry on firing.
//!
//! [RFC 4862 section 5.5]: https://tools.ietf.org/html/rfc4862#section-5.5
//! [RFC 4941]: https://tools.ietf.org/html/rfc4941

use std::collections::HashMap;
use core::time::Duration;

use assert_matches::assert_matches;
use log::{error, trace};
use net_types::ip::{AddrSubnet, Ipv6Addr, Subnet};
use net_types::{UnicastAddr, Witness as _};
use packet_formats::icmp::ndp::NonZeroNdpLifetime;

use crate::address::{AddressEndpoint, AddressKind, SlaacType};
use crate::config::{
    OpaqueIidOptions, MAX_SLAAC_ADDR_LOCAL_REGEN_ATTEMPTS, MIN_PREFIX_VALID_LIFETIME_FOR_UPDATE,
    REQUIRED_PREFIX_BITS,
};
use crate::context::{InstantContext as _, TimerContext as _};
use crate::dad;
use crate::error::ExistsError;
use crate::ndp::NdpContext;
use crate::opaque_iid::{
    generate_opaque_interface_identifier, generate_temporary_interface_identifier, IID_BYTES,
};
use crate::state::{NdpTimerId, SlaacPrefixState, StableAddrState, TempSlaacAddrState};
use crate::Instant as _;

/// The link-local prefix, for which temporary addresses are never
/// generated and which host-only cleanup retains.
pub(crate) const LINK_LOCAL_SUBNET: Subnet<Ipv6Addr> =
    unsafe { Subnet::new_unchecked(Ipv6Addr::new([0xfe80, 0, 0, 0, 0, 0, 0, 0]), 64) };

/// Handles a Prefix Information option with the autonomous flag set, as
/// per [RFC 4862 section 5.5.3].
///
/// The caller has already checked that the prefix is not link-local and
/// has a non-zero length.
///
/// [RFC 4862 section 5.5.3]: https://tools.ietf.org/html/rfc4862#section-5.5.3
pub(crate) fn apply_autonomous_prefix_update<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
    preferred_lifetime: Option<NonZeroNdpLifetime>,
    valid_lifetime: Option<NonZeroNdpLifetime>,
) {
    // If the preferred lifetime is greater than the valid lifetime,
    // silently ignore the option, as per RFC 4862 section 5.5.3.c.
    if preferred_exceeds_valid(preferred_lifetime, valid_lifetime) {
        trace!(
            "apply_autonomous_prefix_update: preferred lifetime greater than valid lifetime, \
             ignoring"
        );
        return;
    }

    if ctx.get_state(device_id).slaac_prefixes.contains_key(&prefix) {
        // As per RFC 4862 section 5.5.3.e, refresh the prefix's lifetimes.
        let mut state = ctx.get_state_mut(device_id).slaac_prefixes.remove(&prefix).unwrap();
        refresh_slaac_prefix_lifetimes(
            ctx,
            device_id,
            prefix,
            &mut state,
            preferred_lifetime,
            valid_lifetime,
        );
        assert_matches!(
            ctx.get_state_mut(device_id).slaac_prefixes.insert(prefix, state),
            None
        );
        return;
    }

    // A new SLAAC prefix; do the work outlined by RFC 4862 section 5.5.3.d
    // if configured to auto-generate addresses.
    if !ctx.get_state(device_id).config.auto_gen_global_addresses {
        return;
    }

    do_slaac(ctx, device_id, prefix, preferred_lifetime, valid_lifetime)
}

fn preferred_exceeds_valid(
    preferred_lifetime: Option<NonZeroNdpLifetime>,
    valid_lifetime: Option<NonZeroNdpLifetime>,
) -> bool {
    match (preferred_lifetime, valid_lifetime) {
        (Some(_), None) => true,
        (Some(NonZeroNdpLifetime::Infinite), Some(NonZeroNdpLifetime::Finite(_))) => true,
        (Some(NonZeroNdpLifetime::Finite(pl)), Some(NonZeroNdpLifetime::Finite(vl))) => pl > vl,
        (Some(NonZeroNdpLifetime::Infinite), Some(NonZeroNdpLifetime::Infinite))
        | (Some(NonZeroNdpLifetime::Finite(_)), Some(NonZeroNdpLifetime::Infinite))
        | (None, _) => false,
    }
}

/// Generates a new stable SLAAC address for the link-local prefix with
/// infinite lifetimes.
///
/// Invoked by the integrator when the endpoint becomes enabled. The
/// resulting prefix entry is what a host-only cleanup later retains.
///
/// # Panics
///
/// Panics if the link-local prefix already has SLAAC state.
pub(crate) fn perform_link_local_slaac<C: NdpContext>(ctx: &mut C, device_id: C::DeviceId) {
    do_slaac(
        ctx,
        device_id,
        LINK_LOCAL_SUBNET,
        Some(NonZeroNdpLifetime::Infinite),
        Some(NonZeroNdpLifetime::Infinite),
    )
}

/// Performs SLAAC for a new prefix, as per [RFC 4862 section 5.5.3.d].
///
/// If no stable address can be generated, no state is kept for the prefix.
///
/// [RFC 4862 section 5.5.3.d]: https://tools.ietf.org/html/rfc4862#section-5.5.3
fn do_slaac<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
    preferred_lifetime: Option<NonZeroNdpLifetime>,
    valid_lifetime: Option<NonZeroNdpLifetime>,
) {
    // With no address for the prefix and a zero valid lifetime there is
    // nothing to do, as per RFC 4862 section 5.5.3.d.
    let valid_lifetime = match valid_lifetime {
        Some(valid_lifetime) => valid_lifetime,
        None => {
            trace!("do_slaac: prefix {} has valid lifetime = 0, ignoring", prefix);
            return;
        }
    };

    if prefix.prefix() != REQUIRED_PREFIX_BITS {
        // If the sum of the prefix length and the interface identifier
        // length does not equal 128 bits, the option MUST be ignored, as
        // per RFC 4862 section 5.5.3.
        error!(
            "do_slaac: prefix length {} cannot form a valid IPv6 address, ignoring",
            prefix.prefix()
        );
        return;
    }

    let now = ctx.now();
    let mut state = SlaacPrefixState {
        stable_addr: StableAddrState { addr_endpoint: None, local_generation_failures: 0 },
        temp_addrs: HashMap::new(),
        valid_until: None,
        // The time the prefix is preferred until is needed to generate the
        // address (it may already be deprecated).
        preferred_until: match preferred_lifetime {
            None => Some(now),
            Some(NonZeroNdpLifetime::Finite(preferred_lifetime)) => {
                Some(now.checked_add(preferred_lifetime.get()).unwrap())
            }
            Some(NonZeroNdpLifetime::Infinite) => None,
        },
        generation_attempts: 0,
        max_generation_attempts: ctx
            .get_state(device_id)
            .config
            .auto_gen_address_conflict_retries
            + 1,
    };

    if !generate_slaac_addr(ctx, device_id, prefix, &mut state) {
        // Unable to generate an address for the prefix; there is no reason
        // to maintain state or timers for a prefix we have no address for.
        return;
    }

    if let Some(NonZeroNdpLifetime::Finite(preferred_lifetime)) = preferred_lifetime {
        let _: Option<C::Instant> = ctx.schedule_timer(
            preferred_lifetime.get(),
            NdpTimerId::new_slaac_prefix_deprecation(device_id, prefix),
        );
    }

    if let NonZeroNdpLifetime::Finite(valid_lifetime) = valid_lifetime {
        let _: Option<C::Instant> = ctx.schedule_timer(
            valid_lifetime.get(),
            NdpTimerId::new_slaac_prefix_invalidation(device_id, prefix),
        );
        state.valid_until = Some(now.checked_add(valid_lifetime.get()).unwrap());
    }

    // If the stable address is already assigned (DAD was not needed),
    // generate a temporary address right away.
    let stable_kind =
        state.stable_addr.addr_endpoint.as_ref().expect("stable address was just generated").kind();
    if stable_kind == AddressKind::Permanent {
        let _: bool = generate_temp_slaac_addr(
            ctx,
            device_id,
            prefix,
            &mut state,
            true, /* reset_generation_attempts */
        );
    }

    assert_matches!(ctx.get_state_mut(device_id).slaac_prefixes.insert(prefix, state), None);
}

/// Generates a stable SLAAC address for `prefix`, storing the handle in
/// `state`.
///
/// Returns true if an address was successfully generated and added.
///
/// # Panics
///
/// Panics if the prefix already has a stable address.
fn generate_slaac_addr<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
    state: &mut SlaacPrefixState<C::Instant, C::AddressEndpoint>,
) -> bool {
    assert!(
        state.stable_addr.addr_endpoint.is_none(),
        "slaac: prefix {} already has a stable address",
        prefix,
    );

    // The maximum number of DAD-conflict regenerations for the prefix has
    // been reached; do not generate another address.
    if state.generation_attempts == state.max_generation_attempts {
        return false;
    }

    let opaque_iid_options = ctx.get_state(device_id).config.opaque_iid.clone();

    let mut attempt = 0;
    let addr_sub = loop {
        // Too many locally conflicting addresses in a row; give up.
        if attempt == MAX_SLAAC_ADDR_LOCAL_REGEN_ATTEMPTS {
            return false;
        }
        attempt += 1;

        let dad_counter = state.generation_attempts + state.stable_addr.local_generation_failures;
        let addr_sub = match &opaque_iid_options {
            Some(OpaqueIidOptions { nic_name, secret_key }) => {
                let iid = generate_opaque_interface_identifier(
                    prefix,
                    nic_name.as_bytes(),
                    &[],
                    dad_counter,
                    secret_key,
                );
                let mut iid_bytes = [0; IID_BYTES];
                iid_bytes.copy_from_slice(&iid.to_be_bytes()[..IID_BYTES]);
                generate_global_address(&prefix, &iid_bytes)
            }
            None => {
                // Modified-EUI64 IIDs have no way to resolve DAD conflicts,
                // so a non-zero DAD counter means there is nothing further
                // to try.
                if dad_counter != 0 {
                    return false;
                }

                match ctx.link_layer_addr(device_id) {
                    Some(mac) => generate_global_address(&prefix, &mac.to_eui64()),
                    // No valid unicast Ethernet address to derive the IID
                    // from.
                    None => return false,
                }
            }
        };

        if !ctx.has_addr(device_id, &addr_sub.addr()) {
            break addr_sub;
        }
        state.stable_addr.local_generation_failures += 1;
    };

    let now = ctx.now();
    let deprecated = state.preferred_until.map_or(false, |preferred_until| now >= preferred_until);

    match add_and_acquire_slaac_addr(ctx, device_id, addr_sub, SlaacType::Stable, deprecated) {
        Some(addr_endpoint) => {
            state.stable_addr.addr_endpoint = Some(addr_endpoint);
            state.generation_attempts += 1;
            true
        }
        None => false,
    }
}

/// Generates a new temporary SLAAC address for `prefix`, as per [RFC 4941
/// section 3.3].
///
/// If `reset_generation_attempts` is true, the prefix's generation counter
/// and ceiling are reset first. Returns true if a new address was
/// generated.
///
/// [RFC 4941 section 3.3]: https://tools.ietf.org/html/rfc4941#section-3.3
fn generate_temp_slaac_addr<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
    state: &mut SlaacPrefixState<C::Instant, C::AddressEndpoint>,
    reset_generation_attempts: bool,
) -> bool {
    // Temporary addresses are never generated for the link-local prefix.
    if !ctx.get_state(device_id).config.auto_gen_temp_global_addresses
        || prefix == LINK_LOCAL_SUBNET
    {
        return false;
    }

    if reset_generation_attempts {
        state.generation_attempts = 0;
        state.max_generation_attempts =
            ctx.get_state(device_id).config.auto_gen_address_conflict_retries + 1;
    }

    if state.generation_attempts == state.max_generation_attempts {
        return false;
    }

    let stable_addr = state
        .stable_addr
        .addr_endpoint
        .as_ref()
        .expect("temporary address generation requires a stable address")
        .addr_sub()
        .addr();

    let now = ctx.now();
    let (max_valid_lifetime, max_preferred_lifetime, regen_advance, desync_factor) = {
        let ndp_state = ctx.get_state(device_id);
        (
            ndp_state.config.max_temp_addr_valid_lifetime,
            ndp_state.config.max_temp_addr_preferred_lifetime,
            ndp_state.config.regen_advance_duration,
            ndp_state.desync_factor,
        )
    };

    // As per RFC 4941 section 3.3 step 4, the valid lifetime is the lower
    // of the prefix's remaining valid lifetime and TEMP_VALID_LIFETIME.
    let mut valid_for = max_valid_lifetime;
    if let Some(valid_until) = state.valid_until {
        valid_for = valid_for.min(valid_until.saturating_duration_since(now));
    }
    if valid_for == Duration::ZERO {
        // Cannot create an address without a valid lifetime.
        return false;
    }

    // As per RFC 4941 section 3.3 step 4, the preferred lifetime is the
    // lower of the prefix's remaining preferred lifetime and
    // TEMP_PREFERRED_LIFETIME - DESYNC_FACTOR.
    let mut preferred_for = max_preferred_lifetime.saturating_sub(desync_factor);
    if let Some(preferred_until) = state.preferred_until {
        preferred_for = preferred_for.min(preferred_until.saturating_duration_since(now));
    }

    // As per RFC 4941 section 3.3 step 5, a temporary address is created
    // only if the calculated preferred lifetime is greater than
    // REGEN_ADVANCE; in particular one MUST NOT be created with a zero
    // preferred lifetime.
    if preferred_for <= regen_advance {
        trace!(
            "generate_temp_slaac_addr: preferred lifetime {:?} for {} too short to allow \
             regeneration",
            preferred_for,
            prefix
        );
        return false;
    }

    // Generate an address not already assigned to the endpoint.
    let mut attempt = 0;
    let addr_sub = loop {
        if attempt == MAX_SLAAC_ADDR_LOCAL_REGEN_ATTEMPTS {
            return false;
        }
        attempt += 1;

        let iid = {
            let ndp_state = ctx.get_state_mut(device_id);
            generate_temporary_interface_identifier(
                &mut ndp_state.temporary_iid_history,
                &stable_addr,
            )
        };
        let addr_sub = generate_global_address(&prefix, &iid);
        if !ctx.has_addr(device_id, &addr_sub.addr()) {
            break addr_sub;
        }
    };

    // The checks above guarantee a non-zero preferred lifetime, so the
    // address starts out not deprecated.
    let addr_endpoint =
        match add_and_acquire_slaac_addr(ctx, device_id, addr_sub, SlaacType::Temporary, false) {
            Some(addr_endpoint) => addr_endpoint,
            None => return false,
        };

    let _: Option<C::Instant> = ctx.schedule_timer(
        preferred_for,
        NdpTimerId::new_temp_slaac_addr_deprecation(device_id, addr_sub),
    );
    let _: Option<C::Instant> = ctx.schedule_timer(
        valid_for,
        NdpTimerId::new_temp_slaac_addr_invalidation(device_id, addr_sub),
    );
    let _: Option<C::Instant> = ctx.schedule_timer(
        preferred_for - regen_advance,
        NdpTimerId::new_temp_slaac_addr_regeneration(device_id, addr_sub),
    );

    state.generation_attempts += 1;
    assert_matches!(
        state.temp_addrs.insert(
            addr_sub.addr(),
            TempSlaacAddrState { created_at: now, addr_endpoint, regenerated: false },
        ),
        None
    );

    true
}

/// Attempts a fresh temporary address generation for `prefix`.
///
/// # Panics
///
/// Panics if no SLAAC state exists for `prefix`.
pub(crate) fn regenerate_temporary_slaac_addr<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
    reset_generation_attempts: bool,
) {
    let mut state = ctx
        .get_state_mut(device_id)
        .slaac_prefixes
        .remove(&prefix)
        .unwrap_or_else(|| panic!("slaac: no state to regenerate temporary address for {}", prefix));
    let _: bool =
        generate_temp_slaac_addr(ctx, device_id, prefix, &mut state, reset_generation_attempts);
    assert_matches!(ctx.get_state_mut(device_id).slaac_prefixes.insert(prefix, state), None);
}

/// Refreshes the lifetimes of a SLAAC prefix from a new Prefix Information
/// option, as per [RFC 4862 section 5.5.3.e] and [RFC 4941 section 3.4].
///
/// [RFC 4862 section 5.5.3.e]: https://tools.ietf.org/html/rfc4862#section-5.5.3
/// [RFC 4941 section 3.4]: https://tools.ietf.org/html/rfc4941#section-3.4
fn refresh_slaac_prefix_lifetimes<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
    state: &mut SlaacPrefixState<C::Instant, C::AddressEndpoint>,
    preferred_lifetime: Option<NonZeroNdpLifetime>,
    valid_lifetime: Option<NonZeroNdpLifetime>,
) {
    let stable_endpoint = state
        .stable_addr
        .addr_endpoint
        .clone()
        .expect("slaac: refreshed prefix must have a stable address");

    // A zero preferred lifetime deprecates the stable address right away;
    // anything else makes it preferred again.
    let deprecated = preferred_lifetime.is_none();
    if deprecated {
        deprecate_slaac_addr(ctx, device_id, &stable_endpoint);
    } else {
        stable_endpoint.set_deprecated(false);
    }

    let _: Option<C::Instant> =
        ctx.cancel_timer(NdpTimerId::new_slaac_prefix_deprecation(device_id, prefix));

    let now = ctx.now();
    match preferred_lifetime {
        None => state.preferred_until = Some(now),
        Some(NonZeroNdpLifetime::Finite(preferred_lifetime)) => {
            let _: Option<C::Instant> = ctx.schedule_timer(
                preferred_lifetime.get(),
                NdpTimerId::new_slaac_prefix_deprecation(device_id, prefix),
            );
            state.preferred_until = Some(now.checked_add(preferred_lifetime.get()).unwrap());
        }
        Some(NonZeroNdpLifetime::Infinite) => state.preferred_until = None,
    }

    // As per RFC 4862 section 5.5.3.e, update the valid lifetime:
    //
    // 1) If the received Valid Lifetime is greater than 2 hours or greater
    //    than RemainingLifetime, set the valid lifetime to the advertised
    //    value.
    //
    // 2) If RemainingLifetime is less than or equal to 2 hours, ignore the
    //    advertised Valid Lifetime.
    //
    // 3) Otherwise, reset the valid lifetime to 2 hours.
    match valid_lifetime {
        Some(NonZeroNdpLifetime::Infinite) => {
            let _: Option<C::Instant> =
                ctx.cancel_timer(NdpTimerId::new_slaac_prefix_invalidation(device_id, prefix));
            state.valid_until = None;
        }
        valid_lifetime => {
            let valid_for = match valid_lifetime {
                Some(NonZeroNdpLifetime::Finite(valid_lifetime)) => valid_lifetime.get(),
                None => Duration::ZERO,
                Some(NonZeroNdpLifetime::Infinite) => unreachable!(),
            };
            // `None` remaining lifetime means the prefix was valid forever.
            let remaining = state.valid_until.map(|v| v.saturating_duration_since(now));

            let effective_valid_for = if valid_for > MIN_PREFIX_VALID_LIFETIME_FOR_UPDATE
                || remaining.map_or(false, |remaining| valid_for > remaining)
            {
                Some(valid_for)
            } else if remaining.map_or(true, |remaining| {
                remaining > MIN_PREFIX_VALID_LIFETIME_FOR_UPDATE
            }) {
                Some(MIN_PREFIX_VALID_LIFETIME_FOR_UPDATE)
            } else {
                trace!(
                    "refresh_slaac_prefix_lifetimes: ignoring valid lifetime {:?} for {} with \
                     remaining lifetime {:?}",
                    valid_for,
                    prefix,
                    remaining
                );
                None
            };

            if let Some(effective_valid_for) = effective_valid_for {
                let _: Option<C::Instant> = ctx.schedule_timer(
                    effective_valid_for,
                    NdpTimerId::new_slaac_prefix_invalidation(device_id, prefix),
                );
                state.valid_until = Some(now.checked_add(effective_valid_for).unwrap());
            }
        }
    }

    // If DAD is not yet complete on the stable address there is no
    // temporary address work to do.
    if stable_endpoint.kind() != AddressKind::Permanent {
        return;
    }

    let (max_valid_lifetime, max_preferred_lifetime, regen_advance, desync_factor) = {
        let ndp_state = ctx.get_state(device_id);
        (
            ndp_state.config.max_temp_addr_valid_lifetime,
            ndp_state.config.max_temp_addr_preferred_lifetime,
            ndp_state.config.regen_advance_duration,
            ndp_state.desync_factor,
        )
    };

    let mut regen_for_addr = None;
    let mut all_addresses_regenerated = true;
    let temp_addrs: Vec<UnicastAddr<Ipv6Addr>> = state.temp_addrs.keys().copied().collect();
    for addr in temp_addrs {
        let (created_at, addr_endpoint, regenerated) = {
            let temp_state = state.temp_addrs.get(&addr).unwrap();
            (temp_state.created_at, temp_state.addr_endpoint.clone(), temp_state.regenerated)
        };
        let addr_sub = addr_endpoint.addr_sub();

        // The temporary address's lifetimes are relative to its creation
        // time and bounded by the prefix's, as per RFC 4941 section 3.3
        // step 4.
        let mut valid_until = created_at.checked_add(max_valid_lifetime).unwrap();
        if let Some(prefix_valid_until) = state.valid_until {
            valid_until = valid_until.min(prefix_valid_until);
        }
        let new_valid_lifetime = valid_until.saturating_duration_since(now);
        if new_valid_lifetime == Duration::ZERO {
            invalidate_temp_slaac_addr(ctx, device_id, &mut state.temp_addrs, addr_sub);
            continue;
        }
        let _: Option<C::Instant> = ctx.schedule_timer(
            new_valid_lifetime,
            NdpTimerId::new_temp_slaac_addr_invalidation(device_id, addr_sub),
        );

        let mut preferred_until = created_at
            .checked_add(max_preferred_lifetime.saturating_sub(desync_factor))
            .unwrap();
        if let Some(prefix_preferred_until) = state.preferred_until {
            preferred_until = preferred_until.min(prefix_preferred_until);
        }
        let new_preferred_lifetime = preferred_until.saturating_duration_since(now);
        let _: Option<C::Instant> =
            ctx.cancel_timer(NdpTimerId::new_temp_slaac_addr_deprecation(device_id, addr_sub));
        if new_preferred_lifetime == Duration::ZERO {
            deprecate_slaac_addr(ctx, device_id, &addr_endpoint);
        } else {
            addr_endpoint.set_deprecated(false);
            let _: Option<C::Instant> = ctx.schedule_timer(
                new_preferred_lifetime,
                NdpTimerId::new_temp_slaac_addr_deprecation(device_id, addr_sub),
            );
        }

        let _: Option<C::Instant> =
            ctx.cancel_timer(NdpTimerId::new_temp_slaac_addr_regeneration(device_id, addr_sub));
        if !regenerated {
            all_addresses_regenerated = false;

            if new_preferred_lifetime <= regen_advance {
                // The remaining preferred lifetime is no longer enough to
                // regenerate ahead of deprecation; regenerate right after
                // the iteration, so at most one successor is created per
                // refresh even if several addresses qualify.
                regen_for_addr = Some(addr);
            } else {
                let _: Option<C::Instant> = ctx.schedule_timer(
                    new_preferred_lifetime - regen_advance,
                    NdpTimerId::new_temp_slaac_addr_regeneration(device_id, addr_sub),
                );
            }
        }
    }

    // Generate a new temporary address if one must be regenerated
    // immediately, or if every existing temporary address has already been
    // regenerated (in which case no regeneration timer would otherwise
    // produce a successor).
    if regen_for_addr.is_some() || all_addresses_regenerated {
        if generate_temp_slaac_addr(
            ctx,
            device_id,
            prefix,
            state,
            true, /* reset_generation_attempts */
        ) {
            // Only the address that triggered the immediate regeneration is
            // marked; a generation triggered by `all_addresses_regenerated`
            // leaves the flags untouched.
            if let Some(addr) = regen_for_addr {
                if let Some(temp_state) = state.temp_addrs.get_mut(&addr) {
                    temp_state.regenerated = true;
                }
            }
        }
    }
}

/// Marks `addr_endpoint` deprecated and notifies the dispatcher.
///
/// Does nothing if the address is already deprecated.
fn deprecate_slaac_addr<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    addr_endpoint: &C::AddressEndpoint,
) {
    if addr_endpoint.is_deprecated() {
        return;
    }

    addr_endpoint.set_deprecated(true);
    if let Some(dispatcher) = ctx.dispatcher_mut() {
        dispatcher.on_auto_gen_address_deprecated(device_id, addr_endpoint.addr_sub());
    }
}

/// Consults the dispatcher, adds the address to the parent endpoint, and
/// starts DAD on it.
///
/// Returns `None` when no dispatcher is registered or the dispatcher
/// vetoed the address.
fn add_and_acquire_slaac_addr<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
    slaac_type: SlaacType,
    deprecated: bool,
) -> Option<C::AddressEndpoint> {
    match ctx.dispatcher_mut() {
        Some(dispatcher) => {
            if !dispatcher.on_auto_gen_address(device_id, addr_sub) {
                // Informed by the integrator to not add the address.
                return None;
            }
        }
        None => return None,
    }

    // The generated address was checked against the endpoint's table, so
    // an exists failure here means the table changed underneath us.
    let addr_endpoint = ctx
        .add_slaac_addr(device_id, addr_sub, slaac_type, deprecated)
        .unwrap_or_else(|ExistsError| {
            panic!("slaac: error adding {:?} address {:?}: already exists", slaac_type, addr_sub)
        });

    dad::start_duplicate_address_detection(
        ctx,
        device_id,
        addr_sub.addr().get(),
        addr_endpoint.clone(),
    )
    .expect("generated address is unicast");

    Some(addr_endpoint)
}

/// Invalidates a temporary SLAAC address: removes it from the endpoint,
/// cancels its timers, drops its handle and notifies the dispatcher.
///
/// # Panics
///
/// Panics if no state exists for the address.
fn invalidate_temp_slaac_addr<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    temp_addrs: &mut HashMap<UnicastAddr<Ipv6Addr>, TempSlaacAddrState<C::Instant, C::AddressEndpoint>>,
    addr_sub: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
) {
    let TempSlaacAddrState { created_at: _, addr_endpoint, regenerated: _ } = temp_addrs
        .remove(&addr_sub.addr())
        .unwrap_or_else(|| panic!("slaac: no state for temporary address {:?}", addr_sub));

    // The address may still have been tentative.
    dad::stop_duplicate_address_detection(ctx, device_id, addr_sub.addr());
    ctx.remove_slaac_addr(device_id, &addr_sub.addr());

    let _: Option<C::Instant> =
        ctx.cancel_timer(NdpTimerId::new_temp_slaac_addr_deprecation(device_id, addr_sub));
    let _: Option<C::Instant> =
        ctx.cancel_timer(NdpTimerId::new_temp_slaac_addr_invalidation(device_id, addr_sub));
    let _: Option<C::Instant> =
        ctx.cancel_timer(NdpTimerId::new_temp_slaac_addr_regeneration(device_id, addr_sub));

    if let Some(dispatcher) = ctx.dispatcher_mut() {
        dispatcher.on_auto_gen_address_invalidated(device_id, addr_sub);
    }

    drop(addr_endpoint);
}

/// Invalidates a SLAAC prefix whose entry has already been removed from
/// the table: every temporary address, then the stable address, then the
/// prefix's own timers.
fn invalidate_slaac_prefix<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
    mut state: SlaacPrefixState<C::Instant, C::AddressEndpoint>,
) {
    let temp_addr_subs: Vec<_> =
        state.temp_addrs.values().map(|temp_state| temp_state.addr_endpoint.addr_sub()).collect();
    for addr_sub in temp_addr_subs {
        invalidate_temp_slaac_addr(ctx, device_id, &mut state.temp_addrs, addr_sub);
    }

    let _: Option<C::Instant> =
        ctx.cancel_timer(NdpTimerId::new_slaac_prefix_deprecation(device_id, prefix));
    let _: Option<C::Instant> =
        ctx.cancel_timer(NdpTimerId::new_slaac_prefix_invalidation(device_id, prefix));

    if let Some(addr_endpoint) = state.stable_addr.addr_endpoint.take() {
        let addr_sub = addr_endpoint.addr_sub();
        dad::stop_duplicate_address_detection(ctx, device_id, addr_sub.addr());
        // The removal must not cascade back into prefix invalidation; we
        // are already performing it.
        ctx.remove_slaac_addr(device_id, &addr_sub.addr());
        if let Some(dispatcher) = ctx.dispatcher_mut() {
            dispatcher.on_auto_gen_address_invalidated(device_id, addr_sub);
        }
        drop(addr_endpoint);
    }
}

/// Handles the expiration of a SLAAC prefix's preferred lifetime.
///
/// # Panics
///
/// Panics if no state exists for the prefix.
pub(crate) fn handle_prefix_deprecation_timer<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
) {
    let stable_endpoint = {
        let state = ctx.get_state(device_id);
        let prefix_state = state
            .slaac_prefixes
            .get(&prefix)
            .unwrap_or_else(|| panic!("slaac: no state for deprecated prefix {}", prefix));
        prefix_state
            .stable_addr
            .addr_endpoint
            .clone()
            .expect("deprecated SLAAC prefix must have a stable address")
    };

    deprecate_slaac_addr(ctx, device_id, &stable_endpoint);
}

/// Handles the expiration of a SLAAC prefix's valid lifetime.
///
/// # Panics
///
/// Panics if no state exists for the prefix.
pub(crate) fn handle_prefix_invalidation_timer<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
) {
    let state = ctx
        .get_state_mut(device_id)
        .slaac_prefixes
        .remove(&prefix)
        .unwrap_or_else(|| panic!("slaac: no state for invalidated prefix {}", prefix));
    invalidate_slaac_prefix(ctx, device_id, prefix, state);
}

/// Handles the expiration of a temporary address's preferred lifetime.
///
/// # Panics
///
/// Panics if no state exists for the prefix or the address.
pub(crate) fn handle_temp_addr_deprecation_timer<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    addr_subnet: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
) {
    let addr_endpoint = {
        let state = ctx.get_state(device_id);
        let prefix_state = state.slaac_prefixes.get(&addr_subnet.subnet()).unwrap_or_else(|| {
            panic!("slaac: no prefix state to deprecate temporary address {:?}", addr_subnet)
        });
        let temp_state = prefix_state.temp_addrs.get(&addr_subnet.addr()).unwrap_or_else(|| {
            panic!("slaac: no state to deprecate temporary address {:?}", addr_subnet)
        });
        temp_state.addr_endpoint.clone()
    };

    deprecate_slaac_addr(ctx, device_id, &addr_endpoint);
}

/// Handles the expiration of a temporary address's valid lifetime.
///
/// # Panics
///
/// Panics if no state exists for the prefix or the address.
pub(crate) fn handle_temp_addr_invalidation_timer<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    addr_subnet: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
) {
    let prefix = addr_subnet.subnet();
    let mut state =
        ctx.get_state_mut(device_id).slaac_prefixes.remove(&prefix).unwrap_or_else(|| {
            panic!("slaac: no prefix state to invalidate temporary address {:?}", addr_subnet)
        });
    invalidate_temp_slaac_addr(ctx, device_id, &mut state.temp_addrs, addr_subnet);
    assert_matches!(ctx.get_state_mut(device_id).slaac_prefixes.insert(prefix, state), None);
}

/// Handles a temporary address's regeneration timer: generates its
/// successor unless one already exists.
///
/// # Panics
///
/// Panics if no state exists for the prefix or the address.
pub(crate) fn handle_temp_addr_regeneration_timer<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    addr_subnet: AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>>,
) {
    let prefix = addr_subnet.subnet();
    let mut state =
        ctx.get_state_mut(device_id).slaac_prefixes.remove(&prefix).unwrap_or_else(|| {
            panic!("slaac: no prefix state to regenerate temporary address after {:?}", addr_subnet)
        });

    let regenerated = state
        .temp_addrs
        .get(&addr_subnet.addr())
        .unwrap_or_else(|| {
            panic!("slaac: no state to regenerate temporary address after {:?}", addr_subnet)
        })
        .regenerated;

    // If a successor has already been generated for this address, don't
    // generate another one.
    if !regenerated {
        let generated = generate_temp_slaac_addr(
            ctx,
            device_id,
            prefix,
            &mut state,
            true, /* reset_generation_attempts */
        );
        state.temp_addrs.get_mut(&addr_subnet.addr()).unwrap().regenerated = generated;
    }

    assert_matches!(ctx.get_state_mut(device_id).slaac_prefixes.insert(prefix, state), None);
}

/// Handles the discovery that `addr` is a duplicate on the link.
///
/// DAD is stopped and the address removed; a stable SLAAC address is
/// regenerated under its prefix (invalidating the prefix if regeneration
/// is impossible), and a temporary SLAAC address's prefix attempts a fresh
/// temporary generation without resetting the attempt counter.
pub(crate) fn handle_duplicate_address_detected<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    addr: UnicastAddr<Ipv6Addr>,
) {
    dad::stop_duplicate_address_detection(ctx, device_id, addr);

    enum Owner {
        Stable,
        Temporary,
    }

    let owner = {
        let state = ctx.get_state(device_id);
        state.slaac_prefixes.iter().find_map(|(prefix, prefix_state)| {
            if prefix_state
                .stable_addr
                .addr_endpoint
                .as_ref()
                .map_or(false, |addr_endpoint| addr_endpoint.addr_sub().addr() == addr)
            {
                Some((*prefix, Owner::Stable))
            } else if prefix_state.temp_addrs.contains_key(&addr) {
                Some((*prefix, Owner::Temporary))
            } else {
                None
            }
        })
    };

    let (prefix, owner) = match owner {
        Some(owner) => owner,
        // Not a SLAAC-managed address; nothing further to do.
        None => return,
    };

    let mut state = ctx.get_state_mut(device_id).slaac_prefixes.remove(&prefix).unwrap();
    match owner {
        Owner::Stable => {
            let addr_endpoint = state.stable_addr.addr_endpoint.take().unwrap();
            let addr_sub = addr_endpoint.addr_sub();
            ctx.remove_slaac_addr(device_id, &addr);
            if let Some(dispatcher) = ctx.dispatcher_mut() {
                dispatcher.on_auto_gen_address_invalidated(device_id, addr_sub);
            }
            drop(addr_endpoint);

            // Try again with a fresh interface identifier; without an
            // address there is no reason to keep state for the prefix.
            if generate_slaac_addr(ctx, device_id, prefix, &mut state) {
                assert_matches!(
                    ctx.get_state_mut(device_id).slaac_prefixes.insert(prefix, state),
                    None
                );
            } else {
                invalidate_slaac_prefix(ctx, device_id, prefix, state);
            }
        }
        Owner::Temporary => {
            let addr_sub = state.temp_addrs.get(&addr).unwrap().addr_endpoint.addr_sub();
            invalidate_temp_slaac_addr(ctx, device_id, &mut state.temp_addrs, addr_sub);
            let _: bool = generate_temp_slaac_addr(
                ctx,
                device_id,
                prefix,
                &mut state,
                false, /* reset_generation_attempts */
            );
            assert_matches!(
                ctx.get_state_mut(device_id).slaac_prefixes.insert(prefix, state),
                None
            );
        }
    }
}

/// Invalidates all SLAAC prefixes, optionally sparing the link-local one.
pub(crate) fn remove_slaac_addresses<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    keep_link_local: bool,
) {
    let prefixes: Vec<Subnet<Ipv6Addr>> =
        ctx.get_state(device_id).slaac_prefixes.keys().copied().collect();
    let mut link_local_prefixes = 0;

    for prefix in prefixes {
        // RFC 4862 section 5 states that routers are also expected to
        // generate a link-local address, so host-only cleanup keeps it.
        if keep_link_local && prefix == LINK_LOCAL_SUBNET {
            link_local_prefixes += 1;
            continue;
        }

        let state = ctx.get_state_mut(device_id).slaac_prefixes.remove(&prefix).unwrap();
        invalidate_slaac_prefix(ctx, device_id, prefix, state);
    }

    let remaining = ctx.get_state(device_id).slaac_prefixes.len();
    assert_eq!(
        remaining, link_local_prefixes,
        "slaac: still have non-link-local SLAAC prefixes after cleanup",
    );
}

/// Builds an address by appending an interface identifier to a /64 prefix.
///
/// # Panics
///
/// Panics if the prefix length is not a multiple of 8 bits or does not
/// leave exactly 64 bits for the interface identifier.
fn generate_global_address(
    prefix: &Subnet<Ipv6Addr>,
    iid: &[u8; IID_BYTES],
) -> AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>> {
    let prefix_len = usize::from(prefix.prefix() / 8);
    assert_eq!(prefix_len + IID_BYTES, 16);

    let mut address = prefix.network().ipv6_bytes();
    address[prefix_len..].copy_from_slice(&iid[..]);

    let addr_sub = AddrSubnet::new(Ipv6Addr::from(address), prefix.prefix()).unwrap();
    assert_eq!(addr_sub.subnet(), *prefix);

    addr_sub
}

#[cfg(test)]
mod tests {
    use net_declare::net_subnet_v6;

    use super::*;
    use crate::config::{NdpConfigurations, OpaqueIidOptions};
    use crate::context::testutil::FakeInstant;
    use crate::context::TimerContext as _;
    use crate::opaque_iid::STABLE_IID_SECRET_KEY_BYTES;
    use crate::state::InnerNdpTimerId;
    use crate::testutil::{
        ra_with_prefix, router_ip, DispatchedEvent, FakeNdpCtx, FAKE_DEVICE_ID,
    };

    const PREFIX: Subnet<Ipv6Addr> = net_subnet_v6!("2001:db8::/64");
    const SECRET_KEY: [u8; STABLE_IID_SECRET_KEY_BYTES] = [0xaa; STABLE_IID_SECRET_KEY_BYTES];
    const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);
    const SEVEN_DAYS: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    const ONE_HOUR: Duration = Duration::from_secs(60 * 60);
    const TWO_HOURS: Duration = Duration::from_secs(2 * 60 * 60);
    const THREE_HOURS: Duration = Duration::from_secs(3 * 60 * 60);

    fn opaque_config() -> NdpConfigurations {
        NdpConfigurations {
            dup_addr_detect_transmits: 0,
            opaque_iid: Some(OpaqueIidOptions {
                nic_name: "nic0".to_string(),
                secret_key: SECRET_KEY,
            }),
            ..Default::default()
        }
    }

    fn stable_only_config() -> NdpConfigurations {
        NdpConfigurations {
            auto_gen_temp_global_addresses: false,
            ..opaque_config()
        }
    }

    fn expected_stable_addr(dad_counter: u8) -> AddrSubnet<Ipv6Addr, UnicastAddr<Ipv6Addr>> {
        let iid = generate_opaque_interface_identifier(
            PREFIX,
            b"nic0",
            &[],
            dad_counter,
            &SECRET_KEY,
        );
        let mut iid_bytes = [0; IID_BYTES];
        iid_bytes.copy_from_slice(&iid.to_be_bytes()[..IID_BYTES]);
        generate_global_address(&PREFIX, &iid_bytes)
    }

    fn receive_pi(ctx: &mut FakeNdpCtx, preferred_secs: u32, valid_secs: u32) {
        let (ra, options_bytes) =
            ra_with_prefix(0, PREFIX, false, true, valid_secs, preferred_secs);
        ctx.receive_ra(&ra, &options_bytes, router_ip());
    }

    #[test]
    fn new_prefix_generates_stable_and_temporary_addrs() {
        let mut ctx = FakeNdpCtx::with_config(opaque_config());

        let (ra, options_bytes) = ra_with_prefix(
            0,
            PREFIX,
            true, /* on_link */
            true, /* autonomous */
            SEVEN_DAYS.as_secs() as u32,
            ONE_DAY.as_secs() as u32,
        );
        ctx.receive_ra(&ra, &options_bytes, router_ip());

        // On-link and SLAAC processing both ran for the same option.
        assert_eq!(ctx.get_state(FAKE_DEVICE_ID).on_link_prefixes.len(), 1);
        let state = ctx.get_state(FAKE_DEVICE_ID);
        let prefix_state = state.slaac_prefixes.get(&PREFIX).expect("SLAAC state for prefix");

        let stable = prefix_state.stable_addr.addr_endpoint.as_ref().unwrap();
        let stable_addr_sub = expected_stable_addr(0);
        assert_eq!(stable.addr_sub(), stable_addr_sub);
        assert_eq!(stable.kind(), AddressKind::Permanent);
        assert!(!stable.is_deprecated());

        assert_eq!(prefix_state.temp_addrs.len(), 1);
        let (temp_addr, temp_state) = prefix_state.temp_addrs.iter().next().unwrap();
        let temp_addr_sub = temp_state.addr_endpoint.addr_sub();
        assert_eq!(temp_addr_sub.subnet(), PREFIX);
        assert_ne!(*temp_addr, stable_addr_sub.addr());
        assert!(!temp_state.addr_endpoint.is_deprecated());
        assert!(!temp_state.regenerated);

        // Prefix timers at pl/vl; temporary address timers with
        // regeneration scheduled REGEN_ADVANCE before deprecation and
        // deprecation desync-adjusted below one day.
        let timers = &ctx.timers;
        assert_eq!(
            timers.scheduled_instant(NdpTimerId::new_slaac_prefix_deprecation(
                FAKE_DEVICE_ID,
                PREFIX
            )),
            Some(FakeInstant::from(ONE_DAY))
        );
        assert_eq!(
            timers.scheduled_instant(NdpTimerId::new_slaac_prefix_invalidation(
                FAKE_DEVICE_ID,
                PREFIX
            )),
            Some(FakeInstant::from(SEVEN_DAYS))
        );

        let temp_deprecation = timers
            .scheduled_instant(NdpTimerId::new_temp_slaac_addr_deprecation(
                FAKE_DEVICE_ID,
                temp_addr_sub,
            ))
            .expect("temporary deprecation timer");
        let temp_invalidation = timers
            .scheduled_instant(NdpTimerId::new_temp_slaac_addr_invalidation(
                FAKE_DEVICE_ID,
                temp_addr_sub,
            ))
            .expect("temporary invalidation timer");
        let temp_regen = timers
            .scheduled_instant(NdpTimerId::new_temp_slaac_addr_regeneration(
                FAKE_DEVICE_ID,
                temp_addr_sub,
            ))
            .expect("temporary regeneration timer");

        assert!(temp_deprecation <= FakeInstant::from(ONE_DAY));
        assert!(temp_invalidation <= FakeInstant::from(SEVEN_DAYS));
        assert_eq!(temp_regen + Duration::from_secs(5), temp_deprecation);
        assert!(temp_deprecation <= temp_invalidation);

        // Event order: generated before anything else, stable before
        // temporary.
        let events = ctx.dispatcher.take_events();
        let generated: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                DispatchedEvent::AddressGenerated(addr_sub) => Some(*addr_sub),
                _ => None,
            })
            .collect();
        assert_eq!(generated, [stable_addr_sub, temp_addr_sub]);
    }

    #[test]
    fn eui64_addr_generated_without_opaque_config() {
        let mut ctx = FakeNdpCtx::with_config(NdpConfigurations {
            dup_addr_detect_transmits: 0,
            auto_gen_temp_global_addresses: false,
            ..Default::default()
        });

        receive_pi(&mut ctx, 1800, 3600);

        let state = ctx.get_state(FAKE_DEVICE_ID);
        let prefix_state = state.slaac_prefixes.get(&PREFIX).expect("SLAAC state for prefix");
        let stable = prefix_state.stable_addr.addr_endpoint.as_ref().unwrap();

        let mac = ctx.link_layer_addr(FAKE_DEVICE_ID).unwrap();
        assert_eq!(stable.addr_sub(), generate_global_address(&PREFIX, &mac.to_eui64()));
    }

    #[test]
    fn no_link_layer_addr_and_no_opaque_config_generates_nothing() {
        let mut ctx = FakeNdpCtx::with_config(NdpConfigurations {
            dup_addr_detect_transmits: 0,
            ..Default::default()
        });
        ctx.link_layer_addr = None;

        receive_pi(&mut ctx, 1800, 3600);

        assert_eq!(ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.len(), 0);
        ctx.timers.assert_no_timers_installed();
    }

    #[test]
    fn preferred_lifetime_greater_than_valid_is_ignored() {
        let mut ctx = FakeNdpCtx::with_config(opaque_config());

        receive_pi(&mut ctx, 7200, 3600);

        // Only the DHCPv6 signal was delivered; the option itself was
        // silently dropped.
        assert_eq!(ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.len(), 0);
        assert_eq!(
            ctx.dispatcher.take_events(),
            [DispatchedEvent::Dhcpv6(crate::dispatcher::Dhcpv6Configuration::NoConfiguration)]
        );
        ctx.timers.assert_no_timers_installed();
    }

    #[test]
    fn vetoed_address_means_no_prefix_state() {
        let mut ctx = FakeNdpCtx::with_config(stable_only_config());
        ctx.dispatcher.reject_auto_gen_addr = true;

        receive_pi(&mut ctx, 1800, 3600);

        assert_eq!(ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.len(), 0);
        assert!(!ctx.has_addr(FAKE_DEVICE_ID, &expected_stable_addr(0).addr()));
        ctx.timers.assert_no_timers_installed();
    }

    #[test]
    fn refresh_two_hour_rule() {
        let mut ctx = FakeNdpCtx::with_config(stable_only_config());

        // Prefix valid for 3 hours.
        receive_pi(&mut ctx, 0, THREE_HOURS.as_secs() as u32);
        assert_eq!(
            ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap().valid_until,
            Some(FakeInstant::from(THREE_HOURS))
        );

        // An advertised valid lifetime of 1 hour is neither greater than 2
        // hours nor greater than the remaining 3 hours, and the remaining
        // lifetime exceeds 2 hours: reset to exactly 2 hours.
        receive_pi(&mut ctx, 0, ONE_HOUR.as_secs() as u32);
        assert_eq!(
            ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap().valid_until,
            Some(FakeInstant::from(TWO_HOURS))
        );
        assert_eq!(
            ctx.timers.scheduled_instant(NdpTimerId::new_slaac_prefix_invalidation(
                FAKE_DEVICE_ID,
                PREFIX
            )),
            Some(FakeInstant::from(TWO_HOURS))
        );

        // Remaining lifetime now at most 2 hours: a short advertised
        // lifetime is ignored outright.
        receive_pi(&mut ctx, 0, ONE_HOUR.as_secs() as u32);
        assert_eq!(
            ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap().valid_until,
            Some(FakeInstant::from(TWO_HOURS))
        );

        // A lifetime above 2 hours is always applied.
        receive_pi(&mut ctx, 0, THREE_HOURS.as_secs() as u32);
        assert_eq!(
            ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap().valid_until,
            Some(FakeInstant::from(THREE_HOURS))
        );
    }

    #[test]
    fn refresh_is_idempotent() {
        let mut ctx = FakeNdpCtx::with_config(stable_only_config());

        receive_pi(&mut ctx, 1800, THREE_HOURS.as_secs() as u32);
        let (valid_until, preferred_until) = {
            let state = ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap();
            (state.valid_until, state.preferred_until)
        };

        // Same lifetimes at the same (fake) clock reading leave the
        // absolute deadlines untouched.
        receive_pi(&mut ctx, 1800, THREE_HOURS.as_secs() as u32);
        let state = ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap();
        assert_eq!(state.valid_until, valid_until);
        assert_eq!(state.preferred_until, preferred_until);
    }

    #[test]
    fn refresh_zero_preferred_deprecates_and_nonzero_restores() {
        let mut ctx = FakeNdpCtx::with_config(stable_only_config());

        receive_pi(&mut ctx, 1800, THREE_HOURS.as_secs() as u32);
        let stable = {
            let state = ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap();
            state.stable_addr.addr_endpoint.clone().unwrap()
        };
        let _: Vec<DispatchedEvent> = ctx.dispatcher.take_events();

        receive_pi(&mut ctx, 0, THREE_HOURS.as_secs() as u32);
        assert!(stable.is_deprecated());
        assert_eq!(
            ctx.dispatcher.take_events(),
            [DispatchedEvent::AddressDeprecated(stable.addr_sub())]
        );
        // No deprecation timer while already deprecated.
        assert_eq!(
            ctx.timers.scheduled_instant(NdpTimerId::new_slaac_prefix_deprecation(
                FAKE_DEVICE_ID,
                PREFIX
            )),
            None
        );

        // A refresh with a non-zero preferred lifetime un-deprecates
        // without an event.
        receive_pi(&mut ctx, 1800, THREE_HOURS.as_secs() as u32);
        assert!(!stable.is_deprecated());
        assert!(ctx.dispatcher.take_events().is_empty());
    }

    #[test]
    fn prefix_deprecation_and_invalidation_timers_fire() {
        let mut ctx = FakeNdpCtx::with_config(stable_only_config());

        receive_pi(&mut ctx, 1800, 3600);
        let stable = {
            let state = ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap();
            state.stable_addr.addr_endpoint.clone().unwrap()
        };
        let stable_addr_sub = stable.addr_sub();
        let _: Vec<DispatchedEvent> = ctx.dispatcher.take_events();

        assert_eq!(
            ctx.trigger_next_timer().map(|id| id.inner),
            Some(InnerNdpTimerId::SlaacPrefixDeprecation { subnet: PREFIX })
        );
        assert!(stable.is_deprecated());
        assert_eq!(
            ctx.dispatcher.take_events(),
            [DispatchedEvent::AddressDeprecated(stable_addr_sub)]
        );

        assert_eq!(
            ctx.trigger_next_timer().map(|id| id.inner),
            Some(InnerNdpTimerId::SlaacPrefixInvalidation { subnet: PREFIX })
        );
        assert_eq!(
            ctx.dispatcher.take_events(),
            [DispatchedEvent::AddressInvalidated(stable_addr_sub)]
        );
        assert_eq!(ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.len(), 0);
        assert!(!ctx.has_addr(FAKE_DEVICE_ID, &stable_addr_sub.addr()));
        ctx.timers.assert_no_timers_installed();
    }

    #[test]
    fn temporary_addr_regenerates_before_deprecation() {
        let mut ctx = FakeNdpCtx::with_config(opaque_config());

        receive_pi(&mut ctx, ONE_DAY.as_secs() as u32, SEVEN_DAYS.as_secs() as u32);

        let first_temp_addr_sub = {
            let state = ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap();
            assert_eq!(state.temp_addrs.len(), 1);
            state.temp_addrs.values().next().unwrap().addr_endpoint.addr_sub()
        };
        let _: Vec<DispatchedEvent> = ctx.dispatcher.take_events();

        // The first timer to fire for the temporary address is its
        // regeneration.
        assert_eq!(
            ctx.trigger_next_timer().map(|id| id.inner),
            Some(InnerNdpTimerId::TempSlaacAddrRegeneration {
                addr_subnet: first_temp_addr_sub
            })
        );

        let state = ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap();
        assert_eq!(state.temp_addrs.len(), 2);
        assert!(state.temp_addrs.get(&first_temp_addr_sub.addr()).unwrap().regenerated);
        let successor = state
            .temp_addrs
            .iter()
            .find(|(addr, _)| **addr != first_temp_addr_sub.addr())
            .map(|(_, temp_state)| temp_state)
            .unwrap();
        assert!(!successor.regenerated);

        let events = ctx.dispatcher.take_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, DispatchedEvent::AddressGenerated(_)))
                .count(),
            1
        );
    }

    #[test]
    fn temp_generation_refused_for_link_local() {
        let mut ctx = FakeNdpCtx::with_config(opaque_config());

        perform_link_local_slaac(&mut ctx, FAKE_DEVICE_ID);

        let state = ctx.get_state(FAKE_DEVICE_ID);
        let prefix_state = state.slaac_prefixes.get(&LINK_LOCAL_SUBNET).unwrap();
        assert!(prefix_state.stable_addr.addr_endpoint.is_some());
        assert_eq!(prefix_state.temp_addrs.len(), 0);
        // Infinite lifetimes: no prefix timers.
        ctx.timers.assert_no_timers_installed();
    }

    #[test]
    fn dad_conflict_regenerates_stable_addr_with_opaque_iids() {
        let mut ctx = FakeNdpCtx::with_config(NdpConfigurations {
            auto_gen_address_conflict_retries: 2,
            dup_addr_detect_transmits: 1,
            auto_gen_temp_global_addresses: false,
            opaque_iid: Some(OpaqueIidOptions {
                nic_name: "nic0".to_string(),
                secret_key: SECRET_KEY,
            }),
            ..Default::default()
        });

        receive_pi(&mut ctx, 1800, 3600);
        let first_addr = expected_stable_addr(0);
        assert!(ctx.has_addr(FAKE_DEVICE_ID, &first_addr.addr()));
        let _: Vec<DispatchedEvent> = ctx.dispatcher.take_events();

        // The network reports the tentative address as a duplicate.
        handle_duplicate_address_detected(&mut ctx, FAKE_DEVICE_ID, first_addr.addr());

        let second_addr = expected_stable_addr(1);
        assert_ne!(first_addr, second_addr);
        assert!(!ctx.has_addr(FAKE_DEVICE_ID, &first_addr.addr()));
        assert!(ctx.has_addr(FAKE_DEVICE_ID, &second_addr.addr()));

        let events = ctx.dispatcher.take_events();
        assert!(events.contains(&DispatchedEvent::AddressInvalidated(first_addr)));
        assert!(events.contains(&DispatchedEvent::AddressGenerated(second_addr)));

        // Two conflicts later the retries are exhausted and the prefix is
        // dropped entirely.
        handle_duplicate_address_detected(&mut ctx, FAKE_DEVICE_ID, second_addr.addr());
        let third_addr = expected_stable_addr(2);
        assert!(ctx.has_addr(FAKE_DEVICE_ID, &third_addr.addr()));

        handle_duplicate_address_detected(&mut ctx, FAKE_DEVICE_ID, third_addr.addr());
        assert_eq!(ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.len(), 0);
        ctx.timers.assert_no_timers_installed();
    }

    #[test]
    fn dad_conflict_without_opaque_iids_invalidates_prefix() {
        let mut ctx = FakeNdpCtx::with_config(NdpConfigurations {
            auto_gen_address_conflict_retries: 2,
            auto_gen_temp_global_addresses: false,
            ..Default::default()
        });

        receive_pi(&mut ctx, 1800, 3600);
        let state = ctx.get_state(FAKE_DEVICE_ID);
        let addr =
            state.slaac_prefixes.get(&PREFIX).unwrap().stable_addr.addr_endpoint.as_ref().unwrap().addr_sub().addr();

        // EUI-64 IIDs cannot produce an alternative address, so the
        // conflict takes the whole prefix down despite the configured
        // retries.
        handle_duplicate_address_detected(&mut ctx, FAKE_DEVICE_ID, addr);
        assert_eq!(ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.len(), 0);
        ctx.timers.assert_no_timers_installed();
    }

    #[test]
    fn local_conflict_retries_with_bumped_counter() {
        let mut ctx = FakeNdpCtx::with_config(stable_only_config());

        // Occupy the address that dad_counter = 0 would produce.
        let colliding = expected_stable_addr(0);
        let _ = ctx.add_manual_addr(colliding.addr().get());

        receive_pi(&mut ctx, 1800, 3600);

        let state = ctx.get_state(FAKE_DEVICE_ID);
        let stable =
            state.slaac_prefixes.get(&PREFIX).unwrap().stable_addr.addr_endpoint.as_ref().unwrap();
        // The local conflict bumped the counter without consuming a DAD
        // retry.
        assert_eq!(stable.addr_sub(), expected_stable_addr(1));
        assert_eq!(
            state.slaac_prefixes.get(&PREFIX).unwrap().stable_addr.local_generation_failures,
            1
        );
    }

    #[test]
    fn stable_dad_resolution_triggers_temp_generation() {
        let mut ctx = FakeNdpCtx::with_config(NdpConfigurations {
            dup_addr_detect_transmits: 1,
            opaque_iid: Some(OpaqueIidOptions {
                nic_name: "nic0".to_string(),
                secret_key: SECRET_KEY,
            }),
            ..Default::default()
        });

        receive_pi(&mut ctx, ONE_DAY.as_secs() as u32, SEVEN_DAYS.as_secs() as u32);

        // While the stable address is tentative there is no temporary
        // address yet.
        assert_eq!(
            ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap().temp_addrs.len(),
            0
        );

        // Probe at t=0, resolution after the retransmit interval.
        let _: Option<_> = ctx.trigger_next_timer();
        let _: Option<_> = ctx.trigger_next_timer();

        let state = ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.get(&PREFIX).unwrap();
        assert_eq!(
            state.stable_addr.addr_endpoint.as_ref().unwrap().kind(),
            AddressKind::Permanent
        );
        assert_eq!(state.temp_addrs.len(), 1);
    }

    #[test]
    fn ra_processed_while_stack_not_configured_for_autogen() {
        let mut ctx = FakeNdpCtx::with_config(NdpConfigurations {
            auto_gen_global_addresses: false,
            ..opaque_config()
        });

        let (ra, options_bytes) = ra_with_prefix(1800, PREFIX, true, true, 3600, 1800);
        ctx.receive_ra(&ra, &options_bytes, router_ip());

        // Router and on-link prefix discovery still ran; SLAAC did not.
        assert_eq!(ctx.get_state(FAKE_DEVICE_ID).default_routers.len(), 1);
        assert_eq!(ctx.get_state(FAKE_DEVICE_ID).on_link_prefixes.len(), 1);
        assert_eq!(ctx.get_state(FAKE_DEVICE_ID).slaac_prefixes.len(), 0);
    }
}
