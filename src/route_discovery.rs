// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Default router and on-link prefix discovery, as per [RFC 4861 section
//! 6.3.4].
//!
//! Both tables are bounded; once full, additional discoveries are ignored
//! rather than evicting older entries. Entries with a finite lifetime have
//! an invalidation timer scheduled; an on-link prefix advertised with an
//! infinite lifetime has none.
//!
//! [RFC 4861 section 6.3.4]: https://tools.ietf.org/html/rfc4861#section-6.3.4

use log::trace;
use net_types::ip::{Ipv6Addr, Subnet};
use net_types::LinkLocalUnicastAddr;
use packet_formats::icmp::ndp::NonZeroNdpLifetime;
use packet_formats::utils::NonZeroDuration;

use crate::config::{MAX_DISCOVERED_DEFAULT_ROUTERS, MAX_DISCOVERED_ON_LINK_PREFIXES};
use crate::context::TimerContext as _;
use crate::ndp::NdpContext;
use crate::state::NdpTimerId;

/// Applies a Router Advertisement's router lifetime to the default router
/// table.
///
/// `lifetime` of `None` means the advertisement carried a zero Router
/// Lifetime: the router is not to be used as a default router.
pub(crate) fn update_default_router<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    ip: LinkLocalUnicastAddr<Ipv6Addr>,
    lifetime: Option<NonZeroDuration>,
) {
    let state = ctx.get_state(device_id);
    let known = state.default_routers.contains(&ip);

    match (known, lifetime) {
        (false, Some(lifetime)) => {
            // A new default router. Only remember it if we currently know
            // about fewer than the maximum number of routers.
            if state.default_routers.len() < MAX_DISCOVERED_DEFAULT_ROUTERS {
                remember_default_router(ctx, device_id, ip, lifetime);
            }
        }
        (true, Some(lifetime)) => {
            // An already discovered default router; reset the invalidation
            // timer.
            trace!("update_default_router: refreshing router {} to {:?}", ip, lifetime);
            let _: Option<C::Instant> = ctx
                .schedule_timer(lifetime.get(), NdpTimerId::new_router_invalidation(device_id, ip));
        }
        (true, None) => {
            // The router is no longer to be used as a default router.
            invalidate_default_router(ctx, device_id, ip);
        }
        (false, None) => {}
    }
}

/// Remembers a newly discovered default router with lifetime `lifetime`.
///
/// The router identified by `ip` must not already be known. Skipped
/// entirely when no dispatcher is registered or when the dispatcher vetoes
/// the discovery.
fn remember_default_router<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    ip: LinkLocalUnicastAddr<Ipv6Addr>,
    lifetime: NonZeroDuration,
) {
    match ctx.dispatcher_mut() {
        Some(dispatcher) => {
            if !dispatcher.on_default_router_discovered(device_id, ip) {
                // Informed by the integrator to not remember the router.
                return;
            }
        }
        None => return,
    }

    trace!("remember_default_router: discovered router {} with lifetime {:?}", ip, lifetime);

    assert!(ctx.get_state_mut(device_id).default_routers.insert(ip));
    let _: Option<C::Instant> =
        ctx.schedule_timer(lifetime.get(), NdpTimerId::new_router_invalidation(device_id, ip));
}

/// Invalidates a discovered default router.
///
/// Does nothing if the router is not currently remembered.
pub(crate) fn invalidate_default_router<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    ip: LinkLocalUnicastAddr<Ipv6Addr>,
) {
    if !ctx.get_state_mut(device_id).default_routers.remove(&ip) {
        return;
    }

    let _: Option<C::Instant> = ctx.cancel_timer(NdpTimerId::new_router_invalidation(device_id, ip));

    if let Some(dispatcher) = ctx.dispatcher_mut() {
        dispatcher.on_default_router_invalidated(device_id, ip);
    }
}

/// Handles the expiration of a default router's lifetime.
///
/// # Panics
///
/// Panics if the router is not remembered: the timer should have been
/// cancelled when the entry was removed.
pub(crate) fn handle_router_invalidation_timer<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    ip: LinkLocalUnicastAddr<Ipv6Addr>,
) {
    assert!(
        ctx.get_state(device_id).default_routers.contains(&ip),
        "router invalidation timer fired for unknown router {} on device {:?}",
        ip,
        device_id,
    );
    invalidate_default_router(ctx, device_id, ip)
}

/// Invalidates all discovered default routers.
pub(crate) fn invalidate_all_default_routers<C: NdpContext>(ctx: &mut C, device_id: C::DeviceId) {
    let routers: Vec<_> = ctx.get_state(device_id).default_routers.iter().copied().collect();
    for ip in routers {
        invalidate_default_router(ctx, device_id, ip);
    }
}

/// Applies a Prefix Information option with the on-link flag set to the
/// on-link prefix table, as per [RFC 4861 section 6.3.4].
///
/// [RFC 4861 section 6.3.4]: https://tools.ietf.org/html/rfc4861#section-6.3.4
pub(crate) fn apply_on_link_prefix_update<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
    valid_lifetime: Option<NonZeroNdpLifetime>,
) {
    let state = ctx.get_state(device_id);
    let known = state.on_link_prefixes.contains(&prefix);

    match (known, valid_lifetime) {
        (false, None) => {
            // An unknown prefix with a zero valid lifetime; ignore.
        }
        (false, Some(valid_lifetime)) => {
            // A new on-link prefix. Only remember it if configured to and
            // fewer than the maximum number of prefixes are known.
            if state.config.discover_on_link_prefixes
                && state.on_link_prefixes.len() < MAX_DISCOVERED_ON_LINK_PREFIXES
            {
                remember_on_link_prefix(ctx, device_id, prefix, valid_lifetime);
            }
        }
        (true, None) => {
            // The prefix is no longer to be considered on-link.
            invalidate_on_link_prefix(ctx, device_id, prefix);
        }
        (true, Some(valid_lifetime)) => {
            // An already discovered prefix with a new non-zero valid
            // lifetime; update the invalidation timer.
            let timer_id = NdpTimerId::new_on_link_prefix_invalidation(device_id, prefix);
            let _: Option<C::Instant> = match valid_lifetime {
                NonZeroNdpLifetime::Finite(lifetime) => ctx.schedule_timer(lifetime.get(), timer_id),
                // Prefixes that are valid forever have no invalidation
                // timer.
                NonZeroNdpLifetime::Infinite => ctx.cancel_timer(timer_id),
            };
        }
    }
}

/// Remembers a newly discovered on-link prefix with the given lifetime.
///
/// The prefix must not already be known. Skipped entirely when no
/// dispatcher is registered or when the dispatcher vetoes the discovery.
/// No invalidation timer is scheduled for an infinite lifetime.
fn remember_on_link_prefix<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
    valid_lifetime: NonZeroNdpLifetime,
) {
    match ctx.dispatcher_mut() {
        Some(dispatcher) => {
            if !dispatcher.on_on_link_prefix_discovered(device_id, prefix) {
                // Informed by the integrator to not remember the prefix.
                return;
            }
        }
        None => return,
    }

    trace!(
        "remember_on_link_prefix: discovered prefix {} with lifetime {:?}",
        prefix,
        valid_lifetime
    );

    assert!(ctx.get_state_mut(device_id).on_link_prefixes.insert(prefix));

    if let NonZeroNdpLifetime::Finite(lifetime) = valid_lifetime {
        let _: Option<C::Instant> = ctx.schedule_timer(
            lifetime.get(),
            NdpTimerId::new_on_link_prefix_invalidation(device_id, prefix),
        );
    }
}

/// Invalidates a discovered on-link prefix.
///
/// Does nothing if the prefix is not currently remembered.
pub(crate) fn invalidate_on_link_prefix<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
) {
    if !ctx.get_state_mut(device_id).on_link_prefixes.remove(&prefix) {
        return;
    }

    let _: Option<C::Instant> =
        ctx.cancel_timer(NdpTimerId::new_on_link_prefix_invalidation(device_id, prefix));

    if let Some(dispatcher) = ctx.dispatcher_mut() {
        dispatcher.on_on_link_prefix_invalidated(device_id, prefix);
    }
}

/// Handles the expiration of an on-link prefix's valid lifetime.
///
/// # Panics
///
/// Panics if the prefix is not remembered: the timer should have been
/// cancelled when the entry was removed.
pub(crate) fn handle_on_link_prefix_invalidation_timer<C: NdpContext>(
    ctx: &mut C,
    device_id: C::DeviceId,
    prefix: Subnet<Ipv6Addr>,
) {
    assert!(
        ctx.get_state(device_id).on_link_prefixes.contains(&prefix),
        "prefix invalidation timer fired for unknown prefix {} on device {:?}",
        prefix,
        device_id,
    );
    invalidate_on_link_prefix(ctx, device_id, prefix)
}

/// Invalidates all discovered on-link prefixes.
pub(crate) fn invalidate_all_on_link_prefixes<C: NdpContext>(ctx: &mut C, device_id: C::DeviceId) {
    let prefixes: Vec<_> = ctx.get_state(device_id).on_link_prefixes.iter().copied().collect();
    for prefix in prefixes {
        invalidate_on_link_prefix(ctx, device_id, prefix);
    }
}
