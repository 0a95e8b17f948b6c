// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-interface NDP configuration.

use core::time::Duration;

use crate::opaque_iid::STABLE_IID_SECRET_KEY_BYTES;

/// The default amount of time to wait between sending DAD probes.
///
/// Default taken from RETRANS_TIMER of [RFC 4861 section 10].
///
/// [RFC 4861 section 10]: https://tools.ietf.org/html/rfc4861#section-10
const DEFAULT_RETRANSMIT_TIMER: Duration = Duration::from_secs(1);

/// The minimum amount of time to wait between sending DAD probes.
///
/// RFC 4861 does not impose a minimum Retransmit Timer, but we do here to
/// make sure the messages are not sent all at once. In the RetransmitTimer
/// field of a Router Advertisement a value of 0 means unspecified, so the
/// smallest valid value is 1; the unit of that field is milliseconds.
const MINIMUM_RETRANSMIT_TIMER: Duration = Duration::from_millis(1);

/// The default number of NDP Neighbor Solicitation messages to send when
/// doing Duplicate Address Detection for a tentative address.
///
/// Default = 1 (from [RFC 4862 section 5.1]).
///
/// [RFC 4862 section 5.1]: https://tools.ietf.org/html/rfc4862#section-5.1
const DEFAULT_DUP_ADDR_DETECT_TRANSMITS: u8 = 1;

/// The default number of Router Solicitation messages to send when an IPv6
/// endpoint becomes enabled.
///
/// Default = 3 (from [RFC 4861 section 10]).
///
/// [RFC 4861 section 10]: https://tools.ietf.org/html/rfc4861#section-10
const DEFAULT_MAX_RTR_SOLICITATIONS: u8 = 3;

/// The default amount of time between transmissions of Router Solicitation
/// messages.
///
/// Default = 4s (from [RFC 4861 section 10]).
///
/// [RFC 4861 section 10]: https://tools.ietf.org/html/rfc4861#section-10
const DEFAULT_RTR_SOLICITATION_INTERVAL: Duration = Duration::from_secs(4);

/// The minimum amount of time between transmissions of Router Solicitation
/// messages, imposed so that solicitations are not sent all at once,
/// defeating the purpose of sending the initial few messages.
const MINIMUM_RTR_SOLICITATION_INTERVAL: Duration = Duration::from_millis(500);

/// The default maximum amount of time to wait before sending the first
/// Router Solicitation message.
///
/// Default = 1s (from [RFC 4861 section 10]).
///
/// [RFC 4861 section 10]: https://tools.ietf.org/html/rfc4861#section-10
const DEFAULT_MAX_RTR_SOLICITATION_DELAY: Duration = Duration::from_secs(1);

/// The default maximum valid lifetime for temporary SLAAC addresses.
///
/// Default = 7 days (from [RFC 4941 section 5]).
///
/// [RFC 4941 section 5]: https://tools.ietf.org/html/rfc4941#section-5
const DEFAULT_MAX_TEMP_ADDR_VALID_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// The default maximum preferred lifetime for temporary SLAAC addresses.
///
/// Default = 1 day (from [RFC 4941 section 5]).
///
/// [RFC 4941 section 5]: https://tools.ietf.org/html/rfc4941#section-5
const DEFAULT_MAX_TEMP_ADDR_PREFERRED_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// The default duration before the deprecation of a temporary address when
/// a new address will be generated.
///
/// Default = 5s (from [RFC 4941 section 5]).
///
/// [RFC 4941 section 5]: https://tools.ietf.org/html/rfc4941#section-5
const DEFAULT_REGEN_ADVANCE_DURATION: Duration = Duration::from_secs(5);

/// The maximum number of discovered default routers.
///
/// The endpoint stops discovering new routers after this many are known.
/// This value MUST be at minimum 2 as per [RFC 4861 section 6.3.4], and
/// SHOULD be more.
///
/// [RFC 4861 section 6.3.4]: https://tools.ietf.org/html/rfc4861#section-6.3.4
pub const MAX_DISCOVERED_DEFAULT_ROUTERS: usize = 10;

/// The maximum number of discovered on-link prefixes.
///
/// The endpoint stops discovering new on-link prefixes after this many are
/// known.
pub const MAX_DISCOVERED_ON_LINK_PREFIXES: usize = 10;

/// Required prefix length for SLAAC.
///
/// We need 64 bits in the prefix because the interface identifier is 64
/// bits, and IPv6 addresses are 128 bits.
pub(crate) const REQUIRED_PREFIX_BITS: u8 = 64;

/// The maximum number of times to attempt a SLAAC address regeneration in
/// response to an IPv6 endpoint-local conflict.
pub(crate) const MAX_SLAAC_ADDR_LOCAL_REGEN_ATTEMPTS: u8 = 10;

/// Minimum Valid Lifetime value to actually update an address's valid
/// lifetime, as per [RFC 4862 section 5.5.3.e].
///
/// 2 hours.
///
/// [RFC 4862 section 5.5.3.e]: https://tools.ietf.org/html/rfc4862#section-5.5.3
pub const MIN_PREFIX_VALID_LIFETIME_FOR_UPDATE: Duration = Duration::from_secs(7200);

/// The upper bound for the preferred lifetime's desync factor for temporary
/// SLAAC addresses.
///
/// Max = 10 minutes (from [RFC 4941 section 5]).
///
/// [RFC 4941 section 5]: https://tools.ietf.org/html/rfc4941#section-5
pub const MAX_DESYNC_FACTOR: Duration = Duration::from_secs(10 * 60);

/// The minimum value allowed for the maximum valid lifetime of temporary
/// SLAAC addresses.
///
/// This value guarantees that a temporary address is valid for at least
/// 2 hours if the SLAAC prefix is valid for at least that time.
pub const MIN_MAX_TEMP_ADDR_VALID_LIFETIME: Duration = Duration::from_secs(2 * 60 * 60);

/// The minimum value allowed for the maximum preferred lifetime of
/// temporary SLAAC addresses.
///
/// This value guarantees that a temporary address is preferred for at least
/// 1 hour if the SLAAC prefix is preferred for at least that time.
pub const MIN_MAX_TEMP_ADDR_PREFERRED_LIFETIME: Duration = Duration::from_secs(
    DEFAULT_REGEN_ADVANCE_DURATION.as_secs() + MAX_DESYNC_FACTOR.as_secs() + 60 * 60,
);

/// Options for generating interface identifiers with opaque IIDs, as
/// defined by [RFC 7217].
///
/// When configured, stable SLAAC addresses are derived from the secret key
/// and a stable interface name instead of the link-layer address, which
/// also makes it possible to retry generation in response to DAD conflicts.
///
/// [RFC 7217]: https://tools.ietf.org/html/rfc7217
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueIidOptions {
    /// A stable name for the interface, used as the Net_Iface parameter.
    pub nic_name: String,

    /// The secret key used when generating opaque IIDs. This should be
    /// initialized from a random number generator before any addresses are
    /// generated.
    pub secret_key: [u8; STABLE_IID_SECRET_KEY_BYTES],
}

/// The NDP configurations for an interface.
///
/// Out-of-range values are replaced during [`NdpConfigurations::validate`],
/// which runs when the configuration is installed.
#[derive(Debug, Clone, PartialEq)]
pub struct NdpConfigurations {
    /// The number of Neighbor Solicitation messages to send when doing
    /// Duplicate Address Detection for a tentative address.
    ///
    /// A value of zero effectively disables DAD.
    pub dup_addr_detect_transmits: u8,

    /// The amount of time to wait between sending Neighbor Solicitation
    /// messages.
    ///
    /// Must be greater than or equal to 1ms.
    pub retransmit_timer: Duration,

    /// The number of Router Solicitation messages to send when the IPv6
    /// endpoint becomes enabled.
    ///
    /// A value of zero disables router solicitation.
    pub max_router_solicitations: u8,

    /// The amount of time between transmitting Router Solicitation
    /// messages.
    ///
    /// Must be greater than or equal to 500ms.
    pub rtr_solicitation_interval: Duration,

    /// The maximum amount of time before transmitting the first Router
    /// Solicitation message.
    pub max_rtr_solicitation_delay: Duration,

    /// Whether or not Router Advertisements are processed.
    pub handle_ras: bool,

    /// Whether or not default routers are discovered from Router
    /// Advertisements, as per [RFC 4861 section 6]. Ignored if
    /// `handle_ras` is false.
    ///
    /// [RFC 4861 section 6]: https://tools.ietf.org/html/rfc4861#section-6
    pub discover_default_routers: bool,

    /// Whether or not on-link prefixes are discovered from Router
    /// Advertisements' Prefix Information options, as per [RFC 4861
    /// section 6]. Ignored if `handle_ras` is false.
    ///
    /// [RFC 4861 section 6]: https://tools.ietf.org/html/rfc4861#section-6
    pub discover_on_link_prefixes: bool,

    /// Whether or not global addresses are auto-generated in response to
    /// Prefix Information options with the autonomous flag set, as per
    /// [RFC 4862].
    ///
    /// If an address was already generated for some prefix, this option
    /// does not affect the lifetimes of that address; it only affects the
    /// generation of new addresses.
    ///
    /// [RFC 4862]: https://tools.ietf.org/html/rfc4862
    pub auto_gen_global_addresses: bool,

    /// How many times to attempt to regenerate an auto-generated address
    /// in response to DAD conflicts.
    ///
    /// If the method used to generate the address does not support creating
    /// alternative addresses (e.g. IIDs based on the modified EUI-64 of the
    /// NIC's MAC address), then no attempt is made to resolve the conflict.
    pub auto_gen_address_conflict_retries: u8,

    /// Whether or not temporary SLAAC addresses are generated as part of
    /// SLAAC privacy extensions, as per [RFC 4941].
    ///
    /// Ignored if `auto_gen_global_addresses` is false.
    ///
    /// [RFC 4941]: https://tools.ietf.org/html/rfc4941
    pub auto_gen_temp_global_addresses: bool,

    /// The maximum valid lifetime for temporary SLAAC addresses.
    pub max_temp_addr_valid_lifetime: Duration,

    /// The maximum preferred lifetime for temporary SLAAC addresses.
    pub max_temp_addr_preferred_lifetime: Duration,

    /// The duration before the deprecation of a temporary address when a
    /// new address will be generated.
    pub regen_advance_duration: Duration,

    /// Opaque IID generation options. When `None`, stable addresses are
    /// generated from the modified EUI-64 of the NIC's MAC address.
    pub opaque_iid: Option<OpaqueIidOptions>,
}

impl Default for NdpConfigurations {
    fn default() -> NdpConfigurations {
        NdpConfigurations {
            dup_addr_detect_transmits: DEFAULT_DUP_ADDR_DETECT_TRANSMITS,
            retransmit_timer: DEFAULT_RETRANSMIT_TIMER,
            max_router_solicitations: DEFAULT_MAX_RTR_SOLICITATIONS,
            rtr_solicitation_interval: DEFAULT_RTR_SOLICITATION_INTERVAL,
            max_rtr_solicitation_delay: DEFAULT_MAX_RTR_SOLICITATION_DELAY,
            handle_ras: true,
            discover_default_routers: true,
            discover_on_link_prefixes: true,
            auto_gen_global_addresses: true,
            auto_gen_address_conflict_retries: 0,
            auto_gen_temp_global_addresses: true,
            max_temp_addr_valid_lifetime: DEFAULT_MAX_TEMP_ADDR_VALID_LIFETIME,
            max_temp_addr_preferred_lifetime: DEFAULT_MAX_TEMP_ADDR_PREFERRED_LIFETIME,
            regen_advance_duration: DEFAULT_REGEN_ADVANCE_DURATION,
            opaque_iid: None,
        }
    }
}

impl NdpConfigurations {
    /// Replaces invalid values with their defaults or minimums.
    ///
    /// `max_rtr_solicitation_delay` and `regen_advance_duration` have no
    /// lower bound to enforce since [`Duration`] is unsigned.
    pub fn validate(&mut self) {
        if self.retransmit_timer < MINIMUM_RETRANSMIT_TIMER {
            self.retransmit_timer = DEFAULT_RETRANSMIT_TIMER;
        }

        if self.rtr_solicitation_interval < MINIMUM_RTR_SOLICITATION_INTERVAL {
            self.rtr_solicitation_interval = DEFAULT_RTR_SOLICITATION_INTERVAL;
        }

        if self.max_temp_addr_valid_lifetime < MIN_MAX_TEMP_ADDR_VALID_LIFETIME {
            self.max_temp_addr_valid_lifetime = MIN_MAX_TEMP_ADDR_VALID_LIFETIME;
        }

        if self.max_temp_addr_preferred_lifetime < MIN_MAX_TEMP_ADDR_PREFERRED_LIFETIME
            || self.max_temp_addr_preferred_lifetime > self.max_temp_addr_valid_lifetime
        {
            self.max_temp_addr_preferred_lifetime = MIN_MAX_TEMP_ADDR_PREFERRED_LIFETIME;
        }
    }
}
