// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The host side of the Neighbor Discovery Protocol (NDP) for IPv6.
//!
//! This crate implements the per-interface state machine that drives IPv6
//! auto-configuration on an endpoint, as defined in [RFC 4861], [RFC 4862]
//! and [RFC 4941]:
//! - Duplicate Address Detection for tentative addresses
//! - Default router discovery and invalidation from Router Advertisements
//! - On-link prefix discovery from Prefix Information options
//! - Stateless Address Autoconfiguration (SLAAC), stable and temporary
//! - Router Solicitation transmission when an endpoint is enabled
//!
//! The embedder provides the clock, timers, RNG, address table and frame
//! transmission through [`NdpContext`], and observes protocol events (and
//! may veto some of them) through [`NdpDispatcher`]. All operations and all
//! timer firings take the context by `&mut`, which stands in for the owning
//! endpoint's lock: within one interface the state machine is strictly
//! single-threaded.
//!
//! [RFC 4861]: https://tools.ietf.org/html/rfc4861
//! [RFC 4862]: https://tools.ietf.org/html/rfc4862
//! [RFC 4941]: https://tools.ietf.org/html/rfc4941

mod address;
mod config;
mod context;
mod dad;
mod dispatcher;
mod error;
mod ndp;
mod opaque_iid;
mod ra;
mod route_discovery;
mod router_solicitation;
mod slaac;
mod state;
#[cfg(test)]
mod testutil;

use core::fmt::Debug;
use core::time::Duration;

pub use address::{AddrConfigType, AddressEndpoint, AddressKind, SlaacType};
pub use config::{
    NdpConfigurations, OpaqueIidOptions, MAX_DESYNC_FACTOR, MAX_DISCOVERED_DEFAULT_ROUTERS,
    MAX_DISCOVERED_ON_LINK_PREFIXES, MIN_MAX_TEMP_ADDR_PREFERRED_LIFETIME,
    MIN_MAX_TEMP_ADDR_VALID_LIFETIME, MIN_PREFIX_VALID_LIFETIME_FOR_UPDATE,
};
pub use context::{InstantBindingsTypes, InstantContext, RngContext, TimerContext};
pub use dispatcher::{Dhcpv6Configuration, NdpDispatcher};
pub use error::{ExistsError, NotSupportedError, TransmitError};
pub use ndp::{DeviceIdContext, NdpContext, NdpHandler};
pub use opaque_iid::{generate_opaque_interface_identifier, STABLE_IID_SECRET_KEY_BYTES};
pub use state::{NdpState, NdpTimerId};

/// A type representing an instant in time.
///
/// `Instant` can be implemented by any type which represents an instant in
/// time. This can include any sort of real-world clock time (e.g.,
/// [`std::time::Instant`]) or fake time such as in testing.
pub trait Instant: Sized + Ord + Copy + Clone + Debug + Send + Sync {
    /// Returns the amount of time elapsed from another instant to this one.
    ///
    /// # Panics
    ///
    /// This function will panic if `earlier` is later than `self`.
    fn duration_since(&self, earlier: Self) -> Duration;

    /// Returns the amount of time elapsed from another instant to this one,
    /// saturating at zero.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;

    /// Returns `Some(t)` where `t` is the time `self + duration` if `t` can
    /// be represented as `Instant` (which means it's inside the bounds of
    /// the underlying data structure), `None` otherwise.
    fn checked_add(&self, duration: Duration) -> Option<Self>;

    /// Returns `Some(t)` where `t` is the time `self - duration` if `t` can
    /// be represented as `Instant` (which means it's inside the bounds of
    /// the underlying data structure), `None` otherwise.
    fn checked_sub(&self, duration: Duration) -> Option<Self>;
}
