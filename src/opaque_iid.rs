// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Interface identifier generation.
//!
//! Two derivations live here: semantically opaque interface identifiers for
//! stable SLAAC addresses, as defined by [RFC 7217], and the hash chain
//! that produces randomized identifiers for temporary SLAAC addresses, as
//! defined by [RFC 4941 section 3.2.2].
//!
//! [RFC 7217]: https://tools.ietf.org/html/rfc7217
//! [RFC 4941 section 3.2.2]: https://tools.ietf.org/html/rfc4941#section-3.2.2

use mundane::hash::{Digest, Hasher, Sha256};
use mundane::hmac::hmac;
use net_types::ip::{Ipv6Addr, Subnet};

/// The length in bytes of the secret key used to generate opaque interface
/// identifiers.
///
/// RFC 7217 section 5 requires the key to be at least 128 bits; we use
/// double that.
pub const STABLE_IID_SECRET_KEY_BYTES: usize = 32;

/// The length in bytes of an interface identifier (the low 64 bits of an
/// IPv6 address).
pub(crate) const IID_BYTES: usize = 8;

/// The length in bytes of the history value carried between generations of
/// temporary interface identifiers.
pub(crate) const TEMP_IID_HISTORY_BYTES: usize = 16;

/// Computes a semantically opaque interface identifier.
///
/// The identifier is `F(Prefix, Net_Iface, Network_ID, DAD_Counter,
/// secret_key)` from [RFC 7217 section 5], where `F` is HMAC-SHA256. The
/// RFC leaves the PRF to the implementation; callers take however many of
/// the returned bytes they need for the IID. `dad_counter` is the number
/// of completed or failed generation attempts for the prefix, which
/// changes when a previously generated address was found to be a
/// duplicate on the link.
///
/// [RFC 7217 section 5]: https://tools.ietf.org/html/rfc7217#section-5
pub fn generate_opaque_interface_identifier(
    prefix: Subnet<Ipv6Addr>,
    net_iface: &[u8],
    net_id: &[u8],
    dad_counter: u8,
    secret_key: &[u8],
) -> u128 {
    let mut input =
        Vec::with_capacity(16 + 1 + net_iface.len() + net_id.len() + IID_BYTES);
    input.extend_from_slice(&prefix.network().ipv6_bytes());
    input.push(prefix.prefix());
    input.extend_from_slice(net_iface);
    input.extend_from_slice(net_id);
    input.extend_from_slice(&u64::from(dad_counter).to_be_bytes());

    let digest = hmac::<Sha256>(secret_key, &input).bytes();
    let mut iid = [0; 16];
    iid.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(iid)
}

/// Generates the next temporary interface identifier, advancing `history`.
///
/// Implements the structure of [RFC 4941 section 3.2.2]: the history value
/// is hashed together with the interface identifier of the prefix's stable
/// address; the leftmost bits become the new IID (with the universal/local
/// bit forced to zero to make clear the identifier is not globally unique)
/// and the following bits are stored back into `history` for the next
/// generation. SHA-256 stands in for the RFC's MD5.
///
/// [RFC 4941 section 3.2.2]: https://tools.ietf.org/html/rfc4941#section-3.2.2
pub(crate) fn generate_temporary_interface_identifier(
    history: &mut [u8; TEMP_IID_HISTORY_BYTES],
    stable_addr: &Ipv6Addr,
) -> [u8; IID_BYTES] {
    let stable_bytes = stable_addr.ipv6_bytes();

    let mut input = [0; TEMP_IID_HISTORY_BYTES + IID_BYTES];
    input[..TEMP_IID_HISTORY_BYTES].copy_from_slice(&history[..]);
    input[TEMP_IID_HISTORY_BYTES..].copy_from_slice(&stable_bytes[IID_BYTES..]);

    let digest = Sha256::hash(&input).bytes();

    let mut iid = [0; IID_BYTES];
    iid.copy_from_slice(&digest[..IID_BYTES]);
    iid[0] &= !0x02;

    history.copy_from_slice(&digest[IID_BYTES..IID_BYTES + TEMP_IID_HISTORY_BYTES]);

    iid
}
