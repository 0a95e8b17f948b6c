// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Error types surfaced at the crate boundary.
//!
//! Recoverable conditions get error types here; violated preconditions
//! (starting DAD twice for one address, a timer firing for a deleted entry,
//! generating an address for a prefix that already has one) indicate
//! state-machine corruption and panic instead.

use thiserror::Error;

/// An operation was attempted on an address family it does not support.
///
/// Returned by DAD when started on a non-unicast address.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[error("operation not supported for this address")]
pub struct NotSupportedError;

/// The parent endpoint already owns the address being added.
///
/// Treated by SLAAC address generation as a local generation failure,
/// triggering a retry with a fresh interface identifier.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[error("address already exists")]
pub struct ExistsError;

/// The NIC failed to transmit a frame.
///
/// Completes DAD with a non-`None` error and stops an in-progress router
/// solicitation burst.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[error("failed to transmit frame")]
pub struct TransmitError;
