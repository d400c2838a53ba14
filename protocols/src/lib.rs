// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Wire-level bindings: gateway control protocols and the host's neighbour/route tables.
//!
//! Everything here is stateless apart from sockets; policy lives in `natwarden-core`.

pub mod arp;
pub mod dns;
pub mod natpmp;
pub mod route;
pub mod ssdp;
pub mod upnp;
pub mod utils;
