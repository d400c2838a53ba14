// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

pub mod behaviour;
pub mod gateway;
pub mod guid;
pub mod host;
pub mod identity;
pub mod mapping;
pub mod range;
