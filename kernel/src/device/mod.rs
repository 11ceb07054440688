/*
 * Copyright 2024 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! Block device access, narrowed to the one device the VM core talks to
//! directly: the swap disk.

pub mod disk;

/// The `(channel, device)` pair identifying the swap disk on the host's IDE
/// bus, matching pintos' hardcoded `(1, 1)`.
pub const SWAP_DISK_ID: (u8, u8) = (1, 1);
