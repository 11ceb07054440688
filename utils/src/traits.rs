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

//! Crate-wide traits shared by the fallible collection wrappers.

use crate::errno::AllocResult;

/// A [`Clone`] whose failure mode is allocation failure, not an abort.
///
/// Every deep copy this crate performs (page table duplication, descriptor
/// duplication on fork, ...) must be able to report `ENOMEM` back to the
/// caller rather than panic, hence this instead of [`Clone`].
pub trait TryClone: Sized {
	/// Clones `self`, failing if the clone cannot be allocated.
	fn try_clone(&self) -> AllocResult<Self>;
}
