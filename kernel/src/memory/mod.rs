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

//! Address types and the two memory-adjacent external collaborators this
//! crate consumes but does not implement in full: the physical frame
//! allocator ([`buddy`]) and the hardware page table ([`vmem`]).
//!
//! Both submodules follow the teacher's split between an architecture-
//! independent contract and a software model standing in for real hardware,
//! the same way [`crate::arch`] models the interrupt flag: this crate never
//! runs on bare metal, so the model is all there is to link against, and it
//! is exactly what the unit tests in [`crate::vm`] exercise.
//!
//! Unlike the teacher, this crate does not distinguish a hardware
//! [`PhysAddr`](https://en.wikipedia.org/wiki/Physical_address) from a
//! kernel-visible one: [`buddy`]'s frames are backed by an in-crate arena,
//! not real RAM behind a kernel/physical split, so every address the core
//! touches — a user page's `va`, a frame's `kva` — is a [`VirtAddr`].

use core::{
	fmt,
	ops::{Add, Deref, DerefMut, Sub},
};
use utils::limits::PAGE_SIZE;

pub mod buddy;
pub mod vmem;

/// An address on virtual (user or kernel) memory.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VirtAddr(pub usize);

macro_rules! addr_impl {
	($name:ident) => {
		impl $name {
			/// Tells whether the address is null.
			pub fn is_null(self) -> bool {
				self.0 == 0
			}

			/// Tells whether the address is page-aligned.
			pub fn is_page_aligned(self) -> bool {
				self.0 % PAGE_SIZE == 0
			}

			/// Rounds the address down to the start of its containing page.
			pub fn round_down(self) -> Self {
				Self(self.0 & !(PAGE_SIZE - 1))
			}

			/// Rounds the address up to the start of the next page, unless
			/// it is already page-aligned.
			pub fn round_up(self) -> Self {
				Self(self.0.next_multiple_of(PAGE_SIZE))
			}
		}

		impl Deref for $name {
			type Target = usize;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}

		impl DerefMut for $name {
			fn deref_mut(&mut self) -> &mut Self::Target {
				&mut self.0
			}
		}

		impl Add<usize> for $name {
			type Output = Self;

			fn add(self, off: usize) -> Self::Output {
				Self(self.0.wrapping_add(off))
			}
		}

		impl Sub<usize> for $name {
			type Output = Self;

			fn sub(self, off: usize) -> Self::Output {
				Self(self.0.wrapping_sub(off))
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(fmt, concat!(stringify!($name), "({:#x})"), self.0)
			}
		}
	};
}

addr_impl!(VirtAddr);

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn round_trip() {
		let a = VirtAddr(0x10000007);
		assert_eq!(a.round_down(), VirtAddr(0x10000000));
		assert_eq!(a.round_down().round_up(), VirtAddr(0x10000000));
		assert!(a.round_down().is_page_aligned());
		assert!(!a.is_page_aligned());
	}
}
