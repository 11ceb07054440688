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

//! The physical page allocator, treated as an external collaborator: this
//! crate only consumes `get_user_page`/`free_user_page` and never walks the
//! real buddy tree (`kernel/src/memory/buddy.rs` in the teacher divides
//! frames of `2^n` pages recursively; the VM core here only ever needs
//! single, zeroed user pages, so this is `MAX_ORDER = 0` of that allocator).
//!
//! Since this crate is never linked against a booted kernel, `Pool` is a
//! software model: a fixed arena of zeroed pages handed out and reclaimed
//! through a free list, the same stand-in-for-hardware role
//! [`crate::arch`]'s interrupt flag plays for `cli`/`sti`.

use crate::memory::VirtAddr;
use alloc::boxed::Box;
use utils::{collections::vec::Vec, errno::AllocResult, limits::PAGE_SIZE};

/// One physical page of memory, as handed out by the allocator.
type Page = [u8; PAGE_SIZE];

/// A pool of zeroed user-pool frames, modeling the host's physical
/// allocator restricted to single, user-zone pages.
///
/// Mirrors the teacher's `FLAG_ZONE_TYPE_USER` zone: all frames this crate
/// allocates belong to user address spaces, never to the kernel or MMIO
/// zones.
pub struct Pool {
	/// The backing storage, one entry per possible frame.
	arena: Box<[Page]>,
	/// Indices into `arena` that are currently unused.
	free: Vec<usize>,
}

impl Pool {
	/// Creates a pool with room for `capacity` frames, all initially free.
	pub fn new(capacity: usize) -> AllocResult<Self> {
		let arena = alloc::vec![[0u8; PAGE_SIZE]; capacity].into_boxed_slice();
		let mut free = Vec::new();
		for i in (0..capacity).rev() {
			free.push(i)?;
		}
		Ok(Self {
			arena,
			free,
		})
	}

	/// Returns the total number of frames the pool was created with.
	pub fn capacity(&self) -> usize {
		self.arena.len()
	}

	/// Returns the number of frames currently free.
	pub fn available(&self) -> usize {
		self.free.len()
	}

	/// Allocates a zeroed user-pool frame, returning its kernel-visible
	/// address.
	///
	/// Returns `None` if the pool is exhausted; the caller (the frame
	/// allocator in [`crate::vm::frame`]) is responsible for triggering
	/// eviction in that case, exactly as `get_frame` does over the real
	/// `get_user_page`.
	pub fn get_user_page(&mut self) -> Option<VirtAddr> {
		let index = self.free.pop()?;
		self.arena[index] = [0u8; PAGE_SIZE];
		Some(self.kva_of(index))
	}

	/// Releases a frame previously returned by [`Self::get_user_page`].
	///
	/// # Panics
	///
	/// Panics if `kva` was not returned by this pool, matching the teacher's
	/// treatment of a bad free as a kernel bug, not a recoverable error.
	pub fn free_user_page(&mut self, kva: VirtAddr) {
		let index = self.index_of(kva);
		debug_assert!(!self.free.contains(&index), "double free of a frame");
		self.free.push(index).expect("free list has room for every frame");
	}

	fn kva_of(&self, index: usize) -> VirtAddr {
		VirtAddr(self.arena.as_ptr() as usize + index * PAGE_SIZE)
	}

	fn index_of(&self, kva: VirtAddr) -> usize {
		let base = self.arena.as_ptr() as usize;
		let offset = kva.0.checked_sub(base).expect("kva from this pool");
		let index = offset / PAGE_SIZE;
		assert!(index < self.arena.len(), "kva from this pool");
		index
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn alloc_is_zeroed() {
		let mut pool = Pool::new(2).unwrap();
		let kva = pool.get_user_page().unwrap();
		let page = unsafe { &*(kva.0 as *const Page) };
		assert_eq!(page, &[0u8; PAGE_SIZE]);
	}

	#[test_case]
	fn exhaustion_returns_none() {
		let mut pool = Pool::new(1).unwrap();
		assert!(pool.get_user_page().is_some());
		assert!(pool.get_user_page().is_none());
	}

	#[test_case]
	fn free_then_realloc() {
		let mut pool = Pool::new(1).unwrap();
		let a = pool.get_user_page().unwrap();
		pool.free_user_page(a);
		let b = pool.get_user_page().unwrap();
		assert_eq!(a, b);
	}
}
