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

//! The hardware page table, treated as an external collaborator.
//!
//! The teacher's real `memory::vmem::VMem` walks architecture-specific page
//! directories (`x86.rs`) and is bound to a CPU. This crate only needs the
//! narrow `install`/`clear`/`translate` contract spec.md §6 specifies, so
//! [`PageTable`] is a software model of that contract — a per-process map
//! from user virtual address to `(kva, writable)` — exactly the role
//! [`crate::memory::buddy::Pool`] plays for the physical allocator.

use crate::memory::VirtAddr;
use utils::{collections::hashmap::HashMap, errno::AllocResult};

/// A single architecture-independent page-table entry, as observed through
/// [`PageTable::translate`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Mapping {
	/// The kernel-visible address the page is mapped to.
	pub kva: VirtAddr,
	/// Whether the mapping is currently writable.
	pub writable: bool,
}

/// A process's hardware page table (the teacher's `pml4`/page directory).
#[derive(Debug, Default)]
pub struct PageTable {
	entries: HashMap<VirtAddr, Mapping>,
}

impl PageTable {
	/// Creates a new, empty page table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Installs a mapping from `va` to `kva` with the given protection.
	///
	/// Returns an error only if the entry could not be allocated; a
	/// pre-existing mapping at `va` is silently overwritten, matching the
	/// teacher's `install` (re-installing over a stale CoW mapping is a
	/// normal occurrence in [`crate::vm::fault::handle_wp`]).
	pub fn install(&mut self, va: VirtAddr, kva: VirtAddr, writable: bool) -> AllocResult<()> {
		self.entries.insert(
			va,
			Mapping {
				kva,
				writable,
			},
		)?;
		Ok(())
	}

	/// Removes the mapping at `va`, if any, and flushes it from the TLB.
	///
	/// A flush is a hardware detail this model has no need to represent;
	/// the call is infallible and idempotent.
	pub fn clear(&mut self, va: VirtAddr) {
		self.entries.remove(&va);
	}

	/// Returns the current mapping at `va`, if the page is resident.
	pub fn translate(&self, va: VirtAddr) -> Option<Mapping> {
		self.entries.get(&va).copied()
	}

	/// Tells whether `va` currently has a mapping.
	pub fn is_mapped(&self, va: VirtAddr) -> bool {
		self.entries.contains_key(&va)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn install_then_translate() {
		let mut pt = PageTable::new();
		pt.install(VirtAddr(0x1000), VirtAddr(0x2000), true).unwrap();
		assert_eq!(
			pt.translate(VirtAddr(0x1000)),
			Some(Mapping {
				kva: VirtAddr(0x2000),
				writable: true,
			})
		);
	}

	#[test_case]
	fn clear_removes_mapping() {
		let mut pt = PageTable::new();
		pt.install(VirtAddr(0x1000), VirtAddr(0x2000), true).unwrap();
		pt.clear(VirtAddr(0x1000));
		assert!(!pt.is_mapped(VirtAddr(0x1000)));
	}

	#[test_case]
	fn reinstall_overwrites() {
		let mut pt = PageTable::new();
		pt.install(VirtAddr(0x1000), VirtAddr(0x2000), false).unwrap();
		pt.install(VirtAddr(0x1000), VirtAddr(0x2000), true).unwrap();
		assert!(pt.translate(VirtAddr(0x1000)).unwrap().writable);
	}
}
