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

//! The supplemental page table: a thread's private map from user virtual
//! address to page descriptor.
//!
//! Owned directly (not behind an `Arc`) by [`crate::process::Thread`] and
//! guarded by its own [`crate::sync::spin::IntSpin`], accessed only by the
//! owning thread except during `fork` (spec.md §4.6) and `spt::kill`'s
//! teardown — neither of which races with the owner, since a thread does not
//! fault or call `mmap` on itself while it is being forked from or killed.

use crate::{memory::VirtAddr, process::Thread, vm::{Vm, page::Page}};
use alloc::sync::Arc;
use utils::collections::{hashmap::HashMap, vec::Vec};

/// A thread's private, demand-paged address space description.
#[derive(Default)]
pub struct Spt {
	entries: HashMap<VirtAddr, Arc<Page>>,
}

impl Spt {
	/// Creates a new, empty supplemental page table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the descriptor covering `va`, if any.
	pub fn find(&self, va: VirtAddr) -> Option<Arc<Page>> {
		self.entries.get(&va).cloned()
	}

	/// Inserts `page`, keyed by its own `va`.
	///
	/// Returns `false` without inserting if `va` is already mapped, matching
	/// `spt_insert`'s "no overlapping mappings" contract (spec.md §4.2).
	pub fn insert(&mut self, page: Arc<Page>) -> bool {
		if self.entries.contains_key(&page.va) {
			return false;
		}
		self.entries.insert(page.va, page).is_ok()
	}

	/// Removes and returns the descriptor at `va`, if any. Does not tear it
	/// down; the caller decides whether to (`do_munmap` does, `spt_copy`
	/// does not need to).
	pub fn remove(&mut self, va: VirtAddr) -> Option<Arc<Page>> {
		self.entries.remove(&va)
	}

	/// Drains every entry, for `kill`'s full teardown.
	fn take_all(&mut self) -> Vec<Arc<Page>> {
		let mut out = Vec::new();
		let taken = core::mem::replace(&mut self.entries, HashMap::new());
		for (_, page) in &taken {
			out.push(page.clone()).expect("spt teardown list");
		}
		out
	}

	/// Iterates over every mapped virtual address and its descriptor, for
	/// `spt_copy`'s fork-time walk.
	pub(crate) fn iter(&self) -> impl Iterator<Item = (&VirtAddr, &Arc<Page>)> {
		self.entries.iter()
	}
}

/// Tears down `thread`'s entire address space: every descriptor is detached
/// from its frame (if resident) and destroyed — writing back dirty FILE
/// pages, releasing ANON swap slots and closing reopened file handles.
///
/// Called once, by [`crate::process::exit`].
pub fn kill(vm: &Vm, thread: &Arc<Thread>) {
	let pages = thread.spt.lock().take_all();
	for page in pages {
		// Destroy clears the hardware mapping (and writes back/releases
		// backing storage) while the page is still attached; detach then
		// drops it from the frame's reverse map and frees the frame if it
		// was the last sharer — never the other way around, or the frame
		// could be handed to a new allocation while the old PTE still
		// points at it.
		page.destroy(vm);
		crate::vm::frame::detach(vm, &page);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::vm::{VmConfig, alloc::alloc_page_with_initializer, page::PageType};

	#[test_case]
	fn insert_rejects_duplicate_va() {
		let vm = Vm::new(VmConfig::default());
		let thread = Thread::new();
		assert!(alloc_page_with_initializer(
			&vm,
			&thread,
			PageType::Anon,
			VirtAddr(0x2000),
			true,
			false
		));
		assert!(!alloc_page_with_initializer(
			&vm,
			&thread,
			PageType::Anon,
			VirtAddr(0x2000),
			true,
			false
		));
	}

	#[test_case]
	fn kill_empties_the_table() {
		let vm = Vm::new(VmConfig::default());
		let thread = Thread::new();
		alloc_page_with_initializer(&vm, &thread, PageType::Anon, VirtAddr(0x3000), true, false);
		kill(&vm, &thread);
		assert!(thread.spt.lock().find(VirtAddr(0x3000)).is_none());
	}
}
