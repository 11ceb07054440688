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

//! Supplemental-page-table copy for `fork`, establishing the child's address
//! space with copy-on-write sharing of resident ANON frames.
//!
//! Mirrors pintos' `supplemental_page_table_copy` in `vm/vm.c`: one pass over
//! the parent's `Spt`, branching on each source descriptor's *current*
//! `type_tag` (not its `declared_type`, which would force an `UNINIT` page to
//! commit to what it will become before the child even exists).

use crate::{
	process::Thread,
	vm::{
		Vm,
		page::{Page, PageKind, PageType},
	},
};
use alloc::sync::Arc;
use utils::collections::vec::Vec;

/// Populates `child`'s (empty) supplemental page table from `parent`'s.
///
/// `parent`'s `Spt` is only read, never mutated, except that a resident
/// `ANON` source descriptor is itself flipped to copy-on-write — spec.md
/// §4.6 requires both halves of a CoW pair to carry `is_cow=true`, since
/// `handle_wp` decides whether a write fault is a genuine violation purely
/// from that bit.
///
/// Returns `false` on the first allocation failure; the caller (this
/// crate's `fork` syscall glue, out of scope here) is responsible for
/// tearing down the partially built child via [`crate::vm::spt::kill`].
pub fn spt_copy(vm: &Vm, parent: &Arc<Thread>, child: &Arc<Thread>) -> bool {
	let sources: Vec<Arc<Page>> = {
		let spt = parent.spt.lock();
		let mut v = Vec::new();
		for (_, page) in spt.iter() {
			if v.push(page.clone()).is_err() {
				return false;
			}
		}
		v
	};
	for source in &sources {
		if !copy_one(vm, child, source) {
			return false;
		}
	}
	true
}

/// Copies one source descriptor into `child`'s `Spt`, branching on its
/// current type tag.
fn copy_one(vm: &Vm, child: &Arc<Thread>, source: &Arc<Page>) -> bool {
	match source.type_tag() {
		PageType::Uninit => copy_uninit(child, source),
		PageType::File => copy_file(child, source),
		PageType::Anon => copy_anon(vm, child, source),
	}
}

/// A source still in its `UNINIT` state: the child gets an identical
/// `UNINIT` descriptor, deep-copying any FILE-shaped aux with the child's
/// own reopened handle so closing one side never affects the other.
fn copy_uninit(child: &Arc<Thread>, source: &Arc<Page>) -> bool {
	let (future, file) = source.uninit_parts();
	let file = file.map(|payload| crate::vm::page::FilePayload {
		file: payload.file.reopen(),
		offset: payload.offset,
		page_read_bytes: payload.page_read_bytes,
	});
	let page = Page::new_uninit(source.va, child.clone(), source.is_writable(), source.is_stack, future, file);
	child.spt.lock().insert(page)
}

/// A resolved FILE source: the child gets its own FILE descriptor over a
/// freshly reopened handle onto the same underlying file, at the same
/// window. No frame is claimed; the child independently faults it in.
fn copy_file(child: &Arc<Thread>, source: &Arc<Page>) -> bool {
	let payload = source.file_payload().expect("FILE source carries a FILE payload");
	let page = Page::new_resolved(
		source.va,
		child.clone(),
		source.original_writable(),
		source.is_stack,
		PageKind::File(crate::vm::page::FilePayload {
			file: payload.file.reopen(),
			offset: payload.offset,
			page_read_bytes: payload.page_read_bytes,
		}),
	);
	child.spt.lock().insert(page)
}

/// A resolved ANON source. If it currently holds a resident frame, the
/// child shares it copy-on-write: both descriptors become read-only
/// sharers of the one frame, and the frame's `page_list` grows to two
/// entries. Otherwise the child gets an independent, non-resident ANON
/// descriptor that will zero-fill on its own first fault — spec.md §4.6
/// does not require (and this crate does not attempt) replaying the
/// parent's swapped-out content into the child.
fn copy_anon(vm: &Vm, child: &Arc<Thread>, source: &Arc<Page>) -> bool {
	let child_page = Page::new_resolved(
		source.va,
		child.clone(),
		source.original_writable(),
		source.is_stack,
		PageKind::Anon {
			swap_slot: None,
		},
	);
	if !child.spt.lock().insert(child_page.clone()) {
		return false;
	}
	let Some(kva) = source.frame() else {
		return true;
	};
	source.mark_cow();
	child_page.mark_cow();
	crate::vm::frame::attach(vm, kva, &child_page);
	if child.pml4.lock().install(source.va, kva, false).is_err() {
		return false;
	}
	// Downgrade the parent's own hardware mapping too: the invariant that a
	// resident page's protection bit matches `Page::is_writable` must hold
	// for the parent's half of the pair as well, now that it is `is_cow`.
	source.owner.pml4.lock().install(source.va, kva, false).is_ok()
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::vm::{
		VmConfig,
		alloc::{alloc_page_with_initializer, claim_page},
		fault::try_handle_fault,
		frame,
		page::PageType,
	};

	fn write_byte(thread: &Arc<Thread>, va: crate::memory::VirtAddr, value: u8) {
		let kva = thread.pml4.lock().translate(va).unwrap().kva;
		unsafe {
			*(kva.0 as *mut u8) = value;
		}
	}

	fn read_byte(thread: &Arc<Thread>, va: crate::memory::VirtAddr) -> u8 {
		let kva = thread.pml4.lock().translate(va).unwrap().kva;
		unsafe { *(kva.0 as *const u8) }
	}

	#[test_case]
	fn fork_shares_resident_anon_frame_cow() {
		let vm = Vm::new(VmConfig::default());
		let parent = Thread::new();
		let va = crate::memory::VirtAddr(0x1_0000);
		alloc_page_with_initializer(&vm, &parent, PageType::Anon, va, true, false);
		assert!(claim_page(&vm, &parent, va));
		write_byte(&parent, va, 0xEE);

		let child = Thread::new();
		assert!(spt_copy(&vm, &parent, &child));

		let parent_page = parent.spt.lock().find(va).unwrap();
		let child_page = child.spt.lock().find(va).unwrap();
		assert!(parent_page.is_cow());
		assert!(child_page.is_cow());
		assert!(!child_page.is_writable());

		let parent_kva = parent.pml4.lock().translate(va).unwrap().kva;
		let child_kva = child.pml4.lock().translate(va).unwrap().kva;
		assert_eq!(parent_kva, child_kva);
		assert_eq!(frame::sharer_count(&vm, parent_kva), 2);
		assert_eq!(read_byte(&child, va), 0xEE);

		// Parent writes again: resolves by copying to a private frame.
		assert!(try_handle_fault(&vm, &parent, va, 0, true, false));
		let parent_page = parent.spt.lock().find(va).unwrap();
		assert!(!parent_page.is_cow());
		assert!(parent_page.is_writable());
		let new_parent_kva = parent.pml4.lock().translate(va).unwrap().kva;
		assert_ne!(new_parent_kva, child_kva);

		// The child keeps reading the original content from the now
		// singly-owned old frame.
		assert_eq!(frame::sharer_count(&vm, child_kva), 1);
		assert_eq!(read_byte(&child, va), 0xEE);
	}

	#[test_case]
	fn fork_copies_uninit_page_without_claiming() {
		let vm = Vm::new(VmConfig::default());
		let parent = Thread::new();
		let va = crate::memory::VirtAddr(0x2_0000);
		alloc_page_with_initializer(&vm, &parent, PageType::Anon, va, true, false);

		let child = Thread::new();
		assert!(spt_copy(&vm, &parent, &child));

		let child_page = child.spt.lock().find(va).unwrap();
		assert_eq!(child_page.type_tag(), PageType::Uninit);
		assert!(child.pml4.lock().translate(va).is_none());
	}

	#[test_case]
	fn fork_non_resident_anon_is_independent() {
		let vm = Vm::new(VmConfig::default());
		let parent = Thread::new();
		let va = crate::memory::VirtAddr(0x3_0000);
		alloc_page_with_initializer(&vm, &parent, PageType::Anon, va, true, false);
		assert!(claim_page(&vm, &parent, va));
		// Evict so the parent's page is no longer resident.
		frame::evict_frame(&vm);

		let child = Thread::new();
		assert!(spt_copy(&vm, &parent, &child));

		let child_page = child.spt.lock().find(va).unwrap();
		assert!(!child_page.is_cow());
		assert!(child_page.frame().is_none());
	}
}
