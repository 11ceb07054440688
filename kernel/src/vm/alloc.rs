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

//! Address-space allocation: registering a lazily-populated mapping, and
//! claiming (first-fault-populating) one.

use crate::{
	file::File,
	memory::VirtAddr,
	process::Thread,
	vm::{
		Vm,
		page::{FilePayload, Page, PageType},
	},
};
use alloc::sync::Arc;

/// Registers an `UNINIT` mapping at `va` on `thread`, to become `page_type`
/// (`Anon` or `File`) on first fault.
///
/// `va` must already be page-aligned; this is an internal building block
/// (callers are `do_mmap` and the fault handler's stack-growth path), not a
/// user-facing address-validation boundary.
///
/// Returns `false` without registering anything if `va` is already mapped.
pub fn alloc_page_with_initializer(
	vm: &Vm,
	thread: &Arc<Thread>,
	page_type: PageType,
	va: VirtAddr,
	writable: bool,
	is_stack: bool,
) -> bool {
	let _ = vm;
	debug_assert_ne!(page_type, PageType::Uninit);
	let page = Page::new_uninit(va, thread.clone(), writable, is_stack, page_type, None);
	thread.spt.lock().insert(page)
}

/// Registers a FILE-future `UNINIT` mapping at `va`, carrying the file
/// window it will read from on first fault.
pub(crate) fn alloc_file_page(
	thread: &Arc<Thread>,
	va: VirtAddr,
	writable: bool,
	file: File,
	offset: u64,
	page_read_bytes: usize,
) -> bool {
	let page = Page::new_uninit(
		va,
		thread.clone(),
		writable,
		false,
		PageType::File,
		Some(FilePayload {
			file,
			offset,
			page_read_bytes,
		}),
	);
	thread.spt.lock().insert(page)
}

/// Resolves a not-present fault against `page`: acquires a frame, links the
/// descriptor to it under `frame_lock`, installs the hardware mapping, and
/// populates its content.
///
/// This is the order spec.md §4.2 requires: the link is established *before*
/// `swap_in` runs, so a concurrent eviction can never observe the frame as
/// unclaimed.
pub(crate) fn do_claim_page(vm: &Vm, page: &Arc<Page>) -> bool {
	if page.frame().is_some() {
		return true;
	}
	let kva = crate::vm::frame::get_frame(vm);
	crate::vm::frame::attach(vm, kva, page);
	if page.owner.pml4.lock().install(page.va, kva, page.is_writable()).is_err() {
		crate::vm::frame::detach(vm, page);
		return false;
	}
	if !page.swap_in(vm, kva) {
		page.owner.pml4.lock().clear(page.va);
		crate::vm::frame::detach(vm, page);
		return false;
	}
	true
}

/// Looks up the descriptor at `va` in `thread`'s supplemental page table and
/// claims it.
///
/// Returns `false` if no descriptor covers `va`.
pub fn claim_page(vm: &Vm, thread: &Arc<Thread>, va: VirtAddr) -> bool {
	let Some(page) = thread.spt.lock().find(va.round_down()) else {
		return false;
	};
	do_claim_page(vm, &page)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::vm::VmConfig;

	#[test_case]
	fn claim_populates_anon_page_with_zeros() {
		let vm = Vm::new(VmConfig::default());
		let thread = Thread::new();
		assert!(alloc_page_with_initializer(
			&vm,
			&thread,
			PageType::Anon,
			VirtAddr(0x5000),
			true,
			false
		));
		assert!(claim_page(&vm, &thread, VirtAddr(0x5000)));
		let mapping = thread.pml4.lock().translate(VirtAddr(0x5000)).unwrap();
		let bytes =
			unsafe { core::slice::from_raw_parts(mapping.kva.0 as *const u8, crate::vm::PAGE_SIZE) };
		assert!(bytes.iter().all(|&b| b == 0));
	}

	#[test_case]
	fn claim_missing_page_fails() {
		let vm = Vm::new(VmConfig::default());
		let thread = Thread::new();
		assert!(!claim_page(&vm, &thread, VirtAddr(0x9000)));
	}

	#[test_case]
	fn claim_is_idempotent() {
		let vm = Vm::new(VmConfig::default());
		let thread = Thread::new();
		alloc_page_with_initializer(&vm, &thread, PageType::Anon, VirtAddr(0x6000), true, false);
		assert!(claim_page(&vm, &thread, VirtAddr(0x6000)));
		assert!(claim_page(&vm, &thread, VirtAddr(0x6000)));
	}
}
