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

//! The page fault decision tree: classify the fault, then either resolve it
//! (claim a not-yet-resident page, grow the stack, break a copy-on-write
//! sharing) or terminate the faulting thread.
//!
//! Mirrors pintos' `vm_try_handle_fault` in `vm/vm.c`, down to the two
//! distinct failure shapes spec.md §7 calls out: some rejections (address
//! out of range) just return `false` and leave termination to the caller,
//! while others (a genuine write-protection violation, stack growth outside
//! its window) terminate the thread directly from here.

use crate::{
	memory::VirtAddr,
	process::{self, Thread},
	vm::{
		self, STACK_LIMIT, USER_BASE, USER_STACK, Vm,
		alloc::{alloc_page_with_initializer, do_claim_page},
		page::PageType,
	},
};
use alloc::sync::Arc;

/// Attempts to resolve a page fault at `addr` against `thread`'s address
/// space.
///
/// `write` and `not_present` are the two bits x86 reports in the fault's
/// error code; `rsp` is the stack pointer to use for the stack-growth
/// window check when the fault was taken from kernel mode (in which case the
/// CPU's own `rsp` is the kernel stack, not the user one — `rsp` should then
/// be `thread.user_rsp()`, stashed on the last kernel entry).
///
/// Returns `true` if the fault was resolved and the faulting instruction may
/// be retried; `false` if the caller must terminate the thread. Some
/// rejections terminate the thread directly instead (a genuine protection
/// violation, or stack growth outside its window), also returning `false`.
pub fn try_handle_fault(
	vm: &Vm,
	thread: &Arc<Thread>,
	addr: VirtAddr,
	rsp: usize,
	write: bool,
	not_present: bool,
) -> bool {
	if addr.is_null() || addr < USER_BASE || addr >= crate::vm::KERNEL_BASE {
		return false;
	}
	let page_va = addr.round_down();
	if let Some(page) = thread.spt.lock().find(page_va) {
		if write && !page.is_writable() {
			if handle_wp(vm, &page) {
				return true;
			}
			process::exit(vm, thread);
			return false;
		}
		if not_present {
			return do_claim_page(vm, &page);
		}
		return false;
	}
	if not_present && is_stack_growth(addr, rsp) {
		if alloc_page_with_initializer(vm, thread, PageType::Anon, page_va, true, true) {
			if let Some(page) = thread.spt.lock().find(page_va) {
				return do_claim_page(vm, &page);
			}
		}
		return false;
	}
	process::exit(vm, thread);
	false
}

/// Tells whether `addr` falls within the automatic-stack-growth window: the
/// megabyte below [`USER_STACK`], no further than 8 bytes below the current
/// stack pointer (accounting for a `PUSHA`-style instruction that writes
/// below `rsp` before decrementing it).
fn is_stack_growth(addr: VirtAddr, rsp: usize) -> bool {
	addr.0 < USER_STACK.0
		&& addr.0 >= USER_STACK.0.saturating_sub(STACK_LIMIT)
		&& addr.0 + 8 >= rsp
}

/// Handles a write fault against a read-only page.
///
/// If the page is not marked copy-on-write, this is a genuine protection
/// violation. Otherwise, either this is the sole remaining sharer of the
/// frame (promote it in place) or there are others (copy the frame and
/// detach from the shared one).
fn handle_wp(vm: &Vm, page: &Arc<crate::vm::page::Page>) -> bool {
	if !page.is_cow() {
		return false;
	}
	let kva = page.frame().expect("a resident CoW page has a frame");
	if vm::frame::sharer_count(vm, kva) <= 1 {
		page.set_writable(page.original_writable());
		page.set_cow(false);
		return page.owner.pml4.lock().install(page.va, kva, page.is_writable()).is_ok();
	}
	vm::frame::detach(vm, page);
	let new_kva = vm::frame::get_frame(vm);
	unsafe {
		core::ptr::copy_nonoverlapping(kva.0 as *const u8, new_kva.0 as *mut u8, vm::PAGE_SIZE);
	}
	vm::frame::attach(vm, new_kva, page);
	page.set_writable(page.original_writable());
	page.set_cow(false);
	page.owner.pml4.lock().clear(page.va);
	page.owner.pml4.lock().install(page.va, new_kva, page.is_writable()).is_ok()
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::vm::VmConfig;

	#[test_case]
	fn stack_growth_within_window_resolves() {
		let vm = Vm::new(VmConfig::default());
		let thread = Thread::new();
		let rsp = 0x4748_0000usize;
		let addr = VirtAddr(0x474F_FFF8);
		assert!(try_handle_fault(&vm, &thread, addr, rsp, true, true));
		assert!(thread.spt.lock().find(addr.round_down()).unwrap().is_stack);
	}

	#[test_case]
	fn stack_growth_below_window_rejected() {
		let vm = Vm::new(VmConfig::default());
		let thread = Thread::new();
		let rsp = 0x4748_0000usize;
		let addr = VirtAddr(rsp - 32);
		assert!(!try_handle_fault(&vm, &thread, addr, rsp, true, true));
	}

	#[test_case]
	fn stack_growth_outside_megabyte_rejected() {
		let vm = Vm::new(VmConfig::default());
		let thread = Thread::new();
		let rsp = 0x4748_0000usize;
		let addr = VirtAddr(USER_STACK.0 - 2 * 1024 * 1024);
		assert!(!try_handle_fault(&vm, &thread, addr, rsp, true, true));
	}

	#[test_case]
	fn out_of_range_address_rejected_without_terminating() {
		let vm = Vm::new(VmConfig::default());
		let thread = Thread::new();
		assert!(!try_handle_fault(&vm, &thread, VirtAddr(0), 0, false, true));
	}

	/// spec.md §8 scenario 5: a write fault against a read-only FILE page
	/// that is not copy-on-write is a genuine protection violation, not a
	/// CoW break — it must terminate the thread, not resolve the fault.
	#[test_case]
	fn write_to_readonly_file_page_without_cow_terminates() {
		let vm = Vm::new(VmConfig::default());
		let thread = Thread::new();
		let va = VirtAddr(0x8000);
		let file = crate::file::File::from_bytes(&[0x11u8; crate::vm::PAGE_SIZE]);
		assert!(crate::vm::alloc::alloc_file_page(&thread, va, false, file, 0, crate::vm::PAGE_SIZE));
		assert!(crate::vm::claim_page(&vm, &thread, va));

		assert!(!try_handle_fault(&vm, &thread, va, 0, true, false));
		assert!(thread.spt.lock().find(va).is_none());
	}
}
