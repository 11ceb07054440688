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

//! The thread/process abstraction, treated as an external collaborator.
//!
//! The teacher's `process::Process` carries a scheduler state machine,
//! signal handling, file descriptor table and more; the VM core only ever
//! reaches through the narrow surface spec.md §6 names: the current
//! thread, its page table, its supplemental page table, and its stashed
//! user stack pointer (needed when a fault is taken from kernel mode, e.g.
//! inside a `read`/`write` syscall copying to/from user memory).
//!
//! There being no real scheduler in this crate (out of scope, like the rest
//! of [`crate::process`]'s collaborators), "the current thread" is modeled
//! as a single global slot rather than per-CPU state — the cooperative,
//! one-fault-at-a-time discipline spec.md §5 requires holds trivially with
//! one slot, and tests install whichever thread they are exercising into it
//! with [`set_current`].

use crate::{memory::vmem::PageTable, sync::spin::IntSpin, vm::Vm, vm::spt::Spt};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

static CURRENT: IntSpin<Option<Arc<Thread>>> = IntSpin::new(None);

/// A process's single thread (this teaching kernel is not
/// multi-threaded-per-process), and the owner of one [`Spt`].
pub struct Thread {
	/// A small id, unique for the lifetime of the kernel, used for
	/// debugging and as a stable identity independent of `Arc` address.
	pub id: u64,
	/// The thread's hardware page table.
	pub pml4: IntSpin<PageTable>,
	/// The thread's supplemental page table.
	pub spt: IntSpin<Spt>,
	/// The user stack pointer stashed on kernel entry, used by the fault
	/// handler's stack-growth check when a fault is taken from kernel mode
	/// (spec.md §4.4).
	user_rsp: AtomicUsize,
}

impl Thread {
	/// Creates a new thread with an empty address space.
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
			pml4: IntSpin::new(PageTable::new()),
			spt: IntSpin::new(Spt::new()),
			user_rsp: AtomicUsize::new(0),
		})
	}

	/// Returns the user stack pointer stashed on the last kernel entry.
	pub fn user_rsp(&self) -> usize {
		self.user_rsp.load(Ordering::Relaxed)
	}

	/// Stashes `rsp` as the user stack pointer to use if a fault is taken
	/// from kernel mode before the next kernel entry.
	pub fn set_user_rsp(&self, rsp: usize) {
		self.user_rsp.store(rsp, Ordering::Relaxed);
	}
}

impl PartialEq for Thread {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for Thread {}

/// Returns the current thread.
///
/// # Panics
///
/// Panics if no thread has been installed with [`set_current`]; in this
/// crate's tests, every scenario begins by installing one.
pub fn current() -> Arc<Thread> {
	CURRENT.lock().clone().expect("no current thread installed")
}

/// Installs `thread` as the current thread, returning the previous one if
/// any.
///
/// This is the test/harness equivalent of a scheduler context switch; the
/// real kernel's scheduler is out of scope here.
pub fn set_current(thread: Arc<Thread>) -> Option<Arc<Thread>> {
	CURRENT.lock().replace(thread)
}

/// Terminates `thread`'s address space.
///
/// Releases every page in its [`Spt`], writing back dirty FILE pages and
/// releasing swap slots and frames. If `thread` is the current thread, also
/// clears it as such. This models `thread_exit`'s narrow VM-facing contract:
/// unwinding the address space. A real kernel would additionally reap the
/// process, wake its waiters and never return to the caller.
pub fn exit(vm: &Vm, thread: &Arc<Thread>) {
	crate::vm::spt::kill(vm, thread);
	let mut current = CURRENT.lock();
	if current.as_ref().is_some_and(|t| Arc::ptr_eq(t, thread)) {
		current.take();
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn set_and_get_current() {
		let t = Thread::new();
		let id = t.id;
		set_current(t);
		assert_eq!(current().id, id);
	}
}
