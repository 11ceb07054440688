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

//! The page descriptor: one entry in a thread's supplemental page table.
//!
//! A page starts out `UNINIT` — it knows what it will eventually become
//! (anonymous or file-backed) and how to populate its first frame, but has
//! not yet been backed by one. The first fault against it transforms it in
//! place into the concrete provider, the way the teacher's `residence.rs`
//! keeps one [`MapResidence`] enum rather than a trait per backing kind:
//! three variants behind one `match`, not three types behind a vtable.

use crate::{file::File, memory::VirtAddr, process::Thread, vm::Vm};
use alloc::sync::Arc;
use core::cell::{Cell, RefCell};

/// The three kinds of page a descriptor can be.
///
/// `UNINIT`'s `declared_type` tells which of `Anon`/`File` it will become; a
/// transformed descriptor never reverts, so the pair (`Uninit`, one of
/// `Anon`/`File`) it is constructed with is its type identity for the rest of
/// its lifetime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PageType {
	Uninit,
	Anon,
	File,
}

/// The payload backing a FILE page: the reopened handle it reads from/writes
/// back to, and the window of the file it maps.
#[derive(Clone)]
pub(crate) struct FilePayload {
	pub file: File,
	pub offset: u64,
	/// The number of bytes of `file` this page holds; the remainder of the
	/// page, up to [`crate::vm::PAGE_SIZE`], is zero-filled.
	pub page_read_bytes: usize,
}

/// The data specific to each concrete page type, plus the not-yet-resolved
/// `UNINIT` state.
pub(crate) enum PageKind {
	/// Not yet backed by a frame; `future` says which of `Anon`/`File` the
	/// first fault will transform this into, with `file` carrying the
	/// payload a FILE transformation needs (`None` for an `Anon` future).
	Uninit {
		future: PageType,
		file: Option<FilePayload>,
	},
	/// A frame in this crate's buddy pool, plus the swap slot it is parked
	/// in when not resident.
	Anon { swap_slot: Option<usize> },
	/// A window onto a file, with its own payload.
	File(FilePayload),
}

/// One entry in a thread's supplemental page table.
///
/// The mutable fields (`writable`, `is_cow`, `frame`, `kind`) are all the
/// fault handler and the frame allocator ever touch, and both are required
/// to hold `frame_lock` while doing so (spec.md §5) — the descriptor itself
/// only enforces that with `Cell`/`RefCell`, not a lock, the same division of
/// labor the teacher's `Spin`/`IntSpin` draw between "protects this data" and
/// "holding the lock is the caller's job".
pub struct Page {
	/// The user virtual address this descriptor covers. Always page-aligned.
	pub va: VirtAddr,
	/// The thread this descriptor belongs to.
	pub owner: Arc<Thread>,
	/// Whether this page was allocated for automatic stack growth, purely
	/// informational (surfaced for tests and diagnostics).
	pub is_stack: bool,
	writable: Cell<bool>,
	/// The page's protection before it was write-protected for copy-on-write,
	/// restored by [`crate::vm::fault::handle_wp`] once the frame is no
	/// longer shared.
	original_writable: Cell<bool>,
	is_cow: Cell<bool>,
	/// The frame currently backing this page, if resident.
	frame: Cell<Option<VirtAddr>>,
	pub(crate) kind: RefCell<PageKind>,
}

impl Page {
	/// Creates an `UNINIT` descriptor that will become `future` on first
	/// fault, owned by `owner`.
	pub(crate) fn new_uninit(
		va: VirtAddr,
		owner: Arc<Thread>,
		writable: bool,
		is_stack: bool,
		future: PageType,
		file: Option<FilePayload>,
	) -> Arc<Self> {
		debug_assert_ne!(future, PageType::Uninit, "a page cannot become UNINIT");
		Self::new_resolved(
			va,
			owner,
			writable,
			is_stack,
			PageKind::Uninit {
				future,
				file,
			},
		)
	}

	/// Creates a descriptor already in `kind` — `Anon`/`File`, never
	/// `Uninit { .. }` constructed by anything but [`Self::new_uninit`] —
	/// not resident, owned by `owner`.
	///
	/// Used by `spt_copy` (spec.md §4.6) to hand a fork child a descriptor
	/// that is already past the `UNINIT` stage, the way the parent's was,
	/// without running through the first-fault trampoline again.
	pub(crate) fn new_resolved(
		va: VirtAddr,
		owner: Arc<Thread>,
		writable: bool,
		is_stack: bool,
		kind: PageKind,
	) -> Arc<Self> {
		Arc::new(Self {
			va,
			owner,
			is_stack,
			writable: Cell::new(writable),
			original_writable: Cell::new(writable),
			is_cow: Cell::new(false),
			frame: Cell::new(None),
			kind: RefCell::new(kind),
		})
	}

	/// Returns this descriptor's current type tag.
	pub fn type_tag(&self) -> PageType {
		match &*self.kind.borrow() {
			PageKind::Uninit {
				..
			} => PageType::Uninit,
			PageKind::Anon {
				..
			} => PageType::Anon,
			PageKind::File(_) => PageType::File,
		}
	}

	/// Returns the type this descriptor either already is, or will become on
	/// first fault if it is still `UNINIT`.
	pub fn declared_type(&self) -> PageType {
		match &*self.kind.borrow() {
			PageKind::Uninit {
				future, ..
			} => *future,
			other => match other {
				PageKind::Anon {
					..
				} => PageType::Anon,
				PageKind::File(_) => PageType::File,
				PageKind::Uninit {
					..
				} => unreachable!(),
			},
		}
	}

	/// Returns whether a write fault against this page is currently allowed.
	pub fn is_writable(&self) -> bool {
		self.writable.get()
	}

	pub(crate) fn set_writable(&self, writable: bool) {
		self.writable.set(writable);
	}

	pub(crate) fn original_writable(&self) -> bool {
		self.original_writable.get()
	}

	/// Returns whether this page is currently a copy-on-write sharer of its
	/// frame.
	pub fn is_cow(&self) -> bool {
		self.is_cow.get()
	}

	pub(crate) fn set_cow(&self, cow: bool) {
		self.is_cow.set(cow);
	}

	/// Marks this descriptor write-protected and sharing its frame, stashing
	/// the writability it should be restored to once it is the sole owner
	/// again.
	pub(crate) fn mark_cow(&self) {
		self.is_cow.set(true);
		self.writable.set(false);
	}

	/// Returns the frame currently backing this page, if resident.
	pub fn frame(&self) -> Option<VirtAddr> {
		self.frame.get()
	}

	pub(crate) fn set_frame(&self, frame: Option<VirtAddr>) {
		self.frame.set(frame);
	}

	/// Returns the file identity and offset of a FILE (or not-yet-resolved
	/// FILE-future `UNINIT`) page, for `do_munmap`'s contiguous-region scan.
	pub(crate) fn file_identity(&self) -> Option<(File, u64)> {
		match &*self.kind.borrow() {
			PageKind::File(payload) => Some((payload.file.clone(), payload.offset)),
			PageKind::Uninit {
				file: Some(payload),
				..
			} => Some((payload.file.clone(), payload.offset)),
			_ => None,
		}
	}

	/// Returns a clone of this descriptor's FILE payload, for `spt_copy`'s
	/// walk over an already-resolved FILE source page.
	pub(crate) fn file_payload(&self) -> Option<FilePayload> {
		match &*self.kind.borrow() {
			PageKind::File(payload) => Some(payload.clone()),
			_ => None,
		}
	}

	/// Returns the `future` type and a clone of the file payload (if any) of
	/// a still-`UNINIT` descriptor, for `spt_copy`'s walk over a source page
	/// that has not yet been faulted in.
	pub(crate) fn uninit_parts(&self) -> (PageType, Option<FilePayload>) {
		match &*self.kind.borrow() {
			PageKind::Uninit {
				future,
				file,
			} => (*future, file.clone()),
			_ => unreachable!("uninit_parts called on a resolved page"),
		}
	}

	/// Populates `kva` with this page's initial content and, if still
	/// `UNINIT`, transforms it into its concrete type first.
	///
	/// Called by [`crate::vm::alloc::do_claim_page`] once the frame is
	/// already linked into the frame table; never called on a page that is
	/// already resident.
	pub(crate) fn swap_in(self: &Arc<Self>, vm: &Vm, kva: VirtAddr) -> bool {
		let future_file = {
			let mut kind = self.kind.borrow_mut();
			match &mut *kind {
				PageKind::Uninit {
					future,
					file,
				} => {
					let future = *future;
					let file = file.take();
					*kind = match future {
						PageType::Anon => PageKind::Anon {
							swap_slot: None,
						},
						PageType::File => PageKind::File(
							file.clone().expect("FILE future carries a file payload"),
						),
						PageType::Uninit => unreachable!(),
					};
					Some((future, file))
				}
				_ => None,
			}
		};
		match future_file {
			// Freshly transformed into ANON: the frame came back zeroed from
			// the pool, nothing to populate.
			Some((PageType::Anon, _)) => true,
			// Freshly transformed into FILE: load its window of the file.
			Some((PageType::File, _)) => populate_file(self, kva),
			Some((PageType::Uninit, _)) => unreachable!(),
			// Already a concrete type: re-entering swap-in after eviction.
			None => {
				let slot = match &*self.kind.borrow() {
					PageKind::Anon {
						swap_slot,
					} => Some(*swap_slot),
					PageKind::File(_) => None,
					PageKind::Uninit {
						..
					} => unreachable!(),
				};
				match slot {
					Some(swap_slot) => {
						let ok = swap_in_anon(vm, swap_slot, kva);
						if let PageKind::Anon {
							swap_slot,
						} = &mut *self.kind.borrow_mut()
						{
							*swap_slot = None;
						}
						ok
					}
					None => populate_file(self, kva),
				}
			}
		}
	}

	/// Writes a resident page's content back to its backing store (disk for
	/// ANON, the file for FILE) and records what is needed for a later
	/// `swap_in`, leaving it non-resident.
	///
	/// Called only while this page is not part of any frame's `page_list`
	/// (the caller detaches it first), so that the frame-table lock is not
	/// held across the disk/file I/O this performs.
	pub(crate) fn swap_out(self: &Arc<Self>, vm: &Vm) {
		let Some(kva) = self.frame.get() else {
			return;
		};
		let mut kind = self.kind.borrow_mut();
		match &mut *kind {
			PageKind::Anon {
				swap_slot,
			} => {
				let bytes = unsafe {
					core::slice::from_raw_parts(kva.0 as *const u8, crate::vm::PAGE_SIZE)
				};
				let slot = vm.swap.lock().write_page(bytes);
				*swap_slot = Some(slot);
			}
			PageKind::File(payload) => {
				if self.writable.get() {
					let bytes = unsafe {
						core::slice::from_raw_parts(kva.0 as *const u8, payload.page_read_bytes)
					};
					payload.file.write_at(bytes, payload.offset);
				}
			}
			PageKind::Uninit {
				..
			} => {}
		}
		self.frame.set(None);
	}

	/// Releases whatever backing store this descriptor holds: a swap slot
	/// for ANON, a final write-back and the reopened handle for FILE. If
	/// the page is currently resident, also clears its hardware mapping —
	/// the caller is expected to detach it from the frame table only
	/// *after* this returns, so the frame is never freed back to the pool
	/// while a stale PTE still points at it.
	///
	/// Called once, when the descriptor is removed from its thread's
	/// supplemental page table for good (`spt::kill`, `do_munmap`).
	pub(crate) fn destroy(self: &Arc<Self>, vm: &Vm) {
		if self.frame.get().is_some() {
			self.owner.pml4.lock().clear(self.va);
		}
		let kind = self.kind.borrow();
		match &*kind {
			PageKind::Anon {
				swap_slot,
			} => {
				if let Some(slot) = swap_slot {
					vm.swap.lock().release(*slot);
				}
			}
			PageKind::File(payload) => {
				if self.writable.get() {
					if let Some(kva) = self.frame.get() {
						let bytes = unsafe {
							core::slice::from_raw_parts(kva.0 as *const u8, payload.page_read_bytes)
						};
						payload.file.write_at(bytes, payload.offset);
					}
				}
				payload.file.clone().close();
			}
			PageKind::Uninit {
				file, ..
			} => {
				if let Some(payload) = file {
					payload.file.clone().close();
				}
			}
		}
	}
}

fn populate_file(page: &Page, kva: VirtAddr) -> bool {
	let kind = page.kind.borrow();
	let PageKind::File(payload) = &*kind else {
		unreachable!("populate_file called on a non-FILE page");
	};
	let buf = unsafe {
		core::slice::from_raw_parts_mut(kva.0 as *mut u8, crate::vm::PAGE_SIZE)
	};
	buf.fill(0);
	payload.file.read_at(&mut buf[..payload.page_read_bytes], payload.offset);
	true
}

fn swap_in_anon(vm: &Vm, slot: Option<usize>, kva: VirtAddr) -> bool {
	let Some(slot) = slot else {
		// Never written out: the frame is already zeroed by the pool.
		return true;
	};
	let buf = unsafe {
		core::slice::from_raw_parts_mut(kva.0 as *mut u8, crate::vm::PAGE_SIZE)
	};
	let mut swap = vm.swap.lock();
	swap.read_page(slot, buf);
	swap.release(slot);
	true
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::vm::{VmConfig, alloc::alloc_page_with_initializer};

	fn owner() -> Arc<Thread> {
		Thread::new()
	}

	#[test_case]
	fn uninit_anon_declared_type() {
		let vm = Vm::new(VmConfig::default());
		let thread = owner();
		assert!(alloc_page_with_initializer(
			&vm,
			&thread,
			PageType::Anon,
			VirtAddr(0x1000),
			true,
			false
		));
		let page = thread.spt.lock().find(VirtAddr(0x1000)).unwrap();
		assert_eq!(page.type_tag(), PageType::Uninit);
		assert_eq!(page.declared_type(), PageType::Anon);
	}
}
