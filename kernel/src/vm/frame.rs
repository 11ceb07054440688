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

//! The frame table: the reverse map from a resident frame to every
//! descriptor sharing it, and the allocator that hands frames to
//! [`crate::vm::alloc::do_claim_page`].
//!
//! Every frame lives under one lock, `frame_lock` ([`crate::vm::Vm::frame_table`]),
//! acquired after any supplemental-page-table access and never the other way
//! around (spec.md §5). [`evict_frame`] is the one place that ordering gets
//! subtle: it detaches every sharer of the victim frame while holding the
//! lock, but performs the actual swap-out I/O after releasing it, so a slow
//! disk or file write never stalls an unrelated fault elsewhere.

use crate::{memory::{VirtAddr, buddy::Pool}, vm::{Vm, page::Page}};
use alloc::sync::Arc;
use utils::collections::{hashmap::HashMap, vec::Vec};

/// A physical frame and the descriptors currently mapped to it.
///
/// More than one descriptor in `page_list` means the frame is shared
/// copy-on-write, following a `fork`.
pub struct Frame {
	pub kva: VirtAddr,
	pub page_list: Vec<Arc<Page>>,
}

/// The physical frame allocator and its reverse map.
pub struct FrameTable {
	pool: Pool,
	frames: HashMap<VirtAddr, Frame>,
	/// Rotates across victim-selection calls; a full random source is out of
	/// scope for this model, and a round-robin walk over the occupied set is
	/// the reference eviction policy spec.md §4.3 accepts.
	victim_cursor: usize,
}

impl FrameTable {
	/// Creates a frame table backed by a pool of `capacity` frames.
	pub fn new(capacity: usize) -> Self {
		Self {
			pool: Pool::new(capacity).expect("frame pool allocation"),
			frames: HashMap::new(),
			victim_cursor: 0,
		}
	}

	/// Returns the number of frames currently resident (allocated from the
	/// pool and not yet freed), for tests and diagnostics.
	pub fn resident_count(&self) -> usize {
		self.frames.len()
	}

	fn pick_victim(&mut self) -> VirtAddr {
		assert!(!self.frames.is_empty(), "no frame to evict");
		self.victim_cursor = self.victim_cursor.wrapping_add(1);
		let idx = self.victim_cursor % self.frames.len();
		*self.frames.iter().nth(idx).expect("idx within bounds").0
	}
}

/// Returns a zeroed frame backed by `vm`'s pool, evicting one if the pool is
/// exhausted.
///
/// Never fails: exhaustion of both the pool and the evictable set is fatal,
/// per spec.md §4.3.
pub fn get_frame(vm: &Vm) -> VirtAddr {
	{
		let mut ft = vm.frame_table.lock();
		if let Some(kva) = ft.pool.get_user_page() {
			ft.frames
				.insert(
					kva,
					Frame {
						kva,
						page_list: Vec::new(),
					},
				)
				.expect("frame table insertion");
			return kva;
		}
	}
	evict_frame(vm)
}

/// Evicts one frame, writing back every descriptor that shared it, and
/// returns it ready for reuse.
///
/// Detaching the victim's sharers (clearing their hardware mapping, dropping
/// them from `page_list`) happens under `frame_lock`; the provider's
/// `swap_out` — the part that may touch disk or a file — runs after the lock
/// is released.
pub fn evict_frame(vm: &Vm) -> VirtAddr {
	let (kva, pages) = {
		let mut ft = vm.frame_table.lock();
		let kva = ft.pick_victim();
		let frame = ft.frames.get_mut(&kva).expect("victim is resident");
		let drained = core::mem::replace(&mut frame.page_list, Vec::new());
		for page in &drained {
			page.owner.pml4.lock().clear(page.va);
		}
		(kva, drained)
	};
	for page in &pages {
		if page.type_tag() != crate::vm::page::PageType::Uninit {
			page.swap_out(vm);
		} else {
			page.set_frame(None);
		}
	}
	kva
}

/// Links `page` to the frame at `kva`, under `frame_lock`.
pub(crate) fn attach(vm: &Vm, kva: VirtAddr, page: &Arc<Page>) {
	let mut ft = vm.frame_table.lock();
	let frame = ft.frames.get_mut(&kva).expect("attach to a resident frame");
	frame.page_list.push(page.clone()).expect("frame page list");
	page.set_frame(Some(kva));
}

/// Detaches `page` from the frame it is currently resident in, if any. Frees
/// the frame back to the pool once its `page_list` becomes empty.
pub(crate) fn detach(vm: &Vm, page: &Arc<Page>) {
	let Some(kva) = page.frame() else {
		return;
	};
	let mut ft = vm.frame_table.lock();
	if let Some(frame) = ft.frames.get_mut(&kva) {
		let kept = core::mem::replace(&mut frame.page_list, Vec::new())
			.into_iter()
			.filter(|p| !Arc::ptr_eq(p, page));
		for p in kept {
			frame.page_list.push(p).expect("frame page list");
		}
		if frame.page_list.is_empty() {
			ft.frames.remove(&kva);
			ft.pool.free_user_page(kva);
		}
	}
}

/// Returns the other descriptors currently sharing `page`'s frame, for
/// `handle_wp`'s sole-owner check.
pub(crate) fn sharer_count(vm: &Vm, kva: VirtAddr) -> usize {
	vm.frame_table
		.lock()
		.frames
		.get(&kva)
		.map(|f| f.page_list.len())
		.unwrap_or(0)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		process::Thread,
		vm::{VmConfig, alloc::alloc_page_with_initializer, page::PageKind, page::PageType},
	};

	#[test_case]
	fn get_frame_is_zeroed_and_unique() {
		let vm = Vm::new(VmConfig {
			frame_pool_capacity: 2,
			..VmConfig::default()
		});
		let a = get_frame(&vm);
		let b = get_frame(&vm);
		assert_ne!(a, b);
		let bytes = unsafe { core::slice::from_raw_parts(a.0 as *const u8, crate::vm::PAGE_SIZE) };
		assert!(bytes.iter().all(|&b| b == 0));
	}

	/// spec.md §8 scenario 2: claim an ANON page, dirty one byte, force it
	/// out under eviction, then fault it back in and check the byte survived
	/// the round trip and the swap slot it borrowed was given back.
	#[test_case]
	fn anon_swap_cycle_preserves_content_and_releases_slot() {
		let vm = Vm::new(VmConfig {
			frame_pool_capacity: 1,
			..VmConfig::default()
		});
		let thread = Thread::new();
		let va = VirtAddr(0x7000);
		assert!(alloc_page_with_initializer(&vm, &thread, PageType::Anon, va, true, false));
		let page = thread.spt.lock().find(va).unwrap();
		assert!(crate::vm::alloc::claim_page(&vm, &thread, va));

		let kva = page.frame().expect("just claimed");
		unsafe {
			*((kva.0 + 7) as *mut u8) = 0xAB;
		}

		evict_frame(&vm);
		assert!(page.frame().is_none());
		let slot = match &*page.kind.borrow() {
			PageKind::Anon { swap_slot } => swap_slot.expect("evicted anon page has a slot"),
			_ => panic!("page is still ANON"),
		};
		assert!(vm.swap.lock().is_allocated(slot));

		assert!(crate::vm::alloc::claim_page(&vm, &thread, va));
		let kva2 = page.frame().expect("re-claimed");
		let byte = unsafe { *((kva2.0 + 7) as *const u8) };
		assert_eq!(byte, 0xAB);
		match &*page.kind.borrow() {
			PageKind::Anon { swap_slot } => assert!(swap_slot.is_none()),
			_ => panic!("page is still ANON"),
		}
		assert!(!vm.swap.lock().is_allocated(slot));
	}
}
