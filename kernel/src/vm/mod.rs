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

//! The virtual memory core: a demand-paged, lazily populated address space
//! per process, backed by one of three page providers ([`page`]), a single
//! pool of physical frames shared by every process ([`frame`]), and a swap
//! device that reclaims frames under pressure ([`swap`]).
//!
//! [`Vm`] is the context every operation in this module threads through,
//! instead of reaching for process-wide globals directly — the style the
//! teacher's `memory::vmem` reaches for with `OnceInit`-guarded statics, but
//! made an explicit parameter here so the fault-injection and concurrency
//! tests in this module can stand up an isolated instance per test rather
//! than share hidden global state. [`vm_init`] installs the one top-level
//! instance a booted kernel actually uses.

pub mod alloc;
pub mod fault;
pub mod fork;
pub mod frame;
pub mod mmap;
pub mod page;
pub mod spt;
pub mod swap;

use crate::{device::disk::Disk, sync::spin::IntSpin};
use alloc::sync::Arc as StdArc;
use frame::FrameTable;
use swap::SwapTable;

pub use alloc::{alloc_page_with_initializer, claim_page};
pub use fault::try_handle_fault;
pub use fork::spt_copy;
pub use mmap::{do_mmap, do_munmap};

/// The size of a virtual memory page, in bytes.
pub const PAGE_SIZE: usize = utils::limits::PAGE_SIZE;
/// The number of disk sectors that make up one page-sized swap slot.
pub const SECTORS_PER_PAGE: usize = PAGE_SIZE / crate::device::disk::SECTOR_SIZE;

/// The first byte of user-addressable memory. Page zero is never mapped, so
/// a null-pointer dereference always faults.
pub const USER_BASE: crate::memory::VirtAddr = crate::memory::VirtAddr(PAGE_SIZE);
/// The first byte of the kernel half of the address space. Addresses at or
/// above this are rejected outright by the fault handler.
pub const KERNEL_BASE: crate::memory::VirtAddr = crate::memory::VirtAddr(0x0000_8000_0000_0000);
/// The address one past the top of the initial user stack. Automatic stack
/// growth only ever extends downward from here.
pub const USER_STACK: crate::memory::VirtAddr = crate::memory::VirtAddr(0x4750_0000);
/// The maximum distance the stack is allowed to grow below [`USER_STACK`].
pub const STACK_LIMIT: usize = 1024 * 1024;

/// Runtime configuration for [`vm_init`].
///
/// Grounded in the teacher's layered `build/config.rs` + `cmdline.rs`
/// configuration rather than hardcoding the pintos constants as literals:
/// the swap disk's geometry and the physical pool's capacity are properties
/// of the machine this kernel boots on, not of the VM core itself.
#[derive(Clone, Copy, Debug)]
pub struct VmConfig {
	/// The number of user-pool frames the physical allocator manages.
	pub frame_pool_capacity: usize,
	/// The size of the swap disk, in sectors.
	pub swap_disk_sectors: usize,
}

impl Default for VmConfig {
	/// The pintos-compatible defaults: a modestly sized frame pool and an 8
	/// MiB swap disk (2048 page-sized slots).
	fn default() -> Self {
		Self {
			frame_pool_capacity: 256,
			swap_disk_sectors: 2048 * SECTORS_PER_PAGE,
		}
	}
}

/// Process-wide virtual memory state: the frame table/allocator and the
/// swap subsystem. Every process's fault handling, `mmap` and fork-copy
/// operations go through one shared instance.
pub struct Vm {
	pub(crate) frame_table: IntSpin<FrameTable>,
	pub(crate) swap: IntSpin<SwapTable>,
}

impl Vm {
	/// Builds a freestanding instance from `config`, for tests that want
	/// isolation from the process-wide singleton.
	pub fn new(config: VmConfig) -> Self {
		Self {
			frame_table: IntSpin::new(FrameTable::new(config.frame_pool_capacity)),
			swap: IntSpin::new(SwapTable::new(Disk::new(config.swap_disk_sectors))),
		}
	}
}

static GLOBAL: IntSpin<Option<StdArc<Vm>>> = IntSpin::new(None);

/// Initializes the process-wide virtual memory state: the frame table, the
/// swap table (bitmap sized at `config.swap_disk_sectors / SECTORS_PER_PAGE`
/// slots), and the swap disk handle.
///
/// Returns the shared instance, also installed as the singleton
/// [`global`] returns.
pub fn vm_init(config: VmConfig) -> StdArc<Vm> {
	let vm = StdArc::new(Vm::new(config));
	*GLOBAL.lock() = Some(vm.clone());
	vm
}

/// Returns the process-wide [`Vm`] installed by [`vm_init`].
///
/// # Panics
///
/// Panics if [`vm_init`] has not been called.
pub fn global() -> StdArc<Vm> {
	GLOBAL.lock().clone().expect("vm_init was not called")
}
