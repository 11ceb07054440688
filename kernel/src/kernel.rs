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

//! This crate provides the virtual memory core of a small teaching operating
//! system: a per-process demand-paged address space backed by one of three
//! page providers, a global frame table shared by every process, and a swap
//! device that reclaims frames under memory pressure.
//!
//! The boot entry point, arch-specific page tables, the physical frame
//! allocator, the disk driver and the scheduler are host kernel concerns;
//! this crate only consumes them through the narrow interfaces in
//! [`arch`], [`memory`] and [`device`].
//!
//! # Features
//!
//! The crate has the following features:
//! - `memtrace`: if enabled, frame and descriptor allocations are sampled by
//!   the instrumentation in [`macros::instrument_allocator`]. This is a debug
//!   feature.

#![no_std]
#![feature(custom_test_frameworks)]
#![deny(missing_docs)]
#![allow(clippy::tabs_in_doc_comments)]
#![test_runner(crate::selftest::runner)]
#![reexport_test_harness_main = "kernel_selftest"]

extern crate alloc;

pub mod arch;
pub mod device;
pub mod file;
#[macro_use]
pub mod logger;
pub mod memory;
#[macro_use]
pub mod print;
pub mod process;
pub mod selftest;
pub mod sync;
pub mod vm;
