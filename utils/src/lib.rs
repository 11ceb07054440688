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

//! Allocation-aware, `no_std` utility types shared by the kernel crate.
//!
//! Every fallible path in here mirrors the kernel's own discipline: no
//! `unwrap`, no infallible allocation, errors bubble up as [`errno::EResult`]
//! or [`errno::AllocResult`].

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

extern crate alloc;

pub mod bitmap;
pub mod collections;
pub mod errno;
pub mod limits;
mod traits;

pub use traits::TryClone;
