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

//! Selftests are unit tests that run on the kernel itself through the
//! `#[test_case]` custom test framework, since this crate is `no_std` and has
//! no host to run a standard `#[test]` harness on.

use core::any::type_name;
use core::sync::atomic::{self, AtomicBool};

/// Tells whether selftesting is currently running.
static RUNNING: AtomicBool = AtomicBool::new(false);

/// Trait for any testable feature.
pub trait Testable {
	/// Runs the corresponding test.
	fn run(&self);
}

impl<T> Testable for T
where
	T: Fn(),
{
	fn run(&self) {
		let name = type_name::<T>();
		crate::print!("test {name} ... ");
		self();
		crate::println!("ok");
	}
}

/// The test runner for the kernel.
///
/// Runs every registered test in sequence. Unlike the teacher's original,
/// this does not halt or exit an emulator afterward: the host embedding this
/// crate decides what happens once selftesting completes.
pub fn runner(tests: &[&dyn Testable]) {
	crate::println!("Running {} tests", tests.len());
	RUNNING.store(true, atomic::Ordering::Relaxed);
	for test in tests {
		test.run();
	}
	RUNNING.store(false, atomic::Ordering::Relaxed);
	crate::println!("No more tests to run");
}

/// Tells whether selftesting is running.
pub fn is_running() -> bool {
	RUNNING.load(atomic::Ordering::Relaxed)
}
