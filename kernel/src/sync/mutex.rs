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

//! Mutual exclusion primitive meant for sections that may block on I/O.
//!
//! The host kernel's own [`Mutex`](https://en.wikipedia.org/wiki/Lock_(computer_science))
//! parks the waiting thread on a scheduler wait queue instead of spinning.
//! This crate treats the scheduler as out of scope (see [`crate::process`]),
//! so [`Mutex`] spins like [`crate::sync::spin::Spin`] but, unlike it, never
//! masks interrupts: it is meant to be held across a disk or file read/write,
//! which can take an arbitrarily long time, and masking interrupts for that
//! long would stall the clock and every other CPU-bound thread. `file_lock`
//! is the single instance of this type that serializes access to the file
//! layer.

use core::{
	cell::UnsafeCell,
	fmt::{self, Formatter},
	hint,
	ops::{Deref, DerefMut},
	sync::atomic::{
		AtomicBool,
		Ordering::{Acquire, Release},
	},
};

/// Unlocks the associated [`Mutex`] when dropped.
pub struct MutexGuard<'m, T: ?Sized> {
	mutex: &'m Mutex<T>,
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		unsafe { &*self.mutex.data.get() }
	}
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { &mut *self.mutex.data.get() }
	}
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self.deref(), f)
	}
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
	fn drop(&mut self) {
		self.mutex.locked.store(false, Release);
	}
}

/// A mutex suitable for critical sections that may perform I/O.
pub struct Mutex<T: ?Sized> {
	locked: AtomicBool,
	data: UnsafeCell<T>,
}

impl<T> Mutex<T> {
	/// Creates a new instance wrapping the given `data`.
	pub const fn new(data: T) -> Self {
		Self {
			locked: AtomicBool::new(false),
			data: UnsafeCell::new(data),
		}
	}
}

impl<T: Default> Default for Mutex<T> {
	fn default() -> Self {
		Self::new(Default::default())
	}
}

impl<T: ?Sized> Mutex<T> {
	/// Acquires the mutex, blocking the caller until it becomes available.
	pub fn lock(&self) -> MutexGuard<T> {
		while self.locked.swap(true, Acquire) {
			hint::spin_loop();
		}
		MutexGuard {
			mutex: self,
		}
	}
}

unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let guard = self.lock();
		fmt::Debug::fmt(&*guard, f)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn lock_unlock() {
		let mutex = Mutex::new(0usize);
		*mutex.lock() += 1;
		*mutex.lock() += 1;
		assert_eq!(*mutex.lock(), 2);
	}
}
