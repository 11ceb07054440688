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

//! Kernel-wide error codes and result aliases.
//!
//! Every fallible operation in the kernel crate returns either an [`EResult`]
//! (a POSIX-style error code) or an [`AllocResult`] (the narrower allocation
//! failure reported by `core::alloc::AllocError`, used on hot allocation
//! paths where carrying a full [`Errno`] is not worth the bytes).

use core::alloc::AllocError;
use core::fmt;

/// A kernel error code.
///
/// Only the subset of POSIX `errno` values actually produced by this crate
/// is represented; this is not an exhaustive errno table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(non_camel_case_types, missing_docs)]
pub enum Errno {
	EINVAL,
	ENOMEM,
	EFAULT,
	EBUSY,
	EEXIST,
	ENOENT,
	EIO,
	ENOSPC,
	EPERM,
}

impl Errno {
	/// Returns the conventional short name of the error code.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::EINVAL => "EINVAL",
			Self::ENOMEM => "ENOMEM",
			Self::EFAULT => "EFAULT",
			Self::EBUSY => "EBUSY",
			Self::EEXIST => "EEXIST",
			Self::ENOENT => "ENOENT",
			Self::EIO => "EIO",
			Self::ENOSPC => "ENOSPC",
			Self::EPERM => "EPERM",
		}
	}
}

impl fmt::Display for Errno {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl From<AllocError> for Errno {
	fn from(_: AllocError) -> Self {
		Self::ENOMEM
	}
}

/// Result of an operation that may fail with a kernel error code.
pub type EResult<T> = Result<T, Errno>;

/// Result of an operation that may fail only because of an allocation
/// failure.
pub type AllocResult<T> = Result<T, AllocError>;

/// Builds an [`Errno`] from one of its variant names.
///
/// ```ignore
/// return Err(errno!(EINVAL));
/// ```
#[macro_export]
macro_rules! errno {
	($variant:ident) => {
		$crate::errno::Errno::$variant
	};
}
