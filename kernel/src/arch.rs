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

//! Architecture-specific primitives this crate treats as external
//! collaborators: interrupt masking only. The actual CPU instructions
//! (`cli`/`sti`) live in the host kernel's arch layer; this module exposes
//! the narrow interface [`sync::spin::IntSpin`] needs and a test-only
//! software model of the interrupt flag so the core can be exercised without
//! one.

use core::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Disables interrupts on the current CPU.
pub fn cli() {
	INTERRUPTS_ENABLED.store(false, Ordering::SeqCst);
}

/// Enables interrupts on the current CPU.
pub fn sti() {
	INTERRUPTS_ENABLED.store(true, Ordering::SeqCst);
}

/// Tells whether interrupts are currently enabled on the current CPU.
pub fn is_interrupt_enabled() -> bool {
	INTERRUPTS_ENABLED.load(Ordering::SeqCst)
}
