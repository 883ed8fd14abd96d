//! Native stack growth for recursive execution.
//!
//! Loop bodies, calls, constructors and cascading object destruction all
//! re-enter the engine recursively. The hoc frame limit bounds the depth, but
//! each level costs several native frames, so re-entry points grow the native
//! stack on demand instead of relying on the thread's default size.

/// Run `f`, growing the native stack first if it is nearly exhausted.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    // Remaining space below which a new segment is allocated.
    const RED_ZONE: usize = 128 * 1024;
    // Size of each new segment.
    const SEGMENT: usize = 2 * 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, SEGMENT, f)
}

/// wasm32 has no stack switching; call straight through.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
