#![cfg(feature = "alloc")]

use std::cell::Cell;
use std::collections::HashMap;
use std::ptr::NonNull;

use packcbor::{decode, pack, CborAllocator, PackArg};

/// Forwards to the system allocator but fails the `fail_at`-th call to
/// `allocate` (1-indexed), bookkeeping every live allocation so a test can
/// assert nothing leaked when a call partway through a decode/pack fails.
struct FaultInjector {
    calls: Cell<usize>,
    fail_at: usize,
    live: std::sync::Mutex<HashMap<usize, std::alloc::Layout>>,
}

const ALIGN: usize = std::mem::align_of::<u128>();

impl FaultInjector {
    fn new(fail_at: usize) -> Self {
        Self {
            calls: Cell::new(0),
            fail_at,
            live: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

impl CborAllocator for FaultInjector {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if call == self.fail_at {
            return None;
        }
        if size == 0 {
            return NonNull::new(ALIGN as *mut u8);
        }
        let layout = std::alloc::Layout::from_size_align(size, ALIGN).unwrap();
        let raw = unsafe { std::alloc::alloc(layout) };
        let ptr = NonNull::new(raw)?;
        self.live.lock().unwrap().insert(ptr.as_ptr() as usize, layout);
        Some(ptr)
    }

    fn reallocate(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Option<NonNull<u8>> {
        if new_size == 0 {
            self.deallocate(ptr, old_size);
            return NonNull::new(ALIGN as *mut u8);
        }
        if old_size == 0 {
            return self.allocate(new_size);
        }
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if call == self.fail_at {
            return None;
        }
        let old_layout = std::alloc::Layout::from_size_align(old_size, ALIGN).unwrap();
        let raw = unsafe { std::alloc::realloc(ptr.as_ptr(), old_layout, new_size) };
        let new_ptr = NonNull::new(raw)?;
        let mut live = self.live.lock().unwrap();
        live.remove(&(ptr.as_ptr() as usize));
        live.insert(
            new_ptr.as_ptr() as usize,
            std::alloc::Layout::from_size_align(new_size, ALIGN).unwrap(),
        );
        Some(new_ptr)
    }

    fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        if size == 0 {
            return;
        }
        if let Some(layout) = self.live.lock().unwrap().remove(&(ptr.as_ptr() as usize)) {
            unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
        }
    }
}

#[test]
fn decode_leaks_nothing_under_allocation_failure_at_any_call() {
    // [1, [2, 3], "four", {5: 6}]
    let bytes = [
        0x84, 0x01, 0x82, 0x02, 0x03, 0x64, b'f', b'o', b'u', b'r', 0xa1, 0x05, 0x06,
    ];

    // Find how many allocator calls a fault-free decode makes, by growing
    // fail_at until decode stops failing.
    let mut k = 1;
    loop {
        let injector = FaultInjector::new(k);
        let result = decode(&injector, &bytes);
        assert_eq!(
            injector.live_count(),
            0,
            "leaked allocations when failing call #{k}"
        );
        match result {
            Ok(_) => break,
            Err(_) => {
                k += 1;
                assert!(k < 10_000, "decode never succeeds, runaway loop");
            }
        }
    }
    assert!(k > 1, "decode should need at least one allocation");
}

#[test]
fn pack_leaks_nothing_under_allocation_failure_at_any_call() {
    let mut k = 1;
    loop {
        let injector = FaultInjector::new(k);
        let result = pack(
            &injector,
            "{s[uuu]}",
            &[
                PackArg::Text(b"nums"),
                PackArg::Uint(1),
                PackArg::Uint(2),
                PackArg::Uint(3),
            ],
        );
        assert_eq!(
            injector.live_count(),
            0,
            "leaked allocations when failing call #{k}"
        );
        match result {
            Some(v) => {
                packcbor::free(&injector, v);
                break;
            }
            None => {
                k += 1;
                assert!(k < 10_000, "pack never succeeds, runaway loop");
            }
        }
    }
    assert!(k > 1, "pack should need at least one allocation");
}
