//! Interface lifecycle: reference counting with an atomic state machine.
//!
//! Every interface carries one [`InterfaceLifecycle`]. The registry holds one
//! reference from creation until unregistration; every successful lookup
//! takes another. Physical teardown runs exactly once, on the `put` that
//! drops the count to zero.
//!
//! # Design
//!
//! Uses a single `AtomicU32` to store both state and reference count so that
//! "is it live?" and "take a reference" happen in one CAS.
//!
//! Layout: `[state(8 bits) | ref_count(24 bits)]`

use core::sync::atomic::{AtomicU32, Ordering};

/// Interface lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterfaceState {
    /// Registered and reachable through lookups.
    Live = 0,
    /// Removed from the registry; outstanding references keep it alive.
    Unregistered = 1,
    /// Last reference released, device nodes destroyed.
    TornDown = 2,
}

/// Combined state and reference count in a single atomic value.
pub struct StateAndCount(AtomicU32);

impl StateAndCount {
    const STATE_SHIFT: u32 = 24;
    const COUNT_MASK: u32 = (1 << Self::STATE_SHIFT) - 1;
    const STATE_LIVE: u32 = 0;
    const STATE_UNREGISTERED: u32 = 1;
    const STATE_TORN_DOWN: u32 = 2;

    /// Live, holding the creator's reference.
    pub fn new() -> Self {
        Self(AtomicU32::new((Self::STATE_LIVE << Self::STATE_SHIFT) | 1))
    }

    fn decode_state(value: u32) -> InterfaceState {
        match value >> Self::STATE_SHIFT {
            Self::STATE_LIVE => InterfaceState::Live,
            Self::STATE_UNREGISTERED => InterfaceState::Unregistered,
            _ => InterfaceState::TornDown,
        }
    }

    /// Get the current state.
    #[inline]
    pub fn state(&self) -> InterfaceState {
        Self::decode_state(self.0.load(Ordering::Acquire))
    }

    /// Get the current reference count.
    #[inline]
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Acquire) & Self::COUNT_MASK
    }

    /// Takes a reference only if the interface is still live.
    pub fn try_acquire(&self) -> Result<(), InterfaceState> {
        loop {
            let current = self.0.load(Ordering::Acquire);
            let state = current >> Self::STATE_SHIFT;
            if state != Self::STATE_LIVE {
                return Err(Self::decode_state(current));
            }

            let count = current & Self::COUNT_MASK;
            if count == 0 || count == Self::COUNT_MASK {
                return Err(InterfaceState::Live);
            }

            match self.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(_) => continue,
            }
        }
    }

    /// Takes an additional reference on behalf of an existing holder.
    #[inline]
    pub fn acquire(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops a reference. Returns `true` if it was the last one, in which
    /// case the state is now `TornDown`.
    pub fn release(&self) -> bool {
        loop {
            let current = self.0.load(Ordering::Acquire);
            let count = current & Self::COUNT_MASK;
            debug_assert!(count > 0, "reference released twice");
            let new_value = if count <= 1 {
                Self::STATE_TORN_DOWN << Self::STATE_SHIFT
            } else {
                current - 1
            };

            match self.0.compare_exchange_weak(
                current,
                new_value,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return count <= 1,
                Err(_) => continue,
            }
        }
    }

    /// Moves `Live` to `Unregistered`. Returns `false` if it was not live.
    pub fn set_unregistered(&self) -> bool {
        loop {
            let current = self.0.load(Ordering::Acquire);
            if current >> Self::STATE_SHIFT != Self::STATE_LIVE {
                return false;
            }
            let new_value =
                (Self::STATE_UNREGISTERED << Self::STATE_SHIFT) | (current & Self::COUNT_MASK);

            match self.0.compare_exchange_weak(
                current,
                new_value,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }
}

impl Default for StateAndCount {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference count and state of one interface.
///
/// # State Transitions
///
/// ```text
/// ┌──────┐  begin_unregister()  ┌──────────────┐  last put()  ┌──────────┐
/// │ Live │ ───────────────────> │ Unregistered │ ───────────> │ TornDown │
/// └──────┘                      └──────────────┘              └──────────┘
/// ```
///
/// A registration that fails before the interface is published goes from
/// `Live` straight to `TornDown` when its creator reference is dropped.
pub struct InterfaceLifecycle {
    state_count: StateAndCount,
}

impl InterfaceLifecycle {
    /// Creates a live lifecycle holding one reference.
    pub fn new() -> Self {
        Self {
            state_count: StateAndCount::new(),
        }
    }

    /// Gets the current lifecycle state.
    #[inline]
    pub fn state(&self) -> InterfaceState {
        self.state_count.state()
    }

    /// Gets the current reference count.
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.state_count.count() as usize
    }

    /// Takes a lookup reference if the interface is live.
    #[inline]
    pub fn try_get(&self) -> bool {
        self.state_count.try_acquire().is_ok()
    }

    /// Takes another reference; the caller must already hold one.
    #[inline]
    pub fn get(&self) {
        self.state_count.acquire();
    }

    /// Releases a reference, returning `true` when teardown is due.
    #[inline]
    pub fn put(&self) -> bool {
        self.state_count.release()
    }

    /// Marks the interface as unregistered.
    ///
    /// Returns `false` if it already was.
    pub fn begin_unregister(&self) -> bool {
        self.state_count.set_unregistered()
    }
}

impl Default for InterfaceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for InterfaceLifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InterfaceLifecycle")
            .field("state", &self.state())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
