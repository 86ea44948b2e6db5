//! Cached global state and the broadcast fan-out behind the "all" interface.
//!
//! A write to the aggregate interface is merged into the cached state and
//! then replayed to the matching attribute file of every other live
//! interface. Backend write callbacks may block, so they run on a snapshot
//! taken under the registry lock and released before the first call.

use alloc::vec::Vec;

use spin::Mutex;

use crate::attr::IoKind;
use crate::error::LightsResult;
use crate::interface::{InterfaceId, InterfaceRef};
use crate::registry::InterfaceRegistry;
use crate::state::{State, StateType};

/// Last state written through the aggregate interface.
pub struct GlobalState {
    state: Mutex<State>,
}

impl GlobalState {
    /// Creates the cache from the startup defaults.
    pub fn new(initial: &State) -> Self {
        let mut state = State::of(StateType::UPDATE);
        state.merge_from(&State {
            kind: StateType::UPDATE,
            ..initial.clone()
        });
        Self {
            state: Mutex::new(state),
        }
    }

    /// Copy of the cached state, with mode, color, speed and direction set.
    pub fn snapshot(&self) -> State {
        self.state.lock().clone()
    }

    /// Merges the fields selected by `update.kind` into the cache.
    pub fn merge(&self, update: &State) {
        self.state.lock().merge_from(update);
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Interfaces whose write callback succeeded.
    pub delivered: usize,
    /// Interfaces whose write callback failed.
    pub failed: usize,
}

/// References every live interface except `skip`, retrying until the
/// pre-sized buffer is large enough.
fn snapshot(registry: &InterfaceRegistry, skip: InterfaceId) -> LightsResult<Vec<InterfaceRef>> {
    loop {
        let mut out = Vec::new();
        out.try_reserve_exact(registry.len())?;
        if registry.snapshot_into(&mut out, skip) {
            return Ok(out);
        }
        trace!("registry grew during broadcast snapshot, retrying");
    }
}

/// Invokes the write callback of every interface's `kind` file with `state`.
///
/// A failing backend is logged and skipped; the remaining interfaces still
/// receive the update. Interfaces without a `kind` file are left alone.
pub fn fan_out(
    registry: &InterfaceRegistry,
    aggregate: InterfaceId,
    kind: IoKind,
    state: &State,
) -> LightsResult<BroadcastReport> {
    let targets = snapshot(registry, aggregate)?;
    let mut report = BroadcastReport::default();

    for iface in targets {
        let Some(file) = iface.find_file(kind) else {
            continue;
        };
        let result = file.write(state);
        iface.stats().record_write(&result);
        match result {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                report.failed += 1;
                warn!(
                    "lights/{}/{}: broadcast write failed: {}",
                    iface.name(),
                    file.name(),
                    err
                );
            }
        }
        // `iface` is released here, before the next backend runs.
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Color, Mode};

    #[test]
    fn test_global_state_merge() {
        let mut initial = State::of(StateType::UPDATE);
        initial.mode = Mode::static_color();
        initial.color = Color::new(0xff, 0, 0);
        initial.speed = 3;
        let global = GlobalState::new(&initial);

        let mut update = State::of(StateType::COLOR);
        update.color = Color::new(0, 0xff, 0);
        update.speed = 5; // not selected, must be ignored
        global.merge(&update);

        let snap = global.snapshot();
        assert_eq!(snap.kind, StateType::UPDATE);
        assert_eq!(snap.mode, Mode::static_color());
        assert_eq!(snap.color, Color::new(0, 0xff, 0));
        assert_eq!(snap.speed, 3);
    }
}
