//! Authoritative turtle storage.

use turtlegrid_core::{AgentSet, AgentSetScope, Liveness, TurtleId, TurtleSlot, TurtleState};

/// Generational arena that stores turtles and allocates their handles.
///
/// Killing a turtle retires its slot generation and queues the slot for
/// reuse. The world-wide turtle set keeps retired handles until they
/// outnumber the live ones, then drops them; readers filter the rest out
/// through liveness checks.
#[derive(Debug)]
pub(crate) struct TurtleRegistry {
    slots: Vec<TurtleSlot>,
    free: Vec<u32>,
    live: usize,
    all: AgentSet<TurtleId>,
}

struct Arena<'a>(&'a [TurtleSlot]);

impl Liveness for Arena<'_> {
    fn is_turtle_alive(&self, turtle: TurtleId) -> bool {
        self.0
            .get(turtle.slot_index())
            .and_then(|slot| slot.resolve(turtle))
            .is_some()
    }
}

impl TurtleRegistry {
    /// Creates an empty registry.
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            all: AgentSet::new(AgentSetScope::World),
        }
    }

    /// Kills every turtle while keeping slot generations, so handles issued
    /// before the reset stay stale.
    pub(crate) fn reset(&mut self) {
        for slot in &mut self.slots {
            let _ = slot.vacate();
        }
        self.free = (0..self.slots.len())
            .rev()
            .filter_map(|slot| u32::try_from(slot).ok())
            .collect();
        self.live = 0;
        self.all = AgentSet::new(AgentSetScope::World);
    }

    /// Stores a new turtle and returns its handle.
    ///
    /// Returns `None` once every addressable slot is in use.
    pub(crate) fn spawn(&mut self, state: TurtleState) -> Option<TurtleId> {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                let slot = u32::try_from(self.slots.len()).ok()?;
                self.slots.push(TurtleSlot::vacant());
                slot
            }
        };

        let generation = self.slots.get_mut(slot as usize)?.occupy(state);
        let turtle = TurtleId::new(slot, generation);
        self.all.add(turtle);
        self.live += 1;
        Some(turtle)
    }

    /// Removes the turtle, returning its final state when the handle was live.
    pub(crate) fn kill(&mut self, turtle: TurtleId) -> Option<TurtleState> {
        let slot = self.slots.get_mut(turtle.slot_index())?;
        if slot.resolve(turtle).is_none() {
            return None;
        }
        let state = slot.vacate()?;
        self.free.push(turtle.slot());
        self.live -= 1;
        if self.all.stored_len() > 2 * self.live {
            self.all.compact(&Arena(&self.slots));
        }
        Some(state)
    }

    /// State of a live turtle.
    pub(crate) fn get(&self, turtle: TurtleId) -> Option<&TurtleState> {
        self.slots
            .get(turtle.slot_index())
            .and_then(|slot| slot.resolve(turtle))
    }

    /// Mutable state of a live turtle.
    pub(crate) fn get_mut(&mut self, turtle: TurtleId) -> Option<&mut TurtleState> {
        self.slots
            .get_mut(turtle.slot_index())
            .and_then(|slot| slot.resolve_mut(turtle))
    }

    /// Raw arena slots.
    pub(crate) fn slots(&self) -> &[TurtleSlot] {
        &self.slots
    }

    /// The world-wide turtle set in creation order.
    pub(crate) fn all(&self) -> &AgentSet<TurtleId> {
        &self.all
    }
}

impl Liveness for TurtleRegistry {
    fn is_turtle_alive(&self, turtle: TurtleId) -> bool {
        self.get(turtle).is_some()
    }
}
