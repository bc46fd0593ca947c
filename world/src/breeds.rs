//! Breed declarations and their member sets.

use turtlegrid_core::{AgentSet, AgentSetScope, BreedId, Liveness, RejectionReason, TurtleId};

const DEFAULT_BREED_NAME: &str = "turtles";

#[derive(Debug)]
struct BreedEntry {
    name: String,
    members: AgentSet<TurtleId>,
    live: usize,
}

/// Registry of user-declared breeds.
///
/// [`BreedId::TURTLES`] is implicit: its members are the world-wide turtle
/// set, so the registry only tracks declared breeds, starting at id 1.
#[derive(Debug)]
pub(crate) struct BreedRegistry {
    entries: Vec<BreedEntry>,
}

impl BreedRegistry {
    /// Creates a registry holding only the implicit default breed.
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers a breed under a unique name.
    pub(crate) fn declare(&mut self, name: &str) -> Result<BreedId, RejectionReason> {
        if self.lookup(name).is_some() {
            return Err(RejectionReason::DuplicateBreed(name.to_owned()));
        }

        let value = u16::try_from(self.entries.len() + 1)
            .map_err(|_| RejectionReason::DuplicateBreed(name.to_owned()))?;
        let breed = BreedId::new(value);
        self.entries.push(BreedEntry {
            name: name.to_owned(),
            members: AgentSet::new(AgentSetScope::Breed(breed)),
            live: 0,
        });
        Ok(breed)
    }

    /// Finds a breed by name.
    pub(crate) fn lookup(&self, name: &str) -> Option<BreedId> {
        if name == DEFAULT_BREED_NAME {
            return Some(BreedId::TURTLES);
        }
        self.entries
            .iter()
            .position(|entry| entry.name == name)
            .and_then(|index| u16::try_from(index + 1).ok())
            .map(BreedId::new)
    }

    /// Reports whether the breed exists.
    pub(crate) fn contains(&self, breed: BreedId) -> bool {
        breed == BreedId::TURTLES || self.entry(breed).is_some()
    }

    /// Name of the breed.
    pub(crate) fn name(&self, breed: BreedId) -> Option<&str> {
        if breed == BreedId::TURTLES {
            return Some(DEFAULT_BREED_NAME);
        }
        self.entry(breed).map(|entry| entry.name.as_str())
    }

    /// Member set of a declared breed. The default breed has no entry here.
    pub(crate) fn members(&self, breed: BreedId) -> Option<&AgentSet<TurtleId>> {
        self.entry(breed).map(|entry| &entry.members)
    }

    /// Records a new member of a declared breed.
    pub(crate) fn enroll(&mut self, breed: BreedId, turtle: TurtleId) {
        if let Some(entry) = self.entry_mut(breed) {
            entry.members.add(turtle);
            entry.live += 1;
        }
    }

    /// Records the death of a member, dropping stale handles once they
    /// outnumber the live ones.
    pub(crate) fn release<L: Liveness + ?Sized>(&mut self, breed: BreedId, liveness: &L) {
        if let Some(entry) = self.entry_mut(breed) {
            entry.live = entry.live.saturating_sub(1);
            if entry.members.stored_len() > 2 * entry.live {
                entry.members.compact(liveness);
            }
        }
    }

    /// Drops every member while keeping the declarations.
    pub(crate) fn clear_members(&mut self) {
        for entry in &mut self.entries {
            entry.members = AgentSet::new(entry.members.scope());
            entry.live = 0;
        }
    }

    fn entry(&self, breed: BreedId) -> Option<&BreedEntry> {
        usize::from(breed.get())
            .checked_sub(1)
            .and_then(|index| self.entries.get(index))
    }

    fn entry_mut(&mut self, breed: BreedId) -> Option<&mut BreedEntry> {
        usize::from(breed.get())
            .checked_sub(1)
            .and_then(|index| self.entries.get_mut(index))
    }
}
