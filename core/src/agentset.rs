//! Ordered, growable agent collections that tolerate dead members.
//!
//! An [`AgentSet`] stores agent handles in insertion order. Turtle handles
//! may go stale while they are stored; every reading operation consults a
//! [`Liveness`] capability and silently skips stale members instead of
//! requiring the set to be rewritten when a turtle dies.
//!
//! Randomized operations take an explicit random source and a
//! caller-provided live count so repeated draws never rescan the set.

use std::{fmt::Debug, hash::Hash};

use rand::Rng;
use thiserror::Error;

use crate::{AgentKind, AgentRef, BreedId, Liveness, PatchId, TurtleId};

/// Handle types that can be stored in an [`AgentSet`].
pub trait Agent: Copy + Eq + Hash + Debug {
    /// Kind of agent the handle refers to.
    const KIND: AgentKind;
    /// Whether agents of this kind can die while referenced.
    const MORTAL: bool;

    /// Reports whether the handle still refers to a live agent.
    fn is_alive<L: Liveness + ?Sized>(self, liveness: &L) -> bool;

    /// Converts the handle into a kind-erased reference.
    fn to_ref(self) -> AgentRef;
}

impl Agent for PatchId {
    const KIND: AgentKind = AgentKind::Patch;
    const MORTAL: bool = false;

    fn is_alive<L: Liveness + ?Sized>(self, _liveness: &L) -> bool {
        true
    }

    fn to_ref(self) -> AgentRef {
        AgentRef::Patch(self)
    }
}

impl Agent for TurtleId {
    const KIND: AgentKind = AgentKind::Turtle;
    const MORTAL: bool = true;

    fn is_alive<L: Liveness + ?Sized>(self, liveness: &L) -> bool {
        liveness.is_turtle_alive(self)
    }

    fn to_ref(self) -> AgentRef {
        AgentRef::Turtle(self)
    }
}

/// Where the members of an agent-set came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentSetScope {
    /// Every agent of the kind in the world.
    ///
    /// Queries trust this tag and skip per-member checks, so only the world
    /// should hand out sets carrying it.
    World,
    /// Every turtle of one breed.
    Breed(BreedId),
    /// An arbitrary materialized subset.
    Adhoc,
}

/// Failures produced by random selection helpers.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    /// More agents were requested than the set holds.
    #[error("requested {requested} agents but only {available} are alive")]
    NotEnoughAgents {
        /// Number of agents requested.
        requested: usize,
        /// Number of live agents in the set.
        available: usize,
    },
}

/// Ordered collection of agents of one kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentSet<A> {
    members: Vec<A>,
    scope: AgentSetScope,
}

impl<A: Agent> AgentSet<A> {
    /// Creates an empty set with the provided scope.
    ///
    /// Callers outside the world should use [`AgentSetScope::Adhoc`].
    #[must_use]
    pub const fn new(scope: AgentSetScope) -> Self {
        Self {
            members: Vec::new(),
            scope,
        }
    }

    /// Creates an empty set able to hold `capacity` members without growing.
    #[must_use]
    pub fn with_capacity(capacity: usize, scope: AgentSetScope) -> Self {
        Self {
            members: Vec::with_capacity(capacity),
            scope,
        }
    }

    /// Wraps already collected members.
    #[must_use]
    pub const fn from_members(members: Vec<A>, scope: AgentSetScope) -> Self {
        Self { members, scope }
    }

    /// Wraps members that form an ad hoc subset.
    #[must_use]
    pub const fn adhoc(members: Vec<A>) -> Self {
        Self::from_members(members, AgentSetScope::Adhoc)
    }

    /// Kind of the stored agents.
    #[must_use]
    pub fn kind(&self) -> AgentKind {
        A::KIND
    }

    /// Origin of the members.
    #[must_use]
    pub const fn scope(&self) -> AgentSetScope {
        self.scope
    }

    /// Number of stored handles, including stale ones.
    #[must_use]
    pub fn stored_len(&self) -> usize {
        self.members.len()
    }

    /// Number of handles the set can hold before it grows.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.members.capacity()
    }

    /// Stored handles in order, including stale ones.
    #[must_use]
    pub fn stored(&self) -> &[A] {
        &self.members
    }

    /// Reports whether every stored handle is guaranteed to be live.
    #[must_use]
    pub fn is_full(&self) -> bool {
        !A::MORTAL
    }

    /// Number of live members.
    ///
    /// Constant time for immortal kinds, a full scan for turtles.
    #[must_use]
    pub fn count<L: Liveness + ?Sized>(&self, liveness: &L) -> usize {
        if self.is_full() {
            self.members.len()
        } else {
            self.members
                .iter()
                .filter(|agent| agent.is_alive(liveness))
                .count()
        }
    }

    /// Reports whether no member is alive, stopping at the first live one.
    #[must_use]
    pub fn is_empty<L: Liveness + ?Sized>(&self, liveness: &L) -> bool {
        if self.is_full() {
            self.members.is_empty()
        } else {
            !self.members.iter().any(|agent| agent.is_alive(liveness))
        }
    }

    /// Reports whether `agent` is a live member.
    #[must_use]
    pub fn contains<L: Liveness + ?Sized>(&self, agent: A, liveness: &L) -> bool {
        agent.is_alive(liveness) && self.members.contains(&agent)
    }

    /// Appends an agent.
    ///
    /// When the storage is exhausted it grows to `2 * capacity + 1`.
    pub fn add(&mut self, agent: A) {
        let capacity = self.members.capacity();
        if self.members.len() == capacity {
            self.members.reserve_exact(capacity + 1);
        }
        self.members.push(agent);
    }

    /// Drops stale handles, keeping live members in order.
    pub fn compact<L: Liveness + ?Sized>(&mut self, liveness: &L) {
        self.members.retain(|agent| agent.is_alive(liveness));
    }

    /// Member stored at `index`, or `None` when the slot is out of range or stale.
    #[must_use]
    pub fn agent_at<L: Liveness + ?Sized>(&self, index: usize, liveness: &L) -> Option<A> {
        let agent = *self.members.get(index)?;
        agent.is_alive(liveness).then_some(agent)
    }

    /// Live members in storage order.
    pub fn iter<'a, L: Liveness + ?Sized>(
        &'a self,
        liveness: &'a L,
    ) -> impl Iterator<Item = A> + 'a {
        self.members
            .iter()
            .copied()
            .filter(move |agent| agent.is_alive(liveness))
    }

    /// Live members in a uniformly random order.
    ///
    /// The iterator owns a snapshot of the members alive right now and
    /// shuffles it lazily, drawing one index per step.
    pub fn shuffled_iter<'r, L, R>(&self, rng: &'r mut R, liveness: &L) -> ShuffledIter<'r, A, R>
    where
        L: Liveness + ?Sized,
        R: Rng + ?Sized,
    {
        let snapshot = self
            .members
            .iter()
            .map(|agent| agent.is_alive(liveness).then_some(*agent))
            .collect();
        ShuffledIter {
            snapshot,
            next: 0,
            rng,
        }
    }

    /// The `r`-th live member, where `r < precomputed_count`.
    ///
    /// `precomputed_count` must be the current [`AgentSet::count`].
    #[must_use]
    pub fn random_one<L: Liveness + ?Sized>(
        &self,
        precomputed_count: usize,
        r: usize,
        liveness: &L,
    ) -> Option<A> {
        debug_assert!(r < precomputed_count, "draw {r} outside 0..{precomputed_count}");
        if self.is_full() {
            self.members.get(r).copied()
        } else {
            self.iter(liveness).nth(r)
        }
    }

    /// Two distinct live members chosen by two draws.
    ///
    /// `r1` must be drawn from `0..precomputed_count` and `r2` from
    /// `0..precomputed_count - 1`. A second draw at or past the first is
    /// shifted up by one so the positions never collide; otherwise the two
    /// are swapped. The pair is returned in iteration order.
    #[must_use]
    pub fn random_two<L: Liveness + ?Sized>(
        &self,
        precomputed_count: usize,
        r1: usize,
        r2: usize,
        liveness: &L,
    ) -> Option<(A, A)> {
        debug_assert!(precomputed_count >= 2, "random_two needs two live members");

        let (first, second) = if r2 >= r1 { (r1, r2 + 1) } else { (r2, r1) };

        if self.is_full() {
            let a = self.members.get(first).copied()?;
            let b = self.members.get(second).copied()?;
            return Some((a, b));
        }

        let mut live = self.iter(liveness);
        let a = live.nth(first)?;
        let b = live.nth(second - first - 1)?;
        Some((a, b))
    }

    /// Selects `result_size` distinct live members in a single pass.
    ///
    /// Each candidate is accepted with probability
    /// `(result_size - accepted) / (precomputed_count - examined)`, using
    /// exactly one draw per examined candidate. The selection keeps
    /// iteration order.
    pub fn random_subset_general<L, R>(
        &self,
        result_size: usize,
        precomputed_count: usize,
        rng: &mut R,
        liveness: &L,
    ) -> Self
    where
        L: Liveness + ?Sized,
        R: Rng + ?Sized,
    {
        debug_assert!(result_size <= precomputed_count);
        let mut result = Self::with_capacity(result_size, AgentSetScope::Adhoc);
        if result_size == 0 {
            return result;
        }

        let mut examined = 0;
        for agent in self.iter(liveness) {
            let remaining = precomputed_count.saturating_sub(examined);
            if remaining == 0 {
                break;
            }

            let needed = result_size - result.stored_len();
            if rng.gen_range(0..remaining) < needed {
                result.add(agent);
                if result.stored_len() == result_size {
                    break;
                }
            }
            examined += 1;
        }

        result
    }

    /// A uniformly chosen live member, or `None` when the set is empty.
    pub fn one_of<L, R>(&self, rng: &mut R, liveness: &L) -> Option<A>
    where
        L: Liveness + ?Sized,
        R: Rng + ?Sized,
    {
        let count = self.count(liveness);
        if count == 0 {
            return None;
        }
        self.random_one(count, rng.gen_range(0..count), liveness)
    }

    /// `n` distinct live members chosen uniformly, in iteration order.
    pub fn n_of<L, R>(&self, n: usize, rng: &mut R, liveness: &L) -> Result<Self, SampleError>
    where
        L: Liveness + ?Sized,
        R: Rng + ?Sized,
    {
        let count = self.count(liveness);
        if n > count {
            return Err(SampleError::NotEnoughAgents {
                requested: n,
                available: count,
            });
        }

        let members = match n {
            0 => Vec::new(),
            1 => self
                .random_one(count, rng.gen_range(0..count), liveness)
                .into_iter()
                .collect(),
            2 => {
                let r1 = rng.gen_range(0..count);
                let r2 = rng.gen_range(0..count - 1);
                self.random_two(count, r1, r2, liveness)
                    .map_or_else(Vec::new, |(a, b)| vec![a, b])
            }
            _ => return Ok(self.random_subset_general(n, count, rng, liveness)),
        };
        Ok(Self::adhoc(members))
    }
}

/// Lazily shuffled snapshot produced by [`AgentSet::shuffled_iter`].
pub struct ShuffledIter<'r, A, R: ?Sized> {
    snapshot: Vec<Option<A>>,
    next: usize,
    rng: &'r mut R,
}

impl<A: Agent, R: Rng + ?Sized> Iterator for ShuffledIter<'_, A, R> {
    type Item = A;

    fn next(&mut self) -> Option<A> {
        while self.next < self.snapshot.len() {
            let pick = self.rng.gen_range(self.next..self.snapshot.len());
            self.snapshot.swap(self.next, pick);
            let drawn = self.snapshot[self.next];
            self.next += 1;
            if drawn.is_some() {
                return drawn;
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.snapshot.len() - self.next))
    }
}
