//! The variable I/O bus (spec.md §4.3): subscription bookkeeping and the
//! per-step barrier. Deliberately free of sockets — the networking glue in
//! `network.rs` feeds samples in via `ingest_sample` and reads the
//! subscription deltas back out to drive actual SUB connections. Grounded
//! on the barrier shape described in spec.md §4.3; there is no teacher
//! analogue for this exact rendezvous, so the collected/early-arrival split
//! is original to this crate, built directly from the spec text.

use cosim_proto::model::{ScalarValue, SlaveId, StepId, VariableId, VariableRef};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct VariableBus {
    /// local input -> remote source it is wired to.
    subscriptions: HashMap<VariableId, VariableRef>,
    /// remote slave -> set of our inputs sourced from it, so we know when
    /// the last subscriber to a peer goes away and the connection can drop.
    remote_refcount: HashMap<SlaveId, HashSet<VariableId>>,

    current_step: StepId,
    expected: HashSet<VariableId>,
    collected: HashMap<VariableId, ScalarValue>,
    early: HashMap<StepId, HashMap<VariableId, ScalarValue>>,
}

impl VariableBus {
    pub fn new() -> VariableBus {
        VariableBus::default()
    }

    /// Wires `input` to `source`. Returns `true` if this is the first
    /// subscription to `source.slave` (the networking layer should open a
    /// new SUB connection).
    pub fn connect(&mut self, input: VariableId, source: VariableRef) -> bool {
        self.subscriptions.insert(input, source);
        let set = self.remote_refcount.entry(source.slave).or_insert_with(HashSet::new);
        let is_new_peer = set.is_empty();
        set.insert(input);
        is_new_peer
    }

    /// Removes the subscription for `input`. Returns the remote slave whose
    /// SUB connection should be dropped if this was its last subscriber.
    pub fn disconnect(&mut self, input: VariableId) -> Option<SlaveId> {
        let source = self.subscriptions.remove(&input)?;
        self.expected.remove(&input);
        self.collected.remove(&input);

        if let Some(set) = self.remote_refcount.get_mut(&source.slave) {
            set.remove(&input);
            if set.is_empty() {
                self.remote_refcount.remove(&source.slave);
                return Some(source.slave);
            }
        }
        None
    }

    pub fn remote_slaves(&self) -> impl Iterator<Item = &SlaveId> {
        self.remote_refcount.keys()
    }

    /// Starts the barrier for `step_id`: computes the expected set from the
    /// current subscriptions and pulls in anything that arrived early.
    pub fn begin_step(&mut self, step_id: StepId) {
        self.current_step = step_id;
        self.expected = self.subscriptions.keys().copied().collect();
        self.collected = self.early.remove(&step_id).unwrap_or_default();
    }

    /// Feeds one received sample into the bus. Samples for the current step
    /// are collected immediately; samples one step ahead (a faster peer)
    /// are buffered; anything older is stale and dropped.
    pub fn ingest_sample(&mut self, source: VariableRef, step_id: StepId, value: ScalarValue) {
        for (&input, &wired_source) in &self.subscriptions {
            if wired_source != source {
                continue;
            }

            if step_id == self.current_step {
                self.collected.insert(input, value.clone());
            } else if step_id > self.current_step {
                self.early.entry(step_id).or_insert_with(HashMap::new).insert(input, value.clone());
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.expected.iter().all(|input| self.collected.contains_key(input))
    }

    pub fn pending_inputs(&self) -> Vec<VariableId> {
        self.expected.iter().filter(|input| !self.collected.contains_key(input)).copied().collect()
    }

    pub fn collected(&self) -> &HashMap<VariableId, ScalarValue> {
        &self.collected
    }
}
