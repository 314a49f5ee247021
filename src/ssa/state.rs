//! Abstract frame state tracked per node while building SSA.

use std::collections::BTreeMap;

use crate::{
    ssa::{ValueId, VariableDescription},
    utils::graph::NodeId,
};

/// Where a node takes the values of locals it reads before writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Provider {
    /// The method entry: `this` and the parameters
    Arguments,
    /// The only forward predecessor
    Carry(NodeId),
    /// Several forward predecessors, or a loop header
    Merge(Vec<NodeId>),
}

/// The operand stack and the known locals of one node.
///
/// Before interpretation this is the state at the start of the node; afterwards it is
/// the state at the end. Locals that the node never touched are absent and resolved
/// on demand through the [`Provider`].
#[derive(Debug, Clone)]
pub(crate) struct ParsingState {
    /// Bottom of the stack first
    pub stack: Vec<ValueId>,
    pub locals: BTreeMap<u16, ValueId>,
    pub provider: Provider,
    /// Imports always go through a PHI so back edges can add flows later
    pub loop_header: bool,
}

impl ParsingState {
    pub fn new(provider: Provider, loop_header: bool) -> Self {
        ParsingState {
            stack: Vec::new(),
            locals: BTreeMap::new(),
            provider,
            loop_header,
        }
    }

    /// The value stored at `description`, if known.
    pub fn lookup(&self, description: VariableDescription) -> Option<ValueId> {
        match description {
            VariableDescription::LocalSlot(slot) => self.locals.get(&slot).copied(),
            VariableDescription::StackSlot(depth) => {
                let depth = usize::from(depth);
                self.stack
                    .len()
                    .checked_sub(depth + 1)
                    .map(|index| self.stack[index])
            }
        }
    }

    /// Every known location with its value, stack slots counted from the top.
    pub fn snapshot(&self) -> BTreeMap<VariableDescription, ValueId> {
        let mut snapshot: BTreeMap<VariableDescription, ValueId> = self
            .locals
            .iter()
            .map(|(&slot, &value)| (VariableDescription::LocalSlot(slot), value))
            .collect();
        for (depth, &value) in self.stack.iter().rev().enumerate() {
            let depth = u16::try_from(depth).unwrap_or(u16::MAX);
            snapshot.insert(VariableDescription::StackSlot(depth), value);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_slots_count_from_top() {
        let mut state = ParsingState::new(Provider::Arguments, false);
        state.stack = vec![ValueId::new(1), ValueId::new(2), ValueId::new(3)];
        state.locals.insert(4, ValueId::new(9));

        assert_eq!(
            state.lookup(VariableDescription::StackSlot(0)),
            Some(ValueId::new(3))
        );
        assert_eq!(
            state.lookup(VariableDescription::StackSlot(2)),
            Some(ValueId::new(1))
        );
        assert_eq!(state.lookup(VariableDescription::StackSlot(3)), None);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(
            snapshot[&VariableDescription::LocalSlot(4)],
            ValueId::new(9)
        );
    }
}
