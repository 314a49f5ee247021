//! SSA statements and statement lists.

use crate::{
    bytecode::{Address, ArrayKind},
    classfile::FieldType,
    relooper::Label,
    ssa::{FieldReference, ValueId},
};

/// One SSA statement.
///
/// Control transfers name their target by block start address. The relooper later
/// replaces every [`Expression::Goto`] by a [`Expression::Break`] or
/// [`Expression::Continue`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `variable := value`
    VariableAssignment {
        /// Assigned variable
        variable: ValueId,
        /// Assigned value
        value: ValueId,
    },
    /// `return`
    Return,
    /// `return value`
    ReturnValue(ValueId),
    /// `throw value`
    Throw(ValueId),
    /// Unconditional jump to the block starting at the address
    Goto(Address),
    /// Runs `then` if `condition` holds
    If {
        /// A boolean value, usually a `Relation` or `NullTest`
        condition: ValueId,
        /// Statements for the taken branch; normally a single `Goto`
        then: ExpressionList,
    },
    /// Dense switch
    TableSwitch {
        /// Switched value
        value: ValueId,
        /// Key of `cases[0]`
        low: i32,
        /// Key of the last case
        high: i32,
        /// Statements for keys outside `low..=high`
        default: ExpressionList,
        /// One statement list per key in `low..=high`
        cases: Vec<ExpressionList>,
    },
    /// Sparse switch
    LookupSwitch {
        /// Switched value
        value: ValueId,
        /// Statements for unmatched keys
        default: ExpressionList,
        /// Statement list per key, keys ascending
        cases: Vec<(i32, ExpressionList)>,
    },
    /// `target.field = value`
    PutField {
        /// Written field
        field: FieldReference,
        /// Object holding the field
        target: ValueId,
        /// Stored value
        value: ValueId,
    },
    /// `Class.field = value`
    PutStatic {
        /// Written field
        field: FieldReference,
        /// Stored value
        value: ValueId,
    },
    /// `array[index] = value`
    ArrayStore {
        /// Element kind of the store instruction
        kind: ArrayKind,
        /// The array
        array: ValueId,
        /// Element index
        index: ValueId,
        /// Stored value
        value: ValueId,
    },
    /// A call whose result is unused; the value is an `Invoke` or `InvokeDynamic`
    Invoke(ValueId),
    /// Throws unless `value` is an instance of `class`
    CheckCast {
        /// Checked value
        value: ValueId,
        /// Required type
        class: FieldType,
    },
    /// `monitorenter`
    MonitorEnter(ValueId),
    /// `monitorexit`
    MonitorExit(ValueId),
    /// Free text for humans
    Comment(String),
    /// Leaves the labeled block and continues after it
    Break {
        /// Block being left
        label: Label,
        /// Start address of the node control continues at
        target: Address,
        /// No jump needs to be emitted; control falls into the next block anyway
        silent: bool,
        /// The label variable must be set to `target` before leaving
        set_label: bool,
    },
    /// Restarts the labeled loop
    Continue {
        /// Loop being restarted
        label: Label,
        /// Start address of the loop entry
        target: Address,
        /// The label variable must be set to `target` before jumping
        set_label: bool,
    },
}

impl Expression {
    /// True if control never continues to the next statement of the same list.
    #[must_use]
    pub fn is_never_returning(&self) -> bool {
        matches!(
            self,
            Expression::Return
                | Expression::ReturnValue(_)
                | Expression::Throw(_)
                | Expression::Goto(_)
                | Expression::TableSwitch { .. }
                | Expression::LookupSwitch { .. }
                | Expression::Break { .. }
                | Expression::Continue { .. }
        )
    }

    /// Direct value operands in evaluation order.
    #[must_use]
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Expression::VariableAssignment { value, .. } => vec![*value],
            Expression::ReturnValue(value)
            | Expression::Throw(value)
            | Expression::Invoke(value)
            | Expression::MonitorEnter(value)
            | Expression::MonitorExit(value) => vec![*value],
            Expression::If { condition, .. } => vec![*condition],
            Expression::TableSwitch { value, .. } | Expression::LookupSwitch { value, .. } => {
                vec![*value]
            }
            Expression::PutField { target, value, .. } => vec![*target, *value],
            Expression::PutStatic { value, .. } => vec![*value],
            Expression::ArrayStore {
                array,
                index,
                value,
                ..
            } => vec![*array, *index, *value],
            Expression::CheckCast { value, .. } => vec![*value],
            Expression::Return
            | Expression::Goto(_)
            | Expression::Comment(_)
            | Expression::Break { .. }
            | Expression::Continue { .. } => Vec::new(),
        }
    }

    /// Mutable direct value operands in evaluation order.
    ///
    /// The assigned variable of a `VariableAssignment` is a definition, not an operand.
    pub fn operands_mut(&mut self) -> Vec<&mut ValueId> {
        match self {
            Expression::VariableAssignment { value, .. } => vec![value],
            Expression::ReturnValue(value)
            | Expression::Throw(value)
            | Expression::Invoke(value)
            | Expression::MonitorEnter(value)
            | Expression::MonitorExit(value) => vec![value],
            Expression::If { condition, .. } => vec![condition],
            Expression::TableSwitch { value, .. } | Expression::LookupSwitch { value, .. } => {
                vec![value]
            }
            Expression::PutField { target, value, .. } => vec![target, value],
            Expression::PutStatic { value, .. } => vec![value],
            Expression::ArrayStore {
                array,
                index,
                value,
                ..
            } => vec![array, index, value],
            Expression::CheckCast { value, .. } => vec![value],
            Expression::Return
            | Expression::Goto(_)
            | Expression::Comment(_)
            | Expression::Break { .. }
            | Expression::Continue { .. } => Vec::new(),
        }
    }

    /// Nested statement lists: `If` branches and switch cases, default last.
    #[must_use]
    pub fn nested_lists(&self) -> Vec<&ExpressionList> {
        match self {
            Expression::If { then, .. } => vec![then],
            Expression::TableSwitch { default, cases, .. } => {
                cases.iter().chain(std::iter::once(default)).collect()
            }
            Expression::LookupSwitch { default, cases, .. } => cases
                .iter()
                .map(|(_, list)| list)
                .chain(std::iter::once(default))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Mutable nested statement lists, in the order of [`Expression::nested_lists`].
    pub fn nested_lists_mut(&mut self) -> Vec<&mut ExpressionList> {
        match self {
            Expression::If { then, .. } => vec![then],
            Expression::TableSwitch { default, cases, .. } => {
                cases.iter_mut().chain(std::iter::once(default)).collect()
            }
            Expression::LookupSwitch { default, cases, .. } => cases
                .iter_mut()
                .map(|(_, list)| list)
                .chain(std::iter::once(default))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// An ordered list of statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionList {
    expressions: Vec<Expression>,
}

impl ExpressionList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        ExpressionList::default()
    }

    /// A list holding only `Goto(target)`.
    #[must_use]
    pub fn goto(target: Address) -> Self {
        ExpressionList {
            expressions: vec![Expression::Goto(target)],
        }
    }

    /// Appends a statement.
    pub fn push(&mut self, expression: Expression) {
        self.expressions.push(expression);
    }

    /// Number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    /// True if the list has no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    /// Statement at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Expression> {
        self.expressions.get(index)
    }

    /// Mutable statement at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Expression> {
        self.expressions.get_mut(index)
    }

    /// Statements in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Expression> {
        self.expressions.iter()
    }

    /// Mutable statements in order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Expression> {
        self.expressions.iter_mut()
    }

    /// The last statement.
    #[must_use]
    pub fn last(&self) -> Option<&Expression> {
        self.expressions.last()
    }

    /// The statement before `index`.
    #[must_use]
    pub fn predecessor_of(&self, index: usize) -> Option<&Expression> {
        index.checked_sub(1).and_then(|prev| self.expressions.get(prev))
    }

    /// The statement after `index`.
    #[must_use]
    pub fn successor_of(&self, index: usize) -> Option<&Expression> {
        self.expressions.get(index + 1)
    }

    /// Replaces the statement at `index`, returning the old one.
    ///
    /// Returns `None` and leaves the list untouched if `index` is out of range.
    pub fn replace(&mut self, index: usize, expression: Expression) -> Option<Expression> {
        self.expressions
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, expression))
    }

    /// Removes and returns the statement at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Expression> {
        (index < self.expressions.len()).then(|| self.expressions.remove(index))
    }

    /// Inserts `expression` before position `index`; `index == len()` appends.
    pub fn insert_before(&mut self, index: usize, expression: Expression) {
        let index = index.min(self.expressions.len());
        self.expressions.insert(index, expression);
    }

    /// True if the last statement never lets control reach the end of the list.
    #[must_use]
    pub fn ends_with_never_returning(&self) -> bool {
        self.last().is_some_and(Expression::is_never_returning)
    }

    /// True if the last statement is a `Return` or `ReturnValue`.
    #[must_use]
    pub fn ends_with_return(&self) -> bool {
        matches!(
            self.last(),
            Some(Expression::Return | Expression::ReturnValue(_))
        )
    }

    /// Targets of every `Goto` in this list and all nested lists, in statement order,
    /// without duplicates.
    #[must_use]
    pub fn jump_targets(&self) -> Vec<Address> {
        let mut targets = Vec::new();
        self.collect_targets(&mut targets);
        targets
    }

    fn collect_targets(&self, targets: &mut Vec<Address>) {
        for expression in &self.expressions {
            if let Expression::Goto(target) = expression {
                if !targets.contains(target) {
                    targets.push(*target);
                }
            }
            for nested in expression.nested_lists() {
                nested.collect_targets(targets);
            }
        }
    }

    /// Targets of conditional jumps: `Goto`s nested inside `If` branches.
    #[must_use]
    pub fn conditional_targets(&self) -> Vec<Address> {
        let mut targets = Vec::new();
        for expression in &self.expressions {
            if let Expression::If { then, .. } = expression {
                for target in then.jump_targets() {
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
        }
        targets
    }
}

impl<'a> IntoIterator for &'a ExpressionList {
    type Item = &'a Expression;
    type IntoIter = std::slice::Iter<'a, Expression>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Expression> for ExpressionList {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        ExpressionList {
            expressions: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goto(target: u32) -> Expression {
        Expression::Goto(Address::new(target))
    }

    #[test]
    fn test_list_editing() {
        let mut list: ExpressionList = [Expression::Comment("a".into()), goto(4)]
            .into_iter()
            .collect();
        list.insert_before(1, Expression::Comment("b".into()));
        assert_eq!(list.len(), 3);
        assert_eq!(list.predecessor_of(2), Some(&Expression::Comment("b".into())));
        assert_eq!(list.successor_of(0), Some(&Expression::Comment("b".into())));
        assert_eq!(list.predecessor_of(0), None);

        let old = list.replace(0, Expression::Return).unwrap();
        assert_eq!(old, Expression::Comment("a".into()));
        assert_eq!(list.remove(1), Some(Expression::Comment("b".into())));
        assert_eq!(list.remove(7), None);
        assert!(list.ends_with_never_returning());
        assert!(!list.ends_with_return());
    }

    #[test]
    fn test_jump_targets_recurse_into_nested_lists() {
        let mut list = ExpressionList::new();
        list.push(Expression::If {
            condition: ValueId::new(0),
            then: ExpressionList::goto(Address::new(10)),
        });
        list.push(Expression::TableSwitch {
            value: ValueId::new(1),
            low: 0,
            high: 1,
            default: ExpressionList::goto(Address::new(30)),
            cases: vec![
                ExpressionList::goto(Address::new(20)),
                ExpressionList::goto(Address::new(10)),
            ],
        });
        assert_eq!(
            list.jump_targets(),
            vec![Address::new(10), Address::new(20), Address::new(30)]
        );
        assert_eq!(list.conditional_targets(), vec![Address::new(10)]);
        assert!(list.ends_with_never_returning());
    }
}
