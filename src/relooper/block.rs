//! Structured blocks produced by the relooper.

use std::collections::BTreeSet;

use strum::IntoStaticStr;

use crate::{bytecode::Address, ssa::ExpressionList, utils::graph::NodeId};

index_type!(
    /// Names a [`Block`] so that `Break` and `Continue` statements can refer to it.
    Label,
    "L"
);

/// A structured block.
///
/// Blocks form a chain through `next`: control leaves a block by falling into its
/// `next`, which is also where a `Break` naming the block continues.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
pub enum Block {
    /// A single region node executed once
    Simple {
        /// Label of this block
        label: Label,
        /// Some non-silent `Break` names this block
        label_required: bool,
        /// The node itself
        entries: BTreeSet<NodeId>,
        /// The region node whose statements form the body
        node: NodeId,
        /// The node's statements with every `Goto` rewritten
        body: ExpressionList,
        /// What runs afterwards
        next: Option<Box<Block>>,
    },
    /// An endless loop left only through `Break` or a return
    Loop {
        /// Label named by `Continue` and `Break`
        label: Label,
        /// Some `Break` or `Continue` names this block
        label_required: bool,
        /// Nodes a `Continue` may target
        entries: BTreeSet<NodeId>,
        /// The loop body
        inner: Box<Block>,
        /// What runs after the loop is left
        next: Option<Box<Block>>,
    },
    /// A dispatch on the label variable
    ///
    /// The handler whose key equals the label variable runs. If none matches, control
    /// continues with `next`.
    Multiple {
        /// Label of this block
        label: Label,
        /// Some non-silent `Break` names this block
        label_required: bool,
        /// All entries, including those without a handler
        entries: BTreeSet<NodeId>,
        /// Handlers keyed by the start address of their entry
        handlers: Vec<(Address, Block)>,
        /// What runs after the handler
        next: Option<Box<Block>>,
    },
}

impl Block {
    /// Label of this block.
    #[must_use]
    pub fn label(&self) -> Label {
        match self {
            Block::Simple { label, .. } | Block::Loop { label, .. } | Block::Multiple { label, .. } => {
                *label
            }
        }
    }

    /// True if a jump names this block's label.
    #[must_use]
    pub fn label_required(&self) -> bool {
        match self {
            Block::Simple { label_required, .. }
            | Block::Loop { label_required, .. }
            | Block::Multiple { label_required, .. } => *label_required,
        }
    }

    pub(crate) fn set_label_required(&mut self, required: bool) {
        match self {
            Block::Simple { label_required, .. }
            | Block::Loop { label_required, .. }
            | Block::Multiple { label_required, .. } => *label_required = required,
        }
    }

    /// Nodes through which control enters this block.
    #[must_use]
    pub fn entries(&self) -> &BTreeSet<NodeId> {
        match self {
            Block::Simple { entries, .. }
            | Block::Loop { entries, .. }
            | Block::Multiple { entries, .. } => entries,
        }
    }

    /// The block that runs afterwards.
    #[must_use]
    pub fn next(&self) -> Option<&Block> {
        match self {
            Block::Simple { next, .. } | Block::Loop { next, .. } | Block::Multiple { next, .. } => {
                next.as_deref()
            }
        }
    }

    /// Mutable access to the following block.
    pub fn next_mut(&mut self) -> Option<&mut Block> {
        match self {
            Block::Simple { next, .. } | Block::Loop { next, .. } | Block::Multiple { next, .. } => {
                next.as_deref_mut()
            }
        }
    }

    /// Variant name: `"Simple"`, `"Loop"` or `"Multiple"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// This block followed by every block on its `next` chain.
    pub fn chain(&self) -> impl Iterator<Item = &Block> + '_ {
        std::iter::successors(Some(self), |block| block.next())
    }

    /// Every block in this tree, chains and nested blocks included, in pre-order.
    #[must_use]
    pub fn descendants(&self) -> Vec<&Block> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(block) = stack.pop() {
            out.push(block);
            let mut children = Vec::new();
            match block {
                Block::Simple { .. } => {}
                Block::Loop { inner, .. } => children.push(inner.as_ref()),
                Block::Multiple { handlers, .. } => {
                    children.extend(handlers.iter().map(|(_, handler)| handler));
                }
            }
            children.extend(block.next());
            stack.extend(children.into_iter().rev());
        }
        out
    }
}
