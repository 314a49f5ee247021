//! Rewriting `Goto` statements into `Break` and `Continue`.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use crate::{
    bytecode::Address,
    relooper::{Block, Label},
    ssa::{Expression, ExpressionList, Program},
    utils::graph::NodeId,
    Result,
};

/// A block enclosing the statement being rewritten.
#[derive(Debug)]
enum Frame {
    /// Inside a loop body: its entries are restarted with `Continue`
    Loop {
        label: Label,
        entries: BTreeSet<Address>,
    },
    /// Inside a block followed by `next`: its entries are reached with `Break`
    Next {
        label: Label,
        entries: BTreeSet<Address>,
    },
}

struct Rewriter<'p> {
    program: &'p Program,
    frames: Vec<Frame>,
    /// Labels named by a non-silent jump
    used: FxHashSet<Label>,
}

/// Replaces every `Goto` below `block` and marks the labels that jumps name.
///
/// `outer` is a loop enclosing `block` from outside its tree, restarted at the given
/// addresses. Returns whether a jump continues it.
pub(super) fn rewrite_jumps(
    block: &mut Block,
    program: &Program,
    outer: Option<&(Label, BTreeSet<Address>)>,
) -> Result<bool> {
    let mut rewriter = Rewriter {
        program,
        frames: Vec::new(),
        used: FxHashSet::default(),
    };
    if let Some((label, entries)) = outer {
        rewriter.frames.push(Frame::Loop {
            label: *label,
            entries: entries.clone(),
        });
    }
    rewriter.chain(block)?;
    mark_labels(block, &rewriter.used);
    Ok(outer.is_some_and(|(label, _)| rewriter.used.contains(label)))
}

impl Rewriter<'_> {
    fn addresses(&self, entries: &BTreeSet<NodeId>) -> BTreeSet<Address> {
        entries
            .iter()
            .filter_map(|&node| self.program.cfg().node(node).map(|region| region.start))
            .collect()
    }

    fn chain(&mut self, first: &mut Block) -> Result<()> {
        let mut cursor = Some(first);
        while let Some(block) = cursor {
            let label = block.label();
            let next_entries = block.next().map(|next| self.addresses(next.entries()));
            if let Some(entries) = &next_entries {
                self.frames.push(Frame::Next {
                    label,
                    entries: entries.clone(),
                });
            }

            match &mut *block {
                Block::Simple { body, .. } => {
                    self.list(body, Some((label, next_entries.as_ref())))?;
                }
                Block::Loop { entries, inner, .. } => {
                    let entries = self.addresses(entries);
                    self.frames.push(Frame::Loop { label, entries });
                    self.chain(inner)?;
                    self.frames.pop();
                }
                Block::Multiple { handlers, .. } => {
                    for (_, handler) in handlers.iter_mut() {
                        self.chain(handler)?;
                    }
                }
            }

            if next_entries.is_some() {
                self.frames.pop();
            }
            cursor = block.next_mut();
        }
        Ok(())
    }

    /// `top_level` carries the owning Simple block and the entries of its `next` for
    /// the statements that may fall through silently.
    fn list(
        &mut self,
        list: &mut ExpressionList,
        top_level: Option<(Label, Option<&BTreeSet<Address>>)>,
    ) -> Result<()> {
        let last = list.len().saturating_sub(1);
        for (index, expression) in list.iter_mut().enumerate() {
            if let Expression::Goto(target) = *expression {
                *expression = match top_level {
                    Some((label, Some(next))) if index == last && next.contains(&target) => {
                        Expression::Break {
                            label,
                            target,
                            silent: true,
                            set_label: next.len() > 1,
                        }
                    }
                    _ => self.jump(target)?,
                };
                continue;
            }
            for nested in expression.nested_lists_mut() {
                self.list(nested, None)?;
            }
        }
        Ok(())
    }

    fn jump(&mut self, target: Address) -> Result<Expression> {
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Loop { label, entries } if entries.contains(&target) => {
                    self.used.insert(*label);
                    return Ok(Expression::Continue {
                        label: *label,
                        target,
                        set_label: entries.len() > 1,
                    });
                }
                Frame::Next { label, entries } if entries.contains(&target) => {
                    self.used.insert(*label);
                    return Ok(Expression::Break {
                        label: *label,
                        target,
                        silent: false,
                        set_label: entries.len() > 1,
                    });
                }
                _ => {}
            }
        }
        Err(consistency_error!(
            self.program.context().clone(),
            "No enclosing block continues at {}",
            target
        ))
    }
}

fn mark_labels(block: &mut Block, used: &FxHashSet<Label>) {
    let mut cursor = Some(block);
    while let Some(block) = cursor {
        block.set_label_required(used.contains(&block.label()));
        match &mut *block {
            Block::Simple { .. } => {}
            Block::Loop { inner, .. } => mark_labels(inner, used),
            Block::Multiple { handlers, .. } => {
                for (_, handler) in handlers.iter_mut() {
                    mark_labels(handler, used);
                }
            }
        }
        cursor = block.next_mut();
    }
}
