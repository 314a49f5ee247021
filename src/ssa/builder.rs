//! SSA construction.
//!
//! [`SsaBuilder`] lifts one method from the JVM's stack machine into a [`Program`].
//! The work happens in four phases:
//!
//! 1. **Graph** - decode, split into basic blocks, classify back edges and create one
//!    [`crate::ssa::RegionNode`] per block. If the first block is a loop header, a
//!    pre-header in front of it becomes the entry.
//! 2. **Interpretation** - visit every reachable node after all of its forward
//!    predecessors and abstract-interpret its instructions. Operand stack entries and
//!    locals hold [`ValueId`]s; merges create PHI variables.
//! 3. **Fall-through** - every node that can run off its end gets an explicit `Goto`.
//! 4. **PHI completion** - back edges contribute their values to the PHIs of loop
//!    headers. PHIs left with a single value besides themselves are replaced by it, and
//!    every `Goto` is preceded by the copies its target's PHIs need.
//!
//! Locals are imported lazily: a node only learns about a local when it, or one of its
//! successors, reads it. Requests travel backwards through [`Provider`]s until a node
//! that knows the value is found, recording the value in every node they pass. The
//! walk keeps its pending merges on an explicit stack, so long chains of joins do not
//! grow the call stack.
//!
//! Unreachable blocks keep empty nodes and are ignored by every later pass.

use rustc_hash::FxHashSet;

use crate::{
    bytecode::{decode, Address},
    cfg::{BasicBlock, BlockGraph, BlockKind},
    classfile::{ClassModel, CodeAttribute, MethodModel},
    compiler::CompilerOptions,
    linker::LinkerContext,
    ssa::{
        state::{ParsingState, Provider},
        ControlFlowGraph, Expression, ExpressionList, Program, TypeRef, Value, ValueId,
        Variable, VariableDescription, VariableKind,
    },
    utils::graph::NodeId,
    MethodContext, Result,
};

/// Result of following carries from one node.
enum Walk {
    /// The value, and the carry-only nodes passed on the way
    Found(ValueId, Vec<NodeId>),
    /// A node that has to ask its provider
    Pending(Lookup),
}

/// One provider being asked for the value of a local.
struct Lookup {
    /// Node that records the merged value; `None` for the node being interpreted
    owner: Option<NodeId>,
    /// Carry-only nodes between the requester and `owner`
    passed: Vec<NodeId>,
    loop_header: bool,
    predecessors: Vec<NodeId>,
    /// Index of the next predecessor to ask
    next: usize,
    sources: Vec<ValueId>,
}

impl Lookup {
    fn add_source(&mut self, value: ValueId) {
        if !self.sources.contains(&value) {
            self.sources.push(value);
        }
    }
}

/// Builds the SSA [`Program`] of one method.
///
/// # Example
///
/// ```rust,ignore
/// use classscope::{compiler::CompilerOptions, linker::PermissiveLinker, ssa::SsaBuilder};
///
/// let method = class.method("add", "(II)I").unwrap();
/// let options = CompilerOptions::default();
/// let program = SsaBuilder::new(&class, method, &PermissiveLinker, &options).build()?;
/// println!("{} statements", program.statement_count());
/// ```
pub struct SsaBuilder<'a> {
    pub(super) class: &'a ClassModel,
    pub(super) method: &'a MethodModel,
    pub(super) linker: &'a dyn LinkerContext,
    pub(super) options: &'a CompilerOptions,
    pub(super) context: MethodContext,
    pub(super) program: Program,
    states: Vec<Option<ParsingState>>,
    /// Address of the instruction being interpreted, for diagnostics
    pub(super) address: Address,
    /// Bumped whenever an import, export or PHI flow is added
    mutations: usize,
}

impl<'a> SsaBuilder<'a> {
    /// Prepares a builder for `method` of `class`.
    #[must_use]
    pub fn new(
        class: &'a ClassModel,
        method: &'a MethodModel,
        linker: &'a dyn LinkerContext,
        options: &'a CompilerOptions,
    ) -> Self {
        let context = MethodContext::new(class.this_class.clone(), method.qualified_name());
        SsaBuilder {
            class,
            method,
            linker,
            options,
            program: Program::new(context.clone()),
            context,
            states: Vec::new(),
            address: Address::new(0),
            mutations: 0,
        }
    }

    /// Runs all construction phases.
    ///
    /// Methods without a `Code` attribute yield a program with an empty graph.
    ///
    /// # Errors
    ///
    /// - Parse errors in the bytecode or constant pool, wrapped in
    ///   [`crate::Error::InMethod`]
    /// - [`crate::Error::Unsupported`] for `jsr`/`ret`, `ldc` of dynamic constants and
    ///   references the linker cannot resolve
    /// - [`crate::Error::InternalConsistency`] when the stack shapes of merging paths
    ///   differ, a node has no fall-through successor or a jump target cannot provide
    ///   the values it imports
    pub fn build(mut self) -> Result<Program> {
        let Some(code) = self.method.code() else {
            return Ok(self.program);
        };

        let blocks = self.build_graph(code)?;
        self.create_arguments(code);
        self.interpret(&blocks, code)?;
        self.synthesize_fallthroughs()?;
        self.complete_phis()?;
        self.remove_trivial_phis();
        self.insert_phi_copies()?;

        log::debug!(
            "{}: {} nodes, {} values, {} statements, {} PHIs",
            self.context,
            self.program.cfg.len(),
            self.program.values.len(),
            self.program.statement_count(),
            self.program.phi_variables().count()
        );
        Ok(self.program)
    }

    /// Decodes `code`, splits it into blocks and creates the region graph.
    ///
    /// A method whose first block is a loop header gets a pre-header that holds the
    /// initial copies into that block's PHIs.
    fn build_graph(&mut self, code: &CodeAttribute) -> Result<BlockGraph> {
        let instructions = decode(&code.code).map_err(|error| error.in_method(&self.context))?;
        let blocks = BlockGraph::build(&instructions, &code.exception_table, &self.context)
            .map_err(|error| error.in_method(&self.context))?;
        self.program.cfg = ControlFlowGraph::from_blocks(&blocks)?;

        if self.program.cfg.is_loop_header(NodeId::new(0)) {
            let end = Address::new(u32::try_from(code.code.len()).unwrap_or(u32::MAX));
            self.program.cfg.add_preheader(end, &self.context)?;
        }
        self.states = vec![None; self.program.cfg.len()];
        Ok(blocks)
    }

    /// Interprets every reachable node in construction order.
    fn interpret(&mut self, blocks: &BlockGraph, code: &CodeAttribute) -> Result<()> {
        let order = self.construction_order();
        log::trace!(
            "{}: construction order {:?}",
            self.context,
            order
                .iter()
                .filter_map(|&node| self.program.cfg.node(node).map(|n| n.start.value()))
                .collect::<Vec<_>>()
        );

        for node in order {
            if Some(node) == self.program.cfg.preheader() {
                self.enter_preheader(node);
                continue;
            }
            let Some(block) = blocks.block(node) else {
                continue;
            };
            self.process(node, block, code)?;
        }
        Ok(())
    }

    /// The pre-header only jumps to block 0; its copies are added with the others.
    fn enter_preheader(&mut self, node: NodeId) {
        let first = self
            .program
            .cfg
            .node(NodeId::new(0))
            .map_or(Address::new(0), |region| region.start);
        self.states[node.index()] = Some(ParsingState::new(Provider::Arguments, false));
        self.emit(node, Expression::Goto(first));
    }

    fn create_arguments(&mut self, code: &CodeAttribute) {
        let mut slot = 0u16;
        if !self.method.is_static() {
            let this = self.program.values.push(Value::This);
            let variable = self.program.values.push(Value::Variable(Variable {
                name: "this".to_string(),
                ty: TypeRef::object(&self.class.this_class),
                kind: VariableKind::Argument,
                incoming: vec![this],
                deleted: false,
            }));
            self.program.arguments.push((0, variable));
            slot = 1;
        }

        for (index, parameter) in self.method.signature.parameters.iter().enumerate() {
            let number = u16::try_from(index).unwrap_or(u16::MAX);
            let name = code
                .local_variable_name(slot, Address::new(0))
                .map_or_else(|| format!("arg{index}"), str::to_string);
            let value = self.program.values.push(Value::Parameter(number));
            let variable = self.program.values.push(Value::Variable(Variable {
                name,
                ty: TypeRef::from_field_type(parameter),
                kind: VariableKind::Argument,
                incoming: vec![value],
                deleted: false,
            }));
            self.program.arguments.push((slot, variable));
            slot = slot.saturating_add(parameter.slot_size());
        }
    }

    /// Reachable nodes ordered so that every node comes after its forward
    /// predecessors.
    ///
    /// Walks backwards from every final node, then from every handler, then from any
    /// node still missing (loops without exits).
    fn construction_order(&self) -> Vec<NodeId> {
        let cfg = &self.program.cfg;
        let mut roots = cfg.final_nodes();
        roots.extend(cfg.nodes().filter_map(|(id, node)| {
            (node.kind.is_handler() && cfg.is_reachable(id)).then_some(id)
        }));
        roots.extend(
            cfg.nodes()
                .map(|(id, _)| id)
                .filter(|&id| cfg.is_reachable(id)),
        );

        let mut visited = FxHashSet::default();
        let mut order = Vec::with_capacity(cfg.len());
        for root in roots {
            if !visited.insert(root) {
                continue;
            }
            let mut stack = vec![(root, self.live_predecessors(root), 0usize)];
            while let Some((node, predecessors, cursor)) = stack.last_mut() {
                if let Some(&predecessor) = predecessors.get(*cursor) {
                    *cursor += 1;
                    if visited.insert(predecessor) {
                        let next = self.live_predecessors(predecessor);
                        stack.push((predecessor, next, 0));
                    }
                } else {
                    order.push(*node);
                    stack.pop();
                }
            }
        }
        order
    }

    /// Reachable predecessors over normal edges.
    fn live_predecessors(&self, node: NodeId) -> Vec<NodeId> {
        let cfg = &self.program.cfg;
        cfg.forward_predecessors(node)
            .into_iter()
            .filter(|&predecessor| cfg.is_reachable(predecessor))
            .collect()
    }

    fn process(&mut self, node: NodeId, block: &BasicBlock, code: &CodeAttribute) -> Result<()> {
        self.address = block.start;
        if self.options.emit_comments {
            self.emit(
                node,
                Expression::Comment(format!("block {} ({})", block.start, block.kind)),
            );
        }

        let mut state = self.seed_state(node, block, code)?;
        for instruction in &block.instructions {
            self.address = instruction.address;
            self.step(node, &mut state, instruction)
                .map_err(|error| error.in_method(&self.context.at(instruction.address)))?;
        }

        let exports = state.snapshot();
        if let Some(region) = self.program.cfg.node_mut(node) {
            region.exports = exports;
        }
        self.states[node.index()] = Some(state);
        Ok(())
    }

    fn seed_state(
        &mut self,
        node: NodeId,
        block: &BasicBlock,
        code: &CodeAttribute,
    ) -> Result<ParsingState> {
        let loop_header = self.program.cfg.is_loop_header(node);
        if Some(node) == self.program.cfg.entry() {
            return Ok(ParsingState::new(Provider::Arguments, false));
        }

        let predecessors = self.live_predecessors(node);
        let provider = match predecessors.as_slice() {
            [] => {
                return Err(consistency_error!(
                    self.context.at(block.start),
                    "Block {} has no forward predecessor",
                    block.start
                ))
            }
            [single] if !loop_header => Provider::Carry(*single),
            _ => Provider::Merge(predecessors.clone()),
        };
        let mut state = ParsingState::new(provider, loop_header);

        if block.kind.is_handler() {
            let exception = self.exception_variable(node, block, code);
            state.stack.push(exception);
            return Ok(state);
        }

        let mut depth = None;
        for &predecessor in &predecessors {
            let stack_len = self.state(predecessor)?.stack.len();
            match depth {
                None => depth = Some(stack_len),
                Some(expected) if expected != stack_len => {
                    return Err(consistency_error!(
                        self.context.at(block.start),
                        "Stack depth mismatch at {}: {} vs {}",
                        block.start,
                        expected,
                        stack_len
                    ))
                }
                Some(_) => {}
            }
        }

        for position in 0..depth.unwrap_or(0) {
            let mut sources = Vec::new();
            for &predecessor in &predecessors {
                let value = self.state(predecessor)?.stack[position];
                if !sources.contains(&value) {
                    sources.push(value);
                }
            }
            let value = self.merge(sources, loop_header);
            state.stack.push(value);
        }

        let imports: Vec<(VariableDescription, ValueId)> =
            state.snapshot().into_iter().collect();
        if let Some(region) = self.program.cfg.node_mut(node) {
            region.imports.extend(imports);
        }
        Ok(state)
    }

    /// Binds the caught exception of a handler block to a variable.
    fn exception_variable(
        &mut self,
        node: NodeId,
        block: &BasicBlock,
        code: &CodeAttribute,
    ) -> ValueId {
        let mut catch_types = code
            .exception_table
            .iter()
            .filter(|entry| entry.handler_pc == block.start)
            .map(|entry| entry.catch_type.as_deref());
        let first = catch_types.next().flatten();
        let ty = match first {
            Some(class) if catch_types.all(|other| other == Some(class)) => TypeRef::object(class),
            _ => TypeRef::object("java/lang/Throwable"),
        };
        let exception = self.program.values.push(Value::CurrentException);
        self.bind(node, ty, exception)
    }

    /// Single sources pass through unchanged unless a PHI is forced.
    fn merge(&mut self, sources: Vec<ValueId>, force_phi: bool) -> ValueId {
        match sources.as_slice() {
            [single] if !force_phi => *single,
            _ => self.new_phi(sources),
        }
    }

    fn new_phi(&mut self, sources: Vec<ValueId>) -> ValueId {
        let mut types = sources.iter().map(|&source| self.program.values.type_of(source));
        let first = types.next().unwrap_or(TypeRef::Reference(None));
        let ty = types.fold(first, |left, right| {
            self.linker.widest_common_type(&left, &right)
        });
        let name = format!("phi{}", self.program.values.len());
        self.mutations += 1;
        self.program.values.push(Value::Variable(Variable {
            name,
            ty,
            kind: VariableKind::Phi,
            incoming: sources,
            deleted: false,
        }))
    }

    /// Creates a plain variable holding `value` and appends its assignment to `node`.
    pub(super) fn bind(&mut self, node: NodeId, ty: TypeRef, value: ValueId) -> ValueId {
        let variable = self.new_variable(ty, value);
        self.emit(node, Expression::VariableAssignment { variable, value });
        variable
    }

    /// Creates a plain variable without emitting its assignment.
    fn new_variable(&mut self, ty: TypeRef, value: ValueId) -> ValueId {
        let name = format!("var{}", self.program.values.len());
        self.program.values.push(Value::Variable(Variable {
            name,
            ty,
            kind: VariableKind::Assigned,
            incoming: vec![value],
            deleted: false,
        }))
    }

    pub(super) fn emit(&mut self, node: NodeId, expression: Expression) {
        if let Some(region) = self.program.cfg.node_mut(node) {
            region.expressions.push(expression);
        }
    }

    pub(super) fn here(&self) -> MethodContext {
        self.context.at(self.address)
    }

    fn state(&self, node: NodeId) -> Result<&ParsingState> {
        self.states
            .get(node.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                consistency_error!(
                    self.here(),
                    "Node {} was used before it was interpreted",
                    node
                )
            })
    }

    fn argument(&self, slot: u16) -> Option<ValueId> {
        self.program
            .arguments
            .iter()
            .find(|(argument_slot, _)| *argument_slot == slot)
            .map(|(_, variable)| *variable)
    }

    /// Reads local `slot` in the node currently being interpreted.
    pub(super) fn load_local(
        &mut self,
        node: NodeId,
        state: &mut ParsingState,
        slot: u16,
    ) -> Result<ValueId> {
        if let Some(&value) = state.locals.get(&slot) {
            return Ok(value);
        }
        let description = VariableDescription::LocalSlot(slot);
        let lookup = self.lookup(None, Vec::new(), &state.provider, state.loop_header, description)?;
        let value = self.resolve(lookup, description)?;
        state.locals.insert(slot, value);
        if let Some(region) = self.program.cfg.node_mut(node) {
            region.imports.insert(description, value);
        }
        self.mutations += 1;
        Ok(value)
    }

    /// The value `node` holds for `description` when it is left.
    ///
    /// Locals the node never touched are looked up through its provider chain and
    /// recorded as imports and exports of every node on the way.
    pub(super) fn request_value(
        &mut self,
        node: NodeId,
        description: VariableDescription,
    ) -> Result<ValueId> {
        match self.walk(node, description)? {
            Walk::Found(value, passed) => {
                for node in passed {
                    self.record(node, description, value);
                }
                Ok(value)
            }
            Walk::Pending(lookup) => self.resolve(lookup, description),
        }
    }

    /// Follows single-predecessor carries from `node` until a node knows the value or
    /// has to merge.
    fn walk(&self, node: NodeId, description: VariableDescription) -> Result<Walk> {
        let mut passed = Vec::new();
        let mut current = node;
        loop {
            let state = self.state(current)?;
            if let Some(value) = state.lookup(description) {
                return Ok(Walk::Found(value, passed));
            }
            if let VariableDescription::StackSlot(depth) = description {
                let start = self.program.cfg.node(current).map(|n| n.start);
                return Err(consistency_error!(
                    self.here(),
                    "Stack slot {} is not available at the end of block {:?}",
                    depth,
                    start
                ));
            }
            match (&state.provider, state.loop_header) {
                (Provider::Carry(predecessor), false) => {
                    passed.push(current);
                    current = *predecessor;
                }
                (provider, loop_header) => {
                    let lookup = self.lookup(
                        Some(current),
                        passed,
                        provider,
                        loop_header,
                        description,
                    )?;
                    return Ok(Walk::Pending(lookup));
                }
            }
        }
    }

    /// A lookup that still has to ask the predecessors behind `provider`.
    fn lookup(
        &self,
        owner: Option<NodeId>,
        passed: Vec<NodeId>,
        provider: &Provider,
        loop_header: bool,
        description: VariableDescription,
    ) -> Result<Lookup> {
        let mut lookup = Lookup {
            owner,
            passed,
            loop_header,
            predecessors: Vec::new(),
            next: 0,
            sources: Vec::new(),
        };
        match provider {
            Provider::Arguments => {
                let VariableDescription::LocalSlot(slot) = description else {
                    return Err(consistency_error!(
                        self.here(),
                        "Operand stack is empty on method entry"
                    ));
                };
                let Some(argument) = self.argument(slot) else {
                    return Err(consistency_error!(
                        self.here(),
                        "Local {} is read before it is written",
                        slot
                    ));
                };
                lookup.sources.push(argument);
            }
            Provider::Carry(predecessor) => lookup.predecessors.push(*predecessor),
            Provider::Merge(predecessors) => lookup.predecessors.clone_from(predecessors),
        }
        Ok(lookup)
    }

    /// Completes `root` and every lookup it spawns with an explicit stack.
    ///
    /// A finished lookup merges its sources, records the result in its owner and the
    /// nodes it passed, and hands the result to the lookup that spawned it.
    fn resolve(&mut self, root: Lookup, description: VariableDescription) -> Result<ValueId> {
        let mut pending = vec![root];
        loop {
            let Some(top) = pending.last_mut() else {
                return Err(consistency_error!(self.here(), "Lookup of {} lost", description));
            };
            if let Some(&predecessor) = top.predecessors.get(top.next) {
                top.next += 1;
                match self.walk(predecessor, description)? {
                    Walk::Found(value, passed) => {
                        for node in passed {
                            self.record(node, description, value);
                        }
                        if let Some(top) = pending.last_mut() {
                            top.add_source(value);
                        }
                    }
                    Walk::Pending(lookup) => pending.push(lookup),
                }
                continue;
            }

            let Some(done) = pending.pop() else {
                continue;
            };
            let value = self.merge(done.sources, done.loop_header);
            if let Some(owner) = done.owner {
                self.record(owner, description, value);
            }
            for node in done.passed {
                self.record(node, description, value);
            }
            match pending.last_mut() {
                Some(parent) => parent.add_source(value),
                None => return Ok(value),
            }
        }
    }

    fn record(&mut self, node: NodeId, description: VariableDescription, value: ValueId) {
        if let (VariableDescription::LocalSlot(slot), Some(Some(state))) =
            (description, self.states.get_mut(node.index()))
        {
            state.locals.insert(slot, value);
        }
        if let Some(region) = self.program.cfg.node_mut(node) {
            region.imports.insert(description, value);
            region.exports.insert(description, value);
        }
        self.mutations += 1;
    }

    fn reachable_nodes(&self) -> Vec<NodeId> {
        let cfg = &self.program.cfg;
        cfg.nodes()
            .map(|(id, _)| id)
            .filter(|&id| cfg.is_reachable(id))
            .collect()
    }

    /// Appends a `Goto` to every node whose statements can run off the end.
    fn synthesize_fallthroughs(&mut self) -> Result<()> {
        for node in self.reachable_nodes() {
            let cfg = &self.program.cfg;
            let Some(region) = cfg.node(node) else {
                continue;
            };
            if region.expressions.ends_with_never_returning() {
                continue;
            }

            let mut candidates: Vec<Address> = Vec::new();
            for (successor, _) in cfg.successors_with_kind(node) {
                if let Some(target) = cfg.node(successor) {
                    if target.kind == BlockKind::Normal && !candidates.contains(&target.start) {
                        candidates.push(target.start);
                    }
                }
            }
            if candidates.len() > 1 {
                let conditional = region.expressions.conditional_targets();
                candidates.retain(|start| !conditional.contains(start));
            }

            let [target] = candidates.as_slice() else {
                return Err(consistency_error!(
                    self.context.at(region.start),
                    "Block {} has {} fall-through candidates",
                    region.start,
                    candidates.len()
                ));
            };
            let target = *target;
            self.emit(node, Expression::Goto(target));
        }
        Ok(())
    }

    /// Adds back-edge flows to loop-header PHIs and makes sure every jump source can
    /// provide what its target imports, until nothing changes.
    fn complete_phis(&mut self) -> Result<()> {
        let back_edges = self.program.cfg.back_edges().to_vec();
        let reachable = self.reachable_nodes();
        let mut rounds = 0usize;
        loop {
            let before = self.mutations;
            rounds += 1;

            for &(source, header) in &back_edges {
                let imports: Vec<(VariableDescription, ValueId)> = self
                    .program
                    .cfg
                    .node(header)
                    .map(|region| region.imports.iter().map(|(d, v)| (*d, *v)).collect())
                    .unwrap_or_default();
                for (description, phi) in imports {
                    if !self.program.values.is_phi(phi) {
                        continue;
                    }
                    let flow = self.request_value(source, description)?;
                    if flow == phi {
                        continue;
                    }
                    if let Some(variable) = self.program.values.variable_mut(phi) {
                        if !variable.incoming.contains(&flow) {
                            variable.incoming.push(flow);
                            self.mutations += 1;
                        }
                    }
                }
            }

            for &node in &reachable {
                let targets = self
                    .program
                    .cfg
                    .node(node)
                    .map(|region| region.expressions.jump_targets())
                    .unwrap_or_default();
                for target in targets {
                    let descriptions: Vec<VariableDescription> = self
                        .program
                        .cfg
                        .node_at(target)
                        .and_then(|id| self.program.cfg.node(id))
                        .map(|region| region.imports.keys().copied().collect())
                        .unwrap_or_default();
                    for description in descriptions {
                        self.request_value(node, description)?;
                    }
                }
            }

            if self.mutations == before {
                break;
            }
        }
        log::trace!("{}: PHI completion settled after {} rounds", self.context, rounds);
        Ok(())
    }

    /// Replaces every PHI that merges one value besides itself by that value.
    ///
    /// Loop headers get a PHI for each local they import, so a local the loop never
    /// writes ends up with a PHI fed only by its initial value and by itself.
    fn remove_trivial_phis(&mut self) {
        let mut removed = 0usize;
        loop {
            let candidates: Vec<ValueId> =
                self.program.phi_variables().map(|(phi, _)| phi).collect();
            let before = removed;
            for phi in candidates {
                let Some(value) = self.trivial_phi_value(phi) else {
                    continue;
                };
                self.program.replace_variable(phi, value);
                for state in self.states.iter_mut().flatten() {
                    for slot in state.locals.values_mut().chain(state.stack.iter_mut()) {
                        if *slot == phi {
                            *slot = value;
                        }
                    }
                }
                removed += 1;
            }
            if removed == before {
                break;
            }
        }
        if removed > 0 {
            log::trace!("{}: removed {} trivial PHIs", self.context, removed);
        }
    }

    /// The single value a PHI merges besides itself.
    fn trivial_phi_value(&self, phi: ValueId) -> Option<ValueId> {
        let variable = self.program.values.variable(phi)?;
        if !variable.is_phi() || variable.deleted {
            return None;
        }
        let mut others = variable.incoming.iter().copied().filter(|&flow| flow != phi);
        let first = others.next()?;
        others.all(|flow| flow == first).then_some(first)
    }

    fn insert_phi_copies(&mut self) -> Result<()> {
        for node in self.reachable_nodes() {
            let Some(region) = self.program.cfg.node_mut(node) else {
                continue;
            };
            let mut list = std::mem::take(&mut region.expressions);
            let result = self.insert_copies_in(node, &mut list);
            if let Some(region) = self.program.cfg.node_mut(node) {
                region.expressions = list;
            }
            result?;
        }
        Ok(())
    }

    fn insert_copies_in(&mut self, node: NodeId, list: &mut ExpressionList) -> Result<()> {
        let mut index = 0;
        while index < list.len() {
            if let Some(expression) = list.get_mut(index) {
                for nested in expression.nested_lists_mut() {
                    self.insert_copies_in(node, nested)?;
                }
            }
            if let Some(Expression::Goto(target)) = list.get(index) {
                let copies = self.phi_copies(node, *target)?;
                let count = copies.len();
                for (offset, copy) in copies.into_iter().enumerate() {
                    list.insert_before(index + offset, copy);
                }
                index += count;
            }
            index += 1;
        }
        Ok(())
    }

    /// Assignments that must run before `node` jumps to `target`.
    ///
    /// The copies form a parallel assignment: a source that is itself assigned by the
    /// same jump is saved in a temporary first.
    fn phi_copies(&mut self, node: NodeId, target: Address) -> Result<Vec<Expression>> {
        let imports: Vec<(VariableDescription, ValueId)> = self
            .program
            .cfg
            .node_at(target)
            .and_then(|id| self.program.cfg.node(id))
            .map(|region| region.imports.iter().map(|(d, v)| (*d, *v)).collect())
            .ok_or_else(|| {
                consistency_error!(self.here(), "No block starts at jump target {}", target)
            })?;

        let mut pairs: Vec<(ValueId, ValueId)> = Vec::new();
        for (description, receiving) in imports {
            let exported = self.request_value(node, description)?;
            if exported == receiving {
                continue;
            }
            if !self.program.values.is_phi(receiving) {
                let start = self.program.cfg.node(node).map_or(target, |n| n.start);
                return Err(consistency_error!(
                    self.context.at(start),
                    "Block {} cannot provide {} for jump target {}",
                    start,
                    description,
                    target
                ));
            }
            pairs.push((receiving, exported));
        }

        let receivers: Vec<ValueId> = pairs.iter().map(|(phi, _)| *phi).collect();
        let mut statements = Vec::new();
        for (_, source) in &mut pairs {
            if receivers.contains(source) {
                let ty = self.program.values.type_of(*source);
                let temporary = self.new_variable(ty, *source);
                statements.push(Expression::VariableAssignment {
                    variable: temporary,
                    value: *source,
                });
                *source = temporary;
            }
        }
        statements.extend(
            pairs
                .into_iter()
                .map(|(variable, value)| Expression::VariableAssignment { variable, value }),
        );
        Ok(statements)
    }
}
