//! Arena-indexed IR graph
//!
//! Nodes live in an arena addressed by index; each slot carries a generation
//! counter so that a reference to a replaced or deleted node is detectable in
//! O(1). Replacing a node is index patching, not pointer surgery.
//!
//! Every memory-visible operation occupies exactly one position on the effect
//! chain; reducers must thread every inserted load, store, guard, and call
//! through `effects` in execution order.

use rustc_hash::FxHashMap;

use super::op::{Constant, Opcode};

/// Handle to a node: arena index plus the generation it was created under.
///
/// A handle goes stale when its slot is killed or replaced; `Graph::is_live`
/// distinguishes the two in O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.index)
    }
}

/// A node: operator plus ordered value inputs, effect inputs, control inputs.
///
/// Most nodes have zero or one effect/control input; EffectPhi, Merge and
/// Loop carry one per predecessor. `frame_state` points at the FrameState
/// node describing how to resume in the unoptimized tier from this position.
#[derive(Debug, Clone)]
pub struct Node {
    pub op: Opcode,
    pub values: Vec<NodeId>,
    pub effects: Vec<NodeId>,
    pub controls: Vec<NodeId>,
    pub frame_state: Option<NodeId>,
}

impl Node {
    pub fn effect_input(&self) -> Option<NodeId> {
        self.effects.first().copied()
    }

    pub fn control_input(&self) -> Option<NodeId> {
        self.controls.first().copied()
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// The IR graph for one compilation unit.
///
/// Owned exclusively by one reduction engine instance; no concurrent unit
/// mutates another's graph.
pub struct Graph {
    slots: Vec<Slot>,
    constants: FxHashMap<Constant, NodeId>,
    start: NodeId,
    end: NodeId,
}

impl Graph {
    pub fn new() -> Self {
        let mut graph = Graph {
            slots: Vec::new(),
            constants: FxHashMap::default(),
            start: NodeId { index: 0, generation: 0 },
            end: NodeId { index: 0, generation: 0 },
        };
        graph.start = graph.add(Opcode::Start, &[], &[], &[]);
        graph.end = graph.add(Opcode::End, &[], &[], &[]);
        graph
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn end(&self) -> NodeId {
        self.end
    }

    /// Create a node with the given inputs and return its handle
    pub fn add(
        &mut self,
        op: Opcode,
        values: &[NodeId],
        effects: &[NodeId],
        controls: &[NodeId],
    ) -> NodeId {
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(Node {
                op,
                values: values.to_vec(),
                effects: effects.to_vec(),
                controls: controls.to_vec(),
                frame_state: None,
            }),
        });
        NodeId { index, generation: 0 }
    }

    /// Create a node that additionally references a frame state
    pub fn add_with_frame_state(
        &mut self,
        op: Opcode,
        values: &[NodeId],
        effects: &[NodeId],
        controls: &[NodeId],
        frame_state: NodeId,
    ) -> NodeId {
        let id = self.add(op, values, effects, controls);
        self.node_mut(id).frame_state = Some(frame_state);
        id
    }

    /// Whether the handle still refers to a live node
    pub fn is_live(&self, id: NodeId) -> bool {
        match self.slots.get(id.index()) {
            Some(slot) => slot.generation == id.generation && slot.node.is_some(),
            None => false,
        }
    }

    /// Borrow a live node. Panics on a stale handle; dispatch validates
    /// handles before descending into reducers.
    pub fn node(&self, id: NodeId) -> &Node {
        self.try_node(id).expect("stale node id")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        let slot = &mut self.slots[id.index()];
        assert_eq!(slot.generation, id.generation, "stale node id");
        slot.node.as_mut().expect("dead node")
    }

    /// Borrow a node, returning None if the handle is stale or the node dead
    pub fn try_node(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn op(&self, id: NodeId) -> &Opcode {
        &self.node(id).op
    }

    /// Delete a node and bump the slot generation so existing handles go stale
    pub fn kill(&mut self, id: NodeId) {
        let slot = &mut self.slots[id.index()];
        if slot.generation == id.generation {
            slot.node = None;
            slot.generation += 1;
        }
    }

    /// Swap the operator of a node in place, keeping its inputs
    pub fn change_op(&mut self, id: NodeId, op: Opcode) {
        self.node_mut(id).op = op;
    }

    // ===== Constants =====

    /// Interned constant node; repeated requests return the same node
    pub fn constant(&mut self, c: Constant) -> NodeId {
        if let Some(&id) = self.constants.get(&c) {
            if self.is_live(id) {
                return id;
            }
        }
        let id = self.add(Opcode::Constant(c.clone()), &[], &[], &[]);
        self.constants.insert(c, id);
        id
    }

    pub fn undefined(&mut self) -> NodeId {
        self.constant(Constant::Undefined)
    }

    pub fn null(&mut self) -> NodeId {
        self.constant(Constant::Null)
    }

    pub fn the_hole(&mut self) -> NodeId {
        self.constant(Constant::TheHole)
    }

    pub fn number(&mut self, value: f64) -> NodeId {
        self.constant(Constant::Number(value))
    }

    pub fn zero(&mut self) -> NodeId {
        self.number(0.0)
    }

    pub fn one(&mut self) -> NodeId {
        self.number(1.0)
    }

    pub fn nan(&mut self) -> NodeId {
        self.number(f64::NAN)
    }

    pub fn bool_constant(&mut self, value: bool) -> NodeId {
        self.constant(Constant::Bool(value))
    }

    pub fn empty_string(&mut self) -> NodeId {
        self.constant(Constant::Str(String::new()))
    }

    /// Numeric value of a constant node, if it is one
    pub fn number_value(&self, id: NodeId) -> Option<f64> {
        match &self.try_node(id)?.op {
            Opcode::Constant(Constant::Number(n)) => Some(*n),
            _ => None,
        }
    }

    // ===== Input surgery =====

    pub fn replace_value_input(&mut self, id: NodeId, index: usize, new_input: NodeId) {
        self.node_mut(id).values[index] = new_input;
    }

    pub fn insert_value_input(&mut self, id: NodeId, index: usize, new_input: NodeId) {
        self.node_mut(id).values.insert(index, new_input);
    }

    pub fn remove_value_input(&mut self, id: NodeId, index: usize) {
        self.node_mut(id).values.remove(index);
    }

    pub fn replace_effect_input(&mut self, id: NodeId, new_effect: NodeId) {
        let node = self.node_mut(id);
        if node.effects.is_empty() {
            node.effects.push(new_effect);
        } else {
            node.effects[0] = new_effect;
        }
    }

    // ===== Use queries =====

    /// Ids of all live nodes (ascending arena order)
    pub fn live_nodes(&self) -> Vec<NodeId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.node.is_some())
            .map(|(index, slot)| NodeId {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// All live nodes that reference `target` through any input class.
    ///
    /// Computed by an arena scan; the pass runs once per compilation unit and
    /// the scans it needs are few (spread elision, value replacement).
    pub fn uses(&self, target: NodeId) -> Vec<NodeId> {
        self.live_nodes()
            .into_iter()
            .filter(|&id| {
                let node = self.node(id);
                node.values.contains(&target)
                    || node.effects.contains(&target)
                    || node.controls.contains(&target)
                    || node.frame_state == Some(target)
            })
            .collect()
    }

    /// Users of `target` via value edges only, frame states excluded
    pub fn value_uses(&self, target: NodeId) -> Vec<NodeId> {
        self.live_nodes()
            .into_iter()
            .filter(|&id| {
                let node = self.node(id);
                !matches!(node.op, Opcode::FrameState(_)) && node.values.contains(&target)
            })
            .collect()
    }

    /// The IfException projection hanging off `id`, if the call site has an
    /// exception handler
    pub fn exception_projection(&self, id: NodeId) -> Option<NodeId> {
        self.live_nodes().into_iter().find(|&user| {
            let node = self.node(user);
            matches!(node.op, Opcode::IfException) && node.control_input() == Some(id)
        })
    }

    fn success_projection(&self, id: NodeId) -> Option<NodeId> {
        self.live_nodes().into_iter().find(|&user| {
            let node = self.node(user);
            matches!(node.op, Opcode::IfSuccess) && node.control_input() == Some(id)
        })
    }

    // ===== Replacement =====

    /// Replace all uses of `old` and kill it.
    ///
    /// Value uses are redirected to `value`; effect and control uses default
    /// to `old`'s own effect/control input when not overridden. An IfSuccess
    /// projection collapses into the replacement control; the replacement is
    /// known not to throw, so any IfException projection becomes dead.
    pub fn replace_with_value(
        &mut self,
        old: NodeId,
        value: NodeId,
        effect: Option<NodeId>,
        control: Option<NodeId>,
    ) {
        let old_node = self.node(old);
        let effect = effect.or_else(|| old_node.effect_input());
        let control = control.or_else(|| old_node.control_input());

        if let Some(on_success) = self.success_projection(old) {
            if let Some(control) = control {
                self.redirect_control_uses(on_success, control);
            }
            self.kill(on_success);
        }
        if let Some(on_exception) = self.exception_projection(old) {
            let dead = self.add(Opcode::Dead, &[], &[], &[]);
            self.replace_with_value(on_exception, dead, Some(dead), Some(dead));
        }

        for user in self.uses(old) {
            if user == old {
                continue;
            }
            let node = self.node_mut(user);
            for input in node.values.iter_mut() {
                if *input == old {
                    *input = value;
                }
            }
            if let Some(effect) = effect {
                for input in node.effects.iter_mut() {
                    if *input == old {
                        *input = effect;
                    }
                }
            }
            if let Some(control) = control {
                for input in node.controls.iter_mut() {
                    if *input == old {
                        *input = control;
                    }
                }
            }
            if node.frame_state == Some(old) {
                node.frame_state = Some(value);
            }
        }
        self.kill(old);
    }

    fn redirect_control_uses(&mut self, old: NodeId, new_control: NodeId) {
        for user in self.uses(old) {
            let node = self.node_mut(user);
            for input in node.controls.iter_mut() {
                if *input == old {
                    *input = new_control;
                }
            }
        }
    }

    /// Append a control input to End (throws, deopts, terminates)
    pub fn merge_control_to_end(&mut self, control: NodeId) {
        let end = self.end;
        self.node_mut(end).controls.push(control);
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
