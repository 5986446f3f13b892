//! Pretty-printing for the mid-tier graph
//!
//! Dump format: one line per live node, arena order, with input classes
//! separated so effect/control threading is visible at a glance.

use std::fmt;

use super::graph::Graph;
use super::op::{Constant, Opcode};

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {{")?;
        for id in self.live_nodes() {
            let node = self.node(id);
            write!(f, "  {} = {}", id, node.op.mnemonic())?;
            if let Opcode::Constant(c) = &node.op {
                write!(f, " {}", format_constant(c))?;
            }
            if !node.values.is_empty() {
                write!(f, " (")?;
                for (i, v) in node.values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")?;
            }
            if !node.effects.is_empty() {
                write!(f, " eff:")?;
                for e in &node.effects {
                    write!(f, " {}", e)?;
                }
            }
            if !node.controls.is_empty() {
                write!(f, " ctl:")?;
                for c in &node.controls {
                    write!(f, " {}", c)?;
                }
            }
            if let Some(fs) = node.frame_state {
                write!(f, " fs: {}", fs)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "}}")
    }
}

fn format_constant(c: &Constant) -> String {
    match c {
        Constant::Undefined => "undefined".to_string(),
        Constant::Null => "null".to_string(),
        Constant::TheHole => "the_hole".to_string(),
        Constant::Bool(b) => b.to_string(),
        Constant::Number(n) => n.to_string(),
        Constant::Str(s) => format!("{:?}", s),
        Constant::Function(id) => id.to_string(),
        Constant::Shape(id) => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::ir::op::NumberBinop;

    #[test]
    fn test_graph_dump() {
        let mut graph = Graph::new();
        let a = graph.number(3.0);
        let b = graph.number(4.0);
        graph.add(Opcode::NumberBinary(NumberBinop::Add), &[a, b], &[], &[]);

        let dump = format!("{}", graph);
        assert!(dump.contains("constant 3"));
        assert!(dump.contains("number_binary"));
        assert!(dump.contains("start"));
    }
}
