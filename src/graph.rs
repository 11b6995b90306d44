// SPDX-License-Identifier: Apache-2.0

//! JSON interchange form of an expression graph.
//!
//! Nodes are listed in dependency order and refer to earlier nodes,
//! variables and functions by index:
//!
//! ```json
//! {
//!   "vars": [{"name": "p", "ty": "bool"}, {"name": "x", "ty": {"bit_vec": 8}}],
//!   "nodes": [
//!     {"kind": "var", "var": 0},
//!     {"kind": "var", "var": 1},
//!     {"kind": "literal", "value": {"bit_vec": {"width": 8, "value": "5"}}},
//!     {"kind": "app", "op": {"eq": [1, 2]}},
//!     {"kind": "app", "op": {"or": [0, 3]}, "loc": {"file": "a.c", "line": 3, "col": 1}}
//!   ],
//!   "assertions": [4]
//! }
//! ```

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::expr::{
    App, BaseType, BoundVar, ExprBuilder, ExprRef, FnSymbol, Literal, ProgramLoc, VarKind,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarSpec {
    pub name: String,
    pub ty: BaseType,
    #[serde(default)]
    pub kind: VarKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnDefinition {
    /// Indices into `vars`; each must be a `fn_param` variable.
    pub params: Vec<usize>,
    /// Index of the body node.
    pub body: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnSpec {
    pub name: String,
    pub args: Vec<BaseType>,
    pub ret: BaseType,
    #[serde(default)]
    pub definition: Option<FnDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Literal { value: Literal },
    Var { var: usize },
    App { op: App<usize> },
    Forall { var: usize, body: usize },
    Exists { var: usize, body: usize },
    Call { function: usize, args: Vec<usize> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<ProgramLoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub vars: Vec<VarSpec>,
    #[serde(default)]
    pub functions: Vec<FnSpec>,
    pub nodes: Vec<NodeSpec>,
    /// Indices of the boolean nodes to assert.
    #[serde(default)]
    pub assertions: Vec<usize>,
}

/// The in-memory graph built from a [`GraphSpec`].
#[derive(Debug)]
pub struct Graph {
    pub vars: Vec<Rc<BoundVar>>,
    pub nodes: Vec<ExprRef>,
    pub assertions: Vec<ExprRef>,
}

impl Graph {
    /// The variable with the given source name, if any.
    pub fn var(&self, name: &str) -> Option<&Rc<BoundVar>> {
        self.vars.iter().find(|v| v.name == name)
    }
}

fn malformed(detail: String) -> BridgeError {
    BridgeError::IllTyped {
        operation: "graph".to_string(),
        detail,
    }
}

struct Loader<'a> {
    spec: &'a GraphSpec,
    builder: ExprBuilder,
    vars: Vec<Rc<BoundVar>>,
    functions: Vec<Option<Rc<FnSymbol>>>,
    nodes: Vec<ExprRef>,
}

impl<'a> Loader<'a> {
    fn var(&self, index: usize) -> Result<&Rc<BoundVar>> {
        self.vars
            .get(index)
            .ok_or_else(|| malformed(format!("no variable {}", index)))
    }

    /// An already-built node; forward references are rejected.
    fn node(&self, index: usize) -> Result<ExprRef> {
        self.nodes.get(index).cloned().ok_or_else(|| {
            malformed(format!(
                "node {} refers to node {}, which is not defined before it",
                self.nodes.len(),
                index
            ))
        })
    }

    fn function(&mut self, index: usize) -> Result<Rc<FnSymbol>> {
        if let Some(Some(f)) = self.functions.get(index) {
            return Ok(Rc::clone(f));
        }
        let spec = self
            .spec
            .functions
            .get(index)
            .ok_or_else(|| malformed(format!("no function {}", index)))?;
        let func = match &spec.definition {
            None => self
                .builder
                .uninterpreted_fn(&spec.name, spec.args.clone(), spec.ret.clone()),
            Some(def) => {
                let params = def
                    .params
                    .iter()
                    .map(|&p| self.var(p).cloned())
                    .collect::<Result<Vec<_>>>()?;
                let body = self.node(def.body)?;
                let func = self.builder.defined_fn(&spec.name, params, body)?;
                if func.arg_types != spec.args || func.ret_type != spec.ret {
                    return Err(malformed(format!(
                        "definition of `{}` does not match its declared signature",
                        spec.name
                    )));
                }
                func
            }
        };
        self.functions[index] = Some(Rc::clone(&func));
        Ok(func)
    }

    fn build_node(&mut self, spec: &NodeSpec) -> Result<ExprRef> {
        self.builder.set_loc(spec.loc.clone());
        match &spec.kind {
            NodeKind::Literal { value } => Ok(self.builder.literal(value.clone())),
            NodeKind::Var { var } => Ok(self.builder.var_ref(self.var(*var)?)),
            NodeKind::App { op } => {
                let app = op.try_map(|&i| self.node(i))?;
                self.builder.app(app)
            }
            NodeKind::Forall { var, body } => {
                let body = self.node(*body)?;
                self.builder.forall(self.var(*var)?, body)
            }
            NodeKind::Exists { var, body } => {
                let body = self.node(*body)?;
                self.builder.exists(self.var(*var)?, body)
            }
            NodeKind::Call { function, args } => {
                let func = self.function(*function)?;
                let args = args
                    .iter()
                    .map(|&i| self.node(i))
                    .collect::<Result<Vec<_>>>()?;
                self.builder.apply(&func, args)
            }
        }
    }
}

impl GraphSpec {
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Builds the expression graph, type-checking every node.
    pub fn build(&self) -> Result<Graph> {
        for v in &self.vars {
            v.ty.check_well_formed()
                .map_err(|e| malformed(format!("variable `{}`: {}", v.name, e)))?;
        }
        for f in &self.functions {
            for ty in f.args.iter().chain(std::iter::once(&f.ret)) {
                ty.check_well_formed()
                    .map_err(|e| malformed(format!("function `{}`: {}", f.name, e)))?;
            }
        }
        let builder = ExprBuilder::new();
        let vars = self
            .vars
            .iter()
            .map(|v| builder.new_var(&v.name, v.ty.clone(), v.kind))
            .collect();
        let mut loader = Loader {
            spec: self,
            builder,
            vars,
            functions: vec![None; self.functions.len()],
            nodes: Vec::with_capacity(self.nodes.len()),
        };
        for node in &self.nodes {
            let expr = loader.build_node(node)?;
            loader.nodes.push(expr);
        }
        let assertions = self
            .assertions
            .iter()
            .map(|&i| {
                let expr = loader
                    .nodes
                    .get(i)
                    .cloned()
                    .ok_or_else(|| malformed(format!("assertion of undefined node {}", i)))?;
                if expr.ty != BaseType::Bool {
                    return Err(malformed(format!(
                        "assertion of node {} of type {}",
                        i, expr.ty
                    )));
                }
                Ok(expr)
            })
            .collect::<Result<Vec<_>>>()?;
        log::debug!(
            "built graph with {} nodes and {} assertions",
            loader.nodes.len(),
            assertions.len()
        );
        Ok(Graph {
            vars: loader.vars,
            nodes: loader.nodes,
            assertions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprKind;

    const SAMPLE: &str = r#"{
        "vars": [{"name": "p", "ty": "bool"}, {"name": "x", "ty": {"bit_vec": 8}}],
        "nodes": [
            {"kind": "var", "var": 0},
            {"kind": "var", "var": 1},
            {"kind": "literal", "value": {"bit_vec": {"width": 8, "value": "5"}}},
            {"kind": "app", "op": {"eq": [1, 2]}},
            {"kind": "app", "op": {"or": [0, 3]}, "loc": {"file": "a.c", "line": 3, "col": 1}}
        ],
        "assertions": [4]
    }"#;

    #[test]
    fn test_build_sample_graph() {
        let spec = GraphSpec::from_json_str(SAMPLE).unwrap();
        let graph = spec.build().unwrap();
        assert_eq!(graph.nodes.len(), 5);
        let root = &graph.assertions[0];
        assert_eq!(root.ty, BaseType::Bool);
        assert_eq!(root.loc, Some(ProgramLoc::new("a.c", 3, 1)));
        assert!(matches!(root.kind, ExprKind::App(App::Or(_))));
        assert_eq!(graph.var("x").map(|v| v.ty.clone()), Some(BaseType::BitVec(8)));
    }

    #[test]
    fn test_forward_reference_is_rejected() {
        let text = r#"{"nodes": [{"kind": "app", "op": {"not": 1}}, {"kind": "literal", "value": {"bool": true}}]}"#;
        let err = GraphSpec::from_json_str(text).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("node 0 refers to node 1"));
    }

    #[test]
    fn test_zero_width_bit_vector_is_rejected() {
        let text = r#"{"vars": [{"name": "x", "ty": {"bit_vec": 0}}], "nodes": [{"kind": "var", "var": 0}]}"#;
        let err = GraphSpec::from_json_str(text).unwrap().build().unwrap_err();
        assert_eq!(
            err.to_string(),
            "ill-typed graph: variable `x`: ill-typed type: zero-width bit-vector"
        );

        let text = r#"{
            "functions": [{"name": "f", "args": [{"struct": [{"bit_vec": 0}]}], "ret": "bool"}],
            "nodes": []
        }"#;
        let err = GraphSpec::from_json_str(text).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("function `f`"));
    }

    #[test]
    fn test_defined_function_signature_is_checked() {
        let text = r#"{
            "vars": [{"name": "a", "ty": "integer", "kind": "fn_param"}],
            "functions": [{"name": "f", "args": ["integer"], "ret": "bool",
                           "definition": {"params": [0], "body": 0}}],
            "nodes": [{"kind": "var", "var": 0}, {"kind": "call", "function": 0, "args": [0]}]
        }"#;
        let err = GraphSpec::from_json_str(text).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("does not match its declared signature"));
    }
}
