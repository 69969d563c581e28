//! Lazy query expressions.
//!
//! Queries are built locally as an [`Expr`] tree and only executed when a
//! [`ComputeBackend`](crate::backend::ComputeBackend) evaluates them. For
//! transport the tree is encoded into the Earth Engine wire format,
//! [`Expression`]: a flat map of value nodes plus the key of the result node.
//! Function bodies must live in that map (they are referenced by key), every
//! other node is inlined.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Local expression tree
// ---------------------------------------------------------------------------

/// A node of an unevaluated query.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A JSON literal.
    Constant(serde_json::Value),
    /// A list of sub-expressions.
    Array(Vec<Expr>),
    /// A string-keyed map of sub-expressions.
    Dictionary(BTreeMap<String, Expr>),
    /// Call of a named server-side algorithm with named arguments.
    Invocation {
        function: String,
        arguments: BTreeMap<String, Expr>,
    },
    /// Anonymous function (used as the body of `Collection.map`).
    Function {
        parameters: Vec<String>,
        body: Box<Expr>,
    },
    /// Reference to a parameter of an enclosing [`Expr::Function`].
    Argument(String),
}

impl Expr {
    pub fn constant(value: impl Into<serde_json::Value>) -> Self {
        Self::Constant(value.into())
    }

    /// Build an invocation from `(name, expr)` argument pairs.
    pub fn invoke<I, K>(function: &str, arguments: I) -> Self
    where
        I: IntoIterator<Item = (K, Expr)>,
        K: Into<String>,
    {
        Self::Invocation {
            function: function.to_string(),
            arguments: arguments.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Maximum nesting depth of [`Expr::Function`] nodes below (and including) this node.
    pub fn function_depth(&self) -> usize {
        match self {
            Self::Constant(_) | Self::Argument(_) => 0,
            Self::Array(items) => items.iter().map(Expr::function_depth).max().unwrap_or(0),
            Self::Dictionary(map) => map.values().map(Expr::function_depth).max().unwrap_or(0),
            Self::Invocation { arguments, .. } => arguments
                .values()
                .map(Expr::function_depth)
                .max()
                .unwrap_or(0),
            Self::Function { body, .. } => 1 + body.function_depth(),
        }
    }

    /// Replace every `Argument(from)` with `Argument(to)`.
    pub fn rename_argument(self, from: &str, to: &str) -> Self {
        match self {
            Self::Argument(name) if name == from => Self::Argument(to.to_string()),
            Self::Array(items) => Self::Array(
                items
                    .into_iter()
                    .map(|e| e.rename_argument(from, to))
                    .collect(),
            ),
            Self::Dictionary(map) => Self::Dictionary(
                map.into_iter()
                    .map(|(k, e)| (k, e.rename_argument(from, to)))
                    .collect(),
            ),
            Self::Invocation {
                function,
                arguments,
            } => Self::Invocation {
                function,
                arguments: arguments
                    .into_iter()
                    .map(|(k, e)| (k, e.rename_argument(from, to)))
                    .collect(),
            },
            Self::Function { parameters, body } => Self::Function {
                parameters,
                body: Box::new(body.rename_argument(from, to)),
            },
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Encoded expression graph, as accepted by `value:compute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    /// Key of the node whose value is the result.
    pub result: String,
    pub values: BTreeMap<String, ValueNode>,
}

/// One node of the wire graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueNode {
    ConstantValue(serde_json::Value),
    ArrayValue(ArrayValue),
    DictionaryValue(DictionaryValue),
    FunctionInvocationValue(FunctionInvocation),
    FunctionDefinitionValue(FunctionDefinition),
    ArgumentReference(String),
    ValueReference(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Vec<ValueNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryValue {
    pub values: BTreeMap<String, ValueNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInvocation {
    pub function_name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, ValueNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefinition {
    pub argument_names: Vec<String>,
    /// Key of the body node in [`Expression::values`].
    pub body: String,
}

impl Expression {
    /// Encode an expression tree.
    pub fn encode(root: &Expr) -> Self {
        let mut encoder = Encoder::default();
        let node = encoder.node(root);
        let result = encoder.insert(node);
        Self {
            result,
            values: encoder.values,
        }
    }

    /// Request body for `value:compute`.
    pub fn to_request_body(&self) -> serde_json::Value {
        serde_json::json!({ "expression": self })
    }
}

#[derive(Default)]
struct Encoder {
    values: BTreeMap<String, ValueNode>,
    next: usize,
}

impl Encoder {
    fn insert(&mut self, node: ValueNode) -> String {
        let key = self.next.to_string();
        self.next += 1;
        self.values.insert(key.clone(), node);
        key
    }

    fn node(&mut self, expr: &Expr) -> ValueNode {
        match expr {
            Expr::Constant(v) => ValueNode::ConstantValue(v.clone()),
            Expr::Array(items) => ValueNode::ArrayValue(ArrayValue {
                values: items.iter().map(|e| self.node(e)).collect(),
            }),
            Expr::Dictionary(map) => ValueNode::DictionaryValue(DictionaryValue {
                values: map.iter().map(|(k, e)| (k.clone(), self.node(e))).collect(),
            }),
            Expr::Invocation {
                function,
                arguments,
            } => ValueNode::FunctionInvocationValue(FunctionInvocation {
                function_name: function.clone(),
                arguments: arguments
                    .iter()
                    .map(|(k, e)| (k.clone(), self.node(e)))
                    .collect(),
            }),
            Expr::Function { parameters, body } => {
                let body_node = self.node(body);
                let body_key = self.insert(body_node);
                ValueNode::FunctionDefinitionValue(FunctionDefinition {
                    argument_names: parameters.clone(),
                    body: body_key,
                })
            }
            Expr::Argument(name) => ValueNode::ArgumentReference(name.clone()),
        }
    }
}
