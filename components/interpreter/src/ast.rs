//! Guest AST node catalog
//!
//! A call target's body is a tree of [`Node`]s. Every node carries an
//! [`AstNodeId`] assigned by pre-order numbering when the enclosing
//! [`RootNode`] is built; ids index profile slots and identify resume points
//! in frame states. A `Call` node's id doubles as its call-site identity.

use core_types::{TypeInfo, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an AST node within its root (pre-order index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AstNodeId(pub u32);

impl AstNodeId {
    /// Index into per-node tables
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AstNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Identity of a call site (the id of the `Call` node)
pub type CallSiteId = AstNodeId;

/// Identity of a registered call target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallTargetId(pub u32);

impl CallTargetId {
    /// Index into the runtime's target table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CallTargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Wrapping integer addition
    Add,
    /// Wrapping integer subtraction
    Sub,
    /// Wrapping integer multiplication
    Mul,
    /// Integer comparison
    LessThan,
    /// Equality on any two values
    Equal,
}

impl BinaryOp {
    /// Type both operands must have, if the operator is typed
    pub fn operand_type(&self) -> Option<TypeInfo> {
        match self {
            BinaryOp::Equal => None,
            _ => Some(TypeInfo::Int),
        }
    }

    /// Type of the result
    pub fn result_type(&self) -> TypeInfo {
        match self {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => TypeInfo::Int,
            BinaryOp::LessThan | BinaryOp::Equal => TypeInfo::Bool,
        }
    }

    /// Whether operands may be swapped
    pub fn is_commutative(&self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Mul | BinaryOp::Equal)
    }

    /// Short mnemonic used in graph dumps
    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Sub",
            BinaryOp::Mul => "Mul",
            BinaryOp::LessThan => "LessThan",
            BinaryOp::Equal => "Equal",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Boolean negation
    Not,
    /// Wrapping integer negation
    Negate,
}

impl UnaryOp {
    /// Type the operand must have
    pub fn operand_type(&self) -> TypeInfo {
        match self {
            UnaryOp::Not => TypeInfo::Bool,
            UnaryOp::Negate => TypeInfo::Int,
        }
    }

    /// Type of the result
    pub fn result_type(&self) -> TypeInfo {
        self.operand_type()
    }

    /// Short mnemonic used in graph dumps
    pub fn mnemonic(&self) -> &'static str {
        match self {
            UnaryOp::Not => "Not",
            UnaryOp::Negate => "Negate",
        }
    }
}

/// Kinds of guest AST nodes
///
/// Operands (the children evaluated and pushed before the node acts) are
/// listed first. `Block` children and the bodies of `If`/`While` are not
/// operands.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum NodeKind {
    /// Literal value
    Constant(Value),
    /// Read the n-th argument; missing arguments read as null
    ReadArgument(usize),
    /// Read a local slot
    ReadLocal(usize),
    /// Write a local slot; evaluates to the written value
    WriteLocal(usize, Box<Node>),
    /// Binary operation
    Binary(BinaryOp, Box<Node>, Box<Node>),
    /// Unary operation
    Unary(UnaryOp, Box<Node>),
    /// Sequence; evaluates to the value of its last child (null if empty)
    Block(Vec<Node>),
    /// Conditional; evaluates to the taken branch (null if no else)
    If(Box<Node>, Box<Node>, Option<Box<Node>>),
    /// Loop; evaluates to null
    While(Box<Node>, Box<Node>),
    /// Return from the root
    Return(Box<Node>),
    /// Call another call target
    Call(CallTargetId, Vec<Node>),
}

/// A guest AST node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: AstNodeId,
    kind: NodeKind,
}

impl Node {
    /// Create a node; its id is assigned when the enclosing root is built
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: AstNodeId(0),
            kind,
        }
    }

    /// Literal
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::new(NodeKind::Constant(value.into()))
    }

    /// Null literal
    pub fn null() -> Self {
        Self::new(NodeKind::Constant(Value::Null))
    }

    /// Argument read
    pub fn arg(index: usize) -> Self {
        Self::new(NodeKind::ReadArgument(index))
    }

    /// Local read
    pub fn local(slot: usize) -> Self {
        Self::new(NodeKind::ReadLocal(slot))
    }

    /// Local write
    pub fn assign(slot: usize, value: Node) -> Self {
        Self::new(NodeKind::WriteLocal(slot, Box::new(value)))
    }

    /// Binary operation
    pub fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Self {
        Self::new(NodeKind::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    /// `lhs + rhs`
    pub fn add(lhs: Node, rhs: Node) -> Self {
        Self::binary(BinaryOp::Add, lhs, rhs)
    }

    /// `lhs - rhs`
    pub fn sub(lhs: Node, rhs: Node) -> Self {
        Self::binary(BinaryOp::Sub, lhs, rhs)
    }

    /// `lhs * rhs`
    pub fn mul(lhs: Node, rhs: Node) -> Self {
        Self::binary(BinaryOp::Mul, lhs, rhs)
    }

    /// `lhs < rhs`
    pub fn less_than(lhs: Node, rhs: Node) -> Self {
        Self::binary(BinaryOp::LessThan, lhs, rhs)
    }

    /// `lhs == rhs`
    pub fn equal(lhs: Node, rhs: Node) -> Self {
        Self::binary(BinaryOp::Equal, lhs, rhs)
    }

    /// `!operand`
    pub fn not(operand: Node) -> Self {
        Self::new(NodeKind::Unary(UnaryOp::Not, Box::new(operand)))
    }

    /// `-operand`
    pub fn negate(operand: Node) -> Self {
        Self::new(NodeKind::Unary(UnaryOp::Negate, Box::new(operand)))
    }

    /// Sequence
    pub fn block(children: Vec<Node>) -> Self {
        Self::new(NodeKind::Block(children))
    }

    /// Conditional
    pub fn if_then(condition: Node, then_branch: Node, else_branch: Option<Node>) -> Self {
        Self::new(NodeKind::If(
            Box::new(condition),
            Box::new(then_branch),
            else_branch.map(Box::new),
        ))
    }

    /// Loop
    pub fn while_loop(condition: Node, body: Node) -> Self {
        Self::new(NodeKind::While(Box::new(condition), Box::new(body)))
    }

    /// Return
    pub fn ret(value: Node) -> Self {
        Self::new(NodeKind::Return(Box::new(value)))
    }

    /// Call
    pub fn call(target: CallTargetId, arguments: Vec<Node>) -> Self {
        Self::new(NodeKind::Call(target, arguments))
    }

    /// This node's id
    pub fn id(&self) -> AstNodeId {
        self.id
    }

    /// This node's kind
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// All children in evaluation order
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Constant(_) | NodeKind::ReadArgument(_) | NodeKind::ReadLocal(_) => {
                Vec::new()
            }
            NodeKind::WriteLocal(_, value) => vec![value.as_ref()],
            NodeKind::Binary(_, lhs, rhs) => vec![lhs.as_ref(), rhs.as_ref()],
            NodeKind::Unary(_, operand) => vec![operand.as_ref()],
            NodeKind::Block(children) => children.iter().collect(),
            NodeKind::If(condition, then_branch, else_branch) => {
                let mut children = vec![condition.as_ref(), then_branch.as_ref()];
                if let Some(else_branch) = else_branch {
                    children.push(else_branch.as_ref());
                }
                children
            }
            NodeKind::While(condition, body) => vec![condition.as_ref(), body.as_ref()],
            NodeKind::Return(value) => vec![value.as_ref()],
            NodeKind::Call(_, arguments) => arguments.iter().collect(),
        }
    }

    /// Children whose values are pushed on the operand stack before this
    /// node acts
    pub fn operands(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Block(_) => Vec::new(),
            NodeKind::If(condition, _, _) | NodeKind::While(condition, _) => vec![condition],
            _ => self.children(),
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        match &mut self.kind {
            NodeKind::Constant(_) | NodeKind::ReadArgument(_) | NodeKind::ReadLocal(_) => {
                Vec::new()
            }
            NodeKind::WriteLocal(_, value) => vec![value.as_mut()],
            NodeKind::Binary(_, lhs, rhs) => vec![lhs.as_mut(), rhs.as_mut()],
            NodeKind::Unary(_, operand) => vec![operand.as_mut()],
            NodeKind::Block(children) => children.iter_mut().collect(),
            NodeKind::If(condition, then_branch, else_branch) => {
                let mut children = vec![condition.as_mut(), then_branch.as_mut()];
                if let Some(else_branch) = else_branch {
                    children.push(else_branch.as_mut());
                }
                children
            }
            NodeKind::While(condition, body) => vec![condition.as_mut(), body.as_mut()],
            NodeKind::Return(value) => vec![value.as_mut()],
            NodeKind::Call(_, arguments) => arguments.iter_mut().collect(),
        }
    }

    fn number(&mut self, next: &mut u32) {
        self.id = AstNodeId(*next);
        *next += 1;
        for child in self.children_mut() {
            child.number(next);
        }
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    fn find_path<'a>(&'a self, id: AstNodeId, path: &mut Vec<&'a Node>) -> bool {
        path.push(self);
        if self.id == id {
            return true;
        }
        for child in self.children() {
            if child.find_path(id, path) {
                return true;
            }
        }
        path.pop();
        false
    }
}

/// A call target's AST: the body plus its frame shape
#[derive(Debug, Clone, PartialEq)]
pub struct RootNode {
    name: String,
    parameter_count: usize,
    local_count: usize,
    node_count: usize,
    body: Node,
}

impl RootNode {
    /// Build a root, numbering every node in pre-order
    ///
    /// # Examples
    ///
    /// ```
    /// use interpreter::ast::{Node, RootNode};
    ///
    /// let root = RootNode::new("add", 2, Node::ret(Node::add(Node::arg(0), Node::arg(1))));
    /// assert_eq!(root.node_count(), 4);
    /// assert_eq!(root.local_count(), 0);
    /// ```
    pub fn new(name: impl Into<String>, parameter_count: usize, mut body: Node) -> Self {
        let mut next = 0;
        body.number(&mut next);

        let mut local_count = 0;
        body.visit(&mut |node| match node.kind() {
            NodeKind::ReadLocal(slot) | NodeKind::WriteLocal(slot, _) => {
                local_count = local_count.max(slot + 1);
            }
            _ => {}
        });

        Self {
            name: name.into(),
            parameter_count,
            local_count,
            node_count: next as usize,
            body,
        }
    }

    /// Root name (for diagnostics)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter count
    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Number of local slots used by the body
    pub fn local_count(&self) -> usize {
        self.local_count
    }

    /// Number of AST nodes; the root's intrinsic size estimate
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Body node
    pub fn body(&self) -> &Node {
        &self.body
    }

    /// Call sites in pre-order (declaration order)
    pub fn call_sites(&self) -> Vec<(CallSiteId, CallTargetId)> {
        let mut sites = Vec::new();
        self.body.visit(&mut |node| {
            if let NodeKind::Call(target, _) = node.kind() {
                sites.push((node.id(), *target));
            }
        });
        sites
    }

    /// Look up a node by id
    pub fn node(&self, id: AstNodeId) -> Option<&Node> {
        self.path_to(id).and_then(|path| path.last().copied())
    }

    /// Chain of nodes from the body down to `id`, inclusive
    pub fn path_to(&self, id: AstNodeId) -> Option<Vec<&Node>> {
        if id.index() >= self.node_count {
            return None;
        }
        let mut path = Vec::new();
        if self.body.find_path(id, &mut path) {
            Some(path)
        } else {
            None
        }
    }
}
