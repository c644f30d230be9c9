//! Tree visualization for graph regions.
//!
//! Renders the argument tree below a node as ASCII. Since a graph is a DAG,
//! a node can be reached along several paths; repeats are printed as
//! back-references: `%id -> (see above)`.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::rc::Rc;

use ptree::{Style, TreeItem};

use crate::{Graph, NodeId};

#[derive(Clone)]
struct NodeTree<'g> {
    graph: &'g Graph,
    id: NodeId,
    visited: Rc<RefCell<HashSet<NodeId>>>,
    is_backref: RefCell<bool>,
}

impl TreeItem for NodeTree<'_> {
    type Child = Self;

    fn write_self<W: io::Write>(&self, f: &mut W, _style: &Style) -> io::Result<()> {
        if !self.visited.borrow_mut().insert(self.id) {
            *self.is_backref.borrow_mut() = true;
            return write!(f, "{} -> (see above)", self.id);
        }
        let node = &self.graph[self.id];
        write!(f, "[{}] {} : {} {:?}", self.id, node.op(), node.dtype(), node.shape().as_slice())
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        if *self.is_backref.borrow() {
            return Cow::Borrowed(&[]);
        }
        let children = self.graph[self.id]
            .args()
            .iter()
            .map(|&id| NodeTree { graph: self.graph, id, visited: self.visited.clone(), is_backref: RefCell::new(false) })
            .collect::<Vec<_>>();
        Cow::Owned(children)
    }
}

impl Graph {
    /// Render the argument tree below `root`.
    pub fn tree(&self, root: NodeId) -> String {
        let tree = NodeTree { graph: self, id: root, visited: Rc::default(), is_backref: RefCell::new(false) };
        let mut buf = Vec::new();
        match ptree::write_tree(&tree, &mut buf) {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(err) => format!("<tree rendering failed: {err}>"),
        }
    }

    /// Render the trees below every result.
    pub fn results_tree(&self) -> String {
        self.results().iter().map(|&root| self.tree(root)).collect()
    }
}
