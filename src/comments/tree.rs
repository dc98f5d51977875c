//! Arena-backed comment tree.
//!
//! Nodes live in a flat vector and refer to each other by index, so upstream
//! nesting depth never turns into call-stack depth: listings are walked with
//! an explicit stack and the final forest is assembled bottom-up. A node's
//! index is always greater than its parent's, which is what makes the
//! bottom-up pass valid.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::models::{str_field, Comment, CommentForest};

/// An unresolved "load more" node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Fullname (`t1_...` or `t3_...`) of the node the hidden comments hang under.
    pub parent_fullname: String,
    /// Ids of the hidden comments. Empty for "continue this thread" nodes.
    pub children: Vec<String>,
    /// Upstream's count of hidden comments.
    pub count: i64,
}

impl Placeholder {
    /// Key identifying this placeholder across repeated upstream responses.
    #[must_use]
    pub fn key(&self) -> String {
        if self.children.is_empty() {
            format!("continue:{}", self.parent_fullname)
        } else {
            format!("more:{}:{}", self.parent_fullname, self.children.join(","))
        }
    }

    /// Whether this is a "continue this thread" link rather than a batch of ids.
    #[must_use]
    pub fn is_continuation(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug)]
enum NodeKind {
    Comment {
        comment: Comment,
        children: Vec<usize>,
    },
    More(Placeholder),
}

#[derive(Debug)]
struct Node {
    parent: Option<usize>,
    kind: NodeKind,
}

/// Result of flattening an arena into an owned forest.
#[derive(Debug, Default)]
pub struct BuiltForest {
    pub comments: CommentForest,
    /// Placeholders still present when the forest was built.
    pub dropped_placeholders: usize,
}

#[derive(Debug, Default)]
pub struct CommentArena {
    nodes: Vec<Node>,
    roots: Vec<usize>,
    by_fullname: HashMap<String, usize>,
}

impl CommentArena {
    /// Build an arena from a comment listing (`{"data": {"children": [...]}}`).
    #[must_use]
    pub fn from_listing(listing: &Value) -> Self {
        let mut arena = Self::default();
        let things = listing_children(listing);
        let top = arena.graft(None, things);
        arena.roots = top;
        arena
    }

    /// Number of concrete comments currently in the arena.
    #[must_use]
    pub fn comment_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Comment { .. }))
            .count()
    }

    /// Indices of placeholders currently attached to the tree, in arena order.
    #[must_use]
    pub fn placeholders(&self) -> Vec<usize> {
        let mut attached = HashSet::new();
        attached.extend(self.roots.iter().copied());
        for node in &self.nodes {
            if let NodeKind::Comment { children, .. } = &node.kind {
                attached.extend(children.iter().copied());
            }
        }
        let mut found: Vec<usize> = attached
            .into_iter()
            .filter(|&i| matches!(self.nodes[i].kind, NodeKind::More(_)))
            .collect();
        found.sort_unstable();
        found
    }

    #[must_use]
    pub fn placeholder(&self, index: usize) -> Option<&Placeholder> {
        match self.nodes.get(index).map(|n| &n.kind) {
            Some(NodeKind::More(p)) => Some(p),
            _ => None,
        }
    }

    /// Replace placeholder `index` with the comments in `things`.
    ///
    /// Things whose parent is the placeholder's parent take the placeholder's
    /// position, in order; things whose parent is another known comment are
    /// appended to it; anything else is dropped. Returns the number of
    /// comments added.
    pub fn resolve(&mut self, index: usize, things: &[Value]) -> usize {
        let Some(placeholder) = self.placeholder(index).cloned() else {
            return 0;
        };
        let before = self.comment_count();
        let slot_parent = self.nodes[index].parent;

        let mut in_place = Vec::new();
        for thing in things {
            let Some(data) = thing.get("data") else {
                continue;
            };
            let parent_fullname = str_field(data, "parent_id").unwrap_or_default();

            if parent_fullname == placeholder.parent_fullname {
                in_place.extend(self.graft(slot_parent, std::slice::from_ref(thing)));
            } else if let Some(&parent) = self.by_fullname.get(&parent_fullname) {
                let added = self.graft(Some(parent), std::slice::from_ref(thing));
                self.children_mut(Some(parent)).extend(added);
            } else {
                debug!(parent = %parent_fullname, "Dropping comment with unknown parent");
            }
        }

        let container = self.children_mut(slot_parent);
        if let Some(pos) = container.iter().position(|&i| i == index) {
            container.splice(pos..=pos, in_place);
        } else {
            container.extend(in_place);
        }

        self.comment_count() - before
    }

    /// Detach placeholder `index` from the tree without replacement.
    pub fn discard(&mut self, index: usize) {
        let parent = self.nodes[index].parent;
        self.children_mut(parent).retain(|&i| i != index);
    }

    /// Assemble the owned forest. Placeholders still attached are dropped.
    #[must_use]
    pub fn into_forest(self) -> BuiltForest {
        let dropped_placeholders = self.placeholders().len();
        let mut built: Vec<Option<Comment>> = (0..self.nodes.len()).map(|_| None).collect();

        for (index, node) in self.nodes.into_iter().enumerate().rev() {
            if let NodeKind::Comment {
                mut comment,
                children,
            } = node.kind
            {
                comment.replies = children.iter().filter_map(|&c| built[c].take()).collect();
                built[index] = Some(comment);
            }
        }

        BuiltForest {
            comments: self
                .roots
                .iter()
                .filter_map(|&r| built[r].take())
                .collect(),
            dropped_placeholders,
        }
    }

    /// Allocate `things` (and everything nested under them) beneath `parent`.
    ///
    /// Returns the indices of the top-level nodes created, in order; the
    /// caller decides where they go. Nested replies are attached here.
    fn graft(&mut self, parent: Option<usize>, things: &[Value]) -> Vec<usize> {
        let mut top = Vec::new();
        let mut stack: Vec<(usize, &Value)> = Vec::new();

        for thing in things {
            if let Some(index) = self.alloc(parent, thing) {
                top.push(index);
                stack.push((index, thing));
            }
        }

        while let Some((index, thing)) = stack.pop() {
            let replies = thing
                .get("data")
                .and_then(|d| d.get("replies"))
                .map(listing_children)
                .unwrap_or_default();

            for reply in replies {
                if let Some(child) = self.alloc(Some(index), reply) {
                    self.children_mut(Some(index)).push(child);
                    stack.push((child, reply));
                }
            }
        }

        top
    }

    fn alloc(&mut self, parent: Option<usize>, thing: &Value) -> Option<usize> {
        let kind = thing.get("kind").and_then(Value::as_str)?;
        let data = thing.get("data")?;

        let node_kind = match kind {
            "t1" => {
                let fullname = str_field(data, "name")
                    .or_else(|| str_field(data, "id").map(|id| format!("t1_{id}")));
                if let Some(name) = &fullname {
                    if self.by_fullname.contains_key(name) {
                        debug!(comment = %name, "Skipping comment already in tree");
                        return None;
                    }
                }
                let index = self.nodes.len();
                if let Some(name) = fullname {
                    self.by_fullname.insert(name, index);
                }
                NodeKind::Comment {
                    comment: Comment::from_data(data),
                    children: Vec::new(),
                }
            }
            "more" => NodeKind::More(Placeholder {
                parent_fullname: str_field(data, "parent_id").unwrap_or_default(),
                children: data
                    .get("children")
                    .and_then(Value::as_array)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(Value::as_str)
                            .map(ToString::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                count: data.get("count").and_then(Value::as_i64).unwrap_or(0),
            }),
            other => {
                debug!(kind = %other, "Ignoring unexpected thing in comment listing");
                return None;
            }
        };

        self.nodes.push(Node {
            parent,
            kind: node_kind,
        });
        Some(self.nodes.len() - 1)
    }

    fn children_mut(&mut self, parent: Option<usize>) -> &mut Vec<usize> {
        match parent {
            None => &mut self.roots,
            Some(index) => match &mut self.nodes[index].kind {
                NodeKind::Comment { children, .. } => children,
                // Placeholders never have children; park strays at the root.
                NodeKind::More(_) => &mut self.roots,
            },
        }
    }
}

/// The `data.children` array of a listing. Empty replies arrive as `""`.
fn listing_children(listing: &Value) -> &[Value] {
    listing
        .get("data")
        .and_then(|d| d.get("children"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}
