use crate::router::Route;
use crate::router::method::RequestMethod;
use crate::router::pattern::CompiledPattern;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes that share one structural signature, keyed by method.
///
/// The group keeps the pattern of its first registrant; later methods reuse it for matching.
pub(crate) struct RouteGroup {
    signature: String,
    pattern: CompiledPattern,
    methods: HashMap<RequestMethod, Arc<Route>, fnv::FnvBuildHasher>,
}

/// A node of the prefix tree. `parent` is an index into the owning arena and never owns.
struct TreeNode {
    parent: Option<usize>,
    children: HashMap<String, usize, fnv::FnvBuildHasher>,
    bucket: Vec<RouteGroup>,
}

impl TreeNode {
    fn new(parent: Option<usize>) -> Self {
        Self {
            parent,
            children: HashMap::with_hasher(fnv::FnvBuildHasher::default()),
            bucket: Vec::new(),
        }
    }
}

/// Result of walking the tree for one request.
pub(crate) enum TreeLookup {
    Matched {
        route: Arc<Route>,
        params: Vec<(String, String)>,
    },
    WrongMethod,
    NotFound,
}

/// Prefix tree keyed by static path segments, stored as an arena with index back-references.
///
/// # Behavior
/// Routes are indexed by their leading static segments only, so every parameterised route
/// below a static prefix lands in the same bucket. Lookups descend as far as exact segment
/// matches allow and then search buckets from that node upwards to the root.
pub(crate) struct RouteTree {
    nodes: Vec<TreeNode>,
}

const ROOT: usize = 0;

impl RouteTree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![TreeNode::new(None)],
        }
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(TreeNode::new(None));
    }

    /// Indexes `route` under its leading static segments, creating nodes on demand.
    pub(crate) fn insert(&mut self, route: Arc<Route>) {
        let pattern = route.pattern();
        let depth = pattern.tree_depth();
        let mut current = ROOT;
        for segment in pattern.static_segments().iter().take(depth) {
            current = match self.nodes[current].children.get(segment) {
                Some(child) => *child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(TreeNode::new(Some(current)));
                    self.nodes[current].children.insert(segment.clone(), child);
                    child
                }
            };
        }

        let signature = pattern.signature();
        let bucket = &mut self.nodes[current].bucket;
        let position = match bucket.iter().position(|group| group.signature == signature) {
            Some(position) => position,
            None => {
                bucket.push(RouteGroup {
                    signature,
                    pattern: pattern.clone(),
                    methods: HashMap::with_hasher(fnv::FnvBuildHasher::default()),
                });
                bucket.len() - 1
            }
        };
        bucket[position].methods.insert(route.method(), route);
    }

    /// Resolves `path` for `method`.
    ///
    /// # Behavior
    /// - A group whose pattern matches and which holds a route for `method` wins; its
    ///   captures are bound to that route's parameter names.
    /// - A group whose pattern matches but has no route for `method` ends the search with
    ///   `WrongMethod`, even if an ancestor bucket could have served the path.
    /// - Buckets are tried in registration order at each node, deepest node first.
    pub(crate) fn lookup(&self, method: RequestMethod, path: &str) -> TreeLookup {
        let mut node = Some(self.descend(path));
        while let Some(index) = node {
            let current = &self.nodes[index];
            for group in &current.bucket {
                let Some(captures) = group.pattern.matcher().captures(path) else {
                    continue;
                };
                let Some(route) = group.methods.get(&method) else {
                    log::trace!(
                        "Path '{}' matches group '{}' but no route for {}",
                        path,
                        group.signature,
                        method
                    );
                    return TreeLookup::WrongMethod;
                };
                let params = route.pattern().bind(&captures);
                return TreeLookup::Matched {
                    route: route.clone(),
                    params,
                };
            }
            node = current.parent;
        }
        TreeLookup::NotFound
    }

    fn descend(&self, path: &str) -> usize {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let mut current = ROOT;
        for segment in trimmed.split('/') {
            match self.nodes[current].children.get(segment) {
                Some(child) => current = *child,
                None => break,
            }
        }
        log::trace!("Descended to tree node {} for path '{}'", current, path);
        current
    }
}
