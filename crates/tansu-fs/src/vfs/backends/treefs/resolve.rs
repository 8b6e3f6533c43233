//! Path resolution over the node store.
//!
//! A pure walk: no caching (every call runs under the instance lock), no
//! crossing of instance boundaries, no link dereferencing. Mutating
//! operations resolve the *parent* of a target by passing a depth
//! adjustment of −1 through the same routine, so there is exactly one
//! tree-walking loop in the backend.

use super::node::{NodeArena, NodeId};

/// Result of a successful resolution.
///
/// `parent` and `index` locate the node inside its parent's child list;
/// both are `None` when the resolved node is the start node itself
/// (zero segments walked).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Resolved {
    pub node: NodeId,
    pub parent: Option<NodeId>,
    pub index: Option<usize>,
}

/// Number of non-empty `/`-separated segments.
pub(crate) fn depth(path: &str) -> usize {
    segments(path).count()
}

/// Iterate the non-empty segments of a path.
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Last non-empty segment, if any.
pub(crate) fn final_segment(path: &str) -> Option<&str> {
    segments(path).last()
}

/// True for paths that name "this must be a directory" via a trailing
/// slash. The bare root `/` does not count.
pub(crate) fn has_trailing_slash(path: &str) -> bool {
    path.len() > 1 && path.ends_with('/')
}

/// Walk `path` from `start`, consuming `depth(path) + depth_adjustment`
/// segments. `depth_adjustment` of −1 resolves the parent of the target;
/// 0 resolves the target itself.
///
/// Returns `None` when the start node is not a directory, a segment does
/// not exist, or the adjusted depth is negative (the walk would leave the
/// start node's subtree upward).
pub(crate) fn resolve(
    arena: &NodeArena,
    start: NodeId,
    path: &str,
    depth_adjustment: i32,
) -> Option<Resolved> {
    if !arena.get(start)?.is_dir() {
        return None;
    }

    let steps = depth(path) as i64 + i64::from(depth_adjustment);
    if steps < 0 {
        return None;
    }

    let mut current = start;
    let mut parent = None;
    let mut index = None;

    for segment in segments(path).take(steps as usize) {
        let children = arena.get(current)?.children()?;
        let found = children.iter().enumerate().find(|&(_, &child)| {
            arena.get(child).is_some_and(|node| node.name == segment)
        });
        match found {
            Some((i, &child)) => {
                parent = Some(current);
                index = Some(i);
                current = child;
            }
            None => return None,
        }
    }

    Some(Resolved {
        node: current,
        parent,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::treefs::node::Node;

    fn sample_tree() -> (NodeArena, NodeId) {
        // /
        // ├── etc/
        // │   └── motd
        // └── srv/
        let mut arena = NodeArena::new();
        let root = arena.alloc(Node::directory("/".into(), 0o755)).unwrap();
        let etc = arena.alloc(Node::directory("etc".into(), 0o755)).unwrap();
        let motd = arena.alloc(Node::file("motd".into(), 0o644)).unwrap();
        let srv = arena.alloc(Node::directory("srv".into(), 0o755)).unwrap();
        arena.get_mut(root).unwrap().children_mut().unwrap().push(etc);
        arena.get_mut(root).unwrap().children_mut().unwrap().push(srv);
        arena.get_mut(etc).unwrap().children_mut().unwrap().push(motd);
        (arena, root)
    }

    #[test]
    fn depth_counts_nonempty_segments() {
        assert_eq!(depth("/"), 0);
        assert_eq!(depth("/a"), 1);
        assert_eq!(depth("/a/b"), 2);
        assert_eq!(depth("/a/b/"), 2);
        assert_eq!(depth("/a//b"), 2);
    }

    #[test]
    fn resolve_root() {
        let (arena, root) = sample_tree();
        let r = resolve(&arena, root, "/", 0).unwrap();
        assert_eq!(r.node, root);
        assert!(r.parent.is_none());
        assert!(r.index.is_none());
    }

    #[test]
    fn resolve_nested_target() {
        let (arena, root) = sample_tree();
        let r = resolve(&arena, root, "/etc/motd", 0).unwrap();
        assert_eq!(arena.get(r.node).unwrap().name, "motd");
        assert_eq!(arena.get(r.parent.unwrap()).unwrap().name, "etc");
        assert_eq!(r.index, Some(0));
    }

    #[test]
    fn resolve_parent_with_depth_adjustment() {
        let (arena, root) = sample_tree();
        let r = resolve(&arena, root, "/etc/motd", -1).unwrap();
        assert_eq!(arena.get(r.node).unwrap().name, "etc");

        // Parent of a top-level entry is the root.
        let r = resolve(&arena, root, "/etc", -1).unwrap();
        assert_eq!(r.node, root);
    }

    #[test]
    fn resolve_missing_segment_fails() {
        let (arena, root) = sample_tree();
        assert!(resolve(&arena, root, "/etc/shadow", 0).is_none());
        assert!(resolve(&arena, root, "/nope/motd", 0).is_none());
    }

    #[test]
    fn resolve_through_file_fails() {
        let (arena, root) = sample_tree();
        assert!(resolve(&arena, root, "/etc/motd/x", 0).is_none());
    }

    #[test]
    fn resolve_from_non_directory_fails() {
        let (arena, root) = sample_tree();
        let motd = resolve(&arena, root, "/etc/motd", 0).unwrap().node;
        assert!(resolve(&arena, motd, "/anything", 0).is_none());
    }

    #[test]
    fn negative_adjusted_depth_fails() {
        let (arena, root) = sample_tree();
        assert!(resolve(&arena, root, "/", -1).is_none());
    }

    #[test]
    fn trailing_slash_detection() {
        assert!(has_trailing_slash("/etc/"));
        assert!(!has_trailing_slash("/etc"));
        assert!(!has_trailing_slash("/"));
    }

    #[test]
    fn final_segment_of_path() {
        assert_eq!(final_segment("/etc/motd"), Some("motd"));
        assert_eq!(final_segment("/etc/"), Some("etc"));
        assert_eq!(final_segment("/"), None);
    }
}
