//! The fork tree that fixes the canonical scheduling order.
//!
//! Test threads form a tree rooted at the main thread (id 0). The
//! depth-first pre-order over live nodes is the order in which eligible
//! threads are resumed within a tick; it is recomputed lazily after every
//! change.

/// A node in the fork tree. Dead nodes carry thread -1 and no children.
#[derive(Clone, Debug)]
struct OrderNode {
    thread: i64,
    children: Vec<OrderNode>,
}

impl OrderNode {
    fn find(&mut self, thread: usize) -> Option<&mut OrderNode> {
        if self.thread == thread as i64 {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find(thread))
    }

    fn find_ref(&self, thread: usize) -> Option<&OrderNode> {
        if self.thread == thread as i64 {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_ref(thread))
    }

    fn contains(&self, thread: usize) -> bool {
        self.find_ref(thread).is_some()
    }

    fn collect(&self, out: &mut Vec<usize>) {
        if self.thread >= 0 {
            out.push(self.thread as usize);
        }
        for child in &self.children {
            child.collect(out);
        }
    }

    fn has_live_descendant(&self) -> bool {
        self.children
            .iter()
            .any(|c| c.thread >= 0 || c.has_live_descendant())
    }
}

/// Parent/child tree of test threads with a lazily cached walk order.
#[derive(Clone, Debug)]
pub struct ThreadOrderTree {
    root: OrderNode,
    cached: Option<Vec<usize>>,
}

impl Default for ThreadOrderTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadOrderTree {
    /// Creates a tree holding only the main thread.
    pub fn new() -> Self {
        Self {
            root: OrderNode {
                thread: 0,
                children: Vec::new(),
            },
            cached: None,
        }
    }

    /// Appends `id` as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if the parent is not a live node of the tree.
    pub fn add_thread(&mut self, parent: usize, id: usize) {
        let node = self
            .root
            .find(parent)
            .unwrap_or_else(|| panic!("parent thread {parent} is not alive"));
        node.children.push(OrderNode {
            thread: id as i64,
            children: Vec::new(),
        });
        self.cached = None;
    }

    /// Marks a thread dead.
    ///
    /// # Panics
    ///
    /// Panics if the thread is not alive or still has live descendants.
    pub fn finish_thread(&mut self, id: usize) {
        let node = self
            .root
            .find(id)
            .unwrap_or_else(|| panic!("thread {id} is not alive"));
        assert!(
            !node.has_live_descendant(),
            "thread {id} finished with live descendants"
        );
        node.thread = -1;
        node.children.clear();
        self.cached = None;
    }

    /// The depth-first pre-order over live threads.
    pub fn order(&mut self) -> &[usize] {
        if self.cached.is_none() {
            let mut out = Vec::new();
            self.root.collect(&mut out);
            self.cached = Some(out);
        }
        self.cached.as_deref().unwrap_or(&[])
    }

    /// Whether `a` is `b` or an ancestor of `b`.
    pub fn is_parent_of(&self, a: usize, b: usize) -> bool {
        self.root
            .find_ref(a)
            .map(|node| node.contains(b))
            .unwrap_or(false)
    }

    /// The live direct children of a thread, in fork order.
    pub fn children_of(&self, id: usize) -> Vec<usize> {
        self.root
            .find_ref(id)
            .map(|node| {
                node.children
                    .iter()
                    .filter(|c| c.thread >= 0)
                    .map(|c| c.thread as usize)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_main_only() {
        let mut t = ThreadOrderTree::new();
        assert_eq!(t.order(), &[0]);
    }

    #[test]
    fn depth_first_preorder() {
        let mut t = ThreadOrderTree::new();
        t.add_thread(0, 1);
        t.add_thread(0, 2);
        t.add_thread(1, 3);
        // Children of 1 come before 2 in pre-order.
        assert_eq!(t.order(), &[0, 1, 3, 2]);
    }

    #[test]
    fn finish_removes_from_order() {
        let mut t = ThreadOrderTree::new();
        t.add_thread(0, 1);
        t.add_thread(0, 2);
        t.finish_thread(1);
        assert_eq!(t.order(), &[0, 2]);
    }

    #[test]
    fn order_recomputed_after_changes() {
        let mut t = ThreadOrderTree::new();
        t.add_thread(0, 1);
        assert_eq!(t.order(), &[0, 1]);
        t.add_thread(1, 2);
        assert_eq!(t.order(), &[0, 1, 2]);
        t.finish_thread(2);
        t.finish_thread(1);
        assert_eq!(t.order(), &[0]);
    }

    #[test]
    fn is_parent_of_ancestors_and_self() {
        let mut t = ThreadOrderTree::new();
        t.add_thread(0, 1);
        t.add_thread(1, 2);
        assert!(t.is_parent_of(0, 2));
        assert!(t.is_parent_of(1, 2));
        assert!(t.is_parent_of(2, 2));
        assert!(!t.is_parent_of(2, 1));
        assert!(!t.is_parent_of(1, 0));
    }

    #[test]
    fn siblings_are_unrelated() {
        let mut t = ThreadOrderTree::new();
        t.add_thread(0, 1);
        t.add_thread(0, 2);
        assert!(!t.is_parent_of(1, 2));
        assert!(!t.is_parent_of(2, 1));
    }

    #[test]
    fn children_of_lists_live_children() {
        let mut t = ThreadOrderTree::new();
        t.add_thread(0, 1);
        t.add_thread(0, 2);
        t.add_thread(1, 3);
        assert_eq!(t.children_of(0), vec![1, 2]);
        assert_eq!(t.children_of(1), vec![3]);
        t.finish_thread(3);
        t.finish_thread(1);
        assert_eq!(t.children_of(0), vec![2]);
    }

    #[test]
    #[should_panic(expected = "live descendants")]
    fn finish_with_live_children_panics() {
        let mut t = ThreadOrderTree::new();
        t.add_thread(0, 1);
        t.finish_thread(0);
    }

    #[test]
    fn dead_thread_is_nobodys_parent() {
        let mut t = ThreadOrderTree::new();
        t.add_thread(0, 1);
        t.finish_thread(1);
        assert!(!t.is_parent_of(1, 0));
        assert!(!t.is_parent_of(0, 1));
    }
}
