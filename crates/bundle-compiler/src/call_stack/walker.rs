//! Parent-before-children traversal of call-stack trees

use super::CallStack;

/// Visitor invoked once per call-stack node
pub trait StackVisitor {
    fn visit(&mut self, stack: &CallStack, depth: usize);
}

impl<F> StackVisitor for F
where
    F: FnMut(&CallStack, usize),
{
    fn visit(&mut self, stack: &CallStack, depth: usize) {
        self(stack, depth);
    }
}

/// Applies `visit` to every node of the tree, parent before children, children in
/// declared order
pub fn walk_stack(root: &CallStack, visit: &mut impl FnMut(&CallStack)) {
    visit(root);
    for child in root.children() {
        walk_stack(child, visit);
    }
}

/// Same as [`walk_stack`], also reporting the depth below `root`
pub fn walk_stack_with_depth(root: &CallStack, visitor: &mut impl StackVisitor) {
    walk_inner(root, 0, visitor);
}

fn walk_inner(stack: &CallStack, depth: usize, visitor: &mut impl StackVisitor) {
    visitor.visit(stack, depth);
    for child in stack.children() {
        walk_inner(child, depth + 1, visitor);
    }
}
