//! Loop header detection
//!
//! A loop header is the target of a back edge found by a depth-first walk
//! from the entry: an edge into a block that is still on the walk's stack.
//! This does not require a dominator tree and also flags the entry points of
//! irreducible cycles, which is what jump threading needs to stay away from.

use std::collections::HashSet;

use crate::middle::ir::{BlockId, Function};

/// Targets of depth-first back edges
pub fn find_loop_headers(func: &Function) -> HashSet<BlockId> {
    let mut headers = HashSet::new();
    if !func.is_definition() {
        return headers;
    }
    let entry = func.entry();
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
    visited.insert(entry);
    on_stack.insert(entry);

    while let Some((block, next)) = stack.pop() {
        let succs = func.successors(block);
        if next < succs.len() {
            stack.push((block, next + 1));
            let succ = succs[next];
            if on_stack.contains(&succ) {
                headers.insert(succ);
            } else if visited.insert(succ) {
                on_stack.insert(succ);
                stack.push((succ, 0));
            }
        } else {
            on_stack.remove(&block);
        }
    }
    headers
}

/// Whether any edge of `func` is a back edge into `block`
pub fn is_loop_header(func: &Function, block: BlockId) -> bool {
    find_loop_headers(func).contains(&block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_sil;

    #[test]
    fn test_self_loop_and_nested_loop() {
        let module = parse_sil(
            "sil @f : $@convention(thin) (Builtin.Int1) -> () {
bb0(%0 : $Builtin.Int1):
  br bb1

bb1:
  cond_br %0, bb2, bb4

bb2:
  cond_br %0, bb2, bb3

bb3:
  br bb1

bb4:
  %1 = tuple ()
  return %1 : $()
}
",
        )
        .unwrap();
        let f = module.function(module.find_function("f").unwrap());
        let blocks = f.layout().to_vec();
        let headers = find_loop_headers(f);
        assert_eq!(headers.len(), 2);
        assert!(headers.contains(&blocks[1]));
        assert!(headers.contains(&blocks[2]));
        assert!(!is_loop_header(f, blocks[0]));
    }

    #[test]
    fn test_diamond_has_no_headers() {
        let module = parse_sil(
            "sil @f : $@convention(thin) (Builtin.Int1) -> () {
bb0(%0 : $Builtin.Int1):
  cond_br %0, bb1, bb2

bb1:
  br bb3

bb2:
  br bb3

bb3:
  %1 = tuple ()
  return %1 : $()
}
",
        )
        .unwrap();
        let f = module.function(module.find_function("f").unwrap());
        assert!(find_loop_headers(f).is_empty());
    }
}
