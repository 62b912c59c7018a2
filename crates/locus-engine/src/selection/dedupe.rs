use locus_common::{NodeId, UiTree};

/// Drop candidates whose bounds centre lies within `tolerance_px` (on both
/// axes) of an earlier kept candidate. Layered views often report the same
/// hit-box several times. Nodes without usable bounds are always kept.
pub fn dedupe_by_center(tree: &UiTree, candidates: &[NodeId], tolerance_px: i32) -> Vec<NodeId> {
    let tolerance = tolerance_px.max(0);
    let mut kept: Vec<NodeId> = Vec::with_capacity(candidates.len());
    let mut centers: Vec<(i32, i32)> = Vec::new();

    for id in candidates {
        if kept.contains(id) {
            continue;
        }
        let center = tree
            .node(*id)
            .bounds()
            .filter(|b| b.is_valid())
            .map(|b| b.center());
        match center {
            Some((x, y)) => {
                let duplicate = centers
                    .iter()
                    .any(|(cx, cy)| (cx - x).abs() <= tolerance && (cy - y).abs() <= tolerance);
                if !duplicate {
                    centers.push((x, y));
                    kept.push(*id);
                }
            }
            None => kept.push(*id),
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_hit_boxes_collapse() {
        let mut b = UiTree::builder("hierarchy");
        let outer = b.node(b.root(), &[("bounds", "[100,100][300,200]")]);
        let inner = b.node(outer, &[("bounds", "[104,102][300,200]")]);
        let other = b.node(b.root(), &[("bounds", "[100,400][300,500]")]);
        let hidden = b.node(b.root(), &[("bounds", "[0,0][0,0]")]);
        let bare = b.node(b.root(), &[]);
        let tree = b.build();

        let kept = dedupe_by_center(&tree, &[outer, inner, other, hidden, bare, outer], 10);
        assert_eq!(kept, vec![outer, other, hidden, bare]);

        let strict = dedupe_by_center(&tree, &[outer, inner], 0);
        assert_eq!(strict, vec![outer, inner]);
    }
}
