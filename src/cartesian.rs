use crate::record::{merge, PartialRecord};

// ─────────────────────────────────────────────────────────────
//  CARTESIAN PRODUCT OVER AXES
// ─────────────────────────────────────────────────────────────
//
// Every axis contributes one element per combination. An empty axis has no
// variation, so it is skipped instead of wiping out the whole product.
// With nothing left to combine the result is the single empty combination.
//
pub fn cartesian<T>(axes: &[Vec<T>]) -> Vec<Vec<&T>> {
    let mut out: Vec<Vec<&T>> = vec![Vec::new()];

    for axis in axes.iter().filter(|axis| !axis.is_empty()) {
        let mut next = Vec::with_capacity(out.len() * axis.len());
        for prefix in &out {
            for item in axis {
                let mut combo = Vec::with_capacity(prefix.len() + 1);
                combo.extend(prefix.iter().copied());
                combo.push(item);
                next.push(combo);
            }
        }
        out = next;
    }

    out
}

/// One merged record per combination of partials across `axes`.
pub fn cartesian_merge(axes: &[Vec<PartialRecord>]) -> Vec<PartialRecord> {
    cartesian(axes).into_iter().map(merge).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Field;
    use serde_json::json;

    #[test]
    fn product_keeps_axis_order() {
        let axes = vec![vec![1, 2], vec![10, 20, 30]];
        let combos: Vec<Vec<i32>> = cartesian(&axes)
            .into_iter()
            .map(|c| c.into_iter().copied().collect())
            .collect();
        assert_eq!(
            combos,
            vec![
                vec![1, 10],
                vec![1, 20],
                vec![1, 30],
                vec![2, 10],
                vec![2, 20],
                vec![2, 30],
            ]
        );
    }

    #[test]
    fn empty_axes_are_skipped() {
        let axes: Vec<Vec<i32>> = vec![vec![], vec![1, 2], vec![]];
        assert_eq!(cartesian(&axes).len(), 2);
    }

    #[test]
    fn no_axes_yields_identity() {
        let axes: Vec<Vec<i32>> = vec![vec![], vec![]];
        let combos = cartesian(&axes);
        assert_eq!(combos.len(), 1);
        assert!(combos[0].is_empty());

        let merged = cartesian_merge(&[]);
        assert_eq!(merged, vec![PartialRecord::default()]);
    }

    #[test]
    fn merge_combines_fields_per_combination() {
        let os = vec![
            PartialRecord::with_field("os", Field::Resolved(json!("mac"))),
            PartialRecord::with_field("os", Field::Resolved(json!("linux"))),
        ];
        let arch = vec![
            PartialRecord::with_field("arch", Field::Resolved(json!("x64"))),
            PartialRecord::with_field("arch", Field::Resolved(json!("arm64"))),
        ];
        let merged = cartesian_merge(&[os, arch]);
        assert_eq!(merged.len(), 4);
        assert!(merged.iter().all(|r| r.len() == 2));
        assert_eq!(
            merged[3].get("arch"),
            Some(&Field::Resolved(json!("arm64")))
        );
    }
}
