use crate::model::AnnotatedRow;

/// Drop rows whose confidence is below the filter of the link that resolved
/// them. `filters[k]` applies only to rows resolved at link `k`; rows resolved
/// at a link without a filter are kept. Order is preserved.
pub fn apply_min_confidence(rows: Vec<AnnotatedRow>, filters: &[f64]) -> Vec<AnnotatedRow> {
    rows.into_iter()
        .filter(|row| {
            filters
                .get(row.resolved_at)
                .map(|min| row.conf_score >= *min)
                .unwrap_or(true)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use std::collections::BTreeMap;

    fn row(index: usize, resolved_at: usize, conf: f64) -> AnnotatedRow {
        AnnotatedRow {
            index,
            record: Record::new(format!("t{}", index), "x"),
            pred_label: "for".into(),
            conf_score: conf,
            label_logprobs: BTreeMap::new(),
            raw_pred_label: "FOR".into(),
            resolved_at,
            history: Vec::new(),
        }
    }

    #[test]
    fn filter_applies_only_to_its_link() {
        let rows = vec![row(0, 0, 0.9), row(1, 1, 0.5), row(2, 0, 0.55)];

        let kept = apply_min_confidence(rows.clone(), &[0.5, 0.4]);
        assert_eq!(kept.len(), 3);

        let kept = apply_min_confidence(rows.clone(), &[0.5, 0.6]);
        let idx: Vec<usize> = kept.iter().map(|r| r.index).collect();
        assert_eq!(idx, vec![0, 2]);

        let kept = apply_min_confidence(rows.clone(), &[0.6]);
        let idx: Vec<usize> = kept.iter().map(|r| r.index).collect();
        assert_eq!(idx, vec![0, 1]);

        assert_eq!(apply_min_confidence(rows, &[]).len(), 3);
    }
}
