use serde_json::Value;
use tracing::trace;

use crate::document::textual;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    /// Same fields, same values.
    Equal,
    /// Every field of the existing record matches and the item has more.
    Superset,
    Unrelated,
}

/// Values are compared by their textual form, so `true` and `"true"` match.
fn relation(item: &Record, existing: &Record) -> Relation {
    if item.len() < existing.len() {
        return Relation::Unrelated;
    }
    let covered = existing
        .iter()
        .all(|(key, value)| item.get(key).is_some_and(|mine| same_value(mine, value)));
    match (covered, item.len() == existing.len()) {
        (false, _) => Relation::Unrelated,
        (true, true) => Relation::Equal,
        (true, false) => Relation::Superset,
    }
}

/// Textual equality without allocating when both sides share a type.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        // Floats go through text so `0.0` and `-0.0` stay distinct.
        (Value::Number(x), Value::Number(y)) if !(x.is_f64() && y.is_f64()) => x == y,
        (Value::Null, Value::Null) => true,
        _ => textual(a) == textual(b),
    }
}

// ─────────────────────────────────────────────────────────────
//  MASK-REDUCE
// ─────────────────────────────────────────────────────────────
//
// Walks the records in order. Exact duplicates of an accepted record are
// dropped; an item that specializes an accepted record replaces it.
//
pub fn mask_reduce(records: Vec<Record>) -> Vec<Record> {
    let mut out: Vec<Record> = Vec::with_capacity(records.len());

    'items: for item in records {
        let mut i = 0;
        while i < out.len() {
            match relation(&item, &out[i]) {
                Relation::Equal => {
                    trace!(record = ?item, "dropped duplicate");
                    continue 'items;
                }
                Relation::Superset => {
                    let masked = out.remove(i);
                    trace!(record = ?masked, "masked by more specific record");
                }
                Relation::Unrelated => i += 1,
            }
        }
        out.push(item);
    }

    out
}
