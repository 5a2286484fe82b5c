use serde_json::Value;

/// Deeply merges `source` into `target` in place. Objects merge key-wise;
/// any other pairing (scalars, lists, nulls, kind mismatches) replaces the
/// target with the source. Lists are replaced, never zipped or concatenated:
/// entity replies are aligned per entity before they reach this function.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            deep_merge_objects(target_map, source_map);
        }
        (target, source) => {
            *target = source;
        }
    }
}

pub fn deep_merge_objects(
    target_map: &mut serde_json::Map<String, Value>,
    source_map: serde_json::Map<String, Value>,
) {
    for (key, source_value) in source_map {
        match target_map.get_mut(&key) {
            Some(target_value) => deep_merge(target_value, source_value),
            None => {
                target_map.insert(key, source_value);
            }
        }
    }
}
