use serde_json::Value;
use std::collections::VecDeque;
use tracing::trace;

use crate::plan::ResponsePathSegment;

/// Resolves a response path against the working tree, invoking `callback`
/// with a mutable reference to every addressed value plus the concrete list
/// indexes traversed on the way (one per `@` segment, in order).
///
/// If the addressed value is itself a list, the callback fans out over its
/// elements, so entity batches are always flat. Null or missing branches are
/// skipped: downstream nodes must tolerate an empty slice.
pub fn traverse_and_callback<'a, Callback>(
    current_data: &'a mut Value,
    remaining_path: &[ResponsePathSegment],
    current_indexes: VecDeque<usize>,
    callback: &mut Callback,
) where
    Callback: FnMut(&'a mut Value, VecDeque<usize>),
{
    if current_data.is_null() {
        trace!("null value on response path, nothing to flatten");
        return;
    }
    if remaining_path.is_empty() {
        if let Value::Array(items) = current_data {
            for (index, item) in items.iter_mut().enumerate() {
                let mut indexes = current_indexes.clone();
                indexes.push_back(index);
                callback(item, indexes);
            }
        } else {
            callback(current_data, current_indexes);
        }
        return;
    }

    let rest_of_path = &remaining_path[1..];
    match &remaining_path[0] {
        ResponsePathSegment::List => {
            if let Value::Array(items) = current_data {
                for (index, item) in items.iter_mut().enumerate() {
                    let mut indexes = current_indexes.clone();
                    indexes.push_back(index);
                    traverse_and_callback(item, rest_of_path, indexes, callback);
                }
            } else {
                trace!("expected a list on the response path, found something else");
            }
        }
        ResponsePathSegment::Field(field_name) => {
            if let Value::Object(map) = current_data {
                if let Some(next_data) = map.get_mut(field_name) {
                    traverse_and_callback(next_data, rest_of_path, current_indexes, callback);
                }
            } else {
                trace!("expected an object on the response path, found something else");
            }
        }
    }
}
