use serde_json::Value;

/// Find every value stored under `key`, at any depth, in document order.
///
/// Traversal uses an explicit stack, so deeply nested payloads cannot exhaust
/// the call stack. Matched values are searched as well, so a key nested
/// inside another occurrence of itself is reported too.
pub fn find_all<'a>(document: &'a Value, key: &str) -> Vec<&'a Value> {
    let mut found = Vec::new();
    let mut stack: Vec<(Option<&'a str>, &'a Value)> = vec![(None, document)];

    while let Some((name, value)) = stack.pop() {
        if name == Some(key) {
            found.push(value);
        }
        match value {
            Value::Object(map) => {
                // Reverse push keeps pre-order on pop.
                let children: Vec<_> = map.iter().collect();
                for (k, v) in children.into_iter().rev() {
                    stack.push((Some(k.as_str()), v));
                }
            }
            Value::Array(items) => {
                for v in items.iter().rev() {
                    stack.push((None, v));
                }
            }
            _ => {}
        }
    }

    found
}
