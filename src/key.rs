//! Key → namespace mapping.

/// Namespace for keys that carry no namespace segment.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Extract the namespace segment of a key.
///
/// The namespace is everything before the first `.`; keys without a `.`
/// (or with an empty leading segment) belong to [`DEFAULT_NAMESPACE`].
pub fn namespace_of(key: &str) -> &str {
    match key.split_once('.') {
        Some((ns, _)) if !ns.is_empty() => ns,
        _ => DEFAULT_NAMESPACE,
    }
}

/// Whether `key` belongs to `namespace`.
pub fn in_namespace(key: &str, namespace: &str) -> bool {
    namespace_of(key) == namespace
}
