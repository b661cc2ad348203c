//! Property-based test generators using proptest.
//!
//! Provides strategies for document paths, content and metadata.

use docvault_core::{MetaValue, Metadata};
use proptest::prelude::*;

/// Strategy for one valid path segment.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,11}").expect("Invalid regex")
}

/// Strategy for valid document paths: one to three segments with an
/// extension, e.g. `notes/q3_plan.md`.
pub fn doc_path_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(segment_strategy(), 0..3),
        segment_strategy(),
        prop::sample::select(vec!["md", "txt", "json", "bin"]),
    )
        .prop_map(|(dirs, name, ext)| {
            let mut path = dirs.join("/");
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&name);
            path.push('.');
            path.push_str(ext);
            path
        })
}

/// Strategy for paths the store must reject.
pub fn invalid_path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("/".to_string()),
        segment_strategy().prop_map(|s| format!("/{s}")),
        segment_strategy().prop_map(|s| format!("../{s}")),
        segment_strategy().prop_map(|s| format!("{s}/../../etc")),
        segment_strategy().prop_map(|s| format!("./{s}")),
        segment_strategy().prop_map(|s| format!(".docvault/{s}")),
        segment_strategy().prop_map(|s| format!("{s}\\evil")),
    ]
}

/// Strategy for non-empty document content.
pub fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..2048)
}

/// Strategy for a sequence of contents saved to one path.
pub fn content_versions_strategy(max_versions: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(content_strategy(), 1..=max_versions)
}

/// Strategy for a single metadata value.
pub fn meta_value_strategy() -> impl Strategy<Value = MetaValue> {
    prop_oneof![
        any::<bool>().prop_map(MetaValue::Bool),
        any::<i64>().prop_map(MetaValue::Integer),
        (-1.0e6f64..1.0e6).prop_map(MetaValue::Float),
        "[a-zA-Z0-9 ]{0,24}".prop_map(MetaValue::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(MetaValue::Bytes),
    ]
}

/// Strategy for metadata maps.
pub fn metadata_strategy() -> impl Strategy<Value = Metadata> {
    prop::collection::btree_map("[a-z_]{1,12}", meta_value_strategy(), 0..6)
}
