//! Property tests for key scoping.
//!
//! The facade opens a handle scoped to a path's directory and addresses
//! the leaf inside it; these properties check that the scoped key always
//! lands back on the same path.

use objstore::path::{clean_join, dir_key, scope_prefix, split, validate_key};
use proptest::prelude::*;

fn key_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9_-]{1,8}", 1..5).prop_map(|segments| segments.join("/"))
}

fn messy_strategy() -> impl Strategy<Value = String> {
    "(/?(\\.|\\.\\.|[a-z]{1,4})){0,5}/?"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Scoping a path's directory and appending its leaf gives the path back.
    #[test]
    fn test_scope_then_leaf_is_identity(key in key_strategy()) {
        prop_assert!(validate_key(&key).is_ok());

        let (dir, leaf) = split(&key);
        let scoped = scope_prefix("", dir).unwrap_or_default();
        prop_assert_eq!(format!("{}{}", scoped, leaf), key);
    }

    /// A backend prefix is prepended exactly once.
    #[test]
    fn test_backend_prefix_prepended(base in key_strategy(), key in key_strategy()) {
        let (dir, leaf) = split(&key);
        let scoped = scope_prefix(&base, dir).unwrap();
        prop_assert_eq!(format!("{}{}", scoped, leaf), format!("{}/{}", base, key));
    }

    /// Effective prefixes are either the root or a clean, relative directory.
    #[test]
    fn test_scope_prefix_is_clean(base in messy_strategy(), dir in messy_strategy()) {
        if let Some(prefix) = scope_prefix(&base, &dir) {
            prop_assert!(prefix.ends_with('/'));
            prop_assert!(!prefix.starts_with('/'));
            prop_assert!(!prefix.contains("//"));
            prop_assert!(prefix.trim_end_matches('/').split('/').all(|s| s != "."));
        }
    }

    /// Directory keys never collide with file keys.
    #[test]
    fn test_dir_key_is_marker(key in key_strategy()) {
        let marker = dir_key(&key).unwrap();
        prop_assert!(marker.ends_with('/'));
        prop_assert!(validate_key(&marker).is_ok());
        prop_assert_ne!(&marker, &key);
        prop_assert_eq!(clean_join(&[&marker]), key);
    }
}
