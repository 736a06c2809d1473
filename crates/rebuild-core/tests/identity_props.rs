use proptest::prelude::*;
use rebuild_core::constants::MAX_NAME_LEN;
use rebuild_core::{artifact_key, source_build_key};

proptest! {
    #[test]
    fn artifact_key_is_stable_and_dns_safe(gav in "[a-zA-Z0-9._:-]{0,120}") {
        let key = artifact_key(&gav);
        prop_assert_eq!(&key, &artifact_key(&gav));
        prop_assert!(key.len() <= MAX_NAME_LEN);
        prop_assert!(key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-'));
        prop_assert!(key.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()));
        prop_assert!(key.chars().last().is_some_and(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn distinct_gavs_differing_only_in_punctuation_get_distinct_keys(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
        let dotted = format!("g:{a}.{b}:1");
        let dashed = format!("g:{a}-{b}:1");
        prop_assert_ne!(artifact_key(&dotted), artifact_key(&dashed));
    }

    #[test]
    fn source_build_key_depends_only_on_scm_triple(url in "https://[a-z]{1,12}/[a-z]{1,12}", tag in "[a-z0-9.]{1,10}", path in "[a-z/]{0,10}") {
        let key = source_build_key(&url, &tag, &path);
        prop_assert_eq!(&key, &source_build_key(&url, &tag, &path));
        prop_assert_eq!(key.len(), 32);
        prop_assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

#[test]
fn artifact_key_is_pinned() {
    // Nombres persistidos: cambiar el esquema deja huérfanas las requests existentes.
    let key = artifact_key("com.acme:foo:1.0");
    assert!(key.starts_with("foo.1.0-"), "{key}");
    assert_eq!(key.len(), "foo.1.0-".len() + 8);
}
