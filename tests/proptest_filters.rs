//! Property-based tests using proptest
//!
//! These tests verify the tag codec round trip and the filter's AND
//! semantics using randomized inputs.

use proptest::prelude::*;
use stgcp::resource::tags::{decode, encode, TagMap};
use stgcp::resource::ResourceFilter;
use stgcp::retry::{classify, Verdict, RETRYABLE_MARKERS};

/// Keys and values free of both delimiters
fn arb_tags() -> impl Strategy<Value = TagMap> {
    prop::collection::btree_map("[A-Za-z0-9_. -]{0,12}", "[A-Za-z0-9_./ -]{0,16}", 0..8)
}

/// Values that may contain `:`
fn arb_tags_with_colon_values() -> impl Strategy<Value = TagMap> {
    prop::collection::btree_map("[A-Za-z0-9_-]{1,8}", "[A-Za-z0-9:/.-]{0,24}", 0..8)
}

/// Reference implementation of the filter semantics
fn expected_match(filter: &ResourceFilter, name: &str, tags: &TagMap) -> bool {
    let name_ok = filter.name.as_deref().map_or(true, |wanted| wanted == name);
    let tags_ok = filter.tags.as_ref().map_or(true, |wanted| {
        wanted.iter().all(|(k, v)| tags.get(k).map_or(false, |have| have == v))
    });
    name_ok && tags_ok
}

fn arb_filter() -> impl Strategy<Value = ResourceFilter> {
    (
        prop::option::of("[a-c]{1,2}"),
        prop::option::of(prop::collection::btree_map("[a-c]", "[0-2]", 0..3)),
    )
        .prop_map(|(name, tags)| ResourceFilter { name, tags })
}

proptest! {
    /// Decoding an encoded map gives the map back
    #[test]
    fn decode_inverts_encode(tags in arb_tags()) {
        prop_assert_eq!(decode(&encode(&tags)).unwrap(), tags);
    }

    /// Values keep every `:` after the first separator
    #[test]
    fn colon_values_survive(tags in arb_tags_with_colon_values()) {
        prop_assert_eq!(decode(&encode(&tags)).unwrap(), tags);
    }

    /// Any entry lacking `:` rejects the whole description
    #[test]
    fn entry_without_colon_is_rejected(
        tags in arb_tags_with_colon_values(),
        bad in "[A-Za-z0-9 ]{0,10}"
    ) {
        let mut description = encode(&tags);
        if !description.is_empty() {
            description.push('|');
        }
        description.push_str(&bad);

        if bad.is_empty() && tags.is_empty() {
            prop_assert!(decode(&description).unwrap().is_empty());
        } else {
            let err = decode(&description).unwrap_err();
            prop_assert_eq!(err.entry, bad);
        }
    }

    /// Matching agrees with the reference semantics
    #[test]
    fn matches_is_name_and_tag_subset(
        filter in arb_filter(),
        name in "[a-c]{1,2}",
        tags in prop::collection::btree_map("[a-c]", "[0-2]", 0..4)
    ) {
        prop_assert_eq!(filter.matches(&name, &tags), expected_match(&filter, &name, &tags));
    }

    /// A resource always matches a filter built from its own name and tags
    #[test]
    fn resource_matches_itself(name in "[a-z]{1,8}", tags in arb_tags()) {
        let filter = ResourceFilter::new().with_name(name.clone()).with_tags(tags.clone());
        prop_assert!(filter.matches(&name, &tags));
    }

    /// Dropping tag constraints never loses a match
    #[test]
    fn fewer_constraints_never_lose_matches(
        filter in arb_filter(),
        name in "[a-c]{1,2}",
        tags in prop::collection::btree_map("[a-c]", "[0-2]", 0..4)
    ) {
        let relaxed = ResourceFilter { name: filter.name.clone(), tags: None };
        if filter.matches(&name, &tags) {
            prop_assert!(relaxed.matches(&name, &tags));
        }
    }

    /// Messages without any marker are permanent
    #[test]
    fn unmarked_messages_are_permanent(message in "[a-z ]{0,40}") {
        prop_assume!(!RETRYABLE_MARKERS.iter().any(|m| message.contains(m)));
        prop_assert_eq!(classify(message.as_str()), Verdict::Permanent);
    }

    /// Any message carrying a marker is retryable
    #[test]
    fn marked_messages_are_retryable(
        prefix in "[a-z ]{0,20}",
        marker in prop::sample::select(RETRYABLE_MARKERS.to_vec()),
        suffix in "[a-z ]{0,20}"
    ) {
        let message = format!("{prefix}{marker}{suffix}");
        prop_assert_eq!(classify(message.as_str()), Verdict::Retryable);
    }
}
