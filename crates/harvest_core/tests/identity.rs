use harvest_core::{
    common_prefix, next_index_for_prefix, parse_address, Identity, ParsedAddress, Seed, SeedError,
};
use pretty_assertions::assert_eq;

#[test]
fn minted_seed_is_sixteen_hex_digits() {
    let seed = Seed::from_bits(0xdead_beef_0000_0001);
    assert_eq!(seed.as_str(), "deadbeef00000001");
    assert_eq!(seed.short(), "deadbeef");
}

#[test]
fn seed_validation_rejects_separators_and_blank() {
    assert_eq!("  ".parse::<Seed>(), Err(SeedError::Empty));
    assert_eq!("ab-cd".parse::<Seed>(), Err(SeedError::InvalidChar('-')));
    assert_eq!("ab@cd".parse::<Seed>(), Err(SeedError::InvalidChar('@')));
    assert_eq!("abc123\n".parse::<Seed>().unwrap().as_str(), "abc123");
}

#[test]
fn first_identity_renders_zero_padded() {
    let seed = Seed::from_bits(0x0123_4567_89ab_cdef);
    let identity = Identity::new(&seed, 0);
    assert_eq!(identity.address("example.com"), "01234567-000000@example.com");
    assert_eq!(Identity::new(&seed, 42).to_string(), "01234567-000042");
}

#[test]
fn parse_round_trips_rendered_identity() {
    let seed = Seed::new("cafebabe").unwrap();
    let address = Identity::new(&seed, 17).address("mail.test");
    assert_eq!(
        parse_address(&address),
        Some(ParsedAddress {
            prefix: "cafebabe",
            index: 17
        })
    );
}

#[test]
fn parse_ignores_non_deterministic_addresses() {
    assert_eq!(parse_address("example@email.com"), None);
    assert_eq!(parse_address("-000001@example.com"), None);
    assert_eq!(parse_address("abc-12x@example.com"), None);
    assert_eq!(parse_address(""), None);
}

#[test]
fn next_index_is_one_past_max_for_matching_prefix() {
    let lines = [
        "aaaa0000-000000@example.com",
        "aaaa0000-000004@example.com",
        "bbbb0000-000090@example.com",
        "aaaa0000-000002@example.com",
        "garbage",
    ];
    assert_eq!(next_index_for_prefix(lines, "aaaa0000"), Some(5));
    assert_eq!(next_index_for_prefix(lines, "cccc0000"), None);
}

#[test]
fn common_prefix_requires_agreement() {
    let agreeing = ["ab12cd34-000001@x.com", "example@email.com", "ab12cd34-000007@x.com"];
    assert_eq!(common_prefix(agreeing), Some("ab12cd34".to_string()));

    let mixed = ["ab12cd34-000001@x.com", "ff12cd34-000002@x.com"];
    assert_eq!(common_prefix(mixed), None);

    let none: [&str; 1] = ["example@email.com"];
    assert_eq!(common_prefix(none), None);
}
