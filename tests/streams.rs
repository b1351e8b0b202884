//! Program stream layers and primitive decoding through the public API.

use std::sync::Arc;

use eazdevirt::{
    crypto::{xor_transform, ChainKey, CounterSeed, CryptoContext, StreamSpec},
    decoder::{PermutationProfile, PrimitiveReader, ProfileKind, ScrambledProfiles},
    devirt::{PasswordEntry, PasswordStore, PositionKey},
    metadata::Token,
    resolver::{TypeModifier, TypeName},
};

#[test]
fn test_scrambled_primitives_behind_xor() {
    let general =
        PermutationProfile::from_orders(&[1, 0], &[3, 2, 1, 0], &[0, 1, 2, 3, 4, 5, 6, 7])
            .unwrap();
    let profiles = Arc::new(ScrambledProfiles::new(
        general.clone(),
        PermutationProfile::identity(),
    ));

    let mut plain = Vec::new();
    plain.extend(general.for_width(4).unwrap().scramble(&0x1122_3344u32.to_le_bytes()));
    plain.extend(general.for_width(2).unwrap().scramble(&0xBEEFu16.to_le_bytes()));
    plain.push(3);
    plain.extend_from_slice(b"abc");
    xor_transform(&mut plain, 0xDEAD_BEEF, 0);

    let stream = StreamSpec::new(Arc::from(plain), vec![CryptoContext::Xor(0xDEAD_BEEF)])
        .open()
        .unwrap();
    let mut reader = PrimitiveReader::new(stream.cursor(CounterSeed::Position).unwrap(), profiles);
    reader.set_profile(ProfileKind::General);
    assert_eq!(reader.read_u32().unwrap(), 0x1122_3344);
    assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
    assert_eq!(reader.read_string().unwrap(), "abc");
    assert!(reader.read_u8().is_err());
}

#[test]
fn test_reseeded_cursor() {
    let mut plain = vec![0u8; 32];
    plain[16..20].copy_from_slice(&7u32.to_le_bytes());
    xor_transform(&mut plain[16..], 0x1234_5678, 0x40);

    let stream = StreamSpec::new(Arc::from(plain), vec![CryptoContext::Xor(0x1234_5678)])
        .open()
        .unwrap();
    let seed = CounterSeed::Reseeded { origin: 16, seed: 0x40 };
    let profiles = Arc::new(ScrambledProfiles::default());
    let mut reader = PrimitiveReader::new(stream.cursor(seed).unwrap(), profiles);
    reader.seek(16).unwrap();
    assert_eq!(reader.read_u32().unwrap(), 7);
}

#[test]
fn test_passwords_and_guarded_ranges() {
    let specific: PasswordEntry = "0x06000012#1:second".parse().unwrap();
    let fallback: PasswordEntry = "06000012:first".parse().unwrap();
    assert!("06000012".parse::<PasswordEntry>().is_err());

    let mut store = PasswordStore::new();
    store.insert(specific);
    store.insert(fallback);
    let token = Token(0x0600_0012);
    assert_eq!(store.get(token, 0), Some("first"));
    assert_eq!(store.get(token, 1), Some("second"));
    assert_eq!(store.get(Token(0x0600_0013), 0), None);

    let plain: Vec<u8> = (0..37u8).collect();
    let cipher = ChainKey::for_range("second", token, 1).encrypt(&plain);
    assert_ne!(cipher, plain);
    assert_eq!(ChainKey::for_range("second", token, 1).decrypt(&cipher), plain);
}

#[test]
fn test_position_key_and_type_names() {
    let key = PositionKey { offset: 0x1F0, seed: 0xCAFE };
    let text = key.encode(0x55AA_55AA);
    assert_eq!(PositionKey::decode(&text, 0x55AA_55AA).unwrap(), key);

    let name: TypeName = "System.Collections.Generic.List`1[[System.Int32, mscorlib]][], mscorlib"
        .parse()
        .unwrap();

    assert_eq!(name.namespace, "System.Collections.Generic");
    assert_eq!(name.nesting, vec!["List`1"]);
    assert_eq!(name.modifiers, vec![TypeModifier::SzArray]);
    assert_eq!(name.generic_args.len(), 1);
}
