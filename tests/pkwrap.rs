//! PKCS #1 v1.5 and OAEP key-transport tests over a real RSA keypair.

mod common;

use common::{generate_rsa_key, RsaContext, RsaKey, TestFactory, TestKeyContext};
use pkimech::hashes::HashAlgo;
use pkimech::kernel::{KeyContext, PgpCipherAlgo};
use pkimech::mech::{
    self, MechanismPkcUnwrapInfo, MechanismPkcWrapInfo, PkcWrapMechanism, UnwrapTarget,
    WrapPayload,
};
use pkimech::CryptError;
use rand_chacha::rand_core::SeedableRng;
use std::sync::OnceLock;

fn test_key() -> &'static RsaKey {
    static KEY: OnceLock<RsaKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(77);
        generate_rsa_key(&mut rng, 2048)
    })
}

fn wrap_key(
    mechanism: PkcWrapMechanism, payload: WrapPayload<'_>, aux_hash: HashAlgo,
) -> Vec<u8> {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(99);
    let mut wrap_context = RsaContext::new_public(test_key().clone());
    let mut wrapped = vec![0u8; 256];
    let mut info = MechanismPkcWrapInfo {
        wrapped_data: Some(&mut wrapped),
        wrapped_data_length: 0,
        wrap_context: &mut wrap_context,
        payload,
        aux_hash,
    };
    mech::export_key(mechanism, &mut rng, &mut info).unwrap();
    let wrapped_data_length = info.wrapped_data_length;
    wrapped.truncate(wrapped_data_length);
    wrapped
}

fn unwrap_key<'a>(
    mechanism: PkcWrapMechanism, wrap_context: &'a mut RsaContext, wrapped: &'a [u8],
    target: UnwrapTarget<'a>, aux_hash: HashAlgo,
) -> Result<(), CryptError> {
    let mut info = MechanismPkcUnwrapInfo {
        wrapped_data: wrapped,
        wrap_context,
        target,
        aux_hash,
    };
    mech::import_key(mechanism, &mut info)
}

#[test]
fn test_pkcs1_wrap_unwrap() {
    let session_key = [0x2Bu8; 24];
    let key_context = TestKeyContext::with_key(&session_key);
    let wrapped = wrap_key(PkcWrapMechanism::Pkcs1, WrapPayload::Key(&key_context),
                           HashAlgo::Sha1);

    let mut recovered = TestKeyContext::empty(24);
    let mut wrap_context = RsaContext::new_keypair(test_key().clone());
    unwrap_key(PkcWrapMechanism::Pkcs1, &mut wrap_context, &wrapped,
               UnwrapTarget::Key(&mut recovered), HashAlgo::Sha1).unwrap();
    assert_eq!(recovered.key, session_key);
}

#[test]
fn test_pkcs1_size_query() {
    let key_context = TestKeyContext::with_key(&[0x11; 16]);
    let mut wrap_context = RsaContext::new_public(test_key().clone());
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
    let mut info = MechanismPkcWrapInfo {
        wrapped_data: None,
        wrapped_data_length: 0,
        wrap_context: &mut wrap_context,
        payload: WrapPayload::Key(&key_context),
        aux_hash: HashAlgo::Sha1,
    };
    mech::export_key(PkcWrapMechanism::Pkcs1, &mut rng, &mut info).unwrap();
    assert_eq!(info.wrapped_data_length, 256);
}

#[test]
fn test_pkcs1_bit_flips_are_bad_data() {
    let session_key = [0x4Du8; 16];
    let key_context = TestKeyContext::with_key(&session_key);
    let wrapped = wrap_key(PkcWrapMechanism::Pkcs1, WrapPayload::Key(&key_context),
                           HashAlgo::Sha1);

    for bit in (0..2048).step_by(97) {
        let mut corrupted = wrapped.clone();
        corrupted[bit / 8] ^= 1 << (bit % 8);
        let mut recovered = TestKeyContext::empty(16);
        let mut wrap_context = RsaContext::new_keypair(test_key().clone());
        match unwrap_key(PkcWrapMechanism::Pkcs1, &mut wrap_context, &corrupted,
                         UnwrapTarget::Key(&mut recovered), HashAlgo::Sha1) {
            Err(CryptError::BadData) => {}
            other => panic!("flip of bit {bit} produced {other:?}"),
        }
    }
}

#[test]
fn test_pkcs1_raw_premaster() {
    // The TLS premaster secret travels as caller data without a key
    // context on either end
    let premaster = [0x03u8, 0x03].iter().copied().chain((0..46).map(|i| i as u8))
        .collect::<Vec<u8>>();
    let wrapped = wrap_key(PkcWrapMechanism::Pkcs1, WrapPayload::Raw(&premaster),
                           HashAlgo::Sha1);

    let mut recovered = [0u8; 48];
    let mut wrap_context = RsaContext::new_keypair(test_key().clone());
    unwrap_key(PkcWrapMechanism::Pkcs1, &mut wrap_context, &wrapped,
               UnwrapTarget::Raw(&mut recovered), HashAlgo::Sha1).unwrap();
    assert_eq!(recovered[..], premaster[..]);

    // A mismatched expected length is rejected
    let mut short = [0u8; 32];
    assert_eq!(
        unwrap_key(PkcWrapMechanism::Pkcs1, &mut wrap_context, &wrapped,
                   UnwrapTarget::Raw(&mut short), HashAlgo::Sha1),
        Err(CryptError::Overflow)
    );
}

#[test]
fn test_pkcs1_pgp_wrap_unwrap() {
    let session_key = [0x77u8; 16];
    let key_context = TestKeyContext::with_pgp_key(&session_key, PgpCipherAlgo::Aes128);
    let wrapped = wrap_key(PkcWrapMechanism::Pkcs1Pgp, WrapPayload::Key(&key_context),
                           HashAlgo::Sha1);

    let mut factory = TestFactory::default();
    let mut created = None;
    let mut wrap_context = RsaContext::new_keypair(test_key().clone());
    unwrap_key(
        PkcWrapMechanism::Pkcs1Pgp,
        &mut wrap_context,
        &wrapped,
        UnwrapTarget::PgpCreate { factory: &mut factory, context: &mut created },
        HashAlgo::Sha1,
    )
    .unwrap();
    assert_eq!(factory.created_algo, Some(PgpCipherAlgo::Aes128));
    let created = created.expect("context created on unwrap");
    let mut extracted = [0u8; 32];
    let length = created.extract_key(&mut extracted).unwrap();
    assert_eq!(&extracted[..length], &session_key);
}

#[test]
fn test_pkcs1_pgp_corruption() {
    let session_key = [0x77u8; 16];
    let key_context = TestKeyContext::with_pgp_key(&session_key, PgpCipherAlgo::Aes128);
    let wrapped = wrap_key(PkcWrapMechanism::Pkcs1Pgp, WrapPayload::Key(&key_context),
                           HashAlgo::Sha1);

    let mut corrupted = wrapped;
    corrupted[128] ^= 0x10;
    let mut factory = TestFactory::default();
    let mut created = None;
    let mut wrap_context = RsaContext::new_keypair(test_key().clone());
    assert!(unwrap_key(
        PkcWrapMechanism::Pkcs1Pgp,
        &mut wrap_context,
        &corrupted,
        UnwrapTarget::PgpCreate { factory: &mut factory, context: &mut created },
        HashAlgo::Sha1,
    )
    .is_err());
    assert!(created.is_none());
}

#[test]
fn test_oaep_wrap_unwrap_all_mgf_hashes() {
    for aux_hash in [HashAlgo::Sha1, HashAlgo::Sha256, HashAlgo::Sha512] {
        let session_key = [0x6Eu8; 24];
        let key_context = TestKeyContext::with_key(&session_key);
        let wrapped = wrap_key(PkcWrapMechanism::Oaep, WrapPayload::Key(&key_context),
                               aux_hash);

        let mut recovered = TestKeyContext::empty(24);
        let mut wrap_context = RsaContext::new_keypair(test_key().clone());
        unwrap_key(PkcWrapMechanism::Oaep, &mut wrap_context, &wrapped,
                   UnwrapTarget::Key(&mut recovered), aux_hash).unwrap();
        assert_eq!(recovered.key, session_key, "MGF {aux_hash:?}");
    }
}

#[test]
fn test_oaep_bit_flips_are_bad_data() {
    let session_key = [0x51u8; 16];
    let key_context = TestKeyContext::with_key(&session_key);
    let wrapped = wrap_key(PkcWrapMechanism::Oaep, WrapPayload::Key(&key_context),
                           HashAlgo::Sha256);

    for bit in (0..2048).step_by(103) {
        let mut corrupted = wrapped.clone();
        corrupted[bit / 8] ^= 1 << (bit % 8);
        let mut recovered = TestKeyContext::empty(16);
        let mut wrap_context = RsaContext::new_keypair(test_key().clone());
        match unwrap_key(PkcWrapMechanism::Oaep, &mut wrap_context, &corrupted,
                         UnwrapTarget::Key(&mut recovered), HashAlgo::Sha256) {
            Err(CryptError::BadData) => {}
            other => panic!("flip of bit {bit} produced {other:?}"),
        }
    }
}

#[test]
fn test_oaep_mgf_hash_mismatch_rejected() {
    let session_key = [0x51u8; 16];
    let key_context = TestKeyContext::with_key(&session_key);
    let wrapped = wrap_key(PkcWrapMechanism::Oaep, WrapPayload::Key(&key_context),
                           HashAlgo::Sha256);

    let mut recovered = TestKeyContext::empty(16);
    let mut wrap_context = RsaContext::new_keypair(test_key().clone());
    assert_eq!(
        unwrap_key(PkcWrapMechanism::Oaep, &mut wrap_context, &wrapped,
                   UnwrapTarget::Key(&mut recovered), HashAlgo::Sha1),
        Err(CryptError::BadData)
    );

    // MD5 is not a valid MGF hash at all
    assert_eq!(
        unwrap_key(PkcWrapMechanism::Oaep, &mut wrap_context, &wrapped,
                   UnwrapTarget::Key(&mut recovered), HashAlgo::Md5),
        Err(CryptError::NotAvail)
    );
}

#[test]
fn test_payload_too_large_for_modulus() {
    // A payload needing more than modulus - 11 bytes must be refused
    let oversized = [0x42u8; 250];
    let key_context = TestKeyContext::with_key(&oversized);
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(5);
    let mut wrap_context = RsaContext::new_public(test_key().clone());
    let mut wrapped = vec![0u8; 256];
    let mut info = MechanismPkcWrapInfo {
        wrapped_data: Some(&mut wrapped),
        wrapped_data_length: 0,
        wrap_context: &mut wrap_context,
        payload: WrapPayload::Key(&key_context),
        aux_hash: HashAlgo::Sha1,
    };
    assert_eq!(mech::export_key(PkcWrapMechanism::Pkcs1, &mut rng, &mut info),
               Err(CryptError::Overflow));
}
