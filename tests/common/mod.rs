//! Shared mock kernel contexts for the integration tests: an AES-CBC
//! cipher context, a byte-level AES-CFB cipher context, a raw-RSA
//! public-key context over num-bigint, and simple hash/key/private-key
//! contexts.

#![allow(dead_code)] // not every test file uses every mock

use aes::Aes128;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use num_bigint::{BigUint, ModInverse, RandPrime};
use pkimech::asn1_read::{self, Tag};
use pkimech::asn1_write::{self, sizeof_object};
use pkimech::bignum::Bignum;
use pkimech::hashes::HashAlgo;
use pkimech::kernel::{
    CipherContext, ContextFactory, HashContext, KeyContext, PgpCipherAlgo,
    PrivateKeyContext, PkcContext, PrivateKeyFormat,
};
use pkimech::stream::{ReadStream, WriteStream};
use pkimech::wire;
use pkimech::{CryptError, CryptResult};
use rand::Rng;

/* AES-128-CBC context with an accessible IV, as the CMS and private-key
   wrap mechanisms require */

pub struct AesCbcContext {
    cipher: Aes128,
    iv: [u8; 16],
}

impl AesCbcContext {
    pub fn new(key: &[u8; 16], iv: &[u8; 16]) -> Self {
        AesCbcContext { cipher: Aes128::new(key.into()), iv: *iv }
    }
}

impl CipherContext for AesCbcContext {
    fn block_size(&self) -> usize {
        16
    }

    fn get_iv(&self, iv: &mut [u8]) -> CryptResult<usize> {
        iv[..16].copy_from_slice(&self.iv);
        Ok(16)
    }

    fn set_iv(&mut self, iv: &[u8]) -> CryptResult<()> {
        if iv.len() != 16 {
            return Err(CryptError::BadData);
        }
        self.iv.copy_from_slice(iv);
        Ok(())
    }

    fn encrypt(&mut self, data: &mut [u8]) -> CryptResult<()> {
        if data.len() % 16 != 0 {
            return Err(CryptError::BadData);
        }
        for block in data.chunks_mut(16) {
            for (byte, iv_byte) in block.iter_mut().zip(self.iv.iter()) {
                *byte ^= iv_byte;
            }
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
            self.iv.copy_from_slice(block);
        }
        Ok(())
    }

    fn decrypt(&mut self, data: &mut [u8]) -> CryptResult<()> {
        if data.len() % 16 != 0 {
            return Err(CryptError::BadData);
        }
        for block in data.chunks_mut(16) {
            let mut saved = [0u8; 16];
            saved.copy_from_slice(block);
            self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
            for (byte, iv_byte) in block.iter_mut().zip(self.iv.iter()) {
                *byte ^= iv_byte;
            }
            self.iv = saved;
        }
        Ok(())
    }
}

/* Byte-granular AES-CFB8 context for the PGP mechanisms, which encrypt
   regions that aren't block-size multiples */

pub struct AesCfbContext {
    cipher: Aes128,
    register: [u8; 16],
}

impl AesCfbContext {
    pub fn new(key: &[u8; 16], iv: &[u8; 16]) -> Self {
        AesCfbContext { cipher: Aes128::new(key.into()), register: *iv }
    }

    fn keystream_byte(&self) -> u8 {
        let mut block = self.register;
        self.cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));
        block[0]
    }

    fn shift_in(&mut self, ciphertext_byte: u8) {
        self.register.rotate_left(1);
        self.register[15] = ciphertext_byte;
    }
}

impl CipherContext for AesCfbContext {
    fn block_size(&self) -> usize {
        16
    }

    fn get_iv(&self, iv: &mut [u8]) -> CryptResult<usize> {
        iv[..16].copy_from_slice(&self.register);
        Ok(16)
    }

    fn set_iv(&mut self, iv: &[u8]) -> CryptResult<()> {
        if iv.len() != 16 {
            return Err(CryptError::BadData);
        }
        self.register.copy_from_slice(iv);
        Ok(())
    }

    fn encrypt(&mut self, data: &mut [u8]) -> CryptResult<()> {
        for byte in data.iter_mut() {
            let ciphertext = *byte ^ self.keystream_byte();
            *byte = ciphertext;
            self.shift_in(ciphertext);
        }
        Ok(())
    }

    fn decrypt(&mut self, data: &mut [u8]) -> CryptResult<()> {
        for byte in data.iter_mut() {
            let ciphertext = *byte;
            *byte = ciphertext ^ self.keystream_byte();
            self.shift_in(ciphertext);
        }
        Ok(())
    }
}

/* Raw-RSA context.  Arithmetic comes from num-bigint; the mechanisms
   under test only ever see the PkcContext trait */

#[derive(Clone)]
pub struct RsaKey {
    pub n: BigUint,
    pub e: BigUint,
    pub d: BigUint,
}

/// Generate an RSA keypair of the given modulus size.
pub fn generate_rsa_key(rng: &mut (impl Rng + ?Sized), bits: usize) -> RsaKey {
    let e = BigUint::from(65_537u32);
    loop {
        let p: BigUint = rng.gen_prime(bits / 2);
        let q: BigUint = rng.gen_prime(bits / 2);
        if p == q {
            continue;
        }
        let n = &p * &q;
        if n.bits() != bits {
            continue;
        }
        let phi = (&p - 1u32) * (&q - 1u32);
        let Some(d) = (&e).mod_inverse(&phi) else {
            continue;
        };
        let Some(d) = d.to_biguint() else {
            continue;
        };
        return RsaKey { n, e, d };
    }
}

pub struct RsaContext {
    key: RsaKey,
    has_private: bool,
}

impl RsaContext {
    pub fn new_keypair(key: RsaKey) -> Self {
        RsaContext { key, has_private: true }
    }

    pub fn new_public(key: RsaKey) -> Self {
        RsaContext { key, has_private: false }
    }

    fn transform(&self, data: &mut [u8], exponent: &BigUint) -> CryptResult<()> {
        if data.len() != self.key_size() {
            return Err(CryptError::BadData);
        }
        let message = BigUint::from_bytes_be(data);
        if message >= self.key.n {
            return Err(CryptError::BadData);
        }
        let result = message.modpow(exponent, &self.key.n);
        let result_bytes = result.to_bytes_be();
        let pad = data.len() - result_bytes.len();
        data[..pad].fill(0);
        data[pad..].copy_from_slice(&result_bytes);
        Ok(())
    }
}

impl PkcContext for RsaContext {
    fn key_size(&self) -> usize {
        (self.key.n.bits() + 7) / 8
    }

    fn encrypt(&mut self, data: &mut [u8]) -> CryptResult<()> {
        let e = self.key.e.clone();
        self.transform(data, &e)
    }

    fn decrypt(&mut self, data: &mut [u8]) -> CryptResult<()> {
        if !self.has_private {
            return Err(CryptError::Permission);
        }
        let d = self.key.d.clone();
        self.transform(data, &d)
    }

    fn sign(&mut self, data: &mut [u8]) -> CryptResult<()> {
        self.decrypt(data)
    }

    fn sigcheck(&mut self, data: &mut [u8]) -> CryptResult<()> {
        let e = self.key.e.clone();
        self.transform(data, &e)
    }
}

/// A raw-RSA context that corrupts its own signing output, simulating an
/// RSA-CRT fault.
pub struct FaultyRsaContext(pub RsaContext);

impl PkcContext for FaultyRsaContext {
    fn key_size(&self) -> usize {
        self.0.key_size()
    }

    fn encrypt(&mut self, data: &mut [u8]) -> CryptResult<()> {
        self.0.encrypt(data)
    }

    fn decrypt(&mut self, data: &mut [u8]) -> CryptResult<()> {
        self.0.decrypt(data)
    }

    fn sign(&mut self, data: &mut [u8]) -> CryptResult<()> {
        self.0.sign(data)?;
        data[10] ^= 0x04; /* the fault */
        Ok(())
    }

    fn sigcheck(&mut self, data: &mut [u8]) -> CryptResult<()> {
        self.0.sigcheck(data)
    }
}

/* Session-key context: a bag of key bytes */

#[derive(Default)]
pub struct TestKeyContext {
    pub key: Vec<u8>,
    pub expected_size: usize,
    pub pgp_algo: Option<PgpCipherAlgo>,
}

impl TestKeyContext {
    pub fn with_key(key: &[u8]) -> Self {
        TestKeyContext { key: key.to_vec(), expected_size: key.len(), pgp_algo: None }
    }

    pub fn with_pgp_key(key: &[u8], algo: PgpCipherAlgo) -> Self {
        TestKeyContext { key: key.to_vec(), expected_size: key.len(), pgp_algo: Some(algo) }
    }

    pub fn empty(expected_size: usize) -> Self {
        TestKeyContext { key: Vec::new(), expected_size, pgp_algo: None }
    }
}

impl KeyContext for TestKeyContext {
    fn key_size(&self) -> usize {
        if self.key.is_empty() { self.expected_size } else { self.key.len() }
    }

    fn extract_key(&self, out: &mut [u8]) -> CryptResult<usize> {
        if out.len() < self.key.len() {
            return Err(CryptError::Overflow);
        }
        out[..self.key.len()].copy_from_slice(&self.key);
        Ok(self.key.len())
    }

    fn load_key(&mut self, key: &[u8]) -> CryptResult<()> {
        if key.is_empty() {
            return Err(CryptError::Underflow);
        }
        self.key = key.to_vec();
        Ok(())
    }

    fn pgp_algo(&self) -> CryptResult<PgpCipherAlgo> {
        self.pgp_algo.ok_or(CryptError::NotAvail)
    }
}

/* Factory for PGP unwrap: creates a key context tagged with the selected
   algorithm */

#[derive(Default)]
pub struct TestFactory {
    pub created_algo: Option<PgpCipherAlgo>,
}

impl ContextFactory for TestFactory {
    fn create_cipher(&mut self, algo: PgpCipherAlgo) -> CryptResult<Box<dyn KeyContext>> {
        self.created_algo = Some(algo);
        Ok(Box::new(TestKeyContext {
            key: Vec::new(),
            expected_size: algo.key_size(),
            pgp_algo: Some(algo),
        }))
    }
}

/* Completed-hash context */

pub struct TestHashContext {
    algo: HashAlgo,
    digest: Vec<u8>,
}

impl TestHashContext {
    pub fn new(algo: HashAlgo, data: &[u8]) -> Self {
        let mut digest = vec![0u8; 64];
        let size = pkimech::hashes::hash_atomic(algo, &mut digest, &[data]);
        digest.truncate(size);
        TestHashContext { algo, digest }
    }

    pub fn from_digest(algo: HashAlgo, digest: &[u8]) -> Self {
        TestHashContext { algo, digest: digest.to_vec() }
    }
}

impl HashContext for TestHashContext {
    fn algo(&self) -> HashAlgo {
        self.algo
    }

    fn hash_value(&self, out: &mut [u8]) -> CryptResult<usize> {
        if out.len() < self.digest.len() {
            return Err(CryptError::Overflow);
        }
        out[..self.digest.len()].copy_from_slice(&self.digest);
        Ok(self.digest.len())
    }
}

/* Private-key context serialising SEQUENCE { INTEGER 0, OCTET STRING
   secret } for the PKCS #15/#8 formats and a four-MPI blob for PGP */

pub struct TestPrivateKeyContext {
    pub secret: Vec<u8>,
    pub mpis: Vec<Vec<u8>>,
}

impl TestPrivateKeyContext {
    pub fn new(secret: &[u8]) -> Self {
        TestPrivateKeyContext { secret: secret.to_vec(), mpis: Vec::new() }
    }

    pub fn empty() -> Self {
        TestPrivateKeyContext { secret: Vec::new(), mpis: Vec::new() }
    }
}

impl PrivateKeyContext for TestPrivateKeyContext {
    fn write_private_key(
        &self, stream: &mut WriteStream<'_>, _format: PrivateKeyFormat,
    ) -> CryptResult<()> {
        let content = 3 + sizeof_object(self.secret.len());
        asn1_write::write_sequence(stream, content)?;
        asn1_write::write_short_integer(stream, 0, Tag::Default)?;
        asn1_write::write_octet_string(stream, &self.secret, Tag::Default)
    }

    fn read_private_key(
        &mut self, data: &[u8], format: PrivateKeyFormat,
    ) -> CryptResult<()> {
        if format == PrivateKeyFormat::Pgp {
            /* Four MPIs back to back; trailing integrity data is the
               mechanism's problem */
            let mut stream = ReadStream::new(data);
            self.mpis.clear();
            for _i in 0..4 {
                let mut value = [0u8; 512];
                let length =
                    wire::read_integer16u_bits(&mut stream, Some(&mut value), 1, 512)?;
                self.mpis.push(value[..length].to_vec());
            }
            return Ok(());
        }

        let mut stream = ReadStream::new(data);
        asn1_read::read_sequence(&mut stream)?;
        if asn1_read::read_short_integer(&mut stream)? != 0 {
            return Err(CryptError::BadData);
        }
        let mut secret = [0u8; 1024];
        let length = asn1_read::read_octet_string(&mut stream, Some(&mut secret), 1, 1024)?;
        self.secret = secret[..length].to_vec();
        Ok(())
    }
}

/* A Bignum backend over num-bigint for the codec round-trip tests */

#[derive(Clone, Default)]
pub struct TestBignum(pub BigUint);

impl Bignum for TestBignum {
    fn new() -> Self {
        TestBignum(BigUint::default())
    }

    fn set_zero(&mut self) {
        self.0 = BigUint::default();
    }

    fn is_zero(&self) -> bool {
        self.0.bits() == 0
    }

    fn num_bytes(&self) -> usize {
        (self.0.bits() + 7) / 8
    }

    fn num_bits(&self) -> usize {
        self.0.bits()
    }

    fn from_be_bytes(bytes: &[u8]) -> Self {
        TestBignum(BigUint::from_bytes_be(bytes))
    }

    fn to_be_bytes(&self, out: &mut [u8]) -> CryptResult<usize> {
        let bytes = self.0.to_bytes_be();
        if bytes.len() > out.len() {
            return Err(CryptError::Overflow);
        }
        out[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn lt(&self, other: &Self) -> bool {
        self.0 < other.0
    }
}
