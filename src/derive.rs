//! Key-derivation mechanisms.
//!
//! Five generations of password/secret-to-key constructions: PBKDF2
//! (PKCS #5 v2, RFC 8018), the PKCS #12 derivation, the SSL 3.0 and
//! TLS 1.0/1.1 PRFs, the TLS 1.2 PRF (RFC 5246), the OpenPGP iterated
//! S2K (RFC 4880) and the CMP/Entrust password MAC derivation.  All are
//! deterministic given `(input, salt, iterations, algorithm, length)` and
//! wipe their intermediate state on every exit.
//!
//! The HMAC-based PRFs key a single [`HmacState`] up front and clone it
//! per block; the clone replays the padded-key setup for free, which is
//! the dominant cost saving when iteration counts run to the hundreds of
//! thousands.

use crate::hashes::{hash_atomic, HashAlgo, HashState, HmacState};
use crate::kernel::KeyContext;
use crate::mech::{MechanismDeriveInfo, MechanismKdfInfo};
use crate::{ensure, CryptError, CryptResult, MAX_HASHSIZE, MAX_KEYSIZE};
use zeroize::{Zeroize, Zeroizing};

/****************************************************************************
*                                                                           *
*                         PKCS #5v2 Key Derivation                          *
*                                                                           *
****************************************************************************/

/// One block of the PBKDF2 PRF: `T = U_1 ^ U_2 ^ ... ^ U_c` with
/// `U_1 = HMAC(salt || counter)` and `U_{i+1} = HMAC(U_i)`.
fn pbkdf2_hash(
    out: &mut [u8], keyed: &HmacState, salt: &[u8], iterations: usize, block_count: u32,
) -> CryptResult<()> {
    let hash_size = keyed.algo().size();
    debug_assert!(!out.is_empty() && out.len() <= hash_size);

    let mut block = Zeroizing::new([0u8; MAX_HASHSIZE]);

    /* Calculate U1 = HMAC( salt || counter ) */
    let mut mac = keyed.clone();
    mac.update(salt);
    mac.update(&block_count.to_be_bytes());
    mac.finalize_into(&mut block[..]);
    out.copy_from_slice(&block[..out.len()]);

    /* Calculate HMAC( U1 ) ^ HMAC( U2 ) ^ ... HMAC( Uc ) */
    for _i in 1..iterations {
        let mut mac = keyed.clone();
        mac.update(&block[..hash_size]);
        mac.finalize_into(&mut block[..]);
        for (out_byte, block_byte) in out.iter_mut().zip(block.iter()) {
            *out_byte ^= block_byte;
        }
    }

    Ok(())
}

/// PBKDF2 / PKCS #5 v2 derivation (RFC 8018).
pub fn derive_pbkdf2(info: &mut MechanismDeriveInfo<'_>) -> CryptResult<()> {
    info.data_out.fill(0);
    ensure!(!info.data_in.is_empty() && !info.salt.is_empty(), CryptError::BadData);
    ensure!(info.iterations >= 1, CryptError::BadData);

    /* Set up the HMAC state with the user key once; each block iteration
       reuses the keyed state rather than repeating the key setup */
    let keyed = HmacState::new(info.hash_algo, info.data_in)?;
    let hash_size = info.hash_algo.size();

    /* Produce enough blocks of output to fill the key */
    let mut block_count = 1u32;
    let mut failed = None;
    for chunk in info.data_out.chunks_mut(hash_size) {
        if let Err(err) = pbkdf2_hash(chunk, &keyed, info.salt, info.iterations, block_count)
        {
            failed = Some(err);
            break;
        }
        block_count = block_count.wrapping_add(1);
    }
    if let Some(err) = failed {
        info.data_out.zeroize();
        return Err(err);
    }

    Ok(())
}

/// Apply PBKDF2 as a pure single-round KDF between key contexts.
pub fn kdf_pbkdf2(info: &mut MechanismKdfInfo<'_>) -> CryptResult<()> {
    /* Get the key payload details from the key contexts */
    let master_size = info.master_key_context.key_size();
    let key_size = info.key_context.key_size();
    ensure!(master_size > 0 && master_size <= MAX_KEYSIZE, CryptError::BadData);
    ensure!(key_size > 0 && key_size <= MAX_KEYSIZE, CryptError::BadData);

    /* Extract the master secret and derive the key from it using PBKDF2
       with a single iteration as the KDF */
    let mut master = Zeroizing::new([0u8; MAX_KEYSIZE]);
    let master_len = info.master_key_context.extract_key(&mut master[..])?;
    let mut key = Zeroizing::new([0u8; MAX_KEYSIZE]);
    let mut derive_info = MechanismDeriveInfo {
        data_out: &mut key[..key_size],
        data_in: &master[..master_len],
        salt: info.salt,
        hash_algo: info.hash_algo,
        iterations: 1,
    };
    derive_pbkdf2(&mut derive_info)?;

    /* Load the derived key into the context */
    info.key_context.load_key(&key[..key_size])
}

/****************************************************************************
*                                                                           *
*                         PKCS #12 Key Derivation                           *
*                                                                           *
****************************************************************************/

/* The nominal block size for PKCS #12 derivation, based on the MD5/SHA-1
   input size of 512 bits */

const P12_BLOCKSIZE: usize = 64;

/* The maximum size of the expanded diversifier/salt/password (DSP)
   string: one block of diversifier, one of salt, and up to three blocks
   for a 64-character password converted to Unicode with a terminator */

const P12_DSPSIZE: usize = P12_BLOCKSIZE + P12_BLOCKSIZE + (P12_BLOCKSIZE * 3);

/// Longest password accepted by the PKCS #12 derivation.
const MAX_TEXTSIZE: usize = 64;

/// `dest = (dest + src + 1) mod 2^512`, on 64-byte big-endian blocks.
fn add64(dest: &mut [u8], src: &[u8]) {
    debug_assert!(dest.len() == P12_BLOCKSIZE && src.len() == P12_BLOCKSIZE);

    let mut carry = 1u32;
    for index in (0..P12_BLOCKSIZE).rev() {
        let value = u32::from(dest[index]) + u32::from(src[index]) + carry;
        dest[index] = (value & 0xFF) as u8;
        carry = value >> 8;
    }
}

/// Concatenate copies of `src` until `dest` is full.
fn expand_data(dest: &mut [u8], src: &[u8]) {
    debug_assert!(!src.is_empty());
    let mut index = 0;
    while index < dest.len() {
        let bytes_to_copy = src.len().min(dest.len() - index);
        dest[index..index + bytes_to_copy].copy_from_slice(&src[..bytes_to_copy]);
        index += bytes_to_copy;
    }
}

/// Build the diversifier/salt/password string hashed by the PKCS #12
/// derivation:
///
/// ```text
/// <---- 64 bytes ----><------- 64 bytes -------><-- mult. 64 bytes ->
/// [ ID | ID | ID ... ][ salt | salt | salt ... ][ pw | pw | pw ... ]
/// ```
fn init_dsp(
    dsp: &mut [u8; P12_DSPSIZE], key: &[u8], salt: &[u8], diversifier: u8,
) -> CryptResult<usize> {
    ensure!((1..=3).contains(&diversifier), CryptError::BadData);
    ensure!(!salt.is_empty() && salt.len() <= P12_BLOCKSIZE, CryptError::BadData);
    ensure!(!key.is_empty() && key.len() <= MAX_TEXTSIZE, CryptError::BadData);

    /* Set up the diversifier and expanded salt */
    dsp[..P12_BLOCKSIZE].fill(diversifier);
    expand_data(&mut dsp[P12_BLOCKSIZE..2 * P12_BLOCKSIZE], salt);

    /* Convert the password to a null-terminated big-endian Unicode
       string, a Microsoft bug that was made part of the standard */
    let mut bmp_string = Zeroizing::new([0u8; (MAX_TEXTSIZE + 1) * 2]);
    for (index, &byte) in key.iter().enumerate() {
        bmp_string[index * 2] = 0;
        bmp_string[index * 2 + 1] = byte;
    }
    let bmp_length = key.len() * 2 + 2;
    let pw_length = (bmp_length + P12_BLOCKSIZE - 1) & !(P12_BLOCKSIZE - 1);

    expand_data(&mut dsp[2 * P12_BLOCKSIZE..2 * P12_BLOCKSIZE + pw_length],
                &bmp_string[..bmp_length]);
    Ok(2 * P12_BLOCKSIZE + pw_length)
}

/// PKCS #12 password derivation.  The first salt byte is the purpose
/// diversifier.
pub fn derive_pkcs12(info: &mut MechanismDeriveInfo<'_>) -> CryptResult<()> {
    info.data_out.fill(0);
    ensure!(info.salt.len() >= 2, CryptError::BadData);
    ensure!(info.iterations >= 1, CryptError::BadData);

    let hash_size = info.hash_algo.size();
    let mut dsp = Zeroizing::new([0u8; P12_DSPSIZE]);
    let dsp_length = init_dsp(&mut dsp, info.data_in, &info.salt[1..], info.salt[0])?;

    /* Produce enough blocks of output to fill the key */
    let mut a_i = Zeroizing::new([0u8; MAX_HASHSIZE]);
    let mut b = Zeroizing::new([0u8; P12_BLOCKSIZE]);
    let out_length = info.data_out.len();
    let mut key_index = 0;
    while key_index < out_length {
        let no_key_bytes = hash_size.min(out_length - key_index);

        /* Hash the keying material the required number of times */
        hash_atomic(info.hash_algo, &mut a_i[..], &[&dsp[..dsp_length]]);
        for _i in 1..info.iterations {
            let digest = Zeroizing::new(*a_i);
            hash_atomic(info.hash_algo, &mut a_i[..], &[&digest[..hash_size]]);
        }
        info.data_out[key_index..key_index + no_key_bytes]
            .copy_from_slice(&a_i[..no_key_bytes]);

        /* Update the input keying material for the next block by adding
           the output value, expanded to the block size, to each block of
           the salt/password portion of the DSP string */
        expand_data(&mut b[..], &a_i[..hash_size]);
        for dsp_block in dsp[P12_BLOCKSIZE..dsp_length].chunks_mut(P12_BLOCKSIZE) {
            add64(dsp_block, &b[..]);
        }

        key_index += no_key_bytes;
    }

    Ok(())
}

/****************************************************************************
*                                                                           *
*                         SSL/TLS Key Derivation                            *
*                                                                           *
****************************************************************************/

/// SSL 3.0 PRF: successive `MD5( secret || SHA1( 'A'/'BB'/'CCC'... ||
/// secret || salt ) )` blocks.
#[cfg(feature = "legacy")]
pub fn derive_ssl(info: &mut MechanismDeriveInfo<'_>) -> CryptResult<()> {
    info.data_out.fill(0);
    ensure!(!info.data_in.is_empty() && !info.salt.is_empty(), CryptError::BadData);

    let mut hash = Zeroizing::new([0u8; MAX_HASHSIZE]);
    let md5_size = HashAlgo::Md5.size();
    let sha_size = HashAlgo::Sha1.size();

    /* The counter encoding supports at most 16 rounds */
    ensure!(info.data_out.len() <= 16 * md5_size, CryptError::Overflow);

    /* Produce enough blocks of output to fill the key */
    let out_length = info.data_out.len();
    let mut counter = 0u8;
    let mut key_index = 0;
    while key_index < out_length {
        let no_key_bytes = md5_size.min(out_length - key_index);

        /* Set up the round's counter data: 'A', 'BB', 'CCC', ... */
        let counter_data = [b'A' + counter; 16];
        counter += 1;

        /* Calculate SHA1( 'A'/'BB'/'CCC'... || secret || salt ) */
        let mut sha = HashState::new(HashAlgo::Sha1);
        sha.update(&counter_data[..usize::from(counter)]);
        sha.update(info.data_in);
        sha.update(info.salt);
        sha.finalize_into(&mut hash[..]);

        /* Calculate MD5( secret || SHA1-hash ) */
        let mut md5 = HashState::new(HashAlgo::Md5);
        md5.update(info.data_in);
        md5.update(&hash[..sha_size]);
        md5.finalize_into(&mut hash[..]);

        info.data_out[key_index..key_index + no_key_bytes]
            .copy_from_slice(&hash[..no_key_bytes]);
        key_index += no_key_bytes;
    }

    Ok(())
}

/// Per-chain state for the TLS PRF: the keyed HMAC snapshot and the
/// current `A_n` value.
struct TlsPrfInfo {
    keyed: HmacState,
    hash_a: Zeroizing<[u8; MAX_HASHSIZE]>,
}

/// Initialise a TLS PRF chain and calculate `A1 = HMAC( salt )`.
fn tls_prf_init(algo: HashAlgo, key: &[u8], salt: &[u8]) -> CryptResult<TlsPrfInfo> {
    ensure!(!key.is_empty() && !salt.is_empty(), CryptError::BadData);

    let keyed = HmacState::new(algo, key)?;
    let mut hash_a = Zeroizing::new([0u8; MAX_HASHSIZE]);
    let mut mac = keyed.clone();
    mac.update(salt);
    mac.finalize_into(&mut hash_a[..]);
    Ok(TlsPrfInfo { keyed, hash_a })
}

/// One round of the TLS PRF: XOR `HMAC( A_n || salt )` into the output
/// and advance `A_{n+1} = HMAC( A_n )`.
fn tls_prf_hash(out: &mut [u8], prf_info: &mut TlsPrfInfo, salt: &[u8]) {
    let hash_size = prf_info.keyed.algo().size();
    debug_assert!(!out.is_empty() && out.len() <= hash_size);

    /* Calculate HMAC( An || salt ), snapshotting the intermediate
       HMAC( An ) state for the chain advance */
    let mut mac = prf_info.keyed.clone();
    mac.update(&prf_info.hash_a[..hash_size]);
    let an_state = mac.clone();
    mac.update(salt);
    let mut hash = Zeroizing::new([0u8; MAX_HASHSIZE]);
    mac.finalize_into(&mut hash[..]);

    /* Calculate An+1 = HMAC( An ) */
    an_state.finalize_into(&mut prf_info.hash_a[..]);

    /* XOR the result into the output */
    for (out_byte, hash_byte) in out.iter_mut().zip(hash.iter()) {
        *out_byte ^= hash_byte;
    }
}

/// TLS 1.0/1.1 PRF (RFC 2246): the XOR of an HMAC-MD5 chain and an
/// HMAC-SHA1 chain, each seeded with one half of the secret.  The halves
/// overlap by one byte when the secret length is odd.
#[cfg(feature = "legacy")]
pub fn derive_tls(info: &mut MechanismDeriveInfo<'_>) -> CryptResult<()> {
    info.data_out.fill(0);

    /* Find the two halves of the secret; each is ceil( len / 2 ) bytes */
    let secret_length = (info.data_in.len() + 1) / 2;
    let s1 = &info.data_in[..secret_length];
    let s2 = &info.data_in[info.data_in.len() - secret_length..];

    /* The two hash functions have different block sizes that would
       require complex buffering to handle leftovers, so each chain XORs
       into the zeroed output at its own index */
    let mut md5_info = tls_prf_init(HashAlgo::Md5, s1, info.salt)?;
    let mut sha_info = tls_prf_init(HashAlgo::Sha1, s2, info.salt)?;
    let md5_size = HashAlgo::Md5.size();
    let sha_size = HashAlgo::Sha1.size();

    /* Produce enough blocks of output to fill the key, stepping by the
       MD5 hash size since it's the smaller block */
    let out_length = info.data_out.len();
    let mut md5_index = 0;
    let mut sha_index = 0;
    while md5_index < out_length {
        let md5_no_key_bytes = md5_size.min(out_length - md5_index);
        let sha_no_key_bytes = sha_size.min(out_length - sha_index);

        tls_prf_hash(&mut info.data_out[md5_index..md5_index + md5_no_key_bytes],
                     &mut md5_info, info.salt);
        if sha_no_key_bytes > 0 {
            /* The SHA-1 counter advances faster than the MD5 one, so it
               can run dry while MD5 is still processing its last block */
            tls_prf_hash(&mut info.data_out[sha_index..sha_index + sha_no_key_bytes],
                         &mut sha_info, info.salt);
        }

        md5_index += md5_no_key_bytes;
        sha_index += sha_no_key_bytes;
    }

    Ok(())
}

/// TLS 1.2 PRF (RFC 5246): a single HMAC chain over the negotiated hash.
pub fn derive_tls12(info: &mut MechanismDeriveInfo<'_>) -> CryptResult<()> {
    info.data_out.fill(0);

    let mut prf_info = tls_prf_init(info.hash_algo, info.data_in, info.salt)?;
    let hash_size = info.hash_algo.size();

    let out_length = info.data_out.len();
    let mut key_index = 0;
    while key_index < out_length {
        let no_key_bytes = hash_size.min(out_length - key_index);
        tls_prf_hash(&mut info.data_out[key_index..key_index + no_key_bytes],
                     &mut prf_info, info.salt);
        key_index += no_key_bytes;
    }

    Ok(())
}

/****************************************************************************
*                                                                           *
*                           PGP Key Derivation                              *
*                                                                           *
****************************************************************************/

/// OpenPGP S2K salt size (RFC 4880 section 3.7.1.2).
pub const PGP_SALTSIZE: usize = 8;

/// One output block of the iterated S2K: hash `salt || password || salt
/// || password ...` until `byte_count` input bytes have been consumed,
/// preloading `preload` zero bytes for second and subsequent blocks.
fn pgp_prf_hash(
    out: &mut [u8], algo: HashAlgo, key: &[u8], salt: &[u8], byte_count: usize,
    preload: usize,
) {
    debug_assert!(out.len() >= algo.size());
    debug_assert!(preload <= 1);

    let mut state = HashState::new(algo);
    if preload > 0 {
        state.update(&[0u8]);
    }

    /* Hash rounds of salt || password with an early out once the byte
       count is reached mid-item */
    let mut remaining = byte_count;
    loop {
        if remaining <= salt.len() {
            state.update(&salt[..remaining]);
            break;
        }
        state.update(salt);
        remaining -= salt.len();
        if remaining <= key.len() {
            state.update(&key[..remaining]);
            break;
        }
        state.update(key);
        remaining -= key.len();
    }
    state.finalize_into(out);
}

/// OpenPGP iterated-and-salted S2K derivation (RFC 4880).  The iteration
/// count is the pre-decoded specifier divided by 64, i.e. the byte count
/// hashed is `iterations * 64`.
pub fn derive_pgp(info: &mut MechanismDeriveInfo<'_>) -> CryptResult<()> {
    info.data_out.fill(0);
    ensure!(info.salt.len() == PGP_SALTSIZE, CryptError::BadData);
    ensure!(!info.data_in.is_empty(), CryptError::BadData);

    let hash_size = info.hash_algo.size();
    ensure!(info.data_out.len() < 2 * hash_size, CryptError::BadData);

    /* If it's a non-iterated hash or the count wouldn't allow even a
       single pass over the salt and password, run one full pass anyway */
    let mut byte_count = info.iterations << 6;
    if byte_count < PGP_SALTSIZE + info.data_in.len() {
        byte_count = PGP_SALTSIZE + info.data_in.len();
    }

    let mut block = Zeroizing::new([0u8; 2 * MAX_HASHSIZE]);
    pgp_prf_hash(&mut block[..MAX_HASHSIZE], info.hash_algo, info.data_in, info.salt,
                 byte_count, 0);

    /* If the hash output is shorter than the required key, a second round
       preloaded with a zero byte yields independent key material */
    if hash_size < info.data_out.len() {
        pgp_prf_hash(&mut block[MAX_HASHSIZE..], info.hash_algo, info.data_in, info.salt,
                     byte_count, 1);
    }

    let out_length = info.data_out.len();
    if out_length <= hash_size {
        info.data_out.copy_from_slice(&block[..out_length]);
    } else {
        info.data_out[..hash_size].copy_from_slice(&block[..hash_size]);
        info.data_out[hash_size..]
            .copy_from_slice(&block[MAX_HASHSIZE..MAX_HASHSIZE + out_length - hash_size]);
    }

    Ok(())
}

/****************************************************************************
*                                                                           *
*                           Misc Key Derivation                             *
*                                                                           *
****************************************************************************/

/// CMP/Entrust password derivation: `H( password || salt )` iterated,
/// with the first hash counted as iteration one.
pub fn derive_cmp(info: &mut MechanismDeriveInfo<'_>) -> CryptResult<()> {
    info.data_out.fill(0);
    let hash_size = info.hash_algo.size();
    ensure!(info.data_out.len() == hash_size, CryptError::BadData);
    ensure!(info.iterations >= 1, CryptError::BadData);

    /* Calculate H( password || salt ) */
    hash_atomic(info.hash_algo, info.data_out, &[info.data_in, info.salt]);

    /* Iterate the hashing the remaining number of times */
    let mut digest = Zeroizing::new([0u8; MAX_HASHSIZE]);
    for _i in 1..info.iterations {
        digest[..hash_size].copy_from_slice(&info.data_out[..hash_size]);
        hash_atomic(info.hash_algo, info.data_out, &[&digest[..hash_size]]);
    }

    Ok(())
}
