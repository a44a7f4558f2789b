// Timing-leakage harness for the PKCS #1 unwrap path.
//
// The raw RSA transform is stubbed out with an identity context so that
// what's measured is exactly the post-decrypt format handling: padding
// recovery, payload validation and key load.  Left inputs carry valid
// PKCS #1 padding, right inputs carry broken padding; a timing
// distinguisher between the two classes would be a padding oracle.

use dudect_bencher::{ctbench_main, BenchRng, Class, CtRunner};
use pkimech::mech::{MechanismPkcUnwrapInfo, UnwrapTarget};
use pkimech::pkwrap;
use pkimech::{CryptError, CryptResult};
use rand_core::RngCore;

const MODULUS_SIZE: usize = 256;
const PAYLOAD_SIZE: usize = 16;

// Identity "RSA" context: the decrypt is a no-op so the plaintext block
// is whatever ciphertext the caller supplies
struct IdentityPkc;

impl pkimech::kernel::PkcContext for IdentityPkc {
    fn key_size(&self) -> usize {
        MODULUS_SIZE
    }

    fn encrypt(&mut self, _data: &mut [u8]) -> CryptResult<()> {
        Ok(())
    }

    fn decrypt(&mut self, _data: &mut [u8]) -> CryptResult<()> {
        Ok(())
    }

    fn sign(&mut self, _data: &mut [u8]) -> CryptResult<()> {
        Ok(())
    }

    fn sigcheck(&mut self, _data: &mut [u8]) -> CryptResult<()> {
        Ok(())
    }
}

struct SinkKeyContext;

impl pkimech::kernel::KeyContext for SinkKeyContext {
    fn key_size(&self) -> usize {
        PAYLOAD_SIZE
    }

    fn extract_key(&self, _out: &mut [u8]) -> CryptResult<usize> {
        Err(CryptError::NotAvail)
    }

    fn load_key(&mut self, _key: &[u8]) -> CryptResult<()> {
        Ok(())
    }
}

fn make_block(rng: &mut BenchRng, valid: bool) -> [u8; MODULUS_SIZE] {
    let mut block = [0u8; MODULUS_SIZE];
    rng.fill_bytes(&mut block);
    for byte in block.iter_mut() {
        if *byte == 0 {
            *byte = 0xA5;
        }
    }
    block[0] = 0x00;
    block[1] = 0x02;
    if valid {
        block[MODULUS_SIZE - PAYLOAD_SIZE - 1] = 0x00;
    }
    block
}

fn pkcs1_unwrap_timing(runner: &mut CtRunner, rng: &mut BenchRng) {
    const ITERATIONS: usize = 100_000;

    for i in 0..ITERATIONS {
        let class = if i % 2 == 0 { Class::Left } else { Class::Right };
        let block = make_block(rng, class == Class::Left);

        runner.run_one(class, || {
            let mut wrap_context = IdentityPkc;
            let mut key_context = SinkKeyContext;
            let mut info = MechanismPkcUnwrapInfo {
                wrapped_data: &block,
                wrap_context: &mut wrap_context,
                target: UnwrapTarget::Key(&mut key_context),
                aux_hash: pkimech::hashes::HashAlgo::Sha1,
            };
            let _ = pkwrap::import_pkcs1(&mut info);
        })
    }
}

ctbench_main!(pkcs1_unwrap_timing);
