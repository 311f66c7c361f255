//! Partitioners compute a [Token] for arbitrary bytes, which places routing keys
//! and virtual nodes on the consistent-hash ring.
//!
//! The only partitioner shipped is [Murmur3Partitioner], the x64 128-bit variant of
//! Murmur3 with seed 0, keeping the lower 64 bits. Tail bytes are sign-extended
//! before mixing, which makes the resulting tokens compatible with the tokens
//! produced by Cassandra-style Murmur3 partitioners.

use std::num::Wrapping;

use bytes::Buf;

use crate::routing::Token;

/// An algorithm placing bytes on the token ring.
pub trait Partitioner: Send + Sync + std::fmt::Debug {
    /// Computes the token of the given bytes.
    fn hash_one(&self, data: &[u8]) -> Token;
}

/// The default partitioner.
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur3Partitioner;

const BLOCK_LEN: usize = 16;

const C1: Wrapping<i64> = Wrapping(0x87c3_7b91_1142_53d5_u64 as i64);
const C2: Wrapping<i64> = Wrapping(0x4cf5_ad43_2745_937f_u64 as i64);

#[inline]
fn rotl64(v: Wrapping<i64>, n: u32) -> Wrapping<i64> {
    Wrapping(v.0.rotate_left(n))
}

#[inline]
fn fmix(mut k: Wrapping<i64>) -> Wrapping<i64> {
    k ^= Wrapping((k.0 as u64 >> 33) as i64);
    k *= Wrapping(0xff51afd7ed558ccd_u64 as i64);
    k ^= Wrapping((k.0 as u64 >> 33) as i64);
    k *= Wrapping(0xc4ceb9fe1a85ec53_u64 as i64);
    k ^= Wrapping((k.0 as u64 >> 33) as i64);
    k
}

#[inline]
fn mix_k1(mut k1: Wrapping<i64>) -> Wrapping<i64> {
    k1 *= C1;
    k1 = rotl64(k1, 31);
    k1 * C2
}

#[inline]
fn mix_k2(mut k2: Wrapping<i64>) -> Wrapping<i64> {
    k2 *= C2;
    k2 = rotl64(k2, 33);
    k2 * C1
}

/// Folds up to 8 tail bytes into one lane, sign-extending every byte.
fn fold_tail(bytes: &[u8]) -> Wrapping<i64> {
    bytes
        .iter()
        .enumerate()
        .rev()
        .fold(Wrapping(0_i64), |acc, (i, &b)| {
            acc ^ (Wrapping(b as i8 as i64) << (i * 8))
        })
}

impl Partitioner for Murmur3Partitioner {
    fn hash_one(&self, data: &[u8]) -> Token {
        let mut h1 = Wrapping(0_i64);
        let mut h2 = Wrapping(0_i64);

        let mut blocks = data.chunks_exact(BLOCK_LEN);
        for mut block in &mut blocks {
            let k1 = Wrapping(block.get_i64_le());
            let k2 = Wrapping(block.get_i64_le());

            h1 ^= mix_k1(k1);
            h1 = rotl64(h1, 27);
            h1 += h2;
            h1 = h1 * Wrapping(5) + Wrapping(0x52dce729);

            h2 ^= mix_k2(k2);
            h2 = rotl64(h2, 31);
            h2 += h1;
            h2 = h2 * Wrapping(5) + Wrapping(0x38495ab5);
        }

        let tail = blocks.remainder();
        if tail.len() > 8 {
            h2 ^= mix_k2(fold_tail(&tail[8..]));
        }
        if !tail.is_empty() {
            h1 ^= mix_k1(fold_tail(&tail[..tail.len().min(8)]));
        }

        let len = Wrapping(data.len() as i64);
        h1 ^= len;
        h2 ^= len;

        h1 += h2;
        h2 += h1;

        h1 = fmix(h1);
        h2 = fmix(h2);

        h1 += h2;

        Token::new(h1.0)
    }
}
